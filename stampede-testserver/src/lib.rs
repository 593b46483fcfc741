use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const PATH_LOGIN: &str = "/users/login";
pub const PATH_PRODUCTS: &str = "/products";
pub const PATH_PROFILE: &str = "/users/profile";
pub const PATH_CART: &str = "/users/cart";
pub const PATH_CHECKOUT: &str = "/buyer/checkout";
pub const PATH_HEALTH: &str = "/buyer/health";

/// Token issued by the mock login endpoint; the authenticated routes accept
/// only this one.
pub const TEST_TOKEN: &str = "stampede-test-token";

/// Per-endpoint hit counters plus failure switches tests flip at runtime.
#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    login_hits: Arc<AtomicU64>,
    products_hits: Arc<AtomicU64>,
    profile_hits: Arc<AtomicU64>,
    cart_hits: Arc<AtomicU64>,
    checkout_hits: Arc<AtomicU64>,
    health_hits: Arc<AtomicU64>,
    fail_login: Arc<AtomicBool>,
    fail_profile: Arc<AtomicBool>,
    fail_checkout: Arc<AtomicBool>,
}

impl TestServerStats {
    fn hit(&self, endpoint: &Arc<AtomicU64>) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        endpoint.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn login_hits(&self) -> u64 {
        self.login_hits.load(Ordering::Relaxed)
    }

    pub fn products_hits(&self) -> u64 {
        self.products_hits.load(Ordering::Relaxed)
    }

    pub fn profile_hits(&self) -> u64 {
        self.profile_hits.load(Ordering::Relaxed)
    }

    pub fn cart_hits(&self) -> u64 {
        self.cart_hits.load(Ordering::Relaxed)
    }

    pub fn checkout_hits(&self) -> u64 {
        self.checkout_hits.load(Ordering::Relaxed)
    }

    pub fn health_hits(&self) -> u64 {
        self.health_hits.load(Ordering::Relaxed)
    }

    /// Make `/users/login` answer 500 so a run fails during setup.
    pub fn set_fail_login(&self, fail: bool) {
        self.fail_login.store(fail, Ordering::Relaxed);
    }

    /// Make `/users/profile` answer 500 on every hit.
    pub fn set_fail_profile(&self, fail: bool) {
        self.fail_profile.store(fail, Ordering::Relaxed);
    }

    /// Make `/buyer/checkout` answer 500 on every hit.
    pub fn set_fail_checkout(&self, fail: bool) {
        self.fail_checkout.store(fail, Ordering::Relaxed);
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TEST_TOKEN}"))
}

async fn handle_login(
    State(stats): State<TestServerStats>,
    body: Bytes,
) -> (StatusCode, Bytes) {
    stats.hit(&stats.login_hits);

    if stats.fail_login.load(Ordering::Relaxed) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from_static(b"login unavailable"),
        );
    }

    let req: LoginRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, Bytes::from_static(b"bad json")),
    };
    if req.email.is_empty() || req.password.is_empty() {
        return (
            StatusCode::UNAUTHORIZED,
            Bytes::from_static(b"bad credentials"),
        );
    }

    let body = serde_json::json!({ "token": TEST_TOKEN }).to_string();
    (StatusCode::OK, Bytes::from(body))
}

async fn handle_products(State(stats): State<TestServerStats>) -> (StatusCode, Bytes) {
    stats.hit(&stats.products_hits);

    let body = serde_json::json!({
        "data": [
            { "id": 1, "name": "anvil" },
            { "id": 2, "name": "rocket skates" },
            { "id": 3, "name": "giant rubber band" },
        ]
    })
    .to_string();
    (StatusCode::OK, Bytes::from(body))
}

async fn handle_profile(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
) -> (StatusCode, Bytes) {
    stats.hit(&stats.profile_hits);

    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Bytes::from_static(b"no token"));
    }
    if stats.fail_profile.load(Ordering::Relaxed) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from_static(b"profile unavailable"),
        );
    }

    let body = serde_json::json!({ "id": 1, "email": "perfuser@example.com" }).to_string();
    (StatusCode::OK, Bytes::from(body))
}

async fn handle_cart(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
) -> (StatusCode, Bytes) {
    stats.hit(&stats.cart_hits);

    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Bytes::from_static(b"no token"));
    }

    let body = serde_json::json!({ "items": [] }).to_string();
    (StatusCode::OK, Bytes::from(body))
}

async fn handle_checkout(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
) -> (StatusCode, Bytes) {
    stats.hit(&stats.checkout_hits);

    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Bytes::from_static(b"no token"));
    }
    if stats.fail_checkout.load(Ordering::Relaxed) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from_static(b"checkout unavailable"),
        );
    }

    let body = serde_json::json!({ "session_id": "sess-0001" }).to_string();
    (StatusCode::OK, Bytes::from(body))
}

async fn handle_health(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
) -> (StatusCode, Bytes) {
    stats.hit(&stats.health_hits);

    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Bytes::from_static(b"no token"));
    }

    let body = serde_json::json!({ "status": "ok" }).to_string();
    (StatusCode::OK, Bytes::from(body))
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_LOGIN, post(handle_login))
        .route(PATH_PRODUCTS, get(handle_products))
        .route(PATH_PROFILE, get(handle_profile))
        .route(PATH_CART, get(handle_cart))
        .route(PATH_CHECKOUT, get(handle_checkout))
        .route(PATH_HEALTH, get(handle_health))
        .with_state(stats)
}

/// In-process mock of the storefront API, bound to an ephemeral local port.
pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
