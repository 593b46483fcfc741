use async_trait::async_trait;
use rand::rngs::SmallRng;
use stampede_http::HttpRequest;
use stampede_metrics::{MetricKind, Registry};

use crate::check::Check;
use crate::executor::{RequestOutcome, ScenarioEnv};
use crate::scenario::{Scenario, SetupError, weighted_coin};

pub const ERRORS_METRIC: &str = "errors";

const DEFAULT_EMAIL: &str = "perfuser@example.com";
const DEFAULT_PASSWORD: &str = "12345678";

/// Storefront browsing workload. Each pass reads the profile and the cart,
/// then either checks out or polls the health endpoint, weighted by the
/// configured branch probability.
pub struct ShopScenario {
    base_url: String,
}

/// Shared state primed once before the fleet starts.
pub struct ShopSetup {
    pub token: String,
    pub product_ids: Vec<serde_json::Value>,
}

impl ShopScenario {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// The scenario's own failure signal: one failing observation per
    /// request whose checks did not pass. Successes add nothing, so an
    /// all-clean run reports 0.0 and an all-broken run 1.0.
    fn note_failure(env: &ScenarioEnv, outcome: &RequestOutcome) {
        let failed = outcome.error.is_some() || !outcome.checks_passed();
        if failed {
            if let Some(errors) = env.metrics.handle(ERRORS_METRIC) {
                errors.add_rate(true);
            }
        }
    }
}

#[async_trait]
impl Scenario for ShopScenario {
    type Setup = ShopSetup;

    fn name(&self) -> &'static str {
        "shop"
    }

    fn register_metrics(&self, metrics: &Registry) -> stampede_metrics::Result<()> {
        metrics.register(ERRORS_METRIC, MetricKind::Rate)?;
        Ok(())
    }

    async fn setup(
        &self,
        env: &ScenarioEnv,
        credentials: &[(String, String)],
    ) -> Result<ShopSetup, SetupError> {
        let lookup = |key: &str, default: &str| {
            credentials
                .iter()
                .find(|(k, _)| k == key)
                .map_or_else(|| default.to_string(), |(_, v)| v.clone())
        };
        let email = lookup("email", DEFAULT_EMAIL);
        let password = lookup("password", DEFAULT_PASSWORD);

        let body = serde_json::json!({ "email": email, "password": password }).to_string();
        let login = env
            .executor
            .execute(
                "login",
                HttpRequest::post(self.url("/users/login"), body.into()).json(),
                &[],
            )
            .await;
        let Some(response) = login.response else {
            return Err(SetupError::new("login", format!("{:?}", login.outcome.error)));
        };
        if response.status != 200 {
            return Err(SetupError::new(
                "login",
                format!("unexpected status {}", response.status),
            ));
        }
        let login_body: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|e| SetupError::new("login", e.to_string()))?;
        let token = login_body
            .get("token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| SetupError::new("login", "response has no token"))?
            .to_string();

        let products = env
            .executor
            .execute("products", HttpRequest::get(self.url("/products")), &[])
            .await;
        let Some(response) = products.response else {
            return Err(SetupError::new(
                "products",
                format!("{:?}", products.outcome.error),
            ));
        };
        if response.status != 200 {
            return Err(SetupError::new(
                "products",
                format!("unexpected status {}", response.status),
            ));
        }
        let catalog: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|e| SetupError::new("products", e.to_string()))?;
        let product_ids = catalog
            .get("data")
            .and_then(|d| d.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|p| p.get("id").cloned())
                    .collect()
            })
            .unwrap_or_default();

        Ok(ShopSetup { token, product_ids })
    }

    async fn iterate(
        &self,
        env: &ScenarioEnv,
        setup: &ShopSetup,
        rng: &mut SmallRng,
    ) -> Vec<RequestOutcome> {
        let mut outcomes = Vec::with_capacity(3);
        let authed = |url: String| HttpRequest::get(url).json().bearer(&setup.token);

        let profile = env
            .executor
            .execute(
                "profile",
                authed(self.url("/users/profile")),
                &[Check::status_is("profile 200", 200)],
            )
            .await;
        Self::note_failure(env, &profile.outcome);
        outcomes.push(profile.outcome);

        let cart = env
            .executor
            .execute(
                "cart",
                authed(self.url("/users/cart")),
                &[Check::status_is("cart 200", 200)],
            )
            .await;
        Self::note_failure(env, &cart.outcome);
        outcomes.push(cart.outcome);

        // Exactly one draw per pass keeps the traffic mix reproducible for
        // a given seed.
        if weighted_coin(rng, env.branch_probability) {
            let checkout = env
                .executor
                .execute(
                    "checkout",
                    authed(self.url("/buyer/checkout")),
                    &[
                        Check::status_is("checkout 200", 200),
                        Check::json_field_exists("has session_id", "session_id"),
                    ],
                )
                .await;
            Self::note_failure(env, &checkout.outcome);
            outcomes.push(checkout.outcome);
        } else {
            let health = env
                .executor
                .execute(
                    "health",
                    authed(self.url("/buyer/health")),
                    &[Check::status_is("health 200", 200)],
                )
                .await;
            Self::note_failure(env, &health.outcome);
            outcomes.push(health.outcome);
        }

        outcomes
    }
}
