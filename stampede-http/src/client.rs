use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use super::{Error, HttpRequest, HttpResponse, Result};

/// Pooled HTTP/1.1 client. One instance is shared by every virtual user; the
/// hyper-util pool keeps failures per-request, so a broken connection never
/// takes down another user's in-flight call.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpConnector, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // The OS-level TCP connect timeout can be tens of seconds, which makes
        // short runs against an unreachable target look hung. Apply a sane
        // default so failed connects surface promptly.
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        connector.set_connect_timeout(connect_timeout);

        let inner = Client::builder(TokioExecutor::new()).build(connector);

        Self { inner }
    }

    pub async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        let timeout = req.timeout;
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if parsed.scheme() != "http" {
            return Err(Error::UnsupportedScheme(req.url));
        }

        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut builder = Request::builder().method(req.method).uri(uri);
        if !req.body.is_empty() {
            builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
        }
        for (k, v) in req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(&v)?;
            builder = builder.header(name, value);
        }

        let req: Request<Full<Bytes>> = builder.body(Full::new(req.body))?;

        // The timeout covers the whole request including body download, so an
        // outcome duration never exceeds it by more than scheduling jitter.
        let res: hyper::Response<Incoming> = if let Some(timeout) = timeout {
            match tokio::time::timeout(timeout, self.inner.request(req)).await {
                Ok(res) => res?,
                Err(_) => return Err(Error::Timeout(timeout)),
            }
        } else {
            self.inner.request(req).await?
        };

        let (parts, body) = res.into_parts();
        let status = parts.status.as_u16();

        let body = if let Some(timeout) = timeout {
            match tokio::time::timeout(timeout, body.collect()).await {
                Ok(collected) => collected?.to_bytes(),
                Err(_) => return Err(Error::Timeout(timeout)),
            }
        } else {
            body.collect().await?.to_bytes()
        };

        Ok(HttpResponse { status, body })
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.send(HttpRequest::get(url)).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::TransportErrorKind;
    use std::time::Instant;

    #[tokio::test]
    async fn unreachable_host_fails_fast_with_connect_timeout() {
        // Small timeout to keep the test fast and deterministic.
        let client = HttpClient::new(Some(Duration::from_millis(200)));
        let req = HttpRequest::get("http://192.0.2.1:81/");

        let started = Instant::now();
        let err = client.send(req).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(
            elapsed < Duration::from_secs(2),
            "expected fast failure, elapsed={elapsed:?}"
        );
        assert_eq!(err.transport_error_kind(), TransportErrorKind::Connect);
    }

    #[tokio::test]
    async fn https_is_rejected_as_unsupported_scheme() {
        let client = HttpClient::default();
        let err = client.get("https://example.com/").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(_)));
    }

    #[tokio::test]
    async fn garbage_url_is_invalid() {
        let client = HttpClient::default();
        let err = client.get("not a url").await.unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }
}
