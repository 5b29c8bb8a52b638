use std::time::Duration;

use http::Method;
use reqwest::header::{HeaderValue, ACCEPT};
use spegel_key::PeerEndpoint;

use crate::error::Error;

/// A single shared HTTP client (keep-alives, connection pool) reused for every peer proxy
/// attempt rather than built fresh per request.
#[derive(Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
}

impl ProxyClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("reqwest client builder");
        ProxyClient { http }
    }

    /// Forwards one request to `endpoint` for `path_after_v2`. Sets `X-Spegel-Mirror: true` and
    /// `X-Spegel-Registry` so the receiving peer serves from its local store only (loop
    /// prevention) and knows which upstream registry this key belongs to. Preserves `Accept`
    /// verbatim since manifest media-type negotiation depends on it.
    pub async fn proxy_to(
        &self,
        endpoint: PeerEndpoint,
        method: Method,
        path_after_v2: &str,
        accept: Option<&HeaderValue>,
        registry: &str,
        timeout: Duration,
    ) -> Result<reqwest::Response, Error> {
        let url = format!("http://{endpoint}/v2/{path_after_v2}");
        let mut req = self
            .http
            .request(method, url)
            .timeout(timeout)
            .header("X-Spegel-Mirror", "true")
            .header("X-Spegel-Registry", registry);
        if let Some(accept) = accept {
            req = req.header(ACCEPT, accept.clone());
        }
        Ok(req.send().await?)
    }
}

impl Default for ProxyClient {
    fn default() -> Self {
        ProxyClient::new()
    }
}

pub fn is_success(status: reqwest::StatusCode) -> bool {
    status.is_success()
}
