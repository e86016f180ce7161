//! 📡 HttpTransport: reqwest, a base URL, and a healthy fear of 5xx.
//!
//! 🎬 COLD OPEN - INT. SERVER ROOM - 3:47 AM
//!
//! The search request is ready. The JSON is immaculate. Somewhere between here and the
//! cluster lies a load balancer, a firewall, and a TLS handshake with trust issues.
//! This module walks the request across that minefield and comes back with either a body
//! or an error that says which mine it stepped on.
//!
//! 🧠 Knowledge graph:
//! - Built from `ConnectionConfig` (url, auth, connect + request timeouts).
//! - Auth priority: API key beats basic auth. This is not a democracy.
//! - Error mapping: timeout → `Error::Timeout`, anything that never got an answer →
//!   `Error::Connection`, non-2xx → `Error::Response { status, body }`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, trace};

use super::{Method, Request, Transport};
use crate::app_config::ConnectionConfig;
use crate::error::{Error, Result};

/// 📡 The production transport. One `reqwest::Client`, reused for every call, because
/// spinning up a new client per request is buying a new car for every grocery run.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ConnectionConfig,
}

impl HttpTransport {
    /// 🚀 Build the client with the configured timeouts. Does not touch the network.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        // 🔒 validate the base URL up front. a typo here should fail now, not 50,000 docs later.
        Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("connection url '{}': {}", config.url, e)))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            // -- 💀 the TLS stack wept. the architect shrugged. no client was born today.
            .map_err(|e| Error::Config(format!("http client refused to be born: {}", e)))?;

        Ok(Self { client, config })
    }

    fn url_for(&self, request: &Request) -> Result<Url> {
        // trim_end_matches('/'): one slash of difference, infinite suffering of difference.
        let raw = format!("{}{}", self.config.url.trim_end_matches('/'), request.path);
        let parsed = if request.params.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, request.params.iter())
        };
        parsed.map_err(|e| Error::Config(format!("request url '{}': {}", raw, e)))
    }
}

/// 🕵️ Sort a reqwest failure into the bucket failsafe knows how to read.
fn classify(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(err.to_string())
    } else {
        // connect errors, resets, DNS, body send failures: all "never got an answer"
        Error::Connection(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: Request) -> Result<String> {
        let url = self.url_for(&request)?;
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
        };
        debug!("📡 {} {}", method, url);

        let mut builder = self.client.request(method, url);

        // 🔒 Same auth dance as ever: api_key beats basic auth in this club.
        if let Some(ref api_key) = self.config.api_key {
            builder = builder.header("Authorization", format!("ApiKey {}", api_key));
        } else if let Some(ref username) = self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_ref());
        }

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(ref body) = request.body {
            builder = builder
                .header("Content-Type", body.content_type())
                .body(body.to_wire()?);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let body = response.text().await.map_err(classify)?;

        if !status.is_success() {
            // -- 💀 we got a response! it just wasn't good news. the body usually says why.
            return Err(Error::Response {
                status: status.as_u16(),
                body,
            });
        }

        trace!("✅ {} bytes came back with status {}", body.len(), status);
        Ok(body)
    }
}
