//! 🔌 Transport: the one door between this crate and the engine.
//!
//! 🚰 Everything upstream builds JSON. Everything downstream decodes JSON.
//! This trait is the pipe in the middle. It takes a `Request`, returns the raw body,
//! and maps failures into the three transport-shaped error kinds.
//!
//! 🧠 Knowledge graph:
//! - `HttpTransport` (reqwest) is the production implementation.
//! - Tests plug in the crate-private in-memory engine instead.
//! - Paths are relative (`/products/_search`); the transport owns the base URL.
//! - No retries live here. A failed call fails. Failsafe is a criteria concern, not ours.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub mod http;

pub use http::HttpTransport;

/// 📡 HTTP-ish verbs the library actually uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

/// 📦 A request body. JSON for searches, NDJSON for `_bulk`.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Ndjson(String),
}

impl Body {
    /// ⚠️ NDJSON is `application/x-ndjson`, not `application/json`. The engine cares. A lot.
    pub fn content_type(&self) -> &'static str {
        match self {
            Body::Json(_) => "application/json",
            Body::Ndjson(_) => "application/x-ndjson",
        }
    }

    /// 📦 The bytes that go on the wire.
    pub fn to_wire(&self) -> Result<String> {
        match self {
            Body::Json(value) => Ok(serde_json::to_string(value)?),
            Body::Ndjson(payload) => Ok(payload.clone()),
        }
    }

    /// 🔍 The JSON document, if this is a JSON body.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            Body::Ndjson(_) => None,
        }
    }
}

/// 📨 One call to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// 📍 Relative path, always starting with `/`.
    pub path: String,
    /// 🔧 URL query parameters, in order.
    pub params: Vec<(String, String)>,
    pub body: Option<Body>,
    /// ⏱️ Per-request deadline, overriding the transport's default when set.
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    pub fn ndjson(mut self, payload: String) -> Self {
        self.body = Some(Body::Ndjson(payload));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// 🔍 Look up a query parameter by name. Handy in tests, honest in logs.
    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// 🚰 The engine, as far as this crate is concerned.
///
/// # Contract
/// - Returns the raw response body on any 2xx.
/// - Returns `Error::Connection` when the engine could not be reached,
///   `Error::Timeout` when the deadline passed, and `Error::Response` for non-2xx.
/// - Never retries.
#[async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    async fn request(&self, request: Request) -> Result<String>;
}
