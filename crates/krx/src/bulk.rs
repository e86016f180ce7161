//! 🗑️ Bulk: the write buffer in front of `_bulk`.
//!
//! 🎬 COLD OPEN - INT. LOADING DOCK - END OF QUARTER
//!
//! Ten thousand documents want in. Sending them one request at a time is how you
//! spend a weekend. Sending them all at once is how you meet a 413. This module
//! stacks them into NDJSON, ships a truck whenever it is full by count or by weight,
//! and reads the delivery receipt for anything that fell off.
//!
//! 🧠 Knowledge graph:
//! - Thresholds: explicit `BulkOptions` > `Settings.bulk` > built-in defaults.
//! - Before appending: flush first if the buffer is non-empty and the new entry
//!   would take it to `max_bytes` or past it.
//! - After appending: flush if either threshold has been reached.
//! - A flush takes the buffer before sending, so a failed call never resends it.
//! - `ignore_errors` statuses are forgiven. The first unforgiven item is the error.
//! - `close(self)` is the end-of-scope flush. Rust has no async drop, so either call it
//!   or let `Index::bulk_scope` call it. Dropping a scope with items still buffered
//!   loses them and leaves a warning behind.
//! - An item fails when its status is outside 2xx, error body or not.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::app_config::BulkConfig;
use crate::error::{Error, Result};
use crate::transport::{Method, Request, Transport};

/// 🔧 Per-scope bulk settings. Unset thresholds fall back to `Settings.bulk`.
#[derive(Debug, Clone)]
pub struct BulkOptions {
    pub max_items: Option<usize>,
    pub max_bytes: Option<usize>,
    /// 📭 Per-item statuses that do not count as failures (e.g. 409 on `create`).
    pub ignore_errors: HashSet<u16>,
    /// 🚨 When false, item-level failures in the response are not inspected at all.
    pub raise: bool,
    pub http_timeout: Option<Duration>,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            max_items: None,
            max_bytes: None,
            ignore_errors: HashSet::new(),
            raise: true,
            http_timeout: None,
        }
    }
}

impl BulkOptions {
    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn ignore_errors(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.ignore_errors.extend(statuses);
        self
    }

    pub fn raise(mut self, raise: bool) -> Self {
        self.raise = raise;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }
}

/// 📦 The four bulk verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Index,
    Create,
    Update,
    Delete,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Index => "index",
            BulkAction::Create => "create",
            BulkAction::Update => "update",
            BulkAction::Delete => "delete",
        }
    }
}

/// 🗑️ A single-writer bulk scope bound to one `_bulk` endpoint.
pub struct Bulk {
    transport: Arc<dyn Transport>,
    path: String,
    max_items: usize,
    max_bytes: usize,
    ignore_errors: HashSet<u16>,
    raise: bool,
    http_timeout: Option<Duration>,
    buffer: String,
    pending_items: usize,
    flushes: usize,
}

impl fmt::Debug for Bulk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulk")
            .field("path", &self.path)
            .field("max_items", &self.max_items)
            .field("max_bytes", &self.max_bytes)
            .field("pending_items", &self.pending_items)
            .field("pending_bytes", &self.buffer.len())
            .field("flushes", &self.flushes)
            .finish()
    }
}

impl Bulk {
    pub fn new(
        transport: Arc<dyn Transport>,
        path: impl Into<String>,
        options: BulkOptions,
        defaults: &BulkConfig,
    ) -> Self {
        Self {
            transport,
            path: path.into(),
            // -- a threshold of 0 would flush on every append forever; 1 is the floor
            max_items: options.max_items.unwrap_or(defaults.max_items).max(1),
            max_bytes: options.max_bytes.unwrap_or(defaults.max_bytes).max(1),
            ignore_errors: options.ignore_errors,
            raise: options.raise,
            http_timeout: options.http_timeout,
            buffer: String::new(),
            pending_items: 0,
            flushes: 0,
        }
    }

    pub async fn index(&mut self, id: &str, document: &Value, options: Value) -> Result<()> {
        self.push(BulkAction::Index, id, Some(document), options).await
    }

    pub async fn create(&mut self, id: &str, document: &Value, options: Value) -> Result<()> {
        self.push(BulkAction::Create, id, Some(document), options).await
    }

    /// ✏️ `payload` goes out verbatim: `{"doc": {...}}`, `{"script": {...}}`, upserts, etc.
    pub async fn update(&mut self, id: &str, payload: &Value, options: Value) -> Result<()> {
        self.push(BulkAction::Update, id, Some(payload), options).await
    }

    pub async fn delete(&mut self, id: &str, options: Value) -> Result<()> {
        self.push(BulkAction::Delete, id, None, options).await
    }

    pub fn pending_items(&self) -> usize {
        self.pending_items
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// 🔢 How many `_bulk` calls this scope has made so far.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    async fn push(
        &mut self,
        action: BulkAction,
        id: &str,
        payload: Option<&Value>,
        options: Value,
    ) -> Result<()> {
        let entry = render_entry(action, id, payload, options)?;

        if self.pending_items > 0 && self.buffer.len() + entry.len() >= self.max_bytes {
            trace!(
                "📦 {} more bytes would overflow {} buffered, flushing first",
                entry.len(),
                self.buffer.len()
            );
            self.flush().await?;
        }

        self.buffer.push_str(&entry);
        self.pending_items += 1;

        if self.pending_items >= self.max_items || self.buffer.len() >= self.max_bytes {
            self.flush().await?;
        }
        Ok(())
    }

    /// 📡 Send whatever is buffered. A no-op on an empty buffer.
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending_items == 0 {
            return Ok(());
        }
        let payload = std::mem::take(&mut self.buffer);
        let items = std::mem::take(&mut self.pending_items);
        self.flushes += 1;

        debug!(
            "📡 flushing {} bulk items ({} bytes) to {}",
            items,
            payload.len(),
            self.path
        );
        let body = self
            .transport
            .request(
                Request::new(Method::Post, self.path.clone())
                    .ndjson(payload)
                    .timeout(self.http_timeout),
            )
            .await?;

        if !self.raise {
            return Ok(());
        }
        let response: Value = serde_json::from_str(&body)?;
        match first_failure(&response, &self.ignore_errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// 🏁 Final flush. Returns the total number of `_bulk` calls made by this scope.
    pub async fn close(mut self) -> Result<usize> {
        self.flush().await?;
        Ok(self.flushes)
    }
}

impl Drop for Bulk {
    fn drop(&mut self) {
        if self.pending_items > 0 {
            warn!(
                "⚠️ bulk scope for {} dropped with {} unflushed items ({} bytes), they never left",
                self.path,
                self.pending_items,
                self.buffer.len()
            );
        }
    }
}

/// 🏗️ One action line, plus one payload line unless it is a delete.
fn render_entry(
    action: BulkAction,
    id: &str,
    payload: Option<&Value>,
    options: Value,
) -> Result<String> {
    let mut meta = Map::new();
    meta.insert("_id".to_string(), Value::from(id));
    if let Value::Object(options) = options {
        meta.extend(options);
    }
    let mut header = Map::new();
    header.insert(action.as_str().to_string(), Value::Object(meta));

    let mut entry = serde_json::to_string(&header)?;
    entry.push('\n');
    if let Some(payload) = payload {
        entry.push_str(&serde_json::to_string(payload)?);
        entry.push('\n');
    }
    Ok(entry)
}

/// 🕵️ The first non-2xx item whose status is not forgiven.
fn first_failure(response: &Value, ignore_errors: &HashSet<u16>) -> Option<Error> {
    if response.get("errors").and_then(Value::as_bool) == Some(false) {
        return None;
    }
    let items = response.get("items")?.as_array()?;
    items
        .iter()
        .filter_map(|item| item.as_object()?.values().next())
        .find_map(|result| {
            let status = result
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|s| u16::try_from(s).ok())
                .unwrap_or(0);
            let failed = !(200..300).contains(&status);
            (failed && !ignore_errors.contains(&status)).then(|| Error::BulkItem {
                status,
                item: result.clone(),
            })
        })
}
