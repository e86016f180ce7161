//! 🗂️ Index: the target descriptor every criteria is bound to.
//!
//! 🎬 COLD OPEN - INT. CLUSTER - SOMEWHERE BEHIND A LOAD BALANCER
//!
//! A criteria knows *what* it wants. It has no idea *where* that lives, who to ask,
//! or what to call the shortcut everyone on the team types fifty times a day.
//! The index knows all three: its name, its connection, and its named scopes.
//!
//! 🧠 Knowledge graph:
//! - `criteria()` hands out the empty starting criteria. Everything else chains from it.
//! - Scopes are the open extension point: `with_scope("cheap", ..)` registers a builder,
//!   `criteria.scope("cheap", &[])` dispatches to it. Unknown names are an error.
//! - The connection is created lazily, once, under a `tokio::sync::Mutex`, so two
//!   tasks racing on first use still end up sharing one `HttpTransport`.
//! - `bulk()` and `import()` are the index-management side of the bulk batcher.
//! - `RecordFetcher` is the "turn ids into your own rows" collaborator. Ordering is
//!   not its job; the response re-sorts whatever comes back.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::app_config::Settings;
use crate::bulk::{Bulk, BulkOptions};
use crate::criteria::Criteria;
use crate::error::{Error, Result};
use crate::transport::{HttpTransport, Method, Request, Transport};

/// 🔍 A named query fragment: takes the criteria it is evaluated against plus the
/// caller's arguments, returns the criteria it builds.
pub type Scope = Arc<dyn Fn(&Criteria, &[Value]) -> Result<Criteria> + Send + Sync>;

/// 📦 One materialized record, as returned by a `RecordFetcher`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub data: Value,
}

/// 🗄️ Loads records for a page of hit ids from wherever the real rows live.
///
/// The returned order does not matter and missing ids are allowed.
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    async fn fetch_records(&self, ids: &[String], includes: &[String]) -> Result<Vec<Record>>;
}

/// 🗂️ The index a criteria queries.
pub struct Index {
    name: String,
    settings: Arc<Settings>,
    scopes: HashMap<String, Scope>,
    records: Option<Arc<dyn RecordFetcher>>,
    connection: Mutex<Option<Arc<dyn Transport>>>,
    version: OnceCell<String>,
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // -- closures don't do Debug, so the scopes show up by name only
        let mut scopes: Vec<&str> = self.scopes.keys().map(String::as_str).collect();
        scopes.sort_unstable();
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("scopes", &scopes)
            .field("records", &self.records.is_some())
            .finish()
    }
}

impl Index {
    pub fn new(name: impl Into<String>, settings: Settings) -> Self {
        Self {
            name: name.into(),
            settings: Arc::new(settings),
            scopes: HashMap::new(),
            records: None,
            connection: Mutex::new(None),
            version: OnceCell::new(),
        }
    }

    /// 🔌 Use this transport instead of building an `HttpTransport` on first use.
    pub fn with_transport(self, transport: Arc<dyn Transport>) -> Self {
        Self {
            connection: Mutex::new(Some(transport)),
            ..self
        }
    }

    /// 🔍 Register a named scope. Re-registering a name replaces it.
    pub fn with_scope<F>(mut self, name: impl Into<String>, scope: F) -> Self
    where
        F: Fn(&Criteria, &[Value]) -> Result<Criteria> + Send + Sync + 'static,
    {
        self.scopes.insert(name.into(), Arc::new(scope));
        self
    }

    pub fn with_records(mut self, fetcher: Arc<dyn RecordFetcher>) -> Self {
        self.records = Some(fetcher);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 🔍 Look up a scope by name. `None` means the dispatch has nowhere to go.
    pub fn resolve_scope(&self, name: &str) -> Option<Scope> {
        self.scopes.get(name).cloned()
    }

    pub fn record_fetcher(&self) -> Option<Arc<dyn RecordFetcher>> {
        self.records.clone()
    }

    /// 🚀 The empty criteria everything else chains from.
    pub fn criteria(self: &Arc<Self>) -> Criteria {
        Criteria::new(Arc::clone(self))
    }

    pub(crate) fn path(&self, endpoint: &str) -> String {
        format!("/{}/{}", self.name, endpoint)
    }

    /// 📡 The shared connection handle, built on first use.
    pub async fn connection(&self) -> Result<Arc<dyn Transport>> {
        let mut guard = self.connection.lock().await;
        if let Some(ref transport) = *guard {
            return Ok(Arc::clone(transport));
        }
        debug!(
            "📡 first call against '{}', connecting to {}",
            self.name, self.settings.connection.url
        );
        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(self.settings.connection.clone())?);
        *guard = Some(Arc::clone(&transport));
        Ok(transport)
    }

    /// 🏷️ The engine version string (`"8.11.0"`), asked for once and remembered.
    pub async fn version(&self) -> Result<&str> {
        let version = self
            .version
            .get_or_try_init(|| async {
                let body = self.call(Request::new(Method::Get, "/")).await?;
                body.pointer("/version/number")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::NotSupported("engine did not report a version number".into())
                    })
            })
            .await?;
        Ok(version.as_str())
    }

    /// 🏷️ Just the major version. `"8.11.0"` is 8.
    pub async fn major_version(&self) -> Result<u64> {
        let version = self.version().await?;
        version
            .split('.')
            .next()
            .and_then(|major| major.parse().ok())
            .ok_or_else(|| Error::NotSupported(format!("unparsable engine version '{}'", version)))
    }

    /// 📨 Send a request and decode the JSON body.
    pub(crate) async fn call(&self, request: Request) -> Result<Value> {
        let transport = self.connection().await?;
        let body = transport.request(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    // ===== Index management =====

    /// 🏗️ `PUT /{index}` with settings/mappings.
    pub async fn create_index(&self, body: Value) -> Result<Value> {
        info!("🏗️ creating index '{}'", self.name);
        self.call(Request::new(Method::Put, format!("/{}", self.name)).json(body))
            .await
    }

    /// 🗑️ `DELETE /{index}`.
    pub async fn delete_index(&self) -> Result<Value> {
        info!("🗑️ deleting index '{}'", self.name);
        self.call(Request::new(Method::Delete, format!("/{}", self.name)))
            .await
    }

    /// 🔍 `HEAD /{index}`. A 404 is a "no", everything else non-2xx is an error.
    pub async fn index_exists(&self) -> Result<bool> {
        let transport = self.connection().await?;
        match transport
            .request(Request::new(Method::Head, format!("/{}", self.name)))
            .await
        {
            Ok(_) => Ok(true),
            Err(Error::Response { status: 404, .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// 🔄 `POST /{index}/_refresh`, so freshly written docs become searchable.
    pub async fn refresh(&self) -> Result<Value> {
        self.call(Request::new(Method::Post, self.path("_refresh")))
            .await
    }

    /// 🗑️ Open a bulk scope against this index. Call `close()` when done, or use
    /// [`Index::bulk_scope`] and let it do that for you.
    pub async fn bulk(&self, options: BulkOptions) -> Result<Bulk> {
        let transport = self.connection().await?;
        Ok(Bulk::new(
            transport,
            self.path("_bulk"),
            options,
            &self.settings.bulk,
        ))
    }

    /// 🗑️ Run `body` against a fresh bulk scope, then flush whatever it left buffered.
    /// Returns the body's value and how many `_bulk` calls the scope made.
    /// A failing body skips the final flush and its error comes back as is.
    pub async fn bulk_scope<T, E, F>(
        &self,
        options: BulkOptions,
        body: F,
    ) -> std::result::Result<(T, usize), E>
    where
        F: AsyncFnOnce(&mut Bulk) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut bulk = self.bulk(options).await?;
        let value = body(&mut bulk).await?;
        let flushes = bulk.close().await?;
        Ok((value, flushes))
    }

    /// 📥 Index every `(id, document)` pair through one bulk scope.
    /// Returns the number of `_bulk` calls it took.
    pub async fn import<I>(&self, documents: I, options: BulkOptions) -> Result<usize>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let (count, flushes) = self
            .bulk_scope(options, async move |bulk: &mut Bulk| -> Result<usize> {
                let mut count = 0usize;
                for (id, document) in documents {
                    bulk.index(&id, &document, Value::Null).await?;
                    count += 1;
                }
                Ok(count)
            })
            .await?;
        info!(
            "📥 imported {} documents into '{}' in {} bulk calls",
            count, self.name, flushes
        );
        Ok(flushes)
    }
}
