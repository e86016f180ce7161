//! 🎯 Criteria: the immutable, chainable search request.
//!
//! 🎬 COLD OPEN - INT. APPLICATION CODE - EVERY DAY
//!
//! Somebody needs "open products between 100 and 200, newest first, page 3, with a
//! category breakdown". Somebody else needs the same thing but only in the EU.
//! A criteria is that sentence, built one clause at a time, where every clause hands
//! back a brand new criteria and leaves the old one exactly as it was. Share a prefix,
//! branch off it, nobody steps on anybody.
//!
//! 🧠 Knowledge graph:
//! - The shared vocabulary (filters, sort, source, highlight, custom, pagination,
//!   aggregations) is `QueryBuilder`, implemented here and on `AggregationNode`.
//! - What only a top-level search has lives here: post filters, suggest, scroll,
//!   routing/preference/search_type, timeouts, explain/profile, failsafe, includes.
//! - `execute()` is memoized per instance. Every derivation gets a fresh, empty cache,
//!   so a derived criteria never inherits its parent's response.
//! - `request()` is the wire document. Custom sections are merged last and win.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::index::{Index, Record};
use crate::query_builder::{QueryBuilder, Shape, extend_object, merge_map, merge_seq};
use crate::response::{Response, SearchResult};
use crate::transport::{Method, Request};

pub mod constraints;
pub mod filter_value;

use constraints::{Constraints, exists_clause};
use filter_value::FilterValue;

/// 📄 Offset when none was set.
pub const DEFAULT_OFFSET: u64 = 0;
/// 📄 Page size when none was set.
pub const DEFAULT_LIMIT: u64 = 30;

/// 🔄 Scroll cursor state. No id means "open a new cursor".
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollState {
    pub id: Option<String>,
    pub timeout: String,
}

/// 🧹 Sections `unscope` can clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unscope {
    Query,
    PostFilter,
    Sort,
    Source,
    Offset,
    Limit,
    Aggregations,
    Highlight,
    Suggest,
    Custom,
    Scroll,
    Routing,
    Preference,
    SearchType,
    Timeout,
    TerminateAfter,
    TrackTotalHits,
    Explain,
    Profile,
    Failsafe,
    HttpTimeout,
    Includes,
}

/// 🎯 An immutable search request bound to an index.
#[derive(Clone)]
pub struct Criteria {
    pub(crate) target: Arc<Index>,
    pub(crate) shape: Shape,
    pub(crate) post: Constraints,
    pub(crate) suggest: Option<Map<String, Value>>,
    pub(crate) scroll: Option<ScrollState>,
    pub(crate) routing: Option<String>,
    pub(crate) preference: Option<String>,
    pub(crate) search_type: Option<String>,
    pub(crate) timeout: Option<String>,
    pub(crate) terminate_after: Option<u64>,
    pub(crate) track_total_hits: Option<Value>,
    pub(crate) explain: Option<bool>,
    pub(crate) profile: Option<bool>,
    pub(crate) failsafe: Option<bool>,
    pub(crate) http_timeout: Option<Duration>,
    pub(crate) includes: Option<Vec<String>>,
    // -- shared by plain clones (same request, same answer), replaced on every derivation
    cache: Arc<OnceCell<Arc<Response>>>,
}

impl fmt::Debug for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Criteria")
            .field("index", &self.target.name())
            .field("request", &self.request())
            .field("scroll", &self.scroll)
            .field("routing", &self.routing)
            .field("preference", &self.preference)
            .field("search_type", &self.search_type)
            .field("failsafe", &self.failsafe)
            .field("http_timeout", &self.http_timeout)
            .field("includes", &self.includes)
            .field("executed", &self.cache.initialized())
            .finish()
    }
}

impl QueryBuilder for Criteria {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn derive_shape(&self, f: impl FnOnce(&mut Shape)) -> Self {
        self.derive(|next| f(&mut next.shape))
    }

    fn target(&self) -> &Arc<Index> {
        &self.target
    }
}

impl Criteria {
    pub fn new(target: Arc<Index>) -> Self {
        Self {
            target,
            shape: Shape::default(),
            post: Constraints::default(),
            suggest: None,
            scroll: None,
            routing: None,
            preference: None,
            search_type: None,
            timeout: None,
            terminate_after: None,
            track_total_hits: None,
            explain: None,
            profile: None,
            failsafe: None,
            http_timeout: None,
            includes: None,
            cache: Arc::default(),
        }
    }

    /// 🧬 Copy everything, drop the cache, apply `f`.
    fn derive(&self, f: impl FnOnce(&mut Criteria)) -> Criteria {
        let mut next = self.detached();
        f(&mut next);
        next
    }

    /// Same request, empty cache.
    pub(crate) fn detached(&self) -> Criteria {
        Criteria {
            cache: Arc::default(),
            ..self.clone()
        }
    }

    pub fn query_constraints(&self) -> &Constraints {
        &self.shape.query
    }

    pub fn post_constraints(&self) -> &Constraints {
        &self.post
    }

    /// 📄 The effective offset, defaulted.
    pub fn offset_value(&self) -> u64 {
        self.shape.offset.unwrap_or(DEFAULT_OFFSET)
    }

    /// 📄 The effective page size, defaulted.
    pub fn limit_value(&self) -> u64 {
        self.shape.limit.unwrap_or(DEFAULT_LIMIT)
    }

    pub fn scroll_state(&self) -> Option<&ScrollState> {
        self.scroll.as_ref()
    }

    pub fn is_failsafe(&self) -> bool {
        self.failsafe.unwrap_or(false)
    }

    pub fn includes_list(&self) -> &[String] {
        self.includes.as_deref().unwrap_or_default()
    }

    // ===== Post filters: narrow the hits, leave the aggregations alone =====

    pub fn post_where<I, K, V>(&self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FilterValue>,
    {
        self.derive(move |next| {
            for (field, value) in pairs {
                next.post.add_where(field.as_ref(), value.into());
            }
        })
    }

    pub fn post_where_not<I, K, V>(&self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FilterValue>,
    {
        self.derive(move |next| {
            for (field, value) in pairs {
                next.post.add_where_not(field.as_ref(), value.into());
            }
        })
    }

    pub fn post_filter(&self, clause: Value) -> Self {
        self.derive(move |next| next.post.filter.push(clause))
    }

    pub fn post_must(&self, clause: Value) -> Self {
        self.derive(move |next| next.post.must.push(clause))
    }

    pub fn post_must_not(&self, clause: Value) -> Self {
        self.derive(move |next| next.post.must_not.push(clause))
    }

    pub fn post_should(&self, clauses: Vec<Value>, options: Value) -> Self {
        self.derive(move |next| next.post.add_should(clauses, options))
    }

    pub fn post_range(&self, field: &str, options: Value) -> Self {
        self.post_filter(json!({ "range": { field: options } }))
    }

    pub fn post_exists(&self, field: &str) -> Self {
        self.post_filter(exists_clause(field))
    }

    pub fn post_exists_not(&self, field: &str) -> Self {
        self.post_must_not(exists_clause(field))
    }

    /// 🔎 `search`, but in the post filter. Blank text is a no-op here too.
    pub fn post_search(&self, text: &str, options: Value) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return self.derive(|_| {});
        }
        let mut query_string = Map::new();
        query_string.insert("query".to_string(), Value::from(text));
        query_string.insert("default_operator".to_string(), Value::from("AND"));
        extend_object(&mut query_string, options);
        self.post_must(json!({ "query_string": query_string }))
    }

    // ===== Top-level-only request shaping =====

    pub fn suggest(&self, name: &str, options: Value) -> Self {
        let name = name.to_string();
        self.derive(move |next| {
            next.suggest
                .get_or_insert_with(Map::new)
                .insert(name, options);
        })
    }

    pub fn explain(&self, explain: bool) -> Self {
        self.derive(move |next| next.explain = Some(explain))
    }

    pub fn profile(&self, profile: bool) -> Self {
        self.derive(move |next| next.profile = Some(profile))
    }

    /// 🛟 Turn connection/timeout/non-2xx failures into an empty response.
    pub fn failsafe(&self, failsafe: bool) -> Self {
        self.derive(move |next| next.failsafe = Some(failsafe))
    }

    /// ⏱️ The engine-side search timeout (`"500ms"`), sent in the body.
    pub fn timeout(&self, timeout: &str) -> Self {
        let timeout = timeout.to_string();
        self.derive(move |next| next.timeout = Some(timeout))
    }

    /// ⏱️ The client-side deadline for this one request.
    pub fn http_timeout(&self, timeout: Duration) -> Self {
        self.derive(move |next| next.http_timeout = Some(timeout))
    }

    pub fn terminate_after(&self, count: u64) -> Self {
        self.derive(move |next| next.terminate_after = Some(count))
    }

    /// `true`, `false`, or an accuracy threshold like `10000`.
    pub fn track_total_hits(&self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.derive(move |next| next.track_total_hits = Some(value))
    }

    pub fn routing(&self, routing: &str) -> Self {
        let routing = routing.to_string();
        self.derive(move |next| next.routing = Some(routing))
    }

    pub fn preference(&self, preference: &str) -> Self {
        let preference = preference.to_string();
        self.derive(move |next| next.preference = Some(preference))
    }

    pub fn search_type(&self, search_type: &str) -> Self {
        let search_type = search_type.to_string();
        self.derive(move |next| next.search_type = Some(search_type))
    }

    /// 🗄️ Associations the record fetcher should load alongside each record. Cumulative.
    pub fn includes<I, S>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        self.derive(move |next| next.includes.get_or_insert_with(Vec::new).extend(names))
    }

    /// 🔄 `scroll(None, "1m")` opens a cursor, `scroll(Some(id), "1m")` continues one.
    pub fn scroll(&self, id: Option<&str>, timeout: &str) -> Self {
        let state = ScrollState {
            id: id.map(str::to_string),
            timeout: timeout.to_string(),
        };
        self.derive(move |next| next.scroll = Some(state))
    }

    /// 🧹 Clear the named sections back to unset.
    pub fn unscope(&self, sections: &[Unscope]) -> Self {
        self.derive(|next| {
            for section in sections {
                match section {
                    Unscope::Query => next.shape.query = Constraints::default(),
                    Unscope::PostFilter => next.post = Constraints::default(),
                    Unscope::Sort => next.shape.sort = None,
                    Unscope::Source => next.shape.source = None,
                    Unscope::Offset => next.shape.offset = None,
                    Unscope::Limit => next.shape.limit = None,
                    Unscope::Aggregations => next.shape.aggregations = None,
                    Unscope::Highlight => next.shape.highlight = None,
                    Unscope::Suggest => next.suggest = None,
                    Unscope::Custom => next.shape.custom = None,
                    Unscope::Scroll => next.scroll = None,
                    Unscope::Routing => next.routing = None,
                    Unscope::Preference => next.preference = None,
                    Unscope::SearchType => next.search_type = None,
                    Unscope::Timeout => next.timeout = None,
                    Unscope::TerminateAfter => next.terminate_after = None,
                    Unscope::TrackTotalHits => next.track_total_hits = None,
                    Unscope::Explain => next.explain = None,
                    Unscope::Profile => next.profile = None,
                    Unscope::Failsafe => next.failsafe = None,
                    Unscope::HttpTimeout => next.http_timeout = None,
                    Unscope::Includes => next.includes = None,
                }
            }
        })
    }

    /// 🔗 Combine two criteria. Scalars: `other` wins when set. Sequences: concatenated,
    /// self first. Mappings: key-wise, `other` wins collisions. Target stays self's.
    pub fn merge(&self, other: &Criteria) -> Self {
        self.derive(|next| {
            next.shape = self.shape.merged(&other.shape);
            next.post = self.post.merged(&other.post);
            next.suggest = merge_map(&self.suggest, &other.suggest);
            next.scroll = other.scroll.clone().or_else(|| self.scroll.clone());
            next.routing = other.routing.clone().or_else(|| self.routing.clone());
            next.preference = other.preference.clone().or_else(|| self.preference.clone());
            next.search_type = other.search_type.clone().or_else(|| self.search_type.clone());
            next.timeout = other.timeout.clone().or_else(|| self.timeout.clone());
            next.terminate_after = other.terminate_after.or(self.terminate_after);
            next.track_total_hits = other
                .track_total_hits
                .clone()
                .or_else(|| self.track_total_hits.clone());
            next.explain = other.explain.or(self.explain);
            next.profile = other.profile.or(self.profile);
            next.failsafe = other.failsafe.or(self.failsafe);
            next.http_timeout = other.http_timeout.or(self.http_timeout);
            next.includes = merge_seq(&self.includes, &other.includes);
        })
    }

    /// 🔍 Dispatch to a scope the index registered under `name`.
    pub fn scope(&self, name: &str, args: &[Value]) -> Result<Criteria> {
        let scope = self
            .target
            .resolve_scope(name)
            .ok_or_else(|| Error::UndefinedScope(name.to_string()))?;
        scope(self, args)
    }

    // ===== Compilation =====

    /// 🏗️ The query section: the bool of every query constraint, or `match_all`.
    pub fn to_query(&self) -> Value {
        self.shape
            .query
            .to_bool()
            .unwrap_or_else(|| json!({ "match_all": {} }))
    }

    /// 🏗️ The query wrapped in a filter-context bool, for embedding elsewhere.
    pub fn to_filter(&self) -> Value {
        json!({ "bool": { "filter": [self.to_query()] } })
    }

    /// 🏗️ The full wire document.
    pub fn request(&self) -> Value {
        let mut body = Map::new();

        if let Some(query) = self.shape.query.to_bool() {
            body.insert("query".to_string(), query);
        }
        if let Some(post_filter) = self.post.to_bool() {
            body.insert("post_filter".to_string(), post_filter);
        }
        body.insert("from".to_string(), Value::from(self.offset_value()));
        body.insert("size".to_string(), Value::from(self.limit_value()));

        self.shape.write_sections(&mut body);

        if let Some(ref suggest) = self.suggest {
            body.insert("suggest".to_string(), Value::Object(suggest.clone()));
        }
        if let Some(explain) = self.explain {
            body.insert("explain".to_string(), Value::Bool(explain));
        }
        if let Some(profile) = self.profile {
            body.insert("profile".to_string(), Value::Bool(profile));
        }
        if let Some(ref timeout) = self.timeout {
            body.insert("timeout".to_string(), Value::from(timeout.as_str()));
        }
        if let Some(terminate_after) = self.terminate_after {
            body.insert("terminate_after".to_string(), Value::from(terminate_after));
        }
        if let Some(ref track_total_hits) = self.track_total_hits {
            body.insert("track_total_hits".to_string(), track_total_hits.clone());
        }

        self.shape.write_custom(&mut body);
        Value::Object(body)
    }

    /// 📨 The transport request `execute()` sends.
    pub fn search_request(&self) -> Request {
        let request = match self.scroll {
            // -- the continuation endpoint only knows `scroll` and `scroll_id`
            Some(ScrollState {
                id: Some(ref id),
                ref timeout,
            }) => Request::new(Method::Post, "/_search/scroll")
                .json(json!({ "scroll": timeout, "scroll_id": id })),
            Some(ScrollState { id: None, ref timeout }) => self.with_url_params(
                Request::new(Method::Post, self.target.path("_search"))
                    .param("scroll", timeout.as_str())
                    .json(self.request()),
            ),
            None => self.with_url_params(
                Request::new(Method::Post, self.target.path("_search")).json(self.request()),
            ),
        };
        request.timeout(self.http_timeout)
    }

    fn with_url_params(&self, mut request: Request) -> Request {
        if let Some(ref routing) = self.routing {
            request = request.param("routing", routing.as_str());
        }
        if let Some(ref preference) = self.preference {
            request = request.param("preference", preference.as_str());
        }
        if let Some(ref search_type) = self.search_type {
            request = request.param("search_type", search_type.as_str());
        }
        request
    }

    // ===== Terminal operations =====

    /// 🚀 Run the search, once. Later calls on this instance reuse the response.
    pub async fn execute(&self) -> Result<Arc<Response>> {
        self.cache
            .get_or_try_init(|| self.fetch_response())
            .await
            .cloned()
    }

    async fn fetch_response(&self) -> Result<Arc<Response>> {
        match self.issue().await {
            Ok(raw) => Ok(Arc::new(Response::new(raw, self.detached()))),
            Err(err) if self.is_failsafe() && err.is_transient() => {
                warn!(
                    "🛟 failsafe search on '{}' swallowed an error, returning no hits: {}",
                    self.target.name(),
                    err
                );
                Ok(Arc::new(Response::empty(self.detached())))
            }
            Err(err) => Err(err),
        }
    }

    async fn issue(&self) -> Result<Value> {
        let request = self.search_request();
        debug!("🔎 searching '{}' via {}", self.target.name(), request.path);
        self.target.call(request).await
    }

    /// 🗑️ Delete every document the query matches. Returns the engine's summary.
    /// Extra URL parameters (`conflicts`, `refresh`, ...) go in `params`.
    pub async fn delete(&self, params: &[(&str, &str)]) -> Result<Value> {
        let major = self.target.major_version().await?;
        if major < 5 {
            return Err(Error::NotSupported(format!(
                "delete by query needs engine 5 or newer, '{}' runs {}",
                self.target.name(),
                major
            )));
        }

        let mut body = self.request();
        if let Value::Object(ref mut map) = body {
            map.remove("from");
            map.remove("size");
        }

        let mut request = Request::new(Method::Post, self.target.path("_delete_by_query"))
            .json(body)
            .timeout(self.http_timeout);
        request = self.with_url_params(request);
        for (key, value) in params {
            request = request.param(*key, *value);
        }

        debug!("🗑️ delete by query on '{}'", self.target.name());
        self.target.call(request).await
    }

    /// 🗄️ The page's records, in hit order.
    pub async fn records(&self) -> Result<Vec<Record>> {
        let response = self.execute().await?;
        Ok(response.records().await?.to_vec())
    }

    pub async fn results(&self) -> Result<Vec<SearchResult>> {
        Ok(self.execute().await?.results().to_vec())
    }

    pub async fn total_count(&self) -> Result<u64> {
        Ok(self.execute().await?.total_count())
    }

    /// 📊 One normalized aggregation from the response.
    pub async fn aggregation(&self, name: &str) -> Result<Option<Arc<Value>>> {
        Ok(self.execute().await?.aggregation(name))
    }
}
