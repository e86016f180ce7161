//! # Previously, on krx...
//!
//! 🎬 The criteria compiled. The request was perfect. And there was no cluster to send
//! it to, because nobody wants a JVM in their unit tests. So we built a tiny one, out
//! of a `BTreeMap` and some optimism.
//!
//! `InMemoryEngine` implements `Transport` and answers the handful of endpoints this
//! crate talks to: search (with scroll), `_bulk`, `_delete_by_query`, index create /
//! delete / exists / refresh, and `GET /`. It evaluates the clause kinds the builder
//! emits (bool, term, terms, range, exists, match_all, match_none, query_string, match),
//! sorts, paginates, post-filters, and runs terms/filter aggregations with
//! sum/min/max/avg/value_count metrics.
//!
//! It also keeps receipts: every request is logged, faults can be queued up, and
//! individual bulk ids can be told to fail with a chosen status.
//!
//! ⚠️ Test-only. It is a caricature of a search engine, drawn from memory, in crayon.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;

use crate::app_config::Settings;
use crate::error::{Error, Result};
use crate::index::{Index, Record, RecordFetcher};
use crate::transport::{Body, Method, Request, Transport};

/// 💥 Something to go wrong on the next request.
#[derive(Debug, Clone, Copy)]
pub(crate) enum EngineFault {
    Connection,
    Timeout,
    Status(u16),
}

impl EngineFault {
    fn into_error(self) -> Error {
        match self {
            EngineFault::Connection => Error::Connection("connection refused (injected)".into()),
            EngineFault::Timeout => Error::Timeout("deadline exceeded (injected)".into()),
            EngineFault::Status(status) => status_error(status, "injected_failure"),
        }
    }
}

#[derive(Debug)]
struct ScrollCursor {
    hits: Vec<Value>,
    position: usize,
    size: usize,
    total: usize,
}

#[derive(Debug)]
struct EngineState {
    indices: BTreeMap<String, Vec<(String, Value)>>,
    scrolls: HashMap<String, ScrollCursor>,
    next_scroll: u64,
    next_auto_id: u64,
    requests: Vec<Request>,
    faults: VecDeque<EngineFault>,
    failing_items: HashMap<String, u16>,
    version: String,
}

/// 🧪 A search engine small enough to fit in a unit test.
#[derive(Debug)]
pub(crate) struct InMemoryEngine {
    state: Mutex<EngineState>,
}

impl InMemoryEngine {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(EngineState {
                indices: BTreeMap::new(),
                scrolls: HashMap::new(),
                next_scroll: 0,
                next_auto_id: 0,
                requests: Vec::new(),
                faults: VecDeque::new(),
                failing_items: HashMap::new(),
                version: "8.11.0".to_string(),
            }),
        }
    }

    /// 🌱 Put documents straight into an index, creating it if needed.
    pub(crate) async fn seed<K: Into<String>>(&self, index: &str, documents: Vec<(K, Value)>) {
        let mut state = self.state.lock().await;
        let docs = state.indices.entry(index.to_string()).or_default();
        for (id, document) in documents {
            upsert(docs, id.into(), document);
        }
    }

    pub(crate) async fn inject_fault(&self, fault: EngineFault) {
        self.state.lock().await.faults.push_back(fault);
    }

    /// 💀 Every bulk operation on `id` fails with `status` from now on.
    pub(crate) async fn fail_item(&self, id: &str, status: u16) {
        self.state
            .lock()
            .await
            .failing_items
            .insert(id.to_string(), status);
    }

    pub(crate) async fn set_version(&self, version: &str) {
        self.state.lock().await.version = version.to_string();
    }

    pub(crate) async fn requests(&self) -> Vec<Request> {
        self.state.lock().await.requests.clone()
    }

    pub(crate) async fn search_count(&self) -> usize {
        self.count_requests(|r| r.path.ends_with("/_search") || r.path == "/_search/scroll")
            .await
    }

    pub(crate) async fn bulk_count(&self) -> usize {
        self.count_requests(|r| r.path.ends_with("/_bulk")).await
    }

    async fn count_requests(&self, predicate: impl Fn(&Request) -> bool) -> usize {
        self.state
            .lock()
            .await
            .requests
            .iter()
            .filter(|r| predicate(r))
            .count()
    }

    pub(crate) async fn document_count(&self, index: &str) -> usize {
        self.state
            .lock()
            .await
            .indices
            .get(index)
            .map_or(0, Vec::len)
    }

    pub(crate) async fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.state
            .lock()
            .await
            .indices
            .get(index)?
            .iter()
            .find(|(doc_id, _)| doc_id == id)
            .map(|(_, doc)| doc.clone())
    }

    pub(crate) async fn documents(&self, index: &str) -> Vec<(String, Value)> {
        self.state
            .lock()
            .await
            .indices
            .get(index)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for InMemoryEngine {
    async fn request(&self, request: Request) -> Result<String> {
        let mut state = self.state.lock().await;
        state.requests.push(request.clone());
        if let Some(fault) = state.faults.pop_front() {
            return Err(fault.into_error());
        }

        let json_body = request
            .body
            .as_ref()
            .and_then(Body::as_json)
            .cloned()
            .unwrap_or_else(|| json!({}));
        let segments: Vec<&str> = request
            .path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        let answer = match (request.method, segments.as_slice()) {
            (Method::Get, []) => Ok(json!({
                "name": "in-memory",
                "version": {"number": state.version}
            })),
            (Method::Head, [index]) => {
                if state.indices.contains_key(*index) {
                    return Ok(String::new());
                }
                Err(status_error(404, "index_not_found_exception"))
            }
            (Method::Put, [index]) => state.create_index(index),
            (Method::Delete, [index]) => state.delete_index(index),
            (Method::Post, [index, "_refresh"]) => state
                .docs(index)
                .map(|_| json!({"_shards": {"total": 1, "successful": 1, "failed": 0}})),
            (Method::Post, ["_search", "scroll"]) => state.continue_scroll(&json_body),
            (Method::Post, [index, "_search"]) => {
                state.search(index, &json_body, request.param_value("scroll"))
            }
            (Method::Post, [index, "_delete_by_query"]) => {
                state.delete_by_query(index, &json_body)
            }
            (Method::Post, [index, "_bulk"]) => match request.body {
                Some(Body::Ndjson(ref payload)) => state.bulk(index, payload),
                _ => Err(status_error(400, "bulk_body_must_be_ndjson")),
            },
            _ => Err(status_error(400, "no_handler_found_exception")),
        };
        answer.map(|body| body.to_string())
    }
}

impl EngineState {
    fn docs(&self, index: &str) -> Result<&Vec<(String, Value)>> {
        self.indices
            .get(index)
            .ok_or_else(|| status_error(404, "index_not_found_exception"))
    }

    fn create_index(&mut self, index: &str) -> Result<Value> {
        if self.indices.contains_key(index) {
            return Err(status_error(400, "resource_already_exists_exception"));
        }
        self.indices.insert(index.to_string(), Vec::new());
        Ok(json!({"acknowledged": true, "index": index}))
    }

    fn delete_index(&mut self, index: &str) -> Result<Value> {
        self.indices
            .remove(index)
            .map(|_| json!({"acknowledged": true}))
            .ok_or_else(|| status_error(404, "index_not_found_exception"))
    }

    fn search(&mut self, index: &str, body: &Value, scroll: Option<&str>) -> Result<Value> {
        let docs = self.docs(index)?;
        let query = body.get("query");
        let matched: Vec<&(String, Value)> = docs
            .iter()
            .filter(|(_, doc)| query.is_none_or(|q| matches(doc, q)))
            .collect();

        let aggregations = body
            .get("aggregations")
            .or_else(|| body.get("aggs"))
            .and_then(Value::as_object)
            .map(|specs| {
                let sources: Vec<&Value> = matched.iter().map(|(_, doc)| doc).collect();
                aggregate_all(&sources, specs)
            });

        let post_filter = body.get("post_filter");
        let mut hits: Vec<&(String, Value)> = matched
            .into_iter()
            .filter(|(_, doc)| post_filter.is_none_or(|f| matches(doc, f)))
            .collect();

        let sort = body.get("sort").and_then(Value::as_array);
        if let Some(sort) = sort {
            hits.sort_by(|(_, a), (_, b)| compare_by_sort(a, b, sort));
        }

        let total = hits.len();
        let from = as_usize(body.get("from"), 0);
        let size = as_usize(body.get("size"), 10);
        let rendered: Vec<Value> = hits
            .iter()
            .map(|(id, doc)| render_hit(index, id, doc, body.get("_source"), sort))
            .collect();

        match scroll {
            Some(_) => {
                self.next_scroll += 1;
                let scroll_id = format!("scroll-{}", self.next_scroll);
                let page: Vec<Value> = rendered.iter().take(size).cloned().collect();
                let position = page.len();
                self.scrolls.insert(
                    scroll_id.clone(),
                    ScrollCursor {
                        hits: rendered,
                        position,
                        size,
                        total,
                    },
                );
                Ok(search_body(page, total, aggregations, Some(scroll_id)))
            }
            None => {
                let page = rendered.into_iter().skip(from).take(size).collect();
                Ok(search_body(page, total, aggregations, None))
            }
        }
    }

    fn continue_scroll(&mut self, body: &Value) -> Result<Value> {
        let scroll_id = body
            .get("scroll_id")
            .and_then(Value::as_str)
            .ok_or_else(|| status_error(400, "scroll_id_missing"))?
            .to_string();
        let cursor = self
            .scrolls
            .get_mut(&scroll_id)
            .ok_or_else(|| status_error(404, "search_context_missing_exception"))?;

        let page: Vec<Value> = cursor
            .hits
            .iter()
            .skip(cursor.position)
            .take(cursor.size)
            .cloned()
            .collect();
        cursor.position += page.len();
        Ok(search_body(page, cursor.total, None, Some(scroll_id)))
    }

    fn delete_by_query(&mut self, index: &str, body: &Value) -> Result<Value> {
        self.docs(index)?;
        let query = body.get("query");
        let docs = self.indices.entry(index.to_string()).or_default();
        let before = docs.len();
        docs.retain(|(_, doc)| !query.is_none_or(|q| matches(doc, q)));
        let deleted = before - docs.len();
        Ok(json!({"took": 1, "deleted": deleted, "total": deleted, "failures": []}))
    }

    fn bulk(&mut self, default_index: &str, payload: &str) -> Result<Value> {
        let mut lines = payload.lines().filter(|line| !line.trim().is_empty());
        let mut items = Vec::new();
        let mut errors = false;

        while let Some(line) = lines.next() {
            let header: Value = serde_json::from_str(line)?;
            let (action, meta) = header
                .as_object()
                .and_then(|h| h.iter().next())
                .map(|(action, meta)| (action.clone(), meta.clone()))
                .ok_or_else(|| status_error(400, "empty_bulk_action"))?;
            let index = meta
                .get("_index")
                .and_then(Value::as_str)
                .unwrap_or(default_index)
                .to_string();
            let id = match meta.get("_id").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => {
                    self.next_auto_id += 1;
                    format!("auto-{}", self.next_auto_id)
                }
            };
            let source: Option<Value> = if action == "delete" {
                None
            } else {
                let line = lines
                    .next()
                    .ok_or_else(|| status_error(400, "bulk_payload_missing"))?;
                Some(serde_json::from_str(line)?)
            };

            let injected = self.failing_items.get(&id).copied();
            let outcome = match injected {
                Some(status) => Err((status, "injected_failure")),
                None => self.apply(&action, &index, &id, source),
            };
            let result = match outcome {
                Ok((status, result)) => json!({
                    "_index": index, "_id": id, "status": status, "result": result
                }),
                Err((status, kind)) => {
                    errors = true;
                    json!({
                        "_index": index, "_id": id, "status": status,
                        "error": {"type": kind, "reason": format!("[{}]: {}", id, kind)}
                    })
                }
            };
            let mut item = Map::new();
            item.insert(action, result);
            items.push(Value::Object(item));
        }

        Ok(json!({"took": 1, "errors": errors, "items": items}))
    }

    fn apply(
        &mut self,
        action: &str,
        index: &str,
        id: &str,
        source: Option<Value>,
    ) -> std::result::Result<(u16, &'static str), (u16, &'static str)> {
        let docs = self.indices.entry(index.to_string()).or_default();
        let position = docs.iter().position(|(doc_id, _)| doc_id == id);
        match (action, position) {
            ("index", Some(at)) => {
                docs[at].1 = source.unwrap_or_default();
                Ok((200, "updated"))
            }
            ("index", None) | ("create", None) => {
                docs.push((id.to_string(), source.unwrap_or_default()));
                Ok((201, "created"))
            }
            ("create", Some(_)) => Err((409, "version_conflict_engine_exception")),
            ("update", Some(at)) => {
                let patch = source
                    .as_ref()
                    .and_then(|s| s.get("doc"))
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                if let Value::Object(ref mut existing) = docs[at].1 {
                    existing.extend(patch);
                }
                Ok((200, "updated"))
            }
            ("update", None) => Err((404, "document_missing_exception")),
            ("delete", Some(at)) => {
                docs.remove(at);
                Ok((200, "deleted"))
            }
            ("delete", None) => Ok((404, "not_found")),
            _ => Err((400, "illegal_argument_exception")),
        }
    }
}

fn status_error(status: u16, kind: &str) -> Error {
    Error::Response {
        status,
        body: json!({"error": {"type": kind}, "status": status}).to_string(),
    }
}

fn upsert(docs: &mut Vec<(String, Value)>, id: String, document: Value) {
    match docs.iter().position(|(doc_id, _)| *doc_id == id) {
        Some(at) => docs[at].1 = document,
        None => docs.push((id, document)),
    }
}

fn as_usize(value: Option<&Value>, default: usize) -> usize {
    value
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(default)
}

fn search_body(
    hits: Vec<Value>,
    total: usize,
    aggregations: Option<Value>,
    scroll_id: Option<String>,
) -> Value {
    let mut body = json!({
        "took": 1,
        "timed_out": false,
        "hits": {"total": {"value": total, "relation": "eq"}, "hits": hits}
    });
    if let Value::Object(ref mut map) = body {
        if let Some(aggregations) = aggregations {
            map.insert("aggregations".to_string(), aggregations);
        }
        if let Some(scroll_id) = scroll_id {
            map.insert("_scroll_id".to_string(), Value::from(scroll_id));
        }
    }
    body
}

fn render_hit(
    index: &str,
    id: &str,
    doc: &Value,
    source_filter: Option<&Value>,
    sort: Option<&Vec<Value>>,
) -> Value {
    let mut hit = Map::new();
    hit.insert("_index".to_string(), Value::from(index));
    hit.insert("_id".to_string(), Value::from(id));
    hit.insert("_score".to_string(), json!(1.0));
    match source_filter {
        Some(Value::Bool(false)) => {}
        Some(Value::Array(fields)) => {
            let picked: Map<String, Value> = fields
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|f| doc.get(f).map(|v| (f.to_string(), v.clone())))
                .collect();
            hit.insert("_source".to_string(), Value::Object(picked));
        }
        _ => {
            hit.insert("_source".to_string(), doc.clone());
        }
    }
    if let Some(sort) = sort {
        let values: Vec<Value> = sort
            .iter()
            .filter_map(sort_field)
            .map(|(field, _)| lookup(doc, &field).cloned().unwrap_or(Value::Null))
            .collect();
        hit.insert("sort".to_string(), Value::Array(values));
    }
    Value::Object(hit)
}

// ===== Clause evaluation =====

fn lookup<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(doc, |current, segment| current.get(segment))
}

fn field_values<'a>(doc: &'a Value, field: &str) -> Vec<&'a Value> {
    match lookup(doc, field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(value) => vec![value],
    }
}

fn same(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn clause_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
        None => Vec::new(),
    }
}

pub(crate) fn matches(doc: &Value, clause: &Value) -> bool {
    let Some((kind, body)) = clause.as_object().and_then(|c| c.iter().next()) else {
        return false;
    };
    let entries = || body.as_object().into_iter().flat_map(|b| b.iter());
    match kind.as_str() {
        "match_all" => true,
        "match_none" => false,
        "bool" => bool_matches(doc, body),
        "term" => entries().all(|(field, expected)| {
            let expected = expected.get("value").unwrap_or(expected);
            field_values(doc, field).iter().any(|v| same(v, expected))
        }),
        "terms" => entries().all(|(field, options)| {
            let options = clause_list(Some(options));
            field_values(doc, field)
                .iter()
                .any(|v| options.iter().any(|o| same(v, o)))
        }),
        "range" => entries().all(|(field, bounds)| {
            field_values(doc, field)
                .iter()
                .any(|v| within(v, bounds))
        }),
        "exists" => body
            .get("field")
            .and_then(Value::as_str)
            .is_some_and(|field| !field_values(doc, field).is_empty()),
        "query_string" => text_matches(doc, body),
        "match" => entries().all(|(field, query)| {
            let text = query.get("query").unwrap_or(query);
            let needle = text.as_str().map(str::to_lowercase).unwrap_or_default();
            field_values(doc, field).iter().any(|v| {
                v.as_str()
                    .is_some_and(|s| s.to_lowercase().contains(&needle))
            })
        }),
        _ => false,
    }
}

fn within(value: &Value, bounds: &Value) -> bool {
    let check = |op: &str, accept: fn(Ordering) -> bool| {
        bounds
            .get(op)
            .is_none_or(|bound| compare(value, bound).is_some_and(accept))
    };
    check("gte", |o| o != Ordering::Less)
        && check("gt", |o| o == Ordering::Greater)
        && check("lte", |o| o != Ordering::Greater)
        && check("lt", |o| o == Ordering::Less)
}

fn bool_matches(doc: &Value, body: &Value) -> bool {
    let all = |arm: &str| clause_list(body.get(arm)).iter().all(|c| matches(doc, c));
    let must_not = clause_list(body.get("must_not"));
    if !all("must") || !all("filter") || must_not.iter().any(|c| matches(doc, c)) {
        return false;
    }

    let should = clause_list(body.get("should"));
    if should.is_empty() {
        return true;
    }
    let required = body
        .get("minimum_should_match")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or_else(|| {
            let scored = body.get("must").is_some() || body.get("filter").is_some();
            if scored { 0 } else { 1 }
        });
    should.iter().filter(|c| matches(doc, c)).count() >= required
}

fn text_matches(doc: &Value, body: &Value) -> bool {
    let query = body.get("query").and_then(Value::as_str).unwrap_or_default();
    let conjunctive = body
        .get("default_operator")
        .and_then(Value::as_str)
        .is_none_or(|op| op.eq_ignore_ascii_case("and"));

    let mut haystack = String::new();
    match body.get("fields").and_then(Value::as_array) {
        Some(fields) => {
            for field in fields.iter().filter_map(Value::as_str) {
                for value in field_values(doc, field) {
                    collect_text(value, &mut haystack);
                }
            }
        }
        None => collect_text(doc, &mut haystack),
    }
    let haystack = haystack.to_lowercase();

    let mut terms = query.split_whitespace().map(str::to_lowercase);
    if conjunctive {
        terms.all(|term| haystack.contains(&term))
    } else {
        terms.any(|term| haystack.contains(&term))
    }
}

fn collect_text(value: &Value, into: &mut String) {
    match value {
        Value::String(text) => {
            into.push_str(text);
            into.push(' ');
        }
        Value::Array(items) => items.iter().for_each(|v| collect_text(v, into)),
        Value::Object(fields) => fields.values().for_each(|v| collect_text(v, into)),
        _ => {}
    }
}

// ===== Sorting =====

fn sort_field(directive: &Value) -> Option<(String, bool)> {
    match directive {
        Value::String(field) => Some((field.clone(), false)),
        Value::Object(spec) => {
            let (field, order) = spec.iter().next()?;
            let order = order.get("order").unwrap_or(order);
            let descending = order.as_str().is_some_and(|o| o.eq_ignore_ascii_case("desc"));
            Some((field.clone(), descending))
        }
        _ => None,
    }
}

fn compare_by_sort(a: &Value, b: &Value, sort: &[Value]) -> Ordering {
    for (field, descending) in sort.iter().filter_map(sort_field) {
        let left = lookup(a, &field).unwrap_or(&Value::Null);
        let right = lookup(b, &field).unwrap_or(&Value::Null);
        let ordering = compare(left, right).unwrap_or(Ordering::Equal);
        let ordering = if descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

// ===== Aggregations =====

fn aggregate_all(docs: &[&Value], specs: &Map<String, Value>) -> Value {
    Value::Object(
        specs
            .iter()
            .map(|(name, spec)| (name.clone(), aggregate_one(docs, spec)))
            .collect(),
    )
}

fn aggregate_one(docs: &[&Value], spec: &Value) -> Value {
    let scoped: Vec<&Value> = match spec.get("filter") {
        Some(filter) => docs.iter().copied().filter(|d| matches(d, filter)).collect(),
        None => docs.to_vec(),
    };
    let subs = spec
        .get("aggregations")
        .or_else(|| spec.get("aggs"))
        .and_then(Value::as_object);

    if let Some(terms) = spec.get("terms") {
        return terms_aggregation(&scoped, terms, subs);
    }
    for metric in ["sum", "min", "max", "avg", "value_count"] {
        if let Some(field) = spec.pointer(&format!("/{}/field", metric)).and_then(Value::as_str) {
            return json!({ "value": metric_value(&scoped, metric, field) });
        }
    }

    let mut result = Map::new();
    result.insert("doc_count".to_string(), Value::from(scoped.len()));
    if let Some(subs) = subs {
        if let Value::Object(computed) = aggregate_all(&scoped, subs) {
            result.extend(computed);
        }
    }
    Value::Object(result)
}

fn terms_aggregation(docs: &[&Value], terms: &Value, subs: Option<&Map<String, Value>>) -> Value {
    let field = terms.get("field").and_then(Value::as_str).unwrap_or_default();
    let size = as_usize(terms.get("size"), 10);

    let mut groups: Vec<(Value, Vec<&Value>)> = Vec::new();
    for doc in docs {
        for value in field_values(doc, field) {
            match groups.iter().position(|(key, _)| same(key, value)) {
                Some(at) => groups[at].1.push(*doc),
                None => groups.push((value.clone(), vec![*doc])),
            }
        }
    }
    groups.sort_by(|(ka, a), (kb, b)| {
        b.len()
            .cmp(&a.len())
            .then_with(|| compare(ka, kb).unwrap_or(Ordering::Equal))
    });

    let buckets: Vec<Value> = groups
        .into_iter()
        .take(size)
        .map(|(key, members)| {
            let mut bucket = Map::new();
            bucket.insert("key".to_string(), key);
            bucket.insert("doc_count".to_string(), Value::from(members.len()));
            if let Some(subs) = subs {
                if let Value::Object(computed) = aggregate_all(&members, subs) {
                    bucket.extend(computed);
                }
            }
            Value::Object(bucket)
        })
        .collect();
    json!({ "buckets": buckets })
}

fn metric_value(docs: &[&Value], metric: &str, field: &str) -> Value {
    let numbers: Vec<f64> = docs
        .iter()
        .flat_map(|doc| field_values(doc, field))
        .filter_map(Value::as_f64)
        .collect();
    match metric {
        "sum" => json!(numbers.iter().sum::<f64>()),
        "min" => numbers.iter().copied().reduce(f64::min).map_or(Value::Null, |v| json!(v)),
        "max" => numbers.iter().copied().reduce(f64::max).map_or(Value::Null, |v| json!(v)),
        "avg" if numbers.is_empty() => Value::Null,
        "avg" => json!(numbers.iter().sum::<f64>() / numbers.len() as f64),
        _ => json!(numbers.len()),
    }
}

// ===== Fixtures =====

/// 🌱 Five products priced 50..250 in 50 steps: three hats, two shoes.
pub(crate) async fn seeded_products() -> (Arc<Index>, Arc<InMemoryEngine>) {
    let engine = Arc::new(InMemoryEngine::new());
    engine
        .seed(
            "products",
            vec![
                ("p1", json!({"name": "straw hat", "category": "hats", "price": 50})),
                ("p2", json!({"name": "red sneaker", "category": "shoes", "price": 100})),
                ("p3", json!({"name": "felt hat", "category": "hats", "price": 150})),
                ("p4", json!({"name": "leather boot", "category": "shoes", "price": 200})),
                ("p5", json!({"name": "top hat", "category": "hats", "price": 250})),
            ],
        )
        .await;
    let index = Arc::new(Index::new("products", Settings::default()).with_transport(engine.clone()));
    (index, engine)
}

/// 🗄️ A record fetcher that answers in the wrong order on purpose.
pub(crate) struct InMemoryRecords {
    rows: HashMap<String, Value>,
    seen_includes: Mutex<Vec<Vec<String>>>,
}

impl InMemoryRecords {
    pub(crate) async fn from_engine(engine: &InMemoryEngine, index: &str) -> Self {
        Self {
            rows: engine.documents(index).await.into_iter().collect(),
            seen_includes: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn seen_includes(&self) -> Vec<Vec<String>> {
        self.seen_includes.lock().await.clone()
    }
}

#[async_trait]
impl RecordFetcher for InMemoryRecords {
    async fn fetch_records(&self, ids: &[String], includes: &[String]) -> Result<Vec<Record>> {
        self.seen_includes.lock().await.push(includes.to_vec());
        Ok(ids
            .iter()
            .rev()
            .filter_map(|id| {
                self.rows.get(id).map(|data| Record {
                    id: id.clone(),
                    data: data.clone(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_fake_engine_reads_bool_queries() {
        let doc = json!({"state": "open", "price": 120, "tags": ["a", "b"], "owner": {"name": "Ada"}});

        assert!(matches(
            &doc,
            &json!({"bool": {
                "filter": [{"term": {"state": "open"}}, {"range": {"price": {"gte": 100, "lte": 200}}}],
                "must_not": [{"exists": {"field": "deleted_at"}}],
                "must": [{"bool": {"should": [{"terms": {"tags": ["z", "b"]}}, {"term": {"state": "closed"}}]}}]
            }})
        ));
        assert!(!matches(&doc, &json!({"range": {"price": {"gte": 100, "lt": 120}}})));
        assert!(matches(&doc, &json!({"term": {"owner.name": "Ada"}})));
        assert!(matches(
            &doc,
            &json!({"query_string": {"query": "ada OPEN", "default_operator": "AND"}})
        ));
        assert!(!matches(
            &doc,
            &json!({"query_string": {"query": "ada closed", "default_operator": "AND"}})
        ));
        assert!(!matches(&doc, &json!({"match_none": {}})));
    }
}
