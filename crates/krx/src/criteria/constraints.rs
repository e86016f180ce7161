//! 📦 Constraints: the append-only clause store behind every bool section.
//!
//! Three ordered lists of opaque clauses: `must`, `must_not`, `filter`. A criteria owns
//! two of these (query + post filter), an aggregation node owns one. `should` is not a
//! fourth list: it gets wrapped into its own `bool.should` and appended to `must`.
//!
//! ⚠️ Compilation omits empty arms. An empty store compiles to nothing at all, and the
//! caller decides what "nothing" means (no `query` key, `match_all`, no `filter` wrapper).

use serde_json::{Map, Value, json};

use super::filter_value::FilterValue;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub(crate) must: Vec<Value>,
    pub(crate) must_not: Vec<Value>,
    pub(crate) filter: Vec<Value>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty() && self.filter.is_empty()
    }

    pub fn must(&self) -> &[Value] {
        &self.must
    }

    pub fn must_not(&self) -> &[Value] {
        &self.must_not
    }

    pub fn filter(&self) -> &[Value] {
        &self.filter
    }

    /// 🎯 One field/value pair of `where_`.
    pub(crate) fn add_where(&mut self, field: &str, value: FilterValue) {
        match value {
            FilterValue::Array(items) => self.filter.push(json!({ "terms": { field: items } })),
            FilterValue::Range { min, max } => {
                self.filter.push(range_clause(field, min, "gte", max, "lte"))
            }
            FilterValue::Null => self.must_not.push(exists_clause(field)),
            FilterValue::Scalar(value) => self.filter.push(json!({ "term": { field: value } })),
        }
    }

    /// 🙅 One field/value pair of `where_not`. Note the exclusive upper bound on ranges.
    pub(crate) fn add_where_not(&mut self, field: &str, value: FilterValue) {
        match value {
            FilterValue::Array(items) => {
                self.must_not.push(json!({ "terms": { field: items } }))
            }
            FilterValue::Range { min, max } => {
                self.must_not.push(range_clause(field, min, "gte", max, "lt"))
            }
            FilterValue::Null => self.filter.push(exists_clause(field)),
            FilterValue::Scalar(value) => {
                self.must_not.push(json!({ "term": { field: value } }))
            }
        }
    }

    /// 🔀 Wrap a should-list plus bool options into a single clause appended to `must`.
    pub(crate) fn add_should(&mut self, clauses: Vec<Value>, options: Value) {
        let mut bool_body = Map::new();
        bool_body.insert("should".to_string(), Value::Array(clauses));
        if let Value::Object(options) = options {
            bool_body.extend(options);
        }
        self.must.push(json!({ "bool": bool_body }));
    }

    /// 🏗️ `{"bool": {...}}` with only the non-empty arms, or None when there is nothing.
    pub fn to_bool(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        let mut bool_body = Map::new();
        if !self.must.is_empty() {
            bool_body.insert("must".to_string(), Value::Array(self.must.clone()));
        }
        if !self.must_not.is_empty() {
            bool_body.insert("must_not".to_string(), Value::Array(self.must_not.clone()));
        }
        if !self.filter.is_empty() {
            bool_body.insert("filter".to_string(), Value::Array(self.filter.clone()));
        }
        Some(json!({ "bool": bool_body }))
    }

    /// 🔗 Concatenate, self first.
    pub(crate) fn merged(&self, other: &Constraints) -> Constraints {
        let concat = |a: &[Value], b: &[Value]| a.iter().chain(b).cloned().collect::<Vec<_>>();
        Constraints {
            must: concat(&self.must, &other.must),
            must_not: concat(&self.must_not, &other.must_not),
            filter: concat(&self.filter, &other.filter),
        }
    }
}

pub(crate) fn exists_clause(field: &str) -> Value {
    json!({ "exists": { "field": field } })
}

fn range_clause(
    field: &str,
    min: Option<Value>,
    min_op: &str,
    max: Option<Value>,
    max_op: &str,
) -> Value {
    let mut bounds = Map::new();
    if let Some(min) = min {
        bounds.insert(min_op.to_string(), min);
    }
    if let Some(max) = max {
        bounds.insert(max_op.to_string(), max);
    }
    json!({ "range": { field: bounds } })
}
