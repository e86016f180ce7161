//! 🎯 FilterValue: what `where_` is allowed to be handed, spelled out as an enum.
//!
//! One entry point, four shapes. The shape decides the clause:
//!
//! | shape  | `where_`                      | `where_not`                        |
//! |--------|-------------------------------|------------------------------------|
//! | Scalar | filter `term`                 | must_not `term`                    |
//! | Array  | filter `terms`                | must_not `terms`                   |
//! | Range  | filter `range` (`gte`/`lte`)  | must_not `range` (`gte`/`lt`)      |
//! | Null   | must_not `exists`             | filter `exists`                    |
//!
//! The `From` impls do the shape detection at the call site, so
//! `where_([("price", 100..=200)])` reads like it should.

use std::ops::{RangeFrom, RangeInclusive, RangeToInclusive};

use serde_json::Value;

/// 📦 A value handed to `where_` / `where_not`.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// exact match against one value
    Scalar(Value),
    /// match any of these
    Array(Vec<Value>),
    /// inclusive bounds; a missing end is open
    Range { min: Option<Value>, max: Option<Value> },
    /// the field must be absent
    Null,
}

impl FilterValue {
    pub fn range(min: impl Into<Value>, max: impl Into<Value>) -> Self {
        FilterValue::Range {
            min: Some(min.into()),
            max: Some(max.into()),
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(value: $ty) -> Self {
                    FilterValue::Scalar(Value::from(value))
                }
            }
        )*
    };
}

scalar_from!(&str, String, bool, i32, i64, u32, u64, f64);

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FilterValue::Null,
            Value::Array(items) => FilterValue::Array(items),
            other => FilterValue::Scalar(other),
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for FilterValue {
    fn from(items: Vec<T>) -> Self {
        FilterValue::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<RangeInclusive<T>> for FilterValue {
    fn from(range: RangeInclusive<T>) -> Self {
        let (min, max) = range.into_inner();
        FilterValue::Range {
            min: Some(min.into()),
            max: Some(max.into()),
        }
    }
}

impl<T: Into<Value>> From<RangeFrom<T>> for FilterValue {
    fn from(range: RangeFrom<T>) -> Self {
        FilterValue::Range {
            min: Some(range.start.into()),
            max: None,
        }
    }
}

impl<T: Into<Value>> From<RangeToInclusive<T>> for FilterValue {
    fn from(range: RangeToInclusive<T>) -> Self {
        FilterValue::Range {
            min: None,
            max: Some(range.end.into()),
        }
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FilterValue::Null, Into::into)
    }
}
