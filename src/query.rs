//! Query predicates evaluated against stored records.

use crate::record::Record;
use serde_json::Value;

/// A predicate over a record's top-level fields.
///
/// # Example
///
/// ```
/// use bizops_kit::query::Filter;
///
/// let by_customer = Filter::eq("customerId", "c1");
/// let by_name = Filter::contains_ignore_case("name", "sha");
/// let _both = Filter::and(vec![by_customer, by_name]);
/// ```
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Filter {
    /// Matches every record.
    #[default]
    All,
    /// Field equals the given JSON value.
    Eq(String, Value),
    /// String field contains the needle, case-insensitively.
    ContainsIgnoreCase(String, String),
    /// All sub-filters match.
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn contains_ignore_case(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::ContainsIgnoreCase(field.into(), needle.into().to_lowercase())
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    /// Evaluate against a record. Missing fields never match.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, expected) => record.get(field) == Some(expected),
            Filter::ContainsIgnoreCase(field, needle) => record
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase().contains(needle.as_str())),
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_eq_filter() {
        let r = record(json!({ "customerId": "c1", "total": 10 }));
        assert!(Filter::eq("customerId", "c1").matches(&r));
        assert!(!Filter::eq("customerId", "c2").matches(&r));
        assert!(!Filter::eq("missing", "c1").matches(&r));
    }

    #[test]
    fn test_contains_ignore_case() {
        let r = record(json!({ "name": "Asha Traders" }));
        assert!(Filter::contains_ignore_case("name", "TRADERS").matches(&r));
        assert!(!Filter::contains_ignore_case("name", "ravi").matches(&r));
        assert!(!Filter::contains_ignore_case("total", "1").matches(&record(json!({ "total": 1 }))));
    }

    #[test]
    fn test_and_and_all() {
        let r = record(json!({ "a": 1, "b": "x" }));
        assert!(Filter::All.matches(&r));
        assert!(Filter::and(vec![Filter::eq("a", 1), Filter::eq("b", "x")]).matches(&r));
        assert!(!Filter::and(vec![Filter::eq("a", 1), Filter::eq("b", "y")]).matches(&r));
    }
}
