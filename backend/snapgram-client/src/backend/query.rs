//! List query expressions
//!
//! Serialized as `{"method", "attribute", "values"}` objects, one per
//! `queries[]` parameter.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Attribute equals any of the values
    Equal { attribute: String, values: Vec<Value> },
    /// Newest first by a timestamp attribute
    OrderDesc(String),
    Limit(u32),
    /// Documents after the one with this id in the current ordering
    CursorAfter(String),
    /// Full-text search on one attribute
    Search { attribute: String, term: String },
}

#[derive(Serialize)]
struct WireQuery<'a> {
    method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    attribute: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    values: Vec<Value>,
}

impl Query {
    pub fn equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Equal {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    pub fn order_desc(attribute: impl Into<String>) -> Self {
        Query::OrderDesc(attribute.into())
    }

    pub fn limit(limit: u32) -> Self {
        Query::Limit(limit)
    }

    pub fn cursor_after(id: impl Into<String>) -> Self {
        Query::CursorAfter(id.into())
    }

    pub fn search(attribute: impl Into<String>, term: impl Into<String>) -> Self {
        Query::Search {
            attribute: attribute.into(),
            term: term.into(),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Query::Equal { .. } => "equal",
            Query::OrderDesc(_) => "orderDesc",
            Query::Limit(_) => "limit",
            Query::CursorAfter(_) => "cursorAfter",
            Query::Search { .. } => "search",
        }
    }

    fn wire(&self) -> WireQuery<'_> {
        let (attribute, values) = match self {
            Query::Equal { attribute, values } => (Some(attribute.as_str()), values.clone()),
            Query::OrderDesc(attribute) => (Some(attribute.as_str()), Vec::new()),
            Query::Limit(limit) => (None, vec![Value::from(*limit)]),
            Query::CursorAfter(id) => (None, vec![Value::from(id.as_str())]),
            Query::Search { attribute, term } => {
                (Some(attribute.as_str()), vec![Value::from(term.as_str())])
            }
        };
        WireQuery {
            method: self.method(),
            attribute,
            values,
        }
    }

    /// Encoded form sent as a `queries[]` parameter
    pub fn to_param(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.wire())
    }
}

impl Serialize for Query {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.wire().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        assert_eq!(
            serde_json::to_value(Query::equal("creator", "u1")).unwrap(),
            json!({"method": "equal", "attribute": "creator", "values": ["u1"]})
        );
        assert_eq!(
            serde_json::to_value(Query::order_desc("$createdAt")).unwrap(),
            json!({"method": "orderDesc", "attribute": "$createdAt"})
        );
        assert_eq!(
            serde_json::to_value(Query::limit(10)).unwrap(),
            json!({"method": "limit", "values": [10]})
        );
        assert_eq!(
            serde_json::to_value(Query::cursor_after("p3")).unwrap(),
            json!({"method": "cursorAfter", "values": ["p3"]})
        );
        assert_eq!(
            serde_json::to_value(Query::search("caption", "sun")).unwrap(),
            json!({"method": "search", "attribute": "caption", "values": ["sun"]})
        );
    }

    #[test]
    fn test_to_param() {
        let param = Query::limit(3).to_param().unwrap();
        assert_eq!(param, r#"{"method":"limit","values":[3]}"#);
    }
}
