//! Result tree and response envelope.

use crate::error::FieldError;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// A node of the result tree, mirroring the shape of the query.
///
/// `Null` is an explicit null and is distinct from a key being absent from
/// an `Object`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResultNode {
    #[default]
    Null,
    Scalar(Value),
    List(Vec<ResultNode>),
    Object(IndexMap<String, ResultNode>),
}

impl ResultNode {
    /// Returns true for an explicit null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Gets a field of an object node.
    pub fn get(&self, key: &str) -> Option<&ResultNode> {
        match self {
            Self::Object(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Gets an element of a list node.
    pub fn index(&self, index: usize) -> Option<&ResultNode> {
        match self {
            Self::List(items) => items.get(index),
            _ => None,
        }
    }

    /// Converts the tree into plain JSON.
    pub fn into_json(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Scalar(value) => value,
            Self::List(items) => Value::Array(items.into_iter().map(Self::into_json).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, v.into_json()))
                    .collect(),
            ),
        }
    }
}

impl Serialize for ResultNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Scalar(value) => value.serialize(serializer),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// The outcome of one execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Response {
    /// The result tree; `Null` when nothing could be produced.
    pub data: ResultNode,
    /// Errors in the order they were recorded.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl Response {
    /// Creates a response.
    pub fn new(data: ResultNode, errors: Vec<FieldError>) -> Self {
        Self { data, errors }
    }

    /// Creates a response without data.
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            data: ResultNode::Null,
            errors,
        }
    }

    /// Creates a response carrying a single error.
    pub fn error(error: FieldError) -> Self {
        Self::from_errors(vec![error])
    }

    /// Returns true if the response has errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Converts to the wire shape: `data` always, `errors` when non-empty.
    pub fn into_json(self) -> Value {
        let mut body = serde_json::Map::new();
        body.insert("data".into(), self.data.into_json());
        if !self.errors.is_empty() {
            let errors = self
                .errors
                .iter()
                .filter_map(|e| serde_json::to_value(e).ok())
                .collect();
            body.insert("errors".into(), Value::Array(errors));
        }
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_node_json() {
        let node = ResultNode::Object(IndexMap::from([
            ("name".to_string(), ResultNode::Scalar(json!("J.K. Rowling"))),
            (
                "books".to_string(),
                ResultNode::List(vec![ResultNode::Null]),
            ),
        ]));

        assert_eq!(node.get("books").and_then(|b| b.index(0)), Some(&ResultNode::Null));
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({"name": "J.K. Rowling", "books": [null]})
        );
        assert_eq!(node.into_json(), json!({"name": "J.K. Rowling", "books": [null]}));
    }

    #[test]
    fn test_response_wire_shape() {
        let ok = Response::new(ResultNode::Scalar(json!(1)), Vec::new());
        assert_eq!(ok.into_json(), json!({"data": 1}));

        let failed = Response::error(FieldError::validation("bad"));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["data"], Value::Null);
        assert_eq!(json["errors"][0]["kind"], "ValidationError");
        assert_eq!(failed.into_json(), json);
    }
}
