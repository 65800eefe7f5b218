//! Firestore REST API wire types and the JSON bridge.
//!
//! Model types round-trip through `serde_json::Value`, so the bridge here
//! is the only place that knows Firestore's typed-value encoding.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Firestore document value types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String), // Firestore sends integers as strings
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapValue {
    pub fields: Option<HashMap<String, Value>>,
}

/// Firestore document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    pub name: Option<String>,
    /// Document fields
    pub fields: Option<HashMap<String, Value>>,
    /// Create time
    pub create_time: Option<String>,
    /// Update time, used as the optimistic-locking token
    pub update_time: Option<String>,
}

impl Document {
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }
}

// ============================================================================
// Structured queries (user index on the jobs table)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub structured_query: StructuredQuery,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub from: Vec<CollectionSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#where: Option<Filter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSelector {
    pub collection_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    FieldFilter(FieldFilter),
    CompositeFilter(CompositeFilter),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldFilter {
    pub field: FieldReference,
    pub op: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeFilter {
    pub op: String,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    pub field_path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub field: FieldReference,
    pub direction: String,
}

/// One element of a `runQuery` response stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponseItem {
    pub document: Option<Document>,
    pub read_time: Option<String>,
}

impl Filter {
    /// Equality filter on a string field.
    pub fn field_eq(field_path: &str, value: impl Into<String>) -> Self {
        Filter::FieldFilter(FieldFilter {
            field: FieldReference {
                field_path: field_path.to_string(),
            },
            op: "EQUAL".to_string(),
            value: Value::StringValue(value.into()),
        })
    }

    /// AND of several filters.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::CompositeFilter(CompositeFilter {
            op: "AND".to_string(),
            filters,
        })
    }
}

// ============================================================================
// JSON bridge
// ============================================================================

/// Convert a JSON value to a Firestore value.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::NullValue(()),
        serde_json::Value::Bool(b) => Value::BooleanValue(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::IntegerValue(i.to_string())
            } else {
                Value::DoubleValue(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::StringValue(s.clone()),
        serde_json::Value::Array(items) => Value::ArrayValue(ArrayValue {
            values: Some(items.iter().map(json_to_value).collect()),
        }),
        serde_json::Value::Object(map) => Value::MapValue(MapValue {
            fields: Some(
                map.iter()
                    .map(|(k, v)| (k.clone(), json_to_value(v)))
                    .collect(),
            ),
        }),
    }
}

/// Convert a Firestore value back to JSON.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::NullValue(()) => serde_json::Value::Null,
        Value::BooleanValue(b) => serde_json::Value::Bool(*b),
        Value::IntegerValue(s) => s
            .parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::Null),
        Value::DoubleValue(d) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::TimestampValue(s) | Value::StringValue(s) => {
            serde_json::Value::String(s.clone())
        }
        Value::ArrayValue(arr) => serde_json::Value::Array(
            arr.values
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(value_to_json)
                .collect(),
        ),
        Value::MapValue(map) => serde_json::Value::Object(
            map.fields
                .as_ref()
                .map(|fields| {
                    fields
                        .iter()
                        .map(|(k, v)| (k.clone(), value_to_json(v)))
                        .collect()
                })
                .unwrap_or_default(),
        ),
    }
}

/// Encode a serializable model as Firestore document fields.
pub fn to_fields<T: Serialize>(model: &T) -> Result<HashMap<String, Value>, serde_json::Error> {
    let json = serde_json::to_value(model)?;
    match json {
        serde_json::Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), json_to_value(v)))
            .collect()),
        _ => Ok(HashMap::new()),
    }
}

/// Decode Firestore document fields into a model.
pub fn from_fields<T: for<'de> Deserialize<'de>>(
    fields: &HashMap<String, Value>,
) -> Result<T, serde_json::Error> {
    let map: serde_json::Map<String, serde_json::Value> = fields
        .iter()
        .map(|(k, v)| (k.clone(), value_to_json(v)))
        .collect();
    serde_json::from_value(serde_json::Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
        score: f64,
        tags: Vec<String>,
        active: bool,
        note: Option<String>,
    }

    #[test]
    fn test_model_roundtrip() {
        let sample = Sample {
            name: "job".to_string(),
            count: 3,
            score: 0.5,
            tags: vec!["a".to_string(), "b".to_string()],
            active: true,
            note: None,
        };
        let fields = to_fields(&sample).unwrap();
        let back: Sample = from_fields(&fields).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn test_integer_encoding_is_string() {
        let json = serde_json::json!(42);
        match json_to_value(&json) {
            Value::IntegerValue(s) => assert_eq!(s, "42"),
            other => panic!("expected IntegerValue, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_map_roundtrip() {
        let json = serde_json::json!({
            "outer": { "inner": [1, 2, 3], "flag": false }
        });
        let value = json_to_value(&json);
        assert_eq!(value_to_json(&value), json);
    }

    #[test]
    fn test_timestamp_value_decodes_to_string() {
        let value = Value::TimestampValue("2026-08-01T00:00:00Z".to_string());
        assert_eq!(
            value_to_json(&value),
            serde_json::Value::String("2026-08-01T00:00:00Z".to_string())
        );
    }
}
