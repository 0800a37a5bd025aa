use anyhow::Result;
use serde_json::Value;

/// Parses an optional JSON filter string.
pub fn parse(query_json: Option<&str>) -> Result<Option<Value>> {
    match query_json {
        Some(raw) => {
            let value: Value = serde_json::from_str(raw)
                .map_err(|e| anyhow::anyhow!("query is not valid json: {}", e))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Evaluates a filter against one document.
///
/// Supported forms:
/// - `{"field": value, ...}`: every named field must equal the given value;
///   `"id"` matches the document id.
/// - `{"$and": [filter, ...]}`: every sub-filter must match.
///
/// An empty or null filter matches everything.
pub fn matches(filter: &Value, id: &str, data: &Value) -> bool {
    match filter {
        Value::Null => true,
        Value::Object(fields) => fields.iter().all(|(key, expected)| {
            if key == "$and" {
                match expected {
                    Value::Array(subs) => subs.iter().all(|sub| matches(sub, id, data)),
                    _ => false,
                }
            } else if key == "id" {
                expected.as_str() == Some(id)
            } else {
                data.get(key) == Some(expected)
            }
        }),
        _ => false,
    }
}
