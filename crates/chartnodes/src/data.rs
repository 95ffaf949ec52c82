//! Typed access to validated node data at executor creation.

use chartcore::NodeError;
use serde_json::Value as Json;

fn invalid(field: &str, expected: &str) -> NodeError {
    NodeError::InvalidData {
        field: field.to_string(),
        message: format!("expected {}", expected),
    }
}

pub(crate) fn str_field<'a>(data: &'a Json, field: &str) -> Result<&'a str, NodeError> {
    data.get(field)
        .and_then(Json::as_str)
        .ok_or_else(|| invalid(field, "a string"))
}

pub(crate) fn f64_field(data: &Json, field: &str) -> Result<f64, NodeError> {
    data.get(field)
        .and_then(Json::as_f64)
        .ok_or_else(|| invalid(field, "a number"))
}

pub(crate) fn bool_field(data: &Json, field: &str) -> Result<bool, NodeError> {
    data.get(field)
        .and_then(Json::as_bool)
        .ok_or_else(|| invalid(field, "a boolean"))
}
