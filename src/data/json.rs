//! Path-aware JSON decoding for request payloads that are validated row by row.

use serde::de::DeserializeOwned;

/// Decode `value`, describing failures as `field 'path': expected X, got Y`.
pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, String> {
    serde_path_to_error::deserialize(value).map_err(|err| {
        let path = err.path().to_string();
        let detail = parse_type_mismatch(&err.inner().to_string());
        if path.is_empty() || path == "." {
            detail
        } else {
            format!("field '{path}': {detail}")
        }
    })
}

/// Extract type mismatch information from a serde error message.
///
/// Turns "invalid type: null, expected a string" into "expected a string, got null".
/// Other messages are returned unchanged, minus any location suffix.
fn parse_type_mismatch(error_msg: &str) -> String {
    let error_msg = error_msg
        .split(" at line ")
        .next()
        .unwrap_or(error_msg)
        .trim();

    if let Some(invalid_start) = error_msg.find("invalid type: ") {
        let after_prefix = &error_msg[invalid_start + "invalid type: ".len()..];

        if let Some(comma_pos) = after_prefix.find(", expected ") {
            let actual_type = &after_prefix[..comma_pos];
            let expected_type = &after_prefix[comma_pos + ", expected ".len()..];
            return format!("expected {expected_type}, got {actual_type}");
        }
    }

    error_msg.to_string()
}
