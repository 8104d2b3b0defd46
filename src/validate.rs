//! Shape checks for class names and upstream payloads.
//!
//! Every function here is a pure predicate: no I/O, no retained state.

use serde_json::Value;

/// Returns true iff `token` is exactly two ASCII digits followed by one
/// uppercase ASCII letter (e.g. `01A`).
pub fn is_valid_class_name(token: &str) -> bool {
    match token.as_bytes() {
        [d1, d2, letter] => {
            d1.is_ascii_digit() && d2.is_ascii_digit() && letter.is_ascii_uppercase()
        }
        _ => false,
    }
}

/// Returns true iff the list payload is a JSON array (possibly empty).
pub fn is_valid_list_response(payload: &Value) -> bool {
    payload.is_array()
}

/// Returns true iff the detail payload carries a non-negative integer `count`.
#[allow(dead_code)] // Predicate form of `extract_count`
pub fn is_valid_detail_response(payload: &Value) -> bool {
    extract_count(payload).is_some()
}

/// Extract the `count` of a detail payload, or `None` if the payload is
/// not a valid detail response.
pub fn extract_count(payload: &Value) -> Option<u64> {
    payload.get("count").and_then(Value::as_u64)
}
