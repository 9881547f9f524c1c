//! SQLite helper utilities for type conversion
//!
//! SQLite has no native array or timestamp types. Tags and folder lists are
//! stored as JSON strings and timestamps as RFC3339 text.

use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};

// ============================================================================
// Array/Vec Helpers (stored as JSON strings in SQLite)
// ============================================================================

/// Serialize a Vec to a JSON string for SQLite storage
#[inline]
pub fn vec_to_json<T: Serialize>(v: &[T]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

/// Deserialize a JSON string from SQLite to a Vec
#[inline]
pub fn json_to_vec<T: DeserializeOwned>(s: &str) -> Vec<T> {
    serde_json::from_str(s).unwrap_or_default()
}

// ============================================================================
// Timestamp Helpers (stored as ISO8601 TEXT in SQLite)
// ============================================================================

/// Get current UTC timestamp as ISO8601 string for SQLite
#[inline]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

/// Order a folder pair lexicographically so `(a, b)` and `(b, a)` share a key.
pub fn sorted_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_json_roundtrip() {
        let v = vec!["action".to_string(), "seinen".to_string()];
        let parsed: Vec<String> = json_to_vec(&vec_to_json(&v));
        assert_eq!(v, parsed);
    }

    #[test]
    fn test_invalid_json_is_empty() {
        let parsed: Vec<String> = json_to_vec("not json");
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_now_is_rfc3339() {
        let now = now_iso8601();
        assert!(chrono::DateTime::parse_from_rfc3339(&now).is_ok());
    }

    #[test]
    fn test_sorted_pair() {
        assert_eq!(sorted_pair("/b", "/a"), ("/a", "/b"));
        assert_eq!(sorted_pair("/a", "/b"), ("/a", "/b"));
    }
}
