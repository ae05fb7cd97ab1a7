//! JSON aliases shared by the request and response types.

use serde_json_bytes::ByteString;
use serde_json_bytes::Map;

/// A JSON value, backed by `bytes` so that cloning response data stays cheap.
pub type Value = serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// Returns `true` if the segment is a non-empty run of ASCII digits.
///
/// Such a segment addresses a list element rather than an object key.
pub(crate) fn is_index_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_recognises_index_segments() {
        assert!(is_index_segment("0"));
        assert!(is_index_segment("042"));
        assert!(!is_index_segment(""));
        assert!(!is_index_segment("-1"));
        assert!(!is_index_segment("file0"));
    }
}
