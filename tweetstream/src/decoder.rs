//! Pluggable JSON decoding for stream lines.

use std::fmt;

use serde_json::Value;

/// A line could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(pub String);

/// Turns one stream line into a JSON value tree.
///
/// The session treats the result as opaque; classification only looks at
/// top-level keys.
pub trait MessageDecoder: Send + Sync + fmt::Debug {
    fn decode(&self, line: &str) -> Result<Value, DecodeError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// The default decoder, backed by `serde_json`
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeJsonDecoder;

impl MessageDecoder for SerdeJsonDecoder {
    fn decode(&self, line: &str) -> Result<Value, DecodeError> {
        serde_json::from_str(line).map_err(|e| DecodeError(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "serde_json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_object() {
        let value = SerdeJsonDecoder.decode(r#"{"limit":{"track":3}}"#).unwrap();
        assert_eq!(value["limit"]["track"], 3);
    }

    #[test]
    fn test_rejects_truncated_line() {
        assert!(SerdeJsonDecoder.decode(r#"{"text":"hel"#).is_err());
    }
}
