//! Wire-level shapes assumed of the REST backend: a list response is either
//! `{"results": [...]}` or a bare JSON array; a detail response is a bare
//! object.

use serde::Deserialize;
use serde_json::Value;
use tierdata_core::{SourceError, WireObject};

/// A list response, accepting either of the two shapes a REST backend might
/// use: `{"results": [...]}` (preferred) or a bare JSON array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope {
    Wrapped { results: Vec<WireObject> },
    Bare(Vec<WireObject>),
}

impl ListEnvelope {
    /// Parses a list response body, regardless of which of the two accepted
    /// shapes it used.
    pub fn parse(body: &[u8]) -> Result<Vec<WireObject>, SourceError> {
        let envelope: ListEnvelope = serde_json::from_slice(body)
            .map_err(|e| SourceError::server_error_with_source("failed to decode list response", e))?;
        Ok(match envelope {
            ListEnvelope::Wrapped { results } => results,
            ListEnvelope::Bare(items) => items,
        })
    }

    /// Parses a single-entity detail response body (a bare JSON object).
    pub fn parse_detail(body: &[u8]) -> Result<WireObject, SourceError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| SourceError::server_error_with_source("failed to decode response", e))?;
        if value.is_object() {
            Ok(value)
        } else {
            Err(SourceError::server_error("expected a JSON object in detail response"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_results() {
        let body = br#"{"results": [{"id": "1"}, {"id": "2"}]}"#;
        let items = ListEnvelope::parse(body).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn parses_bare_array() {
        let body = br#"[{"id": "1"}]"#;
        let items = ListEnvelope::parse(body).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn parse_detail_rejects_array() {
        let body = br#"[{"id": "1"}]"#;
        assert!(ListEnvelope::parse_detail(body).is_err());
    }
}
