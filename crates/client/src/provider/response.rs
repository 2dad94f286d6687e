//! Provider API request and response types.

use serde::{Deserialize, Serialize};

/// Standard response envelope wrapping every management API result.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
}

/// Error or notice entry inside an envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

/// A zone as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

/// Body of a purge-by-URL call.
#[derive(Debug, Serialize)]
pub struct PurgeRequest<'a> {
    pub files: &'a [String],
}

impl<T> Envelope<T> {
    /// Join the envelope's error messages into one line.
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "request was not successful".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zone_list() {
        let json = r#"{
            "success": true,
            "errors": [],
            "messages": [],
            "result": [{"id": "023e105f4ecef8ad9ca31a8372d0c353", "name": "example.com", "status": "active"}],
            "result_info": {"page": 1, "per_page": 20, "count": 1, "total_count": 1}
        }"#;

        let envelope: Envelope<Vec<Zone>> = serde_json::from_str(json).unwrap();
        assert!(envelope.success);
        let zones = envelope.result.unwrap();
        assert_eq!(zones[0].id, "023e105f4ecef8ad9ca31a8372d0c353");
        assert_eq!(zones[0].name, "example.com");
    }

    #[test]
    fn test_parse_failure_envelope() {
        let json = r#"{"success": false, "errors": [{"code": 1012, "message": "Request must contain one of files"}], "result": null}"#;

        let envelope: Envelope<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert!(!envelope.success);
        assert!(envelope.result.is_none());
        assert_eq!(envelope.error_summary(), "1012: Request must contain one of files");
    }

    #[test]
    fn test_purge_request_shape() {
        let files = vec!["https://example.com/a".to_string()];
        let body = serde_json::to_value(PurgeRequest { files: &files }).unwrap();
        assert_eq!(body, serde_json::json!({"files": ["https://example.com/a"]}));
    }
}
