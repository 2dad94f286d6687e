//! Queue message schemas and validation.
//!
//! Bodies arrive as loose JSON. Each schema deserializes, then normalises
//! and checks its fields; any failure is an `Error::InvalidMessage`, which
//! stages report instead of retrying.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::Error;

/// A schema-checked message body.
pub trait MessageBody: DeserializeOwned + Serialize + Sized {
    /// Normalise fields and reject payloads that cannot be processed.
    fn validate(self) -> Result<Self, Error>;
}

/// Deserialize and validate a raw message body.
pub fn parse<T: MessageBody>(body: &serde_json::Value) -> Result<T, Error> {
    let message = T::deserialize(body).map_err(|e| Error::InvalidMessage(e.to_string()))?;
    message.validate()
}

/// Tags observed on an origin response for a cached URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMessage {
    pub url: String,
    pub tags: Vec<String>,
    pub zone: String,
}

/// Request to evict every URL carrying `tag`, optionally within one zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeTagMessage {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

/// Request to evict one URL from its zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeUrlMessage {
    pub url: String,
    pub zone: String,
}

impl MessageBody for CaptureMessage {
    fn validate(self) -> Result<Self, Error> {
        let url = validate_url(&self.url)?;
        let zone = required("zone", &self.zone)?;
        let tags = self
            .tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self { url, tags, zone })
    }
}

impl MessageBody for PurgeTagMessage {
    fn validate(self) -> Result<Self, Error> {
        let tag = required("tag", &self.tag)?;
        let zone = self
            .zone
            .as_deref()
            .map(str::trim)
            .filter(|zone| !zone.is_empty())
            .map(str::to_string);

        Ok(Self { tag, zone })
    }
}

impl MessageBody for PurgeUrlMessage {
    fn validate(self) -> Result<Self, Error> {
        let url = validate_url(&self.url)?;
        let zone = required("zone", &self.zone)?;

        Ok(Self { url, zone })
    }
}

fn required(field: &str, value: &str) -> Result<String, Error> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidMessage(format!("`{field}` must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Check that `input` is an absolute http(s) URL with a host.
///
/// Returns the trimmed input unchanged; the index keys on the exact string
/// the edge observed, not on the parser's re-serialisation.
fn validate_url(input: &str) -> Result<String, Error> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidMessage("`url` must not be empty".into()));
    }

    let parsed = url::Url::parse(trimmed).map_err(|e| Error::InvalidMessage(format!("invalid url {trimmed:?}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(Error::InvalidMessage(format!("unsupported url scheme: {scheme}"))),
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidMessage(format!("url has no host: {trimmed}")));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_capture() {
        let body = json!({"url": "https://example.com", "tags": [" a ", "b", ""], "zone": "example.com"});
        let msg: CaptureMessage = parse(&body).unwrap();
        assert_eq!(msg.url, "https://example.com");
        assert_eq!(msg.tags, vec!["a", "b"]);
        assert_eq!(msg.zone, "example.com");
    }

    #[test]
    fn test_parse_capture_missing_zone() {
        let body = json!({"url": "https://example.com", "tags": ["a"]});
        let result = parse::<CaptureMessage>(&body);
        assert!(matches!(result, Err(Error::InvalidMessage(msg)) if msg.contains("zone")));
    }

    #[test]
    fn test_parse_capture_empty_zone() {
        let body = json!({"url": "https://example.com", "tags": ["a"], "zone": "  "});
        assert!(parse::<CaptureMessage>(&body).is_err());
    }

    #[test]
    fn test_parse_capture_malformed_url() {
        let body = json!({"url": "not a url", "tags": ["a"], "zone": "example.com"});
        assert!(matches!(parse::<CaptureMessage>(&body), Err(Error::InvalidMessage(_))));
    }

    #[test]
    fn test_parse_rejects_non_http_scheme() {
        let body = json!({"url": "file:///etc/passwd", "zone": "example.com"});
        let result = parse::<PurgeUrlMessage>(&body);
        assert!(matches!(result, Err(Error::InvalidMessage(msg)) if msg.contains("scheme")));
    }

    #[test]
    fn test_parse_purge_tag_without_zone() {
        let msg: PurgeTagMessage = parse(&json!({"tag": "product-1"})).unwrap();
        assert_eq!(msg.tag, "product-1");
        assert!(msg.zone.is_none());
    }

    #[test]
    fn test_parse_purge_tag_blank_zone_means_all_zones() {
        let msg: PurgeTagMessage = parse(&json!({"tag": "product-1", "zone": ""})).unwrap();
        assert!(msg.zone.is_none());
    }

    #[test]
    fn test_parse_purge_tag_empty_tag() {
        assert!(parse::<PurgeTagMessage>(&json!({"tag": " "})).is_err());
    }

    #[test]
    fn test_parse_wrong_shape() {
        assert!(parse::<PurgeUrlMessage>(&json!("https://example.com")).is_err());
        assert!(parse::<PurgeUrlMessage>(&json!({"url": 42, "zone": "example.com"})).is_err());
    }

    #[test]
    fn test_purge_url_serializes_to_wire_shape() {
        let msg = PurgeUrlMessage { url: "https://example.com".into(), zone: "example.com".into() };
        assert_eq!(serde_json::to_value(&msg).unwrap(), json!({"url": "https://example.com", "zone": "example.com"}));
    }
}
