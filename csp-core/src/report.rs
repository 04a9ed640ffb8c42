//! CSP violation records and the payloads browsers post them in

use crate::error::{CspError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// One reported CSP violation
///
/// Keys follow the browser report format, so ledger entries that use the
/// same key names decode as records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ViolationRecord {
    pub document_uri: String,
    pub referrer: String,
    pub blocked_uri: String,
    pub violated_directive: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_directive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_policy: Option<String>,
    pub status_code: u32,
    pub source_file: String,
    pub line_number: u32,
    pub column_number: u32,
    /// Set by the collector when the report arrives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

impl ViolationRecord {
    /// Host of the blocked resource
    ///
    /// Browsers report keywords such as `inline` or `eval` in place of a URL;
    /// those have no host and yield an empty string. Anything else that fails
    /// to parse is an error.
    pub fn blocked_host(&self) -> std::result::Result<String, url::ParseError> {
        if self.blocked_uri.is_empty() {
            return Ok(String::new());
        }

        match Url::parse(&self.blocked_uri) {
            Ok(url) => Ok(url.host_str().unwrap_or_default().to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(String::new()),
            Err(e) => Err(e),
        }
    }
}

const NESTED_KEY: &str = "csp-report";
const RECEIVED_AT_KEY: &str = "received-at";

/// Body of a `POST /csp-report` request
///
/// Browsers nest the record under `csp-report`; some older senders post the
/// record fields at the top level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportPayload {
    Nested(ViolationRecord),
    Flat(ViolationRecord),
}

impl ReportPayload {
    /// Decode a raw request body
    ///
    /// A sender-supplied `received-at` is discarded; the collector stamps
    /// the receive time itself.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut value: serde_json::Value =
            serde_json::from_slice(body).map_err(CspError::MalformedReport)?;

        let nested = value
            .as_object_mut()
            .and_then(|object| object.remove(NESTED_KEY));
        let (is_nested, mut fields) = match nested {
            Some(inner) => (true, inner),
            None => (false, value),
        };

        if let Some(object) = fields.as_object_mut() {
            object.remove(RECEIVED_AT_KEY);
        }

        let record = serde_json::from_value(fields).map_err(CspError::MalformedReport)?;
        Ok(if is_nested {
            ReportPayload::Nested(record)
        } else {
            ReportPayload::Flat(record)
        })
    }

    pub fn into_record(self) -> ViolationRecord {
        match self {
            ReportPayload::Nested(report) | ReportPayload::Flat(report) => report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_report() {
        let body = br#"{
            "csp-report": {
                "document-uri": "https://sub.example.com/page",
                "referrer": "https://google.com/",
                "blocked-uri": "https://cdn.bad.com/x.js",
                "violated-directive": "script-src-elem",
                "effective-directive": "script-src-elem",
                "original-policy": "default-src 'self'; report-uri /csp-report",
                "status-code": 200,
                "source-file": "https://sub.example.com/app.js",
                "line-number": 12,
                "column-number": 7
            }
        }"#;

        let record = ReportPayload::parse(body).unwrap().into_record();
        assert_eq!(record.document_uri, "https://sub.example.com/page");
        assert_eq!(record.blocked_uri, "https://cdn.bad.com/x.js");
        assert_eq!(record.effective_directive.as_deref(), Some("script-src-elem"));
        assert_eq!(record.status_code, 200);
        assert_eq!(record.line_number, 12);
        assert_eq!(record.column_number, 7);
        assert!(record.received_at.is_none());
    }

    #[test]
    fn test_parse_flat_report() {
        let body = br#"{"document-uri": "https://example.com/", "blocked-uri": "inline"}"#;
        let payload = ReportPayload::parse(body).unwrap();
        assert!(matches!(payload, ReportPayload::Flat(_)));
        let record = payload.into_record();
        assert_eq!(record.document_uri, "https://example.com/");
        assert_eq!(record.blocked_uri, "inline");
        assert_eq!(record.violated_directive, "");
        assert_eq!(record.line_number, 0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = ReportPayload::parse(b"this is not json").unwrap_err();
        assert!(matches!(err, CspError::MalformedReport(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        let body =
            br#"{"csp-report": {"document-uri": "https://example.com/", "line-number": "twelve"}}"#;
        assert!(ReportPayload::parse(body).is_err());
    }

    #[test]
    fn test_parse_ignores_sender_receive_time() {
        for received_at in ["1999-01-01T00:00:00Z", "yesterday"] {
            let body = serde_json::json!({
                "csp-report": {
                    "document-uri": "https://example.com/",
                    "blocked-uri": "inline",
                    "received-at": received_at,
                }
            })
            .to_string();
            let record = ReportPayload::parse(body.as_bytes()).unwrap().into_record();
            assert!(record.received_at.is_none(), "kept {:?}", received_at);
        }

        let flat = br#"{"document-uri": "https://example.com/", "received-at": "yesterday"}"#;
        let payload = ReportPayload::parse(flat).unwrap();
        assert!(matches!(payload, ReportPayload::Flat(_)));
        assert!(payload.into_record().received_at.is_none());
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(ReportPayload::parse(b"[1, 2, 3]").is_err());
        assert!(ReportPayload::parse(br#"{"csp-report": "nope"}"#).is_err());
    }

    #[test]
    fn test_blocked_host() {
        let record = ViolationRecord {
            blocked_uri: "https://cdn.bad.com/x.js".to_string(),
            ..Default::default()
        };
        assert_eq!(record.blocked_host().unwrap(), "cdn.bad.com");
    }

    #[test]
    fn test_blocked_host_keywords() {
        for keyword in ["", "inline", "eval", "self"] {
            let record = ViolationRecord {
                blocked_uri: keyword.to_string(),
                ..Default::default()
            };
            assert_eq!(record.blocked_host().unwrap(), "", "keyword {:?}", keyword);
        }
    }

    #[test]
    fn test_blocked_host_unparseable() {
        let record = ViolationRecord {
            blocked_uri: "https://exa mple.com/".to_string(),
            ..Default::default()
        };
        assert!(record.blocked_host().is_err());
    }

    #[test]
    fn test_legacy_ledger_entry_loads() {
        let legacy = r#"[{"document-uri":"https://example.com/","referrer":"","blocked-uri":"https://cdn.bad.com/x.js","violated-directive":"script-src","effective-directive":"","status-code":0,"source-file":"","line-number":0,"column-number":0}]"#;
        let records: Vec<ViolationRecord> = serde_json::from_str(legacy).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].violated_directive, "script-src");
        assert!(records[0].received_at.is_none());
    }
}
