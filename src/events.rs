// Event types - the usage event model shared by ingestion, storage and tracking
//
// Three shapes of the same record:
// - TrackRequest: raw wire body as posted to /api/track (everything optional)
// - NewEvent: validated, ready to insert (store assigns id, hash, timestamp)
// - UsageEvent: a stored row

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of a single skill invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Error,
    Timeout,
}

impl EventStatus {
    /// Column value used in the `status` CHECK constraint
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }
}

impl FromStr for EventStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "timeout" => Ok(Self::Timeout),
            other => Err(ValidationError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a TrackRequest was rejected at the ingestion boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingToolName,
    MissingStatus,
    InvalidStatus(String),
    NegativeDuration(i64),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToolName => write!(f, "tool_name is required"),
            Self::MissingStatus => write!(f, "status is required"),
            Self::InvalidStatus(s) => write!(
                f,
                "invalid status '{}' (expected success, error or timeout)",
                s
            ),
            Self::NegativeDuration(ms) => {
                write!(f, "duration_ms must be non-negative (got {})", ms)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Raw ingestion payload, body of POST /api/track
///
/// Every field is optional at the type level so that a missing `tool_name`
/// or `status` is reported as a validation error rather than a JSON
/// deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Free-form payload. A JSON string is kept verbatim, anything else is
    /// serialized before storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl TrackRequest {
    /// Validate into an insertable event, applying the deployment's default category
    pub fn validate(self, default_category: &str) -> Result<NewEvent, ValidationError> {
        // Stored as sent; blank names are rejected
        let tool_name = self
            .tool_name
            .filter(|s| !s.trim().is_empty())
            .ok_or(ValidationError::MissingToolName)?;

        let status: EventStatus = self
            .status
            .as_deref()
            .ok_or(ValidationError::MissingStatus)?
            .parse()?;

        let duration_ms = match self.duration_ms {
            Some(ms) if ms < 0 => return Err(ValidationError::NegativeDuration(ms)),
            Some(ms) => Some(ms as u64),
            None => None,
        };

        let tool_category = self
            .tool_category
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_category.to_string());

        // Error details are only meaningful for error events
        let (error_type, error_message) = if status == EventStatus::Error {
            (self.error_type, self.error_message)
        } else {
            (None, None)
        };

        let metadata = match self.metadata {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s),
            Some(other) => serde_json::to_string(&other).ok(),
        };

        Ok(NewEvent {
            tool_name,
            tool_category,
            duration_ms,
            status,
            error_type,
            error_message,
            metadata,
        })
    }
}

/// A validated event waiting for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub tool_name: String,
    pub tool_category: String,
    pub duration_ms: Option<u64>,
    pub status: EventStatus,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    /// Serialized JSON text
    pub metadata: Option<String>,
}

/// A stored usage event row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: i64,
    pub user_id_hash: String,
    pub tool_name: String,
    pub tool_category: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub status: EventStatus,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(tool: &str, status: &str) -> TrackRequest {
        TrackRequest {
            tool_name: Some(tool.to_string()),
            status: Some(status.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("success".parse::<EventStatus>(), Ok(EventStatus::Success));
        assert_eq!("error".parse::<EventStatus>(), Ok(EventStatus::Error));
        assert_eq!("timeout".parse::<EventStatus>(), Ok(EventStatus::Timeout));
        assert_eq!(
            "SUCCESS".parse::<EventStatus>(),
            Err(ValidationError::InvalidStatus("SUCCESS".to_string()))
        );
    }

    #[test]
    fn test_validate_applies_default_category() {
        let event = request("search", "success").validate("default").unwrap();
        assert_eq!(event.tool_category, "default");

        let mut req = request("search", "success");
        req.tool_category = Some("   ".to_string());
        assert_eq!(req.validate("cms").unwrap().tool_category, "cms");

        let mut req = request("search", "success");
        req.tool_category = Some("ontology".to_string());
        assert_eq!(req.validate("cms").unwrap().tool_category, "ontology");
    }

    #[test]
    fn test_validate_requires_tool_name() {
        let req = TrackRequest {
            status: Some("success".to_string()),
            ..Default::default()
        };
        assert_eq!(req.validate("d"), Err(ValidationError::MissingToolName));
        assert_eq!(
            request("  ", "success").validate("d"),
            Err(ValidationError::MissingToolName)
        );
    }

    #[test]
    fn test_validate_keeps_tool_name_verbatim() {
        let event = request(" search ", "success").validate("d").unwrap();
        assert_eq!(event.tool_name, " search ");
    }

    #[test]
    fn test_validate_requires_known_status() {
        let req = TrackRequest {
            tool_name: Some("search".to_string()),
            ..Default::default()
        };
        assert_eq!(req.validate("d"), Err(ValidationError::MissingStatus));
        assert_eq!(
            request("search", "done").validate("d"),
            Err(ValidationError::InvalidStatus("done".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_negative_duration() {
        let mut req = request("search", "success");
        req.duration_ms = Some(-5);
        assert_eq!(req.validate("d"), Err(ValidationError::NegativeDuration(-5)));
    }

    #[test]
    fn test_error_fields_dropped_unless_error() {
        let mut req = request("search", "success");
        req.error_type = Some("TypeError".to_string());
        req.error_message = Some("boom".to_string());
        let event = req.clone().validate("d").unwrap();
        assert_eq!(event.error_type, None);
        assert_eq!(event.error_message, None);

        req.status = Some("error".to_string());
        let event = req.validate("d").unwrap();
        assert_eq!(event.error_type.as_deref(), Some("TypeError"));
        assert_eq!(event.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_metadata_serialization() {
        let mut req = request("search", "success");
        req.metadata = Some(json!("{\"already\":\"serialized\"}"));
        assert_eq!(
            req.clone().validate("d").unwrap().metadata.as_deref(),
            Some("{\"already\":\"serialized\"}")
        );

        req.metadata = Some(json!({"params": ["query"]}));
        assert_eq!(
            req.clone().validate("d").unwrap().metadata.as_deref(),
            Some("{\"params\":[\"query\"]}")
        );

        req.metadata = Some(serde_json::Value::Null);
        assert_eq!(req.validate("d").unwrap().metadata, None);
    }

    #[test]
    fn test_track_request_wire_format() {
        let req: TrackRequest = serde_json::from_value(json!({
            "tool_name": "search",
            "status": "error",
            "duration_ms": 12,
            "error_type": "IoError"
        }))
        .unwrap();
        assert_eq!(req.tool_name.as_deref(), Some("search"));
        assert_eq!(req.duration_ms, Some(12));
        assert_eq!(req.metadata, None);

        // Absent fields are omitted on the way out
        let out = serde_json::to_value(&req).unwrap();
        assert!(out.get("metadata").is_none());
        assert!(out.get("tool_category").is_none());
    }
}
