//! The structured JSON error/ack body spec §4.8/§6/§7 requires: `{ success,
//! error, current_usage, limit, reset_epoch, retry_after_seconds,
//! queue_position, estimated_wait_time, user_id, timestamp }`. Never a
//! stack trace (spec §7). Quota rejections carry `reset_epoch`; rate
//! rejections carry `retry_after_seconds`; queued acknowledgements carry
//! `queue_position` and `estimated_wait_time` — each populated only on the
//! decision it applies to, everything else omitted from the wire form.

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, Serialize)]
pub struct AdmissionErrorBody {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Non-error informational text, e.g. a queued acknowledgement — kept
    /// separate from `error` so a `success: true` body never reports its
    /// own confirmation under an `error` key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_usage: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Next UTC midnight as a unix timestamp (spec §4.3/§7); populated on
    /// quota rejections only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_epoch: Option<i64>,
    /// Populated on rate rejections only (spec §7).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_time: Option<u64>,
    pub user_id: String,
    pub timestamp: String,
}

impl AdmissionErrorBody {
    fn now_iso8601() -> String {
        OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }

    pub fn rate_denied(user_id: &str, retry_after_secs: u64) -> Self {
        Self {
            success: false,
            error: Some("rate limit exceeded".to_string()),
            message: None,
            current_usage: None,
            limit: None,
            reset_epoch: None,
            retry_after_seconds: Some(retry_after_secs),
            queue_position: None,
            estimated_wait_time: None,
            user_id: user_id.to_string(),
            timestamp: Self::now_iso8601(),
        }
    }

    pub fn quota_denied(user_id: &str, current_usage: u32, limit: u32, reset_epoch: i64) -> Self {
        Self {
            success: false,
            error: Some("quota exceeded".to_string()),
            message: None,
            current_usage: Some(current_usage),
            limit: Some(limit),
            reset_epoch: Some(reset_epoch),
            retry_after_seconds: None,
            queue_position: None,
            estimated_wait_time: None,
            user_id: user_id.to_string(),
            timestamp: Self::now_iso8601(),
        }
    }

    pub fn queue_full(user_id: &str, max_queue_depth: usize) -> Self {
        Self {
            success: false,
            error: Some("request queue full".to_string()),
            message: None,
            current_usage: None,
            limit: Some(max_queue_depth as u32),
            reset_epoch: None,
            retry_after_seconds: None,
            queue_position: None,
            estimated_wait_time: None,
            user_id: user_id.to_string(),
            timestamp: Self::now_iso8601(),
        }
    }

    pub fn queued(user_id: &str, queue_position: usize, estimated_wait_time_secs: u64) -> Self {
        Self {
            success: true,
            error: None,
            message: Some("queued".to_string()),
            current_usage: None,
            limit: None,
            reset_epoch: None,
            retry_after_seconds: None,
            queue_position: Some(queue_position),
            estimated_wait_time: Some(estimated_wait_time_secs),
            user_id: user_id.to_string(),
            timestamp: Self::now_iso8601(),
        }
    }

    pub fn unknown_operation(user_id: &str, operation: &str) -> Self {
        Self {
            success: false,
            error: Some(format!("unknown operation '{operation}'")),
            message: None,
            current_usage: None,
            limit: None,
            reset_epoch: None,
            retry_after_seconds: None,
            queue_position: None,
            estimated_wait_time: None,
            user_id: user_id.to_string(),
            timestamp: Self::now_iso8601(),
        }
    }

    pub fn store_unavailable(user_id: &str) -> Self {
        Self {
            success: false,
            error: Some("store unavailable".to_string()),
            message: None,
            current_usage: None,
            limit: None,
            reset_epoch: None,
            retry_after_seconds: None,
            queue_position: None,
            estimated_wait_time: None,
            user_id: user_id.to_string(),
            timestamp: Self::now_iso8601(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_bodies_omit_unset_fields_from_json() {
        let json = serde_json::to_value(AdmissionErrorBody::rate_denied("u1", 12)).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("current_usage").is_none());
        assert!(json.get("limit").is_none());
        assert!(json.get("reset_epoch").is_none());
        assert_eq!(json["retry_after_seconds"], 12);
    }

    #[test]
    fn quota_denied_body_carries_usage_limit_and_reset_epoch() {
        let json = serde_json::to_value(AdmissionErrorBody::quota_denied("u1", 450, 500, 1_700_000_000)).unwrap();
        assert_eq!(json["current_usage"], 450);
        assert_eq!(json["limit"], 500);
        assert_eq!(json["reset_epoch"], 1_700_000_000);
        assert!(json.get("retry_after_seconds").is_none());
        assert!(json.get("estimated_wait_time").is_none());
    }

    #[test]
    fn queued_body_is_success_true_with_message_not_error() {
        let body = AdmissionErrorBody::queued("u1", 3, 45);
        assert!(body.success);
        assert!(body.error.is_none());
        assert_eq!(body.message.as_deref(), Some("queued"));
        assert_eq!(body.queue_position, Some(3));
        assert_eq!(body.estimated_wait_time, Some(45));

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["message"], "queued");
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let body = AdmissionErrorBody::rate_denied("u1", 1);
        assert!(time::OffsetDateTime::parse(&body.timestamp, &time::format_description::well_known::Rfc3339).is_ok());
    }
}
