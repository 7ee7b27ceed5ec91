use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dispatch lifecycle of one campaign record.
///
/// Stored in SQL as a `status` discriminant plus `scheduled_at`,
/// `external_message_id` and `failure_reason` columns, so schedule ordering
/// and pause filtering stay plain column queries. Exactly one variant holds
/// at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DispatchStatus {
    Unscheduled,
    Scheduled { at: DateTime<Utc> },
    Paused,
    Sent { message_id: String },
    Failed { reason: String },
}

impl DispatchStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DispatchStatus::Unscheduled => "unscheduled",
            DispatchStatus::Scheduled { .. } => "scheduled",
            DispatchStatus::Paused => "paused",
            DispatchStatus::Sent { .. } => "sent",
            DispatchStatus::Failed { .. } => "failed",
        }
    }

    /// Rebuild the status from its SQL column decomposition.
    pub fn from_columns(
        status: &str,
        scheduled_at: Option<DateTime<Utc>>,
        external_message_id: Option<String>,
        failure_reason: Option<String>,
    ) -> Self {
        match status {
            "scheduled" => DispatchStatus::Scheduled {
                at: scheduled_at.unwrap_or_else(Utc::now),
            },
            "paused" => DispatchStatus::Paused,
            "sent" => DispatchStatus::Sent {
                message_id: external_message_id.unwrap_or_default(),
            },
            "failed" => DispatchStatus::Failed {
                reason: failure_reason.unwrap_or_default(),
            },
            _ => DispatchStatus::Unscheduled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchStatus::Sent { .. } | DispatchStatus::Failed { .. })
    }
}

/// One (campaign name, contact) row. A "campaign" is the label shared by
/// many of these records, not a table of its own.
///
/// A greeting send leaves the record in `Scheduled` with `dispatched_at`
/// and the external id set: the real content is deferred to the
/// reply-triggered flow, so the record is pending, not terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: Uuid,
    pub campaign_name: String,
    pub contact_name: Option<String>,
    pub phone: String,
    pub segment: Option<String>,
    pub line_id: Uuid,
    pub message: String,
    pub use_template: bool,
    pub template_id: Option<String>,
    pub template_variables: Option<Vec<String>>,
    pub status: DispatchStatus,
    pub external_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered: bool,
    pub read: bool,
    pub retry_count: i32,
}

/// Insert payload for a campaign record, produced by the dispatch scheduler.
#[derive(Debug, Clone)]
pub struct NewCampaignRecord {
    pub campaign_name: String,
    pub contact_name: Option<String>,
    pub phone: String,
    pub segment: Option<String>,
    pub line_id: Uuid,
    pub message: String,
    pub use_template: bool,
    pub template_id: Option<String>,
    pub template_variables: Option<Vec<String>>,
    pub scheduled_at: DateTime<Utc>,
}

/// A message template fetched for template-mode sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub language: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_column_round_trip() {
        let at = Utc::now();
        let status = DispatchStatus::from_columns("scheduled", Some(at), None, None);
        assert_eq!(status, DispatchStatus::Scheduled { at });
        assert_eq!(status.as_db_str(), "scheduled");

        let sent = DispatchStatus::from_columns("sent", None, Some("WAMID.1".into()), None);
        assert_eq!(sent, DispatchStatus::Sent { message_id: "WAMID.1".into() });
        assert!(sent.is_terminal());

        let failed = DispatchStatus::from_columns("failed", None, None, Some("boom".into()));
        assert_eq!(failed, DispatchStatus::Failed { reason: "boom".into() });
        assert!(failed.is_terminal());
    }

    #[test]
    fn test_unknown_status_defaults_to_unscheduled() {
        let status = DispatchStatus::from_columns("whatever", None, None, None);
        assert_eq!(status, DispatchStatus::Unscheduled);
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_paused_not_terminal() {
        assert!(!DispatchStatus::Paused.is_terminal());
    }
}
