use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One contact row in a dispatch request. Phones arrive raw and are
/// canonicalized (or skipped) server-side.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContactUpload {
    #[garde(length(min = 1, max = 40))]
    pub phone: String,

    #[garde(length(min = 1, max = 200))]
    pub name: Option<String>,

    /// Explicit message for this contact. Absent means the scheduler
    /// synthesizes a greeting-wrapper payload.
    #[garde(length(max = 4096))]
    pub message: Option<String>,

    #[garde(skip)]
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// POST /api/v1/campaigns/dispatch request body.
#[derive(Debug, Deserialize, Validate)]
pub struct DispatchRequest {
    #[garde(length(min = 1, max = 120))]
    pub campaign_name: String,

    /// Target segment for line selection. Falls back to the configured
    /// default segment when empty of active lines.
    #[garde(length(min = 1, max = 60))]
    pub segment: Option<String>,

    #[garde(skip)]
    #[serde(default)]
    pub use_template: bool,

    #[garde(length(min = 1, max = 120))]
    pub template_id: Option<String>,

    /// Ordered template variable names; auto-discovered from the template
    /// body when omitted.
    #[garde(skip)]
    pub template_variables: Option<Vec<String>>,

    #[garde(length(min = 1, max = 10000))]
    #[garde(dive)]
    pub contacts: Vec<ContactUpload>,
}

/// Aggregate summary returned after a successful dispatch. There is no
/// partial-success shape: the upload either schedules everything or is
/// rejected whole.
#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub campaign_name: String,
    pub total_contacts: usize,
    pub skipped_invalid_phones: usize,
    pub lines_used: usize,
    pub average_delay_secs: u64,
    pub estimated_completion: DateTime<Utc>,
}

/// GET /api/v1/campaigns/{name}/status response.
#[derive(Debug, Serialize)]
pub struct CampaignStatusResponse {
    pub campaign_name: String,
    pub counts: HashMap<String, i64>,
}

/// Response for pause/delete operations.
#[derive(Debug, Serialize)]
pub struct CampaignMutationResponse {
    pub campaign_name: String,
    pub affected_records: u64,
    pub cancelled_jobs: u64,
}

/// Error body for rejected requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
