use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sender identity bound to one gateway instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub id: Uuid,
    /// Gateway instance name, used as the path segment of gateway calls
    /// and as half of the circuit-breaker key.
    pub instance_name: String,
    pub active: bool,
    pub segment: String,
    /// Creation time drives the rate-limit tier.
    pub created_at: DateTime<Utc>,
    /// External health score for this line (advisory only).
    pub reputation_score: Option<f64>,
    /// Direct Cloud API credentials, when the line has the alternate transport.
    pub cloud_api: Option<CloudApiCredentials>,
}

/// Credentials for the official Cloud API transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudApiCredentials {
    pub token: String,
    pub number_id: String,
}

impl Line {
    /// Line age in whole days at `now`.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }
}
