use sqlx::PgPool;
use std::sync::Arc;

use crate::services::{cloud_api::CloudApiClient, gateway::GatewayClient, queue::JobQueue};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<JobQueue>,
    pub gateway: Arc<GatewayClient>,
    pub cloud_api: Arc<CloudApiClient>,
    pub default_segment: String,
    pub country_prefix: Option<String>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        queue: JobQueue,
        gateway: GatewayClient,
        cloud_api: CloudApiClient,
        default_segment: String,
        country_prefix: Option<String>,
    ) -> Self {
        Self {
            db,
            queue: Arc::new(queue),
            gateway: Arc::new(gateway),
            cloud_api: Arc::new(cloud_api),
            default_segment,
            country_prefix,
        }
    }
}
