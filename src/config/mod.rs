use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the delayed job queue
    pub redis_url: String,

    /// Chat gateway base URL
    pub gateway_url: String,

    /// Chat gateway API key
    pub gateway_api_key: String,

    /// Line segment used when a campaign's segment has no active lines
    #[serde(default = "default_segment")]
    pub default_segment: String,

    /// Country calling code prepended to bare national numbers on upload
    /// (e.g., "55"). Unset leaves numbers as uploaded.
    #[serde(default)]
    pub country_prefix: Option<String>,

    /// Listen address for the worker's Prometheus exporter. The worker has
    /// no axum server, so its metrics get their own listener.
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_segment() -> String {
    "default".to_string()
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9091".to_string()
}


impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
