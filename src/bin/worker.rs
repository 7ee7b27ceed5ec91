use campaign_dispatch::{
    app_state::AppState,
    config::AppConfig,
    db,
    services::{
        cloud_api::CloudApiClient,
        gateway::GatewayClient,
        humanizer,
        processor::{self, JobOutcome},
        queue::{JobQueue, MAX_ATTEMPTS},
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

/// Worker pool stays narrow: a few long-lived jobs, not many short queries.
const WORKER_DB_CONNECTIONS: u32 = 5;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting campaign dispatch worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // The worker emits its series from this process; without a recorder and
    // listener of its own, nothing it counts would ever be scraped.
    let metrics_addr: SocketAddr = config
        .worker_metrics_addr
        .parse()
        .expect("Invalid WORKER_METRICS_ADDR");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus metrics exporter");

    metrics::describe_counter!(
        "campaign_messages_sent",
        "Total messages delivered to the gateway"
    );
    metrics::describe_counter!(
        "campaign_messages_failed",
        "Total campaign records ending in terminal failure"
    );
    metrics::describe_counter!(
        "campaign_jobs_skipped",
        "Total queued jobs skipped at validation (paused, deleted, terminal)"
    );
    metrics::describe_gauge!(
        "campaign_queue_depth",
        "Current number of pending send jobs in the queue"
    );

    tracing::info!("Worker metrics exporter listening on {metrics_addr}");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url, WORKER_DB_CONNECTIONS)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    let gateway = GatewayClient::new(&config.gateway_url, &config.gateway_api_key)
        .expect("Failed to initialize gateway client");

    let cloud_api = CloudApiClient::new().expect("Failed to initialize Cloud API client");

    let state = AppState::new(
        db_pool,
        queue,
        gateway,
        cloud_api,
        config.default_segment.clone(),
        config.country_prefix.clone(),
    );

    // Background presence noise, fully decoupled from job processing.
    humanizer::spawn_presence_cycle(state.db.clone(), state.gateway.clone());

    tracing::info!("Worker ready, starting job processing loop");

    // Main processing loop
    loop {
        match process_next_job(&state).await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs due, sleeping");
                if let Ok(depth) = state.queue.queue_depth().await {
                    metrics::gauge!("campaign_queue_depth").set(depth as f64);
                }
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing job, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Claim and process the next due job.
/// Returns Ok(true) if a job was processed, Ok(false) if none was due.
async fn process_next_job(state: &AppState) -> Result<bool, Box<dyn std::error::Error>> {
    let job = match state.queue.dequeue_due().await? {
        Some(j) => j,
        None => return Ok(false),
    };

    tracing::info!(
        record_id = %job.record_id,
        campaign = %job.campaign_name,
        attempt = job.attempt,
        "Processing send job"
    );

    match processor::process_job(state, &job).await {
        Ok(outcome) => {
            state.queue.complete(&job).await?;
            match outcome {
                JobOutcome::Sent | JobOutcome::GreetingSent => {
                    tracing::info!(record_id = %job.record_id, ?outcome, "Job completed");
                }
                JobOutcome::Skipped(reason) => {
                    tracing::debug!(record_id = %job.record_id, ?reason, "Job skipped");
                }
                JobOutcome::Failed => {
                    tracing::warn!(record_id = %job.record_id, "Job ended in terminal failure");
                }
            }
            Ok(true)
        }
        Err(e) if e.is_transient() && job.attempt + 1 < MAX_ATTEMPTS => {
            let backoff = state.queue.requeue_with_backoff(&job).await?;
            tracing::info!(
                record_id = %job.record_id,
                attempt = job.attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %e,
                "Job re-queued for retry"
            );
            Ok(true)
        }
        Err(e) => {
            // Fatal, or transient with attempts exhausted. The processor has
            // already marked the record where that applies; for exhausted
            // transients, fail it here.
            if e.is_transient() {
                let reason = format!("failed after {MAX_ATTEMPTS} queue attempts: {e}");
                if let Err(db_err) = db::campaign_queries::mark_failed(
                    &state.db,
                    job.record_id,
                    &reason,
                    job.attempt as i32 + 1,
                )
                .await
                {
                    tracing::error!(record_id = %job.record_id, error = %db_err, "Failed to mark record failed");
                }
                metrics::counter!("campaign_messages_failed").increment(1);
            }

            state.queue.complete(&job).await?;

            tracing::warn!(
                record_id = %job.record_id,
                attempt = job.attempt,
                error = %e,
                "Job dropped from queue"
            );
            Ok(true)
        }
    }
}
