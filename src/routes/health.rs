use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
    pub queue: QueueHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct QueueHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
    /// Send jobs waiting for their ready-at time. Absent when Redis is down.
    pub pending_jobs: Option<u64>,
}

/// GET /health — dependency status plus the dispatch backlog.
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();

    // Record store
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(_) => ComponentHealth {
            status: "error".to_string(),
            latency_ms: None,
        },
    };

    // Send queue; depth is reported so operators see the backlog at a glance
    let queue_start = std::time::Instant::now();
    let queue = match state.queue.health_check().await {
        Ok(_) => QueueHealth {
            status: "ok".to_string(),
            latency_ms: Some(queue_start.elapsed().as_millis() as u64),
            pending_jobs: state.queue.queue_depth().await.ok(),
        },
        Err(_) => QueueHealth {
            status: "error".to_string(),
            latency_ms: None,
            pending_jobs: None,
        },
    };

    let all_healthy = database.status == "ok" && queue.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks { database, queue },
    };

    (status_code, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_payload_shape() {
        let response = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            checks: HealthChecks {
                database: ComponentHealth {
                    status: "ok".to_string(),
                    latency_ms: Some(2),
                },
                queue: QueueHealth {
                    status: "ok".to_string(),
                    latency_ms: Some(1),
                    pending_jobs: Some(42),
                },
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["checks"]["database"]["status"], "ok");
        assert_eq!(json["checks"]["queue"]["pending_jobs"], 42);
    }

    #[test]
    fn test_degraded_queue_omits_depth() {
        let queue = QueueHealth {
            status: "error".to_string(),
            latency_ms: None,
            pending_jobs: None,
        };
        let json = serde_json::to_value(&queue).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json["pending_jobs"].is_null());
    }
}
