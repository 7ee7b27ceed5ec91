use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::db::campaign_queries;
use crate::models::api::{
    CampaignMutationResponse, CampaignStatusResponse, DispatchRequest, DispatchResponse,
    ErrorResponse,
};
use crate::models::contact::Contact;
use crate::services::phone;
use crate::services::scheduler::{self, DeliveryMode, DispatchError, DispatchParams};

fn reject(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error: message.into() }))
}

/// POST /api/v1/campaigns/dispatch — schedule a contact batch.
///
/// Contacts with un-normalizable phones are skipped and counted, never
/// failed. Everything else is all-or-nothing: any scheduling error rejects
/// the upload whole.
pub async fn dispatch_campaign(
    State(state): State<AppState>,
    Json(req): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>, (StatusCode, Json<ErrorResponse>)> {
    if let Err(e) = req.validate() {
        return Err(reject(StatusCode::BAD_REQUEST, e.to_string()));
    }

    if req.use_template && req.template_id.is_none() {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "use_template requires template_id",
        ));
    }

    let mut contacts: Vec<(Contact, Option<String>)> = Vec::with_capacity(req.contacts.len());
    let mut skipped_invalid_phones = 0usize;

    for upload in &req.contacts {
        let Some(canonical) = phone::normalize_with_prefix(&upload.phone, state.country_prefix.as_deref())
        else {
            tracing::debug!(campaign = %req.campaign_name, raw = %upload.phone, "skipping invalid phone");
            skipped_invalid_phones += 1;
            continue;
        };

        contacts.push((
            Contact {
                phone: canonical,
                name: upload.name.clone(),
                document: None,
                variables: upload.variables.clone(),
            },
            upload.message.clone(),
        ));
    }

    if contacts.is_empty() {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "no dispatchable contacts after phone normalization",
        ));
    }

    let params = DispatchParams {
        campaign_name: req.campaign_name.clone(),
        segment: req
            .segment
            .clone()
            .unwrap_or_else(|| state.default_segment.clone()),
        mode: if req.use_template { DeliveryMode::Template } else { DeliveryMode::Text },
        template_id: req.template_id.clone(),
        template_variables: req.template_variables.clone(),
    };

    let outcome = scheduler::dispatch(&state.db, &state.queue, &state.default_segment, &params, &contacts)
        .await
        .map_err(|e| match e {
            DispatchError::NoActiveLine(segment) => reject(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("no active line available for segment '{segment}'"),
            ),
            DispatchError::Db(e) => {
                tracing::error!(campaign = %req.campaign_name, error = %e, "dispatch persistence failed");
                reject(StatusCode::INTERNAL_SERVER_ERROR, "dispatch failed")
            }
            DispatchError::Queue(e) => {
                tracing::error!(campaign = %req.campaign_name, error = %e, "dispatch enqueue failed");
                reject(StatusCode::INTERNAL_SERVER_ERROR, "dispatch failed")
            }
        })?;

    Ok(Json(DispatchResponse {
        campaign_name: req.campaign_name,
        total_contacts: outcome.total_contacts,
        skipped_invalid_phones,
        lines_used: outcome.lines_used,
        average_delay_secs: outcome.average_delay_secs,
        estimated_completion: outcome.estimated_completion,
    }))
}

/// GET /api/v1/campaigns/{name}/status — per-status record counts.
pub async fn campaign_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CampaignStatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let counts = campaign_queries::status_counts(&state.db, &name)
        .await
        .map_err(|e| {
            tracing::error!(campaign = %name, error = %e, "status query failed");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "status query failed")
        })?;

    if counts.is_empty() {
        return Err(reject(StatusCode::NOT_FOUND, format!("unknown campaign '{name}'")));
    }

    Ok(Json(CampaignStatusResponse { campaign_name: name, counts }))
}

/// POST /api/v1/campaigns/{name}/pause — pause still-scheduled records.
///
/// Queued jobs are left in place; the worker's validate step no-ops on
/// paused records.
pub async fn pause_campaign(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CampaignMutationResponse>, (StatusCode, Json<ErrorResponse>)> {
    let affected = campaign_queries::pause_campaign(&state.db, &name)
        .await
        .map_err(|e| {
            tracing::error!(campaign = %name, error = %e, "pause failed");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "pause failed")
        })?;

    tracing::info!(campaign = %name, affected, "campaign paused");

    Ok(Json(CampaignMutationResponse {
        campaign_name: name,
        affected_records: affected,
        cancelled_jobs: 0,
    }))
}

/// DELETE /api/v1/campaigns/{name} — drop the campaign's records and its
/// pending queue jobs. Jobs claimed mid-cancel no-op at validate.
pub async fn delete_campaign(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CampaignMutationResponse>, (StatusCode, Json<ErrorResponse>)> {
    let cancelled = state.queue.cancel_campaign(&name).await.map_err(|e| {
        tracing::error!(campaign = %name, error = %e, "queue cancellation failed");
        reject(StatusCode::INTERNAL_SERVER_ERROR, "delete failed")
    })?;

    let affected = campaign_queries::delete_campaign(&state.db, &name)
        .await
        .map_err(|e| {
            tracing::error!(campaign = %name, error = %e, "record deletion failed");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "delete failed")
        })?;

    tracing::info!(campaign = %name, affected, cancelled, "campaign deleted");

    Ok(Json(CampaignMutationResponse {
        campaign_name: name,
        affected_records: affected,
        cancelled_jobs: cancelled,
    }))
}
