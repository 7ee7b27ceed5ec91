//! Per-job execution: the campaign worker state machine.
//!
//! validate → humanize → render → send (up to 3 attempts) → record outcome
//! → route conversation. Campaigns may be paused or deleted after jobs were
//! queued; in-flight jobs honor that silently at the validate step instead
//! of surfacing errors to the queue's retry machinery.

use rand::seq::SliceRandom;
use std::collections::HashMap;

use crate::app_state::AppState;
use crate::db::{campaign_queries, conversation_queries, line_queries};
use crate::models::campaign::{CampaignRecord, DispatchStatus, Template};
use crate::models::line::Line;
use crate::services::gateway::NumberCheck;
use crate::services::greeting::{self, MessagePayload};
use crate::services::humanizer::{self, SEND_DELAY_MAX_SECS, SEND_DELAY_MIN_SECS};
use crate::services::queue::SendJob;
use crate::services::template::RenderContext;
use crate::services::{blocklist, rate_limit, reputation, routing, spintax, template};

/// In-process send attempts per job.
const SEND_ATTEMPTS: u32 = 3;

/// Typing indicator duration hint passed to the gateway (ms).
const TYPING_HINT_MS: u64 = 4000;

/// Why a job ended without a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    RecordDeleted,
    CampaignPaused,
    AlreadyTerminal,
}

/// Terminal result of one processed job.
#[derive(Debug)]
pub enum JobOutcome {
    /// Direct content delivered; record is terminal-success.
    Sent,
    /// Greeting opener delivered; record stays pending for the reply flow.
    GreetingSent,
    /// Validate step turned the job into a no-op.
    Skipped(SkipReason),
    /// Attempts exhausted or policy block; record is terminal-failure.
    Failed,
}

/// Fatal and transient job errors. Fatal variants are not retried; the
/// worker completes the job and leaves the record as the processor marked
/// it. Transient variants go back to the queue with backoff.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("line {0} not found")]
    LineNotFound(uuid::Uuid),

    #[error("line '{0}' is inactive")]
    LineInactive(String),

    #[error("template '{0}' not found")]
    TemplateNotFound(String),

    #[error("unparseable greeting payload for record {0}")]
    UnparseablePayload(uuid::Uuid),

    #[error("rate limit reached for line '{0}'")]
    RateLimited(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ProcessError {
    /// Transient errors are requeued with backoff; everything else aborts
    /// the job for good.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProcessError::RateLimited(_) | ProcessError::Db(_))
    }
}

/// True only when the validation response explicitly reports the phone as
/// absent from the network. Missing or unrelated entries stay sendable.
fn number_known_missing(checks: &[NumberCheck], phone: &str) -> bool {
    checks.iter().any(|c| c.number == phone && !c.exists)
}

/// Validate-step decision, pure over the fetched record state.
pub fn should_skip(record: Option<&CampaignRecord>) -> Option<SkipReason> {
    match record {
        None => Some(SkipReason::RecordDeleted),
        Some(r) if r.status == DispatchStatus::Paused => Some(SkipReason::CampaignPaused),
        Some(r) if r.status.is_terminal() => Some(SkipReason::AlreadyTerminal),
        Some(_) => None,
    }
}

/// Execute one queued send job end to end.
pub async fn process_job(state: &AppState, job: &SendJob) -> Result<JobOutcome, ProcessError> {
    // Validate
    let fetched = campaign_queries::get_record(&state.db, job.record_id).await?;
    if let Some(reason) = should_skip(fetched.as_ref()) {
        tracing::debug!(record_id = %job.record_id, ?reason, "job is a no-op");
        metrics::counter!("campaign_jobs_skipped").increment(1);
        return Ok(JobOutcome::Skipped(reason));
    }
    let Some(record) = fetched else {
        return Ok(JobOutcome::Skipped(SkipReason::RecordDeleted));
    };

    // Blocklist
    if blocklist::is_blocked(&state.db, &record.phone).await? {
        tracing::info!(record_id = %record.id, "recipient blocklisted, failing record");
        campaign_queries::mark_failed(&state.db, record.id, "recipient blocklisted", record.retry_count)
            .await?;
        metrics::counter!("campaign_messages_failed").increment(1);
        return Ok(JobOutcome::Failed);
    }

    // Line re-validation
    let line = line_queries::get_line(&state.db, record.line_id)
        .await?
        .ok_or(ProcessError::LineNotFound(record.line_id))?;

    if !line.active {
        campaign_queries::mark_failed(&state.db, record.id, "assigned line is inactive", record.retry_count)
            .await?;
        return Err(ProcessError::LineInactive(line.instance_name));
    }

    if !rate_limit::can_send(&state.db, &line).await {
        // Abort before any network call; the queue retries later.
        return Err(ProcessError::RateLimited(line.instance_name));
    }

    // Advisory only: logged, never enforced.
    reputation::check_and_log(&line);

    // Off-network recipients fail terminally instead of burning send
    // attempts. Lookup errors never block the send.
    match state
        .gateway
        .check_numbers(&line.instance_name, std::slice::from_ref(&record.phone))
        .await
    {
        Ok(checks) if number_known_missing(&checks, &record.phone) => {
            tracing::info!(record_id = %record.id, "recipient not on the chat network");
            campaign_queries::mark_failed(
                &state.db,
                record.id,
                "recipient not on the chat network",
                record.retry_count,
            )
            .await?;
            metrics::counter!("campaign_messages_failed").increment(1);
            return Ok(JobOutcome::Failed);
        }
        Ok(_) => {}
        Err(e) => {
            tracing::debug!(line = %line.instance_name, error = %e, "number validation unavailable");
        }
    }

    // Payload determination
    let payload = greeting::parse_message(&record.message);
    if let MessagePayload::Unparseable(_) = payload {
        // Raw wrapper JSON must never reach a recipient.
        campaign_queries::mark_failed(
            &state.db,
            record.id,
            "unparseable greeting payload, operator attention required",
            record.retry_count,
        )
        .await?;
        metrics::counter!("campaign_messages_failed").increment(1);
        return Err(ProcessError::UnparseablePayload(record.id));
    }

    // Humanize + send loop
    let mut last_error = String::new();
    for attempt in 1..=SEND_ATTEMPTS {
        if let Err(e) = state
            .gateway
            .send_typing(&line.instance_name, &record.phone, TYPING_HINT_MS)
            .await
        {
            tracing::debug!(line = %line.instance_name, error = %e, "typing indicator failed");
        }

        humanizer::sleep(humanizer::message_delay(SEND_DELAY_MIN_SECS, SEND_DELAY_MAX_SECS)).await;

        match send_once(state, &record, &line, &payload).await {
            Ok((message_id, is_greeting)) => {
                campaign_queries::mark_dispatched(&state.db, record.id, &message_id, !is_greeting)
                    .await?;
                metrics::counter!("campaign_messages_sent").increment(1);
                tracing::info!(
                    record_id = %record.id,
                    line = %line.instance_name,
                    message_id = %message_id,
                    greeting = is_greeting,
                    "message dispatched"
                );

                route_conversation(state, &record, &line).await;

                return Ok(if is_greeting { JobOutcome::GreetingSent } else { JobOutcome::Sent });
            }
            Err(SendError::Fatal(e)) => {
                campaign_queries::mark_failed(&state.db, record.id, &e.to_string(), record.retry_count)
                    .await?;
                if record.use_template {
                    campaign_queries::record_template_failure(
                        &state.db,
                        record.id,
                        record.template_id.as_deref(),
                        &e.to_string(),
                    )
                    .await?;
                }
                metrics::counter!("campaign_messages_failed").increment(1);
                return Err(e);
            }
            Err(SendError::Transient(message)) => {
                let retry_count = campaign_queries::increment_retry_count(&state.db, record.id).await?;
                tracing::warn!(
                    record_id = %record.id,
                    attempt,
                    retry_count,
                    error = %message,
                    "send attempt failed"
                );
                last_error = message;
            }
        }
    }

    // Attempts exhausted
    let retry_count = record.retry_count + SEND_ATTEMPTS as i32;
    campaign_queries::mark_failed(&state.db, record.id, &last_error, retry_count).await?;
    if record.use_template {
        campaign_queries::record_template_failure(
            &state.db,
            record.id,
            record.template_id.as_deref(),
            &last_error,
        )
        .await?;
    }
    metrics::counter!("campaign_messages_failed").increment(1);
    tracing::warn!(record_id = %record.id, "record failed after {SEND_ATTEMPTS} attempts");

    Ok(JobOutcome::Failed)
}

/// Per-attempt error split: transient errors stay in the attempt loop,
/// fatal ones abort the job.
enum SendError {
    Transient(String),
    Fatal(ProcessError),
}

/// One send attempt. Returns the gateway message id and whether this was a
/// greeting send (pending, not terminal).
async fn send_once(
    state: &AppState,
    record: &CampaignRecord,
    line: &Line,
    payload: &MessagePayload,
) -> Result<(String, bool), SendError> {
    match payload {
        MessagePayload::Wrapped(wrapper) => {
            // Greeting flow: open with small talk, defer the real content to
            // the reply flow. Template mode is forced off for this send.
            let opener = wrapper
                .greeting
                .choose(&mut rand::thread_rng())
                .cloned()
                .unwrap_or_else(|| "Ola!".to_string());
            let text = spintax::spin(&opener);

            let message_id = state
                .gateway
                .send_text(&line.instance_name, &record.phone, &text)
                .await
                .map_err(|e| SendError::Transient(e.to_string()))?;
            Ok((message_id, true))
        }

        MessagePayload::PlainText(text) if !record.use_template => {
            let resolved = spintax::spin(text);
            let message_id = state
                .gateway
                .send_text(&line.instance_name, &record.phone, &resolved)
                .await
                .map_err(|e| SendError::Transient(e.to_string()))?;
            Ok((message_id, false))
        }

        MessagePayload::PlainText(_) => {
            let template_id = record.template_id.as_deref().unwrap_or_default();
            let template = campaign_queries::get_template(&state.db, template_id)
                .await
                .map_err(|e| SendError::Fatal(ProcessError::Db(e)))?
                .ok_or_else(|| {
                    SendError::Fatal(ProcessError::TemplateNotFound(template_id.to_string()))
                })?;

            let message_id = send_template_message(state, record, line, &template).await?;
            Ok((message_id, false))
        }

        MessagePayload::Unparseable(_) => {
            // Filtered before the attempt loop.
            Err(SendError::Fatal(ProcessError::UnparseablePayload(record.id)))
        }
    }
}

/// Template-mode dispatch: render the body, then prefer the line's direct
/// Cloud API credentials; otherwise gateway template endpoint with a
/// plain-text fallback.
async fn send_template_message(
    state: &AppState,
    record: &CampaignRecord,
    line: &Line,
    tpl: &Template,
) -> Result<String, SendError> {
    let empty = HashMap::new();
    let ctx = RenderContext {
        contact_name: record.contact_name.as_deref(),
        phone: &record.phone,
        variables: &empty,
    };

    let variables: Vec<String> = match &record.template_variables {
        Some(vars) if !vars.is_empty() => vars.clone(),
        _ => template::discover_tokens(&tpl.body),
    };
    let rendered = template::render(&tpl.body, Some(&variables), &ctx);

    let components = vec![crate::services::gateway::TemplateComponent {
        kind: "body".to_string(),
        parameters: variables
            .iter()
            .map(|name| {
                let value = template::render(&format!("{{{{{name}}}}}"), Some(&variables), &ctx);
                serde_json::json!({ "type": "text", "text": value })
            })
            .collect(),
    }];

    if let Some(credentials) = &line.cloud_api {
        return state
            .cloud_api
            .send_template(credentials, &record.phone, &tpl.name, &tpl.language, &components)
            .await
            .map_err(|e| SendError::Transient(e.to_string()));
    }

    match state
        .gateway
        .send_template(&line.instance_name, &record.phone, &tpl.name, &tpl.language, &components)
        .await
    {
        Ok(id) => Ok(id),
        Err(e) => {
            tracing::warn!(
                line = %line.instance_name,
                error = %e,
                "template endpoint failed, falling back to plain text"
            );
            state
                .gateway
                .send_text(&line.instance_name, &record.phone, &rendered)
                .await
                .map_err(|e| SendError::Transient(e.to_string()))
        }
    }
}

/// Open the post-send conversation and assign an operator. The send already
/// happened: a routing failure must not put the job back on the queue.
async fn route_conversation(state: &AppState, record: &CampaignRecord, line: &Line) {
    let operators = match conversation_queries::line_operator_loads(&state.db, line.id).await {
        Ok(ops) => ops,
        Err(e) => {
            tracing::warn!(record_id = %record.id, error = %e, "operator load query failed");
            Vec::new()
        }
    };

    let assignee = routing::pick_operator(&operators);

    if let Err(e) = conversation_queries::create_conversation(
        &state.db,
        record.id,
        line.id,
        &record.phone,
        record.contact_name.as_deref(),
        assignee,
    )
    .await
    {
        tracing::warn!(record_id = %record.id, error = %e, "conversation routing failed");
    } else {
        tracing::debug!(
            record_id = %record.id,
            operator = ?assignee,
            "conversation routed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(status: DispatchStatus) -> CampaignRecord {
        CampaignRecord {
            id: Uuid::new_v4(),
            campaign_name: "promo".to_string(),
            contact_name: None,
            phone: "5511987654321".to_string(),
            segment: None,
            line_id: Uuid::new_v4(),
            message: "Oi".to_string(),
            use_template: false,
            template_id: None,
            template_variables: None,
            status,
            external_message_id: None,
            created_at: Utc::now(),
            dispatched_at: None,
            delivered: false,
            read: false,
            retry_count: 0,
        }
    }

    #[test]
    fn test_deleted_record_skips_silently() {
        assert_eq!(should_skip(None), Some(SkipReason::RecordDeleted));
    }

    #[test]
    fn test_paused_campaign_skips_silently() {
        let r = record(DispatchStatus::Paused);
        assert_eq!(should_skip(Some(&r)), Some(SkipReason::CampaignPaused));
    }

    #[test]
    fn test_terminal_record_skips() {
        let sent = record(DispatchStatus::Sent { message_id: "X".into() });
        assert_eq!(should_skip(Some(&sent)), Some(SkipReason::AlreadyTerminal));
        let failed = record(DispatchStatus::Failed { reason: "x".into() });
        assert_eq!(should_skip(Some(&failed)), Some(SkipReason::AlreadyTerminal));
    }

    #[test]
    fn test_scheduled_record_proceeds() {
        let r = record(DispatchStatus::Scheduled { at: Utc::now() });
        assert_eq!(should_skip(Some(&r)), None);
    }

    fn check(number: &str, exists: bool) -> NumberCheck {
        NumberCheck {
            number: number.to_string(),
            exists,
            jid: exists.then(|| format!("{number}@s.whatsapp.net")),
        }
    }

    #[test]
    fn test_explicitly_missing_number_blocks() {
        let checks = vec![check("5511987654321", false)];
        assert!(number_known_missing(&checks, "5511987654321"));
    }

    #[test]
    fn test_existing_number_sendable() {
        let checks = vec![check("5511987654321", true)];
        assert!(!number_known_missing(&checks, "5511987654321"));
    }

    #[test]
    fn test_absent_or_unrelated_entries_stay_sendable() {
        // An empty or mismatched validation response is not proof of absence.
        assert!(!number_known_missing(&[], "5511987654321"));
        let checks = vec![check("5511000000000", false)];
        assert!(!number_known_missing(&checks, "5511987654321"));
    }

    #[test]
    fn test_rate_limited_is_transient() {
        assert!(ProcessError::RateLimited("line-01".into()).is_transient());
        assert!(!ProcessError::TemplateNotFound("tpl".into()).is_transient());
        assert!(!ProcessError::LineInactive("line-01".into()).is_transient());
        assert!(!ProcessError::UnparseablePayload(Uuid::new_v4()).is_transient());
    }
}
