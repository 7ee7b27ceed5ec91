//! Dispatch scheduling: turn a contact batch into staggered, line-assigned
//! campaign records plus one delayed queue job per contact.

use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::PgPool;
use std::time::Duration;

use crate::db::{campaign_queries, line_queries};
use crate::models::campaign::NewCampaignRecord;
use crate::models::contact::Contact;
use crate::models::line::Line;
use crate::services::queue::{JobQueue, QueueError, SendJob};

/// Per-contact delay bounds (seconds).
pub const CONTACT_DELAY_MIN_SECS: u64 = 30;
pub const CONTACT_DELAY_MAX_SECS: u64 = 150;

/// After every full group of this many contacts, one extra long pause.
pub const LONG_PAUSE_GROUP: usize = 20;
pub const LONG_PAUSE_MIN_SECS: u64 = 5 * 60;
pub const LONG_PAUSE_MAX_SECS: u64 = 15 * 60;

/// Opener phrases for the greeting flow. The worker picks one at random at
/// send time and applies spintax, so the first contact is small talk rather
/// than a pitch.
const OPENERS: &[&str] = &[
    "Oi, tudo bem?",
    "Ola! Tudo certo por ai?",
    "Oi! Como vai?",
    "Ola, {tudo bem|tudo certo}? Posso falar com voce {um minuto|rapidinho}?",
];

/// Content sentinel telling the reply flow to continue with the campaign
/// template instead of free text.
const TEMPLATE_FLOW_CONTENT: &str = "templateFlow";

/// Randomizable promo content used when the campaign is free-text and the
/// contact row carried no explicit message.
const PROMO_CONTENT: &str =
    "{Temos|Estamos com} uma {novidade|condicao especial} para voce. {Posso te contar?|Quer saber mais?}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Text,
    Template,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no active line available for segment '{0}'")]
    NoActiveLine(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Aggregate summary of a scheduled batch.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub total_contacts: usize,
    pub lines_used: usize,
    pub average_delay_secs: u64,
    pub estimated_completion: DateTime<Utc>,
}

/// Batch parameters resolved by the API layer.
#[derive(Debug)]
pub struct DispatchParams {
    pub campaign_name: String,
    pub segment: String,
    pub mode: DeliveryMode,
    pub template_id: Option<String>,
    pub template_variables: Option<Vec<String>>,
}

/// Compute the accumulated delay per contact: strictly non-decreasing, one
/// uniform 30-150s step each, plus one long 5-15min pause after every full
/// group of 20 when more contacts follow.
pub fn plan_delays<R: Rng + ?Sized>(contact_count: usize, rng: &mut R) -> Vec<Duration> {
    let mut delays = Vec::with_capacity(contact_count);
    let mut accumulated_ms: u64 = 0;

    for i in 0..contact_count {
        if i > 0 && i % LONG_PAUSE_GROUP == 0 {
            accumulated_ms +=
                rng.gen_range(LONG_PAUSE_MIN_SECS * 1000..=LONG_PAUSE_MAX_SECS * 1000);
        }
        accumulated_ms +=
            rng.gen_range(CONTACT_DELAY_MIN_SECS * 1000..=CONTACT_DELAY_MAX_SECS * 1000);
        delays.push(Duration::from_millis(accumulated_ms));
    }

    delays
}

/// Round-robin line index for a contact position.
pub fn line_index(contact_index: usize, pool_size: usize) -> usize {
    contact_index % pool_size
}

/// Build the greeting-wrapper payload for a contact without an explicit
/// message.
pub fn greeting_wrapper(contact: &Contact, mode: DeliveryMode) -> String {
    let content = match mode {
        DeliveryMode::Template => TEMPLATE_FLOW_CONTENT,
        DeliveryMode::Text => PROMO_CONTENT,
    };
    serde_json::json!({
        "greeting": OPENERS,
        "content": content,
        "csvVariables": contact.variables,
    })
    .to_string()
}

/// Resolve the eligible line pool: active lines in the campaign segment,
/// falling back to the default segment. Empty result rejects the dispatch.
async fn resolve_line_pool(
    pool: &PgPool,
    segment: &str,
    default_segment: &str,
) -> Result<Vec<Line>, DispatchError> {
    let mut lines = line_queries::active_lines_in_segment(pool, segment).await?;
    if lines.is_empty() && segment != default_segment {
        lines = line_queries::active_lines_in_segment(pool, default_segment).await?;
    }
    if lines.is_empty() {
        return Err(DispatchError::NoActiveLine(segment.to_string()));
    }
    Ok(lines)
}

/// Schedule a batch: resolve the line pool, assign lines round-robin,
/// compute staggered delays, persist one record per contact and enqueue the
/// matching delayed job. Contacts carrying an explicit message send it
/// verbatim; the rest get the greeting wrapper.
///
/// The line-pool check happens before any record is created, and all
/// records land in one transaction, so a rejected or mid-batch-failed
/// upload leaves no partial campaign state. Jobs are enqueued only after
/// the commit; a record whose job cannot be enqueued is failed on the spot
/// rather than left scheduled forever.
pub async fn dispatch(
    db: &PgPool,
    queue: &JobQueue,
    default_segment: &str,
    params: &DispatchParams,
    contacts: &[(Contact, Option<String>)],
) -> Result<DispatchOutcome, DispatchError> {
    let lines = resolve_line_pool(db, &params.segment, default_segment).await?;
    let delays = plan_delays(contacts.len(), &mut rand::thread_rng());
    let now = Utc::now();

    let mut tx = db.begin().await?;
    let mut record_ids = Vec::with_capacity(contacts.len());

    for (i, (contact, explicit)) in contacts.iter().enumerate() {
        let line = &lines[line_index(i, lines.len())];
        let scheduled_at = now + chrono::Duration::milliseconds(delays[i].as_millis() as i64);

        let message = match explicit {
            Some(text) => text.clone(),
            None => greeting_wrapper(contact, params.mode),
        };

        let record = campaign_queries::create_record(
            &mut *tx,
            &NewCampaignRecord {
                campaign_name: params.campaign_name.clone(),
                contact_name: contact.name.clone(),
                phone: contact.phone.clone(),
                segment: Some(params.segment.clone()),
                line_id: line.id,
                message,
                use_template: params.mode == DeliveryMode::Template,
                template_id: params.template_id.clone(),
                template_variables: params.template_variables.clone(),
                scheduled_at,
            },
        )
        .await?;

        record_ids.push(record.id);
    }

    tx.commit().await?;

    for (i, record_id) in record_ids.iter().enumerate() {
        let job = SendJob {
            record_id: *record_id,
            campaign_name: params.campaign_name.clone(),
            attempt: 0,
        };
        if let Err(e) = queue.enqueue(&job, delays[i]).await {
            // From this record on nothing has a job; without intervention
            // those rows would sit scheduled forever. Fail them so the
            // status query tells the truth. Earlier records keep their jobs
            // and proceed normally.
            for orphan in &record_ids[i..] {
                if let Err(db_err) =
                    campaign_queries::mark_failed(db, *orphan, "job enqueue failed", 0).await
                {
                    tracing::error!(
                        record_id = %orphan,
                        error = %db_err,
                        "could not fail record without a queued job"
                    );
                }
            }
            return Err(e.into());
        }
    }

    let total = contacts.len();
    let total_delay_secs: u64 = delays.iter().map(|d| d.as_secs()).sum();
    let last_delay = delays.last().copied().unwrap_or_default();

    metrics::counter!("campaign_contacts_scheduled").increment(total as u64);

    tracing::info!(
        campaign = %params.campaign_name,
        total_contacts = total,
        lines_used = lines.len().min(total),
        "campaign batch scheduled"
    );

    Ok(DispatchOutcome {
        total_contacts: total,
        lines_used: lines.len().min(total),
        average_delay_secs: if total == 0 { 0 } else { total_delay_secs / total as u64 },
        estimated_completion: now + chrono::Duration::milliseconds(last_delay.as_millis() as i64),
    })
}
