use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::campaign::{CampaignRecord, DispatchStatus, NewCampaignRecord, Template};

fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<CampaignRecord, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = DispatchStatus::from_columns(
        &status_str,
        row.try_get("scheduled_at")?,
        row.try_get("external_message_id")?,
        row.try_get("failure_reason")?,
    );

    let template_variables: Option<serde_json::Value> = row.try_get("template_variables")?;
    let template_variables =
        template_variables.and_then(|v| serde_json::from_value::<Vec<String>>(v).ok());

    Ok(CampaignRecord {
        id: row.try_get("id")?,
        campaign_name: row.try_get("campaign_name")?,
        contact_name: row.try_get("contact_name")?,
        phone: row.try_get("phone")?,
        segment: row.try_get("segment")?,
        line_id: row.try_get("line_id")?,
        message: row.try_get("message")?,
        use_template: row.try_get("use_template")?,
        template_id: row.try_get("template_id")?,
        template_variables,
        status,
        external_message_id: row.try_get("external_message_id")?,
        created_at: row.try_get("created_at")?,
        dispatched_at: row.try_get("dispatched_at")?,
        delivered: row.try_get("delivered")?,
        read: row.try_get("read")?,
        retry_count: row.try_get("retry_count")?,
    })
}

const RECORD_COLUMNS: &str = "id, campaign_name, contact_name, phone, segment, line_id, message, \
                              use_template, template_id, template_variables, status, scheduled_at, \
                              external_message_id, failure_reason, created_at, dispatched_at, \
                              delivered, read, retry_count";

/// Insert a scheduled campaign record. Generic over the executor so the
/// scheduler can run a whole batch inside one transaction.
pub async fn create_record<'e, E>(
    executor: E,
    new: &NewCampaignRecord,
) -> Result<CampaignRecord, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    let template_variables = new
        .template_variables
        .as_ref()
        .map(|v| serde_json::to_value(v).unwrap_or(serde_json::Value::Null));

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO campaign_records
            (campaign_name, contact_name, phone, segment, line_id, message,
             use_template, template_id, template_variables, status, scheduled_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'scheduled', $10)
        RETURNING {RECORD_COLUMNS}
        "#
    ))
    .bind(&new.campaign_name)
    .bind(&new.contact_name)
    .bind(&new.phone)
    .bind(&new.segment)
    .bind(new.line_id)
    .bind(&new.message)
    .bind(new.use_template)
    .bind(&new.template_id)
    .bind(template_variables)
    .bind(new.scheduled_at)
    .fetch_one(executor)
    .await?;

    record_from_row(&row)
}

/// Get a record by id
pub async fn get_record(pool: &PgPool, id: Uuid) -> Result<Option<CampaignRecord>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {RECORD_COLUMNS} FROM campaign_records WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// Stamp a successful send. A terminal send becomes `sent`; a greeting send
/// keeps its `scheduled` status (pending the reply flow) but records the
/// external id and dispatch time.
pub async fn mark_dispatched(
    pool: &PgPool,
    id: Uuid,
    external_message_id: &str,
    terminal: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE campaign_records
        SET status = CASE WHEN $2 THEN 'sent' ELSE status END,
            external_message_id = $3,
            dispatched_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(terminal)
    .bind(external_message_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Move a record to terminal failure
pub async fn mark_failed(
    pool: &PgPool,
    id: Uuid,
    reason: &str,
    retry_count: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE campaign_records
        SET status = 'failed', failure_reason = $2, retry_count = $3
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(reason)
    .bind(retry_count)
    .execute(pool)
    .await?;

    Ok(())
}

/// Increment retry count, returning the new value
pub async fn increment_retry_count(pool: &PgPool, id: Uuid) -> Result<i32, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE campaign_records
        SET retry_count = retry_count + 1
        WHERE id = $1
        RETURNING retry_count
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    row.try_get("retry_count")
}

/// Pause every still-scheduled record of a campaign. Already-queued jobs
/// observe the pause at their validate step.
pub async fn pause_campaign(pool: &PgPool, campaign_name: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE campaign_records SET status = 'paused' WHERE campaign_name = $1 AND status = 'scheduled'",
    )
    .bind(campaign_name)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete every record of a campaign (the only deletion path)
pub async fn delete_campaign(pool: &PgPool, campaign_name: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM campaign_records WHERE campaign_name = $1")
        .bind(campaign_name)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Per-status record counts for a campaign
pub async fn status_counts(
    pool: &PgPool,
    campaign_name: &str,
) -> Result<HashMap<String, i64>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT status, COUNT(*) AS count FROM campaign_records WHERE campaign_name = $1 GROUP BY status",
    )
    .bind(campaign_name)
    .fetch_all(pool)
    .await?;

    let mut counts = HashMap::new();
    for row in rows {
        counts.insert(row.try_get("status")?, row.try_get("count")?);
    }
    Ok(counts)
}

/// Fetch a message template by id
pub async fn get_template(pool: &PgPool, template_id: &str) -> Result<Option<Template>, sqlx::Error> {
    let row = sqlx::query("SELECT id, name, language, body FROM templates WHERE id = $1")
        .bind(template_id)
        .fetch_optional(pool)
        .await?;

    Ok(match row {
        Some(r) => Some(Template {
            id: r.try_get("id")?,
            name: r.try_get("name")?,
            language: r.try_get("language")?,
            body: r.try_get("body")?,
        }),
        None => None,
    })
}

/// Log a template-mode send failure for later inspection
pub async fn record_template_failure(
    pool: &PgPool,
    record_id: Uuid,
    template_id: Option<&str>,
    error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO template_failures (campaign_record_id, template_id, error) VALUES ($1, $2, $3)",
    )
    .bind(record_id)
    .bind(template_id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}
