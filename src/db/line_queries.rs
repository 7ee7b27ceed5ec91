use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::line::{CloudApiCredentials, Line};

fn line_from_row(row: &sqlx::postgres::PgRow) -> Result<Line, sqlx::Error> {
    let token: Option<String> = row.try_get("cloud_api_token")?;
    let number_id: Option<String> = row.try_get("cloud_api_number_id")?;
    let cloud_api = match (token, number_id) {
        (Some(token), Some(number_id)) => Some(CloudApiCredentials { token, number_id }),
        _ => None,
    };

    Ok(Line {
        id: row.try_get("id")?,
        instance_name: row.try_get("instance_name")?,
        active: row.try_get("active")?,
        segment: row.try_get("segment")?,
        created_at: row.try_get("created_at")?,
        reputation_score: row.try_get("reputation_score")?,
        cloud_api,
    })
}

const LINE_COLUMNS: &str = "id, instance_name, active, segment, created_at, reputation_score, \
                            cloud_api_token, cloud_api_number_id";

/// Get a line by id
pub async fn get_line(pool: &PgPool, line_id: Uuid) -> Result<Option<Line>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {LINE_COLUMNS} FROM lines WHERE id = $1"))
        .bind(line_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(line_from_row).transpose()
}

/// All active lines, any segment (presence cycle input)
pub async fn active_lines(pool: &PgPool) -> Result<Vec<Line>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {LINE_COLUMNS} FROM lines WHERE active = TRUE ORDER BY created_at ASC"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(line_from_row).collect()
}

/// Active lines in one segment, stable order for round-robin assignment
pub async fn active_lines_in_segment(
    pool: &PgPool,
    segment: &str,
) -> Result<Vec<Line>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {LINE_COLUMNS} FROM lines WHERE active = TRUE AND segment = $1 ORDER BY created_at ASC"
    ))
    .bind(segment)
    .fetch_all(pool)
    .await?;

    rows.iter().map(line_from_row).collect()
}

/// Count dispatched messages for a line since UTC midnight and over the
/// trailing hour. Reads historical records rather than an in-memory counter
/// so limits survive process restarts.
///
/// The daily window is pinned to UTC so it does not move with the database
/// session's timezone setting.
pub async fn sent_window_counts(pool: &PgPool, line_id: Uuid) -> Result<(i64, i64), sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) FILTER (
                WHERE dispatched_at >= date_trunc('day', NOW() AT TIME ZONE 'UTC') AT TIME ZONE 'UTC'
            ) AS today,
            COUNT(*) FILTER (WHERE dispatched_at >= NOW() - INTERVAL '1 hour') AS last_hour
        FROM campaign_records
        WHERE line_id = $1 AND dispatched_at IS NOT NULL
        "#,
    )
    .bind(line_id)
    .fetch_one(pool)
    .await?;

    Ok((row.try_get("today")?, row.try_get("last_hour")?))
}
