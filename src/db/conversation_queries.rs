use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::services::routing::OperatorLoad;

/// Operators bound to a line, with presence and current open-conversation
/// load, ordered by their binding position (the routing tie-break order).
pub async fn line_operator_loads(
    pool: &PgPool,
    line_id: Uuid,
) -> Result<Vec<OperatorLoad>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT
            o.id AS operator_id,
            o.online,
            COUNT(c.id) AS open_conversations
        FROM line_operators lo
        JOIN operators o ON o.id = lo.operator_id
        LEFT JOIN conversations c
            ON c.operator_id = o.id
            AND c.line_id = lo.line_id
            AND c.tabulated = FALSE
        WHERE lo.line_id = $1
        GROUP BY o.id, o.online, lo.position
        ORDER BY lo.position ASC
        "#,
    )
    .bind(line_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(OperatorLoad {
                operator_id: row.try_get("operator_id")?,
                online: row.try_get("online")?,
                open_conversations: row.try_get("open_conversations")?,
            })
        })
        .collect()
}

/// Open a conversation for a dispatched campaign record. `operator_id` of
/// `None` leaves it system-owned.
pub async fn create_conversation(
    pool: &PgPool,
    campaign_record_id: Uuid,
    line_id: Uuid,
    phone: &str,
    contact_name: Option<&str>,
    operator_id: Option<Uuid>,
) -> Result<Uuid, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO conversations (campaign_record_id, line_id, phone, contact_name, operator_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(campaign_record_id)
    .bind(line_id)
    .bind(phone)
    .bind(contact_name)
    .bind(operator_id)
    .fetch_one(pool)
    .await?;

    row.try_get("id")
}
