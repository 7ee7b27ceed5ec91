//! Blocklist collaborator. Consumed as a black-box service with one
//! question: is this phone blocked? A hit terminally fails the record and
//! is never retried.

use sqlx::PgPool;

/// Whether a canonical phone is on the blocklist.
pub async fn is_blocked(pool: &PgPool, phone: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM blocklist WHERE phone = $1)")
        .bind(phone)
        .fetch_one(pool)
        .await
}
