//! Nudge history storage.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::NudgeRecord;
use crate::Result;

/// Append a nudge to the pair's history.
pub async fn record_nudge(
    pool: &SqlitePool,
    bot_id: &str,
    user_id: &str,
    sent_at: DateTime<Utc>,
    delay_hours: f64,
    message: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO nudges (bot_id, user_id, sent_at, delay_hours, message, responded)
        VALUES (?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(bot_id)
    .bind(user_id)
    .bind(sent_at.to_rfc3339())
    .bind(delay_hours)
    .bind(message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark the most recent unanswered nudge for a pair as responded.
///
/// No-op when the pair has no unanswered nudge.
pub async fn mark_latest_responded(pool: &SqlitePool, bot_id: &str, user_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE nudges
        SET responded = 1
        WHERE id = (
            SELECT id FROM nudges
            WHERE bot_id = ? AND user_id = ? AND responded = 0
            ORDER BY id DESC
            LIMIT 1
        )
        "#,
    )
    .bind(bot_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// The delay tier of the last nudge sent to this pair, if any.
///
/// Used for monotonic trigger selection: a tier at or below this value
/// never fires again.
pub async fn last_nudge_delay(
    pool: &SqlitePool,
    bot_id: &str,
    user_id: &str,
) -> Result<Option<f64>> {
    let row: Option<(f64,)> = sqlx::query_as(
        r#"
        SELECT delay_hours FROM nudges
        WHERE bot_id = ? AND user_id = ?
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(bot_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(delay,)| delay))
}

/// Whether the last nudge for a pair has stop-after semantics recorded.
pub async fn history(pool: &SqlitePool, bot_id: &str, user_id: &str) -> Result<Vec<NudgeRecord>> {
    let rows = sqlx::query_as::<_, NudgeRecord>(
        r#"
        SELECT id, bot_id, user_id, sent_at, delay_hours, message, responded
        FROM nudges
        WHERE bot_id = ? AND user_id = ?
        ORDER BY id
        "#,
    )
    .bind(bot_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
