//! Daily rate counters.
//!
//! The allow/deny decision lives in the orchestrator; this module only
//! stores per-day counts keyed by UTC date.

use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::Result;

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Messages counted for a pair on the given UTC day.
pub async fn count_for_day(
    pool: &SqlitePool,
    bot_id: &str,
    user_id: &str,
    day: NaiveDate,
) -> Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT count FROM rate_counters
        WHERE bot_id = ? AND user_id = ? AND day = ?
        "#,
    )
    .bind(bot_id)
    .bind(user_id)
    .bind(day_key(day))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(count,)| count).unwrap_or(0))
}

/// Increment the pair's counter for the given UTC day.
pub async fn increment(
    pool: &SqlitePool,
    bot_id: &str,
    user_id: &str,
    day: NaiveDate,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO rate_counters (bot_id, user_id, day, count)
        VALUES (?, ?, ?, 1)
        ON CONFLICT(bot_id, user_id, day) DO UPDATE SET
            count = count + 1
        "#,
    )
    .bind(bot_id)
    .bind(user_id)
    .bind(day_key(day))
    .execute(pool)
    .await?;

    Ok(())
}
