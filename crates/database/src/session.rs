//! Session storage for (bot, user) conversation state.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::SessionRecord;
use crate::Result;

/// Load a session row, if one exists.
pub async fn get_session(
    pool: &SqlitePool,
    bot_id: &str,
    user_id: &str,
) -> Result<Option<SessionRecord>> {
    let record = sqlx::query_as::<_, SessionRecord>(
        r#"
        SELECT bot_id, user_id, agent_session_uuid, message_count,
               last_message_at, tts_preference, created_at, updated_at
        FROM sessions
        WHERE bot_id = ? AND user_id = ?
        "#,
    )
    .bind(bot_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Create the session row for a pair if it does not exist, then load it.
pub async fn ensure_session(
    pool: &SqlitePool,
    bot_id: &str,
    user_id: &str,
) -> Result<SessionRecord> {
    sqlx::query(
        r#"
        INSERT INTO sessions (bot_id, user_id)
        VALUES (?, ?)
        ON CONFLICT(bot_id, user_id) DO NOTHING
        "#,
    )
    .bind(bot_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    let record = get_session(pool, bot_id, user_id).await?;
    Ok(record.expect("session row exists after insert"))
}

/// Get the current agent session uuid for a pair.
pub async fn get_current_uuid(
    pool: &SqlitePool,
    bot_id: &str,
    user_id: &str,
) -> Result<Option<String>> {
    Ok(get_session(pool, bot_id, user_id)
        .await?
        .and_then(|s| s.agent_session_uuid))
}

/// Set the current agent session uuid for a pair.
pub async fn set_current_uuid(
    pool: &SqlitePool,
    bot_id: &str,
    user_id: &str,
    uuid: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (bot_id, user_id, agent_session_uuid, updated_at)
        VALUES (?, ?, ?, datetime('now'))
        ON CONFLICT(bot_id, user_id) DO UPDATE SET
            agent_session_uuid = excluded.agent_session_uuid,
            updated_at = datetime('now')
        "#,
    )
    .bind(bot_id)
    .bind(user_id)
    .bind(uuid)
    .execute(pool)
    .await?;

    Ok(())
}

/// Clear the current agent session uuid so the next turn starts fresh.
pub async fn reset_conversation(pool: &SqlitePool, bot_id: &str, user_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE sessions
        SET agent_session_uuid = NULL, updated_at = datetime('now')
        WHERE bot_id = ? AND user_id = ?
        "#,
    )
    .bind(bot_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Increment the pair's message count.
pub async fn increment_message_count(
    pool: &SqlitePool,
    bot_id: &str,
    user_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE sessions
        SET message_count = message_count + 1, updated_at = datetime('now')
        WHERE bot_id = ? AND user_id = ?
        "#,
    )
    .bind(bot_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record the time of the user's last message.
pub async fn update_last_message_time(
    pool: &SqlitePool,
    bot_id: &str,
    user_id: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE sessions
        SET last_message_at = ?, updated_at = datetime('now')
        WHERE bot_id = ? AND user_id = ?
        "#,
    )
    .bind(at.to_rfc3339())
    .bind(bot_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get the per-user voice override. `None` means "use brain default".
pub async fn get_tts_preference(
    pool: &SqlitePool,
    bot_id: &str,
    user_id: &str,
) -> Result<Option<bool>> {
    Ok(get_session(pool, bot_id, user_id)
        .await?
        .and_then(|s| s.tts_preference))
}

/// Set or clear the per-user voice override.
pub async fn set_tts_preference(
    pool: &SqlitePool,
    bot_id: &str,
    user_id: &str,
    preference: Option<bool>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (bot_id, user_id, tts_preference, updated_at)
        VALUES (?, ?, ?, datetime('now'))
        ON CONFLICT(bot_id, user_id) DO UPDATE SET
            tts_preference = excluded.tts_preference,
            updated_at = datetime('now')
        "#,
    )
    .bind(bot_id)
    .bind(user_id)
    .bind(preference)
    .execute(pool)
    .await?;

    Ok(())
}

/// All user ids with a session row for this bot.
pub async fn all_users_for_bot(pool: &SqlitePool, bot_id: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT user_id FROM sessions WHERE bot_id = ? ORDER BY user_id
        "#,
    )
    .bind(bot_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
