//! Per-actor conversation state with TTL.
//!
//! Replaces process-global "waiting for next message" maps: state lives in
//! the database keyed by actor id, so it survives restarts and works across
//! instances. Expired rows are treated as absent and purged periodically.

use super::DbError;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// What the next free-form message from an actor means.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationState {
    /// Requester is about to describe a complaint.
    AwaitingComplaintReason { request_id: String, volunteer_id: i64 },
    /// Volunteer is about to send verification documents.
    AwaitingVerificationDocs,
    /// Requester is about to send a photo for description.
    AwaitingPhotoUpload,
    /// Volunteer is composing a description for a photo request.
    ComposingDescription { request_id: String },
}

/// Repository for conversation state.
pub struct ConversationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ConversationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Set the actor's state, replacing any previous one.
    pub async fn put(
        &self,
        actor_id: i64,
        state: &ConversationState,
        ttl_secs: u64,
    ) -> Result<(), DbError> {
        let encoded = serde_json::to_string(state)
            .map_err(|e| DbError::Internal(format!("state encode: {e}")))?;
        let expires_at = chrono::Utc::now().timestamp() + ttl_secs as i64;

        sqlx::query(
            r#"
            INSERT INTO conversation_states (actor_id, state, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT (actor_id) DO UPDATE SET state = excluded.state, expires_at = excluded.expires_at
            "#,
        )
        .bind(actor_id)
        .bind(encoded)
        .bind(expires_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Get-and-delete the actor's state. Expired rows count as absent.
    pub async fn take(&self, actor_id: i64) -> Result<Option<ConversationState>, DbError> {
        let now = chrono::Utc::now().timestamp();
        let row: Option<(String, i64)> = sqlx::query_as(
            "DELETE FROM conversation_states WHERE actor_id = ? RETURNING state, expires_at",
        )
        .bind(actor_id)
        .fetch_optional(self.pool)
        .await?;

        let Some((encoded, expires_at)) = row else {
            return Ok(None);
        };
        if expires_at <= now {
            return Ok(None);
        }

        serde_json::from_str(&encoded)
            .map(Some)
            .map_err(|e| DbError::Internal(format!("state decode: {e}")))
    }

    /// Drop the actor's state without reading it.
    pub async fn clear(&self, actor_id: i64) -> Result<(), DbError> {
        sqlx::query("DELETE FROM conversation_states WHERE actor_id = ?")
            .bind(actor_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Remove expired rows. Returns how many were purged.
    pub async fn purge_expired(&self) -> Result<u64, DbError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query("DELETE FROM conversation_states WHERE expires_at <= ?")
            .bind(now)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_take_consumes_state() {
        let db = Database::new(":memory:").await.unwrap();
        let state = ConversationState::ComposingDescription {
            request_id: "req-1".into(),
        };
        db.conversation().put(7, &state, 60).await.unwrap();

        assert_eq!(db.conversation().take(7).await.unwrap(), Some(state));
        // take is get-and-delete
        assert!(db.conversation().take(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_previous_state() {
        let db = Database::new(":memory:").await.unwrap();
        db.conversation()
            .put(7, &ConversationState::AwaitingPhotoUpload, 60)
            .await
            .unwrap();
        db.conversation()
            .put(7, &ConversationState::AwaitingVerificationDocs, 60)
            .await
            .unwrap();

        assert_eq!(
            db.conversation().take(7).await.unwrap(),
            Some(ConversationState::AwaitingVerificationDocs)
        );
    }

    #[tokio::test]
    async fn test_expired_state_is_absent() {
        let db = Database::new(":memory:").await.unwrap();
        db.conversation()
            .put(7, &ConversationState::AwaitingPhotoUpload, 0)
            .await
            .unwrap();

        assert!(db.conversation().take(7).await.unwrap().is_none());

        db.conversation()
            .put(8, &ConversationState::AwaitingPhotoUpload, 0)
            .await
            .unwrap();
        assert_eq!(db.conversation().purge_expired().await.unwrap(), 1);
    }
}
