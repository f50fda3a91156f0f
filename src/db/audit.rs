//! Append-only audit trail of successful mutating actions.
//!
//! Failed and ineligible attempts append nothing; the trail records what
//! happened, not what was refused.

use super::DbError;
use sqlx::SqlitePool;

/// One audit trail entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: i64,
    pub action: String,
    pub target_kind: String,
    pub target_id: String,
    pub detail: Option<String>,
    pub created_at: i64,
}

/// Repository for the audit log.
pub struct AuditRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an entry. `detail` is optional structured JSON.
    pub async fn log(
        &self,
        actor_id: i64,
        action: &str,
        target_kind: &str,
        target_id: &str,
        detail: Option<serde_json::Value>,
    ) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO audit_log (actor_id, action, target_kind, target_id, detail, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(actor_id)
        .bind(action)
        .bind(target_kind)
        .bind(target_id)
        .bind(detail.map(|d| d.to_string()))
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Entries touching a given target, oldest first.
    pub async fn for_target(
        &self,
        target_kind: &str,
        target_id: &str,
    ) -> Result<Vec<AuditEntry>, DbError> {
        let rows: Vec<(i64, i64, String, String, String, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT id, actor_id, action, target_kind, target_id, detail, created_at
            FROM audit_log
            WHERE target_kind = ? AND target_id = ?
            ORDER BY id
            "#,
        )
        .bind(target_kind)
        .bind(target_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, actor_id, action, target_kind, target_id, detail, created_at)| AuditEntry {
                    id,
                    actor_id,
                    action,
                    target_kind,
                    target_id,
                    detail,
                    created_at,
                },
            )
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_log_and_read_back() {
        let db = Database::new(":memory:").await.unwrap();
        db.audit()
            .log(7, "accept_request", "request", "req-1", None)
            .await
            .unwrap();
        db.audit()
            .log(
                8,
                "rate_volunteer",
                "request",
                "req-1",
                Some(serde_json::json!({"rating": 5})),
            )
            .await
            .unwrap();

        let entries = db.audit().for_target("request", "req-1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "accept_request");
        assert!(entries[1].detail.as_deref().unwrap().contains("5"));
    }
}
