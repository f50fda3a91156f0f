//! Moderation workflows: verification requests and complaints.
//!
//! Both are append-only three-state records. Resolution is a guarded UPDATE
//! (`status = 'pending'` precondition), so resolving twice is refused rather
//! than applied twice, and the eligibility mutation rides the same
//! transaction as the status flip.

use super::DbError;
use crate::db::volunteers::VerificationStatus;
use sqlx::SqlitePool;

/// Verification request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl VerificationRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DbError::InvalidValue {
                field: "verification_requests.status",
                value: other.to_string(),
            }),
        }
    }
}

/// Complaint status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplaintStatus {
    Pending,
    ResolvedBlock,
    ResolvedDismiss,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ResolvedBlock => "resolved_block",
            Self::ResolvedDismiss => "resolved_dismiss",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved_block" => Ok(Self::ResolvedBlock),
            "resolved_dismiss" => Ok(Self::ResolvedDismiss),
            other => Err(DbError::InvalidValue {
                field: "complaints.status",
                value: other.to_string(),
            }),
        }
    }
}

/// A verification request from a volunteer.
#[derive(Debug, Clone)]
pub struct VerificationRecord {
    pub id: i64,
    pub volunteer_id: i64,
    pub document_urls: Vec<String>,
    pub comment: Option<String>,
    pub status: VerificationRequestStatus,
    pub created_at: i64,
}

/// A complaint filed by a requester against a volunteer.
#[derive(Debug, Clone)]
pub struct ComplaintRecord {
    pub id: i64,
    pub request_id: String,
    pub complainant_id: i64,
    pub accused_id: i64,
    pub reason: String,
    pub status: ComplaintStatus,
    pub created_at: i64,
}

/// Repository for moderation workflows.
pub struct ModerationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ModerationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// File a verification request. Only one pending request per volunteer is
    /// permitted; duplicates return None and mutate nothing. On success the
    /// volunteer's ladder moves to `pending`.
    pub async fn create_verification(
        &self,
        volunteer_id: i64,
        document_urls: &[String],
        comment: Option<&str>,
    ) -> Result<Option<i64>, DbError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM verification_requests WHERE volunteer_id = ? AND status = 'pending'",
        )
        .bind(volunteer_id)
        .fetch_one(&mut *tx)
        .await?;

        if pending > 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let encoded = serde_json::to_string(document_urls)
            .map_err(|e| DbError::Internal(format!("document url encode: {e}")))?;

        let result = sqlx::query(
            r#"
            INSERT INTO verification_requests (volunteer_id, document_urls, comment, status, created_at)
            VALUES (?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(volunteer_id)
        .bind(encoded)
        .bind(comment)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE volunteers SET verification_status = 'pending' WHERE user_id = ?")
            .bind(volunteer_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(result.last_insert_rowid()))
    }

    /// Verification requests awaiting review, oldest first.
    pub async fn pending_verifications(&self) -> Result<Vec<VerificationRecord>, DbError> {
        let rows: Vec<(i64, i64, String, Option<String>, String, i64)> = sqlx::query_as(
            r#"
            SELECT id, volunteer_id, document_urls, comment, status, created_at
            FROM verification_requests
            WHERE status = 'pending'
            ORDER BY created_at
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, volunteer_id, urls, comment, status, created_at)| {
                Ok(VerificationRecord {
                    id,
                    volunteer_id,
                    document_urls: serde_json::from_str(&urls).unwrap_or_default(),
                    comment,
                    status: VerificationRequestStatus::parse(&status)?,
                    created_at,
                })
            })
            .collect()
    }

    /// Resolve a pending verification request. Approval promotes the
    /// volunteer to `verified`; rejection resets them to `unverified` so they
    /// may resubmit. Returns the volunteer id, or None if the request was
    /// already resolved (or unknown).
    pub async fn resolve_verification(
        &self,
        verification_id: i64,
        moderator_id: i64,
        approve: bool,
        note: Option<&str>,
    ) -> Result<Option<i64>, DbError> {
        let now = chrono::Utc::now().timestamp();
        let new_status = if approve { "approved" } else { "rejected" };
        let mut tx = self.pool.begin().await?;

        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE verification_requests
            SET status = ?, resolved_by = ?, resolution_note = ?, resolved_at = ?
            WHERE id = ? AND status = 'pending'
            RETURNING volunteer_id
            "#,
        )
        .bind(new_status)
        .bind(moderator_id)
        .bind(note)
        .bind(now)
        .bind(verification_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((volunteer_id,)) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let ladder = if approve {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Unverified
        };
        sqlx::query("UPDATE volunteers SET verification_status = ? WHERE user_id = ?")
            .bind(ladder.as_str())
            .bind(volunteer_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(volunteer_id))
    }

    // =========================================================================
    // Complaints
    // =========================================================================

    /// File a complaint against a volunteer.
    pub async fn create_complaint(
        &self,
        request_id: &str,
        complainant_id: i64,
        accused_id: i64,
        reason: &str,
    ) -> Result<i64, DbError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO complaints (request_id, complainant_id, accused_id, reason, status, created_at)
            VALUES (?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(request_id)
        .bind(complainant_id)
        .bind(accused_id)
        .bind(reason)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Complaints awaiting review, oldest first.
    pub async fn pending_complaints(&self) -> Result<Vec<ComplaintRecord>, DbError> {
        let rows: Vec<(i64, String, i64, i64, String, String, i64)> = sqlx::query_as(
            r#"
            SELECT id, request_id, complainant_id, accused_id, reason, status, created_at
            FROM complaints
            WHERE status = 'pending'
            ORDER BY created_at
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(id, request_id, complainant_id, accused_id, reason, status, created_at)| {
                    Ok(ComplaintRecord {
                        id,
                        request_id,
                        complainant_id,
                        accused_id,
                        reason,
                        status: ComplaintStatus::parse(&status)?,
                        created_at,
                    })
                },
            )
            .collect()
    }

    /// Resolve a pending complaint. `block = true` blocks the accused
    /// volunteer with the given note as reason; dismissal mutates nothing
    /// beyond the complaint row. Returns the accused volunteer id, or None if
    /// the complaint was already resolved.
    pub async fn resolve_complaint(
        &self,
        complaint_id: i64,
        moderator_id: i64,
        block: bool,
        note: &str,
    ) -> Result<Option<i64>, DbError> {
        let now = chrono::Utc::now().timestamp();
        let new_status = if block { "resolved_block" } else { "resolved_dismiss" };
        let mut tx = self.pool.begin().await?;

        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE complaints
            SET status = ?, resolved_by = ?, resolution_note = ?, resolved_at = ?
            WHERE id = ? AND status = 'pending'
            RETURNING accused_id
            "#,
        )
        .bind(new_status)
        .bind(moderator_id)
        .bind(note)
        .bind(now)
        .bind(complaint_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((accused_id,)) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        if block {
            sqlx::query(
                "UPDATE volunteers SET is_blocked = 1, block_reason = ?, blocked_at = ? WHERE user_id = ?",
            )
            .bind(note)
            .bind(now)
            .bind(accused_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(accused_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, Role};

    async fn seed(db: &Database, id: i64) {
        db.users().upsert(id, "vol", Role::Volunteer).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_pending_verification_rejected() {
        let db = Database::new(":memory:").await.unwrap();
        seed(&db, 1).await;

        let first = db
            .moderation()
            .create_verification(1, &["https://x/doc.jpg".into()], None)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = db
            .moderation()
            .create_verification(1, &["https://x/doc2.jpg".into()], None)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_approval_promotes_rejection_resets() {
        let db = Database::new(":memory:").await.unwrap();
        seed(&db, 1).await;
        seed(&db, 2).await;

        let a = db
            .moderation()
            .create_verification(1, &[], Some("docs attached"))
            .await
            .unwrap()
            .unwrap();
        let b = db
            .moderation()
            .create_verification(2, &[], None)
            .await
            .unwrap()
            .unwrap();

        db.moderation()
            .resolve_verification(a, 99, true, None)
            .await
            .unwrap();
        db.moderation()
            .resolve_verification(b, 99, false, Some("docs unreadable"))
            .await
            .unwrap();

        let v1 = db.volunteers().find(1).await.unwrap().unwrap();
        let v2 = db.volunteers().find(2).await.unwrap().unwrap();
        assert!(v1.verification_status.can_take_calls());
        // Rejection is not a persistent state: back to unverified, may resubmit
        assert_eq!(v2.verification_status.as_str(), "unverified");
        assert!(
            db.moderation()
                .create_verification(2, &[], None)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_resolution_is_single_shot() {
        let db = Database::new(":memory:").await.unwrap();
        seed(&db, 1).await;

        let id = db
            .moderation()
            .create_complaint("req-1", 50, 1, "rude")
            .await
            .unwrap();

        let first = db
            .moderation()
            .resolve_complaint(id, 99, true, "blocked on complaint")
            .await
            .unwrap();
        assert_eq!(first, Some(1));

        let second = db
            .moderation()
            .resolve_complaint(id, 99, false, "changed my mind")
            .await
            .unwrap();
        assert!(second.is_none());

        let volunteer = db.volunteers().find(1).await.unwrap().unwrap();
        assert!(volunteer.is_blocked);
    }
}
