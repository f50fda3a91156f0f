//! Volunteer eligibility records: verification, blocking, and ratings.
//!
//! The composite eligibility predicate (verified/trusted, not blocked, not
//! already busy) lives here as SQL so wave candidate selection and the
//! acceptance check read the same definition.

use super::DbError;
use crate::db::requests::RequestKind;
use sqlx::SqlitePool;

/// Verification ladder for volunteers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Unverified,
    Pending,
    Verified,
    Trusted,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Trusted => "trusted",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "unverified" => Ok(Self::Unverified),
            "pending" => Ok(Self::Pending),
            "verified" => Ok(Self::Verified),
            "trusted" => Ok(Self::Trusted),
            other => Err(DbError::InvalidValue {
                field: "volunteers.verification_status",
                value: other.to_string(),
            }),
        }
    }

    /// Whether this status clears the bar for call requests.
    pub fn can_take_calls(&self) -> bool {
        matches!(self, Self::Verified | Self::Trusted)
    }
}

/// A volunteer's eligibility record.
#[derive(Debug, Clone)]
pub struct VolunteerRecord {
    pub user_id: i64,
    pub verification_status: VerificationStatus,
    pub is_blocked: bool,
    pub block_reason: Option<String>,
    pub blocked_at: Option<i64>,
    pub rating: f64,
    pub call_count: i64,
}

/// Repository for volunteer eligibility operations.
pub struct VolunteerRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> VolunteerRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Find a volunteer's eligibility record.
    pub async fn find(&self, user_id: i64) -> Result<Option<VolunteerRecord>, DbError> {
        let row = sqlx::query_as::<_, (i64, String, bool, Option<String>, Option<i64>, f64, i64)>(
            r#"
            SELECT user_id, verification_status, is_blocked, block_reason, blocked_at,
                   rating, call_count
            FROM volunteers
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Self::map_row).transpose()
    }

    /// Candidate ids for the next wave of a request: eligible volunteers not
    /// yet offered this request. Photo requests relax the verification bar;
    /// blocked and busy volunteers are excluded for every kind.
    ///
    /// Ordering is left to the caller (the dispatcher shuffles and caps).
    pub async fn eligible_for_wave(
        &self,
        request_id: &str,
        kind: RequestKind,
    ) -> Result<Vec<i64>, DbError> {
        let verification_filter = match kind {
            RequestKind::Call => "AND v.verification_status IN ('verified', 'trusted')",
            RequestKind::Photo => "",
        };

        let sql = format!(
            r#"
            SELECT v.user_id
            FROM volunteers v
            JOIN users u ON u.id = v.user_id
            WHERE u.role = 'volunteer'
              AND v.is_blocked = 0
              {verification_filter}
              AND v.user_id NOT IN (
                  SELECT volunteer_id FROM request_notifications WHERE request_id = ?
              )
              AND NOT EXISTS (
                  SELECT 1 FROM requests r
                  WHERE r.assigned_volunteer_id = v.user_id AND r.status = 'active'
              )
            "#
        );

        let rows: Vec<(i64,)> = sqlx::query_as(&sql)
            .bind(request_id)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Whether the volunteer currently holds an active request.
    pub async fn has_active_request(&self, user_id: i64) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM requests WHERE assigned_volunteer_id = ? AND status = 'active'",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Set the verification status directly (moderation resolution path).
    pub async fn set_verification_status(
        &self,
        user_id: i64,
        status: VerificationStatus,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE volunteers SET verification_status = ? WHERE user_id = ?")
            .bind(status.as_str())
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Block a volunteer, recording the reason and timestamp. One-way until
    /// manually unblocked.
    pub async fn block(&self, user_id: i64, reason: &str) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE volunteers
            SET is_blocked = 1, block_reason = ?, blocked_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(reason)
        .bind(now)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Manual unblock (moderator action; no self-service path exists).
    pub async fn unblock(&self, user_id: i64) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE volunteers
            SET is_blocked = 0, block_reason = NULL, blocked_at = NULL
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Record a completed-request review: stores the review row and folds the
    /// rating into the volunteer's running mean in one transaction.
    pub async fn record_review(
        &self,
        request_id: &str,
        volunteer_id: i64,
        rating: i64,
        comment: &str,
    ) -> Result<i64, DbError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO reviews (request_id, rating, comment, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(request_id)
        .bind(rating)
        .bind(comment)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let review_id = result.last_insert_rowid();

        sqlx::query(
            r#"
            UPDATE volunteers
            SET rating = ROUND(((rating * call_count) + ?) / (call_count + 1.0), 2),
                call_count = call_count + 1
            WHERE user_id = ?
            "#,
        )
        .bind(rating as f64)
        .bind(volunteer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(review_id)
    }

    fn map_row(
        row: (i64, String, bool, Option<String>, Option<i64>, f64, i64),
    ) -> Result<VolunteerRecord, DbError> {
        let (user_id, verification_status, is_blocked, block_reason, blocked_at, rating, call_count) =
            row;
        Ok(VolunteerRecord {
            user_id,
            verification_status: VerificationStatus::parse(&verification_status)?,
            is_blocked,
            block_reason,
            blocked_at,
            rating,
            call_count,
        })
    }
}
