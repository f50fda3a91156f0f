//! Request store: help request lifecycle and wave bookkeeping.
//!
//! Every transition that can race (assignment, completion, exhaustion,
//! reopen) is a single guarded UPDATE whose `rows_affected` decides the
//! winner. SQLite serializes writers, so the guard closes the window where
//! two volunteers both pass a read-then-write check.

use super::DbError;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Terminal wave sentinel: the request ran out of volunteers.
pub const EXHAUSTED_WAVE: i64 = 99;

/// Request lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DbError::InvalidValue {
                field: "requests.status",
                value: other.to_string(),
            }),
        }
    }
}

/// Request urgency. Urgent requests are dispatched first within a timer pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    Urgent,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "normal" => Ok(Self::Normal),
            "urgent" => Ok(Self::Urgent),
            other => Err(DbError::InvalidValue {
                field: "requests.urgency",
                value: other.to_string(),
            }),
        }
    }
}

/// What kind of help is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// A call session in a leased chat room.
    Call,
    /// A photo description; no room, relaxed eligibility.
    Photo,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Photo => "photo",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "call" => Ok(Self::Call),
            "photo" => Ok(Self::Photo),
            other => Err(DbError::InvalidValue {
                field: "requests.kind",
                value: other.to_string(),
            }),
        }
    }
}

/// A help request.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub id: String,
    pub requester_id: i64,
    pub kind: RequestKind,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub assigned_volunteer_id: Option<i64>,
    pub current_wave: i64,
    pub last_wave_sent_at: Option<i64>,
    pub chat_room_id: Option<i64>,
    pub photo_url: Option<String>,
    pub created_at: i64,
    pub assigned_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl RequestRecord {
    /// Whether all wave attempts are spent with no acceptance.
    pub fn is_exhausted(&self) -> bool {
        self.status == RequestStatus::Pending && self.current_wave >= EXHAUSTED_WAVE
    }
}

/// One notification offer made to a volunteer for a request.
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    pub volunteer_id: i64,
    pub wave: i64,
    pub failed: bool,
    pub notified_at: i64,
}

type RequestRow = (
    String,
    i64,
    String,
    String,
    String,
    Option<i64>,
    i64,
    Option<i64>,
    Option<i64>,
    Option<String>,
    i64,
    Option<i64>,
    Option<i64>,
);

const REQUEST_COLUMNS: &str = "id, requester_id, kind, urgency, status, assigned_volunteer_id, \
     current_wave, last_wave_sent_at, chat_room_id, photo_url, created_at, assigned_at, \
     completed_at";

/// Repository for request operations.
pub struct RequestRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RequestRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new pending request. The id is a UUIDv7, so request ids sort
    /// by creation time.
    pub async fn create(
        &self,
        requester_id: i64,
        kind: RequestKind,
        urgency: Urgency,
        photo_url: Option<&str>,
    ) -> Result<RequestRecord, DbError> {
        let id = Uuid::now_v7().to_string();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO requests (id, requester_id, kind, urgency, status, photo_url, created_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(requester_id)
        .bind(kind.as_str())
        .bind(urgency.as_str())
        .bind(photo_url)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(RequestRecord {
            id,
            requester_id,
            kind,
            urgency,
            status: RequestStatus::Pending,
            assigned_volunteer_id: None,
            current_wave: 0,
            last_wave_sent_at: None,
            chat_room_id: None,
            photo_url: photo_url.map(String::from),
            created_at: now,
            assigned_at: None,
            completed_at: None,
        })
    }

    /// Find a request by id.
    pub async fn find(&self, id: &str) -> Result<Option<RequestRecord>, DbError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?");
        let row = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.map(Self::map_row).transpose()
    }

    /// Atomically assign a volunteer: succeeds only while the request is
    /// still pending, not exhausted, the volunteer holds no other active
    /// request, and the volunteer was not marked failed for this request.
    /// Returns false when the check-and-set loses.
    pub async fn try_assign(&self, id: &str, volunteer_id: i64) -> Result<bool, DbError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = 'active', assigned_volunteer_id = ?1, assigned_at = ?2
            WHERE id = ?3
              AND status = 'pending'
              AND current_wave < ?4
              AND NOT EXISTS (
                  SELECT 1 FROM requests r2
                  WHERE r2.assigned_volunteer_id = ?1 AND r2.status = 'active'
              )
              AND NOT EXISTS (
                  SELECT 1 FROM request_notifications n
                  WHERE n.request_id = ?3 AND n.volunteer_id = ?1 AND n.failed = 1
              )
            "#,
        )
        .bind(volunteer_id)
        .bind(now)
        .bind(id)
        .bind(EXHAUSTED_WAVE)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Roll an acceptance back (room binding failed). Only undoes the given
    /// volunteer's own assignment.
    pub async fn unassign(&self, id: &str, volunteer_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = 'pending', assigned_volunteer_id = NULL, assigned_at = NULL,
                chat_room_id = NULL
            WHERE id = ? AND status = 'active' AND assigned_volunteer_id = ?
            "#,
        )
        .bind(id)
        .bind(volunteer_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Complete an active request.
    pub async fn complete(&self, id: &str) -> Result<bool, DbError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE requests SET status = 'completed', completed_at = ? WHERE id = ? AND status = 'active'",
        )
        .bind(now)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Cancel a pending request. Only the original requester may cancel, and
    /// only before acceptance.
    pub async fn cancel(&self, id: &str, requester_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE requests SET status = 'cancelled' WHERE id = ? AND status = 'pending' AND requester_id = ?",
        )
        .bind(id)
        .bind(requester_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Link a leased chat room to the request.
    pub async fn set_chat_room(&self, id: &str, room_id: Option<i64>) -> Result<(), DbError> {
        sqlx::query("UPDATE requests SET chat_room_id = ? WHERE id = ?")
            .bind(room_id)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Record a sent wave: the expanded exclusion set plus the advanced wave
    /// counter, in one transaction. Skips quietly if the request stopped
    /// being pending while notifications were in flight.
    pub async fn record_wave(&self, id: &str, volunteer_ids: &[i64]) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE requests
            SET current_wave = current_wave + 1, last_wave_sent_at = ?
            WHERE id = ? AND status = 'pending'
            RETURNING current_wave
            "#,
        )
        .bind(now)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = result else {
            tx.rollback().await?;
            return Ok(());
        };
        let wave: i64 = sqlx::Row::get(&row, 0);

        for volunteer_id in volunteer_ids {
            sqlx::query(
                r#"
                INSERT INTO request_notifications (request_id, volunteer_id, wave, notified_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (request_id, volunteer_id) DO NOTHING
                "#,
            )
            .bind(id)
            .bind(volunteer_id)
            .bind(wave)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Declare a pending request out of volunteers. Returns true exactly once
    /// per request, which gates the single "no volunteers" notice.
    pub async fn mark_exhausted(&self, id: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE requests SET current_wave = ? WHERE id = ? AND status = 'pending' AND current_wave < ?",
        )
        .bind(EXHAUSTED_WAVE)
        .bind(id)
        .bind(EXHAUSTED_WAVE)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Pending requests overdue for dispatcher attention: the last wave (or
    /// creation, when no wave ever went out) is older than the interval and
    /// the request is not yet exhausted. Requests past their wave budget are
    /// included so the dispatcher can declare them exhausted. Urgent requests
    /// come first.
    pub async fn stale_pending(&self, older_than: i64) -> Result<Vec<RequestRecord>, DbError> {
        let sql = format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM requests
            WHERE status = 'pending'
              AND COALESCE(last_wave_sent_at, created_at) < ?
              AND current_wave < ?
            ORDER BY CASE urgency WHEN 'urgent' THEN 0 ELSE 1 END, created_at
            "#
        );

        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(older_than)
            .bind(EXHAUSTED_WAVE)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(Self::map_row).collect()
    }

    /// All notification offers recorded for a request, in offer order.
    pub async fn notifications(&self, id: &str) -> Result<Vec<NotificationRecord>, DbError> {
        let rows: Vec<(i64, i64, bool, i64)> = sqlx::query_as(
            r#"
            SELECT volunteer_id, wave, failed, notified_at
            FROM request_notifications
            WHERE request_id = ?
            ORDER BY wave, notified_at, volunteer_id
            "#,
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(volunteer_id, wave, failed, notified_at)| NotificationRecord {
                volunteer_id,
                wave,
                failed,
                notified_at,
            })
            .collect())
    }

    /// Reopen a request after "not helpful" feedback: the named volunteer is
    /// marked failed (permanently excluded for this request), everyone who
    /// was merely notified becomes eligible again, and the wave budget
    /// restarts from zero.
    pub async fn reopen_with_failed_volunteer(
        &self,
        id: &str,
        failed_volunteer_id: i64,
    ) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = 'pending', assigned_volunteer_id = NULL, assigned_at = NULL,
                current_wave = 0, last_wave_sent_at = NULL
            WHERE id = ? AND status = 'active' AND assigned_volunteer_id = ?
            "#,
        )
        .bind(id)
        .bind(failed_volunteer_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE request_notifications SET failed = 1 WHERE request_id = ? AND volunteer_id = ?",
        )
        .bind(id)
        .bind(failed_volunteer_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM request_notifications WHERE request_id = ? AND failed = 0")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    fn map_row(row: RequestRow) -> Result<RequestRecord, DbError> {
        let (
            id,
            requester_id,
            kind,
            urgency,
            status,
            assigned_volunteer_id,
            current_wave,
            last_wave_sent_at,
            chat_room_id,
            photo_url,
            created_at,
            assigned_at,
            completed_at,
        ) = row;

        Ok(RequestRecord {
            id,
            requester_id,
            kind: RequestKind::parse(&kind)?,
            urgency: Urgency::parse(&urgency)?,
            status: RequestStatus::parse(&status)?,
            assigned_volunteer_id,
            current_wave,
            last_wave_sent_at,
            chat_room_id,
            photo_url,
            created_at,
            assigned_at,
            completed_at,
        })
    }
}
