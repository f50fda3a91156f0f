//! Chat room pool: pre-provisioned group channels leased to matched pairs.
//!
//! Claiming is a single guarded UPDATE over the free rooms, the CAS analogue
//! of `FOR UPDATE SKIP LOCKED` for stores without row locks: concurrent
//! claimants can never end up on the same row.

use super::DbError;
use sqlx::SqlitePool;

/// A pool slot backed by an external group channel.
#[derive(Debug, Clone)]
pub struct RoomRecord {
    pub id: i64,
    pub channel_id: i64,
    pub title: String,
    pub is_occupied: bool,
    pub current_request_id: Option<String>,
    pub occupied_at: Option<i64>,
    pub missing_since: Option<i64>,
}

type RoomRow = (i64, i64, String, bool, Option<String>, Option<i64>, Option<i64>);

const ROOM_COLUMNS: &str =
    "id, channel_id, title, is_occupied, current_request_id, occupied_at, missing_since";

/// Repository for chat room pool operations.
pub struct RoomRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RoomRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Atomically claim one free room for a request. Rooms flagged as missing
    /// are never handed out. Returns None when the pool is exhausted.
    pub async fn claim_free(&self, request_id: &str) -> Result<Option<RoomRecord>, DbError> {
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            r#"
            UPDATE chat_rooms
            SET is_occupied = 1, current_request_id = ?, occupied_at = ?
            WHERE id = (
                SELECT id FROM chat_rooms
                WHERE is_occupied = 0 AND missing_since IS NULL
                ORDER BY id
                LIMIT 1
            )
              AND is_occupied = 0
            RETURNING {ROOM_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(request_id)
            .bind(now)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Self::map_row))
    }

    /// Return a room to the free pool, clearing its request link.
    pub async fn release(&self, room_id: i64) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE chat_rooms
            SET is_occupied = 0, current_request_id = NULL, occupied_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(room_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Find a room by pool id.
    pub async fn find(&self, room_id: i64) -> Result<Option<RoomRecord>, DbError> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id = ?");
        let row = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(room_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Self::map_row))
    }

    /// All pool entries.
    pub async fn all(&self) -> Result<Vec<RoomRecord>, DbError> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM chat_rooms ORDER BY id");
        let rows = sqlx::query_as::<_, RoomRow>(&sql).fetch_all(self.pool).await?;
        Ok(rows.into_iter().map(Self::map_row).collect())
    }

    /// Register an externally-seen channel as a pool entry. Deduplicates by
    /// external id; a room that had been flagged missing is rehabilitated.
    /// Returns true if a new entry was inserted.
    pub async fn upsert_channel(&self, channel_id: i64, title: &str) -> Result<bool, DbError> {
        let exists: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_rooms WHERE channel_id = ?")
                .bind(channel_id)
                .fetch_one(self.pool)
                .await?;

        if exists > 0 {
            sqlx::query(
                "UPDATE chat_rooms SET title = ?, missing_since = NULL WHERE channel_id = ?",
            )
            .bind(title)
            .bind(channel_id)
            .execute(self.pool)
            .await?;
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO chat_rooms (channel_id, title, is_occupied)
            VALUES (?, ?, 0)
            ON CONFLICT (channel_id) DO NOTHING
            "#,
        )
        .bind(channel_id)
        .bind(title)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Drop a channel the bot was removed from, but only while it is free.
    /// Returns true if a row was deleted.
    pub async fn delete_if_free(&self, channel_id: i64) -> Result<bool, DbError> {
        let result =
            sqlx::query("DELETE FROM chat_rooms WHERE channel_id = ? AND is_occupied = 0")
                .bind(channel_id)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Flag an occupied room whose channel the bot can no longer see. Never
    /// deletes: that would silently break the active session. Returns the
    /// linked request id the first time the flag is raised.
    pub async fn flag_missing(&self, channel_id: i64) -> Result<Option<String>, DbError> {
        let now = chrono::Utc::now().timestamp();
        let row: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE chat_rooms
            SET missing_since = ?
            WHERE channel_id = ? AND is_occupied = 1 AND missing_since IS NULL
            RETURNING current_request_id
            "#,
        )
        .bind(now)
        .bind(channel_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.and_then(|(request_id,)| request_id))
    }

    /// Free / occupied counts for reconciliation logging.
    pub async fn occupancy_counts(&self) -> Result<(i64, i64), DbError> {
        let free: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_rooms WHERE is_occupied = 0")
                .fetch_one(self.pool)
                .await?;
        let occupied: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_rooms WHERE is_occupied = 1")
                .fetch_one(self.pool)
                .await?;
        Ok((free, occupied))
    }

    fn map_row(row: RoomRow) -> RoomRecord {
        let (id, channel_id, title, is_occupied, current_request_id, occupied_at, missing_since) =
            row;
        RoomRecord {
            id,
            channel_id,
            title,
            is_occupied,
            current_request_id,
            occupied_at,
            missing_since,
        }
    }
}
