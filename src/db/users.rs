//! User directory: platform identities, roles, and descriptive tags.

use super::DbError;
use sqlx::SqlitePool;

/// User role within the matching system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Needy,
    Volunteer,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Needy => "needy",
            Self::Volunteer => "volunteer",
            Self::Moderator => "moderator",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "needy" => Ok(Self::Needy),
            "volunteer" => Ok(Self::Volunteer),
            "moderator" => Ok(Self::Moderator),
            other => Err(DbError::InvalidValue {
                field: "users.role",
                value: other.to_string(),
            }),
        }
    }
}

/// A registered user.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub role: Role,
    pub tags: Vec<String>,
    pub created_at: i64,
}

/// Repository for user operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or update a user on contact. A volunteer additionally gets a
    /// companion eligibility row if one does not exist yet.
    pub async fn upsert(&self, id: i64, name: &str, role: Role) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO users (id, name, role, tags, created_at)
            VALUES (?, ?, ?, '[]', ?)
            ON CONFLICT (id) DO UPDATE SET name = excluded.name, role = excluded.role
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(role.as_str())
        .bind(now)
        .execute(self.pool)
        .await?;

        if role == Role::Volunteer {
            sqlx::query(
                r#"
                INSERT INTO volunteers (user_id) VALUES (?)
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(id)
            .execute(self.pool)
            .await?;
        }

        Ok(())
    }

    /// Find a user by platform id.
    pub async fn find(&self, id: i64) -> Result<Option<UserRecord>, DbError> {
        let row = sqlx::query_as::<_, (i64, String, String, String, i64)>(
            "SELECT id, name, role, tags, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Self::map_row).transpose()
    }

    /// All users holding a given role.
    pub async fn find_by_role(&self, role: Role) -> Result<Vec<UserRecord>, DbError> {
        let rows = sqlx::query_as::<_, (i64, String, String, String, i64)>(
            "SELECT id, name, role, tags, created_at FROM users WHERE role = ? ORDER BY id",
        )
        .bind(role.as_str())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Self::map_row).collect()
    }

    /// Merge new tags into a user's tag set (duplicates dropped).
    pub async fn add_tags(&self, id: i64, tags: &[String]) -> Result<(), DbError> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT tags FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        let Some((raw,)) = existing else {
            return Ok(());
        };

        let mut merged: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
        for tag in tags {
            if !merged.contains(tag) {
                merged.push(tag.clone());
            }
        }

        let encoded = serde_json::to_string(&merged)
            .map_err(|e| DbError::Internal(format!("tag encode: {e}")))?;

        sqlx::query("UPDATE users SET tags = ? WHERE id = ?")
            .bind(encoded)
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    fn map_row(row: (i64, String, String, String, i64)) -> Result<UserRecord, DbError> {
        let (id, name, role, tags, created_at) = row;
        Ok(UserRecord {
            id,
            name,
            role: Role::parse(&role)?,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_upsert_creates_eligibility_row() {
        let db = Database::new(":memory:").await.unwrap();
        db.users().upsert(10, "Vera", Role::Volunteer).await.unwrap();

        let volunteer = db.volunteers().find(10).await.unwrap();
        assert!(volunteer.is_some());
        assert!(!volunteer.unwrap().is_blocked);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_and_updates_name() {
        let db = Database::new(":memory:").await.unwrap();
        db.users().upsert(10, "Old", Role::Needy).await.unwrap();
        db.users().upsert(10, "New", Role::Needy).await.unwrap();

        let user = db.users().find(10).await.unwrap().unwrap();
        assert_eq!(user.name, "New");
        assert_eq!(user.role, Role::Needy);
    }

    #[tokio::test]
    async fn test_tags_merge_without_duplicates() {
        let db = Database::new(":memory:").await.unwrap();
        db.users().upsert(5, "Nina", Role::Needy).await.unwrap();

        db.users()
            .add_tags(5, &["elderly".into(), "hearing".into()])
            .await
            .unwrap();
        db.users()
            .add_tags(5, &["elderly".into(), "blind".into()])
            .await
            .unwrap();

        let user = db.users().find(5).await.unwrap().unwrap();
        assert_eq!(user.tags, vec!["elderly", "hearing", "blind"]);
    }
}
