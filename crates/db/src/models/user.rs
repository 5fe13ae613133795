use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        email: &str,
        name: Option<&str>,
        role: UserRole,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            User,
            r#"INSERT INTO users (id, email, name, role)
               VALUES ($1, $2, $3, $4)
               RETURNING id as "id!: Uuid", email, name, role as "role!: UserRole", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            email,
            name,
            role
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            User,
            r#"SELECT id as "id!: Uuid", email, name, role as "role!: UserRole", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM users
               WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_email(
        pool: &SqlitePool,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            User,
            r#"SELECT id as "id!: Uuid", email, name, role as "role!: UserRole", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM users
               WHERE email = $1"#,
            email
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn list(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            User,
            r#"SELECT id as "id!: Uuid", email, name, role as "role!: UserRole", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM users
               ORDER BY created_at DESC
               LIMIT $1 OFFSET $2"#,
            limit,
            offset
        )
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar!(r#"SELECT COUNT(*) as "count!: i64" FROM users"#)
            .fetch_one(pool)
            .await
    }

    pub async fn update_name(
        pool: &SqlitePool,
        id: Uuid,
        name: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            User,
            r#"UPDATE users
               SET name = $2, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id as "id!: Uuid", email, name, role as "role!: UserRole", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            name
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn update_role(
        pool: &SqlitePool,
        id: Uuid,
        role: UserRole,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            User,
            r#"UPDATE users
               SET role = $2, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id as "id!: Uuid", email, name, role as "role!: UserRole", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            role
        )
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support;

    #[tokio::test]
    async fn create_and_lookup_user() {
        let db = test_support::db().await;
        let user = User::create(&db.pool, Uuid::new_v4(), "ada@example.com", Some("Ada"), UserRole::User)
            .await
            .unwrap();

        let by_email = User::find_by_email(&db.pool, "ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_email.role, UserRole::User);
        assert!(!by_email.is_admin());

        let promoted = User::update_role(&db.pool, user.id, UserRole::Admin)
            .await
            .unwrap()
            .unwrap();
        assert!(promoted.is_admin());
        assert_eq!(User::count(&db.pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let db = test_support::db().await;
        test_support::user(&db, "dup@example.com").await;
        let err = User::create(&db.pool, Uuid::new_v4(), "dup@example.com", None, UserRole::User)
            .await
            .unwrap_err();
        assert!(matches!(err, sqlx::Error::Database(ref e) if e.is_unique_violation()));
    }
}
