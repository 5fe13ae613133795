use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Marketplace category (security audits, DevOps, compliance, ...)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ServiceCategory {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateServiceCategory {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateServiceCategory {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

impl ServiceCategory {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        name: &str,
        slug: &str,
        description: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            ServiceCategory,
            r#"INSERT INTO service_categories (id, name, slug, description)
               VALUES ($1, $2, $3, $4)
               RETURNING id as "id!: Uuid", name, slug, description, is_active as "is_active!: bool", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            name,
            slug,
            description
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            ServiceCategory,
            r#"SELECT id as "id!: Uuid", name, slug, description, is_active as "is_active!: bool", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM service_categories
               WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            ServiceCategory,
            r#"SELECT id as "id!: Uuid", name, slug, description, is_active as "is_active!: bool", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM service_categories
               WHERE slug = $1"#,
            slug
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn list(pool: &SqlitePool, active_only: bool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            ServiceCategory,
            r#"SELECT id as "id!: Uuid", name, slug, description, is_active as "is_active!: bool", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM service_categories
               WHERE $1 = 0 OR is_active = 1
               ORDER BY name ASC"#,
            active_only
        )
        .fetch_all(pool)
        .await
    }

    /// `slug` is recomputed by the caller whenever the name changes.
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateServiceCategory,
        slug: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            ServiceCategory,
            r#"UPDATE service_categories
               SET name = COALESCE($2, name),
                   slug = COALESCE($3, slug),
                   description = COALESCE($4, description),
                   is_active = COALESCE($5, is_active),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id as "id!: Uuid", name, slug, description, is_active as "is_active!: bool", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            data.name,
            slug,
            data.description,
            data.is_active
        )
        .fetch_optional(pool)
        .await
    }

    /// Number of marketplace listings referencing the category.
    pub async fn listing_count(pool: &SqlitePool, id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar!(
            r#"SELECT COUNT(*) as "count!: i64" FROM organization_services WHERE category_id = $1"#,
            id
        )
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM service_categories WHERE id = $1", id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
