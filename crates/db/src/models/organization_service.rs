use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// A service an organization offers on the marketplace
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct OrganizationService {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub category_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateOrganizationService {
    pub category_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateOrganizationService {
    pub category_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub is_active: Option<bool>,
}

/// Public marketplace row: listing plus provider and category names
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct MarketplaceListing {
    #[serde(flatten)]
    #[ts(flatten)]
    pub service: OrganizationService,
    pub organization_name: String,
    pub category_name: String,
    pub category_slug: String,
}

impl OrganizationService {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        organization_id: Uuid,
        data: &CreateOrganizationService,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            OrganizationService,
            r#"INSERT INTO organization_services (id, organization_id, category_id, title, description, price_cents)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id as "id!: Uuid", organization_id as "organization_id!: Uuid", category_id as "category_id!: Uuid", title, description, price_cents, is_active as "is_active!: bool", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            organization_id,
            data.category_id,
            data.title,
            data.description,
            data.price_cents
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            OrganizationService,
            r#"SELECT id as "id!: Uuid", organization_id as "organization_id!: Uuid", category_id as "category_id!: Uuid", title, description, price_cents, is_active as "is_active!: bool", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM organization_services
               WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_organization(
        pool: &SqlitePool,
        organization_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            OrganizationService,
            r#"SELECT id as "id!: Uuid", organization_id as "organization_id!: Uuid", category_id as "category_id!: Uuid", title, description, price_cents, is_active as "is_active!: bool", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM organization_services
               WHERE organization_id = $1
               ORDER BY created_at ASC"#,
            organization_id
        )
        .fetch_all(pool)
        .await
    }

    /// Active listings of approved organizations in active categories.
    pub async fn list_marketplace(
        pool: &SqlitePool,
        category_id: Option<Uuid>,
    ) -> Result<Vec<MarketplaceListing>, sqlx::Error> {
        let records = sqlx::query!(
            r#"SELECT
  s.id               AS "id!: Uuid",
  s.organization_id  AS "organization_id!: Uuid",
  s.category_id      AS "category_id!: Uuid",
  s.title            AS "title!",
  s.description,
  s.price_cents      AS "price_cents: i64",
  s.is_active        AS "is_active!: bool",
  s.created_at       AS "created_at!: DateTime<Utc>",
  s.updated_at       AS "updated_at!: DateTime<Utc>",
  o.name             AS "organization_name!",
  c.name             AS "category_name!",
  c.slug             AS "category_slug!"
FROM organization_services s
JOIN organizations o ON o.id = s.organization_id
JOIN service_categories c ON c.id = s.category_id
WHERE s.is_active = 1
  AND o.status = 'approved'
  AND c.is_active = 1
  AND ($1 IS NULL OR s.category_id = $1)
ORDER BY c.name ASC, s.created_at ASC"#,
            category_id
        )
        .fetch_all(pool)
        .await?;

        Ok(records
            .into_iter()
            .map(|rec| MarketplaceListing {
                service: OrganizationService {
                    id: rec.id,
                    organization_id: rec.organization_id,
                    category_id: rec.category_id,
                    title: rec.title,
                    description: rec.description,
                    price_cents: rec.price_cents,
                    is_active: rec.is_active,
                    created_at: rec.created_at,
                    updated_at: rec.updated_at,
                },
                organization_name: rec.organization_name,
                category_name: rec.category_name,
                category_slug: rec.category_slug,
            })
            .collect())
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateOrganizationService,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            OrganizationService,
            r#"UPDATE organization_services
               SET category_id = COALESCE($2, category_id),
                   title = COALESCE($3, title),
                   description = COALESCE($4, description),
                   price_cents = COALESCE($5, price_cents),
                   is_active = COALESCE($6, is_active),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id as "id!: Uuid", organization_id as "organization_id!: Uuid", category_id as "category_id!: Uuid", title, description, price_cents, is_active as "is_active!: bool", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            data.category_id,
            data.title,
            data.description,
            data.price_cents,
            data.is_active
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM organization_services WHERE id = $1", id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
