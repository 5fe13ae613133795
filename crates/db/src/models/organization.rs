use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// What the organization does on the platform
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "organization_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrganizationKind {
    #[default]
    Creator,
    ServiceProvider,
}

/// Admin review state
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "organization_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrganizationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Organization {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub kind: OrganizationKind,
    pub status: OrganizationStatus,
    pub description: Option<String>,
    pub website: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateOrganization {
    pub name: String,
    pub kind: Option<OrganizationKind>,
    pub description: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
}

impl Organization {
    pub fn is_approved(&self) -> bool {
        self.status == OrganizationStatus::Approved
    }

    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        owner_id: Uuid,
        data: &CreateOrganization,
    ) -> Result<Self, sqlx::Error> {
        let kind = data.kind.unwrap_or_default();
        sqlx::query_as!(
            Organization,
            r#"INSERT INTO organizations (id, owner_id, name, kind, description, website)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id as "id!: Uuid", owner_id as "owner_id!: Uuid", name, kind as "kind!: OrganizationKind", status as "status!: OrganizationStatus", description, website, rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            owner_id,
            data.name,
            kind,
            data.description,
            data.website
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Organization,
            r#"SELECT id as "id!: Uuid", owner_id as "owner_id!: Uuid", name, kind as "kind!: OrganizationKind", status as "status!: OrganizationStatus", description, website, rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM organizations
               WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_owner(
        pool: &SqlitePool,
        owner_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Organization,
            r#"SELECT id as "id!: Uuid", owner_id as "owner_id!: Uuid", name, kind as "kind!: OrganizationKind", status as "status!: OrganizationStatus", description, website, rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM organizations
               WHERE owner_id = $1
               ORDER BY created_at DESC"#,
            owner_id
        )
        .fetch_all(pool)
        .await
    }

    pub async fn list(
        pool: &SqlitePool,
        status: Option<OrganizationStatus>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Organization,
            r#"SELECT id as "id!: Uuid", owner_id as "owner_id!: Uuid", name, kind as "kind!: OrganizationKind", status as "status!: OrganizationStatus", description, website, rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM organizations
               WHERE $1 IS NULL OR status = $1
               ORDER BY created_at DESC"#,
            status
        )
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateOrganization,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Organization,
            r#"UPDATE organizations
               SET name = COALESCE($2, name),
                   description = COALESCE($3, description),
                   website = COALESCE($4, website),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id as "id!: Uuid", owner_id as "owner_id!: Uuid", name, kind as "kind!: OrganizationKind", status as "status!: OrganizationStatus", description, website, rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            data.name,
            data.description,
            data.website
        )
        .fetch_optional(pool)
        .await
    }

    /// Record an admin review decision.
    pub async fn set_status(
        pool: &SqlitePool,
        id: Uuid,
        status: OrganizationStatus,
        rejection_reason: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Organization,
            r#"UPDATE organizations
               SET status = $2,
                   rejection_reason = $3,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id as "id!: Uuid", owner_id as "owner_id!: Uuid", name, kind as "kind!: OrganizationKind", status as "status!: OrganizationStatus", description, website, rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            status,
            rejection_reason
        )
        .fetch_optional(pool)
        .await
    }
}
