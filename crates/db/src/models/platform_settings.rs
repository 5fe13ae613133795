use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;

/// Admin-managed platform switches. Always exactly one row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct PlatformSettings {
    pub signups_restricted: bool,
    pub platform_fee_bps: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdatePlatformSettings {
    pub signups_restricted: Option<bool>,
    pub platform_fee_bps: Option<i64>,
}

impl PlatformSettings {
    pub async fn get(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            PlatformSettings,
            r#"SELECT signups_restricted as "signups_restricted!: bool", platform_fee_bps as "platform_fee_bps!: i64", updated_at as "updated_at!: DateTime<Utc>"
               FROM platform_settings
               WHERE id = 1"#
        )
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        data: &UpdatePlatformSettings,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            PlatformSettings,
            r#"UPDATE platform_settings
               SET signups_restricted = COALESCE($1, signups_restricted),
                   platform_fee_bps = COALESCE($2, platform_fee_bps),
                   fee_overridden = CASE WHEN $2 IS NULL THEN fee_overridden ELSE 1 END,
                   updated_at = datetime('now', 'subsec')
               WHERE id = 1
               RETURNING signups_restricted as "signups_restricted!: bool", platform_fee_bps as "platform_fee_bps!: i64", updated_at as "updated_at!: DateTime<Utc>""#,
            data.signups_restricted,
            data.platform_fee_bps
        )
        .fetch_one(pool)
        .await
    }

    /// Apply the configured default fee unless an admin has already set one.
    pub async fn seed_default_fee(pool: &SqlitePool, fee_bps: i64) -> Result<Self, sqlx::Error> {
        sqlx::query!(
            "UPDATE platform_settings SET platform_fee_bps = $1 WHERE id = 1 AND fee_overridden = 0",
            fee_bps
        )
        .execute(pool)
        .await?;
        Self::get(pool).await
    }
}
