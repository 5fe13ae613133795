use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::user::{User, UserRole};

/// Per-user notification preferences
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct UserSettings {
    pub user_id: Uuid,
    pub email_on_pledge: bool,
    pub email_on_campaign_update: bool,
    pub marketing_emails: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateUserSettings {
    pub email_on_pledge: Option<bool>,
    pub email_on_campaign_update: Option<bool>,
    pub marketing_emails: Option<bool>,
}

impl UserSettings {
    /// Returns the user's settings, inserting the defaults on first access.
    pub async fn find_or_create(pool: &SqlitePool, user_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query!(
            "INSERT OR IGNORE INTO user_settings (user_id) VALUES ($1)",
            user_id
        )
        .execute(pool)
        .await?;

        sqlx::query_as!(
            UserSettings,
            r#"SELECT user_id as "user_id!: Uuid", email_on_pledge as "email_on_pledge!: bool", email_on_campaign_update as "email_on_campaign_update!: bool", marketing_emails as "marketing_emails!: bool", updated_at as "updated_at!: DateTime<Utc>"
               FROM user_settings
               WHERE user_id = $1"#,
            user_id
        )
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        user_id: Uuid,
        data: &UpdateUserSettings,
    ) -> Result<Self, sqlx::Error> {
        Self::find_or_create(pool, user_id).await?;
        sqlx::query_as!(
            UserSettings,
            r#"UPDATE user_settings
               SET email_on_pledge = COALESCE($2, email_on_pledge),
                   email_on_campaign_update = COALESCE($3, email_on_campaign_update),
                   marketing_emails = COALESCE($4, marketing_emails),
                   updated_at = datetime('now', 'subsec')
               WHERE user_id = $1
               RETURNING user_id as "user_id!: Uuid", email_on_pledge as "email_on_pledge!: bool", email_on_campaign_update as "email_on_campaign_update!: bool", marketing_emails as "marketing_emails!: bool", updated_at as "updated_at!: DateTime<Utc>""#,
            user_id,
            data.email_on_pledge,
            data.email_on_campaign_update,
            data.marketing_emails
        )
        .fetch_one(pool)
        .await
    }

    /// Backers of a campaign with a captured pledge who accept campaign-update emails.
    /// Users without a settings row get the defaults, which opt in.
    pub async fn campaign_update_recipients(
        pool: &SqlitePool,
        campaign_id: Uuid,
    ) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as!(
            User,
            r#"SELECT u.id as "id!: Uuid", u.email as "email!", u.name, u.role as "role!: UserRole", u.created_at as "created_at!: DateTime<Utc>", u.updated_at as "updated_at!: DateTime<Utc>"
               FROM users u
               LEFT JOIN user_settings s ON s.user_id = u.id
               WHERE COALESCE(s.email_on_campaign_update, 1) = 1
                 AND EXISTS (
                     SELECT 1 FROM pledges p
                     WHERE p.backer_id = u.id
                       AND p.campaign_id = $1
                       AND p.status = 'captured'
                 )
               ORDER BY u.email"#,
            campaign_id
        )
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support;

    #[tokio::test]
    async fn defaults_then_partial_update() {
        let db = test_support::db().await;
        let user = test_support::user(&db, "prefs@example.com").await;

        let settings = UserSettings::find_or_create(&db.pool, user.id).await.unwrap();
        assert!(settings.email_on_pledge);
        assert!(settings.email_on_campaign_update);
        assert!(!settings.marketing_emails);

        let updated = UserSettings::update(
            &db.pool,
            user.id,
            &UpdateUserSettings {
                marketing_emails: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(updated.marketing_emails);
        assert!(updated.email_on_pledge);
    }
}
