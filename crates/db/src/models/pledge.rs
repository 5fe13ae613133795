use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "pledge_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PledgeStatus {
    #[default]
    Pending,
    Captured,
    Failed,
    Cancelled,
    Refunded,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Pledge {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub backer_id: Uuid,
    pub pledge_tier_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PledgeStatus,
    pub checkout_session_id: String,
    pub payment_intent_id: Option<String>,
    pub refunded_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pledge {
    pub fn refundable_cents(&self) -> i64 {
        match self.status {
            PledgeStatus::Captured => self.amount_cents - self.refunded_cents,
            _ => 0,
        }
    }
}

/// Pledge as shown in a backer's history
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct BackerPledge {
    #[serde(flatten)]
    #[ts(flatten)]
    pub pledge: Pledge,
    pub campaign_title: String,
    pub tier_title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatePledge {
    pub campaign_id: Uuid,
    pub backer_id: Uuid,
    pub pledge_tier_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub checkout_session_id: String,
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize, TS)]
pub struct PledgeTotals {
    pub captured_cents: i64,
    pub refunded_cents: i64,
    pub captured_count: i64,
}

impl Pledge {
    /// Insert the pledge for a completed checkout session. Returns the stored
    /// pledge and whether this call created it.
    pub async fn create_from_checkout(
        pool: &SqlitePool,
        id: Uuid,
        data: &CreatePledge,
    ) -> Result<(Self, bool), sqlx::Error> {
        let result = sqlx::query!(
            r#"INSERT INTO pledges
                   (id, campaign_id, backer_id, pledge_tier_id, amount_cents, currency,
                    checkout_session_id, payment_intent_id)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               ON CONFLICT DO NOTHING"#,
            id,
            data.campaign_id,
            data.backer_id,
            data.pledge_tier_id,
            data.amount_cents,
            data.currency,
            data.checkout_session_id,
            data.payment_intent_id
        )
        .execute(pool)
        .await?;

        let pledge = Self::find_by_checkout_session(pool, &data.checkout_session_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        Ok((pledge, result.rows_affected() > 0))
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Pledge,
            r#"SELECT id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", backer_id as "backer_id!: Uuid", pledge_tier_id as "pledge_tier_id: Uuid", amount_cents as "amount_cents!: i64", currency, status as "status!: PledgeStatus", checkout_session_id, payment_intent_id, refunded_cents as "refunded_cents!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM pledges
               WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_checkout_session(
        pool: &SqlitePool,
        session_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Pledge,
            r#"SELECT id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", backer_id as "backer_id!: Uuid", pledge_tier_id as "pledge_tier_id: Uuid", amount_cents as "amount_cents!: i64", currency, status as "status!: PledgeStatus", checkout_session_id, payment_intent_id, refunded_cents as "refunded_cents!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM pledges
               WHERE checkout_session_id = $1"#,
            session_id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_payment_intent(
        pool: &SqlitePool,
        payment_intent_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Pledge,
            r#"SELECT id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", backer_id as "backer_id!: Uuid", pledge_tier_id as "pledge_tier_id: Uuid", amount_cents as "amount_cents!: i64", currency, status as "status!: PledgeStatus", checkout_session_id, payment_intent_id, refunded_cents as "refunded_cents!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM pledges
               WHERE payment_intent_id = $1"#,
            payment_intent_id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_backer(
        pool: &SqlitePool,
        backer_id: Uuid,
    ) -> Result<Vec<BackerPledge>, sqlx::Error> {
        let records = sqlx::query!(
            r#"SELECT
  p.id                   AS "id!: Uuid",
  p.campaign_id          AS "campaign_id!: Uuid",
  p.backer_id            AS "backer_id!: Uuid",
  p.pledge_tier_id       AS "pledge_tier_id: Uuid",
  p.amount_cents         AS "amount_cents!: i64",
  p.currency             AS "currency!",
  p.status               AS "status!: PledgeStatus",
  p.checkout_session_id  AS "checkout_session_id!",
  p.payment_intent_id,
  p.refunded_cents       AS "refunded_cents!: i64",
  p.created_at           AS "created_at!: DateTime<Utc>",
  p.updated_at           AS "updated_at!: DateTime<Utc>",
  c.title                AS "campaign_title!",
  t.title                AS "tier_title?: String"
FROM pledges p
JOIN campaigns c ON c.id = p.campaign_id
LEFT JOIN pledge_tiers t ON t.id = p.pledge_tier_id
WHERE p.backer_id = $1
ORDER BY p.created_at DESC"#,
            backer_id
        )
        .fetch_all(pool)
        .await?;

        Ok(records
            .into_iter()
            .map(|rec| BackerPledge {
                pledge: Pledge {
                    id: rec.id,
                    campaign_id: rec.campaign_id,
                    backer_id: rec.backer_id,
                    pledge_tier_id: rec.pledge_tier_id,
                    amount_cents: rec.amount_cents,
                    currency: rec.currency,
                    status: rec.status,
                    checkout_session_id: rec.checkout_session_id,
                    payment_intent_id: rec.payment_intent_id,
                    refunded_cents: rec.refunded_cents,
                    created_at: rec.created_at,
                    updated_at: rec.updated_at,
                },
                campaign_title: rec.campaign_title,
                tier_title: rec.tier_title,
            })
            .collect())
    }

    pub async fn find_by_campaign(
        pool: &SqlitePool,
        campaign_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Pledge,
            r#"SELECT id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", backer_id as "backer_id!: Uuid", pledge_tier_id as "pledge_tier_id: Uuid", amount_cents as "amount_cents!: i64", currency, status as "status!: PledgeStatus", checkout_session_id, payment_intent_id, refunded_cents as "refunded_cents!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM pledges
               WHERE campaign_id = $1
               ORDER BY created_at DESC"#,
            campaign_id
        )
        .fetch_all(pool)
        .await
    }

    /// pending -> captured. None when the pledge was not pending.
    pub async fn capture(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Pledge,
            r#"UPDATE pledges
               SET status = 'captured', updated_at = datetime('now', 'subsec')
               WHERE id = $1 AND status = 'pending'
               RETURNING id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", backer_id as "backer_id!: Uuid", pledge_tier_id as "pledge_tier_id: Uuid", amount_cents as "amount_cents!: i64", currency, status as "status!: PledgeStatus", checkout_session_id, payment_intent_id, refunded_cents as "refunded_cents!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    /// Move a pending pledge to `next`, keyed by the processor's payment intent.
    pub async fn transition_pending_by_payment_intent(
        pool: &SqlitePool,
        payment_intent_id: &str,
        next: PledgeStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Pledge,
            r#"UPDATE pledges
               SET status = $2, updated_at = datetime('now', 'subsec')
               WHERE payment_intent_id = $1 AND status = 'pending'
               RETURNING id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", backer_id as "backer_id!: Uuid", pledge_tier_id as "pledge_tier_id: Uuid", amount_cents as "amount_cents!: i64", currency, status as "status!: PledgeStatus", checkout_session_id, payment_intent_id, refunded_cents as "refunded_cents!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            payment_intent_id,
            next
        )
        .fetch_optional(pool)
        .await
    }

    /// Reserve `amount` of the refundable remainder. False when the pledge is
    /// not captured or the reservation would exceed the amount paid.
    pub async fn reserve_refund<'e, E>(
        executor: E,
        id: Uuid,
        amount: i64,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query!(
            r#"UPDATE pledges
               SET refunded_cents = refunded_cents + $2,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
                 AND status = 'captured'
                 AND refunded_cents + $2 <= amount_cents"#,
            id,
            amount
        )
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn release_refund<'e, E>(
        executor: E,
        id: Uuid,
        amount: i64,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query!(
            r#"UPDATE pledges
               SET refunded_cents = refunded_cents - $2,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1 AND refunded_cents >= $2"#,
            id,
            amount
        )
        .execute(executor)
        .await?;
        Ok(())
    }

    /// captured -> refunded once nothing is left to refund.
    pub async fn mark_refunded_if_complete(
        pool: &SqlitePool,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Pledge,
            r#"UPDATE pledges
               SET status = 'refunded', updated_at = datetime('now', 'subsec')
               WHERE id = $1 AND status = 'captured' AND refunded_cents >= amount_cents
               RETURNING id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", backer_id as "backer_id!: Uuid", pledge_tier_id as "pledge_tier_id: Uuid", amount_cents as "amount_cents!: i64", currency, status as "status!: PledgeStatus", checkout_session_id, payment_intent_id, refunded_cents as "refunded_cents!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    /// Apply the processor's cumulative refunded amount. Never lowers the
    /// recorded total.
    pub async fn sync_refunded(
        pool: &SqlitePool,
        payment_intent_id: &str,
        amount_refunded: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Pledge,
            r#"UPDATE pledges
               SET refunded_cents = MAX(refunded_cents, MIN($2, amount_cents)),
                   status = CASE
                       WHEN MAX(refunded_cents, MIN($2, amount_cents)) >= amount_cents THEN 'refunded'
                       ELSE status
                   END,
                   updated_at = datetime('now', 'subsec')
               WHERE payment_intent_id = $1 AND status IN ('captured', 'refunded')
               RETURNING id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", backer_id as "backer_id!: Uuid", pledge_tier_id as "pledge_tier_id: Uuid", amount_cents as "amount_cents!: i64", currency, status as "status!: PledgeStatus", checkout_session_id, payment_intent_id, refunded_cents as "refunded_cents!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            payment_intent_id,
            amount_refunded
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn totals(pool: &SqlitePool) -> Result<PledgeTotals, sqlx::Error> {
        sqlx::query_as!(
            PledgeTotals,
            r#"SELECT COALESCE(SUM(amount_cents), 0) AS "captured_cents!: i64",
                      COALESCE(SUM(refunded_cents), 0) AS "refunded_cents!: i64",
                      COUNT(*) AS "captured_count!: i64"
               FROM pledges
               WHERE status IN ('captured', 'refunded')"#
        )
        .fetch_one(pool)
        .await
    }
}
