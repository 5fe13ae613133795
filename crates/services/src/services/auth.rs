//! Passwordless sign-in: emailed one-time codes exchanged for signed session tokens.

use std::sync::Arc;

use chrono::Utc;
use db::models::{
    otp_code::OtpCode,
    platform_settings::PlatformSettings,
    user::{User, UserRole},
    waitlist::{WaitlistEntry, WaitlistStatus},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};
use utils::text::{is_valid_email, normalize_email};
use uuid::Uuid;

use super::{
    email::{EmailError, EmailSender},
    email_templates,
    validation::ValidationErrors,
};

pub const OTP_TTL_MINUTES: i64 = 10;
pub const OTP_MAX_ATTEMPTS: i64 = 5;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("signups are restricted to approved waitlist members")]
    WaitlistRequired,
    #[error("invalid or expired code")]
    InvalidCode,
    #[error("too many attempts, request a new code")]
    TooManyAttempts,
    #[error("invalid session token")]
    InvalidToken,
    #[error("failed to issue session token: {0}")]
    TokenIssue(String),
    #[error("failed to send sign-in code: {0}")]
    Email(#[from] EmailError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 session tokens.
#[derive(Clone)]
pub struct SessionTokens {
    secret: Arc<SecretString>,
    ttl_hours: i64,
}

impl SessionTokens {
    pub fn new(secret: SecretString, ttl_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret),
            ttl_hours,
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_hours * 3600
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: user.id,
            role: user.role,
            iat: now,
            exp: now + self.ttl_seconds(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(|e| AuthError::TokenIssue(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| AuthError::InvalidToken)
    }
}

pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

#[derive(Debug, Clone, Serialize)]
pub struct SignedIn {
    pub token: String,
    pub user: User,
    pub created: bool,
}

pub struct AuthService {
    pool: SqlitePool,
    email: Arc<dyn EmailSender>,
    tokens: SessionTokens,
}

impl AuthService {
    pub fn new(pool: SqlitePool, email: Arc<dyn EmailSender>, tokens: SessionTokens) -> Self {
        Self { pool, email, tokens }
    }

    fn checked_email(email: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(ValidationErrors::single("email", "must be a valid email address").into());
        }
        Ok(email)
    }

    /// Email a fresh code. New accounts need an approved waitlist entry while
    /// signups are restricted.
    pub async fn request_code(&self, email: &str) -> Result<(), AuthError> {
        let email = Self::checked_email(email)?;

        if User::find_by_email(&self.pool, &email).await?.is_none() {
            let settings = PlatformSettings::get(&self.pool).await?;
            if settings.signups_restricted {
                let approved = WaitlistEntry::find_by_email(&self.pool, &email)
                    .await?
                    .is_some_and(|entry| entry.status == WaitlistStatus::Approved);
                if !approved {
                    info!(email = %email, "Sign-in code refused, signups restricted");
                    return Err(AuthError::WaitlistRequired);
                }
            }
        }

        let code = generate_code();
        OtpCode::create(&self.pool, &email, &hash_code(&code), OTP_TTL_MINUTES).await?;
        let message = email_templates::otp_code(&code, OTP_TTL_MINUTES).to(&email);
        self.email.send(&message).await?;
        info!(email = %email, "Sign-in code sent");
        Ok(())
    }

    pub async fn verify_code(&self, email: &str, code: &str) -> Result<SignedIn, AuthError> {
        let email = Self::checked_email(email)?;
        let otp = OtpCode::find_active(&self.pool, &email)
            .await?
            .ok_or(AuthError::InvalidCode)?;

        let attempts = OtpCode::record_attempt(&self.pool, otp.id, OTP_MAX_ATTEMPTS)
            .await?
            .ok_or(AuthError::TooManyAttempts)?;

        let submitted = hash_code(code.trim());
        let matches: bool = submitted.as_bytes().ct_eq(otp.code_hash.as_bytes()).into();
        if !matches {
            warn!(email = %email, attempts, "Invalid sign-in code");
            return Err(if attempts >= OTP_MAX_ATTEMPTS {
                AuthError::TooManyAttempts
            } else {
                AuthError::InvalidCode
            });
        }

        // Lost a race with a concurrent verification of the same code
        if !OtpCode::consume(&self.pool, otp.id).await? {
            return Err(AuthError::InvalidCode);
        }

        let (user, created) = match User::find_by_email(&self.pool, &email).await? {
            Some(user) => (user, false),
            None => {
                let user = User::create(&self.pool, Uuid::new_v4(), &email, None, UserRole::User).await?;
                info!(user_id = %user.id, "Created user on first sign-in");
                (user, true)
            }
        };

        Ok(SignedIn {
            token: self.tokens.issue(&user)?,
            user,
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use db::models::platform_settings::UpdatePlatformSettings;
    use futures::future::join_all;

    use super::*;
    use crate::services::test_support::{self, RecordingEmail};

    fn tokens() -> SessionTokens {
        SessionTokens::new(SecretString::from("test-secret"), 1)
    }

    fn code_from(email: &RecordingEmail) -> String {
        let subject = email.sent().last().unwrap().subject.clone();
        subject.rsplit(' ').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn code_roundtrip_creates_user() {
        let db = test_support::db().await;
        let email = Arc::new(RecordingEmail::default());
        let auth = AuthService::new(db.pool.clone(), email.clone(), tokens());

        auth.request_code("  New.Backer@Example.com ").await.unwrap();
        assert_eq!(email.sent_to("new.backer@example.com").len(), 1);
        let code = code_from(&email);
        assert_eq!(code.len(), 6);

        let signed_in = auth.verify_code("new.backer@example.com", &code).await.unwrap();
        assert!(signed_in.created);
        assert_eq!(signed_in.user.email, "new.backer@example.com");

        let claims = tokens().verify(&signed_in.token).unwrap();
        assert_eq!(claims.sub, signed_in.user.id);
        assert_eq!(claims.role, UserRole::User);

        // Codes are single use
        assert!(matches!(
            auth.verify_code("new.backer@example.com", &code).await,
            Err(AuthError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn attempts_are_capped() {
        let db = test_support::db().await;
        let email = Arc::new(RecordingEmail::default());
        let auth = AuthService::new(db.pool.clone(), email.clone(), tokens());
        auth.request_code("backer@example.com").await.unwrap();
        let code = code_from(&email);
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..OTP_MAX_ATTEMPTS - 1 {
            assert!(matches!(
                auth.verify_code("backer@example.com", wrong).await,
                Err(AuthError::InvalidCode)
            ));
        }
        assert!(matches!(
            auth.verify_code("backer@example.com", wrong).await,
            Err(AuthError::TooManyAttempts)
        ));
        // Even the right code is refused now
        assert!(matches!(
            auth.verify_code("backer@example.com", &code).await,
            Err(AuthError::TooManyAttempts)
        ));
    }

    #[tokio::test]
    async fn concurrent_guesses_share_one_attempt_budget() {
        let db = test_support::db().await;
        let email = Arc::new(RecordingEmail::default());
        let auth = AuthService::new(db.pool.clone(), email.clone(), tokens());
        auth.request_code("racer@example.com").await.unwrap();
        let code = code_from(&email);
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let guesses: Vec<&str> = (0..20).map(|i| if i == 19 { code.as_str() } else { wrong }).collect();
        let results = join_all(
            guesses
                .iter()
                .map(|guess| auth.verify_code("racer@example.com", guess)),
        )
        .await;

        let counted = results
            .iter()
            .filter(|r| !matches!(r, Err(AuthError::TooManyAttempts)))
            .count();
        assert!(counted <= OTP_MAX_ATTEMPTS as usize, "{counted} attempts were evaluated");
        assert!(results.iter().filter(|r| r.is_ok()).count() <= 1);
    }

    #[tokio::test]
    async fn restricted_signups_need_approved_waitlist() {
        let db = test_support::db().await;
        let auth = AuthService::new(db.pool.clone(), Arc::new(RecordingEmail::default()), tokens());
        PlatformSettings::update(
            &db.pool,
            &UpdatePlatformSettings {
                signups_restricted: Some(true),
                platform_fee_bps: None,
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            auth.request_code("early@example.com").await,
            Err(AuthError::WaitlistRequired)
        ));

        let entry = WaitlistEntry::create(&db.pool, Uuid::new_v4(), "early@example.com", None)
            .await
            .unwrap();
        WaitlistEntry::update_status(&db.pool, entry.id, WaitlistStatus::Approved)
            .await
            .unwrap();
        assert!(auth.request_code("early@example.com").await.is_ok());

        // Existing users are never blocked
        test_support::user(&db, "existing@example.com").await;
        assert!(auth.request_code("existing@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn rejects_malformed_email_and_tokens() {
        let db = test_support::db().await;
        let auth = AuthService::new(db.pool.clone(), Arc::new(RecordingEmail::default()), tokens());
        assert!(matches!(auth.request_code("not-an-email").await, Err(AuthError::Validation(_))));

        assert!(tokens().verify("garbage").is_err());
        let other = SessionTokens::new(SecretString::from("other-secret"), 1);
        let user = test_support::user(&db, "x@example.com").await;
        let token = other.issue(&user).unwrap();
        assert!(matches!(tokens().verify(&token), Err(AuthError::InvalidToken)));
    }
}
