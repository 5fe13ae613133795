//! Runtime configuration read from the environment (and `.env` when present).

use secrecy::SecretString;
use thiserror::Error;
use tracing::warn;

use super::admin::MAX_PLATFORM_FEE_BPS;

const DEV_JWT_SECRET: &str = "vibefunder-dev-secret-do-not-use-in-production";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub app_base_url: String,
    pub jwt_secret: SecretString,
    pub session_ttl_hours: i64,
    pub stripe_secret_key: Option<SecretString>,
    pub stripe_webhook_secret: Option<SecretString>,
    pub default_fee_bps: i64,
    pub resend_api_key: Option<SecretString>,
    pub email_from: String,
    pub anthropic_api_key: Option<SecretString>,
    pub github_token: Option<SecretString>,
    pub milestone_review_days: i64,
    pub sentry_dsn: Option<String>,
    pub environment: String,
    /// Problems found while loading, held until logging is up.
    pub warnings: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let dotenv_error = match dotenvy::dotenv() {
            Err(e) if !e.not_found() => Some(format!("Failed to load .env: {e}")),
            _ => None,
        };
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.warnings.extend(dotenv_error);
        Ok(config)
    }

    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            warn!("{}", warning);
        }
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secret = |key: &str| get(key).map(SecretString::from);

        let environment = get("APP_ENV").unwrap_or_else(|| {
            if cfg!(debug_assertions) {
                "development".to_string()
            } else {
                "production".to_string()
            }
        });

        let mut warnings = Vec::new();
        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => SecretString::from(secret),
            None if environment == "production" => return Err(ConfigError::Missing("JWT_SECRET")),
            None => {
                warnings.push("JWT_SECRET not set, using the development secret".to_string());
                SecretString::from(DEV_JWT_SECRET)
            }
        };

        // Same ceiling the admin console enforces
        let default_fee_bps = parse_or(&get, "STRIPE_APPLICATION_FEE_BPS", 500)?;
        if !(0..=MAX_PLATFORM_FEE_BPS).contains(&default_fee_bps) {
            return Err(ConfigError::Invalid {
                key: "STRIPE_APPLICATION_FEE_BPS",
                value: default_fee_bps.to_string(),
            });
        }

        Ok(Self {
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://vibefunder.db?mode=rwc".to_string()),
            host: get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&get, "PORT", 3001)?,
            app_base_url: get("APP_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            jwt_secret,
            session_ttl_hours: parse_or(&get, "SESSION_TTL_HOURS", 168)?,
            stripe_secret_key: secret("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: secret("STRIPE_WEBHOOK_SECRET"),
            default_fee_bps,
            resend_api_key: secret("RESEND_API_KEY"),
            email_from: get("EMAIL_FROM")
                .unwrap_or_else(|| "VibeFunder <noreply@vibefunder.ai>".to_string()),
            anthropic_api_key: secret("ANTHROPIC_API_KEY"),
            github_token: secret("GITHUB_TOKEN"),
            milestone_review_days: parse_or(&get, "MILESTONE_REVIEW_DAYS", 10)?,
            sentry_dsn: get("SENTRY_DSN"),
            environment,
            warnings,
        })
    }

    /// Development defaults with every external integration unset.
    pub fn for_development() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| (key == "APP_ENV").then(|| "development".to_string()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn campaign_url(&self, campaign_id: uuid::Uuid) -> String {
        format!("{}/campaigns/{}", self.app_base_url, campaign_id)
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[("APP_ENV", "development")])).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.default_fee_bps, 500);
        assert_eq!(config.milestone_review_days, 10);
        assert_eq!(config.session_ttl_hours, 168);
        assert!(config.stripe_secret_key.is_none());
        assert_eq!(config.jwt_secret.expose_secret(), DEV_JWT_SECRET);
        assert_eq!(config.warnings.len(), 1);
        assert!(config.warnings[0].contains("JWT_SECRET"));
    }

    #[test]
    fn production_requires_jwt_secret() {
        let err = Config::from_lookup(lookup(&[("APP_ENV", "production")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn values_are_parsed_and_validated() {
        let config = Config::from_lookup(lookup(&[
            ("APP_ENV", "production"),
            ("JWT_SECRET", "s3cret"),
            ("PORT", "8080"),
            ("APP_BASE_URL", "https://vibefunder.ai/"),
            ("STRIPE_SECRET_KEY", "sk_test_123"),
            ("RESEND_API_KEY", ""),
        ]))
        .unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.app_base_url, "https://vibefunder.ai");
        assert!(config.stripe_secret_key.is_some());
        assert!(config.resend_api_key.is_none());
        assert!(config.warnings.is_empty());

        let err = Config::from_lookup(lookup(&[
            ("APP_ENV", "development"),
            ("STRIPE_APPLICATION_FEE_BPS", "20000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "STRIPE_APPLICATION_FEE_BPS", .. }));

        assert!(Config::from_lookup(lookup(&[("PORT", "nope")])).is_err());
    }

    #[test]
    fn fee_default_is_capped_like_the_admin_setting() {
        let fee = |bps: &str| {
            Config::from_lookup(lookup(&[
                ("APP_ENV", "development"),
                ("STRIPE_APPLICATION_FEE_BPS", bps),
            ]))
            .map(|config| config.default_fee_bps)
        };
        assert_eq!(fee("3000").unwrap(), MAX_PLATFORM_FEE_BPS);
        assert_eq!(fee("0").unwrap(), 0);
        assert!(matches!(
            fee("3001"),
            Err(ConfigError::Invalid { key: "STRIPE_APPLICATION_FEE_BPS", .. })
        ));
        assert!(fee("-1").is_err());
    }

    #[test]
    fn development_config_builds() {
        let config = Config::for_development().unwrap();
        assert_eq!(config.environment, "development");
        assert_eq!(config.app_base_url, "http://localhost:3000");
    }
}
