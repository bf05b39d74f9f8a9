//! Construction-time configuration.
//!
//! Misconfiguration is reported once, when the configuration is built, rather
//! than on every request.

use std::fmt;

use secrecy::{ExposeSecret, SecretVec};
use time::Duration;

use crate::signing::Signer;

/// How long a remember-me token stays valid unless configured otherwise.
pub const DEFAULT_REMEMBER_DURATION: Duration = Duration::days(14);

const SECRET_KEY_VAR: &str = "AUTH_SECRET_KEY";
const REMEMBER_DAYS_VAR: &str = "AUTH_REMEMBER_DAYS";
const SECONDS_PER_DAY: i64 = 86_400;

/// Errors raised while building an [`AuthConfig`] or a [`Signer`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No secret, or an empty one, was supplied.
    #[error("secret key must not be empty")]
    MissingSecret,

    /// The remember-me duration is zero or negative.
    #[error("remember-me duration must be positive, got {0}")]
    InvalidDuration(Duration),

    /// An environment variable holds an unusable value.
    #[error("environment variable `{name}` is invalid: {reason}")]
    InvalidEnv {
        /// Name of the offending variable.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Validated authentication settings.
///
/// ```rust
/// use axum_auth_chain::AuthConfig;
/// use time::Duration;
///
/// let config = AuthConfig::builder("a very secret key")
///     .with_remember_duration(Duration::days(7))
///     .build()
///     .unwrap();
///
/// assert_eq!(config.remember_duration(), Duration::days(7));
/// ```
#[derive(Debug, Clone)]
pub struct AuthConfig {
    signer: Signer,
    remember_duration: Duration,
}

impl AuthConfig {
    /// Starts a builder from the application secret.
    ///
    /// The secret is used to derive every HMAC key of the crate. For security
    /// reasons, this value **must** be securely generated.
    pub fn builder(secret: impl Into<Vec<u8>>) -> AuthConfigBuilder {
        AuthConfigBuilder {
            secret: SecretVec::new(secret.into()),
            remember_duration: DEFAULT_REMEMBER_DURATION,
        }
    }

    /// Reads `AUTH_SECRET_KEY` and the optional `AUTH_REMEMBER_DAYS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = std::env::var(SECRET_KEY_VAR).map_err(|_| ConfigError::MissingSecret)?;

        let mut builder = Self::builder(secret);
        if let Ok(days) = std::env::var(REMEMBER_DAYS_VAR) {
            let days = days
                .trim()
                .parse::<i64>()
                .map_err(|err| ConfigError::InvalidEnv {
                    name: REMEMBER_DAYS_VAR,
                    reason: err.to_string(),
                })?;
            let duration = days
                .checked_mul(SECONDS_PER_DAY)
                .map(Duration::seconds)
                .ok_or_else(|| ConfigError::InvalidEnv {
                    name: REMEMBER_DAYS_VAR,
                    reason: "out of range".to_owned(),
                })?;
            builder = builder.with_remember_duration(duration);
        }

        builder.build()
    }

    /// The root signer every backend derives its keys from.
    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Lifetime of remember-me tokens.
    pub fn remember_duration(&self) -> Duration {
        self.remember_duration
    }
}

/// Builder for [`AuthConfig`].
pub struct AuthConfigBuilder {
    secret: SecretVec<u8>,
    remember_duration: Duration,
}

impl fmt::Debug for AuthConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfigBuilder")
            .field("remember_duration", &self.remember_duration)
            .finish_non_exhaustive()
    }
}

impl AuthConfigBuilder {
    /// Configure how long remember-me tokens are honoured. If not configured
    /// it will default to [`DEFAULT_REMEMBER_DURATION`].
    pub fn with_remember_duration(mut self, duration: Duration) -> Self {
        self.remember_duration = duration;
        self
    }

    /// Validates the settings and builds the [`AuthConfig`].
    pub fn build(self) -> Result<AuthConfig, ConfigError> {
        if !self.remember_duration.is_positive() {
            return Err(ConfigError::InvalidDuration(self.remember_duration));
        }

        let signer = Signer::new(self.secret.expose_secret())?;

        Ok(AuthConfig {
            signer,
            remember_duration: self.remember_duration,
        })
    }
}
