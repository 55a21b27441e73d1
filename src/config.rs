use std::env;
use std::str::FromStr;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub email: EmailConfig,
    pub reminders: ReminderConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Resend API key. Read from `RESEND_API_KEY`.
    pub api_key: String,
    /// Base URL of the email API (without the `/emails` suffix).
    pub api_url: String,
    /// Sender used for reminder emails, e.g. `College Events <onboarding@resend.dev>`.
    pub from: String,
    /// Client-level timeout for a single HTTP call to the email API.
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    /// Forward span (minutes) used to prefilter candidate events on each run.
    pub lookahead_minutes: i64,
    /// Whether the in-process poller runs the dispatch job on a fixed cadence.
    pub poll_enabled: bool,
    /// How often (seconds) the poller runs the job. Must stay below the lookahead span.
    pub poll_interval_seconds: u64,
    /// Upper bound (seconds) for every store or transport call made by the job.
    pub call_timeout_seconds: u64,
    /// After this many seconds an unfinished claim may be taken over by another run.
    pub claim_lease_seconds: i64,
    /// Delay before the first retry of a failed send.
    pub initial_backoff_seconds: u64,
    /// Cap for exponential backoff.
    pub max_backoff_seconds: u64,
    /// Send attempts per event before the reminder is abandoned.
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for the dispatch endpoint
    pub dispatch_per_second: u32,
    /// Burst size for the dispatch endpoint
    pub dispatch_burst: u32,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let config = Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or(defaults.server.host),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                ),
            },
            email: EmailConfig {
                api_key: env::var("RESEND_API_KEY")
                    .map_err(|_| ConfigError::MissingEnv("RESEND_API_KEY".to_string()))?,
                api_url: env::var("EMAIL_API_URL").unwrap_or(defaults.email.api_url),
                from: env::var("EMAIL_FROM").unwrap_or(defaults.email.from),
                request_timeout_seconds: env_or(
                    "EMAIL_REQUEST_TIMEOUT_SECONDS",
                    defaults.email.request_timeout_seconds,
                ),
            },
            reminders: ReminderConfig {
                lookahead_minutes: env_or(
                    "REMINDER_LOOKAHEAD_MINUTES",
                    defaults.reminders.lookahead_minutes,
                ),
                poll_enabled: env_flag("REMINDER_POLL_ENABLED", defaults.reminders.poll_enabled),
                poll_interval_seconds: env_or(
                    "REMINDER_POLL_INTERVAL_SECONDS",
                    defaults.reminders.poll_interval_seconds,
                ),
                call_timeout_seconds: env_or(
                    "REMINDER_CALL_TIMEOUT_SECONDS",
                    defaults.reminders.call_timeout_seconds,
                ),
                claim_lease_seconds: env_or(
                    "REMINDER_CLAIM_LEASE_SECONDS",
                    defaults.reminders.claim_lease_seconds,
                ),
                initial_backoff_seconds: env_or(
                    "REMINDER_RETRY_INITIAL_BACKOFF_SECONDS",
                    defaults.reminders.initial_backoff_seconds,
                ),
                max_backoff_seconds: env_or(
                    "REMINDER_RETRY_MAX_BACKOFF_SECONDS",
                    defaults.reminders.max_backoff_seconds,
                ),
                max_attempts: env_or(
                    "REMINDER_RETRY_MAX_ATTEMPTS",
                    defaults.reminders.max_attempts,
                ),
            },
            rate_limit: RateLimitConfig {
                dispatch_per_second: env_or(
                    "RATE_LIMIT_DISPATCH_PER_SECOND",
                    defaults.rate_limit.dispatch_per_second,
                ),
                dispatch_burst: env_or(
                    "RATE_LIMIT_DISPATCH_BURST",
                    defaults.rate_limit.dispatch_burst,
                ),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.reminders.lookahead_minutes <= 0 {
            return Err(ConfigError::InvalidValue(
                "REMINDER_LOOKAHEAD_MINUTES".to_string(),
            ));
        }
        if self.reminders.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "REMINDER_RETRY_MAX_ATTEMPTS".to_string(),
            ));
        }
        if self.email.request_timeout_seconds > self.reminders.call_timeout_seconds {
            return Err(ConfigError::InvalidValue(
                "EMAIL_REQUEST_TIMEOUT_SECONDS".to_string(),
            ));
        }
        if self.reminders.poll_enabled
            && self.reminders.poll_interval_seconds as i64 >= self.reminders.lookahead_minutes * 60
        {
            tracing::warn!(
                "Reminder poll interval ({}s) is not shorter than the lookahead span ({}m); reminders may be missed",
                self.reminders.poll_interval_seconds,
                self.reminders.lookahead_minutes
            );
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/app.db".to_string(),
                max_connections: 5,
            },
            email: EmailConfig {
                api_key: String::new(),
                api_url: "https://api.resend.com".to_string(),
                from: "College Events <onboarding@resend.dev>".to_string(),
                request_timeout_seconds: 8,
            },
            reminders: ReminderConfig {
                lookahead_minutes: 60,
                poll_enabled: true,
                poll_interval_seconds: 60,
                call_timeout_seconds: 10,
                claim_lease_seconds: 120,
                initial_backoff_seconds: 60,
                max_backoff_seconds: 900,
                max_attempts: 5,
            },
            rate_limit: RateLimitConfig {
                dispatch_per_second: 1,
                dispatch_burst: 10,
            },
        }
    }
}
