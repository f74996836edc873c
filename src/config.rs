use std::env;

use chrono::Duration;

use crate::error::AppError;

/// One year. Longer deadlines are treated as a misconfiguration.
pub const MAX_TASK_SLA_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub badge_queue_size: usize,
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Knobs the engine itself reads at request time.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub task_sla_hours: i64,
    pub max_batch_size: usize,
    pub assign_retry_limit: u32,
    /// When set, new city roots need this token. When unset, only the first root
    /// of an empty hierarchy can be seeded.
    pub bootstrap_token: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            task_sla_hours: 48,
            max_batch_size: 50,
            assign_retry_limit: 1,
            bootstrap_token: None,
        }
    }
}

impl EngineSettings {
    /// Time a courier has from acceptance to delivery.
    pub fn task_sla(&self) -> Result<Duration, AppError> {
        Duration::try_hours(self.task_sla_hours).ok_or_else(|| {
            AppError::Internal(format!("task sla of {} hours is out of range", self.task_sla_hours))
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact/json"
                )));
            }
        };

        let engine = EngineSettings {
            task_sla_hours: parse_or_default("TASK_SLA_HOURS", 48)?,
            max_batch_size: parse_or_default("MAX_BATCH_SIZE", 50)?,
            assign_retry_limit: parse_or_default("ASSIGN_RETRY_LIMIT", 1)?,
            bootstrap_token: env::var("BOOTSTRAP_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),
        };

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            badge_queue_size: parse_or_default("BADGE_QUEUE_SIZE", 1024)?,
            engine,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the runtime would otherwise panic on.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=MAX_TASK_SLA_HOURS).contains(&self.engine.task_sla_hours) {
            return Err(AppError::Internal(format!(
                "TASK_SLA_HOURS must be in 1..={MAX_TASK_SLA_HOURS}, got {}",
                self.engine.task_sla_hours
            )));
        }

        let sizes = [
            ("EVENT_BUFFER_SIZE", self.event_buffer_size),
            ("BADGE_QUEUE_SIZE", self.badge_queue_size),
            ("MAX_BATCH_SIZE", self.engine.max_batch_size),
        ];
        for (key, value) in sizes {
            if value == 0 {
                return Err(AppError::Internal(format!("{key} must be > 0")));
            }
        }

        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| AppError::Internal(format!("invalid {key}={raw:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            event_buffer_size: 1024,
            badge_queue_size: 1024,
            engine: EngineSettings::default(),
        }
    }

    fn rejected(config: &Config, key: &str) -> bool {
        matches!(config.validate(), Err(AppError::Internal(msg)) if msg.contains(key))
    }

    #[test]
    fn defaults_are_valid() {
        assert!(config().validate().is_ok());
        assert_eq!(EngineSettings::default().task_sla().unwrap(), Duration::hours(48));
    }

    #[test]
    fn zero_sizes_fail_startup() {
        let mut events = config();
        events.event_buffer_size = 0;
        assert!(rejected(&events, "EVENT_BUFFER_SIZE"));

        let mut sweeps = config();
        sweeps.badge_queue_size = 0;
        assert!(rejected(&sweeps, "BADGE_QUEUE_SIZE"));

        let mut batch = config();
        batch.engine.max_batch_size = 0;
        assert!(rejected(&batch, "MAX_BATCH_SIZE"));
    }

    #[test]
    fn parse_errors_name_the_key_and_value() {
        assert_eq!(parse_value::<u16>("HTTP_PORT", " 8080 ").unwrap(), 8080);

        let err = parse_value::<usize>("MAX_BATCH_SIZE", "fifty").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("MAX_BATCH_SIZE=\"fifty\""), "{msg}");

        let err = parse_value::<u16>("HTTP_PORT", "70000").unwrap_err();
        assert!(err.to_string().contains("HTTP_PORT=\"70000\""));
    }

    #[test]
    fn sla_hours_are_bounded() {
        for hours in [0, -1, MAX_TASK_SLA_HOURS + 1, i64::MAX] {
            let mut config = config();
            config.engine.task_sla_hours = hours;
            assert!(rejected(&config, "TASK_SLA_HOURS"), "{hours}");
        }

        let settings = EngineSettings {
            task_sla_hours: i64::MAX,
            ..EngineSettings::default()
        };
        assert!(matches!(settings.task_sla(), Err(AppError::Internal(_))));
    }
}
