use std::env;
use std::path::PathBuf;

use chrono::FixedOffset;
use tokio::time::Duration;

use crate::engine::reminders::ReminderSettings;
use crate::error::AppError;
use crate::gateway::GatewayConfig;
use crate::phone::DEFAULT_COUNTRY_CODE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub waha_api_url: String,
    pub waha_session_name: String,
    pub waha_api_key: Option<String>,
    pub country_code: String,
    pub dry_run: bool,
    pub reminder_interval_secs: u64,
    pub reminder_lead_minutes: i64,
    pub delivery_utc_offset_hours: i32,
    pub seed_data_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("compact") => LogFormat::Compact,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other} (expected compact or json)"
                )));
            }
        };

        let delivery_utc_offset_hours = parse_or_default(&var, "DELIVERY_UTC_OFFSET_HOURS", 3)?;
        if !(-12..=14).contains(&delivery_utc_offset_hours) {
            return Err(AppError::Internal(format!(
                "invalid DELIVERY_UTC_OFFSET_HOURS: {delivery_utc_offset_hours}"
            )));
        }

        let reminder_interval_secs = parse_or_default(&var, "REMINDER_INTERVAL_SECS", 300)?;
        if reminder_interval_secs == 0 {
            return Err(AppError::Internal(
                "invalid REMINDER_INTERVAL_SECS: must be positive".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default(&var, "HTTP_PORT", 3000)?,
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            event_buffer_size: parse_or_default(&var, "EVENT_BUFFER_SIZE", 1024)?,
            waha_api_url: var("WAHA_API_URL")
                .unwrap_or_else(|| "http://localhost:3001".to_string()),
            waha_session_name: var("WAHA_SESSION_NAME").unwrap_or_else(|| "default".to_string()),
            waha_api_key: var("WAHA_API_KEY").filter(|key| !key.is_empty()),
            country_code: var("WHATSAPP_COUNTRY_CODE")
                .unwrap_or_else(|| DEFAULT_COUNTRY_CODE.to_string()),
            dry_run: parse_or_default(&var, "WHATSAPP_DRY_RUN", false)?,
            reminder_interval_secs,
            reminder_lead_minutes: parse_or_default(&var, "REMINDER_LEAD_MINUTES", 30)?,
            delivery_utc_offset_hours,
            seed_data_path: var("SEED_DATA_PATH")
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            gateway_url: self.waha_api_url.clone(),
            session_name: self.waha_session_name.clone(),
            api_key: self.waha_api_key.clone(),
            country_code: self.country_code.clone(),
        }
    }

    pub fn reminders(&self) -> Result<ReminderSettings, AppError> {
        let utc_offset = FixedOffset::east_opt(self.delivery_utc_offset_hours * 3600).ok_or_else(
            || {
                AppError::Internal(format!(
                    "invalid DELIVERY_UTC_OFFSET_HOURS: {}",
                    self.delivery_utc_offset_hours
                ))
            },
        )?;

        Ok(ReminderSettings {
            interval: Duration::from_secs(self.reminder_interval_secs),
            lead_minutes: self.reminder_lead_minutes,
            utc_offset,
        })
    }
}

fn parse_or_default<T, F>(var: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.http_port, 3000);
        assert_eq!(config.log_format, LogFormat::Compact);
        assert_eq!(config.waha_api_url, "http://localhost:3001");
        assert_eq!(config.waha_session_name, "default");
        assert!(config.waha_api_key.is_none());
        assert_eq!(config.country_code, "973");
        assert!(!config.dry_run);
        assert_eq!(config.reminder_lead_minutes, 30);
        assert!(config.seed_data_path.is_none());
    }

    #[test]
    fn gateway_settings_come_from_waha_keys() {
        let config = config_from(&[
            ("WAHA_API_URL", "http://waha:3000"),
            ("WAHA_SESSION_NAME", "dispatch"),
            ("WAHA_API_KEY", "secret"),
            ("WHATSAPP_DRY_RUN", "true"),
        ])
        .unwrap();

        let gateway = config.gateway();
        assert_eq!(gateway.gateway_url, "http://waha:3000");
        assert_eq!(gateway.session_name, "dispatch");
        assert_eq!(gateway.api_key.as_deref(), Some("secret"));
        assert!(config.dry_run);
    }

    #[test]
    fn malformed_numbers_name_the_key() {
        let err = config_from(&[("HTTP_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("HTTP_PORT"));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(config_from(&[("LOG_FORMAT", "pretty")]).is_err());
        let json = config_from(&[("LOG_FORMAT", "json")]).unwrap();
        assert_eq!(json.log_format, LogFormat::Json);
    }

    #[test]
    fn reminder_settings_use_delivery_offset() {
        let config = config_from(&[
            ("DELIVERY_UTC_OFFSET_HOURS", "4"),
            ("REMINDER_INTERVAL_SECS", "60"),
        ])
        .unwrap();

        let reminders = config.reminders().unwrap();
        assert_eq!(reminders.utc_offset.local_minus_utc(), 4 * 3600);
        assert_eq!(reminders.interval, Duration::from_secs(60));
        assert!(config_from(&[("REMINDER_INTERVAL_SECS", "0")]).is_err());
    }
}
