use crate::error::Error;
use crate::models::ColumnHeaders;
use crate::Result;
use chrono::Weekday;
use chrono_tz::Tz;
use reqwest::Url;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "RECURBOT";
const DEFAULT_CONFIG_FILE: &str = "recurbot.toml";

/// Process configuration, layered from an optional TOML file and `RECURBOT__*` env vars
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub ledger: LedgerSettings,
    pub notifications: NotificationSettings,
    pub schedule: ScheduleSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub requests_per_minute: u32,
    pub connect_retries: u32,
    pub connect_backoff_secs: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            timeout_secs: 30,
            requests_per_minute: 60,
            connect_retries: 8,
            connect_backoff_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub access_token: String,
    pub api_base: String,
    pub timeout_secs: u64,
    /// 1-based column where audit lines start (7 = G)
    pub log_start_column: usize,
    pub headers: ColumnHeaders,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            sheet_name: "Recurring Orders".to_string(),
            access_token: String::new(),
            api_base: "https://sheets.googleapis.com".to_string(),
            timeout_secs: 30,
            log_start_column: 7,
            headers: ColumnHeaders::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub webhook_url: String,
    pub username: String,
    pub display_limit: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            username: "Recurring Orders Bot".to_string(),
            display_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub timezone: String,
    pub daily_hour: u32,
    pub daily_minute: u32,
    pub misfire_grace_secs: u64,
    pub week_start: String,
    pub inter_order_delay_ms: u64,
    pub health_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_quiet_start: u32,
    pub heartbeat_quiet_end: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            daily_hour: 9,
            daily_minute: 0,
            misfire_grace_secs: 300,
            week_start: "Mon".to_string(),
            inter_order_delay_ms: 1000,
            health_interval_secs: 300,
            heartbeat_interval_secs: 3600,
            heartbeat_quiet_start: 20,
            heartbeat_quiet_end: 6,
        }
    }
}

impl ScheduleSettings {
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| Error::Configuration(format!("schedule.timezone '{}': {}", self.timezone, e)))
    }

    pub fn week_start(&self) -> Result<Weekday> {
        self.week_start.parse::<Weekday>().map_err(|_| {
            Error::Configuration(format!("schedule.week_start '{}' is not a weekday", self.week_start))
        })
    }

    pub fn misfire_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.misfire_grace_secs as i64)
    }

    pub fn inter_order_delay(&self) -> Duration {
        Duration::from_millis(self.inter_order_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8081".to_string(),
        }
    }
}

impl Settings {
    /// Load from `path` (or `recurbot.toml` if present) overlaid with environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject anything that would only fail later at run time
    pub fn validate(&self) -> Result<()> {
        let broker = parse_url("broker.base_url", &self.broker.base_url)?;
        if !matches!(broker.scheme(), "http" | "https") {
            return Err(Error::Configuration(
                "broker.base_url must be http or https".to_string(),
            ));
        }

        let webhook = parse_url("notifications.webhook_url", &self.notifications.webhook_url)?;
        if webhook.scheme() != "https" {
            return Err(Error::Configuration(
                "notifications.webhook_url must be https".to_string(),
            ));
        }

        parse_url("ledger.api_base", &self.ledger.api_base)?;
        require("ledger.spreadsheet_id", &self.ledger.spreadsheet_id)?;
        require("ledger.sheet_name", &self.ledger.sheet_name)?;
        require("ledger.access_token", &self.ledger.access_token)?;
        if self.ledger.log_start_column == 0 {
            return Err(Error::Configuration(
                "ledger.log_start_column is 1-based".to_string(),
            ));
        }

        if self.broker.timeout_secs == 0 || self.ledger.timeout_secs == 0 {
            return Err(Error::Configuration(
                "request timeouts must be positive".to_string(),
            ));
        }
        if self.broker.requests_per_minute == 0 {
            return Err(Error::Configuration(
                "broker.requests_per_minute must be positive".to_string(),
            ));
        }
        if self.notifications.display_limit == 0 {
            return Err(Error::Configuration(
                "notifications.display_limit must be positive".to_string(),
            ));
        }

        let schedule = &self.schedule;
        schedule.timezone()?;
        schedule.week_start()?;
        if schedule.daily_hour > 23 || schedule.daily_minute > 59 {
            return Err(Error::Configuration(format!(
                "invalid daily trigger time {:02}:{:02}",
                schedule.daily_hour, schedule.daily_minute
            )));
        }
        if schedule.heartbeat_quiet_start > 23 || schedule.heartbeat_quiet_end > 23 {
            return Err(Error::Configuration(
                "heartbeat quiet hours must be 0-23".to_string(),
            ));
        }
        if schedule.health_interval_secs == 0 || schedule.heartbeat_interval_secs == 0 {
            return Err(Error::Configuration(
                "job intervals must be positive".to_string(),
            ));
        }

        self.server
            .bind
            .parse::<std::net::SocketAddr>()
            .map_err(|e| Error::Configuration(format!("server.bind '{}': {}", self.server.bind, e)))?;

        Ok(())
    }
}

fn require(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Configuration(format!("{} is required", key)));
    }
    Ok(())
}

fn parse_url(key: &str, value: &str) -> Result<Url> {
    require(key, value)?;
    Url::parse(value).map_err(|e| Error::Configuration(format!("{} '{}': {}", key, value, e)))
}
