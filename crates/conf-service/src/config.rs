//! Conference coordinator configuration.
//!
//! Configuration is loaded from environment variables. Every variable has a
//! default; a value that is present but malformed is an error rather than
//! being silently replaced by the default.

use crate::actors::{ConferenceLimits, ControllerConfig};

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default WebSocket bind address.
pub const DEFAULT_WS_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

pub const DEFAULT_MAX_CONFERENCES: usize = 1000;
pub const DEFAULT_MAX_PARTICIPANTS: usize = 300;
pub const DEFAULT_BREAKOUT_ROOM_CAPACITY: usize = 50;
pub const DEFAULT_MAX_BREAKOUT_ROOMS: u32 = 50;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 10;
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_EMPTY_CONFERENCE_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_CONNECTION_BUFFER: usize = 256;
pub const DEFAULT_MAX_CHAT_LENGTH: usize = 4000;

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "conf";

/// Conference coordinator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket server bind address (default: "0.0.0.0:8080").
    pub ws_bind_address: String,

    /// Health and metrics bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Instance identifier used in logs.
    pub instance_id: String,

    pub max_conferences: usize,

    /// Default conference-wide participant bound.
    pub max_participants: usize,

    pub breakout_room_capacity: usize,

    /// Upper bound for a single breakout batch.
    pub max_breakout_rooms: u32,

    /// Server ping interval.
    pub heartbeat_interval_seconds: u64,

    /// Silence after which a connection counts as disconnected.
    pub heartbeat_timeout_seconds: u64,

    pub empty_conference_timeout_seconds: u64,

    /// Per-connection outbound mailbox size.
    pub connection_buffer: usize,

    /// Admit conference ids the catalog does not know.
    pub allow_adhoc: bool,

    /// Chat message bound, in characters.
    pub max_chat_length: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let ws_bind_address = vars
            .get("CONF_WS_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_WS_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("CONF_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let instance_id = vars.get("CONF_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        let config = Config {
            ws_bind_address,
            health_bind_address,
            instance_id,
            max_conferences: parse_var(vars, "CONF_MAX_CONFERENCES", DEFAULT_MAX_CONFERENCES)?,
            max_participants: parse_var(
                vars,
                "CONF_MAX_PARTICIPANTS",
                DEFAULT_MAX_PARTICIPANTS,
            )?,
            breakout_room_capacity: parse_var(
                vars,
                "CONF_BREAKOUT_ROOM_CAPACITY",
                DEFAULT_BREAKOUT_ROOM_CAPACITY,
            )?,
            max_breakout_rooms: parse_var(
                vars,
                "CONF_MAX_BREAKOUT_ROOMS",
                DEFAULT_MAX_BREAKOUT_ROOMS,
            )?,
            heartbeat_interval_seconds: parse_var(
                vars,
                "CONF_HEARTBEAT_INTERVAL_SECONDS",
                DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
            )?,
            heartbeat_timeout_seconds: parse_var(
                vars,
                "CONF_HEARTBEAT_TIMEOUT_SECONDS",
                DEFAULT_HEARTBEAT_TIMEOUT_SECONDS,
            )?,
            empty_conference_timeout_seconds: parse_var(
                vars,
                "CONF_EMPTY_CONFERENCE_TIMEOUT_SECONDS",
                DEFAULT_EMPTY_CONFERENCE_TIMEOUT_SECONDS,
            )?,
            connection_buffer: parse_var(
                vars,
                "CONF_CONNECTION_BUFFER",
                DEFAULT_CONNECTION_BUFFER,
            )?,
            allow_adhoc: parse_bool(vars, "CONF_ALLOW_ADHOC", true)?,
            max_chat_length: parse_var(vars, "CONF_MAX_CHAT_LENGTH", DEFAULT_MAX_CHAT_LENGTH)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("CONF_MAX_CONFERENCES", self.max_conferences),
            ("CONF_MAX_PARTICIPANTS", self.max_participants),
            ("CONF_BREAKOUT_ROOM_CAPACITY", self.breakout_room_capacity),
            ("CONF_CONNECTION_BUFFER", self.connection_buffer),
            ("CONF_MAX_CHAT_LENGTH", self.max_chat_length),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
            }
        }
        if self.max_breakout_rooms == 0 {
            return Err(ConfigError::InvalidValue(
                "CONF_MAX_BREAKOUT_ROOMS must be > 0".to_string(),
            ));
        }
        if self.heartbeat_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "CONF_HEARTBEAT_INTERVAL_SECONDS must be > 0".to_string(),
            ));
        }
        if self.heartbeat_timeout_seconds <= self.heartbeat_interval_seconds {
            return Err(ConfigError::InvalidValue(format!(
                "CONF_HEARTBEAT_TIMEOUT_SECONDS ({}) must exceed CONF_HEARTBEAT_INTERVAL_SECONDS ({})",
                self.heartbeat_timeout_seconds, self.heartbeat_interval_seconds
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_seconds)
    }

    /// Bounds handed to every conference actor.
    #[must_use]
    pub fn conference_limits(&self) -> ConferenceLimits {
        ConferenceLimits {
            max_participants: self.max_participants,
            breakout_room_capacity: self.breakout_room_capacity,
            max_breakout_rooms: self.max_breakout_rooms,
            max_chat_length: self.max_chat_length,
            connection_buffer: self.connection_buffer,
            empty_timeout: Duration::from_secs(self.empty_conference_timeout_seconds),
        }
    }

    #[must_use]
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            instance_id: self.instance_id.clone(),
            max_conferences: self.max_conferences,
            limits: self.conference_limits(),
        }
    }
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(format!("{name} has invalid value '{raw}'"))
        }),
    }
}

fn parse_bool(
    vars: &HashMap<String, String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue(format!(
            "{name} must be true or false, got '{v}'"
        ))),
    }
}
