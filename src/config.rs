//! Runtime configuration from environment variables.
//!
//! All variables use the `SUBSCRIBER_` prefix. An env file (default `.env`,
//! overridable via `SUBSCRIBER_ENV_FILE`) is loaded by the binaries before
//! this module reads the environment.

use crate::answer::DEFAULT_SEPARATOR;
use std::env;
use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => {
                write!(f, "Missing environment variable: {}", var)
            }
            ConfigError::InvalidValue(msg) => {
                write!(f, "Invalid configuration value: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub mqtt: MqttSettings,
    pub db_path: String,
    pub questions_path: String,
    pub answer_topic: String,
    pub separator: char,
    /// Upper bound on concurrently running persist+aggregate handlers.
    pub max_inflight: usize,
}

fn require(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVariable(name.to_string()))
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let hostname = require("SUBSCRIBER_MQTT_HOSTNAME")?;
        let port = require("SUBSCRIBER_MQTT_PORT")?
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("SUBSCRIBER_MQTT_PORT must be a port number".to_string())
            })?;
        let username = require("SUBSCRIBER_MQTT_USERNAME")?;
        let password = require("SUBSCRIBER_MQTT_PASSWORD")?;

        let use_tls = env::var("SUBSCRIBER_MQTT_USE_TLS")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            .parse::<bool>()
            .unwrap_or(false);

        let db_path = env::var("SUBSCRIBER_DB_PATH").unwrap_or_else(|_| "consumer.db".to_string());
        let questions_path =
            env::var("SUBSCRIBER_QUESTIONS_PATH").unwrap_or_else(|_| "questions.yaml".to_string());
        let answer_topic =
            env::var("SUBSCRIBER_ANSWER_TOPIC").unwrap_or_else(|_| "answer".to_string());

        let separator = match env::var("SUBSCRIBER_MESSAGE_SEPARATOR") {
            Err(_) => DEFAULT_SEPARATOR,
            Ok(raw) => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(sep), None) => sep,
                    _ => {
                        return Err(ConfigError::InvalidValue(
                            "SUBSCRIBER_MESSAGE_SEPARATOR must be a single character".to_string(),
                        ))
                    }
                }
            }
        };

        let max_inflight = env::var("SUBSCRIBER_MAX_INFLIGHT")
            .unwrap_or_else(|_| "64".to_string())
            .parse::<usize>()
            .unwrap_or(64);
        if max_inflight == 0 {
            return Err(ConfigError::InvalidValue(
                "SUBSCRIBER_MAX_INFLIGHT must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            mqtt: MqttSettings {
                hostname,
                port,
                username,
                password,
                use_tls,
            },
            db_path,
            questions_path,
            answer_topic,
            separator,
            max_inflight,
        })
    }
}
