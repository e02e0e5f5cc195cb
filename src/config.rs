// Конфигурация приложения
// Логирование можно отключить только в режиме разработки

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::media::MediaConstraints;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене логирование отключено

/// Prefix of environment overrides, e.g. `TUTOR_CALL__SIGNALING__URL`.
pub const ENV_PREFIX: &str = "TUTOR_CALL";

/// Basename of the optional config file (`tutor-call.toml`, `.json`, ...).
pub const CONFIG_FILE: &str = "tutor-call";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("ICE server `{0}` has an empty url")]
    EmptyIceUrl(String),

    #[error("TURN server `{0}` requires username and credential")]
    MissingTurnCredentials(String),
}

/// Конфигурация ICE сервера
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IceServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::EmptyIceUrl(self.id.clone()));
        }
        if self.r#type == "turn" && (self.username.is_none() || self.credential.is_none()) {
            return Err(ConfigError::MissingTurnCredentials(self.id.clone()));
        }
        Ok(())
    }
}

pub fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![
        IceServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        IceServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignalingConfig {
    pub url: String,
    /// Seconds between keepalive pings; 0 disables them.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

fn default_keepalive_secs() -> u64 {
    25
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:5000/signaling".into(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

/// Everything a call session needs besides the caller's identity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    #[serde(default)]
    pub signaling: SignalingConfig,
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServerConfig>,
    #[serde(default)]
    pub media: MediaConstraints,
    /// Period of the in-call timer.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_tick_ms() -> u64 {
    1000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signaling: SignalingConfig::default(),
            ice_servers: default_ice_servers(),
            media: MediaConstraints::default(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl SessionConfig {
    /// Defaults, then `tutor-call.*` if present, then `TUTOR_CALL__*` env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = SignalingConfig::default();
        let cfg = config::Config::builder()
            .set_default("signaling.url", defaults.url)?
            .set_default("signaling.keepalive_secs", defaults.keepalive_secs as i64)?
            .set_default("tick_ms", default_tick_ms() as i64)?
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let session: SessionConfig = cfg.try_deserialize()?;
        session.validate()?;
        Ok(session)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for server in &self.ice_servers {
            server.validate()?;
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn keepalive(&self) -> Option<Duration> {
        (self.signaling.keepalive_secs > 0)
            .then(|| Duration::from_secs(self.signaling.keepalive_secs))
    }
}
