//! # Bridge configuration
//!
//! One TOML file, one section per subsystem. Every field has a default taken
//! from the controller firmware timings, so an empty file (or no file at all)
//! yields a working bridge.
//!
//! ```text
//! ~/.config/idrive-bridge/config.toml
//!   [handshake]  periods, retries, cooldown, rx timeout, scheduler tick
//!   [joystick]   mode = "mouse" | "arrow_keys", step
//!   [rotary]     mode = "scroll" | "volume", enabled, step_delay_ms,
//!                max_steps_per_frame
//!   [touchpad]   layout, deadzone, multipliers, tap and scroll thresholds
//!   [buttons]    preset = "android" | "desktop", [[buttons.bindings]]
//!   [light]      enabled
//!   [logging]    level
//! ```
//!
//! Loading goes through `tokio::fs`; a missing file is not an error for
//! [`BridgeConfig::load_or_default`].

use crate::controller::HandshakeSettings;
use crate::input::button::ButtonSettings;
use crate::input::joystick::JoystickSettings;
use crate::input::rotary::RotarySettings;
use crate::input::touchpad::TouchpadSettings;
use crate::protocol::TouchLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CONFIG_DIR_NAME: &str = "idrive-bridge";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not determine a configuration directory")]
    NoConfigDir,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct TouchpadSection {
    pub layout: TouchLayout,
    #[serde(flatten)]
    pub gestures: TouchpadSettings,
}

impl Default for TouchpadSection {
    fn default() -> Self {
        Self {
            layout: TouchLayout::MultiTouch9Bit,
            gestures: TouchpadSettings::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct LightSettings {
    pub enabled: bool,
}

impl Default for LightSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    pub handshake: HandshakeSettings,
    pub joystick: JoystickSettings,
    pub rotary: RotarySettings,
    pub touchpad: TouchpadSection,
    pub buttons: ButtonSettings,
    pub light: LightSettings,
    pub logging: LoggingSettings,
}

impl BridgeConfig {
    /// `<config dir>/idrive-bridge/config.toml`, falling back to the home
    /// directory when the platform has no config dir.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = dirs::config_dir() {
            return Ok(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
        }
        warn!("No platform config directory, falling back to home directory");
        dirs::home_dir()
            .map(|home| home.join(format!(".{}", CONFIG_DIR_NAME)).join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let text = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Defaults when the file does not exist; parse errors still fail.
    pub async fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if tokio::fs::try_exists(path).await? {
            Self::load(path).await
        } else {
            info!(
                "No configuration at {}, using defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// Write the defaults if nothing exists at `path` yet.
    ///
    /// Returns `true` when a file was created.
    pub async fn ensure_default_config(path: &Path) -> Result<bool, ConfigError> {
        if tokio::fs::try_exists(path).await? {
            debug!("Configuration already present at {}", path.display());
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = Self::default().to_toml_string()?;
        tokio::fs::write(path, text).await?;
        info!("Wrote default configuration to {}", path.display());
        Ok(true)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let h = &self.handshake;
        let periods = [
            ("handshake.poll_interval_ms", h.poll_interval_ms),
            ("handshake.light_keepalive_ms", h.light_keepalive_ms),
            ("handshake.init_retry_ms", h.init_retry_ms),
            ("handshake.touchpad_retry_ms", h.touchpad_retry_ms),
            ("handshake.rx_timeout_ms", h.rx_timeout_ms),
            ("handshake.tick_ms", h.tick_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }

        if self.joystick.step > 127 {
            return Err(ConfigError::Invalid(format!(
                "joystick.step {} exceeds 127",
                self.joystick.step
            )));
        }

        if self.rotary.max_steps_per_frame == 0 {
            return Err(ConfigError::Invalid(
                "rotary.max_steps_per_frame must be positive".to_string(),
            ));
        }

        let t = &self.touchpad.gestures;
        let multipliers = [
            ("touchpad.x_multiplier", t.x_multiplier),
            ("touchpad.y_multiplier", t.y_multiplier),
            ("touchpad.scroll_multiplier", t.scroll_multiplier),
        ];
        for (name, value) in multipliers {
            if !(1..=100).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within 1..=100, got {}",
                    name, value
                )));
            }
        }
        if t.scroll_threshold == 0 {
            return Err(ConfigError::Invalid(
                "touchpad.scroll_threshold must be positive".to_string(),
            ));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown logging.level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }
}
