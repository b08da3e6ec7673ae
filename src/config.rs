//! Controller configuration parsing, environment overrides, and validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Environment variable naming the dependency tag key.
pub const TAG_KEY_ENV: &str = "PARENT_ENV_KEY";
/// Environment variable toggling manual-restart suppression.
pub const IGNORE_MANUAL_ENV: &str = "IGNORE_MANUAL_RESTARTS";
/// Environment variable holding the inter-restart delay in milliseconds.
pub const RESTART_DELAY_ENV: &str = "CHILD_RESTART_DELAY_MS";
/// Environment variable pointing at the PM2 home directory.
pub const PM2_HOME_ENV: &str = "PM2_HOME";

/// Tag key used when nothing else is configured.
pub const DEFAULT_TAG_KEY: &str = "PM2_PARENT_APP";
/// Inter-restart delay used when nothing else is configured.
pub const DEFAULT_RESTART_DELAY_MS: u64 = 200;

fn default_tag_key() -> String {
    DEFAULT_TAG_KEY.into()
}

fn default_restart_delay_ms() -> u64 {
    DEFAULT_RESTART_DELAY_MS
}

/// Cascade controller configuration.
///
/// Every field has a default, so an empty TOML document is a valid
/// configuration. Environment overrides are layered on top with
/// [`apply_env_overrides`](Self::apply_env_overrides).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CascadeConfig {
    /// Environment key a managed process uses to name its parent.
    #[serde(default = "default_tag_key")]
    pub tag_key: String,
    /// When set, operator-triggered parent restarts do not cascade.
    #[serde(default)]
    pub ignore_manual_restarts: bool,
    /// Pause between successive dependent restarts within one cascade.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    /// PM2 home directory holding `rpc.sock` and `pub.sock`.
    #[serde(default)]
    pub pm2_home: Option<PathBuf>,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            tag_key: default_tag_key(),
            ignore_manual_restarts: false,
            restart_delay_ms: default_restart_delay_ms(),
            pm2_home: None,
        }
    }
}

impl CascadeConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Layer the process environment on top of the current values.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the resulting configuration is invalid.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Layer overrides from an arbitrary key lookup on top of the current
    /// values.
    ///
    /// `IGNORE_MANUAL_RESTARTS` is only true for the exact string `"true"`.
    /// `CHILD_RESTART_DELAY_MS` is read from its leading decimal digits, so
    /// `"250ms"` means 250. A value with no leading digits, or one that
    /// reads as zero, falls back to [`DEFAULT_RESTART_DELAY_MS`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the resulting configuration is invalid.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(TAG_KEY_ENV).filter(|v| !v.is_empty()) {
            self.tag_key = key;
        }

        if let Some(flag) = lookup(IGNORE_MANUAL_ENV) {
            self.ignore_manual_restarts = flag == "true";
        }

        if let Some(raw) = lookup(RESTART_DELAY_ENV) {
            self.restart_delay_ms = match leading_millis(&raw) {
                Some(ms) if ms > 0 => ms,
                _ => {
                    warn!(
                        value = %raw,
                        default = DEFAULT_RESTART_DELAY_MS,
                        "invalid {RESTART_DELAY_ENV}, using default"
                    );
                    DEFAULT_RESTART_DELAY_MS
                }
            };
        }

        if let Some(home) = lookup(PM2_HOME_ENV).filter(|v| !v.is_empty()) {
            self.pm2_home = Some(PathBuf::from(home));
        }

        self.validate()
    }

    /// Delay inserted between two successive dependent restarts.
    #[must_use]
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Resolve the PM2 home directory: the configured path, else
    /// `$HOME/.pm2`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no home is configured and `HOME` is unset.
    pub fn resolve_pm2_home(&self) -> Result<PathBuf> {
        if let Some(ref home) = self.pm2_home {
            return Ok(home.clone());
        }

        env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".pm2"))
            .ok_or_else(|| {
                AppError::Config(format!(
                    "cannot locate pm2 home: set {PM2_HOME_ENV} or HOME"
                ))
            })
    }

    fn validate(&self) -> Result<()> {
        if self.tag_key.trim().is_empty() {
            return Err(AppError::Config("tag_key must not be empty".into()));
        }
        Ok(())
    }
}

/// Leading decimal digits of `raw` after optional whitespace and `+`.
/// Trailing text is ignored; a leading `-` yields `None`.
fn leading_millis(raw: &str) -> Option<u64> {
    let trimmed = raw.trim_start();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    unsigned[..end].parse().ok()
}
