//! Configuration loading and management
//!
//! Handles parsing of `.hierlock.toml` configuration files. Bucket space
//! sizes are a deployment decision: they are read once and handed to the
//! coordinator at construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bucket::{BucketSpace, DEFAULT_BUCKET_SPACE};
use crate::error::{Error, Result};
use crate::memory::{MemorySettings, Provisioning, WaitMode};

/// File name looked up in the working directory
pub const CONFIG_FILE: &str = ".hierlock.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Bucket space per hierarchy level
    #[serde(default)]
    pub buckets: BucketsConfig,

    /// Lock substrate behaviour
    #[serde(default)]
    pub substrate: SubstrateConfig,
}

/// Bucket space sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketsConfig {
    #[serde(default = "default_bucket_space")]
    pub top: u32,

    #[serde(default = "default_bucket_space")]
    pub child: u32,

    #[serde(default = "default_bucket_space")]
    pub leaf: u32,
}

fn default_bucket_space() -> u32 {
    DEFAULT_BUCKET_SPACE
}

impl Default for BucketsConfig {
    fn default() -> Self {
        Self {
            top: default_bucket_space(),
            child: default_bucket_space(),
            leaf: default_bucket_space(),
        }
    }
}

/// Substrate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstrateConfig {
    /// `blocking` waits for conflicting holders, `nowait` fails immediately
    #[serde(default)]
    pub wait_mode: WaitMode,

    /// Maximum time a single row request waits (e.g. "50s", "500ms").
    /// "0" or "off" disables the bound.
    #[serde(default = "default_lock_wait_timeout")]
    pub lock_wait_timeout: String,

    #[serde(default = "default_true")]
    pub deadlock_detection: bool,

    /// `on_demand` creates rows lazily, `provisioned` requires seeded rows
    #[serde(default)]
    pub provisioning: Provisioning,
}

fn default_lock_wait_timeout() -> String {
    "50s".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            wait_mode: WaitMode::default(),
            lock_wait_timeout: default_lock_wait_timeout(),
            deadlock_detection: true,
            provisioning: Provisioning::default(),
        }
    }
}

impl SubstrateConfig {
    pub fn settings(&self) -> Result<MemorySettings> {
        let raw = self.lock_wait_timeout.trim();
        let lock_wait_timeout = match raw {
            "0" | "off" | "none" => None,
            _ => Some(parse_duration(raw).map_err(|err| {
                Error::InvalidConfig(format!("substrate.lock_wait_timeout: {err}"))
            })?),
        };

        Ok(MemorySettings {
            wait_mode: self.wait_mode,
            lock_wait_timeout,
            deadlock_detection: self.deadlock_detection,
            provisioning: self.provisioning,
        })
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.hierlock.toml` from `dir`, or return defaults when absent
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Explicit path wins, then the working directory, then defaults
    pub fn discover(explicit: Option<&PathBuf>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let cwd = std::env::current_dir()?;
                Self::load_from_dir(&cwd)
            }
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn bucket_space(&self) -> Result<BucketSpace> {
        BucketSpace::new(self.buckets.top, self.buckets.child, self.buckets.leaf)
    }

    fn validate(&self) -> Result<()> {
        self.bucket_space()?;
        self.substrate.settings()?;
        Ok(())
    }
}

/// Parse a duration string like "50s", "250ms", "5m", "1h"
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(Error::InvalidArgument("Duration cannot be empty".to_string()));
    }

    let (num_str, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, "s"),
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("Invalid duration number: {}", num_str)))?;

    let duration = match unit.trim().to_lowercase().as_str() {
        "ms" | "msec" | "millis" => Duration::from_millis(num),
        "s" | "sec" | "second" | "seconds" => Duration::from_secs(num),
        "m" | "min" | "minute" | "minutes" => Duration::from_secs(scaled(num, 60, s)?),
        "h" | "hr" | "hour" | "hours" => Duration::from_secs(scaled(num, 3600, s)?),
        _ => {
            return Err(Error::InvalidArgument(format!(
                "Invalid duration unit '{}'. Expected: ms, s, m, h",
                unit
            )));
        }
    };

    Ok(duration)
}

fn scaled(num: u64, factor: u64, input: &str) -> Result<u64> {
    num.checked_mul(factor)
        .ok_or_else(|| Error::InvalidArgument(format!("Duration too large: {}", input)))
}
