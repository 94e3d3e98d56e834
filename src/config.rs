// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Device and logging configuration.
//!
//! Sizes given through the environment are decimal KiB.

use std::path::PathBuf;

use thiserror::Error;

pub const ENV_LOG: &str = "NS_LOG";
pub const ENV_LOGLEVEL: &str = "NS_LOGLEVEL";
pub const ENV_CACHE_FILE: &str = "NS_CACHE_FILE";
pub const ENV_SIZE: &str = "NS_SIZE";
pub const ENV_ERASE_SIZE: &str = "NS_ERASE_SIZE";
pub const ENV_WEAK_PAGES: &str = "NS_WEAK_PAGES";
pub const ENV_GRAVE_PAGES: &str = "NS_GRAVE_PAGES";
pub const ENV_BIT_FLIPS: &str = "NS_BIT_FLIPS";
pub const ENV_SEED: &str = "NS_SEED";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No {0} given")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("Erase size must be greater than zero")]
    ZeroEraseSize,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Backing file; `None` for an in-memory device.
    pub cache_file: Option<PathBuf>,
    /// Device size in bytes.
    pub size: u64,
    /// Erase block size in bytes.
    pub erase_size: u64,
    pub weak_pages: Option<String>,
    pub grave_pages: Option<String>,
    /// Apply each faulty page's stuck bits to reads.
    pub bit_flips: bool,
    pub seed: Option<u64>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            cache_file: None,
            size: 64 * 1024,
            erase_size: 256,
            weak_pages: None,
            grave_pages: None,
            bit_flips: false,
            seed: None,
        }
    }
}

impl DeviceConfig {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache_file = lookup(ENV_CACHE_FILE)
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing(ENV_CACHE_FILE))?;
        let size = kib(ENV_SIZE, &lookup(ENV_SIZE).ok_or(ConfigError::Missing(ENV_SIZE))?)?;
        let erase_size = kib(
            ENV_ERASE_SIZE,
            &lookup(ENV_ERASE_SIZE).ok_or(ConfigError::Missing(ENV_ERASE_SIZE))?,
        )?;
        if erase_size == 0 {
            return Err(ConfigError::ZeroEraseSize);
        }
        let seed = match lookup(ENV_SEED) {
            Some(v) => Some(number(ENV_SEED, &v)?),
            None => None,
        };

        Ok(Self {
            cache_file: Some(cache_file),
            size,
            erase_size,
            weak_pages: lookup(ENV_WEAK_PAGES),
            grave_pages: lookup(ENV_GRAVE_PAGES),
            bit_flips: lookup(ENV_BIT_FLIPS).map_or(false, |v| v.trim() == "1"),
            seed,
        })
    }

    pub fn page_count(&self) -> u64 {
        if self.erase_size == 0 {
            0
        } else {
            self.size / self.erase_size
        }
    }
}

fn number(var: &'static str, value: &str) -> ConfigResult<u64> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
    })
}

fn kib(var: &'static str, value: &str) -> ConfigResult<u64> {
    number(var, value)?
        .checked_mul(1024)
        .ok_or_else(|| ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        })
}

/// Where log lines go.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum LogTarget {
    #[default]
    Stdio,
    File(PathBuf),
}

/// Verbosity: 0 silent, 1 errors, 2 info, 3 debug.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Silence,
    Error,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    /// Values above the maximum clamp to `Debug`.
    pub fn from_number(n: u64) -> Self {
        match n {
            0 => LogLevel::Silence,
            1 => LogLevel::Error,
            2 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    /// Directive understood by `tracing` filters.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Silence => "off",
            LogLevel::Error => "error",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LogConfig {
    pub target: LogTarget,
    pub level: LogLevel,
}

impl LogConfig {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let target = match lookup(ENV_LOG) {
            None => LogTarget::Stdio,
            Some(v) if v == "stdio" => LogTarget::Stdio,
            Some(path) => LogTarget::File(PathBuf::from(path)),
        };
        let level = match lookup(ENV_LOGLEVEL) {
            None => LogLevel::default(),
            Some(v) => LogLevel::from_number(number(ENV_LOGLEVEL, &v)?),
        };
        Ok(Self { target, level })
    }
}
