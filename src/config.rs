//! Probing configuration
//!
//! The configuration file is read once at startup, defaulted, validated and
//! then handed to the collector as an immutable [`Config`]. Numeric fields
//! that are omitted (or explicitly `0`) fall back first to the matching
//! `default_*` key and then to a hard-coded value.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Smallest payload the ping engine accepts: 8 bytes of ICMP header plus a
/// 16 byte correlation id.
pub const MINIMUM_PACKET_SIZE: usize = 8 + 16;

/// Largest payload that fits in one IPv4 datagram
pub const MAXIMUM_PACKET_SIZE: usize = 65507;

/// Upper bound for `timeout` and every interval, one hour
pub const MAXIMUM_DURATION_MS: u64 = 60 * 60 * 1000;

pub const FALLBACK_COUNT: u32 = 1;

pub const FALLBACK_INTERVAL_MS: u64 = 1000;

pub const FALLBACK_TIMEOUT_MS: u64 = 5000;

/// Host name reported when the global `default_size` is too small.
pub const DEFAULT_HOST_LABEL: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    Unreadable,
    Malformed,
    SizeTooSmall,
    SizeTooLarge,
}

/// Errors produced while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read configuration file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a valid configuration document
    #[error("malformed configuration: {0}")]
    Malformed(String),

    /// A resolved packet size is below [`MINIMUM_PACKET_SIZE`]
    #[error("packet size {size} for target {host} is less than minimum {minimum}")]
    SizeTooSmall {
        host: String,
        size: usize,
        minimum: usize,
    },

    /// A resolved packet size is above [`MAXIMUM_PACKET_SIZE`]
    #[error("packet size {size} for target {host} is greater than maximum {maximum}")]
    SizeTooLarge {
        host: String,
        size: usize,
        maximum: usize,
    },
}

impl ConfigError {
    pub fn kind(&self) -> ConfigErrorKind {
        match self {
            ConfigError::Unreadable { .. } => ConfigErrorKind::Unreadable,
            ConfigError::Malformed(_) => ConfigErrorKind::Malformed,
            ConfigError::SizeTooSmall { .. } => ConfigErrorKind::SizeTooSmall,
            ConfigError::SizeTooLarge { .. } => ConfigErrorKind::SizeTooLarge,
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Malformed(err.to_string())
    }
}

/// Target record as it appears in the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetConfig {
    pub host: String,
    pub interface: Option<String>,
    pub ttl: Option<u32>,
    pub size: Option<usize>,
    pub count: Option<u32>,
    pub interval: Option<u64>,
}

/// Configuration document as it appears in the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub targets: Option<Vec<TargetConfig>>,
    pub default_ttl: Option<u32>,
    pub default_size: Option<usize>,
    pub default_count: Option<u32>,
    pub default_interval: Option<u64>,
    pub timeout: Option<u64>,
}

/// A fully resolved probing destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,

    /// Outbound interface, `None` uses the system's default route
    pub interface: Option<String>,

    /// IP time-to-live, 0 leaves the system default in place
    pub ttl: u32,

    /// ICMP payload size in bytes
    pub size: usize,

    /// Echoes per probe round
    pub count: u32,

    /// Milliseconds between echoes within one round
    pub interval: u64,
}

impl Target {
    /// Interface label value, empty when no interface is configured
    pub fn interface_label(&self) -> &str {
        self.interface.as_deref().unwrap_or_default()
    }
}

/// Resolved, validated probing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub targets: Vec<Target>,
    pub default_ttl: u32,
    pub default_size: usize,
    pub default_count: u32,
    pub default_interval: u64,

    /// Overall per-probe deadline in milliseconds
    pub timeout: u64,
}

/// Treats an explicit zero the same as an omitted value
fn non_zero<T: Default + PartialEq>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v != T::default())
}

impl Config {
    /// Parse, default and validate configuration bytes.
    pub fn load(bytes: &[u8]) -> Result<Config, ConfigError> {
        let file: ConfigFile = if bytes.iter().all(u8::is_ascii_whitespace) {
            ConfigFile::default()
        } else {
            serde_yaml::from_slice(bytes)?
        };
        trace!("parsed config file: {file:?}");

        let config = Config::resolve(file)?;
        config.validate()?;

        if config.targets.is_empty() {
            warn!("no targets specified, did you forget to set targets in your config file?");
        }

        Ok(config)
    }

    fn resolve(file: ConfigFile) -> Result<Config, ConfigError> {
        let default_ttl = file.default_ttl.unwrap_or(0);
        let default_size = non_zero(file.default_size).unwrap_or(MINIMUM_PACKET_SIZE);
        let default_count = non_zero(file.default_count).unwrap_or(FALLBACK_COUNT);
        let default_interval = non_zero(file.default_interval).unwrap_or(FALLBACK_INTERVAL_MS);
        let timeout = non_zero(file.timeout).unwrap_or(FALLBACK_TIMEOUT_MS);

        let targets = file
            .targets
            .unwrap_or_default()
            .into_iter()
            .map(|target| {
                if target.host.trim().is_empty() {
                    return Err(ConfigError::Malformed(
                        "target is missing a host".to_string(),
                    ));
                }

                Ok(Target {
                    host: target.host,
                    interface: target.interface.filter(|name| !name.is_empty()),
                    ttl: non_zero(target.ttl).unwrap_or(default_ttl),
                    size: non_zero(target.size).unwrap_or(default_size),
                    count: non_zero(target.count).unwrap_or(default_count),
                    interval: non_zero(target.interval).unwrap_or(default_interval),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Config {
            targets,
            default_ttl,
            default_size,
            default_count,
            default_interval,
            timeout,
        })
    }

    /// The global default is checked before any target.
    fn validate(&self) -> Result<(), ConfigError> {
        check_size(DEFAULT_HOST_LABEL, self.default_size)?;
        for target in &self.targets {
            check_size(&target.host, target.size)?;
        }

        check_duration("timeout", self.timeout)?;
        check_duration("default_interval", self.default_interval)?;
        for target in &self.targets {
            check_duration(&format!("interval of {}", target.host), target.interval)?;
        }

        Ok(())
    }
}

fn check_size(host: &str, size: usize) -> Result<(), ConfigError> {
    if size < MINIMUM_PACKET_SIZE {
        return Err(ConfigError::SizeTooSmall {
            host: host.to_string(),
            size,
            minimum: MINIMUM_PACKET_SIZE,
        });
    }
    if size > MAXIMUM_PACKET_SIZE {
        return Err(ConfigError::SizeTooLarge {
            host: host.to_string(),
            size,
            maximum: MAXIMUM_PACKET_SIZE,
        });
    }
    Ok(())
}

fn check_duration(field: &str, millis: u64) -> Result<(), ConfigError> {
    if millis > MAXIMUM_DURATION_MS {
        return Err(ConfigError::Malformed(format!(
            "{field} of {millis}ms exceeds maximum of {MAXIMUM_DURATION_MS}ms"
        )));
    }
    Ok(())
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    debug!("loading configuration from {}", path.display());

    let content = std::fs::read(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    Config::load(&content).inspect(|config| debug!("loaded configuration: {config:?}"))
}
