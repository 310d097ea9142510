use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use netcheck_common::defaults::{
    DEFAULT_CONCURRENCY, DEFAULT_PING_COUNT, DEFAULT_PING_INTERVAL, DEFAULT_PING_SIZE,
    DEFAULT_RETRIES, DEFAULT_TIMEOUT, DEFAULT_WAIT,
};
use netcheck_common::{ExecutionDefaults, PingSettings, Timeout};

/// File name looked up in the working directory when no defaults file is
/// given explicitly.
pub const LOCAL_DEFAULTS_FILE: &str = "netcheck.toml";
/// File name looked up in the home directory after the working directory.
pub const HOME_DEFAULTS_FILE: &str = ".netcheck.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read defaults file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse defaults file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Process-wide execution parameters, built once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    pub execution: ExecutionDefaults,
    pub ping: PingSettings,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct DefaultsDocument {
    timeout: Option<Timeout>,
    retries: Option<i64>,
    wait: Option<Timeout>,
    concurrency: Option<i64>,
    ping: Option<PingDocument>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PingDocument {
    count: Option<i64>,
    interval: Option<Timeout>,
    size: Option<i64>,
}

fn positive<T: TryFrom<i64>>(value: Option<i64>, fallback: T) -> T {
    value
        .filter(|v| *v > 0)
        .and_then(|v| T::try_from(v).ok())
        .unwrap_or(fallback)
}

impl From<DefaultsDocument> for Settings {
    fn from(doc: DefaultsDocument) -> Self {
        let ping = doc.ping.unwrap_or_default();
        Settings {
            execution: ExecutionDefaults {
                timeout: doc.timeout.unwrap_or(DEFAULT_TIMEOUT).or(DEFAULT_TIMEOUT),
                retries: positive(doc.retries, DEFAULT_RETRIES),
                wait: doc.wait.unwrap_or(DEFAULT_WAIT).or(DEFAULT_WAIT),
                concurrency: positive(doc.concurrency, DEFAULT_CONCURRENCY),
            },
            ping: PingSettings {
                count: positive(ping.count, DEFAULT_PING_COUNT),
                interval: ping
                    .interval
                    .unwrap_or(DEFAULT_PING_INTERVAL)
                    .or(DEFAULT_PING_INTERVAL),
                size: positive(ping.size, DEFAULT_PING_SIZE),
            },
        }
    }
}

/// Parses a TOML defaults document; missing or non-positive values take
/// their hardcoded defaults.
pub fn parse_settings(text: &str, path: &Path) -> Result<Settings, ConfigError> {
    let doc: DefaultsDocument = toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(doc.into())
}

fn read_settings(path: &Path) -> Result<Settings, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_settings(&text, path)
}

fn implicit_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(LOCAL_DEFAULTS_FILE)];
    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        locations.push(Path::new(&home).join(HOME_DEFAULTS_FILE));
    }
    locations
}

/// Loads the settings for this run.
///
/// An explicit path must be readable and valid. Otherwise the working
/// directory and then the home directory are searched; a missing file there
/// is skipped quietly, a broken one with a warning, and hardcoded defaults
/// apply when nothing usable is found.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    if let Some(path) = explicit {
        let settings = read_settings(path)?;
        info!(path = %path.display(), "Loaded defaults file.");
        return Ok(settings);
    }
    load_first_of(&implicit_locations())
}

fn load_first_of(locations: &[PathBuf]) -> Result<Settings, ConfigError> {
    for path in locations {
        match read_settings(path) {
            Ok(settings) => {
                info!(path = %path.display(), "Loaded defaults file.");
                return Ok(settings);
            }
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No defaults file here.");
            }
            Err(e) => warn!(error = %e, "Ignoring unusable defaults file."),
        }
    }
    debug!("Using hardcoded defaults.");
    Ok(Settings::default())
}
