//! The Serializable configuration data structures used for setup.
use std::{
    fs, io,
    os::fd::RawFd,
    path::{Path, PathBuf},
};

use evpoll::{BackendKind, IoCondition};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported config extension for {0}")]
    Extension(PathBuf),

    #[error("watch entry {index}: {reason}")]
    Watch { index: usize, reason: String },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WatchConf {
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub fd: Option<RawFd>,

    #[serde(default = "default_watch_events")]
    pub events: Vec<String>,

    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone)]
pub enum Source {
    Path(PathBuf),
    Fd(RawFd),
}

impl WatchConf {
    pub fn source(&self, index: usize) -> Result<Source, ConfigError> {
        match (&self.path, self.fd) {
            (Some(path), None) => Ok(Source::Path(path.clone())),
            (None, Some(fd)) if fd >= 0 => Ok(Source::Fd(fd)),
            (None, Some(fd)) => Err(ConfigError::Watch {
                index,
                reason: format!("invalid fd {}", fd),
            }),
            _ => Err(ConfigError::Watch {
                index,
                reason: "exactly one of `path` or `fd` is required".into(),
            }),
        }
    }

    pub fn conditions(&self, index: usize) -> Result<IoCondition, ConfigError> {
        self.events.iter().try_fold(IoCondition::empty(), |acc, name| {
            match IoCondition::parse_name(name) {
                Some(cond) if IoCondition::REQUESTABLE.contains(cond) => Ok(acc | cond),
                _ => Err(ConfigError::Watch {
                    index,
                    reason: format!("unknown event `{}`", name),
                }),
            }
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i32,

    #[serde(default = "default_max_priority")]
    pub max_priority: i32,

    #[serde(default)]
    pub iterations: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub watch: Vec<WatchConf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&text)?),
            Some("yaml" | "yml") => Ok(serde_yaml::from_str(&text)?),
            _ => Err(ConfigError::Extension(path.to_owned())),
        }
    }
}

fn default_watch_events() -> Vec<String> {
    vec!["in".to_owned()]
}

fn default_timeout_ms() -> i32 {
    -1
}

fn default_max_priority() -> i32 {
    i32::MAX
}

fn default_log_level() -> String {
    "warn".to_owned()
}
