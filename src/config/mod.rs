//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{CliArgs, Command, GlobalOverrides, InvalidatePathsArgs, PathsArgs, ResolveArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "treecache";
const ENV_PREFIX: &str = "TREECACHE";
const DEFAULT_ROOT_PATH: &str = "/Root";
const DEFAULT_SETTINGS_FOLDER: &str = "Settings";
const DEFAULT_SETTINGS_EXTENSION: &str = ".settings";
const DEFAULT_ARTIFACT_FOLDER: &str = "/Root/System/Cache";
const DEFAULT_ARTIFACT_EXTENSION: &str = ".cache";
const DEFAULT_SETTINGS_MEMO_LIMIT: usize = 256;
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub cluster: ClusterSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub root_path: String,
    pub settings_folder: String,
    pub settings_extension: String,
    pub artifact_folder: String,
    pub artifact_extension: String,
    pub settings_memo_limit: usize,
    pub enable_broadcast: bool,
}

#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub channel_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub fixture: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    cluster: RawClusterSettings,
    store: RawStoreSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(root) = overrides.root_path.as_ref() {
            self.cache.root_path = Some(root.clone());
        }
        if let Some(fixture) = overrides.store_file.as_ref() {
            self.store.fixture = Some(fixture.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            logging: build_logging_settings(raw.logging)?,
            cache: build_cache_settings(raw.cache)?,
            cluster: build_cluster_settings(raw.cluster)?,
            store: StoreSettings {
                fixture: raw.store.fixture,
            },
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let root_path = absolute_path(cache.root_path, DEFAULT_ROOT_PATH, "cache.root_path")?;
    let artifact_folder = absolute_path(
        cache.artifact_folder,
        DEFAULT_ARTIFACT_FOLDER,
        "cache.artifact_folder",
    )?;

    let settings_folder = cache
        .settings_folder
        .unwrap_or_else(|| DEFAULT_SETTINGS_FOLDER.to_string());
    if settings_folder.trim().is_empty() || settings_folder.contains('/') {
        return Err(LoadError::invalid(
            "cache.settings_folder",
            "must be a single non-empty path segment",
        ));
    }

    Ok(CacheSettings {
        root_path,
        settings_folder: settings_folder.trim().to_string(),
        settings_extension: extension(
            cache.settings_extension,
            DEFAULT_SETTINGS_EXTENSION,
            "cache.settings_extension",
        )?,
        artifact_folder,
        artifact_extension: extension(
            cache.artifact_extension,
            DEFAULT_ARTIFACT_EXTENSION,
            "cache.artifact_extension",
        )?,
        settings_memo_limit: cache
            .settings_memo_limit
            .unwrap_or(DEFAULT_SETTINGS_MEMO_LIMIT),
        enable_broadcast: cache.enable_broadcast.unwrap_or(true),
    })
}

fn build_cluster_settings(cluster: RawClusterSettings) -> Result<ClusterSettings, LoadError> {
    let channel_capacity = cluster.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
    if channel_capacity == 0 {
        return Err(LoadError::invalid(
            "cluster.channel_capacity",
            "must be greater than zero",
        ));
    }
    Ok(ClusterSettings { channel_capacity })
}

fn absolute_path(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    crate::domain::paths::normalize(&value).map_err(|err| LoadError::invalid(key, err.to_string()))
}

fn extension(value: Option<String>, default: &str, key: &'static str) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let trimmed = value.trim();
    if !trimmed.starts_with('.') || trimmed.len() < 2 || trimmed.contains('/') {
        return Err(LoadError::invalid(key, "must look like `.ext`"));
    }
    Ok(trimmed.to_lowercase())
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    root_path: Option<String>,
    settings_folder: Option<String>,
    settings_extension: Option<String>,
    artifact_folder: Option<String>,
    artifact_extension: Option<String>,
    settings_memo_limit: Option<usize>,
    enable_broadcast: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawClusterSettings {
    channel_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    fixture: Option<PathBuf>,
}
