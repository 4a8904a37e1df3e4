//! Cache configuration.
//!
//! Controls store layout conventions and cluster behaviour via `treecache.toml`.

use std::num::NonZeroUsize;

use serde::Deserialize;

use crate::domain::paths;

const DEFAULT_ROOT_PATH: &str = "/Root";
const DEFAULT_SETTINGS_FOLDER: &str = "Settings";
const DEFAULT_SETTINGS_EXTENSION: &str = ".settings";
const DEFAULT_ARTIFACT_FOLDER: &str = "/Root/System/Cache";
const DEFAULT_ARTIFACT_EXTENSION: &str = ".cache";
const DEFAULT_SETTINGS_MEMO_LIMIT: usize = 256;

/// Cache configuration from `treecache.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path of the store root; never part of an ancestor walk.
    pub root_path: String,
    /// Reserved subfolder holding settings files in each scope.
    pub settings_folder: String,
    /// Extension appended to lowercased settings names.
    pub settings_extension: String,
    /// Folder hosting self-persisting cache artifacts.
    pub artifact_folder: String,
    /// Extension appended to artifact names.
    pub artifact_extension: String,
    /// Maximum resolved settings objects memoized per context.
    pub settings_memo_limit: usize,
    /// Broadcast invalidations to other cluster members.
    pub enable_broadcast: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_path: DEFAULT_ROOT_PATH.to_string(),
            settings_folder: DEFAULT_SETTINGS_FOLDER.to_string(),
            settings_extension: DEFAULT_SETTINGS_EXTENSION.to_string(),
            artifact_folder: DEFAULT_ARTIFACT_FOLDER.to_string(),
            artifact_extension: DEFAULT_ARTIFACT_EXTENSION.to_string(),
            settings_memo_limit: DEFAULT_SETTINGS_MEMO_LIMIT,
            enable_broadcast: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            root_path: settings.root_path.clone(),
            settings_folder: settings.settings_folder.clone(),
            settings_extension: settings.settings_extension.clone(),
            artifact_folder: settings.artifact_folder.clone(),
            artifact_extension: settings.artifact_extension.clone(),
            settings_memo_limit: settings.settings_memo_limit,
            enable_broadcast: settings.enable_broadcast,
        }
    }
}

impl CacheConfig {
    /// Settings file name for `settings_name`, e.g. `logging.settings`.
    pub fn settings_file_name(&self, settings_name: &str) -> String {
        format!(
            "{}{}",
            settings_name.trim().to_lowercase(),
            self.settings_extension
        )
    }

    /// Path of the settings file for `settings_name` in the scope `scope_path`.
    pub fn settings_path(&self, scope_path: &str, file_name: &str) -> String {
        paths::join(&paths::join(scope_path, &self.settings_folder), file_name)
    }

    /// Whether `path` addresses the store root.
    pub fn is_root(&self, path: &str) -> bool {
        paths::lookup_key(path) == paths::lookup_key(&self.root_path)
    }

    /// Returns the settings memo limit as NonZeroUsize, clamping to 1 if zero.
    pub fn settings_memo_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.settings_memo_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
