//! Configuration for a verification run.
//!
//! All knobs are carried in an explicit [`VerifyConfig`] value threaded
//! through the engine; there is no process-global state. An optional TOML
//! settings file can override the recognized extension list and the worker
//! count.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

/// Extensions recognized as media files, matched case-insensitively.
///
/// The set covers the usual camera formats: TIFF and PSD masters, JPEGs,
/// the common raw formats, and consumer video containers.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "tif", "tiff", "psd", "jpeg", "arw", "mrw", "jpg", "cr", "cr2", "cr3", "nef", "mov", "mpeg",
    "mpg", "avi", "mp4", "mkv", "mts", "3gp",
];

/// Number of comparison workers unless overridden in settings.
pub const DEFAULT_WORKER_COUNT: usize = 32;

/// Default filename of the rendered report, created in the working directory.
pub const DEFAULT_REPORT_FILE: &str = "uncopied.html";

/// Case-insensitive membership set of file extensions.
#[derive(Debug, Clone)]
pub struct ExtensionSet {
    lowered: HashSet<String>,
}

impl ExtensionSet {
    /// Build a set from arbitrary extension spellings ("JPG", ".jpg", "jpg").
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lowered = items
            .into_iter()
            .map(|item| item.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|item| !item.is_empty())
            .collect();
        Self { lowered }
    }

    /// The default media extension set.
    pub fn default_media() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().copied())
    }

    /// Whether `path` carries a recognized extension.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        self.lowered.contains(&ext.to_ascii_lowercase())
    }

    /// Number of distinct extensions in the set.
    pub fn len(&self) -> usize {
        self.lowered.len()
    }

    /// Whether the set is empty (nothing would ever be indexed).
    pub fn is_empty(&self) -> bool {
        self.lowered.is_empty()
    }
}

impl Default for ExtensionSet {
    fn default() -> Self {
        Self::default_media()
    }
}

/// Errors raised while assembling or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required root path is missing or not a directory.
    #[error("{role} root is not a directory: {path}")]
    NotADirectory {
        /// Which root failed ("card" or "disk").
        role: &'static str,
        /// The offending path.
        path: PathBuf,
    },
    /// The copy destination does not exist.
    #[error("Copy target {path} does not exist")]
    CopyTargetMissing {
        /// The configured destination.
        path: PathBuf,
    },
    /// The copy destination exists but is not a directory.
    #[error("Copy target {path} is not a directory")]
    CopyTargetNotDirectory {
        /// The configured destination.
        path: PathBuf,
    },
    /// The settings file could not be read.
    #[error("Failed to read settings file {path}: {source}")]
    ReadSettings {
        /// Path of the settings file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The settings file is not valid TOML.
    #[error("Failed to parse settings file {path}: {source}")]
    ParseSettings {
        /// Path of the settings file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

/// Optional overrides loaded from a TOML settings file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Replacement extension list; empty or absent keeps the default set.
    pub extensions: Option<Vec<String>>,
    /// Worker count override; values below 1 are clamped to 1.
    pub workers: Option<usize>,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadSettings {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::ParseSettings {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Everything a verification run needs to know.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Root of the card tree being checked.
    pub card_root: PathBuf,
    /// Root of the disk archive assumed to hold backups.
    pub disk_root: PathBuf,
    /// Destination for copies of unmatched card files, if any.
    pub copy_dir: Option<PathBuf>,
    /// Where the HTML report is written.
    pub report_path: PathBuf,
    /// Extensions considered media files.
    pub extensions: ExtensionSet,
    /// Size of the comparison worker pool.
    pub workers: usize,
}

impl VerifyConfig {
    /// Config with default extensions, worker count, and report path.
    pub fn new(card_root: PathBuf, disk_root: PathBuf) -> Self {
        Self {
            card_root,
            disk_root,
            copy_dir: None,
            report_path: PathBuf::from(DEFAULT_REPORT_FILE),
            extensions: ExtensionSet::default_media(),
            workers: DEFAULT_WORKER_COUNT,
        }
    }

    /// Apply overrides from a settings file.
    pub fn apply_settings(&mut self, settings: &Settings) {
        if let Some(extensions) = &settings.extensions
            && !extensions.is_empty()
        {
            self.extensions = ExtensionSet::new(extensions.iter());
        }
        if let Some(workers) = settings.workers {
            self.workers = workers.max(1);
        }
    }

    /// Check roots and copy destination before any indexing starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.card_root.is_dir() {
            return Err(ConfigError::NotADirectory {
                role: "card",
                path: self.card_root.clone(),
            });
        }
        if !self.disk_root.is_dir() {
            return Err(ConfigError::NotADirectory {
                role: "disk",
                path: self.disk_root.clone(),
            });
        }
        if let Some(dir) = &self.copy_dir {
            if !dir.exists() {
                return Err(ConfigError::CopyTargetMissing { path: dir.clone() });
            }
            if !dir.is_dir() {
                return Err(ConfigError::CopyTargetNotDirectory { path: dir.clone() });
            }
        }
        Ok(())
    }
}
