use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    APP_DIR_NAME, DEFAULT_DEBOUNCE_MS, DEFAULT_EMBEDDING_TOLERANCE, DEFAULT_HISTOGRAM_TOLERANCE,
    DEFAULT_TARGET_SAMPLES,
};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("could not determine {0} directory")]
    NoDir(&'static str),
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Which matching strategy the engine is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingStrategy {
    /// Euclidean distance between face embeddings.
    Embedding,
    /// Local binary pattern histograms with nearest-neighbour prediction.
    Histogram,
}

impl MatchingStrategy {
    pub fn default_tolerance(self) -> f64 {
        match self {
            MatchingStrategy::Embedding => DEFAULT_EMBEDDING_TOLERANCE,
            MatchingStrategy::Histogram => DEFAULT_HISTOGRAM_TOLERANCE,
        }
    }
}

impl std::fmt::Display for MatchingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchingStrategy::Embedding => write!(f, "embedding"),
            MatchingStrategy::Histogram => write!(f, "histogram"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Learned ONNX face detector.
    Onnx,
    /// Classical Haar cascade.
    Cascade,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub strategy: MatchingStrategy,
    pub detector: DetectorKind,
    /// Overrides the strategy's default tolerance when set.
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default = "default_confidence")]
    pub detection_confidence: f64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_target_samples")]
    pub target_samples: usize,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub cascade_path: Option<PathBuf>,
}

fn default_confidence() -> f64 {
    0.5
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_target_samples() -> usize {
    DEFAULT_TARGET_SAMPLES
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strategy: MatchingStrategy::Histogram,
            detector: DetectorKind::Cascade,
            tolerance: None,
            detection_confidence: default_confidence(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            target_samples: DEFAULT_TARGET_SAMPLES,
            database_path: None,
            cascade_path: None,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("settings.json"))
    }

    /// Loads settings from the user config dir, falling back to defaults.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Loads settings from `path`. A missing file yields defaults; a
    /// malformed one is logged and also yields defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(json) = fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&json).unwrap_or_else(|e| {
            log::warn!("Ignoring malformed settings at {}: {e}", path.display());
            Self::default()
        })
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::config_path().ok_or(SettingsError::NoDir("config"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(write_err)
    }

    pub fn effective_tolerance(&self) -> f64 {
        self.tolerance
            .unwrap_or_else(|| self.strategy.default_tolerance())
    }

    /// Gallery database location, defaulting to the user data dir.
    pub fn database_path(&self) -> Result<PathBuf, SettingsError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => dirs::data_dir()
                .map(|d| d.join(APP_DIR_NAME).join("gallery.db"))
                .ok_or(SettingsError::NoDir("data")),
        }
    }
}
