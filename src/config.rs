use crate::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_TARGET_RATE: f64 = 48000.0;

fn default_target_rate() -> f64 {
    DEFAULT_TARGET_RATE
}

/// Where to read, where to write, and what to keep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(default = "default_target_rate")]
    pub target_rate: f64,
    /// IR names to keep. Empty keeps every record.
    #[serde(default)]
    pub selection: Vec<String>,
}

impl ExtractConfig {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            target_rate: DEFAULT_TARGET_RATE,
            selection: Vec::new(),
        }
    }

    pub fn with_target_rate(mut self, target_rate: f64) -> Self {
        self.target_rate = target_rate;
        self
    }

    pub fn with_selection<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = names.into_iter().map(Into::into).collect();
        self
    }

    /// Parse only. Call [`ExtractConfig::validate`] once any overrides are applied.
    pub fn from_json_str(json: &str) -> R<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> R<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read config {}: {}", path.display(), e))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> R<()> {
        resample::check_rate(self.target_rate)?;
        if self.source == self.destination {
            return Err(anyhow!(
                "Source and destination are the same file: {}",
                self.source.display()
            ));
        }
        Ok(())
    }
}
