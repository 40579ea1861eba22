//! Identity label set: classifier output index → identity name.
//!
//! Stored as a small TOML file next to the model:
//!
//! ```toml
//! version = 1
//! labels = ["alice", "bob", "carol"]
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Label file format version understood by this build.
pub const LABEL_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("label file not found: {0}")]
    NotFound(String),
    #[error("failed to read label file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid label file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unsupported label format version {0} (expected {LABEL_FORMAT_VERSION})")]
    Version(u32),
    #[error("label set is empty")]
    Empty,
    #[error("label {0} is blank")]
    Blank(usize),
    #[error("duplicate label {0:?}")]
    Duplicate(String),
}

#[derive(Debug, Deserialize)]
struct LabelFile {
    version: u32,
    labels: Vec<String>,
}

/// Immutable, validated list of identity names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new(labels: Vec<String>) -> Result<Self, LabelError> {
        if labels.is_empty() {
            return Err(LabelError::Empty);
        }
        let mut seen = HashSet::new();
        for (i, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(LabelError::Blank(i));
            }
            if !seen.insert(label.as_str()) {
                return Err(LabelError::Duplicate(label.clone()));
            }
        }
        Ok(Self { labels })
    }

    pub fn load(path: &str) -> Result<Self, LabelError> {
        if !Path::new(path).exists() {
            return Err(LabelError::NotFound(path.to_string()));
        }
        let set = Self::from_toml(&std::fs::read_to_string(path)?)?;
        tracing::info!(path, count = set.len(), version = LABEL_FORMAT_VERSION, "loaded identity labels");
        Ok(set)
    }

    pub fn from_toml(src: &str) -> Result<Self, LabelError> {
        let file: LabelFile = toml::from_str(src)?;
        if file.version != LABEL_FORMAT_VERSION {
            return Err(LabelError::Version(file.version));
        }
        Self::new(file.labels)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.labels
    }
}
