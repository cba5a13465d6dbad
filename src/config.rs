//! Runtime configuration for the handle core
//!
//! Loadable from RON so a host application can tune pooling without a rebuild.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AssetError;

/// Handle core configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandleConfig {
    /// Maximum free instances retained per pooled kind
    pub max_pooled_per_kind: usize,
    /// Complete batches with zero members inside `create`
    pub complete_empty_batches: bool,
    /// Number of reported errors kept for inspection (0 disables history)
    pub diagnostic_capacity: usize,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            max_pooled_per_kind: 1024,
            complete_empty_batches: true,
            diagnostic_capacity: 64,
        }
    }
}

impl HandleConfig {
    /// Set the per-kind free list cap
    #[must_use]
    pub fn with_max_pooled_per_kind(mut self, max: usize) -> Self {
        self.max_pooled_per_kind = max;
        self
    }

    /// Enable or disable immediate completion of empty batches
    #[must_use]
    pub fn with_complete_empty_batches(mut self, enabled: bool) -> Self {
        self.complete_empty_batches = enabled;
        self
    }

    /// Set how many reported errors are kept
    #[must_use]
    pub fn with_diagnostic_capacity(mut self, capacity: usize) -> Self {
        self.diagnostic_capacity = capacity;
        self
    }

    /// Parse a config from a RON string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid config
    pub fn from_ron_str(source: &str) -> Result<Self, AssetError> {
        ron::from_str(source).map_err(|e| AssetError::Config(e.to_string()))
    }

    /// Load a config from a RON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_ron(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let content = fs::read_to_string(path).map_err(|e| AssetError::Io(e.to_string()))?;
        Self::from_ron_str(&content)
    }

    /// Serialize to pretty RON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_ron_string(&self) -> Result<String, AssetError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| AssetError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = HandleConfig::from_ron_str("(complete_empty_batches: false)").unwrap();
        assert!(!config.complete_empty_batches);
        assert_eq!(config.max_pooled_per_kind, 1024);
        assert_eq!(config.diagnostic_capacity, 64);
    }

    #[test]
    fn test_ron_roundtrip() {
        let config = HandleConfig::default()
            .with_max_pooled_per_kind(8)
            .with_diagnostic_capacity(0);
        let text = config.to_ron_string().unwrap();
        assert_eq!(HandleConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_ron() {
        let err = HandleConfig::from_ron_str("(max_pooled_per_kind: \"lots\")").unwrap_err();
        assert!(matches!(err, AssetError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = HandleConfig::load_ron("does/not/exist.ron").unwrap_err();
        assert!(matches!(err, AssetError::Io(_)));
    }
}
