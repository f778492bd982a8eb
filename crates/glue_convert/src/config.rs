//! Settings management

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::ClassifyStrategy;
use crate::error::ConfigError;

/// Settings for the script host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bridge: BridgeSettings,
    pub runtime: RuntimeSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Requested immediate-value strategy. `tag-bits` degrades to
    /// `engine-api`, with a warning, when unavailable.
    pub strategy: ClassifyStrategy,
    /// Maximum nesting of arrays/objects converted in one call.
    pub max_depth: usize,
    /// Longest script array converted. Sparse arrays count their full
    /// `length`, holes included.
    pub max_length: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub memory_limit_bytes: Option<usize>,
    pub max_stack_size_bytes: Option<usize>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            strategy: ClassifyStrategy::EngineApi,
            max_depth: 512,
            max_length: 1 << 24,
        }
    }
}

impl Settings {
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings.bridge.strategy, ClassifyStrategy::EngineApi);
        assert_eq!(settings.bridge.max_depth, 512);
        assert_eq!(settings.bridge.max_length, 1 << 24);
        assert!(settings.runtime.memory_limit_bytes.is_none());
    }

    #[test]
    fn test_partial_document() {
        let settings = Settings::from_json(
            r#"{ "bridge": { "strategy": "tag-bits" }, "runtime": { "memory_limit_bytes": 1048576 } }"#,
        )
        .unwrap();
        assert_eq!(settings.bridge.strategy, ClassifyStrategy::TagBits);
        assert_eq!(settings.bridge.max_depth, 512);
        assert_eq!(settings.runtime.memory_limit_bytes, Some(1 << 20));
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        let err = Settings::from_json(r#"{ "bridge": { "strategy": "guess" } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Settings::load(Path::new("/nonexistent/glue-settings.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
