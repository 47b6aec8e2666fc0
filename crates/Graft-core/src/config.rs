//! # Configuration
//!
//! Engine tunables. Every field has a default, so partial YAML or JSON
//! documents are accepted.

use serde::{Deserialize, Serialize};

/// Configuration parameters for the evaluation engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum recursion depth of a single pull. Default: 512.
    pub max_eval_depth: usize,
    /// Maximum number of alias hops followed before giving up. Default: 64.
    pub max_alias_hops: usize,
    /// Reject edges between incompatible payload types. Default: true.
    pub enforce_port_types: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_eval_depth: 512,
            max_alias_hops: 64,
            enforce_port_types: true,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml_str("max_eval_depth: 16\n").unwrap();
        assert_eq!(config.max_eval_depth, 16);
        assert_eq!(config.max_alias_hops, 64);
        assert!(config.enforce_port_types);
    }

    #[test]
    fn test_json() {
        let config = EngineConfig::from_json_str(r#"{"enforce_port_types": false}"#).unwrap();
        assert!(!config.enforce_port_types);
        assert_eq!(config.max_eval_depth, 512);
    }
}
