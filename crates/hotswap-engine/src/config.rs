//! Engine configuration (hotswap.toml)
//!
//! ```toml
//! [registry]
//! include = ["app..*"]
//! exclude = ["app.generated.*"]
//! promote_nested_visibility = true
//! verify_units = true
//!
//! [vm]
//! max_call_depth = 256
//! ```

use crate::registry::NamePattern;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Type registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Reference interpreter settings
    #[serde(default)]
    pub vm: VmOptions,
}

/// Which types participate and how they are admitted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryConfig {
    /// Name patterns a type must match to be registered (default: everything)
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Name patterns that are never registered, even when included
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Make restricted nested types public when they are registered
    #[serde(default = "default_true")]
    pub promote_nested_visibility: bool,

    /// Run the unit verifier on supplied and rewritten units
    #[serde(default = "default_true")]
    pub verify_units: bool,
}

fn default_include() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: Vec::new(),
            promote_nested_visibility: true,
            verify_units: true,
        }
    }
}

/// Interpreter limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VmOptions {
    /// Maximum nesting of method invocations
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
}

fn default_max_call_depth() -> usize {
    256
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_call_depth: default_max_call_depth(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registry.validate()?;
        if self.vm.max_call_depth == 0 {
            return Err(ConfigError::ValidationError(
                "vm.max_call_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl RegistryConfig {
    /// Check that every pattern parses
    pub fn validate(&self) -> Result<(), ConfigError> {
        for pattern in self.include.iter().chain(&self.exclude) {
            NamePattern::parse(pattern).map_err(|_| {
                ConfigError::ValidationError(format!("Invalid name pattern: {:?}", pattern))
            })?;
        }
        Ok(())
    }
}
