// Tue Jan 13 2026 - Alex

use crate::deobfuscation::devirtualizer::DEFAULT_ENTRY_MARKER;
use crate::deobfuscation::rewriter::DEFAULT_MAX_PASSES;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix of the string constant the packer's self-check compares against
    pub entry_marker: String,
    /// Retry once against the inner payload when the script has an anti-tamper layer
    pub anti_tamper: bool,
    /// Fixed-point cap for handler simplification
    pub max_rewrite_passes: usize,
    pub pseudocode_indent: String,
    pub pseudocode_header: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entry_marker: DEFAULT_ENTRY_MARKER.to_string(),
            anti_tamper: true,
            max_rewrite_passes: DEFAULT_MAX_PASSES,
            pseudocode_indent: "    ".to_string(),
            pseudocode_header: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry_marker(mut self, marker: impl Into<String>) -> Self {
        self.entry_marker = marker.into();
        self
    }

    pub fn with_anti_tamper(mut self, enabled: bool) -> Self {
        self.anti_tamper = enabled;
        self
    }

    pub fn with_max_rewrite_passes(mut self, passes: usize) -> Self {
        self.max_rewrite_passes = passes;
        self
    }

    pub fn with_pseudocode_indent(mut self, indent: impl Into<String>) -> Self {
        self.pseudocode_indent = indent.into();
        self
    }

    pub fn with_pseudocode_header(mut self, header: bool) -> Self {
        self.pseudocode_header = header;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entry_marker.is_empty() {
            return Err(ConfigError::Invalid("entry_marker must not be empty".to_string()));
        }
        if self.max_rewrite_passes == 0 {
            return Err(ConfigError::Invalid("max_rewrite_passes must be greater than 0".to_string()));
        }
        if self.pseudocode_indent.chars().any(|c| !c.is_whitespace()) {
            return Err(ConfigError::Invalid("pseudocode_indent must be whitespace".to_string()));
        }
        Ok(())
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        if !ext.eq_ignore_ascii_case("json") {
            return Err(ConfigError::UnsupportedFormat(ext.to_string()));
        }

        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json(&contents)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        fs::write(path, contents).map_err(|e| ConfigError::IoError(e.to_string()))
    }
}
