//! Connection configuration
//!
//! Settings are stored as JSON. Every field has a default, so a config file
//! only needs the keys it wants to change.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::protocol::{ScaleError, DEFAULT_DECODE_BUFFER_LIMIT, DEFAULT_READ_CHUNK_SIZE};

/// File name used for the configuration inside the application config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Serial port to open; `None` selects the first USB serial port
    pub port_name: Option<String>,
    /// Maximum number of bytes requested per read
    pub read_chunk_size: usize,
    /// Characters a legacy decode buffer may hold before it is trimmed
    pub decode_buffer_limit: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: None,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            decode_buffer_limit: DEFAULT_DECODE_BUFFER_LIMIT,
        }
    }
}

impl ConnectionConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScaleError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ScaleError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ScaleError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ScaleError::Config(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values that cannot work
    pub fn validate(&self) -> Result<(), ScaleError> {
        if self.read_chunk_size == 0 {
            return Err(ScaleError::Config("read_chunk_size must be at least 1".to_string()));
        }
        if matches!(self.port_name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(ScaleError::Config("port_name must not be empty".to_string()));
        }
        Ok(())
    }
}
