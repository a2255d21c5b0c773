//! Configuration for stream responses

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of bytes read from the body per chunk.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Content type used when neither the caller nor the resource supplies one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Tunables applied when a [`StreamResponse`](crate::StreamResponse) is
/// turned into an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// Maximum size of each body chunk in bytes (default: 64KB)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Whether to mark responses `Cache-Control: public` (default: true)
    #[serde(default = "default_true")]
    pub public: bool,

    /// Fallback `Content-Type` (default: application/octet-stream)
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_true() -> bool {
    true
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

impl Default for ResponseConfig {
    fn default() -> Self {
        ResponseConfig {
            buffer_size: default_buffer_size(),
            public: default_true(),
            default_content_type: default_content_type(),
        }
    }
}

impl ResponseConfig {
    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be greater than zero".to_string()));
        }
        if self.default_content_type.trim().is_empty() {
            return Err(Error::Config("default_content_type must not be empty".to_string()));
        }
        Ok(())
    }
}
