//! Runtime configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Default output batch size (rows) for sinks whose spec omits one.
    pub batch_rows: usize,

    /// Abort the worker on a malformed message instead of logging the
    /// message error and continuing with the next delivery.
    pub strict_messages: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch_rows: 200,
            strict_messages: false,
        }
    }
}

impl RuntimeConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `RIVULET_BATCH_ROWS`: default sink batch size in rows
    /// - `RIVULET_STRICT_MESSAGES`: `true`/`false`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("RIVULET_BATCH_ROWS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.batch_rows = v;
            }
        }

        if let Ok(s) = std::env::var("RIVULET_STRICT_MESSAGES") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.strict_messages = v;
            }
        }

        cfg
    }
}
