//! Reading `deckhand.yml` (or its JSON / TOML equivalents).
//!
//! [`parse_config_str`] picks a deserializer by file extension, gated by
//! feature flags, and produces the untyped [`Value`] tree the processors
//! work on. [`file_source`] reads from disk and versions the content.

pub mod file_source;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::DeckhandError;

/// Parse a config string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<Value, DeckhandError> {
    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| DeckhandError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| DeckhandError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| DeckhandError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => Err(DeckhandError::UnsupportedFormat(other.to_string())),
    }
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
