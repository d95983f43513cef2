//! Async file loading with SHA256 versioning.
//!
//! [`FileSource`] reads the config file through Tokio, parses it by
//! extension, validates it and computes a SHA256 hash of the content.

use std::path::{Path, PathBuf};

use super::{parse_config_str, sha256_hex};
use crate::config::{ConfigVersion, Document};
use crate::error::DeckhandError;

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_content(&self) -> Result<String, DeckhandError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeckhandError::ConfigFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                DeckhandError::Io(e)
            }
        })
    }

    /// Read, parse and validate. Files without an extension are read as YAML.
    pub async fn load(&self) -> Result<Document, DeckhandError> {
        let content = self.read_content().await?;
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("yml");
        let display = self.path.display().to_string();
        let raw = parse_config_str(ext, &content, &display)?;
        let hash = sha256_hex(content.as_bytes());
        Document::with_version(display, raw, ConfigVersion::Hash(hash))
    }
}
