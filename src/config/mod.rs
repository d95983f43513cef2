//! Configuration loading and interpolation.
//!
//! A [`Document`] keeps two copies of the parsed `deckhand.yml`: the raw
//! tree exactly as loaded and the cooked tree that interpolation rewrites.
//! The [`ConfigResolver`] runs every registered
//! [`ProcessorFactory`](processors::ProcessorFactory) over the cooked tree
//! in registration order. Submodules provide replacement tokens, the
//! processors themselves, file-format parsing and structural validation.

pub mod context;
pub mod processors;
pub mod sources;
pub mod validation;

use std::path::PathBuf;

use serde_json::Value;

use crate::error::DeckhandError;
use context::ReplacementContext;
use processors::environment::EnvironmentFactory;
use processors::terraform::TerraformFactory;
use processors::ProcessorFactory;

/// The default name of the config file.
pub const DEFAULT_CONFIG_FILE: &str = "deckhand.yml";

/// Top-level sections whose entries are interpolated.
pub const PROCESSABLE_SECTIONS: &[&str] = &["services", "tasks", "tunnels"];

/// Top-level section holding tool-wide settings.
pub const GLOBAL_SECTION: &str = "deckhand";

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigVersion {
    Hash(String),
}

impl std::fmt::Display for ConfigVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hash(hash) => f.write_str(hash),
        }
    }
}

/// Run-time switches that influence interpolation.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Shared `KEY=VALUE` file consulted for `${env.*}` after the entry's own file.
    pub env_file: Option<PathBuf>,
    /// Fall back to the process environment for `${env.*}`.
    pub import_env: bool,
    /// Bearer token for the managed Terraform state service.
    pub tfe_token: Option<String>,
    /// Substitute a sentinel instead of failing on unknown `${env.*}` keys.
    pub ignore_missing_environment: bool,
}

#[derive(Debug, Clone)]
pub struct Document {
    path: String,
    version: ConfigVersion,
    raw: Value,
    cooked: Value,
}

impl Document {
    /// Build a document from an already parsed tree, validating its structure.
    pub fn from_value(path: impl Into<String>, raw: Value) -> Result<Self, DeckhandError> {
        let hash = sources::sha256_hex(raw.to_string().as_bytes());
        Self::with_version(path.into(), raw, ConfigVersion::Hash(hash))
    }

    pub(crate) fn with_version(
        path: String,
        raw: Value,
        version: ConfigVersion,
    ) -> Result<Self, DeckhandError> {
        validation::validate(&raw).map_err(|errors| DeckhandError::ConfigValidation { errors })?;
        let cooked = raw.clone();
        Ok(Self {
            path,
            version,
            raw,
            cooked,
        })
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub const fn version(&self) -> &ConfigVersion {
        &self.version
    }

    /// The tree as loaded, before any interpolation.
    #[must_use]
    pub const fn raw(&self) -> &Value {
        &self.raw
    }

    /// The tree after interpolation.
    #[must_use]
    pub const fn cooked(&self) -> &Value {
        &self.cooked
    }

    pub(crate) fn entries_mut(&mut self, section: &str) -> Option<&mut Vec<Value>> {
        self.cooked.get_mut(section).and_then(Value::as_array_mut)
    }

    pub fn section(&self, section: &str) -> Result<&[Value], DeckhandError> {
        section_of(&self.cooked, section)
    }

    /// Find an entry by `name`, or by its `environment` label.
    pub fn entry(&self, section: &str, name: &str) -> Result<&Value, DeckhandError> {
        find_entry(&self.cooked, section, name)
    }

    /// Like [`Document::entry`], but against the raw tree.
    pub fn raw_entry(&self, section: &str, name: &str) -> Result<&Value, DeckhandError> {
        find_entry(&self.raw, section, name)
    }

    /// A sub-mapping of the top-level `deckhand:` section, or an empty map.
    #[must_use]
    pub fn global(&self, section: &str) -> Value {
        self.cooked
            .get(GLOBAL_SECTION)
            .and_then(|g| g.get(section))
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }
}

fn section_of<'a>(tree: &'a Value, section: &str) -> Result<&'a [Value], DeckhandError> {
    tree.get(section)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| DeckhandError::NoSuchSection(section.to_string()))
}

fn find_entry<'a>(tree: &'a Value, section: &str, name: &str) -> Result<&'a Value, DeckhandError> {
    section_of(tree, section)?
        .iter()
        .find(|item| {
            item.get("name").and_then(Value::as_str) == Some(name)
                || item.get("environment").and_then(Value::as_str) == Some(name)
        })
        .ok_or_else(|| DeckhandError::NoSuchSectionItem {
            section: section.to_string(),
            name: name.to_string(),
        })
}

/// Drives the ordered processor passes that turn `raw` into `cooked`.
pub struct ConfigResolver {
    factories: Vec<Box<dyn ProcessorFactory>>,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::empty()
            .with(Box::new(TerraformFactory::default()))
            .with(Box::new(EnvironmentFactory))
    }
}

impl ConfigResolver {
    /// A resolver with no processors registered.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Register a processor; processors run in registration order.
    #[must_use]
    pub fn with(mut self, factory: Box<dyn ProcessorFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    #[must_use]
    pub fn processor_names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.name()).collect()
    }

    /// Interpolate `document.cooked` in place.
    ///
    /// Every failure is reported as [`DeckhandError::ProcessingFailed`].
    pub async fn resolve(
        &self,
        document: &mut Document,
        options: &ResolveOptions,
    ) -> Result<(), DeckhandError> {
        for factory in &self.factories {
            let contexts = ReplacementContext::build(document.cooked());
            let processor = factory
                .build(document, options)
                .await
                .map_err(DeckhandError::processing)?;
            let Some(mut processor) = processor else {
                tracing::debug!(processor = factory.name(), "processor not applicable, skipping");
                continue;
            };
            tracing::debug!(processor = factory.name(), "running processor");
            processors::run(processor.as_mut(), document, &contexts)
                .await
                .map_err(DeckhandError::processing)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Document {
        Document::from_value(
            "test.yml",
            json!({
                "deckhand": {"ssh": {"proxy": "bastion"}},
                "services": [
                    {"name": "web-prod", "environment": "prod", "cluster": "c1"},
                    {"name": "web-qa", "environment": "qa"}
                ]
            }),
        )
        .unwrap()
    }

    #[test]
    fn cooked_starts_as_copy_of_raw() {
        let d = doc();
        assert_eq!(d.raw(), d.cooked());
    }

    #[test]
    fn entry_matches_name_or_environment() {
        let d = doc();
        assert_eq!(d.entry("services", "web-prod").unwrap()["cluster"], "c1");
        assert_eq!(d.entry("services", "qa").unwrap()["name"], "web-qa");
    }

    #[test]
    fn missing_section_and_item_are_errors() {
        let d = doc();
        assert!(matches!(
            d.section("tasks"),
            Err(DeckhandError::NoSuchSection(ref s)) if s == "tasks"
        ));
        assert!(matches!(
            d.entry("services", "nope"),
            Err(DeckhandError::NoSuchSectionItem { .. })
        ));
    }

    #[test]
    fn global_returns_empty_map_when_absent() {
        let d = doc();
        assert_eq!(d.global("ssh")["proxy"], "bastion");
        assert_eq!(d.global("aws"), json!({}));
    }

    #[test]
    fn default_resolver_runs_terraform_before_environment() {
        assert_eq!(
            ConfigResolver::default().processor_names(),
            vec!["terraform", "environment"]
        );
    }

    #[test]
    fn version_is_stable_for_equal_trees() {
        assert_eq!(doc().version(), doc().version());
    }
}
