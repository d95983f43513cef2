//! `${env.KEY}` interpolation.
//!
//! Values come from, highest precedence first: the entry's own `env_file:`,
//! the shared `--env-file`, then (only with `--import-env`) the process
//! environment. Keys may embed replacement tokens, e.g.
//! `${env.{environment}_DB_HOST}`, and are upper-cased with `-` mapped to
//! `_` before lookup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{splice, EntryScope, Processor, ProcessorFactory};
use crate::config::context;
use crate::config::{Document, ResolveOptions};
use crate::error::DeckhandError;

/// Substituted for unresolvable keys when missing values are tolerated.
pub const MISSING_VALUE_SENTINEL: &str = "NOT_FOUND";

static ENVIRONMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{env\.((?:\{[A-Za-z-]+\}|[^{}])+)\}").expect("static regex is valid")
});

pub type EnvMap = HashMap<String, String>;

/// Parse `KEY=VALUE` lines. Blank lines and `#` comments are skipped; the
/// first `=` separates key from value; lines without `=` are ignored.
#[must_use]
pub fn parse_env_file(content: &str) -> EnvMap {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Read and parse an env file, mapping I/O failures to descriptive errors.
pub async fn load_env_file(path: &Path) -> Result<EnvMap, DeckhandError> {
    let env_file_error = |reason: &str| DeckhandError::EnvFile {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(env_file_error("does not exist"));
        }
        Err(e) => return Err(DeckhandError::Io(e)),
    };
    if !metadata.is_file() {
        return Err(env_file_error("is not a regular file"));
    }
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            env_file_error("is not readable")
        } else {
            DeckhandError::Io(e)
        }
    })?;
    Ok(parse_env_file(&content))
}

/// Normalize a placeholder key: substitute tokens, upper-case, `-` to `_`.
#[must_use]
pub fn normalize_key(raw: &str, replacements: &context::Replacements) -> String {
    context::apply(raw, replacements)
        .to_uppercase()
        .replace('-', "_")
}

pub struct EnvironmentFactory;

#[async_trait]
impl ProcessorFactory for EnvironmentFactory {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn build(
        &self,
        _document: &Document,
        options: &ResolveOptions,
    ) -> Result<Option<Box<dyn Processor>>, DeckhandError> {
        let shared = match options.env_file {
            Some(ref path) => load_env_file(path).await?,
            None => EnvMap::new(),
        };
        let ambient = if options.import_env {
            std::env::vars().collect()
        } else {
            EnvMap::new()
        };
        Ok(Some(Box::new(EnvironmentProcessor::new(
            shared,
            ambient,
            options.ignore_missing_environment,
        ))))
    }
}

pub struct EnvironmentProcessor {
    shared: EnvMap,
    ambient: EnvMap,
    tolerate_missing: bool,
    per_entry: HashMap<(String, String), EnvMap>,
}

impl EnvironmentProcessor {
    #[must_use]
    pub fn new(shared: EnvMap, ambient: EnvMap, tolerate_missing: bool) -> Self {
        Self {
            shared,
            ambient,
            tolerate_missing,
            per_entry: HashMap::new(),
        }
    }

    fn lookup(&self, scope: &EntryScope<'_>, key: &str) -> Option<&String> {
        self.per_entry
            .get(&(scope.section.to_string(), scope.entry.to_string()))
            .and_then(|env| env.get(key))
            .or_else(|| self.shared.get(key))
            .or_else(|| self.ambient.get(key))
    }
}

#[async_trait]
impl Processor for EnvironmentProcessor {
    async fn prepare(&mut self, scope: &EntryScope<'_>, entry: &Value) -> Result<(), DeckhandError> {
        let cache_key = (scope.section.to_string(), scope.entry.to_string());
        if self.per_entry.contains_key(&cache_key) {
            return Ok(());
        }
        let env = match entry.get("env_file").and_then(Value::as_str) {
            Some(path) if !path.is_empty() => load_env_file(&PathBuf::from(path)).await?,
            _ => EnvMap::new(),
        };
        self.per_entry.insert(cache_key, env);
        Ok(())
    }

    fn replace(&mut self, text: &str, scope: &EntryScope<'_>) -> Result<Option<Value>, DeckhandError> {
        let Some(caps) = ENVIRONMENT_RE.captures(text) else {
            return Ok(None);
        };
        let (Some(whole), Some(raw_key)) = (caps.get(0), caps.get(1)) else {
            return Ok(None);
        };
        let key = normalize_key(raw_key.as_str(), scope.replacements);
        let value = match self.lookup(scope, &key) {
            Some(v) => v.clone(),
            None if self.tolerate_missing => {
                tracing::warn!(
                    section = scope.section,
                    entry = scope.entry,
                    key = %key,
                    "environment value not found, substituting sentinel"
                );
                MISSING_VALUE_SENTINEL.to_string()
            }
            None => {
                return Err(DeckhandError::UnresolvedEnvironment {
                    section: scope.section.to_string(),
                    entry: scope.entry.to_string(),
                    key,
                });
            }
        };
        Ok(Some(splice(text, whole.range(), &Value::String(value))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::context::Replacements;
    use serde_json::json;

    fn tokens() -> Replacements {
        context::for_entry(&json!({"name": "web", "environment": "qa"})).unwrap()
    }

    fn scope(replacements: &Replacements) -> EntryScope<'_> {
        EntryScope {
            section: "services",
            entry: "web",
            replacements,
        }
    }

    #[test]
    fn env_file_parsing_skips_comments_and_splits_on_first_equals() {
        let env = parse_env_file("# comment\n\nA=1\nB = x\nURL=postgres://u:p@h/db?x=1\nJUNK\n");
        assert_eq!(env["A"], "1");
        assert_eq!(env["B "], " x");
        assert_eq!(env["URL"], "postgres://u:p@h/db?x=1");
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn keys_are_normalized_with_tokens() {
        assert_eq!(normalize_key("{environment}-db-host", &tokens()), "QA_DB_HOST");
    }

    #[test]
    fn shared_file_beats_ambient_environment() {
        let t = tokens();
        let mut p = EnvironmentProcessor::new(
            EnvMap::from([("KEY".into(), "B".into())]),
            EnvMap::from([("KEY".into(), "C".into())]),
            false,
        );
        assert_eq!(p.replace("${env.KEY}", &scope(&t)).unwrap(), Some(json!("B")));
    }

    #[test]
    fn only_first_placeholder_is_replaced() {
        let t = tokens();
        let mut p = EnvironmentProcessor::new(
            EnvMap::from([("A".into(), "1".into()), ("B".into(), "2".into())]),
            EnvMap::new(),
            false,
        );
        assert_eq!(
            p.replace("${env.A}-${env.B}", &scope(&t)).unwrap(),
            Some(json!("1-${env.B}"))
        );
    }

    #[test]
    fn missing_key_fails_unless_tolerated() {
        let t = tokens();
        let mut strict = EnvironmentProcessor::new(EnvMap::new(), EnvMap::new(), false);
        let err = strict.replace("${env.nope}", &scope(&t)).unwrap_err();
        assert!(matches!(err, DeckhandError::UnresolvedEnvironment { ref key, .. } if key == "NOPE"));

        let mut tolerant = EnvironmentProcessor::new(EnvMap::new(), EnvMap::new(), true);
        assert_eq!(
            tolerant.replace("x=${env.nope}", &scope(&t)).unwrap(),
            Some(json!(format!("x={MISSING_VALUE_SENTINEL}")))
        );
    }

    #[test]
    fn text_without_placeholder_is_untouched() {
        let t = tokens();
        let mut p = EnvironmentProcessor::new(EnvMap::new(), EnvMap::new(), false);
        assert_eq!(p.replace("${terraform.x}", &scope(&t)).unwrap(), None);
    }

    #[tokio::test]
    async fn missing_env_file_is_reported() {
        let err = load_env_file(Path::new("/definitely/not/here.env"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn directory_is_not_a_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_env_file(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }
}
