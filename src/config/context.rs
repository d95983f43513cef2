//! Per-entry replacement tokens.
//!
//! Every entry of a processable section gets a small map of tokens such as
//! `{name}` and `{environment}`. Processors substitute them into state file
//! locations, lookup keys and `${env.*}` names. Tokens come from the entry
//! itself only, never from another processor's output.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::PROCESSABLE_SECTIONS;

pub const NAME_TOKEN: &str = "{name}";
pub const SERVICE_NAME_TOKEN: &str = "{service-name}";
pub const ENVIRONMENT_TOKEN: &str = "{environment}";
pub const CLUSTER_NAME_TOKEN: &str = "{cluster-name}";

const DEFAULT_ENVIRONMENT: &str = "prod";

/// Token string to value, for one entry.
pub type Replacements = BTreeMap<String, String>;

/// Tokens for a single entry, or `None` when it has no string `name`.
#[must_use]
pub fn for_entry(entry: &Value) -> Option<Replacements> {
    let name = entry.get("name")?.as_str()?;
    let mut tokens = Replacements::new();
    tokens.insert(NAME_TOKEN.to_string(), name.to_string());
    tokens.insert(SERVICE_NAME_TOKEN.to_string(), name.to_string());
    let environment = entry
        .get("environment")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_ENVIRONMENT);
    tokens.insert(ENVIRONMENT_TOKEN.to_string(), environment.to_string());
    if let Some(cluster) = entry.get("cluster").and_then(Value::as_str) {
        tokens.insert(CLUSTER_NAME_TOKEN.to_string(), cluster.to_string());
    }
    Some(tokens)
}

/// Substitute every token in `template`.
#[must_use]
pub fn apply(template: &str, replacements: &Replacements) -> String {
    replacements
        .iter()
        .fold(template.to_string(), |acc, (token, value)| {
            acc.replace(token.as_str(), value)
        })
}

/// Tokens for every entry of every processable section.
#[derive(Debug, Default)]
pub struct ReplacementContext {
    entries: HashMap<(String, String), Replacements>,
}

impl ReplacementContext {
    #[must_use]
    pub fn build(tree: &Value) -> Self {
        let mut entries = HashMap::new();
        for section in PROCESSABLE_SECTIONS {
            let Some(items) = tree.get(*section).and_then(Value::as_array) else {
                continue;
            };
            for item in items {
                if let Some(tokens) = for_entry(item) {
                    let name = tokens[NAME_TOKEN].clone();
                    entries.insert(((*section).to_string(), name), tokens);
                }
            }
        }
        Self { entries }
    }

    #[must_use]
    pub fn get(&self, section: &str, name: &str) -> Option<&Replacements> {
        self.entries.get(&(section.to_string(), name.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn environment_defaults_to_prod_and_cluster_is_optional() {
        let tokens = for_entry(&json!({"name": "web"})).unwrap();
        assert_eq!(tokens[ENVIRONMENT_TOKEN], "prod");
        assert_eq!(tokens[SERVICE_NAME_TOKEN], "web");
        assert!(!tokens.contains_key(CLUSTER_NAME_TOKEN));
    }

    #[test]
    fn builds_tokens_for_every_processable_section() {
        let tree = json!({
            "services": [{"name": "web", "environment": "qa", "cluster": "main"}],
            "tasks": [{"name": "migrate"}],
            "other": [{"name": "ignored"}]
        });
        let ctx = ReplacementContext::build(&tree);
        assert_eq!(ctx.len(), 2);
        let web = ctx.get("services", "web").unwrap();
        assert_eq!(web[CLUSTER_NAME_TOKEN], "main");
        assert_eq!(web[ENVIRONMENT_TOKEN], "qa");
        assert!(ctx.get("other", "ignored").is_none());
    }

    #[test]
    fn apply_replaces_every_token() {
        let tokens = for_entry(&json!({"name": "web", "environment": "qa"})).unwrap();
        assert_eq!(
            apply("s3://state/{environment}/{name}.tfstate", &tokens),
            "s3://state/qa/web.tfstate"
        );
    }
}
