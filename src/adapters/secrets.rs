//! Parameter-store secrets declared in an entry's `config:` list.
//!
//! Each item is one of `KEY`, `KEY=VALUE`, `KEY:secure`,
//! `KEY:secure:arn:...` (with or without `=VALUE`). The parameter lives at
//! `{cluster}.{name}.{KEY}` and reaches the containers as `KEY`.
//! `:external` items point at parameters owned elsewhere; listing them needs
//! the parameter store, so they are skipped here.

use serde_json::Value;

use super::Secret;
use crate::error::DeckhandError;

/// The environment key a `config:` item declares, or `None` for external ones.
#[must_use]
pub fn parse_definition(definition: &str) -> Option<&str> {
    let identifier = definition.split_once('=').map_or(definition, |(id, _)| id);
    let mut segments = identifier.split(':');
    let key = segments.next().unwrap_or_default();
    if segments.any(|segment| segment == "external") {
        return None;
    }
    Some(key)
}

#[must_use]
pub fn parameter_name(cluster: &str, name: &str, key: &str) -> String {
    format!("{cluster}.{name}.{key}")
}

/// Secrets for every non-external item of `fragment`'s `config:` list.
pub fn from_config(
    fragment: &Value,
    entity: &str,
    cluster: &str,
    name: &str,
) -> Result<Vec<Secret>, DeckhandError> {
    let Some(config) = fragment.get("config") else {
        return Ok(Vec::new());
    };
    let items = config
        .as_array()
        .ok_or_else(|| DeckhandError::schema(entity, "config", "must be a list of strings"))?;

    let mut secrets = Vec::with_capacity(items.len());
    for item in items {
        let definition = item
            .as_str()
            .ok_or_else(|| DeckhandError::schema(entity, "config", "must be a list of strings"))?;
        match parse_definition(definition) {
            Some("") => {
                return Err(DeckhandError::schema(
                    entity,
                    "config",
                    format!("\"{definition}\" has no parameter name"),
                ));
            }
            Some(key) => secrets.push(Secret {
                name: key.to_string(),
                value_from: parameter_name(cluster, name, key),
            }),
            None => tracing::debug!(entity, definition, "skipping external parameter"),
        }
    }
    Ok(secrets)
}
