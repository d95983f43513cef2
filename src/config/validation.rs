//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a freshly parsed document for
//! structural errors before any interpolation runs: processable sections
//! that are not lists of mappings, entries without a usable `name`,
//! duplicate names and malformed `env_file` keys. The `terraform:` section
//! is checked later, when the resolver builds its processor. Returns a list
//! of [`ValidationError`] values with per-field suggestions.

use std::collections::HashSet;

use serde_json::Value;

use super::{GLOBAL_SECTION, PROCESSABLE_SECTIONS};
use crate::error::ValidationError;

/// Validate a single entry name. Returns `Ok(())` or a human-readable error.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name cannot be empty".into());
    }
    Ok(())
}

fn error(location: &str, field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        location: location.into(),
        field: field.into(),
        message: message.into(),
        suggestion: None,
    }
}

fn validate_section(section: &str, items: &Value, errors: &mut Vec<ValidationError>) {
    let Some(items) = items.as_array() else {
        errors.push(ValidationError {
            suggestion: Some(format!("write '{section}:' as a list of '- name: ...' items")),
            ..error("(root)", section, "must be a list")
        });
        return;
    };

    let mut seen = HashSet::new();
    for (i, item) in items.iter().enumerate() {
        let location = format!("{section}[{i}]");
        let Some(fields) = item.as_object() else {
            errors.push(error(&location, "(item)", "must be a mapping"));
            continue;
        };

        match fields.get("name") {
            Some(Value::String(name)) => {
                if let Err(msg) = validate_name(name) {
                    errors.push(error(&location, "name", msg));
                } else if !seen.insert(name.as_str()) {
                    errors.push(error(&format!("{section}.{name}"), "name", "duplicate name"));
                }
            }
            Some(_) => errors.push(error(&location, "name", "must be a string")),
            None => errors.push(ValidationError {
                suggestion: Some("every entry needs a unique 'name'".into()),
                ..error(&location, "name", "is required")
            }),
        }

        if let Some(env_file) = fields.get("env_file") {
            if !env_file.is_string() {
                errors.push(error(&location, "env_file", "must be a path string"));
            }
        }
        if let Some(environment) = fields.get("environment") {
            if !environment.is_string() {
                errors.push(error(&location, "environment", "must be a string"));
            }
        }
    }
}

pub fn validate(document: &Value) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let Some(root) = document.as_object() else {
        errors.push(error("(root)", "(document)", "must be a mapping of sections"));
        return Err(errors);
    };

    for section in PROCESSABLE_SECTIONS {
        if let Some(items) = root.get(*section) {
            validate_section(section, items, &mut errors);
        }
    }

    if let Some(global) = root.get(GLOBAL_SECTION) {
        if !global.is_object() {
            errors.push(error("(root)", GLOBAL_SECTION, "must be a mapping"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[must_use]
pub fn format_validation_report(path: &str, document: &Value) -> String {
    let mut lines = Vec::new();
    for section in PROCESSABLE_SECTIONS {
        let Some(items) = document.get(*section).and_then(Value::as_array) else {
            continue;
        };
        lines.push(format!("  {section}: {} entries", items.len()));
        for item in items {
            let name = item.get("name").and_then(Value::as_str).unwrap_or("?");
            match item.get("environment").and_then(Value::as_str) {
                Some(env) => lines.push(format!("    {name}  (environment: {env})")),
                None => lines.push(format!("    {name}")),
            }
        }
    }
    if let Some(terraform) = document.get("terraform") {
        let lookups = terraform
            .get("lookups")
            .and_then(Value::as_object)
            .map_or(0, serde_json::Map::len);
        lines.push(format!("  terraform: {lookups} lookups"));
    }
    if lines.is_empty() {
        lines.push("  (no processable sections)".into());
    }

    format!("{path} is valid\n{}", lines.join("\n"))
}
