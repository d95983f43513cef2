//! External-value processors and the tree walk that feeds them.
//!
//! A [`ProcessorFactory`] decides whether its processor applies to a
//! document at all (returning `Ok(None)` when it does not). A [`Processor`]
//! gets one [`Processor::prepare`] call per entry, then sees every string
//! leaf of that entry, at any depth, through [`Processor::replace`].

pub mod environment;
pub mod terraform;

use std::ops::Range;

use async_trait::async_trait;
use serde_json::Value;

use super::context::{ReplacementContext, Replacements};
use super::{Document, ResolveOptions, PROCESSABLE_SECTIONS};
use crate::error::DeckhandError;

/// The entry a processor is currently working on.
#[derive(Debug, Clone, Copy)]
pub struct EntryScope<'a> {
    pub section: &'a str,
    pub entry: &'a str,
    pub replacements: &'a Replacements,
}

#[async_trait]
pub trait ProcessorFactory: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build a processor for `document`, or `None` if it has nothing to do.
    async fn build(
        &self,
        document: &Document,
        options: &ResolveOptions,
    ) -> Result<Option<Box<dyn Processor>>, DeckhandError>;
}

#[async_trait]
pub trait Processor: Send {
    /// Called once per entry before its leaves are offered to [`Processor::replace`].
    async fn prepare(
        &mut self,
        scope: &EntryScope<'_>,
        entry: &Value,
    ) -> Result<(), DeckhandError>;

    /// Resolve the first placeholder in `text`. `None` leaves the leaf untouched.
    fn replace(
        &mut self,
        text: &str,
        scope: &EntryScope<'_>,
    ) -> Result<Option<Value>, DeckhandError>;
}

/// Run one processor over every entry of every processable section.
pub(crate) async fn run(
    processor: &mut dyn Processor,
    document: &mut Document,
    contexts: &ReplacementContext,
) -> Result<(), DeckhandError> {
    let no_tokens = Replacements::new();
    for section in PROCESSABLE_SECTIONS {
        let Some(entries) = document.entries_mut(section) else {
            continue;
        };
        for entry in entries.iter_mut() {
            let Some(name) = entry.get("name").and_then(Value::as_str).map(str::to_owned) else {
                continue;
            };
            let scope = EntryScope {
                section,
                entry: &name,
                replacements: contexts.get(section, &name).unwrap_or(&no_tokens),
            };
            processor
                .prepare(&scope, entry)
                .await
                .map_err(|e| DeckhandError::in_entry(section, &name, e))?;
            interpolate(entry, processor, &scope)?;
        }
    }
    Ok(())
}

/// Structural recursion over one value; numbers, booleans and nulls pass through.
pub(crate) fn interpolate(
    value: &mut Value,
    processor: &mut dyn Processor,
    scope: &EntryScope<'_>,
) -> Result<(), DeckhandError> {
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                interpolate(child, processor, scope)?;
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                interpolate(child, processor, scope)?;
            }
        }
        Value::String(text) => {
            if let Some(replacement) = processor.replace(text, scope)? {
                *value = replacement;
            }
        }
        Value::Number(_) | Value::Bool(_) | Value::Null => {}
    }
    Ok(())
}

/// Substitute `resolved` for the placeholder at `span` inside `text`.
///
/// Composite values (sequences, mappings, null) replace the whole leaf;
/// scalars are spliced into the surrounding text.
#[must_use]
pub fn splice(text: &str, span: Range<usize>, resolved: &Value) -> Value {
    let scalar = match resolved {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) | Value::Null => return resolved.clone(),
    };
    let mut out = String::with_capacity(text.len() + scalar.len());
    out.push_str(&text[..span.start]);
    out.push_str(&scalar);
    out.push_str(&text[span.end..]);
    Value::String(out)
}

/// Whether any string leaf under `value` satisfies `pred`.
pub(crate) fn any_string(value: &Value, pred: &dyn Fn(&str) -> bool) -> bool {
    match value {
        Value::String(s) => pred(s),
        Value::Array(items) => items.iter().any(|v| any_string(v, pred)),
        Value::Object(map) => map.values().any(|v| any_string(v, pred)),
        Value::Number(_) | Value::Bool(_) | Value::Null => false,
    }
}
