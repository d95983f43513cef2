//! `deckhand show`: print the config, a section or a single entry.

use serde_json::Value;

use super::Session;
use crate::cli::{OutputFormat, ShowArgs};
use crate::config::Document;
use crate::error::DeckhandError;

pub async fn execute(session: &Session, args: &ShowArgs) -> Result<(), DeckhandError> {
    let document = if args.raw {
        session.raw().await?
    } else {
        session.resolved().await?
    };
    let value = select(document, args.raw, args.section.as_deref(), args.name.as_deref())?;
    println!("{}", render(value, args.format)?);
    Ok(())
}

/// Pick the whole tree, one top-level section or one entry of a section.
pub fn select<'a>(
    document: &'a Document,
    raw: bool,
    section: Option<&str>,
    name: Option<&str>,
) -> Result<&'a Value, DeckhandError> {
    let tree = if raw { document.raw() } else { document.cooked() };
    match (section, name) {
        (None, _) => Ok(tree),
        (Some(section), None) => tree
            .get(section)
            .ok_or_else(|| DeckhandError::NoSuchSection(section.to_string())),
        (Some(section), Some(name)) if raw => document.raw_entry(section, name),
        (Some(section), Some(name)) => document.entry(section, name),
    }
}

pub fn render(value: &Value, format: OutputFormat) -> Result<String, DeckhandError> {
    match format {
        #[cfg(feature = "yaml")]
        OutputFormat::Yaml => serde_yml::to_string(value).map_err(|e| DeckhandError::ConfigParse {
            path: "<output>".to_string(),
            source: Box::new(e),
        }),
        #[cfg(not(feature = "yaml"))]
        OutputFormat::Yaml => Err(DeckhandError::UnsupportedFormat("yaml".to_string())),
        OutputFormat::Json => serde_json::to_string_pretty(value).map_err(|e| DeckhandError::ConfigParse {
            path: "<output>".to_string(),
            source: Box::new(e),
        }),
    }
}
