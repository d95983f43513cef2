//! `deckhand validate`: check a config file for structural errors.
//!
//! Loads and validates the file without interpolating it, so no env file
//! or remote state is consulted. Results are reported in either
//! human-readable text or machine-readable JSON.

use serde_json::{json, Value};

use super::Session;
use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::{validation, PROCESSABLE_SECTIONS};
use crate::error::DeckhandError;

pub async fn execute(session: &Session, args: &ValidateArgs) -> Result<(), DeckhandError> {
    let path = session.source().path().display().to_string();

    let document = match session.raw().await {
        Ok(document) => document,
        Err(DeckhandError::ConfigValidation { errors }) => {
            match args.format {
                ValidateFormat::Text => {
                    eprintln!("\u{2717} {path} has {} errors\n", errors.len());
                    for error in &errors {
                        eprintln!("{error}");
                    }
                }
                ValidateFormat::Json => {
                    let json_errors: Vec<Value> = errors
                        .iter()
                        .map(|e| {
                            json!({
                                "location": e.location,
                                "field": e.field,
                                "message": e.message,
                                "suggestion": e.suggestion,
                            })
                        })
                        .collect();
                    println!("{}", json!({ "valid": false, "errors": json_errors }));
                }
            }
            return Err(DeckhandError::ConfigValidation { errors });
        }
        Err(other) => return Err(other),
    };

    match args.format {
        ValidateFormat::Text => {
            println!(
                "\u{2713} {}",
                validation::format_validation_report(&path, document.raw())
            );
        }
        ValidateFormat::Json => println!("{}", summary(document.raw())),
    }

    Ok(())
}

/// Entry counts per processable section for the JSON report.
fn summary(raw: &Value) -> Value {
    let mut sections = serde_json::Map::new();
    for section in PROCESSABLE_SECTIONS {
        if let Some(items) = raw.get(*section).and_then(Value::as_array) {
            sections.insert((*section).to_string(), Value::from(items.len()));
        }
    }
    json!({
        "valid": true,
        "sections": sections,
        "terraform": raw.get("terraform").is_some(),
    })
}
