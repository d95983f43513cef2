//! `deckhand render`: print the API payload an entry converts to.
//!
//! The entry is read from the interpolated document and handed to the
//! adapter registered for the requested entity kind. Nothing is sent
//! anywhere; the payload and its related objects are printed as JSON.

use serde_json::Value;

use super::Session;
use crate::adapters::task::DEFAULT_CLUSTER;
use crate::adapters::{secrets, AdapterContext, AdapterRegistry, Converted, EntityKind};
use crate::cli::RenderArgs;
use crate::config::Document;
use crate::error::DeckhandError;

pub async fn execute(session: &Session, args: &RenderArgs) -> Result<(), DeckhandError> {
    let document = session.resolved().await?;
    let registry = AdapterRegistry::with_defaults();
    let converted = convert(&registry, document, args.entity, &args.name, &args.source)?;
    let out = serde_json::to_string_pretty(&converted).map_err(|e| DeckhandError::ConfigParse {
        path: "<output>".to_string(),
        source: Box::new(e),
    })?;
    println!("{out}");
    Ok(())
}

/// Look up `name` in the section `entity` lives in and run its adapter.
pub fn convert(
    registry: &AdapterRegistry,
    document: &Document,
    entity: EntityKind,
    name: &str,
    source_type: &str,
) -> Result<Converted, DeckhandError> {
    let adapter = registry.get(entity, source_type)?;
    let fragment = document.entry(entity.section(), name)?;
    let entry_name = fragment.get("name").and_then(Value::as_str).unwrap_or(name);
    let ctx = context_for(document, entity, entry_name, fragment)?;
    tracing::debug!(%entity, entry = name, source_type, "converting entry");
    adapter.convert(fragment, &ctx)
}

fn context_for(
    document: &Document,
    entity: EntityKind,
    name: &str,
    fragment: &Value,
) -> Result<AdapterContext, DeckhandError> {
    let cluster = fragment
        .get("cluster")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let parent = match (entity, fragment.get("service").and_then(Value::as_str)) {
        (EntityKind::StandaloneTask, Some(service)) if !service.contains(':') => {
            owning_service(document, service)
        }
        _ => None,
    };
    let secrets = match (entity, cluster.as_deref()) {
        (EntityKind::Service | EntityKind::TaskDefinition, Some(cluster)) => {
            secrets::from_config(fragment, entity.as_str(), cluster, name)?
        }
        (EntityKind::StandaloneTask | EntityKind::EventScheduleRule, cluster) => secrets::from_config(
            fragment,
            entity.as_str(),
            cluster.unwrap_or(DEFAULT_CLUSTER),
            &format!("task-{name}"),
        )?,
        _ => Vec::new(),
    };
    Ok(AdapterContext {
        cluster,
        parent,
        secrets,
        ..AdapterContext::default()
    })
}

/// `CLUSTER:SERVICE` for a service defined in the same document.
fn owning_service(document: &Document, name: &str) -> Option<String> {
    let service = document
        .section("services")
        .ok()?
        .iter()
        .find(|s| s.get("name").and_then(Value::as_str) == Some(name))?;
    let cluster = service.get("cluster").and_then(Value::as_str)?;
    Some(format!("{cluster}:{name}"))
}
