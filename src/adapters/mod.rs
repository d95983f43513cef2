//! Turning cooked config fragments into API request payloads.
//!
//! An [`Adapter`] is a pure function of one resolved fragment plus an
//! explicit [`AdapterContext`]; it never performs I/O. The
//! [`AdapterRegistry`] maps an (entity kind, source type) pair to the
//! adapter that understands it. Build one at startup with
//! [`AdapterRegistry::with_defaults`] and pass it by reference.

pub mod events;
pub mod secrets;
pub mod service;
pub mod task;
pub mod task_definition;
pub mod tunnel;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DeckhandError;

/// Source type for fragments read from `deckhand.yml`.
pub const DECKHAND_SOURCE: &str = "deckhand";

/// The kinds of entity an adapter can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum EntityKind {
    Service,
    TaskDefinition,
    StandaloneTask,
    EventScheduleRule,
    #[value(name = "ssh-tunnel")]
    SshTunnel,
}

impl EntityKind {
    pub const ALL: [Self; 5] = [
        Self::Service,
        Self::TaskDefinition,
        Self::StandaloneTask,
        Self::EventScheduleRule,
        Self::SshTunnel,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Service => "Service",
            Self::TaskDefinition => "TaskDefinition",
            Self::StandaloneTask => "StandaloneTask",
            Self::EventScheduleRule => "EventScheduleRule",
            Self::SshTunnel => "SSHTunnel",
        }
    }

    /// The config section whose entries describe this kind of entity.
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::Service | Self::TaskDefinition => "services",
            Self::StandaloneTask | Self::EventScheduleRule => "tasks",
            Self::SshTunnel => "tunnels",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown entity kind '{s}'"))
    }
}

/// A pre-resolved secret reference handed to every container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Secret {
    pub name: String,
    #[serde(rename = "valueFrom")]
    pub value_from: String,
}

/// Everything an adapter may know beyond the fragment itself.
#[derive(Debug, Clone, Default)]
pub struct AdapterContext {
    pub cluster: Option<String>,
    /// Name of the entity this one is built for, e.g. the owning service.
    pub parent: Option<String>,
    pub secrets: Vec<Secret>,
    /// Appended to every container's `environment`, overriding same-named keys.
    pub extra_environment: Vec<(String, String)>,
}

/// A secondary object built alongside the primary payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Related {
    Entity(Box<Converted>),
    Value(Value),
}

/// The output of one conversion: the request payload plus related objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Converted {
    pub payload: Map<String, Value>,
    pub related: BTreeMap<String, Related>,
}

impl Converted {
    #[must_use]
    pub fn new(payload: Map<String, Value>) -> Self {
        Self {
            payload,
            related: BTreeMap::new(),
        }
    }

    /// A related entity by key, if one was built.
    #[must_use]
    pub fn entity(&self, key: &str) -> Option<&Self> {
        match self.related.get(key)? {
            Related::Entity(converted) => Some(converted),
            Related::Value(_) => None,
        }
    }

    /// A related plain value by key.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.related.get(key)? {
            Related::Value(value) => Some(value),
            Related::Entity(_) => None,
        }
    }
}

pub trait Adapter: Send + Sync {
    fn convert(&self, fragment: &Value, ctx: &AdapterContext) -> Result<Converted, DeckhandError>;
}

/// Two-key adapter lookup: entity kind × source type.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<(EntityKind, String), Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in adapter for the `deckhand` source.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            EntityKind::TaskDefinition,
            DECKHAND_SOURCE,
            Arc::new(task_definition::TaskDefinitionAdapter),
        );
        registry.register(EntityKind::Service, DECKHAND_SOURCE, Arc::new(service::ServiceAdapter));
        registry.register(
            EntityKind::StandaloneTask,
            DECKHAND_SOURCE,
            Arc::new(task::StandaloneTaskAdapter),
        );
        registry.register(
            EntityKind::EventScheduleRule,
            DECKHAND_SOURCE,
            Arc::new(events::EventScheduleRuleAdapter),
        );
        registry.register(EntityKind::SshTunnel, DECKHAND_SOURCE, Arc::new(tunnel::SshTunnelAdapter));
        registry
    }

    /// Add or replace the adapter for `(entity, source_type)`.
    pub fn register(&mut self, entity: EntityKind, source_type: &str, adapter: Arc<dyn Adapter>) {
        self.adapters.insert((entity, source_type.to_string()), adapter);
    }

    pub fn get(&self, entity: EntityKind, source_type: &str) -> Result<Arc<dyn Adapter>, DeckhandError> {
        self.adapters
            .get(&(entity, source_type.to_string()))
            .cloned()
            .ok_or_else(|| DeckhandError::AdapterNotFound {
                entity: entity.to_string(),
                source_type: source_type.to_string(),
            })
    }

    /// Look up and run the adapter in one step.
    pub fn convert(
        &self,
        entity: EntityKind,
        source_type: &str,
        fragment: &Value,
        ctx: &AdapterContext,
    ) -> Result<Converted, DeckhandError> {
        self.get(entity, source_type)?.convert(fragment, ctx)
    }

    #[must_use]
    pub fn contains(&self, entity: EntityKind, source_type: &str) -> bool {
        self.adapters.contains_key(&(entity, source_type.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Read-side helper over one config fragment that names `entity` in errors.
pub(crate) struct Fragment<'a> {
    entity: String,
    data: &'a Value,
}

impl<'a> Fragment<'a> {
    pub(crate) fn new(entity: impl Into<String>, data: &'a Value) -> Result<Self, DeckhandError> {
        let entity = entity.into();
        if !data.is_object() {
            return Err(DeckhandError::schema(entity, "(fragment)", "must be a mapping"));
        }
        Ok(Self { entity, data })
    }

    pub(crate) fn entity(&self) -> &str {
        &self.entity
    }

    pub(crate) fn has(&self, key: &str) -> bool {
        self.data.get(key).is_some_and(|v| !v.is_null())
    }

    pub(crate) fn get(&self, key: &str) -> Option<&'a Value> {
        self.data.get(key).filter(|v| !v.is_null())
    }

    pub(crate) fn error(&self, field: &str, message: impl Into<String>) -> DeckhandError {
        DeckhandError::schema(self.entity.as_str(), field, message)
    }

    pub(crate) fn require(&self, key: &str) -> Result<&'a Value, DeckhandError> {
        self.get(key).ok_or_else(|| self.error(key, "is required"))
    }

    pub(crate) fn str(&self, key: &str) -> Result<Option<&'a str>, DeckhandError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(self.error(key, "must be a string")),
        }
    }

    pub(crate) fn require_str(&self, key: &str) -> Result<&'a str, DeckhandError> {
        self.str(key)?.ok_or_else(|| self.error(key, "is required"))
    }

    pub(crate) fn str_or(&self, key: &str, default: &'a str) -> Result<&'a str, DeckhandError> {
        Ok(self.str(key)?.unwrap_or(default))
    }

    /// Integers may be written as numbers or numeric strings.
    pub(crate) fn int(&self, key: &str) -> Result<Option<i64>, DeckhandError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => as_int(value)
                .map(Some)
                .ok_or_else(|| self.error(key, "must be an integer")),
        }
    }

    pub(crate) fn copy(&self, into: &mut Map<String, Value>, key: &str, dest: &str) {
        if let Some(value) = self.get(key) {
            into.insert(dest.to_string(), value.clone());
        }
    }
}

pub(crate) fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `vpc_configuration:` to the `awsvpcConfiguration` shape.
pub(crate) fn vpc_configuration(fragment: &Fragment<'_>) -> Result<Option<Value>, DeckhandError> {
    let Some(source) = fragment.get("vpc_configuration") else {
        return Ok(None);
    };
    let vpc = Fragment::new(format!("{}.vpc_configuration", fragment.entity()), source)?;
    let mut data = Map::new();
    data.insert("subnets".into(), vpc.require("subnets")?.clone());
    vpc.copy(&mut data, "security_groups", "securityGroups");
    if let Some(public_ip) = vpc.get("public_ip") {
        let enabled = match public_ip {
            Value::Bool(b) => *b,
            Value::String(s) => s.eq_ignore_ascii_case("enabled") || s == "true",
            _ => false,
        };
        data.insert(
            "assignPublicIp".into(),
            Value::from(if enabled { "ENABLED" } else { "DISABLED" }),
        );
    }
    let mut network = Map::new();
    network.insert("awsvpcConfiguration".into(), Value::Object(data));
    Ok(Some(Value::Object(network)))
}
