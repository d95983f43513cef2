//! Standalone (one-off or scheduled) tasks.
//!
//! The payload is the `RunTask` request. Tasks carry their own task
//! definition, and a `schedule:` additionally yields the event rule that runs
//! them plus the arguments for its target.

use serde_json::{json, Map, Value};

use super::events::EventScheduleRuleAdapter;
use super::{task_definition, vpc_configuration, Adapter, AdapterContext, Converted, Fragment, Related};
use crate::error::DeckhandError;

pub const DEFAULT_CLUSTER: &str = "default";

pub struct StandaloneTaskAdapter;

impl Adapter for StandaloneTaskAdapter {
    fn convert(&self, fragment: &Value, ctx: &AdapterContext) -> Result<Converted, DeckhandError> {
        let label = fragment.get("name").and_then(Value::as_str).unwrap_or("?");
        let f = Fragment::new(format!("StandaloneTask({label})"), fragment)?;
        let name = f.require_str("name")?;
        let cluster = match f.str("cluster")? {
            Some(cluster) => cluster,
            None => ctx.cluster.as_deref().unwrap_or(DEFAULT_CLUSTER),
        };

        let mut data = Map::new();
        data.insert("name".into(), Value::from(name));
        if let Some(service) = f.str("service")? {
            data.insert("service".into(), Value::from(service_pk(&f, service, ctx)?));
        }
        data.insert("cluster".into(), Value::from(cluster));
        let network = vpc_configuration(&f)?;
        if let Some(ref network) = network {
            data.insert("networkConfiguration".into(), network.clone());
        }
        data.insert("count".into(), Value::from(f.int("count")?.unwrap_or(1)));
        let launch_type = f.str_or("launch_type", "EC2")?;
        data.insert("launchType".into(), Value::from(launch_type));
        if launch_type == "FARGATE" {
            data.insert(
                "platformVersion".into(),
                Value::from(f.str_or("platform_version", "LATEST")?),
            );
        } else {
            f.copy(&mut data, "capacity_provider_strategy", "capacityProviderStrategy");
        }
        f.copy(&mut data, "placement_constraints", "placementConstraints");
        f.copy(&mut data, "placement_strategy", "placementStrategy");
        f.copy(&mut data, "group", "group");

        let mut source = fragment.clone();
        if let Some(map) = source.as_object_mut() {
            map.entry("family").or_insert_with(|| Value::from(name));
        }
        let mut task_def = task_definition::build(&source, &task_context(&f, name, cluster, ctx)?)?;
        if network.is_some() {
            task_def.insert("networkMode".into(), Value::from("awsvpc"));
        }
        let family = task_def
            .get("family")
            .and_then(Value::as_str)
            .unwrap_or(name)
            .to_string();

        let mut converted = Converted::new(data);
        if let Some(schedule) = f.str("schedule")? {
            let role = f.str("schedule_role")?.ok_or_else(|| {
                f.error("schedule_role", "is required when you specify a schedule")
            })?;
            let rule = EventScheduleRuleAdapter
                .convert(&json!({ "name": family, "schedule": schedule }), ctx)?;
            converted
                .related
                .insert("schedule".into(), Related::Entity(Box::new(rule)));
            converted.related.insert(
                "schedule_target".into(),
                Related::Value(schedule_target(&f, &converted.payload, &family, role)),
            );
        }
        converted.related.insert(
            "task_definition".into(),
            Related::Entity(Box::new(Converted::new(task_def))),
        );
        Ok(converted)
    }
}

/// `CLUSTER:SERVICE`; bare service names are qualified through the context.
fn service_pk(f: &Fragment<'_>, service: &str, ctx: &AdapterContext) -> Result<String, DeckhandError> {
    if service.contains(':') {
        return Ok(service.to_string());
    }
    match ctx.parent {
        Some(ref parent) if parent.ends_with(&format!(":{service}")) => Ok(parent.clone()),
        _ => Err(f.error(
            "service",
            format!("no service named \"{service}\" exists in the config file"),
        )),
    }
}

fn task_context(
    f: &Fragment<'_>,
    name: &str,
    cluster: &str,
    ctx: &AdapterContext,
) -> Result<AdapterContext, DeckhandError> {
    let mut extra = vec![
        ("DECKHAND_TASK_NAME".to_string(), name.to_string()),
        (
            "DECKHAND_ENVIRONMENT".to_string(),
            f.str_or("environment", "undefined")?.to_string(),
        ),
        ("DECKHAND_CLUSTER_NAME".to_string(), cluster.to_string()),
    ];
    extra.extend(ctx.extra_environment.iter().cloned());
    Ok(AdapterContext {
        cluster: Some(cluster.to_string()),
        parent: Some(name.to_string()),
        secrets: ctx.secrets.clone(),
        extra_environment: extra,
    })
}

/// Arguments for the event target that launches the scheduled task.
fn schedule_target(f: &Fragment<'_>, payload: &Map<String, Value>, family: &str, role: &str) -> Value {
    let mut target = Map::new();
    target.insert("name".into(), Value::from(family));
    target.insert("schedule_role".into(), Value::from(role));
    for (from, to) in [("cluster", "cluster"), ("count", "count"), ("launchType", "launch_type"), ("group", "group")] {
        if let Some(value) = payload.get(from) {
            target.insert(to.into(), value.clone());
        }
    }
    if payload.get("launchType").and_then(Value::as_str) == Some("FARGATE") {
        if let Some(version) = payload.get("platformVersion") {
            target.insert("platform_version".into(), version.clone());
        }
    }
    if let Some(vpc) = f.get("vpc_configuration") {
        target.insert("vpc_configuration".into(), vpc.clone());
    }
    Value::Object(target)
}
