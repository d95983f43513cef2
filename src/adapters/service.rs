//! Long-running services.
//!
//! The payload is the `CreateService` request. The service's task definition
//! is built from the same fragment and returned as the `task_definition`
//! related entity, with the service identity injected into every container's
//! environment.

use serde_json::{json, Map, Value};

use super::{task_definition, vpc_configuration, Adapter, AdapterContext, Converted, Fragment, Related};
use crate::error::DeckhandError;

const CLIENT_TOKEN_LEN: usize = 35;

pub struct ServiceAdapter;

impl Adapter for ServiceAdapter {
    fn convert(&self, fragment: &Value, ctx: &AdapterContext) -> Result<Converted, DeckhandError> {
        let label = fragment.get("name").and_then(Value::as_str).unwrap_or("?");
        let f = Fragment::new(format!("Service({label})"), fragment)?;
        let name = f.require_str("name")?;
        let cluster = f.require_str("cluster")?;

        let mut data = Map::new();
        data.insert("cluster".into(), Value::from(cluster));
        data.insert("serviceName".into(), Value::from(name));

        if let Some(lb) = f.get("load_balancer") {
            let lb = Fragment::new(format!("{}.load_balancer", f.entity()), lb)?;
            if let Some(role) = f.str("service_role_arn")? {
                data.insert("role".into(), Value::from(role));
            } else if let Some(role) = lb.str("service_role_arn")? {
                data.insert("role".into(), Value::from(role));
            }
            data.insert("loadBalancers".into(), load_balancers(&lb)?);
        }

        if let Some(strategy) = f.get("capacity_provider_strategy") {
            data.insert("capacityProviderStrategy".into(), strategy.clone());
        } else {
            let launch_type = f.str_or("launch_type", "EC2")?;
            data.insert("launchType".into(), Value::from(launch_type));
            if launch_type == "FARGATE" {
                data.insert(
                    "platformVersion".into(),
                    Value::from(f.str_or("platform_version", "LATEST")?),
                );
            }
        }

        if let Some(network) = vpc_configuration(&f)? {
            data.insert("networkConfiguration".into(), network);
        }
        f.copy(&mut data, "placement_constraints", "placementConstraints");
        f.copy(&mut data, "placement_strategy", "placementStrategy");

        let strategy = f.str_or("scheduling_strategy", "REPLICA")?;
        let maximum = if strategy == "DAEMON" {
            100
        } else {
            f.int("maximum_percent")?.unwrap_or(200)
        };
        data.insert(
            "deploymentConfiguration".into(),
            json!({
                "maximumPercent": maximum,
                "minimumHealthyPercent": f.int("minimum_healthy_percent")?.unwrap_or(50),
            }),
        );
        data.insert("schedulingStrategy".into(), Value::from(strategy));
        if strategy != "DAEMON" {
            let count = f
                .int("count")?
                .ok_or_else(|| f.error("count", "is required unless scheduling_strategy is DAEMON"))?;
            data.insert("desiredCount".into(), Value::from(count));
        }
        data.insert("clientToken".into(), Value::from(client_token(name, cluster)));

        let mut converted = Converted::new(data);
        converted.related.insert(
            "task_definition".into(),
            Related::Entity(Box::new(Converted::new(task_definition::build(
                fragment,
                &task_context(&f, name, cluster, ctx)?,
            )?))),
        );

        if let Some(discovery) = f.get("service_discovery") {
            if f.str_or("network_mode", "bridge")? != "awsvpc" {
                return Err(f.error(
                    "service_discovery",
                    "you must use network_mode of \"awsvpc\" to enable service discovery",
                ));
            }
            converted.related.insert(
                "service_discovery".into(),
                Related::Entity(Box::new(service_discovery(&f, discovery)?)),
            );
        }

        converted.related.insert(
            "tags".into(),
            Related::Value(json!({ "Environment": f.str_or("environment", "test")? })),
        );
        if let Some(asg) = f.get("autoscalinggroup_name") {
            converted
                .related
                .insert("autoscalinggroup_name".into(), Related::Value(asg.clone()));
        }
        if let Some(proxy) = f.get("ssh").and_then(|ssh| ssh.get("proxy")) {
            converted
                .related
                .insert("ssh_proxy_type".into(), Related::Value(proxy.clone()));
        }
        Ok(converted)
    }
}

/// Idempotency token for `CreateService`; the API caps it at 35 characters.
#[must_use]
pub fn client_token(name: &str, cluster: &str) -> String {
    format!("token-{name}-{cluster}")
        .chars()
        .take(CLIENT_TOKEN_LEN)
        .collect()
}

fn task_context(
    f: &Fragment<'_>,
    name: &str,
    cluster: &str,
    ctx: &AdapterContext,
) -> Result<AdapterContext, DeckhandError> {
    let mut extra = vec![
        ("DECKHAND_SERVICE_NAME".to_string(), name.to_string()),
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

fn load_balancer_target(group: &Fragment<'_>, key: &str, dest: &str) -> Result<Value, DeckhandError> {
    let port = group
        .int("container_port")?
        .ok_or_else(|| group.error("container_port", "is required"))?;
    let mut target = Map::new();
    target.insert(dest.to_string(), Value::from(group.require_str(key)?));
    target.insert(
        "containerName".into(),
        Value::from(group.require_str("container_name")?),
    );
    target.insert("containerPort".into(), Value::from(port));
    Ok(Value::Object(target))
}

fn load_balancers(lb: &Fragment<'_>) -> Result<Value, DeckhandError> {
    if let Some(groups) = lb.get("target_groups") {
        let groups = groups
            .as_array()
            .ok_or_else(|| lb.error("target_groups", "must be a list"))?;
        let mut list = Vec::with_capacity(groups.len());
        for group in groups {
            let group = Fragment::new(format!("{}.target_groups", lb.entity()), group)?;
            list.push(load_balancer_target(&group, "target_group_arn", "targetGroupArn")?);
        }
        return Ok(Value::Array(list));
    }
    if lb.has("load_balancer_name") {
        return Ok(json!([load_balancer_target(lb, "load_balancer_name", "loadBalancerName")?]));
    }
    if lb.has("target_group_arn") {
        return Ok(json!([load_balancer_target(lb, "target_group_arn", "targetGroupArn")?]));
    }
    Err(lb.error(
        "load_balancer",
        "define one of \"load_balancer_name\", \"target_group_arn\" or \"target_groups\"",
    ))
}

fn service_discovery(f: &Fragment<'_>, source: &Value) -> Result<Converted, DeckhandError> {
    let sd = Fragment::new(format!("{}.service_discovery", f.entity()), source)?;
    let records = sd
        .require("dns_records")?
        .as_array()
        .ok_or_else(|| sd.error("dns_records", "must be a list"))?;
    let mut dns = Vec::with_capacity(records.len());
    for record in records {
        let record = Fragment::new(format!("{}.dns_records", sd.entity()), record)?;
        dns.push(json!({
            "Type": record.require_str("type")?,
            "TTL": record.require("ttl")?,
        }));
    }
    let mut payload = Map::new();
    payload.insert("Name".into(), Value::from(sd.require_str("name")?));
    payload.insert(
        "DnsConfig".into(),
        json!({ "RoutingPolicy": "MULTIVALUE", "DnsRecords": dns }),
    );
    let mut converted = Converted::new(payload);
    converted.related.insert(
        "namespace_name".into(),
        Related::Value(sd.require("namespace")?.clone()),
    );
    Ok(converted)
}
