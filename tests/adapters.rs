//! Adapter registry behaviour against realistic config fragments.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use deckhand::adapters::{
    Adapter, AdapterContext, AdapterRegistry, Converted, EntityKind, Secret, DECKHAND_SOURCE,
};
use deckhand::error::DeckhandError;

fn web_service() -> Value {
    json!({
        "name": "web-prod",
        "environment": "prod",
        "cluster": "prod-cluster",
        "count": 3,
        "family": "web-prod",
        "network_mode": "awsvpc",
        "launch_type": "FARGATE",
        "execution_role": "arn:aws:iam::1:role/exec",
        "cpu": 512,
        "vpc_configuration": {
            "subnets": ["subnet-a", "subnet-b"],
            "security_groups": ["sg-1"],
            "public_ip": false
        },
        "load_balancer": {
            "target_group_arn": "arn:aws:elasticloadbalancing:tg/web",
            "container_name": "web",
            "container_port": 8000
        },
        "containers": [{
            "name": "web",
            "image": "registry/web:1.2.0",
            "cpu": 256,
            "memory": 512,
            "ports": ["8000"],
            "environment": {"DEBUG": "false"}
        }]
    })
}

#[test]
fn defaults_cover_every_entity_kind() {
    let registry = AdapterRegistry::with_defaults();
    assert_eq!(registry.len(), EntityKind::ALL.len());
    for kind in EntityKind::ALL {
        assert!(registry.contains(kind, DECKHAND_SOURCE), "{kind} missing");
    }
}

#[test]
fn registry_miss_names_entity_and_source() {
    let registry = AdapterRegistry::with_defaults();
    let err = registry
        .convert(EntityKind::Service, "compose", &web_service(), &AdapterContext::default())
        .unwrap_err();
    assert!(matches!(err, DeckhandError::AdapterNotFound { .. }));
    let text = err.to_string();
    assert!(text.contains("Service") && text.contains("compose"));
}

#[test]
fn fargate_service_and_task_definition() {
    let registry = AdapterRegistry::with_defaults();
    let ctx = AdapterContext {
        secrets: vec![Secret {
            name: "DB_PASSWORD".into(),
            value_from: "arn:aws:ssm:::parameter/prod/db".into(),
        }],
        ..AdapterContext::default()
    };
    let converted = registry
        .convert(EntityKind::Service, DECKHAND_SOURCE, &web_service(), &ctx)
        .unwrap();

    let payload = &converted.payload;
    assert_eq!(payload["serviceName"], "web-prod");
    assert_eq!(payload["launchType"], "FARGATE");
    assert_eq!(payload["platformVersion"], "LATEST");
    assert_eq!(payload["desiredCount"], 3);
    assert_eq!(
        payload["networkConfiguration"]["awsvpcConfiguration"]["assignPublicIp"],
        "DISABLED"
    );
    assert_eq!(
        payload["loadBalancers"][0]["targetGroupArn"],
        "arn:aws:elasticloadbalancing:tg/web"
    );
    assert!(payload["clientToken"].as_str().unwrap().len() <= 35);

    let td = converted.entity("task_definition").unwrap();
    assert_eq!(td.payload["requiresCompatibilities"], json!(["FARGATE"]));
    assert_eq!(td.payload["networkMode"], "awsvpc");
    let container = &td.payload["containerDefinitions"][0];
    assert_eq!(container["portMappings"][0]["containerPort"], 8000);
    let env: Vec<&str> = container["environment"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["name"].as_str())
        .collect();
    assert!(env.contains(&"DEBUG"));
    assert!(env.contains(&"DECKHAND_SERVICE_NAME"));
    assert!(env.contains(&"DECKHAND_CLUSTER_NAME"));
    assert_eq!(container["secrets"][0]["valueFrom"], "arn:aws:ssm:::parameter/prod/db");

    assert_eq!(converted.value("tags").unwrap(), &json!({"Environment": "prod"}));
}

#[test]
fn fargate_without_execution_role_is_rejected() {
    let mut fragment = web_service();
    fragment.as_object_mut().unwrap().remove("execution_role");
    let err = AdapterRegistry::with_defaults()
        .convert(EntityKind::TaskDefinition, DECKHAND_SOURCE, &fragment, &AdapterContext::default())
        .unwrap_err();
    assert!(matches!(err, DeckhandError::Schema { ref field, .. } if field == "execution_role"));
}

#[test]
fn scheduled_task_yields_rule_and_target() {
    let fragment = json!({
        "name": "nightly-report",
        "cluster": "prod-cluster",
        "schedule": "cron(0 3 * * ? *)",
        "schedule_role": "arn:aws:iam::1:role/events",
        "containers": [{"name": "report", "image": "registry/report:4", "command": "report --all"}]
    });
    let converted = AdapterRegistry::with_defaults()
        .convert(EntityKind::StandaloneTask, DECKHAND_SOURCE, &fragment, &AdapterContext::default())
        .unwrap();

    let rule = converted.entity("schedule").unwrap();
    assert_eq!(rule.payload["Name"], "deckhand-nightly-report");
    assert_eq!(rule.payload["ScheduleExpression"], "cron(0 3 * * ? *)");
    assert_eq!(rule.payload["State"], "ENABLED");

    let td = converted.entity("task_definition").unwrap();
    assert_eq!(
        td.payload["containerDefinitions"][0]["command"],
        json!(["report", "--all"])
    );
}

#[test]
fn tunnel_is_copied_verbatim() {
    let fragment = json!({"name": "db", "service": "web-prod", "host": "db.internal", "port": 5432, "local_port": 8888});
    let converted = AdapterRegistry::with_defaults()
        .convert(EntityKind::SshTunnel, DECKHAND_SOURCE, &fragment, &AdapterContext::default())
        .unwrap();
    assert_eq!(Value::Object(converted.payload), fragment);
}

struct Passthrough;

impl Adapter for Passthrough {
    fn convert(&self, fragment: &Value, _ctx: &AdapterContext) -> Result<Converted, DeckhandError> {
        let mut payload = Map::new();
        payload.insert("raw".into(), fragment.clone());
        Ok(Converted::new(payload))
    }
}

#[test]
fn custom_source_types_can_be_registered() {
    let mut registry = AdapterRegistry::with_defaults();
    registry.register(EntityKind::Service, "compose", Arc::new(Passthrough));
    let converted = registry
        .convert(EntityKind::Service, "compose", &json!({"image": "x"}), &AdapterContext::default())
        .unwrap();
    assert_eq!(converted.payload["raw"]["image"], "x");
    assert!(registry.contains(EntityKind::Service, DECKHAND_SOURCE));
}
