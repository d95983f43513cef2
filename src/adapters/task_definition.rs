//! Task definitions and their container definitions.
//!
//! Produces the `RegisterTaskDefinition` request shape. On FARGATE the task
//! level `cpu` and `memory` must be one of the platform's fixed sizes; when
//! they are not given they are derived from the container totals.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use heck::ToLowerCamelCase;
use regex::Regex;
use serde_json::{json, Map, Value};

use super::{as_int, Adapter, AdapterContext, Converted, Fragment};
use crate::error::DeckhandError;

static PORTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<host>\d+)(?::(?P<container>\d+)(?:/(?P<protocol>udp|tcp))?)?$")
        .expect("static regex is valid")
});

static MOUNT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("static regex is valid"));

pub const FARGATE_CPU: [i64; 5] = [256, 512, 1024, 2048, 4096];

/// Valid FARGATE memory sizes for a task cpu size.
#[must_use]
pub fn fargate_memory(cpu: i64) -> Vec<i64> {
    match cpu {
        256 => vec![512, 1024, 2048],
        512 => (1..=4).map(|gb| gb * 1024).collect(),
        1024 => (2..=8).map(|gb| gb * 1024).collect(),
        2048 => (4..=16).map(|gb| gb * 1024).collect(),
        4096 => (8..=30).map(|gb| gb * 1024).collect(),
        _ => Vec::new(),
    }
}

const CONTAINER_DEFAULT_CPU: i64 = 256;
const CONTAINER_DEFAULT_MEMORY: i64 = 512;

/// Container keys handled explicitly; everything else is passed through camel-cased.
const CONTAINER_KEYS: &[&str] = &[
    "name",
    "image",
    "essential",
    "cpu",
    "memory",
    "memoryReservation",
    "memory_reservation",
    "ports",
    "command",
    "entrypoint",
    "ulimits",
    "environment",
    "volumes",
    "labels",
    "logging",
    "extra_hosts",
    "cap_add",
    "cap_drop",
    "tmpfs",
];

pub struct TaskDefinitionAdapter;

impl Adapter for TaskDefinitionAdapter {
    fn convert(&self, fragment: &Value, ctx: &AdapterContext) -> Result<Converted, DeckhandError> {
        Ok(Converted::new(build(fragment, ctx)?))
    }
}

/// Build the task definition payload. Used directly by the service and task adapters.
pub(crate) fn build(fragment: &Value, ctx: &AdapterContext) -> Result<Map<String, Value>, DeckhandError> {
    let name = fragment
        .get("family")
        .or_else(|| fragment.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("?");
    let f = Fragment::new(format!("TaskDefinition({name})"), fragment)?;

    let mut data = Map::new();
    data.insert("family".into(), Value::from(f.require_str("family")?));
    data.insert(
        "networkMode".into(),
        Value::from(f.str_or("network_mode", "bridge")?),
    );

    let fargate = f.str_or("launch_type", "EC2")? == "FARGATE";
    if fargate {
        data.insert("requiresCompatibilities".into(), json!(["FARGATE"]));
    }
    f.copy(&mut data, "task_role_arn", "taskRoleArn");
    f.copy(&mut data, "execution_role", "executionRoleArn");
    if fargate && f.str("execution_role")?.is_none() {
        return Err(f.error(
            "execution_role",
            "if your launch_type is \"FARGATE\", you must supply \"execution_role\"",
        ));
    }

    let mut volumes = volumes(&f)?;

    let containers = f
        .get("containers")
        .and_then(Value::as_array)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            f.error(
                "containers",
                "you must define at least one container in your task definition",
            )
        })?;
    let mut definitions = Vec::with_capacity(containers.len());
    for container in containers {
        definitions.push(container_definition(container, &mut volumes, ctx)?);
    }

    if !volumes.is_empty() {
        data.insert("volumes".into(), Value::Array(volumes));
    }
    task_sizes(&f, fargate, &definitions, &mut data)?;
    data.insert(
        "containerDefinitions".into(),
        Value::Array(definitions.into_iter().map(Value::Object).collect()),
    );
    Ok(data)
}

fn volumes(f: &Fragment<'_>) -> Result<Vec<Value>, DeckhandError> {
    let mut seen = BTreeSet::new();
    let mut volumes = Vec::new();
    let Some(items) = f.get("volumes").and_then(Value::as_array) else {
        return Ok(volumes);
    };
    for item in items {
        let v = Fragment::new(format!("{}.volumes", f.entity()), item)?;
        let name = v.require_str("name")?;
        if !seen.insert(name.to_string()) {
            continue;
        }
        let kinds = ["path", "config", "efs_config"]
            .iter()
            .filter(|k| v.has(k))
            .count();
        if kinds != 1 {
            return Err(v.error(
                name,
                "when defining volumes, specify only one of \"path\", \"config\" or \"efs_config\"",
            ));
        }
        let mut volume = Map::new();
        volume.insert("name".into(), Value::from(name));
        if let Some(path) = v.get("path") {
            volume.insert("host".into(), json!({ "sourcePath": path }));
        } else if let Some(config) = v.get("config") {
            volume.insert("dockerVolumeConfiguration".into(), config.clone());
        } else if let Some(efs) = v.get("efs_config") {
            let efs = Fragment::new(format!("{}.efs_config", v.entity()), efs)?;
            let mut config = Map::new();
            config.insert(
                "fileSystemId".into(),
                efs.require("file_system_id")?.clone(),
            );
            efs.copy(&mut config, "root_directory", "rootDirectory");
            volume.insert("efsVolumeConfiguration".into(), Value::Object(config));
        }
        volumes.push(Value::Object(volume));
    }
    Ok(volumes)
}

fn container_definition(
    source: &Value,
    task_volumes: &mut Vec<Value>,
    ctx: &AdapterContext,
) -> Result<Map<String, Value>, DeckhandError> {
    let name = source.get("name").and_then(Value::as_str).unwrap_or("?");
    let c = Fragment::new(format!("ContainerDefinition({name})"), source)?;

    let mut data = Map::new();
    data.insert("name".into(), Value::from(c.require_str("name")?));
    data.insert("image".into(), Value::from(c.require_str("image")?));
    data.insert(
        "essential".into(),
        c.get("essential").cloned().unwrap_or(Value::Bool(true)),
    );
    data.insert(
        "cpu".into(),
        Value::from(c.int("cpu")?.unwrap_or(CONTAINER_DEFAULT_CPU)),
    );
    let reservation = match c.int("memoryReservation")? {
        Some(r) => Some(r),
        None => c.int("memory_reservation")?,
    };
    if let Some(reservation) = reservation {
        data.insert("memoryReservation".into(), Value::from(reservation));
    }
    match c.int("memory")? {
        Some(memory) => {
            data.insert("memory".into(), Value::from(memory));
        }
        None if reservation.is_none() => {
            data.insert("memory".into(), Value::from(CONTAINER_DEFAULT_MEMORY));
        }
        None => {}
    }

    if let Some(ports) = c.get("ports") {
        data.insert("portMappings".into(), port_mappings(&c, ports)?);
    }
    for key in ["command", "entrypoint"] {
        if let Some(text) = c.str(key)? {
            let words = shlex::split(text)
                .ok_or_else(|| c.error(key, "has unbalanced quotes"))?;
            data.insert(key.to_string(), json!(words));
        }
    }
    if let Some(ulimits) = c.get("ulimits") {
        data.insert("ulimits".into(), ulimit_list(&c, ulimits)?);
    }

    let environment = environment(&c, ctx)?;
    if !environment.is_empty() {
        data.insert(
            "environment".into(),
            Value::Array(
                environment
                    .into_iter()
                    .map(|(name, value)| json!({ "name": name, "value": value }))
                    .collect(),
            ),
        );
    }
    if let Some(volumes) = c.get("volumes") {
        data.insert("mountPoints".into(), mount_points(&c, volumes, task_volumes)?);
    }
    if let Some(labels) = c.get("labels") {
        data.insert("dockerLabels".into(), key_values(&c, "labels", labels)?);
    }
    if let Some(logging) = c.get("logging") {
        let logging = Fragment::new(format!("{}.logging", c.entity()), logging)?;
        let mut config = Map::new();
        config.insert(
            "logDriver".into(),
            Value::from(logging.require_str("driver").map_err(|_| {
                c.error("logging", "logging: block must contain \"driver\"")
            })?),
        );
        logging.copy(&mut config, "options", "options");
        data.insert("logConfiguration".into(), Value::Object(config));
    }
    if let Some(hosts) = c.get("extra_hosts").and_then(Value::as_array) {
        let mut extra = Vec::with_capacity(hosts.len());
        for host in hosts {
            let (hostname, ip) = host
                .as_str()
                .and_then(|h| h.split_once(':'))
                .ok_or_else(|| c.error("extra_hosts", "entries must look like HOST:IP"))?;
            extra.push(json!({ "hostname": hostname, "ipAddress": ip }));
        }
        data.insert("extraHosts".into(), Value::Array(extra));
    }
    if let Some(linux) = linux_parameters(&c)? {
        data.insert("linuxParameters".into(), linux);
    }
    if !ctx.secrets.is_empty() {
        data.insert("secrets".into(), json!(ctx.secrets));
    }

    if let Some(map) = source.as_object() {
        for (key, value) in map {
            if !CONTAINER_KEYS.contains(&key.as_str()) && !value.is_null() {
                data.insert(key.to_lower_camel_case(), value.clone());
            }
        }
    }
    Ok(data)
}

/// `"80"`, `"8443:443"` and `"8125:8125/udp"` style port mappings.
fn port_mappings(c: &Fragment<'_>, ports: &Value) -> Result<Value, DeckhandError> {
    let items = ports
        .as_array()
        .ok_or_else(|| c.error("ports", "must be a list"))?;
    let mut mappings = Vec::with_capacity(items.len());
    for item in items {
        let text = match item {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => return Err(c.error("ports", format!("{item} is not a valid port mapping"))),
        };
        let caps = PORTS_RE
            .captures(text.trim())
            .ok_or_else(|| c.error("ports", format!("{text} is not a valid port mapping")))?;
        let port = |group: &str| caps.name(group).and_then(|m| m.as_str().parse::<u16>().ok());
        let protocol = caps.name("protocol").map_or("tcp", |m| m.as_str());
        let mapping = match (port("host"), port("container")) {
            (Some(host), Some(container)) => {
                json!({ "containerPort": container, "hostPort": host, "protocol": protocol })
            }
            (Some(container), None) => json!({ "containerPort": container, "protocol": protocol }),
            _ => return Err(c.error("ports", format!("{text} is not a valid port mapping"))),
        };
        mappings.push(mapping);
    }
    Ok(Value::Array(mappings))
}

fn ulimit_list(c: &Fragment<'_>, ulimits: &Value) -> Result<Value, DeckhandError> {
    let map = ulimits
        .as_object()
        .ok_or_else(|| c.error("ulimits", "must be a mapping"))?;
    let mut list = Vec::with_capacity(map.len());
    for (name, limit) in map {
        let (soft, hard) = match limit {
            Value::Object(bounds) => (
                bounds.get("soft").and_then(as_int),
                bounds.get("hard").and_then(as_int),
            ),
            other => (as_int(other), as_int(other)),
        };
        let (Some(soft), Some(hard)) = (soft, hard) else {
            return Err(c.error(&format!("ulimits.{name}"), "limits must be integers"));
        };
        list.push(json!({ "name": name, "softLimit": soft, "hardLimit": hard }));
    }
    Ok(Value::Array(list))
}

/// `KEY=VALUE` lists or mappings, as ordered pairs.
fn key_values(c: &Fragment<'_>, field: &str, value: &Value) -> Result<Value, DeckhandError> {
    let mut map = Map::new();
    match value {
        Value::Object(source) => {
            for (k, v) in source {
                map.insert(k.clone(), Value::from(scalar_text(v)));
            }
        }
        Value::Array(items) => {
            for item in items {
                let (k, v) = item
                    .as_str()
                    .and_then(|s| s.split_once('='))
                    .ok_or_else(|| c.error(field, "list entries must look like KEY=VALUE"))?;
                map.insert(k.to_string(), Value::from(v));
            }
        }
        _ => return Err(c.error(field, "must be a list or a mapping")),
    }
    Ok(Value::Object(map))
}

fn environment(c: &Fragment<'_>, ctx: &AdapterContext) -> Result<Vec<(String, String)>, DeckhandError> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    if let Some(source) = c.get("environment") {
        if let Value::Object(map) = key_values(c, "environment", source)? {
            pairs.extend(map.into_iter().map(|(k, v)| (k, scalar_text(&v))));
        }
    }
    for (key, value) in &ctx.extra_environment {
        match pairs.iter_mut().find(|(k, _)| k == key) {
            Some(existing) => existing.1.clone_from(value),
            None => pairs.push((key.clone(), value.clone())),
        }
    }
    Ok(pairs)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `host/path:/container/path[:ro]` or `volume-name:/container/path`.
///
/// Host paths without a matching task volume get one added.
fn mount_points(
    c: &Fragment<'_>,
    volumes: &Value,
    task_volumes: &mut Vec<Value>,
) -> Result<Value, DeckhandError> {
    let items = volumes
        .as_array()
        .ok_or_else(|| c.error("volumes", "must be a list"))?;
    let mut points = Vec::with_capacity(items.len());
    for item in items {
        let spec = item
            .as_str()
            .ok_or_else(|| c.error("volumes", "entries must be strings"))?;
        let mut fields = spec.split(':');
        let (Some(host), Some(container)) = (fields.next(), fields.next()) else {
            return Err(c.error("volumes", format!("'{spec}' must look like SOURCE:CONTAINER_PATH")));
        };
        let read_only = fields.next() == Some("ro");
        let mut name = MOUNT_NAME_RE.replace_all(host, "_").into_owned();
        name.truncate(254);
        let known = task_volumes
            .iter()
            .any(|v| v.get("name").and_then(Value::as_str) == Some(name.as_str()));
        if !known {
            task_volumes.push(json!({ "name": name, "host": { "sourcePath": host } }));
        }
        points.push(json!({
            "sourceVolume": name,
            "containerPath": container,
            "readOnly": read_only,
        }));
    }
    Ok(Value::Array(points))
}

fn linux_parameters(c: &Fragment<'_>) -> Result<Option<Value>, DeckhandError> {
    let mut params = Map::new();
    let mut capabilities = Map::new();
    c.copy(&mut capabilities, "cap_add", "add");
    c.copy(&mut capabilities, "cap_drop", "drop");
    if !capabilities.is_empty() {
        params.insert("capabilities".into(), Value::Object(capabilities));
    }
    if let Some(mounts) = c.get("tmpfs").and_then(Value::as_array) {
        let mut tmpfs = Vec::with_capacity(mounts.len());
        for mount in mounts {
            let m = Fragment::new(format!("{}.tmpfs", c.entity()), mount)?;
            let mut entry = Map::new();
            entry.insert("containerPath".into(), m.require("container_path")?.clone());
            entry.insert("size".into(), m.require("size")?.clone());
            if let Some(options) = m.get("mount_options").filter(|o| o.is_array()) {
                entry.insert("mountOptions".into(), options.clone());
            }
            tmpfs.push(Value::Object(entry));
        }
        params.insert("tmpfs".into(), Value::Array(tmpfs));
    }
    Ok((!params.is_empty()).then_some(Value::Object(params)))
}

fn container_total(containers: &[Map<String, Value>], key: &str, fallback: Option<&str>) -> i64 {
    containers
        .iter()
        .filter_map(|c| {
            c.get(key)
                .or_else(|| fallback.and_then(|f| c.get(f)))
                .and_then(Value::as_i64)
        })
        .sum()
}

/// Set task-level `cpu` and `memory` (as strings, as the API expects).
fn task_sizes(
    f: &Fragment<'_>,
    fargate: bool,
    containers: &[Map<String, Value>],
    data: &mut Map<String, Value>,
) -> Result<(), DeckhandError> {
    let cpu_required = container_total(containers, "cpu", None);
    let memory_required = container_total(containers, "memory", Some("memoryReservation"));

    let cpu = match (f.int("cpu")?, fargate) {
        (Some(cpu), true) if !FARGATE_CPU.contains(&cpu) => {
            return Err(f.error(
                "cpu",
                format!(
                    "task cpu of {cpu} is not valid for FARGATE tasks; choose one of {}",
                    join(&FARGATE_CPU)
                ),
            ));
        }
        (Some(cpu), _) => Some(cpu),
        (None, true) => Some(
            FARGATE_CPU
                .into_iter()
                .find(|size| *size >= cpu_required)
                .ok_or_else(|| {
                    f.error(
                        "cpu",
                        format!("containers need {cpu_required} cpu units, more than FARGATE allows"),
                    )
                })?,
        ),
        (None, false) => None,
    };
    if let Some(cpu) = cpu {
        if cpu < cpu_required {
            return Err(f.error(
                "cpu",
                format!("task cpu is {cpu} but your container cpu sums to {cpu_required}"),
            ));
        }
        data.insert("cpu".into(), Value::from(cpu.to_string()));
    }

    let memory = match (f.int("memory")?, fargate.then_some(cpu).flatten()) {
        (Some(memory), Some(cpu)) => {
            let valid = fargate_memory(cpu);
            if !valid.contains(&memory) {
                return Err(f.error(
                    "memory",
                    format!(
                        "with FARGATE task cpu={cpu}, task memory of {memory}MB is not valid; \
                         valid values are {}",
                        join(&valid)
                    ),
                ));
            }
            Some(memory)
        }
        (Some(memory), None) => Some(memory),
        (None, Some(cpu)) => Some(
            fargate_memory(cpu)
                .into_iter()
                .find(|size| *size >= memory_required)
                .ok_or_else(|| {
                    f.error(
                        "memory",
                        format!(
                            "containers need {memory_required}MB, more than FARGATE task cpu={cpu} allows"
                        ),
                    )
                })?,
        ),
        (None, None) => None,
    };
    if let Some(memory) = memory {
        if memory < memory_required {
            return Err(f.error(
                "memory",
                format!(
                    "task memory is {memory}MB but your container memory sums to {memory_required}MB"
                ),
            ));
        }
        data.insert("memory".into(), Value::from(memory.to_string()));
    }
    Ok(())
}

fn join(values: &[i64]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Secret;

    fn convert(fragment: &Value) -> Result<Map<String, Value>, DeckhandError> {
        build(fragment, &AdapterContext::default())
    }

    fn web() -> Value {
        json!({
            "family": "web",
            "containers": [{
                "name": "web",
                "image": "nginx:1.25",
                "ports": ["80", "8443:443", 8125, "53:53/udp"],
                "environment": ["DEBUG=false", "URL=https://x?a=b"],
                "command": "gunicorn -b ':8000' app:wsgi",
                "volumes": ["/var/log:/logs:ro"],
                "working_directory": "/srv"
            }]
        })
    }

    #[test]
    fn defaults_and_container_mapping() {
        let data = convert(&web()).unwrap();
        assert_eq!(data["networkMode"], "bridge");
        assert!(data.get("requiresCompatibilities").is_none());

        let c = &data["containerDefinitions"][0];
        assert_eq!(c["essential"], true);
        assert_eq!(c["cpu"], 256);
        assert_eq!(c["memory"], 512);
        assert_eq!(c["workingDirectory"], "/srv");
        assert_eq!(c["command"], json!(["gunicorn", "-b", ":8000", "app:wsgi"]));
        assert_eq!(
            c["portMappings"],
            json!([
                {"containerPort": 80, "protocol": "tcp"},
                {"containerPort": 443, "hostPort": 8443, "protocol": "tcp"},
                {"containerPort": 8125, "protocol": "tcp"},
                {"containerPort": 53, "hostPort": 53, "protocol": "udp"}
            ])
        );
        assert_eq!(
            c["environment"],
            json!([{"name": "DEBUG", "value": "false"}, {"name": "URL", "value": "https://x?a=b"}])
        );
        assert_eq!(c["mountPoints"][0]["sourceVolume"], "_var_log");
        assert_eq!(c["mountPoints"][0]["readOnly"], true);
        assert_eq!(data["volumes"][0]["host"]["sourcePath"], "/var/log");
    }

    #[test]
    fn fargate_requires_execution_role() {
        let mut fragment = web();
        fragment["launch_type"] = json!("FARGATE");
        let err = convert(&fragment).unwrap_err().to_string();
        assert!(err.contains("execution_role"));
    }

    #[test]
    fn fargate_sizes_are_derived_from_containers() {
        let mut fragment = web();
        fragment["launch_type"] = json!("FARGATE");
        fragment["execution_role"] = json!("arn:aws:iam::1:role/exec");
        fragment["containers"][0]["cpu"] = json!(300);
        fragment["containers"][0]["memory"] = json!(1500);

        let data = convert(&fragment).unwrap();
        assert_eq!(data["requiresCompatibilities"], json!(["FARGATE"]));
        assert_eq!(data["cpu"], "512");
        assert_eq!(data["memory"], "2048");
    }

    #[test]
    fn fargate_rejects_invalid_task_cpu() {
        let mut fragment = web();
        fragment["launch_type"] = json!("FARGATE");
        fragment["execution_role"] = json!("exec");
        fragment["cpu"] = json!(300);
        assert!(convert(&fragment).unwrap_err().to_string().contains("not valid"));
    }

    #[test]
    fn containers_are_required() {
        let err = convert(&json!({"family": "empty"})).unwrap_err().to_string();
        assert!(err.contains("at least one container"));
    }

    #[test]
    fn volume_kinds_are_exclusive() {
        let mut fragment = web();
        fragment["volumes"] = json!([{"name": "data", "path": "/d", "config": {"scope": "task"}}]);
        assert!(convert(&fragment).unwrap_err().to_string().contains("only one of"));
    }

    #[test]
    fn context_secrets_and_environment_reach_every_container() {
        let ctx = AdapterContext {
            secrets: vec![Secret {
                name: "DB_PASSWORD".into(),
                value_from: "arn:ssm:db".into(),
            }],
            extra_environment: vec![("DEBUG".into(), "true".into()), ("REGION".into(), "eu".into())],
            ..AdapterContext::default()
        };
        let data = build(&web(), &ctx).unwrap();
        let c = &data["containerDefinitions"][0];
        assert_eq!(c["secrets"], json!([{"name": "DB_PASSWORD", "valueFrom": "arn:ssm:db"}]));
        assert_eq!(c["environment"][0], json!({"name": "DEBUG", "value": "true"}));
        assert_eq!(c["environment"][2], json!({"name": "REGION", "value": "eu"}));
    }
}
