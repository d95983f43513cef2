//! Waiter definitions: acceptors, matchers and the built-in ECS waiters.
//!
//! Paths use a small dotted syntax over the response document:
//! `services[].status` reads `status` from every element of `services`.
//! A `[]` suffix projects over a list; further segments apply per element.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use super::WaiterState;

/// The state an acceptor moves the waiter to when its matcher fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorState {
    Success,
    Failure,
    Retry,
}

impl AcceptorState {
    #[must_use]
    pub const fn waiter_state(self) -> WaiterState {
        match self {
            Self::Success => WaiterState::Success,
            Self::Failure => WaiterState::Failure,
            Self::Retry => WaiterState::Waiting,
        }
    }
}

#[derive(Clone)]
pub enum Matcher {
    /// The value at `argument` equals `expected`.
    Path { argument: String, expected: Value },
    /// Every projected value equals `expected` (and there is at least one).
    PathAll { argument: String, expected: Value },
    /// At least one projected value equals `expected`.
    PathAny { argument: String, expected: Value },
    /// The response is an error: `true`/`false` for any error, or a code.
    Error { expected: Value },
    /// A named check that a path expression cannot state.
    Predicate {
        name: &'static str,
        check: fn(&Value) -> bool,
    },
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path { argument, expected } => write!(f, "path({argument} == {expected})"),
            Self::PathAll { argument, expected } => write!(f, "pathAll({argument} == {expected})"),
            Self::PathAny { argument, expected } => write!(f, "pathAny({argument} == {expected})"),
            Self::Error { expected } => write!(f, "error({expected})"),
            Self::Predicate { name, .. } => write!(f, "predicate({name})"),
        }
    }
}

impl Matcher {
    #[must_use]
    pub fn matches(&self, response: &Value) -> bool {
        match self {
            Self::Path { argument, expected } => search(argument, response).as_ref() == Some(expected),
            Self::PathAll { argument, expected } => match search(argument, response) {
                Some(Value::Array(items)) => !items.is_empty() && items.iter().all(|v| v == expected),
                _ => false,
            },
            Self::PathAny { argument, expected } => match search(argument, response) {
                Some(Value::Array(items)) => items.iter().any(|v| v == expected),
                _ => false,
            },
            Self::Error { expected } => {
                let error = response.get("Error");
                match expected {
                    Value::Bool(present) => error.is_some() == *present,
                    code => error.and_then(|e| e.get("Code")) == Some(code),
                }
            }
            Self::Predicate { check, .. } => check(response),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Acceptor {
    pub state: AcceptorState,
    pub matcher: Matcher,
}

impl Acceptor {
    #[must_use]
    pub const fn new(state: AcceptorState, matcher: Matcher) -> Self {
        Self { state, matcher }
    }

    /// Human-readable account of what matched, used in failure reasons.
    #[must_use]
    pub fn explanation(&self) -> String {
        match &self.matcher {
            Matcher::Path { argument, expected } => {
                format!("For expression \"{argument}\" we matched expected path: {expected}")
            }
            Matcher::PathAll { argument, expected } => format!(
                "For expression \"{argument}\" all members matched expected path: {expected}"
            ),
            Matcher::PathAny { argument, expected } => format!(
                "For expression \"{argument}\" we matched expected path: {expected} at least once"
            ),
            Matcher::Error { expected } => format!("Matched expected service error code: {expected}"),
            Matcher::Predicate { name, .. } => format!("Matched condition: {name}"),
        }
    }
}

/// Static configuration of one waiter kind.
#[derive(Debug, Clone)]
pub struct WaiterConfig {
    /// The poll operation, e.g. `DescribeServices`.
    pub operation: String,
    pub delay: Duration,
    pub max_attempts: u32,
    pub acceptors: Vec<Acceptor>,
}

/// Evaluate a dotted path with `[]` list projections.
///
/// Returns `None` when a non-projected segment is missing. Projections skip
/// elements where the field is missing or null.
#[must_use]
pub fn search(path: &str, document: &Value) -> Option<Value> {
    let mut current = document.clone();
    let mut projected = false;

    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let (field, flatten) = match segment.strip_suffix("[]") {
            Some(field) => (field, true),
            None => (segment, false),
        };

        if projected {
            let Value::Array(items) = current else {
                return None;
            };
            let mut next = Vec::with_capacity(items.len());
            for item in items {
                let value = if field.is_empty() {
                    Some(item)
                } else {
                    item.get(field).filter(|v| !v.is_null()).cloned()
                };
                match (value, flatten) {
                    (Some(Value::Array(inner)), true) => next.extend(inner),
                    (Some(value), _) => next.push(value),
                    (None, _) => {}
                }
            }
            current = Value::Array(next);
        } else {
            if !field.is_empty() {
                current = current.get(field)?.clone();
            }
            if flatten {
                let Value::Array(items) = current else {
                    return None;
                };
                let mut flat = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Array(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                current = Value::Array(flat);
                projected = true;
            }
        }
    }
    Some(current)
}

fn path_any(argument: &str, expected: impl Into<Value>) -> Matcher {
    Matcher::PathAny {
        argument: argument.into(),
        expected: expected.into(),
    }
}

fn path_all(argument: &str, expected: impl Into<Value>) -> Matcher {
    Matcher::PathAll {
        argument: argument.into(),
        expected: expected.into(),
    }
}

/// Every described service has exactly one deployment and is fully running.
#[must_use]
pub fn services_settled(response: &Value) -> bool {
    let Some(services) = response.get("services").and_then(Value::as_array) else {
        return false;
    };
    services.iter().all(|service| {
        let deployments = service
            .get("deployments")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        deployments == 1 && service.get("runningCount") == service.get("desiredCount")
    })
}

/// `DescribeServices` until the deployment has settled.
#[must_use]
pub fn services_stable() -> WaiterConfig {
    WaiterConfig {
        operation: "DescribeServices".into(),
        delay: Duration::from_secs(15),
        max_attempts: 40,
        acceptors: vec![
            Acceptor::new(AcceptorState::Failure, path_any("failures[].reason", "MISSING")),
            Acceptor::new(AcceptorState::Failure, path_any("services[].status", "DRAINING")),
            Acceptor::new(AcceptorState::Failure, path_any("services[].status", "INACTIVE")),
            Acceptor::new(
                AcceptorState::Success,
                Matcher::Predicate {
                    name: "one deployment, running == desired",
                    check: services_settled,
                },
            ),
        ],
    }
}

/// `DescribeServices` until the services are gone.
#[must_use]
pub fn services_inactive() -> WaiterConfig {
    WaiterConfig {
        operation: "DescribeServices".into(),
        delay: Duration::from_secs(15),
        max_attempts: 40,
        acceptors: vec![
            Acceptor::new(AcceptorState::Failure, path_any("failures[].reason", "MISSING")),
            Acceptor::new(AcceptorState::Success, path_any("services[].status", "INACTIVE")),
        ],
    }
}

/// `DescribeTasks` until every task is running.
#[must_use]
pub fn tasks_running() -> WaiterConfig {
    WaiterConfig {
        operation: "DescribeTasks".into(),
        delay: Duration::from_secs(6),
        max_attempts: 100,
        acceptors: vec![
            Acceptor::new(AcceptorState::Failure, path_any("tasks[].lastStatus", "STOPPED")),
            Acceptor::new(AcceptorState::Failure, path_any("failures[].reason", "MISSING")),
            Acceptor::new(AcceptorState::Success, path_all("tasks[].lastStatus", "RUNNING")),
        ],
    }
}

/// `DescribeTasks` until every task has stopped.
#[must_use]
pub fn tasks_stopped() -> WaiterConfig {
    WaiterConfig {
        operation: "DescribeTasks".into(),
        delay: Duration::from_secs(6),
        max_attempts: 100,
        acceptors: vec![Acceptor::new(
            AcceptorState::Success,
            path_all("tasks[].lastStatus", "STOPPED"),
        )],
    }
}

/// Look up a built-in waiter by its snake_case name.
#[must_use]
pub fn builtin(name: &str) -> Option<WaiterConfig> {
    match name {
        "services_stable" => Some(services_stable()),
        "services_inactive" => Some(services_inactive()),
        "tasks_running" => Some(tasks_running()),
        "tasks_stopped" => Some(tasks_stopped()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_projects_lists() {
        let doc = json!({
            "services": [
                {"status": "ACTIVE", "deployments": [{"id": "a"}, {"id": "b"}]},
                {"status": "DRAINING", "deployments": [{"id": "c"}]},
                {"deployments": []}
            ]
        });
        assert_eq!(
            search("services[].status", &doc),
            Some(json!(["ACTIVE", "DRAINING"]))
        );
        assert_eq!(
            search("services[].deployments[].id", &doc),
            Some(json!(["a", "b", "c"]))
        );
        assert_eq!(search("services", &doc).map(|v| v.as_array().unwrap().len()), Some(3));
        assert_eq!(search("missing.path", &doc), None);
    }

    #[test]
    fn path_all_needs_at_least_one_member() {
        let matcher = path_all("tasks[].lastStatus", "RUNNING");
        assert!(!matcher.matches(&json!({"tasks": []})));
        assert!(matcher.matches(&json!({"tasks": [{"lastStatus": "RUNNING"}]})));
        assert!(!matcher.matches(&json!({"tasks": [{"lastStatus": "RUNNING"}, {"lastStatus": "PENDING"}]})));
    }

    #[test]
    fn error_matcher_checks_code_or_presence() {
        let response = json!({"Error": {"Code": "ClusterNotFoundException", "Message": "nope"}});
        assert!(Matcher::Error { expected: json!(true) }.matches(&response));
        assert!(Matcher::Error { expected: json!("ClusterNotFoundException") }.matches(&response));
        assert!(!Matcher::Error { expected: json!("Throttling") }.matches(&response));
        assert!(Matcher::Error { expected: json!(false) }.matches(&json!({})));
    }

    #[test]
    fn services_settle_on_single_full_deployment() {
        let settled = json!({"services": [
            {"deployments": [{}], "runningCount": 2, "desiredCount": 2}
        ]});
        let rolling = json!({"services": [
            {"deployments": [{}, {}], "runningCount": 2, "desiredCount": 2}
        ]});
        assert!(services_settled(&settled));
        assert!(!services_settled(&rolling));
    }

    #[test]
    fn builtin_waiters_have_documented_timings() {
        let stable = builtin("services_stable").unwrap();
        assert_eq!(stable.delay, Duration::from_secs(15));
        assert_eq!(stable.max_attempts, 40);
        let running = builtin("tasks_running").unwrap();
        assert_eq!(running.delay, Duration::from_secs(6));
        assert_eq!(running.max_attempts, 100);
        assert!(builtin("bucket_exists").is_none());
    }
}
