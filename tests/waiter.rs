//! Waiter poll loop against scripted operations, with virtual time.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use deckhand::error::{DeckhandError, WaiterFailureKind};
use deckhand::waiter::hooks::DeploymentStatusHook;
use deckhand::waiter::{model, HookContext, HookedWaiter, PollOperation, WaitOptions, WaiterHook, WaiterState};

/// Answers "still rolling" until call `settle_on`, then "settled".
struct RollingDeployment {
    settle_on: u32,
    calls: AtomicU32,
}

impl RollingDeployment {
    fn new(settle_on: u32) -> Self {
        Self {
            settle_on,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PollOperation for RollingDeployment {
    async fn call(&self, params: &Value) -> Result<Value, DeckhandError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let service = params["services"][0].as_str().unwrap_or("web");
        let deployments = if call >= self.settle_on {
            json!([{"status": "PRIMARY", "taskDefinition": format!("{service}:8"), "desiredCount": 2, "pendingCount": 0, "runningCount": 2}])
        } else {
            json!([
                {"status": "PRIMARY", "taskDefinition": format!("{service}:8"), "desiredCount": 2, "pendingCount": 1, "runningCount": 1},
                {"status": "ACTIVE", "taskDefinition": format!("{service}:7"), "desiredCount": 2, "pendingCount": 0, "runningCount": 1}
            ])
        };
        let running = if call >= self.settle_on { 2 } else { 1 };
        Ok(json!({
            "services": [{
                "serviceName": service,
                "status": "ACTIVE",
                "desiredCount": 2,
                "runningCount": running,
                "deployments": deployments,
                "events": [{"id": format!("e{call}"), "createdAt": format!("t{call}"), "message": format!("poll {call}")}]
            }],
            "failures": []
        }))
    }
}

#[derive(Default)]
struct Recorder(Vec<(WaiterState, u32)>);

impl WaiterHook for Recorder {
    fn on_poll(&mut self, state: WaiterState, _response: &Value, attempt: u32, _ctx: &HookContext<'_>) {
        self.0.push((state, attempt));
    }
}

fn params() -> Value {
    json!({"cluster": "prod", "services": ["web"]})
}

#[tokio::test(start_paused = true)]
async fn success_after_n_polls_notifies_each_poll() {
    let waiter = HookedWaiter::new("ServicesStable", model::services_stable(), RollingDeployment::new(4));
    let mut recorder = Recorder::default();
    let start = tokio::time::Instant::now();

    let response = waiter
        .wait(&params(), &mut [&mut recorder], WaitOptions::default())
        .await
        .unwrap();

    assert_eq!(response["services"][0]["runningCount"], 2);
    assert_eq!(
        recorder.0,
        vec![
            (WaiterState::Waiting, 1),
            (WaiterState::Waiting, 2),
            (WaiterState::Waiting, 3),
            (WaiterState::Success, 4),
        ]
    );
    assert!(start.elapsed() >= Duration::from_secs(45));
}

#[tokio::test(start_paused = true)]
async fn exhausting_attempts_times_out_once() {
    let waiter = HookedWaiter::new("ServicesStable", model::services_stable(), RollingDeployment::new(u32::MAX));
    let mut recorder = Recorder::default();
    let options = WaitOptions {
        delay: Some(Duration::from_secs(5)),
        max_attempts: Some(3),
    };

    let err = waiter.wait(&params(), &mut [&mut recorder], options).await.unwrap_err();

    let DeckhandError::Waiter(err) = err else {
        panic!("expected a waiter error");
    };
    assert_eq!(err.kind, WaiterFailureKind::Timeout);
    assert_eq!(err.reason, "Max attempts exceeded");
    assert_eq!(err.last_response["services"][0]["runningCount"], 1);
    let timeouts = recorder
        .0
        .iter()
        .filter(|(state, _)| *state == WaiterState::Timeout)
        .count();
    assert_eq!(timeouts, 1);
    assert_eq!(recorder.0.last(), Some(&(WaiterState::Timeout, 3)));
    assert_eq!(recorder.0.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn deployment_status_hook_renders_progress() {
    let waiter = HookedWaiter::new("ServicesStable", model::services_stable(), RollingDeployment::new(2));
    let mut status = DeploymentStatusHook::new(Vec::new());
    let mut recorder = Recorder::default();

    waiter
        .wait(&params(), &mut [&mut status, &mut recorder], WaitOptions::default())
        .await
        .unwrap();

    let out = String::from_utf8(status.into_inner()).unwrap();
    let out = console::strip_ansi_codes(&out);
    assert!(out.contains("Deployment status:"));
    assert!(out.contains("web:7"));
    assert!(out.contains("poll 1"));
    assert!(out.contains("Service is stable!"));
    assert_eq!(recorder.0.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn missing_service_is_a_terminal_failure() {
    struct Missing;

    #[async_trait]
    impl PollOperation for Missing {
        async fn call(&self, _params: &Value) -> Result<Value, DeckhandError> {
            Ok(json!({"services": [], "failures": [{"arn": "web", "reason": "MISSING"}]}))
        }
    }

    let waiter = HookedWaiter::new("ServicesStable", model::services_stable(), Missing);
    let err = waiter.wait(&params(), &mut [], WaitOptions::default()).await.unwrap_err();
    let DeckhandError::Waiter(err) = err else {
        panic!("expected a waiter error");
    };
    assert_eq!(err.kind, WaiterFailureKind::Failure);
    assert!(err.reason.contains("failures[].reason"));
}
