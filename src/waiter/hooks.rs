//! Built-in waiter hooks.

use std::collections::HashSet;
use std::io::Write;

use console::style;
use serde_json::Value;

use super::{HookContext, WaiterHook, WaiterState};

const RULE_WIDTH: usize = 72;
const EVENT_WIDTH: usize = 80;

/// Prints deployment progress for the `services_stable` and
/// `services_inactive` waiters from their `DescribeServices` responses.
///
/// Events already printed on an earlier poll are not repeated.
pub struct DeploymentStatusHook<W: Write> {
    out: W,
    seen_events: HashSet<String>,
}

impl<W: Write> DeploymentStatusHook<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            seen_events: HashSet::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn deployments(&mut self, service: &Value) -> std::io::Result<()> {
        writeln!(self.out, "\n\n{}", style("Deployment status:").cyan())?;
        writeln!(self.out, "{}\n", style("------------------").cyan())?;
        writeln!(
            self.out,
            "{:<10} {:<50} {:>8} {:>8} {:>8}",
            "Status", "Task def", "Desired", "Pending", "Running"
        )?;
        let empty = Vec::new();
        let deployments = service
            .get("deployments")
            .and_then(Value::as_array)
            .unwrap_or(&empty);
        for d in deployments {
            let field = |key: &str| match d.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "-".to_string(),
            };
            let status = field("status");
            let row = format!(
                "{:<10} {:<50} {:>8} {:>8} {:>8}",
                status,
                field("taskDefinition"),
                field("desiredCount"),
                field("pendingCount"),
                field("runningCount")
            );
            let row = match status.as_str() {
                "PRIMARY" => style(row).green(),
                "ACTIVE" => style(row).yellow(),
                _ => style(row).white(),
            };
            writeln!(self.out, "{row}")?;
        }
        Ok(())
    }

    fn events(&mut self, service: &Value) -> std::io::Result<()> {
        writeln!(self.out, "\n\n{}", style("Service events:").cyan())?;
        writeln!(self.out, "{}\n", style("---------------").cyan())?;
        let Some(events) = service.get("events").and_then(Value::as_array) else {
            return Ok(());
        };
        for event in events {
            let message = event.get("message").and_then(Value::as_str).unwrap_or("");
            let created = match event.get("createdAt") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            let id = event
                .get("id")
                .and_then(Value::as_str)
                .map_or_else(|| format!("{created}|{message}"), str::to_owned);
            if !self.seen_events.insert(id) {
                continue;
            }
            let wrapped = wrap(message, EVENT_WIDTH).join(&format!("\n{:<26}", ""));
            writeln!(self.out, "{}", style(format!("{created:<25} {wrapped}")).yellow())?;
        }
        Ok(())
    }

    fn write(&mut self, state: WaiterState, response: &Value) -> std::io::Result<()> {
        match state {
            WaiterState::Waiting => {
                let service = response
                    .get("services")
                    .and_then(|s| s.get(0))
                    .cloned()
                    .unwrap_or(Value::Null);
                self.deployments(&service)?;
                self.events(&service)?;
                writeln!(self.out)?;
                writeln!(self.out, "{}", style("=".repeat(RULE_WIDTH)).white().on_yellow())?;
            }
            WaiterState::Success => {
                writeln!(self.out, "\n\n{}", style("Service is stable!").green())?;
            }
            WaiterState::Failure | WaiterState::Error => {
                writeln!(self.out, "\n\n{}", style("Service failed to stabilize!").red())?;
            }
            WaiterState::Timeout => {
                writeln!(
                    self.out,
                    "\n\n{}\n",
                    style("Timed out waiting for the service to stabilize!").red()
                )?;
                writeln!(
                    self.out,
                    "NOTE: this does not necessarily mean your deployment failed: it may still be \
                     progressing, check the ECS console to be sure."
                )?;
            }
        }
        self.out.flush()
    }
}

impl<W: Write> WaiterHook for DeploymentStatusHook<W> {
    fn on_poll(&mut self, state: WaiterState, response: &Value, _attempt: u32, _ctx: &HookContext<'_>) {
        if let Err(e) = self.write(state, response) {
            tracing::warn!(error = %e, "could not write deployment status");
        }
    }
}

/// Greedy word wrap.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

/// Logs every poll through `tracing`.
#[derive(Debug, Default)]
pub struct TracingHook;

impl WaiterHook for TracingHook {
    fn on_poll(&mut self, state: WaiterState, _response: &Value, attempt: u32, ctx: &HookContext<'_>) {
        match state {
            WaiterState::Waiting | WaiterState::Success => tracing::info!(
                waiter = ctx.name,
                operation = %ctx.config.operation,
                attempt,
                max_attempts = ctx.max_attempts,
                %state,
                "waiter poll"
            ),
            _ => tracing::warn!(
                waiter = ctx.name,
                operation = %ctx.config.operation,
                attempt,
                max_attempts = ctx.max_attempts,
                %state,
                "waiter poll"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waiter::model;
    use serde_json::json;
    use std::time::Duration;

    fn ctx<'a>(config: &'a model::WaiterConfig, params: &'a Value) -> HookContext<'a> {
        HookContext {
            name: "ServicesStable",
            config,
            delay: Duration::from_secs(15),
            max_attempts: 40,
            params,
        }
    }

    fn response(events: Value) -> Value {
        json!({"services": [{
            "deployments": [
                {"status": "PRIMARY", "taskDefinition": "web:7", "desiredCount": 2, "pendingCount": 1, "runningCount": 1},
                {"status": "ACTIVE", "taskDefinition": "web:6", "desiredCount": 2, "pendingCount": 0, "runningCount": 1}
            ],
            "events": events
        }]})
    }

    fn render(hook: DeploymentStatusHook<Vec<u8>>) -> String {
        console::strip_ansi_codes(&String::from_utf8(hook.into_inner()).unwrap()).into_owned()
    }

    #[test]
    fn waiting_prints_deployments_and_new_events_once() {
        let config = model::services_stable();
        let params = json!({"cluster": "prod", "services": ["web"]});
        let ctx = ctx(&config, &params);
        let mut hook = DeploymentStatusHook::new(Vec::new());

        let first = response(json!([{"id": "e1", "createdAt": "2026-01-01T10:00:00Z", "message": "started 1 task"}]));
        hook.on_poll(WaiterState::Waiting, &first, 1, &ctx);
        let second = response(json!([
            {"id": "e2", "createdAt": "2026-01-01T10:00:15Z", "message": "registered 1 target"},
            {"id": "e1", "createdAt": "2026-01-01T10:00:00Z", "message": "started 1 task"}
        ]));
        hook.on_poll(WaiterState::Waiting, &second, 2, &ctx);

        let out = render(hook);
        assert_eq!(out.matches("Deployment status:").count(), 2);
        assert!(out.contains("PRIMARY"));
        assert!(out.contains("web:6"));
        assert_eq!(out.matches("started 1 task").count(), 1);
        assert_eq!(out.matches("registered 1 target").count(), 1);
    }

    #[test]
    fn terminal_states_print_verdicts() {
        let config = model::services_stable();
        let params = json!({});
        let ctx = ctx(&config, &params);
        let mut hook = DeploymentStatusHook::new(Vec::new());
        hook.on_poll(WaiterState::Success, &json!({}), 3, &ctx);
        hook.on_poll(WaiterState::Error, &json!({}), 4, &ctx);
        hook.on_poll(WaiterState::Timeout, &json!({}), 5, &ctx);
        let out = render(hook);
        assert!(out.contains("Service is stable!"));
        assert!(out.contains("Service failed to stabilize!"));
        assert!(out.contains("Timed out waiting"));
        assert!(out.contains("does not necessarily mean your deployment failed"));
    }

    #[test]
    fn wrap_breaks_on_width() {
        assert_eq!(wrap("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(wrap("", 10), vec![""]);
    }
}
