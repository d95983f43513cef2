//! Polling remote operations until they converge.
//!
//! A [`HookedWaiter`] calls a [`PollOperation`] repeatedly, matches each
//! response against the ordered acceptors of its [`WaiterConfig`] and tells
//! every [`WaiterHook`] what happened. Success returns the last response;
//! failure, service errors and running out of attempts come back as
//! [`WaiterError`]. Hooks observe, they never steer.

pub mod hooks;
pub mod model;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{DeckhandError, WaiterError, WaiterFailureKind};
pub use model::{Acceptor, AcceptorState, Matcher, WaiterConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterState {
    Waiting,
    Success,
    Failure,
    Error,
    Timeout,
}

impl WaiterState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Waiting)
    }
}

impl fmt::Display for WaiterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state query a waiter repeats.
///
/// Service-side errors should be returned as a response shaped like
/// [`error_response`] so acceptors can match on them; an `Err` aborts the
/// wait immediately.
#[async_trait]
pub trait PollOperation: Send + Sync {
    async fn call(&self, params: &Value) -> Result<Value, DeckhandError>;
}

/// A normalized service error response.
#[must_use]
pub fn error_response(code: &str, message: &str) -> Value {
    json!({ "Error": { "Code": code, "Message": message } })
}

/// What a hook is told besides the state and response.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub name: &'a str,
    pub config: &'a WaiterConfig,
    pub delay: Duration,
    pub max_attempts: u32,
    /// The poll parameters, e.g. `{"cluster": ..., "services": [...]}`.
    pub params: &'a Value,
}

pub trait WaiterHook {
    fn on_poll(&mut self, state: WaiterState, response: &Value, attempt: u32, ctx: &HookContext<'_>);
}

/// Per-call overrides of the waiter's static timings.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitOptions {
    pub delay: Option<Duration>,
    pub max_attempts: Option<u32>,
}

pub struct HookedWaiter<O> {
    name: String,
    config: WaiterConfig,
    operation: O,
}

impl<O: PollOperation> HookedWaiter<O> {
    pub fn new(name: impl Into<String>, config: WaiterConfig, operation: O) -> Self {
        Self {
            name: name.into(),
            config,
            operation,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn config(&self) -> &WaiterConfig {
        &self.config
    }

    /// Poll until an acceptor reaches a terminal state or attempts run out.
    ///
    /// Every hook sees each poll once, tagged with the state it produced,
    /// and sees `timeout` once more when attempts are exhausted.
    pub async fn wait(
        &self,
        params: &Value,
        hooks: &mut [&mut dyn WaiterHook],
        options: WaitOptions,
    ) -> Result<Value, DeckhandError> {
        let delay = options.delay.unwrap_or(self.config.delay);
        let max_attempts = options.max_attempts.unwrap_or(self.config.max_attempts).max(1);
        let ctx = HookContext {
            name: &self.name,
            config: &self.config,
            delay,
            max_attempts,
            params,
        };

        let mut state = WaiterState::Waiting;
        let mut last_matched: Option<&Acceptor> = None;
        let mut attempt = 0;

        loop {
            let response = self.operation.call(params).await?;
            attempt += 1;

            match self.config.acceptors.iter().find(|a| a.matcher.matches(&response)) {
                Some(acceptor) => {
                    last_matched = Some(acceptor);
                    state = acceptor.state.waiter_state();
                }
                None => {
                    if let Some(error) = response.get("Error") {
                        notify(hooks, WaiterState::Error, &response, attempt, &ctx);
                        let field = |key: &str| {
                            error
                                .get(key)
                                .and_then(Value::as_str)
                                .unwrap_or("Unknown")
                                .to_string()
                        };
                        let reason = format!(
                            "An error occurred ({}): {}",
                            field("Code"),
                            field("Message")
                        );
                        return Err(self.fail(WaiterFailureKind::Error, reason, response));
                    }
                }
            }

            notify(hooks, state, &response, attempt, &ctx);
            tracing::debug!(waiter = %self.name, attempt, %state, "polled");

            match state {
                WaiterState::Success => return Ok(response),
                WaiterState::Failure => {
                    let explanation = last_matched.map(Acceptor::explanation).unwrap_or_default();
                    let reason = format!("Waiter encountered a terminal failure state: {explanation}");
                    return Err(self.fail(WaiterFailureKind::Failure, reason, response));
                }
                _ => {}
            }

            if attempt >= max_attempts {
                notify(hooks, WaiterState::Timeout, &response, attempt, &ctx);
                let reason = match last_matched {
                    None => "Max attempts exceeded".to_string(),
                    Some(acceptor) => format!(
                        "Max attempts exceeded. Previously accepted state: {}",
                        acceptor.explanation()
                    ),
                };
                return Err(self.fail(WaiterFailureKind::Timeout, reason, response));
            }
            tokio::time::sleep(delay).await;
        }
    }

    fn fail(&self, kind: WaiterFailureKind, reason: String, last_response: Value) -> DeckhandError {
        tracing::debug!(waiter = %self.name, state = %kind.state(), %reason, "waiter gave up");
        WaiterError {
            name: self.name.clone(),
            kind,
            reason,
            last_response,
        }
        .into()
    }
}

fn notify(
    hooks: &mut [&mut dyn WaiterHook],
    state: WaiterState,
    response: &Value,
    attempt: u32,
    ctx: &HookContext<'_>,
) {
    for hook in hooks.iter_mut() {
        hook.on_poll(state, response, attempt, ctx);
    }
}
