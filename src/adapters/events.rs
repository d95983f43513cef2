//! Scheduled-event rules for standalone tasks.

use serde_json::{Map, Value};

use super::{Adapter, AdapterContext, Converted, Fragment};
use crate::error::DeckhandError;

pub const RULE_PREFIX: &str = "deckhand-";

pub struct EventScheduleRuleAdapter;

impl Adapter for EventScheduleRuleAdapter {
    fn convert(&self, fragment: &Value, _ctx: &AdapterContext) -> Result<Converted, DeckhandError> {
        let label = fragment.get("name").and_then(Value::as_str).unwrap_or("?");
        let f = Fragment::new(format!("EventScheduleRule({label})"), fragment)?;
        let name = f.require_str("name")?;

        let mut data = Map::new();
        data.insert("Name".into(), Value::from(format!("{RULE_PREFIX}{name}")));
        data.insert(
            "ScheduleExpression".into(),
            Value::from(f.require_str("schedule")?),
        );
        data.insert("State".into(), Value::from("ENABLED"));
        data.insert(
            "Description".into(),
            Value::from(format!("Scheduler for task: {name}")),
        );
        Ok(Converted::new(data))
    }
}
