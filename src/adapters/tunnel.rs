//! SSH tunnels are used as written.

use serde_json::Value;

use super::{Adapter, AdapterContext, Converted, Fragment};
use crate::error::DeckhandError;

pub struct SshTunnelAdapter;

impl Adapter for SshTunnelAdapter {
    fn convert(&self, fragment: &Value, _ctx: &AdapterContext) -> Result<Converted, DeckhandError> {
        Fragment::new("SSHTunnel", fragment)?;
        let payload = fragment.as_object().cloned().unwrap_or_default();
        Ok(Converted::new(payload))
    }
}
