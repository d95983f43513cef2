//! Terraform remote state: location, backends and the output cache.
//!
//! The `terraform:` section of `deckhand.yml` names either an object-storage
//! statefile (`statefile: s3://bucket/key`) or a managed state service
//! workspace (`organization` + `workspace`). Both locations may embed
//! replacement tokens so each environment can point at its own state.
//! [`RemoteState`] fetches through a [`StateBackend`] and keeps the outputs
//! of the last document it loaded.

#[cfg(feature = "s3")]
pub mod s3;
pub mod tfe;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::context::{self, Replacements};
use crate::error::DeckhandError;

const SECTION: &str = "terraform";

#[async_trait]
pub trait StateBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch and parse the state document at `location`.
    ///
    /// A missing document must be reported as
    /// [`DeckhandError::NoSuchStateFile`]; transport failures pass through.
    async fn fetch(&self, location: &str) -> Result<Value, DeckhandError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateLocation {
    /// Object-storage URL, e.g. `s3://bucket/{environment}.tfstate`.
    Statefile(String),
    /// Managed state service workspace.
    Workspace {
        organization: String,
        workspace: String,
    },
}

impl StateLocation {
    /// The location string before token substitution.
    #[must_use]
    pub fn template(&self) -> String {
        match self {
            Self::Statefile(url) => url.clone(),
            Self::Workspace {
                organization,
                workspace,
            } => format!("{organization}/{workspace}"),
        }
    }
}

/// The parsed `terraform:` section.
#[derive(Debug, Clone)]
pub struct TerraformSection {
    pub location: StateLocation,
    pub lookups: BTreeMap<String, String>,
    pub profile: Option<String>,
    pub region: Option<String>,
}

impl TerraformSection {
    pub fn from_value(section: &Value) -> Result<Self, DeckhandError> {
        let text = |key: &str| section.get(key).and_then(Value::as_str).map(str::to_owned);

        let location = if let Some(organization) = text("organization") {
            let workspace = text("workspace").ok_or_else(|| {
                DeckhandError::schema(
                    SECTION,
                    "workspace",
                    "if you define \"organization\", you must also define \"workspace\"",
                )
            })?;
            StateLocation::Workspace {
                organization,
                workspace,
            }
        } else if let Some(statefile) = text("statefile") {
            StateLocation::Statefile(statefile)
        } else {
            return Err(DeckhandError::schema(
                SECTION,
                "statefile",
                "could not determine the location of the Terraform statefile: define either \
                 \"organization\" and \"workspace\" or \"statefile\"",
            ));
        };

        let mut lookups = BTreeMap::new();
        if let Some(map) = section.get("lookups").and_then(Value::as_object) {
            for (key, value) in map {
                let output = value.as_str().ok_or_else(|| {
                    DeckhandError::schema(SECTION, format!("lookups.{key}"), "must be a string")
                })?;
                lookups.insert(key.clone(), output.to_string());
            }
        }

        Ok(Self {
            location,
            lookups,
            profile: text("profile"),
            region: text("region"),
        })
    }
}

/// Whether a state document of this `terraform_version` keeps its outputs at
/// the top level (0.12 and later) instead of under the root module.
#[must_use]
pub fn uses_top_level_outputs(version: Option<&str>) -> bool {
    let Some(version) = version else {
        return false;
    };
    let mut parts = version.trim_start_matches('v').split('.');
    let major = parts.next().and_then(|p| p.parse::<u64>().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|p| p.parse::<u64>().ok()).unwrap_or(0);
    major >= 1 || minor >= 12
}

/// Extract `output name -> value` from a state document of either schema.
pub fn read_outputs(
    state: &Value,
    location: &str,
) -> Result<HashMap<String, Value>, DeckhandError> {
    let malformed = |message: &str| DeckhandError::StateFormat {
        location: location.to_string(),
        message: message.to_string(),
    };

    let version = state.get("terraform_version").and_then(Value::as_str);
    let outputs = if uses_top_level_outputs(version) {
        state
            .get("outputs")
            .and_then(Value::as_object)
            .ok_or_else(|| malformed("missing top-level \"outputs\""))?
    } else {
        state
            .get("modules")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("missing \"modules\""))?
            .iter()
            .find(|module| module.get("path") == Some(&Value::from(vec!["root"])))
            .and_then(|root| root.get("outputs"))
            .and_then(Value::as_object)
            .ok_or_else(|| malformed("no root module outputs"))?
    };

    Ok(outputs
        .iter()
        .map(|(name, output)| {
            let value = output.get("value").cloned().unwrap_or_else(|| output.clone());
            (name.clone(), value)
        })
        .collect())
}

/// Cached view of one remote state document.
pub struct RemoteState {
    section: TerraformSection,
    backend: Arc<dyn StateBackend>,
    outputs: HashMap<String, Value>,
    loaded_for: Option<Replacements>,
    loaded_location: Option<String>,
}

impl RemoteState {
    #[must_use]
    pub fn new(section: TerraformSection, backend: Arc<dyn StateBackend>) -> Self {
        Self {
            section,
            backend,
            outputs: HashMap::new(),
            loaded_for: None,
            loaded_location: None,
        }
    }

    #[must_use]
    pub const fn section(&self) -> &TerraformSection {
        &self.section
    }

    #[must_use]
    pub fn loaded_location(&self) -> Option<&str> {
        self.loaded_location.as_deref()
    }

    /// Make sure the state for `replacements` is loaded.
    ///
    /// A call with the same replacement set as the last successful load is a
    /// no-op, as is one whose substituted location is already loaded.
    pub async fn load(&mut self, replacements: &Replacements) -> Result<(), DeckhandError> {
        if self.loaded_for.as_ref() == Some(replacements) {
            return Ok(());
        }
        let location = context::apply(&self.section.location.template(), replacements);
        if self.loaded_location.as_deref() != Some(location.as_str()) {
            tracing::debug!(
                backend = self.backend.name(),
                location = %location,
                "fetching terraform state"
            );
            let state = self.backend.fetch(&location).await?;
            self.outputs = read_outputs(&state, &location)?;
            self.loaded_location = Some(location);
        }
        self.loaded_for = Some(replacements.clone());
        Ok(())
    }

    /// The value of the output `attr` maps to through `lookups:`.
    #[must_use]
    pub fn lookup(&self, attr: &str, replacements: &Replacements) -> Option<&Value> {
        let template = self.section.lookups.get(attr)?;
        self.outputs.get(&context::apply(template, replacements))
    }
}
