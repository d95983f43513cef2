//! `${terraform.KEY}` interpolation.
//!
//! Only runs when the raw document has a `terraform:` section. `KEY` is a
//! logical name from `lookups:`; the output it maps to may itself contain
//! replacement tokens, and so may the statefile location. List and mapping
//! outputs replace the whole value they appear in.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{any_string, splice, EntryScope, Processor, ProcessorFactory};
use crate::config::{Document, ResolveOptions};
use crate::error::DeckhandError;
use crate::state::tfe::TfeBackend;
use crate::state::{RemoteState, StateBackend, StateLocation, TerraformSection};

static TERRAFORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{terraform\.([A-Za-z0-9_]+)\}").expect("static regex is valid")
});

/// Builds a [`TerraformProcessor`] with the backend the `terraform:` section asks for.
#[derive(Default)]
pub struct TerraformFactory {
    backend: Option<Arc<dyn StateBackend>>,
}

impl TerraformFactory {
    /// Always use `backend` instead of choosing one from the section.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn StateBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }
}

async fn backend_for(
    section: &TerraformSection,
    options: &ResolveOptions,
) -> Result<Arc<dyn StateBackend>, DeckhandError> {
    match section.location {
        StateLocation::Workspace { .. } => {
            let token = options.tfe_token.clone().ok_or_else(|| {
                DeckhandError::MissingToken(
                    "Terraform Enterprise State: No Terraform Enterprise API token provided!"
                        .into(),
                )
            })?;
            Ok(Arc::new(TfeBackend::new(token)))
        }
        #[cfg(feature = "s3")]
        StateLocation::Statefile(_) => Ok(Arc::new(
            crate::state::s3::S3Backend::new(section.profile.as_deref(), section.region.as_deref())
                .await,
        )),
        #[cfg(not(feature = "s3"))]
        StateLocation::Statefile(_) => Err(DeckhandError::RemoteState {
            backend: "s3",
            source: "deckhand was built without the `s3` feature".into(),
        }),
    }
}

#[async_trait]
impl ProcessorFactory for TerraformFactory {
    fn name(&self) -> &'static str {
        "terraform"
    }

    async fn build(
        &self,
        document: &Document,
        options: &ResolveOptions,
    ) -> Result<Option<Box<dyn Processor>>, DeckhandError> {
        let Some(raw_section) = document.raw().get("terraform") else {
            return Ok(None);
        };
        let section = TerraformSection::from_value(raw_section)?;
        let backend = match self.backend {
            Some(ref backend) => Arc::clone(backend),
            None => backend_for(&section, options).await?,
        };
        Ok(Some(Box::new(TerraformProcessor {
            state: RemoteState::new(section, backend),
        })))
    }
}

pub struct TerraformProcessor {
    state: RemoteState,
}

#[async_trait]
impl Processor for TerraformProcessor {
    async fn prepare(&mut self, scope: &EntryScope<'_>, entry: &Value) -> Result<(), DeckhandError> {
        if any_string(entry, &|s| TERRAFORM_RE.is_match(s)) {
            self.state.load(scope.replacements).await?;
        }
        Ok(())
    }

    fn replace(&mut self, text: &str, scope: &EntryScope<'_>) -> Result<Option<Value>, DeckhandError> {
        let Some(caps) = TERRAFORM_RE.captures(text) else {
            return Ok(None);
        };
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            return Ok(None);
        };
        let value = self
            .state
            .lookup(key.as_str(), scope.replacements)
            .ok_or_else(|| DeckhandError::NoSuchOutput {
                section: scope.section.to_string(),
                entry: scope.entry.to_string(),
                key: key.as_str().to_string(),
            })?;
        Ok(Some(splice(text, whole.range(), value)))
    }
}
