//! Unified error types for Deckhand.
//!
//! Defines [`DeckhandError`] (the main crate error enum),
//! [`ValidationError`] for structural document failures and
//! [`WaiterError`] for polls that did not converge. All use `thiserror`
//! or hand-written `Display` impls. Error messages name the offending
//! section, entry or field so the CLI can print them as-is.

use std::path::PathBuf;

use crate::waiter::WaiterState;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub location: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}: {}: {}", self.location, self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

/// The terminal state a waiter gave up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterFailureKind {
    Failure,
    Error,
    Timeout,
}

impl WaiterFailureKind {
    #[must_use]
    pub const fn state(self) -> WaiterState {
        match self {
            Self::Failure => WaiterState::Failure,
            Self::Error => WaiterState::Error,
            Self::Timeout => WaiterState::Timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WaiterError {
    pub name: String,
    pub kind: WaiterFailureKind,
    pub reason: String,
    pub last_response: serde_json::Value,
}

impl std::fmt::Display for WaiterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Waiter {} failed: {}", self.name, self.reason)?;
        if self.kind == WaiterFailureKind::Timeout {
            write!(
                f,
                "\n  Polling stopped, but the operation was not cancelled and may still be \
                 progressing remotely."
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for WaiterError {}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DeckhandError {
    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("No section named '{0}' in the config file")]
    NoSuchSection(String),

    #[error("No item named '{name}' in section '{section}'")]
    NoSuchSectionItem { section: String, name: String },

    /// Umbrella for every failure raised while interpolating the document.
    #[error("{source}")]
    ProcessingFailed {
        #[source]
        source: Box<DeckhandError>,
    },

    /// A failure while preparing one entry, tagged with where it happened.
    #[error("Config[\"{section}\"][\"{entry}\"]: {source}")]
    InEntry {
        section: String,
        entry: String,
        #[source]
        source: Box<DeckhandError>,
    },

    #[error("Environment file \"{}\" {reason}", path.display())]
    EnvFile { path: PathBuf, reason: String },

    #[error("Config[\"{section}\"][\"{entry}\"]: Could not find value for ${{env.{key}}}")]
    UnresolvedEnvironment {
        section: String,
        entry: String,
        key: String,
    },

    #[error("Could not find Terraform state file {location}")]
    NoSuchStateFile { location: String },

    #[error(
        "Config[\"{section}\"][\"{entry}\"]: There is no terraform output named \"{key}\" in the statefile"
    )]
    NoSuchOutput {
        section: String,
        entry: String,
        key: String,
    },

    #[error("Remote state error ({backend}): {source}")]
    RemoteState {
        backend: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Malformed Terraform state {location}: {message}")]
    StateFormat { location: String, message: String },

    #[error("{0}")]
    MissingToken(String),

    #[error("{entity}: \"{field}\": {message}")]
    Schema {
        entity: String,
        field: String,
        message: String,
    },

    #[error("No adapter registered for entity '{entity}' from source '{source_type}'")]
    AdapterNotFound { entity: String, source_type: String },

    #[error(transparent)]
    Waiter(#[from] WaiterError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl DeckhandError {
    /// Wrap a processor failure into the single error kind resolver callers catch.
    #[must_use]
    pub fn processing(source: Self) -> Self {
        match source {
            already @ Self::ProcessingFailed { .. } => already,
            other => Self::ProcessingFailed {
                source: Box::new(other),
            },
        }
    }

    /// Attach the section and entry to an error that does not already name them.
    #[must_use]
    pub fn in_entry(section: &str, entry: &str, source: Self) -> Self {
        match source {
            named @ (Self::InEntry { .. }
            | Self::UnresolvedEnvironment { .. }
            | Self::NoSuchOutput { .. }) => named,
            other => Self::InEntry {
                section: section.to_string(),
                entry: entry.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub(crate) fn schema(
        entity: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Schema {
            entity: entity.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}
