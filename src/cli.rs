//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser with the options shared by every
//! subcommand, the [`Commands`] enum (show, validate, render) and their
//! associated argument structs. Most flags have an environment variable
//! equivalent for CI pipelines.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::adapters::{EntityKind, DECKHAND_SOURCE};
use crate::config::{ResolveOptions, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(
    name = "deckhand",
    version,
    about = "Declarative container-service deployments",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        deckhand validate                    Check ./deckhand.yml\n  \
        deckhand show services web-prod      Print an interpolated entry\n  \
        deckhand render service web-prod     Print the API payload for a service"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args, Clone)]
pub struct GlobalArgs {
    /// Config file path (.yml, .yaml, .json, .toml)
    #[arg(
        short,
        long,
        global = true,
        env = "DECKHAND_FILENAME",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub filename: PathBuf,

    /// Shared KEY=VALUE file for ${env.*} placeholders
    #[arg(short, long, global = true, help_heading = "Interpolation")]
    pub env_file: Option<PathBuf>,

    /// Fall back to the process environment for ${env.*} placeholders
    #[arg(long, global = true, help_heading = "Interpolation")]
    pub import_env: bool,

    /// API token for the managed Terraform state service
    #[arg(
        short,
        long,
        global = true,
        env = "ATLAS_TOKEN",
        hide_env_values = true,
        help_heading = "Interpolation"
    )]
    pub tfe_token: Option<String>,

    /// Substitute a placeholder value for unknown ${env.*} keys instead of failing
    #[arg(
        long,
        global = true,
        env = "DECKHAND_IGNORE_MISSING_ENVIRONMENT",
        help_heading = "Interpolation"
    )]
    pub ignore_missing_environment: bool,

    // -- Logging --
    /// Log level
    #[arg(short, long, global = true, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, global = true, conflicts_with = "pretty")]
    pub json: bool,
}

impl GlobalArgs {
    #[must_use]
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            env_file: self.env_file.clone(),
            import_env: self.import_env,
            tfe_token: self.tfe_token.clone(),
            ignore_missing_environment: self.ignore_missing_environment,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the interpolated config, a section or one entry
    Show(ShowArgs),

    /// Validate the config file without contacting anything
    Validate(ValidateArgs),

    /// Print the API payload an entry converts to
    Render(RenderArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        deckhand show                          Whole interpolated document\n  \
        deckhand show --raw services           Services before interpolation\n  \
        deckhand show services qa --format json  Entry by name or environment")]
pub struct ShowArgs {
    /// Top-level section, e.g. services
    pub section: Option<String>,

    /// Entry name (or environment label) within the section
    pub name: Option<String>,

    /// Show the document before interpolation
    #[arg(long)]
    pub raw: bool,

    /// Output format
    #[arg(long, default_value = "yaml")]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        deckhand render service web-prod\n  \
        deckhand render task-definition web-prod\n  \
        deckhand render standalone-task migrate-prod")]
pub struct RenderArgs {
    /// Entity kind to build
    pub entity: EntityKind,

    /// Entry name (or environment label)
    pub name: String,

    /// Adapter source type
    #[arg(long, default_value = DECKHAND_SOURCE)]
    pub source: String,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_options_become_resolve_options() {
        let cli = Cli::try_parse_from([
            "deckhand",
            "--env-file",
            "shared.env",
            "--import-env",
            "show",
            "services",
            "web",
            "--tfe-token",
            "secret",
        ])
        .unwrap();
        let options = cli.global.resolve_options();
        assert_eq!(options.env_file.as_deref(), Some(std::path::Path::new("shared.env")));
        assert!(options.import_env);
        assert_eq!(options.tfe_token.as_deref(), Some("secret"));
        assert!(matches!(
            cli.command,
            Some(Commands::Show(ShowArgs { ref section, .. })) if section.as_deref() == Some("services")
        ));
    }

    #[test]
    fn render_parses_entity_kinds() {
        let cli = Cli::try_parse_from(["deckhand", "render", "task-definition", "web"]).unwrap();
        let Some(Commands::Render(args)) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.entity, EntityKind::TaskDefinition);
        assert_eq!(args.source, DECKHAND_SOURCE);
    }

    #[test]
    fn pretty_and_json_conflict() {
        assert!(Cli::try_parse_from(["deckhand", "--pretty", "--json", "validate"]).is_err());
    }
}
