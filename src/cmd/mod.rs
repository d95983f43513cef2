//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`show`], [`validate`] or [`render`]. Each handler
//! lives in its own submodule and reads the config through a [`Session`].

pub mod render;
pub mod show;
pub mod validate;

use tokio::sync::OnceCell;

use crate::cli::{Cli, Commands, GlobalArgs};
use crate::config::sources::file_source::FileSource;
use crate::config::{ConfigResolver, Document, ResolveOptions};
use crate::error::DeckhandError;

/// One invocation's view of the config file.
///
/// The file is read at most once and interpolated only when a command asks
/// for the cooked tree; `show --raw` never touches remote state.
pub struct Session {
    source: FileSource,
    options: ResolveOptions,
    resolver: ConfigResolver,
    loaded: OnceCell<Document>,
    resolved: OnceCell<Document>,
}

impl Session {
    #[must_use]
    pub fn new(global: &GlobalArgs) -> Self {
        Self::with_resolver(global, ConfigResolver::default())
    }

    #[must_use]
    pub fn with_resolver(global: &GlobalArgs, resolver: ConfigResolver) -> Self {
        Self {
            source: FileSource::new(&global.filename),
            options: global.resolve_options(),
            resolver,
            loaded: OnceCell::new(),
            resolved: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// The document as loaded and validated, not yet interpolated.
    pub async fn raw(&self) -> Result<&Document, DeckhandError> {
        self.loaded.get_or_try_init(|| self.source.load()).await
    }

    /// The document with every processor applied.
    pub async fn resolved(&self) -> Result<&Document, DeckhandError> {
        self.resolved
            .get_or_try_init(|| async {
                let mut document = self.raw().await?.clone();
                self.resolver.resolve(&mut document, &self.options).await?;
                tracing::debug!(path = document.path(), version = %document.version(), "config resolved");
                Ok::<_, DeckhandError>(document)
            })
            .await
    }
}

pub async fn dispatch(cli: Cli) -> Result<(), DeckhandError> {
    let session = Session::new(&cli.global);
    match cli.command {
        Some(Commands::Show(ref args)) => show::execute(&session, args).await,
        Some(Commands::Validate(ref args)) => validate::execute(&session, args).await,
        Some(Commands::Render(ref args)) => render::execute(&session, args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  deckhand v{version}: declarative container-service deployments\n\n  \
         No command provided. To get started:\n\n    \
         deckhand validate                     Check ./deckhand.yml\n    \
         deckhand show services                Print the interpolated services\n    \
         deckhand -f prod.yml show tasks       Use a specific config file\n    \
         deckhand --help                       See all commands and options\n"
    );
}
