use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = deckhand::cli::Cli::parse();
    deckhand::logging::init(
        &cli.global.log_level,
        deckhand::logging::resolve_format(cli.global.pretty, cli.global.json),
    );
    if let Err(e) = deckhand::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
