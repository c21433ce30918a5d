use clap::Parser;
use steakpie_cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    if let Err(e) = steakpie_cli::run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
