//! Command-line entry point: reads settings, loads the command config, opens
//! the event store and serves webhooks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use steakpie_core::config::{find_config, Config};
use steakpie_core::runner::ShellRunner;
use steakpie_core::store::EventStore;
use steakpie_server::{AppState, Dispatcher};

const MISSING_SECRET: &str = "WEBHOOK_SECRET is required\n\n\
    Set it to the secret configured on the GitHub webhook.\n\n\
    Example:\n  WEBHOOK_SECRET=secret steakpie";

#[derive(Debug, Parser)]
#[command(
    name = "steakpie",
    about = "Run shell commands when GitHub publishes a package",
    version
)]
pub struct Cli {
    /// Secret shared with the GitHub webhook
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Path to the SQLite event database
    #[arg(long, env = "DB_PATH", default_value = "db.sqlite")]
    pub db_path: PathBuf,

    /// Command config (default: config.yml or config.yaml in the working directory)
    #[arg(long, env = "STEAKPIE_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// The webhook secret, rejecting a missing or empty value.
    pub fn secret(&self) -> anyhow::Result<&str> {
        match self.secret.as_deref() {
            Some(s) if !s.is_empty() => Ok(s),
            _ => bail!(MISSING_SECRET),
        }
    }

    /// The config path given explicitly, or the one discovered in `cwd`.
    pub fn config_path(&self, cwd: &Path) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(find_config(cwd)?),
        }
    }
}

/// Everything `serve` needs, built once at startup.
pub fn build_state(cli: &Cli, cwd: &Path) -> anyhow::Result<AppState> {
    let secret = cli.secret()?;

    let config_path = cli.config_path(cwd)?;
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    tracing::info!(
        path = %config_path.display(),
        packages = config.package_count(),
        "loaded config"
    );
    for (package, commands) in &config.packages {
        tracing::debug!(package = %package, commands = commands.command_count(), "configured package");
    }

    let store = EventStore::open(&cli.db_path)
        .with_context(|| format!("opening event database {}", cli.db_path.display()))?;
    tracing::info!(
        path = %cli.db_path.display(),
        events = store.count()?,
        "opened event database"
    );

    let dispatcher = Dispatcher::new(Arc::new(config), store, Arc::new(ShellRunner::new()));
    Ok(AppState::new(secret, dispatcher))
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("reading working directory")?;
    let state = build_state(&cli, &cwd)?;

    let addr = format!("0.0.0.0:{}", cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    steakpie_server::serve(listener, state).await
}
