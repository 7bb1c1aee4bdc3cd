//! Tool server binary: serves the tool catalog over HTTP.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tool_server::config::load_config;
use tool_server::{logging, server};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tool-server", version)]
#[command(about = "JSON-RPC tool server for the agent pipeline")]
struct Args {
    /// Path to the TOML config file (missing file means defaults)
    #[arg(long, default_value = "tool-server.toml")]
    config: PathBuf,

    /// Address to bind the server to
    #[arg(long, env = "HOST")]
    bind: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Project directory the tools operate on
    #[arg(long)]
    project_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // Credentials may live in a local .env file.
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        return Err(err).context("load .env");
    }
    logging::init();

    let args = Args::parse();
    let mut config = load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(project_dir) = args.project_dir {
        config.project_root = project_dir;
    }
    config.validate()?;

    if std::env::var(&config.github.token_env).is_err() {
        warn!(token_env = %config.github.token_env, "no credential set; pr.create will fail");
    }
    info!(project_root = %config.project_root.display(), "starting tool-server");
    server::serve(config).await
}
