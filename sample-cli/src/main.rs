//! Sample app CLI - runs the DevOps sample web service
//!
//! Configuration comes from flags, falling back to environment variables
//! (`PORT`, `HOST`, `STATIC_DIR`, `SHUTDOWN_TIMEOUT_SECS`). Log output is
//! filtered by `RUST_LOG`.

mod server;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sample-app")]
#[command(about = "DevOps multi-cloud sample web service")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    server: server::ServerArgs,
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    server::run(cli.server)
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
