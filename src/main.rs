use clap::Parser;
use mimalloc::MiMalloc;
use std::process::ExitCode;
use tenant_provisioner::cli::{self, Cli};
use tenant_provisioner::config::Config;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Cli::parse();
    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let loglevel = args.log_level.clone().unwrap_or_else(|| cfg.loglevel.clone());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(loglevel));
    // stdout carries the connection string; logs go to stderr.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_level(true)
                .with_target(false),
        )
        .init();

    tracing::debug!(
        loglevel = %cfg.loglevel,
        connect_timeout_secs = cfg.connect_timeout_secs,
        retry_max_times = cfg.retry.max_times,
        document_role = %cfg.document_role,
        mysql_user_host = %cfg.mysql_user_host,
        "configuration loaded"
    );

    cli::run(args.command, &cfg).await
}
