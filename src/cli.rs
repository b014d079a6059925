use crate::config::Config;
use crate::db::{AdapterOptions, Backend, BackendAdapter, BackendKind};
use crate::error::ProvisionError;
use crate::service::reconciler::{Provisioned, Reconciler};
use crate::types::{Outcome, Principal, TargetConfig};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::process::ExitCode;
use tracing::{info, info_span};

#[derive(Parser, Debug)]
#[command(name = "tenant-provisioner")]
#[command(about = "Provision a dedicated database user and database per tenant", long_about = None)]
pub struct Cli {
    #[arg(long, global = true, help = "Log filter, overrides the configured loglevel")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Create or update a user and its database, then print its connection string")]
    Create {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, help = "Database username to create")]
        username: String,
        #[arg(
            long,
            env = "PROVISION_PASSWORD",
            hide_env_values = true,
            help = "Password for the database user"
        )]
        password: String,
        #[arg(long, help = "Print a JSON report instead of the bare connection string")]
        json: bool,
    },
    #[command(about = "Check that an administrative connection string is usable")]
    Verify {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    #[arg(long, help = "Database type: mongo, mysql or postgresql")]
    pub db_type: String,
    #[arg(
        long,
        env = "PROVISION_CONNECTION_STRING",
        hide_env_values = true,
        help = "Admin connection string"
    )]
    pub connection_string: String,
}

/// Machine-readable summary printed by `create --json`.
#[derive(Debug, Serialize)]
pub struct CreateReport {
    pub backend: BackendKind,
    pub connection_string: String,
    pub username: String,
    pub database: String,
    pub principal: Outcome,
    pub database_outcome: Outcome,
    pub privileges: Outcome,
}

impl From<&Provisioned> for CreateReport {
    fn from(p: &Provisioned) -> Self {
        Self {
            backend: p.descriptor.kind,
            connection_string: p.descriptor.render(),
            username: p.descriptor.username.clone(),
            database: p.database.name.clone(),
            principal: p.principal_outcome,
            database_outcome: p.database_outcome,
            privileges: p.privileges_outcome,
        }
    }
}

/// Run the full ensure-sequence and return what `create` prints on stdout.
pub async fn create(
    target: &TargetArgs,
    username: &str,
    password: &str,
    json: bool,
    config: &Config,
) -> Result<String, ProvisionError> {
    let kind: BackendKind = target.db_type.parse()?;
    let principal = Principal::new(username, password)?;
    let parsed = TargetConfig::parse(kind, &target.connection_string)?;
    let backend =
        Backend::open(parsed, &target.connection_string, &AdapterOptions::from(config)).await?;

    let span = info_span!("create", backend = %kind, username = %principal.username());
    let mut reconciler = Reconciler::new(&backend, config.retry.clone()).with_span(span);
    let result = reconciler.run(&principal).await;
    backend.close().await;
    let provisioned = result?;

    if json {
        Ok(serde_json::to_string_pretty(&CreateReport::from(&provisioned))?)
    } else {
        Ok(provisioned.descriptor.render())
    }
}

/// Connectivity probe only. `Ok(false)` means the endpoint did not answer.
pub async fn verify(target: &TargetArgs, config: &Config) -> Result<bool, ProvisionError> {
    let backend = Backend::connect(
        &target.db_type,
        &target.connection_string,
        &AdapterOptions::from(config),
    )
    .await?;
    let reachable = backend.verify_connectivity().await;
    info!(backend = %backend.kind(), endpoint = %backend.target().endpoint(), reachable, "verified");
    backend.close().await;
    Ok(reachable)
}

pub async fn run(command: Command, config: &Config) -> ExitCode {
    match command {
        Command::Create {
            target,
            username,
            password,
            json,
        } => match create(&target, &username, &password, json, config).await {
            Ok(out) => {
                println!("{out}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        },
        Command::Verify { target } => match verify(&target, config).await {
            Ok(true) => {
                println!("Connection successful");
                ExitCode::SUCCESS
            }
            Ok(false) => {
                println!("Connection failed");
                ExitCode::FAILURE
            }
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        },
    }
}
