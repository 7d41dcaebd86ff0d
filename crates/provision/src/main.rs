mod cli;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use wardgate_infra::directory::PostgresPrincipalDirectory;
use wardgate_infra::provisioning::{
    DesiredState, ProvisioningEngine, ProvisioningOptions, ProvisioningReport,
};
use wardgate_infra::store::{AccessStore, PostgresAccessStore};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    wardgate_observability::init(cli.log_format);

    match run(&cli).await {
        Ok(report) => {
            print!("{report}");
            if report.has_failures() {
                tracing::warn!("provisioning finished with failed records");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "provisioning aborted");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<ProvisioningReport> {
    let desired = match &cli.desired {
        Some(path) => DesiredState::load(path)?,
        None => DesiredState::builtin(),
    };
    let options = cli.options();

    tracing::info!(
        permissions = desired.permissions.len(),
        roles = desired.roles.len(),
        "connecting to database"
    );
    let store = PostgresAccessStore::connect(&cli.database_url(), cli.connect_timeout())
        .await
        .context("failed to connect to the database")?;

    let result = provision(&store, options, &desired).await;
    store.close().await;
    result
}

async fn provision(
    store: &PostgresAccessStore,
    options: ProvisioningOptions,
    desired: &DesiredState,
) -> anyhow::Result<ProvisioningReport> {
    store
        .ensure_schema()
        .await
        .context("failed to prepare the access-control schema")?;

    let directory = PostgresPrincipalDirectory::new(store.pool().clone());
    let engine = ProvisioningEngine::new(store, &directory, options);
    Ok(engine.run(desired).await?)
}
