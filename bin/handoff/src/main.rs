//! handoff deploys a set of contracts and hands their ownership over to a controller contract.

mod cli;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;
use figment::{
    Figment,
    providers::{Env, Serialized},
};

use cli::{Cli, Command, Overrides};
use handoff_deploy::{
    Artifact, CONFIG_FILENAME, CancelHandle, DeploymentRecord, ExecutorOptions, HandoffConfig,
    LedgerClient, Plan, PlanExecutor, PlanResult, RpcLedger, VerificationReport, Verifier,
};

/// Prefix of the environment variables overriding configuration keys.
/// Nested keys are separated by `__`, e.g. `HANDOFF_NETWORK__RPC_URL`.
const ENV_PREFIX: &str = "HANDOFF_";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match cli.command {
        Command::Deploy(overrides) => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            deploy(config).await
        }
        Command::Verify { record, overrides } => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            verify(config, record).await
        }
        Command::Plan(overrides) => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            let plan = build_plan(&config)?;
            print_plan(&plan);
            Ok(())
        }
        Command::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists, pass --force to overwrite it",
                    path.display()
                );
            }
            HandoffConfig::default().save_to_file(&path)
        }
    }
}

/// Defaults, then the configuration file, then `HANDOFF_*` variables, then CLI flags.
fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<HandoffConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| Some(PathBuf::from(CONFIG_FILENAME)).filter(|p| p.is_file()));

    let base = match &path {
        Some(path) => HandoffConfig::load_from_file(path)?,
        None => HandoffConfig::default(),
    };

    let mut config: HandoffConfig = Figment::from(Serialized::defaults(base))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("Failed to merge configuration with environment variables")?;

    overrides.apply(&mut config);

    tracing::debug!(config = ?config, "Configuration resolved");
    Ok(config)
}

fn build_plan(config: &HandoffConfig) -> Result<Plan> {
    let contracts = &config.contracts;
    let dir = &contracts.artifacts_dir;

    let asset_a = Artifact::load(dir, &contracts.asset_a)?;
    let asset_b = Artifact::load(dir, &contracts.asset_b)?;
    let controller = Artifact::load(dir, &contracts.controller)?;

    Plan::controller_handoff(asset_a, asset_b, controller, config.execution.verify)
        .context("Invalid deployment plan")
}

async fn deploy(config: HandoffConfig) -> Result<()> {
    let plan = build_plan(&config)?;
    let signer = config.signer.load_signer()?;

    let ledger = RpcLedger::connect(&config.network, signer)
        .await
        .context("Failed to connect to the ledger endpoint")?;
    let chain_id = ledger.chain_id();

    let cancel = CancelHandle::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, cancelling the deployment...");
            ctrl_c.cancel();
        }
    });

    let executor = PlanExecutor::new(ledger)
        .with_options(ExecutorOptions::from(&config.execution))
        .with_cancel(cancel);

    let result = executor.execute(&plan).await;
    finish_deployment(&result, chain_id, &config.record_path())
}

/// Print the outcome, then persist it. A failed run is reported even when the
/// record cannot be written.
fn finish_deployment(result: &PlanResult, chain_id: u64, record_path: &Path) -> Result<()> {
    println!("{result}");

    let saved = DeploymentRecord::from(result)
        .with_chain_id(chain_id)
        .save_to_file(record_path);

    if let Some(failure) = &result.failure {
        if let Err(err) = &saved {
            tracing::error!(error = ?err, "Failed to write the deployment record");
        }
        anyhow::bail!(
            "Deployment failed at step `{}`: {} (partial results in {})",
            failure.step,
            failure.error,
            record_path.display()
        );
    }

    saved?;
    print_summary(result);
    Ok(())
}

async fn verify(config: HandoffConfig, record: Option<PathBuf>) -> Result<()> {
    let record_path = record.unwrap_or_else(|| config.record_path());
    let record = DeploymentRecord::load_from_file(&record_path)?;

    // Owner reads need no signing key.
    let ledger = RpcLedger::connect_read_only(&config.network)
        .await
        .context("Failed to connect to the ledger endpoint")?;

    verify_record(&ledger, &config, &record, &record_path).await?;
    Ok(())
}

/// Read back the owners of the assets in `record` and apply the configured policy.
async fn verify_record<L: LedgerClient>(
    ledger: &L,
    config: &HandoffConfig,
    record: &DeploymentRecord,
    record_path: &Path,
) -> Result<VerificationReport> {
    let controller_name = &config.contracts.controller;
    let controller = record.contract(controller_name).with_context(|| {
        format!(
            "{} has no deployment of {}",
            record_path.display(),
            controller_name
        )
    })?;

    let contracts: Vec<_> = [&config.contracts.asset_a, &config.contracts.asset_b]
        .into_iter()
        .filter_map(|name| record.contract(name).cloned())
        .collect();
    if contracts.is_empty() {
        anyhow::bail!("{} has no asset deployments", record_path.display());
    }

    let report = Verifier::new(ledger)
        .verify(controller, &contracts)
        .await
        .context("Failed to read back owners")?;

    println!("{report}");

    report.enforce(config.execution.verification_policy)?;
    Ok(report)
}

fn print_plan(plan: &Plan) {
    let mut table = Table::new();
    table.set_header(vec!["#", "Step", "Kind", "Depends on"]);
    for (index, step) in plan.iter().enumerate() {
        table.add_row(vec![
            index.to_string(),
            step.name().to_string(),
            step.kind().to_string(),
            step.dependencies().join(", "),
        ]);
    }

    println!("{table}");
    println!("Plan fingerprint: {}", plan.fingerprint());
}

fn print_summary(result: &PlanResult) {
    let owners = result.verification.as_ref();

    let mut table = Table::new();
    table.set_header(vec!["Contract", "Address", "Block", "Owner"]);
    for contract in result.table.contracts() {
        let owner = owners
            .and_then(|report| report.check(&contract.name))
            .and_then(|check| check.actual_owner)
            .map(|owner| owner.to_string())
            .unwrap_or_default();
        table.add_row(vec![
            contract.name.clone(),
            contract.address.to_string(),
            contract.block_number.to_string(),
            owner,
        ]);
    }

    println!("{table}");
}
