use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use handoff_deploy::{CONFIG_FILENAME, HandoffConfig, VerificationPolicy};
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "handoff")]
#[command(
    author,
    version,
    about = "Deploy contracts and hand their ownership over to a controller"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "HANDOFF_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Handoff.toml configuration file, or a directory containing one.
    ///
    /// If not provided, ./Handoff.toml is used when it exists.
    #[arg(short, long, global = true, alias = "conf", env = "HANDOFF_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy the contracts, transfer ownership to the controller and verify it.
    Deploy(Overrides),

    /// Read back the owners of a previous deployment.
    Verify {
        /// Deployment record to verify. Defaults to <outdata>/deployment.json.
        #[arg(long)]
        record: Option<PathBuf>,

        #[clap(flatten)]
        overrides: Overrides,
    },

    /// Print the deployment plan without touching the network.
    Plan(Overrides),

    /// Write a configuration file with the default settings.
    Init {
        /// Where to write the file.
        #[arg(default_value = CONFIG_FILENAME)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Settings that take precedence over the configuration file and environment.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// JSON-RPC endpoint of the target network.
    #[arg(long, alias = "rpc")]
    pub rpc_url: Option<Url>,

    /// Expected chain ID of the endpoint.
    #[arg(long)]
    pub chain_id: Option<u64>,

    /// Directory holding the compiled contract artifacts.
    #[arg(long, alias = "artifacts")]
    pub artifacts_dir: Option<PathBuf>,

    /// Directory receiving the deployment record.
    #[arg(long)]
    pub outdata: Option<PathBuf>,

    /// Skip the final ownership verification step.
    #[arg(long)]
    pub no_verify: bool,

    /// What an ownership mismatch does: `warn` or `enforce`.
    #[arg(long)]
    pub verification_policy: Option<VerificationPolicy>,

    /// Fail a step that takes longer than this many seconds.
    #[arg(long)]
    pub step_timeout: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut HandoffConfig) {
        if let Some(rpc_url) = &self.rpc_url {
            config.network.rpc_url = rpc_url.clone();
        }
        if let Some(chain_id) = self.chain_id {
            config.network.chain_id = chain_id;
        }
        if let Some(artifacts_dir) = &self.artifacts_dir {
            config.contracts.artifacts_dir = artifacts_dir.clone();
        }
        if let Some(outdata) = &self.outdata {
            config.outdata = outdata.clone();
        }
        if self.no_verify {
            config.execution.verify = false;
        }
        if let Some(policy) = self.verification_policy {
            config.execution.verification_policy = policy;
        }
        if let Some(step_timeout) = self.step_timeout {
            config.execution.step_timeout_secs = Some(step_timeout);
        }
    }
}
