use std::{path::PathBuf, time::Duration};

use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ExecutorOptions, VerificationPolicy};

/// The default name for the handoff configuration file.
pub const CONFIG_FILENAME: &str = "Handoff.toml";

/// Environment variable read for the signing key when none is set in the file.
pub const DEFAULT_PRIVATE_KEY_ENV: &str = "HANDOFF_PRIVATE_KEY";

/// Network endpoint and confirmation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint of the target network.
    pub rpc_url: Url,
    /// Expected chain ID; the endpoint is rejected when it serves another chain.
    pub chain_id: u64,
    /// How long to wait for a receipt before failing the step.
    pub confirmation_timeout_secs: u64,
    /// Delay between two receipt polls.
    pub poll_interval_ms: u64,
    /// Extra gas added on top of `eth_estimateGas`, in percent.
    pub gas_margin_percent: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: Url::parse("http://127.0.0.1:8545/").expect("static URL is valid"),
            chain_id: 31337,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 1000,
            gas_margin_percent: 20,
        }
    }
}

impl NetworkConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Where the signing key comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Hex-encoded private key. Prefer `private_key_env` outside of local devnets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Name of the environment variable holding the private key.
    pub private_key_env: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            private_key_env: DEFAULT_PRIVATE_KEY_ENV.to_string(),
        }
    }
}

impl SignerConfig {
    /// Resolve the configured credential into a signer.
    pub fn load_signer(&self) -> Result<PrivateKeySigner> {
        let key = match &self.private_key {
            Some(key) => key.clone(),
            None => std::env::var(&self.private_key_env).context(format!(
                "No private key configured and {} is not set",
                self.private_key_env
            ))?,
        };

        key.trim()
            .parse::<PrivateKeySigner>()
            .context("Failed to parse private key")
    }
}

/// Which artifacts make up the controller handoff plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// Directory holding compiled artifacts (Hardhat `artifacts/` or Foundry `out/`).
    pub artifacts_dir: PathBuf,
    /// First asset contract handed to the controller.
    pub asset_a: String,
    /// Second asset contract handed to the controller.
    pub asset_b: String,
    /// Controller contract, constructed with both asset addresses.
    pub controller: String,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            asset_a: "GeneNFT".to_string(),
            asset_b: "PostCovidStrokePrevention".to_string(),
            controller: "Controller".to_string(),
        }
    }
}

/// Plan execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Append a verification step reading back the owners.
    pub verify: bool,
    /// What an owner mismatch does to the plan.
    pub verification_policy: VerificationPolicy,
    /// Upper bound for a single step, on top of the confirmation timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            verify: true,
            verification_policy: VerificationPolicy::default(),
            step_timeout_secs: None,
        }
    }
}

impl From<&ExecutionConfig> for ExecutorOptions {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            verification_policy: config.verification_policy,
            step_timeout: config.step_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Complete configuration of a handoff run.
///
/// Can be serialized to/from TOML format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Directory receiving the deployment record.
    #[serde(default = "default_outdata")]
    pub outdata: PathBuf,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

fn default_outdata() -> PathBuf {
    PathBuf::from("deployments")
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            outdata: default_outdata(),
            network: NetworkConfig::default(),
            signer: SignerConfig::default(),
            contracts: ContractsConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl HandoffConfig {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize handoff config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from `Handoff.toml` inside a directory.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Where the deployment record of a run is written.
    pub fn record_path(&self) -> PathBuf {
        self.outdata.join(crate::RECORD_FILENAME)
    }
}
