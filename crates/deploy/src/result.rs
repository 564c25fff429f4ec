//! Step outputs, plan results and the persisted deployment record.

use std::{fmt, path::Path};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Plan, StepError, StepKind, VerificationReport, plan::Step};

/// The default name of the deployment record written after a run.
pub const RECORD_FILENAME: &str = "deployment.json";

/// A contract whose creation transaction is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    pub name: String,
    pub address: Address,
    pub tx_hash: B256,
    pub block_number: u64,
    pub block_hash: B256,
    /// Whether the ABI exposes `owner()` and `transferOwnership(address)`.
    pub ownable: bool,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransferStatus {
    /// `transferOwnership` was submitted and confirmed.
    Confirmed,
    /// The owner already was the target; nothing was submitted.
    AlreadyOwned,
}

/// Outcome of an ownership transfer step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfirmation {
    pub step: String,
    pub contract: String,
    pub contract_address: Address,
    pub previous_owner: Address,
    pub new_owner: Address,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub status: TransferStatus,
}

/// Confirmed outputs of the steps run so far, in execution order.
///
/// Only the executor writes to it. Later steps resolve their inputs here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultTable {
    contracts: Vec<DeployedContract>,
    transfers: Vec<TransferConfirmation>,
}

impl ResultTable {
    pub fn contracts(&self) -> &[DeployedContract] {
        &self.contracts
    }

    pub fn transfers(&self) -> &[TransferConfirmation] {
        &self.transfers
    }

    pub fn get(&self, name: &str) -> Option<&DeployedContract> {
        self.contracts.iter().find(|contract| contract.name == name)
    }

    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.get(name).map(|contract| contract.address)
    }

    /// Look up a dependency of `step`.
    pub fn resolve(&self, step: &str, name: &str) -> Result<&DeployedContract, StepError> {
        self.get(name).ok_or_else(|| StepError::UnresolvedReference {
            step: step.to_string(),
            reference: name.to_string(),
        })
    }

    pub fn transfer(&self, step: &str) -> Option<&TransferConfirmation> {
        self.transfers.iter().find(|transfer| transfer.step == step)
    }

    pub(crate) fn insert_contract(&mut self, contract: DeployedContract) {
        self.contracts.push(contract);
    }

    pub(crate) fn insert_transfer(&mut self, transfer: TransferConfirmation) {
        self.transfers.push(transfer);
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StepStatus {
    Started,
    Succeeded,
    Failed,
}

/// Progress event emitted for every step transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    pub index: usize,
    pub step: String,
    pub kind: StepKind,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepEvent {
    fn new(index: usize, step: &Step, status: StepStatus) -> Self {
        Self {
            index,
            step: step.name().to_string(),
            kind: step.kind(),
            status,
            address: None,
            tx_hash: None,
            error: None,
        }
    }

    pub(crate) fn started(index: usize, step: &Step) -> Self {
        Self::new(index, step, StepStatus::Started)
    }

    pub(crate) fn succeeded(
        index: usize,
        step: &Step,
        address: Option<Address>,
        tx_hash: Option<B256>,
    ) -> Self {
        Self {
            address,
            tx_hash,
            ..Self::new(index, step, StepStatus::Succeeded)
        }
    }

    pub(crate) fn failed(index: usize, step: &Step, error: &StepError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(index, step, StepStatus::Failed)
        }
    }

    /// Emit the event as a structured log line.
    pub(crate) fn log(&self) {
        match self.status {
            StepStatus::Started => tracing::info!(
                index = self.index,
                step = %self.step,
                kind = %self.kind,
                "Step started"
            ),
            StepStatus::Succeeded => tracing::info!(
                index = self.index,
                step = %self.step,
                kind = %self.kind,
                address = ?self.address,
                tx_hash = ?self.tx_hash,
                "Step succeeded"
            ),
            StepStatus::Failed => tracing::error!(
                index = self.index,
                step = %self.step,
                kind = %self.kind,
                error = self.error.as_deref().unwrap_or_default(),
                "Step failed"
            ),
        }
    }
}

/// The first step that failed, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFailure {
    pub index: usize,
    pub step: String,
    pub kind: StepKind,
    pub error: StepError,
}

/// Outcome of a plan execution.
///
/// Confirmed outputs are kept whether the plan succeeded or not.
#[derive(Debug, Clone)]
pub struct PlanResult {
    pub plan: Plan,
    pub sender: Address,
    pub table: ResultTable,
    pub verification: Option<VerificationReport>,
    pub events: Vec<StepEvent>,
    pub failure: Option<PlanFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PlanResult {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn contract(&self, name: &str) -> Option<&DeployedContract> {
        self.table.get(name)
    }

    /// Names of the steps that ran (started), in order.
    pub fn executed_steps(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|event| event.status == StepStatus::Started)
            .map(|event| event.step.as_str())
            .collect()
    }

    /// The failing step's error, if any.
    pub fn error(&self) -> Option<&StepError> {
        self.failure.as_ref().map(|failure| &failure.error)
    }
}

impl fmt::Display for PlanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_success() { "SUCCEEDED" } else { "FAILED" };
        writeln!(f, "Plan {} ({} steps)", status, self.plan.len())?;
        writeln!(f)?;

        for (index, step) in self.plan.iter().enumerate() {
            let icon = match &self.failure {
                Some(failure) if failure.index == index => "[FAILED]",
                Some(failure) if failure.index < index => "[skipped]",
                _ => "[ok]",
            };
            write!(f, "  {} {}", icon, step.name())?;
            if let Step::Deploy(deploy) = step
                && let Some(address) = self.table.address_of(&deploy.spec.name)
            {
                write!(f, " {}", address)?;
            }
            if let Some(transfer) = self.table.transfer(step.name()) {
                write!(
                    f,
                    " {} -> {} ({})",
                    transfer.previous_owner, transfer.new_owner, transfer.status
                )?;
            }
            writeln!(f)?;
        }

        if let Some(failure) = &self.failure {
            writeln!(f)?;
            writeln!(
                f,
                "Failed at step {} `{}`: {}",
                failure.index, failure.step, failure.error
            )?;
        }

        if let Some(report) = &self.verification {
            writeln!(f)?;
            write!(f, "{}", report)?;
        }

        Ok(())
    }
}

/// What a run leaves on disk: enough to reconcile a partial deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub plan_fingerprint: String,
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    pub sender: Address,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub contracts: Vec<DeployedContract>,
    pub transfers: Vec<TransferConfirmation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PlanFailure>,
}

impl From<&PlanResult> for DeploymentRecord {
    fn from(result: &PlanResult) -> Self {
        Self {
            plan_fingerprint: result.plan.fingerprint(),
            steps: result.plan.iter().map(|step| step.name().to_string()).collect(),
            chain_id: None,
            sender: result.sender,
            started_at: result.started_at,
            finished_at: result.finished_at,
            success: result.is_success(),
            contracts: result.table.contracts().to_vec(),
            transfers: result.table.transfers().to_vec(),
            verification: result.verification.clone(),
            failure: result.failure.clone(),
        }
    }
}

impl DeploymentRecord {
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Write the record as pretty JSON, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize deployment record")?;
        std::fs::write(path, content)
            .context(format!("Failed to write deployment record to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Deployment record saved");
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read deployment record from {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse deployment record")
    }

    pub fn contract(&self, name: &str) -> Option<&DeployedContract> {
        self.contracts.iter().find(|contract| contract.name == name)
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::{Bytes, address, b256};
    use tempdir::TempDir;

    use super::*;
    use crate::Artifact;

    fn deployed(name: &str, address: Address) -> DeployedContract {
        DeployedContract {
            name: name.to_string(),
            address,
            tx_hash: b256!("1111111111111111111111111111111111111111111111111111111111111111"),
            block_number: 7,
            block_hash: b256!("2222222222222222222222222222222222222222222222222222222222222222"),
            ownable: true,
        }
    }

    fn plan() -> Plan {
        let artifact = |name: &str| Artifact::new(name, Bytes::from_static(&[0x60]), vec![]);
        Plan::controller_handoff(artifact("A"), artifact("B"), artifact("Controller"), true)
            .unwrap()
    }

    fn result(failure: Option<PlanFailure>) -> PlanResult {
        let mut table = ResultTable::default();
        table.insert_contract(deployed("A", address!("00000000000000000000000000000000000000aa")));
        table.insert_contract(deployed("B", address!("00000000000000000000000000000000000000bb")));
        PlanResult {
            plan: plan(),
            sender: address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266"),
            table,
            verification: None,
            events: Vec::new(),
            failure,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_resolve_missing_reference() {
        let table = ResultTable::default();
        assert_eq!(
            table.resolve("deploy-Controller", "A").unwrap_err(),
            StepError::UnresolvedReference {
                step: "deploy-Controller".into(),
                reference: "A".into()
            }
        );
    }

    #[test]
    fn test_display_marks_failed_and_skipped_steps() {
        let result = result(Some(PlanFailure {
            index: 2,
            step: "deploy-Controller".into(),
            kind: StepKind::Deploy,
            error: StepError::DeploymentFailed {
                contract: "Controller".into(),
                cause: "reverted".into(),
            },
        }));

        let output = result.to_string();
        assert!(output.starts_with("Plan FAILED (6 steps)"));
        assert!(output.contains("[ok] deploy-A 0x"));
        assert!(output.contains("[FAILED] deploy-Controller"));
        assert!(output.contains("[skipped] transfer-A"));
        assert!(output.contains("Failed at step 2 `deploy-Controller`"));
    }

    #[test]
    fn test_record_save_and_load() {
        let temp_dir = TempDir::new("handoff-record").expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested").join(RECORD_FILENAME);

        let result = result(None);
        let record = DeploymentRecord::from(&result).with_chain_id(31337);
        record.save_to_file(&path).expect("Failed to save record");

        let loaded = DeploymentRecord::load_from_file(&path).expect("Failed to load record");
        assert_eq!(record, loaded);
        assert!(loaded.success);
        assert_eq!(loaded.plan_fingerprint, result.plan.fingerprint());
        assert_eq!(loaded.steps.len(), 6);
        assert_eq!(
            loaded.contract("B").map(|c| c.address),
            Some(address!("00000000000000000000000000000000000000bb"))
        );
    }
}
