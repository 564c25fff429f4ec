//! Error taxonomy for ledger access, plan validation and step execution.

use std::time::Duration;

use alloy_core::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Failure reported by a [`crate::LedgerClient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum LedgerError {
    /// The endpoint could not be reached or the transport failed.
    #[error("ledger endpoint unavailable: {0}")]
    Unavailable(String),
    /// The node answered with a JSON-RPC error.
    #[error("{method} rejected by node: {message}")]
    Rejected { method: String, message: String },
    /// No receipt showed up before the confirmation deadline.
    #[error("transaction {tx_hash} not confirmed after {waited:?}")]
    Timeout { tx_hash: B256, waited: Duration },
    /// The node answered with something we could not decode.
    #[error("malformed ledger response: {0}")]
    Malformed(String),
    /// The endpoint serves a different chain than the one configured.
    #[error("endpoint serves chain {actual}, expected {expected}")]
    ChainMismatch { expected: u64, actual: u64 },
    #[error("failed to sign transaction: {0}")]
    Signing(String),
}

impl LedgerError {
    /// Whether the error comes from the transport rather than from the node.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Static problems found while building a [`crate::Plan`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("step name `{0}` is used more than once")]
    DuplicateStep(String),
    #[error("contract `{0}` is deployed more than once")]
    DuplicateContract(String),
    #[error("step `{step}` references unknown contract `{reference}`")]
    UnknownReference { step: String, reference: String },
    #[error("step `{step}` references `{reference}` before it is deployed")]
    ForwardReference { step: String, reference: String },
    #[error("step `{step}` transfers `{contract}` which does not expose owner()/transferOwnership(address)")]
    NotOwnable { step: String, contract: String },
    #[error("contract `{contract}` constructor takes {expected} argument(s), {given} given")]
    ArgumentCount {
        contract: String,
        expected: usize,
        given: usize,
    },
}

/// Failure of a single plan step. The first one aborts the plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum StepError {
    #[error("deployment of `{contract}` failed: {cause}")]
    DeploymentFailed { contract: String, cause: String },
    #[error("ownership transfer of `{contract}` to {new_owner} failed: {cause}")]
    TransferFailed {
        contract: String,
        new_owner: Address,
        cause: String,
    },
    #[error("{} contract(s) not owned by controller {controller}: {}", .mismatched.len(), .mismatched.join(", "))]
    VerificationMismatch {
        controller: Address,
        mismatched: Vec<String>,
    },
    #[error("network unavailable: {0}")]
    NetworkUnavailable(#[source] LedgerError),
    #[error("step `{step}` needs `{reference}` which has no confirmed deployment")]
    UnresolvedReference { step: String, reference: String },
    #[error("step `{step}` did not finish within {after:?}")]
    Timeout { step: String, after: Duration },
    #[error("plan cancelled while `{step}` was in flight")]
    Cancelled { step: String },
}

impl StepError {
    pub(crate) fn deployment(contract: &str, err: LedgerError) -> Self {
        if err.is_unavailable() {
            return Self::NetworkUnavailable(err);
        }
        Self::DeploymentFailed {
            contract: contract.to_string(),
            cause: err.to_string(),
        }
    }

    pub(crate) fn transfer(contract: &str, new_owner: Address, err: LedgerError) -> Self {
        if err.is_unavailable() {
            return Self::NetworkUnavailable(err);
        }
        Self::TransferFailed {
            contract: contract.to_string(),
            new_owner,
            cause: err.to_string(),
        }
    }
}
