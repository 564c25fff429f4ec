//! handoff-deploy - Contract deployment and ownership handoff orchestration.
//!
//! This crate deploys a set of interdependent contracts in dependency order,
//! hands the ownership of the asset contracts over to a controller contract and
//! verifies the resulting ownership topology.

pub mod abi;

mod artifact;
pub use artifact::{AbiItem, AbiParam, Artifact};

mod config;
pub use config::{
    CONFIG_FILENAME, ContractsConfig, DEFAULT_PRIVATE_KEY_ENV, ExecutionConfig, HandoffConfig,
    NetworkConfig, SignerConfig,
};

mod deployer;
pub use deployer::ContractDeployer;

mod error;
pub use error::{LedgerError, PlanError, StepError};

mod executor;
pub use executor::{CancelHandle, ExecutorOptions, PlanExecutor};

pub mod ledger;
pub use ledger::{LedgerClient, Receipt, RpcLedger, TxHandle, TxRequest};

mod ownership;
pub use ownership::OwnershipTransfer;

pub mod plan;
pub use plan::{ConstructorArg, DeploymentSpec, OwnerRef, Plan, Step, StepKind};

mod result;
pub use result::{
    DeployedContract, DeploymentRecord, PlanFailure, PlanResult, RECORD_FILENAME, ResultTable,
    StepEvent, StepStatus, TransferConfirmation, TransferStatus,
};

mod verify;
pub use verify::{OwnershipCheck, VerificationPolicy, VerificationReport, Verifier};
