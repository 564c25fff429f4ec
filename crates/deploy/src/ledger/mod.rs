//! Ledger client boundary.
//!
//! The orchestrator only talks to the network through [`LedgerClient`]: submit a
//! signed transaction, wait for its receipt, read contract state. [`RpcLedger`]
//! is the alloy provider implementation used by the CLI.

mod provider;

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

pub use provider::RpcLedger;

use crate::LedgerError;

/// A transaction to submit. `to == None` creates a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
}

impl TxRequest {
    /// Contract creation carrying `code` (bytecode ++ constructor arguments).
    pub fn create(code: Bytes) -> Self {
        Self {
            to: None,
            data: code,
            value: U256::ZERO,
        }
    }

    pub fn call(to: Address, data: Bytes) -> Self {
        Self {
            to: Some(to),
            data,
            value: U256::ZERO,
        }
    }

    pub fn is_creation(&self) -> bool {
        self.to.is_none()
    }
}

/// Handle on a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle {
    pub hash: B256,
}

/// Confirmation receipt of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub block_hash: B256,
    /// Address of the created contract, for creation transactions.
    pub contract_address: Option<Address>,
    /// `false` when the transaction was included but reverted.
    pub success: bool,
}

/// Opaque async boundary to the network.
///
/// Every transaction is signed by a single identity, [`LedgerClient::sender`].
pub trait LedgerClient: Send + Sync {
    /// Address of the identity signing every submitted transaction.
    fn sender(&self) -> Address;

    /// Sign and submit a transaction. Resolves once the node accepted it.
    fn submit_transaction(
        &self,
        tx: TxRequest,
    ) -> impl Future<Output = Result<TxHandle, LedgerError>> + Send;

    /// Suspend until the transaction is included. Implementations must give
    /// up with [`LedgerError::Timeout`] instead of waiting forever.
    fn wait_for_confirmation(
        &self,
        handle: &TxHandle,
    ) -> impl Future<Output = Result<Receipt, LedgerError>> + Send;

    /// Read-only call against the latest state.
    fn read_state(
        &self,
        contract: Address,
        data: Bytes,
    ) -> impl Future<Output = Result<Bytes, LedgerError>> + Send;

    fn balance(&self, address: Address) -> impl Future<Output = Result<U256, LedgerError>> + Send;
}
