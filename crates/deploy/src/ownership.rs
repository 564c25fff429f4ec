//! `owner()` reads and `transferOwnership(address)` calls.

use alloy_core::primitives::Address;

use crate::{
    DeployedContract, LedgerClient, LedgerError, StepError, TransferConfirmation,
    TransferStatus, abi,
    ledger::TxRequest,
};

/// Moves ownership of deployed contracts.
pub struct OwnershipTransfer<'a, L> {
    ledger: &'a L,
}

impl<'a, L: LedgerClient> OwnershipTransfer<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Current owner of `contract`.
    pub async fn read_owner(&self, contract: Address) -> Result<Address, LedgerError> {
        let data = self.ledger.read_state(contract, abi::owner_call()).await?;
        abi::decode_owner(&data)
    }

    /// Hand `contract` over to `new_owner` and wait for confirmation.
    ///
    /// Reads the owner first: if it already is `new_owner` nothing is submitted
    /// and the confirmation carries [`TransferStatus::AlreadyOwned`].
    pub async fn transfer_ownership(
        &self,
        step: &str,
        contract: &DeployedContract,
        new_owner: Address,
    ) -> Result<TransferConfirmation, StepError> {
        let failed = |cause: String| StepError::TransferFailed {
            contract: contract.name.clone(),
            new_owner,
            cause,
        };

        if !contract.ownable {
            return Err(failed(
                "contract does not expose owner()/transferOwnership(address)".to_string(),
            ));
        }
        if new_owner.is_zero() {
            return Err(failed("new owner is the zero address".to_string()));
        }

        let previous_owner = self
            .read_owner(contract.address)
            .await
            .map_err(|e| StepError::transfer(&contract.name, new_owner, e))?;

        let mut confirmation = TransferConfirmation {
            step: step.to_string(),
            contract: contract.name.clone(),
            contract_address: contract.address,
            previous_owner,
            new_owner,
            tx_hash: None,
            block_number: None,
            status: TransferStatus::AlreadyOwned,
        };

        if previous_owner == new_owner {
            tracing::info!(
                contract = %contract.name,
                owner = %new_owner,
                "Contract already owned by target, skipping transfer"
            );
            return Ok(confirmation);
        }

        let sender = self.ledger.sender();
        if previous_owner != sender {
            tracing::warn!(
                contract = %contract.name,
                owner = %previous_owner,
                sender = %sender,
                "Signer is not the current owner, the transfer will likely revert"
            );
        }

        tracing::info!(
            contract = %contract.name,
            address = %contract.address,
            from = %previous_owner,
            to = %new_owner,
            "Transferring ownership..."
        );

        let handle = self
            .ledger
            .submit_transaction(TxRequest::call(
                contract.address,
                abi::transfer_ownership_call(new_owner),
            ))
            .await
            .map_err(|e| StepError::transfer(&contract.name, new_owner, e))?;

        let receipt = self
            .ledger
            .wait_for_confirmation(&handle)
            .await
            .map_err(|e| StepError::transfer(&contract.name, new_owner, e))?;

        if !receipt.success {
            return Err(failed(format!(
                "transaction {} reverted in block {}",
                receipt.tx_hash, receipt.block_number
            )));
        }

        confirmation.tx_hash = Some(receipt.tx_hash);
        confirmation.block_number = Some(receipt.block_number);
        confirmation.status = TransferStatus::Confirmed;
        Ok(confirmation)
    }
}
