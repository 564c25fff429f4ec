//! Contract creation.

use alloy::dyn_abi::DynSolValue;

use crate::{
    ConstructorArg, DeployedContract, DeploymentSpec, LedgerClient, ResultTable, StepError, abi,
    ledger::TxRequest,
};

/// Deploys one [`DeploymentSpec`] at a time.
pub struct ContractDeployer<'a, L> {
    ledger: &'a L,
}

impl<'a, L: LedgerClient> ContractDeployer<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Deploy `spec` and wait until the creation is confirmed.
    ///
    /// `Deployed` arguments are resolved against `table`; a missing entry fails
    /// with [`StepError::UnresolvedReference`] before anything is submitted.
    pub async fn deploy(
        &self,
        step: &str,
        spec: &DeploymentSpec,
        table: &ResultTable,
    ) -> Result<DeployedContract, StepError> {
        let failed = |cause: String| StepError::DeploymentFailed {
            contract: spec.name.clone(),
            cause,
        };

        if spec.artifact.bytecode.is_empty() {
            return Err(failed(
                "artifact has no bytecode (abstract contract or interface?)".to_string(),
            ));
        }

        let args = resolve_args(step, &spec.args, table)?;
        let code = abi::encode_creation(&spec.artifact.bytecode, args);

        tracing::info!(
            contract = %spec.name,
            args = spec.args.len(),
            code_len = code.len(),
            "Deploying contract..."
        );

        let handle = self
            .ledger
            .submit_transaction(TxRequest::create(code))
            .await
            .map_err(|e| StepError::deployment(&spec.name, e))?;

        tracing::debug!(
            contract = %spec.name,
            tx_hash = %handle.hash,
            "Waiting for confirmation..."
        );

        let receipt = self
            .ledger
            .wait_for_confirmation(&handle)
            .await
            .map_err(|e| StepError::deployment(&spec.name, e))?;

        if !receipt.success {
            return Err(failed(format!(
                "creation transaction {} reverted in block {}",
                receipt.tx_hash, receipt.block_number
            )));
        }

        let address = receipt.contract_address.ok_or_else(|| {
            failed(format!(
                "receipt of {} carries no contract address",
                receipt.tx_hash
            ))
        })?;

        tracing::info!(
            contract = %spec.name,
            address = %address,
            block = receipt.block_number,
            "Contract deployed"
        );

        Ok(DeployedContract {
            name: spec.name.clone(),
            address,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            block_hash: receipt.block_hash,
            ownable: spec.artifact.is_ownable(),
        })
    }
}

/// Encode constructor arguments, substituting confirmed addresses for references.
fn resolve_args(
    step: &str,
    args: &[ConstructorArg],
    table: &ResultTable,
) -> Result<Vec<DynSolValue>, StepError> {
    args.iter()
        .map(|arg| match arg {
            ConstructorArg::Address(address) => Ok(DynSolValue::Address(*address)),
            ConstructorArg::Uint(value) => Ok(DynSolValue::Uint(*value, 256)),
            ConstructorArg::Bool(value) => Ok(DynSolValue::Bool(*value)),
            ConstructorArg::Deployed(name) => table
                .resolve(step, name)
                .map(|contract| DynSolValue::Address(contract.address)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::{Address, U256};

    use super::*;

    #[test]
    fn test_resolve_args_in_order() {
        let args = resolve_args(
            "deploy-X",
            &[
                ConstructorArg::Address(Address::with_last_byte(0xaa)),
                ConstructorArg::Uint(U256::from(7)),
                ConstructorArg::Bool(true),
            ],
            &ResultTable::default(),
        )
        .unwrap();

        assert_eq!(
            args,
            vec![
                DynSolValue::Address(Address::with_last_byte(0xaa)),
                DynSolValue::Uint(U256::from(7), 256),
                DynSolValue::Bool(true),
            ]
        );
    }

    #[test]
    fn test_resolve_args_unknown_reference() {
        let err = resolve_args(
            "deploy-Controller",
            &[ConstructorArg::Deployed("GeneNFT".into())],
            &ResultTable::default(),
        )
        .unwrap_err();

        assert_eq!(
            err,
            StepError::UnresolvedReference {
                step: "deploy-Controller".into(),
                reference: "GeneNFT".into()
            }
        );
    }
}
