//! [`LedgerClient`] over an alloy HTTP provider.

use std::{future::Future, time::Duration};

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::{RpcError, TransportErrorKind},
};
use alloy_core::primitives::{Address, Bytes, U256};

use super::{LedgerClient, Receipt, TxHandle, TxRequest};
use crate::{LedgerError, NetworkConfig};

impl From<TransactionReceipt> for Receipt {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.unwrap_or_default(),
            block_hash: receipt.block_hash.unwrap_or_default(),
            contract_address: receipt.contract_address,
            success: receipt.status(),
        }
    }
}

/// Ledger client holding the single signing identity of a run.
///
/// A client connected with [`RpcLedger::connect_read_only`] has no identity:
/// its [`LedgerClient::sender`] is the zero address and submissions fail.
pub struct RpcLedger {
    provider: DynProvider,
    sender: Option<Address>,
    chain_id: u64,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    gas_margin_percent: u64,
}

impl RpcLedger {
    /// Connect to the configured endpoint and check that it serves the expected chain.
    pub async fn connect(
        network: &NetworkConfig,
        signer: PrivateKeySigner,
    ) -> Result<Self, LedgerError> {
        let sender = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(network.rpc_url.clone())
            .erased();

        Self::with_provider(network, provider, Some(sender)).await
    }

    /// Connect without a signing key, for owner reads only.
    pub async fn connect_read_only(network: &NetworkConfig) -> Result<Self, LedgerError> {
        let provider = ProviderBuilder::new()
            .connect_http(network.rpc_url.clone())
            .erased();

        Self::with_provider(network, provider, None).await
    }

    async fn with_provider(
        network: &NetworkConfig,
        provider: DynProvider,
        sender: Option<Address>,
    ) -> Result<Self, LedgerError> {
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(rpc_error("eth_chainId"))?;
        if chain_id != network.chain_id {
            return Err(LedgerError::ChainMismatch {
                expected: network.chain_id,
                actual: chain_id,
            });
        }

        tracing::info!(
            rpc_url = %network.rpc_url,
            chain_id,
            sender = ?sender,
            "Connected to ledger endpoint"
        );

        Ok(Self::new(network, provider, sender, chain_id))
    }

    fn new(
        network: &NetworkConfig,
        provider: DynProvider,
        sender: Option<Address>,
        chain_id: u64,
    ) -> Self {
        Self {
            provider,
            sender,
            chain_id,
            confirmation_timeout: network.confirmation_timeout(),
            poll_interval: network.poll_interval(),
            gas_margin_percent: network.gas_margin_percent,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn is_read_only(&self) -> bool {
        self.sender.is_none()
    }
}

impl LedgerClient for RpcLedger {
    fn sender(&self) -> Address {
        self.sender.unwrap_or_default()
    }

    async fn submit_transaction(&self, tx: TxRequest) -> Result<TxHandle, LedgerError> {
        let Some(from) = self.sender else {
            return Err(LedgerError::Signing(
                "ledger connected without a signing key".to_string(),
            ));
        };

        let request = TransactionRequest::default()
            .with_from(from)
            .with_value(tx.value);
        let mut request = match tx.to {
            Some(to) => request.with_to(to).with_input(tx.data),
            None => request.with_deploy_code(tx.data),
        };

        let estimate = self
            .provider
            .estimate_gas(request.clone())
            .await
            .map_err(rpc_error("eth_estimateGas"))?;
        let gas_limit = estimate.saturating_mul(100 + self.gas_margin_percent) / 100;
        request.set_gas_limit(gas_limit);

        // Nonce, fees and chain id are filled in and the request is signed by the wallet.
        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(rpc_error("eth_sendRawTransaction"))?;
        let hash = *pending.tx_hash();

        tracing::debug!(
            tx_hash = %hash,
            gas_limit,
            creation = tx.to.is_none(),
            "Transaction submitted"
        );

        Ok(TxHandle { hash })
    }

    async fn wait_for_confirmation(&self, handle: &TxHandle) -> Result<Receipt, LedgerError> {
        let hash = handle.hash;
        let receipt = poll_until(self.confirmation_timeout, self.poll_interval, || async move {
            self.provider
                .get_transaction_receipt(hash)
                .await
                .map_err(rpc_error("eth_getTransactionReceipt"))
        })
        .await?;

        receipt.map(Receipt::from).ok_or(LedgerError::Timeout {
            tx_hash: hash,
            waited: self.confirmation_timeout,
        })
    }

    async fn read_state(&self, contract: Address, data: Bytes) -> Result<Bytes, LedgerError> {
        let request = TransactionRequest::default()
            .with_to(contract)
            .with_input(data);
        self.provider
            .call(request)
            .await
            .map_err(rpc_error("eth_call"))
    }

    async fn balance(&self, address: Address) -> Result<U256, LedgerError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(rpc_error("eth_getBalance"))
    }
}

/// Map a provider error to [`LedgerError`], keeping the JSON-RPC method for context.
///
/// Transport failures are [`LedgerError::Unavailable`], error objects returned
/// by the node [`LedgerError::Rejected`].
fn rpc_error(method: &'static str) -> impl Fn(RpcError<TransportErrorKind>) -> LedgerError {
    move |err| match err {
        RpcError::Transport(kind) => LedgerError::Unavailable(format!("{method}: {kind}")),
        RpcError::ErrorResp(payload) => LedgerError::Rejected {
            method: method.to_string(),
            message: payload.message.to_string(),
        },
        RpcError::LocalUsageError(err) => LedgerError::Signing(err.to_string()),
        other => LedgerError::Malformed(format!("{method}: {other}")),
    }
}

/// Repeatedly call `check_fn` until it yields a value or `timeout` elapses.
///
/// `Ok(None)` means "not there yet" and schedules another attempt after
/// `interval`. Errors are returned immediately. Returns `Ok(None)` on timeout so
/// the caller can attach its own context.
async fn poll_until<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    check_fn: F,
) -> Result<Option<T>, LedgerError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>, LedgerError>>,
{
    let start = tokio::time::Instant::now();

    loop {
        if let Some(value) = check_fn().await? {
            return Ok(Some(value));
        }

        if start.elapsed() >= timeout {
            return Ok(None);
        }

        tracing::trace!(elapsed = ?start.elapsed(), "Still waiting, polling again...");
        tokio::time::sleep(interval).await;
    }
}
