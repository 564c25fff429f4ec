//! In-memory ledger used by the integration tests.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use alloy_core::primitives::{Address, B256, Bytes, U256, address, keccak256};
use handoff_deploy::{
    AbiItem, Artifact, LedgerClient, LedgerError, Plan, Receipt, TxHandle, TxRequest, abi,
};

/// Default anvil account.
pub const DEPLOYER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

/// Initialize tracing for tests (idempotent).
pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

/// Ownable artifact with a no-arg constructor.
pub fn asset(name: &str) -> Artifact {
    Artifact::new(
        name,
        Bytes::from(name.as_bytes().to_vec()),
        vec![
            AbiItem::function("owner", &[]),
            AbiItem::function("transferOwnership", &["address"]),
        ],
    )
}

/// Controller artifact taking both asset addresses.
pub fn controller() -> Artifact {
    Artifact::new(
        "Controller",
        Bytes::from_static(b"Controller"),
        vec![
            AbiItem::constructor(&["address", "address"]),
            AbiItem::function("owner", &[]),
        ],
    )
}

pub fn handoff_plan(verify: bool) -> Plan {
    Plan::controller_handoff(
        asset("GeneNFT"),
        asset("PostCovidStrokePrevention"),
        controller(),
        verify,
    )
    .expect("valid plan")
}

/// A transaction seen by the ledger.
#[derive(Debug, Clone)]
pub struct Submission {
    pub to: Option<Address>,
    pub data: Bytes,
    pub hash: B256,
}

impl Submission {
    pub fn is_transfer(&self) -> bool {
        abi::decode_transfer_ownership(&self.data).is_some()
    }
}

#[derive(Debug, Default)]
struct Faults {
    /// Creation with this index (0-based) is rejected by the node.
    reject_creation: Option<usize>,
    /// Creation with this index is included but reverts.
    revert_creation: Option<usize>,
    /// `transferOwnership` on the contract created with this index reverts.
    revert_transfer_of: Option<usize>,
    /// Waiting for the submission with this index (0-based) gives up.
    time_out_confirmation_of: Option<usize>,
    unavailable: bool,
    hang_confirmations: bool,
}

#[derive(Debug)]
struct MockContract {
    creation_index: usize,
    owner: Address,
}

#[derive(Debug, Default)]
struct State {
    nonce: u64,
    block: u64,
    creations: usize,
    contracts: HashMap<Address, MockContract>,
    receipts: HashMap<B256, Receipt>,
    submissions: Vec<Submission>,
    owner_reads: usize,
    faults: Faults,
}

/// Deterministic single-signer ledger. Clones share state.
#[derive(Debug, Clone)]
pub struct MockLedger {
    sender: Address,
    state: Arc<Mutex<State>>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            sender: DEPLOYER,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("mock ledger lock poisoned")
    }

    pub fn reject_creation(self, index: usize) -> Self {
        self.state().faults.reject_creation = Some(index);
        self
    }

    pub fn revert_creation(self, index: usize) -> Self {
        self.state().faults.revert_creation = Some(index);
        self
    }

    pub fn revert_transfer_of(self, creation_index: usize) -> Self {
        self.state().faults.revert_transfer_of = Some(creation_index);
        self
    }

    pub fn hang_confirmations(self) -> Self {
        self.state().faults.hang_confirmations = true;
        self
    }

    pub fn time_out_confirmation_of(self, submission_index: usize) -> Self {
        self.state().faults.time_out_confirmation_of = Some(submission_index);
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().faults.unavailable = unavailable;
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    pub fn transfer_count(&self) -> usize {
        self.submissions().iter().filter(|s| s.is_transfer()).count()
    }

    pub fn owner_reads(&self) -> usize {
        self.state().owner_reads
    }

    pub fn owner_of(&self, contract: Address) -> Option<Address> {
        self.state().contracts.get(&contract).map(|c| c.owner)
    }

    /// Change an owner behind the orchestrator's back.
    pub fn set_owner(&self, contract: Address, owner: Address) {
        if let Some(c) = self.state().contracts.get_mut(&contract) {
            c.owner = owner;
        }
    }

    fn next_receipt(
        state: &mut State,
        hash: B256,
        contract_address: Option<Address>,
        success: bool,
    ) {
        state.block += 1;
        let receipt = Receipt {
            tx_hash: hash,
            block_number: state.block,
            block_hash: keccak256(state.block.to_be_bytes()),
            contract_address,
            success,
        };
        state.receipts.insert(hash, receipt);
    }
}

impl LedgerClient for MockLedger {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn submit_transaction(&self, tx: TxRequest) -> Result<TxHandle, LedgerError> {
        let mut state = self.state();
        if state.faults.unavailable {
            return Err(LedgerError::Unavailable("connection refused".into()));
        }

        let nonce = state.nonce;
        let hash = keccak256([nonce.to_be_bytes().as_slice(), tx.data.as_ref()].concat());

        match tx.to {
            None => {
                let index = state.creations;
                state.creations += 1;
                if state.faults.reject_creation == Some(index) {
                    return Err(LedgerError::Rejected {
                        method: "eth_sendRawTransaction".into(),
                        message: "insufficient funds for gas * price + value".into(),
                    });
                }

                state.nonce += 1;
                state.submissions.push(Submission {
                    to: None,
                    data: tx.data.clone(),
                    hash,
                });

                if state.faults.revert_creation == Some(index) {
                    Self::next_receipt(&mut state, hash, None, false);
                } else {
                    let address = self.sender.create(nonce);
                    state.contracts.insert(
                        address,
                        MockContract {
                            creation_index: index,
                            owner: self.sender,
                        },
                    );
                    Self::next_receipt(&mut state, hash, Some(address), true);
                }
            }
            Some(to) => {
                state.nonce += 1;
                state.submissions.push(Submission {
                    to: Some(to),
                    data: tx.data.clone(),
                    hash,
                });

                let new_owner = abi::decode_transfer_ownership(&tx.data);
                let revert_index = state.faults.revert_transfer_of;
                let success = match (state.contracts.get_mut(&to), new_owner) {
                    (Some(contract), Some(new_owner))
                        if contract.owner == self.sender
                            && revert_index != Some(contract.creation_index) =>
                    {
                        contract.owner = new_owner;
                        true
                    }
                    _ => false,
                };
                Self::next_receipt(&mut state, hash, None, success);
            }
        }

        Ok(TxHandle { hash })
    }

    async fn wait_for_confirmation(&self, handle: &TxHandle) -> Result<Receipt, LedgerError> {
        let hang = self.state().faults.hang_confirmations;
        if hang {
            std::future::pending::<()>().await;
        }

        let state = self.state();
        if state.faults.unavailable {
            return Err(LedgerError::Unavailable("connection refused".into()));
        }
        if let Some(index) = state.faults.time_out_confirmation_of
            && state.submissions.get(index).map(|s| s.hash) == Some(handle.hash)
        {
            return Err(LedgerError::Timeout {
                tx_hash: handle.hash,
                waited: Duration::from_secs(120),
            });
        }
        state
            .receipts
            .get(&handle.hash)
            .cloned()
            .ok_or_else(|| LedgerError::Malformed(format!("unknown transaction {}", handle.hash)))
    }

    async fn read_state(&self, contract: Address, data: Bytes) -> Result<Bytes, LedgerError> {
        let mut state = self.state();
        if state.faults.unavailable {
            return Err(LedgerError::Unavailable("connection refused".into()));
        }

        let owner = state.contracts.get(&contract).map(|c| c.owner);
        match owner {
            Some(owner) if data == abi::owner_call() => {
                state.owner_reads += 1;
                Ok(Bytes::from(owner.into_word().to_vec()))
            }
            _ => Err(LedgerError::Rejected {
                method: "eth_call".into(),
                message: "execution reverted".into(),
            }),
        }
    }

    async fn balance(&self, _address: Address) -> Result<U256, LedgerError> {
        if self.state().faults.unavailable {
            return Err(LedgerError::Unavailable("connection refused".into()));
        }
        Ok(U256::from(10u64).pow(U256::from(18)))
    }
}
