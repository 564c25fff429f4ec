//! Sequential, fail-fast plan execution.

use std::{sync::Arc, time::Duration};

use alloy_core::primitives::Address;
use chrono::Utc;
use tokio::sync::{mpsc, watch};

use crate::{
    ContractDeployer, DeployedContract, LedgerClient, OwnershipTransfer, Plan, PlanFailure,
    PlanResult, ResultTable, StepError, StepEvent, TransferConfirmation, VerificationPolicy,
    VerificationReport, Verifier,
    plan::{OwnerRef, Step, VerifyStep},
};

/// Knobs of a plan execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub verification_policy: VerificationPolicy,
    /// Upper bound for a single step. `None` relies on the ledger's confirmation timeout.
    pub step_timeout: Option<Duration>,
}

/// Cooperative cancellation of a running plan.
///
/// Cloning is cheap; every clone cancels the same execution.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Output of a successful step.
enum StepOutput {
    Deployed(DeployedContract),
    Transferred(TransferConfirmation),
    Verified(VerificationReport),
}

/// Runs a [`Plan`] step by step against a ledger.
pub struct PlanExecutor<L> {
    ledger: L,
    options: ExecutorOptions,
    events: Option<mpsc::UnboundedSender<StepEvent>>,
    cancel: CancelHandle,
}

impl<L: LedgerClient> PlanExecutor<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            options: ExecutorOptions::default(),
            events: None,
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Forward every [`StepEvent`] to `events` as well.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<StepEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Execute `plan` in declared order and stop at the first failure.
    ///
    /// Confirmed outputs stay in the result whatever happens; nothing is
    /// compensated on-chain.
    pub async fn execute(&self, plan: &Plan) -> PlanResult {
        let started_at = Utc::now();
        let sender = self.ledger.sender();

        tracing::info!(
            steps = plan.len(),
            sender = %sender,
            fingerprint = %plan.fingerprint(),
            "Executing deployment plan..."
        );
        self.check_balance(sender).await;

        let mut table = ResultTable::default();
        let mut events = Vec::new();
        let mut verification = None;
        let mut failure = None;
        let mut cancelled = self.cancel.subscribe();

        for (index, step) in plan.iter().enumerate() {
            self.emit(&mut events, StepEvent::started(index, step));

            let already_cancelled = *cancelled.borrow();
            let outcome = if already_cancelled {
                Err(StepError::Cancelled {
                    step: step.name().to_string(),
                })
            } else {
                self.run_guarded(step, &table, &mut cancelled).await
            };

            let error = match outcome {
                Ok(StepOutput::Deployed(contract)) => {
                    let event = StepEvent::succeeded(
                        index,
                        step,
                        Some(contract.address),
                        Some(contract.tx_hash),
                    );
                    table.insert_contract(contract);
                    self.emit(&mut events, event);
                    continue;
                }
                Ok(StepOutput::Transferred(transfer)) => {
                    let event = StepEvent::succeeded(
                        index,
                        step,
                        Some(transfer.contract_address),
                        transfer.tx_hash,
                    );
                    table.insert_transfer(transfer);
                    self.emit(&mut events, event);
                    continue;
                }
                Ok(StepOutput::Verified(report)) => {
                    let outcome = report.enforce(self.options.verification_policy);
                    let controller = report.controller_address;
                    verification = Some(report);

                    match outcome {
                        Ok(()) => {
                            self.emit(
                                &mut events,
                                StepEvent::succeeded(index, step, Some(controller), None),
                            );
                            continue;
                        }
                        Err(error) => error,
                    }
                }
                Err(error) => error,
            };

            self.emit(&mut events, StepEvent::failed(index, step, &error));
            failure = Some(PlanFailure {
                index,
                step: step.name().to_string(),
                kind: step.kind(),
                error,
            });
            break;
        }

        if let Some(plan_failure) = &failure
            && verification.is_none()
            && !matches!(plan_failure.error, StepError::Cancelled { .. })
            && let Some(verify) = plan.verify_step()
        {
            verification = self.diagnose(verify, &table).await;
        }

        let result = PlanResult {
            plan: plan.clone(),
            sender,
            table,
            verification,
            events,
            failure,
            started_at,
            finished_at: Utc::now(),
        };

        match &result.failure {
            None => tracing::info!(
                contracts = result.table.contracts().len(),
                transfers = result.table.transfers().len(),
                "Deployment plan completed"
            ),
            Some(failure) => tracing::error!(
                step = %failure.step,
                index = failure.index,
                error = %failure.error,
                "Deployment plan aborted"
            ),
        }

        result
    }

    /// Run one step under the step timeout, racing it against cancellation.
    async fn run_guarded(
        &self,
        step: &Step,
        table: &ResultTable,
        cancelled: &mut watch::Receiver<bool>,
    ) -> Result<StepOutput, StepError> {
        let run = async {
            match self.options.step_timeout {
                Some(after) => match tokio::time::timeout(after, self.run_step(step, table)).await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(StepError::Timeout {
                        step: step.name().to_string(),
                        after,
                    }),
                },
                None => self.run_step(step, table).await,
            }
        };

        tokio::select! {
            outcome = run => outcome,
            Ok(_) = cancelled.wait_for(|cancelled| *cancelled) => {
                tracing::warn!(
                    step = %step.name(),
                    "Cancelled while waiting, the in-flight transaction may still land"
                );
                Err(StepError::Cancelled { step: step.name().to_string() })
            }
        }
    }

    async fn run_step(&self, step: &Step, table: &ResultTable) -> Result<StepOutput, StepError> {
        match step {
            Step::Deploy(deploy) => ContractDeployer::new(&self.ledger)
                .deploy(&deploy.name, &deploy.spec, table)
                .await
                .map(StepOutput::Deployed),
            Step::Transfer(transfer) => {
                let contract = table.resolve(&transfer.name, &transfer.contract)?;
                let new_owner = match &transfer.new_owner {
                    OwnerRef::Deployed(name) => table.resolve(&transfer.name, name)?.address,
                    OwnerRef::Address(address) => *address,
                };
                OwnershipTransfer::new(&self.ledger)
                    .transfer_ownership(&transfer.name, contract, new_owner)
                    .await
                    .map(StepOutput::Transferred)
            }
            Step::Verify(verify) => {
                let controller = table.resolve(&verify.name, &verify.controller)?;
                let contracts = verify
                    .contracts
                    .iter()
                    .map(|name| table.resolve(&verify.name, name).cloned())
                    .collect::<Result<Vec<_>, _>>()?;
                Verifier::new(&self.ledger)
                    .verify(controller, &contracts)
                    .await
                    .map(StepOutput::Verified)
            }
        }
    }

    /// Best-effort verification of whatever exists after a failure.
    async fn diagnose(
        &self,
        verify: &VerifyStep,
        table: &ResultTable,
    ) -> Option<VerificationReport> {
        let controller = table.get(&verify.controller)?;
        let contracts: Vec<DeployedContract> = verify
            .contracts
            .iter()
            .filter_map(|name| table.get(name).cloned())
            .collect();
        if contracts.is_empty() {
            return None;
        }

        tracing::info!(
            controller = %controller.name,
            contracts = contracts.len(),
            "Reading back ownership of deployed contracts after failure..."
        );

        match Verifier::new(&self.ledger).verify(controller, &contracts).await {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::warn!(error = %err, "Diagnostic verification failed");
                None
            }
        }
    }

    async fn check_balance(&self, sender: Address) {
        match self.ledger.balance(sender).await {
            Ok(balance) if balance.is_zero() => tracing::warn!(
                sender = %sender,
                "Signer has no balance, transactions will be rejected"
            ),
            Ok(balance) => tracing::info!(sender = %sender, balance = %balance, "Signer balance"),
            Err(err) => tracing::warn!(error = %err, "Failed to read signer balance"),
        }
    }

    fn emit(&self, events: &mut Vec<StepEvent>, event: StepEvent) {
        event.log();
        if let Some(tx) = &self.events {
            // A dropped receiver only stops forwarding.
            let _ = tx.send(event.clone());
        }
        events.push(event);
    }
}
