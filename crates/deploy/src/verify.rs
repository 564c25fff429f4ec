//! Post-deployment ownership verification.

use std::fmt;

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{DeployedContract, LedgerClient, OwnershipTransfer, StepError};

/// What an ownership mismatch does to the plan.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VerificationPolicy {
    /// Log the mismatch; the plan still succeeds.
    Warn,
    /// Fail the verify step with [`StepError::VerificationMismatch`].
    #[default]
    Enforce,
}

/// Owner read back for one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipCheck {
    pub contract: String,
    pub address: Address,
    pub expected_owner: Address,
    /// `None` when the owner could not be read.
    pub actual_owner: Option<Address>,
    pub matches: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Observed ownership of a set of contracts against one expected controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub controller: String,
    pub controller_address: Address,
    pub checks: Vec<OwnershipCheck>,
}

impl VerificationReport {
    pub fn all_match(&self) -> bool {
        self.checks.iter().all(|check| check.matches)
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &OwnershipCheck> {
        self.checks.iter().filter(|check| !check.matches)
    }

    pub fn check(&self, contract: &str) -> Option<&OwnershipCheck> {
        self.checks.iter().find(|check| check.contract == contract)
    }

    /// The step error this report amounts to under [`VerificationPolicy::Enforce`].
    pub fn mismatch_error(&self) -> Option<StepError> {
        if self.all_match() {
            return None;
        }
        Some(StepError::VerificationMismatch {
            controller: self.controller_address,
            mismatched: self.mismatches().map(|c| c.contract.clone()).collect(),
        })
    }

    /// Apply `policy`: a mismatch is an error under [`VerificationPolicy::Enforce`]
    /// and only a warning under [`VerificationPolicy::Warn`].
    pub fn enforce(&self, policy: VerificationPolicy) -> Result<(), StepError> {
        match (self.mismatch_error(), policy) {
            (None, _) => Ok(()),
            (Some(error), VerificationPolicy::Enforce) => Err(error),
            (Some(error), VerificationPolicy::Warn) => {
                tracing::warn!(
                    controller = %self.controller_address,
                    error = %error,
                    "Ownership mismatch tolerated by verification policy"
                );
                Ok(())
            }
        }
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.all_match() { "VERIFIED" } else { "MISMATCH" };
        writeln!(
            f,
            "Ownership: {} (expected owner {} {})",
            status, self.controller, self.controller_address
        )?;

        for check in &self.checks {
            let icon = if check.matches { "[ok]" } else { "[MISMATCH]" };
            write!(f, "  {} {} {} owner=", icon, check.contract, check.address)?;
            match check.actual_owner {
                Some(owner) => write!(f, "{}", owner)?,
                None => write!(f, "unknown")?,
            }
            if let Some(error) = &check.error {
                write!(f, " ({})", error)?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

/// Reads back owners. Never writes.
pub struct Verifier<'a, L> {
    ledger: &'a L,
}

impl<'a, L: LedgerClient> Verifier<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Compare the owner of every contract with `controller`.
    ///
    /// Mismatches and failed reads end up in the report. Only a transport failure
    /// aborts with [`StepError::NetworkUnavailable`].
    pub async fn verify(
        &self,
        controller: &DeployedContract,
        contracts: &[DeployedContract],
    ) -> Result<VerificationReport, StepError> {
        let report = self
            .verify_addresses(&controller.name, controller.address, contracts)
            .await?;

        if report.all_match() {
            tracing::info!(
                controller = %controller.name,
                address = %controller.address,
                contracts = report.checks.len(),
                "Ownership verified"
            );
        } else {
            for check in report.mismatches() {
                tracing::warn!(
                    contract = %check.contract,
                    address = %check.address,
                    expected_owner = %check.expected_owner,
                    actual_owner = ?check.actual_owner,
                    error = ?check.error,
                    "Ownership mismatch"
                );
            }
        }

        Ok(report)
    }

    /// Same as [`Verifier::verify`] with an arbitrary expected owner.
    pub async fn verify_addresses(
        &self,
        controller: &str,
        expected_owner: Address,
        contracts: &[DeployedContract],
    ) -> Result<VerificationReport, StepError> {
        let reader = OwnershipTransfer::new(self.ledger);
        let mut checks = Vec::with_capacity(contracts.len());

        for contract in contracts {
            let check = match reader.read_owner(contract.address).await {
                Ok(owner) => OwnershipCheck {
                    contract: contract.name.clone(),
                    address: contract.address,
                    expected_owner,
                    actual_owner: Some(owner),
                    matches: owner == expected_owner,
                    error: None,
                },
                Err(err) if err.is_unavailable() => {
                    return Err(StepError::NetworkUnavailable(err));
                }
                Err(err) => OwnershipCheck {
                    contract: contract.name.clone(),
                    address: contract.address,
                    expected_owner,
                    actual_owner: None,
                    matches: false,
                    error: Some(err.to_string()),
                },
            };

            tracing::debug!(
                contract = %check.contract,
                actual_owner = ?check.actual_owner,
                matches = check.matches,
                "Owner read"
            );
            checks.push(check);
        }

        Ok(VerificationReport {
            controller: controller.to_string(),
            controller_address: expected_owner,
            checks,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;

    use super::*;

    fn report(actual: &[Option<Address>]) -> VerificationReport {
        let expected = address!("00000000000000000000000000000000000000cc");
        VerificationReport {
            controller: "Controller".into(),
            controller_address: expected,
            checks: actual
                .iter()
                .enumerate()
                .map(|(i, owner)| OwnershipCheck {
                    contract: format!("Asset{i}"),
                    address: Address::with_last_byte(i as u8 + 1),
                    expected_owner: expected,
                    actual_owner: *owner,
                    matches: *owner == Some(expected),
                    error: owner.is_none().then(|| "execution reverted".to_string()),
                })
                .collect(),
        }
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "warn".parse::<VerificationPolicy>().unwrap(),
            VerificationPolicy::Warn
        );
        assert_eq!(VerificationPolicy::default(), VerificationPolicy::Enforce);
        assert_eq!(VerificationPolicy::Enforce.to_string(), "enforce");
        assert!("strict".parse::<VerificationPolicy>().is_err());
    }

    #[test]
    fn test_all_match() {
        let controller = address!("00000000000000000000000000000000000000cc");
        let report = report(&[Some(controller), Some(controller)]);
        assert!(report.all_match());
        assert!(report.mismatch_error().is_none());
        assert_eq!(report.enforce(VerificationPolicy::Enforce), Ok(()));
        assert!(report.to_string().starts_with("Ownership: VERIFIED"));
    }

    #[test]
    fn test_mismatch_and_failed_read() {
        let controller = address!("00000000000000000000000000000000000000cc");
        let deployer = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        let report = report(&[Some(controller), Some(deployer), None]);

        assert!(!report.all_match());
        assert_eq!(
            report.mismatches().map(|c| c.contract.as_str()).collect::<Vec<_>>(),
            vec!["Asset1", "Asset2"]
        );
        assert_eq!(
            report.mismatch_error(),
            Some(StepError::VerificationMismatch {
                controller,
                mismatched: vec!["Asset1".into(), "Asset2".into()]
            })
        );

        assert!(report.enforce(VerificationPolicy::Enforce).is_err());
        assert_eq!(report.enforce(VerificationPolicy::Warn), Ok(()));

        let output = report.to_string();
        assert!(output.contains("[ok] Asset0"));
        assert!(output.contains("[MISMATCH] Asset1"));
        assert!(output.contains("owner=unknown (execution reverted)"));
    }
}
