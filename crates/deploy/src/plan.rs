//! Typed deployment plan.
//!
//! A plan is an ordered list of [`Step`]s. The declared order must already be a
//! topological order of the dependency graph: [`Plan::new`] rejects any step that
//! references a contract which is not deployed by an earlier step.

use std::collections::{HashMap, HashSet};

use alloy_core::primitives::{Address, U256};
use derive_more::Deref;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Artifact, PlanError};

/// Name of the verification step appended by [`Plan::controller_handoff`].
pub const VERIFY_STEP_NAME: &str = "verify";

/// One constructor argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ConstructorArg {
    Address(Address),
    Uint(U256),
    Bool(bool),
    /// Address of a contract deployed by an earlier step.
    Deployed(String),
}

/// A contract to deploy: artifact plus constructor arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentSpec {
    /// Symbolic name, unique within a plan. Defaults to the artifact's contract name.
    pub name: String,
    pub artifact: Artifact,
    pub args: Vec<ConstructorArg>,
}

impl DeploymentSpec {
    pub fn new(artifact: Artifact) -> Self {
        Self {
            name: artifact.contract_name.clone(),
            artifact,
            args: Vec::new(),
        }
    }

    pub fn named(name: impl Into<String>, artifact: Artifact) -> Self {
        Self {
            name: name.into(),
            artifact,
            args: Vec::new(),
        }
    }

    /// Append a constructor argument.
    pub fn arg(mut self, arg: ConstructorArg) -> Self {
        self.args.push(arg);
        self
    }

    /// Names of the deployments this spec needs addresses from.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(|arg| match arg {
            ConstructorArg::Deployed(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

/// Target of an ownership transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OwnerRef {
    Deployed(String),
    Address(Address),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeployStep {
    pub name: String,
    pub spec: DeploymentSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferStep {
    pub name: String,
    /// Contract whose ownership moves.
    pub contract: String,
    pub new_owner: OwnerRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerifyStep {
    pub name: String,
    /// Contract expected to own every entry of `contracts`.
    pub controller: String,
    pub contracts: Vec<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StepKind {
    Deploy,
    Transfer,
    Verify,
}

/// A single plan step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "lowercase")]
pub enum Step {
    Deploy(DeployStep),
    Transfer(TransferStep),
    Verify(VerifyStep),
}

impl Step {
    /// Deploy `spec`, as step `deploy-<name>`.
    pub fn deploy(spec: DeploymentSpec) -> Self {
        Self::Deploy(DeployStep {
            name: format!("deploy-{}", spec.name),
            spec,
        })
    }

    /// Transfer ownership of `contract` to `new_owner`, as step `transfer-<contract>`.
    pub fn transfer(contract: impl Into<String>, new_owner: OwnerRef) -> Self {
        let contract = contract.into();
        Self::Transfer(TransferStep {
            name: format!("transfer-{contract}"),
            contract,
            new_owner,
        })
    }

    pub fn verify(controller: impl Into<String>, contracts: Vec<String>) -> Self {
        Self::Verify(VerifyStep {
            name: VERIFY_STEP_NAME.to_string(),
            controller: controller.into(),
            contracts,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Deploy(step) => &step.name,
            Self::Transfer(step) => &step.name,
            Self::Verify(step) => &step.name,
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Self::Deploy(_) => StepKind::Deploy,
            Self::Transfer(_) => StepKind::Transfer,
            Self::Verify(_) => StepKind::Verify,
        }
    }

    /// Contracts that must be confirmed before this step may run.
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Self::Deploy(step) => step.spec.dependencies().collect(),
            Self::Transfer(step) => {
                let mut deps = vec![step.contract.as_str()];
                if let OwnerRef::Deployed(owner) = &step.new_owner {
                    deps.push(owner.as_str());
                }
                deps
            }
            Self::Verify(step) => std::iter::once(step.controller.as_str())
                .chain(step.contracts.iter().map(String::as_str))
                .collect(),
        }
    }
}

/// Validated, ordered list of steps.
#[derive(Debug, Clone, PartialEq, Eq, Deref, Serialize)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    /// Validate `steps` and build a plan.
    pub fn new(steps: Vec<Step>) -> Result<Self, PlanError> {
        let declared: HashSet<&str> = steps
            .iter()
            .filter_map(|step| match step {
                Step::Deploy(deploy) => Some(deploy.spec.name.as_str()),
                _ => None,
            })
            .collect();

        let mut names = HashSet::new();
        let mut deployed: HashMap<&str, &DeploymentSpec> = HashMap::new();

        for step in &steps {
            if !names.insert(step.name()) {
                return Err(PlanError::DuplicateStep(step.name().to_string()));
            }

            for reference in step.dependencies() {
                if deployed.contains_key(reference) {
                    continue;
                }
                let step = step.name().to_string();
                let reference = reference.to_string();
                return Err(if declared.contains(reference.as_str()) {
                    PlanError::ForwardReference { step, reference }
                } else {
                    PlanError::UnknownReference { step, reference }
                });
            }

            match step {
                Step::Deploy(deploy) => {
                    let spec = &deploy.spec;
                    if let Some(expected) = spec.artifact.constructor_arity()
                        && expected != spec.args.len()
                    {
                        return Err(PlanError::ArgumentCount {
                            contract: spec.name.clone(),
                            expected,
                            given: spec.args.len(),
                        });
                    }
                    if deployed.insert(spec.name.as_str(), spec).is_some() {
                        return Err(PlanError::DuplicateContract(spec.name.clone()));
                    }
                }
                Step::Transfer(transfer) => {
                    let source = deployed[transfer.contract.as_str()];
                    if !source.artifact.is_ownable() {
                        return Err(PlanError::NotOwnable {
                            step: transfer.name.clone(),
                            contract: transfer.contract.clone(),
                        });
                    }
                }
                Step::Verify(_) => {}
            }
        }

        Ok(Self { steps })
    }

    /// The controller handoff plan: deploy both assets, deploy the controller
    /// with their addresses, hand both assets to the controller and optionally
    /// verify the resulting owners.
    pub fn controller_handoff(
        asset_a: Artifact,
        asset_b: Artifact,
        controller: Artifact,
        verify: bool,
    ) -> Result<Self, PlanError> {
        let a = DeploymentSpec::new(asset_a);
        let b = DeploymentSpec::new(asset_b);
        let controller = DeploymentSpec::new(controller)
            .arg(ConstructorArg::Deployed(a.name.clone()))
            .arg(ConstructorArg::Deployed(b.name.clone()));

        let (a_name, b_name, controller_name) =
            (a.name.clone(), b.name.clone(), controller.name.clone());

        let mut steps = vec![
            Step::deploy(a),
            Step::deploy(b),
            Step::deploy(controller),
            Step::transfer(&a_name, OwnerRef::Deployed(controller_name.clone())),
            Step::transfer(&b_name, OwnerRef::Deployed(controller_name.clone())),
        ];
        if verify {
            steps.push(Step::verify(controller_name, vec![a_name, b_name]));
        }

        Self::new(steps)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The first verification step, if any.
    pub fn verify_step(&self) -> Option<&VerifyStep> {
        self.steps.iter().find_map(|step| match step {
            Step::Verify(verify) => Some(verify),
            _ => None,
        })
    }

    /// SHA-256 over the serialized steps (artifacts included).
    ///
    /// Two runs with the same fingerprint deployed the same code with the same
    /// arguments in the same order.
    pub fn fingerprint(&self) -> String {
        let json =
            serde_json::to_string(&self.steps).expect("Plan serialization should never fail");

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}
