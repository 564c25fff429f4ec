//! Compiled contract artifacts (bytecode + ABI).
//!
//! Both the Hardhat layout (`artifacts/contracts/<Name>.sol/<Name>.json`, with
//! `bytecode` as a hex string) and the Foundry layout (`out/<Name>.sol/<Name>.json`,
//! with `bytecode.object`) are accepted, as well as a flat `<dir>/<Name>.json`.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::abi::{OWNER_SIGNATURE, TRANSFER_OWNERSHIP_SIGNATURE};

/// One parameter of an ABI entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// One entry of a contract ABI. Only the fields we inspect are kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbiItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
}

impl AbiItem {
    pub fn function(name: &str, inputs: &[&str]) -> Self {
        Self {
            kind: "function".to_string(),
            name: Some(name.to_string()),
            inputs: params(inputs),
        }
    }

    pub fn constructor(inputs: &[&str]) -> Self {
        Self {
            kind: "constructor".to_string(),
            name: None,
            inputs: params(inputs),
        }
    }

    /// Canonical signature, e.g. `transferOwnership(address)`.
    pub fn signature(&self) -> Option<String> {
        let name = self.name.as_ref()?;
        let types: Vec<&str> = self.inputs.iter().map(|p| p.kind.as_str()).collect();
        Some(format!("{}({})", name, types.join(",")))
    }
}

fn params(kinds: &[&str]) -> Vec<AbiParam> {
    kinds
        .iter()
        .map(|kind| AbiParam {
            name: String::new(),
            kind: kind.to_string(),
        })
        .collect()
}

/// A compiled contract ready to be deployed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default)]
    pub contract_name: String,
    #[serde(default)]
    pub abi: Vec<AbiItem>,
    #[serde(deserialize_with = "deserialize_bytecode")]
    pub bytecode: Bytes,
}

/// `bytecode` is a plain hex string for Hardhat and `{ "object": "0x.." }` for Foundry.
#[derive(Deserialize)]
#[serde(untagged)]
enum BytecodeRepr {
    Hex(Bytes),
    Object { object: Bytes },
}

fn deserialize_bytecode<'de, D>(deserializer: D) -> std::result::Result<Bytes, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match BytecodeRepr::deserialize(deserializer)? {
        BytecodeRepr::Hex(bytes) => bytes,
        BytecodeRepr::Object { object } => object,
    })
}

impl Artifact {
    pub fn new(name: impl Into<String>, bytecode: Bytes, abi: Vec<AbiItem>) -> Self {
        Self {
            contract_name: name.into(),
            abi,
            bytecode,
        }
    }

    /// Candidate paths for a contract inside an artifacts directory, most specific first.
    pub fn candidate_paths(dir: &Path, name: &str) -> Vec<PathBuf> {
        let file = format!("{name}.json");
        let source_dir = format!("{name}.sol");
        vec![
            dir.join("contracts").join(&source_dir).join(&file),
            dir.join(&source_dir).join(&file),
            dir.join(&file),
        ]
    }

    /// Load the artifact of contract `name` from `dir`.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let candidates = Self::candidate_paths(dir, name);
        let path = candidates.iter().find(|p| p.is_file()).with_context(|| {
            format!(
                "No artifact found for contract {} in {} (did you compile the contracts?)",
                name,
                dir.display()
            )
        })?;

        Self::load_from_file(path, name)
    }

    /// Load an artifact from an explicit file. `name` is used when the file
    /// does not carry a `contractName` (Foundry output).
    pub fn load_from_file(path: &Path, name: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read artifact from {}", path.display()))?;
        let mut artifact: Self = serde_json::from_str(&content)
            .context(format!("Failed to parse artifact {}", path.display()))?;

        if artifact.contract_name.is_empty() {
            artifact.contract_name = name.to_string();
        }

        tracing::debug!(
            contract = %artifact.contract_name,
            path = %path.display(),
            bytecode_len = artifact.bytecode.len(),
            "Artifact loaded"
        );
        Ok(artifact)
    }

    /// Whether the ABI is known. An artifact without ABI skips ABI-based checks.
    pub fn has_abi(&self) -> bool {
        !self.abi.is_empty()
    }

    /// Whether the contract exposes `owner()` and `transferOwnership(address)`.
    ///
    /// Returns `true` when the ABI is unknown; the network stays the authority.
    pub fn is_ownable(&self) -> bool {
        if !self.has_abi() {
            return true;
        }
        let has = |signature: &str| {
            self.abi
                .iter()
                .filter(|item| item.kind == "function")
                .any(|item| item.signature().as_deref() == Some(signature))
        };
        has(OWNER_SIGNATURE) && has(TRANSFER_OWNERSHIP_SIGNATURE)
    }

    /// Number of constructor inputs declared by the ABI, if the ABI is known.
    pub fn constructor_arity(&self) -> Option<usize> {
        if !self.has_abi() {
            return None;
        }
        Some(
            self.abi
                .iter()
                .find(|item| item.kind == "constructor")
                .map(|item| item.inputs.len())
                .unwrap_or(0),
        )
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    const HARDHAT_ARTIFACT: &str = r#"{
        "_format": "hh-sol-artifact-1",
        "contractName": "Controller",
        "sourceName": "contracts/Controller.sol",
        "abi": [
            {
                "inputs": [
                    { "internalType": "address", "name": "nftAddress", "type": "address" },
                    { "internalType": "address", "name": "pcspAddress", "type": "address" }
                ],
                "stateMutability": "nonpayable",
                "type": "constructor"
            },
            {
                "inputs": [{ "internalType": "string", "name": "docId", "type": "string" }],
                "name": "uploadData",
                "outputs": [],
                "stateMutability": "nonpayable",
                "type": "function"
            }
        ],
        "bytecode": "0x6080604052",
        "deployedBytecode": "0x6080"
    }"#;

    const FOUNDRY_ARTIFACT: &str = r#"{
        "abi": [
            { "type": "function", "name": "owner", "inputs": [], "outputs": [{ "name": "", "type": "address" }] },
            { "type": "function", "name": "transferOwnership", "inputs": [{ "name": "newOwner", "type": "address" }] }
        ],
        "bytecode": { "object": "0x60806040", "linkReferences": {} }
    }"#;

    #[test]
    fn test_load_hardhat_layout() {
        let temp_dir = TempDir::new("handoff-test").expect("Failed to create temp dir");
        let dir = temp_dir.path().join("contracts").join("Controller.sol");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Controller.json"), HARDHAT_ARTIFACT).unwrap();

        let artifact = Artifact::load(temp_dir.path(), "Controller").expect("Failed to load");

        assert_eq!(artifact.contract_name, "Controller");
        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80, 0x60, 0x40, 0x52]);
        assert_eq!(artifact.constructor_arity(), Some(2));
        assert!(!artifact.is_ownable());
    }

    #[test]
    fn test_load_foundry_layout() {
        let temp_dir = TempDir::new("handoff-test").expect("Failed to create temp dir");
        let dir = temp_dir.path().join("GeneNFT.sol");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("GeneNFT.json"), FOUNDRY_ARTIFACT).unwrap();

        let artifact = Artifact::load(temp_dir.path(), "GeneNFT").expect("Failed to load");

        assert_eq!(artifact.contract_name, "GeneNFT");
        assert_eq!(artifact.bytecode.len(), 4);
        assert!(artifact.is_ownable());
        assert_eq!(artifact.constructor_arity(), Some(0));
    }

    #[test]
    fn test_missing_artifact() {
        let temp_dir = TempDir::new("handoff-test").expect("Failed to create temp dir");
        let err = Artifact::load(temp_dir.path(), "Missing").unwrap_err();
        assert!(err.to_string().contains("No artifact found for contract Missing"));
    }

    #[test]
    fn test_unknown_abi_is_permissive() {
        let artifact = Artifact::new("Opaque", Bytes::from_static(&[0x00]), vec![]);
        assert!(artifact.is_ownable());
        assert_eq!(artifact.constructor_arity(), None);
    }
}
