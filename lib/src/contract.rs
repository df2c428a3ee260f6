//! The "Add" counter zkApp.
//!
//! One state slot (`num`) and one state-mutating method (`update`) that adds
//! [`UPDATE_INCREMENT`] to it. The program description here is what the proof
//! runtime loads and compiles; the verification key is derived from it.

use crate::types::{Field, TypeError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// State slot holding the counter.
pub const COUNTER_SLOT: usize = 0;

/// Amount added by every `update` call.
pub const UPDATE_INCREMENT: u64 = 2;

pub const UPDATE_METHOD: &str = "update";

/// Compute the counter after one `update` call, using normal Rust code.
pub fn update(num: Field) -> Result<Field, TypeError> {
    num.checked_add(UPDATE_INCREMENT)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSlot {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    /// Slots read as preconditions.
    pub reads: Vec<usize>,
    /// Slots written by the method.
    pub writes: Vec<usize>,
}

/// Description of a contract program as handed to the proof runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractProgram {
    pub name: String,
    pub version: u32,
    pub state: Vec<StateSlot>,
    pub methods: Vec<MethodDescriptor>,
}

impl ContractProgram {
    /// The counter contract.
    pub fn add() -> Self {
        Self {
            name: "Add".to_string(),
            version: 1,
            state: vec![StateSlot {
                index: COUNTER_SLOT,
                name: "num".to_string(),
            }],
            methods: vec![MethodDescriptor {
                name: UPDATE_METHOD.to_string(),
                reads: vec![COUNTER_SLOT],
                writes: vec![COUNTER_SLOT],
            }],
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// SHA-256 over the canonical JSON encoding of the description.
    pub fn digest(&self) -> Result<[u8; 32], serde_json::Error> {
        let encoded = serde_json::to_vec(self)?;
        Ok(Sha256::digest(&encoded).into())
    }
}

/// Verification key produced by compiling a [`ContractProgram`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey {
    pub program: String,
    pub hash: String,
}

impl VerificationKey {
    pub fn from_digest(program: &str, digest: [u8; 32]) -> Self {
        Self {
            program: program.to_string(),
            hash: format!("0x{}", hex::encode(digest)),
        }
    }
}
