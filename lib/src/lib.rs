#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

pub mod contract;
pub mod types;

pub use contract::{update, ContractProgram, VerificationKey, COUNTER_SLOT, UPDATE_METHOD};
pub use types::*;
