#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

pub mod error;
pub mod orchestrator;
pub mod runtime;
pub mod session;
pub mod status;
pub mod transaction;
pub mod wallet;
pub mod worker;

pub use error::{RuntimeError, WalletError};
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, OrchestratorConfig, PollOutcome, RefreshOutcome,
    SetupOutcome, SubmitOutcome,
};
pub use runtime::{LocalRuntime, ProofRuntime};
pub use session::{Notice, Phase, PipelineStage, SessionState};
pub use status::StatusView;
pub use transaction::{ProvedTransaction, UnprovedTransaction, ZkappCommand};
pub use wallet::{NodeWallet, SendTransactionArgs, SendTransactionResult, WalletAdapter, WalletProvider};
pub use worker::ComputeHandle;
