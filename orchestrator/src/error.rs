use ledger_client::LedgerError;
use thiserror::Error;
use zkapp_lib::TypeError;

/// Errors raised by the proof runtime or the computation handle in front of it
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Proof runtime not initialized")]
    NotInitialized,

    #[error("Network endpoint not configured")]
    NetworkNotSet,

    #[error("Contract program not loaded")]
    ProgramNotLoaded,

    #[error("Contract program not compiled")]
    NotCompiled,

    #[error("No contract instance bound")]
    InstanceNotBound,

    #[error("Account not cached: {0}")]
    AccountNotCached(String),

    #[error("Account is not a zkApp: {0}")]
    NotAZkapp(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// A pipeline stage was requested without the artifact of the stage before it
    #[error("Pipeline order violated: {0}")]
    PipelineOrder(String),

    #[error("Proof construction failed: {0}")]
    ProofFailed(String),

    #[error("Contract error: {0}")]
    Contract(#[from] TypeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),
}

impl RuntimeError {
    /// Get error code for logging
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::NetworkNotSet => "NETWORK_NOT_SET",
            Self::ProgramNotLoaded => "PROGRAM_NOT_LOADED",
            Self::NotCompiled => "NOT_COMPILED",
            Self::InstanceNotBound => "INSTANCE_NOT_BOUND",
            Self::AccountNotCached(_) => "ACCOUNT_NOT_CACHED",
            Self::NotAZkapp(_) => "NOT_A_ZKAPP",
            Self::MethodNotFound(_) => "METHOD_NOT_FOUND",
            Self::PipelineOrder(_) => "PIPELINE_ORDER",
            Self::ProofFailed(_) => "PROOF_FAILED",
            Self::Contract(_) => "CONTRACT_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::WorkerUnavailable(_) => "WORKER_UNAVAILABLE",
        }
    }
}

/// Errors surfaced by the wallet capability adapter
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("No wallet present")]
    NotPresent,

    #[error("Request rejected by user: {0}")]
    UserRejected(String),

    #[error("Wallet disclosed no accounts")]
    NoAccounts,

    #[error("Wallet provider error: {0}")]
    Provider(String),

    #[error("Invalid transaction payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl WalletError {
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotPresent => "WALLET_NOT_PRESENT",
            Self::UserRejected(_) => "USER_REJECTED",
            Self::NoAccounts => "NO_ACCOUNTS",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::Ledger(_) => "LEDGER_ERROR",
        }
    }
}
