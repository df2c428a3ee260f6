//! The orchestrator's session record and the values derived from it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use zkapp_lib::{Field, PublicKey, TxHash};

/// Stage of the transaction pipeline at which a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    RefreshAccount,
    Build,
    Prove,
    Serialize,
    Submit,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::RefreshAccount => "refreshing account",
            Self::Build => "building transaction",
            Self::Prove => "creating proof",
            Self::Serialize => "serializing transaction",
            Self::Submit => "sending transaction",
        };
        f.write_str(stage)
    }
}

/// Most recent user-visible condition raised by an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    WalletMissing,
    SetupIncomplete(String),
    ContractNotFound,
    /// The contract lookup failed without an answer.
    ContractUnavailable(String),
    WalletDisconnected,
    TransactionFailed { stage: PipelineStage, reason: String },
    RefreshFailed(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WalletMissing => write!(f, "Could not find a wallet"),
            Self::SetupIncomplete(reason) => write!(f, "Setup incomplete: {reason}"),
            Self::ContractNotFound => {
                write!(f, "zkApp account not found; counter value unknown")
            }
            Self::ContractUnavailable(reason) => {
                write!(f, "Could not fetch zkApp account ({reason}); counter value unknown")
            }
            Self::WalletDisconnected => write!(f, "Wallet disconnected; transaction not sent"),
            Self::TransactionFailed { stage, reason } => {
                write!(f, "Transaction failed while {stage}: {reason}")
            }
            Self::RefreshFailed(reason) => write!(f, "Could not refresh counter: {reason}"),
        }
    }
}

/// The orchestrator's single mutable record for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub setup_complete: bool,
    /// `None` until setup has checked for a wallet.
    pub wallet_detected: Option<bool>,
    pub account_confirmed_funded: bool,
    pub observed_counter_value: Option<Field>,
    pub local_account_key: Option<PublicKey>,
    pub contract_account_key: Option<PublicKey>,
    pub transaction_in_flight: bool,
    pub setup_in_progress: bool,
    pub poll_in_progress: bool,
    pub refresh_in_progress: bool,
    pub last_transaction: Option<TxHash>,
    pub notice: Option<Notice>,
}

/// Coarse position in the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Uninitialized,
    Initializing,
    SetupIncomplete,
    WalletAbsent,
    AwaitingFunding,
    Funded,
    SubmittingTransaction,
    RefreshingValue,
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        if self.setup_in_progress {
            return Phase::Initializing;
        }
        if !self.setup_complete {
            return match self.notice {
                Some(Notice::SetupIncomplete(_)) => Phase::SetupIncomplete,
                _ => Phase::Uninitialized,
            };
        }
        if self.wallet_detected == Some(false) {
            return Phase::WalletAbsent;
        }
        if !self.account_confirmed_funded {
            return Phase::AwaitingFunding;
        }
        if self.transaction_in_flight {
            Phase::SubmittingTransaction
        } else if self.refresh_in_progress {
            Phase::RefreshingValue
        } else {
            Phase::Funded
        }
    }

    /// Setup finished with a wallet and both account keys resolved.
    pub fn is_ready(&self) -> bool {
        self.setup_complete
            && self.wallet_detected == Some(true)
            && self.local_account_key.is_some()
            && self.contract_account_key.is_some()
    }
}

/// Re-entry flags of the four operations
#[derive(Debug, Clone, Copy)]
pub(crate) enum Flag {
    Setup,
    Poll,
    InFlight,
    Refresh,
}

impl Flag {
    pub(crate) fn slot(self, state: &mut SessionState) -> &mut bool {
        match self {
            Self::Setup => &mut state.setup_in_progress,
            Self::Poll => &mut state.poll_in_progress,
            Self::InFlight => &mut state.transaction_in_flight,
            Self::Refresh => &mut state.refresh_in_progress,
        }
    }
}

/// Clears a raised flag however the operation that raised it ends, including
/// when its future is dropped mid-flight.
pub(crate) struct SessionFlag<'a> {
    state: &'a Mutex<SessionState>,
    flag: Flag,
}

impl<'a> SessionFlag<'a> {
    /// Take ownership of a flag the caller has already raised under the lock.
    pub(crate) fn armed(state: &'a Mutex<SessionState>, flag: Flag) -> Self {
        Self { state, flag }
    }
}

impl Drop for SessionFlag<'_> {
    fn drop(&mut self) {
        *self.flag.slot(&mut self.state.lock()) = false;
    }
}
