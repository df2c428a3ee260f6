#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod types;

pub use client::MinaGraphQLClient;
pub use config::{Config, ContractConfig, MonitoringConfig, NetworkConfig, TransactionConfig, WalletConfig};
pub use error::{LedgerError, Result};
pub use ledger::{GraphQLLedger, Ledger};
pub use types::SyncStatus;
