//! User-facing status derived from a session snapshot.

use crate::session::{Phase, SessionState};
use ledger_client::NetworkConfig;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub phase: Phase,
    pub wallet_missing: Option<String>,
    pub setup: String,
    pub account_unfunded: Option<String>,
    pub counter: Option<String>,
    pub last_transaction: Option<String>,
    pub notice: Option<String>,
    pub can_submit: bool,
    pub can_refresh: bool,
}

/// Pure projection of `state`; equal inputs give equal views.
pub fn project(state: &SessionState, network: &NetworkConfig, install_url: &str) -> StatusView {
    let phase = state.phase();

    let wallet_missing = (state.wallet_detected == Some(false))
        .then(|| format!("Could not find a wallet. Install Auro wallet here: {install_url}"));

    let setup = if state.setup_complete {
        "Proof runtime ready"
    } else {
        "Setting up proof runtime"
    }
    .to_string();

    let account_unfunded = match &state.local_account_key {
        Some(key) if state.setup_complete && !state.account_confirmed_funded => {
            let link = network.faucet_link(key).unwrap_or_else(|| key.to_string());
            Some(format!(
                "Account does not exist. Please visit the faucet to fund this account {link}"
            ))
        }
        _ => None,
    };

    let funded = state.setup_complete && state.account_confirmed_funded;
    let counter = funded.then(|| {
        let value = state
            .observed_counter_value
            .map_or_else(|| "unknown".to_string(), |v| v.to_string());
        format!("Current Number in zkApp {value}")
    });

    let last_transaction = state.last_transaction.as_ref().map(|hash| {
        network.transaction_url(hash).map_or_else(
            || format!("Transaction {hash}"),
            |url| format!("See transaction at {url}"),
        )
    });

    StatusView {
        phase,
        wallet_missing,
        setup,
        account_unfunded,
        counter,
        last_transaction,
        notice: state.notice.as_ref().map(ToString::to_string),
        can_submit: funded && !state.transaction_in_flight,
        can_refresh: funded && !state.refresh_in_progress,
    }
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(line) = &self.wallet_missing {
            writeln!(f, "{line}")?;
        }
        writeln!(f, "{}", self.setup)?;
        for line in [
            &self.account_unfunded,
            &self.counter,
            &self.last_transaction,
            &self.notice,
        ]
        .into_iter()
        .flatten()
        {
            writeln!(f, "{line}")?;
        }
        if self.counter.is_some() {
            let send = if self.can_submit { "send" } else { "send (busy)" };
            write!(f, "[{send}] [refresh]")?;
        }
        Ok(())
    }
}
