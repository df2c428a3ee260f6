use crate::client::MinaGraphQLClient;
use async_trait::async_trait;
use tracing::{debug, error, warn};
use zkapp_lib::{AccountLookup, PublicKey};

/// Uniform "fetch current account state" call with a tri-state outcome.
///
/// Implementations must report anything that prevented an answer as
/// [`AccountLookup::TransientError`], never as [`AccountLookup::NotFound`].
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn lookup(&self, public_key: &PublicKey) -> AccountLookup;
}

/// Ledger facade over the node's GraphQL endpoint
#[derive(Clone, Debug)]
pub struct GraphQLLedger {
    client: MinaGraphQLClient,
}

impl GraphQLLedger {
    pub fn new(client: MinaGraphQLClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Ledger for GraphQLLedger {
    async fn lookup(&self, public_key: &PublicKey) -> AccountLookup {
        match self.client.get_account(public_key).await {
            Ok(Some(info)) => match info.into_snapshot() {
                Ok(snapshot) => {
                    debug!("Account {} found (nonce {})", public_key, snapshot.nonce);
                    AccountLookup::Found(snapshot)
                }
                Err(e) => {
                    warn!("Malformed account {}: {}", public_key, e);
                    AccountLookup::TransientError(e.to_string())
                }
            },
            Ok(None) => {
                debug!("Account {} not found", public_key);
                AccountLookup::NotFound
            }
            Err(e) => {
                if e.is_recoverable() {
                    warn!("Lookup of {} failed [{}]: {}", public_key, e.error_code(), e);
                } else {
                    error!("Lookup of {} failed [{}]: {}", public_key, e.error_code(), e);
                }
                AccountLookup::TransientError(e.to_string())
            }
        }
    }
}
