//! Wallet capability adapter and the wallet providers behind it.

use crate::error::WalletError;
use crate::transaction::ZkappCommand;
use async_trait::async_trait;
use ledger_client::MinaGraphQLClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zkapp_lib::{Fee, FeeConfig, PublicKey, TxHash};

/// Fee payer parameters as the provider receives them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeePayerArgs {
    /// Whole units, e.g. `0.1`.
    pub fee: f64,
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionArgs {
    pub transaction: String,
    pub fee_payer: FeePayerArgs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTransactionResult {
    pub hash: String,
}

/// An externally supplied wallet
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Disclose the user's accounts. Fails when the user declines.
    async fn request_accounts(&self) -> Result<Vec<String>, WalletError>;

    async fn is_connected(&self) -> bool;

    async fn send_transaction(
        &self,
        args: SendTransactionArgs,
    ) -> Result<SendTransactionResult, WalletError>;
}

/// Uniform view over an optional wallet provider.
///
/// Nothing here is retried: absence, declines and disconnection are reported as
/// they are observed.
#[derive(Clone, Default)]
pub struct WalletAdapter {
    provider: Option<Arc<dyn WalletProvider>>,
}

impl std::fmt::Debug for WalletAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletAdapter")
            .field("present", &self.is_present())
            .finish()
    }
}

impl WalletAdapter {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        Self { provider }
    }

    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_present(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn request_accounts(&self) -> Result<Vec<String>, WalletError> {
        let provider = self.provider.as_ref().ok_or(WalletError::NotPresent)?;
        provider.request_accounts().await
    }

    /// An absent wallet is never connected.
    pub async fn is_connected(&self) -> bool {
        match &self.provider {
            Some(provider) => provider.is_connected().await,
            None => false,
        }
    }

    pub async fn submit(&self, payload: String, fee: &FeeConfig) -> Result<TxHash, WalletError> {
        let provider = self.provider.as_ref().ok_or(WalletError::NotPresent)?;
        let args = SendTransactionArgs {
            transaction: payload,
            fee_payer: FeePayerArgs {
                fee: fee.fee.to_mina(),
                memo: fee.memo.clone(),
            },
        };

        let result = provider.send_transaction(args).await?;
        info!("Wallet accepted transaction {}", result.hash);
        Ok(TxHash::new(result.hash))
    }
}

/// Stand-in provider for a node-managed account.
///
/// It fills in the fee payer fee and memo and forwards the command through the
/// node's `sendZkapp`. Nothing is signed here; the command must already carry
/// whatever authorization the node expects.
#[derive(Clone, Debug)]
pub struct NodeWallet {
    address: PublicKey,
    client: MinaGraphQLClient,
}

impl NodeWallet {
    pub fn new(address: PublicKey, client: MinaGraphQLClient) -> Self {
        Self { address, client }
    }

    pub fn address(&self) -> &PublicKey {
        &self.address
    }
}

/// Write the fee payer fee (in nanomina) and memo into a serialized command.
fn apply_fee_payer(transaction: &str, fee_payer: FeePayerArgs) -> Result<String, WalletError> {
    let mut command: ZkappCommand = serde_json::from_str(transaction)?;
    let fee = Fee::from_mina(fee_payer.fee).map_err(|e| WalletError::Provider(e.to_string()))?;

    command.fee_payer.body.fee = fee.nanomina().to_string();
    command.memo = fee_payer.memo;
    Ok(serde_json::to_string(&command)?)
}

#[async_trait]
impl WalletProvider for NodeWallet {
    async fn request_accounts(&self) -> Result<Vec<String>, WalletError> {
        Ok(vec![self.address.to_string()])
    }

    async fn is_connected(&self) -> bool {
        match self.client.sync_status().await {
            Ok(status) => {
                debug!("Node sync status: {:?}", status);
                status.is_online()
            }
            Err(e) => {
                warn!("Node unreachable [{}]: {}", e.error_code(), e);
                false
            }
        }
    }

    async fn send_transaction(
        &self,
        args: SendTransactionArgs,
    ) -> Result<SendTransactionResult, WalletError> {
        let command = apply_fee_payer(&args.transaction, args.fee_payer)?;
        debug!("Forwarding zkApp command for {}", self.address);

        let hash = self.client.send_zkapp(&command).await?;
        Ok(SendTransactionResult {
            hash: hash.as_str().to_string(),
        })
    }
}
