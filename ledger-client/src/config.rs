use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use url::Url;
use zkapp_lib::{Fee, FeeConfig, MinaNetwork, PublicKey, TxHash};

/// Address of the deployed counter zkApp on Berkeley.
pub const DEFAULT_ZKAPP_ADDRESS: &str = "B62qjWUofRaBpJypv6DVcVuLic6KkJhBFTwJc4LanS3nMbebGLfetLf";

pub const DEFAULT_WALLET_INSTALL_URL: &str = "https://www.aurowallet.com/";

/// Maximum memo length accepted by the network, in bytes.
pub const MAX_MEMO_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub contract: ContractConfig,
    pub transaction: TransactionConfig,
    pub wallet: WalletConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: MinaNetwork,
    pub graphql_url: Url,
    pub explorer_url: Option<Url>,
    pub faucet_url: Option<Url>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    pub zkapp_address: PublicKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    pub fee: Fee,
    pub memo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Node-managed account used as the wallet. `None` means no wallet is injected.
    pub address: Option<String>,
    pub install_url: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub polling_interval_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_network(None)
    }

    /// Like [`Config::from_env`], with `network` taking precedence over
    /// `MINA_NETWORK`. Network-dependent defaults follow the chosen network.
    pub fn from_env_with_network(network: Option<MinaNetwork>) -> Result<Self> {
        let network = match network {
            Some(network) => network,
            None => env::var("MINA_NETWORK")
                .unwrap_or_else(|_| "berkeley".to_string())
                .parse()?,
        };

        let graphql_url = match env::var("MINA_GRAPHQL_URL") {
            Ok(url) => Url::parse(&url)
                .map_err(|e| LedgerError::Config(format!("Invalid MINA_GRAPHQL_URL: {e}")))?,
            Err(_) => Self::default_graphql_url(network)?,
        };

        let explorer_url = match env::var("MINA_EXPLORER_URL") {
            Ok(url) => Some(
                Url::parse(&url)
                    .map_err(|e| LedgerError::Config(format!("Invalid MINA_EXPLORER_URL: {e}")))?,
            ),
            Err(_) => Self::default_explorer_url(network),
        };

        let faucet_url = match env::var("MINA_FAUCET_URL") {
            Ok(url) => Some(
                Url::parse(&url)
                    .map_err(|e| LedgerError::Config(format!("Invalid MINA_FAUCET_URL: {e}")))?,
            ),
            Err(_) => Self::default_faucet_url(network),
        };

        let zkapp_address = env::var("ZKAPP_ADDRESS")
            .unwrap_or_else(|_| DEFAULT_ZKAPP_ADDRESS.to_string())
            .parse::<PublicKey>()
            .map_err(|e| LedgerError::InvalidAddress(format!("Invalid ZKAPP_ADDRESS: {e}")))?;

        let fee = env::var("TRANSACTION_FEE")
            .unwrap_or_else(|_| "0.1".to_string())
            .parse::<Fee>()?;

        let install_url = Url::parse(
            &env::var("WALLET_INSTALL_URL").unwrap_or_else(|_| DEFAULT_WALLET_INSTALL_URL.to_string()),
        )
        .map_err(|e| LedgerError::Config(format!("Invalid WALLET_INSTALL_URL: {e}")))?;

        let config = Self {
            network: NetworkConfig {
                name: network,
                graphql_url,
                explorer_url,
                faucet_url,
            },
            contract: ContractConfig { zkapp_address },
            transaction: TransactionConfig {
                fee,
                memo: env::var("TRANSACTION_MEMO").unwrap_or_default(),
            },
            wallet: WalletConfig {
                address: env::var("MINA_WALLET_ADDRESS")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                install_url,
            },
            monitoring: MonitoringConfig {
                polling_interval_seconds: env::var("POLLING_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn default_graphql_url(network: MinaNetwork) -> Result<Url> {
        let url_str = match network {
            MinaNetwork::Mainnet => "https://api.minascan.io/node/mainnet/v1/graphql",
            MinaNetwork::Devnet => "https://api.minascan.io/node/devnet/v1/graphql",
            MinaNetwork::Berkeley => "https://proxy.berkeley.minaexplorer.com/graphql",
            MinaNetwork::Testnet => "https://proxy.testworld.minaprotocol.network/graphql",
        };

        Ok(Url::parse(url_str)?)
    }

    fn default_explorer_url(network: MinaNetwork) -> Option<Url> {
        let url_str = match network {
            MinaNetwork::Mainnet => "https://minaexplorer.com",
            MinaNetwork::Devnet => "https://minascan.io/devnet",
            MinaNetwork::Berkeley => "https://berkeley.minaexplorer.com",
            MinaNetwork::Testnet => return None,
        };

        Url::parse(url_str).ok()
    }

    fn default_faucet_url(network: MinaNetwork) -> Option<Url> {
        if !network.is_testnet() {
            return None;
        }
        Url::parse("https://faucet.minaprotocol.com").ok()
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.network.graphql_url.scheme(), "http" | "https") {
            return Err(LedgerError::Config(
                "GraphQL endpoint must be an http(s) URL".to_string(),
            ));
        }

        if self.monitoring.polling_interval_seconds == 0 {
            return Err(LedgerError::Config(
                "Polling interval must be greater than 0".to_string(),
            ));
        }

        if self.monitoring.request_timeout_seconds == 0 {
            return Err(LedgerError::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.transaction.memo.len() > MAX_MEMO_BYTES {
            return Err(LedgerError::Config(format!(
                "Memo must be at most {MAX_MEMO_BYTES} bytes"
            )));
        }

        Ok(())
    }

    pub fn fee_config(&self) -> FeeConfig {
        FeeConfig {
            fee: self.transaction.fee,
            memo: self.transaction.memo.clone(),
        }
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring.polling_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.monitoring.request_timeout_seconds)
    }
}

impl NetworkConfig {
    /// Explorer page for a submitted transaction.
    pub fn transaction_url(&self, hash: &TxHash) -> Option<String> {
        let base = self.explorer_url.as_ref()?;
        Some(format!(
            "{}/transaction/{}",
            base.as_str().trim_end_matches('/'),
            hash
        ))
    }

    /// Faucet page pre-filled with the account to fund.
    pub fn faucet_link(&self, account: &PublicKey) -> Option<String> {
        let mut url = self.faucet_url.clone()?;
        url.query_pairs_mut().append_pair("address", account.to_base58());
        Some(url.to_string())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                name: MinaNetwork::Berkeley,
                graphql_url: Url::parse("https://proxy.berkeley.minaexplorer.com/graphql").unwrap(),
                explorer_url: Url::parse("https://berkeley.minaexplorer.com").ok(),
                faucet_url: Url::parse("https://faucet.minaprotocol.com").ok(),
            },
            contract: ContractConfig {
                zkapp_address: PublicKey::from_base58(DEFAULT_ZKAPP_ADDRESS).unwrap(),
            },
            transaction: TransactionConfig {
                fee: Fee::default(),
                memo: String::new(),
            },
            wallet: WalletConfig {
                address: None,
                install_url: Url::parse(DEFAULT_WALLET_INSTALL_URL).unwrap(),
            },
            monitoring: MonitoringConfig {
                polling_interval_seconds: 5,
                request_timeout_seconds: 30,
            },
        }
    }
}
