//! GraphQL client for Mina network interactions.

use crate::{
    config::Config,
    error::{LedgerError, Result},
    types::{AccountData, AccountInfo, GraphQLResponse, SendZkappData, SyncStatus, SyncStatusData},
};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;
use zkapp_lib::{MinaNetwork, PublicKey, TxHash};

const ACCOUNT_QUERY: &str = r#"
    query($publicKey: PublicKey!) {
        account(publicKey: $publicKey) {
            publicKey
            balance {
                total
            }
            nonce
            zkappState
            zkappUri
        }
    }
"#;

const SEND_ZKAPP_MUTATION: &str = r#"
    mutation($input: SendZkappInput!) {
        sendZkapp(input: $input) {
            zkapp {
                hash
                id
            }
        }
    }
"#;

const SYNC_STATUS_QUERY: &str = r#"
    query {
        syncStatus
    }
"#;

#[derive(Clone, Debug)]
pub struct MinaGraphQLClient {
    client: reqwest::Client,
    endpoint: Url,
    network: MinaNetwork,
}

impl MinaGraphQLClient {
    pub fn new(endpoint: Url, network: MinaNetwork, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            network,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.network.graphql_url.clone(),
            config.network.name,
            config.request_timeout(),
        )
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn network(&self) -> MinaNetwork {
        self.network
    }

    /// Fetch account information. `Ok(None)` means the ledger has no such account.
    pub async fn get_account(&self, public_key: &PublicKey) -> Result<Option<AccountInfo>> {
        let variables = serde_json::json!({
            "publicKey": public_key.to_base58()
        });

        let data: AccountData = self.execute(ACCOUNT_QUERY, Some(variables)).await?;
        Ok(data.account)
    }

    /// Submit a zkApp command; `command` is its JSON encoding.
    pub async fn send_zkapp(&self, command: &str) -> Result<TxHash> {
        let command: serde_json::Value = serde_json::from_str(command)?;
        let variables = serde_json::json!({
            "input": {
                "zkappCommand": command
            }
        });

        let data: SendZkappData = self.execute(SEND_ZKAPP_MUTATION, Some(variables)).await?;
        Ok(TxHash::new(data.send_zkapp.zkapp.hash))
    }

    pub async fn sync_status(&self) -> Result<SyncStatus> {
        let data: SyncStatusData = self.execute(SYNC_STATUS_QUERY, None).await?;
        Ok(data.sync_status)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Option<serde_json::Value>,
    ) -> Result<T> {
        let body = serde_json::json!({
            "query": query,
            "variables": variables.unwrap_or_else(|| serde_json::json!({}))
        });

        debug!("POST {} ({})", self.endpoint, self.network);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LedgerError::Http {
                status_code: status.as_u16(),
                message,
            });
        }

        let envelope: GraphQLResponse<T> = response.json().await?;
        envelope.into_data()
    }
}
