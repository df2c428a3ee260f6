//! Wire types for the Mina GraphQL API.

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use zkapp_lib::{AccountSnapshot, Fee, Field, PublicKey, APP_STATE_SLOTS};

/// Standard GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQLErrorMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLErrorMessage {
    pub message: String,
}

impl<T> GraphQLResponse<T> {
    /// Fails when the server reported errors, otherwise yields `data`.
    pub fn into_data(self) -> Result<T> {
        if !self.errors.is_empty() {
            let messages: Vec<_> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(LedgerError::GraphQL(messages.join("; ")));
        }
        self.data
            .ok_or_else(|| LedgerError::InvalidResponse("response has no data".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct AccountData {
    pub account: Option<AccountInfo>,
}

/// Account information as returned by the node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub balance: AccountBalance,
    pub nonce: String,
    #[serde(rename = "zkappState")]
    pub zkapp_state: Option<Vec<Option<String>>>,
    #[serde(rename = "zkappUri")]
    pub zkapp_uri: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountBalance {
    pub total: String,
}

impl AccountInfo {
    pub fn into_snapshot(self) -> Result<AccountSnapshot> {
        let public_key = PublicKey::from_base58(&self.public_key)?;

        // Nodes report nanomina integers; some proxies render whole-unit decimals.
        let total = self.balance.total.trim();
        let balance_nanomina = match total.parse::<u64>() {
            Ok(nanomina) => nanomina,
            Err(_) => total.parse::<Fee>()?.nanomina(),
        };

        let nonce = self
            .nonce
            .trim()
            .parse::<u64>()
            .map_err(|e| LedgerError::InvalidResponse(format!("invalid nonce {:?}: {e}", self.nonce)))?;

        let app_state = match self.zkapp_state {
            Some(slots) => {
                if slots.len() > APP_STATE_SLOTS {
                    return Err(LedgerError::InvalidResponse(format!(
                        "zkApp state has {} slots, expected at most {APP_STATE_SLOTS}",
                        slots.len()
                    )));
                }
                let parsed = slots
                    .into_iter()
                    .map(|slot| slot.map(|value| value.parse::<Field>()).transpose())
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Some(parsed)
            }
            None => None,
        };

        Ok(AccountSnapshot {
            public_key,
            balance_nanomina,
            nonce,
            app_state,
            zkapp_uri: self.zkapp_uri,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SendZkappData {
    #[serde(rename = "sendZkapp")]
    pub send_zkapp: SendZkappResult,
}

#[derive(Debug, Deserialize)]
pub struct SendZkappResult {
    pub zkapp: ZkappTxInfo,
}

#[derive(Debug, Deserialize)]
pub struct ZkappTxInfo {
    pub hash: String,
    #[allow(dead_code)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncStatusData {
    #[serde(rename = "syncStatus")]
    pub sync_status: SyncStatus,
}

/// Node synchronization status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Connecting,
    Listening,
    Offline,
    Bootstrap,
    Synced,
    Catchup,
}

impl SyncStatus {
    pub const fn is_online(&self) -> bool {
        !matches!(self, Self::Offline | Self::Connecting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZKAPP: &str = "B62qjWUofRaBpJypv6DVcVuLic6KkJhBFTwJc4LanS3nMbebGLfetLf";

    #[test]
    fn test_account_into_snapshot() {
        let json = serde_json::json!({
            "publicKey": ZKAPP,
            "balance": { "total": "1500000000" },
            "nonce": "3",
            "zkappState": ["7", null, "0", "0", "0", "0", "0", "0"],
            "zkappUri": null
        });
        let info: AccountInfo = serde_json::from_value(json).unwrap();
        let snapshot = info.into_snapshot().unwrap();

        assert_eq!(snapshot.balance_nanomina, 1_500_000_000);
        assert_eq!(snapshot.nonce, 3);
        assert_eq!(snapshot.app_state_slot(0), Some(Field::new(7)));
        assert_eq!(snapshot.app_state_slot(1), Some(Field::ZERO));
    }

    #[test]
    fn test_decimal_balance_is_accepted() {
        let info = AccountInfo {
            public_key: ZKAPP.to_string(),
            balance: AccountBalance { total: "2.5".to_string() },
            nonce: "0".to_string(),
            zkapp_state: None,
            zkapp_uri: None,
        };
        let snapshot = info.into_snapshot().unwrap();
        assert_eq!(snapshot.balance_nanomina, 2_500_000_000);
        assert!(!snapshot.is_zkapp());
    }

    #[test]
    fn test_malformed_state_is_rejected() {
        let info = AccountInfo {
            public_key: ZKAPP.to_string(),
            balance: AccountBalance { total: "0".to_string() },
            nonce: "0".to_string(),
            zkapp_state: Some(vec![Some("not a number".to_string())]),
            zkapp_uri: None,
        };
        assert!(matches!(info.into_snapshot(), Err(LedgerError::Type(_))));
    }

    #[test]
    fn test_graphql_errors_take_precedence() {
        let response: GraphQLResponse<AccountData> = serde_json::from_value(serde_json::json!({
            "data": { "account": null },
            "errors": [{ "message": "database locked" }]
        }))
        .unwrap();
        let err = response.into_data().unwrap_err();
        assert!(matches!(err, LedgerError::GraphQL(ref m) if m == "database locked"));
    }
}
