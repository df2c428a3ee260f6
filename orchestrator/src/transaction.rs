//! Transaction artifacts handed from one pipeline stage to the next.

use serde::{Deserialize, Serialize};
use zkapp_lib::{Field, MinaNetwork, PublicKey, APP_STATE_SLOTS};

/// A state-mutating contract call that has been built but not proved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnprovedTransaction {
    pub network: MinaNetwork,
    pub fee_payer: PublicKey,
    pub fee_payer_nonce: u64,
    pub zkapp: PublicKey,
    pub method: String,
    pub slot: usize,
    pub state_before: Field,
    pub state_after: Field,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvedTransaction {
    pub transaction: UnprovedTransaction,
    pub verification_key: String,
    pub proof: String,
}

/// Wallet-submittable zkApp command, in the node's JSON layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkappCommand {
    pub fee_payer: FeePayer,
    pub account_updates: Vec<AccountUpdate>,
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeePayer {
    pub body: FeePayerBody,
    /// Filled in by the wallet when it signs.
    pub authorization: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeePayerBody {
    pub public_key: PublicKey,
    /// Nanomina, decimal string.
    pub fee: String,
    pub valid_until: Option<String>,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    pub body: AccountUpdateBody,
    pub authorization: Authorization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdateBody {
    pub public_key: PublicKey,
    pub update: StateUpdate,
    pub preconditions: Preconditions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub app_state: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preconditions {
    pub account: AccountPrecondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPrecondition {
    pub state: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub proof: Option<String>,
    pub signature: Option<String>,
}

fn single_slot(slot: usize, value: Field) -> Vec<Option<String>> {
    (0..APP_STATE_SLOTS)
        .map(|i| (i == slot).then(|| value.to_string()))
        .collect()
}

impl From<&ProvedTransaction> for ZkappCommand {
    fn from(proved: &ProvedTransaction) -> Self {
        let tx = &proved.transaction;
        Self {
            fee_payer: FeePayer {
                body: FeePayerBody {
                    public_key: tx.fee_payer.clone(),
                    fee: "0".to_string(),
                    valid_until: None,
                    nonce: tx.fee_payer_nonce.to_string(),
                },
                authorization: String::new(),
            },
            account_updates: vec![AccountUpdate {
                body: AccountUpdateBody {
                    public_key: tx.zkapp.clone(),
                    update: StateUpdate {
                        app_state: single_slot(tx.slot, tx.state_after),
                    },
                    preconditions: Preconditions {
                        account: AccountPrecondition {
                            state: single_slot(tx.slot, tx.state_before),
                        },
                    },
                },
                authorization: Authorization {
                    proof: Some(proved.proof.clone()),
                    signature: None,
                },
            }],
            memo: String::new(),
        }
    }
}
