use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Version byte carried by every base58check-encoded Mina public key.
pub const PUBLIC_KEY_VERSION_BYTE: u8 = 0xcb;

/// Length of a base58 public key string (`B62q...`).
pub const PUBLIC_KEY_LENGTH: usize = 55;

/// Nanomina per whole MINA.
pub const NANOMINA_PER_MINA: u64 = 1_000_000_000;

/// Number of application state slots on a zkApp account.
pub const APP_STATE_SLOTS: usize = 8;

/// Errors raised while parsing domain values from their wire representation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid field element: {0}")]
    InvalidField(String),

    #[error("Invalid fee: {0}")]
    InvalidFee(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Invalid account snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Field overflow: {0} + {1}")]
    FieldOverflow(u64, u64),
}

/// Mina network identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum MinaNetwork {
    Mainnet,
    Devnet,
    #[default]
    Berkeley,
    Testnet,
}

impl MinaNetwork {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Devnet => "devnet",
            Self::Berkeley => "berkeley",
            Self::Testnet => "testnet",
        }
    }

    pub const fn is_testnet(&self) -> bool {
        !matches!(self, Self::Mainnet)
    }
}

impl fmt::Display for MinaNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MinaNetwork {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "devnet" => Ok(Self::Devnet),
            "berkeley" => Ok(Self::Berkeley),
            "testnet" => Ok(Self::Testnet),
            other => Err(TypeError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Opaque on-ledger account identifier.
///
/// Only constructed through [`PublicKey::from_base58`], so holding one means the
/// string passed the base58check validation. Never mutated after construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey(String);

impl PublicKey {
    pub fn from_base58(address: &str) -> Result<Self, TypeError> {
        let address = address.trim();

        if !address.starts_with("B62") || address.len() != PUBLIC_KEY_LENGTH {
            return Err(TypeError::InvalidPublicKey(format!(
                "expected a {PUBLIC_KEY_LENGTH}-character B62 address, got {address:?}"
            )));
        }

        bs58::decode(address)
            .with_check(Some(PUBLIC_KEY_VERSION_BYTE))
            .into_vec()
            .map_err(|e| TypeError::InvalidPublicKey(format!("{address}: {e}")))?;

        Ok(Self(address.to_string()))
    }

    pub fn to_base58(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PublicKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

impl TryFrom<String> for PublicKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_base58(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.0
    }
}

/// A field element read from zkApp state.
///
/// The counter contract only ever stores small values, so elements that do not fit
/// in a `u64` are rejected at parse time rather than silently truncated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Field(u64);

impl Field {
    pub const ZERO: Self = Self(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub fn checked_add(self, rhs: u64) -> Result<Self, TypeError> {
        self.0
            .checked_add(rhs)
            .map(Self)
            .ok_or(TypeError::FieldOverflow(self.0, rhs))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Field {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|e| TypeError::InvalidField(format!("{s:?}: {e}")))
    }
}

impl TryFrom<String> for Field {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Field> for String {
    fn from(field: Field) -> Self {
        field.0.to_string()
    }
}

/// Transaction fee, held in nanomina.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fee(u64);

impl Fee {
    pub const fn from_nanomina(nanomina: u64) -> Self {
        Self(nanomina)
    }

    pub const fn nanomina(&self) -> u64 {
        self.0
    }

    /// Whole-unit decimal rendering expected by wallets (`0.1`, `1`, `2.25`).
    pub fn to_mina_string(&self) -> String {
        let whole = self.0 / NANOMINA_PER_MINA;
        let frac = self.0 % NANOMINA_PER_MINA;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{frac:09}");
        format!("{whole}.{}", frac.trim_end_matches('0'))
    }

    /// Whole-unit amount as a wallet's numeric `fee` field carries it.
    pub fn to_mina(&self) -> f64 {
        self.0 as f64 / NANOMINA_PER_MINA as f64
    }

    /// Inverse of [`Fee::to_mina`], rounded to the nearest nanomina.
    pub fn from_mina(mina: f64) -> Result<Self, TypeError> {
        if !mina.is_finite() || mina < 0.0 {
            return Err(TypeError::InvalidFee(format!("{mina}: not a valid amount")));
        }
        format!("{mina:.9}").parse()
    }
}

impl Default for Fee {
    fn default() -> Self {
        Self(NANOMINA_PER_MINA / 10)
    }
}

impl FromStr for Fee {
    type Err = TypeError;

    /// Parses a whole-unit decimal amount such as `0.1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));

        if whole.is_empty() && frac.is_empty() {
            return Err(TypeError::InvalidFee("empty amount".to_string()));
        }
        if frac.len() > 9 {
            return Err(TypeError::InvalidFee(format!("{s}: more than 9 decimals")));
        }

        let parse = |part: &str| -> Result<u64, TypeError> {
            if part.is_empty() {
                return Ok(0);
            }
            part.parse::<u64>()
                .map_err(|e| TypeError::InvalidFee(format!("{s}: {e}")))
        };

        let whole = parse(whole)?;
        let frac = parse(frac)? * 10u64.pow(9 - frac.len() as u32);

        whole
            .checked_mul(NANOMINA_PER_MINA)
            .and_then(|w| w.checked_add(frac))
            .map(Self)
            .ok_or_else(|| TypeError::InvalidFee(format!("{s}: amount too large")))
    }
}

impl fmt::Display for Fee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MINA", self.to_mina_string())
    }
}

/// Fee payer parameters supplied to the wallet at submission time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub fee: Fee,
    pub memo: String,
}

/// Identifier of a submitted transaction
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The ledger's view of an account at lookup time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub public_key: PublicKey,
    pub balance_nanomina: u64,
    pub nonce: u64,
    /// Present only on zkApp accounts. Unset slots are `None`.
    pub app_state: Option<Vec<Option<Field>>>,
    pub zkapp_uri: Option<String>,
}

impl AccountSnapshot {
    /// A plain (non-zkApp) account.
    pub fn new(public_key: PublicKey, balance_nanomina: u64, nonce: u64) -> Self {
        Self {
            public_key,
            balance_nanomina,
            nonce,
            app_state: None,
            zkapp_uri: None,
        }
    }

    #[must_use]
    pub fn with_app_state(mut self, app_state: Vec<Option<Field>>) -> Self {
        self.app_state = Some(app_state);
        self
    }

    pub fn is_zkapp(&self) -> bool {
        self.app_state.is_some()
    }

    /// Value of one application state slot. Unset slots read as zero.
    pub fn app_state_slot(&self, index: usize) -> Option<Field> {
        let slots = self.app_state.as_ref()?;
        if index >= APP_STATE_SLOTS {
            return None;
        }
        Some(slots.get(index).copied().flatten().unwrap_or(Field::ZERO))
    }
}

/// Outcome of a single ledger lookup.
///
/// `NotFound` is a legitimate steady state (an unfunded account). `TransientError`
/// covers anything that prevented an answer and must never be read as `NotFound`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountLookup {
    Found(AccountSnapshot),
    NotFound,
    TransientError(String),
}

impl AccountLookup {
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}
