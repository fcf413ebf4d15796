//! Core domain types shared by every component of the engine.

use num_enum::{
    IntoPrimitive,
    TryFromPrimitive,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    str::FromStr,
    time::{
        SystemTime,
        UNIX_EPOCH,
    },
};

/// The chain family that decides which transaction manager handles a request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display,
)]
pub enum CoinType {
    #[display(fmt = "ethereum")]
    Ethereum,
    #[display(fmt = "solana")]
    Solana,
    #[display(fmt = "filecoin")]
    Filecoin,
    #[display(fmt = "bitcoin")]
    Bitcoin,
}

impl CoinType {
    pub const ALL: [CoinType; 4] = [
        CoinType::Ethereum,
        CoinType::Solana,
        CoinType::Filecoin,
        CoinType::Bitcoin,
    ];

    /// Key of the coin inside the legacy preference document.
    pub fn pref_key(&self) -> &'static str {
        match self {
            CoinType::Ethereum => "ethereum",
            CoinType::Solana => "solana",
            CoinType::Filecoin => "filecoin",
            CoinType::Bitcoin => "bitcoin",
        }
    }

    pub fn from_pref_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|coin| coin.pref_key() == key)
    }

    /// Store key of the coin's transaction document.
    pub fn storage_key(&self) -> String {
        format!("transactions.{}", self.pref_key())
    }

    /// Whether transactions of this coin are ordered by a per-address nonce.
    pub fn is_account_based(&self) -> bool {
        matches!(self, CoinType::Ethereum | CoinType::Filecoin)
    }
}

impl FromStr for CoinType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eth" | "ethereum" => Ok(CoinType::Ethereum),
            "sol" | "solana" => Ok(CoinType::Solana),
            "fil" | "filecoin" => Ok(CoinType::Filecoin),
            "btc" | "bitcoin" => Ok(CoinType::Bitcoin),
            other => Err(format!("unknown coin type `{other}`")),
        }
    }
}

/// Lifecycle state of a transaction. The discriminant is the persisted value.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    IntoPrimitive,
    TryFromPrimitive,
    derive_more::Display,
)]
#[repr(u8)]
pub enum TransactionStatus {
    Unapproved = 0,
    Approved = 1,
    Rejected = 2,
    Submitted = 3,
    Confirmed = 4,
    Error = 5,
    Dropped = 6,
    Signed = 7,
}

impl TransactionStatus {
    /// Statuses a record never leaves once reached.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Confirmed
                | TransactionStatus::Rejected
                | TransactionStatus::Dropped
        )
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.to_lowercase().as_str() {
            "unapproved" => TransactionStatus::Unapproved,
            "approved" => TransactionStatus::Approved,
            "rejected" => TransactionStatus::Rejected,
            "submitted" => TransactionStatus::Submitted,
            "confirmed" => TransactionStatus::Confirmed,
            "error" => TransactionStatus::Error,
            "dropped" => TransactionStatus::Dropped,
            "signed" => TransactionStatus::Signed,
            other => return Err(format!("unknown transaction status `{other}`")),
        };
        Ok(status)
    }
}

/// Microseconds since the UNIX epoch, never zero.
///
/// Zero is the persisted encoding of an unset time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const MIN: Timestamp = Timestamp(1);

    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        Self::from_micros(micros)
    }

    /// Zero is clamped to [`Self::MIN`].
    pub const fn from_micros(micros: u64) -> Self {
        if micros == 0 { Self::MIN } else { Self(micros) }
    }

    pub const fn as_micros(&self) -> u64 {
        self.0
    }
}

/// Chain specific payload of a transaction.
///
/// Construction of these fields is the caller's business; the engine only
/// reads the nonce and, for speed-ups, the gas prices.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxData {
    #[serde(with = "crate::codec::hex_quantity")]
    pub nonce: Option<u64>,
    pub to: String,
    pub value: String,
    #[serde(with = "hex")]
    pub data: Vec<u8>,
    pub gas_limit: String,
    pub gas_price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
}

/// Receipt returned by the network once a transaction is included.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_hash: String,
    pub block_number: u64,
    pub contract_address: String,
    pub gas_used: u64,
    pub logs: Vec<serde_json::Value>,
    pub status: bool,
}

/// Everything the wallet knows about one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxMeta {
    pub id: String,
    pub chain_id: String,
    pub from: String,
    pub status: TransactionStatus,
    pub tx: TxData,
    pub tx_hash: String,
    pub created_time: Option<Timestamp>,
    pub submitted_time: Option<Timestamp>,
    pub confirmed_time: Option<Timestamp>,
    pub origin: Option<String>,
    pub group_id: Option<String>,
    pub tx_receipt: Option<TxReceipt>,
}

impl TxMeta {
    /// Creates an unapproved transaction with a fresh id.
    pub fn new(chain_id: impl Into<String>, from: impl Into<String>, tx: TxData) -> Self {
        Self {
            id: Self::generate_meta_id(),
            chain_id: chain_id.into(),
            from: from.into(),
            status: TransactionStatus::Unapproved,
            tx,
            tx_hash: String::new(),
            created_time: Some(Timestamp::now()),
            submitted_time: None,
            confirmed_time: None,
            origin: None,
            group_id: None,
            tx_receipt: None,
        }
    }

    pub fn generate_meta_id() -> String {
        hex::encode(rand::random::<[u8; 16]>())
    }

    pub fn nonce(&self) -> Option<u64> {
        self.tx.nonce
    }
}
