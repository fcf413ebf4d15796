use crate::types::{
    CoinType,
    TransactionStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum Error {
    #[display(fmt = "Transaction storage is unavailable: {_0}")]
    StorageUnavailable(String),
    #[display(fmt = "Network request failed: {_0}")]
    NetworkUnavailable(String),
    #[display(fmt = "Transaction {id} does not exist on chain {chain_id}")]
    NotFound { chain_id: String, id: String },
    #[display(fmt = "Invalid transaction record: {_0}")]
    InvalidRecord(String),
    #[display(fmt = "Transaction {id} is {actual}, the operation requires {expected}")]
    InvalidStatus {
        id: String,
        actual: TransactionStatus,
        expected: &'static str,
    },
    #[display(fmt = "Transaction {id} can not move from {from} to {to}")]
    StatusRegression {
        id: String,
        from: TransactionStatus,
        to: TransactionStatus,
    },
    #[display(fmt = "No transaction manager is registered for {_0}")]
    UnsupportedCoinType(CoinType),
    #[display(fmt = "{_0} is not supported for {_1}")]
    Unsupported(&'static str, CoinType),
    #[display(fmt = "Failed to sign the transaction: {_0}")]
    Signing(String),
    #[display(fmt = "Invalid sender address: {_0:?}")]
    InvalidAddress(String),
    #[display(fmt = "Invalid origin: {_0}")]
    InvalidOrigin(String),
    #[display(fmt = "Invalid `{_0}`: {_1:?}")]
    InvalidParameter(&'static str, String),
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
