//! This crate tracks wallet transactions from creation to confirmation,
//! rejection or drop, across every supported coin type.

#![deny(clippy::arithmetic_side_effects)]
#![deny(clippy::cast_possible_truncation)]

pub mod codec;
pub mod config;
mod error;
pub mod events;
pub mod manager;
pub mod migration;
pub mod nonce_tracker;
pub mod pending_tracker;
pub mod ports;
pub mod service;
pub mod state_manager;
pub mod store;
pub mod types;
pub mod utils;

pub use config::Config;
pub use error::{
    Error,
    Result,
};
pub use events::{
    EventBus,
    TxEvent,
    TxObserver,
};
pub use manager::{
    AccountTxManager,
    NewTransaction,
    PendingPollResult,
    SolanaTxManager,
    TxManager,
};
pub use nonce_tracker::NonceTracker;
pub use pending_tracker::PendingTxTracker;
pub use service::{
    PendingTxPoller,
    TxDataUnion,
    TxService,
    new_pending_tx_poller,
};
pub use state_manager::TxStateManager;
pub use types::{
    CoinType,
    Timestamp,
    TransactionStatus,
    TxData,
    TxMeta,
    TxReceipt,
};

#[cfg(test)]
mod tests;

#[cfg(test)]
wallet_tx_trace::enable_tracing!();
