use super::context::*;
use crate::{
    error::Error,
    types::{
        CoinType,
        TransactionStatus,
    },
};
use std::{
    collections::HashSet,
    sync::Arc,
    time::Duration,
};

#[tokio::test]
async fn get_next_nonce__uses_network_count_without_local_history() {
    let ctx = TestContext::new();
    let state = ctx.initialized_state(CoinType::Ethereum).await;
    let tracker = ctx.nonce_tracker(&state);
    ctx.rpc.set_transaction_count(ALICE, CHAIN, 7);

    let nonce = tracker.get_next_nonce(CHAIN, ALICE).await.unwrap();

    assert_eq!(nonce, 7);
}

#[tokio::test]
async fn get_next_nonce__follows_local_submitted_transactions() {
    let ctx = TestContext::new();
    let state = ctx.initialized_state(CoinType::Ethereum).await;
    let tracker = ctx.nonce_tracker(&state);
    ctx.rpc.set_transaction_count(ALICE, CHAIN, 2);
    state
        .add_or_update_tx(&submitted(CHAIN, ALICE, 4, "0x04"))
        .await
        .unwrap();
    state
        .add_or_update_tx(&confirmed_at(CHAIN, ALICE, 3, 1))
        .await
        .unwrap();

    let nonce = tracker.get_next_nonce(CHAIN, ALICE).await.unwrap();

    assert_eq!(nonce, 5);
}

#[tokio::test]
async fn get_next_nonce__network_wins_when_ahead() {
    let ctx = TestContext::new();
    let state = ctx.initialized_state(CoinType::Ethereum).await;
    let tracker = ctx.nonce_tracker(&state);
    ctx.rpc.set_transaction_count(ALICE, CHAIN, 10);
    state
        .add_or_update_tx(&confirmed_at(CHAIN, ALICE, 3, 1))
        .await
        .unwrap();

    assert_eq!(tracker.get_next_nonce(CHAIN, ALICE).await.unwrap(), 10);
}

#[tokio::test]
async fn get_next_nonce__ignores_other_chains_addresses_and_statuses() {
    let ctx = TestContext::new();
    let state = ctx.initialized_state(CoinType::Ethereum).await;
    let tracker = ctx.nonce_tracker(&state);
    for tx in [
        submitted(OTHER_CHAIN, ALICE, 9, "0x01"),
        submitted(CHAIN, BOB, 9, "0x02"),
        meta(CHAIN, ALICE, TransactionStatus::Error, Some(9)),
        meta(CHAIN, ALICE, TransactionStatus::Approved, Some(9)),
    ] {
        state.add_or_update_tx(&tx).await.unwrap();
    }

    assert_eq!(tracker.get_next_nonce(CHAIN, ALICE).await.unwrap(), 0);
}

#[tokio::test]
async fn get_next_nonce__network_failure_assigns_nothing() {
    let ctx = TestContext::new();
    let state = ctx.initialized_state(CoinType::Ethereum).await;
    let tracker = ctx.nonce_tracker(&state);
    ctx.rpc.set_failing(true);

    let result = tracker.get_next_nonce(CHAIN, ALICE).await;

    assert!(matches!(result, Err(Error::NetworkUnavailable(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reserve_next_nonce__concurrent_reservations_are_unique() {
    let ctx = TestContext::new();
    let state = ctx.initialized_state(CoinType::Ethereum).await;
    let tracker = ctx.nonce_tracker(&state);
    ctx.rpc.set_transaction_count(ALICE, CHAIN, 1);
    let nonces = Arc::new(parking_lot::Mutex::new(vec![]));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let tracker = tracker.clone();
            let state = state.clone();
            let nonces = nonces.clone();
            tokio::spawn(async move {
                let reservation = tracker.reserve_next_nonce(CHAIN, ALICE).await.unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
                let tx = submitted(CHAIN, ALICE, reservation.nonce(), &format!("0x{i}"));
                state.add_or_update_tx(&tx).await.unwrap();
                nonces.lock().push(reservation.nonce());
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let nonces = nonces.lock().clone();
    let unique: HashSet<_> = nonces.iter().copied().collect();
    assert_eq!(nonces.len(), 8);
    assert_eq!(unique, (1..=8).collect());
}

#[tokio::test]
async fn is_nonce_taken__only_by_confirmed_sibling() {
    let ctx = TestContext::new();
    let state = ctx.initialized_state(CoinType::Ethereum).await;
    let tracker = ctx.nonce_tracker(&state);
    let pending = submitted(CHAIN, ALICE, 4, "0x04");
    state.add_or_update_tx(&pending).await.unwrap();
    assert!(!tracker.is_nonce_taken(&pending));

    state
        .add_or_update_tx(&confirmed_at(OTHER_CHAIN, ALICE, 4, 1))
        .await
        .unwrap();
    state
        .add_or_update_tx(&confirmed_at(CHAIN, BOB, 4, 1))
        .await
        .unwrap();
    assert!(!tracker.is_nonce_taken(&pending));

    state
        .add_or_update_tx(&confirmed_at(CHAIN, ALICE, 4, 1))
        .await
        .unwrap();
    assert!(tracker.is_nonce_taken(&pending));
}

#[tokio::test]
async fn is_nonce_taken__record_without_nonce_never_collides() {
    let ctx = TestContext::new();
    let state = ctx.initialized_state(CoinType::Ethereum).await;
    let tracker = ctx.nonce_tracker(&state);
    state
        .add_or_update_tx(&confirmed_at(CHAIN, ALICE, 0, 1))
        .await
        .unwrap();

    let without_nonce = meta(CHAIN, ALICE, TransactionStatus::Submitted, None);

    assert!(!tracker.is_nonce_taken(&without_nonce));
}
