//! # Token Lifecycle Flows
//!
//! Mint, send and receive across holders sharing one chain, overlay and
//! relay:
//!
//! ```text
//! Alice ──mint──→ [Chain] ──submit──→ [Overlay]
//!   │                                    ↑
//!   └──descriptor──→ [Relay] ──list──→ Bob ──lookup──┘
//!                                       │
//!                                       └──record ownership──→ [Chain]
//! ```

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tp_token_ledger::adapters::{decode_locking_script, RawTransaction};
    use tp_token_ledger::{
        LockingScript, Outpoint, TokenLedgerApi, TokenLedgerError, TokenSchemeConfig, Txid,
    };

    use crate::integration::fixtures::{Holder, Network};

    /// Alice holding `points` after a reconciled mint.
    async fn funded(network: &Network, points: u64) -> Holder {
        let alice = network.holder().await;
        alice.mint(points).await.unwrap();
        alice.receive_and_reconcile().await.unwrap();
        assert_eq!(alice.balance().await, points);
        alice
    }

    fn on_chain(network: &Network, txid: &Txid) -> RawTransaction {
        network.chain.transaction(txid).expect("transaction on chain")
    }

    fn points_of(tx: &RawTransaction, vout: usize) -> u64 {
        let script = LockingScript::new(tx.outputs[vout].script.clone());
        decode_locking_script(&script).unwrap().points
    }

    // =========================================================================
    // MINT
    // =========================================================================

    #[tokio::test]
    async fn test_mint_then_self_receive() {
        let network = Network::new();
        let alice = network.holder().await;

        let txid = alice.mint(50).await.unwrap();
        assert!(network.overlay.was_submitted(&txid));
        assert_eq!(network.pending_for(&alice), 1);

        let report = alice.receive_and_reconcile().await.unwrap();
        assert_eq!(report.accepted.len(), 1);
        assert!(report.rejected.is_empty());
        assert_eq!(report.balance, 50);

        let holdings = alice.holdings().await;
        assert_eq!(holdings.tokens()[0].outpoint, Outpoint::new(txid, 0));
        assert_eq!(network.pending_for(&alice), 0);
    }

    #[tokio::test]
    async fn test_mints_accumulate() {
        let network = Network::new();
        let alice = network.holder().await;

        for points in [5, 0, 20] {
            alice.mint(points).await.unwrap();
        }
        let report = alice.receive_and_reconcile().await.unwrap();

        assert_eq!(report.accepted.len(), 3);
        assert_eq!(alice.balance().await, 25);
        assert_eq!(alice.holdings().await.len(), 3);
    }

    // =========================================================================
    // SEND
    // =========================================================================

    #[tokio::test]
    async fn test_send_produces_recipient_and_change_outputs() {
        let network = Network::new();
        let alice = funded(&network, 100).await;
        let bob = network.holder().await;

        let receipt = alice.send(30, bob.identity_key()).await.unwrap();

        let tx = on_chain(&network, &receipt.txid);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(points_of(&tx, 0), 30);
        assert_eq!(points_of(&tx, 1), 70);

        let holdings = alice.holdings().await;
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings.tokens()[0].points, 70);
        assert_eq!(holdings.tokens()[0].outpoint, Outpoint::new(receipt.txid, 1));

        bob.receive_and_reconcile().await.unwrap();
        assert_eq!(bob.balance().await, 30);
    }

    #[tokio::test]
    async fn test_exact_balance_send_has_no_change() {
        let network = Network::new();
        let alice = funded(&network, 40).await;
        let bob = network.holder().await;

        let receipt = alice.send(40, bob.identity_key()).await.unwrap();
        assert_eq!(receipt.change, None);
        assert_eq!(on_chain(&network, &receipt.txid).outputs.len(), 1);
        assert!(alice.holdings().await.is_empty());

        bob.receive_and_reconcile().await.unwrap();
        assert_eq!(bob.balance().await, 40);
    }

    #[tokio::test]
    async fn test_insufficient_balance_makes_no_network_calls() {
        let network = Network::new();
        let alice = funded(&network, 10).await;
        let bob = network.holder().await;
        let before = alice.network_calls();

        let err = alice.send(100, bob.identity_key()).await.unwrap_err();

        assert!(matches!(
            err,
            TokenLedgerError::InsufficientBalance {
                requested: 100,
                available: 10
            }
        ));
        assert_eq!(alice.network_calls(), before);
        assert_eq!(alice.balance().await, 10);
        assert_eq!(network.pending_for(&bob), 0);
    }

    #[tokio::test]
    async fn test_send_spends_every_held_token() {
        let network = Network::new();
        let alice = network.holder().await;
        let bob = network.holder().await;
        for points in [10, 20, 30] {
            alice.mint(points).await.unwrap();
        }
        alice.receive_and_reconcile().await.unwrap();
        let spent: Vec<Outpoint> = alice
            .holdings()
            .await
            .tokens()
            .iter()
            .map(|t| t.outpoint)
            .collect();

        let receipt = alice.send(15, bob.identity_key()).await.unwrap();

        assert_eq!(on_chain(&network, &receipt.txid).inputs.len(), 4);
        assert!(spent.iter().all(|o| network.chain.is_spent(o)));
        assert_eq!(receipt.change, Some(45));
        assert_eq!(alice.balance().await, 45);
    }

    #[tokio::test]
    async fn test_tokens_travel_across_three_holders() {
        let network = Network::new();
        let alice = funded(&network, 100).await;
        let bob = network.holder().await;
        let carol = network.holder().await;

        alice.send(60, bob.identity_key()).await.unwrap();
        bob.receive_and_reconcile().await.unwrap();

        bob.send(25, carol.identity_key()).await.unwrap();
        carol.receive_and_reconcile().await.unwrap();

        carol.send(25, alice.identity_key()).await.unwrap();
        alice.receive_and_reconcile().await.unwrap();

        assert_eq!(alice.balance().await, 65);
        assert_eq!(bob.balance().await, 35);
        assert_eq!(carol.balance().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_mint_and_send_are_serialized() {
        let network = Network::new();
        let alice = Arc::new(funded(&network, 100).await);
        let bob = network.holder().await;
        let recipient = bob.identity_key();

        let sender = alice.clone();
        let minter = alice.clone();
        let (sent, minted) = tokio::join!(
            tokio::spawn(async move { sender.send(40, recipient).await }),
            tokio::spawn(async move { minter.mint(10).await }),
        );
        sent.unwrap().unwrap();
        minted.unwrap().unwrap();

        alice.receive_and_reconcile().await.unwrap();
        bob.receive_and_reconcile().await.unwrap();
        assert_eq!(alice.balance().await, 70);
        assert_eq!(bob.balance().await, 40);
    }

    // =========================================================================
    // RECEIVE: REJECTIONS
    // =========================================================================

    #[tokio::test]
    async fn test_unindexed_token_is_skipped() {
        let network = Network::new();
        let alice = funded(&network, 500).await;
        let bob = network.holder().await;

        let receipt = alice.send(500, bob.identity_key()).await.unwrap();
        network.overlay.forget(&Outpoint::new(receipt.txid, 0));

        let report = bob.receive_and_reconcile().await.unwrap();
        assert!(report.accepted.is_empty());
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].reason, "unverified");
        assert_eq!(bob.balance().await, 0);
        assert_eq!(network.pending_for(&bob), 0);
    }

    #[tokio::test]
    async fn test_replayed_token_leaves_balance_unchanged() {
        let network = Network::new();
        let alice = funded(&network, 100).await;
        let bob = network.holder().await;

        let receipt = alice.send(30, bob.identity_key()).await.unwrap();
        bob.receive_and_reconcile().await.unwrap();

        let body = bob.transfer_body(&Outpoint::new(receipt.txid, 0)).await;
        let replay = network.deliver(alice.identity_key(), &bob, body);

        let report = bob.receive_and_reconcile().await.unwrap();
        assert!(report.accepted.is_empty());
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].message_id, replay);
        assert_eq!(report.rejected[0].reason, "duplicate");
        assert_eq!(bob.balance().await, 30);
        assert_eq!(bob.holdings().await.len(), 1);
    }

    #[tokio::test]
    async fn test_token_claimed_by_wrong_sender_is_rejected() {
        let network = Network::new();
        let alice = funded(&network, 100).await;
        let bob = network.holder().await;
        let mallory = network.holder().await;

        let receipt = alice.send(30, bob.identity_key()).await.unwrap();
        bob.receive_and_reconcile().await.unwrap();

        let body = bob.transfer_body(&Outpoint::new(receipt.txid, 0)).await;
        network.deliver(mallory.identity_key(), &bob, body);

        let report = bob.receive_and_reconcile().await.unwrap();
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].reason, "not_mine");
        assert_eq!(bob.balance().await, 30);
    }

    #[tokio::test]
    async fn test_token_addressed_to_someone_else_is_rejected() {
        let network = Network::new();
        let alice = funded(&network, 100).await;
        let bob = network.holder().await;
        let carol = network.holder().await;

        let receipt = alice.send(30, bob.identity_key()).await.unwrap();
        bob.receive_and_reconcile().await.unwrap();

        // Carol receives Bob's token, correctly attributed to Alice.
        let body = bob.transfer_body(&Outpoint::new(receipt.txid, 0)).await;
        network.deliver(alice.identity_key(), &carol, body);

        let report = carol.receive_and_reconcile().await.unwrap();
        assert_eq!(report.rejected[0].reason, "not_mine");
        assert_eq!(carol.balance().await, 0);
    }

    #[tokio::test]
    async fn test_garbage_messages_do_not_stop_the_batch() {
        let network = Network::new();
        let alice = network.holder().await;

        network.deliver(alice.identity_key(), &alice, "not json".into());
        alice.mint(12).await.unwrap();
        network.deliver(alice.identity_key(), &alice, r#"{"token":{}}"#.into());

        let report = alice.receive_and_reconcile().await.unwrap();
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected.len(), 2);
        assert!(report.rejected.iter().all(|r| r.reason == "payload"));
        assert_eq!(alice.balance().await, 12);
        assert_eq!(network.pending_for(&alice), 0);
    }

    // =========================================================================
    // RECEIVE: FAILURES AND SESSIONS
    // =========================================================================

    #[tokio::test]
    async fn test_overlay_outage_acknowledges_only_handled_prefix() {
        let network = Network::new();
        let alice = network.holder().await;
        alice.mint(10).await.unwrap();
        alice.mint(20).await.unwrap();

        alice.overlay.fail_lookups_after(Some(1));
        let err = alice.receive_and_reconcile().await.unwrap_err();
        assert!(matches!(err, TokenLedgerError::Lookup(_)));
        assert_eq!(alice.balance().await, 10);
        assert_eq!(network.pending_for(&alice), 1);
        assert_eq!(alice.messages.acknowledged().len(), 1);
        assert_eq!(alice.messages.acknowledged()[0].len(), 1);

        alice.overlay.fail_lookups_after(None);
        let report = alice.receive_and_reconcile().await.unwrap();
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(alice.balance().await, 30);
        assert_eq!(network.pending_for(&alice), 0);
    }

    #[tokio::test]
    async fn test_wallet_outage_keeps_message_for_retry() {
        let network = Network::new();
        let alice = network.holder().await;
        alice.mint(10).await.unwrap();

        alice.ledger.set_fail_records(true);
        let err = alice.receive_and_reconcile().await.unwrap_err();
        assert!(matches!(err, TokenLedgerError::Construction(_)));
        assert_eq!(alice.balance().await, 0);
        assert_eq!(network.pending_for(&alice), 1);
        assert!(alice.messages.acknowledged().is_empty());

        alice.ledger.set_fail_records(false);
        alice.receive_and_reconcile().await.unwrap();
        assert_eq!(alice.balance().await, 10);
    }

    #[tokio::test]
    async fn test_recorded_but_unacknowledged_message_is_not_double_counted() {
        let network = Network::new();
        let alice = network.holder().await;
        alice.mint(10).await.unwrap();
        alice.receive_and_reconcile().await.unwrap();

        // A second session sees the same token redelivered.
        let outpoint = alice.holdings().await.tokens()[0].outpoint;
        let body = alice.transfer_body(&outpoint).await;
        let fresh = alice.reopen(TokenSchemeConfig::default()).await;
        network.deliver(alice.identity_key(), &alice, body);

        let report = fresh.receive_and_reconcile().await.unwrap();
        assert!(report.accepted.is_empty());
        assert_eq!(report.rejected[0].reason, "duplicate");
        assert_eq!(fresh.balance().await, 10);
    }

    #[tokio::test]
    async fn test_new_session_restores_holdings() {
        let network = Network::new();
        let alice = funded(&network, 100).await;
        let bob = network.holder().await;
        alice.send(35, bob.identity_key()).await.unwrap();
        bob.receive_and_reconcile().await.unwrap();

        let alice_again = alice.reopen(TokenSchemeConfig::default()).await;
        let bob_again = bob.reopen(TokenSchemeConfig::default()).await;
        assert_eq!(alice_again.balance().await, 65);
        assert_eq!(bob_again.balance().await, 35);

        // Restored tokens stay spendable.
        bob_again.send(35, alice.identity_key()).await.unwrap();
        alice_again.receive_and_reconcile().await.unwrap();
        assert_eq!(alice_again.balance().await, 100);
    }

    #[tokio::test]
    async fn test_empty_inbox_reconcile_is_quiet() {
        let network = Network::new();
        let alice = network.holder().await;

        let report = alice.receive_and_reconcile().await.unwrap();
        assert_eq!(report, Default::default());
        assert!(alice.messages.acknowledged().is_empty());
    }
}
