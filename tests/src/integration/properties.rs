//! Randomised invariants over whole sessions.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use tp_token_ledger::domain::{invariant_points_match_scripts, invariant_unique_outpoints};
    use tp_token_ledger::{
        Counterparty, KeyContext, KeyDeriver, LocalKeyDeriver, PushDropCodec, TokenCodec,
        TokenLedgerApi, TokenLedgerError,
    };

    use crate::integration::fixtures::{Holder, Network};

    #[derive(Clone, Debug)]
    enum Step {
        Mint(usize, u64),
        Send(usize, u64),
        Reconcile(usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0..2usize, 0..200u64).prop_map(|(who, points)| Step::Mint(who, points)),
            (0..2usize, 1..250u64).prop_map(|(who, points)| Step::Send(who, points)),
            (0..2usize).prop_map(Step::Reconcile),
        ]
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    async fn assert_consistent(holder: &Holder) {
        let holdings = holder.holdings().await;
        let codec = &holder.collaborators.codec;

        assert!(invariant_unique_outpoints(holdings.tokens()));
        assert!(invariant_points_match_scripts(holdings.tokens(), |script| {
            codec.decode(script).map(|d| d.points)
        }));

        let summed: u64 = holdings.tokens().iter().map(|t| t.points).sum();
        assert_eq!(holder.balance().await, summed);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_balance_matches_held_scripts(steps in prop::collection::vec(step(), 1..12)) {
            runtime().block_on(async {
                let network = Network::new();
                let holders = [network.holder().await, network.holder().await];
                let mut minted = 0u64;

                for step in steps {
                    match step {
                        Step::Mint(who, points) => {
                            holders[who].mint(points).await.unwrap();
                            minted += points;
                        }
                        Step::Send(who, points) => {
                            let to = holders[1 - who].identity_key();
                            match holders[who].send(points, to).await {
                                Ok(receipt) => assert_eq!(receipt.sent, points),
                                Err(TokenLedgerError::InsufficientBalance { requested, available }) => {
                                    assert_eq!(requested, points);
                                    assert!(available < points);
                                }
                                Err(e) => panic!("send failed: {e}"),
                            }
                        }
                        Step::Reconcile(who) => {
                            holders[who].receive_and_reconcile().await.unwrap();
                        }
                    }
                    for holder in &holders {
                        assert_consistent(holder).await;
                    }
                }

                for holder in &holders {
                    holder.receive_and_reconcile().await.unwrap();
                    assert_consistent(holder).await;
                }
                let total = holders[0].balance().await + holders[1].balance().await;
                assert_eq!(total, minted);
            });
        }

        #[test]
        fn prop_transfer_script_owned_by_recipient(points in any::<u64>()) {
            runtime().block_on(async {
                let sender = Arc::new(LocalKeyDeriver::generate().unwrap());
                let recipient = Arc::new(LocalKeyDeriver::generate().unwrap());
                let sender_codec = PushDropCodec::new(sender.clone());
                let recipient_codec = PushDropCodec::new(recipient.clone());

                let to_recipient =
                    KeyContext::new("tokens", "1", Counterparty::Other(recipient.identity()));
                let script = sender_codec.lock(points, &to_recipient).await.unwrap();

                let decoded = recipient_codec.decode(&script).unwrap();
                let from_sender =
                    KeyContext::new("tokens", "1", Counterparty::Other(sender.identity()));
                let expected = recipient.derive_public_key(&from_sender, true).await.unwrap();

                assert_eq!(decoded.points, points);
                assert_eq!(decoded.owning_key, expected);
            });
        }
    }
}
