//! `TokenLedgerApi` implementation: mint and send.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;

use super::{TokenLedgerService, SUBSYSTEM};
use crate::domain::{
    change_amount, invariant_sufficient_balance, Counterparty, Holdings, IdentityKey, Outpoint,
    Provenance, Token, TokenDescriptor, TokenLedgerError, TransactionRecord, TransferPayload,
    Txid,
};
use crate::ports::inbound::{ReconcileReport, SendReceipt, TokenLedgerApi};
use crate::ports::outbound::{
    BuildRequest, InputSpec, OutputSpec, OwnedOutput, OwnershipRecord, RedeemSpec,
};

impl TokenLedgerService {
    /// Deliver output `vout` of `record` to `recipient`'s mailbox.
    async fn notify(
        &self,
        recipient: &IdentityKey,
        record: &TransactionRecord,
        vout: u32,
        output: &OutputSpec,
    ) -> Result<(), TokenLedgerError> {
        let payload = TransferPayload {
            token: TokenDescriptor::for_output(
                record,
                vout,
                output.satoshis,
                output.script.clone(),
            ),
        };
        self.messages
            .send(recipient, &self.scheme.message_box, payload.to_body()?)
            .await
    }
}

#[async_trait]
impl TokenLedgerApi for TokenLedgerService {
    async fn mint(&self, points: u64) -> Result<Txid, TokenLedgerError> {
        let _holdings = self.holdings.lock().await;

        let script = self
            .codec
            .lock(points, &self.context(Counterparty::Myself))
            .await?;
        let output = OutputSpec {
            script,
            satoshis: self.scheme.satoshis,
            basket: None,
            custom_instructions: None,
        };
        let record = self
            .ledger
            .build_transaction(BuildRequest {
                description: format!("Mint {points} TyPoints"),
                inputs: BTreeMap::new(),
                outputs: vec![output.clone()],
            })
            .await?;

        self.overlay.submit(&record, &self.topics()).await?;
        self.notify(&self.identity, &record, 0, &output).await?;

        tp_telemetry::log_token_event!(
            info,
            SUBSYSTEM,
            "Minted token",
            record.txid,
            0u32,
            points = points
        );
        tp_telemetry::metrics::record_mint(points);
        Ok(record.txid)
    }

    async fn send(
        &self,
        points: u64,
        recipient: IdentityKey,
    ) -> Result<SendReceipt, TokenLedgerError> {
        let mut holdings = self.holdings.lock().await;
        let balance = holdings.balance();
        invariant_sufficient_balance(points, balance)?;

        let mut inputs: BTreeMap<Txid, InputSpec> = BTreeMap::new();
        for token in holdings.tokens() {
            let proof = self
                .codec
                .unlock(token, &self.context(token.counterparty()))
                .await?;
            inputs
                .entry(token.outpoint.txid)
                .or_insert_with(|| InputSpec {
                    envelope: token.envelope.clone(),
                    outputs_to_redeem: Vec::new(),
                })
                .outputs_to_redeem
                .push(RedeemSpec {
                    index: token.outpoint.vout,
                    unlocking_script: proof,
                });
        }

        let mut outputs = vec![OutputSpec {
            script: self
                .codec
                .lock(points, &self.context(Counterparty::Other(recipient)))
                .await?,
            satoshis: self.scheme.satoshis,
            basket: None,
            custom_instructions: None,
        }];

        let change = change_amount(balance, points);
        let provenance = Provenance::new(self.identity);
        if let Some(remainder) = change {
            outputs.push(OutputSpec {
                script: self
                    .codec
                    .lock(remainder, &self.context(Counterparty::Myself))
                    .await?,
                satoshis: self.scheme.satoshis,
                basket: Some(self.scheme.basket.clone()),
                custom_instructions: Some(provenance.to_custom_instructions()),
            });
        }

        debug!(
            points,
            balance,
            inputs = holdings.len(),
            %recipient,
            "Building send"
        );
        let record = self
            .ledger
            .build_transaction(BuildRequest {
                description: format!("Send {points} TyPoints"),
                inputs,
                outputs: outputs.clone(),
            })
            .await?;
        // Inputs are spent from here on.
        *holdings = Holdings::default();

        self.overlay.submit(&record, &self.topics()).await?;
        self.notify(&recipient, &record, 0, &outputs[0]).await?;

        if let (Some(remainder), Some(change_output)) = (change, outputs.get(1)) {
            // Not retried: if this fails the change output stays unrecorded and
            // later sessions cannot see or spend it.
            self.ledger
                .record_ownership(OwnershipRecord {
                    sender: self.identity,
                    note: "TyPoints change".to_string(),
                    transaction: record.clone(),
                    outputs: vec![OwnedOutput {
                        vout: 1,
                        basket: self.scheme.basket.clone(),
                        satoshis: change_output.satoshis,
                        custom_instructions: change_output.custom_instructions.clone(),
                    }],
                })
                .await?;
            *holdings = Holdings::from_tokens(vec![Token {
                outpoint: Outpoint::new(record.txid, 1),
                satoshis: change_output.satoshis,
                points: remainder,
                locking_script: change_output.script.clone(),
                envelope: record.envelope.clone(),
                provenance: Some(provenance),
            }])?;
        }

        tp_telemetry::log_token_event!(
            info,
            SUBSYSTEM,
            "Sent tokens",
            record.txid,
            0u32,
            points = points,
            change = change.unwrap_or(0),
            recipient = %recipient
        );
        tp_telemetry::metrics::record_send(points);
        tp_telemetry::metrics::set_balance(holdings.balance());

        Ok(SendReceipt {
            txid: record.txid,
            sent: points,
            change,
        })
    }

    async fn receive_and_reconcile(&self) -> Result<ReconcileReport, TokenLedgerError> {
        self.reconcile().await
    }

    async fn balance(&self) -> u64 {
        self.holdings.lock().await.balance()
    }

    async fn holdings(&self) -> Holdings {
        self.holdings.lock().await.clone()
    }

    fn identity_key(&self) -> IdentityKey {
        self.identity
    }
}
