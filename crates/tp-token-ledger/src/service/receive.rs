//! Receive-and-reconcile flow.

use tracing::{info, warn};

use super::{TokenLedgerService, SUBSYSTEM};
use crate::domain::{
    invariant_balance_fits, invariant_indexed, invariant_not_held, invariant_owning_key,
    Counterparty, Holdings, InboundMessage, MessageId, PendingTransferMessage, Provenance, Token,
    TokenLedgerError,
};
use crate::ports::inbound::{ReconcileReport, Rejection};
use crate::ports::outbound::{OwnedOutput, OwnershipRecord};

/// What happened to one inbound message that did not fail.
pub(super) enum Acceptance {
    /// Token validated and ownership recorded.
    Accepted(Token),
    /// The ledger already holds a record for the transaction.
    AlreadyRecorded,
}

impl TokenLedgerService {
    /// Validate one inbound transfer against `existing` and record it.
    pub(super) async fn accept_message(
        &self,
        message: &InboundMessage,
        existing: &Holdings,
    ) -> Result<Acceptance, TokenLedgerError> {
        let pending = PendingTransferMessage::parse(message)?;
        let descriptor = &pending.token;
        let outpoint = descriptor.outpoint();

        let decoded = self.codec.decode(&descriptor.output_script)?;
        let expected = self
            .keys
            .derive_public_key(&self.context(Counterparty::Other(pending.sender)), true)
            .await
            .map_err(|e| match e {
                TokenLedgerError::KeyDerivation(reason) => {
                    TokenLedgerError::Payload(format!("sender key: {reason}"))
                }
                other => other,
            })?;
        invariant_owning_key(outpoint, &decoded.owning_key, &expected)?;

        let matches = self.overlay.lookup(&self.scheme.topic, &outpoint).await?;
        invariant_indexed(outpoint, matches.len())?;

        invariant_not_held(existing.tokens(), outpoint)?;
        invariant_balance_fits(existing.balance(), outpoint, decoded.points)?;

        let provenance = Provenance::new(pending.sender);
        let record = OwnershipRecord {
            sender: pending.sender,
            note: "Receive TyPoints".to_string(),
            transaction: descriptor.envelope.clone(),
            outputs: vec![OwnedOutput {
                vout: descriptor.vout,
                basket: self.scheme.basket.clone(),
                satoshis: descriptor.amount,
                custom_instructions: Some(provenance.to_custom_instructions()),
            }],
        };
        match self.ledger.record_ownership(record).await {
            Ok(()) => {}
            Err(TokenLedgerError::DuplicateTransaction(txid)) => {
                info!(%txid, vout = descriptor.vout, "Transaction already recorded");
                return Ok(Acceptance::AlreadyRecorded);
            }
            Err(e) => return Err(e),
        }

        Ok(Acceptance::Accepted(Token {
            outpoint,
            satoshis: descriptor.amount,
            points: decoded.points,
            locking_script: descriptor.output_script.clone(),
            envelope: descriptor.envelope.envelope.clone(),
            provenance: Some(provenance),
        }))
    }

    pub(super) async fn reconcile(&self) -> Result<ReconcileReport, TokenLedgerError> {
        let mut holdings = self.holdings.lock().await;

        let inbox = self.messages.list(&self.scheme.message_box).await?;
        let mut existing = self.load_holdings().await?;
        let mut report = ReconcileReport::default();
        let mut handled: Vec<MessageId> = Vec::with_capacity(inbox.len());

        for message in &inbox {
            match self.accept_message(message, &existing).await {
                Ok(Acceptance::Accepted(token)) => {
                    tp_telemetry::log_token_event!(
                        info,
                        SUBSYSTEM,
                        "Accepted incoming token",
                        token.outpoint.txid,
                        token.outpoint.vout,
                        points = token.points,
                        sender = %message.sender
                    );
                    tp_telemetry::metrics::record_accepted(token.points);
                    existing.insert(token)?;
                    report.accepted.push(message.message_id.clone());
                }
                Ok(Acceptance::AlreadyRecorded) => {
                    report.already_recorded.push(message.message_id.clone());
                }
                Err(e) if e.is_tolerated_rejection() => {
                    warn!(
                        message_id = %message.message_id,
                        sender = %message.sender,
                        reason = e.rejection_reason(),
                        error = %e,
                        "Rejected incoming token"
                    );
                    tp_telemetry::metrics::record_rejected(e.rejection_reason());
                    report.rejected.push(Rejection {
                        message_id: message.message_id.clone(),
                        reason: e.rejection_reason(),
                    });
                }
                Err(e) => {
                    warn!(
                        message_id = %message.message_id,
                        handled = handled.len(),
                        error = %e,
                        "Aborting receive batch"
                    );
                    *holdings = existing;
                    if !handled.is_empty() {
                        if let Err(ack_err) = self.messages.acknowledge(&handled).await {
                            warn!(error = %ack_err, "Failed to acknowledge handled messages");
                        }
                    }
                    return Err(e);
                }
            }
            handled.push(message.message_id.clone());
        }

        report.balance = existing.balance();
        tp_telemetry::metrics::set_balance(report.balance);
        *holdings = existing;

        if !handled.is_empty() {
            self.messages.acknowledge(&handled).await?;
        }

        info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            already_recorded = report.already_recorded.len(),
            balance = report.balance,
            "Reconciled holdings"
        );
        Ok(report)
    }
}
