//! # Inbound Ports
//!
//! API trait defining what the token ledger can do for its front end.

use async_trait::async_trait;

use crate::domain::{Holdings, IdentityKey, MessageId, TokenLedgerError, Txid};

/// Outcome of a completed send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    /// Spending transaction.
    pub txid: Txid,
    /// Points sent to the recipient (output 0).
    pub sent: u64,
    /// Points kept as change (output 1), if any.
    pub change: Option<u64>,
}

/// Why an inbound message was not accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    /// Relay id.
    pub message_id: MessageId,
    /// Short reason label.
    pub reason: &'static str,
}

/// Outcome of one receive-and-reconcile pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Messages whose token entered the holdings.
    pub accepted: Vec<MessageId>,
    /// Messages dropped with a reason.
    pub rejected: Vec<Rejection>,
    /// Messages whose ownership was already recorded on the ledger.
    pub already_recorded: Vec<MessageId>,
    /// Balance after reconciliation.
    pub balance: u64,
}

/// Token ledger API - inbound port.
#[async_trait]
pub trait TokenLedgerApi: Send + Sync {
    /// Issue `points` to this holder. The token arrives through the
    /// holder's own mailbox and is accepted by the next reconcile.
    async fn mint(&self, points: u64) -> Result<Txid, TokenLedgerError>;

    /// Transfer `points` to `recipient`, keeping any remainder as change.
    async fn send(
        &self,
        points: u64,
        recipient: IdentityKey,
    ) -> Result<SendReceipt, TokenLedgerError>;

    /// Drain the mailbox, validate incoming tokens and rebuild holdings.
    async fn receive_and_reconcile(&self) -> Result<ReconcileReport, TokenLedgerError>;

    /// Current balance.
    async fn balance(&self) -> u64;

    /// Snapshot of current holdings.
    async fn holdings(&self) -> Holdings;

    /// This holder's identity key.
    fn identity_key(&self) -> IdentityKey;
}
