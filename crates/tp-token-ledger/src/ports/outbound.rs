//! # Outbound Ports
//!
//! Traits for the external collaborators: key derivation, token script
//! codec, ledger, overlay index and message relay.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::domain::{
    CompressedKey, IdentityKey, InboundMessage, KeyContext, LockingScript, MessageId, Outpoint,
    Token, TokenLedgerError, TransactionEnvelope, TransactionRecord, Txid, UnlockingScript,
};

/// Key derivation / identity service - outbound port.
#[async_trait]
pub trait KeyDeriver: Send + Sync {
    /// Stable identity key of this holder.
    async fn identity_key(&self) -> Result<IdentityKey, TokenLedgerError>;

    /// Derive a public key for a context.
    ///
    /// With `for_self` the key is the one this holder owns when receiving
    /// from the counterparty; without it, the key the counterparty owns.
    async fn derive_public_key(
        &self,
        context: &KeyContext,
        for_self: bool,
    ) -> Result<CompressedKey, TokenLedgerError>;

    /// Sign a digest with this holder's private key for a context.
    /// Returns a DER encoded signature.
    async fn sign(
        &self,
        context: &KeyContext,
        digest: &[u8; 32],
    ) -> Result<Vec<u8>, TokenLedgerError>;
}

/// Fields decoded from a token locking script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedToken {
    /// Points amount from the first field.
    pub points: u64,
    /// Key the output is locked to.
    pub owning_key: CompressedKey,
}

/// Token script codec - outbound port.
#[async_trait]
pub trait TokenCodec: Send + Sync {
    /// Build a locking script carrying `points`, bound to the key derived
    /// for `context`.
    async fn lock(
        &self,
        points: u64,
        context: &KeyContext,
    ) -> Result<LockingScript, TokenLedgerError>;

    /// Decode a locking script.
    fn decode(&self, script: &LockingScript) -> Result<DecodedToken, TokenLedgerError>;

    /// Build the unlocking proof for a held token. `context` must be the
    /// one the token was locked under.
    async fn unlock(
        &self,
        token: &Token,
        context: &KeyContext,
    ) -> Result<UnlockingScript, TokenLedgerError>;
}

/// One output of a prior transaction being redeemed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemSpec {
    /// Output index.
    pub index: u32,
    /// Proof satisfying the output's locking script.
    pub unlocking_script: UnlockingScript,
}

/// All outputs redeemed from one prior transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSpec {
    /// Envelope of the prior transaction.
    #[serde(flatten)]
    pub envelope: TransactionEnvelope,
    /// Outputs redeemed from it.
    pub outputs_to_redeem: Vec<RedeemSpec>,
}

/// An output to create.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    /// Locking script.
    pub script: LockingScript,
    /// Nominal value.
    pub satoshis: u64,
    /// Classification basket, if the output stays with the builder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basket: Option<String>,
    /// Metadata stored alongside the output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
}

/// Transaction construction request.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildRequest {
    /// Human readable description.
    pub description: String,
    /// Inputs grouped by source transaction.
    pub inputs: BTreeMap<Txid, InputSpec>,
    /// Outputs in order.
    pub outputs: Vec<OutputSpec>,
}

/// Query for held outputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeldOutputQuery {
    /// Classification basket.
    pub basket: String,
    /// Only unspent outputs.
    pub spendable_only: bool,
}

/// A held output as reported by the ledger.
#[derive(Clone, Debug, PartialEq)]
pub struct HeldOutput {
    /// Output reference.
    pub outpoint: Outpoint,
    /// Nominal value.
    pub satoshis: u64,
    /// Locking script.
    pub locking_script: LockingScript,
    /// Creating transaction envelope.
    pub envelope: TransactionEnvelope,
    /// Metadata stored with the output.
    pub custom_instructions: Option<String>,
}

/// An output of a recorded transaction that now belongs to the holder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedOutput {
    /// Output index.
    pub vout: u32,
    /// Classification basket.
    pub basket: String,
    /// Nominal value.
    pub satoshis: u64,
    /// Metadata stored with the output.
    pub custom_instructions: Option<String>,
}

/// Ownership registration request.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnershipRecord {
    /// Identity the outputs came from.
    pub sender: IdentityKey,
    /// Free-form note.
    pub note: String,
    /// Transaction carrying the outputs.
    pub transaction: TransactionRecord,
    /// Outputs now owned.
    pub outputs: Vec<OwnedOutput>,
}

/// Ledger / transaction-construction engine - outbound port.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Build and sign a transaction. Fails with `Construction` when an
    /// input proof does not satisfy its output.
    async fn build_transaction(
        &self,
        request: BuildRequest,
    ) -> Result<TransactionRecord, TokenLedgerError>;

    /// Outputs currently held under a basket.
    async fn query_held_outputs(
        &self,
        query: &HeldOutputQuery,
    ) -> Result<Vec<HeldOutput>, TokenLedgerError>;

    /// Register outputs of a transaction as owned. A repeated txid yields
    /// `DuplicateTransaction` and changes nothing.
    async fn record_ownership(&self, record: OwnershipRecord) -> Result<(), TokenLedgerError>;
}

/// Overlay acknowledgement of a submission.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmitAck(pub Value);

/// One overlay lookup hit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Fields returned by the lookup service.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Overlay index - outbound port.
#[async_trait]
pub trait OverlayIndex: Send + Sync {
    /// Publish a transaction under topics. Failures are `Publish`.
    async fn submit(
        &self,
        transaction: &TransactionRecord,
        topics: &[String],
    ) -> Result<SubmitAck, TokenLedgerError>;

    /// Indexed records for an output. Empty means not indexed.
    async fn lookup(
        &self,
        topic: &str,
        outpoint: &Outpoint,
    ) -> Result<Vec<MatchRecord>, TokenLedgerError>;
}

/// Peer message relay - outbound port.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Deliver a body to a recipient's mailbox.
    async fn send(
        &self,
        recipient: &IdentityKey,
        message_box: &str,
        body: String,
    ) -> Result<(), TokenLedgerError>;

    /// Undelivered messages addressed to this holder.
    async fn list(&self, message_box: &str) -> Result<Vec<InboundMessage>, TokenLedgerError>;

    /// Remove messages from the mailbox.
    async fn acknowledge(&self, message_ids: &[MessageId]) -> Result<(), TokenLedgerError>;
}
