//! # Domain Entities
//!
//! Tokens, holdings and the wire forms exchanged through the relay.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::errors::TokenLedgerError;
use super::value_objects::{
    Counterparty, IdentityKey, LockingScript, MessageId, Outpoint, Txid,
};

/// Proof bundle needed to later spend an output of a transaction:
/// raw transaction, input ancestry and confirmation proofs.
///
/// `inputs`, `mapiResponses` and `proof` arrive either structured or as
/// JSON-encoded strings; both are normalised to structured values here so
/// no use site has to check again.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEnvelope {
    /// Raw transaction, hex.
    pub raw_tx: String,
    /// Envelopes of the transactions this one spends.
    #[serde(default, deserialize_with = "json_or_string")]
    pub inputs: Value,
    /// Miner acceptance responses.
    #[serde(default, deserialize_with = "json_or_string")]
    pub mapi_responses: Value,
    /// Merkle proof, once confirmed.
    #[serde(default, deserialize_with = "json_or_string")]
    pub proof: Value,
    /// Any other fields the ledger attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn json_or_string<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    })
}

/// A constructed transaction: its id plus the envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction id.
    pub txid: Txid,
    /// Proof bundle.
    #[serde(flatten)]
    pub envelope: TransactionEnvelope,
}

/// Which counterparty originally sent a held token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Sender identity key.
    pub sender: IdentityKey,
}

impl Provenance {
    /// Create provenance for a sender.
    pub fn new(sender: IdentityKey) -> Self {
        Self { sender }
    }

    /// Encode as the ledger's custom-instructions string.
    pub fn to_custom_instructions(&self) -> String {
        serde_json::json!({ "sender": self.sender }).to_string()
    }

    /// Decode from the ledger's custom-instructions string.
    pub fn from_custom_instructions(raw: &str) -> Result<Self, TokenLedgerError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// A held, spendable token output.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// Creating transaction and output index.
    pub outpoint: Outpoint,
    /// Fixed nominal on-ledger value. Not the points amount.
    pub satoshis: u64,
    /// Points amount decoded from `locking_script`.
    pub points: u64,
    /// Script binding the output to a derived key.
    pub locking_script: LockingScript,
    /// Proof bundle for later redemption.
    pub envelope: TransactionEnvelope,
    /// Original sender, if received by transfer.
    pub provenance: Option<Provenance>,
}

impl Token {
    /// Counterparty context the owning key was derived under.
    pub fn counterparty(&self) -> Counterparty {
        match self.provenance {
            Some(p) => Counterparty::Other(p.sender),
            None => Counterparty::Myself,
        }
    }

}

/// Token as delivered through the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDescriptor {
    /// Creating transaction.
    pub txid: Txid,
    /// Output index.
    pub vout: u32,
    /// Nominal on-ledger value.
    pub amount: u64,
    /// Creating transaction record.
    pub envelope: TransactionRecord,
    /// Locking script of the output.
    pub output_script: LockingScript,
}

impl TokenDescriptor {
    /// Descriptor for output `vout` of `record`.
    pub fn for_output(
        record: &TransactionRecord,
        vout: u32,
        amount: u64,
        output_script: LockingScript,
    ) -> Self {
        Self {
            txid: record.txid,
            vout,
            amount,
            envelope: record.clone(),
            output_script,
        }
    }

    /// Outpoint this descriptor refers to.
    pub fn outpoint(&self) -> Outpoint {
        Outpoint::new(self.txid, self.vout)
    }
}

/// Relay message body: `{ "token": TokenDescriptor }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferPayload {
    /// Token being delivered.
    pub token: TokenDescriptor,
}

impl TransferPayload {
    /// Encode for sending.
    pub fn to_body(&self) -> Result<String, TokenLedgerError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a received body. Accepts the object itself or a JSON string
    /// that contains it.
    pub fn from_body(body: &str) -> Result<Self, TokenLedgerError> {
        match serde_json::from_str::<Value>(body)? {
            Value::String(inner) => Ok(serde_json::from_str(&inner)?),
            value => Ok(serde_json::from_value(value)?),
        }
    }
}

/// Message as listed from the relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Relay id, used for acknowledgement.
    pub message_id: MessageId,
    /// Sender identity key.
    pub sender: IdentityKey,
    /// Raw body.
    pub body: String,
}

/// Inbound transfer after payload parsing.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingTransferMessage {
    /// Relay id.
    pub message_id: MessageId,
    /// Claimed sender.
    pub sender: IdentityKey,
    /// Delivered token.
    pub token: TokenDescriptor,
}

impl PendingTransferMessage {
    /// Parse an inbound relay message.
    pub fn parse(message: &InboundMessage) -> Result<Self, TokenLedgerError> {
        let payload = TransferPayload::from_body(&message.body)?;
        if payload.token.envelope.txid != payload.token.txid {
            return Err(TokenLedgerError::Payload(format!(
                "envelope txid {} does not match token txid {}",
                payload.token.envelope.txid, payload.token.txid
            )));
        }
        Ok(Self {
            message_id: message.message_id.clone(),
            sender: message.sender,
            token: payload.token,
        })
    }
}

/// The holder's current token set and its summed balance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Holdings {
    tokens: Vec<Token>,
    balance: u64,
}

impl Holdings {
    /// Build from tokens. Later duplicates of an outpoint are dropped.
    ///
    /// Fails with `BalanceOverflow` if the points do not sum within `u64`.
    pub fn from_tokens(tokens: Vec<Token>) -> Result<Self, TokenLedgerError> {
        let mut holdings = Self::default();
        for token in tokens {
            if !holdings.contains(&token.outpoint) {
                holdings.insert(token)?;
            }
        }
        Ok(holdings)
    }

    /// Add a token. Fails if the outpoint is already held or the balance
    /// would overflow; the holdings are unchanged on failure.
    pub fn insert(&mut self, token: Token) -> Result<(), TokenLedgerError> {
        if self.contains(&token.outpoint) {
            return Err(TokenLedgerError::DuplicateToken(token.outpoint));
        }
        self.balance = self
            .balance
            .checked_add(token.points)
            .ok_or(TokenLedgerError::BalanceOverflow(token.outpoint))?;
        self.tokens.push(token);
        Ok(())
    }

    /// Whether an outpoint is held.
    pub fn contains(&self, outpoint: &Outpoint) -> bool {
        self.tokens.iter().any(|t| t.outpoint == *outpoint)
    }

    /// Sum of points over held tokens.
    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Held tokens.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Number of held tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True when nothing is held.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
