//! # Domain Errors
//!
//! Error taxonomy for the token lifecycle protocol.
//!
//! Per-message rejections (`MalformedScript`, `NotMine`, `Unverified`,
//! `DuplicateToken`, `BalanceOverflow`, `Payload`) never abort a receive
//! batch.
//! `DuplicateTransaction` is the idempotency signal from ownership
//! registration and is swallowed by the receive flow. Everything else
//! propagates to the caller.

use thiserror::Error;

use super::value_objects::{Outpoint, Txid};

/// Token ledger error types.
#[derive(Debug, Error)]
pub enum TokenLedgerError {
    /// Locking script does not match the token field layout.
    #[error("Malformed token script: {0}")]
    MalformedScript(String),

    /// Owning key in the script is not the key derived for this holder.
    #[error("Token {0} is not owned by this holder")]
    NotMine(Outpoint),

    /// Output is not indexed by the overlay.
    #[error("Token {0} is not indexed by the overlay")]
    Unverified(Outpoint),

    /// Outpoint is already part of the holdings.
    #[error("Token {0} is already held")]
    DuplicateToken(Outpoint),

    /// Crediting the token would push the balance past `u64::MAX`.
    #[error("Token {0} would overflow the balance")]
    BalanceOverflow(Outpoint),

    /// Ownership of this transaction was already recorded.
    #[error("Transaction {0} has already been recorded")]
    DuplicateTransaction(Txid),

    /// Send amount exceeds the current balance.
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Points requested
        requested: u64,
        /// Points held
        available: u64,
    },

    /// Ledger transaction construction failed.
    #[error("Transaction construction failed: {0}")]
    Construction(String),

    /// Overlay submission failed.
    #[error("Overlay publish failed: {0}")]
    Publish(String),

    /// Overlay lookup failed (transport, not "absent").
    #[error("Overlay lookup failed: {0}")]
    Lookup(String),

    /// Message relay call failed.
    #[error("Message relay error: {0}")]
    Messaging(String),

    /// Key derivation or signing failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Inbound payload could not be parsed.
    #[error("Invalid payload: {0}")]
    Payload(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TokenLedgerError {
    /// Rejections that drop a single inbound message and let the batch continue.
    pub fn is_tolerated_rejection(&self) -> bool {
        matches!(
            self,
            Self::MalformedScript(_)
                | Self::NotMine(_)
                | Self::Unverified(_)
                | Self::DuplicateToken(_)
                | Self::BalanceOverflow(_)
                | Self::Payload(_)
        )
    }

    /// Short label used for rejection metrics and logs.
    pub fn rejection_reason(&self) -> &'static str {
        match self {
            Self::MalformedScript(_) => "malformed",
            Self::NotMine(_) => "not_mine",
            Self::Unverified(_) => "unverified",
            Self::DuplicateToken(_) => "duplicate",
            Self::BalanceOverflow(_) => "overflow",
            Self::Payload(_) => "payload",
            Self::DuplicateTransaction(_) => "duplicate_transaction",
            _ => "error",
        }
    }
}

impl From<serde_json::Error> for TokenLedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}
