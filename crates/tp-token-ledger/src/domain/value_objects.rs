//! # Domain Value Objects
//!
//! Immutable identifiers, keys and scripts. All of them travel as lowercase
//! hex strings on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::TokenLedgerError;

/// Transaction identifier (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Txid([u8; 32]);

impl Txid {
    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for Txid {
    type Err = TokenLedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| TokenLedgerError::Payload(format!("txid: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TokenLedgerError::Payload("txid must be 32 bytes".to_string()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Txid {
    type Error = TokenLedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Txid> for String {
    fn from(value: Txid) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txid({})", self)
    }
}

/// Reference to one output of a transaction. Unique key of a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Outpoint {
    /// Creating transaction.
    pub txid: Txid,
    /// Output index within that transaction.
    pub vout: u32,
}

impl Outpoint {
    /// Create an outpoint.
    pub fn new(txid: Txid, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.txid, self.vout)
    }
}

/// Compressed secp256k1 public key (33 bytes).
///
/// Used both for identity keys and for derived owning keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompressedKey([u8; 33]);

/// Stable identity key of a participant.
pub type IdentityKey = CompressedKey;

impl CompressedKey {
    /// Wrap raw compressed bytes. The caller guarantees a valid point.
    pub fn from_bytes(bytes: [u8; 33]) -> Self {
        Self(bytes)
    }

    /// Parse from a SEC1 compressed slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TokenLedgerError> {
        let bytes: [u8; 33] = bytes.try_into().map_err(|_| {
            TokenLedgerError::Payload(format!("public key must be 33 bytes, got {}", bytes.len()))
        })?;
        if bytes[0] != 0x02 && bytes[0] != 0x03 {
            return Err(TokenLedgerError::Payload(
                "public key must be SEC1 compressed".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    /// Raw compressed bytes.
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }
}

impl FromStr for CompressedKey {
    type Err = TokenLedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes =
            hex::decode(s).map_err(|e| TokenLedgerError::Payload(format!("public key: {e}")))?;
        Self::from_slice(&bytes)
    }
}

impl TryFrom<String> for CompressedKey {
    type Error = TokenLedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CompressedKey> for String {
    fn from(value: CompressedKey) -> Self {
        value.to_string()
    }
}

impl fmt::Display for CompressedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for CompressedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompressedKey({})", self)
    }
}

/// Whose key a derivation is relative to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Counterparty {
    /// The holder itself (minted tokens, change).
    Myself,
    /// Another participant, identified by identity key.
    Other(IdentityKey),
}

impl fmt::Display for Counterparty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Counterparty::Myself => f.write_str("self"),
            Counterparty::Other(key) => write!(f, "{}", key),
        }
    }
}

/// Full derivation context: protocol, key index and counterparty.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyContext {
    /// Protocol identifier.
    pub protocol_id: String,
    /// Key index within the protocol.
    pub key_id: String,
    /// Counterparty the key is derived relative to.
    pub counterparty: Counterparty,
}

impl KeyContext {
    /// Create a derivation context.
    pub fn new(
        protocol_id: impl Into<String>,
        key_id: impl Into<String>,
        counterparty: Counterparty,
    ) -> Self {
        Self {
            protocol_id: protocol_id.into(),
            key_id: key_id.into(),
            counterparty,
        }
    }

    /// Invoice number binding the derivation to protocol and key index.
    pub fn invoice_number(&self) -> String {
        format!("2-{}-{}", self.protocol_id, self.key_id)
    }
}

macro_rules! script_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Vec<u8>);

        impl $name {
            /// Wrap raw script bytes.
            pub fn new(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }

            /// Raw script bytes.
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// Hex form.
            pub fn to_hex(&self) -> String {
                hex::encode(&self.0)
            }

            /// Parse from hex.
            pub fn from_hex(s: &str) -> Result<Self, TokenLedgerError> {
                hex::decode(s)
                    .map(Self)
                    .map_err(|e| TokenLedgerError::Payload(format!("script hex: {e}")))
            }
        }

        impl TryFrom<String> for $name {
            type Error = TokenLedgerError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::from_hex(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_hex()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }
    };
}

script_newtype!(
    /// Script that locks an output to a derived key.
    LockingScript
);

script_newtype!(
    /// Proof satisfying a locking script.
    UnlockingScript
);

/// Relay-assigned message identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
