//! # TP Token Ledger
//!
//! Token lifecycle protocol for fungible "points" tokens carried as
//! individually spendable ledger outputs.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Mint tokens, transfer them peer to peer through a message relay, and
//! keep a local balance that only counts tokens which:
//! - are locked to the key this holder derives for the claimed sender
//! - are indexed by the overlay lookup service
//! - are not already held
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | Unique outpoints in holdings | `domain/entities.rs` - `Holdings::insert` |
//! | Owning key matches sender derivation | `domain/invariants.rs` - `invariant_owning_key` |
//! | Overlay indexed before acceptance | `domain/invariants.rs` - `invariant_indexed` |
//! | Send never exceeds balance | `domain/invariants.rs` - `invariant_sufficient_balance` |
//! | One operation at a time | `service/mod.rs` - holdings mutex |
//!
//! ## Module Structure
//!
//! ```text
//! tp-token-ledger/
//! ├── domain/     # Token, Holdings, wire forms, errors, invariants, config
//! ├── ports/      # TokenLedgerApi (inbound) + collaborator traits (outbound)
//! ├── adapters/   # Key deriver, push-drop codec, ledger, overlay, mailbox
//! └── service/    # TokenLedgerService orchestrating everything
//! ```
//!
//! ## Receive Flow
//!
//! ```text
//! list mailbox ─→ parse ─→ owning key ─→ overlay lookup ─→ not held ─→ record ownership
//!                   │          │               │               │              │
//!                   └──────────┴───── reject, continue ────────┘    duplicate tx: skip
//!                                                                   other error: abort
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{
    HttpMessageBox, HttpOverlayClient, InMemoryChain, InMemoryLedger, InMemoryMailbox,
    InMemoryOverlay, LocalKeyDeriver, MailboxHandle, PushDropCodec,
};
pub use domain::{
    Counterparty, EndpointConfig, Holdings, IdentityKey, KeyContext, LockingScript, MessageId,
    Outpoint, Provenance, Token, TokenDescriptor, TokenLedgerError, TokenSchemeConfig,
    TransactionEnvelope, TransactionRecord, TransferPayload, Txid, UnlockingScript,
};
pub use ports::{
    KeyDeriver, LedgerGateway, MessageChannel, OverlayIndex, ReconcileReport, Rejection,
    SendReceipt, TokenCodec, TokenLedgerApi,
};
pub use service::{Collaborators, TokenLedgerService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
