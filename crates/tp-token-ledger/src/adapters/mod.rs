//! Adapters layer for the token ledger.
//!
//! Concrete collaborators behind the outbound ports. The HTTP adapters talk
//! to the overlay and relay services; the in-memory ones share state within
//! one process and back the tests and the local simulation.

pub mod key_deriver;
pub mod ledger;
pub mod mailbox;
pub mod overlay;
pub mod pushdrop;

pub use key_deriver::LocalKeyDeriver;
pub use ledger::{InMemoryChain, InMemoryLedger, RawInput, RawOutput, RawTransaction};
pub use mailbox::{HttpMessageBox, InMemoryMailbox, MailboxHandle};
pub use overlay::{HttpOverlayClient, InMemoryOverlay};
pub use pushdrop::{
    decode_locking_script, encode_locking_script, signature_digest, verify_unlock, PushDropCodec,
};
