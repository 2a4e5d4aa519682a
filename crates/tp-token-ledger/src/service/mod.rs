//! # Token Ledger Service
//!
//! Orchestrates the token lifecycle over the injected collaborators:
//!
//! 1. `mint` issues a token to the holder's own mailbox
//! 2. `send` spends every held token into a recipient output plus change
//! 3. `receive_and_reconcile` drains the mailbox, validates each token and
//!    rebuilds the holdings
//!
//! Holdings live behind an async mutex. Each operation holds it from start
//! to finish, so at most one mint, send or reconcile runs at a time.

mod api;
mod receive;

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{
    Counterparty, Holdings, IdentityKey, KeyContext, Provenance, Token, TokenLedgerError,
    TokenSchemeConfig,
};
use crate::ports::outbound::{
    HeldOutputQuery, KeyDeriver, LedgerGateway, MessageChannel, OverlayIndex, TokenCodec,
};

pub(crate) const SUBSYSTEM: &str = "token-ledger";

/// External collaborators of one session.
#[derive(Clone)]
pub struct Collaborators {
    /// Key derivation and identity.
    pub keys: Arc<dyn KeyDeriver>,
    /// Token script codec.
    pub codec: Arc<dyn TokenCodec>,
    /// Transaction construction and ownership records.
    pub ledger: Arc<dyn LedgerGateway>,
    /// Overlay submission and lookup.
    pub overlay: Arc<dyn OverlayIndex>,
    /// Peer message relay.
    pub messages: Arc<dyn MessageChannel>,
}

/// The token lifecycle service.
pub struct TokenLedgerService {
    scheme: TokenSchemeConfig,
    identity: IdentityKey,
    keys: Arc<dyn KeyDeriver>,
    codec: Arc<dyn TokenCodec>,
    ledger: Arc<dyn LedgerGateway>,
    overlay: Arc<dyn OverlayIndex>,
    messages: Arc<dyn MessageChannel>,
    holdings: Mutex<Holdings>,
}

impl TokenLedgerService {
    /// Start a session: validate the scheme, fetch the identity key and
    /// load held outputs from the ledger.
    ///
    /// The mailbox is not drained here; call `receive_and_reconcile`.
    pub async fn open(
        collaborators: Collaborators,
        scheme: TokenSchemeConfig,
    ) -> Result<Self, TokenLedgerError> {
        scheme.validate()?;
        let identity = collaborators.keys.identity_key().await?;

        let service = Self {
            scheme,
            identity,
            keys: collaborators.keys,
            codec: collaborators.codec,
            ledger: collaborators.ledger,
            overlay: collaborators.overlay,
            messages: collaborators.messages,
            holdings: Mutex::new(Holdings::default()),
        };

        let loaded = service.load_holdings().await?;
        tp_telemetry::metrics::set_balance(loaded.balance());
        debug!(
            identity = %service.identity,
            tokens = loaded.len(),
            balance = loaded.balance(),
            "Session opened"
        );
        *service.holdings.lock().await = loaded;
        Ok(service)
    }

    /// Scheme parameters of this session.
    pub fn scheme(&self) -> &TokenSchemeConfig {
        &self.scheme
    }

    fn context(&self, counterparty: Counterparty) -> KeyContext {
        KeyContext::new(&self.scheme.protocol_id, &self.scheme.key_id, counterparty)
    }

    fn topics(&self) -> Vec<String> {
        vec![self.scheme.topic.clone()]
    }

    /// Held outputs in the token basket, decoded into tokens.
    ///
    /// Outputs whose script does not decode are left out.
    async fn load_holdings(&self) -> Result<Holdings, TokenLedgerError> {
        let outputs = self
            .ledger
            .query_held_outputs(&HeldOutputQuery {
                basket: self.scheme.basket.clone(),
                spendable_only: true,
            })
            .await?;

        let mut tokens = Vec::with_capacity(outputs.len());
        for output in outputs {
            let decoded = match self.codec.decode(&output.locking_script) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(outpoint = %output.outpoint, error = %e, "Skipping undecodable held output");
                    continue;
                }
            };
            let provenance = output
                .custom_instructions
                .as_deref()
                .and_then(|raw| Provenance::from_custom_instructions(raw).ok());
            tokens.push(Token {
                outpoint: output.outpoint,
                satoshis: output.satoshis,
                points: decoded.points,
                locking_script: output.locking_script,
                envelope: output.envelope,
                provenance,
            });
        }
        Holdings::from_tokens(tokens)
    }
}
