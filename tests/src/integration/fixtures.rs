//! # Test Fixtures
//!
//! A `Network` owns the shared chain, overlay index and relay. Every holder
//! opened on it gets its own key, wallet view and mailbox handle, wrapped in
//! counting collaborators so tests can assert which calls an operation made.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use tp_token_ledger::domain::{InboundMessage, TokenDescriptor, TransactionRecord};
use tp_token_ledger::ports::outbound::{
    BuildRequest, HeldOutput, HeldOutputQuery, MatchRecord, OwnershipRecord, SubmitAck,
};
use tp_token_ledger::{
    Collaborators, IdentityKey, InMemoryChain, InMemoryLedger, InMemoryMailbox, InMemoryOverlay,
    LedgerGateway, LocalKeyDeriver, MessageChannel, MessageId, Outpoint, OverlayIndex,
    PushDropCodec, TokenLedgerApi, TokenLedgerError, TokenLedgerService, TokenSchemeConfig,
    TransferPayload,
};

/// Shared ledger, overlay and relay.
pub struct Network {
    pub chain: Arc<InMemoryChain>,
    pub overlay: Arc<InMemoryOverlay>,
    pub relay: Arc<InMemoryMailbox>,
    pub scheme: TokenSchemeConfig,
}

impl Network {
    pub fn new() -> Self {
        Self {
            chain: Arc::new(InMemoryChain::new()),
            overlay: Arc::new(InMemoryOverlay::new()),
            relay: InMemoryMailbox::new(),
            scheme: TokenSchemeConfig::default(),
        }
    }

    /// Open a holder with a fresh key.
    pub async fn holder(&self) -> Holder {
        let keys = Arc::new(LocalKeyDeriver::generate().expect("key generation"));
        let ledger = Arc::new(CountingLedger::new(InMemoryLedger::new(self.chain.clone())));
        let overlay = Arc::new(CountingOverlay::new(self.overlay.clone()));
        let messages = Arc::new(CountingChannel::new(self.relay.handle(keys.identity())));

        let collaborators = Collaborators {
            codec: Arc::new(PushDropCodec::new(keys.clone())),
            keys: keys.clone(),
            ledger: ledger.clone(),
            overlay: overlay.clone(),
            messages: messages.clone(),
        };
        let service = TokenLedgerService::open(collaborators.clone(), self.scheme.clone())
            .await
            .expect("open session");

        Holder {
            service,
            collaborators,
            keys,
            ledger,
            overlay,
            messages,
        }
    }

    /// Messages waiting for `holder` in the token mailbox.
    pub fn pending_for(&self, holder: &Holder) -> usize {
        self.relay
            .pending_for(&holder.identity_key(), &self.scheme.message_box)
    }

    /// Put a transfer message in `recipient`'s mailbox as if `sender` sent it.
    pub fn deliver(&self, sender: IdentityKey, recipient: &Holder, body: String) -> MessageId {
        self.relay.deliver(
            sender,
            recipient.identity_key(),
            &self.scheme.message_box,
            body,
        )
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

/// An open session plus handles on its collaborators.
pub struct Holder {
    pub service: TokenLedgerService,
    pub collaborators: Collaborators,
    pub keys: Arc<LocalKeyDeriver>,
    pub ledger: Arc<CountingLedger>,
    pub overlay: Arc<CountingOverlay>,
    pub messages: Arc<CountingChannel>,
}

impl Holder {
    pub fn identity_key(&self) -> IdentityKey {
        self.keys.identity()
    }

    /// Calls made to the ledger, overlay and relay so far.
    pub fn network_calls(&self) -> usize {
        self.ledger.calls() + self.overlay.calls() + self.messages.calls()
    }

    /// Start a new session over the same wallet and mailbox.
    pub async fn reopen(&self, scheme: TokenSchemeConfig) -> TokenLedgerService {
        TokenLedgerService::open(self.collaborators.clone(), scheme)
            .await
            .expect("reopen session")
    }

    /// Relay body carrying the held token at `outpoint`.
    pub async fn transfer_body(&self, outpoint: &Outpoint) -> String {
        let holdings = self.service.holdings().await;
        let token = holdings
            .tokens()
            .iter()
            .find(|t| t.outpoint == *outpoint)
            .expect("token held");
        let record = TransactionRecord {
            txid: token.outpoint.txid,
            envelope: token.envelope.clone(),
        };
        TransferPayload {
            token: TokenDescriptor::for_output(
                &record,
                token.outpoint.vout,
                token.satoshis,
                token.locking_script.clone(),
            ),
        }
        .to_body()
        .expect("encode body")
    }
}

impl Deref for Holder {
    type Target = TokenLedgerService;

    fn deref(&self) -> &Self::Target {
        &self.service
    }
}

/// Ledger wrapper that counts calls and can refuse ownership records.
pub struct CountingLedger {
    inner: InMemoryLedger,
    calls: AtomicUsize,
    fail_records: AtomicBool,
}

impl CountingLedger {
    pub fn new(inner: InMemoryLedger) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_records: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_records(&self, fail: bool) {
        self.fail_records.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerGateway for CountingLedger {
    async fn build_transaction(
        &self,
        request: BuildRequest,
    ) -> Result<TransactionRecord, TokenLedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.build_transaction(request).await
    }

    async fn query_held_outputs(
        &self,
        query: &HeldOutputQuery,
    ) -> Result<Vec<HeldOutput>, TokenLedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.query_held_outputs(query).await
    }

    async fn record_ownership(&self, record: OwnershipRecord) -> Result<(), TokenLedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_records.load(Ordering::SeqCst) {
            return Err(TokenLedgerError::Construction("wallet offline".into()));
        }
        self.inner.record_ownership(record).await
    }
}

/// Overlay wrapper that counts calls and can fail lookups from the n-th on.
pub struct CountingOverlay {
    inner: Arc<InMemoryOverlay>,
    calls: AtomicUsize,
    lookups: AtomicUsize,
    fail_lookups_from: Mutex<Option<usize>>,
}

impl CountingOverlay {
    pub fn new(inner: Arc<InMemoryOverlay>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
            fail_lookups_from: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail every lookup after `ok` more succeed. `None` restores service.
    pub fn fail_lookups_after(&self, ok: Option<usize>) {
        let seen = self.lookups.load(Ordering::SeqCst);
        *self.fail_lookups_from.lock() = ok.map(|n| seen + n);
    }
}

#[async_trait]
impl OverlayIndex for CountingOverlay {
    async fn submit(
        &self,
        transaction: &TransactionRecord,
        topics: &[String],
    ) -> Result<SubmitAck, TokenLedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.submit(transaction, topics).await
    }

    async fn lookup(
        &self,
        topic: &str,
        outpoint: &Outpoint,
    ) -> Result<Vec<MatchRecord>, TokenLedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let n = self.lookups.fetch_add(1, Ordering::SeqCst);
        if matches!(*self.fail_lookups_from.lock(), Some(limit) if n >= limit) {
            return Err(TokenLedgerError::Lookup("overlay unreachable".into()));
        }
        self.inner.lookup(topic, outpoint).await
    }
}

/// Relay wrapper that counts calls and remembers acknowledged ids.
pub struct CountingChannel {
    inner: tp_token_ledger::MailboxHandle,
    calls: AtomicUsize,
    acknowledged: Mutex<Vec<Vec<MessageId>>>,
}

impl CountingChannel {
    pub fn new(inner: tp_token_ledger::MailboxHandle) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            acknowledged: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Id sets passed to `acknowledge`, one entry per call.
    pub fn acknowledged(&self) -> Vec<Vec<MessageId>> {
        self.acknowledged.lock().clone()
    }
}

#[async_trait]
impl MessageChannel for CountingChannel {
    async fn send(
        &self,
        recipient: &IdentityKey,
        message_box: &str,
        body: String,
    ) -> Result<(), TokenLedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.send(recipient, message_box, body).await
    }

    async fn list(&self, message_box: &str) -> Result<Vec<InboundMessage>, TokenLedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list(message_box).await
    }

    async fn acknowledge(&self, message_ids: &[MessageId]) -> Result<(), TokenLedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.acknowledged.lock().push(message_ids.to_vec());
        self.inner.acknowledge(message_ids).await
    }
}
