//! Subcommand implementations.

use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use tracing::info;

use tp_token_ledger::domain::InboundMessage;
use tp_token_ledger::ports::outbound::MatchRecord;
use tp_token_ledger::{
    Collaborators, EndpointConfig, HttpMessageBox, HttpOverlayClient, IdentityKey,
    InMemoryChain, InMemoryLedger, InMemoryMailbox, InMemoryOverlay, LocalKeyDeriver,
    MessageChannel, OverlayIndex, Outpoint, PushDropCodec, TokenLedgerApi, TokenLedgerService,
    TokenSchemeConfig, Txid,
};

/// Environment variable holding the hex root secret.
pub const ROOT_KEY_VAR: &str = "TP_ROOT_KEY";

/// Result of a local simulation.
#[derive(Debug)]
pub struct SimulationOutcome {
    pub alice: IdentityKey,
    pub bob: IdentityKey,
    pub alice_balance: u64,
    pub bob_balance: u64,
    pub send_txid: Txid,
}

/// Two holders sharing one in-memory chain, overlay and relay.
pub async fn simulate(mint: u64, send: u64) -> Result<SimulationOutcome> {
    let chain = Arc::new(InMemoryChain::new());
    let overlay = Arc::new(InMemoryOverlay::new());
    let relay = InMemoryMailbox::new();

    let open = |keys: Arc<LocalKeyDeriver>| {
        let collaborators = Collaborators {
            codec: Arc::new(PushDropCodec::new(keys.clone())),
            ledger: Arc::new(InMemoryLedger::new(chain.clone())),
            overlay: overlay.clone(),
            messages: Arc::new(relay.handle(keys.identity())),
            keys,
        };
        TokenLedgerService::open(collaborators, TokenSchemeConfig::default())
    };

    let alice = open(Arc::new(LocalKeyDeriver::generate()?)).await?;
    let bob = open(Arc::new(LocalKeyDeriver::generate()?)).await?;

    let minted = alice.mint(mint).await.context("mint failed")?;
    info!(%minted, points = mint, "Alice minted");
    alice.receive_and_reconcile().await?;

    let receipt = alice
        .send(send, bob.identity_key())
        .await
        .context("send failed")?;
    bob.receive_and_reconcile().await?;
    alice.receive_and_reconcile().await?;

    Ok(SimulationOutcome {
        alice: alice.identity_key(),
        bob: bob.identity_key(),
        alice_balance: alice.balance().await,
        bob_balance: bob.balance().await,
        send_txid: receipt.txid,
    })
}

/// Query the configured overlay for one output.
pub async fn lookup(txid: &str, vout: u32) -> Result<Vec<MatchRecord>> {
    let txid: Txid = txid.parse().context("invalid txid")?;
    let scheme = TokenSchemeConfig::default();
    let overlay = HttpOverlayClient::new(&EndpointConfig::from_env())?;
    Ok(overlay
        .lookup(&scheme.topic, &Outpoint::new(txid, vout))
        .await?)
}

/// Undelivered token messages for the configured key.
pub async fn inbox() -> Result<Vec<InboundMessage>> {
    let keys = load_keys()?;
    let scheme = TokenSchemeConfig::default();
    let relay = HttpMessageBox::new(&EndpointConfig::from_env(), keys.identity())?;
    Ok(relay.list(&scheme.message_box).await?)
}

/// Identity key for the configured root secret.
pub fn identity() -> Result<IdentityKey> {
    Ok(load_keys()?.identity())
}

/// Prometheus text for every metric recorded in this process.
pub fn metrics_text() -> Result<String> {
    tp_telemetry::register_metrics()?;
    Ok(tp_telemetry::gather_metrics()?)
}

fn load_keys() -> Result<LocalKeyDeriver> {
    let secret = env::var(ROOT_KEY_VAR).with_context(|| format!("{ROOT_KEY_VAR} is not set"))?;
    Ok(LocalKeyDeriver::from_hex(&secret)?)
}
