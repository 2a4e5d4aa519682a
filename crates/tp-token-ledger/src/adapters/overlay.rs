//! # Overlay Index Adapters
//!
//! - `HttpOverlayClient`: `POST {host}/submit` and `POST {host}/lookup`.
//! - `InMemoryOverlay`: indexes every output of submitted transactions.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::adapters::ledger::RawTransaction;
use crate::domain::{EndpointConfig, Outpoint, TokenLedgerError, TransactionRecord, Txid};
use crate::ports::outbound::{MatchRecord, OverlayIndex, SubmitAck};

/// HTTP client for the overlay submission and lookup service.
pub struct HttpOverlayClient {
    client: Client,
    base_url: String,
}

impl HttpOverlayClient {
    /// Create a client for the configured overlay host.
    pub fn new(config: &EndpointConfig) -> Result<Self, TokenLedgerError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TokenLedgerError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.overlay_host.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, String> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    format!("Cannot connect to {}", self.base_url)
                } else {
                    e.to_string()
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("{url} returned {status}: {text}"));
        }
        response.json().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl OverlayIndex for HttpOverlayClient {
    async fn submit(
        &self,
        transaction: &TransactionRecord,
        topics: &[String],
    ) -> Result<SubmitAck, TokenLedgerError> {
        let mut body = match serde_json::to_value(transaction)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        body.insert("topics".to_string(), json!(topics));

        let ack = self
            .post("submit", &Value::Object(body))
            .await
            .map_err(TokenLedgerError::Publish)?;
        if ack.get("status").and_then(Value::as_str) == Some("error") {
            return Err(TokenLedgerError::Publish(ack.to_string()));
        }
        debug!(txid = %transaction.txid, ?topics, "Submitted to overlay");
        Ok(SubmitAck(ack))
    }

    async fn lookup(
        &self,
        topic: &str,
        outpoint: &Outpoint,
    ) -> Result<Vec<MatchRecord>, TokenLedgerError> {
        let body = json!({
            "provider": topic,
            "query": { "txid": outpoint.txid, "vout": outpoint.vout },
        });
        let result = self
            .post("lookup", &body)
            .await
            .map_err(TokenLedgerError::Lookup)?;
        match result {
            Value::Array(_) => serde_json::from_value(result)
                .map_err(|e| TokenLedgerError::Lookup(format!("lookup response: {e}"))),
            Value::Object(ref map) if map.get("status").and_then(Value::as_str) == Some("error") => {
                Err(TokenLedgerError::Lookup(result.to_string()))
            }
            other => {
                warn!(%outpoint, response = %other, "Unexpected lookup response");
                Ok(Vec::new())
            }
        }
    }
}

/// In-process overlay index.
#[derive(Default)]
pub struct InMemoryOverlay {
    index: RwLock<BTreeMap<String, BTreeMap<Outpoint, MatchRecord>>>,
    submitted: RwLock<HashSet<Txid>>,
    reject_submissions: AtomicBool,
}

impl InMemoryOverlay {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent submissions fail with `Publish`.
    pub fn set_reject_submissions(&self, reject: bool) {
        self.reject_submissions.store(reject, Ordering::SeqCst);
    }

    /// Remove an output from every topic.
    pub fn forget(&self, outpoint: &Outpoint) {
        for entries in self.index.write().values_mut() {
            entries.remove(outpoint);
        }
    }

    /// Whether a transaction was submitted.
    pub fn was_submitted(&self, txid: &Txid) -> bool {
        self.submitted.read().contains(txid)
    }
}

#[async_trait]
impl OverlayIndex for InMemoryOverlay {
    async fn submit(
        &self,
        transaction: &TransactionRecord,
        topics: &[String],
    ) -> Result<SubmitAck, TokenLedgerError> {
        if self.reject_submissions.load(Ordering::SeqCst) {
            return Err(TokenLedgerError::Publish(format!(
                "overlay rejected {}",
                transaction.txid
            )));
        }

        let tx = RawTransaction::from_hex(&transaction.envelope.raw_tx)
            .map_err(|e| TokenLedgerError::Publish(e.to_string()))?;
        let mut index = self.index.write();
        for topic in topics {
            let entries = index.entry(topic.clone()).or_default();
            for (vout, output) in tx.outputs.iter().enumerate() {
                let outpoint = Outpoint::new(transaction.txid, vout as u32);
                let mut fields = Map::new();
                fields.insert("txid".into(), json!(transaction.txid));
                fields.insert("vout".into(), json!(vout));
                fields.insert("outputScript".into(), json!(hex::encode(&output.script)));
                fields.insert("satoshis".into(), json!(output.satoshis));
                entries.insert(outpoint, MatchRecord { fields });
            }
        }
        self.submitted.write().insert(transaction.txid);

        Ok(SubmitAck(json!({ "status": "success", "topics": topics })))
    }

    async fn lookup(
        &self,
        topic: &str,
        outpoint: &Outpoint,
    ) -> Result<Vec<MatchRecord>, TokenLedgerError> {
        Ok(self
            .index
            .read()
            .get(topic)
            .and_then(|entries| entries.get(outpoint))
            .cloned()
            .into_iter()
            .collect())
    }
}
