//! # Message Relay Adapters
//!
//! - `HttpMessageBox`: store-and-forward relay over HTTP
//!   (`/sendMessage`, `/listMessages`, `/acknowledgeMessage`).
//! - `InMemoryMailbox`: shared in-process relay. Each participant talks to
//!   it through a `MailboxHandle` bound to their identity key.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::domain::{EndpointConfig, IdentityKey, InboundMessage, MessageId, TokenLedgerError};
use crate::ports::outbound::MessageChannel;

/// Header carrying the caller's identity key.
pub const IDENTITY_HEADER: &str = "x-identity-key";

#[derive(Debug, Deserialize)]
struct RelayResponse {
    status: String,
    #[serde(default)]
    messages: Vec<RelayMessage>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl RelayResponse {
    fn into_result(self) -> Result<Vec<RelayMessage>, TokenLedgerError> {
        if self.status == "error" {
            return Err(TokenLedgerError::Messaging(format!(
                "{}: {}",
                self.code.as_deref().unwrap_or("ERR_UNKNOWN"),
                self.description.as_deref().unwrap_or("relay returned an error")
            )));
        }
        Ok(self.messages)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayMessage {
    #[serde(deserialize_with = "string_or_number")]
    message_id: String,
    sender: IdentityKey,
    body: Value,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "message id must be a string or number, got {other}"
        ))),
    }
}

impl From<RelayMessage> for InboundMessage {
    fn from(message: RelayMessage) -> Self {
        let body = match message.body {
            Value::String(s) => s,
            other => other.to_string(),
        };
        InboundMessage {
            message_id: MessageId(message.message_id),
            sender: message.sender,
            body,
        }
    }
}

/// HTTP client for the peer message relay.
pub struct HttpMessageBox {
    client: Client,
    base_url: String,
    identity: IdentityKey,
}

impl HttpMessageBox {
    /// Create a relay client acting as `identity`.
    pub fn new(config: &EndpointConfig, identity: IdentityKey) -> Result<Self, TokenLedgerError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TokenLedgerError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.message_box_host.trim_end_matches('/').to_string(),
            identity,
        })
    }

    async fn call(&self, path: &str, body: Value) -> Result<Vec<RelayMessage>, TokenLedgerError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header(IDENTITY_HEADER, self.identity.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| TokenLedgerError::Messaging(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenLedgerError::Messaging(format!("{url} returned {status}")));
        }
        let parsed: RelayResponse = response
            .json()
            .await
            .map_err(|e| TokenLedgerError::Messaging(format!("{url}: {e}")))?;
        parsed.into_result()
    }
}

#[async_trait]
impl MessageChannel for HttpMessageBox {
    async fn send(
        &self,
        recipient: &IdentityKey,
        message_box: &str,
        body: String,
    ) -> Result<(), TokenLedgerError> {
        self.call(
            "sendMessage",
            json!({
                "message": {
                    "recipient": recipient,
                    "messageBox": message_box,
                    "body": body,
                }
            }),
        )
        .await?;
        debug!(%recipient, message_box, "Message sent");
        Ok(())
    }

    async fn list(&self, message_box: &str) -> Result<Vec<InboundMessage>, TokenLedgerError> {
        let messages = self
            .call("listMessages", json!({ "messageBox": message_box }))
            .await?;
        Ok(messages.into_iter().map(InboundMessage::from).collect())
    }

    async fn acknowledge(&self, message_ids: &[MessageId]) -> Result<(), TokenLedgerError> {
        self.call("acknowledgeMessage", json!({ "messageIds": message_ids }))
            .await?;
        debug!(count = message_ids.len(), "Messages acknowledged");
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct StoredMessage {
    id: MessageId,
    recipient: IdentityKey,
    message_box: String,
    sender: IdentityKey,
    body: String,
}

/// Shared in-process relay.
#[derive(Default)]
pub struct InMemoryMailbox {
    messages: RwLock<Vec<StoredMessage>>,
    next_id: AtomicU64,
}

impl InMemoryMailbox {
    /// Empty relay.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Channel for one participant.
    pub fn handle(self: &Arc<Self>, identity: IdentityKey) -> MailboxHandle {
        MailboxHandle {
            relay: Arc::clone(self),
            identity,
        }
    }

    /// Number of undelivered messages for a recipient and mailbox.
    pub fn pending_for(&self, recipient: &IdentityKey, message_box: &str) -> usize {
        self.messages
            .read()
            .iter()
            .filter(|m| m.recipient == *recipient && m.message_box == message_box)
            .count()
    }

    /// Store a message with an explicit sender. Returns its id.
    pub fn deliver(
        &self,
        sender: IdentityKey,
        recipient: IdentityKey,
        message_box: &str,
        body: String,
    ) -> MessageId {
        let id = MessageId((self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string());
        self.messages.write().push(StoredMessage {
            id: id.clone(),
            recipient,
            message_box: message_box.to_string(),
            sender,
            body,
        });
        id
    }
}

/// One participant's view of an `InMemoryMailbox`.
#[derive(Clone)]
pub struct MailboxHandle {
    relay: Arc<InMemoryMailbox>,
    identity: IdentityKey,
}

#[async_trait]
impl MessageChannel for MailboxHandle {
    async fn send(
        &self,
        recipient: &IdentityKey,
        message_box: &str,
        body: String,
    ) -> Result<(), TokenLedgerError> {
        self.relay.deliver(self.identity, *recipient, message_box, body);
        Ok(())
    }

    async fn list(&self, message_box: &str) -> Result<Vec<InboundMessage>, TokenLedgerError> {
        Ok(self
            .relay
            .messages
            .read()
            .iter()
            .filter(|m| m.recipient == self.identity && m.message_box == message_box)
            .map(|m| InboundMessage {
                message_id: m.id.clone(),
                sender: m.sender,
                body: m.body.clone(),
            })
            .collect())
    }

    async fn acknowledge(&self, message_ids: &[MessageId]) -> Result<(), TokenLedgerError> {
        self.relay
            .messages
            .write()
            .retain(|m| m.recipient != self.identity || !message_ids.contains(&m.id));
        Ok(())
    }
}
