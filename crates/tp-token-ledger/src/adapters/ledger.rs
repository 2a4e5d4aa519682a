//! # In-Memory Ledger Adapter
//!
//! `InMemoryChain` is the shared transaction store every holder in a
//! session sees. `InMemoryLedger` is one holder's wallet over that chain:
//! it builds transactions, tracks owned outputs per basket and remembers
//! which transactions it already recorded.
//!
//! Transactions are `bincode` encoded; the txid is the double SHA-256 of
//! that encoding.

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::adapters::pushdrop::verify_unlock;
use crate::domain::{
    LockingScript, Outpoint, TokenLedgerError, TransactionEnvelope, TransactionRecord, Txid,
    UnlockingScript,
};
use crate::ports::outbound::{
    BuildRequest, HeldOutput, HeldOutputQuery, LedgerGateway, OwnershipRecord,
};

/// Output index marking the wallet's own funding input.
const FUNDING_VOUT: u32 = u32::MAX;

/// Transaction input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInput {
    /// Spent transaction.
    pub prev_txid: [u8; 32],
    /// Spent output index.
    pub vout: u32,
    /// Proof for the spent output.
    pub unlocking_script: Vec<u8>,
}

/// Transaction output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutput {
    /// Nominal value.
    pub satoshis: u64,
    /// Locking script.
    pub script: Vec<u8>,
}

/// Ledger transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Format version.
    pub version: u32,
    /// Inputs in order.
    pub inputs: Vec<RawInput>,
    /// Outputs in order.
    pub outputs: Vec<RawOutput>,
    /// Lock time.
    pub lock_time: u32,
}

impl RawTransaction {
    /// Canonical byte encoding.
    pub fn encode(&self) -> Result<Vec<u8>, TokenLedgerError> {
        bincode::serialize(self).map_err(|e| TokenLedgerError::Construction(e.to_string()))
    }

    /// Decode from canonical bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, TokenLedgerError> {
        bincode::deserialize(bytes)
            .map_err(|e| TokenLedgerError::Construction(format!("raw transaction: {e}")))
    }

    /// Hex of the canonical encoding.
    pub fn to_hex(&self) -> Result<String, TokenLedgerError> {
        Ok(hex::encode(self.encode()?))
    }

    /// Parse from hex.
    pub fn from_hex(raw: &str) -> Result<Self, TokenLedgerError> {
        let bytes = hex::decode(raw)
            .map_err(|e| TokenLedgerError::Construction(format!("raw transaction hex: {e}")))?;
        Self::decode(&bytes)
    }

    /// Double SHA-256 of the encoding.
    pub fn txid(&self) -> Result<Txid, TokenLedgerError> {
        let first = Sha256::digest(self.encode()?);
        Ok(Txid::from_bytes(Sha256::digest(first).into()))
    }

    /// Output at `vout`.
    pub fn output(&self, vout: u32) -> Option<&RawOutput> {
        self.outputs.get(vout as usize)
    }
}

/// Shared transaction store.
#[derive(Default)]
pub struct InMemoryChain {
    transactions: RwLock<HashMap<Txid, RawTransaction>>,
    spent: RwLock<HashSet<Outpoint>>,
}

impl InMemoryChain {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a transaction.
    pub fn transaction(&self, txid: &Txid) -> Option<RawTransaction> {
        self.transactions.read().get(txid).cloned()
    }

    /// Whether an output has been spent.
    pub fn is_spent(&self, outpoint: &Outpoint) -> bool {
        self.spent.read().contains(outpoint)
    }

    /// Number of stored transactions.
    pub fn len(&self) -> usize {
        self.transactions.read().len()
    }

    /// True when nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.transactions.read().is_empty()
    }

    /// Store a transaction, spending its inputs. Fails without changes if
    /// any input is already spent.
    fn commit(&self, txid: Txid, tx: RawTransaction) -> Result<(), TokenLedgerError> {
        let mut spent = self.spent.write();
        let consumed: Vec<Outpoint> = tx
            .inputs
            .iter()
            .filter(|input| input.vout != FUNDING_VOUT)
            .map(|input| Outpoint::new(Txid::from_bytes(input.prev_txid), input.vout))
            .collect();
        if let Some(double) = consumed.iter().find(|op| spent.contains(op)) {
            return Err(TokenLedgerError::Construction(format!(
                "{double} is already spent"
            )));
        }
        spent.extend(consumed);
        self.transactions.write().insert(txid, tx);
        Ok(())
    }

    /// Store a transaction received from elsewhere if it is not known yet.
    fn import(&self, txid: Txid, tx: RawTransaction) -> Result<(), TokenLedgerError> {
        if self.transactions.read().contains_key(&txid) {
            return Ok(());
        }
        self.commit(txid, tx)
    }
}

#[derive(Clone, Debug)]
struct StoredOutput {
    basket: String,
    satoshis: u64,
    locking_script: LockingScript,
    envelope: TransactionEnvelope,
    custom_instructions: Option<String>,
}

#[derive(Default)]
struct WalletState {
    outputs: BTreeMap<Outpoint, StoredOutput>,
    recorded: HashSet<Txid>,
}

/// One holder's wallet over a shared chain.
pub struct InMemoryLedger {
    chain: Arc<InMemoryChain>,
    wallet: RwLock<WalletState>,
}

impl InMemoryLedger {
    /// Wallet over `chain`.
    pub fn new(chain: Arc<InMemoryChain>) -> Self {
        Self {
            chain,
            wallet: RwLock::new(WalletState::default()),
        }
    }

    /// Underlying chain.
    pub fn chain(&self) -> Arc<InMemoryChain> {
        Arc::clone(&self.chain)
    }

    /// Resolve the transaction an input group spends from.
    fn resolve_source(
        &self,
        txid: &Txid,
        envelope: &TransactionEnvelope,
    ) -> Result<RawTransaction, TokenLedgerError> {
        if let Some(tx) = self.chain.transaction(txid) {
            return Ok(tx);
        }
        let tx = RawTransaction::from_hex(&envelope.raw_tx)?;
        let actual = tx.txid()?;
        if actual != *txid {
            return Err(TokenLedgerError::Construction(format!(
                "envelope for {txid} carries transaction {actual}"
            )));
        }
        Ok(tx)
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn build_transaction(
        &self,
        request: BuildRequest,
    ) -> Result<TransactionRecord, TokenLedgerError> {
        if request.outputs.is_empty() {
            return Err(TokenLedgerError::Construction(
                "transaction has no outputs".to_string(),
            ));
        }

        let mut inputs = Vec::new();
        let mut ancestry = Map::new();
        for (txid, spec) in &request.inputs {
            let source = self.resolve_source(txid, &spec.envelope)?;
            for redeem in &spec.outputs_to_redeem {
                let outpoint = Outpoint::new(*txid, redeem.index);
                let output = source.output(redeem.index).ok_or_else(|| {
                    TokenLedgerError::Construction(format!("{outpoint} does not exist"))
                })?;
                if self.chain.is_spent(&outpoint) {
                    return Err(TokenLedgerError::Construction(format!(
                        "{outpoint} is already spent"
                    )));
                }
                verify_unlock(
                    &outpoint,
                    &LockingScript::new(output.script.clone()),
                    output.satoshis,
                    &redeem.unlocking_script,
                )?;
                inputs.push(RawInput {
                    prev_txid: *txid.as_bytes(),
                    vout: redeem.index,
                    unlocking_script: redeem.unlocking_script.as_bytes().to_vec(),
                });
            }
            ancestry.insert(txid.to_string(), serde_json::to_value(&spec.envelope)?);
        }

        let mut funding = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut funding);
        inputs.push(RawInput {
            prev_txid: funding,
            vout: FUNDING_VOUT,
            unlocking_script: UnlockingScript::default().as_bytes().to_vec(),
        });

        let tx = RawTransaction {
            version: 1,
            inputs,
            outputs: request
                .outputs
                .iter()
                .map(|o| RawOutput {
                    satoshis: o.satoshis,
                    script: o.script.as_bytes().to_vec(),
                })
                .collect(),
            lock_time: 0,
        };
        let txid = tx.txid()?;
        let raw_tx = tx.to_hex()?;
        self.chain.commit(txid, tx)?;

        {
            let mut wallet = self.wallet.write();
            for txid in request.inputs.keys() {
                wallet.outputs.retain(|op, _| op.txid != *txid || !self.chain.is_spent(op));
            }
        }

        info!(
            %txid,
            description = %request.description,
            inputs = request.inputs.len(),
            outputs = request.outputs.len(),
            "Built transaction"
        );

        Ok(TransactionRecord {
            txid,
            envelope: TransactionEnvelope {
                raw_tx,
                inputs: Value::Object(ancestry),
                mapi_responses: Value::Array(Vec::new()),
                proof: Value::Null,
                extra: Map::new(),
            },
        })
    }

    async fn query_held_outputs(
        &self,
        query: &HeldOutputQuery,
    ) -> Result<Vec<HeldOutput>, TokenLedgerError> {
        let wallet = self.wallet.read();
        let held: Vec<HeldOutput> = wallet
            .outputs
            .iter()
            .filter(|(_, stored)| stored.basket == query.basket)
            .filter(|(op, _)| !query.spendable_only || !self.chain.is_spent(op))
            .map(|(op, stored)| HeldOutput {
                outpoint: *op,
                satoshis: stored.satoshis,
                locking_script: stored.locking_script.clone(),
                envelope: stored.envelope.clone(),
                custom_instructions: stored.custom_instructions.clone(),
            })
            .collect();
        debug!(basket = %query.basket, count = held.len(), "Queried held outputs");
        Ok(held)
    }

    async fn record_ownership(&self, record: OwnershipRecord) -> Result<(), TokenLedgerError> {
        let txid = record.transaction.txid;
        if self.wallet.read().recorded.contains(&txid) {
            return Err(TokenLedgerError::DuplicateTransaction(txid));
        }

        let tx = self.resolve_source(&txid, &record.transaction.envelope)?;
        let mut stored = Vec::with_capacity(record.outputs.len());
        for owned in &record.outputs {
            let outpoint = Outpoint::new(txid, owned.vout);
            let output = tx.output(owned.vout).ok_or_else(|| {
                TokenLedgerError::Construction(format!("{outpoint} does not exist"))
            })?;
            if self.chain.is_spent(&outpoint) {
                return Err(TokenLedgerError::Construction(format!(
                    "{outpoint} is already spent"
                )));
            }
            stored.push((
                outpoint,
                StoredOutput {
                    basket: owned.basket.clone(),
                    satoshis: output.satoshis,
                    locking_script: LockingScript::new(output.script.clone()),
                    envelope: record.transaction.envelope.clone(),
                    custom_instructions: owned.custom_instructions.clone(),
                },
            ));
        }
        self.chain.import(txid, tx)?;

        let mut wallet = self.wallet.write();
        if !wallet.recorded.insert(txid) {
            return Err(TokenLedgerError::DuplicateTransaction(txid));
        }
        wallet.outputs.extend(stored);
        debug!(
            %txid,
            sender = %record.sender,
            note = %record.note,
            outputs = record.outputs.len(),
            "Recorded ownership"
        );
        Ok(())
    }
}
