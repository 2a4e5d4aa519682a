//! Push-Drop Token Codec Adapter
//!
//! Locking script layout:
//!
//! ```text
//! <33-byte owning key> OP_CHECKSIG <points as decimal UTF-8> OP_DROP
//! ```
//!
//! The unlocking proof is a single push of `DER signature || sighash flag`.
//! The signed digest commits to the spent output only
//! (`SIGHASH_NONE | ANYONECANPAY | FORKID`), so a proof can be produced
//! before the spending transaction exists.

use async_trait::async_trait;
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::domain::{
    CompressedKey, KeyContext, LockingScript, Outpoint, Token, TokenLedgerError, UnlockingScript,
};
use crate::ports::outbound::{DecodedToken, KeyDeriver, TokenCodec};

const OP_0: u8 = 0x00;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const OP_1NEGATE: u8 = 0x4f;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;
const OP_DROP: u8 = 0x75;
const OP_CHECKSIG: u8 = 0xac;

/// `SIGHASH_NONE | SIGHASH_ANYONECANPAY | SIGHASH_FORKID`
pub const SIGHASH_FLAGS: u8 = 0x02 | 0x80 | 0x40;

/// Token codec backed by a key derivation service.
pub struct PushDropCodec {
    keys: Arc<dyn KeyDeriver>,
}

impl PushDropCodec {
    /// Create a codec that derives keys through `keys`.
    pub fn new(keys: Arc<dyn KeyDeriver>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl TokenCodec for PushDropCodec {
    async fn lock(
        &self,
        points: u64,
        context: &KeyContext,
    ) -> Result<LockingScript, TokenLedgerError> {
        let owning_key = self.keys.derive_public_key(context, false).await?;
        Ok(encode_locking_script(points, &owning_key))
    }

    fn decode(&self, script: &LockingScript) -> Result<DecodedToken, TokenLedgerError> {
        decode_locking_script(script)
    }

    async fn unlock(
        &self,
        token: &Token,
        context: &KeyContext,
    ) -> Result<UnlockingScript, TokenLedgerError> {
        let digest = signature_digest(&token.outpoint, &token.locking_script, token.satoshis);
        let mut signature = self.keys.sign(context, &digest).await?;
        signature.push(SIGHASH_FLAGS);

        let mut script = Vec::with_capacity(signature.len() + 1);
        push_data(&mut script, &signature);
        Ok(UnlockingScript::new(script))
    }
}

/// Build the locking script for `points` owned by `owning_key`.
pub fn encode_locking_script(points: u64, owning_key: &CompressedKey) -> LockingScript {
    let field = points.to_string();
    let mut script = Vec::with_capacity(33 + field.len() + 4);
    push_data(&mut script, owning_key.as_bytes());
    script.push(OP_CHECKSIG);
    push_data(&mut script, field.as_bytes());
    script.push(OP_DROP);
    LockingScript::new(script)
}

/// Decode a token locking script.
pub fn decode_locking_script(script: &LockingScript) -> Result<DecodedToken, TokenLedgerError> {
    let mut reader = ScriptReader::new(script.as_bytes());

    let key = reader.read_push()?;
    let owning_key = CompressedKey::from_slice(&key)
        .map_err(|e| TokenLedgerError::MalformedScript(format!("owning key: {e}")))?;
    reader.expect_opcode(OP_CHECKSIG)?;
    let field = reader.read_push()?;
    reader.expect_opcode(OP_DROP)?;
    if !reader.is_empty() {
        return Err(TokenLedgerError::MalformedScript(
            "trailing bytes after token fields".to_string(),
        ));
    }

    Ok(DecodedToken {
        points: parse_points(&field)?,
        owning_key,
    })
}

fn parse_points(field: &[u8]) -> Result<u64, TokenLedgerError> {
    let text = std::str::from_utf8(field)
        .map_err(|_| TokenLedgerError::MalformedScript("points field is not UTF-8".to_string()))?;
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TokenLedgerError::MalformedScript(format!(
            "points field is not a decimal number: {text:?}"
        )));
    }
    text.parse()
        .map_err(|_| TokenLedgerError::MalformedScript(format!("points out of range: {text}")))
}

/// Digest signed by an unlocking proof for one output.
pub fn signature_digest(outpoint: &Outpoint, script: &LockingScript, satoshis: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(outpoint.txid.as_bytes());
    hasher.update(outpoint.vout.to_le_bytes());
    hasher.update((script.as_bytes().len() as u64).to_le_bytes());
    hasher.update(script.as_bytes());
    hasher.update(satoshis.to_le_bytes());
    hasher.finalize().into()
}

/// Check that `unlocking` satisfies `locking` for the given output.
pub fn verify_unlock(
    outpoint: &Outpoint,
    locking: &LockingScript,
    satoshis: u64,
    unlocking: &UnlockingScript,
) -> Result<(), TokenLedgerError> {
    let decoded = decode_locking_script(locking)?;

    let mut reader = ScriptReader::new(unlocking.as_bytes());
    let mut sig = reader
        .read_push()
        .map_err(|_| TokenLedgerError::Construction(format!("{outpoint}: unreadable proof")))?;
    if !reader.is_empty() {
        return Err(TokenLedgerError::Construction(format!(
            "{outpoint}: proof must be a single push"
        )));
    }
    match sig.pop() {
        Some(SIGHASH_FLAGS) => {}
        other => {
            return Err(TokenLedgerError::Construction(format!(
                "{outpoint}: unexpected sighash flag {other:?}"
            )))
        }
    }

    let signature = Signature::from_der(&sig)
        .map_err(|_| TokenLedgerError::Construction(format!("{outpoint}: bad DER signature")))?;
    let verifying_key = VerifyingKey::from_sec1_bytes(decoded.owning_key.as_bytes())
        .map_err(|_| TokenLedgerError::Construction(format!("{outpoint}: bad owning key")))?;
    let digest = signature_digest(outpoint, locking, satoshis);

    verifying_key
        .verify_prehash(&digest, &signature)
        .map_err(|_| TokenLedgerError::Construction(format!("{outpoint}: signature does not verify")))
}

/// Append a minimal data push.
fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    match data {
        [] => script.push(OP_0),
        [b] if (1..=16).contains(b) => script.push(OP_1 + b - 1),
        [0x81] => script.push(OP_1NEGATE),
        _ if data.len() <= 75 => {
            script.push(data.len() as u8);
            script.extend_from_slice(data);
        }
        _ if data.len() <= 0xff => {
            script.push(OP_PUSHDATA1);
            script.push(data.len() as u8);
            script.extend_from_slice(data);
        }
        _ if data.len() <= 0xffff => {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(data.len() as u16).to_le_bytes());
            script.extend_from_slice(data);
        }
        _ => {
            script.push(OP_PUSHDATA4);
            script.extend_from_slice(&(data.len() as u32).to_le_bytes());
            script.extend_from_slice(data);
        }
    }
}

struct ScriptReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ScriptReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn next_byte(&mut self) -> Result<u8, TokenLedgerError> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| TokenLedgerError::MalformedScript("unexpected end of script".to_string()))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> Result<Vec<u8>, TokenLedgerError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| TokenLedgerError::MalformedScript("push exceeds script".to_string()))?;
        let out = self.bytes[self.pos..end].to_vec();
        self.pos = end;
        Ok(out)
    }

    fn read_push(&mut self) -> Result<Vec<u8>, TokenLedgerError> {
        let op = self.next_byte()?;
        match op {
            OP_0 => Ok(Vec::new()),
            1..=75 => self.take(op as usize),
            OP_PUSHDATA1 => {
                let len = self.next_byte()? as usize;
                self.take(len)
            }
            OP_PUSHDATA2 => {
                let raw = self.take(2)?;
                self.take(u16::from_le_bytes([raw[0], raw[1]]) as usize)
            }
            OP_PUSHDATA4 => {
                let raw = self.take(4)?;
                self.take(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize)
            }
            OP_1NEGATE => Ok(vec![0x81]),
            OP_1..=OP_16 => Ok(vec![op - OP_1 + 1]),
            other => Err(TokenLedgerError::MalformedScript(format!(
                "expected data push, found opcode 0x{other:02x}"
            ))),
        }
    }

    fn expect_opcode(&mut self, expected: u8) -> Result<(), TokenLedgerError> {
        let op = self.next_byte()?;
        if op != expected {
            return Err(TokenLedgerError::MalformedScript(format!(
                "expected opcode 0x{expected:02x}, found 0x{op:02x}"
            )));
        }
        Ok(())
    }
}
