//! Local Key Deriver Adapter
//!
//! Implements `KeyDeriver` with a secp256k1 root key held in process.
//!
//! Child keys are `base + HMAC-SHA256(ECDH(root, counterparty), invoice)·G`.
//! `base` is the holder's own key when deriving for self and the
//! counterparty's key otherwise. Because ECDH is symmetric, the key a sender
//! derives for a recipient equals the key the recipient derives for self
//! when receiving from that sender.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{NonZeroScalar, ProjectivePoint, PublicKey, Scalar, SecretKey, U256};
use sha2::Sha256;
use tracing::debug;

use crate::domain::{CompressedKey, Counterparty, IdentityKey, KeyContext, TokenLedgerError};
use crate::ports::outbound::KeyDeriver;

type HmacSha256 = Hmac<Sha256>;

/// In-process key derivation service.
pub struct LocalKeyDeriver {
    root: SecretKey,
    identity: IdentityKey,
}

impl LocalKeyDeriver {
    /// Create from a root secret key.
    pub fn new(root: SecretKey) -> Result<Self, TokenLedgerError> {
        let identity = compress(&root.public_key())?;
        Ok(Self { root, identity })
    }

    /// Create with a fresh random root key.
    pub fn generate() -> Result<Self, TokenLedgerError> {
        Self::new(SecretKey::random(&mut rand::thread_rng()))
    }

    /// Create from a hex encoded 32-byte root secret.
    pub fn from_hex(secret: &str) -> Result<Self, TokenLedgerError> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| TokenLedgerError::KeyDerivation(format!("root key hex: {e}")))?;
        let root = SecretKey::from_slice(&bytes)
            .map_err(|_| TokenLedgerError::KeyDerivation("invalid root key".to_string()))?;
        Self::new(root)
    }

    /// Identity key without going through the async port.
    pub fn identity(&self) -> IdentityKey {
        self.identity
    }

    fn counterparty_key(&self, counterparty: &Counterparty) -> Result<PublicKey, TokenLedgerError> {
        match counterparty {
            Counterparty::Myself => Ok(self.root.public_key()),
            Counterparty::Other(key) => PublicKey::from_sec1_bytes(key.as_bytes()).map_err(|_| {
                TokenLedgerError::KeyDerivation(format!("counterparty key {key} is not on the curve"))
            }),
        }
    }

    /// HMAC tweak for a context, reduced into the scalar field.
    fn tweak(&self, context: &KeyContext, counterparty: &PublicKey) -> Result<Scalar, TokenLedgerError> {
        let shared = (counterparty.to_projective() * *self.root.to_nonzero_scalar()).to_affine();
        let shared = shared.to_encoded_point(true);

        let mut mac = HmacSha256::new_from_slice(shared.as_bytes())
            .map_err(|e| TokenLedgerError::KeyDerivation(e.to_string()))?;
        mac.update(context.invoice_number().as_bytes());
        let digest = mac.finalize().into_bytes();

        Ok(<Scalar as Reduce<U256>>::reduce_bytes(&digest))
    }

    fn derive_signing_key(&self, context: &KeyContext) -> Result<SigningKey, TokenLedgerError> {
        let counterparty = self.counterparty_key(&context.counterparty)?;
        let tweak = self.tweak(context, &counterparty)?;
        let child = *self.root.to_nonzero_scalar() + tweak;
        let child = Option::<NonZeroScalar>::from(NonZeroScalar::new(child))
            .ok_or_else(|| TokenLedgerError::KeyDerivation("derived zero scalar".to_string()))?;
        Ok(SigningKey::from(child))
    }
}

fn compress(key: &PublicKey) -> Result<CompressedKey, TokenLedgerError> {
    CompressedKey::from_slice(key.to_encoded_point(true).as_bytes())
}

#[async_trait]
impl KeyDeriver for LocalKeyDeriver {
    async fn identity_key(&self) -> Result<IdentityKey, TokenLedgerError> {
        Ok(self.identity)
    }

    async fn derive_public_key(
        &self,
        context: &KeyContext,
        for_self: bool,
    ) -> Result<CompressedKey, TokenLedgerError> {
        let counterparty = self.counterparty_key(&context.counterparty)?;
        let tweak = self.tweak(context, &counterparty)?;
        let base = if for_self {
            self.root.public_key()
        } else {
            counterparty
        };

        let child = base.to_projective() + ProjectivePoint::GENERATOR * tweak;
        let child = PublicKey::from_affine(child.to_affine())
            .map_err(|_| TokenLedgerError::KeyDerivation("derived point at infinity".to_string()))?;

        debug!(
            counterparty = %context.counterparty,
            invoice = %context.invoice_number(),
            for_self,
            "Derived public key"
        );
        compress(&child)
    }

    async fn sign(
        &self,
        context: &KeyContext,
        digest: &[u8; 32],
    ) -> Result<Vec<u8>, TokenLedgerError> {
        let signing_key = self.derive_signing_key(context)?;
        let signature: Signature = signing_key
            .sign_prehash(digest)
            .map_err(|e| TokenLedgerError::KeyDerivation(e.to_string()))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }
}
