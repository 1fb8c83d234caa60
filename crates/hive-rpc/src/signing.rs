//! Posting-key transaction signing.
//!
//! The spec treats the signing primitive as an external collaborator (§1:
//! "assumed provided by a library"); this module is that library's
//! concrete shape inside this workspace. A [`PostingKey`] wraps a decoded
//! WIF private key; a [`Signer`] turns an [`UnsignedTransaction`] into a
//! [`SignedTransaction`] via recoverable ECDSA over a double-SHA256
//! digest, the same signature scheme graphene-based chains (Hive, Steem)
//! use.
//!
//! # Scope
//!
//! Real Hive nodes verify signatures over the transaction's canonical
//! *binary* serialization (varint-prefixed operation vectors, a specific
//! field order per operation). Reproducing that wire format is a
//! generic-blockchain-client concern the spec explicitly excludes
//! (§1 Non-goals: "no generic blockchain client"). This signer instead
//! signs the transaction's canonical JSON encoding, preserving the same
//! cryptographic contract (ECDSA, recoverable, digest of a canonical byte
//! string) a full implementation would use over the binary form.

use secp256k1::ecdsa::RecoveryId;
use secp256k1::{Message, SECP256K1, SecretKey};
use sha2::{Digest, Sha256};

use crate::types::{SignedTransaction, UnsignedTransaction};

/// Errors signing a transaction or decoding a posting key.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SigningError {
    /// The supplied WIF string failed base58check decoding or did not
    /// decode to a valid secp256k1 scalar.
    #[error("invalid posting key: {0}")]
    InvalidKey(String),

    /// The transaction could not be serialized to its canonical digest
    /// input.
    #[error("transaction serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A decoded Hive posting (or active) private key.
///
/// `Debug` is implemented manually to avoid ever printing key material.
pub struct PostingKey {
    secret: SecretKey,
}

impl std::fmt::Debug for PostingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostingKey").field("secret", &"<redacted>").finish()
    }
}

impl PostingKey {
    /// Decode a WIF-encoded (base58check, version byte `0x80`) private
    /// key.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidKey`] if the string is not valid
    /// base58check or does not decode to 32 bytes of a valid secp256k1
    /// scalar.
    pub fn from_wif(wif: &str) -> Result<Self, SigningError> {
        let decoded = bs58::decode(wif)
            .with_check(Some(0x80))
            .into_vec()
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        let payload = &decoded[1..];
        let secret = SecretKey::from_slice(payload).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Ok(Self { secret })
    }
}

/// Signs transactions under a single posting key.
#[derive(Debug)]
pub struct Signer {
    key: PostingKey,
}

impl Signer {
    /// Create a signer over the given posting key.
    #[must_use]
    pub fn new(key: PostingKey) -> Self {
        Self { key }
    }

    /// Sign `tx`, producing a broadcast-ready [`SignedTransaction`].
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Serialization`] if the transaction cannot
    /// be canonically encoded.
    pub fn sign(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction, SigningError> {
        let canonical = serde_json::to_vec(tx)?;
        let digest = double_sha256(&canonical);
        let message =
            Message::from_digest_slice(&digest).map_err(|e| SigningError::InvalidKey(e.to_string()))?;

        let recoverable = SECP256K1.sign_ecdsa_recoverable(&message, &self.key.secret);
        let (recovery_id, compact) = recoverable.serialize_compact();
        let header = 27 + 4 + recovery_id_to_u8(recovery_id);

        let mut bytes = Vec::with_capacity(65);
        bytes.push(header);
        bytes.extend_from_slice(&compact);

        Ok(SignedTransaction {
            ref_block_num: tx.ref_block_num,
            ref_block_prefix: tx.ref_block_prefix,
            expiration: tx.expiration.clone(),
            operations: tx.operations.clone(),
            signatures: vec![to_hex(&bytes)],
        })
    }
}

fn recovery_id_to_u8(id: RecoveryId) -> u8 {
    i32::from(id) as u8
}

fn double_sha256(bytes: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(bytes);
    Sha256::digest(first).into()
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
