use commonware_codec::DecodeExt;
use commonware_cryptography::ed25519::PublicKey;
use commonware_utils::{from_hex, hex};
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error as ThisError;

use crate::SECRET_SEED_LEN;

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid base58 key: {0}")]
    InvalidBase58(String),
    #[error("invalid key length (got={got}, expected=32)")]
    InvalidLength { got: usize },
    #[error("bytes are not a valid ed25519 public key")]
    InvalidKey,
}

/// An authenticated caller: the caller's ed25519 public key.
///
/// Rendered as base58 everywhere it leaves the process.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(PublicKey);

impl Identity {
    pub fn from_public_key(key: PublicKey) -> Self {
        Self(key)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.as_bytes()).into_string()
    }

    pub fn from_base58(encoded: &str) -> Result<Self, IdentityError> {
        decode_public_key(encoded).map(Self)
    }

    /// Wrap a raw 32-byte ed25519 public key, as produced by any standard signer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        public_key_from_bytes(bytes).map(Self)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Length of an encoded ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Decode a base58 key token into its raw 32 bytes without checking the curve point.
pub fn decode_key_bytes(encoded: &str) -> Result<[u8; PUBLIC_KEY_LEN], IdentityError> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|err| IdentityError::InvalidBase58(err.to_string()))?;
    let got = bytes.len();
    bytes
        .try_into()
        .map_err(|_| IdentityError::InvalidLength { got })
}

/// Decode a base58 string into an ed25519 public key of exactly 32 bytes.
pub fn decode_public_key(encoded: &str) -> Result<PublicKey, IdentityError> {
    public_key_from_bytes(&decode_key_bytes(encoded)?)
}

fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey, IdentityError> {
    if bytes.len() != PUBLIC_KEY_LEN {
        return Err(IdentityError::InvalidLength { got: bytes.len() });
    }
    PublicKey::decode(bytes).map_err(|_| IdentityError::InvalidKey)
}

/// Per-account secret mixed into every roll. Rotated after each resolved bet.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecretSeed(pub [u8; SECRET_SEED_LEN]);

impl SecretSeed {
    pub fn as_bytes(&self) -> &[u8; SECRET_SEED_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex(&self.0)
    }

    pub fn from_hex(encoded: &str) -> Option<Self> {
        let bytes = from_hex(encoded)?;
        let seed: [u8; SECRET_SEED_LEN] = bytes.try_into().ok()?;
        Some(Self(seed))
    }
}

// Unrevealed seeds must not end up in logs.
impl fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretSeed(..)")
    }
}

impl Serialize for SecretSeed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Balance and commitment state for one identity.
///
/// Not `Serialize`: the seed stays server-side until it has been used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub identity: Identity,
    pub secret_seed: SecretSeed,
    /// Balance in cents.
    pub balance: u64,
}

impl Account {
    pub fn new(identity: Identity, secret_seed: SecretSeed) -> Self {
        Self {
            identity,
            secret_seed,
            balance: 0,
        }
    }

    /// Returns true if `other` describes the same stored row state.
    pub fn same_snapshot(&self, other: &Account) -> bool {
        self.identity == other.identity
            && self.secret_seed == other.secret_seed
            && self.balance == other.balance
    }
}
