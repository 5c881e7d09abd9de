//! Plain ed25519 (RFC 8032) over raw message bytes.
//!
//! Wallets sign auth statements this way and the settlement site checks
//! withdrawal authorizations this way, so no namespace or prefix is ever added.

use commonware_cryptography::ed25519::PublicKey;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use fairroll_types::{Identity, IdentityError, PUBLIC_KEY_LEN};

/// Length of an ed25519 signature in bytes.
pub const SIGNATURE_LEN: usize = Signature::BYTE_SIZE;

pub fn sign(key: &SigningKey, message: &[u8]) -> [u8; SIGNATURE_LEN] {
    key.sign(message).to_bytes()
}

/// Check `signature` over `message`. Malformed keys or signatures are simply invalid.
pub fn verify(public: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(bytes) = <[u8; PUBLIC_KEY_LEN]>::try_from(public.as_ref()) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&bytes) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

/// Identity owning `key`.
pub fn identity(key: &SigningKey) -> Result<Identity, IdentityError> {
    Identity::from_bytes(key.verifying_key().as_bytes())
}
