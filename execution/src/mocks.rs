//! Test helpers: deterministic keys, signed auth messages and a scriptable oracle.

use commonware_cryptography::ed25519::PublicKey;
use commonware_utils::hex;
use ed25519_dalek::SigningKey;
use fairroll_types::{DepositConfirmation, Identity, SettlementId};
use rand::{rngs::StdRng, SeedableRng};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use crate::{auth::auth_message, signing, OracleError, SettlementOracle};

/// Creates an account keypair for Ed25519 signatures used by users
pub fn create_account_keypair(seed: u64) -> (SigningKey, PublicKey) {
    let private = SigningKey::generate(&mut StdRng::seed_from_u64(seed));
    let public = public_key(&private);
    (private, public)
}

pub fn public_key(private: &SigningKey) -> PublicKey {
    signing::identity(private)
        .expect("dalek verifying keys are valid points")
        .public_key()
        .clone()
}

pub fn create_identity(seed: u64) -> Identity {
    Identity::from_public_key(create_account_keypair(seed).1)
}

/// Render and sign an authentication message. Returns `(message, hex signature)`.
pub fn sign_auth_message(
    user: &SigningKey,
    game: &PublicKey,
    domain: &str,
    from: u64,
    to: u64,
) -> (String, String) {
    let message = auth_message(&public_key(user), game, domain, from, to);
    let signature = signing::sign(user, message.as_bytes());
    (message, hex(&signature))
}

#[derive(Default)]
struct OracleInner {
    confirmed: HashMap<SettlementId, DepositConfirmation>,
    failure: Option<OracleError>,
    queries: usize,
}

/// In-memory settlement oracle.
#[derive(Default)]
pub struct MockOracle {
    inner: Mutex<OracleInner>,
}

impl MockOracle {
    pub fn confirm(&self, id: SettlementId, confirmation: DepositConfirmation) {
        self.lock().confirmed.insert(id, confirmation);
    }

    /// Fail the next query with `err`.
    pub fn fail_with(&self, err: OracleError) {
        self.lock().failure = Some(err);
    }

    pub fn queries(&self) -> usize {
        self.lock().queries
    }

    fn lock(&self) -> MutexGuard<'_, OracleInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SettlementOracle for MockOracle {
    async fn deposit_status(
        &self,
        _game: &PublicKey,
        id: &SettlementId,
    ) -> Result<Option<DepositConfirmation>, OracleError> {
        let mut inner = self.lock();
        inner.queries += 1;
        if let Some(err) = inner.failure.take() {
            return Err(err);
        }
        Ok(inner.confirmed.get(id).cloned())
    }
}
