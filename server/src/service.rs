use commonware_cryptography::ed25519::PublicKey;
use ed25519_dalek::SigningKey;
use fairroll_execution::{AuthVerifier, DiceTable, Ledger, SettlementBridge, SettlementOracle, Store};
use std::sync::Arc;
use url::Url;

/// Settings for the game core, independent of transport.
#[derive(Debug)]
pub struct ServiceConfig {
    pub game: PublicKey,
    pub authority: SigningKey,
    pub auth_domain: String,
    pub settlement_site_url: Url,
    pub withdraw_attempts: usize,
}

/// The components every request handler needs, sharing one store handle.
pub struct Service<S: Store, O: SettlementOracle> {
    auth: AuthVerifier,
    dice: DiceTable<S>,
    bridge: SettlementBridge<S, O>,
}

impl<S: Store, O: SettlementOracle> Service<S, O> {
    pub fn new(store: Arc<S>, oracle: Arc<O>, config: ServiceConfig) -> Self {
        let auth = AuthVerifier::new(config.game.clone(), config.auth_domain);
        let bridge = SettlementBridge::new(
            Ledger::new(store.clone()),
            oracle,
            config.game,
            config.authority,
            config.settlement_site_url,
        )
        .with_withdraw_attempts(config.withdraw_attempts);
        Self {
            auth,
            dice: DiceTable::new(store),
            bridge,
        }
    }

    pub fn auth(&self) -> &AuthVerifier {
        &self.auth
    }

    pub fn dice(&self) -> &DiceTable<S> {
        &self.dice
    }

    pub fn bridge(&self) -> &SettlementBridge<S, O> {
        &self.bridge
    }
}
