//! Deposit and withdrawal reconciliation against the settlement oracle.
//!
//! ## Deposits
//! `create_deposit` persists a Pending record and hands back the URL the user
//! pays through. `deposit_status` asks the oracle about Pending deposits and,
//! once confirmed, completes the record and credits the balance exactly once.
//!
//! ## Withdrawals
//! `create_withdrawal` debits the balance and records a withdrawal carrying the
//! authority's signature over `game || user || id` in one store operation.

use commonware_cryptography::ed25519::PublicKey;
use commonware_utils::{from_hex, hex};
use ed25519_dalek::SigningKey;
use fairroll_types::{
    Account, Deposit, Identity, Page, SettlementId, Withdrawal, SETTLEMENT_ID_LEN,
};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::{now_unix, signing, AuthError, Error, Ledger, Result, SettlementOracle, Store, ValidationError};

/// Attempts made by `create_withdrawal` when the account changes underneath it.
pub const DEFAULT_WITHDRAW_ATTEMPTS: usize = 3;

/// Bytes signed by the withdrawal authority: `game || user || id`.
pub fn withdrawal_authorization_payload(
    game: &PublicKey,
    user: &PublicKey,
    id: &SettlementId,
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(32 + 32 + SETTLEMENT_ID_LEN);
    payload.extend_from_slice(game.as_ref());
    payload.extend_from_slice(user.as_ref());
    payload.extend_from_slice(id.as_bytes());
    payload
}

pub fn verify_withdrawal_authorization(
    authority: &PublicKey,
    game: &PublicKey,
    user: &PublicKey,
    id: &SettlementId,
    signature: &str,
) -> bool {
    let Some(raw) = from_hex(signature) else {
        return false;
    };
    signing::verify(
        authority,
        &withdrawal_authorization_payload(game, user, id),
        &raw,
    )
}

fn site_url(site: &Url, endpoint: &str, query: &[(&str, &str)]) -> String {
    let mut url = site.clone();
    let path = format!("{}/{endpoint}", site.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url.query_pairs_mut().extend_pairs(query);
    url.to_string()
}

pub struct SettlementBridge<S: Store, O: SettlementOracle> {
    ledger: Ledger<S>,
    oracle: Arc<O>,
    game: PublicKey,
    authority: SigningKey,
    site: Url,
    withdraw_attempts: usize,
}

impl<S: Store, O: SettlementOracle> SettlementBridge<S, O> {
    pub fn new(
        ledger: Ledger<S>,
        oracle: Arc<O>,
        game: PublicKey,
        authority: SigningKey,
        site: Url,
    ) -> Self {
        Self {
            ledger,
            oracle,
            game,
            authority,
            site,
            withdraw_attempts: DEFAULT_WITHDRAW_ATTEMPTS,
        }
    }

    pub fn with_withdraw_attempts(mut self, attempts: usize) -> Self {
        self.withdraw_attempts = attempts.max(1);
        self
    }

    fn game_b58(&self) -> String {
        Identity::from_public_key(self.game.clone()).to_base58()
    }

    fn new_settlement_id(amount: u64) -> Result<SettlementId> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        SettlementId::generate(amount).map_err(|_| ValidationError::AmountTooLarge(amount).into())
    }

    pub async fn create_deposit(&self, identity: &Identity, amount: u64) -> Result<Deposit> {
        let id = Self::new_settlement_id(amount)?;
        self.ledger.get(identity).await?;

        let url = site_url(
            &self.site,
            "deposit",
            &[("game", self.game_b58().as_str()), ("id", id.to_hex().as_str())],
        );
        let deposit = Deposit::pending(id, identity.clone(), url, amount, now_unix());
        self.ledger.store().create_deposit(&deposit).await?;
        info!(identity = %identity, deposit = %id, amount, "created deposit");
        Ok(deposit)
    }

    pub async fn create_withdrawal(&self, identity: &Identity, amount: u64) -> Result<Withdrawal> {
        let id = Self::new_settlement_id(amount)?;
        let signature = hex(&signing::sign(
            &self.authority,
            &withdrawal_authorization_payload(&self.game, identity.public_key(), &id),
        ));
        let url = site_url(
            &self.site,
            "withdraw",
            &[
                ("game", self.game_b58().as_str()),
                ("id", id.to_hex().as_str()),
                ("signature", signature.as_str()),
                ("user", identity.to_base58().as_str()),
            ],
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            let account = self.ledger.get(identity).await?;
            if amount > account.balance {
                return Err(ValidationError::InsufficientBalance {
                    balance: account.balance,
                    requested: amount,
                }
                .into());
            }
            let desired = Account {
                balance: account.balance - amount,
                ..account.clone()
            };
            let withdrawal = Withdrawal {
                id,
                identity: identity.clone(),
                url: url.clone(),
                amount,
                signature: signature.clone(),
                created_at: now_unix(),
            };
            match self
                .ledger
                .debit_and_record_withdrawal(&account, &desired, &withdrawal)
                .await
            {
                Ok(()) => {
                    info!(identity = %identity, withdrawal = %id, amount, "created withdrawal");
                    return Ok(withdrawal);
                }
                Err(Error::Conflict) if attempt < self.withdraw_attempts => {
                    debug!(identity = %identity, attempt, "withdrawal raced another update, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Reconcile a deposit with the oracle and return its current record.
    pub async fn deposit_status(&self, identity: &Identity, id: &SettlementId) -> Result<Deposit> {
        let deposit = self.load_deposit(id).await?;
        if &deposit.identity != identity {
            return Err(AuthError::NotOwner.into());
        }
        if deposit.is_completed() {
            return Ok(deposit);
        }

        let Some(confirmation) = self.oracle.deposit_status(&self.game, id).await? else {
            return Ok(deposit);
        };
        let credited = self
            .ledger
            .complete_deposit_and_credit(&deposit, &confirmation, confirmation.timestamp)
            .await?;
        if credited {
            info!(
                identity = %identity,
                deposit = %id,
                amount = deposit.amount,
                oracle_timestamp = confirmation.timestamp,
                "completed deposit"
            );
        } else {
            debug!(deposit = %id, "deposit already completed by a concurrent request");
        }
        self.load_deposit(id).await
    }

    async fn load_deposit(&self, id: &SettlementId) -> Result<Deposit> {
        self.ledger
            .store()
            .get_deposit(id)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "deposit",
                id: id.to_hex(),
            })
    }

    pub async fn withdrawal(&self, identity: &Identity, id: &SettlementId) -> Result<Withdrawal> {
        let withdrawal = self
            .ledger
            .store()
            .get_withdrawal(id)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "withdrawal",
                id: id.to_hex(),
            })?;
        if &withdrawal.identity != identity {
            return Err(AuthError::NotOwner.into());
        }
        Ok(withdrawal)
    }

    pub async fn list_deposits(&self, identity: &Identity, page: Page) -> Result<Vec<Deposit>> {
        Ok(self.ledger.store().list_deposits(identity, page).await?)
    }

    pub async fn list_withdrawals(&self, identity: &Identity, page: Page) -> Result<Vec<Withdrawal>> {
        Ok(self.ledger.store().list_withdrawals(identity, page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mocks::{create_account_keypair, create_identity, MockOracle},
        Fault, Memory, OracleError,
    };
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};
    use fairroll_types::{DepositConfirmation, DepositStatus, RAW_PER_CENT};

    struct Harness {
        store: Arc<Memory>,
        oracle: Arc<MockOracle>,
        bridge: SettlementBridge<Memory, MockOracle>,
        game: PublicKey,
        authority: PublicKey,
    }

    fn harness() -> Harness {
        let store = Arc::new(Memory::default());
        let oracle = Arc::new(MockOracle::default());
        let (_, game) = create_account_keypair(100);
        let (authority, authority_public) = create_account_keypair(101);
        let bridge = SettlementBridge::new(
            Ledger::new(store.clone()),
            oracle.clone(),
            game.clone(),
            authority,
            Url::parse("http://127.0.0.1:3000").unwrap(),
        );
        Harness {
            store,
            oracle,
            bridge,
            game,
            authority: authority_public,
        }
    }

    fn confirmation() -> DepositConfirmation {
        DepositConfirmation {
            signature: "5xTx".to_string(),
            timestamp: 42,
        }
    }

    #[tokio::test]
    async fn test_create_deposit_builds_url_and_embeds_amount() {
        let h = harness();
        let identity = create_identity(1);
        let deposit = h.bridge.create_deposit(&identity, 1_234).await.unwrap();

        assert_eq!(deposit.status, DepositStatus::Pending);
        assert_eq!(deposit.id.raw_amount(), 1_234 * RAW_PER_CENT);
        let game = Identity::from_public_key(h.game.clone()).to_base58();
        assert_eq!(
            deposit.url,
            format!(
                "http://127.0.0.1:3000/deposit?game={game}&id={}",
                deposit.id.to_hex()
            )
        );
        // Account exists after the first deposit.
        assert_eq!(h.store.account(&identity).unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_zero_amounts_rejected() {
        let h = harness();
        let identity = create_identity(1);
        assert!(matches!(
            h.bridge.create_deposit(&identity, 0).await,
            Err(Error::Validation(ValidationError::ZeroAmount))
        ));
        assert!(matches!(
            h.bridge.create_withdrawal(&identity, 0).await,
            Err(Error::Validation(ValidationError::ZeroAmount))
        ));
        assert!(matches!(
            h.bridge.create_deposit(&identity, u64::MAX).await,
            Err(Error::Validation(ValidationError::AmountTooLarge(_)))
        ));
    }

    #[tokio::test]
    async fn test_deposit_completes_once() {
        let h = harness();
        let identity = create_identity(1);
        let deposit = h.bridge.create_deposit(&identity, 500).await.unwrap();

        let pending = h.bridge.deposit_status(&identity, &deposit.id).await.unwrap();
        assert_eq!(pending.status, DepositStatus::Pending);
        assert_eq!(h.store.account(&identity).unwrap().balance, 0);

        h.oracle.confirm(deposit.id, confirmation());
        let completed = h.bridge.deposit_status(&identity, &deposit.id).await.unwrap();
        assert_eq!(completed.status, DepositStatus::Completed);
        assert_eq!(completed.signature.as_deref(), Some("5xTx"));
        assert_eq!(completed.completed_at, Some(confirmation().timestamp));
        assert_eq!(h.store.account(&identity).unwrap().balance, 500);

        // Completed deposits are answered locally.
        let queries = h.oracle.queries();
        let again = h.bridge.deposit_status(&identity, &deposit.id).await.unwrap();
        assert_eq!(again, completed);
        assert_eq!(h.oracle.queries(), queries);
        assert_eq!(h.store.account(&identity).unwrap().balance, 500);
    }

    #[tokio::test]
    async fn test_concurrent_deposit_status_credits_once() {
        let h = harness();
        let identity = create_identity(1);
        let deposit = h.bridge.create_deposit(&identity, 700).await.unwrap();
        h.oracle.confirm(deposit.id, confirmation());

        let (a, b) = futures::join!(
            h.bridge.deposit_status(&identity, &deposit.id),
            h.bridge.deposit_status(&identity, &deposit.id),
        );
        assert!(a.unwrap().is_completed());
        assert!(b.unwrap().is_completed());
        assert_eq!(h.store.account(&identity).unwrap().balance, 700);
    }

    #[tokio::test]
    async fn test_deposit_status_checks_owner_and_existence() {
        let h = harness();
        let owner = create_identity(1);
        let other = create_identity(2);
        let deposit = h.bridge.create_deposit(&owner, 10).await.unwrap();
        assert!(matches!(
            h.bridge.deposit_status(&other, &deposit.id).await,
            Err(Error::Auth(AuthError::NotOwner))
        ));
        let missing = SettlementId::generate(10).unwrap();
        assert!(matches!(
            h.bridge.deposit_status(&owner, &missing).await,
            Err(Error::NotFound { kind: "deposit", .. })
        ));
    }

    #[tokio::test]
    async fn test_oracle_failure_leaves_deposit_pending() {
        let h = harness();
        let identity = create_identity(1);
        let deposit = h.bridge.create_deposit(&identity, 10).await.unwrap();
        h.oracle.fail_with(OracleError::Unreachable("connection refused".into()));
        assert!(matches!(
            h.bridge.deposit_status(&identity, &deposit.id).await,
            Err(Error::ExternalService(OracleError::Unreachable(_)))
        ));
        let stored = h.store.get_deposit(&deposit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Pending);
    }

    #[tokio::test]
    async fn test_credit_failure_reverts_completion() {
        let h = harness();
        let identity = create_identity(1);
        let deposit = h.bridge.create_deposit(&identity, 10).await.unwrap();
        h.oracle.confirm(deposit.id, confirmation());
        h.store.inject(Fault::CreditAccount);
        assert!(matches!(
            h.bridge.deposit_status(&identity, &deposit.id).await,
            Err(Error::Persistence(_))
        ));
        let retried = h.bridge.deposit_status(&identity, &deposit.id).await.unwrap();
        assert!(retried.is_completed());
        assert_eq!(h.store.account(&identity).unwrap().balance, 10);
    }

    #[tokio::test]
    async fn test_failed_compensation_leaves_deposit_completed_uncredited() {
        let h = harness();
        let identity = create_identity(1);
        let deposit = h.bridge.create_deposit(&identity, 10).await.unwrap();
        h.oracle.confirm(deposit.id, confirmation());
        h.store.inject(Fault::CreditAccount);
        h.store.inject(Fault::RevertDeposit);

        assert!(matches!(
            h.bridge.deposit_status(&identity, &deposit.id).await,
            Err(Error::Persistence(_))
        ));
        assert_eq!(h.store.account(&identity).unwrap().balance, 0);
        let stored = h.store.get_deposit(&deposit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Completed);

        // Completed records are answered locally, so the lost credit is not retried.
        let again = h.bridge.deposit_status(&identity, &deposit.id).await.unwrap();
        assert!(again.is_completed());
        assert_eq!(h.store.account(&identity).unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_withdrawal_debits_and_signs() {
        let h = harness();
        let identity = create_identity(1);
        h.bridge.create_deposit(&identity, 1).await.unwrap();
        h.store.set_balance(&identity, 1_000);

        let withdrawal = h.bridge.create_withdrawal(&identity, 600).await.unwrap();
        assert_eq!(h.store.account(&identity).unwrap().balance, 400);
        assert_eq!(withdrawal.id.amount_cents(), 600);
        assert!(verify_withdrawal_authorization(
            &h.authority,
            &h.game,
            identity.public_key(),
            &withdrawal.id,
            &withdrawal.signature,
        ));
        assert!(!verify_withdrawal_authorization(
            &h.authority,
            &h.game,
            create_identity(2).public_key(),
            &withdrawal.id,
            &withdrawal.signature,
        ));

        // The settlement site checks a plain ed25519 signature over game || user || id.
        let mut payload = h.game.as_ref().to_vec();
        payload.extend_from_slice(identity.as_bytes());
        payload.extend_from_slice(withdrawal.id.as_bytes());
        assert_eq!(payload.len(), 96);
        let site_key = VerifyingKey::from_bytes(h.authority.as_ref().try_into().unwrap()).unwrap();
        let raw = from_hex(&withdrawal.signature).unwrap();
        assert!(site_key
            .verify(&payload, &Signature::from_slice(&raw).unwrap())
            .is_ok());

        let game = Identity::from_public_key(h.game.clone()).to_base58();
        assert_eq!(
            withdrawal.url,
            format!(
                "http://127.0.0.1:3000/withdraw?game={game}&id={}&signature={}&user={}",
                withdrawal.id.to_hex(),
                withdrawal.signature,
                identity.to_base58()
            )
        );
        assert_eq!(
            h.bridge.withdrawal(&identity, &withdrawal.id).await.unwrap(),
            withdrawal
        );
        assert!(matches!(
            h.bridge.withdrawal(&create_identity(2), &withdrawal.id).await,
            Err(Error::Auth(AuthError::NotOwner))
        ));
    }

    #[tokio::test]
    async fn test_withdrawal_requires_balance() {
        let h = harness();
        let identity = create_identity(1);
        assert!(matches!(
            h.bridge.create_withdrawal(&identity, 1).await,
            Err(Error::Validation(ValidationError::InsufficientBalance {
                balance: 0,
                requested: 1
            }))
        ));
        assert!(h
            .bridge
            .list_withdrawals(&identity, Page::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_withdrawal_insert_failure_refunds() {
        let h = harness();
        let identity = create_identity(1);
        h.bridge.create_deposit(&identity, 1).await.unwrap();
        h.store.set_balance(&identity, 300);
        h.store.inject(Fault::CreateWithdrawal);
        assert!(matches!(
            h.bridge.create_withdrawal(&identity, 100).await,
            Err(Error::Persistence(_))
        ));
        assert_eq!(h.store.account(&identity).unwrap().balance, 300);
    }

    #[tokio::test]
    async fn test_concurrent_withdrawals_never_overdraw() {
        let h = harness();
        let identity = create_identity(1);
        h.bridge.create_deposit(&identity, 1).await.unwrap();
        h.store.set_balance(&identity, 1_000);

        let (a, b, c) = futures::join!(
            h.bridge.create_withdrawal(&identity, 400),
            h.bridge.create_withdrawal(&identity, 400),
            h.bridge.create_withdrawal(&identity, 400),
        );
        let succeeded = [a, b, c].into_iter().filter(|r| r.is_ok()).count() as u64;
        assert_eq!(succeeded, 2);
        assert_eq!(h.store.account(&identity).unwrap().balance, 200);
        let listed = h
            .bridge
            .list_withdrawals(&identity, Page::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
    }
}
