//! Roll-under / roll-over bets against an account's committed seed.

use fairroll_types::{
    Account, BetRecord, Direction, Identity, Page, SecretSeed, MAX_WAGER_CENTS,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    fairness::{
        apply_delta, commitment, new_secret_seed, roll, settle, validate_client_seed,
        validate_threshold,
    },
    now_unix, Ledger, Result, Store, ValidationError,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BetRequest {
    /// Wager in cents.
    pub wager: u64,
    pub direction: Direction,
    pub threshold: u16,
    pub client_seed: String,
}

/// Public view of an account: the seed is only ever shown as its commitment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountView {
    pub identity: Identity,
    pub commitment: [u8; 32],
    pub balance: u64,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            identity: account.identity.clone(),
            commitment: commitment(&account.secret_seed),
            balance: account.balance,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BetOutcome {
    pub won: bool,
    /// Signed balance change in cents.
    pub delta: i64,
    pub outcome: u16,
    /// The seed this bet consumed (now revealed).
    pub secret_seed: SecretSeed,
    /// Commitment to the seed that will resolve the next bet.
    pub next_commitment: [u8; 32],
    pub balance: u64,
}

pub struct DiceTable<S: Store> {
    ledger: Ledger<S>,
}

impl<S: Store> DiceTable<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            ledger: Ledger::new(store),
        }
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub async fn account(&self, identity: &Identity) -> Result<AccountView> {
        let account = self.ledger.get(identity).await?;
        Ok(AccountView::from(&account))
    }

    /// Resolve one bet against the account's current seed and rotate the seed.
    ///
    /// A lost compare-and-swap is returned as `Error::Conflict` without retrying:
    /// the commitment the caller saw has already been consumed.
    pub async fn place_bet(&self, identity: &Identity, request: BetRequest) -> Result<BetOutcome> {
        validate_threshold(request.direction, request.threshold)?;
        validate_client_seed(&request.client_seed)?;
        if request.wager > MAX_WAGER_CENTS {
            return Err(ValidationError::WagerTooLarge {
                max: MAX_WAGER_CENTS,
                got: request.wager,
            }
            .into());
        }

        let account = self.ledger.get(identity).await?;
        if request.wager > account.balance {
            return Err(ValidationError::InsufficientBalance {
                balance: account.balance,
                requested: request.wager,
            }
            .into());
        }

        let outcome = roll(&account.secret_seed, request.client_seed.as_bytes());
        let resolution = settle(request.wager, request.direction, request.threshold, outcome);
        let next_seed = new_secret_seed();
        let desired = Account {
            identity: identity.clone(),
            secret_seed: next_seed,
            balance: apply_delta(account.balance, resolution.delta),
        };
        self.ledger.compare_and_swap(&account, &desired).await?;
        info!(
            identity = %identity,
            wager = request.wager,
            direction = %request.direction,
            threshold = request.threshold,
            outcome,
            won = resolution.won,
            delta = resolution.delta,
            "resolved bet"
        );

        let record = BetRecord {
            id: 0,
            identity: identity.clone(),
            wager: request.wager,
            direction: request.direction,
            threshold: request.threshold,
            outcome,
            won: resolution.won,
            secret_seed: account.secret_seed,
            created_at: now_unix(),
        };
        if let Err(err) = self.ledger.record_bet(&record).await {
            warn!(identity = %identity, error = %err, "failed to record bet");
        }

        Ok(BetOutcome {
            won: resolution.won,
            delta: resolution.delta,
            outcome,
            secret_seed: account.secret_seed,
            next_commitment: commitment(&next_seed),
            balance: desired.balance,
        })
    }

    pub async fn list_bets(&self, identity: &Identity, page: Page) -> Result<Vec<BetRecord>> {
        self.ledger.list_bets(identity, page).await
    }
}
