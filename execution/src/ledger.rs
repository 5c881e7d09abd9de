use fairroll_types::{
    Account, BetRecord, Deposit, DepositConfirmation, Identity, Page, Withdrawal,
};
use std::sync::Arc;

use crate::{fairness::new_secret_seed, Result, Store, ValidationError};

/// Balance ledger over an injected store handle.
///
/// All mutation goes through compare-and-swap or the store's compound
/// operations; the ledger itself never retries.
pub struct Ledger<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> Ledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Fetch the account, creating it with a fresh seed and zero balance if absent.
    pub async fn get(&self, identity: &Identity) -> Result<Account> {
        Ok(self
            .store
            .get_or_create_account(identity, new_secret_seed())
            .await?)
    }

    pub async fn credit(&self, identity: &Identity, amount: u64) -> Result<Account> {
        Ok(self.store.credit_account(identity, amount).await?)
    }

    /// Replace `expected` with `desired` if the stored row is unchanged.
    pub async fn compare_and_swap(&self, expected: &Account, desired: &Account) -> Result<()> {
        if expected.identity != desired.identity {
            return Err(ValidationError::IdentityMismatch.into());
        }
        Ok(self
            .store
            .compare_and_swap_account(expected, desired)
            .await?)
    }

    pub async fn debit_and_record_withdrawal(
        &self,
        expected: &Account,
        desired: &Account,
        withdrawal: &Withdrawal,
    ) -> Result<()> {
        if expected.identity != desired.identity || expected.identity != withdrawal.identity {
            return Err(ValidationError::IdentityMismatch.into());
        }
        Ok(self
            .store
            .debit_and_record_withdrawal(expected, desired, withdrawal)
            .await?)
    }

    /// Returns `false` if the deposit had already been completed.
    pub async fn complete_deposit_and_credit(
        &self,
        deposit: &Deposit,
        confirmation: &DepositConfirmation,
        completed_at: u64,
    ) -> Result<bool> {
        Ok(self
            .store
            .complete_deposit_and_credit(deposit, confirmation, completed_at)
            .await?)
    }

    pub async fn record_bet(&self, bet: &BetRecord) -> Result<u64> {
        Ok(self.store.record_bet(bet).await?)
    }

    pub async fn list_bets(&self, identity: &Identity, page: Page) -> Result<Vec<BetRecord>> {
        Ok(self.store.list_bets(identity, page).await?)
    }
}
