use fairroll_types::{
    Account, BetRecord, Deposit, DepositConfirmation, Identity, Page, SecretSeed, SettlementId,
    Withdrawal,
};
use std::future::Future;
use tracing::error;

use crate::StoreError;

#[cfg(any(test, feature = "mocks"))]
use fairroll_types::DepositStatus;
#[cfg(any(test, feature = "mocks"))]
use std::collections::{HashMap, HashSet};
#[cfg(any(test, feature = "mocks"))]
use std::sync::Mutex;

/// Persistence seam for accounts, bets and settlement records.
///
/// Every method is atomic on its own. Implementations must never hold an
/// in-process lock across an `.await`.
pub trait Store: Send + Sync + 'static {
    /// Insert `(identity, seed, 0)` unless a row exists; return the stored row either way.
    fn get_or_create_account(
        &self,
        identity: &Identity,
        seed: SecretSeed,
    ) -> impl Future<Output = Result<Account, StoreError>> + Send;

    /// Replace the row only if its `(secret_seed, balance)` still equals `expected`.
    fn compare_and_swap_account(
        &self,
        expected: &Account,
        desired: &Account,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically add `amount` to the balance and return the updated row.
    fn credit_account(
        &self,
        identity: &Identity,
        amount: u64,
    ) -> impl Future<Output = Result<Account, StoreError>> + Send;

    fn create_deposit(&self, deposit: &Deposit)
        -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_deposit(
        &self,
        id: &SettlementId,
    ) -> impl Future<Output = Result<Option<Deposit>, StoreError>> + Send;

    /// Flip a Pending deposit to Completed. Returns `false` if it was not Pending.
    fn complete_deposit_if_pending(
        &self,
        id: &SettlementId,
        confirmation: &DepositConfirmation,
        completed_at: u64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn revert_deposit_to_pending(
        &self,
        id: &SettlementId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn create_withdrawal(
        &self,
        withdrawal: &Withdrawal,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_withdrawal(
        &self,
        id: &SettlementId,
    ) -> impl Future<Output = Result<Option<Withdrawal>, StoreError>> + Send;

    /// Persist a resolved bet and return its assigned id.
    fn record_bet(&self, bet: &BetRecord) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn list_bets(
        &self,
        identity: &Identity,
        page: Page,
    ) -> impl Future<Output = Result<Vec<BetRecord>, StoreError>> + Send;

    fn list_deposits(
        &self,
        identity: &Identity,
        page: Page,
    ) -> impl Future<Output = Result<Vec<Deposit>, StoreError>> + Send;

    fn list_withdrawals(
        &self,
        identity: &Identity,
        page: Page,
    ) -> impl Future<Output = Result<Vec<Withdrawal>, StoreError>> + Send;

    /// Debit the account (via compare-and-swap) and record the withdrawal as one unit.
    ///
    /// The default composes the primitives and credits the amount back if the
    /// insert fails. Stores with transactions should override it.
    fn debit_and_record_withdrawal(
        &self,
        expected: &Account,
        desired: &Account,
        withdrawal: &Withdrawal,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            self.compare_and_swap_account(expected, desired).await?;
            if let Err(err) = self.create_withdrawal(withdrawal).await {
                let refund = expected.balance.saturating_sub(desired.balance);
                if let Err(revert) = self.credit_account(&expected.identity, refund).await {
                    error!(
                        identity = %expected.identity,
                        withdrawal = %withdrawal.id,
                        refund,
                        error = %revert,
                        "failed to refund balance after withdrawal insert failed"
                    );
                }
                return Err(err);
            }
            Ok(())
        }
    }

    /// Complete a Pending deposit and credit its amount as one unit.
    ///
    /// Returns `false` (and credits nothing) if the deposit was no longer Pending.
    fn complete_deposit_and_credit(
        &self,
        deposit: &Deposit,
        confirmation: &DepositConfirmation,
        completed_at: u64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send {
        async move {
            if !self
                .complete_deposit_if_pending(&deposit.id, confirmation, completed_at)
                .await?
            {
                return Ok(false);
            }
            if let Err(err) = self.credit_account(&deposit.identity, deposit.amount).await {
                if let Err(revert) = self.revert_deposit_to_pending(&deposit.id).await {
                    error!(
                        identity = %deposit.identity,
                        deposit = %deposit.id,
                        error = %revert,
                        "failed to revert deposit to pending after credit failed"
                    );
                }
                return Err(err);
            }
            Ok(true)
        }
    }
}

/// One-shot failures injectable into [`Memory`].
#[cfg(any(test, feature = "mocks"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fault {
    CreateWithdrawal,
    CreditAccount,
    RevertDeposit,
    RecordBet,
}

#[cfg(any(test, feature = "mocks"))]
#[derive(Default)]
struct MemoryInner {
    accounts: HashMap<Identity, Account>,
    deposits: Vec<Deposit>,
    withdrawals: Vec<Withdrawal>,
    bets: Vec<BetRecord>,
    faults: HashSet<Fault>,
}

#[cfg(any(test, feature = "mocks"))]
impl MemoryInner {
    fn take_fault(&mut self, fault: Fault) -> Result<(), StoreError> {
        if self.faults.remove(&fault) {
            return Err(StoreError::Persistence(anyhow::anyhow!(
                "injected fault: {fault:?}"
            )));
        }
        Ok(())
    }
}

/// In-memory store. Each primitive runs under one short-lived mutex guard.
#[cfg(any(test, feature = "mocks"))]
#[derive(Default)]
pub struct Memory {
    inner: Mutex<MemoryInner>,
}

#[cfg(any(test, feature = "mocks"))]
impl Memory {
    /// Make the next call that hits `fault` fail with a persistence error.
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.insert(fault);
    }

    pub fn account(&self, identity: &Identity) -> Option<Account> {
        self.lock().accounts.get(identity).cloned()
    }

    pub fn set_balance(&self, identity: &Identity, balance: u64) {
        if let Some(account) = self.lock().accounts.get_mut(identity) {
            account.balance = balance;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(any(test, feature = "mocks"))]
fn page_of<T: Clone>(items: &[T], page: Page, keep: impl Fn(&T) -> bool) -> Vec<T> {
    items
        .iter()
        .rev()
        .filter(|item| keep(item))
        .skip(page.skip as usize)
        .take(page.count as usize)
        .cloned()
        .collect()
}

#[cfg(any(test, feature = "mocks"))]
impl Store for Memory {
    async fn get_or_create_account(
        &self,
        identity: &Identity,
        seed: SecretSeed,
    ) -> Result<Account, StoreError> {
        let mut inner = self.lock();
        Ok(inner
            .accounts
            .entry(identity.clone())
            .or_insert_with(|| Account::new(identity.clone(), seed))
            .clone())
    }

    async fn compare_and_swap_account(
        &self,
        expected: &Account,
        desired: &Account,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let stored = inner
            .accounts
            .get_mut(&expected.identity)
            .ok_or_else(|| StoreError::not_found("account", &expected.identity))?;
        if !stored.same_snapshot(expected) {
            return Err(StoreError::Conflict);
        }
        *stored = desired.clone();
        Ok(())
    }

    async fn credit_account(&self, identity: &Identity, amount: u64) -> Result<Account, StoreError> {
        let mut inner = self.lock();
        inner.take_fault(Fault::CreditAccount)?;
        let stored = inner
            .accounts
            .get_mut(identity)
            .ok_or_else(|| StoreError::not_found("account", identity))?;
        stored.balance = stored
            .balance
            .checked_add(amount)
            .ok_or_else(|| StoreError::Persistence(anyhow::anyhow!("balance overflow")))?;
        Ok(stored.clone())
    }

    async fn create_deposit(&self, deposit: &Deposit) -> Result<(), StoreError> {
        self.lock().deposits.push(deposit.clone());
        Ok(())
    }

    async fn get_deposit(&self, id: &SettlementId) -> Result<Option<Deposit>, StoreError> {
        Ok(self.lock().deposits.iter().find(|d| &d.id == id).cloned())
    }

    async fn complete_deposit_if_pending(
        &self,
        id: &SettlementId,
        confirmation: &DepositConfirmation,
        completed_at: u64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(deposit) = inner.deposits.iter_mut().find(|d| &d.id == id) else {
            return Err(StoreError::not_found("deposit", id));
        };
        if deposit.is_completed() {
            return Ok(false);
        }
        deposit.status = DepositStatus::Completed;
        deposit.signature = Some(confirmation.signature.clone());
        deposit.completed_at = Some(completed_at);
        Ok(true)
    }

    async fn revert_deposit_to_pending(&self, id: &SettlementId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.take_fault(Fault::RevertDeposit)?;
        let Some(deposit) = inner.deposits.iter_mut().find(|d| &d.id == id) else {
            return Err(StoreError::not_found("deposit", id));
        };
        deposit.status = DepositStatus::Pending;
        deposit.signature = None;
        deposit.completed_at = None;
        Ok(())
    }

    async fn create_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.take_fault(Fault::CreateWithdrawal)?;
        inner.withdrawals.push(withdrawal.clone());
        Ok(())
    }

    async fn get_withdrawal(&self, id: &SettlementId) -> Result<Option<Withdrawal>, StoreError> {
        Ok(self.lock().withdrawals.iter().find(|w| &w.id == id).cloned())
    }

    async fn record_bet(&self, bet: &BetRecord) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        inner.take_fault(Fault::RecordBet)?;
        let id = inner.bets.len() as u64 + 1;
        let mut bet = bet.clone();
        bet.id = id;
        inner.bets.push(bet);
        Ok(id)
    }

    async fn list_bets(&self, identity: &Identity, page: Page) -> Result<Vec<BetRecord>, StoreError> {
        Ok(page_of(&self.lock().bets, page, |b| &b.identity == identity))
    }

    async fn list_deposits(&self, identity: &Identity, page: Page) -> Result<Vec<Deposit>, StoreError> {
        Ok(page_of(&self.lock().deposits, page, |d| &d.identity == identity))
    }

    async fn list_withdrawals(
        &self,
        identity: &Identity,
        page: Page,
    ) -> Result<Vec<Withdrawal>, StoreError> {
        Ok(page_of(&self.lock().withdrawals, page, |w| {
            &w.identity == identity
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::create_identity;
    use fairroll_types::SettlementId;

    fn seed(byte: u8) -> SecretSeed {
        SecretSeed([byte; 32])
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = Memory::default();
        let identity = create_identity(1);
        let first = store.get_or_create_account(&identity, seed(1)).await.unwrap();
        let second = store.get_or_create_account(&identity, seed(2)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.secret_seed, seed(1));
        assert_eq!(second.balance, 0);
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_snapshot() {
        let store = Memory::default();
        let identity = create_identity(1);
        let start = store.get_or_create_account(&identity, seed(1)).await.unwrap();
        let mut next = start.clone();
        next.balance = 10;
        store.compare_and_swap_account(&start, &next).await.unwrap();
        let mut stale = start.clone();
        stale.balance = 20;
        assert!(matches!(
            store.compare_and_swap_account(&start, &stale).await,
            Err(StoreError::Conflict)
        ));
        assert_eq!(store.account(&identity).unwrap().balance, 10);
    }

    #[tokio::test]
    async fn test_default_withdrawal_refunds_on_insert_failure() {
        let store = Memory::default();
        let identity = create_identity(1);
        let start = store.get_or_create_account(&identity, seed(1)).await.unwrap();
        store.set_balance(&identity, 1_000);
        let start = Account {
            balance: 1_000,
            ..start
        };
        let desired = Account {
            balance: 400,
            ..start.clone()
        };
        let withdrawal = Withdrawal {
            id: SettlementId::generate(600).unwrap(),
            identity: identity.clone(),
            url: String::new(),
            amount: 600,
            signature: String::new(),
            created_at: 0,
        };

        store.inject(Fault::CreateWithdrawal);
        assert!(store
            .debit_and_record_withdrawal(&start, &desired, &withdrawal)
            .await
            .is_err());
        assert_eq!(store.account(&identity).unwrap().balance, 1_000);
        assert!(store.get_withdrawal(&withdrawal.id).await.unwrap().is_none());

        store
            .debit_and_record_withdrawal(&start, &desired, &withdrawal)
            .await
            .unwrap();
        assert_eq!(store.account(&identity).unwrap().balance, 400);
        assert!(store.get_withdrawal(&withdrawal.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_default_deposit_completion_reverts_on_credit_failure() {
        let store = Memory::default();
        let identity = create_identity(1);
        store.get_or_create_account(&identity, seed(1)).await.unwrap();
        let deposit = Deposit::pending(
            SettlementId::generate(250).unwrap(),
            identity.clone(),
            String::new(),
            250,
            0,
        );
        store.create_deposit(&deposit).await.unwrap();
        let confirmation = DepositConfirmation {
            signature: "sig".to_string(),
            timestamp: 1,
        };

        store.inject(Fault::CreditAccount);
        assert!(store
            .complete_deposit_and_credit(&deposit, &confirmation, 5)
            .await
            .is_err());
        let stored = store.get_deposit(&deposit.id).await.unwrap().unwrap();
        assert!(!stored.is_completed());
        assert_eq!(store.account(&identity).unwrap().balance, 0);

        assert!(store
            .complete_deposit_and_credit(&deposit, &confirmation, 5)
            .await
            .unwrap());
        assert!(!store
            .complete_deposit_and_credit(&deposit, &confirmation, 6)
            .await
            .unwrap());
        assert_eq!(store.account(&identity).unwrap().balance, 250);
        let stored = store.get_deposit(&deposit.id).await.unwrap().unwrap();
        assert_eq!(stored.completed_at, Some(5));
        assert_eq!(stored.signature.as_deref(), Some("sig"));
    }

    #[tokio::test]
    async fn test_lists_are_newest_first_and_paginated() {
        let store = Memory::default();
        let alice = create_identity(1);
        let bob = create_identity(2);
        for (n, identity) in [&alice, &bob, &alice, &alice].into_iter().enumerate() {
            let deposit = Deposit::pending(
                SettlementId::generate(n as u64 + 1).unwrap(),
                identity.clone(),
                String::new(),
                n as u64 + 1,
                n as u64,
            );
            store.create_deposit(&deposit).await.unwrap();
        }
        let all = store.list_deposits(&alice, Page::default()).await.unwrap();
        assert_eq!(
            all.iter().map(|d| d.amount).collect::<Vec<_>>(),
            vec![4, 3, 1]
        );
        let page = store.list_deposits(&alice, Page::new(1, 1)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].amount, 3);
    }
}
