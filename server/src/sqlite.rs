use anyhow::Context;
use commonware_codec::DecodeExt;
use commonware_cryptography::ed25519::PublicKey;
use fairroll_execution::{Store, StoreError};
use fairroll_types::{
    Account, BetRecord, Deposit, DepositConfirmation, DepositStatus, Direction, Identity, Page,
    SecretSeed, SettlementId, Withdrawal,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed [`Store`].
///
/// Each operation opens its own connection on the blocking pool, so no
/// in-process lock is ever held. Compound operations run as one transaction.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = open_connection(path)?;
        init_schema_sqlite(&conn)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = open_connection(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|err| StoreError::Persistence(anyhow::anyhow!("{op} task failed: {err}")))?
    }
}

fn open_connection(path: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("open fairroll db")?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("set sqlite busy timeout")?;
    Ok(conn)
}

fn init_schema_sqlite(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         CREATE TABLE IF NOT EXISTS accounts (
             identity BLOB PRIMARY KEY,
             secret_seed BLOB NOT NULL,
             balance INTEGER NOT NULL CHECK (balance >= 0)
         );
         CREATE TABLE IF NOT EXISTS bets (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             identity BLOB NOT NULL,
             wager INTEGER NOT NULL,
             direction TEXT NOT NULL,
             threshold INTEGER NOT NULL,
             outcome INTEGER NOT NULL,
             won INTEGER NOT NULL,
             secret_seed BLOB NOT NULL,
             created_at INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS bets_identity_created
             ON bets (identity, created_at);
         CREATE TABLE IF NOT EXISTS deposits (
             id BLOB PRIMARY KEY,
             identity BLOB NOT NULL,
             url TEXT NOT NULL,
             amount INTEGER NOT NULL,
             status TEXT NOT NULL,
             signature TEXT,
             created_at INTEGER NOT NULL,
             completed_at INTEGER
         );
         CREATE INDEX IF NOT EXISTS deposits_identity_created
             ON deposits (identity, created_at);
         CREATE TABLE IF NOT EXISTS withdrawals (
             id BLOB PRIMARY KEY,
             identity BLOB NOT NULL,
             url TEXT NOT NULL,
             amount INTEGER NOT NULL,
             signature TEXT NOT NULL,
             created_at INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS withdrawals_identity_created
             ON withdrawals (identity, created_at);",
    )
    .context("init fairroll schema")?;
    Ok(())
}

fn to_sql(value: u64) -> anyhow::Result<i64> {
    i64::try_from(value).with_context(|| format!("value {value} exceeds sqlite integer range"))
}

fn from_sql(value: i64) -> anyhow::Result<u64> {
    u64::try_from(value).with_context(|| format!("negative stored value {value}"))
}

fn decode_identity(bytes: &[u8]) -> anyhow::Result<Identity> {
    let key = PublicKey::decode(&mut &bytes[..]).context("decode stored identity")?;
    Ok(Identity::from_public_key(key))
}

fn decode_seed(bytes: Vec<u8>) -> anyhow::Result<SecretSeed> {
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("stored secret seed has wrong length"))?;
    Ok(SecretSeed(seed))
}

fn decode_settlement_id(bytes: Vec<u8>) -> anyhow::Result<SettlementId> {
    let id: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("stored settlement id has wrong length"))?;
    Ok(SettlementId::from_bytes(id))
}

fn direction_to_sql(direction: Direction) -> &'static str {
    match direction {
        Direction::Under => "under",
        Direction::Over => "over",
    }
}

fn direction_from_sql(value: &str) -> anyhow::Result<Direction> {
    match value {
        "under" => Ok(Direction::Under),
        "over" => Ok(Direction::Over),
        other => anyhow::bail!("unknown stored direction {other:?}"),
    }
}

fn status_to_sql(status: DepositStatus) -> &'static str {
    match status {
        DepositStatus::Pending => "pending",
        DepositStatus::Completed => "completed",
    }
}

fn status_from_sql(value: &str) -> anyhow::Result<DepositStatus> {
    match value {
        "pending" => Ok(DepositStatus::Pending),
        "completed" => Ok(DepositStatus::Completed),
        other => anyhow::bail!("unknown stored deposit status {other:?}"),
    }
}

// Raw rows are decoded outside the rusqlite closures so codec errors keep their context.

struct AccountRow {
    seed: Vec<u8>,
    balance: i64,
}

fn load_account(conn: &Connection, identity: &Identity) -> Result<Option<Account>, StoreError> {
    let row = conn
        .query_row(
            "SELECT secret_seed, balance FROM accounts WHERE identity = ?1",
            params![identity.as_bytes()],
            |row| {
                Ok(AccountRow {
                    seed: row.get(0)?,
                    balance: row.get(1)?,
                })
            },
        )
        .optional()
        .context("load account")?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(Account {
        identity: identity.clone(),
        secret_seed: decode_seed(row.seed)?,
        balance: from_sql(row.balance)?,
    }))
}

fn require_account(conn: &Connection, identity: &Identity) -> Result<Account, StoreError> {
    load_account(conn, identity)?.ok_or_else(|| StoreError::not_found("account", identity))
}

fn cas_account(conn: &Connection, expected: &Account, desired: &Account) -> Result<(), StoreError> {
    let changed = conn
        .execute(
            "UPDATE accounts SET secret_seed = ?1, balance = ?2
             WHERE identity = ?3 AND secret_seed = ?4 AND balance = ?5",
            params![
                &desired.secret_seed.as_bytes()[..],
                to_sql(desired.balance)?,
                expected.identity.as_bytes(),
                &expected.secret_seed.as_bytes()[..],
                to_sql(expected.balance)?,
            ],
        )
        .context("compare and swap account")?;
    if changed == 1 {
        return Ok(());
    }
    require_account(conn, &expected.identity)?;
    Err(StoreError::Conflict)
}

fn credit(conn: &Connection, identity: &Identity, amount: u64) -> Result<Account, StoreError> {
    let mut account = require_account(conn, identity)?;
    account.balance = account
        .balance
        .checked_add(amount)
        .ok_or_else(|| anyhow::anyhow!("balance overflow crediting {amount}"))?;
    conn.execute(
        "UPDATE accounts SET balance = ?1 WHERE identity = ?2",
        params![to_sql(account.balance)?, identity.as_bytes()],
    )
    .context("credit account")?;
    Ok(account)
}

fn insert_withdrawal(conn: &Connection, withdrawal: &Withdrawal) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO withdrawals (id, identity, url, amount, signature, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            &withdrawal.id.as_bytes()[..],
            withdrawal.identity.as_bytes(),
            withdrawal.url,
            to_sql(withdrawal.amount)?,
            withdrawal.signature,
            to_sql(withdrawal.created_at)?,
        ],
    )
    .context("insert withdrawal")?;
    Ok(())
}

fn mark_completed(
    conn: &Connection,
    id: &SettlementId,
    confirmation: &DepositConfirmation,
    completed_at: u64,
) -> Result<bool, StoreError> {
    let changed = conn
        .execute(
            "UPDATE deposits SET status = 'completed', signature = ?1, completed_at = ?2
             WHERE id = ?3 AND status = 'pending'",
            params![
                confirmation.signature,
                to_sql(completed_at)?,
                &id.as_bytes()[..]
            ],
        )
        .context("complete deposit")?;
    if changed == 1 {
        return Ok(true);
    }
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS (SELECT 1 FROM deposits WHERE id = ?1)",
            params![&id.as_bytes()[..]],
            |row| row.get(0),
        )
        .context("check deposit")?;
    if !exists {
        return Err(StoreError::not_found("deposit", id));
    }
    Ok(false)
}

struct DepositRow {
    id: Vec<u8>,
    identity: Vec<u8>,
    url: String,
    amount: i64,
    status: String,
    signature: Option<String>,
    created_at: i64,
    completed_at: Option<i64>,
}

const DEPOSIT_COLUMNS: &str =
    "id, identity, url, amount, status, signature, created_at, completed_at";

fn deposit_row(row: &Row<'_>) -> rusqlite::Result<DepositRow> {
    Ok(DepositRow {
        id: row.get(0)?,
        identity: row.get(1)?,
        url: row.get(2)?,
        amount: row.get(3)?,
        status: row.get(4)?,
        signature: row.get(5)?,
        created_at: row.get(6)?,
        completed_at: row.get(7)?,
    })
}

impl DepositRow {
    fn decode(self) -> anyhow::Result<Deposit> {
        Ok(Deposit {
            id: decode_settlement_id(self.id)?,
            identity: decode_identity(&self.identity)?,
            url: self.url,
            amount: from_sql(self.amount)?,
            status: status_from_sql(&self.status)?,
            signature: self.signature,
            created_at: from_sql(self.created_at)?,
            completed_at: self.completed_at.map(from_sql).transpose()?,
        })
    }
}

struct WithdrawalRow {
    id: Vec<u8>,
    identity: Vec<u8>,
    url: String,
    amount: i64,
    signature: String,
    created_at: i64,
}

const WITHDRAWAL_COLUMNS: &str = "id, identity, url, amount, signature, created_at";

fn withdrawal_row(row: &Row<'_>) -> rusqlite::Result<WithdrawalRow> {
    Ok(WithdrawalRow {
        id: row.get(0)?,
        identity: row.get(1)?,
        url: row.get(2)?,
        amount: row.get(3)?,
        signature: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl WithdrawalRow {
    fn decode(self) -> anyhow::Result<Withdrawal> {
        Ok(Withdrawal {
            id: decode_settlement_id(self.id)?,
            identity: decode_identity(&self.identity)?,
            url: self.url,
            amount: from_sql(self.amount)?,
            signature: self.signature,
            created_at: from_sql(self.created_at)?,
        })
    }
}

struct BetRow {
    id: i64,
    identity: Vec<u8>,
    wager: i64,
    direction: String,
    threshold: u16,
    outcome: u16,
    won: bool,
    secret_seed: Vec<u8>,
    created_at: i64,
}

fn bet_row(row: &Row<'_>) -> rusqlite::Result<BetRow> {
    Ok(BetRow {
        id: row.get(0)?,
        identity: row.get(1)?,
        wager: row.get(2)?,
        direction: row.get(3)?,
        threshold: row.get(4)?,
        outcome: row.get(5)?,
        won: row.get(6)?,
        secret_seed: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl BetRow {
    fn decode(self) -> anyhow::Result<BetRecord> {
        Ok(BetRecord {
            id: from_sql(self.id)?,
            identity: decode_identity(&self.identity)?,
            wager: from_sql(self.wager)?,
            direction: direction_from_sql(&self.direction)?,
            threshold: self.threshold,
            outcome: self.outcome,
            won: self.won,
            secret_seed: decode_seed(self.secret_seed)?,
            created_at: from_sql(self.created_at)?,
        })
    }
}

fn list_page<R>(
    conn: &Connection,
    sql: &str,
    identity: &Identity,
    page: Page,
    map: fn(&Row<'_>) -> rusqlite::Result<R>,
) -> anyhow::Result<Vec<R>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(
        params![identity.as_bytes(), page.count as i64, page.skip as i64],
        map,
    )?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

impl Store for SqliteStore {
    async fn get_or_create_account(
        &self,
        identity: &Identity,
        seed: SecretSeed,
    ) -> Result<Account, StoreError> {
        let identity = identity.clone();
        self.run("get or create account", move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO accounts (identity, secret_seed, balance) VALUES (?1, ?2, 0)",
                params![identity.as_bytes(), &seed.as_bytes()[..]],
            )
            .context("insert account")?;
            require_account(conn, &identity)
        })
        .await
    }

    async fn compare_and_swap_account(
        &self,
        expected: &Account,
        desired: &Account,
    ) -> Result<(), StoreError> {
        let (expected, desired) = (expected.clone(), desired.clone());
        self.run("compare and swap account", move |conn| {
            cas_account(conn, &expected, &desired)
        })
        .await
    }

    async fn credit_account(&self, identity: &Identity, amount: u64) -> Result<Account, StoreError> {
        let identity = identity.clone();
        self.run("credit account", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("begin credit")?;
            let account = credit(&tx, &identity, amount)?;
            tx.commit().context("commit credit")?;
            Ok(account)
        })
        .await
    }

    async fn create_deposit(&self, deposit: &Deposit) -> Result<(), StoreError> {
        let deposit = deposit.clone();
        self.run("create deposit", move |conn| {
            conn.execute(
                "INSERT INTO deposits (id, identity, url, amount, status, signature, created_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    &deposit.id.as_bytes()[..],
                    deposit.identity.as_bytes(),
                    deposit.url,
                    to_sql(deposit.amount)?,
                    status_to_sql(deposit.status),
                    deposit.signature,
                    to_sql(deposit.created_at)?,
                    deposit.completed_at.map(to_sql).transpose()?,
                ],
            )
            .context("insert deposit")?;
            Ok(())
        })
        .await
    }

    async fn get_deposit(&self, id: &SettlementId) -> Result<Option<Deposit>, StoreError> {
        let id = *id;
        self.run("get deposit", move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {DEPOSIT_COLUMNS} FROM deposits WHERE id = ?1"),
                    params![&id.as_bytes()[..]],
                    deposit_row,
                )
                .optional()
                .context("load deposit")?;
            Ok(row.map(DepositRow::decode).transpose()?)
        })
        .await
    }

    async fn complete_deposit_if_pending(
        &self,
        id: &SettlementId,
        confirmation: &DepositConfirmation,
        completed_at: u64,
    ) -> Result<bool, StoreError> {
        let (id, confirmation) = (*id, confirmation.clone());
        self.run("complete deposit", move |conn| {
            mark_completed(conn, &id, &confirmation, completed_at)
        })
        .await
    }

    async fn revert_deposit_to_pending(&self, id: &SettlementId) -> Result<(), StoreError> {
        let id = *id;
        self.run("revert deposit", move |conn| {
            let changed = conn
                .execute(
                    "UPDATE deposits SET status = 'pending', signature = NULL, completed_at = NULL
                     WHERE id = ?1",
                    params![&id.as_bytes()[..]],
                )
                .context("revert deposit")?;
            if changed == 0 {
                return Err(StoreError::not_found("deposit", id));
            }
            Ok(())
        })
        .await
    }

    async fn create_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), StoreError> {
        let withdrawal = withdrawal.clone();
        self.run("create withdrawal", move |conn| {
            insert_withdrawal(conn, &withdrawal)
        })
        .await
    }

    async fn get_withdrawal(&self, id: &SettlementId) -> Result<Option<Withdrawal>, StoreError> {
        let id = *id;
        self.run("get withdrawal", move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = ?1"),
                    params![&id.as_bytes()[..]],
                    withdrawal_row,
                )
                .optional()
                .context("load withdrawal")?;
            Ok(row.map(WithdrawalRow::decode).transpose()?)
        })
        .await
    }

    async fn record_bet(&self, bet: &BetRecord) -> Result<u64, StoreError> {
        let bet = bet.clone();
        self.run("record bet", move |conn| {
            conn.execute(
                "INSERT INTO bets (identity, wager, direction, threshold, outcome, won, secret_seed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    bet.identity.as_bytes(),
                    to_sql(bet.wager)?,
                    direction_to_sql(bet.direction),
                    bet.threshold,
                    bet.outcome,
                    bet.won,
                    &bet.secret_seed.as_bytes()[..],
                    to_sql(bet.created_at)?,
                ],
            )
            .context("insert bet")?;
            Ok(from_sql(conn.last_insert_rowid())?)
        })
        .await
    }

    async fn list_bets(&self, identity: &Identity, page: Page) -> Result<Vec<BetRecord>, StoreError> {
        let identity = identity.clone();
        self.run("list bets", move |conn| {
            let rows = list_page(
                conn,
                "SELECT id, identity, wager, direction, threshold, outcome, won, secret_seed, created_at
                 FROM bets WHERE identity = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
                &identity,
                page,
                bet_row,
            )
            .context("list bets")?;
            Ok(rows
                .into_iter()
                .map(BetRow::decode)
                .collect::<anyhow::Result<_>>()?)
        })
        .await
    }

    async fn list_deposits(&self, identity: &Identity, page: Page) -> Result<Vec<Deposit>, StoreError> {
        let identity = identity.clone();
        self.run("list deposits", move |conn| {
            let rows = list_page(
                conn,
                &format!(
                    "SELECT {DEPOSIT_COLUMNS} FROM deposits WHERE identity = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3"
                ),
                &identity,
                page,
                deposit_row,
            )
            .context("list deposits")?;
            Ok(rows
                .into_iter()
                .map(DepositRow::decode)
                .collect::<anyhow::Result<_>>()?)
        })
        .await
    }

    async fn list_withdrawals(
        &self,
        identity: &Identity,
        page: Page,
    ) -> Result<Vec<Withdrawal>, StoreError> {
        let identity = identity.clone();
        self.run("list withdrawals", move |conn| {
            let rows = list_page(
                conn,
                &format!(
                    "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE identity = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3"
                ),
                &identity,
                page,
                withdrawal_row,
            )
            .context("list withdrawals")?;
            Ok(rows
                .into_iter()
                .map(WithdrawalRow::decode)
                .collect::<anyhow::Result<_>>()?)
        })
        .await
    }

    async fn debit_and_record_withdrawal(
        &self,
        expected: &Account,
        desired: &Account,
        withdrawal: &Withdrawal,
    ) -> Result<(), StoreError> {
        let (expected, desired, withdrawal) =
            (expected.clone(), desired.clone(), withdrawal.clone());
        self.run("debit and record withdrawal", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("begin withdrawal")?;
            cas_account(&tx, &expected, &desired)?;
            insert_withdrawal(&tx, &withdrawal)?;
            tx.commit().context("commit withdrawal")?;
            Ok(())
        })
        .await
    }

    async fn complete_deposit_and_credit(
        &self,
        deposit: &Deposit,
        confirmation: &DepositConfirmation,
        completed_at: u64,
    ) -> Result<bool, StoreError> {
        let (deposit, confirmation) = (deposit.clone(), confirmation.clone());
        self.run("complete deposit and credit", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("begin deposit completion")?;
            if !mark_completed(&tx, &deposit.id, &confirmation, completed_at)? {
                return Ok(false);
            }
            credit(&tx, &deposit.identity, deposit.amount)?;
            tx.commit().context("commit deposit completion")?;
            Ok(true)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairroll_execution::mocks::create_identity;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = SqliteStore::open(&dir.path().join("fairroll.db")).expect("open store");
        (dir, store)
    }

    fn withdrawal(identity: &Identity, amount: u64) -> Withdrawal {
        Withdrawal {
            id: SettlementId::generate(amount).unwrap(),
            identity: identity.clone(),
            url: "http://127.0.0.1:3000/withdraw".to_string(),
            amount,
            signature: "ab".repeat(64),
            created_at: 10,
        }
    }

    #[tokio::test]
    async fn test_account_insert_or_fetch() {
        let (_dir, store) = open_temp();
        let identity = create_identity(1);
        let first = store
            .get_or_create_account(&identity, SecretSeed([1; 32]))
            .await
            .unwrap();
        let second = store
            .get_or_create_account(&identity, SecretSeed([2; 32]))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(second.secret_seed, SecretSeed([1; 32]));
        assert_eq!(second.balance, 0);
    }

    #[tokio::test]
    async fn test_concurrent_cas_single_winner() {
        let (_dir, store) = open_temp();
        let identity = create_identity(1);
        store
            .get_or_create_account(&identity, SecretSeed([1; 32]))
            .await
            .unwrap();
        let start = store.credit_account(&identity, 1_000).await.unwrap();

        let desired: Vec<Account> = (0..4u8)
            .map(|n| Account {
                identity: identity.clone(),
                secret_seed: SecretSeed([n + 10; 32]),
                balance: 100 * n as u64,
            })
            .collect();
        let handles = desired
            .iter()
            .cloned()
            .map(|desired| {
                let (store, start) = (store.clone(), start.clone());
                tokio::spawn(async move { store.compare_and_swap_account(&start, &desired).await })
            })
            .collect::<Vec<_>>();
        let mut winners = Vec::new();
        for (n, handle) in handles.into_iter().enumerate() {
            match handle.await.unwrap() {
                Ok(()) => winners.push(n),
                Err(StoreError::Conflict) => {}
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
        assert_eq!(winners.len(), 1);
        let stored = store
            .get_or_create_account(&identity, SecretSeed([0; 32]))
            .await
            .unwrap();
        assert_eq!(stored, desired[winners[0]]);
    }

    #[tokio::test]
    async fn test_cas_missing_account_is_not_found() {
        let (_dir, store) = open_temp();
        let account = Account::new(create_identity(1), SecretSeed([1; 32]));
        assert!(matches!(
            store.compare_and_swap_account(&account, &account).await,
            Err(StoreError::NotFound { kind: "account", .. })
        ));
    }

    #[tokio::test]
    async fn test_deposit_completion_credits_once() {
        let (_dir, store) = open_temp();
        let identity = create_identity(1);
        store
            .get_or_create_account(&identity, SecretSeed([1; 32]))
            .await
            .unwrap();
        let deposit = Deposit::pending(
            SettlementId::generate(250).unwrap(),
            identity.clone(),
            "http://127.0.0.1:3000/deposit".to_string(),
            250,
            5,
        );
        store.create_deposit(&deposit).await.unwrap();
        let confirmation = DepositConfirmation {
            signature: "5xTx".to_string(),
            timestamp: 1,
        };

        assert!(store
            .complete_deposit_and_credit(&deposit, &confirmation, 7)
            .await
            .unwrap());
        assert!(!store
            .complete_deposit_and_credit(&deposit, &confirmation, 8)
            .await
            .unwrap());

        let stored = store.get_deposit(&deposit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Completed);
        assert_eq!(stored.completed_at, Some(7));
        assert_eq!(stored.signature.as_deref(), Some("5xTx"));
        let account = store.credit_account(&identity, 0).await.unwrap();
        assert_eq!(account.balance, 250);
    }

    #[tokio::test]
    async fn test_withdrawal_rolls_back_when_insert_fails() {
        let (_dir, store) = open_temp();
        let identity = create_identity(1);
        store
            .get_or_create_account(&identity, SecretSeed([1; 32]))
            .await
            .unwrap();
        let start = store.credit_account(&identity, 1_000).await.unwrap();
        let first = withdrawal(&identity, 300);
        let after_first = Account {
            balance: 700,
            ..start.clone()
        };
        store
            .debit_and_record_withdrawal(&start, &after_first, &first)
            .await
            .unwrap();

        // Reusing the id violates the primary key; the debit must not stick.
        let after_second = Account {
            balance: 400,
            ..start.clone()
        };
        assert!(matches!(
            store
                .debit_and_record_withdrawal(&after_first, &after_second, &first)
                .await,
            Err(StoreError::Persistence(_))
        ));
        let account = store.credit_account(&identity, 0).await.unwrap();
        assert_eq!(account.balance, 700);
        assert_eq!(
            store.get_withdrawal(&first.id).await.unwrap(),
            Some(first.clone())
        );
    }

    #[tokio::test]
    async fn test_lists_newest_first() {
        let (_dir, store) = open_temp();
        let identity = create_identity(1);
        let other = create_identity(2);
        for (n, owner) in [&identity, &other, &identity].into_iter().enumerate() {
            let bet = BetRecord {
                id: 0,
                identity: owner.clone(),
                wager: n as u64,
                direction: Direction::Over,
                threshold: 500,
                outcome: 42,
                won: n % 2 == 0,
                secret_seed: SecretSeed([n as u8; 32]),
                created_at: 100,
            };
            store.record_bet(&bet).await.unwrap();
        }
        let bets = store.list_bets(&identity, Page::default()).await.unwrap();
        assert_eq!(bets.iter().map(|b| b.wager).collect::<Vec<_>>(), vec![2, 0]);
        assert_eq!(bets[0].direction, Direction::Over);
        assert_eq!(bets[0].secret_seed, SecretSeed([2; 32]));
        let paged = store.list_bets(&identity, Page::new(1, 1)).await.unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].wager, 0);
    }
}
