//! Account store
//!
//! SQLite-backed persistence for accounts and withdrawals. The layout mirrors
//! the external document store it stands in for: a `users` table keyed by
//! telegram id (with the referral list and a denormalized withdrawal list as
//! JSON columns) and a global `withdrawals` index keyed by push id. Every
//! mutation that touches both copies runs inside one IMMEDIATE transaction,
//! which also makes registration and the withdrawal debit read-modify-write
//! atomic per account — a duplicate tap can't double-pay a bonus or
//! double-spend a balance.

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::core::config::rewards;
use crate::core::error::{AppError, AppResult};
use crate::ledger::rules::{
    complete_withdrawal, decide_mark_paid, decide_registration, MarkPaidOutcome, RegistrationOutcome,
    RegistrationRequest, RewardError,
};
use crate::ledger::{Account, Withdrawal, WithdrawalStatus};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and runs schema
/// migrations on the first connection.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    let pool = Pool::builder().max_size(10).build(manager)?;

    let conn = pool.get()?;
    if let Err(e) = migrate_schema(&conn) {
        log::warn!("Failed to migrate schema: {}", e);
    }

    Ok(pool)
}

/// Get a connection from the pool
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Ensure all tables and indexes exist.
fn migrate_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            telegram_id INTEGER PRIMARY KEY,
            username TEXT,
            balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
            referred_by INTEGER,
            referrals TEXT NOT NULL DEFAULT '[]',
            withdrawals TEXT NOT NULL DEFAULT '[]',
            origin_token TEXT NOT NULL,
            joined TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_origin_token ON users(origin_token);
        CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
        CREATE TABLE IF NOT EXISTS withdrawals (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            amount INTEGER NOT NULL,
            phone TEXT NOT NULL,
            network TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_withdrawals_status ON withdrawals(status);
        CREATE INDEX IF NOT EXISTS idx_withdrawals_user_id ON withdrawals(user_id);",
    )?;
    Ok(())
}

fn parse_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| AppError::Validation(format!("bad timestamp {raw:?}: {e}")))
}

/// Raw row before the JSON columns are decoded.
struct AccountRow {
    telegram_id: i64,
    username: Option<String>,
    balance: i64,
    referred_by: Option<i64>,
    referrals_json: String,
    withdrawals_json: String,
    origin_token: String,
    joined: String,
}

impl AccountRow {
    fn into_account(self) -> AppResult<Account> {
        let referrals: Vec<String> = serde_json::from_str(&self.referrals_json)?;
        let withdrawals: Vec<Withdrawal> = serde_json::from_str(&self.withdrawals_json)?;
        Account::from_parts(
            self.telegram_id,
            self.username,
            self.balance,
            self.referred_by,
            referrals,
            withdrawals,
            self.origin_token,
            parse_timestamp(&self.joined)?,
        )
    }
}

const ACCOUNT_COLUMNS: &str = "telegram_id, username, balance, referred_by, referrals, withdrawals, origin_token, joined";

fn row_to_account_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        telegram_id: row.get(0)?,
        username: row.get(1)?,
        balance: row.get(2)?,
        referred_by: row.get(3)?,
        referrals_json: row.get(4)?,
        withdrawals_json: row.get(5)?,
        origin_token: row.get(6)?,
        joined: row.get(7)?,
    })
}

fn read_account(conn: &Connection, telegram_id: i64) -> AppResult<Option<Account>> {
    let row = conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE telegram_id = ?1"),
            params![telegram_id],
            row_to_account_row,
        )
        .optional()?;
    row.map(AccountRow::into_account).transpose()
}

/// Fetch an account by telegram id.
pub fn get_account(conn: &DbConnection, telegram_id: i64) -> AppResult<Option<Account>> {
    read_account(conn, telegram_id)
}

/// Fetch an account by username (used by the admin /setbalance command).
pub fn find_account_by_username(conn: &DbConnection, username: &str) -> AppResult<Option<Account>> {
    let row = conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            row_to_account_row,
        )
        .optional()?;
    row.map(AccountRow::into_account).transpose()
}

/// Upsert the full account record, both JSON copies included.
fn write_account(conn: &Connection, account: &Account) -> AppResult<()> {
    let referrals = serde_json::to_string(&account.referrals)?;
    let withdrawals = serde_json::to_string(&account.withdrawals)?;
    conn.execute(
        "INSERT OR REPLACE INTO users (telegram_id, username, balance, referred_by, referrals, withdrawals, origin_token, joined)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            account.telegram_id,
            account.username,
            account.balance(),
            account.referred_by,
            referrals,
            withdrawals,
            account.origin_token,
            account.joined.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Duplicate-origin scan: has any account already registered with this
/// anti-abuse token?
fn origin_token_seen(conn: &Connection, token: &str) -> AppResult<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users WHERE origin_token = ?1", params![token], |row| {
        row.get(0)
    })?;
    Ok(count > 0)
}

/// Register a user, crediting the referrer when the rules allow it.
///
/// Everything — the existence check, the referrer lookup, the duplicate-origin
/// scan, and both writes — happens inside one transaction, so two concurrent
/// /start taps can't open the account twice or pay the bonus twice.
pub fn register(conn: &mut DbConnection, req: &RegistrationRequest) -> AppResult<RegistrationOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing = read_account(&tx, req.telegram_id)?;
    let referrer = match req.ref_code.filter(|&code| code != req.telegram_id) {
        Some(code) => read_account(&tx, code)?,
        None => None,
    };
    let token_seen = origin_token_seen(&tx, &req.origin_token)?;

    let outcome = decide_registration(
        existing.as_ref(),
        req,
        referrer.as_ref(),
        token_seen,
        *rewards::SIGNUP_BONUS,
        *rewards::REFERRAL_BONUS,
    );

    if let RegistrationOutcome::Created { account, credited_referrer } = &outcome {
        write_account(&tx, account)?;
        if let Some(referrer) = credited_referrer {
            write_account(&tx, referrer)?;
        }
    }

    tx.commit()?;
    Ok(outcome)
}

/// Finalize a withdrawal: debit the fixed amount and record the `pending`
/// request in both storage locations.
///
/// The account is re-read inside the transaction and the ledger re-validates
/// it, so a balance spent (or a withdrawal queued) since the /withdraw
/// eligibility check is caught here.
pub fn submit_withdrawal(
    conn: &mut DbConnection,
    user_id: i64,
    phone: &str,
    network: &str,
) -> AppResult<Result<Withdrawal, RewardError>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(account) = read_account(&tx, user_id)? else {
        return Ok(Err(RewardError::NotRegistered));
    };

    match complete_withdrawal(
        &account,
        phone,
        network,
        *rewards::WITHDRAWAL_AMOUNT,
        *rewards::MIN_WITHDRAWAL,
        Utc::now(),
    ) {
        Ok((updated, withdrawal)) => {
            write_account(&tx, &updated)?;
            tx.execute(
                "INSERT INTO withdrawals (id, user_id, amount, phone, network, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    withdrawal.id,
                    withdrawal.user_id,
                    withdrawal.amount,
                    withdrawal.phone,
                    withdrawal.network,
                    withdrawal.status.as_str(),
                    withdrawal.created_at.to_rfc3339(),
                ],
            )?;
            tx.commit()?;
            Ok(Ok(withdrawal))
        }
        Err(denial) => Ok(Err(denial)),
    }
}

fn row_to_withdrawal(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, i64, i64, String, String, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn withdrawal_from_parts(parts: (String, i64, i64, String, String, String, String)) -> AppResult<Withdrawal> {
    let (id, user_id, amount, phone, network, status, created_at) = parts;
    Ok(Withdrawal {
        id,
        user_id,
        amount,
        phone,
        network,
        status: WithdrawalStatus::parse(&status)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

const WITHDRAWAL_COLUMNS: &str = "id, user_id, amount, phone, network, status, created_at";

/// Fetch a single withdrawal from the global index.
pub fn get_withdrawal(conn: &DbConnection, id: &str) -> AppResult<Option<Withdrawal>> {
    let row = conn
        .query_row(
            &format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = ?1"),
            params![id],
            row_to_withdrawal,
        )
        .optional()?;
    row.map(withdrawal_from_parts).transpose()
}

/// All withdrawals awaiting admin settlement, oldest first.
pub fn list_pending_withdrawals(conn: &DbConnection) -> AppResult<Vec<Withdrawal>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE status = 'pending' ORDER BY created_at ASC"
    ))?;
    let rows = stmt.query_map([], row_to_withdrawal)?;

    let mut withdrawals = Vec::new();
    for row in rows {
        withdrawals.push(withdrawal_from_parts(row?)?);
    }
    Ok(withdrawals)
}

/// Result of the admin mark-paid action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkPaidResult {
    /// No withdrawal with that id
    NotFound,
    /// Already paid — idempotent no-op
    AlreadyPaid,
    /// Transitioned to paid; notify the user
    Paid(Withdrawal),
}

/// Transition a withdrawal `pending → paid` in both storage locations.
///
/// Idempotent: marking an already-paid withdrawal again is a no-op. Only the
/// status moves; the balance was debited when the request was made.
pub fn mark_withdrawal_paid(conn: &mut DbConnection, id: &str) -> AppResult<MarkPaidResult> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let row = tx
        .query_row(
            &format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = ?1"),
            params![id],
            row_to_withdrawal,
        )
        .optional()?;
    let Some(withdrawal) = row.map(withdrawal_from_parts).transpose()? else {
        return Ok(MarkPaidResult::NotFound);
    };

    let paid = match decide_mark_paid(&withdrawal) {
        MarkPaidOutcome::AlreadyPaid => return Ok(MarkPaidResult::AlreadyPaid),
        MarkPaidOutcome::Transitioned(paid) => paid,
    };

    tx.execute("UPDATE withdrawals SET status = 'paid' WHERE id = ?1", params![id])?;

    // Keep the denormalized copy on the account in step.
    if let Some(mut account) = read_account(&tx, paid.user_id)? {
        for w in &mut account.withdrawals {
            if w.id == paid.id {
                w.status = WithdrawalStatus::Paid;
            }
        }
        write_account(&tx, &account)?;
    }

    tx.commit()?;
    Ok(MarkPaidResult::Paid(paid))
}

/// Admin override for an account balance. Negative amounts are rejected so
/// the ledger invariant survives operator typos.
pub fn set_balance(conn: &mut DbConnection, username: &str, amount: i64) -> AppResult<Option<Account>> {
    if amount < 0 {
        return Err(AppError::Validation(format!("refusing to set negative balance {amount}")));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let updated = tx
        .execute("UPDATE users SET balance = ?1 WHERE username = ?2", params![amount, username])?;
    if updated == 0 {
        return Ok(None);
    }
    let account = tx
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            row_to_account_row,
        )
        .optional()?
        .map(AccountRow::into_account)
        .transpose()?;
    tx.commit()?;
    Ok(account)
}
