//! Account and withdrawal records
//!
//! These are the persisted shapes of the reward ledger. Field invariants are
//! enforced here (non-negative balance, withdrawals only ever appended) so
//! the storage layer and the handlers can't construct an inconsistent record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{AppError, AppResult};

/// Status of a withdrawal request.
///
/// `Pending` is set at creation; only the admin dashboard moves it to `Paid`.
/// Records are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Paid,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "paid" => Ok(WithdrawalStatus::Paid),
            other => Err(AppError::Validation(format!("unknown withdrawal status: {other}"))),
        }
    }
}

/// A single withdrawal request.
///
/// Stored twice: as a row in the global `withdrawals` table (keyed by `id`)
/// and inside the owning account's denormalized withdrawal list. Every
/// mutation updates both copies in one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: String,
    pub user_id: i64,
    pub amount: i64,
    pub phone: String,
    pub network: String,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn is_pending(&self) -> bool {
        self.status == WithdrawalStatus::Pending
    }
}

/// Per-user ledger record.
///
/// `balance` is private: all changes go through [`Account::credit`] and
/// [`Account::debit`], which keep it non-negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub telegram_id: i64,
    pub username: Option<String>,
    balance: i64,
    pub referred_by: Option<i64>,
    pub referrals: Vec<String>,
    pub withdrawals: Vec<Withdrawal>,
    /// Weak per-origin fingerprint used to rate-limit referral bonuses.
    pub origin_token: String,
    pub joined: DateTime<Utc>,
}

impl Account {
    /// Opens a new account with the signup bonus. Called exactly once per
    /// user, on first successful /start.
    pub fn open(
        telegram_id: i64,
        username: Option<String>,
        referred_by: Option<i64>,
        origin_token: String,
        signup_bonus: i64,
        joined: DateTime<Utc>,
    ) -> Self {
        Self {
            telegram_id,
            username,
            balance: signup_bonus.max(0),
            referred_by,
            referrals: Vec::new(),
            withdrawals: Vec::new(),
            origin_token,
            joined,
        }
    }

    /// Rebuilds an account from its persisted parts.
    ///
    /// # Errors
    /// Returns a validation error if the stored balance is negative, which
    /// would mean the store was modified outside the ledger.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        telegram_id: i64,
        username: Option<String>,
        balance: i64,
        referred_by: Option<i64>,
        referrals: Vec<String>,
        withdrawals: Vec<Withdrawal>,
        origin_token: String,
        joined: DateTime<Utc>,
    ) -> AppResult<Self> {
        if balance < 0 {
            return Err(AppError::Validation(format!(
                "account {telegram_id} has negative balance {balance}"
            )));
        }
        Ok(Self {
            telegram_id,
            username,
            balance,
            referred_by,
            referrals,
            withdrawals,
            origin_token,
            joined,
        })
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Display name used in referral lists: username when available,
    /// otherwise the numeric id.
    pub fn display_name(&self) -> String {
        self.username.clone().unwrap_or_else(|| self.telegram_id.to_string())
    }

    /// Credits the balance. Non-positive amounts are ignored.
    pub fn credit(&mut self, amount: i64) {
        if amount > 0 {
            self.balance += amount;
        }
    }

    /// Debits the balance, refusing to go negative.
    ///
    /// Returns `false` (and leaves the balance untouched) when the account
    /// cannot cover `amount`.
    #[must_use]
    pub fn debit(&mut self, amount: i64) -> bool {
        if amount < 0 || amount > self.balance {
            return false;
        }
        self.balance -= amount;
        true
    }

    /// True if the account already has a withdrawal awaiting settlement.
    pub fn has_pending_withdrawal(&self) -> bool {
        self.withdrawals.iter().any(Withdrawal::is_pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(balance: i64) -> Account {
        Account::open(1, Some("alice".into()), None, "1".into(), balance, Utc::now())
    }

    #[test]
    fn test_open_starts_with_signup_bonus() {
        let acc = account(50);
        assert_eq!(acc.balance(), 50);
        assert!(acc.referrals.is_empty());
        assert!(acc.withdrawals.is_empty());
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let mut acc = account(100);
        assert!(!acc.debit(150));
        assert_eq!(acc.balance(), 100);
        assert!(acc.debit(100));
        assert_eq!(acc.balance(), 0);
        assert!(!acc.debit(1));
    }

    #[test]
    fn test_credit_ignores_non_positive_amounts() {
        let mut acc = account(10);
        acc.credit(-5);
        acc.credit(0);
        assert_eq!(acc.balance(), 10);
    }

    #[test]
    fn test_from_parts_rejects_negative_balance() {
        let res = Account::from_parts(1, None, -1, None, vec![], vec![], "1".into(), Utc::now());
        assert!(res.is_err());
    }

    #[test]
    fn test_has_pending_withdrawal() {
        let mut acc = account(400);
        assert!(!acc.has_pending_withdrawal());
        acc.withdrawals.push(Withdrawal {
            id: "w1".into(),
            user_id: 1,
            amount: 350,
            phone: "0800".into(),
            network: "MTN".into(),
            status: WithdrawalStatus::Paid,
            created_at: Utc::now(),
        });
        assert!(!acc.has_pending_withdrawal());
        acc.withdrawals.push(Withdrawal {
            id: "w2".into(),
            user_id: 1,
            amount: 350,
            phone: "0800".into(),
            network: "MTN".into(),
            status: WithdrawalStatus::Pending,
            created_at: Utc::now(),
        });
        assert!(acc.has_pending_withdrawal());
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let named = account(0);
        assert_eq!(named.display_name(), "alice");
        let unnamed = Account::open(42, None, None, "42".into(), 0, Utc::now());
        assert_eq!(unnamed.display_name(), "42");
    }

    #[test]
    fn test_withdrawal_status_round_trip() {
        assert_eq!(WithdrawalStatus::parse("pending").unwrap(), WithdrawalStatus::Pending);
        assert_eq!(WithdrawalStatus::parse("paid").unwrap(), WithdrawalStatus::Paid);
        assert!(WithdrawalStatus::parse("settled").is_err());
    }
}
