//! Reward ledger decision rules
//!
//! Pure functions from current account state to new account state plus the
//! outbound reply. No I/O happens here; the storage layer reads the inputs,
//! calls these, and writes the results inside one transaction.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::account::{Account, Withdrawal, WithdrawalStatus};
use crate::core::config::rewards;

/// User-facing denials. These are recovered locally and turned into a chat
/// reply; none of them is fatal to the running service. "Already registered"
/// is deliberately absent: repeated registration is a success-idempotent
/// no-op, not an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewardError {
    #[error("user is not registered")]
    NotRegistered,
    #[error("balance does not cover the withdrawal amount")]
    InsufficientBalance,
    #[error("balance is below the minimum withdrawal of {minimum}")]
    BelowMinimumWithdrawal { minimum: i64 },
    #[error("a pending withdrawal already exists")]
    PendingWithdrawalExists,
    #[error("user is not a member of the required group")]
    NotGroupMember { group: String },
    #[error("group membership could not be verified")]
    MembershipCheckUnavailable,
    #[error("not authorized")]
    Unauthorized,
}

impl RewardError {
    /// The plain-text reply shown to the user.
    pub fn user_message(&self) -> String {
        let currency = rewards::CURRENCY.as_str();
        match self {
            RewardError::NotRegistered => "You are not registered. Use /start.".to_string(),
            RewardError::InsufficientBalance => "❌ Your balance no longer covers the withdrawal amount.".to_string(),
            RewardError::BelowMinimumWithdrawal { minimum } => {
                format!("Minimum {currency}{minimum} required to withdraw.")
            }
            RewardError::PendingWithdrawalExists => {
                "⏳ You already have a withdrawal awaiting approval. Please wait for it to be settled.".to_string()
            }
            RewardError::NotGroupMember { group } => {
                format!("❌ Please join our group first: https://t.me/{}", group.trim_start_matches('@'))
            }
            RewardError::MembershipCheckUnavailable => {
                "⚠️ We could not verify your group membership right now. Please try again later.".to_string()
            }
            RewardError::Unauthorized => "❌ You are not allowed to do that.".to_string(),
        }
    }
}

/// Input to [`decide_registration`], extracted from the /start message.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub telegram_id: i64,
    pub username: Option<String>,
    /// Referral code from the deep-link argument, already parsed to an id.
    pub ref_code: Option<i64>,
    /// Anti-abuse fingerprint of the registration origin.
    pub origin_token: String,
    pub joined: DateTime<Utc>,
}

impl RegistrationRequest {
    fn display_name(&self) -> String {
        self.username.clone().unwrap_or_else(|| self.telegram_id.to_string())
    }
}

/// Result of a registration decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// An account for this id already exists. Nothing changes, nobody is
    /// re-credited.
    AlreadyRegistered,
    /// A new account was opened. `credited_referrer` carries the updated
    /// referrer record when the referral bonus was granted.
    Created {
        account: Account,
        credited_referrer: Option<Account>,
    },
}

/// Decides what a /start does.
///
/// * Registration is idempotent: an existing account short-circuits to
///   [`RegistrationOutcome::AlreadyRegistered`].
/// * Self-referral (`ref_code == own id`) is ignored.
/// * An unknown referral code silently no-ops — the account is still created.
/// * `origin_token_seen` is the result of the duplicate-origin scan; when the
///   token was already used, the referrer credit is skipped but registration
///   still succeeds.
pub fn decide_registration(
    existing: Option<&Account>,
    req: &RegistrationRequest,
    referrer: Option<&Account>,
    origin_token_seen: bool,
    signup_bonus: i64,
    referral_bonus: i64,
) -> RegistrationOutcome {
    if existing.is_some() {
        return RegistrationOutcome::AlreadyRegistered;
    }

    let ref_code = req.ref_code.filter(|&code| code != req.telegram_id);

    let account = Account::open(
        req.telegram_id,
        req.username.clone(),
        ref_code,
        req.origin_token.clone(),
        signup_bonus,
        req.joined,
    );

    let credited_referrer = match (ref_code, referrer) {
        (Some(code), Some(referrer)) if referrer.telegram_id == code && !origin_token_seen => {
            let mut updated = referrer.clone();
            updated.credit(referral_bonus);
            updated.referrals.push(req.display_name());
            Some(updated)
        }
        _ => None,
    };

    RegistrationOutcome::Created { account, credited_referrer }
}

/// Eligibility check for the /withdraw entry point.
///
/// Each failure names the specific reason so the reply can state it.
pub fn check_withdrawal(account: Option<&Account>, minimum: i64) -> Result<(), RewardError> {
    let account = account.ok_or(RewardError::NotRegistered)?;
    if account.balance() < minimum {
        return Err(RewardError::BelowMinimumWithdrawal { minimum });
    }
    if account.has_pending_withdrawal() {
        return Err(RewardError::PendingWithdrawalExists);
    }
    Ok(())
}

/// Finalizes a withdrawal once phone and network are collected.
///
/// Re-runs the full eligibility check against the freshly-read account — the
/// check at /withdraw time may have been raced by a duplicate tap, and the
/// minimum-balance gate must hold for whoever actually finishes the
/// conversation — then debits the fixed amount and appends the new `pending`
/// record.
pub fn complete_withdrawal(
    account: &Account,
    phone: &str,
    network: &str,
    amount: i64,
    minimum: i64,
    now: DateTime<Utc>,
) -> Result<(Account, Withdrawal), RewardError> {
    check_withdrawal(Some(account), minimum)?;

    let mut updated = account.clone();
    if !updated.debit(amount) {
        return Err(RewardError::InsufficientBalance);
    }

    let withdrawal = Withdrawal {
        id: Uuid::new_v4().to_string(),
        user_id: account.telegram_id,
        amount,
        phone: phone.trim().to_string(),
        network: network.trim().to_string(),
        status: WithdrawalStatus::Pending,
        created_at: now,
    };
    updated.withdrawals.push(withdrawal.clone());

    Ok((updated, withdrawal))
}

/// Result of the admin "mark paid" decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkPaidOutcome {
    /// The withdrawal transitions `pending → paid`; the user gets notified.
    Transitioned(Withdrawal),
    /// Already paid — a no-op, not an error, and no second notification.
    AlreadyPaid,
}

/// Decides the `pending → paid` transition. The debit already happened at
/// request time, so this only ever touches status, never balance.
pub fn decide_mark_paid(withdrawal: &Withdrawal) -> MarkPaidOutcome {
    match withdrawal.status {
        WithdrawalStatus::Paid => MarkPaidOutcome::AlreadyPaid,
        WithdrawalStatus::Pending => {
            let mut paid = withdrawal.clone();
            paid.status = WithdrawalStatus::Paid;
            MarkPaidOutcome::Transitioned(paid)
        }
    }
}
