//! End-to-end ledger scenarios through the storage layer
//!
//! Drives registration, the referral bonus, the withdrawal conversation, and
//! admin settlement against a scratch SQLite store, checking the ledger
//! invariants after every step.

use chrono::Utc;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use teloxide::types::{ChatId, UserId};

use refearn::ledger::rules::{check_withdrawal, RegistrationOutcome, RegistrationRequest, RewardError};
use refearn::ledger::{SessionStore, WithdrawFlow, WithdrawalStatus};
use refearn::storage::db::{self, MarkPaidResult};
use refearn::storage::{create_pool, get_connection, DbPool};

const SIGNUP_BONUS: i64 = 50;
const MIN_WITHDRAWAL: i64 = 350;
const WITHDRAWAL_AMOUNT: i64 = 350;

fn scratch_pool() -> (TempDir, DbPool) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flow.sqlite");
    let pool = create_pool(path.to_str().unwrap()).unwrap();
    (dir, pool)
}

fn start(id: i64, username: &str, ref_code: Option<i64>) -> RegistrationRequest {
    RegistrationRequest {
        telegram_id: id,
        username: Some(username.to_string()),
        ref_code,
        origin_token: id.to_string(),
        joined: Utc::now(),
    }
}

#[test]
fn referral_chain_and_origin_guard() {
    let (_dir, pool) = scratch_pool();
    let mut conn = get_connection(&pool).unwrap();

    // U1 starts with no ref code
    let outcome = db::register(&mut conn, &start(1, "u1", None)).unwrap();
    assert!(matches!(outcome, RegistrationOutcome::Created { .. }));
    let u1 = db::get_account(&conn, 1).unwrap().unwrap();
    assert_eq!(u1.balance(), SIGNUP_BONUS);
    assert!(u1.referrals.is_empty());

    // Duplicate tap: nothing changes, nobody is re-awarded
    let outcome = db::register(&mut conn, &start(1, "u1", None)).unwrap();
    assert_eq!(outcome, RegistrationOutcome::AlreadyRegistered);
    assert_eq!(db::get_account(&conn, 1).unwrap().unwrap().balance(), SIGNUP_BONUS);

    // U2 starts with U1's code, fresh origin
    db::register(&mut conn, &start(2, "u2", Some(1))).unwrap();
    let u1 = db::get_account(&conn, 1).unwrap().unwrap();
    let u2 = db::get_account(&conn, 2).unwrap().unwrap();
    assert_eq!(u2.balance(), SIGNUP_BONUS);
    assert_eq!(u2.referred_by, Some(1));
    assert_eq!(u1.balance(), SIGNUP_BONUS + 50);
    assert_eq!(u1.referrals, vec!["u2".to_string()]);

    // U3 arrives through U1's link but from U2's origin: registered, no bonus
    let mut dup = start(3, "u3", Some(1));
    dup.origin_token = "2".to_string();
    db::register(&mut conn, &dup).unwrap();
    let u1 = db::get_account(&conn, 1).unwrap().unwrap();
    assert_eq!(db::get_account(&conn, 3).unwrap().unwrap().balance(), SIGNUP_BONUS);
    assert_eq!(u1.balance(), SIGNUP_BONUS + 50);
    assert_eq!(u1.referrals.len(), 1);

    // Self-referral never pays
    db::register(&mut conn, &start(4, "u4", Some(4))).unwrap();
    let u4 = db::get_account(&conn, 4).unwrap().unwrap();
    assert_eq!(u4.balance(), SIGNUP_BONUS);
    assert_eq!(u4.referred_by, None);
}

#[test]
fn withdrawal_conversation_end_to_end() {
    let (_dir, pool) = scratch_pool();
    let mut conn = get_connection(&pool).unwrap();
    let sessions = SessionStore::new();
    let chat = ChatId(10);
    let user = UserId(10);

    db::register(&mut conn, &start(10, "payout", None)).unwrap();

    // balance 300 < 350: denied with the specific reason, no state change
    db::set_balance(&mut conn, "payout", 300).unwrap();
    let account = db::get_account(&conn, 10).unwrap();
    assert_eq!(
        check_withdrawal(account.as_ref(), MIN_WITHDRAWAL),
        Err(RewardError::BelowMinimumWithdrawal { minimum: MIN_WITHDRAWAL })
    );
    assert_eq!(db::get_account(&conn, 10).unwrap().unwrap().balance(), 300);

    // balance 400, no pending: the conversation runs phone -> network
    db::set_balance(&mut conn, "payout", 400).unwrap();
    let account = db::get_account(&conn, 10).unwrap();
    assert_eq!(check_withdrawal(account.as_ref(), MIN_WITHDRAWAL), Ok(()));

    sessions.begin(chat, user);
    assert_eq!(sessions.take(chat, user), Some(WithdrawFlow::AwaitingPhone));
    sessions.set(chat, user, WithdrawFlow::AwaitingNetwork { phone: "08001234567".into() });
    let Some(WithdrawFlow::AwaitingNetwork { phone }) = sessions.take(chat, user) else {
        panic!("conversation state lost");
    };

    let withdrawal = db::submit_withdrawal(&mut conn, 10, &phone, "MTN").unwrap().unwrap();
    assert_eq!(withdrawal.amount, WITHDRAWAL_AMOUNT);
    assert_eq!(withdrawal.phone, "08001234567");
    assert_eq!(withdrawal.network, "MTN");
    assert_eq!(withdrawal.status, WithdrawalStatus::Pending);

    // Conversation is over; nothing left in the session store
    assert_eq!(sessions.take(chat, user), None);

    // 400 - 350 = 50, and both storage locations carry the same record
    let account = db::get_account(&conn, 10).unwrap().unwrap();
    assert_eq!(account.balance(), 50);
    assert_eq!(account.withdrawals, vec![withdrawal.clone()]);
    assert_eq!(db::get_withdrawal(&conn, &withdrawal.id).unwrap().unwrap(), withdrawal);
    assert_eq!(db::list_pending_withdrawals(&conn).unwrap(), vec![withdrawal.clone()]);

    // A second /withdraw is rejected while one is pending
    let account = db::get_account(&conn, 10).unwrap();
    assert_eq!(
        check_withdrawal(account.as_ref(), MIN_WITHDRAWAL),
        Err(RewardError::PendingWithdrawalExists)
    );

    // Admin settles it: status flips everywhere, balance untouched
    let result = db::mark_withdrawal_paid(&mut conn, &withdrawal.id).unwrap();
    let MarkPaidResult::Paid(paid) = result else {
        panic!("expected the withdrawal to transition");
    };
    assert_eq!(paid.status, WithdrawalStatus::Paid);

    let account = db::get_account(&conn, 10).unwrap().unwrap();
    assert_eq!(account.balance(), 50);
    assert_eq!(account.withdrawals[0].status, WithdrawalStatus::Paid);
    assert!(db::list_pending_withdrawals(&conn).unwrap().is_empty());

    // Settling again is a no-op
    assert_eq!(db::mark_withdrawal_paid(&mut conn, &withdrawal.id).unwrap(), MarkPaidResult::AlreadyPaid);

    // With the pending one settled, the user can withdraw again once funded
    db::set_balance(&mut conn, "payout", 400).unwrap();
    let account = db::get_account(&conn, 10).unwrap();
    assert_eq!(check_withdrawal(account.as_ref(), MIN_WITHDRAWAL), Ok(()));
}

#[test]
fn balances_never_go_negative() {
    let (_dir, pool) = scratch_pool();
    let mut conn = get_connection(&pool).unwrap();

    db::register(&mut conn, &start(20, "careful", None)).unwrap();

    // The eligibility check passed earlier, but the balance was spent before
    // the conversation finished: the debit is refused, nothing is recorded.
    db::set_balance(&mut conn, "careful", 400).unwrap();
    db::submit_withdrawal(&mut conn, 20, "0800", "MTN").unwrap().unwrap();
    let withdrawal_id = db::get_account(&conn, 20).unwrap().unwrap().withdrawals[0].id.clone();
    db::mark_withdrawal_paid(&mut conn, &withdrawal_id).unwrap();

    db::set_balance(&mut conn, "careful", 100).unwrap();
    let denied = db::submit_withdrawal(&mut conn, 20, "0800", "MTN").unwrap();
    assert_eq!(denied, Err(RewardError::BelowMinimumWithdrawal { minimum: MIN_WITHDRAWAL }));

    let account = db::get_account(&conn, 20).unwrap().unwrap();
    assert!(account.balance() >= 0);
    assert_eq!(account.balance(), 100);
    assert_eq!(account.withdrawals.len(), 1);
}

#[test]
fn bystander_in_a_group_cannot_continue_someone_elses_flow() {
    let (_dir, pool) = scratch_pool();
    let mut conn = get_connection(&pool).unwrap();
    let sessions = SessionStore::new();
    let group = ChatId(-100500);
    let alice = UserId(30);
    let bob = UserId(31);

    // Alice is funded and mid-conversation; Bob never ran /withdraw and
    // holds only the signup bonus.
    db::register(&mut conn, &start(30, "alice", None)).unwrap();
    db::register(&mut conn, &start(31, "bob", None)).unwrap();
    db::set_balance(&mut conn, "alice", 400).unwrap();
    sessions.begin(group, alice);

    // Bob's text in the group finds no flow of his own.
    assert_eq!(sessions.take(group, bob), None);

    // Even if Bob somehow reached submission, the ledger re-checks him.
    let denied = db::submit_withdrawal(&mut conn, 31, "0800", "MTN").unwrap();
    assert_eq!(denied, Err(RewardError::BelowMinimumWithdrawal { minimum: MIN_WITHDRAWAL }));
    assert_eq!(db::get_account(&conn, 31).unwrap().unwrap().balance(), SIGNUP_BONUS);

    // Alice's conversation is intact and completes normally.
    assert_eq!(sessions.take(group, alice), Some(WithdrawFlow::AwaitingPhone));
    sessions.set(group, alice, WithdrawFlow::AwaitingNetwork { phone: "0700".into() });
    let Some(WithdrawFlow::AwaitingNetwork { phone }) = sessions.take(group, alice) else {
        panic!("conversation state lost");
    };
    let withdrawal = db::submit_withdrawal(&mut conn, 30, &phone, "Glo").unwrap().unwrap();
    assert_eq!(withdrawal.user_id, 30);
    assert_eq!(db::get_account(&conn, 30).unwrap().unwrap().balance(), 50);
}

#[test]
fn unknown_user_cannot_withdraw() {
    let (_dir, pool) = scratch_pool();
    let mut conn = get_connection(&pool).unwrap();

    assert_eq!(check_withdrawal(None, MIN_WITHDRAWAL), Err(RewardError::NotRegistered));
    let denied = db::submit_withdrawal(&mut conn, 999, "0800", "MTN").unwrap();
    assert_eq!(denied, Err(RewardError::NotRegistered));
}
