//! Reward ledger: account records, decision rules, and the withdrawal
//! conversation state machine.

pub mod account;
pub mod rules;
pub mod session;

pub use account::{Account, Withdrawal, WithdrawalStatus};
pub use rules::{
    check_withdrawal, complete_withdrawal, decide_mark_paid, decide_registration, MarkPaidOutcome,
    RegistrationOutcome, RegistrationRequest, RewardError,
};
pub use session::{SessionStore, WithdrawFlow};
