//! Refearn - Telegram referral reward bot
//!
//! Users register with /start, earn a signup bonus, refer friends for a
//! fixed credit, and request payouts that are settled manually through a
//! small admin web dashboard.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging
//! - `ledger`: the reward ledger — account records, decision rules, and the
//!   withdrawal conversation state machine
//! - `storage`: SQLite-backed account store
//! - `telegram`: bot commands, dispatcher schema, notifications
//! - `web`: admin review dashboard

pub mod cli;
pub mod core;
pub mod ledger;
pub mod storage;
pub mod telegram;
pub mod web;

// Re-export commonly used types for convenience
pub use self::core::{config, AppError, AppResult};
pub use ledger::{Account, RewardError, SessionStore, Withdrawal, WithdrawalStatus};
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
pub use telegram::{create_bot, schema, HandlerDeps};
