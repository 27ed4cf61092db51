//! Telegram bot integration: commands, dispatcher schema, membership gate,
//! and outbound notifications.

pub mod bot;
pub mod commands;
pub mod handlers;
pub mod membership;
pub mod notifications;

pub use bot::{create_bot, referral_link, setup_bot_commands, Command};
pub use handlers::{schema, HandlerDeps, HandlerError};
