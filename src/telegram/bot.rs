//! Bot initialization and the command set

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::core::config;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "I can:")]
pub enum Command {
    #[command(description = "register and claim your signup bonus")]
    Start,
    #[command(description = "check your balance and referral count")]
    Balance,
    #[command(description = "get your referral link")]
    Refer,
    #[command(description = "get your referral link")]
    Referrals,
    #[command(description = "request a payout")]
    Withdraw,
    #[command(description = "referral and withdrawal history")]
    History,
    #[command(description = "admin dashboard (admins only)")]
    Admin,
    #[command(description = "set a user's balance (admins only)", parse_with = "split")]
    Setbalance(String, i64),
}

/// Creates a Bot instance from the configured token
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - BOT_TOKEN missing
pub fn create_bot() -> anyhow::Result<Bot> {
    let token = config::BOT_TOKEN.as_str();
    if token.is_empty() {
        return Err(anyhow::anyhow!("BOT_TOKEN environment variable not set"));
    }
    Ok(Bot::new(token))
}

/// Sets up bot commands in the Telegram UI
///
/// Admin-only commands are left out of the public list.
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    use teloxide::types::BotCommand;

    bot.set_my_commands(vec![
        BotCommand::new("start", "register and claim your signup bonus"),
        BotCommand::new("balance", "check your balance and referral count"),
        BotCommand::new("refer", "get your referral link"),
        BotCommand::new("withdraw", "request a payout"),
        BotCommand::new("history", "referral and withdrawal history"),
    ])
    .await?;

    Ok(())
}

/// Deterministic referral deep link for a user.
///
/// `None` when the bot has no username — there is no valid deep link to
/// build, and a made-up one would point nowhere.
pub fn referral_link(bot_username: Option<&str>, telegram_id: i64) -> Option<String> {
    bot_username.map(|name| format!("https://t.me/{name}?start={telegram_id}"))
}

/// Deep-link payload of a /start message, e.g. "12345" in "/start 12345".
pub fn start_payload(text: &str) -> Option<&str> {
    text.split_whitespace().nth(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("/start", "testbot").unwrap(), Command::Start);

        let parsed = Command::parse("/setbalance alice 500", "testbot").unwrap();
        assert_eq!(parsed, Command::Setbalance("alice".to_string(), 500));

        assert_eq!(Command::parse("/balance", "testbot").unwrap(), Command::Balance);
        assert_eq!(Command::parse("/referrals", "testbot").unwrap(), Command::Referrals);
    }

    #[test]
    fn test_start_payload_extraction() {
        assert_eq!(start_payload("/start 12345"), Some("12345"));
        assert_eq!(start_payload("/start"), None);
        assert_eq!(start_payload("/start@testbot 7"), Some("7"));
    }

    #[test]
    fn test_referral_link_is_deterministic() {
        assert_eq!(
            referral_link(Some("earnbot"), 42).as_deref(),
            Some("https://t.me/earnbot?start=42")
        );
        assert_eq!(referral_link(Some("earnbot"), 42), referral_link(Some("earnbot"), 42));
    }

    #[test]
    fn test_referral_link_requires_a_bot_username() {
        assert_eq!(referral_link(None, 42), None);
    }
}
