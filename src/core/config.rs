use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Configuration constants for the bot
/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: refearn.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "refearn.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: app.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "app.log".to_string()));

/// Telegram group the bot requires membership in before registration,
/// e.g. "@myearngroup". Empty disables the membership gate entirely.
pub static GROUP_USERNAME: Lazy<String> =
    Lazy::new(|| env::var("GROUP_USERNAME").unwrap_or_else(|_| String::new()));

/// Optional WhatsApp group link appended to the welcome message
pub static WHATSAPP_LINK: Lazy<Option<String>> = Lazy::new(|| env::var("WHATSAPP_LINK").ok());

/// Telegram ids allowed to run admin commands such as /setbalance.
/// Read from ADMIN_IDS as a comma-separated list of numeric ids.
pub static ADMIN_IDS: Lazy<Vec<i64>> = Lazy::new(|| {
    env::var("ADMIN_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<i64>().ok())
        .collect()
});

/// Returns true if the given telegram id is on the admin allow-list.
pub fn is_admin(telegram_id: i64) -> bool {
    ADMIN_IDS.contains(&telegram_id)
}

/// Reward amounts. Fixed per deployment; the withdrawal amount is not
/// user-chosen.
pub mod rewards {
    use super::{env, Lazy};

    /// Credit paid to a new account on first /start
    pub static SIGNUP_BONUS: Lazy<i64> = Lazy::new(|| amount_from_env("SIGNUP_BONUS", 50));

    /// Credit paid to the referrer when a referred account registers
    pub static REFERRAL_BONUS: Lazy<i64> = Lazy::new(|| amount_from_env("REFERRAL_BONUS", 50));

    /// Minimum balance required before /withdraw is accepted
    pub static MIN_WITHDRAWAL: Lazy<i64> = Lazy::new(|| amount_from_env("MIN_WITHDRAWAL", 350));

    /// Amount debited by every withdrawal
    pub static WITHDRAWAL_AMOUNT: Lazy<i64> = Lazy::new(|| amount_from_env("WITHDRAWAL_AMOUNT", 350));

    /// Currency symbol used in user-facing messages
    pub static CURRENCY: Lazy<String> = Lazy::new(|| env::var("CURRENCY").unwrap_or_else(|_| "₦".to_string()));

    fn amount_from_env(key: &str, default: i64) -> i64 {
        env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
    }
}

/// Withdrawal conversation configuration
pub mod session {
    use super::Duration;

    /// How long a half-finished withdrawal conversation is kept before it
    /// is discarded (in seconds)
    pub const EXPIRY_SECS: u64 = 600;

    /// Session expiry duration
    pub fn expiry() -> Duration {
        Duration::from_secs(EXPIRY_SECS)
    }
}

/// Admin dashboard configuration
pub mod web {
    use super::{env, Lazy};

    /// Port the dashboard listens on
    /// Read from WEB_PORT environment variable, default 3000
    pub static PORT: Lazy<u16> = Lazy::new(|| env::var("WEB_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(3000));

    /// Shared admin credential for the dashboard login form
    pub static ADMIN_USER: Lazy<String> = Lazy::new(|| env::var("ADMIN_USER").unwrap_or_else(|_| "admin".to_string()));
    pub static ADMIN_PASS: Lazy<String> = Lazy::new(|| env::var("ADMIN_PASS").unwrap_or_else(|_| String::new()));

    /// Dashboard session lifetime (in seconds)
    pub const SESSION_TTL_SECS: u64 = 3600;
}
