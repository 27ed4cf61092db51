//! Best-effort user notifications
//!
//! Delivery failures are logged and swallowed. A notification must never roll
//! back the state transition that triggered it.

use teloxide::prelude::*;

use crate::core::config::rewards;

/// Tell a referrer their bonus landed.
pub async fn notify_referral_credit(bot: &Bot, referrer_id: i64, new_user: &str) {
    let currency = rewards::CURRENCY.as_str();
    let bonus = *rewards::REFERRAL_BONUS;
    let text = format!("🎉 {new_user} joined with your link! {currency}{bonus} has been added to your balance.");

    if let Err(e) = bot.send_message(ChatId(referrer_id), text).await {
        log::warn!("Failed to notify referrer {}: {}", referrer_id, e);
    }
}

/// Tell a user their withdrawal was settled.
pub async fn notify_withdrawal_paid(bot: &Bot, user_id: i64, amount: i64) {
    let currency = rewards::CURRENCY.as_str();
    let text = format!("✅ Your withdrawal of {currency}{amount} has been approved and marked as PAID.");

    if let Err(e) = bot.send_message(ChatId(user_id), text).await {
        log::warn!("Failed to notify user {} about payout: {}", user_id, e);
    } else {
        log::info!("Payout notification sent to user {}", user_id);
    }
}
