//! Command handlers
//!
//! Each handler reads the account state, asks the ledger what to do, persists
//! the outcome, and sends one reply. Denials become the specific user-facing
//! message from the taxonomy; infrastructure errors bubble to `dispatch`,
//! which logs them and sends a generic apology.

use chrono::Utc;
use teloxide::prelude::*;

use super::bot::{referral_link, start_payload, Command};
use super::handlers::HandlerDeps;
use super::membership;
use super::notifications::notify_referral_credit;
use crate::core::config::{self, rewards, web};
use crate::core::error::AppResult;
use crate::ledger::rules::{check_withdrawal, RegistrationOutcome, RegistrationRequest, RewardError};
use crate::ledger::WithdrawFlow;
use crate::storage::db;
use crate::storage::get_connection;

/// Routes a parsed command to its handler.
///
/// Any command aborts the sender's half-finished withdrawal conversation
/// first — only plain text continues the flow.
pub async fn dispatch(bot: &Bot, msg: &Message, cmd: Command, deps: &HandlerDeps) {
    if let Some(user) = msg.from.as_ref() {
        deps.sessions.clear(msg.chat.id, user.id);
    }

    let result = match cmd {
        Command::Start => handle_start(bot, msg, deps).await,
        Command::Balance => handle_balance(bot, msg, deps).await,
        Command::Refer | Command::Referrals => handle_refer(bot, msg, deps).await,
        Command::Withdraw => handle_withdraw(bot, msg, deps).await,
        Command::History => handle_history(bot, msg, deps).await,
        Command::Admin => handle_admin(bot, msg).await,
        Command::Setbalance(username, amount) => handle_setbalance(bot, msg, deps, &username, amount).await,
    };

    if let Err(e) = result {
        log::error!("Handler failed for chat {}: {}", msg.chat.id, e);
        let _ = bot
            .send_message(msg.chat.id, "⚠️ Something went wrong. Please try again later.")
            .await;
    }
}

fn sender_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok())
}

async fn handle_start(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> AppResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let Some(telegram_id) = sender_id(msg) else {
        return Ok(());
    };
    let ref_code = msg
        .text()
        .and_then(start_payload)
        .and_then(|arg| arg.parse::<i64>().ok());

    // One-time group membership gate before any reward action
    let gate = membership::check_group_membership(bot, user.id).await;
    if let Err(denial) = membership::gate_allows(gate) {
        bot.send_message(msg.chat.id, denial.user_message()).await?;
        return Ok(());
    }

    let req = RegistrationRequest {
        telegram_id,
        username: user.username.clone(),
        ref_code,
        // Stand-in fingerprint: the registering user's own id
        origin_token: telegram_id.to_string(),
        joined: Utc::now(),
    };

    let mut conn = get_connection(&deps.db_pool)?;
    match db::register(&mut conn, &req)? {
        RegistrationOutcome::AlreadyRegistered => {
            bot.send_message(msg.chat.id, "✅ You are already registered.").await?;
        }
        RegistrationOutcome::Created { account, credited_referrer } => {
            let currency = rewards::CURRENCY.as_str();
            let bonus = *rewards::SIGNUP_BONUS;
            let mut text = format!(
                "🎉 Welcome, {}! You've received {currency}{bonus} for joining.",
                user.first_name
            );
            if let Some(link) = config::WHATSAPP_LINK.as_ref() {
                text.push_str(&format!("\n\n📱 Join our WhatsApp group: {link}"));
            }
            bot.send_message(msg.chat.id, text).await?;

            if let Some(referrer) = credited_referrer {
                let bot = bot.clone();
                let new_user = account.display_name();
                tokio::spawn(async move {
                    notify_referral_credit(&bot, referrer.telegram_id, &new_user).await;
                });
            }
        }
    }

    Ok(())
}

async fn handle_balance(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> AppResult<()> {
    let Some(telegram_id) = sender_id(msg) else {
        return Ok(());
    };

    let conn = get_connection(&deps.db_pool)?;
    let reply = match db::get_account(&conn, telegram_id)? {
        Some(account) => format!(
            "💰 Balance: {}{}\n👥 Referrals: {}",
            rewards::CURRENCY.as_str(),
            account.balance(),
            account.referrals.len()
        ),
        None => RewardError::NotRegistered.user_message(),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_refer(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> AppResult<()> {
    let Some(telegram_id) = sender_id(msg) else {
        return Ok(());
    };

    let conn = get_connection(&deps.db_pool)?;
    let reply = match db::get_account(&conn, telegram_id)? {
        Some(account) => {
            let link_line = match referral_link(deps.bot_username.as_deref(), telegram_id) {
                Some(link) => format!("🔗 Your referral link:\n{link}"),
                None => "⚠️ Referral links are unavailable right now. Please try again later.".to_string(),
            };
            let names = if account.referrals.is_empty() {
                "No one yet".to_string()
            } else {
                account.referrals.join("\n")
            };
            format!("{link_line}\n\n👥 Referrals:\n{names}")
        }
        None => RewardError::NotRegistered.user_message(),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_withdraw(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> AppResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let Some(telegram_id) = sender_id(msg) else {
        return Ok(());
    };

    let conn = get_connection(&deps.db_pool)?;
    let account = db::get_account(&conn, telegram_id)?;

    match check_withdrawal(account.as_ref(), *rewards::MIN_WITHDRAWAL) {
        Ok(()) => {
            deps.sessions.begin(msg.chat.id, user.id);
            bot.send_message(msg.chat.id, "📱 Enter your phone number to withdraw:").await?;
        }
        Err(denial) => {
            bot.send_message(msg.chat.id, denial.user_message()).await?;
        }
    }
    Ok(())
}

async fn handle_history(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> AppResult<()> {
    let Some(telegram_id) = sender_id(msg) else {
        return Ok(());
    };

    let conn = get_connection(&deps.db_pool)?;
    let reply = match db::get_account(&conn, telegram_id)? {
        Some(account) => {
            let currency = rewards::CURRENCY.as_str();
            let refs = if account.referrals.is_empty() {
                "No referrals yet".to_string()
            } else {
                account.referrals.join("\n")
            };
            let wds = if account.withdrawals.is_empty() {
                "No withdrawals yet".to_string()
            } else {
                account
                    .withdrawals
                    .iter()
                    .map(|w| format!("• {currency}{} to {} ({}) - {}", w.amount, w.phone, w.network, w.status.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            format!("👥 Referral History:\n{refs}\n\n💸 Withdrawal History:\n{wds}")
        }
        None => RewardError::NotRegistered.user_message(),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_admin(bot: &Bot, msg: &Message) -> AppResult<()> {
    let Some(telegram_id) = sender_id(msg) else {
        return Ok(());
    };

    let reply = if config::is_admin(telegram_id) {
        format!("🛠 Admin dashboard is served on port {}.", *web::PORT)
    } else {
        RewardError::Unauthorized.user_message()
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_setbalance(bot: &Bot, msg: &Message, deps: &HandlerDeps, username: &str, amount: i64) -> AppResult<()> {
    let Some(telegram_id) = sender_id(msg) else {
        return Ok(());
    };

    if !config::is_admin(telegram_id) {
        bot.send_message(msg.chat.id, RewardError::Unauthorized.user_message()).await?;
        return Ok(());
    }

    if amount < 0 {
        bot.send_message(msg.chat.id, "❌ Balance cannot be negative.").await?;
        return Ok(());
    }

    let mut conn = get_connection(&deps.db_pool)?;
    let reply = match db::set_balance(&mut conn, username, amount)? {
        Some(account) => format!(
            "✅ Balance for {} set to {}{}.",
            account.display_name(),
            rewards::CURRENCY.as_str(),
            account.balance()
        ),
        None => format!("❌ No registered user named {username}."),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

/// Free-text continuation of the withdrawal conversation.
///
/// Text outside a flow is ignored — this bot only speaks in commands. The
/// flow is looked up by chat *and* sender, so in a group chat a bystander's
/// message can't advance (or hijack) someone else's withdrawal.
pub async fn handle_text(bot: &Bot, msg: &Message, deps: &HandlerDeps) {
    let Some(text) = msg.text() else {
        return;
    };
    let Some(user) = msg.from.as_ref() else {
        return;
    };
    let Some(telegram_id) = sender_id(msg) else {
        return;
    };

    let step = deps.sessions.take(msg.chat.id, user.id);
    let result = match step {
        None => return,
        Some(WithdrawFlow::AwaitingPhone) => {
            deps.sessions
                .set(msg.chat.id, user.id, WithdrawFlow::AwaitingNetwork { phone: text.to_string() });
            bot.send_message(msg.chat.id, "📶 Enter your network (MTN, Airtel, Glo, 9mobile):")
                .await
                .map(|_| ())
                .map_err(crate::core::AppError::from)
        }
        Some(WithdrawFlow::AwaitingNetwork { phone }) => {
            finalize_withdrawal(bot, msg, deps, telegram_id, &phone, text).await
        }
    };

    if let Err(e) = result {
        log::error!("Withdrawal flow failed for chat {}: {}", msg.chat.id, e);
        let _ = bot
            .send_message(msg.chat.id, "⚠️ Something went wrong. Please run /withdraw again.")
            .await;
    }
}

async fn finalize_withdrawal(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
    telegram_id: i64,
    phone: &str,
    network: &str,
) -> AppResult<()> {
    let mut conn = get_connection(&deps.db_pool)?;
    let reply = match db::submit_withdrawal(&mut conn, telegram_id, phone, network)? {
        Ok(withdrawal) => {
            log::info!("Withdrawal {} queued for user {}", withdrawal.id, telegram_id);
            format!(
                "✅ Withdrawal request of {}{} submitted!\n📱 Airtime will be sent to {} ({}). Await admin approval.",
                rewards::CURRENCY.as_str(),
                withdrawal.amount,
                withdrawal.phone,
                withdrawal.network
            )
        }
        Err(denial) => denial.user_message(),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}
