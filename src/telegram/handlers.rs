//! Dispatcher schema and handler dependencies

use std::sync::Arc;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use super::bot::Command;
use super::commands;
use crate::ledger::SessionStore;
use crate::storage::DbPool;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<DbPool>,
    pub sessions: Arc<SessionStore>,
    pub bot_username: Option<String>,
}

impl HandlerDeps {
    pub fn new(db_pool: Arc<DbPool>, sessions: Arc<SessionStore>, bot_username: Option<String>) -> Self {
        Self {
            db_pool,
            sessions,
            bot_username,
        }
    }
}

/// Creates the main dispatcher schema for the Telegram bot.
///
/// The same schema is used in production and in integration tests. Command
/// messages go to the command branch; plain text falls through to the
/// withdrawal-flow continuation branch.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_text = deps;

    dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(move |bot: Bot, msg: Message, cmd: Command| {
                    let deps = deps_commands.clone();
                    async move {
                        commands::dispatch(&bot, &msg, cmd, &deps).await;
                        Ok(())
                    }
                }),
        )
        .branch(
            Update::filter_message()
                .filter(|msg: Message| msg.text().is_some())
                .endpoint(move |bot: Bot, msg: Message| {
                    let deps = deps_text.clone();
                    async move {
                        commands::handle_text(&bot, &msg, &deps).await;
                        Ok(())
                    }
                }),
        )
}
