use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;

use refearn::cli::{Cli, Commands};
use refearn::core::{config, init_logger};
use refearn::ledger::SessionStore;
use refearn::storage::create_pool;
use refearn::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps};
use refearn::web::start_admin_server;

/// Main entry point
///
/// Parses CLI arguments and dispatches to the appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load environment variables from .env if present
    let _ = dotenv();

    init_logger(&config::LOG_FILE_PATH)?;

    match cli.command {
        Some(Commands::Run { no_dashboard }) => run_bot(no_dashboard).await,
        Some(Commands::InitDb) => {
            create_pool(&config::DATABASE_PATH).map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?;
            log::info!("Database schema ready at {}", config::DATABASE_PATH.as_str());
            Ok(())
        }
        None => {
            log::info!("No command specified, running bot in default mode");
            run_bot(false).await
        }
    }
}

/// Run the bot dispatcher, the session sweeper, and (unless disabled) the
/// admin dashboard until shutdown.
async fn run_bot(no_dashboard: bool) -> Result<()> {
    let db_pool = Arc::new(
        create_pool(&config::DATABASE_PATH).map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?,
    );
    log::info!("Account store ready at {}", config::DATABASE_PATH.as_str());

    let bot = create_bot()?;
    let me = bot.get_me().await?;
    let bot_username = me.username.clone();
    match bot_username.as_deref() {
        Some(name) => log::info!("Running as @{}", name),
        None => log::warn!("Bot has no username; referral deep links cannot be generated"),
    }

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to register bot commands: {}", e);
    }

    if config::GROUP_USERNAME.is_empty() {
        log::info!("GROUP_USERNAME not set, membership gate disabled");
    } else {
        log::info!("Registration gated on membership in {}", config::GROUP_USERNAME.as_str());
    }

    let sessions = Arc::new(SessionStore::new());

    // Sweep abandoned withdrawal conversations
    {
        let sessions = Arc::clone(&sessions);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(config::session::expiry());
            loop {
                tick.tick().await;
                sessions.purge_expired();
            }
        });
    }

    if no_dashboard {
        log::info!("Admin dashboard disabled");
    } else if config::web::ADMIN_PASS.is_empty() {
        log::warn!("ADMIN_PASS not set, admin dashboard disabled");
    } else {
        let db = Arc::clone(&db_pool);
        let dashboard_bot = bot.clone();
        let port = *config::web::PORT;
        tokio::spawn(async move {
            if let Err(e) = start_admin_server(port, db, dashboard_bot).await {
                log::error!("Admin dashboard exited: {}", e);
            }
        });
    }

    let deps = HandlerDeps::new(Arc::clone(&db_pool), sessions, bot_username);

    log::info!("Starting dispatcher");
    Dispatcher::builder(bot, schema(deps))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
