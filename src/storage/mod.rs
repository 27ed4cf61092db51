//! Database pool and persistence for the reward ledger

pub mod db;

pub use db::{create_pool, get_connection, DbConnection, DbPool};
