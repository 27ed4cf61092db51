//! Withdrawal conversation state
//!
//! The withdraw flow spans three messages (/withdraw → phone → network), so
//! the in-between state lives here: an explicit finite-state machine keyed by
//! chat id plus user id, held in a dedicated store with expiry. In a group
//! chat only the user who ran /withdraw can continue their flow; state never
//! leaks across users or chats and is discarded on completion or whenever the
//! user sends a command instead of a plain-text continuation.

use dashmap::DashMap;
use teloxide::types::{ChatId, UserId};
use tokio::time::{Duration, Instant};

use crate::core::config;

/// Where a chat currently is in the withdrawal conversation.
///
/// `Idle` has no representation — an absent entry is idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawFlow {
    /// /withdraw accepted, waiting for the payout phone number
    AwaitingPhone,
    /// Phone received, waiting for the network name
    AwaitingNetwork { phone: String },
}

/// Expiring per-(chat, user) store for [`WithdrawFlow`] state.
pub struct SessionStore {
    sessions: DashMap<(ChatId, UserId), (WithdrawFlow, Instant)>,
    expiry: Duration,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_expiry(config::session::expiry())
    }

    pub fn with_expiry(expiry: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            expiry,
        }
    }

    /// Starts the flow for a user in a chat, replacing any stale state.
    pub fn begin(&self, chat_id: ChatId, user_id: UserId) {
        self.set(chat_id, user_id, WithdrawFlow::AwaitingPhone);
    }

    /// Stores the given state with a fresh expiry deadline.
    pub fn set(&self, chat_id: ChatId, user_id: UserId, flow: WithdrawFlow) {
        self.sessions
            .insert((chat_id, user_id), (flow, Instant::now() + self.expiry));
    }

    /// Removes and returns the user's current state, if present and not
    /// expired. A different user in the same chat gets `None` — they have no
    /// flow of their own.
    ///
    /// The caller decides whether to put a follow-up state back; a text
    /// message always consumes the state it was matched against.
    pub fn take(&self, chat_id: ChatId, user_id: UserId) -> Option<WithdrawFlow> {
        let (_, (flow, deadline)) = self.sessions.remove(&(chat_id, user_id))?;
        if Instant::now() > deadline {
            return None;
        }
        Some(flow)
    }

    /// Discards any state for the user in this chat. Called on every command
    /// so a stray /start mid-flow aborts the conversation.
    pub fn clear(&self, chat_id: ChatId, user_id: UserId) {
        self.sessions.remove(&(chat_id, user_id));
    }

    /// Drops entries whose deadline has passed. Run periodically so chats
    /// that walked away don't accumulate.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.sessions.retain(|_, (_, deadline)| *deadline >= now);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
