pub mod account;
pub mod telegram;

#[cfg(test)]
pub mod testing;

use anyhow::Result;
use async_trait::async_trait;

/// Where an account-side message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    User(i64),
    Group(i64),
    Channel(i64),
}

impl Peer {
    pub fn id(&self) -> i64 {
        match *self {
            Peer::User(id) | Peer::Group(id) | Peer::Channel(id) => id,
        }
    }

    /// Id usable as a monitored chat. Private conversations have none.
    pub fn monitored_chat_id(&self) -> Option<i64> {
        match *self {
            Peer::Group(id) | Peer::Channel(id) => Some(id),
            Peer::User(_) => None,
        }
    }
}

/// A new message seen by the user account
#[derive(Debug, Clone)]
pub struct AccountEvent {
    pub peer: Peer,
    pub message_id: i32,
    pub text: Option<String>,
}

/// A message delivered to the bot by long polling
#[derive(Debug, Clone)]
pub struct BotEvent {
    pub chat_id: i64,
    pub sender_id: Option<i64>,
    pub message_id: i32,
}

/// A chat resolved by the user account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChat {
    pub id: i64,
    pub title: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: i64,
    pub username: String,
}

/// Operations the relay needs from the user account.
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Numeric id of the logged-in user.
    async fn me(&self) -> Result<i64>;

    /// Look up a chat, channel or user by name. `Ok(None)` when it does not exist.
    async fn resolve(&self, name: &str) -> Result<Option<ResolvedChat>>;

    /// Forward `message_id` from chat `from_chat` into chat `to`.
    /// Both chats must have been seen through `resolve` or an update first.
    async fn forward(&self, to: i64, from_chat: i64, message_id: i32) -> Result<()>;
}

/// Operations the relay needs from the Bot API.
#[async_trait]
pub trait BotClient: Send + Sync {
    async fn identity(&self) -> Result<BotIdentity>;

    async fn forward_message(&self, chat_id: i64, from_chat_id: i64, message_id: i32)
        -> Result<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()>;
}
