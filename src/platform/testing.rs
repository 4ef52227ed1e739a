//! In-memory clients for exercising the relay without Telegram.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{AccountClient, BotClient, BotIdentity, ResolvedChat};

#[derive(Default)]
pub struct FakeAccount {
    pub me: i64,
    pub chats: HashMap<String, ResolvedChat>,
    pub broken: HashSet<String>,
    pub fail_forward: bool,
    pub forwards: Mutex<Vec<(i64, i64, i32)>>,
}

impl FakeAccount {
    pub fn new(me: i64) -> Self {
        Self {
            me,
            ..Default::default()
        }
    }

    pub fn with_chat(mut self, name: &str, id: i64, title: &str) -> Self {
        self.chats.insert(
            name.to_string(),
            ResolvedChat {
                id,
                title: title.to_string(),
                username: Some(name.to_string()),
            },
        );
        self
    }

    pub fn forwards(&self) -> Vec<(i64, i64, i32)> {
        self.forwards.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountClient for FakeAccount {
    async fn me(&self) -> Result<i64> {
        Ok(self.me)
    }

    async fn resolve(&self, name: &str) -> Result<Option<ResolvedChat>> {
        if self.broken.contains(name) {
            return Err(anyhow!("CHANNEL_PRIVATE"));
        }
        Ok(self.chats.get(name).cloned())
    }

    async fn forward(&self, to: i64, from_chat: i64, message_id: i32) -> Result<()> {
        if self.fail_forward {
            return Err(anyhow!("FLOOD_WAIT_30"));
        }
        self.forwards.lock().unwrap().push((to, from_chat, message_id));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCall {
    Forward {
        chat_id: i64,
        from_chat_id: i64,
        message_id: i32,
    },
    Delete {
        chat_id: i64,
        message_id: i32,
    },
}

#[derive(Default)]
pub struct FakeBot {
    pub identity: Option<BotIdentity>,
    pub fail_forward: bool,
    pub fail_delete: bool,
    pub calls: Mutex<Vec<BotCall>>,
}

impl FakeBot {
    pub fn new(id: i64, username: &str) -> Self {
        Self {
            identity: Some(BotIdentity {
                id,
                username: username.to_string(),
            }),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<BotCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BotClient for FakeBot {
    async fn identity(&self) -> Result<BotIdentity> {
        self.identity
            .clone()
            .ok_or_else(|| anyhow!("Unauthorized"))
    }

    async fn forward_message(
        &self,
        chat_id: i64,
        from_chat_id: i64,
        message_id: i32,
    ) -> Result<()> {
        if self.fail_forward {
            return Err(anyhow!("Bad Request: message to forward not found"));
        }
        self.calls.lock().unwrap().push(BotCall::Forward {
            chat_id,
            from_chat_id,
            message_id,
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
        if self.fail_delete {
            return Err(anyhow!("Bad Request: message can't be deleted"));
        }
        self.calls.lock().unwrap().push(BotCall::Delete {
            chat_id,
            message_id,
        });
        Ok(())
    }
}
