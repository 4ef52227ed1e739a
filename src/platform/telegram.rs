use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::dispatching::ShutdownToken;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::platform::{BotClient, BotEvent, BotIdentity};

/// Bot API side of the relay
#[derive(Clone)]
pub struct TelegramBot {
    bot: Bot,
}

impl TelegramBot {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// Start long polling. Every message update is pushed into `tx`.
    pub fn start_polling(&self, tx: mpsc::UnboundedSender<BotEvent>) -> (ShutdownToken, JoinHandle<()>) {
        info!("Starting bot polling...");

        let handler = Update::filter_message().endpoint(push_message);

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![tx])
            .default_handler(|upd| async move {
                debug!("Unhandled update: {:?}", upd.id);
            })
            .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
            .build();

        let token = dispatcher.shutdown_token();
        let handle = tokio::spawn(async move {
            dispatcher.dispatch().await;
        });
        (token, handle)
    }
}

async fn push_message(msg: Message, tx: mpsc::UnboundedSender<BotEvent>) -> ResponseResult<()> {
    let event = BotEvent {
        chat_id: msg.chat.id.0,
        sender_id: msg.from.as_ref().map(|user| user.id.0 as i64),
        message_id: msg.id.0,
    };
    if tx.send(event).is_err() {
        warn!("Bot flow stopped, dropping message {}", msg.id.0);
    }
    Ok(())
}

#[async_trait]
impl BotClient for TelegramBot {
    async fn identity(&self) -> Result<BotIdentity> {
        let me = self.bot.get_me().await.context("getMe failed")?;
        Ok(BotIdentity {
            id: me.id.0 as i64,
            username: me.username().to_string(),
        })
    }

    async fn forward_message(
        &self,
        chat_id: i64,
        from_chat_id: i64,
        message_id: i32,
    ) -> Result<()> {
        self.bot
            .forward_message(ChatId(chat_id), ChatId(from_chat_id), MessageId(message_id))
            .await
            .with_context(|| format!("Failed to forward message {}", message_id))?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
            .with_context(|| format!("Failed to delete message {}", message_id))?;
        Ok(())
    }
}
