use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::dedup::DedupTracker;
use crate::filter::KeywordFilter;
use crate::platform::{AccountClient, AccountEvent, BotClient, BotEvent, BotIdentity};
use crate::registry::MonitoredChats;

/// Why a handler chose not to act on a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotSelfChat,
    FromBot,
    Duplicate,
    Unaddressable,
    NotMonitored,
    Filtered,
}

/// Result of handling one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ignored(IgnoreReason),
    Done,
    TransientError(String),
}

/// Everything both flows need, resolved once at startup.
pub struct Relay {
    pub operator_id: i64,
    pub bot: BotIdentity,
    /// The bot as addressed by the user account.
    pub bot_peer_id: i64,
    pub monitored: MonitoredChats,
    pub filter: KeywordFilter,
    pub dedup: Arc<DedupTracker>,
    account: Arc<dyn AccountClient>,
    bot_client: Arc<dyn BotClient>,
}

impl Relay {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        operator_id: i64,
        bot: BotIdentity,
        bot_peer_id: i64,
        monitored: MonitoredChats,
        filter: KeywordFilter,
        dedup: Arc<DedupTracker>,
        account: Arc<dyn AccountClient>,
        bot_client: Arc<dyn BotClient>,
    ) -> Self {
        Self {
            operator_id,
            bot,
            bot_peer_id,
            monitored,
            filter,
            dedup,
            account,
            bot_client,
        }
    }

    /// Mirror a message the operator sent to the bot: forward it back into
    /// the same chat, then delete the original.
    pub async fn handle_bot_message(&self, event: BotEvent) -> Outcome {
        if event.chat_id != self.operator_id || event.sender_id != Some(self.operator_id) {
            return Outcome::Ignored(IgnoreReason::NotSelfChat);
        }
        if event.sender_id == Some(self.bot.id) {
            return Outcome::Ignored(IgnoreReason::FromBot);
        }
        if self.dedup.seen(event.message_id) {
            debug!("Skipping already processed message {}", event.message_id);
            return Outcome::Ignored(IgnoreReason::Duplicate);
        }
        self.dedup.mark_seen(event.message_id);

        let chat = self.operator_id;
        let result: anyhow::Result<()> = async {
            self.bot_client
                .forward_message(chat, chat, event.message_id)
                .await?;
            self.bot_client
                .delete_message(chat, event.message_id)
                .await
        }
        .await;

        match result {
            Ok(()) => {
                debug!("Mirrored message {}", event.message_id);
                Outcome::Done
            }
            Err(e) => {
                error!("Bot error: {:#}", e);
                Outcome::TransientError(format!("{:#}", e))
            }
        }
    }

    /// Forward a message from a monitored chat to the bot when it passes
    /// the keyword filter.
    pub async fn handle_account_message(&self, event: AccountEvent) -> Outcome {
        let Some(chat_id) = event.peer.monitored_chat_id() else {
            return Outcome::Ignored(IgnoreReason::Unaddressable);
        };
        let Some(chat_name) = self.monitored.display_name(chat_id) else {
            return Outcome::Ignored(IgnoreReason::NotMonitored);
        };

        let text = event.text.as_deref().unwrap_or_default().to_lowercase();
        if !self.filter.matches(&text) {
            return Outcome::Ignored(IgnoreReason::Filtered);
        }

        match self.filter.first_match(&text) {
            Some(keyword) => info!("[{}] Matched: \"{}\"", chat_name, keyword),
            None => info!("[{}] Forwarding (no keyword required)", chat_name),
        }

        match self
            .account
            .forward(self.bot_peer_id, chat_id, event.message_id)
            .await
        {
            Ok(()) => Outcome::Done,
            Err(e) => {
                error!("Client error: {:#}", e);
                Outcome::TransientError(format!("{:#}", e))
            }
        }
    }
}

/// Drain bot updates one at a time until the sender side closes.
pub async fn run_bot_flow(relay: Arc<Relay>, mut rx: mpsc::UnboundedReceiver<BotEvent>) {
    while let Some(event) = rx.recv().await {
        relay.handle_bot_message(event).await;
    }
    debug!("Bot event stream closed");
}

/// Drain account updates one at a time until the sender side closes.
pub async fn run_account_flow(relay: Arc<Relay>, mut rx: mpsc::UnboundedReceiver<AccountEvent>) {
    while let Some(event) = rx.recv().await {
        relay.handle_account_message(event).await;
    }
    debug!("Account event stream closed");
}
