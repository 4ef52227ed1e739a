use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::dedup::DedupTracker;
use crate::filter::KeywordFilter;
use crate::platform::{AccountClient, BotClient};
use crate::registry;
use crate::relay::Relay;

/// Resolve everything the relay needs once the user account is signed in.
///
/// Monitored chats that cannot be found are skipped. Failing to identify the
/// bot, or to reach it from the user account, is an error.
pub async fn assemble(
    operator_id: i64,
    chat_names: &[String],
    filter: KeywordFilter,
    dedup: Arc<DedupTracker>,
    account: Arc<dyn AccountClient>,
    bot: Arc<dyn BotClient>,
) -> Result<Relay> {
    let monitored = registry::resolve(account.as_ref(), chat_names).await;

    let identity = bot
        .identity()
        .await
        .context("Could not get bot info")?;
    info!(
        "✓ Bot connected: @{} (ID: {})",
        identity.username, identity.id
    );

    let bot_peer = account
        .resolve(&identity.username)
        .await
        .with_context(|| format!("Client could not find bot: @{}", identity.username))?
        .with_context(|| format!("Client could not find bot: @{}", identity.username))?;

    if monitored.is_empty() {
        warn!("No monitored chats could be resolved, only mirroring bot messages");
    }
    info!("Monitoring {} chats", monitored.len());
    if filter.is_empty() {
        info!("Filtering: Disabled");
    } else {
        info!(
            "Filtering: Active ({} keywords: {})",
            filter.len(),
            filter.keywords().join(", ")
        );
    }
    info!("Forwarding to bot: @{}", identity.username);

    Ok(Relay::new(
        operator_id,
        identity,
        bot_peer.id,
        monitored,
        filter,
        dedup,
        account,
        bot,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::{FakeAccount, FakeBot};
    use crate::platform::{AccountEvent, Peer};
    use crate::relay::Outcome;

    const OPERATOR: i64 = 1001;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_chat_does_not_block_startup() {
        let account = Arc::new(
            FakeAccount::new(OPERATOR)
                .with_chat("news", 100, "News")
                .with_chat("relay_bot", 9009, "Relay Bot"),
        );
        let bot = Arc::new(FakeBot::new(9009, "relay_bot"));

        let relay = assemble(
            OPERATOR,
            &names(&["news", "gone"]),
            KeywordFilter::default(),
            Arc::new(DedupTracker::default()),
            account.clone(),
            bot,
        )
        .await
        .unwrap();

        assert_eq!(relay.monitored.len(), 1);
        assert_eq!(relay.bot_peer_id, 9009);

        let outcome = relay
            .handle_account_message(AccountEvent {
                peer: Peer::Channel(100),
                message_id: 3,
                text: Some("hello".to_string()),
            })
            .await;
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(account.forwards(), vec![(9009, 100, 3)]);
    }

    #[tokio::test]
    async fn test_unknown_bot_identity_is_fatal() {
        let account = Arc::new(FakeAccount::new(OPERATOR));
        let bot = Arc::new(FakeBot::default());

        let err = assemble(
            OPERATOR,
            &[],
            KeywordFilter::default(),
            Arc::new(DedupTracker::default()),
            account,
            bot,
        )
        .await
        .err()
        .unwrap();

        assert!(format!("{:#}", err).contains("Could not get bot info"));
    }

    #[tokio::test]
    async fn test_bot_unreachable_from_account_is_fatal() {
        let account = Arc::new(FakeAccount::new(OPERATOR).with_chat("news", 100, "News"));
        let bot = Arc::new(FakeBot::new(9009, "relay_bot"));

        let err = assemble(
            OPERATOR,
            &names(&["news"]),
            KeywordFilter::default(),
            Arc::new(DedupTracker::default()),
            account,
            bot,
        )
        .await
        .err()
        .unwrap();

        assert!(err.to_string().contains("@relay_bot"));
    }
}
