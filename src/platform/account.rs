use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io::{BufRead, Write};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use grammers_client::types::{Chat, PackedChat};
use grammers_client::{Client, Config as ClientConfig, InitParams, SignInError, Update};
use grammers_session::Session;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::platform::{AccountClient, AccountEvent, Peer, ResolvedChat};

/// Chats seen so far, needed to address them in forwards.
struct PeerCache<T> {
    peers: Mutex<HashMap<i64, T>>,
}

impl<T: Copy> PeerCache<T> {
    fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, T>> {
        // Entries are plain copies, a poisoned guard is still consistent.
        self.peers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, id: i64, peer: T) {
        self.lock().insert(id, peer);
    }

    fn get(&self, id: i64) -> Result<T> {
        self.lock()
            .get(&id)
            .copied()
            .with_context(|| format!("Chat {} has not been resolved", id))
    }
}

/// Telegram user account session
pub struct TelegramAccount {
    client: Client,
    peers: PeerCache<PackedChat>,
}

/// Read one line from the terminal.
async fn prompt(message: &str) -> Result<String> {
    let message = message.to_string();
    tokio::task::spawn_blocking(move || -> Result<String> {
        let mut stdout = std::io::stdout();
        stdout.write_all(message.as_bytes())?;
        stdout.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    })
    .await
    .context("Prompt task failed")?
}

/// Read a password from the terminal without echoing it.
async fn prompt_secret(message: &str) -> Result<String> {
    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        rpassword::prompt_password(message).map_err(|e| anyhow!("Failed to read password: {e}"))
    })
    .await
    .context("Prompt task failed")?
}

/// Exponential delay between retries, reset after a success.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            failures: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32 << self.failures.min(16);
        self.failures = self.failures.saturating_add(1);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Pull events from `next` into `tx` until the receiving flow goes away.
///
/// A failed fetch is logged and retried after a backoff; it never ends the
/// loop. `Ok(None)` means the update was not a relevant message.
pub async fn forward_updates<F, Fut>(
    mut next: F,
    tx: mpsc::UnboundedSender<AccountEvent>,
    mut backoff: Backoff,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<AccountEvent>>>,
{
    while !tx.is_closed() {
        match next().await {
            Ok(Some(event)) => {
                backoff.reset();
                if tx.send(event).is_err() {
                    break;
                }
            }
            Ok(None) => backoff.reset(),
            Err(e) => {
                let delay = backoff.next_delay();
                warn!("Account update failed, retrying in {:?}: {:#}", delay, e);
                tokio::time::sleep(delay).await;
            }
        }
    }
    debug!("Account flow stopped, ending update pump");
}

fn peer_of(chat: &Chat) -> Peer {
    match chat {
        Chat::User(user) => Peer::User(user.id()),
        Chat::Group(group) => Peer::Group(group.id()),
        Chat::Channel(channel) => Peer::Channel(channel.id()),
    }
}

impl TelegramAccount {
    /// Connect with the configured session, logging in interactively when
    /// there is none. The flag is true when a new session was created.
    pub async fn connect(config: &Config) -> Result<(Self, bool)> {
        let session = match &config.session_string {
            Some(encoded) => {
                let bytes = BASE64
                    .decode(encoded)
                    .context("SESSION_STRING is not valid base64")?;
                Session::load(&bytes).map_err(|e| anyhow!("Invalid SESSION_STRING: {:?}", e))?
            }
            None => Session::new(),
        };

        let client = Client::connect(ClientConfig {
            session,
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .context("Failed to connect to Telegram")?;

        let mut created = false;
        if !client
            .is_authorized()
            .await
            .context("Failed to check authorization")?
        {
            login(&client).await?;
            created = true;
        }

        Ok((
            Self {
                client,
                peers: PeerCache::new(),
            },
            created,
        ))
    }

    /// Current session, base64-encoded for the env file.
    pub fn session_string(&self) -> String {
        BASE64.encode(self.client.session().save())
    }

    fn remember(&self, chat: &Chat) {
        self.peers.insert(chat.id(), chat.pack());
    }

    fn packed(&self, id: i64) -> Result<PackedChat> {
        self.peers.get(id)
    }

    /// Receive account updates for as long as the account flow runs,
    /// pushing new messages from `chats` into `tx`.
    pub async fn pump_updates(&self, chats: HashSet<i64>, tx: mpsc::UnboundedSender<AccountEvent>) {
        let chats = &chats;
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        forward_updates(|| self.next_event(chats), tx, backoff).await;
    }

    async fn next_event(&self, chats: &HashSet<i64>) -> Result<Option<AccountEvent>> {
        let update = self
            .client
            .next_update()
            .await
            .context("Failed to receive account update")?;

        let Update::NewMessage(message) = update else {
            return Ok(None);
        };

        let chat = message.chat();
        let peer = peer_of(&chat);
        if !chats.contains(&peer.id()) {
            trace!("Skipping message from unmonitored chat {}", peer.id());
            return Ok(None);
        }
        self.remember(&chat);

        let text = message.text();
        Ok(Some(AccountEvent {
            peer,
            message_id: message.id(),
            text: (!text.is_empty()).then(|| text.to_string()),
        }))
    }
}

async fn login(client: &Client) -> Result<()> {
    let phone = prompt("Please enter your phone number: ").await?;
    let token = client
        .request_login_code(&phone)
        .await
        .context("Failed to request login code")?;
    let code = prompt("Please enter the code you received: ").await?;

    match client.sign_in(&token, &code).await {
        Ok(_) => {}
        Err(SignInError::PasswordRequired(password_token)) => {
            let hint = password_token.hint().unwrap_or("none").to_string();
            let password =
                prompt_secret(&format!("Please enter your password (hint: {}): ", hint)).await?;
            client
                .check_password(password_token, password.trim())
                .await
                .map_err(|e| anyhow!("Password check failed: {}", e))?;
        }
        Err(e) => return Err(anyhow!("Sign in failed: {}", e)),
    }

    info!("Signed in to Telegram");
    Ok(())
}

#[async_trait]
impl AccountClient for TelegramAccount {
    async fn me(&self) -> Result<i64> {
        let me = self.client.get_me().await.context("Failed to get own user")?;
        Ok(me.id())
    }

    async fn resolve(&self, name: &str) -> Result<Option<ResolvedChat>> {
        let Some(chat) = self
            .client
            .resolve_username(name)
            .await
            .with_context(|| format!("Failed to resolve {}", name))?
        else {
            return Ok(None);
        };

        self.remember(&chat);
        Ok(Some(ResolvedChat {
            id: chat.id(),
            title: chat.name().to_string(),
            username: chat.username().map(str::to_string),
        }))
    }

    async fn forward(&self, to: i64, from_chat: i64, message_id: i32) -> Result<()> {
        let destination = self.packed(to)?;
        let source = self.packed(from_chat)?;
        self.client
            .forward_messages(destination, &[message_id], source)
            .await
            .with_context(|| format!("Failed to forward message {} from {}", message_id, from_chat))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn event(message_id: i32) -> AccountEvent {
        AccountEvent {
            peer: Peer::Channel(555),
            message_id,
            text: Some("urgent".to_string()),
        }
    }

    fn quick_backoff() -> Backoff {
        Backoff::new(Duration::from_millis(1), Duration::from_millis(4))
    }

    #[test]
    fn test_peer_cache_survives_poisoned_lock() {
        let cache = std::sync::Arc::new(PeerCache::<u8>::new());
        cache.insert(1, 10);

        let poisoner = cache.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.peers.lock().unwrap();
            panic!("poison the peer cache");
        })
        .join();
        assert!(cache.peers.is_poisoned());

        cache.insert(2, 20);
        assert_eq!(cache.get(1).unwrap(), 10);
        assert_eq!(cache.get(2).unwrap(), 20);
        assert!(cache.get(3).is_err());
    }

    #[test]
    fn test_backoff_doubles_up_to_max_and_resets() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_update_errors_do_not_stop_the_pump() {
        let mut script: VecDeque<Result<Option<AccountEvent>>> = VecDeque::from(vec![
            Err(anyhow!("FLOOD_WAIT_5")),
            Err(anyhow!("connection reset")),
            Ok(Some(event(1))),
            Ok(None),
            Err(anyhow!("getDifference timed out")),
            Ok(Some(event(2))),
        ]);
        let next = move || {
            let item = script.pop_front();
            async move {
                match item {
                    Some(result) => result,
                    None => {
                        tokio::task::yield_now().await;
                        Ok(None)
                    }
                }
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(forward_updates(next, tx, quick_backoff()));

        assert_eq!(rx.recv().await.unwrap().message_id, 1);
        assert_eq!(rx.recv().await.unwrap().message_id, 2);

        drop(rx);
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn test_pump_ends_when_flow_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let next = || async { Ok(Some(event(3))) };

        forward_updates(next, tx, quick_backoff()).await;
    }

    #[test]
    fn test_session_string_is_base64() {
        let encoded = BASE64.encode(Session::new().save());
        let decoded = BASE64.decode(&encoded).unwrap();
        assert!(Session::load(&decoded).is_ok());
    }
}
