use std::collections::HashMap;

use tracing::{info, warn};

use crate::platform::AccountClient;

/// Chats being watched, keyed by numeric id, valued by display name.
#[derive(Debug, Clone, Default)]
pub struct MonitoredChats {
    chats: HashMap<i64, String>,
}

impl MonitoredChats {
    #[cfg(test)]
    pub fn contains(&self, id: i64) -> bool {
        self.chats.contains_key(&id)
    }

    pub fn display_name(&self, id: i64) -> Option<&str> {
        self.chats.get(&id).map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.chats.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn insert(&mut self, id: i64, display_name: impl Into<String>) {
        self.chats.insert(id, display_name.into());
    }
}

/// Strip `@` and t.me link prefixes from a configured chat name.
pub fn normalize_name(name: &str) -> &str {
    let name = name.trim();
    let name = name
        .strip_prefix("https://")
        .or_else(|| name.strip_prefix("http://"))
        .unwrap_or(name);
    let name = name.strip_prefix("t.me/").unwrap_or(name);
    let name = name.strip_prefix('@').unwrap_or(name);
    name.trim_end_matches('/')
}

/// Resolve configured chat names through the user account.
///
/// A name that cannot be resolved is logged and skipped; the rest still
/// get monitored.
pub async fn resolve<C>(client: &C, names: &[String]) -> MonitoredChats
where
    C: AccountClient + ?Sized,
{
    let mut monitored = MonitoredChats::default();

    for name in names {
        let lookup = normalize_name(name);
        if lookup.is_empty() {
            continue;
        }

        match client.resolve(lookup).await {
            Ok(Some(chat)) => {
                let display_name = if !chat.title.is_empty() {
                    chat.title
                } else {
                    chat.username.unwrap_or_else(|| name.clone())
                };
                info!("✓ Monitoring: {}", display_name);
                monitored.insert(chat.id, display_name);
            }
            Ok(None) => {
                warn!("✗ Could not find: {}", name);
            }
            Err(e) => {
                warn!("✗ Could not find: {} ({:#})", name, e);
            }
        }
    }

    monitored
}
