//! Read model for users, subscriptions and the post cursor.
//!
//! The sync cycle only needs the [`ReadModel`] contract. Two backends share
//! the same [`StoreData`] document:
//! - [`MemoryStore`]: in-process, for tests and dry runs
//! - [`LocalStore`]: one JSON file on disk
//!
//! ## Document
//!
//! ```text
//! {
//!   "users":         [{ "id", "chat_id" }],
//!   "subscriptions": [{ "id", "board", "tags", "types", "alias", "is_default" }],
//!   "links":         [{ "user_id", "subscription_id" }],
//!   "cursor":        1700000000
//! }
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Subscription, User};

pub use local::LocalStore;
pub use memory::MemoryStore;

/// Source of subscriptions and owner of the post cursor.
#[async_trait]
pub trait ReadModel: Send + Sync {
    /// Every stored subscription.
    async fn subscriptions(&self) -> Result<Vec<Subscription>>;

    /// Users linked to a subscription.
    async fn subscribers_of(&self, subscription: &Subscription) -> Result<Vec<User>>;

    /// Timestamp of the newest post already processed.
    async fn cursor(&self) -> Result<u64>;

    /// Store `timestamp` only if it is greater than the current cursor.
    ///
    /// Returns whether the cursor moved.
    async fn advance_cursor(&self, timestamp: u64) -> Result<bool>;
}

/// Link between a user and a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub user_id: i64,
    pub subscription_id: i64,
}

/// Whole content of a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    pub users: Vec<User>,

    #[serde(default)]
    pub subscriptions: Vec<Subscription>,

    #[serde(default)]
    pub links: Vec<Link>,

    #[serde(default)]
    pub cursor: u64,
}

impl StoreData {
    /// Return the user for `chat_id`, creating it on first sight.
    pub fn register_user(&mut self, chat_id: i64) -> User {
        if let Some(user) = self.users.iter().find(|u| u.chat_id == chat_id) {
            return user.clone();
        }
        let user = User {
            id: next_id(self.users.iter().map(|u| u.id)),
            chat_id,
        };
        self.users.push(user.clone());
        user
    }

    /// Store a personal subscription and link it to the user of `chat_id`.
    pub fn add_subscription(&mut self, chat_id: i64, mut subscription: Subscription) -> Subscription {
        let user = self.register_user(chat_id);
        subscription.id = next_id(self.subscriptions.iter().map(|s| s.id));
        subscription.is_default = false;
        self.links.push(Link {
            user_id: user.id,
            subscription_id: subscription.id,
        });
        self.subscriptions.push(subscription.clone());
        subscription
    }

    /// Store a shared subscription that users join by alias.
    pub fn add_default_subscription(&mut self, mut subscription: Subscription) -> Result<Subscription> {
        if self.find_default(&subscription.alias).is_some() {
            return Err(AppError::validation(format!(
                "alias {:?} is already taken",
                subscription.alias
            )));
        }
        subscription.id = next_id(self.subscriptions.iter().map(|s| s.id));
        subscription.is_default = true;
        self.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    /// Link the user of `chat_id` to the shared subscription named `alias`.
    pub fn join_default(&mut self, chat_id: i64, alias: &str) -> Result<Subscription> {
        let subscription = self
            .find_default(alias)
            .cloned()
            .ok_or_else(|| AppError::validation(format!("no shared subscription {alias:?}")))?;
        let user = self.register_user(chat_id);
        let link = Link {
            user_id: user.id,
            subscription_id: subscription.id,
        };
        if !self.links.contains(&link) {
            self.links.push(link);
        }
        Ok(subscription)
    }

    /// Delete the shared subscription named `alias` and unlink its users.
    pub fn remove_default(&mut self, alias: &str) -> Result<Subscription> {
        let subscription = self
            .find_default(alias)
            .cloned()
            .ok_or_else(|| AppError::validation(format!("no shared subscription {alias:?}")))?;
        self.links.retain(|l| l.subscription_id != subscription.id);
        self.subscriptions.retain(|s| s.id != subscription.id);
        Ok(subscription)
    }

    /// Shared subscriptions, joined or not.
    pub fn shared_subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions
            .iter()
            .filter(|s| s.is_default)
            .cloned()
            .collect()
    }

    /// Unlink a subscription from the user of `chat_id`.
    ///
    /// Personal subscriptions without remaining links are dropped.
    pub fn remove_subscription(&mut self, chat_id: i64, subscription_id: i64) -> bool {
        let Some(user) = self.users.iter().find(|u| u.chat_id == chat_id) else {
            return false;
        };
        let link = Link {
            user_id: user.id,
            subscription_id,
        };
        let before = self.links.len();
        self.links.retain(|l| *l != link);
        if self.links.len() == before {
            return false;
        }

        let orphaned = !self.links.iter().any(|l| l.subscription_id == subscription_id);
        if orphaned {
            self.subscriptions
                .retain(|s| s.id != subscription_id || s.is_default);
        }
        true
    }

    /// Subscriptions linked to the user of `chat_id`.
    pub fn subscriptions_of(&self, chat_id: i64) -> Vec<Subscription> {
        let Some(user) = self.users.iter().find(|u| u.chat_id == chat_id) else {
            return Vec::new();
        };
        self.subscriptions
            .iter()
            .filter(|s| {
                self.links
                    .iter()
                    .any(|l| l.user_id == user.id && l.subscription_id == s.id)
            })
            .cloned()
            .collect()
    }

    pub fn subscribers_of(&self, subscription_id: i64) -> Vec<User> {
        self.users
            .iter()
            .filter(|u| {
                self.links
                    .iter()
                    .any(|l| l.user_id == u.id && l.subscription_id == subscription_id)
            })
            .cloned()
            .collect()
    }

    /// Move the cursor forward. Smaller or equal values are ignored.
    pub fn advance_cursor(&mut self, timestamp: u64) -> bool {
        if timestamp > self.cursor {
            self.cursor = timestamp;
            true
        } else {
            false
        }
    }

    fn find_default(&self, alias: &str) -> Option<&Subscription> {
        self.subscriptions
            .iter()
            .find(|s| s.is_default && s.alias == alias)
    }
}

fn next_id(ids: impl Iterator<Item = i64>) -> i64 {
    ids.max().unwrap_or(0) + 1
}
