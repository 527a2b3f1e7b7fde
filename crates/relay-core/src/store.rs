//! MembershipStore trait: the shared set of currently-connected peers.
//!
//! Implementations:
//! - `InMemoryStore` - For testing and single-process deployments
//! - `RedisStore` (in relay-daemon) - Redis set shared by every relay process
//!
//! Every call goes to the backing store. Nothing is cached client-side.

use crate::member::Member;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached (I/O, timeout, dropped connection).
    #[error("Membership store unavailable: {0}")]
    Unavailable(String),

    /// The store answered, but with an error.
    #[error("Membership store rejected command: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Shared membership set.
///
/// `add_member` and `remove_member` are idempotent. `list_members` returns a
/// snapshot with no ordering guarantee.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Add a member to the set
    async fn add_member(&self, member: &Member) -> Result<()>;

    /// Remove a member from the set
    async fn remove_member(&self, member: &Member) -> Result<()>;

    /// Snapshot of every member currently in the set
    async fn list_members(&self) -> Result<Vec<Member>>;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<()>;
}

/// Process-local membership set.
///
/// Individual operations can be switched to fail with
/// `StoreError::Unavailable` to simulate an outage.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    members: RwLock<BTreeSet<String>>,
    fail_adds: AtomicBool,
    fail_lists: AtomicBool,
    fail_removes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `add_member` calls fail (or succeed again).
    pub fn fail_adds(&self, fail: bool) {
        self.fail_adds.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `list_members` and `ping` calls fail (or succeed again).
    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `remove_member` calls fail (or succeed again).
    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, member: &Member) -> bool {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(member.as_str())
    }

    pub fn len(&self) -> usize {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!("{} failed: simulated outage", operation)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MembershipStore for InMemoryStore {
    async fn add_member(&self, member: &Member) -> Result<()> {
        Self::check(&self.fail_adds, "add")?;
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(member.as_str().to_string());
        Ok(())
    }

    async fn remove_member(&self, member: &Member) -> Result<()> {
        Self::check(&self.fail_removes, "remove")?;
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(member.as_str());
        Ok(())
    }

    async fn list_members(&self) -> Result<Vec<Member>> {
        Self::check(&self.fail_lists, "list")?;
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        Ok(members.iter().cloned().map(Member::new).collect())
    }

    async fn ping(&self) -> Result<()> {
        Self::check(&self.fail_lists, "ping")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inmemory_store_set_semantics() {
        let store = InMemoryStore::new();
        let a = Member::new("10.0.0.1");
        let b = Member::new("10.0.0.2");

        store.add_member(&a).await.unwrap();
        store.add_member(&a).await.unwrap();
        store.add_member(&b).await.unwrap();
        assert_eq!(store.len(), 2);

        let mut listed = store.list_members().await.unwrap();
        listed.sort();
        assert_eq!(listed, vec![a.clone(), b.clone()]);

        store.remove_member(&a).await.unwrap();
        // Removing twice is fine
        store.remove_member(&a).await.unwrap();
        assert!(!store.contains(&a));
        assert!(store.contains(&b));
    }

    #[tokio::test]
    async fn test_inmemory_store_simulated_outage() {
        let store = InMemoryStore::new();
        let a = Member::new("10.0.0.1");

        store.fail_adds(true);
        assert!(matches!(
            store.add_member(&a).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.is_empty());

        store.fail_adds(false);
        store.add_member(&a).await.unwrap();

        store.fail_lists(true);
        assert!(store.list_members().await.is_err());
        assert!(store.ping().await.is_err());

        store.fail_removes(true);
        assert!(store.remove_member(&a).await.is_err());
        assert!(store.contains(&a));
    }
}
