//! Administrative mutations and the caches they reconcile.
//!
//! Mutations are confirm-before-apply: the cached rule list and blocklist
//! change only after the server has accepted the request, and only by
//! replacing or removing the one entity the request targeted. Each entity
//! can have at most one mutation in flight; different entities never wait
//! on each other.
//!
//! Each cache carries a generation bumped by every write. A collection load
//! that started before a newer write discards its response and fetches
//! again, so a stale listing never lands over a confirmed mutation.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::WafApi;
use crate::error::{Error, Result};
use crate::types::{BlockedIp, Rule, UnblockResponse};

/// Entity a mutation targets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationTarget {
    Rule(Uuid),
    Address(String),
}

impl fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationTarget::Rule(id) => write!(f, "rule {id}"),
            MutationTarget::Address(ip) => write!(f, "address {ip}"),
        }
    }
}

/// Replace the cached rule with the same id. Returns whether one matched.
pub fn reconcile_rule(rules: &mut [Rule], updated: Rule) -> bool {
    match rules.iter_mut().find(|rule| rule.id == updated.id) {
        Some(slot) => {
            *slot = updated;
            true
        }
        None => false,
    }
}

/// Drop cached blocklist entries for `ip`. Returns how many were removed.
pub fn remove_address(entries: &mut Vec<BlockedIp>, ip: &str) -> usize {
    let before = entries.len();
    entries.retain(|entry| entry.ip_address != ip);
    before - entries.len()
}

/// Cached collection and the generation of its last write
#[derive(Debug)]
struct Versioned<T> {
    items: Vec<T>,
    generation: u64,
}

impl<T> Versioned<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            generation: 0,
        }
    }

    fn replace(&mut self, items: Vec<T>) {
        self.items = items;
        self.generation += 1;
    }
}

/// Removes its target from the in-flight set when dropped
struct PendingGuard<'a> {
    pending: &'a Mutex<HashSet<MutationTarget>>,
    target: MutationTarget,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(&self.target);
    }
}

/// Applies rule toggles and unblocks, and owns the caches they reconcile
pub struct MutationSynchronizer {
    api: Arc<dyn WafApi>,
    rules: RwLock<Versioned<Rule>>,
    blocked: RwLock<Versioned<BlockedIp>>,
    pending: Mutex<HashSet<MutationTarget>>,
}

impl MutationSynchronizer {
    /// Fetch attempts per load before giving up on a cache that keeps moving
    pub const MAX_LOAD_ATTEMPTS: usize = 3;

    pub fn new(api: Arc<dyn WafApi>) -> Self {
        Self {
            api,
            rules: RwLock::new(Versioned::new()),
            blocked: RwLock::new(Versioned::new()),
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Replace the rule cache from the server.
    ///
    /// Returns the number of cached rules.
    pub async fn load_rules(&self) -> Result<usize> {
        for attempt in 1..=Self::MAX_LOAD_ATTEMPTS {
            let started = self.rules.read().await.generation;
            let rules = self.api.get_rules().await?;

            let mut cache = self.rules.write().await;
            if cache.generation == started {
                cache.replace(rules);
                debug!(count = cache.items.len(), "rule cache loaded");
                return Ok(cache.items.len());
            }
            debug!(attempt, "rule cache changed during load, refetching");
        }

        let count = self.rules.read().await.items.len();
        warn!(count, "rule cache kept changing, keeping current contents");
        Ok(count)
    }

    /// Replace the blocklist cache from the server.
    ///
    /// Returns the number of cached entries.
    pub async fn load_blocked_ips(&self) -> Result<usize> {
        for attempt in 1..=Self::MAX_LOAD_ATTEMPTS {
            let started = self.blocked.read().await.generation;
            let blocked = self.api.get_blocked_ips().await?;

            let mut cache = self.blocked.write().await;
            if cache.generation == started {
                cache.replace(blocked);
                debug!(count = cache.items.len(), "blocklist cache loaded");
                return Ok(cache.items.len());
            }
            debug!(attempt, "blocklist cache changed during load, refetching");
        }

        let count = self.blocked.read().await.items.len();
        warn!(count, "blocklist cache kept changing, keeping current contents");
        Ok(count)
    }

    pub async fn replace_rules(&self, rules: Vec<Rule>) {
        self.rules.write().await.replace(rules);
    }

    pub async fn replace_blocked_ips(&self, blocked: Vec<BlockedIp>) {
        self.blocked.write().await.replace(blocked);
    }

    /// Cached rules
    pub async fn rules(&self) -> Vec<Rule> {
        self.rules.read().await.items.clone()
    }

    /// Cached blocklist
    pub async fn blocked_ips(&self) -> Vec<BlockedIp> {
        self.blocked.read().await.items.clone()
    }

    /// Whether a mutation for `target` is in flight
    pub fn is_pending(&self, target: &MutationTarget) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(target)
    }

    fn begin(&self, target: MutationTarget) -> Result<PendingGuard<'_>> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if !pending.insert(target.clone()) {
            return Err(Error::MutationInProgress(target.to_string()));
        }
        Ok(PendingGuard {
            pending: &self.pending,
            target,
        })
    }

    /// Flip a rule's enabled flag.
    ///
    /// On success the cached rule is replaced by the server's copy and that
    /// copy is returned. On failure the cache is untouched.
    pub async fn toggle_rule(&self, id: Uuid) -> Result<Rule> {
        let _guard = self.begin(MutationTarget::Rule(id))?;

        let updated = match self.api.toggle_rule(id).await {
            Ok(rule) => rule,
            Err(e) => {
                warn!(%id, error = %e, "rule toggle failed");
                return Err(e);
            }
        };

        let mut cache = self.rules.write().await;
        cache.generation += 1;
        if !reconcile_rule(&mut cache.items, updated.clone()) {
            debug!(%id, "toggled rule is not cached");
        }
        info!(%id, enabled = updated.enabled, "rule toggled");
        Ok(updated)
    }

    /// Remove an address from the blocklist.
    ///
    /// The cached entry is dropped only after the server confirms.
    pub async fn unblock(&self, ip: &str) -> Result<UnblockResponse> {
        let _guard = self.begin(MutationTarget::Address(ip.to_string()))?;

        let confirmation = match self.api.unblock_ip(ip).await {
            Ok(confirmation) => confirmation,
            Err(e) => {
                warn!(%ip, error = %e, "unblock failed");
                return Err(e);
            }
        };

        let mut cache = self.blocked.write().await;
        cache.generation += 1;
        let removed = remove_address(&mut cache.items, ip);
        info!(%ip, removed, "address unblocked");
        Ok(confirmation)
    }
}
