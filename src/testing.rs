//! In-memory [`WafApi`] double for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Barrier;
use uuid::Uuid;

use crate::client::WafApi;
use crate::error::{Error, Result};
use crate::types::{Action, BlockedIp, Event, LogQuery, Rule, Stats, UnblockResponse};

#[derive(Default)]
pub(crate) struct MockWaf {
    stats: Mutex<VecDeque<Result<Stats>>>,
    stats_calls: AtomicUsize,
    rules: Mutex<Vec<Rule>>,
    blocked: Mutex<Vec<BlockedIp>>,
    fail_mutations: AtomicBool,
    mutation_gate: Mutex<Option<Arc<Barrier>>>,
    listing_gate: Mutex<Option<Arc<Barrier>>>,
    listing_calls: AtomicUsize,
}

impl MockWaf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_error() -> Error {
        Error::Http {
            status: 500,
            status_text: "Internal Server Error".to_string(),
            body: "boom".to_string(),
        }
    }

    fn not_found(detail: &str) -> Error {
        Error::Http {
            status: 404,
            status_text: "Not Found".to_string(),
            body: format!(r#"{{"detail":"{detail}"}}"#),
        }
    }

    pub fn script_stats<I>(&self, results: I)
    where
        I: IntoIterator<Item = Result<Stats>>,
    {
        self.stats.lock().unwrap().extend(results);
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn set_rules(&self, rules: Vec<Rule>) {
        *self.rules.lock().unwrap() = rules;
    }

    pub fn set_blocked(&self, blocked: Vec<BlockedIp>) {
        *self.blocked.lock().unwrap() = blocked;
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    /// Hold every mutation until `barrier` releases it
    pub fn gate_mutations(&self, barrier: Arc<Barrier>) {
        *self.mutation_gate.lock().unwrap() = Some(barrier);
    }

    /// Hold the next rule or blocklist listing, already read, until `barrier`
    /// releases it. Later listings are not held.
    pub fn gate_next_listing(&self, barrier: Arc<Barrier>) {
        *self.listing_gate.lock().unwrap() = Some(barrier);
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    async fn hold_listing(&self) {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.listing_gate.lock().unwrap().take();
        if let Some(barrier) = gate {
            barrier.wait().await;
        }
    }

    async fn pass_gate(&self) -> Result<()> {
        let gate = self.mutation_gate.lock().unwrap().clone();
        if let Some(barrier) = gate {
            barrier.wait().await;
        }
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        Ok(())
    }
}

#[async_trait]
impl WafApi for MockWaf {
    async fn get_logs(&self, query: LogQuery) -> Result<Vec<Event>> {
        let count = query.effective_limit().min(3);
        Ok((0..count).map(|n| sample_event(n as i64)).collect())
    }

    async fn get_stats(&self) -> Result<Stats> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.stats
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::server_error()))
    }

    async fn get_rules(&self) -> Result<Vec<Rule>> {
        let listing = self.rules.lock().unwrap().clone();
        self.hold_listing().await;
        Ok(listing)
    }

    async fn toggle_rule(&self, id: Uuid) -> Result<Rule> {
        self.pass_gate().await?;
        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Self::not_found("Rule not found"))?;
        rule.enabled = !rule.enabled;
        Ok(rule.clone())
    }

    async fn get_blocked_ips(&self) -> Result<Vec<BlockedIp>> {
        let listing = self.blocked.lock().unwrap().clone();
        self.hold_listing().await;
        Ok(listing)
    }

    async fn unblock_ip(&self, ip: &str) -> Result<UnblockResponse> {
        self.pass_gate().await?;
        let mut blocked = self.blocked.lock().unwrap();
        let before = blocked.len();
        blocked.retain(|entry| entry.ip_address != ip);
        if blocked.len() == before {
            return Err(Self::not_found("IP not found in blocklist"));
        }
        Ok(UnblockResponse {
            message: format!("{ip} has been unblocked"),
        })
    }
}

pub(crate) fn sample_event(n: i64) -> Event {
    Event {
        id: Uuid::new_v4(),
        ip_address: format!("203.0.113.{}", n % 250),
        method: "GET".to_string(),
        endpoint: format!("/page/{n}"),
        threat_score: n,
        action_taken: Action::Allow,
        threat_types: Vec::new(),
        created_at: None,
    }
}

pub(crate) fn sample_rule(name: &str, enabled: bool) -> Rule {
    Rule {
        id: Uuid::new_v4(),
        name: name.to_string(),
        kind: "SQLi".to_string(),
        pattern: r"union\s+(all\s+)?select".to_string(),
        score: 60,
        action: "block".to_string(),
        enabled,
        created_at: None,
    }
}

pub(crate) fn sample_blocked(ip: &str) -> BlockedIp {
    BlockedIp {
        id: Uuid::new_v4(),
        ip_address: ip.to_string(),
        reason: Some("threat score exceeded".to_string()),
        expires_at: None,
        created_at: None,
    }
}
