//! Wire types shared by the snapshot client, the live feed and the caches.
//!
//! Field names follow the WAF's JSON exactly so every type round-trips
//! through `serde_json` without renaming at the call sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Action the WAF took for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Forwarded upstream
    Allow,
    /// Rejected
    Block,
    /// Throttled
    RateLimit,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Allow => "allow",
            Action::Block => "block",
            Action::RateLimit => "rate_limit",
        };
        f.write_str(name)
    }
}

/// One classified request observed by the WAF.
///
/// Produced only by the server; the client appends and evicts events but
/// never edits one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub ip_address: String,
    pub method: String,
    pub endpoint: String,
    pub threat_score: i64,
    pub action_taken: Action,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub threat_types: Vec<String>,
    #[serde(default, with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Whether the request was classified into at least one threat category
    pub fn is_threat(&self) -> bool {
        !self.threat_types.is_empty()
    }
}

/// Request count for one source address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpCount {
    pub ip: String,
    pub count: u64,
}

/// Occurrences of one threat category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatCount {
    #[serde(rename = "type")]
    pub threat_type: String,
    pub count: u64,
}

/// One bucket of the hourly request histogram
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyCount {
    /// Bucket label, `HH:MM`
    pub hour: String,
    pub count: u64,
}

/// Aggregate statistics snapshot, always replaced as a whole
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub allowed_requests: u64,
    #[serde(default)]
    pub top_ips: Vec<IpCount>,
    #[serde(default)]
    pub threat_distribution: Vec<ThreatCount>,
    #[serde(default)]
    pub requests_over_time: Vec<HourlyCount>,
}

impl Stats {
    /// Requests that were neither blocked nor allowed outright
    pub fn rate_limited_requests(&self) -> u64 {
        self.total_requests
            .saturating_sub(self.blocked_requests)
            .saturating_sub(self.allowed_requests)
    }
}

/// Detection rule as configured on the WAF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub name: String,
    /// Matcher type, e.g. `SQLi` or `XSS`
    #[serde(rename = "type")]
    pub kind: String,
    pub pattern: String,
    /// Score added when the pattern matches
    pub score: i64,
    pub action: String,
    pub enabled: bool,
    #[serde(default, with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Entry of the WAF blocklist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedIp {
    pub id: Uuid,
    pub ip_address: String,
    #[serde(default)]
    pub reason: Option<String>,
    /// `None` means the block never expires
    #[serde(default, with = "timestamp")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl BlockedIp {
    pub fn is_permanent(&self) -> bool {
        self.expires_at.is_none()
    }
}

/// Confirmation returned by the unblock endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnblockResponse {
    pub message: String,
}

/// Liveness report from `/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub service: String,
}

/// Dependency report from `/ready`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub db: String,
    pub redis: String,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.db == "ok" && self.redis == "ok"
    }
}

/// Page selector for the event history resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    pub limit: u32,
    pub offset: u32,
}

impl LogQuery {
    /// Largest page the WAF accepts
    pub const MAX_LIMIT: u32 = 200;

    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    /// Limit clamped into the range the server accepts
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, Self::MAX_LIMIT)
    }
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Lenient timestamp codec.
///
/// The WAF emits `isoformat()` strings which carry an offset for
/// timezone-aware columns and none for naive ones. Naive values are read as
/// UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
        }
    }
}
