use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Kinds of suspicious activity the analyzers can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    // Account-related
    NewAccountLargeTransaction,
    DormantAccountActivity,
    HighFrequencyTrading,
    AccountDraining,

    // Contract-related
    MaliciousContract,
    ContractSelfDestruct,
    SuspiciousContractCall,
    ReentrantCall,

    // Cross-chain
    LargeCrossChainTransfer,
    SuspiciousBridgeActivity,
    XcmpSpam,

    // Governance
    SuspiciousVotingPattern,
    GovernanceSpam,
    UnusualDelegation,
    CoordinatedVoting,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewAccountLargeTransaction => "NewAccountLargeTransaction",
            Self::DormantAccountActivity => "DormantAccountActivity",
            Self::HighFrequencyTrading => "HighFrequencyTrading",
            Self::AccountDraining => "AccountDraining",
            Self::MaliciousContract => "MaliciousContract",
            Self::ContractSelfDestruct => "ContractSelfDestruct",
            Self::SuspiciousContractCall => "SuspiciousContractCall",
            Self::ReentrantCall => "ReentrantCall",
            Self::LargeCrossChainTransfer => "LargeCrossChainTransfer",
            Self::SuspiciousBridgeActivity => "SuspiciousBridgeActivity",
            Self::XcmpSpam => "XcmpSpam",
            Self::SuspiciousVotingPattern => "SuspiciousVotingPattern",
            Self::GovernanceSpam => "GovernanceSpam",
            Self::UnusualDelegation => "UnusualDelegation",
            Self::CoordinatedVoting => "CoordinatedVoting",
        }
    }
}

/// Alert severity. Ordered so that filters can use `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Fixed monitoring windows shared by every analyzer.
pub struct TimeWindows;

impl TimeWindows {
    pub const MINUTE: TimeDelta = TimeDelta::seconds(60);
    pub const HOUR: TimeDelta = TimeDelta::seconds(60 * 60);
    pub const DAY: TimeDelta = TimeDelta::seconds(24 * 60 * 60);
    pub const WEEK: TimeDelta = TimeDelta::seconds(7 * 24 * 60 * 60);

    /// Configured window in seconds, saturating at `TimeDelta::MAX`.
    pub fn from_secs(secs: u64) -> TimeDelta {
        i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

/// Alert contents as produced by an analyzer, before it is stamped.
#[derive(Debug, Clone)]
pub struct AlertDraft {
    pub kind: ActivityKind,
    /// Falls back to `Severity::Medium` when unset.
    pub severity: Option<Severity>,
    pub details: Map<String, JsonValue>,
}

impl AlertDraft {
    pub fn new(kind: ActivityKind) -> Self {
        Self {
            kind,
            severity: None,
            details: Map::new(),
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// A stamped, immutable alert record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub monitor: String,
    pub details: Map<String, JsonValue>,
}

impl Alert {
    /// Stamp a draft with the reporting monitor and time.
    pub fn from_draft(draft: AlertDraft, monitor: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: draft.kind,
            severity: draft.severity.unwrap_or_default(),
            timestamp,
            monitor: monitor.to_string(),
            details: draft.details,
        }
    }
}
