use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::LazyLock;

use crate::alert::{ActivityKind, AlertDraft, Severity, TimeWindows};
use crate::chain::types::{arg_to_string, Call, Extrinsic};
use crate::config::MonitoringConfig;

use super::Analyzer;

static AMOUNT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)amount"?\s*:\s*"?(\d+)"#).ok());

const TRANSFER_MARKERS: [&str; 2] = ["TransferAsset", "TransferReserveAsset"];

/// One outgoing transfer, kept per sender for route analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub destination: String,
    pub timestamp: DateTime<Utc>,
}

/// `xcmPallet` calls this analyzer understands.
enum XcmCall {
    SendMessage { destination: String, message: String },
}

impl XcmCall {
    fn classify(call: &Call) -> eyre::Result<Option<Self>> {
        match (call.section.as_str(), call.method.as_str()) {
            ("xcmPallet", "send") => {
                let destination = call
                    .arg(0)
                    .map(arg_to_string)
                    .ok_or_else(|| eyre::eyre!("xcmPallet.send is missing its destination"))?;
                let message = call
                    .arg(1)
                    .map(arg_to_string)
                    .ok_or_else(|| eyre::eyre!("xcmPallet.send is missing its message"))?;
                Ok(Some(Self::SendMessage {
                    destination,
                    message,
                }))
            }
            _ => Ok(None),
        }
    }
}

/// Whether a serialized XCM message carries a transfer instruction.
pub fn is_transfer_message(message: &str) -> bool {
    TRANSFER_MARKERS.iter().any(|m| message.contains(m))
}

/// Pull the first `amount: <digits>` token out of a serialized message.
/// Returns zero when no amount can be found.
pub fn extract_amount(message: &str) -> u128 {
    AMOUNT_PATTERN
        .as_ref()
        .and_then(|re| re.captures(message))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u128>().ok())
        .unwrap_or(0)
}

/// True when a sender keeps cycling through a small set of destinations:
/// at least three transfers with fewer than half as many distinct destinations.
pub fn detect_circular_pattern(routes: &[RouteRecord]) -> bool {
    if routes.len() < 3 {
        return false;
    }
    let distinct: HashSet<&str> = routes.iter().map(|r| r.destination.as_str()).collect();
    distinct.len() * 2 < routes.len()
}

/// Detects cross-chain messaging abuse: large transfers, message spam between
/// a sender/destination pair, circular routing and known bridge exploit markers.
///
/// Message inspection is textual. Amounts in a schema the pattern does not
/// recognise are read as zero, so large transfers can be missed.
pub struct CrossChainAnalyzer {
    transfer_threshold: u128,
    transaction_count_threshold: usize,
    exploit_patterns: Vec<String>,
    pair_transfers: HashMap<(String, String), VecDeque<DateTime<Utc>>>,
    sender_routes: HashMap<String, VecDeque<RouteRecord>>,
}

impl CrossChainAnalyzer {
    pub fn new(config: &MonitoringConfig) -> Self {
        Self {
            transfer_threshold: u128::from(config.cross_chain_transfer_threshold),
            transaction_count_threshold: config.transaction_count_threshold,
            exploit_patterns: config
                .bridge_exploit_patterns
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
            pair_transfers: HashMap::new(),
            sender_routes: HashMap::new(),
        }
    }

    /// Record a transfer for `(sender, destination)` and return the number of
    /// transfers for the pair within the last hour.
    fn track_transfer_frequency(
        &mut self,
        sender: &str,
        destination: &str,
        now: DateTime<Utc>,
    ) -> usize {
        let timestamps = self
            .pair_transfers
            .entry((sender.to_string(), destination.to_string()))
            .or_default();
        timestamps.push_back(now);

        let cutoff = now - TimeWindows::HOUR;
        while timestamps.front().is_some_and(|t| *t <= cutoff) {
            timestamps.pop_front();
        }
        timestamps.len()
    }

    /// Record the route and return the sender's routes within the last hour.
    fn track_route(
        &mut self,
        sender: &str,
        destination: &str,
        now: DateTime<Utc>,
    ) -> Vec<RouteRecord> {
        let routes = self.sender_routes.entry(sender.to_string()).or_default();
        routes.push_back(RouteRecord {
            destination: destination.to_string(),
            timestamp: now,
        });

        let cutoff = now - TimeWindows::HOUR;
        while routes.front().is_some_and(|r| r.timestamp <= cutoff) {
            routes.pop_front();
        }
        routes.iter().cloned().collect()
    }
}

impl Analyzer for CrossChainAnalyzer {
    fn name(&self) -> &'static str {
        "CrossChainMonitor"
    }

    fn analyze(
        &mut self,
        extrinsic: &Extrinsic,
        now: DateTime<Utc>,
        alerts: &mut Vec<AlertDraft>,
    ) -> eyre::Result<()> {
        let Some(XcmCall::SendMessage {
            destination,
            message,
        }) = XcmCall::classify(&extrinsic.method)?
        else {
            return Ok(());
        };
        let Some(sender) = extrinsic.signer.as_deref() else {
            return Ok(());
        };

        if is_transfer_message(&message) {
            let amount = extract_amount(&message);
            if amount > self.transfer_threshold {
                alerts.push(
                    AlertDraft::new(ActivityKind::LargeCrossChainTransfer)
                        .severity(Severity::High)
                        .detail("sender", sender)
                        .detail("destination", destination.as_str())
                        .detail("amount", amount.to_string()),
                );
            }

            let pair_count = self.track_transfer_frequency(sender, &destination, now);
            if pair_count > self.transaction_count_threshold {
                alerts.push(
                    AlertDraft::new(ActivityKind::XcmpSpam)
                        .severity(Severity::Medium)
                        .detail("sender", sender)
                        .detail("destination", destination.as_str())
                        .detail("transfer_count", pair_count)
                        .detail("time_window", "1 hour"),
                );
            }

            let routes = self.track_route(sender, &destination, now);
            if detect_circular_pattern(&routes) {
                let distinct: HashSet<&str> =
                    routes.iter().map(|r| r.destination.as_str()).collect();
                alerts.push(
                    AlertDraft::new(ActivityKind::SuspiciousBridgeActivity)
                        .severity(Severity::High)
                        .detail("pattern", "circular_transfer")
                        .detail("sender", sender)
                        .detail("transfer_count", routes.len())
                        .detail("unique_destinations", distinct.len()),
                );
            }
        }

        for pattern in &self.exploit_patterns {
            if message.contains(pattern.as_str()) {
                alerts.push(
                    AlertDraft::new(ActivityKind::SuspiciousBridgeActivity)
                        .severity(Severity::Critical)
                        .detail("pattern", pattern.as_str())
                        .detail("sender", sender)
                        .detail("destination", destination.as_str()),
                );
            }
        }

        Ok(())
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - TimeWindows::DAY;

        self.pair_transfers.retain(|_, timestamps| {
            timestamps.retain(|t| *t > cutoff);
            !timestamps.is_empty()
        });

        self.sender_routes.retain(|_, routes| {
            routes.retain(|r| r.timestamp > cutoff);
            !routes.is_empty()
        });
    }

    fn tracked_entities(&self) -> usize {
        self.pair_transfers.len() + self.sender_routes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::test_support::run;
    use chrono::TimeDelta;
    use serde_json::json;

    fn analyzer() -> CrossChainAnalyzer {
        CrossChainAnalyzer::new(&MonitoringConfig::default())
    }

    fn xcm_send(sender: &str, dest: &str, message: serde_json::Value) -> Extrinsic {
        Extrinsic::signed(sender, Call::new("xcmPallet", "send", vec![json!(dest), message]))
    }

    fn transfer_msg(amount: u64) -> serde_json::Value {
        json!({"instructions": [{"TransferAsset": {"amount": amount, "beneficiary": "bob"}}]})
    }

    fn routes(dests: &[&str]) -> Vec<RouteRecord> {
        let now = Utc::now();
        dests
            .iter()
            .map(|d| RouteRecord {
                destination: d.to_string(),
                timestamp: now,
            })
            .collect()
    }

    #[test]
    fn test_extract_amount() {
        assert_eq!(extract_amount("TransferAsset { amount: 1234 }"), 1234);
        assert_eq!(extract_amount(r#"{"Amount":"77"}"#), 77);
        assert_eq!(extract_amount(r#"{"amount":42}"#), 42);
        assert_eq!(extract_amount("TransferAsset { fun: Fungible(5) }"), 0);
    }

    #[test]
    fn test_circular_pattern_boundaries() {
        // 3 transfers, 2 distinct: 2 < 1.5 is false
        assert!(!detect_circular_pattern(&routes(&["B", "C", "B"])));
        // 3 distinct destinations
        assert!(!detect_circular_pattern(&routes(&["B", "C", "D"])));
        // 3 transfers, 1 distinct
        assert!(detect_circular_pattern(&routes(&["B", "B", "B"])));
        // 4 transfers, 2 distinct: 2 < 2 is false
        assert!(!detect_circular_pattern(&routes(&["B", "C", "B", "C"])));
        // 5 transfers, 2 distinct: 2 < 2.5
        assert!(detect_circular_pattern(&routes(&["B", "C", "B", "C", "B"])));
        // fewer than 3 transfers never qualifies
        assert!(!detect_circular_pattern(&routes(&["B", "B"])));
    }

    #[test]
    fn test_large_transfer() {
        let mut a = analyzer();
        let ext = xcm_send("alice", "Parachain(2000)", transfer_msg(600_000_000_000));
        let alerts = run(&mut a, &ext, Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, ActivityKind::LargeCrossChainTransfer);
        assert_eq!(alerts[0].severity, Some(Severity::High));
        assert_eq!(alerts[0].details["amount"], "600000000000");
    }

    #[test]
    fn test_non_transfer_message_not_tracked() {
        let mut a = analyzer();
        let msg = json!({"instructions": [{"Transact": {"call": "0x00"}}]});
        assert!(run(&mut a, &xcm_send("alice", "Parachain(2000)", msg), Utc::now()).is_empty());
        assert_eq!(a.tracked_entities(), 0);
    }

    #[test]
    fn test_xcmp_spam_per_pair() {
        let mut a = analyzer();
        let start = Utc::now();

        for i in 0..10 {
            let ext = xcm_send("alice", "P1", transfer_msg(1));
            let alerts = run(&mut a, &ext, start + TimeDelta::seconds(i));
            assert!(alerts.iter().all(|d| d.kind != ActivityKind::XcmpSpam));
        }

        let ext = xcm_send("alice", "P1", transfer_msg(1));
        let alerts = run(&mut a, &ext, start + TimeDelta::seconds(10));
        let spam: Vec<_> = alerts.iter().filter(|d| d.kind == ActivityKind::XcmpSpam).collect();
        assert_eq!(spam.len(), 1);
        assert_eq!(spam[0].details["transfer_count"], 11);

        // Different destination is a separate pair
        let ext = xcm_send("alice", "P2", transfer_msg(1));
        let alerts = run(&mut a, &ext, start + TimeDelta::seconds(11));
        assert!(alerts.iter().all(|d| d.kind != ActivityKind::XcmpSpam));
    }

    #[test]
    fn test_circular_transfer_alert() {
        let mut a = analyzer();
        let now = Utc::now();

        let first = run(&mut a, &xcm_send("alice", "B", transfer_msg(1)), now);
        let second = run(&mut a, &xcm_send("alice", "C", transfer_msg(1)), now);
        let third = run(&mut a, &xcm_send("alice", "B", transfer_msg(1)), now);
        assert!(first.is_empty() && second.is_empty() && third.is_empty());

        let fourth = run(&mut a, &xcm_send("alice", "B", transfer_msg(1)), now);
        assert!(fourth.is_empty()); // 2 distinct of 4

        let fifth = run(&mut a, &xcm_send("alice", "B", transfer_msg(1)), now);
        assert_eq!(fifth.len(), 1);
        assert_eq!(fifth[0].kind, ActivityKind::SuspiciousBridgeActivity);
        assert_eq!(fifth[0].details["pattern"], "circular_transfer");
        assert_eq!(fifth[0].severity, Some(Severity::High));
    }

    #[test]
    fn test_bridge_exploit_marker_is_critical() {
        let mut a = analyzer();
        let msg = json!({"instructions": [{"Transact": {"call": "ReentrantBridgeCall"}}]});
        let alerts = run(&mut a, &xcm_send("mallory", "Parachain(1000)", msg), Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, ActivityKind::SuspiciousBridgeActivity);
        assert_eq!(alerts[0].severity, Some(Severity::Critical));
        assert_eq!(alerts[0].details["pattern"], "ReentrantBridgeCall");
    }

    #[test]
    fn test_unrecognized_xcm_call_is_noop() {
        let mut a = analyzer();
        let ext = Extrinsic::signed(
            "alice",
            Call::new("xcmPallet", "execute", vec![transfer_msg(1)]),
        );
        assert!(run(&mut a, &ext, Utc::now()).is_empty());
    }

    #[test]
    fn test_evict_after_a_day_is_idempotent() {
        let mut a = analyzer();
        let start = Utc::now();
        run(&mut a, &xcm_send("alice", "P1", transfer_msg(1)), start);
        assert_eq!(a.tracked_entities(), 2);

        a.evict(start + TimeWindows::HOUR * 2);
        assert_eq!(a.tracked_entities(), 2);

        let later = start + TimeWindows::DAY + TimeDelta::seconds(1);
        a.evict(later);
        assert_eq!(a.tracked_entities(), 0);
        a.evict(later);
        assert_eq!(a.tracked_entities(), 0);
    }
}
