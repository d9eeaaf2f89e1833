use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::alert::{ActivityKind, AlertDraft, Severity, TimeWindows};
use crate::chain::types::{arg_as_u128, arg_to_string, Call, Extrinsic};
use crate::config::MonitoringConfig;

use super::Analyzer;

#[derive(Debug, Clone)]
pub struct ProposalRecord {
    pub timestamp: DateTime<Utc>,
    pub hash: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct VoteRecord {
    pub timestamp: DateTime<Utc>,
    pub referendum: String,
    /// Canonical JSON of the vote, compared for equality.
    pub choice: String,
}

#[derive(Debug, Clone)]
pub struct DelegationRecord {
    pub timestamp: DateTime<Utc>,
    pub target: String,
    pub amount: u128,
    pub conviction: String,
}

/// Accounts that cast the identical vote on one referendum.
#[derive(Debug, Clone, Default)]
pub struct Coalition {
    pub accounts: BTreeSet<String>,
    pub last_vote: Option<DateTime<Utc>>,
    /// Set once the coalition has been reported.
    pub reported: bool,
}

/// `democracy` calls this analyzer understands.
enum DemocracyCall {
    Propose { hash: String, value: String },
    Vote { referendum: String, choice: String },
    Delegate { target: String, amount: u128, conviction: String },
    Second,
}

impl DemocracyCall {
    fn classify(call: &Call) -> eyre::Result<Option<Self>> {
        if call.section != "democracy" {
            return Ok(None);
        }

        let parsed = match call.method.as_str() {
            "propose" => Self::Propose {
                hash: arg_to_string(required_arg(call, 0, "proposal")?),
                value: call.arg(1).map(arg_to_string).unwrap_or_default(),
            },
            "vote" => Self::Vote {
                referendum: arg_to_string(required_arg(call, 0, "ref_index")?),
                choice: canonical_vote(required_arg(call, 1, "vote")?),
            },
            "delegate" => {
                let raw = required_arg(call, 1, "amount")?;
                Self::Delegate {
                    target: arg_to_string(required_arg(call, 0, "target")?),
                    amount: arg_as_u128(raw).ok_or_else(|| {
                        eyre::eyre!("democracy.delegate has a non-numeric amount: {}", raw)
                    })?,
                    conviction: call.arg(2).map(arg_to_string).unwrap_or_default(),
                }
            }
            "second" => Self::Second,
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }
}

fn required_arg<'a>(call: &'a Call, index: usize, name: &str) -> eyre::Result<&'a JsonValue> {
    call.arg(index)
        .ok_or_else(|| eyre::eyre!("{} is missing argument {} ({})", call.path(), index, name))
}

/// Object keys serialize in sorted order, so equal votes give equal strings.
fn canonical_vote(vote: &JsonValue) -> String {
    serde_json::to_string(vote).unwrap_or_else(|_| vote.to_string())
}

/// Number of times consecutive votes differ.
pub fn count_vote_changes(votes: &[&VoteRecord]) -> usize {
    votes.windows(2).filter(|w| w[0].choice != w[1].choice).count()
}

/// Detects governance manipulation: proposal spam, vote flipping, coordinated
/// voting blocs and unusually large delegations.
pub struct GovernanceAnalyzer {
    voting_threshold: usize,
    delegation_threshold: u128,
    proposals: HashMap<String, VecDeque<ProposalRecord>>,
    votes: HashMap<String, VecDeque<VoteRecord>>,
    delegations: HashMap<String, VecDeque<DelegationRecord>>,
    coalitions: HashMap<(String, String), Coalition>,
}

impl GovernanceAnalyzer {
    pub fn new(config: &MonitoringConfig) -> Self {
        Self {
            voting_threshold: config.suspicious_voting_threshold,
            delegation_threshold: u128::from(config.large_delegation_threshold),
            proposals: HashMap::new(),
            votes: HashMap::new(),
            delegations: HashMap::new(),
            coalitions: HashMap::new(),
        }
    }

    pub fn coalition(&self, referendum: &str, choice: &JsonValue) -> Option<&Coalition> {
        self.coalitions
            .get(&(referendum.to_string(), canonical_vote(choice)))
    }

    fn monitor_proposal(
        &mut self,
        account: &str,
        hash: String,
        value: String,
        now: DateTime<Utc>,
        alerts: &mut Vec<AlertDraft>,
    ) {
        let proposals = self.proposals.entry(account.to_string()).or_default();
        proposals.push_back(ProposalRecord {
            timestamp: now,
            hash,
            value,
        });
        prune_front(proposals, now - TimeWindows::DAY, |p| p.timestamp);

        if proposals.len() > self.voting_threshold {
            alerts.push(
                AlertDraft::new(ActivityKind::GovernanceSpam)
                    .severity(Severity::High)
                    .detail("account", account)
                    .detail("proposal_count", proposals.len())
                    .detail("time_window", "24 hours"),
            );
        }
    }

    fn monitor_vote(
        &mut self,
        account: &str,
        referendum: String,
        choice: String,
        now: DateTime<Utc>,
        alerts: &mut Vec<AlertDraft>,
    ) {
        let votes = self.votes.entry(account.to_string()).or_default();
        votes.push_back(VoteRecord {
            timestamp: now,
            referendum: referendum.clone(),
            choice: choice.clone(),
        });
        prune_front(votes, now - TimeWindows::WEEK, |v| v.timestamp);

        let day_cutoff = now - TimeWindows::DAY;
        let recent: Vec<&VoteRecord> = votes.iter().filter(|v| v.timestamp > day_cutoff).collect();
        let changes = count_vote_changes(&recent);
        if changes > self.voting_threshold {
            alerts.push(
                AlertDraft::new(ActivityKind::SuspiciousVotingPattern)
                    .severity(Severity::High)
                    .detail("account", account)
                    .detail("vote_changes", changes)
                    .detail("time_window", "24 hours"),
            );
        }

        let coalition = self
            .coalitions
            .entry((referendum.clone(), choice))
            .or_default();
        coalition.accounts.insert(account.to_string());
        coalition.last_vote = Some(now);

        if !coalition.reported && coalition.accounts.len() >= self.voting_threshold {
            coalition.reported = true;
            let members: Vec<JsonValue> = coalition
                .accounts
                .iter()
                .map(|a| JsonValue::from(a.as_str()))
                .collect();
            alerts.push(
                AlertDraft::new(ActivityKind::CoordinatedVoting)
                    .severity(Severity::High)
                    .detail("referendum_index", referendum)
                    .detail("coalition_size", coalition.accounts.len())
                    .detail("accounts", members),
            );
        }
    }

    fn monitor_delegation(
        &mut self,
        account: &str,
        record: DelegationRecord,
        alerts: &mut Vec<AlertDraft>,
    ) {
        if record.amount > self.delegation_threshold {
            alerts.push(
                AlertDraft::new(ActivityKind::UnusualDelegation)
                    .severity(Severity::Medium)
                    .detail("account", account)
                    .detail("target", record.target.as_str())
                    .detail("amount", record.amount.to_string())
                    .detail("conviction", record.conviction.as_str()),
            );
        }

        let cutoff = record.timestamp - TimeWindows::WEEK;
        let delegations = self.delegations.entry(account.to_string()).or_default();
        delegations.push_back(record);
        prune_front(delegations, cutoff, |d| d.timestamp);
    }
}

/// Pop records from the front while they are at or before `cutoff`.
fn prune_front<T>(
    records: &mut VecDeque<T>,
    cutoff: DateTime<Utc>,
    ts: impl Fn(&T) -> DateTime<Utc>,
) {
    while records.front().is_some_and(|r| ts(r) <= cutoff) {
        records.pop_front();
    }
}

/// Keep records newer than `cutoff`; report whether any remain.
fn retain_newer<T>(
    records: &mut VecDeque<T>,
    cutoff: DateTime<Utc>,
    ts: impl Fn(&T) -> DateTime<Utc>,
) -> bool {
    records.retain(|r| ts(r) > cutoff);
    !records.is_empty()
}

impl Analyzer for GovernanceAnalyzer {
    fn name(&self) -> &'static str {
        "GovernanceMonitor"
    }

    fn analyze(
        &mut self,
        extrinsic: &Extrinsic,
        now: DateTime<Utc>,
        alerts: &mut Vec<AlertDraft>,
    ) -> eyre::Result<()> {
        let Some(call) = DemocracyCall::classify(&extrinsic.method)? else {
            return Ok(());
        };
        let Some(account) = extrinsic.signer.as_deref() else {
            return Ok(());
        };

        match call {
            DemocracyCall::Propose { hash, value } => {
                self.monitor_proposal(account, hash, value, now, alerts);
            }
            DemocracyCall::Vote { referendum, choice } => {
                self.monitor_vote(account, referendum, choice, now, alerts);
            }
            DemocracyCall::Delegate {
                target,
                amount,
                conviction,
            } => {
                let record = DelegationRecord {
                    timestamp: now,
                    target,
                    amount,
                    conviction,
                };
                self.monitor_delegation(account, record, alerts);
            }
            // Seconding is recognised but carries no checks yet.
            DemocracyCall::Second => {}
        }

        Ok(())
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let day_ago = now - TimeWindows::DAY;
        let week_ago = now - TimeWindows::WEEK;

        self.proposals
            .retain(|_, records| retain_newer(records, day_ago, |p| p.timestamp));
        self.votes
            .retain(|_, records| retain_newer(records, week_ago, |v| v.timestamp));
        self.delegations
            .retain(|_, records| retain_newer(records, week_ago, |d| d.timestamp));
        self.coalitions
            .retain(|_, coalition| coalition.last_vote.is_some_and(|t| t > week_ago));
    }

    fn tracked_entities(&self) -> usize {
        self.proposals.len() + self.votes.len() + self.delegations.len() + self.coalitions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::test_support::run;
    use chrono::TimeDelta;
    use serde_json::json;

    fn analyzer() -> GovernanceAnalyzer {
        GovernanceAnalyzer::new(&MonitoringConfig::default())
    }

    fn propose(account: &str) -> Extrinsic {
        Extrinsic::signed(
            account,
            Call::new("democracy", "propose", vec![json!("0xabcdef"), json!(1000)]),
        )
    }

    fn vote(account: &str, referendum: u32, choice: JsonValue) -> Extrinsic {
        Extrinsic::signed(
            account,
            Call::new("democracy", "vote", vec![json!(referendum), choice]),
        )
    }

    fn aye() -> JsonValue {
        json!({"Standard": {"vote": {"aye": true, "conviction": "Locked1x"}, "balance": 100}})
    }

    fn nay() -> JsonValue {
        json!({"Standard": {"vote": {"aye": false, "conviction": "Locked1x"}, "balance": 100}})
    }

    #[test]
    fn test_proposal_spam_fires_after_sixth() {
        let mut a = analyzer();
        let start = Utc::now();
        let mut fired = Vec::new();
        for i in 0..6 {
            let alerts = run(&mut a, &propose("spammer"), start + TimeDelta::milliseconds(i * 100));
            fired.push(alerts.len());
        }
        assert_eq!(fired, vec![0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_proposals_outside_day_do_not_count() {
        let mut a = analyzer();
        let start = Utc::now();
        for _ in 0..5 {
            run(&mut a, &propose("alice"), start);
        }
        let later = start + TimeWindows::DAY;
        assert!(run(&mut a, &propose("alice"), later).is_empty());
    }

    #[test]
    fn test_vote_flipping() {
        let mut a = analyzer();
        let start = Utc::now();
        // Six votes alternate five times: at the threshold, not over it.
        for i in 0..6 {
            let choice = if i % 2 == 0 { aye() } else { nay() };
            let alerts = run(&mut a, &vote("flipper", 1, choice), start + TimeDelta::seconds(i));
            assert!(alerts.iter().all(|d| d.kind != ActivityKind::SuspiciousVotingPattern));
        }

        let alerts = run(&mut a, &vote("flipper", 1, aye()), start + TimeDelta::seconds(6));
        let flips: Vec<_> = alerts
            .iter()
            .filter(|d| d.kind == ActivityKind::SuspiciousVotingPattern)
            .collect();
        assert_eq!(flips.len(), 1);
        assert_eq!(flips[0].details["vote_changes"], 6);
    }

    #[test]
    fn test_coordinated_voting_latches() {
        let mut a = analyzer();
        let now = Utc::now();
        let accounts = ["a1", "a2", "a3", "a4", "a5"];

        let mut coordinated = Vec::new();
        for acc in accounts {
            for d in run(&mut a, &vote(acc, 7, aye()), now) {
                if d.kind == ActivityKind::CoordinatedVoting {
                    coordinated.push(d);
                }
            }
        }
        assert_eq!(coordinated.len(), 1);
        assert_eq!(coordinated[0].details["coalition_size"], 5);
        assert_eq!(coordinated[0].details["referendum_index"], "7");
        assert_eq!(
            coordinated[0].details["accounts"],
            json!(["a1", "a2", "a3", "a4", "a5"])
        );

        // A sixth identical vote joins the coalition without a second alert.
        let alerts = run(&mut a, &vote("a6", 7, aye()), now);
        assert!(alerts.iter().all(|d| d.kind != ActivityKind::CoordinatedVoting));
        assert_eq!(a.coalition("7", &aye()).unwrap().accounts.len(), 6);
    }

    #[test]
    fn test_different_choice_is_separate_coalition() {
        let mut a = analyzer();
        let now = Utc::now();
        for acc in ["a1", "a2", "a3", "a4"] {
            run(&mut a, &vote(acc, 7, aye()), now);
        }
        let alerts = run(&mut a, &vote("a5", 7, nay()), now);
        assert!(alerts.is_empty());
        let alerts = run(&mut a, &vote("a5", 8, aye()), now);
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_large_delegation() {
        let mut a = analyzer();
        let ext = Extrinsic::signed(
            "whale",
            Call::new(
                "democracy",
                "delegate",
                vec![json!("proxy"), json!("200000000000"), json!("Locked6x")],
            ),
        );
        let alerts = run(&mut a, &ext, Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, ActivityKind::UnusualDelegation);
        assert_eq!(alerts[0].severity, Some(Severity::Medium));
        assert_eq!(alerts[0].details["target"], "proxy");
    }

    #[test]
    fn test_delegation_beyond_u64() {
        let mut a = analyzer();
        let raw = r#"{"signer": "whale", "method": {"section": "democracy", "method": "delegate",
            "args": ["proxy", 20000000000000000000, "Locked1x"]}}"#;
        let ext: Extrinsic = serde_json::from_str(raw).unwrap();

        let alerts = run(&mut a, &ext, Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, ActivityKind::UnusualDelegation);
        assert_eq!(alerts[0].details["amount"], "20000000000000000000");
    }

    #[test]
    fn test_second_is_noop() {
        let mut a = analyzer();
        let ext = Extrinsic::signed("alice", Call::new("democracy", "second", vec![json!(3)]));
        assert!(run(&mut a, &ext, Utc::now()).is_empty());
        assert_eq!(a.tracked_entities(), 0);
    }

    #[test]
    fn test_vote_without_choice_is_error() {
        let mut a = analyzer();
        let ext = Extrinsic::signed("alice", Call::new("democracy", "vote", vec![json!(3)]));
        let mut alerts = Vec::new();
        assert!(a.analyze(&ext, Utc::now(), &mut alerts).is_err());
    }

    #[test]
    fn test_evict_windows_and_idempotence() {
        let mut a = analyzer();
        let start = Utc::now();
        run(&mut a, &propose("alice"), start);
        run(&mut a, &vote("alice", 1, aye()), start);

        // After a day: proposal gone, vote and coalition remain.
        let day_later = start + TimeWindows::DAY + TimeDelta::seconds(1);
        a.evict(day_later);
        assert!(a.proposals.is_empty());
        assert_eq!(a.votes.len(), 1);
        assert_eq!(a.coalitions.len(), 1);

        let week_later = start + TimeWindows::WEEK + TimeDelta::seconds(1);
        a.evict(week_later);
        assert_eq!(a.tracked_entities(), 0);
        a.evict(week_later);
        assert_eq!(a.tracked_entities(), 0);
    }
}
