use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, VecDeque};

use crate::alert::{ActivityKind, AlertDraft, Severity, TimeWindows};
use crate::chain::types::{arg_as_u128, Call, Extrinsic};
use crate::config::MonitoringConfig;

use super::Analyzer;

/// A single observed call, kept for frequency analysis.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub timestamp: DateTime<Utc>,
    pub method: String,
}

/// Rolling per-account state.
#[derive(Debug, Clone)]
pub struct AccountActivity {
    pub creation_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Calls from the last hour, oldest first.
    pub transactions: VecDeque<TransactionRecord>,
}

/// Balance calls this analyzer understands.
enum BalanceCall {
    Transfer { amount: u128 },
}

impl BalanceCall {
    fn classify(call: &Call) -> eyre::Result<Option<Self>> {
        match (call.section.as_str(), call.method.as_str()) {
            ("balances", "transfer" | "transferKeepAlive" | "transferAllowDeath") => {
                let raw = call
                    .arg(1)
                    .ok_or_else(|| eyre::eyre!("{} is missing its amount argument", call.path()))?;
                let amount = arg_as_u128(raw).ok_or_else(|| {
                    eyre::eyre!("{} has a non-numeric amount: {}", call.path(), raw)
                })?;
                Ok(Some(Self::Transfer { amount }))
            }
            _ => Ok(None),
        }
    }
}

/// Detects anomalous per-account behavior: large first transactions,
/// dormant accounts waking up, high call frequency and possible draining.
pub struct AccountAnalyzer {
    accounts: HashMap<String, AccountActivity>,
    large_transfer_threshold: u128,
    dormancy_threshold: TimeDelta,
    transaction_count_threshold: usize,
    retention: TimeDelta,
    max_accounts: usize,
}

impl AccountAnalyzer {
    pub fn new(config: &MonitoringConfig) -> Self {
        Self {
            accounts: HashMap::new(),
            large_transfer_threshold: u128::from(config.large_transfer_threshold),
            dormancy_threshold: TimeWindows::from_secs(config.dormancy_threshold_secs),
            transaction_count_threshold: config.transaction_count_threshold,
            retention: TimeWindows::from_secs(config.account_retention_secs),
            max_accounts: config.max_accounts_tracked,
        }
    }

    /// Snapshot of what is tracked for `account`.
    pub fn account_stats(&self, account: &str) -> Option<&AccountActivity> {
        self.accounts.get(account)
    }
}

impl Analyzer for AccountAnalyzer {
    fn name(&self) -> &'static str {
        "AccountMonitor"
    }

    fn analyze(
        &mut self,
        extrinsic: &Extrinsic,
        now: DateTime<Utc>,
        alerts: &mut Vec<AlertDraft>,
    ) -> eyre::Result<()> {
        let Some(account) = extrinsic.signer.as_deref() else {
            return Ok(());
        };

        // Classify up front, but record the activity even if the arguments are malformed.
        let call = BalanceCall::classify(&extrinsic.method);

        let is_new = !self.accounts.contains_key(account);
        let activity = self
            .accounts
            .entry(account.to_string())
            .or_insert_with(|| AccountActivity {
                creation_time: now,
                last_activity: now,
                transactions: VecDeque::new(),
            });

        let idle = now - activity.last_activity;
        if !is_new && idle > self.dormancy_threshold {
            alerts.push(
                AlertDraft::new(ActivityKind::DormantAccountActivity)
                    .severity(Severity::Medium)
                    .detail("account", account)
                    .detail("dormant_secs", idle.num_seconds())
                    .detail("call", extrinsic.method.path()),
            );
        }

        activity.last_activity = now;
        activity.transactions.push_back(TransactionRecord {
            timestamp: now,
            method: extrinsic.method.path(),
        });

        let cutoff = now - TimeWindows::HOUR;
        while activity
            .transactions
            .front()
            .is_some_and(|tx| tx.timestamp <= cutoff)
        {
            activity.transactions.pop_front();
        }

        let recent = activity.transactions.len();
        if recent > self.transaction_count_threshold {
            alerts.push(
                AlertDraft::new(ActivityKind::HighFrequencyTrading)
                    .severity(Severity::Medium)
                    .detail("account", account)
                    .detail("transaction_count", recent)
                    .detail("time_window", "1 hour"),
            );
        }

        let Some(BalanceCall::Transfer { amount }) = call? else {
            return Ok(());
        };

        if amount > self.large_transfer_threshold {
            if is_new {
                alerts.push(
                    AlertDraft::new(ActivityKind::NewAccountLargeTransaction)
                        .severity(Severity::High)
                        .detail("account", account)
                        .detail("amount", amount.to_string())
                        .detail("threshold", self.large_transfer_threshold.to_string()),
                );
            }

            // No balance lookup is available, so any large outflow counts.
            alerts.push(
                AlertDraft::new(ActivityKind::AccountDraining)
                    .severity(Severity::High)
                    .detail("account", account)
                    .detail("amount", amount.to_string())
                    .detail("threshold", self.large_transfer_threshold.to_string()),
            );
        }

        Ok(())
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        if let Some(cutoff) = now.checked_sub_signed(self.retention) {
            self.accounts.retain(|_, activity| {
                activity.transactions.retain(|tx| tx.timestamp > cutoff);
                activity.last_activity > cutoff
            });
        }

        // Over the cap: drop the least recently active accounts.
        if self.accounts.len() > self.max_accounts {
            let mut by_activity: Vec<(DateTime<Utc>, String)> = self
                .accounts
                .iter()
                .map(|(account, activity)| (activity.last_activity, account.clone()))
                .collect();
            by_activity.sort();

            let excess = self.accounts.len() - self.max_accounts;
            for (_, account) in by_activity.into_iter().take(excess) {
                self.accounts.remove(&account);
            }
        }
    }

    fn tracked_entities(&self) -> usize {
        self.accounts.len()
    }
}
