use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

use crate::alert::{ActivityKind, AlertDraft, Severity, TimeWindows};
use crate::chain::types::{arg_to_string, Call, Extrinsic};
use crate::config::MonitoringConfig;

use super::Analyzer;

/// Hex characters of the bytecode hash included in alerts.
const DIGEST_PREFIX_LEN: usize = 16;

/// A contract deployment seen in the last hour.
#[derive(Debug, Clone)]
pub struct DeploymentRecord {
    pub timestamp: DateTime<Utc>,
    pub bytecode_hash: String,
}

/// Calls in the `contracts` pallet this analyzer understands.
enum ContractCall {
    InstantiateWithCode { code: String },
    Call { dest: String, data: String },
    Terminate,
}

impl ContractCall {
    fn classify(call: &Call) -> eyre::Result<Option<Self>> {
        if call.section != "contracts" {
            return Ok(None);
        }

        let parsed = match call.method.as_str() {
            "instantiateWithCode" => Self::InstantiateWithCode {
                code: required_arg(call, 2, "code")?,
            },
            "call" => Self::Call {
                dest: required_arg(call, 0, "dest")?,
                data: required_arg(call, 2, "data")?,
            },
            "terminate" => Self::Terminate,
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }
}

fn required_arg(call: &Call, index: usize, name: &str) -> eyre::Result<String> {
    call.arg(index)
        .map(arg_to_string)
        .ok_or_else(|| eyre::eyre!("{} is missing argument {} ({})", call.path(), index, name))
}

/// Full hex SHA-256 of the supplied bytecode.
pub fn bytecode_hash(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

/// Detects malicious contract deployments and invocations.
///
/// All checks are substring heuristics over the stringified payload. The
/// reentrancy check in particular only looks for a transfer keyword next to the
/// contract's own address and will flag benign self-referencing calls.
pub struct ContractAnalyzer {
    exploit_signatures: Vec<String>,
    deployments: HashMap<String, VecDeque<DeploymentRecord>>,
}

impl ContractAnalyzer {
    pub fn new(config: &MonitoringConfig) -> Self {
        let mut exploit_signatures: Vec<String> = Vec::new();
        for sig in &config.known_exploit_signatures {
            let normalized = sig.trim().to_ascii_lowercase();
            if !normalized.is_empty() && !exploit_signatures.contains(&normalized) {
                exploit_signatures.push(normalized);
            }
        }

        Self {
            exploit_signatures,
            deployments: HashMap::new(),
        }
    }

    /// Recent deployments by `deployer`, oldest first.
    pub fn deployments_by(&self, deployer: &str) -> Option<&VecDeque<DeploymentRecord>> {
        self.deployments.get(deployer)
    }

    /// Signatures found in `payload`. A leading `0x` on a signature is ignored
    /// so selectors match inside longer hex strings.
    fn matching_signatures<'a>(&'a self, payload: &str) -> Vec<&'a str> {
        let payload = payload.to_ascii_lowercase();
        self.exploit_signatures
            .iter()
            .filter(|sig| {
                let needle = sig.strip_prefix("0x").unwrap_or(sig);
                !needle.is_empty() && payload.contains(needle)
            })
            .map(|s| s.as_str())
            .collect()
    }

    fn on_instantiate(
        &mut self,
        deployer: &str,
        code: &str,
        now: DateTime<Utc>,
        alerts: &mut Vec<AlertDraft>,
    ) {
        let hash = bytecode_hash(code);
        let digest = &hash[..DIGEST_PREFIX_LEN];

        for signature in self.matching_signatures(code) {
            alerts.push(
                AlertDraft::new(ActivityKind::MaliciousContract)
                    .severity(Severity::High)
                    .detail("deployer", deployer)
                    .detail("signature", signature)
                    .detail("bytecode_digest", digest),
            );
        }

        let records = self.deployments.entry(deployer.to_string()).or_default();
        records.push_back(DeploymentRecord {
            timestamp: now,
            bytecode_hash: hash,
        });
        let cutoff = now - TimeWindows::HOUR;
        while records.front().is_some_and(|r| r.timestamp <= cutoff) {
            records.pop_front();
        }
    }

    fn on_call(&self, caller: &str, dest: &str, data: &str, alerts: &mut Vec<AlertDraft>) {
        for signature in self.matching_signatures(data) {
            alerts.push(
                AlertDraft::new(ActivityKind::SuspiciousContractCall)
                    .severity(Severity::Medium)
                    .detail("caller", caller)
                    .detail("contract", dest)
                    .detail("signature", signature),
            );
        }

        let lowered = data.to_ascii_lowercase();
        if !dest.is_empty()
            && lowered.contains("transfer")
            && lowered.contains(&dest.to_ascii_lowercase())
        {
            alerts.push(
                AlertDraft::new(ActivityKind::ReentrantCall)
                    .severity(Severity::High)
                    .detail("caller", caller)
                    .detail("contract", dest)
                    .detail("heuristic", "call data references transfer and target contract"),
            );
        }
    }
}

impl Analyzer for ContractAnalyzer {
    fn name(&self) -> &'static str {
        "ContractMonitor"
    }

    fn analyze(
        &mut self,
        extrinsic: &Extrinsic,
        now: DateTime<Utc>,
        alerts: &mut Vec<AlertDraft>,
    ) -> eyre::Result<()> {
        let Some(call) = ContractCall::classify(&extrinsic.method)? else {
            return Ok(());
        };
        let account = extrinsic.signer.as_deref().unwrap_or("unknown");

        match call {
            ContractCall::InstantiateWithCode { code } => {
                self.on_instantiate(account, &code, now, alerts);
            }
            ContractCall::Call { dest, data } => {
                self.on_call(account, &dest, &data, alerts);
            }
            ContractCall::Terminate => {
                alerts.push(
                    AlertDraft::new(ActivityKind::ContractSelfDestruct)
                        .severity(Severity::Medium)
                        .detail("account", account),
                );
            }
        }

        Ok(())
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - TimeWindows::HOUR;
        self.deployments.retain(|_, records| {
            records.retain(|r| r.timestamp > cutoff);
            !records.is_empty()
        });
    }

    fn tracked_entities(&self) -> usize {
        self.deployments.len()
    }
}
