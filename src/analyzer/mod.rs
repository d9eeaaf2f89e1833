//! Analyzer capability and the shared instrumentation around it.
//!
//! Each concrete analyzer owns its rolling state and only implements
//! [`Analyzer`]. [`MonitoredAnalyzer`] adds the behavior every analyzer
//! shares: pause/resume, timing, alert stamping, bounded alert history and
//! forwarding to the sink. [`AnalyzerHandle`] is the cloneable, lockable form
//! the dispatcher and the API hold.

pub mod account;
pub mod contract;
pub mod cross_chain;
pub mod governance;

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::alert::{Alert, AlertDraft, AlertLog, AlertSink, TimeWindows};
use crate::chain::Extrinsic;
use crate::config::{AlertConfig, MonitoringConfig};

pub use account::AccountAnalyzer;
pub use contract::ContractAnalyzer;
pub use cross_chain::CrossChainAnalyzer;
pub use governance::GovernanceAnalyzer;

/// A pattern detector over the extrinsic stream.
pub trait Analyzer: Send + 'static {
    fn name(&self) -> &'static str;

    /// Inspect one extrinsic and push any findings into `alerts`.
    /// Drafts pushed before an error is returned are still reported.
    fn analyze(
        &mut self,
        extrinsic: &Extrinsic,
        now: DateTime<Utc>,
        alerts: &mut Vec<AlertDraft>,
    ) -> eyre::Result<()>;

    /// Drop rolling state that has aged out of every window.
    fn evict(&mut self, now: DateTime<Utc>);

    /// Number of accounts / pairs / coalitions currently tracked.
    fn tracked_entities(&self) -> usize;
}

/// Shared state injected into analyzers at construction.
/// Created by the binary at startup and dropped at shutdown.
#[derive(Clone)]
pub struct MonitorContext {
    pub monitoring: Arc<MonitoringConfig>,
    pub alerts: AlertConfig,
    pub sink: Arc<dyn AlertSink>,
}

impl MonitorContext {
    pub fn new(
        monitoring: MonitoringConfig,
        alerts: AlertConfig,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            monitoring: Arc::new(monitoring),
            alerts,
            sink,
        }
    }

    /// Build the four standard analyzers, in dispatch order.
    pub fn default_analyzers(&self) -> Vec<AnalyzerHandle> {
        vec![
            AnalyzerHandle::new(MonitoredAnalyzer::new(
                Box::new(ContractAnalyzer::new(&self.monitoring)),
                self,
            )),
            AnalyzerHandle::new(MonitoredAnalyzer::new(
                Box::new(AccountAnalyzer::new(&self.monitoring)),
                self,
            )),
            AnalyzerHandle::new(MonitoredAnalyzer::new(
                Box::new(CrossChainAnalyzer::new(&self.monitoring)),
                self,
            )),
            AnalyzerHandle::new(MonitoredAnalyzer::new(
                Box::new(GovernanceAnalyzer::new(&self.monitoring)),
                self,
            )),
        ]
    }
}

// ============================================================
// MonitoredAnalyzer
// ============================================================

/// An analyzer plus pause flag, timing and alert bookkeeping.
pub struct MonitoredAnalyzer {
    analyzer: Box<dyn Analyzer>,
    active: Arc<AtomicBool>,
    alerts: AlertLog,
    sink: Arc<dyn AlertSink>,
    slow_threshold: Duration,
    alert_retention: TimeDelta,
}

impl MonitoredAnalyzer {
    pub fn new(analyzer: Box<dyn Analyzer>, ctx: &MonitorContext) -> Self {
        Self {
            analyzer,
            active: Arc::new(AtomicBool::new(true)),
            alerts: AlertLog::new(ctx.alerts.max_alerts_stored),
            sink: ctx.sink.clone(),
            slow_threshold: Duration::from_millis(ctx.monitoring.slow_analysis_warn_ms),
            alert_retention: TimeWindows::from_secs(ctx.alerts.retention_secs),
        }
    }

    pub fn name(&self) -> &'static str {
        self.analyzer.name()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        set_active(self.name(), &self.active, false);
    }

    pub fn resume(&self) {
        set_active(self.name(), &self.active, true);
    }

    /// Run the analyzer on one extrinsic. Never fails: analyzer errors are
    /// logged here and do not reach the caller. Returns the alerts reported.
    pub fn process_activity(&mut self, extrinsic: &Extrinsic, now: DateTime<Utc>) -> Vec<Alert> {
        if !self.is_active() {
            return Vec::new();
        }

        let started = Instant::now();
        let mut drafts = Vec::new();
        let result = self.analyzer.analyze(extrinsic, now, &mut drafts);
        self.log_performance(started.elapsed());

        if let Err(e) = result {
            tracing::error!(
                analyzer = self.name(),
                call = %extrinsic.method.path(),
                signer = ?extrinsic.signer,
                error = %e,
                "Analyzer failed on extrinsic"
            );
        }

        drafts
            .into_iter()
            .map(|draft| self.report_alert(draft, now))
            .collect()
    }

    /// Stamp a draft, append it to the history and forward it to the sink.
    pub fn report_alert(&mut self, draft: AlertDraft, now: DateTime<Utc>) -> Alert {
        let alert = Alert::from_draft(draft, self.name(), now);
        self.alerts.push(alert.clone());
        self.sink.on_alert(&alert);
        alert
    }

    /// Alerts newer than `now - window`.
    pub fn get_alerts(&self, window: TimeDelta, now: DateTime<Utc>) -> Vec<Alert> {
        self.alerts.since(window, now)
    }

    /// Alerts from the last hour.
    pub fn recent_alerts(&self, now: DateTime<Utc>) -> Vec<Alert> {
        self.get_alerts(TimeWindows::HOUR, now)
    }

    pub fn evict(&mut self, now: DateTime<Utc>) {
        self.analyzer.evict(now);
        let dropped = self.alerts.clear_older_than(self.alert_retention, now);
        tracing::debug!(
            analyzer = self.name(),
            tracked = self.analyzer.tracked_entities(),
            alerts_dropped = dropped,
            alerts_kept = self.alerts.len(),
            "Eviction sweep complete"
        );
    }

    pub fn tracked_entities(&self) -> usize {
        self.analyzer.tracked_entities()
    }

    fn log_performance(&self, elapsed: Duration) {
        if elapsed > self.slow_threshold {
            tracing::warn!(
                analyzer = self.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Analyzer processing was slow"
            );
        }
    }
}

fn set_active(name: &str, flag: &AtomicBool, active: bool) {
    flag.store(active, Ordering::SeqCst);
    if active {
        tracing::info!(analyzer = name, "Monitoring resumed");
    } else {
        tracing::info!(analyzer = name, "Monitoring paused");
    }
}

// ============================================================
// AnalyzerHandle
// ============================================================

/// Cloneable handle to a monitored analyzer. The pause flag is readable
/// without taking the lock so paused analyzers are skipped before dispatch.
#[derive(Clone)]
pub struct AnalyzerHandle {
    name: &'static str,
    active: Arc<AtomicBool>,
    inner: Arc<Mutex<MonitoredAnalyzer>>,
}

impl AnalyzerHandle {
    pub fn new(analyzer: MonitoredAnalyzer) -> Self {
        Self {
            name: analyzer.name(),
            active: analyzer.active.clone(),
            inner: Arc::new(Mutex::new(analyzer)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        set_active(self.name, &self.active, false);
    }

    pub fn resume(&self) {
        set_active(self.name, &self.active, true);
    }

    pub async fn process_activity(&self, extrinsic: &Extrinsic, now: DateTime<Utc>) -> Vec<Alert> {
        self.inner.lock().await.process_activity(extrinsic, now)
    }

    pub async fn get_alerts(&self, window: TimeDelta, now: DateTime<Utc>) -> Vec<Alert> {
        self.inner.lock().await.get_alerts(window, now)
    }

    pub async fn evict(&self, now: DateTime<Utc>) {
        self.inner.lock().await.evict(now);
    }

    pub async fn tracked_entities(&self) -> usize {
        self.inner.lock().await.tracked_entities()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::alert::TracingAlertSink;
    use crate::config::{AlertConfig, MonitoringConfig};

    pub fn context() -> MonitorContext {
        MonitorContext::new(
            MonitoringConfig::default(),
            AlertConfig::default(),
            Arc::new(TracingAlertSink),
        )
    }

    /// Run an analyzer directly and return the drafts it produced.
    pub fn run(
        analyzer: &mut dyn Analyzer,
        extrinsic: &Extrinsic,
        now: DateTime<Utc>,
    ) -> Vec<AlertDraft> {
        let mut alerts = Vec::new();
        analyzer.analyze(extrinsic, now, &mut alerts).unwrap();
        alerts
    }
}
