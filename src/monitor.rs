//! The chain monitor: owns the block subscription, fans every extrinsic out
//! to the registered analyzers and drives the periodic eviction sweep.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::analyzer::AnalyzerHandle;
use crate::chain::{
    connect_with_backoff, BackoffPolicy, BlockHeader, ChainClient, Extrinsic, HeaderStream,
};

/// Lifecycle of a [`ChainMonitor`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Created,
    Connecting,
    Running,
    ShuttingDown,
    Stopped,
}

impl MonitorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Connecting => "connecting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }
}

struct CleanupTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ChainMonitor<C: ChainClient> {
    client: C,
    analyzers: Vec<AnalyzerHandle>,
    backoff: BackoffPolicy,
    cleanup_interval: Duration,
    state: watch::Sender<MonitorState>,
    headers: Option<HeaderStream>,
    cleanup: Option<CleanupTask>,
}

impl<C: ChainClient> ChainMonitor<C> {
    pub fn new(
        client: C,
        analyzers: Vec<AnalyzerHandle>,
        backoff: BackoffPolicy,
        cleanup_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(MonitorState::Created);
        Self {
            client,
            analyzers,
            backoff,
            cleanup_interval,
            state,
            headers: None,
            cleanup: None,
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    pub fn analyzers(&self) -> &[AnalyzerHandle] {
        &self.analyzers
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn set_state(&self, next: MonitorState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!(from = previous.as_str(), to = next.as_str(), "Monitor state changed");
        }
    }

    /// Connect to the node, subscribe to new heads and start the cleanup
    /// scheduler. Ends in `Running`; a connection failure ends in `Stopped`.
    pub async fn initialize(&mut self) -> eyre::Result<()> {
        self.set_state(MonitorState::Connecting);
        tracing::info!(
            endpoint = %self.client.endpoint(),
            analyzers = self.analyzers.len(),
            "Initializing chain monitor"
        );

        let subscribed = async {
            connect_with_backoff(&mut self.client, &self.backoff).await?;
            self.client.subscribe_new_heads().await
        }
        .await;

        match subscribed {
            Ok(headers) => {
                self.headers = Some(headers);
                self.cleanup = Some(self.spawn_cleanup());
                self.set_state(MonitorState::Running);
                Ok(())
            }
            Err(e) => {
                self.set_state(MonitorState::Stopped);
                Err(e)
            }
        }
    }

    /// Process blocks until the stream ends, the subscription fails or
    /// `shutdown` is cancelled, then run the shutdown sequence.
    pub async fn run(&mut self, shutdown: CancellationToken) -> eyre::Result<()> {
        if self.state() == MonitorState::Created {
            self.initialize().await?;
        }

        let mut headers = self
            .headers
            .take()
            .ok_or_else(|| eyre::eyre!("Monitor is not subscribed to new heads"))?;

        tracing::info!(endpoint = %self.client.endpoint(), "Monitoring new blocks");

        let outcome = loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown received, stopping monitor");
                    break Ok(());
                }
                next = headers.next() => {
                    match next {
                        Some(Ok(header)) => {
                            self.process_block(header, &shutdown).await;
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Block subscription failed");
                            break Err(e);
                        }
                        None => {
                            tracing::info!("Block stream ended");
                            break Ok(());
                        }
                    }
                }
            }
        };

        self.shutdown().await;
        outcome
    }

    /// Fetch one block and dispatch its extrinsics in order. A block that
    /// cannot be fetched is logged and skipped. Returns the number of alerts.
    pub async fn process_block(&self, header: BlockHeader, shutdown: &CancellationToken) -> usize {
        let block = match self.fetch_block(header.number).await {
            Ok(block) => block,
            Err(e) => {
                tracing::error!(block = header.number, error = %e, "Failed to process block");
                return 0;
            }
        };

        tracing::debug!(
            block = block.number,
            hash = %block.hash,
            extrinsics = block.extrinsics.len(),
            "Processing block"
        );

        let mut raised = 0;
        for extrinsic in block.extrinsics {
            if shutdown.is_cancelled() {
                tracing::info!(
                    block = block.number,
                    "Shutdown received mid-block, skipping remaining extrinsics"
                );
                break;
            }
            raised += self.dispatch(Arc::new(extrinsic), Utc::now()).await.len();
        }
        raised
    }

    async fn fetch_block(&self, number: u64) -> eyre::Result<crate::chain::Block> {
        let hash = self.client.block_hash(number).await?;
        self.client.block(&hash).await
    }

    /// Run every active analyzer on `extrinsic` concurrently and wait for all
    /// of them. A panicking analyzer is logged and does not affect the others.
    pub async fn dispatch(&self, extrinsic: Arc<Extrinsic>, now: DateTime<Utc>) -> Vec<Alert> {
        let tasks: Vec<(&'static str, JoinHandle<Vec<Alert>>)> = self
            .analyzers
            .iter()
            .filter(|handle| handle.is_active())
            .map(|handle| {
                let handle = handle.clone();
                let extrinsic = extrinsic.clone();
                let name = handle.name();
                let task =
                    tokio::spawn(async move { handle.process_activity(&extrinsic, now).await });
                (name, task)
            })
            .collect();

        let mut alerts = Vec::new();
        for (name, task) in tasks {
            match task.await {
                Ok(raised) => alerts.extend(raised),
                Err(e) => {
                    tracing::error!(
                        analyzer = name,
                        call = %extrinsic.method.path(),
                        panicked = e.is_panic(),
                        error = %e,
                        "Analyzer task failed"
                    );
                }
            }
        }
        alerts
    }

    /// One eviction pass over every analyzer.
    pub async fn run_cleanup_sweep(&self, now: DateTime<Utc>) {
        sweep(&self.analyzers, now).await;
    }

    fn spawn_cleanup(&self) -> CleanupTask {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(cleanup_loop(
            self.analyzers.clone(),
            self.cleanup_interval,
            cancel.clone(),
        ));
        CleanupTask { cancel, handle }
    }

    /// Pause every analyzer, stop the cleanup scheduler and disconnect.
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if matches!(self.state(), MonitorState::ShuttingDown | MonitorState::Stopped) {
            return;
        }
        self.set_state(MonitorState::ShuttingDown);

        for analyzer in &self.analyzers {
            analyzer.pause();
        }

        if let Some(cleanup) = self.cleanup.take() {
            cleanup.cancel.cancel();
            if let Err(e) = cleanup.handle.await {
                tracing::warn!(error = %e, "Cleanup task did not exit cleanly");
            }
        }
        self.headers = None;

        if let Err(e) = self.client.disconnect().await {
            tracing::warn!(
                endpoint = %self.client.endpoint(),
                error = %e,
                "Failed to disconnect from node"
            );
        }

        self.set_state(MonitorState::Stopped);
    }
}

async fn cleanup_loop(analyzers: Vec<AnalyzerHandle>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    tracing::debug!(interval_secs = period.as_secs(), "Cleanup scheduler started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => sweep(&analyzers, Utc::now()).await,
        }
    }

    tracing::debug!("Cleanup scheduler stopped");
}

async fn sweep(analyzers: &[AnalyzerHandle], now: DateTime<Utc>) {
    for analyzer in analyzers {
        analyzer.evict(now).await;
    }
}
