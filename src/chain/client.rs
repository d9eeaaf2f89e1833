use futures::stream::BoxStream;
use std::future::Future;
use std::time::Duration;

use super::types::{Block, BlockHeader};

/// Lazy, non-restartable stream of new block headers. An `Err` item means the
/// client has given up on the connection and the stream is finished.
pub type HeaderStream = BoxStream<'static, eyre::Result<BlockHeader>>;

/// The node-facing collaborator the monitor consumes. Transport, decoding and
/// reconnection details live behind this trait.
pub trait ChainClient: Send + Sync + 'static {
    /// Human-readable endpoint, for logs.
    fn endpoint(&self) -> String;

    fn connect(&mut self) -> impl Future<Output = eyre::Result<()>> + Send;

    fn disconnect(&mut self) -> impl Future<Output = eyre::Result<()>> + Send;

    fn subscribe_new_heads(&self) -> impl Future<Output = eyre::Result<HeaderStream>> + Send;

    fn block_hash(&self, number: u64) -> impl Future<Output = eyre::Result<String>> + Send;

    fn block(&self, hash: &str) -> impl Future<Output = eyre::Result<Block>> + Send;
}

/// Reconnect policy: exponential backoff starting at `base_delay`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.base_delay.saturating_mul(factor), self.max_delay)
    }
}

/// Connect, retrying with exponential backoff. One initial attempt is made,
/// followed by up to `max_attempts` reconnects; exhausting them is terminal.
pub async fn connect_with_backoff<C: ChainClient>(
    client: &mut C,
    policy: &BackoffPolicy,
) -> eyre::Result<()> {
    let mut attempt = 0u32;

    loop {
        match client.connect().await {
            Ok(()) => {
                tracing::info!(endpoint = %client.endpoint(), "Connected to node");
                return Ok(());
            }
            Err(e) => {
                if attempt >= policy.max_attempts {
                    tracing::error!(
                        endpoint = %client.endpoint(),
                        attempts = attempt,
                        error = %e,
                        "Max reconnection attempts reached"
                    );
                    return Err(eyre::eyre!(
                        "Failed to maintain connection to node at {} \
                         after {} reconnect attempts: {}",
                        client.endpoint(),
                        attempt,
                        e
                    ));
                }

                attempt += 1;
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    endpoint = %client.endpoint(),
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Connection failed, retrying..."
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
