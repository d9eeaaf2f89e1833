use futures::{stream, StreamExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::client::{ChainClient, HeaderStream};
use super::types::{Block, BlockHeader};

/// Chain client that replays decoded blocks from a JSON Lines file
/// (one block per line) or from memory.
pub struct ReplayClient {
    source: Option<PathBuf>,
    block_interval: Duration,
    blocks: Vec<Block>,
    by_number: HashMap<u64, usize>,
    by_hash: HashMap<String, usize>,
    connected: bool,
}

impl ReplayClient {
    /// Replay from a file. The file is read on `connect`.
    pub fn new(path: impl Into<PathBuf>, block_interval: Duration) -> Self {
        Self {
            source: Some(path.into()),
            block_interval,
            blocks: Vec::new(),
            by_number: HashMap::new(),
            by_hash: HashMap::new(),
            connected: false,
        }
    }

    /// Replay a fixed set of blocks with no pacing.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let mut client = Self {
            source: None,
            block_interval: Duration::ZERO,
            blocks: Vec::new(),
            by_number: HashMap::new(),
            by_hash: HashMap::new(),
            connected: false,
        };
        client.index(blocks);
        client
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn index(&mut self, blocks: Vec<Block>) {
        self.by_number.clear();
        self.by_hash.clear();
        self.blocks = blocks
            .into_iter()
            .map(|mut block| {
                if block.hash.is_empty() {
                    block.hash = format!("0x{:064x}", block.number);
                }
                block
            })
            .collect();

        for (i, block) in self.blocks.iter().enumerate() {
            self.by_number.insert(block.number, i);
            self.by_hash.insert(block.hash.clone(), i);
        }
    }
}

/// Parse a JSON Lines block file. Blank lines are skipped.
pub fn parse_blocks(content: &str) -> eyre::Result<Vec<Block>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Block>(line)
                .map_err(|e| eyre::eyre!("Invalid block on line {}: {}", i + 1, e))
        })
        .collect()
}

impl ChainClient for ReplayClient {
    fn endpoint(&self) -> String {
        match &self.source {
            Some(path) => format!("replay://{}", path.display()),
            None => "replay://memory".to_string(),
        }
    }

    async fn connect(&mut self) -> eyre::Result<()> {
        if let Some(path) = &self.source {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| eyre::eyre!("Failed to read block file '{}': {}", path.display(), e))?;
            let blocks = parse_blocks(&content)?;
            tracing::info!(path = %path.display(), blocks = blocks.len(), "Loaded replay blocks");
            self.index(blocks);
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> eyre::Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn subscribe_new_heads(&self) -> eyre::Result<HeaderStream> {
        if !self.connected {
            return Err(eyre::eyre!("Not connected to node"));
        }

        let numbers: Vec<u64> = self.blocks.iter().map(|b| b.number).collect();
        let interval = self.block_interval;

        let heads = stream::iter(numbers).then(move |number| async move {
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            Ok(BlockHeader { number })
        });

        Ok(heads.boxed())
    }

    async fn block_hash(&self, number: u64) -> eyre::Result<String> {
        self.by_number
            .get(&number)
            .map(|&i| self.blocks[i].hash.clone())
            .ok_or_else(|| eyre::eyre!("Unknown block number {}", number))
    }

    async fn block(&self, hash: &str) -> eyre::Result<Block> {
        self.by_hash
            .get(hash)
            .map(|&i| self.blocks[i].clone())
            .ok_or_else(|| eyre::eyre!("Unknown block hash {}", hash))
    }
}
