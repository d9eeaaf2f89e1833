pub mod client;
pub mod replay;
pub mod types;

pub use client::{connect_with_backoff, BackoffPolicy, ChainClient, HeaderStream};
pub use replay::ReplayClient;
pub use types::{Block, BlockHeader, Call, Extrinsic};
