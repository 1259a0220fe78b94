//! Typed results for the RPC methods wrapped in [`super::methods`].

use bitcoin::BlockHash;
use serde::Deserialize;

// ==============================================================================
// Chain Info
// ==============================================================================

/// Basic chain information from `getblockchaininfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainInfo {
    pub chain: String,
    pub blocks: u64,
    #[serde(default)]
    pub headers: u64,
    #[serde(rename = "bestblockhash")]
    pub best_block_hash: BlockHash,
    #[serde(default)]
    pub difficulty: f64,
    #[serde(rename = "verificationprogress", default)]
    pub verification_progress: f64,
    #[serde(rename = "initialblockdownload", default)]
    pub initial_block_download: bool,
    #[serde(default)]
    pub pruned: bool,
}
