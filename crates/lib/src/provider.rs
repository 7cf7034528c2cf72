//! RPC capability consumed by validation
//!
//! The crate never talks to a network itself. Contract-wallet validation and
//! the block resolver consume an injected [`EthereumProvider`] capability, so
//! callers choose the transport and tests substitute a deterministic fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Identifies a block to fetch: a concrete height or the current head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockId {
    /// A concrete block height
    Number(u64),
    /// The current chain head
    Latest,
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockId::Number(number) => write!(f, "{number}"),
            BlockId::Latest => f.write_str("latest"),
        }
    }
}

/// The two block facts the resolver needs: height and timestamp (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block height
    pub number: u64,
    /// Block timestamp in seconds since the Unix epoch
    pub timestamp: u64,
}

/// Errors surfaced by an [`EthereumProvider`] implementation.
///
/// Timeout and retry policy belong to the implementation; validation treats
/// any of these as a collaborator failure, never as a crash.
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum ProviderError {
    /// A contract view call failed or reverted.
    #[error("RPC call failed: {reason}")]
    Call {
        /// Description of the transport failure or revert
        reason: String,
    },

    /// A requested block does not exist.
    #[error("Block not found: {id}")]
    BlockNotFound {
        /// The identifier that could not be resolved
        id: String,
    },

    /// An external signer callback failed.
    #[error("External signer failed: {reason}")]
    Signer {
        /// Description of the signer failure
        reason: String,
    },
}

impl ProviderError {
    /// Check if this error indicates a missing block rather than a transport failure.
    pub fn is_block_not_found(&self) -> bool {
        matches!(self, ProviderError::BlockNotFound { .. })
    }
}

/// Abstract on-chain read capability.
///
/// Implementations may block or be asynchronous; the validation core imposes
/// no ordering between unrelated calls beyond what a single chain's
/// sequential fold serializes.
#[async_trait]
pub trait EthereumProvider: Send + Sync {
    /// Execute a contract view function.
    ///
    /// # Arguments
    /// * `contract` - Address of the contract to call
    /// * `selector` - 4-byte function selector
    /// * `args` - ABI-encoded call arguments (without the selector)
    /// * `block` - Height to evaluate at, or `None` for the current head
    ///
    /// # Returns
    /// The raw return bytes of the call.
    async fn call_view(
        &self,
        contract: &str,
        selector: [u8; 4],
        args: &[u8],
        block: Option<u64>,
    ) -> Result<Vec<u8>, ProviderError>;

    /// Fetch a block's height and timestamp.
    async fn get_block(&self, id: BlockId) -> Result<BlockInfo, ProviderError>;
}
