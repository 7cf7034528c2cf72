//! Shared test fixtures.
//!
//! `MockWalletProvider` is a deterministic stand-in for an RPC node: a
//! uniform chain of blocks plus a scripted contract wallet whose
//! `isValidSignature` answer depends on the block the call is pinned to.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use authchain::provider::{BlockId, BlockInfo, EthereumProvider, ProviderError};
use authchain::validation::ERC1271_MAGIC_VALUE;

/// Seconds between consecutive mock blocks.
pub const BLOCK_TIME_SECS: u64 = 12;

/// Timestamp of mock block 1, chosen safely in the past so the resolver's
/// head fast path never triggers.
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

pub struct MockWalletProvider {
    head_number: u64,
    /// Highest block at which the wallet still returns the magic value, or
    /// `None` for a wallet that never validates the signature.
    magic_until: Option<u64>,
    /// Every `call_view` invocation, recording the block it was pinned to.
    pub view_calls: Mutex<Vec<Option<u64>>>,
    /// Number of `get_block` requests served.
    pub block_requests: AtomicUsize,
}

impl MockWalletProvider {
    pub fn new(head_number: u64, magic_until: Option<u64>) -> Self {
        MockWalletProvider {
            head_number,
            magic_until,
            view_calls: Mutex::new(Vec::new()),
            block_requests: AtomicUsize::new(0),
        }
    }

    pub fn timestamp_of(block: u64) -> u64 {
        GENESIS_TIMESTAMP + (block - 1) * BLOCK_TIME_SECS
    }

    pub fn millis_of(block: u64) -> u64 {
        Self::timestamp_of(block) * 1000
    }
}

#[async_trait]
impl EthereumProvider for MockWalletProvider {
    async fn call_view(
        &self,
        _contract: &str,
        selector: [u8; 4],
        _args: &[u8],
        block: Option<u64>,
    ) -> Result<Vec<u8>, ProviderError> {
        assert_eq!(selector, ERC1271_MAGIC_VALUE, "unexpected selector");
        self.view_calls
            .lock()
            .expect("view call log poisoned")
            .push(block);

        let height = block.unwrap_or(self.head_number);
        let valid = self.magic_until.is_some_and(|until| height <= until);

        // isValidSignature returns its bytes4 result ABI-padded to one word.
        let mut out = vec![0u8; 32];
        if valid {
            out[..4].copy_from_slice(&ERC1271_MAGIC_VALUE);
        }
        Ok(out)
    }

    async fn get_block(&self, id: BlockId) -> Result<BlockInfo, ProviderError> {
        self.block_requests.fetch_add(1, Ordering::SeqCst);
        let number = match id {
            BlockId::Latest => self.head_number,
            BlockId::Number(n) if n >= 1 && n <= self.head_number => n,
            BlockId::Number(_) => {
                return Err(ProviderError::BlockNotFound { id: id.to_string() });
            }
        };
        Ok(BlockInfo {
            number,
            timestamp: Self::timestamp_of(number),
        })
    }
}
