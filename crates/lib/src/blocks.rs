//! Timestamp-to-block resolution
//!
//! Maps a wall-clock instant to the block height that brackets it, so a
//! contract-wallet signature can be checked "as of" a past instant. Block
//! spacing in time is non-uniform and the block source is remote, so a linear
//! scan is too costly; [`BlockFinder`] runs an interpolation search instead,
//! refining a local seconds-per-block estimate from each pair of probes.
//!
//! Every fetched block is memoized for the lifetime of the finder, and a
//! per-resolution set of probed heights guarantees the search never
//! oscillates over the same candidates.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;
use tracing::trace;

use crate::provider::{BlockId, BlockInfo, EthereumProvider, ProviderError};

/// Upper bound on probes per resolution. The checked-set guard makes each
/// probe consume a fresh height, so hitting this bound means the provider is
/// returning inconsistent data.
const MAX_PROBES: usize = 200;

/// Bootstrap facts derived once per finder instance.
#[derive(Debug, Clone, Copy)]
struct ChainProfile {
    /// Average seconds per block across the whole chain
    block_time: f64,
    /// Timestamp of block #1
    first_timestamp: u64,
}

/// Resolves timestamps to bracketing block heights against an injected
/// provider, memoizing every fetched block.
///
/// The cache grows monotonically and is never evicted; sessions are short.
/// Concurrent lookups may race on insertion, which is harmless because both
/// writers compute the same fact.
pub struct BlockFinder<'a> {
    provider: &'a dyn EthereumProvider,
    cache: Mutex<HashMap<BlockId, BlockInfo>>,
    profile: Mutex<Option<ChainProfile>>,
}

impl<'a> BlockFinder<'a> {
    /// Create a finder with an empty cache.
    pub fn new(provider: &'a dyn EthereumProvider) -> Self {
        BlockFinder {
            provider,
            cache: Mutex::new(HashMap::new()),
            profile: Mutex::new(None),
        }
    }

    /// Resolve the block height bracketing `target_millis`.
    ///
    /// With `after` set, returns the first block whose timestamp is at or
    /// after the target; otherwise the last block strictly before it.
    ///
    /// Fast paths: targets before genesis resolve to block 1, and targets at
    /// or past "now" (or past the cached head timestamp) resolve to the
    /// current head.
    pub async fn block_for_timestamp(
        &self,
        target_millis: u64,
        after: bool,
    ) -> Result<u64, ProviderError> {
        let target = target_millis as f64 / 1000.0;
        let now = Utc::now().timestamp() as f64;

        let profile = self.chain_profile().await?;
        if target < profile.first_timestamp as f64 {
            return Ok(1);
        }

        let head = self.block(BlockId::Latest).await?;
        if target >= now || target > head.timestamp as f64 {
            return Ok(head.number);
        }

        // Linear extrapolation from genesis seeds the search.
        let seed = ((target - profile.first_timestamp as f64) / profile.block_time).ceil();
        let seed = (seed as i64).clamp(1, head.number as i64) as u64;

        let mut checked: HashSet<u64> = HashSet::new();
        checked.insert(seed);

        let mut probed = self.block(BlockId::Number(seed)).await?;
        let mut block_time = profile.block_time;

        for _ in 0..MAX_PROBES {
            if self.brackets(target, probed, after, head.number).await? {
                return Ok(probed.number);
            }

            let difference = target - probed.timestamp as f64;
            let mut step = (difference / block_time).ceil() as i64;
            if step == 0 {
                step = if difference < 0.0 { -1 } else { 1 };
            }

            let next_number = next_unchecked(&mut checked, probed.number, step, head.number);
            let next = self.block(BlockId::Number(next_number)).await?;
            trace!(
                target = target,
                probe = next.number,
                timestamp = next.timestamp,
                "block search probe"
            );

            // Refine the local seconds-per-block estimate from the two most
            // recent probes.
            if next.number != probed.number {
                let delta_ts = probed.timestamp as f64 - next.timestamp as f64;
                let delta_num = probed.number as f64 - next.number as f64;
                block_time = (delta_ts / delta_num).abs().max(f64::EPSILON);
            }
            probed = next;
        }

        Err(ProviderError::Call {
            reason: format!("block search for timestamp {target_millis} did not converge"),
        })
    }

    /// Check whether `probed` already brackets `target` in the requested
    /// direction.
    async fn brackets(
        &self,
        target: f64,
        probed: BlockInfo,
        after: bool,
        head_number: u64,
    ) -> Result<bool, ProviderError> {
        let timestamp = probed.timestamp as f64;

        if after {
            if timestamp < target {
                return Ok(false);
            }
            if probed.number <= 1 {
                return Ok(true);
            }
            let previous = self.block(BlockId::Number(probed.number - 1)).await?;
            Ok((previous.timestamp as f64) < target)
        } else {
            if timestamp >= target {
                return Ok(false);
            }
            if probed.number >= head_number {
                return Ok(true);
            }
            let next = self.block(BlockId::Number(probed.number + 1)).await?;
            Ok(next.timestamp as f64 >= target)
        }
    }

    /// Bootstrap the chain profile (head plus block #1), once per instance.
    async fn chain_profile(&self) -> Result<ChainProfile, ProviderError> {
        if let Some(profile) = *self.profile.lock().expect("profile lock poisoned") {
            return Ok(profile);
        }

        let head = self.block(BlockId::Latest).await?;
        let first = self.block(BlockId::Number(1)).await?;

        let span = head.timestamp.saturating_sub(first.timestamp) as f64;
        let block_time = if head.number == 0 {
            1.0
        } else {
            (span / head.number as f64 - 1.0).max(1.0)
        };

        let profile = ChainProfile {
            block_time,
            first_timestamp: first.timestamp,
        };
        *self.profile.lock().expect("profile lock poisoned") = Some(profile);
        Ok(profile)
    }

    /// Fetch a block through the memo cache.
    ///
    /// Heights at or past the cached head resolve to the head without a round
    /// trip.
    async fn block(&self, id: BlockId) -> Result<BlockInfo, ProviderError> {
        {
            let cache = self.cache.lock().expect("block cache lock poisoned");
            if let Some(block) = cache.get(&id) {
                return Ok(*block);
            }
            if let (BlockId::Number(number), Some(head)) = (id, cache.get(&BlockId::Latest))
                && head.number <= number
            {
                return Ok(*head);
            }
        }

        let fetched = self.provider.get_block(id).await?;

        let mut cache = self.cache.lock().expect("block cache lock poisoned");
        cache.insert(BlockId::Number(fetched.number), fetched);
        if id == BlockId::Latest {
            cache.insert(BlockId::Latest, fetched);
        }
        Ok(fetched)
    }
}

/// Pick the next candidate height, skipping heights already probed in this
/// resolution.
///
/// When `current + step` was already probed, the step is nudged one unit
/// toward zero (and past it, continuing in the same direction), so the
/// candidate strictly changes and the search cannot oscillate.
fn next_unchecked(checked: &mut HashSet<u64>, current: u64, step: i64, head_number: u64) -> u64 {
    let nudge = if step < 0 { 1 } else { -1 };
    let mut step = step;
    loop {
        let candidate = (current as i64 + step).clamp(1, head_number as i64) as u64;
        if checked.insert(candidate) {
            return candidate;
        }
        step += nudge;
        // Exhausted every height; return the clamped candidate and let the
        // caller's probe budget fail the search.
        if step.unsigned_abs() > head_number + 1 {
            return candidate;
        }
    }
}
