/*!
 * ID Allocation
 * Bounded identifier allocation with recycling of released IDs
 */

use super::types::{RawId, ResourceId};
use ahash::RandomState;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, info};

/// Highest exclusive bound any allocator can reach
const RAW_ID_LIMIT: u64 = RawId::MAX as u64 + 1;

// ============================================================================
// Recycling Allocator
// ============================================================================

/// Identifier allocator over the half-open range `[start, start + size)`
///
/// Released IDs are handed out again before the watermark advances, lowest
/// first. Exhaustion is reported as `None` so callers can wait for resources
/// to be released and try again.
///
/// # Concurrency
/// Mutating calls take `&mut self`: callers serialize access to one
/// allocator instance. Wrap it in a mutex when it must be shared.
pub struct IdAllocator<T> {
    label: &'static str,
    range_start: RawId,
    range_end: u64,
    watermark: u64,
    allocated: HashSet<RawId, RandomState>,
    free: BTreeSet<RawId>,
    _marker: PhantomData<T>,
}

impl<T: ResourceId> IdAllocator<T> {
    /// Create an allocator issuing IDs from `range_start` for `range_size` values
    ///
    /// A range reaching past `u32::MAX` is truncated at the numeric limit.
    pub fn new(range_start: RawId, range_size: RawId) -> Self {
        let range_end = (u64::from(range_start) + u64::from(range_size)).min(RAW_ID_LIMIT);
        Self {
            label: "ids",
            range_start,
            range_end,
            watermark: u64::from(range_start),
            allocated: HashSet::with_hasher(RandomState::new()),
            free: BTreeSet::new(),
            _marker: PhantomData,
        }
    }

    /// Attach a label used in log output
    #[must_use]
    pub fn named(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Allocate an ID, preferring recycled IDs over fresh ones
    ///
    /// Returns `None` once the range is exhausted and nothing has been freed.
    pub fn alloc(&mut self) -> Option<T> {
        if let Some(raw) = self.free.pop_first() {
            self.allocated.insert(raw);
            return Some(T::from_raw(raw));
        }

        if self.watermark < self.range_end {
            // watermark < range_end <= RAW_ID_LIMIT, so it fits in RawId
            let raw = self.watermark as RawId;
            self.watermark += 1;
            self.allocated.insert(raw);
            return Some(T::from_raw(raw));
        }

        debug!(
            allocator = self.label,
            live = self.allocated.len(),
            "ID range exhausted"
        );
        None
    }

    /// Release an ID for reuse
    ///
    /// Releasing an ID that is not currently allocated does nothing. Returns
    /// whether the ID was live.
    pub fn free(&mut self, id: T) -> bool {
        let raw = id.raw();
        if self.allocated.remove(&raw) {
            self.free.insert(raw);
            true
        } else {
            false
        }
    }

    #[inline]
    #[must_use]
    pub fn is_allocated(&self, id: T) -> bool {
        self.allocated.contains(&id.raw())
    }

    /// Forget every issued ID and restart at the beginning of the range
    pub fn reset(&mut self) {
        let dropped = self.allocated.len();
        self.allocated.clear();
        self.free.clear();
        self.watermark = u64::from(self.range_start);
        info!(allocator = self.label, dropped, "Allocator reset");
    }

    #[inline]
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    /// Live IDs in ascending order
    #[must_use]
    pub fn allocated_ids(&self) -> Vec<T> {
        let mut ids: Vec<RawId> = self.allocated.iter().copied().collect();
        ids.sort_unstable();
        ids.into_iter().map(T::from_raw).collect()
    }

    #[inline]
    pub fn range_start(&self) -> RawId {
        self.range_start
    }

    /// Number of IDs the range can hold
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.range_end - u64::from(self.range_start)
    }

    /// Next never-issued ID, or the range end once exhausted
    #[inline]
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Released IDs waiting to be reused
    #[inline]
    pub fn recycled_count(&self) -> usize {
        self.free.len()
    }

    /// Whether `id` lies inside this allocator's range
    #[inline]
    pub fn in_range(&self, id: T) -> bool {
        let raw = u64::from(id.raw());
        raw >= u64::from(self.range_start) && raw < self.range_end
    }
}

impl<T> fmt::Debug for IdAllocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdAllocator")
            .field("label", &self.label)
            .field("range_start", &self.range_start)
            .field("range_end", &self.range_end)
            .field("watermark", &self.watermark)
            .field("allocated", &self.allocated.len())
            .field("free", &self.free.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
