//! # Range Allocator
//!
//! A bump allocator over a linear byte capacity. Ranges are never freed one
//! at a time: the whole allocator is reset when a generation of allocations
//! is rebuilt, or grown when a request does not fit.
//!
//! The allocator owns no memory. It only hands out offsets; whoever backs the
//! capacity (usually a [`DeviceVector`](crate::DeviceVector)) copies the
//! occupied bytes forward when the capacity grows.

use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Default growth factor applied when an allocation does not fit.
pub const DEFAULT_GROWTH_FACTOR: f64 = 1.25;

/// A byte range handed out by a [`RangeAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RangeAllocation {
    /// Byte offset from the start of the capacity.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
}

impl RangeAllocation {
    /// One past the last byte of the range.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Result of [`RangeAllocator::allocate_or_grow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationOutcome {
    /// The allocated range.
    pub allocation: RangeAllocation,
    /// New capacity if the allocator had to grow.
    pub grew_to: Option<u64>,
}

/// Arena allocator handing out aligned byte ranges inside a capacity that
/// only grows.
///
/// # Example
///
/// ```rust,ignore
/// let mut bones = RangeAllocator::new(4096, 64);
/// let range = bones.allocate_or_grow(bone_count * 64)?.allocation;
/// ```
#[derive(Debug, Clone)]
pub struct RangeAllocator {
    capacity: u64,
    allocated: u64,
    alignment: u64,
    growth_factor: f64,
}

impl RangeAllocator {
    /// Creates an allocator with `capacity` bytes and offsets aligned to
    /// `alignment` (rounded up to a power of two, minimum 1).
    #[must_use]
    pub fn new(capacity: u64, alignment: u64) -> Self {
        Self {
            capacity,
            allocated: 0,
            alignment: alignment.max(1).next_power_of_two(),
            growth_factor: DEFAULT_GROWTH_FACTOR,
        }
    }

    /// Overrides the growth factor used by [`Self::grown_capacity`].
    /// Factors below 1.0 are clamped to 1.0.
    #[must_use]
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = if factor.is_finite() { factor.max(1.0) } else { DEFAULT_GROWTH_FACTOR };
        self
    }

    /// Total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.capacity
    }

    /// High-water mark of handed-out bytes, including alignment padding.
    #[inline]
    #[must_use]
    pub const fn allocated_bytes(&self) -> u64 {
        self.allocated
    }

    /// Bytes left before the next allocation fails.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.capacity.saturating_sub(self.allocated)
    }

    /// Offset alignment.
    #[inline]
    #[must_use]
    pub const fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Allocates `size` bytes. Returns `None` when the range does not fit,
    /// in which case the caller is expected to grow.
    pub fn allocate(&mut self, size: u64) -> Option<RangeAllocation> {
        let offset = align_up(self.allocated, self.alignment);
        let end = offset.checked_add(size)?;
        if end > self.capacity {
            return None;
        }
        self.allocated = end;
        Some(RangeAllocation { offset, size })
    }

    /// Raises the capacity to `new_capacity`. Existing offsets do not move.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidGrow`] if `new_capacity` is smaller than
    /// the current capacity.
    pub fn grow(&mut self, new_capacity: u64) -> CoreResult<()> {
        if new_capacity < self.capacity {
            return Err(CoreError::InvalidGrow {
                current: self.capacity,
                requested: new_capacity,
            });
        }
        self.capacity = new_capacity;
        Ok(())
    }

    /// Forgets every allocation. The capacity is kept.
    #[inline]
    pub fn reset(&mut self) {
        self.allocated = 0;
    }

    /// Capacity the growth policy picks for a failed request of `size`
    /// bytes: `max(capacity * factor, allocated + size)` rounded up to the
    /// alignment.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
    pub fn grown_capacity(&self, size: u64) -> u64 {
        let scaled = (self.capacity as f64 * self.growth_factor).ceil() as u64;
        let needed = align_up(self.allocated, self.alignment).saturating_add(size);
        align_up(scaled.max(needed), self.alignment)
    }

    /// Allocates `size` bytes, growing once by the growth policy if the first
    /// attempt fails.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AllocatorExhausted`] if the retry also fails.
    pub fn allocate_or_grow(&mut self, size: u64) -> CoreResult<AllocationOutcome> {
        if let Some(allocation) = self.allocate(size) {
            return Ok(AllocationOutcome { allocation, grew_to: None });
        }

        let new_capacity = self.grown_capacity(size);
        self.grow(new_capacity)?;
        debug!(capacity = new_capacity, requested = size, "range allocator grew");

        self.allocate(size)
            .map(|allocation| AllocationOutcome { allocation, grew_to: Some(new_capacity) })
            .ok_or(CoreError::AllocatorExhausted {
                requested: size,
                capacity: self.capacity,
            })
    }
}

/// Rounds `value` up to a multiple of the power-of-two `alignment`.
#[inline]
#[must_use]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    let mask = alignment - 1;
    match value.checked_add(mask) {
        Some(v) => v & !mask,
        None => u64::MAX & !mask,
    }
}

/// Rounds `value` down to a multiple of the power-of-two `alignment`.
#[inline]
#[must_use]
pub const fn align_down(value: u64, alignment: u64) -> u64 {
    value & !(alignment - 1)
}
