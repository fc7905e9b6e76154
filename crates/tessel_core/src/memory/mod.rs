//! # Memory Management
//!
//! Range allocation inside growable linear capacities.

pub mod range_allocator;

pub use range_allocator::{
    align_down, align_up, AllocationOutcome, RangeAllocation, RangeAllocator,
    DEFAULT_GROWTH_FACTOR,
};
