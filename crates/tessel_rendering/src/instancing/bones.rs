//! Bone ranges for animated instances.
//!
//! Two arenas, each backed by a device vector sized to the arena capacity:
//!
//! ```text
//!   deform   RangeAllocator (64-byte matrices)     ──▶ DeviceVector<BoneMatrix>
//!   instance RangeAllocator (16-byte states)       ──▶ DeviceVector<BoneInstanceState>
//! ```
//!
//! When an arena grows, its vector is resized to the new capacity. Existing
//! matrices are kept, and the next sync copies them forward on the device.

use std::sync::Arc;

use parking_lot::Mutex;
use tessel_core::{
    BufferHandle, BufferUsage, CoreResult, DeviceVector, GpuDevice, RangeAllocation,
    RangeAllocator, SyncOutcome,
};
use tracing::debug;

use super::{BoneInstanceState, BoneMatrix, IDENTITY_BONE};

const MATRIX_SIZE: u64 = std::mem::size_of::<BoneMatrix>() as u64;
const STATE_SIZE: u64 = std::mem::size_of::<BoneInstanceState>() as u64;

/// Bone ranges of one instance, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoneRanges {
    /// Range in the bone-deform buffer.
    pub deform: RangeAllocation,
    /// Range in the bone-instance buffer.
    pub instance: RangeAllocation,
}

impl BoneRanges {
    /// First matrix index.
    #[must_use]
    pub const fn deform_offset(&self) -> u32 {
        (self.deform.offset / MATRIX_SIZE) as u32
    }

    /// First state index.
    #[must_use]
    pub const fn instance_offset(&self) -> u32 {
        (self.instance.offset / STATE_SIZE) as u32
    }
}

struct Arenas {
    deform: RangeAllocator,
    instance: RangeAllocator,
}

/// Bone-deform and bone-instance storage of one renderer.
pub struct BoneStorage {
    arenas: Mutex<Arenas>,
    deform: DeviceVector<BoneMatrix>,
    states: DeviceVector<BoneInstanceState>,
    initial_capacity: u64,
    growth_factor: f64,
}

impl BoneStorage {
    /// Storage with `initial_capacity` bytes per arena.
    pub fn new(device: &Arc<dyn GpuDevice>, label: &str, initial_capacity: u64, growth_factor: f64) -> Self {
        let storage = Self {
            arenas: Mutex::new(Self::arenas(initial_capacity, growth_factor)),
            deform: DeviceVector::new(Arc::clone(device), format!("{label}/bone_deform"), BufferUsage::STORAGE),
            states: DeviceVector::new(Arc::clone(device), format!("{label}/bone_instances"), BufferUsage::STORAGE),
            initial_capacity,
            growth_factor,
        };
        storage.fit_backing(&storage.arenas.lock());
        storage
    }

    fn arenas(capacity: u64, growth_factor: f64) -> Arenas {
        Arenas {
            deform: RangeAllocator::new(capacity / MATRIX_SIZE * MATRIX_SIZE, MATRIX_SIZE)
                .with_growth_factor(growth_factor),
            instance: RangeAllocator::new(capacity / STATE_SIZE * STATE_SIZE, STATE_SIZE)
                .with_growth_factor(growth_factor),
        }
    }

    fn fit_backing(&self, arenas: &Arenas) {
        let matrices = (arenas.deform.size() / MATRIX_SIZE) as usize;
        let states = (arenas.instance.size() / STATE_SIZE) as usize;
        if self.deform.len() < matrices {
            self.deform.resize_zeroed(matrices);
        }
        if self.states.len() < states {
            self.states.resize_zeroed(states);
        }
    }

    /// Allocates ranges for `bone_count` bones and initializes them to
    /// identity matrices and default states.
    ///
    /// # Errors
    ///
    /// [`CoreError::AllocatorExhausted`](tessel_core::CoreError::AllocatorExhausted)
    /// if an arena cannot satisfy the request after growing once.
    pub fn allocate(&self, bone_count: u32) -> CoreResult<BoneRanges> {
        let mut arenas = self.arenas.lock();
        let deform = arenas.deform.allocate_or_grow(u64::from(bone_count) * MATRIX_SIZE)?;
        let instance = arenas.instance.allocate_or_grow(u64::from(bone_count) * STATE_SIZE)?;
        if deform.grew_to.is_some() || instance.grew_to.is_some() {
            debug!(
                deform = arenas.deform.size(),
                instance = arenas.instance.size(),
                "bone arenas grew"
            );
            self.fit_backing(&arenas);
        }

        let ranges = BoneRanges {
            deform: deform.allocation,
            instance: instance.allocation,
        };
        let first = ranges.deform_offset() as usize;
        self.deform.write_locked(|w| {
            w.elements_mut()[first..first + bone_count as usize].fill(IDENTITY_BONE);
            w.set_dirty(ranges.deform.offset..ranges.deform.end());
        });
        let first = ranges.instance_offset() as usize;
        self.states.write_locked(|w| {
            w.elements_mut()[first..first + bone_count as usize].fill(BoneInstanceState::default());
            w.set_dirty(ranges.instance.offset..ranges.instance.end());
        });
        Ok(ranges)
    }

    /// Bytes handed out from the deform arena.
    #[must_use]
    pub fn deform_bytes(&self) -> u64 {
        self.arenas.lock().deform.allocated_bytes()
    }

    /// Capacity of the deform arena in bytes.
    #[must_use]
    pub fn deform_capacity(&self) -> u64 {
        self.arenas.lock().deform.size()
    }

    /// Copy of one bone matrix.
    #[must_use]
    pub fn matrix(&self, index: usize) -> Option<BoneMatrix> {
        self.deform.get(index)
    }

    /// Overwrites one bone matrix.
    pub fn set_matrix(&self, index: usize, matrix: BoneMatrix) -> bool {
        self.deform.set(index, matrix)
    }

    /// Deform buffer.
    #[must_use]
    pub fn deform_buffer(&self) -> Option<BufferHandle> {
        self.deform.buffer()
    }

    /// Bone-instance buffer.
    #[must_use]
    pub fn instance_buffer(&self) -> Option<BufferHandle> {
        self.states.buffer()
    }

    /// Syncs both buffers.
    ///
    /// # Errors
    ///
    /// Device failures; fatal.
    pub fn sync(&self) -> CoreResult<SyncOutcome> {
        let mut outcome = self.deform.sync_to_device()?;
        outcome.merge(self.states.sync_to_device()?);
        Ok(outcome)
    }

    /// Forgets every range and shrinks back to the initial capacity.
    pub fn clear(&self) {
        let mut arenas = self.arenas.lock();
        *arenas = Self::arenas(self.initial_capacity, self.growth_factor);
        self.deform.clear();
        self.states.clear();
        self.fit_backing(&arenas);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_core::HostDevice;

    fn storage(capacity: u64) -> BoneStorage {
        let device: Arc<dyn GpuDevice> = Arc::new(HostDevice::new());
        BoneStorage::new(&device, "test", capacity, 1.25)
    }

    #[test]
    fn test_ranges_are_consecutive() {
        let bones = storage(64 * 1024);
        let a = bones.allocate(4).unwrap();
        let b = bones.allocate(2).unwrap();
        assert_eq!(a.deform_offset(), 0);
        assert_eq!(b.deform_offset(), 4);
        assert_eq!(b.instance_offset(), 4);
        assert_eq!(bones.matrix(5), Some(IDENTITY_BONE));
        assert_eq!(bones.deform_bytes(), 6 * MATRIX_SIZE);
    }

    #[test]
    fn test_growth_preserves_matrices() {
        let bones = storage(4 * MATRIX_SIZE);
        let first = bones.allocate(3).unwrap();
        let mut custom = IDENTITY_BONE;
        custom[3][0] = 7.0;
        assert!(bones.set_matrix(first.deform_offset() as usize + 1, custom));
        bones.sync().unwrap();

        let second = bones.allocate(8).unwrap();
        assert_eq!(second.deform_offset(), 3);
        assert!(bones.deform_capacity() >= 11 * MATRIX_SIZE);
        assert_eq!(bones.matrix(1), Some(custom));
        assert_eq!(bones.matrix(10), Some(IDENTITY_BONE));
        assert!(bones.sync().unwrap().resized);
    }

    #[test]
    fn test_clear_restarts_at_zero() {
        let bones = storage(1024);
        bones.allocate(3).unwrap();
        bones.clear();
        assert_eq!(bones.deform_bytes(), 0);
        assert_eq!(bones.allocate(1).unwrap().deform_offset(), 0);
    }
}
