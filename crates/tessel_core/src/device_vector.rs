//! # Device Vector
//!
//! A growable sequence of `T` with a host copy and a device copy.
//!
//! ## Sync model
//!
//! ```text
//!   host:   [ synced ............ | tail (appended since last sync) ]
//!   device: [ synced ............ | stale / unused capacity .......  ]
//!                 ▲ dirty ranges
//! ```
//!
//! `sync_to_device` brings the device copy up to date in three ordered
//! steps:
//!
//! 1. **Resize** - if the host bytes outgrew the device buffer, create a
//!    bigger one, copy the synced prefix forward and retire the old one.
//! 2. **Tail** - upload everything appended since the last sync.
//! 3. **Dirty** - widen, sort and merge dirty ranges, one upload per merged
//!    range.
//!
//! The device capacity is tracked by a [`RangeAllocator`]: its size is the
//! device buffer size and its high-water mark is the synced byte count.
//!
//! ## Locking
//!
//! Host data sits behind one `RwLock`. Appends from worker threads and the
//! resize-and-copy in `sync_to_device` are serialized by it; readers run
//! concurrently with each other only.

use std::ops::Range;
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::RwLock;
use tracing::{debug, error, trace};

use crate::device::{BufferDesc, BufferHandle, BufferUsage, GpuDevice, COPY_ALIGNMENT};
use crate::error::CoreResult;
use crate::memory::{align_down, align_up, RangeAllocator};

/// What one `sync_to_device` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// The device buffer was replaced. Bindings that reference it must be
    /// rebuilt.
    pub resized: bool,
    /// Upload calls issued.
    pub uploads: u32,
    /// Bytes uploaded.
    pub bytes: u64,
}

impl SyncOutcome {
    /// Folds another outcome into this one.
    pub fn merge(&mut self, other: Self) {
        self.resized |= other.resized;
        self.uploads += other.uploads;
        self.bytes += other.bytes;
    }
}

struct HostSide<T> {
    data: Vec<T>,
    dirty: Vec<Range<u64>>,
    buffer: Option<BufferHandle>,
    /// Device capacity and synced high-water mark.
    capacity: RangeAllocator,
}

impl<T: Pod> HostSide<T> {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            dirty: Vec::new(),
            buffer: None,
            capacity: RangeAllocator::new(0, 1),
        }
    }

    fn byte_len(&self) -> u64 {
        (self.data.len() * std::mem::size_of::<T>()) as u64
    }

    /// Pulls the synced mark back after the host sequence shrank.
    fn clamp_synced(&mut self) {
        let byte_len = self.byte_len();
        if self.capacity.allocated_bytes() > byte_len {
            self.capacity.reset();
            let _ = self.capacity.allocate(byte_len);
        }
    }
}

/// Scoped exclusive access to a [`DeviceVector`]'s host data.
///
/// Appends need no bookkeeping. Writes through [`Self::elements_mut`] must be
/// followed by [`Self::set_dirty`] or [`Self::set_dirty_element`].
pub struct WriteAccess<'a, T: Pod> {
    side: &'a mut HostSide<T>,
}

impl<T: Pod> WriteAccess<'_, T> {
    /// Appends one element and returns its index.
    pub fn push(&mut self, value: T) -> usize {
        self.side.data.push(value);
        self.side.data.len() - 1
    }

    /// Appends elements and returns their index range.
    pub fn extend_from_slice(&mut self, values: &[T]) -> Range<usize> {
        let start = self.side.data.len();
        self.side.data.extend_from_slice(values);
        start..self.side.data.len()
    }

    /// Overwrites an element and marks it dirty. Returns `false` if the
    /// index is out of range.
    pub fn set(&mut self, index: usize, value: T) -> bool {
        match self.side.data.get_mut(index) {
            Some(slot) => {
                *slot = value;
                self.set_dirty_element(index);
                true
            }
            None => false,
        }
    }

    /// Host elements.
    #[must_use]
    pub fn elements(&self) -> &[T] {
        &self.side.data
    }

    /// Mutable host elements. Changes are not tracked.
    pub fn elements_mut(&mut self) -> &mut [T] {
        &mut self.side.data
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.side.data.len()
    }

    /// Whether there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.side.data.is_empty()
    }

    /// Marks a half-open byte range for re-upload.
    pub fn set_dirty(&mut self, range: Range<u64>) {
        if range.start < range.end {
            self.side.dirty.push(range);
        }
    }

    /// Marks one element for re-upload.
    pub fn set_dirty_element(&mut self, index: usize) {
        let size = std::mem::size_of::<T>() as u64;
        let start = index as u64 * size;
        self.set_dirty(start..start + size);
    }
}

/// A host-mirrored, device-synchronized growable vector.
///
/// # Example
///
/// ```rust,ignore
/// let instances = DeviceVector::<InstanceData>::new(device, "instances", BufferUsage::STORAGE);
/// let id = instances.push_back(instance);
/// if instances.sync_to_device()?.resized {
///     rebuild_bind_groups();
/// }
/// ```
pub struct DeviceVector<T: Pod> {
    device: Arc<dyn GpuDevice>,
    label: String,
    usage: BufferUsage,
    host: RwLock<HostSide<T>>,
}

impl<T: Pod> DeviceVector<T> {
    /// Creates an empty vector. No device memory is allocated until the
    /// first non-empty sync. `COPY_SRC | COPY_DST` are always added to
    /// `usage`.
    pub fn new(device: Arc<dyn GpuDevice>, label: impl Into<String>, usage: BufferUsage) -> Self {
        Self {
            device,
            label: label.into(),
            usage: usage | BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
            host: RwLock::new(HostSide::new()),
        }
    }

    /// Debug label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Device this vector syncs to.
    #[must_use]
    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    /// Appends one element and returns its index.
    pub fn push_back(&self, value: T) -> usize {
        self.write_locked(|w| w.push(value))
    }

    /// Appends elements and returns their index range.
    pub fn extend_from_slice(&self, values: &[T]) -> Range<usize> {
        self.write_locked(|w| w.extend_from_slice(values))
    }

    /// Overwrites one element and marks it dirty. Returns `false` if the
    /// index is out of range.
    pub fn set(&self, index: usize, value: T) -> bool {
        self.write_locked(|w| w.set(index, value))
    }

    /// Copy of one element.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.host.read().data.get(index).copied()
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.host.read().data.len()
    }

    /// Whether there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.host.read().data.is_empty()
    }

    /// Host size in bytes.
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        self.host.read().byte_len()
    }

    /// Current device buffer, if one exists.
    #[must_use]
    pub fn buffer(&self) -> Option<BufferHandle> {
        self.host.read().buffer
    }

    /// Size of the current device buffer in bytes.
    #[must_use]
    pub fn device_capacity_bytes(&self) -> u64 {
        self.host.read().capacity.size()
    }

    /// Runs `f` with exclusive access to the host data.
    pub fn write_locked<R>(&self, f: impl FnOnce(&mut WriteAccess<'_, T>) -> R) -> R {
        let mut side = self.host.write();
        let mut access = WriteAccess { side: &mut *side };
        f(&mut access)
    }

    /// Runs `f` with shared access to the host data.
    pub fn read_locked<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        let side = self.host.read();
        f(&side.data)
    }

    /// Marks a half-open byte range for re-upload.
    pub fn set_dirty(&self, range: Range<u64>) {
        self.write_locked(|w| w.set_dirty(range));
    }

    /// Marks one element for re-upload.
    pub fn set_dirty_element(&self, index: usize) {
        self.write_locked(|w| w.set_dirty_element(index));
    }

    /// Replaces the contents. The device buffer is kept; overlapping bytes
    /// are re-uploaded on the next sync.
    pub fn assign(&self, values: &[T]) {
        let mut side = self.host.write();
        let overlap = side.data.len().min(values.len());
        side.data.clear();
        side.data.extend_from_slice(values);
        side.clamp_synced();
        if overlap > 0 {
            side.dirty.push(0..(overlap * std::mem::size_of::<T>()) as u64);
        }
    }

    /// Resizes to `len` elements. New elements are zeroed; surviving ones
    /// keep their values.
    pub fn resize_zeroed(&self, len: usize) {
        let mut side = self.host.write();
        side.data.resize(len, T::zeroed());
        side.clamp_synced();
    }

    /// Drops host data and the device buffer. Storage is recreated by the
    /// next non-empty sync.
    pub fn clear(&self) {
        let mut side = self.host.write();
        if let Some(buffer) = side.buffer.take() {
            self.device.destroy_buffer(buffer);
        }
        side.data = Vec::new();
        side.dirty.clear();
        side.capacity = RangeAllocator::new(0, 1);
    }

    /// Brings the device copy up to date with the host copy.
    ///
    /// # Errors
    ///
    /// Propagates device failures. Buffer creation failure is
    /// [`CoreError::OutOfDeviceMemory`](crate::CoreError::OutOfDeviceMemory)
    /// and is fatal.
    pub fn sync_to_device(&self) -> CoreResult<SyncOutcome> {
        let mut guard = self.host.write();
        let side = &mut *guard;
        let byte_len = side.byte_len();
        let mut outcome = SyncOutcome::default();

        if byte_len == 0 {
            side.dirty.clear();
            return Ok(outcome);
        }

        // 1. Resize and copy forward.
        if side.buffer.is_none() || byte_len > side.capacity.size() {
            self.resize(side, byte_len)?;
            outcome.resized = true;
        }
        let Some(buffer) = side.buffer else {
            return Ok(outcome);
        };
        let bytes: &[u8] = bytemuck::cast_slice(&side.data);

        // 2. Tail.
        let synced = side.capacity.allocated_bytes();
        let mut dirty_limit = byte_len;
        if byte_len > synced {
            let _ = side.capacity.allocate(byte_len - synced);
            let start = align_down(synced, COPY_ALIGNMENT);
            let end = align_up(byte_len, COPY_ALIGNMENT);
            self.upload_range(buffer, bytes, start..end, &mut outcome)?;
            dirty_limit = start;
        }

        // 3. Dirty regions.
        let limit = if dirty_limit == byte_len {
            align_up(byte_len, COPY_ALIGNMENT)
        } else {
            dirty_limit
        };
        let widened = side.dirty.drain(..).filter_map(|range| {
            let start = align_down(range.start, COPY_ALIGNMENT);
            let end = align_up(range.end, COPY_ALIGNMENT).min(limit);
            (start < end).then_some(start..end)
        });
        let merged = coalesce_ranges(widened.collect());
        for range in merged {
            self.upload_range(buffer, bytes, range, &mut outcome)?;
        }

        trace!(label = %self.label, uploads = outcome.uploads, bytes = outcome.bytes, "device vector synced");
        Ok(outcome)
    }

    fn resize(&self, side: &mut HostSide<T>, byte_len: u64) -> CoreResult<()> {
        let old_capacity = side.capacity.size();
        let synced = side.capacity.allocated_bytes();
        let grown = side.capacity.grown_capacity(byte_len - synced);
        let new_capacity = align_up(grown.max(byte_len), COPY_ALIGNMENT);

        let new_buffer = self
            .device
            .create_buffer(&BufferDesc {
                label: &self.label,
                size: new_capacity,
                usage: self.usage,
            })
            .map_err(|err| {
                error!(label = %self.label, bytes = new_capacity, %err, "device vector resize failed");
                err
            })?;

        if let Some(old_buffer) = side.buffer.take() {
            let preserved = align_up(synced, COPY_ALIGNMENT).min(old_capacity);
            if preserved > 0 {
                self.device.copy_buffer(old_buffer, 0, new_buffer, 0, preserved)?;
            }
            self.device.destroy_buffer(old_buffer);
        }

        side.capacity.grow(new_capacity)?;
        side.buffer = Some(new_buffer);
        debug!(label = %self.label, from = old_capacity, to = new_capacity, "device vector resized");
        Ok(())
    }

    fn upload_range(
        &self,
        buffer: BufferHandle,
        bytes: &[u8],
        range: Range<u64>,
        outcome: &mut SyncOutcome,
    ) -> CoreResult<()> {
        let host_end = range.end.min(bytes.len() as u64);
        let src = &bytes[range.start as usize..host_end as usize];
        let size = range.end - range.start;
        if src.len() as u64 == size {
            self.device.upload(buffer, range.start, src)?;
        } else {
            // Range widened past the host bytes: pad with zeros.
            let mut padded = src.to_vec();
            padded.resize(size as usize, 0);
            self.device.upload(buffer, range.start, &padded)?;
        }
        outcome.uploads += 1;
        outcome.bytes += size;
        Ok(())
    }
}

impl<T: Pod> Drop for DeviceVector<T> {
    fn drop(&mut self) {
        if let Some(buffer) = self.host.get_mut().buffer.take() {
            self.device.destroy_buffer(buffer);
        }
    }
}

impl<T: Pod> std::fmt::Debug for DeviceVector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = self.host.read();
        f.debug_struct("DeviceVector")
            .field("label", &self.label)
            .field("len", &side.data.len())
            .field("buffer", &side.buffer)
            .field("capacity", &side.capacity.size())
            .finish_non_exhaustive()
    }
}

/// Sorts ranges by start and merges adjacent or overlapping ones.
#[must_use]
pub fn coalesce_ranges(mut ranges: Vec<Range<u64>>) -> Vec<Range<u64>> {
    ranges.retain(|r| r.start < r.end);
    ranges.sort_unstable_by_key(|r| (r.start, r.end));

    let mut merged: Vec<Range<u64>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HostDevice, UploadRecord};
    use crate::error::CoreError;

    fn setup() -> (Arc<HostDevice>, Arc<dyn GpuDevice>) {
        let host = Arc::new(HostDevice::new());
        let device: Arc<dyn GpuDevice> = host.clone();
        (host, device)
    }

    fn device_bytes<T: Pod>(host: &HostDevice, vector: &DeviceVector<T>) -> Vec<u8> {
        let mut bytes = host.buffer_contents(vector.buffer().unwrap()).unwrap();
        bytes.truncate(vector.byte_len() as usize);
        bytes
    }

    #[test]
    fn test_coalesce_ranges() {
        assert_eq!(coalesce_ranges(vec![16..32, 0..16]), vec![0..32]);
        assert_eq!(coalesce_ranges(vec![0..8, 4..12, 20..24]), vec![0..12, 20..24]);
        assert_eq!(coalesce_ranges(vec![8..8, 40..44, 0..4]), vec![0..4, 40..44]);
        assert!(coalesce_ranges(Vec::new()).is_empty());
    }

    #[test]
    fn test_empty_sync_allocates_nothing() {
        let (host, device) = setup();
        let vector = DeviceVector::<u32>::new(device, "empty", BufferUsage::STORAGE);
        let outcome = vector.sync_to_device().unwrap();
        assert_eq!(outcome, SyncOutcome::default());
        assert!(vector.buffer().is_none());
        assert_eq!(host.stats().buffers_created, 0);
    }

    #[test]
    fn test_first_sync_resizes_and_uploads_tail() {
        let (host, device) = setup();
        let vector = DeviceVector::<[u32; 4]>::new(device, "tail", BufferUsage::STORAGE);
        for i in 0..10u32 {
            vector.push_back([i; 4]);
        }
        let outcome = vector.sync_to_device().unwrap();
        assert!(outcome.resized);
        assert_eq!(outcome.uploads, 1);
        assert!(vector.device_capacity_bytes() >= 160);
        let expected: Vec<u8> = vector.read_locked(|data| bytemuck::cast_slice(data).to_vec());
        assert_eq!(device_bytes(&host, &vector), expected);
    }

    #[test]
    fn test_growth_preserves_content() {
        let (host, device) = setup();
        let vector = DeviceVector::<u32>::new(device, "grow", BufferUsage::STORAGE);
        let mut resizes = 0;
        for i in 0..200u32 {
            vector.push_back(i * 3);
            if i % 7 == 0 {
                vector.set(0, i);
            }
            if vector.sync_to_device().unwrap().resized {
                resizes += 1;
            }
        }
        assert!(resizes > 3);
        let expected: Vec<u8> = vector.read_locked(|data| bytemuck::cast_slice(data).to_vec());
        assert_eq!(device_bytes(&host, &vector), expected);
        // Old buffers were retired.
        assert_eq!(host.live_buffer_count(), 1);
    }

    #[test]
    fn test_adjacent_dirty_ranges_upload_once() {
        let (host, device) = setup();
        let vector = DeviceVector::<u32>::new(device, "dirty", BufferUsage::STORAGE);
        vector.extend_from_slice(&[0; 16]);
        vector.sync_to_device().unwrap();
        host.clear_upload_log();

        vector.set_dirty(0..16);
        vector.set_dirty(16..32);
        let outcome = vector.sync_to_device().unwrap();

        assert!(!outcome.resized);
        let uploads = host.upload_log();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].range(), 0..32);
    }

    #[test]
    fn test_set_uploads_single_element() {
        let (host, device) = setup();
        let vector = DeviceVector::<[f32; 4]>::new(device, "set", BufferUsage::STORAGE);
        vector.extend_from_slice(&[[0.0; 4]; 8]);
        vector.sync_to_device().unwrap();
        host.clear_upload_log();

        assert!(vector.set(3, [1.0; 4]));
        assert!(!vector.set(99, [1.0; 4]));
        vector.sync_to_device().unwrap();

        let uploads = host.upload_log();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].range(), 48..64);
        assert_eq!(vector.get(3), Some([1.0; 4]));
    }

    #[test]
    fn test_dirty_inside_tail_is_not_uploaded_twice() {
        let (host, device) = setup();
        let vector = DeviceVector::<u32>::new(device, "tail-dirty", BufferUsage::STORAGE);
        vector.extend_from_slice(&[1; 4]);
        vector.sync_to_device().unwrap();
        host.clear_upload_log();

        vector.extend_from_slice(&[2; 4]);
        vector.set(5, 7);
        vector.set(0, 9);
        vector.sync_to_device().unwrap();

        let ranges: Vec<_> = host.upload_log().iter().map(UploadRecord::range).collect();
        assert_eq!(ranges, vec![16..32, 0..4]);
    }

    #[test]
    fn test_unaligned_elements_are_padded() {
        let (host, device) = setup();
        let vector = DeviceVector::<[u8; 3]>::new(device, "bytes", BufferUsage::STORAGE);
        vector.push_back([1, 2, 3]);
        vector.sync_to_device().unwrap();
        vector.push_back([4, 5, 6]);
        vector.sync_to_device().unwrap();
        assert_eq!(device_bytes(&host, &vector), vec![1, 2, 3, 4, 5, 6]);
        assert!(host.upload_log().iter().all(|u| u.offset % 4 == 0 && u.size % 4 == 0));
    }

    #[test]
    fn test_clear_destroys_buffer() {
        let (host, device) = setup();
        let vector = DeviceVector::<u32>::new(device, "clear", BufferUsage::STORAGE);
        vector.extend_from_slice(&[5; 10]);
        vector.sync_to_device().unwrap();
        assert_eq!(host.live_buffer_count(), 1);

        vector.clear();
        assert!(vector.is_empty());
        assert!(vector.buffer().is_none());
        assert_eq!(host.live_buffer_count(), 0);

        vector.push_back(1);
        assert!(vector.sync_to_device().unwrap().resized);
        assert_eq!(device_bytes(&host, &vector), 1u32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_assign_and_resize_zeroed() {
        let (host, device) = setup();
        let vector = DeviceVector::<u32>::new(device, "assign", BufferUsage::STORAGE);
        vector.assign(&[1, 2, 3, 4]);
        vector.sync_to_device().unwrap();

        vector.assign(&[7, 8]);
        vector.sync_to_device().unwrap();
        assert_eq!(device_bytes(&host, &vector), bytemuck::cast_slice::<u32, u8>(&[7, 8]).to_vec());

        vector.resize_zeroed(5);
        vector.sync_to_device().unwrap();
        assert_eq!(
            device_bytes(&host, &vector),
            bytemuck::cast_slice::<u32, u8>(&[7, 8, 0, 0, 0]).to_vec()
        );
    }

    #[test]
    fn test_out_of_memory_is_reported() {
        let host = Arc::new(HostDevice::with_memory_budget(64));
        let device: Arc<dyn GpuDevice> = host.clone();
        let vector = DeviceVector::<u32>::new(device, "oom", BufferUsage::STORAGE);
        vector.extend_from_slice(&[0; 32]);
        assert!(matches!(
            vector.sync_to_device(),
            Err(CoreError::OutOfDeviceMemory { .. })
        ));
    }

    #[test]
    fn test_concurrent_appends() {
        let (_host, device) = setup();
        let vector = Arc::new(DeviceVector::<u32>::new(device, "mt", BufferUsage::STORAGE));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let vector = Arc::clone(&vector);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        vector.push_back(t * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(vector.len(), 1000);
        vector.sync_to_device().unwrap();
    }
}
