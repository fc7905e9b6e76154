//! # Frame-Swapped Double Buffer
//!
//! Two copies of a resource: the one being written this frame and the one
//! written last frame. Readers of "last frame's result" (occlusion proxies,
//! visibility bitmasks) look at [`DoubleBuffered::previous`] while the
//! writer fills [`DoubleBuffered::current_mut`]. At the end of the frame the
//! roles swap.
//!
//! ```text
//!   frame N      write ──► [ A ]      [ B ] ◄── read
//!   swap()
//!   frame N+1    read  ──► [ A ]      [ B ] ◄── write
//! ```

/// A current/previous pair swapped once per frame.
#[derive(Debug, Clone)]
pub struct DoubleBuffered<T> {
    buffers: [T; 2],
    /// Index of the buffer written this frame (0 or 1).
    current: usize,
    /// Number of swaps since creation.
    frame_count: u64,
}

impl<T> DoubleBuffered<T> {
    /// Creates a double buffer from two explicit values. `current` is
    /// written first.
    #[must_use]
    pub fn from_pair(current: T, previous: T) -> Self {
        Self {
            buffers: [current, previous],
            current: 0,
            frame_count: 0,
        }
    }

    /// Creates a double buffer with both sides built by `make`.
    #[must_use]
    pub fn from_fn(mut make: impl FnMut() -> T) -> Self {
        Self::from_pair(make(), make())
    }

    /// Buffer being written this frame.
    #[inline]
    #[must_use]
    pub fn current(&self) -> &T {
        &self.buffers[self.current]
    }

    /// Mutable access to the buffer being written this frame.
    #[inline]
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.buffers[self.current]
    }

    /// Buffer written last frame.
    #[inline]
    #[must_use]
    pub fn previous(&self) -> &T {
        &self.buffers[self.current ^ 1]
    }

    /// Current side mutably and previous side shared, at the same time.
    pub fn split(&mut self) -> (&mut T, &T) {
        let [a, b] = &mut self.buffers;
        if self.current == 0 {
            (a, &*b)
        } else {
            (b, &*a)
        }
    }

    /// Both sides mutably, for operations that must touch the pair.
    pub fn both_mut(&mut self) -> [&mut T; 2] {
        let [a, b] = &mut self.buffers;
        [a, b]
    }

    /// Swaps roles: this frame's result becomes `previous`.
    #[inline]
    pub fn swap(&mut self) {
        self.current ^= 1;
        self.frame_count += 1;
    }

    /// Number of swaps so far.
    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl<T: Clone> DoubleBuffered<T> {
    /// Creates a double buffer with both sides equal to `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_pair(value.clone(), value)
    }
}

impl<T: Default> Default for DoubleBuffered<T> {
    fn default() -> Self {
        Self::from_fn(T::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_exchanges_roles() {
        let mut db = DoubleBuffered::new(0u32);
        *db.current_mut() = 7;
        assert_eq!(*db.previous(), 0);

        db.swap();
        assert_eq!(*db.previous(), 7);
        assert_eq!(*db.current(), 0);
        assert_eq!(db.frame_count(), 1);
    }

    #[test]
    fn test_split_access() {
        let mut db = DoubleBuffered::from_pair(vec![1], vec![2]);
        db.swap();
        let (cur, prev) = db.split();
        cur.push(3);
        assert_eq!(prev, &vec![1]);
        assert_eq!(db.current(), &vec![2, 3]);
    }

    #[test]
    fn test_both_mut() {
        let mut db: DoubleBuffered<Vec<u8>> = DoubleBuffered::default();
        for side in db.both_mut() {
            side.push(1);
        }
        assert_eq!(db.current().len(), 1);
        assert_eq!(db.previous().len(), 1);
    }
}
