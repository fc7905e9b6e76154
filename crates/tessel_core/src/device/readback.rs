//! Asynchronous device-to-host reads.
//!
//! A [`Readback`] is requested in the middle of a frame and resolved by the
//! device once that frame has finished. Until then it reports
//! [`ReadbackState::Pending`]; callers keep the handle and poll again next
//! frame.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

/// What a readback currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadbackState {
    /// The device has not finished the frame yet.
    Pending,
    /// The requested bytes.
    Ready(Vec<u8>),
    /// The device discarded the request, or the bytes were already taken.
    Dropped,
}

/// Receiving half of a device readback.
#[derive(Debug)]
pub struct Readback {
    receiver: Receiver<Vec<u8>>,
    taken: bool,
}

/// Device-side half of a readback. Dropping it without resolving marks the
/// readback as [`ReadbackState::Dropped`].
#[derive(Debug)]
pub struct ReadbackSender {
    sender: Sender<Vec<u8>>,
}

impl Readback {
    /// Creates a connected sender/readback pair.
    #[must_use]
    pub fn channel() -> (ReadbackSender, Readback) {
        let (sender, receiver) = bounded(1);
        (ReadbackSender { sender }, Readback { receiver, taken: false })
    }

    /// A readback that is ready immediately.
    #[must_use]
    pub fn ready(bytes: Vec<u8>) -> Self {
        let (sender, readback) = Self::channel();
        sender.resolve(bytes);
        readback
    }

    /// Checks for the result without blocking. `Ready` is returned once.
    pub fn poll(&mut self) -> ReadbackState {
        if self.taken {
            return ReadbackState::Dropped;
        }
        match self.receiver.try_recv() {
            Ok(bytes) => {
                self.taken = true;
                ReadbackState::Ready(bytes)
            }
            Err(TryRecvError::Empty) => ReadbackState::Pending,
            Err(TryRecvError::Disconnected) => {
                self.taken = true;
                ReadbackState::Dropped
            }
        }
    }

    /// Blocks up to `timeout` for the result.
    pub fn wait_timeout(&mut self, timeout: Duration) -> ReadbackState {
        if self.taken {
            return ReadbackState::Dropped;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(bytes) => {
                self.taken = true;
                ReadbackState::Ready(bytes)
            }
            Err(RecvTimeoutError::Timeout) => ReadbackState::Pending,
            Err(RecvTimeoutError::Disconnected) => {
                self.taken = true;
                ReadbackState::Dropped
            }
        }
    }
}

impl ReadbackSender {
    /// Delivers the bytes.
    pub fn resolve(self, bytes: Vec<u8>) {
        // The receiver may already be gone; nobody is waiting then.
        let _ = self.sender.send(bytes);
    }
}
