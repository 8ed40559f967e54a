// ringcap/src/pool.rs
//! The packet-object pool a Receive Worker draws frames from and returns
//! them to.
//!
//! A fixed-capacity table of reusable objects, handed out and returned
//! under a lock-free structure rather than allocated per use. The objects
//! are `Frame`s and the structure is a `crossbeam-queue::ArrayQueue`
//! instead of a slot table with validity bits, since frames need no
//! identity beyond "currently on loan or not".

use crossbeam_queue::ArrayQueue;

use crate::frame::Frame;

/// A bounded, reusable pool of [`Frame`] objects.
pub struct FramePool {
    free: ArrayQueue<Frame>,
}

impl FramePool {
    /// Creates a pool pre-populated with `capacity` empty frames.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let free = ArrayQueue::new(capacity.max(1));
        for _ in 0..capacity {
            // capacity was just reserved above; push cannot fail.
            let _ = free.push(Frame::empty());
        }
        Self { free }
    }

    /// Takes a frame from the pool, if one is free.
    #[must_use]
    pub fn try_allocate(&self) -> Option<Frame> {
        self.free.pop()
    }

    /// Returns a frame to the pool after resetting it. If the pool is
    /// somehow at capacity (only possible if a caller double-returns a
    /// frame), the frame is dropped instead of growing the pool.
    pub fn release(&self, mut frame: Frame) {
        frame.reset();
        let _ = self.free.push(frame);
    }

    /// True if at least one frame is currently free.
    #[must_use]
    pub fn has_free(&self) -> bool {
        !self.free.is_empty()
    }

    /// Blocks (yielding the OS thread rather than busy-spinning) until at
    /// least one frame is free, providing backpressure against a drain
    /// cycle that outpaces the downstream pipeline. There is no separate
    /// wakeup channel: the pool is
    /// expected to drain quickly relative to a 100 ms poll cycle, so a
    /// short yield loop is simpler than condvar plumbing and never blocks
    /// longer than it takes the downstream pipeline to return one frame.
    pub fn wait_for_capacity(&self) {
        while self.free.is_empty() {
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_release_round_trips() {
        let pool = FramePool::new(2);
        assert!(pool.has_free());
        let a = pool.try_allocate().expect("frame available");
        let b = pool.try_allocate().expect("frame available");
        assert!(pool.try_allocate().is_none());
        pool.release(a);
        assert!(pool.has_free());
        pool.release(b);
    }
}
