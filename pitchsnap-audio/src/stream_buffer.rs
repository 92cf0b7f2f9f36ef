//! Fixed-capacity circular sample store
//!
//! One slot is always left empty so that `read_pos == write_pos` means
//! empty and never full, hence `available() + free() == capacity() - 1`.
//! No internal synchronization: one writer and one reader, both owned by
//! the engine.

/// Circular FIFO of mono samples
#[derive(Debug, Clone)]
pub struct StreamBuffer {
    data: Vec<f32>,
    read_pos: usize,
    write_pos: usize,
}

impl StreamBuffer {
    /// Allocate a buffer holding at most `capacity - 1` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity.max(2)],
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Unread samples
    #[inline]
    pub fn available(&self) -> usize {
        let cap = self.data.len();
        (self.write_pos + cap - self.read_pos) % cap
    }

    /// Slots that can be written before the buffer is full
    #[inline]
    pub fn free(&self) -> usize {
        self.data.len() - 1 - self.available()
    }

    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    pub fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    /// Append as much of `samples` as fits; returns the count written
    ///
    /// A short count is backpressure: the caller resubmits the rest later.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let count = samples.len().min(self.free());
        let cap = self.data.len();

        // At most two contiguous runs: up to the end of storage, then from 0
        let first = count.min(cap - self.write_pos);
        self.data[self.write_pos..self.write_pos + first].copy_from_slice(&samples[..first]);
        self.data[..count - first].copy_from_slice(&samples[first..count]);

        self.write_pos = (self.write_pos + count) % cap;
        count
    }

    /// Append up to `count` zero samples; returns the count written
    pub fn write_silence(&mut self, count: usize) -> usize {
        let count = count.min(self.free());
        let cap = self.data.len();
        for i in 0..count {
            self.data[(self.write_pos + i) % cap] = 0.0;
        }
        self.write_pos = (self.write_pos + count) % cap;
        count
    }

    /// Copy the oldest unread samples into `out` without consuming them
    pub fn peek(&self, out: &mut [f32]) -> usize {
        let count = out.len().min(self.available());
        let cap = self.data.len();

        let first = count.min(cap - self.read_pos);
        out[..first].copy_from_slice(&self.data[self.read_pos..self.read_pos + first]);
        out[first..count].copy_from_slice(&self.data[..count - first]);
        count
    }

    /// Remove the oldest unread samples into `out`; returns the count read
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        let count = self.peek(out);
        self.read_pos = (self.read_pos + count) % self.data.len();
        count
    }

    /// Forget all unread samples, keeping the allocation
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }
}
