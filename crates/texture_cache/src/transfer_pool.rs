//! Transfer-buffer pool: a ring of identically sized, mappable staging
//! buffers for asynchronous CPU-to-GPU pixel uploads.
//!
//! The ring is handed out round-robin. Reuse of a buffer still being read
//! by the GPU is avoided heuristically: the update throttle doubles the
//! pool when a completion fence stays unsignaled after a full rotation.
//! If a buffer is nevertheless still unmapped when its turn comes around,
//! the pool blocks on the device until the re-map lands; with the growth
//! policy active this is a rare worst-case path, not the steady state.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Hard cap on ring length. Beyond this the pool stops growing and the
/// blocking fallback in `next_buffer` carries the backpressure.
pub const MAX_POOL_BUFFERS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPoolError {
    ZeroBufferCount,
    ZeroBufferSize,
}

impl fmt::Display for TransferPoolError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferPoolError::ZeroBufferCount => {
                write!(formatter, "transfer pool needs at least one buffer")
            }
            TransferPoolError::ZeroBufferSize => {
                write!(formatter, "transfer pool buffer size must be at least 1 byte")
            }
        }
    }
}

impl std::error::Error for TransferPoolError {}

#[derive(Debug)]
struct TransferBuffer {
    buffer: wgpu::Buffer,
    /// True while the buffer is mapped and writable from the CPU.
    write_ready: Arc<AtomicBool>,
}

impl TransferBuffer {
    fn create(device: &wgpu::Device, size: u64) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texture_cache.transfer_buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: true,
        });
        Self {
            buffer,
            write_ready: Arc::new(AtomicBool::new(true)),
        }
    }
}

#[derive(Debug)]
pub struct TransferBufferPool {
    buffers: Vec<TransferBuffer>,
    cursor: usize,
    buffer_size: u64,
}

impl TransferBufferPool {
    pub fn allocate(
        device: &wgpu::Device,
        count: usize,
        size: u64,
    ) -> Result<Self, TransferPoolError> {
        if count == 0 {
            return Err(TransferPoolError::ZeroBufferCount);
        }
        if size == 0 {
            return Err(TransferPoolError::ZeroBufferSize);
        }
        let count = count.min(MAX_POOL_BUFFERS);
        let mut buffers = Vec::with_capacity(count);
        for _ in 0..count {
            buffers.push(TransferBuffer::create(device, size));
        }
        Ok(Self {
            buffers,
            cursor: 0,
            buffer_size: size,
        })
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    /// Hands out the next buffer index in ring order, blocking only if the
    /// buffer's re-map from a previous rotation has not completed yet.
    pub fn next_buffer(&mut self, device: &wgpu::Device) -> usize {
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.buffers.len();

        let entry = &self.buffers[index];
        while !entry.write_ready.load(Ordering::Acquire) {
            device
                .poll(wgpu::PollType::wait_indefinitely())
                .unwrap_or_else(|error| panic!("device poll while reclaiming buffer: {error}"));
        }
        index
    }

    /// Copies `bytes` into the mapped buffer and unmaps it, readying it for
    /// `copy_buffer_to_texture`. Call exactly once per `next_buffer`.
    pub fn fill(&self, index: usize, bytes: &[u8]) {
        let entry = &self.buffers[index];
        assert!(
            entry.write_ready.load(Ordering::Acquire),
            "transfer buffer {index} filled while not mapped"
        );
        assert!(
            bytes.len() as u64 <= self.buffer_size,
            "transfer payload of {} bytes exceeds buffer size {}",
            bytes.len(),
            self.buffer_size
        );
        entry.write_ready.store(false, Ordering::Release);
        let byte_len = bytes.len() as u64;
        let mut mapped = entry
            .buffer
            .slice(0..byte_len)
            .get_mapped_range_mut();
        mapped.copy_from_slice(bytes);
        drop(mapped);
        entry.buffer.unmap();
    }

    pub fn buffer(&self, index: usize) -> &wgpu::Buffer {
        &self.buffers[index].buffer
    }

    /// Re-arms a buffer after the copy using it has been submitted. The
    /// map completes asynchronously; `next_buffer` waits for it only if the
    /// ring wraps around before then.
    pub fn recycle(&self, index: usize) {
        let entry = &self.buffers[index];
        let write_ready = Arc::clone(&entry.write_ready);
        entry
            .buffer
            .slice(..)
            .map_async(wgpu::MapMode::Write, move |result| {
                if result.is_ok() {
                    write_ready.store(true, Ordering::Release);
                }
            });
    }

    /// Doubles the ring, capped at [`MAX_POOL_BUFFERS`]. Existing buffers
    /// are rotated so the next-to-hand-out buffer becomes index 0, fresh
    /// buffers are appended, and the cursor moves to the first fresh
    /// buffer: in-flight buffers keep their relative order and get a full
    /// extra rotation to drain. Returns false once the cap is reached.
    pub fn grow(&mut self, device: &wgpu::Device) -> bool {
        let current = self.buffers.len();
        if current >= MAX_POOL_BUFFERS {
            return false;
        }
        let target = (current * 2).min(MAX_POOL_BUFFERS);

        let fresh: Vec<TransferBuffer> = (current..target)
            .map(|_| TransferBuffer::create(device, self.buffer_size))
            .collect();
        self.cursor = grow_ring_order(&mut self.buffers, self.cursor, fresh);
        true
    }

    /// Releases every buffer. Used before a full grid rebuild.
    pub fn reset(&mut self) {
        self.buffers.clear();
        self.cursor = 0;
    }
}

/// Ring-order bookkeeping behind [`TransferBufferPool::grow`], factored out
/// so order preservation is testable without a GPU device.
pub(crate) fn grow_ring_order<T>(ring: &mut Vec<T>, cursor: usize, fresh: Vec<T>) -> usize {
    let current = ring.len();
    ring.rotate_left(cursor);
    ring.extend(fresh);
    current
}
