//! Buffer allocation.
//!
//! Effects never allocate on their own. Every call that may need memory takes a
//! [`BufferAllocator`], and a failed allocation is a normal outcome: the requesting
//! effect is bypassed for the block and asks again later.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::Cell;

use crate::StereoSample;

/// Source of sample buffers.
pub trait BufferAllocator {
    /// Returns a zeroed buffer of `frames` frames, or `None` when out of memory.
    ///
    /// A `stealable` buffer may be reclaimed by the allocator under memory pressure.
    fn alloc(&self, frames: usize, stealable: bool) -> Option<Box<[StereoSample]>>;

    /// Takes a buffer back.
    fn free(&self, buffer: Box<[StereoSample]>);
}

/// Allocates from the global heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn alloc(&self, frames: usize, _stealable: bool) -> Option<Box<[StereoSample]>> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(frames).ok()?;
        buffer.resize(frames, StereoSample::ZERO);
        Some(buffer.into_boxed_slice())
    }

    fn free(&self, buffer: Box<[StereoSample]>) {
        drop(buffer);
    }
}

/// Heap allocator with a fixed budget of frames, standing in for a memory region of
/// fixed size. Keeps track of what is currently handed out.
#[derive(Debug)]
pub struct BudgetAllocator {
    capacity: usize,
    in_use: Cell<usize>,
    outstanding: Cell<usize>,
}

impl BudgetAllocator {
    pub fn new(capacity_frames: usize) -> Self {
        Self {
            capacity: capacity_frames,
            in_use: Cell::new(0),
            outstanding: Cell::new(0),
        }
    }

    /// Frames currently handed out.
    pub fn frames_in_use(&self) -> usize {
        self.in_use.get()
    }

    /// Buffers currently handed out.
    pub fn outstanding(&self) -> usize {
        self.outstanding.get()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl BufferAllocator for BudgetAllocator {
    fn alloc(&self, frames: usize, stealable: bool) -> Option<Box<[StereoSample]>> {
        if self.in_use.get() + frames > self.capacity {
            return None;
        }
        let buffer = HeapAllocator.alloc(frames, stealable)?;
        self.in_use.set(self.in_use.get() + frames);
        self.outstanding.set(self.outstanding.get() + 1);
        Some(buffer)
    }

    fn free(&self, buffer: Box<[StereoSample]>) {
        self.in_use.set(self.in_use.get().saturating_sub(buffer.len()));
        self.outstanding.set(self.outstanding.get().saturating_sub(1));
        drop(buffer);
    }
}
