#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod allocator;
pub mod chain;
pub mod error;
pub mod fx;
pub mod lfo;
pub mod params;
pub mod resources;
pub mod utils;

pub use allocator::BufferAllocator;
pub use chain::EffectsChain;
pub use error::Error;

/// Audio sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44100;

/// Largest number of frames processed in one pass. Longer blocks are split.
pub const MAX_BLOCK_SIZE: usize = 128;

/// One frame of stereo audio.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StereoSample {
    pub l: i32,
    pub r: i32,
}

impl StereoSample {
    pub const ZERO: Self = Self { l: 0, r: 0 };

    #[inline]
    pub const fn new(l: i32, r: i32) -> Self {
        Self { l, r }
    }

    /// Same value on both channels.
    #[inline]
    pub const fn mono(value: i32) -> Self {
        Self { l: value, r: value }
    }

    #[inline]
    pub fn wrapping_add(self, other: Self) -> Self {
        Self {
            l: self.l.wrapping_add(other.l),
            r: self.r.wrapping_add(other.r),
        }
    }

    #[inline]
    pub fn saturating_add(self, other: Self) -> Self {
        Self {
            l: self.l.saturating_add(other.l),
            r: self.r.saturating_add(other.r),
        }
    }

    #[inline]
    pub fn map(self, mut f: impl FnMut(i32) -> i32) -> Self {
        Self {
            l: f(self.l),
            r: f(self.r),
        }
    }
}
