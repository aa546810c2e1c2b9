//! Circular buffer of stereo frames with native and fractional-rate cursors.
//!
//! A buffer is built for a "native" rate. When it is played or recorded at that rate,
//! every sample maps onto exactly one cell. At any other rate a 32-bit fractional position
//! spins through the cells: reads interpolate between the two nearest cells, and writes
//! spread each frame over a triangle of neighbouring cells.

use alloc::boxed::Box;

use crate::allocator::BufferAllocator;
use crate::error::Error;
use crate::utils::{crossfade_16, multiply_32x32_rshift32};
use crate::StereoSample;

/// Distance, in cells, between the read cursor and where new frames land.
pub const SPACE_BETWEEN_READ_AND_WRITE: usize = 20;

/// Longest delay buffer, 2 seconds.
pub const MAX_SIZE: usize = 88200;

/// Longest stutter loop, 6 seconds.
pub const LOOP_MAX_SIZE: usize = 264600;

pub const MIN_SIZE: usize = 128;

/// Size of a buffer whose native rate is [`SPIN_UNITY`].
pub const NEUTRAL_SIZE: usize = 16384;

/// Spin rate of 1, i.e. one cell per sample.
pub const SPIN_UNITY: u32 = 1 << 24;

const MIN_SPIN_RATE: u32 = SPIN_UNITY >> 8;
const MAX_SPIN_RATE: u32 = SPIN_UNITY << 7;

// Keeps resampled writes behind the read cursor.
const MAX_WRITE_WIDTH_CELLS: u32 = 16;

const RATE_SIZE_PRODUCT: u64 = (NEUTRAL_SIZE as u64) << 24;

/// Per-block constants for resampled access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleConfig {
    /// Cells per sample. 1 is represented as 16777216.
    pub actual_spin_rate: u32,

    /// Normally the same as `actual_spin_rate`, but limited for writing.
    pub spin_rate_for_sped_up_writing: u32,

    /// Half-width of the write triangle. One cell is 65536.
    pub write_width: u32,

    /// Triangle height divided by its half-width, scaled so that a cell at distance 0
    /// receives 2^30 (unity) when the triangles don't overlap.
    pub write_gain: u32,
}

/// How a buffer will be accessed for one block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RenderPlan {
    #[default]
    Native,
    Resampled(ResampleConfig),
}

impl RenderPlan {
    pub fn is_resampling(&self) -> bool {
        matches!(self, RenderPlan::Resampled(_))
    }
}

/// Snapshot of a buffer's position, so that a block can be read and then written again
/// over the same cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    current: usize,
    long_pos: u32,
    last_short_pos: u8,
}

#[derive(Debug)]
pub struct RingBuffer {
    data: Box<[StereoSample]>,
    size: usize,
    current: usize,
    long_pos: u32,
    last_short_pos: u8,
    native_rate: u32,
    plan: RenderPlan,
    last_resampled_frame: StereoSample,
}

impl RingBuffer {
    /// Builds a delay buffer for `rate`, including the read/write headroom.
    ///
    /// Fails without allocating if the buffer would have `fail_if_this_size` frames.
    pub fn init<A: BufferAllocator>(
        allocator: &A,
        rate: u32,
        fail_if_this_size: usize,
    ) -> Result<Self, Error> {
        let (size, _) = Self::ideal_size_from_rate(rate, MAX_SIZE);
        if size == fail_if_this_size {
            return Err(Error::SizeUnchanged);
        }

        Self::allocate(allocator, size, true, rate)
    }

    /// Builds a loop buffer for `rate`: no headroom, up to [`LOOP_MAX_SIZE`] frames.
    pub fn init_loop<A: BufferAllocator>(allocator: &A, rate: u32) -> Result<Self, Error> {
        let (size, _) = Self::ideal_size_from_rate(rate, LOOP_MAX_SIZE);
        Self::allocate(allocator, size, false, rate)
    }

    /// Builds a buffer of an explicit size whose native rate matches that size.
    pub fn init_with_size<A: BufferAllocator>(
        allocator: &A,
        size: usize,
        include_extra_space: bool,
    ) -> Result<Self, Error> {
        let size = size.clamp(MIN_SIZE, LOOP_MAX_SIZE);
        let mut buffer = Self::allocate(allocator, size, include_extra_space, 0)?;
        buffer.make_native_rate_precise();
        Ok(buffer)
    }

    fn allocate<A: BufferAllocator>(
        allocator: &A,
        size: usize,
        include_extra_space: bool,
        native_rate: u32,
    ) -> Result<Self, Error> {
        let size_including_extra = if include_extra_space {
            size + SPACE_BETWEEN_READ_AND_WRITE
        } else {
            size
        };

        let mut data = allocator
            .alloc(size_including_extra, false)
            .ok_or(Error::InsufficientRam)?;
        data.fill(StereoSample::ZERO);

        log::debug!("ring buffer allocated, size: {}", size);

        Ok(Self {
            data,
            size,
            // First write after one move lands on cell 0.
            current: SPACE_BETWEEN_READ_AND_WRITE - 1,
            long_pos: 0,
            last_short_pos: 0,
            native_rate,
            plan: RenderPlan::Native,
            last_resampled_frame: StereoSample::ZERO,
        })
    }

    /// Hands the memory back.
    pub fn release<A: BufferAllocator>(self, allocator: &A) {
        allocator.free(self.data);
    }

    /// Ideal size for `rate`, clamped to `[MIN_SIZE, max_size]`. The flag says whether
    /// clamping happened.
    pub fn ideal_size_from_rate(rate: u32, max_size: usize) -> (usize, bool) {
        if rate == 0 {
            return (max_size, true);
        }
        let ideal = ((RATE_SIZE_PRODUCT + (rate as u64 >> 1)) / rate as u64) as usize;
        let size = ideal.clamp(MIN_SIZE, max_size);
        (size, size != ideal)
    }

    /// Sets the native rate to exactly what the size implies.
    pub fn make_native_rate_precise(&mut self) {
        let size = self.size as u64;
        self.native_rate = ((RATE_SIZE_PRODUCT + (size >> 1)) / size).min(u32::MAX as u64) as u32;
    }

    /// Sets the native rate so that this buffer gives the same delay time as `other` at
    /// any playback rate.
    pub fn make_native_rate_precise_relative_to(&mut self, other: &RingBuffer) {
        let product = other.native_rate as u64 * other.size as u64;
        let size = self.size as u64;
        self.native_rate = ((product + (size >> 1)) / size).min(u32::MAX as u64) as u32;
    }

    /// Works out how to access the buffer at `rate` for one block.
    pub fn setup_for_render(&self, rate: u32) -> RenderPlan {
        if rate == self.native_rate || self.native_rate == 0 {
            return RenderPlan::Native;
        }

        let actual_spin_rate = (((rate as u64) << 24) / self.native_rate as u64)
            .clamp(MIN_SPIN_RATE as u64, MAX_SPIN_RATE as u64) as u32;
        let spin_rate_for_sped_up_writing =
            actual_spin_rate.min(MAX_WRITE_WIDTH_CELLS * SPIN_UNITY);

        // Below native speed, each cell is covered by `n` overlapping triangles. Their
        // half-width is a whole multiple of the step so that they sum to exactly one.
        let step = (spin_rate_for_sped_up_writing >> 8).max(1);
        let n = 65536u32.div_ceil(step).max(1);
        let write_width = n * step;
        let write_gain = ((1u64 << 46) / write_width as u64 / n as u64) as u32;

        RenderPlan::Resampled(ResampleConfig {
            actual_spin_rate,
            spin_rate_for_sped_up_writing,
            write_width,
            write_gain,
        })
    }

    /// Sets up the buffer for one block at `rate` and returns the plan.
    pub fn prepare(&mut self, rate: u32) -> RenderPlan {
        let plan = self.setup_for_render(rate);
        if plan.is_resampling() && !self.plan.is_resampling() {
            // Coming from native access, start on a cell boundary.
            self.long_pos = (self.last_short_pos as u32) << 24;
        }
        self.plan = plan;
        plan
    }

    /// Like [`prepare`](Self::prepare), for a buffer about to be written. Where native and
    /// resampled writes meet, the cells are weighted so that they still add up to one frame.
    pub fn prepare_for_writing(&mut self, rate: u32) -> RenderPlan {
        let previous = self.plan;
        let plan = self.prepare(rate);
        match (previous, plan) {
            (RenderPlan::Native, RenderPlan::Resampled(config)) => {
                self.blend_into_resampled(&config)
            }
            (RenderPlan::Resampled(config), RenderPlan::Native) => {
                self.complete_resampled(&config)
            }
            _ => {}
        }
        plan
    }

    // The first triangles land on cells that already hold a whole native frame, and leave
    // the cells just ahead short. Both get the last native frame at the missing weight.
    fn blend_into_resampled(&mut self, config: &ResampleConfig) {
        let len = self.data.len() as i64;
        let last = self.write_index() as i64;
        let last_frame = self.data[last as usize];
        let reach = (config.write_width >> 16) as i64 + 1;

        for offset in -reach..=reach {
            let coverage = coverage_ahead(offset << 16, config);
            if coverage == 0 {
                continue;
            }
            let remaining = (UNITY_WEIGHT - coverage).max(0) as i32;
            let cell = &mut self.data[(last + offset).rem_euclid(len) as usize];
            if offset <= 0 {
                *cell = cell.map(|x| scale(x, remaining));
            } else {
                *cell = cell.wrapping_add(last_frame.map(|x| scale(x, remaining)));
            }
        }
    }

    // Native writes overwrite everything after the last write index. The cells up to it
    // are missing the triangles that would have followed.
    fn complete_resampled(&mut self, config: &ResampleConfig) {
        let len = self.data.len() as i64;
        let last = self.write_index() as i64;
        let frac = ((self.long_pos >> 8) & 65535) as i64;
        let reach = (config.write_width >> 16) as i64 + 1;
        let frame = self.last_resampled_frame;

        for offset in -reach..=0 {
            let missing = coverage_ahead((offset << 16) - frac, config).min(UNITY_WEIGHT) as i32;
            if missing == 0 {
                continue;
            }
            let cell = &mut self.data[(last + offset).rem_euclid(len) as usize];
            *cell = cell.wrapping_add(frame.map(|x| scale(x, missing)));
        }
    }

    #[inline]
    pub fn plan(&self) -> RenderPlan {
        self.plan
    }

    #[inline]
    pub fn is_resampling(&self) -> bool {
        self.plan.is_resampling()
    }

    #[inline]
    pub fn native_rate(&self) -> u32 {
        self.native_rate
    }

    /// Size in frames, not counting headroom.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// All cells, headroom included.
    #[inline]
    pub fn frames(&self) -> &[StereoSample] {
        &self.data
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn set_current(&mut self, index: usize) {
        self.current = index % self.data.len();
    }

    #[inline]
    pub fn cursor(&self) -> Cursor {
        Cursor {
            current: self.current,
            long_pos: self.long_pos,
            last_short_pos: self.last_short_pos,
        }
    }

    #[inline]
    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.current = cursor.current;
        self.long_pos = cursor.long_pos;
        self.last_short_pos = cursor.last_short_pos;
    }

    pub fn clear(&mut self) {
        self.data.fill(StereoSample::ZERO);
    }

    /// Zeroes the current cell and moves on. Returns whether the buffer wrapped.
    #[inline]
    pub fn clear_and_move_on(&mut self) -> bool {
        self.data[self.current] = StereoSample::ZERO;
        self.move_on()
    }

    #[inline]
    pub fn move_on(&mut self) -> bool {
        self.current += 1;
        let wrapped = self.current == self.data.len();
        if wrapped {
            self.current = 0;
        }
        wrapped
    }

    #[inline]
    pub fn move_back(&mut self) -> bool {
        if self.current == 0 {
            self.current = self.data.len() - 1;
            true
        } else {
            self.current -= 1;
            false
        }
    }

    /// Spins the fractional position forward, calling `on_cell` once for every cell
    /// boundary crossed. Returns the position within the cell, 0 to 65535.
    #[inline]
    pub fn advance(&mut self, config: &ResampleConfig, mut on_cell: impl FnMut(&mut Self)) -> i32 {
        self.long_pos = self.long_pos.wrapping_add(config.actual_spin_rate);
        let new_short_pos = (self.long_pos >> 24) as u8;
        let mut short_pos_diff = new_short_pos.wrapping_sub(self.last_short_pos);
        self.last_short_pos = new_short_pos;

        while short_pos_diff > 0 {
            on_cell(self);
            short_pos_diff -= 1;
        }
        ((self.long_pos >> 8) & 65535) as i32
    }

    /// Backward counterpart of [`advance`](Self::advance).
    #[inline]
    pub fn retreat(&mut self, config: &ResampleConfig, mut on_cell: impl FnMut(&mut Self)) -> i32 {
        self.long_pos = self.long_pos.wrapping_sub(config.actual_spin_rate);
        let new_short_pos = (self.long_pos >> 24) as u8;
        let mut short_pos_diff = self.last_short_pos.wrapping_sub(new_short_pos);
        self.last_short_pos = new_short_pos;

        while short_pos_diff > 0 {
            on_cell(self);
            short_pos_diff -= 1;
        }
        ((self.long_pos >> 8) & 65535) as i32
    }

    #[inline]
    fn write_index(&self) -> usize {
        let len = self.data.len();
        (self.current + len - SPACE_BETWEEN_READ_AND_WRITE % len) % len
    }

    #[inline]
    pub fn write_native(&mut self, frame: StereoSample) {
        let index = self.write_index();
        self.data[index] = frame;
    }

    /// Writes one frame at the sub-cell position `strength2`, spread over a triangle of
    /// neighbouring cells.
    #[inline]
    pub fn write_resampled(&mut self, frame: StereoSample, strength2: i32, config: &ResampleConfig) {
        let len = self.data.len();
        let width = config.write_width as i64;
        let frac = strength2 as i64;

        let cells_left = ((width - frac - 1) >> 16) as usize;
        let cells_right = ((frac + width - 1) >> 16) as usize;

        let mut index = (self.write_index() + len - cells_left % len) % len;
        let mut distance = -(cells_left as i64) * 65536 - frac;

        for _ in 0..=(cells_left + cells_right) {
            let d = distance.abs();
            if d < width {
                let weight = (((width - d) as u64 * config.write_gain as u64) >> 16) as i32;
                let cell = &mut self.data[index];
                *cell = cell.wrapping_add(frame.map(|x| scale(x, weight)));
            }

            distance += 65536;
            index += 1;
            if index == len {
                index = 0;
            }
        }
        self.last_resampled_frame = frame;
    }

    #[inline]
    pub fn read_native(&self) -> StereoSample {
        self.data[self.current]
    }

    /// Interpolates between the current cell and the next one.
    #[inline]
    pub fn read_resampled(&self, strength2: i32) -> StereoSample {
        let next = if self.current + 1 == self.data.len() {
            0
        } else {
            self.current + 1
        };
        self.interpolate(self.current, next, strength2)
    }

    /// Interpolates between the current cell and the previous one.
    #[inline]
    pub fn read_resampled_backward(&self, strength2: i32) -> StereoSample {
        let previous = if self.current == 0 {
            self.data.len() - 1
        } else {
            self.current - 1
        };
        self.interpolate(self.current, previous, strength2)
    }

    #[inline]
    fn interpolate(&self, first: usize, second: usize, strength2: i32) -> StereoSample {
        let a = self.data[first];
        let b = self.data[second];
        StereoSample {
            l: crossfade_16(a.l, b.l, strength2),
            r: crossfade_16(a.r, b.r, strength2),
        }
    }
}

const UNITY_WEIGHT: i64 = 1 << 30;

#[inline]
fn scale(x: i32, weight: i32) -> i32 {
    multiply_32x32_rshift32(x, weight) << 2
}

/// Total weight that resampled writes starting one step after the write index will still
/// add to the cell at `offset` (65536 per cell) from it.
fn coverage_ahead(offset: i64, config: &ResampleConfig) -> i64 {
    let step = (config.actual_spin_rate >> 8).max(1) as i64;
    let width = config.write_width as i64;
    let mut total = 0;
    let mut centre = step;
    while centre - width < offset {
        let distance = (offset - centre).abs();
        if distance < width {
            total += (((width - distance) as u64 * config.write_gain as u64) >> 16) as i64;
        }
        centre += step;
    }
    total
}
