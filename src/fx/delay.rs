//! Delay line with on-the-fly buffer replacement.
//!
//! A buffer plays back at any rate, resampling when the rate doesn't match the one it was
//! built for. When the rate has drifted far enough, or has settled on a new value, a
//! second buffer built for the new rate is filled alongside the first one. After one full
//! lap it has caught up, takes over, and the old buffer is released.

// Based on GPL-3.0-licensed code (c) Synthstrom Audible Limited

use core::mem;

use crate::allocator::BufferAllocator;
use crate::error::Error;
use crate::fx::ring_buffer::{Cursor, RenderPlan, RingBuffer, MAX_SIZE};
use crate::params::{sync_rate, DelaySettings, SyncType, Timing, MAX_SYNC_LEVEL};
use crate::utils::{multiply_32x32_rshift32, signed_saturate, tanh_unknown};
use crate::{StereoSample, MAX_BLOCK_SIZE, SAMPLE_RATE};

/// Below this, the feedback counts as off.
pub const MIN_FEEDBACK: i32 = 256;

const REPEAT_FOREVER: u8 = 255;

/// Thresholds that decide when a second buffer gets built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayTuning {
    /// Samples the rate has to stay unchanged before a rate-matched buffer is built.
    pub settle_samples: u32,

    /// Cells the new buffer is written beyond one full lap before it takes over.
    pub swap_margin: i32,
}

impl Default for DelayTuning {
    fn default() -> Self {
        Self {
            settle_samples: SAMPLE_RATE >> 5,
            swap_margin: 5,
        }
    }
}

/// Values resolved for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingState {
    pub do_delay: bool,
    pub user_delay_rate: u32,
    pub delay_feedback_amount: i32,
    pub analog_saturation: u32,
}

impl Default for WorkingState {
    fn default() -> Self {
        Self {
            do_delay: false,
            user_delay_rate: 1 << 24,
            delay_feedback_amount: 0,
            analog_saturation: 8,
        }
    }
}

/// Which buffers exist.
#[derive(Debug, Default)]
pub enum BufferState {
    #[default]
    Off,

    /// One buffer, read and written.
    Single(RingBuffer),

    /// `to` is being filled and takes over once `countdown` goes negative. While the first
    /// buffer is being primed there is nothing to read from, and `from` is `None`.
    Transitioning {
        from: Option<RingBuffer>,
        to: RingBuffer,
        countdown: i32,
    },
}

#[derive(Debug, Default)]
pub struct Delay {
    buffers: BufferState,
    ping_pong: bool,
    analog: bool,
    sync_level: u8,
    sync_type: SyncType,
    post_lpf_l: i32,
    post_lpf_r: i32,
    user_rate_last_time: u32,
    count_cycles_without_change: u32,
    repeats_until_abandon: u8,
    prev_feedback: i32,
    tuning: DelayTuning,
}

impl Delay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tuning(tuning: DelayTuning) -> Self {
        Self {
            tuning,
            ..Self::default()
        }
    }

    pub fn ping_pong(&self) -> bool {
        self.ping_pong
    }

    pub fn set_ping_pong(&mut self, ping_pong: bool) {
        self.ping_pong = ping_pong;
    }

    pub fn analog(&self) -> bool {
        self.analog
    }

    pub fn set_analog(&mut self, analog: bool) {
        self.analog = analog;
    }

    pub fn sync_level(&self) -> u8 {
        self.sync_level
    }

    pub fn set_sync_level(&mut self, sync_level: u8) {
        self.sync_level = sync_level.min(MAX_SYNC_LEVEL);
    }

    pub fn sync_type(&self) -> SyncType {
        self.sync_type
    }

    pub fn set_sync_type(&mut self, sync_type: SyncType) {
        self.sync_type = sync_type;
    }

    pub fn settings(&self) -> DelaySettings {
        DelaySettings {
            ping_pong: self.ping_pong,
            analog: self.analog,
            sync_level: self.sync_level,
            sync_type: self.sync_type,
        }
    }

    pub fn apply_settings(&mut self, settings: &DelaySettings) {
        self.ping_pong = settings.ping_pong;
        self.analog = settings.analog;
        self.set_sync_level(settings.sync_level);
        self.sync_type = settings.sync_type;
    }

    pub fn buffers(&self) -> &BufferState {
        &self.buffers
    }

    /// Whether any buffer memory is held.
    pub fn is_active(&self) -> bool {
        !matches!(self.buffers, BufferState::Off)
    }

    pub fn repeats_until_abandon(&self) -> u8 {
        self.repeats_until_abandon
    }

    /// Syncs the rate to the tempo, gets hold of memory if the delay is about to sound,
    /// and sets `state.do_delay`. Call once per block, before [`process`](Self::process).
    pub fn setup_working_state<A: BufferAllocator>(
        &mut self,
        state: &mut WorkingState,
        timing: &Timing,
        any_sound_coming_in: bool,
        allocator: &A,
    ) {
        let might_do_delay = state.delay_feedback_amount >= MIN_FEEDBACK
            && (any_sound_coming_in || self.repeats_until_abandon != 0);

        if might_do_delay {
            state.user_delay_rate =
                sync_rate(state.user_delay_rate, timing, self.sync_level, self.sync_type);
        }

        self.inform_whether_active(might_do_delay, state.user_delay_rate, allocator);
        state.do_delay = self.is_active();

        // Reassess how long to keep sounding.
        if state.do_delay
            && (any_sound_coming_in || state.delay_feedback_amount != self.prev_feedback)
        {
            self.set_time_to_abandon(state);
            self.prev_feedback = state.delay_feedback_amount;
        }
    }

    /// Allocates the first buffer when becoming active, releases everything when not.
    pub fn inform_whether_active<A: BufferAllocator>(
        &mut self,
        new_active: bool,
        user_delay_rate: u32,
        allocator: &A,
    ) {
        let previously_active = self.is_active();

        if previously_active != new_active {
            if new_active {
                self.setup_priming_buffer(user_delay_rate, allocator);
            } else {
                self.discard_buffers(allocator);
            }
            return;
        }

        // Until something's been written, a better-sized buffer is free to swap in.
        if let BufferState::Transitioning {
            from: None,
            to,
            countdown,
        } = &self.buffers
        {
            let nothing_written = *countdown == to.size() as i32;
            let (ideal_size, _) = RingBuffer::ideal_size_from_rate(user_delay_rate, MAX_SIZE);
            if nothing_written && ideal_size != to.size() {
                log::debug!("new delay buffer before writing starts");
                self.release_all(allocator);
                self.setup_priming_buffer(user_delay_rate, allocator);
            }
        }
    }

    fn setup_priming_buffer<A: BufferAllocator>(&mut self, user_delay_rate: u32, allocator: &A) {
        match RingBuffer::init(allocator, user_delay_rate, 0) {
            Ok(to) => {
                let countdown = to.size() as i32;
                self.buffers = BufferState::Transitioning {
                    from: None,
                    to,
                    countdown,
                };
                self.post_lpf_l = 0;
                self.post_lpf_r = 0;
            }
            Err(error) => log::debug!("delay not started: {}", error),
        }
    }

    fn set_time_to_abandon(&mut self, state: &WorkingState) {
        let feedback = state.delay_feedback_amount;
        self.repeats_until_abandon = if !state.do_delay {
            0
        } else if feedback < 33554432 {
            1
        } else if feedback <= 100663296 {
            2
        } else if feedback <= 218103808 {
            3
        } else if feedback < 318767104 {
            4
        } else if feedback < 352321536 {
            5
        } else if feedback < 452984832 {
            6
        } else if feedback < 520093696 {
            9
        } else if feedback < 637534208 {
            12
        } else if feedback < 704643072 {
            13
        } else if feedback < 771751936 {
            18
        } else if feedback < 838860800 {
            24
        } else if feedback < 939524096 {
            40
        } else if feedback < 1040187392 {
            110
        } else {
            REPEAT_FOREVER
        };
    }

    fn has_wrapped<A: BufferAllocator>(&mut self, allocator: &A) {
        if self.repeats_until_abandon == REPEAT_FOREVER {
            return;
        }

        self.repeats_until_abandon = self.repeats_until_abandon.saturating_sub(1);
        if self.repeats_until_abandon == 0 {
            log::debug!("delay died away, releasing buffers");
            self.discard_buffers(allocator);
        }
    }

    /// Releases all buffers and forgets the repeats still due.
    pub fn discard_buffers<A: BufferAllocator>(&mut self, allocator: &A) {
        self.release_all(allocator);
        self.prev_feedback = 0;
        self.repeats_until_abandon = 0;
    }

    fn release_all<A: BufferAllocator>(&mut self, allocator: &A) {
        match mem::take(&mut self.buffers) {
            BufferState::Off => {}
            BufferState::Single(buffer) => buffer.release(allocator),
            BufferState::Transitioning { from, to, .. } => {
                if let Some(from) = from {
                    from.release(allocator);
                }
                to.release(allocator);
            }
        }
    }

    /// Adds the delayed signal to `buffer` and feeds the result back in.
    pub fn process<A: BufferAllocator>(
        &mut self,
        buffer: &mut [StereoSample],
        state: &WorkingState,
        allocator: &A,
    ) {
        if !state.do_delay {
            return;
        }

        for chunk in buffer.chunks_mut(MAX_BLOCK_SIZE) {
            if !self.is_active() {
                return;
            }
            self.process_chunk(chunk, state, allocator);
        }
    }

    fn process_chunk<A: BufferAllocator>(
        &mut self,
        buffer: &mut [StereoSample],
        state: &WorkingState,
        allocator: &A,
    ) {
        let rate = state.user_delay_rate;

        if rate != self.user_rate_last_time {
            self.user_rate_last_time = rate;
            self.count_cycles_without_change = 0;
        } else {
            self.count_cycles_without_change = self
                .count_cycles_without_change
                .saturating_add(buffer.len() as u32);
        }

        self.consider_secondary_buffer(rate, allocator);

        let mut working = [StereoSample::ZERO; MAX_BLOCK_SIZE];
        let working = &mut working[..buffer.len()];
        let mut wrapped = false;

        let primary_cursor = self.read_primary(working, rate, &mut wrapped);

        self.apply_feedback(working, state);
        self.apply_high_pass(working);

        // Send to the output, and prepare to be fed back.
        for (input, output) in working.iter_mut().zip(buffer.iter_mut()) {
            let current = *input;

            if self.ping_pong {
                input.l = current.r;
                input.r = ((output.l >> 1) + (output.r >> 1)).saturating_add(current.l);
            } else {
                *input = input.saturating_add(*output);
            }

            *output = output.saturating_add(current);
        }

        if let Some(cursor) = primary_cursor {
            self.write_primary(working, cursor);
        }

        if self.write_secondary(working, rate, &mut wrapped) {
            self.swap_buffers(allocator);
        }

        if wrapped {
            self.has_wrapped(allocator);
        }
    }

    fn consider_secondary_buffer<A: BufferAllocator>(&mut self, rate: u32, allocator: &A) {
        let BufferState::Single(primary) = &mut self.buffers else {
            return;
        };

        if !primary.is_resampling() && rate == primary.native_rate() {
            return;
        }

        let native_rate = primary.native_rate() as u64;
        let (new_native_rate, precise_relative) =
            if self.count_cycles_without_change >= self.tuning.settle_samples {
                (rate, true)
            } else if rate as u64 >= native_rate << 1 {
                // No need for such a big buffer any more.
                (rate, false)
            } else if (rate as u64) < native_rate >> 1 {
                // Quality is suffering, use a buffer with twice the resolution.
                (rate >> 1, false)
            } else {
                return;
            };

        let mut secondary = match RingBuffer::init(allocator, new_native_rate, primary.size()) {
            Ok(secondary) => secondary,
            Err(Error::SizeUnchanged) => return,
            Err(error) => {
                log::debug!("no second delay buffer: {}", error);
                return;
            }
        };
        log::debug!("new delay buffer, size: {}", secondary.size());

        if precise_relative {
            primary.make_native_rate_precise_relative_to(&secondary);
        } else {
            primary.make_native_rate_precise();
            secondary.make_native_rate_precise();
        }

        let countdown = secondary.size() as i32 + self.tuning.swap_margin;
        self.buffers = match mem::take(&mut self.buffers) {
            BufferState::Single(primary) => BufferState::Transitioning {
                from: Some(primary),
                to: secondary,
                countdown,
            },
            other => {
                secondary.release(allocator);
                other
            }
        };
    }

    fn primary_mut(&mut self) -> Option<&mut RingBuffer> {
        match &mut self.buffers {
            BufferState::Single(primary) => Some(primary),
            BufferState::Transitioning {
                from: Some(primary),
                ..
            } => Some(primary),
            _ => None,
        }
    }

    /// Reads one block from the primary buffer, clearing cells as they are passed. Returns
    /// where reading started, or `None` if there was nothing to read from.
    fn read_primary(
        &mut self,
        working: &mut [StereoSample],
        rate: u32,
        wrapped: &mut bool,
    ) -> Option<Cursor> {
        let Some(primary) = self.primary_mut() else {
            working.fill(StereoSample::ZERO);
            return None;
        };

        let plan = primary.prepare_for_writing(rate);
        let cursor = primary.cursor();

        match plan {
            RenderPlan::Native => {
                for sample in working.iter_mut() {
                    *wrapped |= primary.clear_and_move_on();
                    *sample = primary.read_native();
                }
            }
            RenderPlan::Resampled(config) => {
                for sample in working.iter_mut() {
                    let strength2 = primary.advance(&config, |b| {
                        *wrapped |= b.clear_and_move_on();
                    });
                    *sample = primary.read_resampled(strength2);
                }
            }
        }

        Some(cursor)
    }

    fn apply_feedback(&self, working: &mut [StereoSample], state: &WorkingState) {
        let feedback = state.delay_feedback_amount;

        if self.analog {
            // Less headroom, this sounds fine with the saturation.
            let saturation = state.analog_saturation.clamp(2, 16);
            for sample in working.iter_mut() {
                *sample = sample.map(|x| {
                    tanh_unknown(multiply_32x32_rshift32(x, feedback), saturation) << 2
                });
            }
        } else {
            // Clipping sounds bad when purely digital, so leave more headroom.
            for sample in working.iter_mut() {
                *sample =
                    sample.map(|x| signed_saturate::<29>(multiply_32x32_rshift32(x, feedback)) << 2);
            }
        }
    }

    // Stops the feedback from "farting out". The corner ends up around 40Hz after many
    // repeats.
    fn apply_high_pass(&mut self, working: &mut [StereoSample]) {
        for sample in working.iter_mut() {
            let distance_to_go_l = sample.l.wrapping_sub(self.post_lpf_l);
            self.post_lpf_l = self.post_lpf_l.wrapping_add(distance_to_go_l >> 11);
            sample.l = sample.l.wrapping_sub(self.post_lpf_l);

            let distance_to_go_r = sample.r.wrapping_sub(self.post_lpf_r);
            self.post_lpf_r = self.post_lpf_r.wrapping_add(distance_to_go_r >> 11);
            sample.r = sample.r.wrapping_sub(self.post_lpf_r);
        }
    }

    /// Goes over the same cells again as [`read_primary`](Self::read_primary), writing
    /// the feedback signal.
    fn write_primary(&mut self, working: &[StereoSample], cursor: Cursor) {
        let Some(primary) = self.primary_mut() else {
            return;
        };
        primary.set_cursor(cursor);

        match primary.plan() {
            RenderPlan::Native => {
                for sample in working {
                    primary.move_on();
                    primary.write_native(*sample);
                }
            }
            RenderPlan::Resampled(config) => {
                for sample in working {
                    let strength2 = primary.advance(&config, |b| {
                        b.move_on();
                    });
                    primary.write_resampled(*sample, strength2, &config);
                }
            }
        }
    }

    /// Ticks the incoming buffer along and writes to it. Only its wraps count from here on.
    /// Returns whether it is ready to take over.
    fn write_secondary(&mut self, working: &[StereoSample], rate: u32, wrapped: &mut bool) -> bool {
        let BufferState::Transitioning { to, countdown, .. } = &mut self.buffers else {
            return false;
        };

        *wrapped = false;

        match to.prepare_for_writing(rate) {
            RenderPlan::Native => {
                for sample in working {
                    *wrapped |= to.clear_and_move_on();
                    *countdown -= 1;
                    to.write_native(*sample);
                }
            }
            RenderPlan::Resampled(config) => {
                for sample in working {
                    let strength2 = to.advance(&config, |b| {
                        *wrapped |= b.clear_and_move_on();
                        *countdown -= 1;
                    });
                    to.write_resampled(*sample, strength2, &config);
                }
            }
        }

        *countdown < 0
    }

    fn swap_buffers<A: BufferAllocator>(&mut self, allocator: &A) {
        self.buffers = match mem::take(&mut self.buffers) {
            BufferState::Transitioning { from, to, .. } => {
                if let Some(from) = from {
                    from.release(allocator);
                }
                log::debug!("delay buffer swapped in, size: {}", to.size());
                BufferState::Single(to)
            }
            other => other,
        };
    }
}
