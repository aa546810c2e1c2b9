//! Stutter: records a short loop of the live signal, then replays it in place of the
//! output until released.

// Based on GPL-3.0-licensed code (c) Synthstrom Audible Limited

use crate::allocator::BufferAllocator;
use crate::error::Error;
use crate::fx::ring_buffer::{RenderPlan, RingBuffer};
use crate::params::{StutterConfig, Timing, MAX_SYNC_LEVEL};
use crate::utils::get_exp;
use crate::StereoSample;

/// Rate at a centred stutter knob: a loop of 16384 samples.
pub const NEUTRAL_RATE: i32 = 1 << 24;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    #[default]
    Off,

    Recording,
    Playing,
}

#[derive(Debug, Default)]
pub struct Stutterer {
    buffer: Option<RingBuffer>,
    status: Status,
    config: StutterConfig,
    size_left_until_record_finished: i32,
    current_reverse: bool,
    /// Knob position a quantized stutter started at, and the position it snapped to.
    quantized: Option<(i32, i32)>,
}

impl Stutterer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    #[inline]
    pub fn is_stuttering(&self) -> bool {
        self.status != Status::Off
    }

    pub fn config(&self) -> StutterConfig {
        self.config
    }

    /// Loop length in samples, while a loop exists.
    pub fn loop_size(&self) -> Option<usize> {
        self.buffer.as_ref().map(RingBuffer::size)
    }

    /// Rate for a stutter knob position, synced to the tempo if `sync_level` says so.
    pub fn stutter_rate(knob: i32, timing: &Timing, sync_level: u8) -> u32 {
        let rate = get_exp(NEUTRAL_RATE, knob >> 2).max(1) as u32;
        if sync_level == 0 {
            return rate;
        }

        let rate = ((rate as u64 * timing.time_per_tick_inverse as u64) >> 32) as u32;
        let shift = sync_level.min(MAX_SYNC_LEVEL) as i32 + 6 - timing.magnitude;
        if shift <= 0 {
            return (rate >> (-shift).min(31)).max(1);
        }
        let shift = shift.min(31) as u32;
        let limit = (i32::MAX as u32) >> shift;
        (rate.min(limit) << shift).max(1)
    }

    /// Starts recording a new loop, throwing away any loop in progress.
    ///
    /// On failure the stutter stays off.
    pub fn begin_stutter<A: BufferAllocator>(
        &mut self,
        allocator: &A,
        knob: i32,
        timing: &Timing,
        config: StutterConfig,
    ) -> Result<(), Error> {
        self.release_buffer(allocator);
        self.status = Status::Off;
        self.config = config;
        self.quantized = config.quantized.then(|| {
            let start = knob_pos(knob);
            (start, snap_to_note_length(start))
        });

        let rate = Self::stutter_rate(self.effective_knob(knob), timing, config.sync_level);
        match RingBuffer::init_loop(allocator, rate) {
            Ok(buffer) => {
                log::debug!("stutter recording, size: {}", buffer.size());
                self.size_left_until_record_finished = buffer.size() as i32;
                self.buffer = Some(buffer);
                self.status = Status::Recording;
                self.current_reverse = config.reversed;
                Ok(())
            }
            Err(error) => {
                log::debug!("stutter not started: {}", error);
                self.quantized = None;
                Err(error)
            }
        }
    }

    /// Records or plays one block. While recording, the dry signal passes through; while
    /// playing, the loop replaces it.
    pub fn process(&mut self, audio: &mut [StereoSample], knob: i32, timing: &Timing) {
        let rate = Self::stutter_rate(self.effective_knob(knob), timing, self.config.sync_level);
        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };
        let plan = if self.status == Status::Recording {
            buffer.prepare_for_writing(rate)
        } else {
            buffer.prepare(rate)
        };

        for sample in audio.iter_mut() {
            match self.status {
                Status::Off => return,
                Status::Recording => {
                    record_sample(buffer, plan, *sample, &mut self.size_left_until_record_finished);
                    // Switches as soon as the countdown runs out, so the loop is exactly
                    // `size` frames.
                    if self.size_left_until_record_finished <= 0 {
                        // The first move lands on the first recorded frame.
                        if self.current_reverse {
                            buffer.set_current(0);
                        } else {
                            buffer.set_current(buffer.size() - 1);
                        }
                        self.status = Status::Playing;
                    }
                }
                Status::Playing => {
                    *sample = play_sample(buffer, plan, self.current_reverse);

                    if self.config.ping_pong {
                        let current = buffer.current_index();
                        if (self.current_reverse && current == 0)
                            || (!self.current_reverse && current == buffer.size() - 1)
                        {
                            self.current_reverse = !self.current_reverse;
                        }
                    }
                }
            }
        }
    }

    /// Stops and hands the loop back.
    pub fn end_stutter<A: BufferAllocator>(&mut self, allocator: &A) {
        self.release_buffer(allocator);
        self.status = Status::Off;
        self.quantized = None;
    }

    /// The knob as the rate sees it. A quantized stutter starts from the snapped position
    /// and follows the knob's movement from there.
    pub fn effective_knob(&self, knob: i32) -> i32 {
        match self.quantized {
            Some((start, snapped)) => {
                knob_value((knob_pos(knob) - start + snapped).clamp(-64, 64))
            }
            None => knob,
        }
    }

    fn release_buffer<A: BufferAllocator>(&mut self, allocator: &A) {
        if let Some(buffer) = self.buffer.take() {
            buffer.release(allocator);
        }
    }
}

// Knob positions run from -64 to 64. Each step is 1/8 octave of stutter rate.
fn knob_pos(knob: i32) -> i32 {
    ((knob as i64 + (1 << 24)) >> 25) as i32
}

fn knob_value(pos: i32) -> i32 {
    if pos >= 64 {
        i32::MAX
    } else {
        pos << 25
    }
}

/// 4ths, 8ths, 16ths, 32nds or 64ths, whichever is closest.
fn snap_to_note_length(pos: i32) -> i32 {
    if pos < -39 {
        -16
    } else if pos < -14 {
        -8
    } else if pos < 14 {
        0
    } else if pos < 39 {
        8
    } else {
        16
    }
}

// The buffer is freshly zeroed and recorded for a single lap, so nothing needs clearing.
#[inline]
fn record_sample(buffer: &mut RingBuffer, plan: RenderPlan, sample: StereoSample, countdown: &mut i32) {
    match plan {
        RenderPlan::Native => {
            buffer.move_on();
            *countdown -= 1;
            buffer.write_native(sample);
        }
        RenderPlan::Resampled(config) => {
            let strength2 = buffer.advance(&config, |b| {
                b.move_on();
                *countdown -= 1;
            });
            buffer.write_resampled(sample, strength2, &config);
        }
    }
}

#[inline]
fn play_sample(buffer: &mut RingBuffer, plan: RenderPlan, reverse: bool) -> StereoSample {
    match (plan, reverse) {
        (RenderPlan::Native, false) => {
            buffer.move_on();
            buffer.read_native()
        }
        (RenderPlan::Native, true) => {
            buffer.move_back();
            buffer.read_native()
        }
        (RenderPlan::Resampled(config), false) => {
            let strength2 = buffer.advance(&config, |b| {
                b.move_on();
            });
            buffer.read_resampled(strength2)
        }
        (RenderPlan::Resampled(config), true) => {
            let strength2 = buffer.retreat(&config, |b| {
                b.move_back();
            });
            buffer.read_resampled_backward(strength2)
        }
    }
}
