//! Flanger, chorus, dimension and phaser.
//!
//! Flanger, the two choruses and dimension read from a short delay buffer at an
//! LFO-modulated distance behind the write index. Dimension outputs the wet signal only.
//! The phaser needs no buffer: it runs the signal through a cascade of first-order
//! all-pass sections whose coefficient follows the LFO.

// Based on GPL-3.0-licensed code (c) Synthstrom Audible Limited

use alloc::boxed::Box;

use crate::allocator::BufferAllocator;
use crate::lfo::{Lfo, LfoWave};
use crate::params::ModFxType;
use crate::utils::{
    multiply_32x32_rshift32, multiply_32x32_rshift32_rounded, q31_mult, q31_mult_rounded,
};
use crate::StereoSample;

pub const BUFFER_SIZE: usize = 512;
const BUFFER_INDEX_MASK: usize = BUFFER_SIZE - 1;

/// Longest modulated delay, in 16.16 samples.
pub const MAX_DELAY: i32 = ((BUFFER_SIZE - 1) as i32) << 16;

const FLANGER_MIN_TIME: i32 = 3 << 16;
const FLANGER_AMPLITUDE: i32 = MAX_DELAY - FLANGER_MIN_TIME;
const FLANGER_OFFSET: i32 = (MAX_DELAY + FLANGER_MIN_TIME) >> 1;

pub const NUM_ALLPASS_SECTIONS: usize = 6;

// 1/sqrt(2)
const CHORUS_VOLUME: i32 = 1518500250;

/// Knob values the modulation effects read, besides rate and depth.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ModFxParams {
    pub rate: u32,
    pub depth: i32,
    pub feedback: i32,
    pub offset: i32,
}

#[derive(Debug, Default)]
pub struct ModFxProcessor {
    lfo: Lfo,
    buffer: Option<Box<[StereoSample]>>,
    write_index: usize,
    allpass_memory: [StereoSample; NUM_ALLPASS_SECTIONS],
    phaser_memory: StereoSample,
    last_type: ModFxType,
}

struct Setup {
    wave: LfoWave,
    delay_offset: i32,
    delay_depth: i32,
    feedback: i32,
}

impl ModFxProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    /// Runs the effect of type `fx_type` over `buffer`. Adjusts `post_fx_volume` to make
    /// up for the level change the effect causes.
    ///
    /// The delay-based effects get their buffer from `allocator` the first time they run. If it
    /// can't be had, the block passes through unchanged.
    pub fn process<A: BufferAllocator>(
        &mut self,
        buffer: &mut [StereoSample],
        fx_type: ModFxType,
        params: &ModFxParams,
        post_fx_volume: &mut i32,
        allocator: &A,
    ) {
        if fx_type != self.last_type {
            self.reset_memory();
            self.last_type = fx_type;
        }

        if fx_type.needs_buffer() {
            if !self.setup_buffer(allocator) {
                return;
            }
        } else {
            self.disable_buffer(allocator);
        }

        let setup = match fx_type {
            ModFxType::None => return,
            ModFxType::Flanger | ModFxType::Phaser => {
                setup_with_feedback(fx_type, params, post_fx_volume)
            }
            ModFxType::Chorus | ModFxType::ChorusStereo | ModFxType::Dimension => {
                setup_chorus(fx_type, params, post_fx_volume)
            }
        };

        match fx_type {
            ModFxType::Phaser => {
                for sample in buffer.iter_mut() {
                    let lfo = self.lfo.render(1, setup.wave, params.rate);
                    *sample = self.process_phaser_sample(*sample, params.depth, setup.feedback, lfo);
                }
            }
            ModFxType::Flanger
            | ModFxType::Chorus
            | ModFxType::ChorusStereo
            | ModFxType::Dimension => {
                let Some(delay_buffer) = self.buffer.as_deref_mut() else {
                    return;
                };
                for sample in buffer.iter_mut() {
                    let lfo = self.lfo.render(1, setup.wave, params.rate);
                    *sample = process_delay_sample(
                        delay_buffer,
                        &mut self.write_index,
                        *sample,
                        &setup,
                        fx_type,
                        lfo,
                    );
                }
            }
            ModFxType::None => {}
        }
    }

    fn setup_buffer<A: BufferAllocator>(&mut self, allocator: &A) -> bool {
        if self.buffer.is_none() {
            match allocator.alloc(BUFFER_SIZE, false) {
                Some(mut buffer) => {
                    buffer.fill(StereoSample::ZERO);
                    self.buffer = Some(buffer);
                    self.write_index = 0;
                }
                None => {
                    log::debug!("no memory for mod fx buffer, bypassing");
                    return false;
                }
            }
        }
        true
    }

    /// Hands the delay buffer back, if there is one.
    pub fn disable_buffer<A: BufferAllocator>(&mut self, allocator: &A) {
        if let Some(buffer) = self.buffer.take() {
            allocator.free(buffer);
        }
    }

    /// Silences whatever the effect still remembers.
    pub fn reset_memory(&mut self) {
        if let Some(buffer) = self.buffer.as_deref_mut() {
            buffer.fill(StereoSample::ZERO);
        }
        self.allpass_memory = [StereoSample::ZERO; NUM_ALLPASS_SECTIONS];
        self.phaser_memory = StereoSample::ZERO;
    }

    // "1" is represented by 2^30 for the coefficient.
    #[inline]
    fn process_phaser_sample(
        &mut self,
        mut sample: StereoSample,
        depth: i32,
        feedback: i32,
        lfo: i32,
    ) -> StereoSample {
        let a1 = (1 << 30)
            - multiply_32x32_rshift32_rounded(
                ((lfo as u32).wrapping_add(0x8000_0000) >> 1) as i32,
                depth,
            );

        let memory = &mut self.phaser_memory;
        memory.l = sample.l.wrapping_add(q31_mult_rounded(memory.l, feedback));
        memory.r = sample.r.wrapping_add(q31_mult_rounded(memory.r, feedback));

        for section in self.allpass_memory.iter_mut() {
            let input = *memory;

            memory.l = (multiply_32x32_rshift32_rounded(memory.l, -a1) << 2).wrapping_add(section.l);
            section.l = (multiply_32x32_rshift32_rounded(memory.l, a1) << 2).wrapping_add(input.l);

            memory.r = (multiply_32x32_rshift32_rounded(memory.r, -a1) << 2).wrapping_add(section.r);
            section.r = (multiply_32x32_rshift32_rounded(memory.r, a1) << 2).wrapping_add(input.r);
        }

        sample.l = sample.l.wrapping_add(memory.l);
        sample.r = sample.r.wrapping_add(memory.r);
        sample
    }
}

/// Feedback from a cubic curve of the knob, with a volume cut at high resonance.
fn setup_with_feedback(fx_type: ModFxType, params: &ModFxParams, post_fx_volume: &mut i32) -> Setup {
    let a = params.feedback >> 1;
    let b = i32::MAX - ((a + (1 << 30)) >> 2) * 3;
    let c = multiply_32x32_rshift32(b, b);
    let d = multiply_32x32_rshift32(b, c);
    let feedback = 0x8000_0000u32.wrapping_sub((d as u32) << 2) as i32;

    let squared = q31_mult(feedback, feedback);
    let mut cut = q31_mult(squared, squared);
    cut = q31_mult(cut, squared);
    cut = (multiply_32x32_rshift32(cut, cut) >> 4) * 23;
    *post_fx_volume = multiply_32x32_rshift32(*post_fx_volume, i32::MAX - cut);

    if fx_type == ModFxType::Flanger {
        *post_fx_volume <<= 1;
        Setup {
            wave: LfoWave::Triangle,
            delay_offset: FLANGER_OFFSET,
            delay_depth: FLANGER_AMPLITUDE,
            feedback,
        }
    } else {
        Setup {
            wave: LfoWave::Sine,
            delay_offset: 0,
            delay_depth: 0,
            feedback,
        }
    }
}

fn setup_chorus(fx_type: ModFxType, params: &ModFxParams, post_fx_volume: &mut i32) -> Setup {
    let delay_offset = multiply_32x32_rshift32(MAX_DELAY, (params.offset >> 1) + (1 << 30));
    let delay_depth = multiply_32x32_rshift32(delay_offset, params.depth) << 2;
    *post_fx_volume = q31_mult(*post_fx_volume, CHORUS_VOLUME);

    Setup {
        wave: if fx_type == ModFxType::Dimension {
            LfoWave::Triangle
        } else {
            LfoWave::Sine
        },
        delay_offset,
        delay_depth,
        feedback: 0,
    }
}

/// Reads the wet signal for one channel, interpolating between two neighbouring frames.
#[inline]
fn read_wet(
    buffer: &[StereoSample],
    write_index: usize,
    delay_time: i32,
    channel: impl Fn(&StereoSample) -> i32,
) -> i32 {
    let delay_time = delay_time.clamp(0, MAX_DELAY);
    let strength2 = (delay_time & 65535) << 15;
    let strength1 = (65535 << 15) - strength2;
    let position = write_index.wrapping_sub((delay_time >> 16) as usize);

    let value1 = channel(&buffer[position & BUFFER_INDEX_MASK]);
    let value2 = channel(&buffer[position.wrapping_sub(1) & BUFFER_INDEX_MASK]);
    multiply_32x32_rshift32_rounded(value1, strength1)
        .wrapping_add(multiply_32x32_rshift32_rounded(value2, strength2))
}

#[inline]
fn process_delay_sample(
    buffer: &mut [StereoSample],
    write_index: &mut usize,
    mut sample: StereoSample,
    setup: &Setup,
    fx_type: ModFxType,
    lfo: i32,
) -> StereoSample {
    // The right channel runs off the inverted LFO.
    let delay_l = multiply_32x32_rshift32(lfo, setup.delay_depth) + setup.delay_offset;
    let delay_r =
        multiply_32x32_rshift32(lfo.saturating_neg(), setup.delay_depth) + setup.delay_offset;

    let mut wet_l = read_wet(buffer, *write_index, delay_l, |s| s.l);
    let mut wet_r = read_wet(buffer, *write_index, delay_r, |s| s.r);

    let cell = &mut buffer[*write_index];
    if fx_type == ModFxType::Flanger {
        wet_l = multiply_32x32_rshift32_rounded(wet_l, setup.feedback) << 2;
        wet_r = multiply_32x32_rshift32_rounded(wet_r, setup.feedback) << 2;
        cell.l = wet_l.wrapping_add(sample.l);
        cell.r = wet_r.wrapping_add(sample.r);
    } else {
        wet_l <<= 1;
        wet_r <<= 1;
        *cell = sample;
    }

    if fx_type == ModFxType::Dimension {
        sample.l = wet_l << 1;
        sample.r = wet_r << 1;
    } else {
        sample.l = sample.l.wrapping_add(wet_l);
        sample.r = sample.r.wrapping_add(wet_r);
    }

    *write_index = (*write_index + 1) & BUFFER_INDEX_MASK;
    sample
}
