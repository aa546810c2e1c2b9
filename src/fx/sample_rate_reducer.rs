//! Sample rate reducer and bit crusher.
//!
//! Down-conversion grabs a new sample whenever a fractional position runs out, blending
//! the two nearest input samples. Up-conversion interpolates between the last two grabbed
//! samples, re-synced at every grab so that the two never drift apart.

// Based on GPL-3.0-licensed code (c) Synthstrom Audible Limited

use crate::utils::{get_exp, multiply_32x32_rshift32_rounded};
use crate::StereoSample;

/// Knob positions below this leave the bit crusher off.
pub const BITCRUSH_THRESHOLD: i32 = -2113929216;

// 22 bits represent "1" here. More bits would clip at low sample rates.
const UNITY: u32 = 4194304;
const UNITY_MINUS_ONE: i32 = 4194303;

#[derive(Debug, Default, Clone)]
pub struct SampleRateReducer {
    low_sample_rate_pos: u32,
    high_sample_rate_pos: u32,
    last_sample: StereoSample,
    grabbed_sample: StereoSample,
    last_grabbed_sample: StereoSample,
    enabled_last_time: bool,
}

impl SampleRateReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self) {
        *self = Self::default();
    }

    pub fn is_bitcrush_enabled(bitcrush: i32) -> bool {
        bitcrush >= BITCRUSH_THRESHOLD
    }

    pub fn is_reduction_enabled(sample_rate_reduction: i32) -> bool {
        sample_rate_reduction != i32::MIN
    }

    /// Crushes and reduces `buffer` in place. Lowers `post_fx_volume` for heavy crushing.
    pub fn process(
        &mut self,
        buffer: &mut [StereoSample],
        sample_rate_reduction: i32,
        bitcrush: i32,
        post_fx_volume: &mut i32,
    ) {
        let reduction_enabled = Self::is_reduction_enabled(sample_rate_reduction);
        let mut mask_for_reduction = u32::MAX;

        if Self::is_bitcrush_enabled(bitcrush) {
            let positive_preset = (bitcrush as u32).wrapping_add(0x8000_0000) >> 29;
            if positive_preset > 4 {
                *post_fx_volume >>= positive_preset - 4;
            }

            if reduction_enabled {
                mask_for_reduction = u32::MAX << (18 + positive_preset);
            } else {
                let mask = (u32::MAX << (19 + positive_preset)) as i32;
                for sample in buffer.iter_mut() {
                    sample.l &= mask;
                    sample.r &= mask;
                }
            }
        }

        if !reduction_enabled {
            self.enabled_last_time = false;
            return;
        }

        if !self.enabled_last_time {
            self.enabled_last_time = true;
            self.last_sample = StereoSample::ZERO;
            self.grabbed_sample = StereoSample::ZERO;
            self.low_sample_rate_pos = 0;
        }

        let positive_preset = (sample_rate_reduction as u32).wrapping_add(0x8000_0000);
        let low_sample_rate_increment = get_exp(UNITY as i32, (positive_preset >> 3) as i32) as u32;
        let high_sample_rate_increment =
            (u32::MAX / (low_sample_rate_increment >> 6).max(1)) << 6;

        let mask = mask_for_reduction as i32;
        for sample in buffer.iter_mut() {
            if self.low_sample_rate_pos < UNITY {
                let strength2 = self.low_sample_rate_pos as i32;
                let strength1 = UNITY_MINUS_ONE - strength2;

                self.last_grabbed_sample = self.grabbed_sample;
                self.grabbed_sample = StereoSample {
                    l: blend(self.last_sample.l, sample.l, strength1, strength2) & mask,
                    r: blend(self.last_sample.r, sample.r, strength1, strength2) & mask,
                };

                self.low_sample_rate_pos =
                    self.low_sample_rate_pos.wrapping_add(low_sample_rate_increment);

                self.high_sample_rate_pos = (multiply_32x32_rshift32_rounded(
                    (self.low_sample_rate_pos & (UNITY - 1)) as i32,
                    (high_sample_rate_increment << 8) as i32,
                ) << 2) as u32;
            }
            self.low_sample_rate_pos = self.low_sample_rate_pos.wrapping_sub(UNITY);
            self.last_sample = *sample;

            // Only overshoots if the rate went up while playing.
            let strength2 = self.high_sample_rate_pos.min(UNITY - 1) as i32;
            let strength1 = UNITY_MINUS_ONE - strength2;
            *sample = StereoSample {
                l: blend(self.last_grabbed_sample.l, self.grabbed_sample.l, strength1, strength2) << 2,
                r: blend(self.last_grabbed_sample.r, self.grabbed_sample.r, strength1, strength2) << 2,
            };

            self.high_sample_rate_pos =
                self.high_sample_rate_pos.wrapping_add(high_sample_rate_increment);
        }
    }
}

#[inline]
fn blend(a: i32, b: i32, strength1: i32, strength2: i32) -> i32 {
    multiply_32x32_rshift32_rounded(a, strength1 << 9)
        .wrapping_add(multiply_32x32_rshift32_rounded(b, strength2 << 9))
}
