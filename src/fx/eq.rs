//! Two-band tone control.
//!
//! Treble: a one-pole low-pass splits the signal, and the high band is added back with
//! gain. Bass: a second one-pole low-pass isolates the low band, which is added with gain.

// Based on GPL-3.0-licensed code (c) Synthstrom Audible Limited

use crate::utils::{get_exp, multiply_32x32_rshift32, multiply_32x32_rshift32_rounded};
use crate::StereoSample;

const BASS_FREQUENCY_BASE: i32 = 120_000_000;
const TREBLE_FREQUENCY_BASE: i32 = 700_000_000;

/// Knob values for the tone control. 0 leaves the band alone.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EqParams {
    pub bass: i32,
    pub treble: i32,
    pub bass_frequency: i32,
    pub treble_frequency: i32,
}

#[derive(Debug, Default, Clone)]
pub struct Equalizer {
    without_treble: StereoSample,
    bass_only: StereoSample,
    bass_coefficient: i32,
    treble_coefficient: i32,
}

impl Equalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.without_treble = StereoSample::ZERO;
        self.bass_only = StereoSample::ZERO;
    }

    pub fn process(&mut self, buffer: &mut [StereoSample], params: &EqParams) {
        let do_bass = params.bass != 0;
        let do_treble = params.treble != 0;
        if !do_bass && !do_treble {
            return;
        }

        // Fully down removes the band: -2^29.
        let positive = (params.bass >> 1) + (1 << 30);
        let bass_amount =
            (multiply_32x32_rshift32_rounded(positive, positive) << 1) - (1 << 29);

        // Centred is 2^29.
        let positive = (params.treble >> 1) + (1 << 30);
        let treble_amount = multiply_32x32_rshift32_rounded(positive, positive) << 1;

        if do_bass {
            self.bass_coefficient =
                get_exp(BASS_FREQUENCY_BASE, (params.bass_frequency >> 5) * 6);
        }
        if do_treble {
            self.treble_coefficient =
                get_exp(TREBLE_FREQUENCY_BASE, (params.treble_frequency >> 5) * 6);
        }

        for sample in buffer.iter_mut() {
            sample.l = self.process_channel(
                sample.l,
                Channel::Left,
                do_bass,
                do_treble,
                bass_amount,
                treble_amount,
            );
            sample.r = self.process_channel(
                sample.r,
                Channel::Right,
                do_bass,
                do_treble,
                bass_amount,
                treble_amount,
            );
        }
    }

    #[inline]
    fn process_channel(
        &mut self,
        mut input: i32,
        channel: Channel,
        do_bass: bool,
        do_treble: bool,
        bass_amount: i32,
        treble_amount: i32,
    ) -> i32 {
        let (without_treble, bass_only) = match channel {
            Channel::Left => (&mut self.without_treble.l, &mut self.bass_only.l),
            Channel::Right => (&mut self.without_treble.r, &mut self.bass_only.r),
        };

        let mut treble_only = 0;
        if do_treble {
            let distance_to_go = input.wrapping_sub(*without_treble);
            *without_treble = without_treble.wrapping_add(
                multiply_32x32_rshift32(distance_to_go, self.treble_coefficient) << 1,
            );
            treble_only = input.wrapping_sub(*without_treble);
            input = *without_treble;
        }

        if do_bass {
            let distance_to_go = input.wrapping_sub(*bass_only);
            *bass_only =
                bass_only.wrapping_add(multiply_32x32_rshift32(distance_to_go, self.bass_coefficient));
        }

        if do_treble {
            input = input.wrapping_add(multiply_32x32_rshift32(treble_only, treble_amount) << 3);
        }
        if do_bass {
            input = input.wrapping_add(multiply_32x32_rshift32(*bass_only, bass_amount) << 3);
        }
        input
    }
}

#[derive(Clone, Copy)]
enum Channel {
    Left,
    Right,
}
