//! Low-frequency oscillator for the modulation effects.

use crate::resources::sine_table;
use crate::utils::interpolate_table_signed;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LfoWave {
    #[default]
    Sine,

    Triangle,
    Square,
}

/// Free-running 32-bit phase accumulator. Output is full scale, `i32::MIN..=i32::MAX`.
#[derive(Debug, Default, Clone)]
pub struct Lfo {
    phase: u32,
}

impl Lfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self) {
        self.phase = 0;
    }

    #[inline]
    pub fn phase(&self) -> u32 {
        self.phase
    }

    #[inline]
    pub fn set_phase(&mut self, phase: u32) {
        self.phase = phase;
    }

    /// Returns the value at the current phase, then moves the phase on by
    /// `num_samples` increments.
    #[inline]
    pub fn render(&mut self, num_samples: u32, wave: LfoWave, phase_increment: u32) -> i32 {
        let value = match wave {
            LfoWave::Sine => interpolate_table_signed(self.phase, sine_table()),
            LfoWave::Triangle => triangle(self.phase),
            LfoWave::Square => {
                if self.phase < 0x8000_0000 {
                    i32::MAX
                } else {
                    i32::MIN
                }
            }
        };

        self.phase = self
            .phase
            .wrapping_add(phase_increment.wrapping_mul(num_samples));
        value
    }
}

/// Triangle starting at its minimum.
#[inline]
pub fn triangle(phase: u32) -> i32 {
    let t = if phase < 0x8000_0000 {
        phase << 1
    } else {
        !(phase << 1)
    };
    (t ^ 0x8000_0000) as i32
}
