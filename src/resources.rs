//! Lookup tables.
//!
//! The tables are computed once, on first use, and shared afterwards. Generation uses
//! floating point; every lookup on the audio path is integer only.

use core::f64::consts::PI;

use num_traits::float::Float;
use spin::Once;

pub const TABLE_BITS: u32 = 8;
pub const TABLE_SIZE: usize = (1 << TABLE_BITS) + 1;

static SINE: Once<[i32; TABLE_SIZE]> = Once::new();
static TANH: Once<[i32; TABLE_SIZE]> = Once::new();
static EXP: Once<[u32; TABLE_SIZE]> = Once::new();

/// One full sine cycle, full scale.
pub fn sine_table() -> &'static [i32; TABLE_SIZE] {
    SINE.call_once(|| {
        let mut table = [0; TABLE_SIZE];
        for (i, value) in table.iter_mut().enumerate() {
            let phase = 2.0 * PI * i as f64 / (TABLE_SIZE - 1) as f64;
            *value = to_i32(Float::sin(phase) * i32::MAX as f64);
        }
        table
    })
}

/// `tanh` over an input range of [-1, 1], scaled by 2^31.
pub fn tanh_table() -> &'static [i32; TABLE_SIZE] {
    TANH.call_once(|| {
        let mut table = [0; TABLE_SIZE];
        let half = ((TABLE_SIZE - 1) / 2) as f64;
        for (i, value) in table.iter_mut().enumerate() {
            let x = (i as f64 - half) / half;
            *value = to_i32(Float::tanh(x) * 2147483648.0);
        }
        table
    })
}

/// `2^x` for x in [0, 1], scaled by 2^30.
pub fn exp_table() -> &'static [u32; TABLE_SIZE] {
    EXP.call_once(|| {
        let mut table = [0; TABLE_SIZE];
        for (i, value) in table.iter_mut().enumerate() {
            let x = i as f64 / (TABLE_SIZE - 1) as f64;
            *value = Float::round(Float::powf(2.0, x) * 1073741824.0).min(u32::MAX as f64) as u32;
        }
        table
    })
}

#[inline]
fn to_i32(value: f64) -> i32 {
    Float::round(value).clamp(i32::MIN as f64, i32::MAX as f64) as i32
}
