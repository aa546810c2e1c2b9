//! Fixed-point utility functions.
//!
//! Everything on the audio path works on `i32` values in a Q31-like scale. A widening
//! multiply followed by a 32-bit right shift returns half the mathematically expected
//! magnitude, and the call sites compensate with an explicit left shift.

pub mod parameter_interpolator;

use crate::resources::{exp_table, tanh_table};

/// Unity for parameters that use 2^30 as "1".
pub const ONE_Q30: i32 = 1 << 30;

/// Widening multiply, keeping the high word.
#[inline]
pub fn multiply_32x32_rshift32(a: i32, b: i32) -> i32 {
    ((a as i64 * b as i64) >> 32) as i32
}

/// Widening multiply, keeping the high word, rounded to nearest.
#[inline]
pub fn multiply_32x32_rshift32_rounded(a: i32, b: i32) -> i32 {
    ((a as i64 * b as i64 + 0x8000_0000) >> 32) as i32
}

/// Q31 multiply. `q31_mult(x, i32::MAX)` is (almost) `x`.
#[inline]
pub fn q31_mult(a: i32, b: i32) -> i32 {
    multiply_32x32_rshift32(a, b) << 1
}

#[inline]
pub fn q31_mult_rounded(a: i32, b: i32) -> i32 {
    multiply_32x32_rshift32_rounded(a, b) << 1
}

/// Saturates `x` to a signed `BITS`-bit range.
#[inline]
pub fn signed_saturate<const BITS: u32>(x: i32) -> i32 {
    let max = (1i32 << (BITS - 1)) - 1;
    let min = -(1i32 << (BITS - 1));
    x.clamp(min, max)
}

/// Shifts left by `shift` bits, saturating instead of overflowing.
#[inline]
pub fn lshift_and_saturate(x: i32, shift: u32) -> i32 {
    if shift == 0 {
        return x;
    }
    if shift >= 31 {
        return match x {
            0 => 0,
            x if x > 0 => i32::MAX,
            _ => i32::MIN,
        };
    }
    let limit = i32::MAX >> shift;
    if x > limit {
        i32::MAX
    } else if x < -limit - 1 {
        i32::MIN
    } else {
        x << shift
    }
}

/// Shifts left (or right, for negative amounts) by `magnitude` bits, saturating.
#[inline]
pub fn increase_magnitude_and_saturate(x: i32, magnitude: i32) -> i32 {
    if magnitude >= 0 {
        lshift_and_saturate(x, magnitude as u32)
    } else if magnitude <= -32 {
        if x < 0 {
            -1
        } else {
            0
        }
    } else {
        x >> (-magnitude)
    }
}

/// Linear interpolation into an unsigned table of `2^n + 1` entries, indexed by the top
/// bits of an unsigned input that uses `num_bits_in_input` bits.
#[inline]
pub fn interpolate_table(input: u32, num_bits_in_input: u32, table: &[u32]) -> u32 {
    let table_bits = (table.len() - 1).trailing_zeros();
    let shift = num_bits_in_input - table_bits;
    let index = (input >> shift) as usize;
    let frac_bits = shift.min(16);
    let frac = (input >> (shift - frac_bits)) & ((1 << frac_bits) - 1);
    let a = table[index] as i64;
    let b = table[index + 1] as i64;

    (a + (((b - a) * frac as i64) >> frac_bits)) as u32
}

/// Linear interpolation into a signed table of `2^n + 1` entries, indexed by the top bits
/// of an offset-binary 32-bit input.
#[inline]
pub fn interpolate_table_signed(input: u32, table: &[i32]) -> i32 {
    let table_bits = (table.len() - 1).trailing_zeros();
    let shift = 32 - table_bits;
    let index = (input >> shift) as usize;
    let frac = ((input >> (shift - 16)) & 0xFFFF) as i64;
    let a = table[index] as i64;
    let b = table[index + 1] as i64;

    (a + (((b - a) * frac) >> 16)) as i32
}

/// Exponential scaling: returns `preset_value * 2^(adjustment / 2^26)`, saturated.
#[inline]
pub fn get_exp(preset_value: i32, adjustment: i32) -> i32 {
    let magnitude_increase = (adjustment >> 26) + 2;
    let fine = interpolate_table((adjustment & 0x03FF_FFFF) as u32, 26, exp_table());
    let adjusted = ((preset_value as i64 * fine as i64) >> 32) as i32;

    increase_magnitude_and_saturate(adjusted, magnitude_increase)
}

/// Soft saturation. Close to the identity for small inputs; the knee sits at
/// `2^31 >> saturation_amount`.
#[inline]
pub fn tanh_unknown(input: i32, saturation_amount: u32) -> i32 {
    let working = lshift_and_saturate(input, saturation_amount);
    interpolate_table_signed((working as u32) ^ 0x8000_0000, tanh_table()) >> saturation_amount
}

/// Pan law. Returns `(amplitude_l, amplitude_r, should_pan)`, where 2^30 is unity.
#[inline]
pub fn should_do_panning(pan_amount: i32) -> (i32, i32, bool) {
    if pan_amount == 0 {
        return (ONE_Q30 - 1, ONE_Q30 - 1, false);
    }

    let pan_offset = pan_amount.clamp(-ONE_Q30, ONE_Q30);
    let amplitude_r = if pan_amount >= 0 {
        ONE_Q30 - 1
    } else {
        ONE_Q30 + pan_offset
    };
    let amplitude_l = if pan_amount <= 0 {
        ONE_Q30 - 1
    } else {
        ONE_Q30 - pan_offset
    };

    (amplitude_l, amplitude_r, true)
}

/// Linear crossfade between `a` and `b`; `strength2` is a 16-bit position.
#[inline]
pub fn crossfade_16(a: i32, b: i32, strength2: i32) -> i32 {
    let strength1 = 65536 - strength2;
    (multiply_32x32_rshift32(a, strength1 << 14) + multiply_32x32_rshift32(b, strength2 << 14)) << 2
}
