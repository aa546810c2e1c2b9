//! Per-block parameter values and persistent settings.
//!
//! Parameter values arrive already resolved from automation. Most of them are bipolar
//! `i32` knobs where `i32::MIN` is fully down, `0` is centred and `i32::MAX` is fully up.

use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Value of a bipolar knob turned fully down.
pub const KNOB_MIN: i32 = i32::MIN;

/// Tempo-synced note lengths run from whole notes (1) to 256ths (9). 0 means free running.
pub const MAX_SYNC_LEVEL: u8 = 9;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SyncType {
    #[default]
    Even,

    Triplet,
    Dotted,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Even => "even",
            SyncType::Triplet => "triplet",
            SyncType::Dotted => "dotted",
        }
    }
}

impl FromStr for SyncType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "even" => Ok(SyncType::Even),
            "triplet" => Ok(SyncType::Triplet),
            "dotted" => Ok(SyncType::Dotted),
            _ => Err(Error::UnknownName),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ModFxType {
    #[default]
    None,

    Flanger,
    Chorus,
    Phaser,
    ChorusStereo,
    Dimension,
}

impl ModFxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModFxType::None => "none",
            ModFxType::Flanger => "flanger",
            ModFxType::Chorus => "chorus",
            ModFxType::Phaser => "phaser",
            ModFxType::ChorusStereo => "StereoChorus",
            ModFxType::Dimension => "dimension",
        }
    }

    /// Whether the effect reads from a delay buffer.
    pub fn needs_buffer(&self) -> bool {
        matches!(
            self,
            ModFxType::Flanger
                | ModFxType::Chorus
                | ModFxType::ChorusStereo
                | ModFxType::Dimension
        )
    }
}

impl FromStr for ModFxType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ModFxType::None),
            "flanger" => Ok(ModFxType::Flanger),
            "chorus" => Ok(ModFxType::Chorus),
            "phaser" => Ok(ModFxType::Phaser),
            "StereoChorus" => Ok(ModFxType::ChorusStereo),
            "dimension" => Ok(ModFxType::Dimension),
            _ => Err(Error::UnknownName),
        }
    }
}

/// Tempo information from the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Reciprocal of the time per internal tick, as a 32-bit fraction.
    pub time_per_tick_inverse: u32,

    /// Binary magnitude of the song's tick resolution, relative to the default.
    pub magnitude: i32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            // About 460 samples per tick.
            time_per_tick_inverse: 9_336_885,
            magnitude: 0,
        }
    }
}

/// Delay settings that are stored with a song.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DelaySettings {
    pub ping_pong: bool,
    pub analog: bool,
    pub sync_level: u8,
    pub sync_type: SyncType,
}

/// Stutter settings that are stored with a song.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StutterConfig {
    pub reversed: bool,
    pub ping_pong: bool,
    pub sync_level: u8,

    /// Snaps the loop length to 4ths, 8ths, 16ths, 32nds or 64ths when the stutter starts.
    pub quantized: bool,
}

/// Everything about the chain that is stored with a song, apart from knob positions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChainSettings {
    pub mod_fx_type: ModFxType,
    pub delay: DelaySettings,
    pub stutter: StutterConfig,
}

/// Resolved parameter values for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlockParams {
    /// Delay rate. A rate of 2^24 gives a delay of 16384 samples; doubling it halves the
    /// delay time.
    pub delay_rate: u32,

    /// Delay feedback, 2^30 is unity. Below 256 the delay is off.
    pub delay_feedback: i32,

    /// Softness of the analog feedback saturation, 2 to 16.
    pub analog_saturation: u32,

    /// LFO phase increment per sample.
    pub mod_fx_rate: u32,

    /// Modulation depth, 0 to 2^31.
    pub mod_fx_depth: i32,

    pub mod_fx_feedback: i32,
    pub mod_fx_offset: i32,

    pub stutter_rate: i32,

    pub sample_rate_reduction: i32,
    pub bitcrush: i32,

    pub bass: i32,
    pub treble: i32,
    pub bass_frequency: i32,
    pub treble_frequency: i32,

    /// Volume through the effects, 2^27 is unity.
    pub post_fx_volume: i32,

    /// Volume after the reverb send, 2^27 is unity.
    pub post_reverb_volume: i32,

    pub pan: i32,

    /// Reverb send level, 0 for none.
    pub reverb_send: i32,
}

impl Default for BlockParams {
    fn default() -> Self {
        Self {
            delay_rate: 1 << 24,
            delay_feedback: 0,
            analog_saturation: 8,
            mod_fx_rate: 0,
            mod_fx_depth: 0,
            mod_fx_feedback: 0,
            mod_fx_offset: 0,
            stutter_rate: 0,
            sample_rate_reduction: KNOB_MIN,
            bitcrush: KNOB_MIN,
            bass: 0,
            treble: 0,
            bass_frequency: 0,
            treble_frequency: 0,
            post_fx_volume: 1 << 27,
            post_reverb_volume: 1 << 27,
            pan: 0,
            reverb_send: 0,
        }
    }
}

/// Multiplies a rate by the tick rate and scales it to the note length of `sync_level`.
///
/// Returns the rate unchanged when `sync_level` is 0.
pub fn sync_rate(rate: u32, timing: &Timing, sync_level: u8, sync_type: SyncType) -> u32 {
    if sync_level == 0 {
        return rate;
    }
    let shift = sync_level.min(MAX_SYNC_LEVEL) as u32 + 5;

    let synced =
        ((rate as u64 * timing.time_per_tick_inverse as u64 + 0x8000_0000) >> 32) as u32;

    // Largest value that survives the final shift.
    let limit = (i32::MAX as u32) >> shift;
    let synced = synced.min(limit);

    let synced = match sync_type {
        SyncType::Even => synced,
        SyncType::Triplet => synced * 3 / 2,
        SyncType::Dotted => synced * 2 / 3,
    };
    synced << shift
}
