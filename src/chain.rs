//! The effects chain as a whole.
//!
//! Per block: modulation, tone, delay, stutter, sample rate reduction and bit crushing,
//! then volume, panning and reverb send.

use crate::allocator::BufferAllocator;
use crate::error::Error;
use crate::fx::delay::{Delay, DelayTuning, WorkingState};
use crate::fx::eq::{EqParams, Equalizer};
use crate::fx::mod_fx::{ModFxParams, ModFxProcessor};
use crate::fx::sample_rate_reducer::SampleRateReducer;
use crate::fx::stutter::Stutterer;
use crate::params::{BlockParams, ChainSettings, ModFxType, StutterConfig, Timing};
use crate::utils::multiply_32x32_rshift32;
use crate::utils::parameter_interpolator::ParameterInterpolator;
use crate::utils::should_do_panning;
use crate::StereoSample;

#[derive(Debug, Default)]
pub struct EffectsChain {
    mod_fx: ModFxProcessor,
    mod_fx_type: ModFxType,
    eq: Equalizer,
    delay: Delay,
    stutter: Stutterer,
    stutter_config: StutterConfig,
    reducer: SampleRateReducer,
    post_reverb_volume_last_time: i32,
}

impl EffectsChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tuning(tuning: DelayTuning) -> Self {
        Self {
            delay: Delay::with_tuning(tuning),
            ..Self::default()
        }
    }

    pub fn mod_fx_type(&self) -> ModFxType {
        self.mod_fx_type
    }

    /// Takes effect from the next block, which also hands back a buffer no longer needed.
    pub fn set_mod_fx_type(&mut self, mod_fx_type: ModFxType) {
        self.mod_fx_type = mod_fx_type;
    }

    pub fn mod_fx(&self) -> &ModFxProcessor {
        &self.mod_fx
    }

    pub fn delay(&self) -> &Delay {
        &self.delay
    }

    pub fn delay_mut(&mut self) -> &mut Delay {
        &mut self.delay
    }

    pub fn stutter(&self) -> &Stutterer {
        &self.stutter
    }

    pub fn stutter_config(&self) -> StutterConfig {
        self.stutter_config
    }

    pub fn set_stutter_config(&mut self, config: StutterConfig) {
        self.stutter_config = config;
    }

    pub fn settings(&self) -> ChainSettings {
        ChainSettings {
            mod_fx_type: self.mod_fx_type,
            delay: self.delay.settings(),
            stutter: self.stutter_config,
        }
    }

    pub fn apply_settings(&mut self, settings: &ChainSettings) {
        self.mod_fx_type = settings.mod_fx_type;
        self.delay.apply_settings(&settings.delay);
        self.stutter_config = settings.stutter;
    }

    /// Starts recording a stutter loop at the rate the stutter knob gives.
    pub fn begin_stutter<A: BufferAllocator>(
        &mut self,
        params: &BlockParams,
        timing: &Timing,
        allocator: &A,
    ) -> Result<(), Error> {
        self.stutter
            .begin_stutter(allocator, params.stutter_rate, timing, self.stutter_config)
    }

    pub fn end_stutter<A: BufferAllocator>(&mut self, allocator: &A) {
        self.stutter.end_stutter(allocator);
    }

    /// Hands back every buffer and clears filter state, for when the chain won't be
    /// rendered for a while.
    pub fn discard_buffers<A: BufferAllocator>(&mut self, allocator: &A) {
        self.delay.discard_buffers(allocator);
        self.mod_fx.disable_buffer(allocator);
        self.stutter.end_stutter(allocator);
        self.eq.reset();
        self.reducer.init();
    }

    /// Processes one block in place. When `params.reverb_send` is non-zero, the send is
    /// added into `reverb_buffer`.
    pub fn render<A: BufferAllocator>(
        &mut self,
        audio: &mut [StereoSample],
        reverb_buffer: Option<&mut [i32]>,
        params: &BlockParams,
        timing: &Timing,
        any_sound_coming_in: bool,
        allocator: &A,
    ) {
        let mut post_fx_volume = params.post_fx_volume;

        let mut delay_state = WorkingState {
            do_delay: false,
            user_delay_rate: params.delay_rate,
            delay_feedback_amount: params.delay_feedback,
            analog_saturation: params.analog_saturation,
        };
        self.delay
            .setup_working_state(&mut delay_state, timing, any_sound_coming_in, allocator);

        let mod_fx_params = ModFxParams {
            rate: params.mod_fx_rate,
            depth: params.mod_fx_depth,
            feedback: params.mod_fx_feedback,
            offset: params.mod_fx_offset,
        };
        self.mod_fx.process(
            audio,
            self.mod_fx_type,
            &mod_fx_params,
            &mut post_fx_volume,
            allocator,
        );

        let eq_params = EqParams {
            bass: params.bass,
            treble: params.treble,
            bass_frequency: params.bass_frequency,
            treble_frequency: params.treble_frequency,
        };
        self.eq.process(audio, &eq_params);

        self.delay.process(audio, &delay_state, allocator);

        self.stutter.process(audio, params.stutter_rate, timing);

        self.reducer.process(
            audio,
            params.sample_rate_reduction,
            params.bitcrush,
            &mut post_fx_volume,
        );

        self.process_reverb_send_and_volume(audio, reverb_buffer, post_fx_volume, params);
    }

    fn process_reverb_send_and_volume(
        &mut self,
        audio: &mut [StereoSample],
        reverb_buffer: Option<&mut [i32]>,
        post_fx_volume: i32,
        params: &BlockParams,
    ) {
        let reverb_send_and_post_fx_volume =
            multiply_32x32_rshift32(post_fx_volume, params.reverb_send) << 5;
        let (amplitude_l, amplitude_r, do_panning) = should_do_panning(params.pan);

        let mut reverb = match reverb_buffer {
            Some(reverb) if params.reverb_send != 0 => Some(reverb.iter_mut()),
            _ => None,
        };

        let mut post_reverb_volume = ParameterInterpolator::new(
            &mut self.post_reverb_volume_last_time,
            params.post_reverb_volume,
            audio.len(),
        );

        for sample in audio.iter_mut() {
            if let Some(send) = reverb.as_mut().and_then(|reverb| reverb.next()) {
                *send = send.wrapping_add(
                    multiply_32x32_rshift32(
                        sample.l.wrapping_add(sample.r),
                        reverb_send_and_post_fx_volume,
                    ) << 1,
                );
            }

            let volume = multiply_32x32_rshift32(post_reverb_volume.next(), post_fx_volume) << 5;
            let (volume_l, volume_r) = if do_panning {
                (
                    multiply_32x32_rshift32(volume, amplitude_l) << 2,
                    multiply_32x32_rshift32(volume, amplitude_r) << 2,
                )
            } else {
                (volume, volume)
            };

            sample.l = multiply_32x32_rshift32(sample.l, volume_l) << 5;
            sample.r = multiply_32x32_rshift32(sample.r, volume_r) << 5;
        }
    }
}
