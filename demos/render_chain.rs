//! Renders a plucked sine phrase through the effects chain into a WAV file.

use hound::{SampleFormat, WavSpec, WavWriter};
use simple_logger::SimpleLogger;

use sequencer_fx_dsp::allocator::BudgetAllocator;
use sequencer_fx_dsp::params::{BlockParams, ModFxType, Timing};
use sequencer_fx_dsp::{EffectsChain, StereoSample, MAX_BLOCK_SIZE, SAMPLE_RATE};

const DURATION_SECONDS: usize = 6;

fn main() {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init()
        .unwrap();

    // Room for two delay buffers and a mod fx buffer.
    let allocator = BudgetAllocator::new(200_000);
    let mut chain = EffectsChain::new();
    chain.set_mod_fx_type(ModFxType::Chorus);
    chain.delay_mut().set_ping_pong(true);

    let timing = Timing::default();
    let mut params = BlockParams {
        delay_rate: 3 << 23,
        delay_feedback: 1 << 30,
        mod_fx_rate: 200_000,
        mod_fx_depth: 1 << 30,
        ..BlockParams::default()
    };

    let spec = WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Int,
    };
    std::fs::create_dir_all("out").unwrap();
    let mut writer = WavWriter::create("out/render_chain.wav", spec).unwrap();

    let total = DURATION_SECONDS * SAMPLE_RATE as usize;
    let mut block = [StereoSample::ZERO; MAX_BLOCK_SIZE];
    let mut phase = 0u32;
    let mut position = 0;

    while position < total {
        // A note every half second for the first two seconds.
        let mut any_sound = false;
        for (i, frame) in block.iter_mut().enumerate() {
            let t = position + i;
            let in_note = t < 2 * SAMPLE_RATE as usize && t % (SAMPLE_RATE as usize / 2) < 4000;
            phase = phase.wrapping_add(30_000_000);
            let value = if in_note {
                any_sound = true;
                ((phase as f64 / u32::MAX as f64 * std::f64::consts::TAU).sin() * (1 << 28) as f64)
                    as i32
            } else {
                0
            };
            *frame = StereoSample::mono(value);
        }

        // Sweep the delay time in the second half.
        if position > total / 2 {
            params.delay_rate = params.delay_rate.saturating_add(2_000);
        }

        chain.render(&mut block, None, &params, &timing, any_sound, &allocator);

        for frame in block.iter() {
            writer.write_sample(frame.l).unwrap();
            writer.write_sample(frame.r).unwrap();
        }
        position += MAX_BLOCK_SIZE;
    }

    writer.finalize().unwrap();
    chain.discard_buffers(&allocator);
    log::info!("frames still allocated: {}", allocator.frames_in_use());
}
