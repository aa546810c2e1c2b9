mod wav_writer;

use sequencer_fx_dsp::allocator::{BudgetAllocator, HeapAllocator};
use sequencer_fx_dsp::fx::stutter::Status;
use sequencer_fx_dsp::params::{
    BlockParams, ChainSettings, DelaySettings, ModFxType, StutterConfig, SyncType, Timing,
};
use sequencer_fx_dsp::{EffectsChain, StereoSample, MAX_BLOCK_SIZE, SAMPLE_RATE};

fn render_blocks(
    chain: &mut EffectsChain,
    input: &[StereoSample],
    params: &BlockParams,
    allocator: &BudgetAllocator,
) -> Vec<StereoSample> {
    let timing = Timing::default();
    let mut output = input.to_vec();
    for block in output.chunks_mut(MAX_BLOCK_SIZE) {
        chain.render(block, None, params, &timing, true, allocator);
    }
    output
}

#[test]
fn neutral_chain_is_transparent() {
    let mut chain = EffectsChain::new();
    let input = modulation::noise(4 * MAX_BLOCK_SIZE, 20);
    let output = render_blocks(
        &mut chain,
        &input,
        &BlockParams::default(),
        &BudgetAllocator::new(0),
    );

    // Unity gain drops the lowest 5 bits.
    for (out, dry) in output[MAX_BLOCK_SIZE..].iter().zip(&input[MAX_BLOCK_SIZE..]) {
        assert_eq!(*out, dry.map(|x| x & !31));
    }
}

#[test]
fn first_block_fades_in() {
    let mut chain = EffectsChain::new();
    let input = vec![StereoSample::mono(1 << 28); MAX_BLOCK_SIZE];
    let output = render_blocks(
        &mut chain,
        &input,
        &BlockParams::default(),
        &BudgetAllocator::new(0),
    );

    assert!(output[0].l < 1 << 22);
    for pair in output.windows(2) {
        assert!(pair[1].l >= pair[0].l);
    }
    assert!(output[MAX_BLOCK_SIZE - 1].l > (1 << 28) - (1 << 22));
}

#[test]
fn pan() {
    let mut chain = EffectsChain::new();
    let input = vec![StereoSample::mono(1 << 28); 2 * MAX_BLOCK_SIZE];
    let params = BlockParams {
        pan: i32::MAX,
        ..BlockParams::default()
    };
    let output = render_blocks(&mut chain, &input, &params, &BudgetAllocator::new(0));

    let last = output[output.len() - 1];
    assert_eq!(last.l, 0);
    assert!((last.r - (1 << 28)).abs() < 1 << 10);
}

#[test]
fn reverb_send() {
    let mut chain = EffectsChain::new();
    let timing = Timing::default();
    let allocator = BudgetAllocator::new(0);
    let mut reverb = vec![0; MAX_BLOCK_SIZE];

    let mut block = vec![StereoSample::mono(1 << 28); MAX_BLOCK_SIZE];
    let params = BlockParams::default();
    chain.render(&mut block, Some(reverb.as_mut_slice()), &params, &timing, true, &allocator);
    assert!(reverb.iter().all(|send| *send == 0));

    let mut block = vec![StereoSample::mono(1 << 28); MAX_BLOCK_SIZE];
    let params = BlockParams {
        reverb_send: 1 << 30,
        ..BlockParams::default()
    };
    chain.render(&mut block, Some(reverb.as_mut_slice()), &params, &timing, true, &allocator);
    assert!(reverb.iter().all(|send| *send > 0));

    // Adds to what is already there.
    let first = reverb.clone();
    let mut block = vec![StereoSample::mono(1 << 28); MAX_BLOCK_SIZE];
    chain.render(&mut block, Some(reverb.as_mut_slice()), &params, &timing, true, &allocator);
    for (now, before) in reverb.iter().zip(&first) {
        assert_eq!(*now, 2 * *before);
    }
}

#[test]
fn settings_round_trip() {
    let settings = ChainSettings {
        mod_fx_type: ModFxType::Phaser,
        delay: DelaySettings {
            ping_pong: true,
            analog: true,
            sync_level: 7,
            sync_type: SyncType::Dotted,
        },
        stutter: StutterConfig {
            reversed: true,
            ping_pong: false,
            sync_level: 3,
            quantized: true,
        },
    };

    let mut chain = EffectsChain::new();
    chain.apply_settings(&settings);

    assert_eq!(chain.settings(), settings);
    assert_eq!(chain.mod_fx_type(), ModFxType::Phaser);
    assert!(chain.delay().ping_pong());
    assert_eq!(chain.stutter_config().sync_level, 3);
}

#[test]
fn everything_on() {
    let allocator = BudgetAllocator::new(200_000);
    let mut chain = EffectsChain::new();
    chain.set_mod_fx_type(ModFxType::Chorus);
    chain.delay_mut().set_ping_pong(true);

    let params = BlockParams {
        delay_rate: 1 << 25,
        delay_feedback: 1 << 29,
        mod_fx_rate: 100_000,
        mod_fx_depth: 1 << 30,
        bass: 1 << 29,
        treble: -(1 << 29),
        sample_rate_reduction: -(1 << 30),
        bitcrush: -(1 << 30),
        ..BlockParams::default()
    };
    let input = modulation::sine_block(0, 2 * SAMPLE_RATE as usize, 220.0, 1 << 27);
    let output = render_blocks(&mut chain, &input, &params, &allocator);

    wav_writer::write("chain/everything_on.wav", &output).ok();

    assert!(chain.delay().is_active());
    assert!(chain.mod_fx().has_buffer());
    assert_ne!(output, input);

    chain.discard_buffers(&allocator);
    assert!(!chain.delay().is_active());
    assert!(!chain.mod_fx().has_buffer());
    assert_eq!(allocator.outstanding(), 0);
}

#[test]
fn discarding_buffers_forgets_filter_state() {
    let allocator = BudgetAllocator::new(0);
    let params = BlockParams {
        bass: 1 << 30,
        treble: 1 << 30,
        sample_rate_reduction: 0,
        ..BlockParams::default()
    };
    let loud = modulation::noise(8 * MAX_BLOCK_SIZE, 23);
    let input = modulation::sine_block(0, 8 * MAX_BLOCK_SIZE, 110.0, 1 << 26);

    let mut used = EffectsChain::new();
    render_blocks(&mut used, &loud, &params, &allocator);
    used.discard_buffers(&allocator);
    let output = render_blocks(&mut used, &input, &params, &allocator);

    let mut fresh = EffectsChain::new();
    let expected = render_blocks(&mut fresh, &input, &params, &allocator);

    // The first block differs only by the fresh chain's fade-in.
    assert_eq!(output[MAX_BLOCK_SIZE..], expected[MAX_BLOCK_SIZE..]);
}

#[test]
fn stutter_through_chain() {
    let allocator = BudgetAllocator::new(1 << 20);
    let mut chain = EffectsChain::new();
    chain.set_stutter_config(StutterConfig {
        reversed: true,
        ..StutterConfig::default()
    });
    let params = BlockParams {
        // A loop of 2048 samples.
        stutter_rate: 3 << 28,
        ..BlockParams::default()
    };

    chain
        .begin_stutter(&params, &Timing::default(), &allocator)
        .unwrap();
    assert_eq!(chain.stutter().status(), Status::Recording);

    let input = modulation::noise(4096, 21);
    let output = render_blocks(&mut chain, &input, &params, &allocator);
    assert_eq!(chain.stutter().status(), Status::Playing);

    // Reversed, and at unity volume.
    for k in 0..2048 {
        assert_eq!(output[2048 + k], input[2047 - k].map(|x| x & !31));
    }

    chain.end_stutter(&allocator);
    assert!(!chain.stutter().is_stuttering());
    assert_eq!(allocator.outstanding(), 0);
}

#[test]
fn missing_memory_is_not_fatal() {
    let allocator = BudgetAllocator::new(0);
    let mut chain = EffectsChain::new();
    chain.set_mod_fx_type(ModFxType::Flanger);
    let params = BlockParams {
        delay_feedback: 1 << 29,
        ..BlockParams::default()
    };

    let input = modulation::noise(4 * MAX_BLOCK_SIZE, 22);
    let output = render_blocks(&mut chain, &input, &params, &allocator);

    assert!(!chain.delay().is_active());
    assert!(chain.begin_stutter(&params, &Timing::default(), &allocator).is_err());
    for (out, dry) in output[MAX_BLOCK_SIZE..].iter().zip(&input[MAX_BLOCK_SIZE..]) {
        assert_eq!(*out, dry.map(|x| x & !31));
    }

    // Starts as soon as memory is available.
    let mut block = input[..MAX_BLOCK_SIZE].to_vec();
    chain.render(&mut block, None, &params, &Timing::default(), true, &HeapAllocator);
    assert!(chain.delay().is_active());
}
