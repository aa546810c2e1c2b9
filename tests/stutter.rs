mod wav_writer;

use sequencer_fx_dsp::allocator::BudgetAllocator;
use sequencer_fx_dsp::fx::stutter::{Status, Stutterer};
use sequencer_fx_dsp::params::{StutterConfig, Timing};
use sequencer_fx_dsp::{Error, StereoSample, MAX_BLOCK_SIZE};

// Knob position for a rate of 2^27, a loop of 2048 samples.
const SHORT_LOOP: i32 = 3 << 28;

// Twice as fast.
const DOUBLE_SPEED: i32 = 1 << 30;

const LOOP_SIZE: usize = 2048;

fn stutter(config: StutterConfig, input: &[StereoSample], knobs: &[i32]) -> Vec<StereoSample> {
    let allocator = BudgetAllocator::new(1 << 20);
    let timing = Timing::default();
    let mut stutterer = Stutterer::new();
    stutterer
        .begin_stutter(&allocator, knobs[0], &timing, config)
        .unwrap();
    assert_eq!(stutterer.loop_size(), Some(LOOP_SIZE));

    let mut output = input.to_vec();
    for (i, block) in output.chunks_mut(MAX_BLOCK_SIZE).enumerate() {
        let knob = knobs[i.min(knobs.len() - 1)];
        stutterer.process(block, knob, &timing);
    }

    output
}

#[test]
fn loop_plays_back_exactly() {
    let input = modulation::noise(3 * LOOP_SIZE, 3);
    let output = stutter(StutterConfig::default(), &input, &[SHORT_LOOP]);

    wav_writer::write("stutter/forward.wav", &output).ok();

    assert_eq!(&output[..LOOP_SIZE], &input[..LOOP_SIZE]);
    for k in 0..2 * LOOP_SIZE {
        assert_eq!(output[LOOP_SIZE + k], input[k % LOOP_SIZE], "sample {k}");
    }
}

#[test]
fn reversed_loop() {
    let input = modulation::noise(2 * LOOP_SIZE, 4);
    let config = StutterConfig {
        reversed: true,
        ..StutterConfig::default()
    };
    let output = stutter(config, &input, &[SHORT_LOOP]);

    for k in 0..LOOP_SIZE {
        assert_eq!(output[LOOP_SIZE + k], input[LOOP_SIZE - 1 - k], "sample {k}");
    }
}

#[test]
fn ping_pong_loop() {
    let input = modulation::noise(3 * LOOP_SIZE, 5);
    let config = StutterConfig {
        ping_pong: true,
        ..StutterConfig::default()
    };
    let output = stutter(config, &input, &[SHORT_LOOP]);

    for k in 0..LOOP_SIZE {
        assert_eq!(output[LOOP_SIZE + k], input[k]);
    }
    for k in 0..LOOP_SIZE - 1 {
        assert_eq!(output[2 * LOOP_SIZE + k], input[LOOP_SIZE - 2 - k]);
    }
    assert_eq!(output[3 * LOOP_SIZE - 1], input[1]);
}

#[test]
fn double_speed_skips_every_other_frame() {
    let input = modulation::noise(2 * LOOP_SIZE, 6);
    let recording_blocks = LOOP_SIZE / MAX_BLOCK_SIZE;
    let mut knobs = vec![SHORT_LOOP; recording_blocks];
    knobs.push(DOUBLE_SPEED);
    let output = stutter(StutterConfig::default(), &input, &knobs);

    for k in 0..LOOP_SIZE {
        let expected = input[(2 * k + 1) % LOOP_SIZE].map(|x| x & !3);
        assert_eq!(output[LOOP_SIZE + k], expected, "sample {k}");
    }
}

#[test]
fn quantized_loop_lengths() {
    let allocator = BudgetAllocator::new(1 << 20);
    let timing = Timing::default();
    let config = StutterConfig {
        quantized: true,
        ..StutterConfig::default()
    };

    // 16ths in the middle, 32nds and 64ths above, 8ths and 4ths below.
    for (knob, size) in [
        (5 << 25, 16384),
        (SHORT_LOOP, 8192),
        (i32::MAX, 4096),
        (-(20 << 25), 32768),
        (i32::MIN, 65536),
    ] {
        let mut stutterer = Stutterer::new();
        stutterer
            .begin_stutter(&allocator, knob, &timing, config)
            .unwrap();
        assert_eq!(stutterer.loop_size(), Some(size), "knob {knob}");
        stutterer.end_stutter(&allocator);
    }
}

#[test]
fn quantized_stutter_follows_knob_from_snapped_position() {
    const QUANTIZED_LOOP: usize = 8192;
    let config = StutterConfig {
        quantized: true,
        ..StutterConfig::default()
    };
    let allocator = BudgetAllocator::new(1 << 20);
    let timing = Timing::default();
    let mut stutterer = Stutterer::new();
    stutterer
        .begin_stutter(&allocator, SHORT_LOOP, &timing, config)
        .unwrap();
    assert_eq!(stutterer.loop_size(), Some(QUANTIZED_LOOP));

    // One octave up from where it started.
    assert_eq!(stutterer.effective_knob(DOUBLE_SPEED), 1 << 29);

    let input = modulation::noise(2 * QUANTIZED_LOOP, 11);
    let mut output = input.clone();
    for (i, block) in output.chunks_mut(MAX_BLOCK_SIZE).enumerate() {
        let knob = if i < QUANTIZED_LOOP / MAX_BLOCK_SIZE {
            SHORT_LOOP
        } else {
            DOUBLE_SPEED
        };
        stutterer.process(block, knob, &timing);
    }

    for k in 0..QUANTIZED_LOOP {
        let expected = input[(2 * k + 1) % QUANTIZED_LOOP].map(|x| x & !3);
        assert_eq!(output[QUANTIZED_LOOP + k], expected, "sample {k}");
    }

    stutterer.end_stutter(&allocator);
    assert_eq!(stutterer.effective_knob(DOUBLE_SPEED), DOUBLE_SPEED);
}

#[test]
fn retrigger_replaces_loop() {
    let allocator = BudgetAllocator::new(1 << 20);
    let timing = Timing::default();
    let mut stutterer = Stutterer::new();
    let mut block = modulation::noise(MAX_BLOCK_SIZE, 8);

    stutterer
        .begin_stutter(&allocator, SHORT_LOOP, &timing, StutterConfig::default())
        .unwrap();
    stutterer.process(&mut block, SHORT_LOOP, &timing);

    stutterer
        .begin_stutter(&allocator, 0, &timing, StutterConfig::default())
        .unwrap();
    assert_eq!(stutterer.status(), Status::Recording);
    assert_eq!(stutterer.loop_size(), Some(16384));
    assert_eq!(allocator.outstanding(), 1);
}

#[test]
fn end_releases_loop() {
    let allocator = BudgetAllocator::new(1 << 20);
    let timing = Timing::default();
    let mut stutterer = Stutterer::new();

    stutterer
        .begin_stutter(&allocator, SHORT_LOOP, &timing, StutterConfig::default())
        .unwrap();
    let mut audio = modulation::noise(3 * LOOP_SIZE, 9);
    for block in audio.chunks_mut(MAX_BLOCK_SIZE) {
        stutterer.process(block, SHORT_LOOP, &timing);
    }
    assert_eq!(stutterer.status(), Status::Playing);

    stutterer.end_stutter(&allocator);
    assert!(!stutterer.is_stuttering());
    assert_eq!(allocator.outstanding(), 0);

    let input = modulation::noise(MAX_BLOCK_SIZE, 10);
    let mut block = input.clone();
    stutterer.process(&mut block, SHORT_LOOP, &timing);
    assert_eq!(block, input);
}

#[test]
fn no_memory() {
    let allocator = BudgetAllocator::new(1000);
    let mut stutterer = Stutterer::new();

    let result = stutterer.begin_stutter(
        &allocator,
        SHORT_LOOP,
        &Timing::default(),
        StutterConfig::default(),
    );

    assert_eq!(result, Err(Error::InsufficientRam));
    assert_eq!(stutterer.status(), Status::Off);
}

#[test]
fn rate() {
    let timing = Timing::default();

    assert_eq!(Stutterer::stutter_rate(0, &timing, 0), 1 << 24);
    assert_eq!(Stutterer::stutter_rate(SHORT_LOOP, &timing, 0), 1 << 27);

    let synced = Stutterer::stutter_rate(0, &timing, 3);
    assert_eq!(Stutterer::stutter_rate(0, &timing, 4), synced * 2);
}
