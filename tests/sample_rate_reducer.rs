mod wav_writer;

use std::collections::HashSet;

use sequencer_fx_dsp::fx::sample_rate_reducer::SampleRateReducer;
use sequencer_fx_dsp::params::KNOB_MIN;
use sequencer_fx_dsp::{StereoSample, MAX_BLOCK_SIZE, SAMPLE_RATE};

fn run(
    reducer: &mut SampleRateReducer,
    input: &[StereoSample],
    reduction: i32,
    bitcrush: i32,
) -> (Vec<StereoSample>, i32) {
    let mut output = input.to_vec();
    let volumes: Vec<i32> = output
        .chunks_mut(MAX_BLOCK_SIZE)
        .map(|block| {
            let mut volume = 1 << 27;
            reducer.process(block, reduction, bitcrush, &mut volume);
            volume
        })
        .collect();

    (output, volumes[0])
}

#[test]
fn off() {
    let input = modulation::noise(1024, 1);
    let (output, volume) = run(&mut SampleRateReducer::new(), &input, KNOB_MIN, KNOB_MIN);

    assert_eq!(output, input);
    assert_eq!(volume, 1 << 27);
}

#[test]
fn bitcrush_quantizes() {
    let input = modulation::sine_block(0, SAMPLE_RATE as usize, 97.0, 1 << 30);
    let (output, volume) = run(&mut SampleRateReducer::new(), &input, KNOB_MIN, 0);

    wav_writer::write("sample_rate_reducer/bitcrush.wav", &output).ok();

    let levels: HashSet<i32> = output.iter().map(|frame| frame.l).collect();
    assert!(output.iter().all(|frame| frame.l & ((1 << 23) - 1) == 0));
    assert!(levels.len() <= 257, "{}", levels.len());
    assert!(levels.len() > 128, "{}", levels.len());
    assert_eq!(volume, 1 << 27);
}

#[test]
fn heavy_bitcrush_lowers_volume() {
    let input = modulation::sine_block(0, 1024, 100.0, 1 << 30);
    let (output, volume) = run(&mut SampleRateReducer::new(), &input, KNOB_MIN, i32::MAX);

    assert!(output.iter().all(|frame| frame.l & ((1 << 26) - 1) == 0));
    assert_eq!(volume, 1 << 24);
}

#[test]
fn below_threshold_is_off() {
    assert!(!SampleRateReducer::is_bitcrush_enabled(KNOB_MIN));
    assert!(!SampleRateReducer::is_bitcrush_enabled(-2113929217));
    assert!(SampleRateReducer::is_bitcrush_enabled(-2113929216));
    assert!(!SampleRateReducer::is_reduction_enabled(KNOB_MIN));
    assert!(SampleRateReducer::is_reduction_enabled(KNOB_MIN + 1));
}

#[test]
fn reduction_interpolates_between_grabs() {
    // A grab every 16 samples.
    let input = modulation::sine_block(0, 4096, 1000.0, 1 << 28);
    let (output, _) = run(&mut SampleRateReducer::new(), &input, 0, KNOB_MIN);

    wav_writer::write("sample_rate_reducer/reduction.wav", &output).ok();

    let values: Vec<i64> = output.iter().map(|frame| frame.l as i64).collect();
    let kinks = values
        .windows(3)
        .filter(|w| (w[2] - 2 * w[1] + w[0]).abs() > 64)
        .count();
    assert!(kinks <= 2 * (values.len() / 16) + 4, "{kinks}");

    let reference: Vec<i64> = input.iter().map(|frame| frame.l as i64).collect();
    let reference_kinks = reference
        .windows(3)
        .filter(|w| (w[2] - 2 * w[1] + w[0]).abs() > 64)
        .count();
    assert!(kinks < reference_kinks / 4);
}

#[test]
fn deterministic() {
    let input = vec![StereoSample::new(1 << 27, -(1 << 26)); 2048];

    let (a, _) = run(&mut SampleRateReducer::new(), &input, 1 << 29, -(1 << 30));
    let (b, _) = run(&mut SampleRateReducer::new(), &input, 1 << 29, -(1 << 30));
    assert_eq!(a, b);

    // Settles on the input value, quantized.
    let last = a[a.len() - 1];
    assert!((last.l - (1 << 27)).abs() < 1 << 22);
    assert!((last.r + (1 << 26)).abs() < 1 << 22);
}
