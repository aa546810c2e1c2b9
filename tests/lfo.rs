use sequencer_fx_dsp::lfo::{triangle, Lfo, LfoWave};

#[test]
fn triangle_shape() {
    assert_eq!(triangle(0), i32::MIN);
    assert_eq!(triangle(0x8000_0000), i32::MAX);
    assert!(triangle(0x4000_0000).abs() < 4);
    assert!(triangle(0xC000_0000).abs() < 4);
}

#[test]
fn sine_quarters() {
    let mut lfo = Lfo::new();

    assert!(lfo.render(1, LfoWave::Sine, 1 << 30).abs() < 1 << 8);
    assert!(lfo.render(1, LfoWave::Sine, 1 << 30) > i32::MAX - (1 << 8));
    assert!(lfo.render(1, LfoWave::Sine, 1 << 30).abs() < 1 << 8);
    assert!(lfo.render(1, LfoWave::Sine, 1 << 30) < i32::MIN + (1 << 8));
    assert_eq!(lfo.phase(), 0);
}

#[test]
fn render_advances_by_block() {
    let mut lfo = Lfo::new();
    lfo.render(128, LfoWave::Triangle, 1000);
    assert_eq!(lfo.phase(), 128_000);

    lfo.set_phase(0xFFFF_FFFF);
    assert_eq!(lfo.render(1, LfoWave::Square, 2), i32::MIN);
    assert_eq!(lfo.phase(), 1);
    assert_eq!(lfo.render(1, LfoWave::Square, 0), i32::MAX);

    lfo.init();
    assert_eq!(lfo.phase(), 0);
}
