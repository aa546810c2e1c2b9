//! Writer for WAV files

use std::path::Path;

use hound::*;

use sequencer_fx_dsp::{StereoSample, SAMPLE_RATE};

/// Writes stereo frames as WAV file in 32-bit integer format.
#[allow(dead_code)]
pub fn write(
    filename: impl AsRef<std::path::Path> + core::fmt::Display,
    frames: &[StereoSample],
) -> std::io::Result<()> {
    let path = format!("out/{filename}");
    let path = Path::new(path.as_str());

    // Create parent directories to the path if they don't exist.
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let spec = WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(to_io_error)?;

    for frame in frames {
        writer.write_sample(frame.l).map_err(to_io_error)?;
        writer.write_sample(frame.r).map_err(to_io_error)?;
    }

    writer.finalize().map_err(to_io_error)
}

fn to_io_error(error: hound::Error) -> std::io::Error {
    std::io::Error::other(error.to_string())
}
