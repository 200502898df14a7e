//! WAV encoding for 16-bit stereo PCM.

use std::io::{Cursor, Seek, Write};

use hound::{SampleFormat, WavSpec, WavWriter};
use ks_engine::Frame;
use ks_formats::FormatError;

fn spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

pub fn write_wav<W: Write + Seek>(
    w: W,
    frames: &[Frame],
    sample_rate: u32,
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::new(w, spec(sample_rate))?;
    for frame in frames {
        writer.write_sample(frame.left)?;
        writer.write_sample(frame.right)?;
    }
    writer.finalize()
}

pub fn frames_to_wav(frames: &[Frame], sample_rate: u32) -> Result<Vec<u8>, FormatError> {
    let mut buf = Cursor::new(Vec::with_capacity(44 + frames.len() * 4));
    write_wav(&mut buf, frames, sample_rate).map_err(|e| FormatError::Io(e.to_string()))?;
    Ok(buf.into_inner())
}
