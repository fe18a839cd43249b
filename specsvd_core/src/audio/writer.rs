use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use super::Waveform;
use crate::error::{PipelineError, Result};

/// Write a mono waveform as 16-bit PCM WAV. Samples are clamped to [-1, 1].
pub fn write_wav(path: &Path, wave: &Waveform) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: wave.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let map_err = |source| PipelineError::AudioWrite {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = WavWriter::create(path, spec).map_err(map_err)?;
    for &s in &wave.samples {
        let s = if s.is_finite() { s } else { 0.0 };
        let q = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(q).map_err(map_err)?;
    }
    writer.finalize().map_err(map_err)?;
    Ok(())
}
