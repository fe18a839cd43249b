use anyhow::{Context, Result, anyhow};
use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CODEC_TYPE_NULL, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{Fft, FixedSync, Resampler};

use super::{SAMPLE_RATE, Waveform};
use crate::error::PipelineError;

/// Load an audio file as a mono waveform at [`SAMPLE_RATE`].
///
/// Any failure along the way (open, container sniffing, decode, resample) is reported as
/// [`PipelineError::Decode`] with the full context chain.
pub fn load_waveform<P: AsRef<Path>>(path: P) -> Result<Waveform, PipelineError> {
    let path = path.as_ref();
    let samples = decode_to_mono(path, SAMPLE_RATE).map_err(|err| PipelineError::Decode {
        path: path.to_path_buf(),
        reason: format!("{err:#}"),
    })?;
    Ok(Waveform::new(samples, SAMPLE_RATE))
}

/// Decoded interleaved samples plus the stream layout they came with.
struct DecodedStream {
    interleaved: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

/// Decode `path`, downmix to one channel and resample to `target_rate`.
pub fn decode_to_mono(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let stream = decode_interleaved(path)?;
    let mono = downmix_to_mono(stream.interleaved, stream.channels);
    resample_mono(mono, stream.sample_rate, target_rate)
}

fn decode_interleaved(path: &Path) -> Result<DecodedStream> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let detected = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("unsupported or unrecognised container format")?;

    let mut format = detected.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("no supported audio tracks found"))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("failed to create decoder for selected track")?;

    let mut interleaved: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::ResetRequired) => {
                return Err(anyhow!("decoder reset required (chained streams)"));
            }
            // End of stream.
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(e).context("error reading next packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => continue,
            Err(SymphoniaError::ResetRequired) => {
                return Err(anyhow!("decoder reset required mid-stream"));
            }
            Err(e) => return Err(e).context("unrecoverable decode error"),
        };

        sample_rate.get_or_insert(decoded.spec().rate);
        channels.get_or_insert(decoded.spec().channels.count());

        let mut sbuf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sbuf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(sbuf.samples());
    }

    let sample_rate = sample_rate.ok_or_else(|| anyhow!("could not determine input sample rate"))?;
    let channels = channels.ok_or_else(|| anyhow!("could not determine channel count"))?;

    if interleaved.is_empty() {
        return Err(anyhow!("decoded audio was empty"));
    }

    Ok(DecodedStream {
        interleaved,
        sample_rate,
        channels,
    })
}

/// Average interleaved frames down to a single channel.
pub fn downmix_to_mono(interleaved: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved;
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample_mono(mono: Vec<f32>, rate_in: u32, rate_out: u32) -> Result<Vec<f32>> {
    if rate_in == rate_out {
        return Ok(mono);
    }

    // Offline clips: fixed input chunking, output length varies.
    let chunk_size: usize = 1024;
    let sub_chunks: usize = 1;

    let mut resampler = Fft::<f32>::new(
        rate_in as usize,
        rate_out as usize,
        chunk_size,
        sub_chunks,
        1,
        FixedSync::Input,
    )
    .context("failed to construct FFT resampler")?;

    let input_frames = mono.len();
    let output_frames = resampler.process_all_needed_output_len(input_frames);
    let mut out = vec![0.0f32; output_frames];

    let input_adapter =
        InterleavedSlice::new(&mono, 1, input_frames).context("bad input adapter")?;
    let mut output_adapter =
        InterleavedSlice::new_mut(&mut out, 1, output_frames).context("bad output adapter")?;

    let (_frames_read, frames_written) = resampler
        .process_all_into_buffer(&input_adapter, &mut output_adapter, input_frames, None)
        .context("resampling failed")?;

    out.truncate(frames_written);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::TempDir;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[f32]) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn downmix_averages_channels() {
        let mono = downmix_to_mono(vec![1.0, -1.0, 0.5, 0.25], 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.0).abs() < 1e-6);
        assert!((mono[1] - 0.375).abs() < 1e-6);
    }

    #[test]
    fn downmix_passes_mono_through() {
        let mono = downmix_to_mono(vec![0.1, 0.2, 0.3], 1);
        assert_eq!(mono, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn loads_mono_wav_at_run_rate_without_resampling() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..1600).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        write_wav(&path, SAMPLE_RATE, 1, &samples);

        let wave = load_waveform(&path).unwrap();
        assert_eq!(wave.sample_rate, SAMPLE_RATE);
        assert_eq!(wave.len(), 1600);
        assert!((wave.samples[20] - samples[20]).abs() < 1e-3);
    }

    #[test]
    fn stereo_input_is_downmixed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        let interleaved: Vec<f32> = (0..800).flat_map(|_| [0.5_f32, -0.5]).collect();
        write_wav(&path, SAMPLE_RATE, 2, &interleaved);

        let wave = load_waveform(&path).unwrap();
        assert_eq!(wave.len(), 800);
        assert!(wave.samples.iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn higher_rate_input_is_resampled_to_run_rate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hi.wav");
        let samples: Vec<f32> = (0..32_000).map(|i| (i as f32 * 0.01).sin() * 0.3).collect();
        write_wav(&path, 32_000, 1, &samples);

        let wave = load_waveform(&path).unwrap();
        assert_eq!(wave.sample_rate, SAMPLE_RATE);
        let expected = 16_000_i64;
        assert!((wave.len() as i64 - expected).abs() < 1024, "len {}", wave.len());
    }

    #[test]
    fn unreadable_file_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();

        match load_waveform(&path) {
            Err(PipelineError::Decode { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected decode error, got {other:?}"),
        }
    }
}
