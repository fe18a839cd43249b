//! Centered short-time Fourier transform and its overlap-add inverse.
//!
//! Spectrograms are laid out as `(frequency_bin, frame)` with
//! `n_fft / 2 + 1` rows.

use std::f32::consts::PI;
use std::sync::Arc;

use ndarray::Array2;
use realfft::num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use super::Spectrogram;
use crate::audio::Waveform;
use crate::error::{PipelineError, Result};

/// How phase is supplied when inverting a magnitude-only spectrogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseRecovery {
    /// Every bin is treated as a real, zero-phase coefficient.
    #[default]
    Zero,
    /// Fast Griffin-Lim starting from zero phase.
    GriffinLim { iterations: usize, momentum: f32 },
}

pub struct SpectrogramTransform {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
}

impl std::fmt::Debug for SpectrogramTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrogramTransform")
            .field("n_fft", &self.n_fft)
            .field("hop_length", &self.hop_length)
            .finish()
    }
}

impl SpectrogramTransform {
    pub fn new(n_fft: usize, hop_length: usize) -> Result<Self> {
        if n_fft < 2 || n_fft % 2 != 0 {
            return Err(PipelineError::Shape(format!(
                "n_fft must be even and at least 2, got {n_fft}"
            )));
        }
        if hop_length == 0 || hop_length > n_fft {
            return Err(PipelineError::Shape(format!(
                "hop length must be in 1..={n_fft}, got {hop_length}"
            )));
        }
        let mut planner = RealFftPlanner::<f32>::new();
        Ok(Self {
            n_fft,
            hop_length,
            window: hann_window(n_fft),
            forward: planner.plan_fft_forward(n_fft),
            inverse: planner.plan_fft_inverse(n_fft),
        })
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of frames the forward transform yields for `len` samples.
    pub fn frame_count(&self, len: usize) -> usize {
        1 + len / self.hop_length
    }

    /// Magnitude spectrogram of `wave`. Phase is discarded.
    pub fn forward(&self, wave: &Waveform) -> Result<Spectrogram> {
        Ok(self.stft(&wave.samples)?.mapv(|c| c.norm()))
    }

    /// Complex STFT of `samples`, zero-padded by `n_fft / 2` on both sides.
    pub fn stft(&self, samples: &[f32]) -> Result<Array2<Complex32>> {
        let pad = self.n_fft / 2;
        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let frames = self.frame_count(samples.len());
        let mut out = Array2::<Complex32>::zeros((self.n_bins(), frames));
        let mut frame = self.forward.make_input_vec();
        let mut spectrum = self.forward.make_output_vec();

        for t in 0..frames {
            let start = t * self.hop_length;
            for (i, slot) in frame.iter_mut().enumerate() {
                *slot = padded[start + i] * self.window[i];
            }
            self.forward
                .process(&mut frame, &mut spectrum)
                .map_err(|e| PipelineError::Shape(e.to_string()))?;
            out.column_mut(t)
                .iter_mut()
                .zip(spectrum.iter())
                .for_each(|(dst, src)| *dst = *src);
        }
        Ok(out)
    }

    /// Synthesize a waveform from a magnitude-only spectrogram.
    ///
    /// Output length is `hop_length * (frames - 1)` samples.
    pub fn inverse(
        &self,
        magnitude: &Spectrogram,
        phase: PhaseRecovery,
        sample_rate: u32,
    ) -> Result<Waveform> {
        self.check_shape(magnitude.dim())?;
        let samples = match phase {
            PhaseRecovery::Zero => self.istft(&magnitude.mapv(|m| Complex32::new(m, 0.0)))?,
            PhaseRecovery::GriffinLim {
                iterations,
                momentum,
            } => self.griffin_lim(magnitude, iterations, momentum)?,
        };
        Ok(Waveform::new(samples, sample_rate))
    }

    /// Windowed overlap-add inverse of [`SpectrogramTransform::stft`].
    pub fn istft(&self, spec: &Array2<Complex32>) -> Result<Vec<f32>> {
        self.check_shape(spec.dim())?;
        let frames = spec.ncols();
        let full_len = self.n_fft + self.hop_length * (frames - 1);
        let mut audio = vec![0.0f32; full_len];
        let mut window_sum = vec![0.0f32; full_len];

        let mut spectrum = self.inverse.make_input_vec();
        let mut frame = self.inverse.make_output_vec();
        let scale = 1.0 / self.n_fft as f32;
        let last = spectrum.len() - 1;

        for t in 0..frames {
            spectrum
                .iter_mut()
                .zip(spec.column(t).iter())
                .for_each(|(dst, src)| *dst = *src);
            // c2r requires purely real DC and Nyquist bins.
            spectrum[0].im = 0.0;
            spectrum[last].im = 0.0;
            self.inverse
                .process(&mut spectrum, &mut frame)
                .map_err(|e| PipelineError::Shape(e.to_string()))?;

            let start = t * self.hop_length;
            for (i, &w) in self.window.iter().enumerate() {
                audio[start + i] += frame[i] * scale * w;
                window_sum[start + i] += w * w;
            }
        }

        for (sample, &norm) in audio.iter_mut().zip(window_sum.iter()) {
            if norm > f32::MIN_POSITIVE {
                *sample /= norm;
            }
        }

        let pad = self.n_fft / 2;
        Ok(audio[pad..full_len - pad].to_vec())
    }

    fn griffin_lim(
        &self,
        magnitude: &Spectrogram,
        iterations: usize,
        momentum: f32,
    ) -> Result<Vec<f32>> {
        let mut estimate = magnitude.mapv(|m| Complex32::new(m, 0.0));
        let mut previous = estimate.clone();

        for iter in 0..iterations {
            let audio = self.istft(&estimate)?;
            let rebuilt = self.stft(&audio)?;
            ndarray::Zip::from(&mut estimate)
                .and(&mut previous)
                .and(&rebuilt)
                .and(magnitude)
                .for_each(|est, prev, re, &mag| {
                    let projected = Complex32::from_polar(mag, re.arg());
                    *est = projected + (projected - *prev) * momentum;
                    *prev = projected;
                });
            tracing::trace!(iteration = iter + 1, "griffin-lim step");
        }
        self.istft(&estimate)
    }

    fn check_shape(&self, (rows, cols): (usize, usize)) -> Result<()> {
        if rows != self.n_bins() {
            return Err(PipelineError::Shape(format!(
                "expected {} frequency bins, got {rows}",
                self.n_bins()
            )));
        }
        if cols == 0 {
            return Err(PipelineError::Shape("spectrogram has no frames".into()));
        }
        Ok(())
    }
}

/// Periodic Hann window.
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / size as f32).cos())
        .collect()
}
