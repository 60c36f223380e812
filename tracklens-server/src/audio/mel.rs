//! Power mel spectrogram in decibels
//!
//! Matches the classifier's training front-end: periodic Hann window,
//! centered frames with reflect padding, power spectrum, HTK mel filterbank
//! without area normalization, then `10 * log10(max(x, 1e-10))`.

use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Floor applied before converting power to decibels
const AMIN: f32 = 1e-10;

/// Mel spectrogram parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MelConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
}

/// Reusable mel spectrogram transform (window, filterbank and FFT plan are
/// built once)
pub struct MelSpectrogram {
    config: MelConfig,
    window: Vec<f32>,
    /// `n_mels` rows of `n_fft / 2 + 1` weights
    filterbank: Array2<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for MelSpectrogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MelSpectrogram")
            .field("config", &self.config)
            .finish()
    }
}

impl MelSpectrogram {
    pub fn new(config: MelConfig) -> Self {
        let window = hann_window(config.n_fft);
        let filterbank = mel_filterbank(config.sample_rate, config.n_fft, config.n_mels);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(config.n_fft);
        Self {
            config,
            window,
            filterbank,
            fft,
        }
    }

    /// Number of frames produced for a signal of `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        1 + len / self.config.hop_length
    }

    /// Compute the `(n_mels, frames)` spectrogram in dB.
    pub fn compute(&self, samples: &[f32]) -> Array2<f32> {
        let n_fft = self.config.n_fft;
        let n_freqs = n_fft / 2 + 1;
        let padded = reflect_pad(samples, n_fft / 2);
        let frames = self.frame_count(samples.len());

        let mut power = Array2::<f32>::zeros((n_freqs, frames));
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];

        for frame in 0..frames {
            let start = frame * self.config.hop_length;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let sample = padded.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(sample * self.window[i], 0.0);
            }
            self.fft.process(&mut buffer);
            for (bin, value) in buffer.iter().take(n_freqs).enumerate() {
                power[[bin, frame]] = value.norm_sqr();
            }
        }

        let mut mel = self.filterbank.dot(&power);
        mel.mapv_inplace(|p| 10.0 * p.max(AMIN).log10());
        mel
    }
}

/// Periodic Hann window
fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / len as f32).cos())
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular HTK filterbank spanning 0 Hz to Nyquist, shape `(n_mels, n_fft / 2 + 1)`
fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Array2<f32> {
    let n_freqs = n_fft / 2 + 1;
    let nyquist = (sample_rate / 2) as f32;

    let bin_freqs: Vec<f32> = (0..n_freqs)
        .map(|i| {
            if n_freqs == 1 {
                0.0
            } else {
                nyquist * i as f32 / (n_freqs - 1) as f32
            }
        })
        .collect();

    let mel_max = hz_to_mel(nyquist);
    let edges: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect();

    let mut bank = Array2::<f32>::zeros((n_mels, n_freqs));
    for m in 0..n_mels {
        let (lower, center, upper) = (edges[m], edges[m + 1], edges[m + 2]);
        for (k, &freq) in bin_freqs.iter().enumerate() {
            let rising = (freq - lower) / (center - lower);
            let falling = (upper - freq) / (upper - center);
            bank[[m, k]] = rising.min(falling).max(0.0);
        }
    }
    bank
}

/// Mirror `pad` samples at both ends without repeating the edge sample.
/// Falls back to zero padding when the signal is too short to mirror.
fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    let len = samples.len();
    let mut out = Vec::with_capacity(len + 2 * pad);

    if len <= pad {
        out.resize(pad, 0.0);
        out.extend_from_slice(samples);
        out.resize(len + 2 * pad, 0.0);
        return out;
    }

    out.extend((1..=pad).rev().map(|i| samples[i]));
    out.extend_from_slice(samples);
    out.extend((1..=pad).map(|i| samples[len - 1 - i]));
    out
}
