//! Band-limited sample rate conversion using rubato

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

use super::AudioError;

/// Sinc filter length; the input is padded by this many zeros so the
/// filter's output delay can be trimmed without losing the tail.
pub(crate) const SINC_LEN: usize = 256;

/// Resample a mono signal from `from_rate` to `to_rate`.
///
/// The output is time-aligned with the input (resampler delay removed) and
/// holds exactly `round(input.len() * to_rate / from_rate)` samples.
/// Returns a copy when the rates already match.
pub fn resample_mono(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::Resample(format!(
            "invalid sample rates {} -> {}",
            from_rate, to_rate
        )));
    }

    if from_rate == to_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (input.len() as f64 * ratio).round() as usize;

    debug!(
        from_rate,
        to_rate,
        input_samples = input.len(),
        "Resampling"
    );

    let mut padded = Vec::with_capacity(input.len() + SINC_LEN);
    padded.extend_from_slice(input);
    padded.resize(input.len() + SINC_LEN, 0.0);

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, padded.len(), 1)
        .map_err(|e| AudioError::Resample(format!("failed to create resampler: {}", e)))?;

    let delay = resampler.output_delay();

    let mut planar = resampler
        .process(&[padded.as_slice()], None)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    let channel = planar.pop().unwrap_or_default();
    let mut output: Vec<f32> = channel.into_iter().skip(delay).take(expected).collect();
    output.resize(expected, 0.0);

    Ok(output)
}
