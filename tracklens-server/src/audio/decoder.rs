//! Audio file decoding
//!
//! Decodes any container/codec symphonia understands (WAV, MP3, FLAC,
//! OGG/Vorbis, ...) into mono f32 PCM at the file's native rate.

use std::path::Path;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::{debug, warn};

use super::resampler::SINC_LEN;
use super::AudioError;

/// Decoded audio result
#[derive(Debug)]
pub struct DecodedAudio {
    /// Mono audio samples (f32, range [-1.0, 1.0])
    pub samples: Vec<f32>,
    /// Native sample rate in Hz
    pub sample_rate: u32,
    /// Original channel count
    pub channels: usize,
}

/// Decode an audio file to mono f32 PCM samples.
///
/// Channels are averaged into a single mono channel. Packets that fail with
/// a recoverable decode error are skipped; anything else aborts the decode.
///
/// With `max_secs`, decoding stops once `ceil(max_secs * rate)` samples plus
/// one resampler filter length are available; the rest of the file is never
/// read.
///
/// # Errors
/// `AudioError::Decode` if the file cannot be opened or probed, has no audio
/// track, or yields no samples at all.
pub fn decode_audio_file(
    file_path: &Path,
    max_secs: Option<f64>,
) -> Result<DecodedAudio, AudioError> {
    debug!(path = %file_path.display(), "Decoding audio file");

    let fail = |reason: String| AudioError::decode(file_path, reason);

    let file = std::fs::File::open(file_path).map_err(|e| fail(format!("open failed: {}", e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = file_path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| fail(format!("unrecognized format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| fail("no audio track found".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| fail(format!("unsupported codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(fail(format!("error reading packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels = spec.channels.count();
                append_mono(&decoded, &mut samples);

                let limit = max_secs
                    .zip(sample_rate)
                    .map(|(secs, rate)| sample_limit(secs, rate));
                if let Some(limit) = limit.filter(|&l| samples.len() >= l) {
                    samples.truncate(limit);
                    debug!(path = %file_path.display(), limit, "Requested duration decoded");
                    break;
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(path = %file_path.display(), error = %e, "Skipping corrupt packet");
            }
            Err(e) => return Err(fail(format!("decode failed: {}", e))),
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| fail("sample rate unknown".to_string()))?;
    if samples.is_empty() {
        return Err(fail("no audio samples decoded".to_string()));
    }

    debug!(
        path = %file_path.display(),
        sample_rate,
        channels,
        total_samples = samples.len(),
        "Audio decoding complete"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Samples needed at `rate` to cover `secs`, plus resampler context
fn sample_limit(secs: f64, rate: u32) -> usize {
    (secs.max(0.0) * rate as f64).ceil() as usize + SINC_LEN
}

/// Average every channel of a decoded buffer into `out`
fn append_mono(decoded: &AudioBufferRef, out: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::U8(buf) => mix_down(&**buf, out),
        AudioBufferRef::U16(buf) => mix_down(&**buf, out),
        AudioBufferRef::U24(buf) => mix_down(&**buf, out),
        AudioBufferRef::U32(buf) => mix_down(&**buf, out),
        AudioBufferRef::S8(buf) => mix_down(&**buf, out),
        AudioBufferRef::S16(buf) => mix_down(&**buf, out),
        AudioBufferRef::S24(buf) => mix_down(&**buf, out),
        AudioBufferRef::S32(buf) => mix_down(&**buf, out),
        AudioBufferRef::F32(buf) => mix_down(&**buf, out),
        AudioBufferRef::F64(buf) => mix_down(&**buf, out),
    }
}

fn mix_down<S>(buf: &AudioBuffer<S>, out: &mut Vec<f32>)
where
    S: Sample,
    f32: FromSample<S>,
{
    let num_channels = buf.spec().channels.count();
    if num_channels == 0 {
        return;
    }

    let num_frames = buf.frames();
    out.reserve(num_frames);

    for frame_idx in 0..num_frames {
        let sum: f32 = (0..num_channels)
            .map(|ch| f32::from_sample(buf.chan(ch)[frame_idx]))
            .sum();
        out.push(sum / num_channels as f32);
    }
}
