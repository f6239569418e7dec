use std::io::Cursor;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{ParleyError, Result};

/// Decoded audio ready for scheduling: mono samples at `sample_rate`.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundAudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Channel count of the payload before it was mixed down.
    pub source_channels: u16,
}

impl InboundAudioChunk {
    #[must_use]
    pub const fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            source_channels: 1,
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = (self.samples.len() as u64).saturating_mul(1_000_000_000);
        Duration::from_nanos(nanos / u64::from(self.sample_rate))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Headerless 16-bit signed little-endian PCM.
    Pcm16,
    Wav,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub encoding: Encoding,
    pub sample_rate: u32,
    pub channels: u16,
}

/// MIME type announced for outbound capture frames.
#[must_use]
pub fn pcm_mime(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Parse a MIME type such as `audio/pcm;rate=24000`.
///
/// PCM without a `rate=` parameter is assumed to be at `default_rate`.
pub fn parse_mime(mime_type: &str, default_rate: u32) -> Result<AudioFormat> {
    let mut parts = mime_type.split(';').map(str::trim);
    let essence = parts.next().unwrap_or_default().to_ascii_lowercase();

    let encoding = match essence.as_str() {
        "audio/pcm" | "audio/l16" | "audio/raw" => Encoding::Pcm16,
        "audio/wav" | "audio/x-wav" | "audio/wave" => Encoding::Wav,
        other => {
            return Err(ParleyError::Codec(format!(
                "unsupported audio MIME type: {other:?}"
            )));
        }
    };

    let mut format = AudioFormat {
        encoding,
        sample_rate: default_rate,
        channels: 1,
    };

    for param in parts {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "rate" => {
                format.sample_rate = value.trim().parse().map_err(|e| {
                    ParleyError::Codec(format!("invalid rate parameter {value:?}: {e}"))
                })?;
            }
            "channels" => {
                format.channels = value.trim().parse().map_err(|e| {
                    ParleyError::Codec(format!("invalid channels parameter {value:?}: {e}"))
                })?;
            }
            _ => {}
        }
    }

    if format.sample_rate == 0 || format.channels == 0 {
        return Err(ParleyError::Codec(format!(
            "degenerate audio format in {mime_type:?}"
        )));
    }

    Ok(format)
}

/// Convert normalized samples to base64-framed 16-bit little-endian PCM.
#[must_use]
pub fn encode(samples: &[f32]) -> String {
    BASE64.encode(to_pcm16(samples))
}

fn to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * f32::from(i16::MAX)) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a base64 audio payload into mono samples.
pub fn decode(data: &str, mime_type: &str, default_rate: u32) -> Result<InboundAudioChunk> {
    let format = parse_mime(mime_type, default_rate)?;
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|e| ParleyError::Codec(format!("invalid base64 audio payload: {e}")))?;

    match format.encoding {
        Encoding::Pcm16 => decode_pcm16(&bytes, format),
        Encoding::Wav => decode_wav(&bytes),
    }
}

fn decode_pcm16(bytes: &[u8], format: AudioFormat) -> Result<InboundAudioChunk> {
    if bytes.len() % 2 != 0 {
        return Err(ParleyError::Codec(format!(
            "truncated PCM payload: {} bytes is not a whole number of samples",
            bytes.len()
        )));
    }

    let interleaved: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            (f32::from(sample) / f32::from(i16::MAX)).clamp(-1.0, 1.0)
        })
        .collect();

    let channels = usize::from(format.channels);
    if interleaved.len() % channels != 0 {
        return Err(ParleyError::Codec(format!(
            "truncated PCM payload: {} samples across {channels} channels",
            interleaved.len()
        )));
    }

    Ok(InboundAudioChunk {
        samples: downmix(&interleaved, format.channels),
        sample_rate: format.sample_rate,
        source_channels: format.channels,
    })
}

fn decode_wav(bytes: &[u8]) -> Result<InboundAudioChunk> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| ParleyError::Codec(format!("invalid WAV payload: {e}")))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = if spec.sample_format == hound::SampleFormat::Float {
        reader
            .into_samples::<f32>()
            .map(|s| s.map_err(|e| ParleyError::Codec(format!("WAV read error: {e}"))))
            .collect::<Result<Vec<f32>>>()?
    } else {
        let scale = (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
        reader
            .into_samples::<i32>()
            .map(|s| {
                s.map(|v| (v as f32 / scale).clamp(-1.0, 1.0))
                    .map_err(|e| ParleyError::Codec(format!("WAV read error: {e}")))
            })
            .collect::<Result<Vec<f32>>>()?
    };

    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(ParleyError::Codec("degenerate WAV header".to_string()));
    }

    Ok(InboundAudioChunk {
        samples: downmix(&interleaved, spec.channels),
        sample_rate: spec.sample_rate,
        source_channels: spec.channels,
    })
}

/// Average interleaved channels into one.
#[must_use]
pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let ch = usize::from(channels);
    interleaved
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_payload(samples: &[i16]) -> String {
        let mut bytes = Vec::new();
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        BASE64.encode(bytes)
    }

    #[test]
    fn encode_writes_little_endian_i16() {
        let encoded = encode(&[0.0, 1.0, -1.0]);
        let bytes = BASE64.decode(encoded).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(bytes, vec![0x00, 0x00, 0xFF, 0x7F, 0x01, 0x80]);
    }

    #[test]
    fn encode_clamps_out_of_range() {
        let clamped = encode(&[1.5, -1.5]);
        assert_eq!(clamped, encode(&[1.0, -1.0]));
    }

    #[test]
    fn decode_uses_rate_from_mime() {
        let chunk = decode(&pcm_payload(&[0, 16384, -16384]), "audio/pcm;rate=24000", 16000)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(chunk.sample_rate, 24000);
        assert_eq!(chunk.samples.len(), 3);
        assert!((chunk.samples[1] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn decode_defaults_rate_when_absent() {
        let chunk =
            decode(&pcm_payload(&[0; 240]), "audio/pcm", 24000).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(chunk.sample_rate, 24000);
        assert_eq!(chunk.duration(), Duration::from_millis(10));
    }

    #[test]
    fn decode_mixes_stereo_to_mono() {
        let chunk = decode(
            &pcm_payload(&[16384, 0, -16384, -16384]),
            "audio/L16; rate=8000; channels=2",
            24000,
        )
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(chunk.source_channels, 2);
        assert_eq!(chunk.samples.len(), 2);
        assert!((chunk.samples[0] - 0.25).abs() < 1e-3);
        assert!((chunk.samples[1] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn odd_byte_count_is_truncated() {
        let payload = BASE64.encode([0u8, 1, 2]);
        let err = decode(&payload, "audio/pcm", 24000).unwrap_err();
        assert!(matches!(err, ParleyError::Codec(_)));
    }

    #[test]
    fn invalid_base64_is_codec_error() {
        let err = decode("not base64!!", "audio/pcm", 24000).unwrap_err();
        assert!(matches!(err, ParleyError::Codec(_)));
    }

    #[test]
    fn unknown_mime_is_codec_error() {
        let err = decode(&pcm_payload(&[0]), "audio/ogg", 24000).unwrap_err();
        assert!(err.to_string().contains("unsupported audio MIME type"));
    }

    #[test]
    fn bad_rate_parameter_is_codec_error() {
        assert!(parse_mime("audio/pcm;rate=fast", 24000).is_err());
        assert!(parse_mime("audio/pcm;rate=0", 24000).is_err());
    }

    #[test]
    fn decode_wav_payload() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).unwrap_or_else(|e| panic!("{e}"));
            for s in [0i16, i16::MAX / 2, i16::MIN / 2] {
                writer.write_sample(s).unwrap_or_else(|e| panic!("{e}"));
            }
            writer.finalize().unwrap_or_else(|e| panic!("{e}"));
        }
        let payload = BASE64.encode(cursor.into_inner());

        let chunk = decode(&payload, "audio/wav", 24000).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(chunk.sample_rate, 22050);
        assert_eq!(chunk.samples.len(), 3);
        assert!((chunk.samples[1] - 0.5).abs() < 1e-3);
        assert!((chunk.samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn encoded_frame_decodes_to_same_length() {
        let samples: Vec<f32> = (0..4096).map(|i| (i as f32 / 100.0).sin() * 0.5).collect();
        let chunk = decode(&encode(&samples), &pcm_mime(16000), 24000)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(chunk.samples.len(), samples.len());
        assert_eq!(chunk.sample_rate, 16000);
    }
}
