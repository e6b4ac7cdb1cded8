//! Audio frame and PCM format primitives shared by the relay and the Live client.
//!
//! All audio moving through the gateway is raw PCM 16-bit signed
//! little-endian, mono. Capture runs at 16kHz and playback at 24kHz.

use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// Capture sample rate expected by the Live API for realtime input.
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Sample rate of audio synthesized by the Live API.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Samples per frame read from a capture device.
pub const CAPTURE_FRAME_SAMPLES: usize = 1024;

/// MIME type for raw PCM audio.
pub const PCM_MIME_TYPE: &str = "audio/pcm";

/// Media type tag carried by every audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// Raw 16-bit signed PCM, optionally annotated with its sample rate.
    Pcm { rate: Option<u32> },
}

impl MediaType {
    /// Parse a MIME string such as `audio/pcm` or `audio/pcm;rate=24000`.
    ///
    /// Returns `None` for anything that is not raw PCM audio.
    pub fn parse(mime: &str) -> Option<Self> {
        let mut parts = mime.split(';').map(str::trim);
        let essence = parts.next()?;
        if !essence.eq_ignore_ascii_case(PCM_MIME_TYPE) {
            return None;
        }

        let mut rate = None;
        for param in parts {
            if let Some((key, value)) = param.split_once('=')
                && key.trim().eq_ignore_ascii_case("rate")
            {
                rate = Some(value.trim().parse().ok()?);
            }
        }

        Some(MediaType::Pcm { rate })
    }

    /// Render as a MIME string.
    pub fn as_mime(&self) -> String {
        match self {
            MediaType::Pcm { rate: Some(rate) } => format!("{PCM_MIME_TYPE};rate={rate}"),
            MediaType::Pcm { rate: None } => PCM_MIME_TYPE.to_string(),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_mime())
    }
}

/// One discrete chunk of audio plus its media type.
///
/// `Bytes` is reference counted, so cloning a frame never copies the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    payload: Bytes,
    media_type: MediaType,
}

impl AudioFrame {
    pub fn new(payload: impl Into<Bytes>, media_type: MediaType) -> Self {
        Self {
            payload: payload.into(),
            media_type,
        }
    }

    /// Raw PCM frame without an explicit rate annotation.
    pub fn pcm(payload: impl Into<Bytes>) -> Self {
        Self::new(payload, MediaType::Pcm { rate: None })
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Fixed PCM layout used to derive playback timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: u16,
}

impl PcmFormat {
    /// 16kHz mono 16-bit, the capture format.
    pub const CAPTURE: PcmFormat = PcmFormat {
        sample_rate: CAPTURE_SAMPLE_RATE,
        channels: 1,
        bytes_per_sample: 2,
    };

    /// 24kHz mono 16-bit, the playback format.
    pub const PLAYBACK: PcmFormat = PcmFormat {
        sample_rate: PLAYBACK_SAMPLE_RATE,
        channels: 1,
        bytes_per_sample: 2,
    };

    /// Bytes consumed per second of audio.
    #[inline]
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * self.bytes_per_sample as u64
    }

    /// Real playback duration of `byte_len` bytes in this format.
    pub fn playback_duration(&self, byte_len: usize) -> Duration {
        let byte_rate = self.byte_rate();
        if byte_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = byte_len as u128 * 1_000_000_000 / byte_rate as u128;
        Duration::from_nanos(nanos as u64)
    }

    /// Size in bytes of a frame holding `samples` samples per channel.
    pub fn frame_bytes(&self, samples: usize) -> usize {
        samples * self.channels as usize * self.bytes_per_sample as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_parse_plain_pcm() {
        assert_eq!(
            MediaType::parse("audio/pcm"),
            Some(MediaType::Pcm { rate: None })
        );
        assert_eq!(
            MediaType::parse("AUDIO/PCM"),
            Some(MediaType::Pcm { rate: None })
        );
    }

    #[test]
    fn test_media_type_parse_with_rate() {
        assert_eq!(
            MediaType::parse("audio/pcm;rate=24000"),
            Some(MediaType::Pcm { rate: Some(24000) })
        );
        assert_eq!(
            MediaType::parse("audio/pcm; rate=16000"),
            Some(MediaType::Pcm { rate: Some(16000) })
        );
    }

    #[test]
    fn test_media_type_rejects_other_types() {
        assert_eq!(MediaType::parse("image/jpeg"), None);
        assert_eq!(MediaType::parse("audio/pcm;rate=fast"), None);
        assert_eq!(MediaType::parse(""), None);
    }

    #[test]
    fn test_media_type_as_mime() {
        assert_eq!(MediaType::Pcm { rate: None }.as_mime(), "audio/pcm");
        assert_eq!(
            MediaType::Pcm { rate: Some(16000) }.to_string(),
            "audio/pcm;rate=16000"
        );
    }

    #[test]
    fn test_playback_duration() {
        assert_eq!(
            PcmFormat::PLAYBACK.playback_duration(48000),
            Duration::from_secs(1)
        );
        assert_eq!(
            PcmFormat::PLAYBACK.playback_duration(4800),
            Duration::from_millis(100)
        );
        assert_eq!(PcmFormat::PLAYBACK.playback_duration(0), Duration::ZERO);
    }

    #[test]
    fn test_capture_frame_bytes() {
        assert_eq!(PcmFormat::CAPTURE.frame_bytes(CAPTURE_FRAME_SAMPLES), 2048);
    }
}
