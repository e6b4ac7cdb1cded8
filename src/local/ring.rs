//! Wait-free sample rings between cpal callbacks and blocking device calls.
//!
//! The callback side never locks, allocates or blocks. The relay side waits
//! for space or data by sleeping for as long as the missing samples take to
//! play or record.

use std::thread;
use std::time::Duration;

use bytes::Bytes;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::core::audio::PcmFormat;
use crate::core::relay::{RelayError, RelayResult};

/// Shortest single wait, so a nearly ready ring is not spun on.
const MIN_WAIT: Duration = Duration::from_millis(2);

/// Capture frames the ring holds before the callback starts dropping samples.
const CAPTURE_RING_FRAMES: usize = 8;

/// Time `samples` interleaved samples take in `format`.
fn samples_duration(samples: usize, format: PcmFormat) -> Duration {
    let per_second = (format.sample_rate as u64 * format.channels as u64).max(1);
    Duration::from_micros(samples as u64 * 1_000_000 / per_second).max(MIN_WAIT)
}

#[inline]
fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[inline]
fn to_f32(bytes: &[u8]) -> f32 {
    i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / i16::MAX as f32
}

// =============================================================================
// Playback
// =============================================================================

/// Create a playback ring holding `lead` of audio in `format`.
pub fn playback_ring(format: PcmFormat, lead: Duration) -> (PlaybackWriter, PlaybackReader) {
    let capacity = ((format.sample_rate as u128 * format.channels as u128 * lead.as_millis())
        / 1000)
        .max(1) as usize;
    let (producer, consumer) = RingBuffer::new(capacity);
    (
        PlaybackWriter {
            producer,
            format,
            capacity,
        },
        PlaybackReader { consumer },
    )
}

/// Relay side of the playback ring.
pub struct PlaybackWriter {
    producer: Producer<f32>,
    format: PcmFormat,
    capacity: usize,
}

impl PlaybackWriter {
    /// Queue 16-bit little-endian PCM, waiting while the ring is full.
    ///
    /// Fails once the reader is gone, i.e. the output stream stopped.
    pub fn write_pcm(&mut self, pcm: &[u8]) -> RelayResult<()> {
        let samples: Vec<f32> = pcm.chunks_exact(2).map(to_f32).collect();
        let mut rest = &samples[..];

        while !rest.is_empty() {
            if self.producer.is_abandoned() {
                return Err(RelayError::Device("playback stream stopped".to_string()));
            }

            let to_write = rest.len().min(self.producer.slots());
            if to_write == 0 {
                // Let roughly a quarter of the lead drain before retrying.
                let wait = (self.capacity / 4).clamp(1, rest.len());
                thread::sleep(samples_duration(wait, self.format));
                continue;
            }

            if let Ok(mut chunk) = self.producer.write_chunk(to_write) {
                let (first, second) = chunk.as_mut_slices();
                let split = first.len();
                first.copy_from_slice(&rest[..split]);
                second.copy_from_slice(&rest[split..to_write]);
                chunk.commit_all();
                rest = &rest[to_write..];
            }
        }
        Ok(())
    }

    /// Samples queued and not yet played.
    pub fn buffered(&self) -> usize {
        self.capacity - self.producer.slots()
    }
}

/// Output callback side of the playback ring.
pub struct PlaybackReader {
    consumer: Consumer<f32>,
}

impl PlaybackReader {
    /// Fill `out` from the ring, padding with silence on underrun.
    ///
    /// Returns how many samples came from the ring. Never blocks.
    pub fn fill(&mut self, out: &mut [f32]) -> usize {
        let to_read = out.len().min(self.consumer.slots());
        let mut read = 0;
        if to_read > 0 {
            if let Ok(chunk) = self.consumer.read_chunk(to_read) {
                let (first, second) = chunk.as_slices();
                out[..first.len()].copy_from_slice(first);
                out[first.len()..to_read].copy_from_slice(second);
                chunk.commit_all();
                read = to_read;
            }
        }
        out[read..].fill(0.0);
        read
    }
}

// =============================================================================
// Capture
// =============================================================================

/// Create a capture ring cutting frames of `frame_samples` samples.
pub fn capture_ring(format: PcmFormat, frame_samples: usize) -> (CaptureWriter, CaptureReader) {
    let frame_samples = frame_samples.max(1);
    let (producer, consumer) = RingBuffer::new(frame_samples * CAPTURE_RING_FRAMES);
    (
        CaptureWriter { producer },
        CaptureReader {
            consumer,
            format,
            frame_samples,
        },
    )
}

/// Input callback side of the capture ring.
pub struct CaptureWriter {
    producer: Producer<i16>,
}

impl CaptureWriter {
    /// Convert and queue callback samples. Samples that do not fit are
    /// dropped; returns how many were queued. Never blocks.
    pub fn push(&mut self, data: &[f32]) -> usize {
        let to_write = data.len().min(self.producer.slots());
        if to_write == 0 {
            return 0;
        }
        match self.producer.write_chunk(to_write) {
            Ok(mut chunk) => {
                let (first, second) = chunk.as_mut_slices();
                for (slot, sample) in first.iter_mut().chain(second.iter_mut()).zip(data) {
                    *slot = to_i16(*sample);
                }
                chunk.commit_all();
                to_write
            }
            Err(_) => 0,
        }
    }
}

/// Relay side of the capture ring.
pub struct CaptureReader {
    consumer: Consumer<i16>,
    format: PcmFormat,
    frame_samples: usize,
}

impl CaptureReader {
    /// Wait for one whole frame of 16-bit little-endian PCM.
    ///
    /// Returns `None` once the writer is gone and less than a frame remains.
    pub fn read_frame(&mut self) -> Option<Bytes> {
        loop {
            // Checked before `slots` so samples pushed right before the
            // writer went away are still read.
            let abandoned = self.consumer.is_abandoned();
            let available = self.consumer.slots();

            if available >= self.frame_samples {
                if let Ok(chunk) = self.consumer.read_chunk(self.frame_samples) {
                    let (first, second) = chunk.as_slices();
                    let mut frame = Vec::with_capacity(self.frame_samples * 2);
                    for sample in first.iter().chain(second) {
                        frame.extend_from_slice(&sample.to_le_bytes());
                    }
                    chunk.commit_all();
                    return Some(Bytes::from(frame));
                }
            } else if abandoned {
                return None;
            } else {
                let missing = self.frame_samples - available;
                thread::sleep(samples_duration(missing, self.format));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_playback_fill_pads_with_silence() {
        let (mut writer, mut reader) = playback_ring(PcmFormat::PLAYBACK, Duration::from_millis(10));
        writer.write_pcm(&pcm(&[i16::MAX, i16::MAX])).unwrap();
        assert_eq!(writer.buffered(), 2);

        let mut out = [0.5f32; 4];
        assert_eq!(reader.fill(&mut out), 2);
        assert_eq!(out, [1.0, 1.0, 0.0, 0.0]);
        assert_eq!(writer.buffered(), 0);
    }

    #[test]
    fn test_playback_write_waits_for_room() {
        // 1ms at 24kHz holds 24 samples; write 48.
        let (mut writer, mut reader) = playback_ring(PcmFormat::PLAYBACK, Duration::from_millis(1));
        let drain = thread::spawn(move || {
            let mut played = 0;
            let mut out = [0f32; 8];
            while played < 48 {
                played += reader.fill(&mut out);
                thread::sleep(Duration::from_millis(1));
            }
            played
        });

        writer.write_pcm(&pcm(&[1000; 48])).unwrap();
        assert_eq!(drain.join().unwrap(), 48);
    }

    #[test]
    fn test_playback_write_fails_after_stream_stops() {
        let (mut writer, reader) = playback_ring(PcmFormat::PLAYBACK, Duration::from_millis(1));
        drop(reader);
        assert!(matches!(
            writer.write_pcm(&pcm(&[1; 4])),
            Err(RelayError::Device(_))
        ));
    }

    #[test]
    fn test_capture_cuts_ordered_frames() {
        let (mut writer, mut reader) = capture_ring(PcmFormat::CAPTURE, 2);
        assert_eq!(writer.push(&[1.0, -1.0, 0.0]), 3);
        writer.push(&[1.0]);

        assert_eq!(reader.read_frame().unwrap(), Bytes::from(pcm(&[i16::MAX, -i16::MAX])));
        assert_eq!(reader.read_frame().unwrap(), Bytes::from(pcm(&[0, i16::MAX])));
    }

    #[test]
    fn test_capture_drops_samples_when_full() {
        let (mut writer, _reader) = capture_ring(PcmFormat::CAPTURE, 1);
        let burst = [0.1f32; CAPTURE_RING_FRAMES + 3];
        assert_eq!(writer.push(&burst), CAPTURE_RING_FRAMES);
        assert_eq!(writer.push(&burst), 0);
    }

    #[test]
    fn test_capture_reader_ends_with_writer() {
        let (mut writer, mut reader) = capture_ring(PcmFormat::CAPTURE, 4);
        writer.push(&[0.5; 6]);
        drop(writer);

        assert_eq!(reader.read_frame().map(|f| f.len()), Some(8));
        // Two leftover samples never make a frame.
        assert!(reader.read_frame().is_none());
    }

    #[test]
    fn test_capture_reader_waits_for_frame() {
        let (mut writer, mut reader) = capture_ring(PcmFormat::CAPTURE, 160);
        let started = Instant::now();
        let feeder = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.push(&[0.0; 160]);
            writer
        });

        assert_eq!(reader.read_frame().map(|f| f.len()), Some(320));
        assert!(started.elapsed() >= Duration::from_millis(20));
        drop(feeder.join().unwrap());
    }
}
