//! Audio decode stage.
//!
//! Turns one coded Opus packet into one planar-float PCM frame at 48 kHz
//! and forwards it to the frame sink. The sink call is synchronous and runs
//! on the decode task; sinks enqueue and return.

use std::sync::Arc;

use ac_ffmpeg::codec::audio::AudioFrame;
use log::{error, warn};

use super::clock::MediaClock;
use super::MAX_CONSECUTIVE_DECODE_FAILURES;
use crate::codec::audio::{CHANNELS, SAMPLE_RATE};
use crate::codec::{CodecUnit, CodedPacket, OpusCodecUnit};
use crate::error::CodecError;
use crate::sink::{AudioFrameRef, FrameSink};

/// Headroom for the reusable PCM buffer: two seconds of stereo output.
/// A single decode call always yields far less; the headroom is not a cap.
const SCRATCH_SAMPLES: usize = SAMPLE_RATE as usize * CHANNELS as usize * 2;

/// Per-session Opus decode pipeline producing 48 kHz planar float frames.
pub struct AudioDecodeStage {
    unit: Box<dyn CodecUnit<Frame = AudioFrame>>,
    /// Reusable planar output: left samples first, right samples after.
    scratch: Vec<f32>,
    sink: Arc<dyn FrameSink>,
    clock: MediaClock,
    consecutive_failures: u32,
}

impl AudioDecodeStage {
    /// Create a stage with the default FFmpeg Opus codec unit.
    pub fn new(sink: Arc<dyn FrameSink>, clock: MediaClock) -> Result<Self, CodecError> {
        let unit = OpusCodecUnit::open()?;
        Ok(Self::from_unit(Box::new(unit), sink, clock))
    }

    /// Create a stage around a custom codec unit.
    pub fn from_unit(
        unit: Box<dyn CodecUnit<Frame = AudioFrame>>,
        sink: Arc<dyn FrameSink>,
        clock: MediaClock,
    ) -> Self {
        Self {
            unit,
            scratch: vec![0.0f32; SCRATCH_SAMPLES],
            sink,
            clock,
            consecutive_failures: 0,
        }
    }

    /// Decode one coded packet and forward the resulting PCM frame, if any.
    ///
    /// Same contract as the video stage: `true` covers both a delivered
    /// frame and "need more data"; `false` means the stage failed fatally
    /// and must be recreated.
    pub fn decode(&mut self, packet: &CodedPacket) -> bool {
        match self.unit.decode(packet) {
            Ok(Some(frame)) => match self.publish(&frame) {
                Ok(()) => {
                    self.consecutive_failures = 0;
                    true
                }
                Err(e) => self.record_failure(e),
            },
            Ok(None) => {
                self.consecutive_failures = 0;
                true
            }
            Err(e) if e.is_fatal() => {
                error!("audio stage: {}", e);
                false
            }
            Err(e) => self.record_failure(e),
        }
    }

    fn record_failure(&mut self, e: CodecError) -> bool {
        self.consecutive_failures += 1;
        warn!(
            "audio stage: {} ({} consecutive)",
            e, self.consecutive_failures
        );
        if self.consecutive_failures >= MAX_CONSECUTIVE_DECODE_FAILURES {
            error!(
                "audio stage: {} contiguous decode failures, stage must be recreated",
                self.consecutive_failures
            );
            false
        } else {
            true
        }
    }

    fn publish(&mut self, frame: &AudioFrame) -> Result<(), CodecError> {
        let samples = frame.samples();
        if samples == 0 {
            return Ok(());
        }

        let needed = samples * 2;
        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0.0);
        }

        let planes = frame.planes();
        let stereo = planes.len() >= 2;
        let (left, right) = self.scratch.split_at_mut(samples);

        copy_plane_f32(&mut left[..samples], planes[0].data(), samples)?;
        if stereo {
            copy_plane_f32(&mut right[..samples], planes[1].data(), samples)?;
        }

        let frame_ref = AudioFrameRef {
            planes: [
                Some(&left[..samples]),
                if stereo { Some(&right[..samples]) } else { None },
            ],
            frame_count: samples,
            sample_rate: SAMPLE_RATE,
            channel_count: if stereo { 2 } else { 1 },
            timestamp: self.clock.now(),
        };

        self.sink.on_audio_frame(&frame_ref);
        Ok(())
    }
}

impl Drop for AudioDecodeStage {
    fn drop(&mut self) {
        self.unit.close();
    }
}

/// Reinterpret one planar float plane and copy `samples` values out.
fn copy_plane_f32(dst: &mut [f32], plane: &[u8], samples: usize) -> Result<(), CodecError> {
    let needed_bytes = samples * std::mem::size_of::<f32>();
    if plane.len() < needed_bytes {
        return Err(CodecError::DecodeFailed(format!(
            "audio plane too small ({} bytes for {} samples)",
            plane.len(),
            samples
        )));
    }

    let bytes = &plane[..needed_bytes];
    let (head, aligned, _) = unsafe { bytes.align_to::<f32>() };
    if head.is_empty() && aligned.len() == samples {
        dst.copy_from_slice(aligned);
    } else {
        // Plane start is not 4-byte aligned; copy sample by sample.
        for (out, chunk) in dst.iter_mut().zip(bytes.chunks_exact(4)) {
            *out = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::clock::Timestamp;
    use crate::surface::SharedSurface;
    use ac_ffmpeg::codec::audio::frame::get_sample_format;
    use ac_ffmpeg::codec::audio::{AudioFrameMut, ChannelLayout};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn pcm_frame(channels: u32, samples: usize) -> AudioFrame {
        AudioFrameMut::silence(
            &ChannelLayout::from_channels(channels).unwrap(),
            get_sample_format("fltp"),
            SAMPLE_RATE,
            samples,
        )
        .freeze()
    }

    struct ScriptedUnit {
        script: VecDeque<Result<Option<AudioFrame>, CodecError>>,
    }

    // Scripted frames never leave the test thread.
    unsafe impl Send for ScriptedUnit {}

    impl ScriptedUnit {
        fn new(script: Vec<Result<Option<AudioFrame>, CodecError>>) -> Box<Self> {
            Box::new(Self {
                script: script.into(),
            })
        }
    }

    impl CodecUnit for ScriptedUnit {
        type Frame = AudioFrame;

        fn decode(&mut self, _packet: &CodedPacket) -> Result<Option<AudioFrame>, CodecError> {
            self.script.pop_front().unwrap_or(Ok(None))
        }

        fn close(&mut self) {}
    }

    #[derive(Default)]
    struct CountingSink {
        frames: Mutex<Vec<(usize, u32, u16, bool)>>,
    }

    impl FrameSink for CountingSink {
        fn on_video_frame(&self, _s: &SharedSurface, _w: u32, _h: u32, _pts: Timestamp) {}

        fn on_audio_frame(&self, frame: &AudioFrameRef<'_>) {
            assert!(frame.planes[0].is_some());
            self.frames.lock().unwrap().push((
                frame.frame_count,
                frame.sample_rate,
                frame.channel_count,
                frame.planes[1].is_some(),
            ));
        }
    }

    fn packet() -> CodedPacket {
        CodedPacket::new(bytes::Bytes::from_static(&[0xfc, 0xff, 0xfe]))
    }

    #[test]
    fn stereo_frame_reaches_the_sink() {
        let sink = Arc::new(CountingSink::default());
        let mut stage = AudioDecodeStage::from_unit(
            ScriptedUnit::new(vec![Ok(Some(pcm_frame(2, 240)))]),
            sink.clone(),
            MediaClock::new(),
        );

        assert!(stage.decode(&packet()));
        assert_eq!(
            sink.frames.lock().unwrap().as_slice(),
            &[(240, 48_000, 2, true)]
        );
    }

    #[test]
    fn mono_fallback_leaves_second_plane_unset() {
        let sink = Arc::new(CountingSink::default());
        let mut stage = AudioDecodeStage::from_unit(
            ScriptedUnit::new(vec![Ok(Some(pcm_frame(1, 480)))]),
            sink.clone(),
            MediaClock::new(),
        );

        assert!(stage.decode(&packet()));
        assert_eq!(
            sink.frames.lock().unwrap().as_slice(),
            &[(480, 48_000, 1, false)]
        );
    }

    #[test]
    fn buffering_decoder_is_not_an_error() {
        let sink = Arc::new(CountingSink::default());
        let mut stage = AudioDecodeStage::from_unit(
            ScriptedUnit::new(vec![Ok(None)]),
            sink.clone(),
            MediaClock::new(),
        );

        assert!(stage.decode(&packet()));
        assert!(sink.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn unaligned_plane_bytes_copy_correctly() {
        let samples = [0.25f32, -1.5, 3.0];
        // One padding byte up front forces the misaligned path.
        let mut raw = vec![0u8];
        for s in samples {
            raw.extend_from_slice(&s.to_ne_bytes());
        }

        let mut dst = [0.0f32; 3];
        copy_plane_f32(&mut dst, &raw[1..], 3).unwrap();
        assert_eq!(dst, samples);
    }

    #[test]
    fn plane_shorter_than_frame_is_a_decode_failure() {
        let mut dst = [0.0f32; 4];
        let err = copy_plane_f32(&mut dst, &[0u8; 8], 4).unwrap_err();
        assert!(matches!(err, CodecError::DecodeFailed(_)));
    }

    #[test]
    fn failure_threshold_marks_the_stage_fatal() {
        let sink = Arc::new(CountingSink::default());
        let script = (0..MAX_CONSECUTIVE_DECODE_FAILURES)
            .map(|_| Err(CodecError::DecodeFailed("bad packet".into())))
            .collect();
        let mut stage =
            AudioDecodeStage::from_unit(ScriptedUnit::new(script), sink, MediaClock::new());

        for _ in 0..MAX_CONSECUTIVE_DECODE_FAILURES - 1 {
            assert!(stage.decode(&packet()));
        }
        assert!(!stage.decode(&packet()));
    }
}
