//! Video decode stage.
//!
//! Turns one coded H.264 packet into one RGBA frame at the session's
//! negotiated geometry and publishes it to the shared surface. Conversion
//! happens into a private reusable buffer; the surface lock is held only for
//! the upload copy.

use std::sync::Arc;

use ac_ffmpeg::codec::video::frame::get_pixel_format;
use ac_ffmpeg::codec::video::scaler::{Algorithm, VideoFrameScaler};
use ac_ffmpeg::codec::video::{PixelFormat, VideoFrame};
use log::{error, info, warn};

use super::clock::MediaClock;
use super::MAX_CONSECUTIVE_DECODE_FAILURES;
use crate::codec::{CodecUnit, CodedPacket, H264CodecUnit};
use crate::error::CodecError;
use crate::sink::FrameSink;
use crate::surface::SharedSurface;

/// Scale/convert context caching the last-seen source geometry.
///
/// Decoded dimensions may differ from the negotiated ones and may change
/// mid-stream; the context is rebuilt whenever they do.
struct RgbaConverter {
    scaler: VideoFrameScaler,
    src_width: usize,
    src_height: usize,
}

// The scaler context is only ever touched from the decode task.
unsafe impl Send for RgbaConverter {}

impl RgbaConverter {
    fn new(
        src_format: PixelFormat,
        src_width: usize,
        src_height: usize,
        dst_width: usize,
        dst_height: usize,
    ) -> Result<Self, CodecError> {
        let scaler = VideoFrameScaler::builder()
            .source_pixel_format(src_format)
            .source_width(src_width)
            .source_height(src_height)
            .target_pixel_format(get_pixel_format("rgba"))
            .target_width(dst_width)
            .target_height(dst_height)
            .algorithm(Algorithm::Bilinear)
            .build()
            .map_err(|e| CodecError::ConversionFailed(e.to_string()))?;

        Ok(Self {
            scaler,
            src_width,
            src_height,
        })
    }

    fn matches(&self, src_width: usize, src_height: usize) -> bool {
        self.src_width == src_width && self.src_height == src_height
    }

    /// Scale and convert one decoded frame into the interleaved RGBA buffer.
    fn convert(
        &mut self,
        frame: &VideoFrame,
        out: &mut [u8],
        dst_width: usize,
        dst_height: usize,
    ) -> Result<(), CodecError> {
        let scaled = self
            .scaler
            .scale(frame)
            .map_err(|e| CodecError::ConversionFailed(e.to_string()))?;

        let plane = &scaled.planes()[0];
        extract_plane(out, plane.data(), plane.line_size(), dst_width * 4, dst_height);
        Ok(())
    }
}

/// Extract a plane from padded source to contiguous destination.
#[inline]
fn extract_plane(dst: &mut [u8], src: &[u8], stride: usize, row_bytes: usize, height: usize) {
    // Fast path: no stride padding.
    if stride == row_bytes && src.len() >= row_bytes * height {
        dst[..row_bytes * height].copy_from_slice(&src[..row_bytes * height]);
        return;
    }

    for r in 0..height {
        let src_start = r * stride;
        let dst_start = r * row_bytes;
        if src_start + row_bytes > src.len() || dst_start + row_bytes > dst.len() {
            warn!(
                "rgba plane truncated at row {} of {} (stride {}, row bytes {})",
                r, height, stride, row_bytes
            );
            break;
        }
        dst[dst_start..dst_start + row_bytes]
            .copy_from_slice(&src[src_start..src_start + row_bytes]);
    }
}

/// Per-session H.264 decode pipeline: codec unit, format converter and the
/// reusable RGBA output buffer.
pub struct VideoDecodeStage {
    // Field order is the release order: converter, then codec unit, then the
    // output buffer once nothing references it.
    converter: Option<RgbaConverter>,
    unit: Box<dyn CodecUnit<Frame = VideoFrame>>,
    rgba: Vec<u8>,
    width: u32,
    height: u32,
    surface: SharedSurface,
    sink: Arc<dyn FrameSink>,
    clock: MediaClock,
    consecutive_failures: u32,
    converter_rebuilds: u64,
}

impl VideoDecodeStage {
    /// Create a stage decoding to `width`×`height` RGBA with the default
    /// FFmpeg H.264 codec unit.
    pub fn new(
        width: u32,
        height: u32,
        surface: SharedSurface,
        sink: Arc<dyn FrameSink>,
        clock: MediaClock,
    ) -> Result<Self, CodecError> {
        let unit = H264CodecUnit::open(width, height)?;
        Ok(Self::from_unit(Box::new(unit), width, height, surface, sink, clock))
    }

    /// Create a stage around a custom codec unit.
    pub fn from_unit(
        unit: Box<dyn CodecUnit<Frame = VideoFrame>>,
        width: u32,
        height: u32,
        surface: SharedSurface,
        sink: Arc<dyn FrameSink>,
        clock: MediaClock,
    ) -> Self {
        Self {
            converter: None,
            unit,
            rgba: vec![0u8; width as usize * height as usize * 4],
            width,
            height,
            surface,
            sink,
            clock,
            consecutive_failures: 0,
            converter_rebuilds: 0,
        }
    }

    /// The surface this stage publishes to.
    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    /// Decode one coded packet and publish the resulting frame, if any.
    ///
    /// Returns `true` both on a published frame and on "need more data";
    /// returns `false` only when the stage has failed fatally and must be
    /// recreated by its owner.
    pub fn decode(&mut self, packet: &CodedPacket) -> bool {
        match self.unit.decode(packet) {
            Ok(Some(frame)) => {
                self.consecutive_failures = 0;
                match self.publish(&frame) {
                    Ok(()) => true,
                    Err(e) => {
                        error!("video stage: {}", e);
                        false
                    }
                }
            }
            // Decoder is buffering; zero frames out is not an error.
            Ok(None) => {
                self.consecutive_failures = 0;
                true
            }
            Err(e) if e.is_fatal() => {
                error!("video stage: {}", e);
                false
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "video stage: {} ({} consecutive)",
                    e, self.consecutive_failures
                );
                if self.consecutive_failures >= MAX_CONSECUTIVE_DECODE_FAILURES {
                    error!(
                        "video stage: {} contiguous decode failures, stage must be recreated",
                        self.consecutive_failures
                    );
                    false
                } else {
                    true
                }
            }
        }
    }

    fn publish(&mut self, frame: &VideoFrame) -> Result<(), CodecError> {
        let src_width = frame.width();
        let src_height = frame.height();

        let converter = match &mut self.converter {
            Some(c) if c.matches(src_width, src_height) => c,
            slot => {
                if slot.is_some() {
                    info!(
                        "video geometry changed to {}x{}, rebuilding converter",
                        src_width, src_height
                    );
                }
                let built = RgbaConverter::new(
                    frame.pixel_format(),
                    src_width,
                    src_height,
                    self.width as usize,
                    self.height as usize,
                )?;
                self.converter_rebuilds += 1;
                slot.insert(built)
            }
        };

        converter.convert(frame, &mut self.rgba, self.width as usize, self.height as usize)?;

        let pts = self.clock.now();
        self.surface.upload(&self.rgba, self.width, self.height);
        self.sink.on_video_frame(&self.surface, self.width, self.height, pts);
        Ok(())
    }

    #[cfg(test)]
    fn rebuild_count(&self) -> u64 {
        self.converter_rebuilds
    }
}

impl Drop for VideoDecodeStage {
    fn drop(&mut self) {
        self.unit.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::clock::Timestamp;
    use crate::sink::AudioFrameRef;
    use ac_ffmpeg::codec::video::VideoFrameMut;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn yuv_frame(width: usize, height: usize) -> VideoFrame {
        VideoFrameMut::black(get_pixel_format("yuv420p"), width, height).freeze()
    }

    /// Codec unit driven by a script of decode outcomes.
    struct ScriptedUnit {
        script: VecDeque<Result<Option<VideoFrame>, CodecError>>,
    }

    // Scripted frames never leave the test thread.
    unsafe impl Send for ScriptedUnit {}

    impl ScriptedUnit {
        fn new(script: Vec<Result<Option<VideoFrame>, CodecError>>) -> Box<Self> {
            Box::new(Self {
                script: script.into(),
            })
        }
    }

    impl CodecUnit for ScriptedUnit {
        type Frame = VideoFrame;

        fn decode(&mut self, _packet: &CodedPacket) -> Result<Option<VideoFrame>, CodecError> {
            self.script.pop_front().unwrap_or(Ok(None))
        }

        fn close(&mut self) {}
    }

    #[derive(Default)]
    struct CountingSink {
        videos: Mutex<Vec<(u32, u32)>>,
    }

    impl FrameSink for CountingSink {
        fn on_video_frame(&self, surface: &SharedSurface, width: u32, height: u32, _pts: Timestamp) {
            assert!(surface.is_created());
            self.videos.lock().unwrap().push((width, height));
        }

        fn on_audio_frame(&self, _frame: &AudioFrameRef<'_>) {}
    }

    fn stage_with(
        script: Vec<Result<Option<VideoFrame>, CodecError>>,
        sink: Arc<CountingSink>,
    ) -> VideoDecodeStage {
        VideoDecodeStage::from_unit(
            ScriptedUnit::new(script),
            320,
            180,
            SharedSurface::new(),
            sink,
            MediaClock::new(),
        )
    }

    fn packet() -> CodedPacket {
        CodedPacket::new(bytes::Bytes::from_static(&[0, 0, 0, 1, 0x65]))
    }

    #[test]
    fn one_frame_yields_one_surface_update() {
        let sink = Arc::new(CountingSink::default());
        let mut stage = stage_with(vec![Ok(Some(yuv_frame(640, 360)))], sink.clone());

        assert!(stage.decode(&packet()));

        assert_eq!(sink.videos.lock().unwrap().as_slice(), &[(320, 180)]);
        stage.surface().read(|frame| {
            let (pixels, w, h) = frame.unwrap();
            assert_eq!((w, h), (320, 180));
            assert_eq!(pixels.len(), 320 * 180 * 4);
        });
    }

    #[test]
    fn buffering_decoder_publishes_nothing() {
        let sink = Arc::new(CountingSink::default());
        let mut stage = stage_with(vec![Ok(None), Ok(None)], sink.clone());

        assert!(stage.decode(&packet()));
        assert!(stage.decode(&packet()));

        assert!(sink.videos.lock().unwrap().is_empty());
        assert!(!stage.surface().is_created());
    }

    #[test]
    fn geometry_change_rebuilds_converter_without_growth() {
        let sink = Arc::new(CountingSink::default());
        let mut script = Vec::new();
        for _ in 0..4 {
            script.push(Ok(Some(yuv_frame(1280, 720))));
            script.push(Ok(Some(yuv_frame(640, 360))));
        }
        let mut stage = stage_with(script, sink.clone());

        for _ in 0..8 {
            assert!(stage.decode(&packet()));
        }

        assert_eq!(sink.videos.lock().unwrap().len(), 8);
        // One rebuild per geometry flip; only a single context is ever held.
        assert_eq!(stage.rebuild_count(), 8);
        assert!(stage.converter.is_some());
    }

    #[test]
    fn stable_geometry_reuses_converter() {
        let sink = Arc::new(CountingSink::default());
        let script = (0..5).map(|_| Ok(Some(yuv_frame(640, 360)))).collect();
        let mut stage = stage_with(script, sink);

        for _ in 0..5 {
            assert!(stage.decode(&packet()));
        }
        assert_eq!(stage.rebuild_count(), 1);
    }

    #[test]
    fn decode_failures_are_recoverable_until_threshold() {
        let sink = Arc::new(CountingSink::default());
        let script = (0..MAX_CONSECUTIVE_DECODE_FAILURES)
            .map(|i| Err(CodecError::DecodeFailed(format!("bad packet {}", i))))
            .collect();
        let mut stage = stage_with(script, sink.clone());

        for _ in 0..MAX_CONSECUTIVE_DECODE_FAILURES - 1 {
            assert!(stage.decode(&packet()));
        }
        // Contiguous failures hit the threshold: stage reports fatal.
        assert!(!stage.decode(&packet()));
        assert!(sink.videos.lock().unwrap().is_empty());
    }

    #[test]
    fn success_resets_the_failure_counter() {
        let sink = Arc::new(CountingSink::default());
        let mut script: Vec<Result<Option<VideoFrame>, CodecError>> = (0..9)
            .map(|_| Err(CodecError::DecodeFailed("bad packet".into())))
            .collect();
        script.push(Ok(Some(yuv_frame(640, 360))));
        script.push(Err(CodecError::DecodeFailed("bad packet".into())));
        let mut stage = stage_with(script, sink);

        for _ in 0..11 {
            assert!(stage.decode(&packet()));
        }
    }

    #[test]
    fn short_source_plane_truncates_instead_of_panicking() {
        // Destination expects 4 rows of 4 bytes; the source only carries 2.
        let mut dst = vec![0xaau8; 4 * 4];
        let src = vec![1u8; 4 * 2];

        extract_plane(&mut dst, &src, 4, 4, 4);

        assert!(dst[..8].iter().all(|&b| b == 1));
        assert!(dst[8..].iter().all(|&b| b == 0xaa));
    }

    #[test]
    fn fatal_codec_error_kills_the_stage() {
        let sink = Arc::new(CountingSink::default());
        let mut stage = stage_with(vec![Err(CodecError::InitFailed("oom".into()))], sink);
        assert!(!stage.decode(&packet()));
    }
}
