//! Frame sink boundary.
//!
//! The host application consumes decoded media through this interface. Both
//! callbacks run on the decode task and must return promptly; a sink is
//! expected to enqueue and return, never to block the pipeline.

use crate::pipeline::clock::Timestamp;
use crate::surface::SharedSurface;

/// One decoded audio frame, planar 32-bit float.
///
/// Plane slices borrow the decode stage's reusable buffer and are only valid
/// for the duration of the callback; a sink must copy out anything it needs
/// to retain.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrameRef<'a> {
    /// Channel planes; `planes[1]` is `None` for mono-compatible streams.
    pub planes: [Option<&'a [f32]>; 2],
    /// Samples per channel in this frame.
    pub frame_count: usize,
    /// Output sample rate, fixed at 48 kHz.
    pub sample_rate: u32,
    /// 1 or 2.
    pub channel_count: u16,
    /// Monotonic capture timestamp.
    pub timestamp: Timestamp,
}

/// Consumer of decoded video and audio frames.
pub trait FrameSink: Send + Sync {
    /// Called after a decoded frame has been uploaded to the shared surface.
    ///
    /// `width`/`height` are the surface dimensions of the published frame.
    fn on_video_frame(&self, surface: &SharedSurface, width: u32, height: u32, pts: Timestamp);

    /// Called with one decoded PCM frame at the fixed output format.
    fn on_audio_frame(&self, frame: &AudioFrameRef<'_>);
}
