//! Codec units: stateful decoder instances shared by the video and audio
//! decode stages.
//!
//! A codec unit wraps one decoder context and follows the two-phase
//! submit/retrieve protocol of modern decoders: a packet is pushed, then zero
//! or one raw frame is taken. A call that yields no frame is normal buffering
//! behaviour, not an error.

pub mod audio;
pub mod video;

pub use audio::OpusCodecUnit;
pub use video::H264CodecUnit;

use bytes::Bytes;

use crate::error::CodecError;

/// Kind of elementary stream a coded packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// H.264 access units.
    Video,
    /// Opus frames.
    Audio,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
        }
    }
}

/// One compressed bitstream unit, as produced by the remote encoder.
///
/// The payload is only valid for the duration of a single decode call; a
/// codec unit must not retain a reference to it past that call.
#[derive(Debug, Clone)]
pub struct CodedPacket {
    /// Compressed payload for one access unit / audio frame.
    pub payload: Bytes,
    /// Optional source timestamp in 90 kHz ticks.
    pub pts: Option<i64>,
}

impl CodedPacket {
    pub fn new(payload: Bytes) -> Self {
        Self { payload, pts: None }
    }

    pub fn with_pts(payload: Bytes, pts: i64) -> Self {
        Self {
            payload,
            pts: Some(pts),
        }
    }
}

/// A stateful decoder instance converting coded packets into raw frames.
///
/// Opening a unit is the concrete type's constructor (`H264CodecUnit::open`,
/// `OpusCodecUnit::open`); `decode` submits one packet and retrieves at most
/// one frame; `close` releases the decoder context and is idempotent.
pub trait CodecUnit: Send {
    /// Raw decoded frame type produced by this unit.
    type Frame;

    /// Submit one coded packet and attempt to retrieve a decoded frame.
    ///
    /// `Ok(None)` means the decoder needs more input before it can produce a
    /// frame. Any other negative decoder outcome is `CodecError::DecodeFailed`
    /// and does not invalidate the decoder context.
    fn decode(&mut self, packet: &CodedPacket) -> Result<Option<Self::Frame>, CodecError>;

    /// Release the decoder context. Safe to call multiple times.
    fn close(&mut self);
}
