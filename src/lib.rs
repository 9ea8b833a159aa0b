//! GameStream/Sunshine session ingest and real-time decode pipeline.
//!
//! This crate owns the streaming-session lifecycle, drives per-stream H.264
//! and Opus decoders, converts decoded video to fixed-size RGBA, and hands
//! frames to a host application under a shared, mutex-guarded surface.
//!
//! The wire transport and the host's render/audio output are deliberately
//! outside this crate: a transport adapter implements [`PacketSource`], the
//! host implements [`FrameSink`].
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//! use lunarcast::{
//!     AudioDecodeStage, SessionParams, SharedSurface, StreamingSession, VideoDecodeStage,
//! };
//! # use lunarcast::{FrameSink, PacketSource};
//! # fn sink() -> Arc<dyn FrameSink> { unimplemented!() }
//! # fn transport() -> Box<dyn PacketSource> { unimplemented!() }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let params = SessionParams::default();
//! let surface = SharedSurface::new();
//! let sink = sink();
//!
//! let mut session = StreamingSession::new();
//! let video = Arc::new(Mutex::new(VideoDecodeStage::new(
//!     params.width,
//!     params.height,
//!     surface.clone(),
//!     sink.clone(),
//!     session.clock().clone(),
//! )?));
//! let audio = Arc::new(Mutex::new(AudioDecodeStage::new(
//!     sink,
//!     session.clock().clone(),
//! )?));
//!
//! session.start(params, transport(), video, audio)?;
//! // ... render from `surface` on the host side ...
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod surface;

pub use codec::{CodecUnit, CodedPacket, H264CodecUnit, OpusCodecUnit, StreamKind};
pub use config::SessionParams;
pub use error::{CodecError, SessionError};
pub use pipeline::{
    AudioDecodeStage, MediaClock, SessionState, StreamingSession, Timestamp, VideoDecodeStage,
};
pub use sink::{AudioFrameRef, FrameSink};
pub use source::PacketSource;
pub use surface::SharedSurface;
