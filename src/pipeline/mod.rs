//! Streaming session and decode pipeline.
//!
//! The pipeline is organized around one ingestion task per active session:
//! packets pulled from the transport are dispatched by stream type into the
//! video and audio decode stages, which publish decoded frames to the frame
//! sink. Stage failures are isolated per stream so a broken audio decoder
//! never halts video, and vice versa.

pub mod audio_stage;
pub mod clock;
pub mod session;
pub mod state;
pub mod video_stage;

pub use audio_stage::AudioDecodeStage;
pub use clock::{MediaClock, Timestamp};
pub use session::StreamingSession;
pub use state::SessionState;
pub use video_stage::VideoDecodeStage;

/// Contiguous recoverable decode failures after which a stage reports fatal
/// and must be recreated by its owner.
pub(crate) const MAX_CONSECUTIVE_DECODE_FAILURES: u32 = 10;
