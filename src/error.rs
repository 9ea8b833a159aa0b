//! Error taxonomy for the ingest and decode pipeline.
//!
//! Codec errors are scoped to a single decode stage and never tear down the
//! whole session; session errors are surfaced synchronously to the caller of
//! `start`/`stop`.

use thiserror::Error;

/// Errors produced by a codec unit.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The decoder implementation could not be located. Fatal to the stage.
    #[error("codec `{0}` not available")]
    Unavailable(String),

    /// The decoder was found but could not be configured or opened.
    /// Fatal to the stage.
    #[error("codec init failed: {0}")]
    InitFailed(String),

    /// A single packet failed to decode. Recoverable; the pipeline logs and
    /// continues with the next packet.
    #[error("decode failed: {0}")]
    DecodeFailed(String),

    /// The pixel-format/size converter could not be (re)built.
    #[error("frame conversion failed: {0}")]
    ConversionFailed(String),
}

impl CodecError {
    /// Whether this error must terminate the owning stage.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CodecError::DecodeFailed(_))
    }
}

/// Errors produced by the streaming session lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `start` was called while the session was not idle. No side effects.
    #[error("session is not idle (state: {0})")]
    StateConflict(&'static str),

    /// The ingestion task could not be spawned. `start` fails before any
    /// session state is touched, so there is nothing to roll back.
    #[error("failed to spawn ingestion task: {0}")]
    SpawnFailed(String),
}
