//! Streaming session lifecycle and ingestion loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::audio_stage::AudioDecodeStage;
use super::clock::MediaClock;
use super::state::SessionState;
use super::video_stage::VideoDecodeStage;
use crate::codec::StreamKind;
use crate::config::SessionParams;
use crate::error::SessionError;
use crate::source::PacketSource;

/// Polling interval when the packet source has nothing available
/// (roughly one 60 Hz frame). Also bounds stop latency.
const POLL_INTERVAL: Duration = Duration::from_micros(16_666);

/// Owns one streaming session: connection parameters, the session state
/// machine and the ingestion task pumping packets into the decode stages.
///
/// The decode stages are created by the session host and only borrowed here;
/// they survive a `stop` and can be reused or torn down by their owner.
///
/// Dropping an active session cancels the ingestion task cooperatively but
/// cannot wait for it; call [`StreamingSession::stop`] for a clean join.
pub struct StreamingSession {
    state: Arc<Mutex<SessionState>>,
    params: Option<SessionParams>,
    clock: MediaClock,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl StreamingSession {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::Idle)),
            params: None,
            clock: MediaClock::new(),
            cancel: None,
            handle: None,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    pub fn is_streaming(&self) -> bool {
        self.state().is_streaming()
    }

    /// Parameters of the current (or last) session.
    pub fn params(&self) -> Option<&SessionParams> {
        self.params.as_ref()
    }

    /// The clock decode stages of this session should stamp frames with.
    pub fn clock(&self) -> &MediaClock {
        &self.clock
    }

    /// Start streaming: record connection parameters and launch the
    /// ingestion task.
    ///
    /// Fails with [`SessionError::StateConflict`] if the session is not
    /// idle, leaving existing parameters and the running task untouched.
    /// Fails with [`SessionError::SpawnFailed`] when no async runtime is
    /// reachable, in which case nothing is applied.
    pub fn start(
        &mut self,
        params: SessionParams,
        source: Box<dyn PacketSource>,
        video: Arc<Mutex<VideoDecodeStage>>,
        audio: Arc<Mutex<AudioDecodeStage>>,
    ) -> Result<(), SessionError> {
        // Resolve the runtime before touching any state so a spawn failure
        // has no side effects to roll back.
        let runtime = Handle::try_current().map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        {
            let mut state = self.state.lock().unwrap();
            if !state.is_idle() {
                return Err(SessionError::StateConflict(state.description()));
            }
            *state = SessionState::Starting;
        }

        info!(
            "starting session: {}:{} (app: {}), {}x{}@{}fps, {} kbps",
            params.host,
            params.port,
            params.app_name,
            params.width,
            params.height,
            params.fps,
            params.bitrate
        );

        self.params = Some(params);

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = runtime.spawn(async move {
            if let Err(e) = ingestion_loop(source, video, audio, task_cancel).await {
                error!("ingestion task failed: {:#}", e);
            }
        });

        self.cancel = Some(cancel);
        self.handle = Some(handle);
        *self.state.lock().unwrap() = SessionState::Streaming;

        Ok(())
    }

    /// Stop streaming: signal the ingestion task and wait for it to exit.
    ///
    /// Returns `false` as a no-op when the session is not active. After
    /// `stop` returns `true`, no further decode or frame-sink calls occur.
    pub async fn stop(&mut self) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if !state.is_active() {
                return false;
            }
            *state = SessionState::Stopping;
        }

        info!("stopping session");

        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("ingestion task panicked: {}", e);
            }
        }

        *self.state.lock().unwrap() = SessionState::Idle;
        info!("session stopped");
        true
    }
}

impl Default for StreamingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            if self.state().is_active() {
                warn!("session dropped while active, cancelling ingestion task");
            }
            cancel.cancel();
        }
    }
}

/// Body of the ingestion task.
///
/// Pulls coded units from the packet source and dispatches them by stream
/// type. A fatal decode-stage result halts that stream only; the loop keeps
/// pumping the other one. Cancellation is observed within one polling
/// interval.
async fn ingestion_loop(
    mut source: Box<dyn PacketSource>,
    video: Arc<Mutex<VideoDecodeStage>>,
    audio: Arc<Mutex<AudioDecodeStage>>,
    cancel: CancellationToken,
) -> Result<()> {
    info!("ingestion task started");

    let mut video_packets = 0u64;
    let mut audio_packets = 0u64;
    let mut video_fatal = false;
    let mut audio_fatal = false;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = source.next_packet() => next,
        };

        match next {
            Some((StreamKind::Video, packet)) => {
                video_packets += 1;
                if video_fatal {
                    continue;
                }
                let ok = video
                    .lock()
                    .map_err(|_| anyhow!("video stage lock poisoned"))?
                    .decode(&packet);
                if !ok {
                    error!("video stage failed, video halted until stage recreation");
                    video_fatal = true;
                }
            }
            Some((StreamKind::Audio, packet)) => {
                audio_packets += 1;
                if audio_fatal {
                    continue;
                }
                let ok = audio
                    .lock()
                    .map_err(|_| anyhow!("audio stage lock poisoned"))?
                    .decode(&packet);
                if !ok {
                    error!("audio stage failed, audio halted until stage recreation");
                    audio_fatal = true;
                }
            }
            // Nothing available right now; retry after the polling interval.
            None => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }

    info!(
        "ingestion task stopped ({} video, {} audio packets)",
        video_packets, audio_packets
    );
    Ok(())
}
