//! Session state machine.

/// State of a streaming session.
///
/// Transitions are strictly linear: `Idle → Starting → Streaming → Stopping
/// → Idle`. No stage may be skipped, with the single exception that a session
/// still in `Starting` may be stopped before the ingestion task observes its
/// first packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session active; `start` is accepted.
    Idle,
    /// Connection parameters recorded, ingestion task being launched.
    Starting,
    /// Ingestion task running, packets being decoded.
    Streaming,
    /// Stop requested, waiting for the ingestion task to exit.
    Stopping,
}

impl SessionState {
    /// Check whether this state transition is valid.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, target),
            (Idle, Starting)
                | (Starting, Streaming)
                | (Starting, Stopping)
                | (Streaming, Stopping)
                | (Stopping, Idle)
        )
    }

    /// Whether a session in this state may accept `stop`.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Streaming)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, SessionState::Streaming)
    }

    /// Human-readable state name.
    pub fn description(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Starting => "Starting",
            SessionState::Streaming => "Streaming",
            SessionState::Stopping => "Stopping",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
