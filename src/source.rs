//! Packet source boundary.
//!
//! A packet source is the transport adapter feeding the ingestion loop with
//! discrete coded units. The crate ships no concrete transport; a real
//! GameStream/Sunshine adapter (RTP/ENet) implements this trait and applies
//! its own connect/read timeouts.

use async_trait::async_trait;

use crate::codec::{CodedPacket, StreamKind};

/// Delivers coded video and audio packets, one logical unit per call.
#[async_trait]
pub trait PacketSource: Send {
    /// Pull the next available coded unit.
    ///
    /// Returns `None` when nothing is available right now (poll timeout or
    /// an idle transport); this is not an error and the ingestion loop will
    /// retry after its polling interval. The loop exits only on session
    /// cancellation, so a source may return `None` indefinitely.
    async fn next_packet(&mut self) -> Option<(StreamKind, CodedPacket)>;
}
