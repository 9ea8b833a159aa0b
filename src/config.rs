//! Session connection parameters.

use serde::{Deserialize, Serialize};

/// Connection and stream parameters for one streaming session.
///
/// Immutable once a session has been started; updated settings take effect
/// on the next `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    /// GameStream/Sunshine host address.
    pub host: String,
    /// Host control port.
    pub port: u16,
    /// Application to launch on the remote host.
    pub app_name: String,
    /// Negotiated stream width in pixels.
    pub width: u32,
    /// Negotiated stream height in pixels.
    pub height: u32,
    /// Target frame rate.
    pub fps: u32,
    /// Target bitrate in kbps.
    pub bitrate: u32,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 47989,
            app_name: String::from("Steam"),
            width: 1920,
            height: 1080,
            fps: 60,
            bitrate: 20000,
        }
    }
}

impl SessionParams {
    /// Size in bytes of one RGBA output frame at the negotiated geometry.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Returns the crate version as specified in Cargo.toml.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_gamestream_conventions() {
        let params = SessionParams::default();
        assert_eq!(params.host, "localhost");
        assert_eq!(params.port, 47989);
        assert_eq!(params.app_name, "Steam");
        assert_eq!((params.width, params.height), (1920, 1080));
        assert_eq!(params.fps, 60);
        assert_eq!(params.bitrate, 20000);
        assert_eq!(params.frame_size(), 1920 * 1080 * 4);
    }
}
