//! Opus codec unit backed by FFmpeg.

use ac_ffmpeg::codec::audio::{AudioDecoder, AudioFrame};
use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::packet::PacketMut;
use log::warn;

use super::{CodecUnit, CodedPacket};
use crate::error::CodecError;

/// Fixed output sample rate for GameStream audio.
pub const SAMPLE_RATE: u32 = 48_000;
/// Fixed output channel count.
pub const CHANNELS: u16 = 2;

/// Opus audio decoder fixed to 48 kHz stereo.
///
/// The native FFmpeg `opus` decoder produces planar float output directly;
/// `libopus` is the fallback when the native decoder was compiled out.
pub struct OpusCodecUnit {
    decoder: Option<AudioDecoder>,
}

unsafe impl Send for OpusCodecUnit {}

impl OpusCodecUnit {
    /// Open an Opus decoder at 48 kHz stereo.
    pub fn open() -> Result<Self, CodecError> {
        let decoder = match AudioDecoder::new("opus") {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!("native opus decoder not available ({}), trying libopus", e);
                AudioDecoder::new("libopus")
                    .map_err(|e| CodecError::Unavailable(format!("opus: {}", e)))?
            }
        };

        log::info!(
            "opus codec unit opened ({} Hz, {} channels)",
            SAMPLE_RATE,
            CHANNELS
        );

        Ok(Self {
            decoder: Some(decoder),
        })
    }
}

impl CodecUnit for OpusCodecUnit {
    type Frame = AudioFrame;

    fn decode(&mut self, packet: &CodedPacket) -> Result<Option<AudioFrame>, CodecError> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| CodecError::DecodeFailed(String::from("decoder closed")))?;

        let coded = PacketMut::from(packet.payload.as_ref()).freeze();

        if let Err(e) = decoder.try_push(coded) {
            if e.is_again() {
                // Decoder is full: drain one frame, then retry the push.
                let pending = decoder
                    .take()
                    .map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
                let retry = PacketMut::from(packet.payload.as_ref()).freeze();
                if let Err(e) = decoder.try_push(retry) {
                    warn!("opus: packet dropped after drain ({})", e);
                }
                return Ok(pending);
            }
            return Err(CodecError::DecodeFailed(e.to_string()));
        }

        decoder
            .take()
            .map_err(|e| CodecError::DecodeFailed(e.to_string()))
    }

    fn close(&mut self) {
        if self.decoder.take().is_some() {
            log::info!("opus codec unit closed");
        }
    }
}

impl Drop for OpusCodecUnit {
    fn drop(&mut self) {
        self.close();
    }
}
