//! H.264 codec unit backed by FFmpeg.

use ac_ffmpeg::codec::video::{VideoDecoder, VideoFrame};
use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::packet::PacketMut;
use ac_ffmpeg::time::{TimeBase, Timestamp};
use log::warn;

use super::{CodecUnit, CodedPacket};
use crate::error::CodecError;

/// H.264 video decoder producing raw 4:2:0 planar frames.
///
/// GameStream hosts negotiate the stream geometry up front, but the actual
/// decoded dimensions come from the bitstream itself; callers must read them
/// off the returned frame rather than assume the negotiated values.
pub struct H264CodecUnit {
    decoder: Option<VideoDecoder>,
    frame_count: i64,
}

unsafe impl Send for H264CodecUnit {}

impl H264CodecUnit {
    /// Open an H.264 decoder for the given negotiated geometry.
    pub fn open(width: u32, height: u32) -> Result<Self, CodecError> {
        let decoder = VideoDecoder::builder("h264")
            .map_err(|e| CodecError::Unavailable(format!("h264: {}", e)))?
            .time_base(TimeBase::new(1, 90_000))
            .build()
            .map_err(|e| CodecError::InitFailed(e.to_string()))?;

        log::info!("h264 codec unit opened ({}x{} negotiated)", width, height);

        Ok(Self {
            decoder: Some(decoder),
            frame_count: 0,
        })
    }

    fn next_pts(&mut self) -> Timestamp {
        self.frame_count += 1;
        Timestamp::new(self.frame_count, TimeBase::new(1, 90_000))
    }
}

impl CodecUnit for H264CodecUnit {
    type Frame = VideoFrame;

    fn decode(&mut self, packet: &CodedPacket) -> Result<Option<VideoFrame>, CodecError> {
        let pts = match packet.pts {
            Some(pts) => Timestamp::new(pts, TimeBase::new(1, 90_000)),
            None => self.next_pts(),
        };

        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| CodecError::DecodeFailed(String::from("decoder closed")))?;

        let coded = PacketMut::from(packet.payload.as_ref())
            .with_pts(pts)
            .freeze();

        if let Err(e) = decoder.try_push(coded) {
            if e.is_again() {
                // Decoder is full: drain one frame, then retry the push.
                let pending = decoder
                    .take()
                    .map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
                let retry = PacketMut::from(packet.payload.as_ref())
                    .with_pts(pts)
                    .freeze();
                if let Err(e) = decoder.try_push(retry) {
                    warn!("h264: packet dropped after drain ({})", e);
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
            log::info!("h264 codec unit closed");
        }
    }
}

impl Drop for H264CodecUnit {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn open_and_close_is_idempotent() {
        let mut unit = H264CodecUnit::open(1920, 1080).expect("h264 decoder available");
        unit.close();
        unit.close();

        let err = unit
            .decode(&CodedPacket::new(Bytes::from_static(&[0, 0, 0, 1])))
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, CodecError::DecodeFailed(_)));
    }
}
