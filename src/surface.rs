//! Shared displayable video buffer.
//!
//! The surface is the only state touched by both the decode task (writer)
//! and the host's render task (reader). All access goes through a single
//! mutex scoped to the copy operation, so a frame is never partially
//! visible. Conversion happens outside the lock; only the upload/copy step
//! holds it.

use std::sync::{Arc, Mutex};

struct SurfaceData {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

/// Fixed-size interleaved RGBA buffer shared between the video decode stage
/// and the frame sink's render path.
///
/// Created lazily on the first successful decode and destroyed with
/// [`SharedSurface::clear`] when the owning source goes away. Cloning is
/// cheap and shares the same underlying buffer.
#[derive(Clone)]
pub struct SharedSurface {
    inner: Arc<Mutex<Option<SurfaceData>>>,
}

impl SharedSurface {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Upload one converted RGBA frame, creating the surface on first use.
    ///
    /// `pixels` must be exactly `width * height * 4` bytes. The copy happens
    /// under the surface lock; callers convert into a private buffer first.
    pub fn upload(&self, pixels: &[u8], width: u32, height: u32) {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);

        let mut guard = self.inner.lock().unwrap();
        match guard.as_mut() {
            Some(data) if data.width == width && data.height == height => {
                data.pixels.copy_from_slice(pixels);
            }
            _ => {
                *guard = Some(SurfaceData {
                    pixels: pixels.to_vec(),
                    width,
                    height,
                });
            }
        }
    }

    /// Read the latest frame under the surface lock.
    ///
    /// The closure receives `None` while no frame has been decoded yet.
    /// Readers must copy out anything they need past the call; the decode
    /// task overwrites the buffer on the next frame.
    pub fn read<R>(&self, f: impl FnOnce(Option<(&[u8], u32, u32)>) -> R) -> R {
        let guard = self.inner.lock().unwrap();
        f(guard
            .as_ref()
            .map(|data| (data.pixels.as_slice(), data.width, data.height)))
    }

    /// Whether the surface has been created by a decode yet.
    pub fn is_created(&self) -> bool {
        self.inner.lock().unwrap().is_some()
    }

    /// Dimensions of the current frame, if any.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.inner
            .lock()
            .unwrap()
            .as_ref()
            .map(|data| (data.width, data.height))
    }

    /// Destroy the surface buffer. The next upload recreates it.
    pub fn clear(&self) {
        self.inner.lock().unwrap().take();
    }
}

impl Default for SharedSurface {
    fn default() -> Self {
        Self::new()
    }
}
