//! Video sources.
//!
//! A [`FrameSource`] wraps a [`Capture`] transport and decides *which* frames the caller gets to
//! see: live sources discard frames that were sitting in a buffer, file sources play every frame
//! and loop back to the start when they run out.
//!
//! Transports:
//!
//! - [`webcam`]: V4L2 webcams producing JPEG or Motion JPEG frames (live).
//! - [`httpcam`]: IP webcams serving an HTTP `multipart/x-mixed-replace` MJPEG stream (live).
//! - [`ffmpeg`]: video files (seekable) and RTSP streams (live), decoded by an `ffmpeg` process.
//! - [`anim`]: animated GIF or APNG files (seekable).
//! - [`still`]: a single JPEG or PNG image, repeated forever.

pub mod anim;
mod descriptor;
pub mod ffmpeg;
pub mod httpcam;
mod source;
pub mod still;
pub mod webcam;

#[cfg(test)]
mod tests;

use std::fmt;

use crate::image::{Image, Resolution};
use crate::timer::Timer;

pub use descriptor::SourceDescriptor;
pub use source::{FrameSource, Frames, DEFAULT_MIN_READ_TIME};

/// What kind of origin a [`FrameSource`] reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A camera or network stream. Frames arrive in real time and may queue up in a buffer.
    Live,
    /// A seekable file. Playback loops back to the first frame at the end of the stream.
    File,
    /// A single still image that is repeated forever.
    Image,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Live => "live",
            SourceKind::File => "file",
            SourceKind::Image => "image",
        })
    }
}

/// The shape of the frames produced by a [`FrameSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

impl Shape {
    /// Frames are always decoded to RGBA.
    pub const CHANNELS: u32 = 4;

    pub fn from_resolution(res: Resolution) -> Self {
        Self {
            height: res.height(),
            width: res.width(),
            channels: Self::CHANNELS,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// A transport that delivers encoded frames and decodes them on request.
///
/// Splitting [`Capture::grab`] from [`Capture::retrieve`] lets [`FrameSource`] measure how long a
/// frame took to arrive without paying for the decode of frames it is going to throw away.
pub trait Capture {
    /// Fetches the next frame without decoding it.
    ///
    /// Returns `Ok(false)` if no frame is available (end of stream).
    fn grab(&mut self) -> anyhow::Result<bool>;

    /// Decodes the frame fetched by the last successful [`Capture::grab`].
    fn retrieve(&mut self) -> anyhow::Result<Image>;

    /// Moves the read position so that the next [`Capture::grab`] fetches frame `index`.
    ///
    /// Transports that cannot seek return an error.
    fn seek(&mut self, index: u64) -> anyhow::Result<()>;

    /// The frame rate reported by the transport, if it reports one.
    fn fps(&self) -> Option<f32>;

    /// The resolution of the frames this transport produces.
    fn resolution(&self) -> Resolution;

    /// Total number of frames, for finite transports.
    fn frame_count(&self) -> Option<u64> {
        None
    }

    /// Index of the frame the next [`Capture::grab`] will fetch, for seekable transports.
    fn position(&self) -> Option<u64> {
        None
    }

    /// Whether the underlying handle is still usable.
    fn is_open(&self) -> bool;

    /// Closes the underlying handle. Must be safe to call more than once.
    fn release(&mut self);

    /// Profiling timers maintained by the transport.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}
