//! Interactive video playback with a clickable overlay UI.
//!
//! Frames come from a [`video::FrameSource`], which keeps live sources close to real time and
//! loops file sources. They are annotated by the caller, framed by the widgets in [`ui`], and
//! shown in a window owned by [`gui::DisplayHost`], which feeds pointer input back into the
//! widgets.
//!
//! Video files and RTSP streams are decoded by `ffmpeg`, so `ffmpeg` and `ffprobe` have to be on
//! `PATH` to open them.
//!
//! # Environment Variables
//!
//! * `GLANCE_JPEG_BACKEND`: Configures the JPEG decoder used for webcam and network streams.
//!   Allowed values are:
//!   * `mozjpeg` (default): uses the [mozjpeg] library.
//!   * `zune-jpeg`: uses the [zune-jpeg] crate.
//!   * `jpeg-decoder`: uses the [jpeg-decoder] crate (via `image`).
//! * `GLANCE_WEBCAM_NAME`: Forces the V4L2 device (by card name) used for camera sources. If
//!   unset, the camera index selects the `/dev/video*` node.
//!
//! [mozjpeg]: https://github.com/mozilla/mozjpeg
//! [zune-jpeg]: https://github.com/etemesi254/zune-jpeg
//! [jpeg-decoder]: https://github.com/image-rs/jpeg-decoder/

use log::LevelFilter;

pub mod gui;
pub mod history;
pub mod image;
pub mod timer;
pub mod ui;
pub mod video;

#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and this library log at *debug* level, `wgpu` at *warn* level. `RUST_LOG`
/// overrides both.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
