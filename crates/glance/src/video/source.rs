use std::time::{Duration, Instant};

use anyhow::{bail, Context};

use crate::image::Image;
use crate::timer::Timer;

use super::{Capture, Shape, SourceKind};

/// Grabs faster than this are assumed to come out of a buffer rather than off the wire.
pub const DEFAULT_MIN_READ_TIME: Duration = Duration::from_millis(10);

/// Frame rate assumed when exhausting a live transport that does not report one.
const FALLBACK_FPS: f32 = 30.0;

/// A grab taking at least this fraction of the frame interval means the buffer has been drained.
const EXHAUST_INTERVAL_FRACTION: f64 = 0.85;

type Opener = Box<dyn FnMut() -> anyhow::Result<Box<dyn Capture>>>;

/// A paced, looping sequence of frames read from a [`Capture`] transport.
///
/// - [`SourceKind::Live`] sources only hand out frames that the transport actually had to wait
///   for, which keeps the displayed frame close to real time when frames are consumed slower than
///   they are produced.
/// - [`SourceKind::File`] sources decode every frame and rewind to the first frame when the end
///   of the stream is reached.
/// - [`SourceKind::Image`] sources repeat a single frame.
///
/// The frame [`Shape`] is fixed when the source is opened. If the transport closes, the next
/// call to [`FrameSource::next_frame`] reopens it, and fails if the reopened transport produces
/// frames of a different shape.
pub struct FrameSource {
    name: String,
    kind: SourceKind,
    opener: Opener,
    capture: Option<Box<dyn Capture>>,
    shape: Shape,
    min_read_time: Duration,
    released: bool,
    t_grab: Timer,
}

impl FrameSource {
    /// Opens a source by invoking `opener`.
    ///
    /// `opener` is kept around and invoked again by [`FrameSource::reopen`].
    pub fn new<F>(name: impl Into<String>, kind: SourceKind, mut opener: F) -> anyhow::Result<Self>
    where
        F: FnMut() -> anyhow::Result<Box<dyn Capture>> + 'static,
    {
        let name = name.into();
        let capture = opener().with_context(|| format!("failed to open video source '{name}'"))?;
        let shape = Shape::from_resolution(capture.resolution());
        match capture.fps() {
            Some(fps) => log::info!(
                "opened {kind} source '{name}', {} @ {fps:.1}Hz",
                shape.resolution()
            ),
            None => log::info!("opened {kind} source '{name}', {}", shape.resolution()),
        }

        Ok(Self {
            name,
            kind,
            opener: Box::new(opener),
            capture: Some(capture),
            shape,
            min_read_time: DEFAULT_MIN_READ_TIME,
            released: false,
            t_grab: Timer::new("grab"),
        })
    }

    /// Sets the minimum time a live grab has to take for its frame to be used.
    pub fn with_min_read_time(mut self, min_read_time: Duration) -> Self {
        self.min_read_time = min_read_time;
        self
    }

    /// Returns the name this source was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Returns the shape of the frames produced by this source.
    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Returns whether [`FrameSource::seek`] is supported.
    #[inline]
    pub fn is_seekable(&self) -> bool {
        self.kind == SourceKind::File
    }

    pub fn fps(&self) -> Option<f32> {
        self.capture.as_ref().and_then(|c| c.fps())
    }

    pub fn frame_count(&self) -> Option<u64> {
        self.capture.as_ref().and_then(|c| c.frame_count())
    }

    /// Index of the next frame to be read, for seekable sources.
    pub fn position(&self) -> Option<u64> {
        self.capture.as_ref().and_then(|c| c.position())
    }

    /// Returns whether the transport is currently open and usable.
    pub fn is_open(&self) -> bool {
        self.capture.as_ref().map_or(false, |c| c.is_open())
    }

    /// Returns whether [`FrameSource::release`] has been called.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Returns profiling timers for frame access and decoding.
    pub fn timers(&self) -> Vec<&Timer> {
        let mut timers = vec![&self.t_grab];
        if let Some(capture) = &self.capture {
            timers.extend(capture.timers());
        }
        timers
    }

    /// Closes the transport (if it is still open) and opens a fresh one.
    ///
    /// Fails if the source has been released, if opening fails, or if the new transport produces
    /// frames of a different shape than the original one.
    pub fn reopen(&mut self) -> anyhow::Result<()> {
        if self.released {
            bail!("video source '{}' has been released", self.name);
        }
        if let Some(mut old) = self.capture.take() {
            old.release();
        }

        log::debug!("reopening video source '{}'", self.name);
        let mut capture = (self.opener)()
            .with_context(|| format!("failed to reopen video source '{}'", self.name))?;
        let shape = Shape::from_resolution(capture.resolution());
        if shape != self.shape {
            capture.release();
            bail!(
                "reopened video source '{}' produces {} frames, expected {}",
                self.name,
                shape.resolution(),
                self.shape.resolution(),
            );
        }
        self.capture = Some(capture);
        Ok(())
    }

    /// Reads a single frame.
    ///
    /// Returns `None` if the transport has no frame to offer (end of stream, disconnect, decode
    /// failure) or if the source has been released.
    pub fn read(&mut self) -> Option<Image> {
        let capture = self.capture.as_mut()?;
        match self.kind {
            SourceKind::Live => {
                // Only use frames that took some time to arrive; fast grabs were buffered and are
                // dropped without being decoded.
                let mut discarded = 0u32;
                loop {
                    let start = Instant::now();
                    let grabbed = grab(&mut **capture);
                    let elapsed = start.elapsed();
                    self.t_grab.record(elapsed);

                    if !grabbed {
                        return None;
                    }
                    if is_fresh(elapsed, self.min_read_time) {
                        break;
                    }
                    discarded += 1;
                }
                if discarded != 0 {
                    log::trace!("'{}': discarded {discarded} buffered frames", self.name);
                }
            }
            SourceKind::File | SourceKind::Image => {
                if !self.t_grab.time(|| grab(&mut **capture)) {
                    return None;
                }
            }
        }

        match capture.retrieve() {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::debug!("'{}': failed to decode frame: {e:#}", self.name);
                None
            }
        }
    }

    /// Returns the next frame of the sequence.
    ///
    /// If the transport has been closed, it is reopened first. If no frame can be read, the
    /// source is rewound to its first frame and the read is retried once; if that fails too, the
    /// source is considered disconnected or exhausted and an error is returned.
    pub fn next_frame(&mut self) -> anyhow::Result<Image> {
        if self.released {
            bail!("video source '{}' has been released", self.name);
        }
        if !self.is_open() {
            self.reopen()?;
        }

        if let Some(frame) = self.read() {
            return Ok(frame);
        }

        self.rewind();
        match self.read() {
            Some(frame) => Ok(frame),
            None => bail!(
                "error reading frames from '{}': disconnected or exhausted",
                self.name
            ),
        }
    }

    fn rewind(&mut self) {
        if self.kind == SourceKind::Live {
            return;
        }
        log::debug!("end of '{}' reached, rewinding", self.name);
        if let Some(capture) = &mut self.capture {
            if let Err(e) = capture.seek(0) {
                log::warn!("failed to rewind '{}': {e:#}", self.name);
            }
        }
    }

    /// Moves playback to frame `index`.
    ///
    /// Only supported by [`SourceKind::File`] sources.
    pub fn seek(&mut self, index: u64) -> anyhow::Result<()> {
        if !self.is_seekable() {
            bail!("cannot seek {} source '{}'", self.kind, self.name);
        }
        let Some(capture) = &mut self.capture else {
            bail!("video source '{}' is not open", self.name);
        };
        log::trace!("'{}': seeking to frame {index}", self.name);
        capture.seek(index)
    }

    /// Drains frames that a live transport has buffered up.
    ///
    /// Grabs frames (without decoding them) until one grab takes at least 85% of the frame
    /// interval, which means it had to wait for the camera and the buffer is empty. Returns
    /// `Ok(false)` if that did not happen within `max_attempts` grabs.
    ///
    /// Non-live sources have no buffer to drain and return `Ok(true)` without grabbing anything.
    pub fn exhaust_buffered_frames(&mut self, max_attempts: u32) -> anyhow::Result<bool> {
        if self.kind != SourceKind::Live {
            return Ok(true);
        }
        let Some(capture) = &mut self.capture else {
            bail!("video source '{}' is not open", self.name);
        };

        let fps = match capture.fps() {
            Some(fps) if fps > 0.0 => fps,
            _ => {
                log::debug!(
                    "'{}' does not report a frame rate, assuming {FALLBACK_FPS}",
                    self.name
                );
                FALLBACK_FPS
            }
        };
        let threshold_ms = (EXHAUST_INTERVAL_FRACTION * 1000.0 / f64::from(fps)).round();

        for attempt in 1..=max_attempts {
            let start = Instant::now();
            let grabbed = capture.grab()?;
            let elapsed = start.elapsed();
            if !grabbed {
                bail!("error exhausting frames from '{}': no data", self.name);
            }

            let read_ms = (elapsed.as_secs_f64() * 1000.0).round();
            if read_ms >= threshold_ms {
                log::debug!(
                    "'{}': buffer drained after {attempt} grabs ({read_ms}ms >= {threshold_ms}ms)",
                    self.name
                );
                return Ok(true);
            }
        }

        log::debug!(
            "'{}': buffer still not drained after {max_attempts} grabs",
            self.name
        );
        Ok(false)
    }

    /// Closes the transport.
    ///
    /// Safe to call any number of times. A released source no longer produces frames.
    pub fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            log::debug!("releasing video source '{}'", self.name);
            capture.release();
        }
        self.released = true;
    }

    /// Returns a borrowing iterator over the frames of this source.
    ///
    /// The iterator never ends on its own; it yields an error once the source is disconnected or
    /// exhausted.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { source: self }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

impl<'a> IntoIterator for &'a mut FrameSource {
    type Item = anyhow::Result<Image>;
    type IntoIter = Frames<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames()
    }
}

/// A borrowing iterator over the frames of a [`FrameSource`].
pub struct Frames<'a> {
    source: &'a mut FrameSource,
}

impl Iterator for Frames<'_> {
    type Item = anyhow::Result<Image>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.source.next_frame())
    }
}

/// Whether a live grab took long enough for its frame to have come off the wire.
///
/// Both durations are truncated to whole milliseconds, so with the default of 10ms a grab has to
/// take at least 11ms.
pub(super) fn is_fresh(elapsed: Duration, min_read_time: Duration) -> bool {
    elapsed.as_millis() > min_read_time.as_millis()
}

fn grab(capture: &mut dyn Capture) -> bool {
    match capture.grab() {
        Ok(grabbed) => grabbed,
        Err(e) => {
            log::debug!("grab failed: {e:#}");
            false
        }
    }
}
