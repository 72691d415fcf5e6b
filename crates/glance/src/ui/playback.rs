use crate::image::{draw, Color, Image};
use crate::video::FrameSource;

use super::{PointerEvent, PointerHandler, PointerKind, Span};

const DEFAULT_HEIGHT: u32 = 30;

/// A progress strip that scrubs through a seekable [`FrameSource`] while dragged.
///
/// Pressing the pointer inside the strip starts a drag; while the button stays held, the
/// horizontal pointer position (anywhere in the window) is mapped onto the source's frames.
/// A disabled bar is not rendered and ignores all pointer events.
pub struct PlaybackBar {
    enabled: bool,
    height: u32,
    bg_color: Color,
    fill_color: Color,
    marker_color: Color,
    span: Option<Span>,
    /// Horizontal pointer position within the strip while a drag is in progress.
    drag_x: Option<u32>,
}

impl PlaybackBar {
    /// Creates a bar for `source`, enabled only if the source can seek.
    pub fn new(source: &FrameSource) -> Self {
        Self {
            enabled: source.is_seekable(),
            height: DEFAULT_HEIGHT,
            bg_color: Color::from_rgb8(40, 40, 40),
            fill_color: Color::from_rgb8(90, 90, 90),
            marker_color: Color::WHITE,
            span: None,
            drag_x: None,
        }
    }

    /// Sets the strip height in pixels.
    pub fn height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    pub fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.drag_x = None;
            self.span = None;
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns whether a drag is in progress.
    #[inline]
    pub fn is_dragging(&self) -> bool {
        self.drag_x.is_some()
    }

    /// Seeks `source` to the frame under the pointer, if the bar is being dragged.
    pub fn adjust_playback_on_drag(&mut self, source: &mut FrameSource) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let (Some(x), Some(span)) = (self.drag_x, self.span) else {
            return Ok(());
        };
        let Some(count) = source.frame_count().filter(|&n| n > 0) else {
            return Ok(());
        };
        let target = (u64::from(x) * count / u64::from(span.width)).min(count - 1);
        source.seek(target)
    }

    /// Stacks the bar, showing the playback position of `source`, below `frame`.
    ///
    /// Returns a copy of `frame` if the bar is disabled.
    pub fn append_to_frame(&mut self, frame: &Image, source: &FrameSource) -> Image {
        if !self.enabled {
            return frame.clone();
        }

        let width = frame.width();
        let mut strip = Image::filled(width, self.height, self.bg_color);
        if let (Some(pos), Some(count)) = (source.position(), source.frame_count()) {
            if count > 0 {
                let done = (u64::from(width) * pos.min(count) / count) as u32;
                draw::rect(&mut strip, 0, 0, done, self.height)
                    .color(self.fill_color)
                    .filled();
                let x = done.min(width.saturating_sub(1)) as i32;
                draw::line(&mut strip, x, 0, x, self.height as i32 - 1)
                    .color(self.marker_color)
                    .stroke_width(2);
            }
        }

        self.span = Some(Span {
            width,
            top: frame.height(),
            bottom: frame.height() + self.height,
        });
        Image::vstack(frame, &strip)
    }
}

impl PointerHandler for PlaybackBar {
    fn handle_pointer(&mut self, event: &PointerEvent) {
        if !self.enabled {
            return;
        }
        let Some(span) = self.span else {
            return;
        };
        match event.kind {
            PointerKind::Down => {
                self.drag_x = span.hit(event.x, event.y);
            }
            PointerKind::Move if event.held => {
                if self.drag_x.is_some() {
                    let max = span.width.saturating_sub(1) as i32;
                    self.drag_x = Some(event.x.clamp(0, max) as u32);
                }
            }
            PointerKind::Move | PointerKind::Up => {
                self.drag_x = None;
            }
        }
    }
}
