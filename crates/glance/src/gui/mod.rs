//! The output window.
//!
//! [`DisplayHost`] owns one window and runs the windowing event loop on the calling thread: every
//! call to [`DisplayHost::imshow`] presents a frame and then handles whatever input arrived since
//! the previous call. Pointer input is queued and handed to widgets by
//! [`DisplayHost::dispatch`].

mod renderer;

use std::collections::VecDeque;

use winit::{
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, Event, KeyboardInput, MouseButton, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    platform::run_return::EventLoopExtRunReturn,
};

use crate::image::{Image, Resolution};
use crate::ui::{PointerEvent, PointerHandler};

use self::renderer::{Gpu, Renderer, Window};

/// A key press reported by [`DisplayHost::imshow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Up,
    Down,
    Left,
    Right,
    /// A key producing a printable character.
    Char(char),
}

impl Key {
    /// Returns whether this key asks for the window to be closed (`Esc` or `q`).
    pub fn is_quit(&self) -> bool {
        matches!(self, Key::Escape | Key::Char('q' | 'Q'))
    }

    fn from_virtual(code: VirtualKeyCode) -> Option<Self> {
        Some(match code {
            VirtualKeyCode::Escape => Key::Escape,
            VirtualKeyCode::Up => Key::Up,
            VirtualKeyCode::Down => Key::Down,
            VirtualKeyCode::Left => Key::Left,
            VirtualKeyCode::Right => Key::Right,
            _ => return None,
        })
    }
}

/// What happened while a frame was on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Shown {
    /// The window was closed or a quit key was pressed.
    pub close_requested: bool,
    /// The first key pressed since the previous frame.
    pub key: Option<Key>,
}

impl Shown {
    fn record_key(&mut self, key: Key) {
        self.close_requested |= key.is_quit();
        if self.key.is_none() {
            self.key = Some(key);
        }
    }
}

/// Turns raw cursor and button events into [`PointerEvent`]s.
///
/// The last cursor position is kept when the cursor leaves the window, so that releasing the
/// button outside of it still ends a drag.
#[derive(Debug, Default)]
struct PointerTracker {
    position: Option<(i32, i32)>,
    held: bool,
}

impl PointerTracker {
    fn moved(&mut self, x: i32, y: i32) -> PointerEvent {
        self.position = Some((x, y));
        PointerEvent::moved(x, y, self.held)
    }

    /// Returns `None` if the cursor has never been over the window, or the button state did not
    /// change.
    fn button(&mut self, pressed: bool) -> Option<PointerEvent> {
        if pressed == self.held {
            return None;
        }
        self.held = pressed;
        let (x, y) = self.position?;
        Some(if pressed {
            PointerEvent::down(x, y)
        } else {
            PointerEvent::up(x, y)
        })
    }
}

/// Maps a cursor position inside a window of size `window` onto the displayed image of size
/// `image`.
fn window_to_image(
    pos: PhysicalPosition<f64>,
    window: PhysicalSize<u32>,
    image: Resolution,
) -> (i32, i32) {
    let scale = |v: f64, from: u32, to: u32| {
        if from == 0 || from == to {
            v.floor() as i32
        } else {
            (v * f64::from(to) / f64::from(from)).floor() as i32
        }
    };
    (
        scale(pos.x, window.width, image.width()),
        scale(pos.y, window.height, image.height()),
    )
}

/// Owns the single output window.
pub struct DisplayHost {
    title: String,
    event_loop: EventLoop<()>,
    gpu: Option<Gpu>,
    /// Created when the first frame is shown, since the window is sized to fit the frame.
    renderer: Option<Renderer>,
    tracker: PointerTracker,
    pending: VecDeque<PointerEvent>,
    closed: bool,
}

impl DisplayHost {
    /// Connects to the display server and opens a GPU for presenting.
    ///
    /// The window itself appears with the first call to [`DisplayHost::imshow`].
    pub fn open(title: impl Into<String>) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new();
        let gpu = pollster::block_on(Gpu::open())?;
        Ok(Self {
            title: title.into(),
            event_loop,
            gpu: Some(gpu),
            renderer: None,
            tracker: PointerTracker::default(),
            pending: VecDeque::new(),
            closed: false,
        })
    }

    /// Shows `image`, resizing the window to fit it, and processes pending window events.
    pub fn imshow(&mut self, image: &Image) -> anyhow::Result<Shown> {
        if self.closed {
            anyhow::bail!("window '{}' has been closed", self.title);
        }

        let res = image.resolution();
        match &mut self.renderer {
            Some(renderer) => {
                if renderer.resolution() != res {
                    renderer.resize(res);
                }
            }
            None => {
                let Some(gpu) = self.gpu.take() else {
                    anyhow::bail!("GPU handle missing for window '{}'", self.title);
                };
                log::debug!("creating window '{}' at {res}", self.title);
                let window = Window::open(&self.event_loop, &self.title, res)?;
                self.renderer = Some(Renderer::new(window, gpu)?);
            }
        }
        if let Some(renderer) = &mut self.renderer {
            renderer.update_texture(res, image.data());
            renderer.redraw()?;
        }

        Ok(self.pump_events())
    }

    fn pump_events(&mut self) -> Shown {
        let mut shown = Shown::default();
        let Self {
            event_loop,
            renderer,
            tracker,
            pending,
            ..
        } = self;

        event_loop.run_return(|event, _target, flow| {
            *flow = ControlFlow::Poll;
            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => shown.close_requested = true,
                    WindowEvent::KeyboardInput {
                        input:
                            KeyboardInput {
                                state: ElementState::Pressed,
                                virtual_keycode: Some(code),
                                ..
                            },
                        ..
                    } => {
                        if let Some(key) = Key::from_virtual(code) {
                            shown.record_key(key);
                        }
                    }
                    WindowEvent::ReceivedCharacter(c) if !c.is_control() => {
                        shown.record_key(Key::Char(c));
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        if let Some(renderer) = renderer.as_ref() {
                            let (x, y) = window_to_image(
                                position,
                                renderer.window().inner_size(),
                                renderer.resolution(),
                            );
                            pending.push_back(tracker.moved(x, y));
                        }
                    }
                    WindowEvent::MouseInput {
                        state,
                        button: MouseButton::Left,
                        ..
                    } => {
                        if let Some(event) = tracker.button(state == ElementState::Pressed) {
                            pending.push_back(event);
                        }
                    }
                    _ => {}
                },
                Event::RedrawRequested(_) => {
                    if let Some(renderer) = renderer.as_mut() {
                        if let Err(e) = renderer.redraw() {
                            log::error!("failed to redraw window: {e:#}");
                        }
                    }
                }
                Event::MainEventsCleared => *flow = ControlFlow::Exit,
                _ => {}
            }
        });

        shown
    }

    /// Hands every queued pointer event to each of `handlers`, in order.
    pub fn dispatch(&mut self, handlers: &mut [&mut dyn PointerHandler]) {
        for event in self.pending.drain(..) {
            for handler in handlers.iter_mut() {
                handler.handle_pointer(&event);
            }
        }
    }

    /// Closes the window. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            log::debug!("closing window '{}'", self.title);
            drop(renderer);
        }
        self.pending.clear();
        self.closed = true;
    }
}

/// The requested maximum side length of the displayed video.
///
/// Changed in steps by the arrow keys, within a fixed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySize {
    size: u32,
}

impl DisplaySize {
    pub const MIN: u32 = 100;
    pub const MAX: u32 = 4000;
    pub const STEP: u32 = 50;
    pub const DEFAULT: u32 = 1000;

    /// Creates a display size, clamped into [`DisplaySize::MIN`]..=[`DisplaySize::MAX`].
    pub fn new(size: u32) -> Self {
        Self {
            size: size.clamp(Self::MIN, Self::MAX),
        }
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.size
    }

    pub fn grow(&mut self) {
        self.size = (self.size + Self::STEP).min(Self::MAX);
    }

    pub fn shrink(&mut self) {
        self.size = self.size.saturating_sub(Self::STEP).max(Self::MIN);
    }

    /// Grows on `Up` and shrinks on `Down`. Returns whether `key` was one of those.
    pub fn apply(&mut self, key: Key) -> bool {
        match key {
            Key::Up => self.grow(),
            Key::Down => self.shrink(),
            _ => return false,
        }
        true
    }

    /// The factor that scales a frame of `res` so its longer side matches this size.
    pub fn scale_factor(&self, res: Resolution) -> f32 {
        self.size as f32 / res.max_side().max(1) as f32
    }
}

impl Default for DisplaySize {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use approx::assert_relative_eq;

    use crate::ui::{PlaybackBar, PointerKind};
    use crate::video::{anim::AnimCapture, Capture, FrameSource, SourceKind};

    use super::*;

    #[test]
    fn display_size_steps_and_clamps() {
        let mut size = DisplaySize::default();
        assert_eq!(size.get(), 1000);
        assert!(size.apply(Key::Up));
        assert_eq!(size.get(), 1050);
        assert!(size.apply(Key::Down));
        assert!(size.apply(Key::Down));
        assert_eq!(size.get(), 950);
        assert!(!size.apply(Key::Char('x')));
        assert_eq!(size.get(), 950);

        let mut size = DisplaySize::new(120);
        size.shrink();
        assert_eq!(size.get(), 100);
        size.shrink();
        assert_eq!(size.get(), 100);

        let mut size = DisplaySize::new(9000);
        assert_eq!(size.get(), 4000);
        size.grow();
        assert_eq!(size.get(), 4000);
        assert_eq!(DisplaySize::new(0).get(), 100);
    }

    #[test]
    fn scale_factor_fits_longer_side() {
        let size = DisplaySize::new(1000);
        assert_relative_eq!(size.scale_factor(Resolution::new(2000, 500)), 0.5);
        assert_relative_eq!(size.scale_factor(Resolution::new(480, 640)), 1.5625);
        assert_eq!(
            Resolution::new(640, 480).scale(size.scale_factor(Resolution::new(640, 480))),
            Resolution::new(1000, 750)
        );
    }

    #[test]
    fn quit_keys() {
        assert!(Key::Escape.is_quit());
        assert!(Key::Char('q').is_quit());
        assert!(!Key::Up.is_quit());
        assert!(!Key::Char('w').is_quit());
        assert_eq!(Key::from_virtual(VirtualKeyCode::Up), Some(Key::Up));
        assert_eq!(Key::from_virtual(VirtualKeyCode::Q), None);
    }

    #[test]
    fn shown_keeps_first_key() {
        let mut shown = Shown::default();
        shown.record_key(Key::Up);
        shown.record_key(Key::Escape);
        assert_eq!(shown.key, Some(Key::Up));
        assert!(shown.close_requested);
    }

    #[test]
    fn tracker_reports_drags() {
        let mut tracker = PointerTracker::default();
        // No position yet.
        assert_eq!(tracker.button(true), None);
        assert_eq!(tracker.button(false), None);

        assert_eq!(tracker.moved(10, 20), PointerEvent::moved(10, 20, false));
        let down = tracker.button(true).unwrap();
        assert_eq!(down.kind, PointerKind::Down);
        assert_eq!((down.x, down.y), (10, 20));
        // Repeated press without release.
        assert_eq!(tracker.button(true), None);

        assert_eq!(tracker.moved(15, 20), PointerEvent::moved(15, 20, true));
        assert_eq!(tracker.button(false), Some(PointerEvent::up(15, 20)));
        assert_eq!(tracker.moved(1, 1), PointerEvent::moved(1, 1, false));
    }

    #[test]
    fn release_outside_window_ends_drag() {
        let mut tracker = PointerTracker::default();
        let mut bar = PlaybackBar::new(&seekable_source());
        bar.append_to_frame(&Image::new(100, 50), &seekable_source());

        bar.handle_pointer(&tracker.moved(40, 60));
        bar.handle_pointer(&tracker.button(true).unwrap());
        bar.handle_pointer(&tracker.moved(99, 70));
        assert!(bar.is_dragging());

        // The cursor leaves the window and the button is released out there.
        let up = tracker.button(false).unwrap();
        assert_eq!(up, PointerEvent::up(99, 70));
        bar.handle_pointer(&up);
        assert!(!bar.is_dragging());
    }

    fn seekable_source() -> FrameSource {
        FrameSource::new("clip", SourceKind::File, || {
            let frames = (0..4)
                .map(|_| (Image::new(100, 50), Duration::from_millis(100)))
                .collect();
            Ok(Box::new(AnimCapture::from_frames(frames)?) as Box<dyn Capture>)
        })
        .unwrap()
    }

    #[test]
    fn cursor_maps_onto_image() {
        let pos = PhysicalPosition::new(150.7, 30.2);
        assert_eq!(
            window_to_image(pos, PhysicalSize::new(300, 260), Resolution::new(300, 260)),
            (150, 30)
        );
        assert_eq!(
            window_to_image(pos, PhysicalSize::new(600, 520), Resolution::new(300, 260)),
            (75, 15)
        );
        assert_eq!(
            window_to_image(
                PhysicalPosition::new(-3.5, 0.0),
                PhysicalSize::new(300, 260),
                Resolution::new(300, 260)
            ),
            (-4, 0)
        );
    }
}
