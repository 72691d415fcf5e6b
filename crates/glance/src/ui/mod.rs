//! Clickable overlay widgets.
//!
//! Widgets render themselves as horizontal strips stacked above or below a video frame, and
//! receive every pointer event that enters the window. Each widget bounds-checks events against
//! the area it occupied the last time it was rendered, so the window does not need to know
//! where anything is.
//!
//! - [`SelectionBar`]: a row of mutually exclusive labeled buttons.
//! - [`PlaybackBar`]: a progress strip that seeks a file source while dragged.
//! - [`WidgetGroup`]: a header bar plus per-mode bars, only one of which is clickable at a time.

mod activation;
mod playback;
mod selection;


pub use activation::WidgetGroup;
pub use playback::PlaybackBar;
pub use selection::SelectionBar;

/// What happened to the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    /// The primary button was pressed.
    Down,
    /// The primary button was released.
    Up,
    /// The pointer moved.
    Move,
}

/// A pointer event in window pixel coordinates.
///
/// Coordinates are relative to the top-left corner of the displayed (composited) frame and may
/// lie outside of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub x: i32,
    pub y: i32,
    /// Whether the primary button is held down.
    pub held: bool,
}

impl PointerEvent {
    pub fn down(x: i32, y: i32) -> Self {
        Self {
            kind: PointerKind::Down,
            x,
            y,
            held: true,
        }
    }

    pub fn up(x: i32, y: i32) -> Self {
        Self {
            kind: PointerKind::Up,
            x,
            y,
            held: false,
        }
    }

    pub fn moved(x: i32, y: i32, held: bool) -> Self {
        Self {
            kind: PointerKind::Move,
            x,
            y,
            held,
        }
    }
}

/// Something that reacts to pointer events.
pub trait PointerHandler {
    /// Handles a single event. Events outside of the handler's area must be ignored.
    fn handle_pointer(&mut self, event: &PointerEvent);
}

/// The area a strip occupied when it was last rendered, in the strip owner's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    width: u32,
    top: u32,
    bottom: u32,
}

impl Span {
    /// Returns the horizontal position of `(x, y)` if it lies inside the span.
    fn hit(&self, x: i32, y: i32) -> Option<u32> {
        let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
            return None;
        };
        (x < self.width && (self.top..self.bottom).contains(&y)).then_some(x)
    }
}
