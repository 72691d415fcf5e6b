use embedded_graphics::mono_font::{ascii, MonoFont};
use itertools::Itertools;

use crate::image::{
    draw::{self, text_size},
    Color, Image,
};

use super::{PointerEvent, PointerHandler, PointerKind, Span};

/// Candidate label fonts, largest first.
const FONTS: [&MonoFont<'static>; 6] = [
    &ascii::FONT_10X20,
    &ascii::FONT_9X18,
    &ascii::FONT_7X13,
    &ascii::FONT_6X10,
    &ascii::FONT_5X8,
    &ascii::FONT_4X6,
];

/// Fraction of a region's width and height a label may cover.
const LABEL_FILL: f32 = 0.8;

/// Appended to labels that had to be shortened.
const ELLIPSIS: &str = "..";

const DEFAULT_HEIGHT: u32 = 60;

/// A row of equally wide, mutually exclusive buttons.
///
/// The bar is rendered as a strip above ([`SelectionBar::prepend_to_frame`]) or below
/// ([`SelectionBar::append_to_frame`]) a frame and always spans the full frame width. Clicking a
/// region selects it, unless the bar is disabled.
pub struct SelectionBar {
    labels: Vec<String>,
    selected: usize,
    enabled: bool,
    y_offset: i32,
    height: u32,
    fg_color: Color,
    bg_color: Color,
    line_color: Color,
    select_color: Color,
    strip: Option<Strip>,
    span: Option<Span>,
}

/// The rendered bar without a selection, for one particular width.
struct Strip {
    image: Image,
    labels: Vec<FittedLabel>,
}

/// A label as it is drawn into its region.
struct FittedLabel {
    center: i32,
    font: &'static MonoFont<'static>,
    /// The label, shortened if it does not fit even with the smallest font.
    text: String,
    /// Whether there is room to thicken the highlighted label by one pixel.
    bold: bool,
}

impl SelectionBar {
    /// Creates a bar with one button per label. The first button starts out selected.
    ///
    /// # Panics
    ///
    /// This will panic if `labels` is empty.
    pub fn new<I>(labels: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let labels = labels.into_iter().map(Into::into).collect::<Vec<_>>();
        assert!(!labels.is_empty(), "selection bar needs at least one label");
        Self {
            labels,
            selected: 0,
            enabled: true,
            y_offset: 0,
            height: DEFAULT_HEIGHT,
            fg_color: Color::WHITE,
            bg_color: Color::from_rgb8(40, 40, 40),
            line_color: Color::from_rgb8(80, 80, 80),
            select_color: Color::YELLOW,
            strip: None,
            span: None,
        }
    }

    /// Sets the color of the selected label.
    pub fn select_color(mut self, color: Color) -> Self {
        self.select_color = color;
        self.strip = None;
        self
    }

    pub fn bg_color(mut self, color: Color) -> Self {
        self.bg_color = color;
        self.strip = None;
        self
    }

    pub fn fg_color(mut self, color: Color) -> Self {
        self.fg_color = color;
        self.strip = None;
        self
    }

    /// Sets the color of the separators between buttons.
    pub fn line_color(mut self, color: Color) -> Self {
        self.line_color = color;
        self.strip = None;
        self
    }

    /// Sets the strip height in pixels.
    pub fn height(mut self, height: u32) -> Self {
        self.height = height;
        self.strip = None;
        self
    }

    /// Returns the index and label of the selected button.
    pub fn read(&self) -> (usize, &str) {
        (self.selected, &self.labels[self.selected])
    }

    #[inline]
    pub fn selected_index(&self) -> usize {
        self.selected
    }

    #[inline]
    pub fn selected_label(&self) -> &str {
        &self.labels[self.selected]
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Selects the button at `index`, clamped to the last button.
    pub fn select(&mut self, index: usize) {
        self.selected = index.min(self.labels.len() - 1);
    }

    /// Selects the button labeled `label`. Returns `false` (and leaves the selection alone) if
    /// there is no such button.
    pub fn select_label(&mut self, label: &str) -> bool {
        match self.labels.iter().position(|l| l == label) {
            Some(index) => {
                self.selected = index;
                true
            }
            None => false,
        }
    }

    /// Enables or disables reacting to clicks. Rendering is unaffected.
    pub fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Sets the distance between the top of the window and the top of the image this bar is
    /// stacked onto.
    pub fn set_y_offset(&mut self, y_offset: i32) {
        self.y_offset = y_offset;
    }

    #[inline]
    pub fn height_px(&self) -> u32 {
        self.height
    }

    /// Stacks the bar above `frame`.
    pub fn prepend_to_frame(&mut self, frame: &Image) -> Image {
        let strip = self.render(frame.width());
        self.span = Some(Span {
            width: strip.width(),
            top: 0,
            bottom: strip.height(),
        });
        Image::vstack(&strip, frame)
    }

    /// Stacks the bar below `frame`.
    pub fn append_to_frame(&mut self, frame: &Image) -> Image {
        let strip = self.render(frame.width());
        self.span = Some(Span {
            width: strip.width(),
            top: frame.height(),
            bottom: frame.height() + strip.height(),
        });
        Image::vstack(frame, &strip)
    }

    /// Renders the bar at `width`, with the selected label highlighted.
    fn render(&mut self, width: u32) -> Image {
        let strip = match self.strip.take() {
            Some(strip) if strip.image.width() == width => strip,
            _ => {
                log::trace!("laying out selection bar {:?} at {width}px", self.labels);
                self.layout(width)
            }
        };

        let mut image = strip.image.clone();
        let label = &strip.labels[self.selected];
        let y = (self.height / 2) as i32;
        let passes = if label.bold { 2 } else { 1 };
        for dx in 0..passes {
            draw::text(&mut image, label.center + dx, y, &label.text)
                .font(label.font)
                .color(self.select_color);
        }
        self.strip = Some(strip);
        image
    }

    fn layout(&self, width: u32) -> Strip {
        let mut image = Image::filled(width, self.height, self.bg_color);
        let y = (self.height / 2) as i32;
        let max_height = self.height as f32 * LABEL_FILL;

        let mut labels = Vec::with_capacity(self.labels.len());
        for (label, (start, end)) in self
            .labels
            .iter()
            .zip(region_bounds(width, self.labels.len()).tuple_windows())
        {
            let max_width = (end - start) as f32 * LABEL_FILL;
            let (font, text) = fit_label(label, max_width, max_height);
            let bold = (text_size(font, &text).0 + 1) as f32 <= max_width;
            if text != *label {
                log::debug!("label '{label}' shortened to '{text}' at {}px", end - start);
            }
            let center = ((start + end) / 2) as i32;
            draw::text(&mut image, center, y, &text)
                .font(font)
                .color(self.fg_color);
            labels.push(FittedLabel {
                center,
                font,
                text,
                bold,
            });

            if start != 0 {
                draw::line(&mut image, start as i32, 0, start as i32, self.height as i32 - 1)
                    .color(self.line_color);
            }
        }

        Strip { image, labels }
    }
}

impl PointerHandler for SelectionBar {
    fn handle_pointer(&mut self, event: &PointerEvent) {
        if !self.enabled || event.kind != PointerKind::Down {
            return;
        }
        let Some(span) = self.span else {
            return;
        };
        if let Some(x) = span.hit(event.x, event.y.saturating_sub(self.y_offset)) {
            let count = self.labels.len() as u64;
            let index = u64::from(x) * count / u64::from(span.width);
            self.select(index as usize);
        }
    }
}

/// Returns the `count + 1` region boundaries of a strip of `width` pixels.
///
/// Region `i` covers exactly the pixels `x` with `floor(x * count / width) == i`.
fn region_bounds(width: u32, count: usize) -> impl Iterator<Item = u32> {
    let (width, count) = (u64::from(width), count as u64);
    (0..=count).map(move |i| ((i * width + count - 1) / count) as u32)
}

/// Fits `label` into `max_width` x `max_height`.
///
/// Picks the largest font that renders the whole label. If even the smallest font is too wide,
/// the label is shortened to the longest prefix that fits, ending in `..` if possible. The result
/// may be empty.
fn fit_label(label: &str, max_width: f32, max_height: f32) -> (&'static MonoFont<'static>, String) {
    let fits = |font: &MonoFont<'_>, text: &str| {
        let (w, h) = text_size(font, text);
        w as f32 <= max_width && h as f32 <= max_height
    };
    if let Some(font) = FONTS.into_iter().find(|font| fits(font, label)) {
        return (font, label.to_string());
    }

    let font = FONTS[FONTS.len() - 1];
    let chars = label.chars().collect::<Vec<_>>();
    let prefix = |n: usize| chars[..n].iter().collect::<String>();
    let shortened = (1..chars.len())
        .rev()
        .map(|n| format!("{}{ELLIPSIS}", prefix(n).trim_end()))
        .chain((1..chars.len()).rev().map(prefix))
        .find(|text| fits(font, text))
        .unwrap_or_default();
    (font, shortened)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_match_hit_mapping() {
        for (width, count) in [(300, 3), (301, 3), (100, 7), (5, 5), (1000, 4)] {
            let bounds = region_bounds(width, count).collect::<Vec<_>>();
            assert_eq!(bounds[0], 0);
            assert_eq!(bounds[count], width);
            for (i, (start, end)) in bounds.iter().tuple_windows().enumerate() {
                for x in *start..*end {
                    assert_eq!((x as usize * count) / width as usize, i, "{width} {count} {x}");
                }
            }
        }
    }

    #[test]
    fn fonts_shrink_to_fit() {
        let fit = |label, w, h| fit_label(label, w, h);
        let (font, text) = fit("Pose", 100.0, 48.0);
        assert_eq!((font.character_size.width, text.as_str()), (10, "Pose"));
        // 9x18 fits "ArUco" (45px) but 10x20 (50px) does not.
        assert_eq!(fit("ArUco", 48.0, 48.0).0.character_size.width, 9);
        assert_eq!(fit("Pose", 100.0, 9.0).0.character_size.height, 8);
    }

    #[test]
    fn long_labels_are_shortened() {
        assert_eq!(fit_label("Medium (Hires)", 30.0, 48.0).1, "Mediu..");
        assert_eq!(fit_label("Pose + ArUco", 30.0, 48.0).1, "Pose..");
        // No room for the dots.
        assert_eq!(fit_label("Medium", 9.0, 48.0).1, "Me");
        assert_eq!(fit_label("Medium", 4.0, 48.0).1, "M");
        assert_eq!(fit_label("Medium", 3.0, 48.0).1, "");
        // Too low for any font.
        assert_eq!(fit_label("Pose", 100.0, 5.0).1, "");
    }

    #[test]
    fn labels_stay_inside_their_regions() {
        let modes = ["Pose", "ArUco", "Depth", "Pose + ArUco", "All"];
        for labels in [&modes[..], &["Medium (Hires)", "Fastest"][..], &["x"; 30][..]] {
            let mut bar = SelectionBar::new(labels.iter().copied());
            for width in [1, 5, 20, 100, 101, 333, 1000, 4000] {
                bar.prepend_to_frame(&Image::new(width, 1));
                let strip = bar.strip.as_ref().unwrap();
                let bounds = region_bounds(width, labels.len()).tuple_windows();
                for (label, (start, end)) in strip.labels.iter().zip(bounds) {
                    let (w, h) = text_size(label.font, &label.text);
                    let allowed = (end - start) as f32 * LABEL_FILL;
                    assert!(
                        w as f32 <= allowed,
                        "'{}' is {w}px in {allowed}px (bar width {width})",
                        label.text
                    );
                    if label.bold {
                        assert!((w + 1) as f32 <= allowed);
                    }
                    assert!(h as f32 <= DEFAULT_HEIGHT as f32 * LABEL_FILL);
                }
            }
        }
    }

    #[test]
    fn narrow_header_keeps_text_off_the_separators() {
        let mut bar = SelectionBar::new(["Pose", "ArUco", "Depth", "Pose + ArUco", "All"])
            .fg_color(Color::WHITE)
            .select_color(Color::WHITE)
            .bg_color(Color::BLACK)
            .line_color(Color::BLACK);
        let out = bar.prepend_to_frame(&Image::new(100, 1));
        // 20px regions leave room for 16px of text, which never reaches the columns on either side
        // of a boundary.
        for boundary in [20, 40, 60, 80] {
            for x in [boundary - 1, boundary] {
                for y in 0..DEFAULT_HEIGHT {
                    assert_eq!(out.get(x, y), Color::BLACK, "text at ({x}, {y})");
                }
            }
        }
    }
}
