use crate::image::Image;

use super::{PointerEvent, PointerHandler, SelectionBar};

/// A header [`SelectionBar`] choosing a mode, plus one optional variant bar per mode.
///
/// Only the variant bar belonging to the selected mode is shown and accepts clicks. Variant bars
/// of the other modes are disabled, since they occupy the same screen area and would otherwise
/// pick up clicks meant for the visible bar.
pub struct WidgetGroup {
    header: SelectionBar,
    variants: Vec<(String, SelectionBar)>,
    /// The mode the enabled state of the variant bars was last updated for.
    active_mode: Option<String>,
}

impl WidgetGroup {
    pub fn new(header: SelectionBar) -> Self {
        Self {
            header,
            variants: Vec::new(),
            active_mode: None,
        }
    }

    /// Registers the variant bar shown while `mode` is selected in the header.
    ///
    /// The bar is disabled until [`WidgetGroup::update`] activates it. A bar previously
    /// registered for the same mode is replaced.
    pub fn register(&mut self, mode: impl Into<String>, mut bar: SelectionBar) {
        let mode = mode.into();
        if !self.header.labels().contains(&mode) {
            log::warn!("variant bar registered for unknown mode '{mode}'");
        }
        bar.enable(false);
        // Variant bars are stacked below the frame before the header is prepended, so their
        // coordinates are shifted by the header height.
        bar.set_y_offset(self.header.height_px() as i32);

        match self.variants.iter_mut().find(|(m, _)| *m == mode) {
            Some((_, slot)) => *slot = bar,
            None => self.variants.push((mode, bar)),
        }
        // Force re-evaluation so the new bar gets enabled if its mode is active.
        self.active_mode = None;
    }

    /// The mode currently selected in the header.
    pub fn mode(&self) -> &str {
        self.header.selected_label()
    }

    pub fn header(&self) -> &SelectionBar {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut SelectionBar {
        &mut self.header
    }

    /// Returns the variant bar registered for `mode`.
    pub fn variant(&self, mode: &str) -> Option<&SelectionBar> {
        self.variants
            .iter()
            .find_map(|(m, bar)| (m == mode).then_some(bar))
    }

    pub fn variant_mut(&mut self, mode: &str) -> Option<&mut SelectionBar> {
        self.variants
            .iter_mut()
            .find_map(|(m, bar)| (m == mode).then_some(bar))
    }

    /// Returns the variant bar of the selected mode, if it has one.
    pub fn active_variant(&self) -> Option<&SelectionBar> {
        self.variant(self.mode())
    }

    /// Enables exactly the variant bar of the selected mode, if the mode changed since the last
    /// call.
    ///
    /// Returns whether the mode changed.
    pub fn update(&mut self) -> bool {
        let mode = self.header.selected_label();
        if self.active_mode.as_deref() == Some(mode) {
            return false;
        }

        log::debug!("mode changed: {:?} -> '{mode}'", self.active_mode);
        for (m, bar) in &mut self.variants {
            bar.enable(m == mode);
        }
        self.active_mode = Some(mode.to_string());
        true
    }

    /// Stacks the variant bar of the selected mode (if any) below `frame` and the header above
    /// it.
    pub fn composite(&mut self, frame: &Image) -> Image {
        let mode = self.header.selected_label();
        let with_variant = match self.variants.iter_mut().find(|(m, _)| m == mode) {
            Some((_, bar)) => bar.append_to_frame(frame),
            None => frame.clone(),
        };
        self.header.prepend_to_frame(&with_variant)
    }
}

/// Forwards every event to the header and to all variant bars; disabled bars ignore it.
impl PointerHandler for WidgetGroup {
    fn handle_pointer(&mut self, event: &PointerEvent) {
        self.header.handle_pointer(event);
        for (_, bar) in &mut self.variants {
            bar.handle_pointer(event);
        }
    }
}
