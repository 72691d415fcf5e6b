//! A single image, repeated forever.

use std::path::Path;

use anyhow::bail;

use crate::image::{Image, Resolution};
use crate::timer::Timer;

use super::Capture;

/// A [`Capture`] that yields the same image on every grab.
pub struct StillCapture {
    image: Option<Image>,
    resolution: Resolution,
    t_decode: Timer,
}

impl StillCapture {
    /// Loads a JPEG or PNG image from the filesystem.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self::new(Image::load(path)?))
    }

    pub fn new(image: Image) -> Self {
        Self {
            resolution: image.resolution(),
            image: Some(image),
            t_decode: Timer::new("decode"),
        }
    }
}

impl Capture for StillCapture {
    fn grab(&mut self) -> anyhow::Result<bool> {
        Ok(self.image.is_some())
    }

    fn retrieve(&mut self) -> anyhow::Result<Image> {
        match &self.image {
            Some(image) => Ok(self.t_decode.time(|| image.clone())),
            None => bail!("image has been released"),
        }
    }

    fn seek(&mut self, _index: u64) -> anyhow::Result<()> {
        Ok(())
    }

    fn fps(&self) -> Option<f32> {
        None
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn frame_count(&self) -> Option<u64> {
        Some(1)
    }

    fn position(&self) -> Option<u64> {
        Some(0)
    }

    fn is_open(&self) -> bool {
        self.image.is_some()
    }

    fn release(&mut self) {
        self.image = None;
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_decode]
    }
}
