//! Animated image files (GIF and APNG) as seekable video.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    time::Duration,
};

use anyhow::bail;
use image::{
    codecs::{gif::GifDecoder, png::PngDecoder},
    AnimationDecoder,
};

use crate::image::{Image, Resolution};
use crate::timer::Timer;

use super::Capture;

#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub enum AnimationFormat {
    Gif,
    Apng,
}

impl AnimationFormat {
    /// Determines the animation format from a file extension, if it names one.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match &*ext.to_ascii_lowercase() {
            "gif" => Some(Self::Gif),
            "apng" => Some(Self::Apng),
            _ => None,
        }
    }
}

/// A [`Capture`] playing back the frames of an animation.
///
/// All frames are decoded up front, so grabbing and seeking are cheap. Frames are handed out as
/// fast as they are requested; per-frame delays are only used to report a frame rate.
pub struct AnimCapture {
    frames: Vec<(Image, Duration)>,
    resolution: Resolution,
    /// Index of the frame the next grab fetches.
    pos: usize,
    /// Index of the frame fetched by the last successful grab.
    grabbed: Option<usize>,
    open: bool,
    t_decode: Timer,
}

impl AnimCapture {
    /// Loads an animation from the filesystem.
    ///
    /// The path must have a `gif` or `apng` extension.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::open_impl(path.as_ref())
    }

    fn open_impl(path: &Path) -> anyhow::Result<Self> {
        let Some(format) = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(AnimationFormat::from_extension)
        else {
            bail!(
                "animation path '{}' must have a supported extension",
                path.display()
            );
        };

        Self::from_reader(BufReader::new(File::open(path)?), format)
    }

    /// Loads an animation from a [`BufRead`] implementor.
    pub fn from_reader<R: BufRead>(mut reader: R, format: AnimationFormat) -> anyhow::Result<Self> {
        Self::from_reader_impl(&mut reader, format)
    }

    fn from_reader_impl(reader: &mut dyn BufRead, format: AnimationFormat) -> anyhow::Result<Self> {
        let frames = match format {
            AnimationFormat::Gif => GifDecoder::new(reader)?.into_frames(),
            AnimationFormat::Apng => {
                let dec = PngDecoder::new(reader)?;
                if !dec.is_apng() {
                    bail!("attempted to load APNG animation from still image PNG");
                }
                dec.apng().into_frames()
            }
        };

        let frames = frames
            .map(|res| {
                let frame = res?;
                let dur = Duration::from(frame.delay());
                let image = Image::from_rgba8(
                    Resolution::new(frame.buffer().width(), frame.buffer().height()),
                    frame.buffer(),
                );
                Ok((image, dur))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Self::from_frames(frames)
    }

    /// Creates a capture from already decoded frames.
    ///
    /// Fails if `frames` is empty or the frames differ in size.
    pub fn from_frames(frames: Vec<(Image, Duration)>) -> anyhow::Result<Self> {
        let Some((first, _)) = frames.first() else {
            bail!("animation contains no frames");
        };
        let resolution = first.resolution();
        if let Some((odd, _)) = frames.iter().find(|(f, _)| f.resolution() != resolution) {
            bail!(
                "animation frames differ in size ({} and {})",
                resolution,
                odd.resolution()
            );
        }

        Ok(Self {
            frames,
            resolution,
            pos: 0,
            grabbed: None,
            open: true,
            t_decode: Timer::new("decode"),
        })
    }
}

impl Capture for AnimCapture {
    fn grab(&mut self) -> anyhow::Result<bool> {
        if !self.open || self.pos >= self.frames.len() {
            self.grabbed = None;
            return Ok(false);
        }
        self.grabbed = Some(self.pos);
        self.pos += 1;
        Ok(true)
    }

    fn retrieve(&mut self) -> anyhow::Result<Image> {
        match self.grabbed {
            Some(index) => Ok(self.t_decode.time(|| self.frames[index].0.clone())),
            None => bail!("no frame has been grabbed"),
        }
    }

    fn seek(&mut self, index: u64) -> anyhow::Result<()> {
        self.pos = usize::try_from(index)
            .unwrap_or(usize::MAX)
            .min(self.frames.len());
        Ok(())
    }

    fn fps(&self) -> Option<f32> {
        let total: Duration = self.frames.iter().map(|(_, dur)| *dur).sum();
        if total.is_zero() {
            return None;
        }
        Some(self.frames.len() as f32 / total.as_secs_f32())
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.frames.len() as u64)
    }

    fn position(&self) -> Option<u64> {
        Some(self.pos as u64)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn release(&mut self) {
        self.open = false;
        self.frames.clear();
        self.grabbed = None;
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_decode]
    }
}
