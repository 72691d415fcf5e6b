//! V4L2 webcam access.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported.

use std::{cmp::Reverse, env, path::PathBuf};

use anyhow::bail;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::image::{Image, Resolution};
use crate::timer::Timer;

use super::Capture;

const ENV_VAR_WEBCAM_NAME: &str = "GLANCE_WEBCAM_NAME";

/// Indicates whether to prefer a higher resolution or frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ParamPreference {
    /// Prefer increased resolution over higher frame rates.
    #[default]
    Resolution,
    /// Prefer higher frame rate over higher image resolution.
    Framerate,
}

#[derive(Debug, Default, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

/// Device selection and format negotiation options.
#[derive(Debug, Default, Clone)]
pub struct WebcamOptions {
    name: Option<String>,
    index: Option<u32>,
    frame: FramePrefs,
}

impl WebcamOptions {
    /// Selects the device whose card name is `name`.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Selects the device node `/dev/video{index}`.
    #[inline]
    pub fn index(self, index: u32) -> Self {
        Self {
            index: Some(index),
            ..self
        }
    }

    /// Sets the desired image resolution.
    ///
    /// A lower resolution might be selected if the webcam cannot deliver it.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.frame.resolution = Some(resolution);
        self
    }

    /// Sets the desired frame rate.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.frame.fps = Some(fps);
        self
    }

    /// Selects which of resolution and frame rate is kept when the camera cannot deliver both.
    #[inline]
    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.frame.pref = pref;
        self
    }
}

#[derive(Clone, Copy)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

fn negotiate_format(device: &Device, mut prefs: FramePrefs) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixel_format() == PixelFormat::JPEG || format.pixel_format() == PixelFormat::MJPG {
            pixel_format = Some(format.pixel_format());
            break;
        }
    }
    let Some(pixel_format) = pixel_format else {
        bail!("device offers neither JPEG nor MJPG frames");
    };

    let mut formats = Vec::new();
    let FrameSizes::Discrete(sizes) = device.frame_sizes(pixel_format)? else {
        bail!("stepwise or continuous resolutions are not supported");
    };
    for size in sizes {
        let FrameIntervals::Discrete(intervals) =
            device.frame_intervals(pixel_format, size.width(), size.height())?
        else {
            bail!("stepwise or continuous frame rates are not supported");
        };
        for rate in intervals {
            formats.push(FrameFormat {
                resolution: Resolution::new(size.width(), size.height()),
                frame_interval: *rate.fract(),
            });
        }
    }

    loop {
        if let Some(fmt) = pick_format(&formats, prefs) {
            let res = fmt.resolution;
            return Ok((
                PixFormat::new(res.width(), res.height(), pixel_format),
                fmt.frame_interval,
            ));
        }

        log::debug!("no format matches {prefs:?}, relaxing");
        let relaxed = match prefs.pref {
            ParamPreference::Resolution => {
                prefs.resolution.take().is_some() || prefs.fps.take().is_some()
            }
            ParamPreference::Framerate => {
                prefs.fps.take().is_some() || prefs.resolution.take().is_some()
            }
        };
        if !relaxed {
            bail!("failed to negotiate a webcam format");
        }
    }
}

/// Picks the best format satisfying `prefs`, maximizing the preferred parameter.
fn pick_format(formats: &[FrameFormat], prefs: FramePrefs) -> Option<FrameFormat> {
    let mut eligible = formats
        .iter()
        .filter(|fmt| {
            prefs.resolution.map_or(true, |res| {
                fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
            }) && prefs.fps.map_or(true, |fps| {
                (1.0 / fmt.frame_interval.as_f32()).round() >= fps as f32
            })
        })
        .copied()
        .collect::<Vec<_>>();
    match prefs.pref {
        ParamPreference::Resolution => {
            eligible.sort_by_key(|fmt| (fmt.resolution.num_pixels(), Reverse(fmt.frame_interval)))
        }
        ParamPreference::Framerate => {
            eligible.sort_by_key(|fmt| (Reverse(fmt.frame_interval), fmt.resolution.num_pixels()))
        }
    }
    eligible.last().copied()
}

/// A live webcam.
///
/// Grabbing dequeues one JPEG buffer from the driver; decoding happens on retrieve.
pub struct Webcam {
    stream: Option<ReadStream>,
    resolution: Resolution,
    fps: f32,
    /// JPEG data of the last dequeued buffer.
    pending: Vec<u8>,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the first webcam matching `options`.
    ///
    /// This can block for a significant amount of time while the webcam initializes (on the
    /// order of hundreds of milliseconds).
    pub fn open(options: WebcamOptions) -> anyhow::Result<Self> {
        let mut index = options.index;
        if let Ok(name) = env::var(ENV_VAR_WEBCAM_NAME) {
            log::debug!("webcam override: `{ENV_VAR_WEBCAM_NAME}` is set to '{name}'");
            // The name override takes precedence over a device index.
            index = None;
        }

        if let Some(index) = index {
            let path = PathBuf::from(format!("/dev/video{index}"));
            let dev = Device::open(&path)?;
            return match Self::open_device(dev, &options)? {
                Some(webcam) => Ok(webcam),
                None => bail!("{} is not a supported webcam", path.display()),
            };
        }

        for res in linuxvideo::list()? {
            match res {
                Ok(dev) => match Self::open_device(dev, &options) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => log::debug!("{e}"),
                },
                Err(e) => log::warn!("{e}"),
            }
        }

        bail!("no supported webcam device found")
    }

    fn open_device(dev: Device, options: &WebcamOptions) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        let name_from_env = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = options.name.as_deref().or(name_from_env.as_deref()) {
            if caps.card() != name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );
        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, interval) = negotiate_format(&dev, options.frame)?;
        let capture = dev.video_capture(pixfmt)?;
        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());
        let actual = capture.set_frame_interval(interval)?;
        let fps = 1.0 / actual.as_f32();

        log::info!(
            "opened {} ({}), {resolution} @ {fps:.1}Hz",
            caps.card(),
            path.display(),
        );

        Ok(Some(Self {
            stream: Some(capture.into_stream()?),
            resolution,
            fps,
            pending: Vec::new(),
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }
}

impl Capture for Webcam {
    fn grab(&mut self) -> anyhow::Result<bool> {
        let Some(stream) = &mut self.stream else {
            return Ok(false);
        };
        let pending = &mut self.pending;
        let res = self.t_dequeue.time(|| {
            stream.dequeue(|buf| {
                pending.clear();
                pending.extend_from_slice(&buf);
                Ok(())
            })
        });
        if let Err(e) = res {
            self.stream = None;
            return Err(e.into());
        }
        Ok(true)
    }

    fn retrieve(&mut self) -> anyhow::Result<Image> {
        if self.pending.is_empty() {
            bail!("no frame has been grabbed");
        }
        match self.t_decode.time(|| Image::decode_jpeg(&self.pending)) {
            Ok(image) => Ok(image),
            Err(e) => {
                // Webcams occasionally produce corrupted MJPG frames. Skipping them would cause
                // latency spikes, so a blank frame is handed back instead.
                log::error!("webcam decode error: {e:#}");
                Ok(Image::new(self.resolution.width(), self.resolution.height()))
            }
        }
    }

    fn seek(&mut self, _index: u64) -> anyhow::Result<()> {
        bail!("webcams cannot seek")
    }

    fn fps(&self) -> Option<f32> {
        Some(self.fps)
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn release(&mut self) {
        self.stream = None;
        self.pending.clear();
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}
