use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::bail;

use super::{
    anim::{AnimCapture, AnimationFormat},
    ffmpeg::{FfmpegCapture, STREAM_SCHEMES, VIDEO_EXTENSIONS},
    httpcam::HttpStream,
    still::StillCapture,
    webcam::{Webcam, WebcamOptions},
    Capture, FrameSource, SourceKind,
};

/// Where frames come from, as entered by the user.
///
/// Parsing never fails: a bare unsigned integer is a camera index, anything with a `scheme://`
/// prefix is a URL, and everything else is treated as a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Camera(u32),
    Url(String),
    Path(PathBuf),
}

impl FromStr for SourceDescriptor {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<u32>() {
            return Ok(Self::Camera(index));
        }
        if let Some((scheme, _)) = s.split_once("://") {
            if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Ok(Self::Url(s.to_string()));
            }
        }
        Ok(Self::Path(PathBuf::from(s)))
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera(index) => write!(f, "{index}"),
            Self::Url(url) => f.write_str(url),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

impl SourceDescriptor {
    /// The kind of [`FrameSource`] this descriptor opens, or an error if no transport handles it.
    pub fn kind(&self) -> anyhow::Result<SourceKind> {
        match self {
            Self::Camera(_) => Ok(SourceKind::Live),
            Self::Url(url) => {
                let scheme = url.split_once("://").map_or(url.as_str(), |(s, _)| s);
                if scheme == "http" || STREAM_SCHEMES.contains(&scheme) {
                    Ok(SourceKind::Live)
                } else {
                    bail!("unsupported scheme '{scheme}' in '{url}'")
                }
            }
            Self::Path(path) => match extension(path).as_deref() {
                Some("gif" | "apng") => Ok(SourceKind::File),
                Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => Ok(SourceKind::File),
                Some("jpg" | "jpeg" | "png") => Ok(SourceKind::Image),
                _ => bail!("unsupported file type '{}'", path.display()),
            },
        }
    }

    /// Opens a [`FrameSource`] reading from this descriptor.
    pub fn open(&self) -> anyhow::Result<FrameSource> {
        let kind = self.kind()?;
        let this = self.clone();
        FrameSource::new(self.to_string(), kind, move || this.open_capture())
    }

    fn open_capture(&self) -> anyhow::Result<Box<dyn Capture>> {
        Ok(match self {
            Self::Camera(index) => Box::new(Webcam::open(WebcamOptions::default().index(*index))?),
            Self::Url(url) if url.starts_with("http://") => Box::new(HttpStream::connect(url)?),
            Self::Url(url) => Box::new(FfmpegCapture::open_rtsp(url)?),
            Self::Path(path) => {
                let ext = extension(path);
                if ext.as_deref().and_then(AnimationFormat::from_extension).is_some() {
                    Box::new(AnimCapture::open(path)?)
                } else if ext.is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str())) {
                    Box::new(FfmpegCapture::open_file(path)?)
                } else {
                    Box::new(StillCapture::open(path)?)
                }
            }
        })
    }
}

/// The lowercased extension of `path`.
fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}
