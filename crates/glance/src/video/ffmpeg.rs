//! Video files and RTSP streams, decoded by an `ffmpeg` subprocess.
//!
//! `ffprobe` determines the stream properties up front, then `ffmpeg` writes raw RGBA frames to
//! a pipe. Seeking restarts the decoder at the timestamp of the requested frame.

use std::{
    ffi::OsString,
    io::{self, Read},
    path::Path,
    process::{Child, ChildStdout, Command, Stdio},
};

use anyhow::{bail, Context};
use serde_json::Value;

use crate::image::{Image, Resolution};
use crate::timer::Timer;

use super::Capture;

/// File extensions handled by [`FfmpegCapture::open_file`].
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "webm", "m4v"];

/// URL schemes handled by [`FfmpegCapture::open_rtsp`].
pub const STREAM_SCHEMES: &[&str] = &["rtsp", "rtsps"];

/// Properties of the first video stream of an input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub resolution: Resolution,
    pub fps: Option<f32>,
    /// Known for most files; never for live streams.
    pub frame_count: Option<u64>,
}

/// Runs `ffprobe` on `input`.
pub fn probe(input: &str, rtsp: bool) -> anyhow::Result<StreamInfo> {
    let mut cmd = Command::new("ffprobe");
    cmd.args(["-v", "error"]);
    if rtsp {
        cmd.args(["-rtsp_transport", "tcp"]);
    }
    let output = cmd
        .args([
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames,duration",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(input)
        .stdin(Stdio::null())
        .output()
        .context("failed to run ffprobe")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "ffprobe failed on '{input}': {}",
            stderr.lines().last().unwrap_or("unknown error")
        );
    }
    parse_probe(&String::from_utf8_lossy(&output.stdout))
        .with_context(|| format!("unusable ffprobe output for '{input}'"))
}

fn parse_probe(json: &str) -> anyhow::Result<StreamInfo> {
    let data: Value = serde_json::from_str(json)?;
    let Some(stream) = data
        .get("streams")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
    else {
        bail!("no video stream found");
    };

    let dim = |key: &str| {
        stream
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    };
    let (Some(width), Some(height)) = (dim("width"), dim("height")) else {
        bail!("video stream has no resolution");
    };
    if width == 0 || height == 0 {
        bail!("video stream has an empty resolution ({width}x{height})");
    }

    let rate = |key: &str| stream.get(key).and_then(Value::as_str).and_then(parse_rate);
    let fps = rate("avg_frame_rate").or_else(|| rate("r_frame_rate"));

    // Values that ffprobe does not know are reported as "N/A", or left out.
    let number = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
    };
    let frame_count = match number(stream.get("nb_frames")) {
        Some(n) => Some(n as u64),
        None => {
            let duration = number(stream.get("duration"))
                .or_else(|| number(data.get("format").and_then(|f| f.get("duration"))));
            match (duration, fps) {
                (Some(secs), Some(fps)) => Some((secs * f64::from(fps)).round() as u64),
                _ => None,
            }
        }
    };

    Ok(StreamInfo {
        resolution: Resolution::new(width, height),
        fps,
        frame_count: frame_count.filter(|&n| n > 0),
    })
}

/// Parses a frame rate such as `30000/1001` or `25`. `0/0` means unknown.
fn parse_rate(rate: &str) -> Option<f32> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let (num, den) = (num.parse::<f64>().ok()?, den.parse::<f64>().ok()?);
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse::<f64>().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps as f32)
}

/// Builds the `ffmpeg` command line that decodes `input` from `start_secs` on.
fn decoder_args(input: &str, rtsp: bool, start_secs: f64) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .into_iter()
        .map(OsString::from)
        .collect();
    if rtsp {
        args.extend(["-rtsp_transport", "tcp"].map(OsString::from));
    }
    if start_secs > 0.0 {
        args.push("-ss".into());
        args.push(format!("{start_secs:.3}").into());
    }
    args.push("-i".into());
    args.push(input.into());
    args.extend(
        ["-map", "0:v:0", "-an", "-f", "rawvideo", "-pix_fmt", "rgba", "-"].map(OsString::from),
    );
    args
}

/// Fills `buf` with the next frame from `reader`.
///
/// Returns `Ok(false)` if the stream ended cleanly between two frames.
fn read_frame<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended mid-frame ({filled} of {} bytes)", buf.len()),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// A [`Capture`] reading from an `ffmpeg` decoder process.
///
/// Files are seekable and report their frame count. RTSP streams are live: they cannot seek,
/// and the end of the stream closes the capture.
pub struct FfmpegCapture {
    input: String,
    rtsp: bool,
    info: StreamInfo,
    child: Option<(Child, ChildStdout)>,
    /// Raw RGBA data of the last grabbed frame.
    frame: Vec<u8>,
    grabbed: bool,
    /// Index of the frame the next grab fetches.
    pos: u64,
    open: bool,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl FfmpegCapture {
    /// Opens a video file.
    pub fn open_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("video file '{}' does not exist", path.display());
        }
        let Some(input) = path.to_str() else {
            bail!("video path '{}' is not valid UTF-8", path.display());
        };
        Self::open_impl(input, false)
    }

    /// Connects to an `rtsp://` or `rtsps://` stream.
    pub fn open_rtsp(url: &str) -> anyhow::Result<Self> {
        Self::open_impl(url, true)
    }

    fn open_impl(input: &str, rtsp: bool) -> anyhow::Result<Self> {
        let info = probe(input, rtsp)?;
        log::debug!("probed '{input}': {info:?}");

        let frame_len = info.resolution.num_pixels() as usize * 4;
        let mut this = Self {
            input: input.to_string(),
            rtsp,
            info,
            child: None,
            frame: vec![0; frame_len],
            grabbed: false,
            pos: 0,
            open: true,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        };
        this.spawn(0)?;
        Ok(this)
    }

    /// (Re)starts the decoder at frame `index`.
    fn spawn(&mut self, index: u64) -> anyhow::Result<()> {
        self.kill();

        let start_secs = match (index, self.info.fps) {
            (0, _) => 0.0,
            (_, Some(fps)) => index as f64 / f64::from(fps),
            (_, None) => bail!("cannot seek '{}': unknown frame rate", self.input),
        };
        log::trace!("starting ffmpeg for '{}' at {start_secs:.3}s", self.input);
        let mut child = Command::new("ffmpeg")
            .args(decoder_args(&self.input, self.rtsp, start_secs))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to run ffmpeg")?;
        let Some(stdout) = child.stdout.take() else {
            bail!("ffmpeg stdout is not piped");
        };

        self.child = Some((child, stdout));
        self.pos = index;
        self.grabbed = false;
        self.open = true;
        Ok(())
    }

    fn kill(&mut self) {
        if let Some((mut child, stdout)) = self.child.take() {
            drop(stdout);
            if let Err(e) = child.kill() {
                log::debug!("failed to kill ffmpeg: {e}");
            }
            if let Err(e) = child.wait() {
                log::debug!("failed to reap ffmpeg: {e}");
            }
        }
    }
}

impl Capture for FfmpegCapture {
    fn grab(&mut self) -> anyhow::Result<bool> {
        self.grabbed = false;
        let Some((_, stdout)) = &mut self.child else {
            return Ok(false);
        };
        let frame = &mut self.frame;
        match self.t_dequeue.time(|| read_frame(stdout, frame)) {
            Ok(true) => {
                self.grabbed = true;
                self.pos += 1;
                Ok(true)
            }
            Ok(false) => {
                log::debug!("end of '{}' after {} frames", self.input, self.pos);
                self.kill();
                if self.rtsp {
                    self.open = false;
                }
                Ok(false)
            }
            Err(e) => {
                self.kill();
                self.open = false;
                Err(e.into())
            }
        }
    }

    fn retrieve(&mut self) -> anyhow::Result<Image> {
        if !self.grabbed {
            bail!("no frame has been grabbed");
        }
        Ok(self
            .t_decode
            .time(|| Image::from_rgba8(self.info.resolution, &self.frame)))
    }

    fn seek(&mut self, index: u64) -> anyhow::Result<()> {
        if self.rtsp {
            bail!("RTSP streams cannot seek");
        }
        let index = match self.info.frame_count {
            Some(count) => index.min(count.saturating_sub(1)),
            None => index,
        };
        if self.child.is_some() && index == self.pos {
            return Ok(());
        }
        self.spawn(index)
    }

    fn fps(&self) -> Option<f32> {
        self.info.fps
    }

    fn resolution(&self) -> Resolution {
        self.info.resolution
    }

    fn frame_count(&self) -> Option<u64> {
        if self.rtsp {
            None
        } else {
            self.info.frame_count
        }
    }

    fn position(&self) -> Option<u64> {
        (!self.rtsp).then_some(self.pos)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn release(&mut self) {
        self.kill();
        self.open = false;
        self.grabbed = false;
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        self.kill();
    }
}
