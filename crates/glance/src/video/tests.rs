use std::{
    cell::Cell,
    collections::VecDeque,
    fs::File,
    path::PathBuf,
    rc::Rc,
    thread,
    time::Duration,
};

use crate::image::Color;

use super::*;

/// Counts the calls a [`Scripted`] capture sees, shared with the test after the capture has
/// been boxed up inside a [`FrameSource`].
#[derive(Default)]
struct Stats {
    opens: Cell<u32>,
    grabs: Cell<u32>,
    releases: Cell<u32>,
}

/// An in-memory transport whose frames are solid images with the red channel set to the frame
/// index.
struct Scripted {
    /// Number of frames, `None` for an endless stream.
    len: Option<u32>,
    pos: u32,
    grabbed: Option<u32>,
    /// Delay of the next grabs, in order. Once exhausted, `delay` is used.
    delays: VecDeque<Duration>,
    delay: Duration,
    /// The transport reports itself closed once this many frames have been grabbed.
    close_at: Option<u32>,
    fps: Option<f32>,
    resolution: Resolution,
    open: bool,
    stats: Rc<Stats>,
}

impl Scripted {
    fn new(stats: &Rc<Stats>) -> Self {
        Self {
            len: None,
            pos: 0,
            grabbed: None,
            delays: VecDeque::new(),
            delay: Duration::ZERO,
            close_at: None,
            fps: Some(30.0),
            resolution: Resolution::new(4, 2),
            open: true,
            stats: stats.clone(),
        }
    }

    fn len(mut self, len: u32) -> Self {
        self.len = Some(len);
        self
    }

    fn delays(mut self, delays: &[u64]) -> Self {
        self.delays = delays.iter().map(|&ms| Duration::from_millis(ms)).collect();
        self
    }

    fn delay(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    fn close_at(mut self, count: u32) -> Self {
        self.close_at = Some(count);
        self
    }

    fn resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Resolution::new(width, height);
        self
    }
}

impl Capture for Scripted {
    fn grab(&mut self) -> anyhow::Result<bool> {
        self.stats.grabs.set(self.stats.grabs.get() + 1);
        if !self.open {
            return Ok(false);
        }
        if self.close_at == Some(self.pos) {
            self.open = false;
            return Ok(false);
        }
        thread::sleep(self.delays.pop_front().unwrap_or(self.delay));
        if self.len.map_or(false, |len| self.pos >= len) {
            self.grabbed = None;
            return Ok(false);
        }
        self.grabbed = Some(self.pos);
        self.pos += 1;
        Ok(true)
    }

    fn retrieve(&mut self) -> anyhow::Result<Image> {
        let Some(index) = self.grabbed else {
            anyhow::bail!("nothing grabbed");
        };
        Ok(Image::filled(
            self.resolution.width(),
            self.resolution.height(),
            Color::from_rgb8(index as u8, 0, 0),
        ))
    }

    fn seek(&mut self, index: u64) -> anyhow::Result<()> {
        self.pos = index as u32;
        Ok(())
    }

    fn fps(&self) -> Option<f32> {
        self.fps
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn frame_count(&self) -> Option<u64> {
        self.len.map(u64::from)
    }

    fn position(&self) -> Option<u64> {
        Some(self.pos.into())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn release(&mut self) {
        self.stats.releases.set(self.stats.releases.get() + 1);
        self.open = false;
    }
}

fn scripted_source(
    kind: SourceKind,
    stats: &Rc<Stats>,
    make: impl Fn() -> Scripted + 'static,
) -> FrameSource {
    let counter = stats.clone();
    FrameSource::new("scripted", kind, move || {
        counter.opens.set(counter.opens.get() + 1);
        Ok(Box::new(make()) as Box<dyn Capture>)
    })
    .unwrap()
}

fn index_of(frame: &Image) -> u8 {
    frame.get(0, 0).r()
}

fn temp_path(ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!("glance-test-{}.{ext}", fastrand::u64(..)))
}

#[test]
fn file_source_loops() {
    for len in [1, 2, 5] {
        let stats = Rc::new(Stats::default());
        let s = stats.clone();
        let mut source = scripted_source(SourceKind::File, &stats, move || {
            Scripted::new(&s).len(len)
        });

        let indices = (0..len * 3)
            .map(|_| index_of(&source.next_frame().unwrap()))
            .collect::<Vec<_>>();
        let expected = (0..3).flat_map(|_| 0..len as u8).collect::<Vec<_>>();
        assert_eq!(indices, expected, "len={len}");
        assert_eq!(stats.opens.get(), 1);
    }
}

#[test]
fn frames_iterator_yields_looping_sequence() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let mut source = scripted_source(SourceKind::File, &stats, move || Scripted::new(&s).len(2));

    let indices = source
        .frames()
        .take(5)
        .map(|frame| index_of(&frame.unwrap()))
        .collect::<Vec<_>>();
    assert_eq!(indices, [0, 1, 0, 1, 0]);
}

#[test]
fn file_source_decodes_every_frame() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    // No delays: a live source would discard all of these.
    let mut source = scripted_source(SourceKind::File, &stats, move || Scripted::new(&s).len(10));

    for expected in 0..10 {
        assert_eq!(index_of(&source.read().unwrap()), expected);
    }
    assert_eq!(stats.grabs.get(), 10);
}

#[test]
fn live_source_discards_buffered_frames() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let mut source = scripted_source(SourceKind::Live, &stats, move || {
        Scripted::new(&s).delays(&[0, 0, 0, 25])
    });

    let frame = source.read().unwrap();
    assert_eq!(index_of(&frame), 3);
    assert_eq!(stats.grabs.get(), 4);
}

#[test]
fn live_source_respects_min_read_time() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let mut source = scripted_source(SourceKind::Live, &stats, move || {
        Scripted::new(&s).delays(&[15, 15, 60])
    })
    .with_min_read_time(Duration::from_millis(40));

    assert_eq!(index_of(&source.read().unwrap()), 2);
}

#[test]
fn freshness_uses_whole_milliseconds() {
    let ms = Duration::from_millis;
    assert!(!source::is_fresh(ms(10), DEFAULT_MIN_READ_TIME));
    assert!(!source::is_fresh(Duration::from_micros(10_900), DEFAULT_MIN_READ_TIME));
    assert!(source::is_fresh(ms(11), DEFAULT_MIN_READ_TIME));
    assert!(source::is_fresh(ms(1), Duration::ZERO));
    assert!(!source::is_fresh(Duration::from_micros(999), Duration::ZERO));
}

#[test]
fn live_source_returns_nothing_when_grab_fails() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let mut source = scripted_source(SourceKind::Live, &stats, move || Scripted::new(&s).len(3));

    // All three frames arrive instantly and are discarded, then the stream runs dry.
    assert!(source.read().is_none());
    assert_eq!(stats.grabs.get(), 4);
}

#[test]
fn live_disconnect_is_an_error() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let mut source = scripted_source(SourceKind::Live, &stats, move || {
        Scripted::new(&s).len(1).delay(20)
    });

    assert_eq!(index_of(&source.next_frame().unwrap()), 0);
    let err = source.next_frame().unwrap_err();
    assert!(
        err.to_string().contains("disconnected or exhausted"),
        "{err}"
    );
}

#[test]
fn closed_transport_is_reopened() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let mut source = scripted_source(SourceKind::File, &stats, move || {
        Scripted::new(&s).len(5).close_at(2)
    });

    assert_eq!(index_of(&source.next_frame().unwrap()), 0);
    assert_eq!(index_of(&source.next_frame().unwrap()), 1);
    // The transport closes itself on the third grab; the rewind does not help because it stays
    // closed, so the read fails.
    assert!(source.next_frame().is_err());
    assert!(!source.is_open());

    // The next call notices the closed transport and opens a fresh one.
    assert_eq!(index_of(&source.next_frame().unwrap()), 0);
    assert_eq!(stats.opens.get(), 2);
    assert_eq!(stats.releases.get(), 1);
}

#[test]
fn reopen_with_different_shape_fails() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let mut source = scripted_source(SourceKind::Live, &stats, move || {
        if s.opens.get() == 1 {
            Scripted::new(&s)
        } else {
            Scripted::new(&s).resolution(8, 8)
        }
    });
    assert_eq!(source.shape(), Shape { height: 2, width: 4, channels: 4 });

    let err = source.reopen().unwrap_err();
    assert!(err.to_string().contains("expected 4x2"), "{err}");
}

#[test]
fn open_failure_is_reported() {
    let err = FrameSource::new("broken", SourceKind::Live, || {
        anyhow::bail!("no such device")
    })
    .err()
    .unwrap();
    let msg = format!("{err:#}");
    assert!(msg.contains("broken"), "{msg}");
    assert!(msg.contains("no such device"), "{msg}");
}

#[test]
fn exhaust_stops_at_slow_grab() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    // 30 FPS: a grab of 28ms or more means the buffer is empty.
    let mut source = scripted_source(SourceKind::Live, &stats, move || {
        Scripted::new(&s).delays(&[0, 0, 0, 0, 35])
    });

    assert!(source.exhaust_buffered_frames(300).unwrap());
    assert_eq!(stats.grabs.get(), 5);
}

#[test]
fn exhaust_gives_up_after_max_attempts() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let mut source = scripted_source(SourceKind::Live, &stats, move || Scripted::new(&s));

    assert!(!source.exhaust_buffered_frames(7).unwrap());
    assert_eq!(stats.grabs.get(), 7);
}

#[test]
fn exhaust_fails_without_data() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let mut source = scripted_source(SourceKind::Live, &stats, move || Scripted::new(&s).len(2));

    let err = source.exhaust_buffered_frames(300).unwrap_err();
    assert!(err.to_string().contains("no data"), "{err}");
}

#[test]
fn exhaust_is_noop_for_files() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let mut source = scripted_source(SourceKind::File, &stats, move || Scripted::new(&s).len(3));

    assert!(source.exhaust_buffered_frames(300).unwrap());
    assert_eq!(stats.grabs.get(), 0);
}

#[test]
fn release_is_idempotent() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let mut source = scripted_source(SourceKind::Live, &stats, move || Scripted::new(&s));

    source.release();
    assert!(source.is_released());
    source.release();
    assert!(source.is_released());
    assert!(!source.is_open());
    assert_eq!(stats.releases.get(), 1);

    drop(source);
    assert_eq!(stats.releases.get(), 1);
}

#[test]
fn released_source_produces_no_frames() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let mut source = scripted_source(SourceKind::File, &stats, move || Scripted::new(&s).len(3));

    source.release();
    assert!(source.next_frame().is_err());
    assert!(source.reopen().is_err());
    assert_eq!(stats.opens.get(), 1);
}

#[test]
fn drop_releases() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let source = scripted_source(SourceKind::Live, &stats, move || Scripted::new(&s));
    drop(source);
    assert_eq!(stats.releases.get(), 1);
}

#[test]
fn seek_only_for_files() {
    let stats = Rc::new(Stats::default());
    let s = stats.clone();
    let mut file = scripted_source(SourceKind::File, &stats, move || Scripted::new(&s).len(10));
    assert!(file.is_seekable());
    file.seek(7).unwrap();
    assert_eq!(file.position(), Some(7));
    assert_eq!(index_of(&file.next_frame().unwrap()), 7);

    let s = stats.clone();
    let mut live = scripted_source(SourceKind::Live, &stats, move || Scripted::new(&s));
    assert!(!live.is_seekable());
    assert!(live.seek(0).is_err());

    let s = stats.clone();
    let mut still = scripted_source(SourceKind::Image, &stats, move || Scripted::new(&s));
    assert!(still.seek(0).is_err());
}

#[test]
fn parse_descriptors() {
    let parse = |s: &str| s.parse::<SourceDescriptor>().unwrap();
    assert_eq!(parse("0"), SourceDescriptor::Camera(0));
    assert_eq!(parse(" 2 "), SourceDescriptor::Camera(2));
    assert_eq!(
        parse("http://192.168.0.20:4747/video"),
        SourceDescriptor::Url("http://192.168.0.20:4747/video".into())
    );
    assert_eq!(
        parse("rtsp://cam/stream"),
        SourceDescriptor::Url("rtsp://cam/stream".into())
    );
    assert_eq!(parse("clip.gif"), SourceDescriptor::Path("clip.gif".into()));
    assert_eq!(parse("-1"), SourceDescriptor::Path("-1".into()));
    assert_eq!(parse("rtsp://cam/stream").to_string(), "rtsp://cam/stream");
    assert_eq!(parse("7").to_string(), "7");
}

#[test]
fn descriptor_kinds() {
    let kind = |s: &str| s.parse::<SourceDescriptor>().unwrap().kind();
    assert_eq!(kind("0").unwrap(), SourceKind::Live);
    assert_eq!(kind("http://cam/video").unwrap(), SourceKind::Live);
    assert_eq!(kind("dance.GIF").unwrap(), SourceKind::File);
    assert_eq!(kind("dance.apng").unwrap(), SourceKind::File);
    assert_eq!(kind("photo.jpeg").unwrap(), SourceKind::Image);
    assert_eq!(kind("photo.png").unwrap(), SourceKind::Image);
    assert_eq!(kind("rtsp://user:pw@192.168.0.100:554/profile1").unwrap(), SourceKind::Live);
    assert_eq!(kind("movie.mp4").unwrap(), SourceKind::File);
    assert_eq!(kind("movie.AVI").unwrap(), SourceKind::File);
    assert_eq!(kind("movie.mkv").unwrap(), SourceKind::File);

    let err = kind("ftp://cam/stream").unwrap_err();
    assert!(err.to_string().contains("unsupported scheme 'ftp'"), "{err}");
    assert!(kind("notes.txt").is_err());
    assert!(kind("noextension").is_err());
}

#[test]
fn missing_file_fails_to_open() {
    for ext in ["gif", "mp4"] {
        let path = temp_path(ext);
        assert!(SourceDescriptor::Path(path).open().is_err(), "{ext}");
    }
}

#[test]
fn still_image_repeats() {
    let path = temp_path("png");
    ::image::RgbaImage::from_pixel(6, 3, ::image::Rgba([10, 20, 30, 255]))
        .save(&path)
        .unwrap();

    let mut source = SourceDescriptor::Path(path.clone()).open().unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(source.kind(), SourceKind::Image);
    assert_eq!(source.shape(), Shape { height: 3, width: 6, channels: 4 });
    assert!(source.exhaust_buffered_frames(300).unwrap());
    for _ in 0..3 {
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.get(5, 2), Color::from_rgb8(10, 20, 30));
    }
}

#[test]
fn animation_loops() {
    use ::image::{codecs::gif::GifEncoder, Delay, Frame, Rgba, RgbaImage};

    let path = temp_path("gif");
    {
        let file = File::create(&path).unwrap();
        let mut encoder = GifEncoder::new(file);
        let frames = [Rgba([255, 0, 0, 255]), Rgba([0, 0, 255, 255])].map(|color| {
            Frame::from_parts(
                RgbaImage::from_pixel(4, 4, color),
                0,
                0,
                Delay::from_numer_denom_ms(100, 1),
            )
        });
        encoder.encode_frames(frames).unwrap();
    }

    let mut source = SourceDescriptor::Path(path.clone()).open().unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(source.kind(), SourceKind::File);
    assert_eq!(source.frame_count(), Some(2));
    approx::assert_relative_eq!(source.fps().unwrap(), 10.0, epsilon = 0.01);

    let reds = (0..4)
        .map(|_| source.next_frame().unwrap().get(0, 0).r() > 128)
        .collect::<Vec<_>>();
    assert_eq!(reds, [true, false, true, false]);
}
