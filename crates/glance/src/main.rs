use std::{
    io::{self, BufRead, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::bail;
use clap::Parser;
use glance::{
    gui::{DisplayHost, DisplaySize},
    history::SourceHistory,
    image::{draw, Color, Image},
    timer::FpsCounter,
    ui::{PlaybackBar, SelectionBar, WidgetGroup},
    video::{FrameSource, SourceDescriptor, SourceKind},
};

const MODES: [&str; 5] = ["Pose", "ArUco", "Depth", "Pose + ArUco", "All"];
const HEADER_SELECT: Color = Color::from_rgb8(255, 120, 0);
const VARIANT_BG: Color = Color::from_rgb8(30, 30, 30);
const EXHAUST_ATTEMPTS: u32 = 300;

/// Plays a camera, stream or file with clickable mode selection bars.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Camera index, file path or URL. Prompted for on stdin if omitted.
    #[arg(short = 'i', long)]
    video_source: Option<String>,

    /// Maximum side length of the displayed frame, in pixels.
    #[arg(short = 's', long, default_value_t = DisplaySize::DEFAULT)]
    display_size: u32,

    /// Minimum time a live read has to block for before it counts as fresh.
    #[arg(long, default_value_t = 10)]
    min_read_ms: u64,
}

fn main() -> anyhow::Result<()> {
    glance::init_logger!();

    let args = Args::parse();
    let history = SourceHistory::default();
    let input = match args.video_source {
        Some(src) => src,
        None => prompt_source(history.load())?,
    };
    history.save(&input);

    let descriptor: SourceDescriptor = input.parse()?;
    let mut source =
        descriptor.open()?.with_min_read_time(Duration::from_millis(args.min_read_ms));

    if source.kind() == SourceKind::Live && !source.exhaust_buffered_frames(EXHAUST_ATTEMPTS)? {
        log::warn!(
            "'{}' still had buffered frames after {EXHAUST_ATTEMPTS} reads",
            source.name()
        );
    }

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = quit.clone();
        ctrlc::set_handler(move || quit.store(true, Ordering::Relaxed))?;
    }

    let mut host = DisplayHost::open("glance - q to quit")?;
    let result = run(&mut source, &mut host, DisplaySize::new(args.display_size), &quit);

    source.release();
    host.close();
    result
}

fn prompt_source(last: Option<String>) -> anyhow::Result<String> {
    let mut stdout = io::stdout().lock();
    match &last {
        Some(last) => write!(stdout, "video source (camera index, path or URL) [{last}]: ")?,
        None => write!(stdout, "video source (camera index, path or URL): ")?,
    }
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    match (line.trim(), last) {
        ("", Some(last)) => Ok(last),
        ("", None) => bail!("no video source given"),
        (src, _) => Ok(src.to_string()),
    }
}

fn widgets() -> WidgetGroup {
    let mut group = WidgetGroup::new(SelectionBar::new(MODES).select_color(HEADER_SELECT));
    let variants: [(&str, &[&str]); 3] = [
        ("Pose", &["Fastest", "Small", "Medium"]),
        ("ArUco", &["4x4 (250)", "5x5 (250)", "6x6 (250)", "7x7 (250)"]),
        ("Depth", &["Small", "Medium", "Medium (Hires)"]),
    ];
    for (mode, labels) in variants {
        group.register(mode, SelectionBar::new(labels.iter().copied()).bg_color(VARIANT_BG));
    }
    group
}

fn annotate(frame: &mut Image, group: &WidgetGroup) {
    let label = match group.active_variant() {
        Some(bar) => format!("{}: {}", group.mode(), bar.selected_label()),
        None => group.mode().to_string(),
    };
    draw::text(frame, 4, 4, &label)
        .align_top()
        .align_left()
        .color(Color::GREEN);
}

fn run(
    source: &mut FrameSource,
    host: &mut DisplayHost,
    mut display_size: DisplaySize,
    quit: &AtomicBool,
) -> anyhow::Result<()> {
    let mut group = widgets();
    group.update();
    let mut playback = PlaybackBar::new(source);
    let mut fps = FpsCounter::new("glance");

    while !quit.load(Ordering::Relaxed) {
        let frame = source.next_frame()?;
        let mut frame = frame.scale(display_size.scale_factor(frame.resolution()));
        annotate(&mut frame, &group);

        let composite = group.composite(&frame);
        let composite = playback.append_to_frame(&composite, source);
        let shown = host.imshow(&composite)?;
        if shown.close_requested {
            break;
        }
        if let Some(key) = shown.key {
            if display_size.apply(key) {
                log::debug!("display size is now {}", display_size.get());
            }
        }

        host.dispatch(&mut [&mut group, &mut playback]);
        if group.update() {
            log::info!("mode changed to '{}'", group.mode());
        }
        playback.adjust_playback_on_drag(source)?;

        fps.tick_with(source.timers());
    }

    Ok(())
}
