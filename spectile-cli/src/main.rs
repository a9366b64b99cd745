use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context as _};
use clap::Parser;
use serde::Serialize;
use spectile::{
    AudioBuffer, ManualFrames, SpectrogramConfig, SpectrogramView, StftRenderer, TileRenderer, WheelInput,
};
use tracing_subscriber::filter::LevelFilter;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Replay a scripted scroll/zoom session over a WAV file and report what the
/// tile pipeline did.
#[derive(Parser, Debug)]
#[command(name = "spectile", version)]
struct Cli {
    /// Input WAV file.
    wav: PathBuf,

    /// JSON file overriding pipeline defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Container width in pixels.
    #[arg(long, default_value_t = 1200.0)]
    width: f64,

    /// Frame budget per gesture.
    #[arg(long, default_value_t = 240)]
    frames: usize,

    /// Wheel notches in the zoom-in gesture.
    #[arg(long, default_value_t = 8)]
    zoom_steps: u32,

    /// FFT size of the renderer.
    #[arg(long, default_value_t = 1024)]
    fft_size: usize,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Default, Serialize)]
struct Report {
    file: String,
    duration_s: f64,
    sample_rate: u32,
    frames_run: usize,
    final_zoom: f64,
    final_scroll_left: f64,
    visible_tiles: usize,
    rendered_visible_tiles: usize,
    cached_tiles: usize,
    requests_issued: u64,
    requests_failed: u64,
    arrivals_discarded: u64,
    live_bitmaps: usize,
    live_bitmaps_after_unmount: usize,
    elapsed_ms: u128,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO })
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => SpectrogramConfig::from_path(path)?,
        None => SpectrogramConfig::default(),
    };
    if cli.fft_size < 16 {
        bail!("--fft-size must be at least 16, got {}", cli.fft_size);
    }
    if !(cli.width > 0.0) {
        bail!("--width must be positive");
    }

    let audio = decode_wav(&cli.wav)?;
    log::info!(
        "{}: {:.2}s @ {} Hz, {} channel(s)",
        cli.wav.display(),
        audio.duration_secs,
        audio.sample_rate,
        audio.channel_count()
    );

    let report = run_session(&cli, &config, &audio);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn decode_wav(path: &Path) -> anyhow::Result<AudioBuffer> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("open WAV '{}'", path.display()))?;
    let spec = reader.spec();

    // Integer PCM is normalised to [-1, 1)
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .with_context(|| format!("decode '{}'", path.display()))?,
        hound::SampleFormat::Int => {
            let max_val = 2.0f32.powi(spec.bits_per_sample as i32 - 1);
            reader
                .samples::<i32>()
                .map(|s| s.map(|x| x as f32 / max_val))
                .collect::<Result<_, _>>()
                .with_context(|| format!("decode '{}'", path.display()))?
        }
    };
    if samples.is_empty() {
        bail!("'{}' contains no samples", path.display());
    }
    Ok(AudioBuffer::from_interleaved(&samples, spec.channels as usize, spec.sample_rate))
}

fn run_session(cli: &Cli, config: &SpectrogramConfig, audio: &AudioBuffer) -> Report {
    let started = Instant::now();
    let frames = ManualFrames::new();
    let renderer: Arc<dyn TileRenderer> = Arc::new(StftRenderer { fft_size: cli.fft_size });
    let mut view = SpectrogramView::mount(config, Some(renderer), frames.clone(), cli.width);
    view.load_audio(Some(audio));

    let mut frames_run = settle(&mut view, &frames, cli.frames);

    let centre = cli.width / 2.0;
    for _ in 0..cli.zoom_steps {
        view.handle_wheel(&WheelInput {
            delta_y: -100.0,
            ctrl_key: true,
            pointer_x: centre,
            ..WheelInput::default()
        });
    }
    frames_run += settle(&mut view, &frames, cli.frames);

    view.handle_wheel(&WheelInput { delta_y: centre, pointer_x: centre, ..WheelInput::default() });
    frames_run += settle(&mut view, &frames, cli.frames);

    let stats = view.stats();
    let tiles = view.visible_tiles();
    let ctx = view.context();
    let mut report = Report {
        file: cli.wav.display().to_string(),
        duration_s: audio.duration_secs,
        sample_rate: audio.sample_rate,
        frames_run,
        final_zoom: ctx.zoom(),
        final_scroll_left: ctx.scroll_left(),
        visible_tiles: tiles.len(),
        rendered_visible_tiles: tiles.iter().filter(|t| t.bitmap.is_some()).count(),
        cached_tiles: stats.cached_tiles,
        requests_issued: stats.requests_issued,
        requests_failed: stats.requests_failed,
        arrivals_discarded: stats.arrivals_discarded,
        live_bitmaps: view.scheduler().live_bitmaps(),
        ..Report::default()
    };

    view.unmount();
    report.live_bitmaps_after_unmount = view.scheduler().live_bitmaps();
    report.elapsed_ms = started.elapsed().as_millis();
    report
}

/// Step the frame loop until the animation stops (or the budget runs out),
/// pumping worker responses every frame, then wait for outstanding tiles.
fn settle(view: &mut SpectrogramView<ManualFrames>, frames: &ManualFrames, budget: usize) -> usize {
    let mut run = 0;
    while run < budget {
        let Some(id) = frames.next_frame() else { break };
        view.on_frame(id);
        view.pump();
        run += 1;
    }
    if run == budget && frames.pending_len() > 0 {
        log::warn!("animation still running after {budget} frames");
    }
    if !view.wait_for_tiles(SETTLE_TIMEOUT) {
        log::warn!("tiles still outstanding after {SETTLE_TIMEOUT:?}");
    }
    view.pump();
    run
}

fn print_report(r: &Report) {
    println!("file:                {}", r.file);
    println!("duration:            {:.2}s @ {} Hz", r.duration_s, r.sample_rate);
    println!("frames run:          {}", r.frames_run);
    println!("final view:          {:.1} px/s, scroll {:.1}px", r.final_zoom, r.final_scroll_left);
    println!("visible tiles:       {} ({} rendered)", r.visible_tiles, r.rendered_visible_tiles);
    println!("cached tiles:        {}", r.cached_tiles);
    println!("requests:            {} issued, {} failed", r.requests_issued, r.requests_failed);
    println!("arrivals discarded:  {}", r.arrivals_discarded);
    println!("live bitmaps:        {} ({} after unmount)", r.live_bitmaps, r.live_bitmaps_after_unmount);
    println!("elapsed:             {} ms", r.elapsed_ms);
}
