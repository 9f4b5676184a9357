//! zonectl - operator console for detection zones, baselines and the beam
//!
//! Zones are read from the backend with a local SQLite cache as fallback.
//! `render` draws the current zones over the baseline frame to a PNG (or a
//! JSON display list). `beam watch` polls beam status until Ctrl-C, then
//! stops monitoring.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use zone_console::api::{is_unreachable, ApiClient};
use zone_console::baseline::InlineImageLoader;
use zone_console::store::{LoadOutcome, SqliteZoneCache, ZoneStore};
use zone_console::zone::next_zone_id;
use zone_console::{
    now_iso8601, BaselineEvent, BeamMonitor, ConsoleConfig, ImageSource, PixmapSurface, Point,
    Zone, ZoneConsole, ZoneParams,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Backend base URL; overrides the config file.
    #[arg(long, global = true, env = "ZONE_CONSOLE_API_BASE")]
    api_base: Option<String>,
    /// Zone cache database; overrides the config file.
    #[arg(long, global = true, env = "ZONE_CONSOLE_CACHE_PATH")]
    cache_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detection zone management.
    #[command(subcommand)]
    Zones(ZonesCommand),
    /// Draw zones over the baseline frame.
    Render(RenderArgs),
    /// Video upload and metadata.
    #[command(subcommand)]
    Video(VideoCommand),
    /// Live monitoring and beam control.
    #[command(subcommand)]
    Beam(BeamCommand),
}

#[derive(Subcommand, Debug)]
enum ZonesCommand {
    /// List zones (backend first, cache when it is down).
    List,
    /// Create a zone from image-space points.
    Create(CreateArgs),
    /// Delete a zone by id.
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Write the zone set as an export document.
    Export {
        /// Output path; defaults to zones_config_<date>.json.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replace the local zone set from an export document.
    Import { file: PathBuf },
}

#[derive(Args, Debug)]
struct CreateArgs {
    #[arg(long)]
    name: String,
    /// Vertex as `x,y` in image pixels; repeat for each vertex.
    #[arg(long = "point", value_parser = parse_point, required = true)]
    points: Vec<Point>,
    /// 1 (low) to 5 (critical).
    #[arg(long, default_value_t = 1)]
    priority: u8,
    #[arg(long, default_value = "#FF0000")]
    color: String,
    #[arg(long, default_value_t = 25)]
    threshold: i64,
    #[arg(long, default_value_t = 500)]
    min_area: i64,
    #[arg(long, default_value_t = 3)]
    motion_frames: i64,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Use the first frame of this uploaded video as baseline.
    #[arg(long, conflicts_with = "image")]
    video_id: Option<String>,
    /// Use a local image file as baseline.
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long, default_value = "zones.png")]
    output: PathBuf,
    #[arg(long, value_enum, default_value_t = RenderFormat::Png)]
    format: RenderFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RenderFormat {
    Png,
    Json,
}

#[derive(Subcommand, Debug)]
enum VideoCommand {
    /// Upload a video file (100MB max).
    Upload { path: PathBuf },
    /// Show duration, resolution and frame rate.
    Info { video_id: String },
    /// Save the first frame.
    Frame {
        video_id: String,
        #[arg(long, default_value = "first_frame.jpg")]
        output: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum BeamCommand {
    /// Start monitoring a video.
    Start { video_id: String },
    /// Stop the stream and the beam.
    Stop,
    /// Emergency beam stop, then stream stop.
    EmergencyStop,
    /// One status request.
    Status,
    /// Monitor a video and poll status until Ctrl-C.
    Watch { video_id: String },
}

fn parse_point(raw: &str) -> std::result::Result<Point, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{}'", raw))?;
    let x: f64 = x.trim().parse().map_err(|_| format!("bad x in '{}'", raw))?;
    let y: f64 = y.trim().parse().map_err(|_| format!("bad y in '{}'", raw))?;
    let p = Point::new(x, y);
    if !p.is_valid() {
        return Err(format!("point '{}' is not finite", raw));
    }
    Ok(p)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut cfg = ConsoleConfig::load()?;
    if let Some(base) = cli.api_base {
        cfg.api_base = base.trim_end_matches('/').to_string();
    }
    if let Some(path) = cli.cache_path {
        cfg.cache_path = path;
    }
    let api = ApiClient::new(&cfg.api_base, cfg.http_timeout)?;

    let result = match cli.command {
        Command::Zones(cmd) => run_zones(&cfg, api, cmd),
        Command::Render(args) => run_render(&cfg, api, args),
        Command::Video(cmd) => run_video(&api, cmd),
        Command::Beam(cmd) => run_beam(api, cmd),
    };
    if let Err(err) = &result {
        if is_unreachable(err) {
            log::error!("backend at {} is unreachable; is it running?", cfg.api_base);
        }
    }
    result
}

fn open_store(cfg: &ConsoleConfig, api: ApiClient) -> Result<ZoneStore<ApiClient, SqliteZoneCache>> {
    let cache = SqliteZoneCache::open(&cfg.cache_path)?;
    Ok(ZoneStore::new(api, cache))
}

// -------------------- Zones --------------------

fn run_zones(cfg: &ConsoleConfig, api: ApiClient, cmd: ZonesCommand) -> Result<()> {
    let mut store = open_store(cfg, api)?;
    store.load_zones();
    match store.last_load() {
        Some(LoadOutcome::Cache { kept, pruned }) => {
            log::warn!(
                "backend unavailable; using {} cached zones ({} stale dropped)",
                kept,
                pruned
            );
        }
        Some(LoadOutcome::Empty) => log::warn!("backend unavailable and no cached zones"),
        _ => {}
    }

    match cmd {
        ZonesCommand::List => {
            if store.zones().is_empty() {
                println!("No zones defined yet");
            }
            for zone in store.zones().iter() {
                print_zone(zone);
            }
        }
        ZonesCommand::Create(args) => {
            let params = ZoneParams {
                name: args.name,
                priority: args.priority,
                threshold: args.threshold,
                min_area: args.min_area,
                motion_frames: args.motion_frames,
                color: args.color,
            };
            let zone = Zone::from_draft(
                &args.points,
                &params,
                store.zones(),
                next_zone_id(store.zones()),
                now_iso8601(),
            )?;
            store.create_zone(zone.clone())?;
            println!("Zone '{}' saved successfully", zone.name);
        }
        ZonesCommand::Delete { id, yes } => {
            let name = store
                .zones()
                .get(&id)
                .map(|z| z.name.clone())
                .ok_or_else(|| anyhow!("no zone with id {}", id))?;
            if !yes && !confirm(&format!("Are you sure you want to delete zone '{}'?", name))? {
                println!("Aborted");
                return Ok(());
            }
            store.delete_zone(&id)?;
            println!("Zone '{}' deleted", name);
        }
        ZonesCommand::Export { output } => {
            let path = output.unwrap_or_else(|| {
                PathBuf::from(zone_console::store::export_file_name(
                    chrono::Local::now().date_naive(),
                ))
            });
            let json = store.export_json()?;
            std::fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
            println!("Configuration exported to {}", path.display());
        }
        ZonesCommand::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("read {}", file.display()))?;
            let count = store.import_config(&text)?;
            println!("Imported {} zones (local only; not sent to the backend)", count);
        }
    }
    Ok(())
}

fn print_zone(zone: &Zone) {
    println!(
        "{:>14}  {:<24} P{}  {:>3} pts  {}  {}",
        zone.id,
        zone.name,
        zone.priority,
        zone.coordinates.len(),
        zone.color,
        zone.created_at
    );
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

// -------------------- Render --------------------

fn run_render(cfg: &ConsoleConfig, api: ApiClient, args: RenderArgs) -> Result<()> {
    let source = match (&args.video_id, &args.image) {
        (Some(id), _) => Some(ImageSource::Url(api.first_frame_url(id)?.to_string())),
        (None, Some(path)) => Some(ImageSource::File(path.clone())),
        (None, None) => None,
    };
    let loader = InlineImageLoader::new(api.agent().clone());
    let cache = SqliteZoneCache::open(&cfg.cache_path)?;
    let mut console = ZoneConsole::from_config(cfg, api, cache, loader);

    console.mount();
    if let Some(source) = source {
        console
            .baseline_events()
            .send(BaselineEvent::SourceChanged(source))
            .map_err(|_| anyhow!("baseline channel closed"))?;
    }
    console.activate();

    let started = Instant::now();
    loop {
        let now_ms = started.elapsed().as_millis() as u64;
        console.tick(now_ms);
        if console.baseline_loaded() || console.baseline_exhausted() {
            break;
        }
        let wait = console
            .next_deadline_ms()
            .map(|deadline| deadline.saturating_sub(now_ms))
            .unwrap_or(50)
            .max(1);
        std::thread::sleep(Duration::from_millis(wait));
    }
    if console.baseline_exhausted() {
        log::warn!("no baseline image; rendering zones on a blank canvas");
    }

    match args.format {
        RenderFormat::Png => {
            let mut surface = PixmapSurface::new(console.canvas())?;
            console.render_to(&mut surface);
            surface.save_png(&args.output)?;
        }
        RenderFormat::Json => {
            let json = console.frame().to_json()?;
            std::fs::write(&args.output, json)
                .with_context(|| format!("write {}", args.output.display()))?;
        }
    }
    console.shutdown();
    println!(
        "{} zones rendered to {}",
        console.zones().len(),
        args.output.display()
    );
    Ok(())
}

// -------------------- Video --------------------

fn run_video(api: &ApiClient, cmd: VideoCommand) -> Result<()> {
    match cmd {
        VideoCommand::Upload { path } => {
            let uploaded = api.upload_video(&path)?;
            println!("Video uploaded: {}", uploaded.video_id);
            print_metadata(api, &uploaded.video_id);
        }
        VideoCommand::Info { video_id } => {
            let meta = api.video_metadata(&video_id)?;
            println!("Duration:   {}", meta.duration_label());
            println!("Resolution: {}", meta.resolution_label());
            println!("FPS:        {}", meta.fps_label());
        }
        VideoCommand::Frame { video_id, output } => {
            let bytes = api.first_frame(&video_id)?;
            write_bytes(&output, &bytes)?;
            println!("First frame saved to {}", output.display());
        }
    }
    Ok(())
}

fn print_metadata(api: &ApiClient, video_id: &str) {
    match api.video_metadata(video_id) {
        Ok(meta) => println!(
            "{} | {} | {}",
            meta.duration_label(),
            meta.resolution_label(),
            meta.fps_label()
        ),
        Err(err) => log::warn!("video metadata unavailable: {:#}", err),
    }
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

// -------------------- Beam --------------------

fn run_beam(api: ApiClient, cmd: BeamCommand) -> Result<()> {
    let mut monitor = BeamMonitor::new(api);
    match cmd {
        BeamCommand::Start { video_id } => {
            monitor.start(Some(&video_id), 0)?;
            println!(
                "Monitoring started; stream at {}",
                monitor.stream_url().unwrap_or_default()
            );
        }
        BeamCommand::Stop => {
            monitor.stop()?;
            println!("Monitoring stopped");
        }
        BeamCommand::EmergencyStop => {
            monitor.emergency_stop()?;
            println!("EMERGENCY STOP sent");
        }
        BeamCommand::Status => {
            let status = monitor.poll_status()?;
            println!("Beam active: {}", status.is_active);
        }
        BeamCommand::Watch { video_id } => watch(&mut monitor, &video_id)?,
    }
    Ok(())
}

fn watch(monitor: &mut BeamMonitor<ApiClient>, video_id: &str) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    let started = Instant::now();
    monitor.start(Some(video_id), 0)?;
    println!(
        "Monitoring {}; stream at {}",
        video_id,
        monitor.stream_url().unwrap_or_default()
    );
    for zone in monitor.zone_feed() {
        println!("  zone {} ({} points)", zone.label(), zone.coordinates.len());
    }

    let mut last: Option<bool> = None;
    log::info!("watching beam status (Ctrl-C to stop)...");
    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
        let now_ms = started.elapsed().as_millis() as u64;
        if let Some(status) = monitor.tick(now_ms) {
            if last != Some(status.is_active) {
                println!("Beam active: {}", status.is_active);
                last = Some(status.is_active);
            }
        }
    }
    log::info!("shutdown signal received, stopping monitoring...");
    monitor.stop()
}
