use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use montage::{
    CanvasPreset, Container, FfmpegSinkFactory, MediaItem, PixelDepth, RenderMode, RenderSession,
    RunConfig, VideoCodec,
};

#[derive(Parser, Debug)]
#[command(name = "montage", version)]
struct Cli {
    /// Log at debug level (`RUST_LOG` takes precedence).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a media directory to a video (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Print the media that would be rendered, in output order.
    List(ListArgs),
    /// Composite one output frame of one media file as a PNG.
    Frame(FrameArgs),
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CanvasArg {
    Landscape,
    Portrait,
    Square,
}

impl From<CanvasArg> for CanvasPreset {
    fn from(value: CanvasArg) -> Self {
        match value {
            CanvasArg::Landscape => Self::Landscape,
            CanvasArg::Portrait => Self::Portrait,
            CanvasArg::Square => Self::Square,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Streaming,
    Batch,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ContainerArg {
    Mp4,
    Mkv,
}

/// Options shared by every subcommand. Flags override the JSON config.
#[derive(Args, Debug)]
struct CommonArgs {
    /// JSON run configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output canvas.
    #[arg(long, value_enum)]
    canvas: Option<CanvasArg>,

    /// Seconds per item.
    #[arg(long, conflicts_with = "images_per_second")]
    duration: Option<f64>,

    /// Items per second.
    #[arg(long)]
    images_per_second: Option<f64>,

    /// Output frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Disable the slow zoom on stills.
    #[arg(long)]
    no_zoom: bool,
}

impl CommonArgs {
    fn load(&self) -> anyhow::Result<RunConfig> {
        let mut cfg = match self.config.as_deref() {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(canvas) = self.canvas {
            cfg.canvas = canvas.into();
        }
        if let Some(d) = self.duration {
            cfg.timing.image_duration_secs = Some(d);
            cfg.timing.images_per_second = None;
        }
        if let Some(ips) = self.images_per_second {
            cfg.timing.images_per_second = Some(ips);
            cfg.timing.image_duration_secs = None;
        }
        if let Some(fps) = self.fps {
            cfg.timing.fps = fps;
        }
        if self.no_zoom {
            cfg.timing.zoom.enabled = false;
        }
        Ok(cfg)
    }
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Directory of media (walked recursively).
    #[arg(long = "in")]
    in_dir: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,

    /// Output directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Output file name without extension.
    #[arg(long)]
    name: Option<String>,

    /// Join mode.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Crossfade seconds (batch mode).
    #[arg(long)]
    transition: Option<f64>,

    /// Codec preference, repeatable (`av1`, `h264`, `hevc`, `mpeg4` or an encoder name).
    #[arg(long = "codec")]
    codecs: Vec<String>,

    /// Constant rate factor.
    #[arg(long)]
    crf: Option<u8>,

    /// Speed preset, 0 (slowest) to 13 (fastest).
    #[arg(long)]
    preset: Option<u8>,

    /// Output bit depth (8 or 10).
    #[arg(long)]
    bit_depth: Option<u8>,

    /// Output container.
    #[arg(long, value_enum)]
    container: Option<ContainerArg>,

    /// Audio track muxed with `-shortest`.
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Also write `<name>.jpg`.
    #[arg(long)]
    poster: bool,

    /// Mux one chapter per item.
    #[arg(long)]
    chapters: bool,

    /// Fail instead of replacing an existing output.
    #[arg(long)]
    no_overwrite: bool,

    /// Composite on the caller thread only.
    #[arg(long)]
    serial: bool,

    /// Override rayon worker threads.
    #[arg(long)]
    threads: Option<usize>,

    /// Write the render report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Directory of media (walked recursively).
    #[arg(long = "in")]
    in_dir: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct FrameArgs {
    /// Media file.
    #[arg(long)]
    media: PathBuf,

    /// Output frame index within the item (0-based).
    #[arg(long, default_value_t = 0)]
    frame: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::List(args) => cmd_list(args),
        Command::Frame(args) => cmd_frame(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "montage=debug,info"
    } else {
        "montage=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut cfg = args.common.load()?;
    if let Some(dir) = args.in_dir {
        cfg.input_dir = dir;
    }
    if let Some(dir) = args.out_dir {
        cfg.output.dir = dir;
    }
    if let Some(name) = args.name {
        cfg.output.name = name;
    }
    if let Some(mode) = args.mode {
        cfg.mode = match mode {
            ModeArg::Streaming => RenderMode::Streaming,
            ModeArg::Batch => RenderMode::Batch,
        };
    }
    if let Some(t) = args.transition {
        cfg.timing.transition_secs = Some(t);
    }
    if !args.codecs.is_empty() {
        cfg.encode.codecs = args.codecs.iter().map(|c| VideoCodec::parse(c)).collect();
    }
    if let Some(crf) = args.crf {
        cfg.encode.crf = crf;
    }
    if let Some(preset) = args.preset {
        cfg.encode.preset = preset;
    }
    if let Some(depth) = args.bit_depth {
        cfg.encode.pixel_depth = PixelDepth::try_from(depth).map_err(anyhow::Error::msg)?;
    }
    if let Some(container) = args.container {
        cfg.encode.container = match container {
            ContainerArg::Mp4 => Container::Mp4,
            ContainerArg::Mkv => Container::Mkv,
        };
    }
    if args.audio.is_some() {
        cfg.encode.audio = args.audio;
    }
    cfg.output.poster |= args.poster;
    cfg.output.chapters |= args.chapters;
    if args.no_overwrite {
        cfg.output.overwrite = false;
    }
    if args.serial {
        cfg.threading.parallel = false;
    }
    if args.threads.is_some() {
        cfg.threading.threads = args.threads;
    }

    let session = RenderSession::new(cfg)?;
    let factory = FfmpegSinkFactory::probed(
        session.config().encode.clone(),
        session.config().output.overwrite,
    );
    let report = session.run(&factory)?;

    if let Some(path) = args.report {
        let json = serde_json::to_string_pretty(&report).context("serialize render report")?;
        std::fs::write(&path, json)
            .with_context(|| format!("write report '{}'", path.display()))?;
    }
    eprintln!(
        "wrote {} ({} frames, {} items, {})",
        report.output.display(),
        report.frames,
        report.rendered.len(),
        report.codec
    );
    Ok(())
}

fn cmd_list(args: ListArgs) -> anyhow::Result<()> {
    let mut cfg = args.common.load()?;
    if let Some(dir) = args.in_dir {
        cfg.input_dir = dir;
    }
    let session = RenderSession::new(cfg)?;
    let items = session.discover()?;
    for (i, item) in items.iter().enumerate() {
        println!("{i:>5}  {:<14}  {}", item.kind.label(), item.path.display());
    }
    eprintln!("{} media items", items.len());
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let cfg = args.common.load()?;
    let session = RenderSession::new(cfg)?;
    let item = MediaItem::from_path(&args.media, session.config().image_duration_secs())
        .with_context(|| format!("'{}' is not a supported media file", args.media.display()))?;

    let frame = session.render_frame(&item, args.frame)?;
    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    frame
        .to_image()?
        .save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
