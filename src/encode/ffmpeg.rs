use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};

use crate::encode::job::{Container, EncodeSettings, VideoCodec};
use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{MontageError, MontageResult};
use crate::render::frame::FrameRgb;

const STDERR_TAIL_LINES: usize = 20;
const SVTAV1_PARAMS: &str = "tune=0:enable-overlays=1:scd=1";

/// Options for one [`FfmpegSink`] attempt.
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Output file path.
    pub out_path: PathBuf,
    /// Overwrite output file if it already exists.
    pub overwrite: bool,
    /// Encoder for this attempt.
    pub codec: VideoCodec,
    /// Shared encoder knobs.
    pub settings: EncodeSettings,
}

impl FfmpegSinkOpts {
    /// Options writing `out_path` with `codec` and default knobs.
    pub fn new(out_path: impl Into<PathBuf>, codec: VideoCodec) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
            codec,
            settings: EncodeSettings::default(),
        }
    }
}

/// Sink that spawns the system `ffmpeg` and streams raw RGB24 frames to its stdin.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegSink {
    /// Create a new sink that streams into `ffmpeg`.
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            cfg: None,
            last_idx: None,
        }
    }

    fn codec_name(&self) -> String {
        self.opts.codec.encoder_name().to_owned()
    }

    /// Close stdin, wait for the process and collect its stderr.
    fn finish(&mut self) -> MontageResult<(ExitStatus, String)> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| MontageError::evaluation("ffmpeg sink not started"))?;
        let status = child.wait().map_err(|e| {
            MontageError::encode(
                self.codec_name(),
                format!("failed to wait for ffmpeg to finish: {e}"),
            )
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| MontageError::evaluation("ffmpeg stderr drain thread panicked"))?
                .unwrap_or_default(),
            None => Vec::new(),
        };
        Ok((status, stderr_tail(&String::from_utf8_lossy(&stderr_bytes))))
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> MontageResult<()> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(MontageError::validation(
                "ffmpeg sink width/height must be non-zero",
            ));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(MontageError::validation(
                "ffmpeg sink width/height must be even (required for yuv420 output)",
            ));
        }

        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(MontageError::validation(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }
        if let Some(audio) = self.opts.settings.audio.as_ref()
            && !audio.is_file()
        {
            return Err(MontageError::validation(format!(
                "audio file '{}' does not exist",
                audio.display()
            )));
        }

        let args = build_encode_args(&cfg, &self.opts);
        tracing::debug!(codec = %self.opts.codec, ?args, "spawning ffmpeg encoder");
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                MontageError::encode(
                    self.codec_name(),
                    format!("failed to spawn ffmpeg (is it installed and on PATH?): {e}"),
                )
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MontageError::evaluation("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MontageError::evaluation("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRgb) -> MontageResult<()> {
        let cfg = self
            .cfg
            .ok_or_else(|| MontageError::evaluation("ffmpeg sink not started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(MontageError::evaluation(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);

        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(MontageError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        if frame.data.len() != (cfg.width as usize) * (cfg.height as usize) * 3 {
            return Err(MontageError::validation(
                "frame.data size mismatch with width*height*3",
            ));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(MontageError::evaluation("ffmpeg sink is already finalized"));
        };
        if let Err(write_err) = stdin.write_all(&frame.data) {
            // The encoder went away; its exit status and stderr say why.
            let (status, stderr) = self.finish()?;
            return Err(MontageError::encode(
                self.codec_name(),
                format!(
                    "write to ffmpeg stdin failed ({write_err}); \
                     exited with status {status}: {stderr}"
                ),
            ));
        }
        Ok(())
    }

    fn end(&mut self) -> MontageResult<()> {
        let (status, stderr) = self.finish()?;
        self.cfg = None;
        if !status.success() {
            return Err(MontageError::encode(
                self.codec_name(),
                format!("ffmpeg exited with status {status}: {stderr}"),
            ));
        }
        Ok(())
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
        self.cfg = None;
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.abort();
        }
    }
}

/// Full `ffmpeg` argument list for one encode attempt.
pub fn build_encode_args(cfg: &SinkConfig, opts: &FfmpegSinkOpts) -> Vec<OsString> {
    let settings = &opts.settings;
    let codec = &opts.codec;
    let pix_fmt = settings.pixel_depth.pix_fmt(codec);
    let color = settings.color;

    let mut args: Vec<OsString> = Vec::new();
    let mut push = |items: &[&str]| args.extend(items.iter().map(OsString::from));

    push(&[if opts.overwrite { "-y" } else { "-n" }]);
    push(&["-loglevel", "error", "-nostdin"]);
    push(&[
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-s",
        &format!("{}x{}", cfg.width, cfg.height),
        "-r",
        &cfg.fps.to_ffmpeg_arg(),
        "-i",
        "pipe:0",
    ]);
    if let Some(audio) = settings.audio.as_ref() {
        args.push("-i".into());
        args.push(audio.as_os_str().to_owned());
    }
    let mut push = |items: &[&str]| args.extend(items.iter().map(OsString::from));
    push(&["-map", "0:v:0"]);
    if settings.audio.is_some() {
        push(&["-map", "1:a:0?"]);
    }

    push(&[
        "-vf",
        &format!(
            "scale=out_color_matrix={}:out_range=tv,format={pix_fmt}",
            color.matrix()
        ),
        "-pix_fmt",
        pix_fmt,
    ]);
    let crf = settings.crf;
    match codec {
        VideoCodec::SvtAv1 => push(&[
            "-c:v",
            codec.encoder_name(),
            "-crf",
            &crf.to_string(),
            "-preset",
            &settings.preset.to_string(),
            "-svtav1-params",
            SVTAV1_PARAMS,
        ]),
        VideoCodec::X264 | VideoCodec::X265 => push(&[
            "-c:v",
            codec.encoder_name(),
            "-crf",
            &crf.min(51).to_string(),
            "-preset",
            x26x_preset(settings.preset),
        ]),
        VideoCodec::Mpeg4 => push(&[
            "-c:v",
            codec.encoder_name(),
            "-q:v",
            &mpeg4_qscale(crf).to_string(),
        ]),
        VideoCodec::Other(name) => push(&["-c:v", name.as_str(), "-crf", &crf.to_string()]),
    }
    push(&[
        "-color_primaries",
        color.primaries(),
        "-color_trc",
        color.transfer(),
        "-colorspace",
        color.colorspace(),
        "-color_range",
        "tv",
    ]);

    match (settings.audio.is_some(), settings.container) {
        (true, Container::Mp4) => push(&["-c:a", "aac", "-shortest"]),
        (true, Container::Mkv) => push(&["-c:a", "copy", "-shortest"]),
        (false, _) => push(&["-an"]),
    }
    if settings.container == Container::Mp4 {
        push(&["-movflags", "+faststart"]);
    }
    args.push(opts.out_path.as_os_str().to_owned());
    args
}

/// Map the SVT-AV1 style `0..=13` speed scale onto x264/x265 preset names.
fn x26x_preset(preset: u8) -> &'static str {
    match preset {
        0..=1 => "veryslow",
        2..=3 => "slow",
        4..=5 => "medium",
        6..=7 => "fast",
        8..=9 => "faster",
        10..=11 => "veryfast",
        _ => "ultrafast",
    }
}

/// Map a `0..=63` CRF onto the `2..=31` mpeg4 quantizer scale.
fn mpeg4_qscale(crf: u8) -> u32 {
    (u32::from(crf) * 31 / 63).clamp(2, 31)
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> MontageResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Video encoders compiled into the `ffmpeg` on `PATH`.
pub fn available_encoders() -> MontageResult<BTreeSet<String>> {
    let out = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .map_err(|e| MontageError::evaluation(format!("failed to run ffmpeg -encoders: {e}")))?;
    if !out.status.success() {
        return Err(MontageError::evaluation(format!(
            "ffmpeg -encoders exited with status {}",
            out.status
        )));
    }
    Ok(parse_encoder_list(&String::from_utf8_lossy(&out.stdout)))
}

/// Parse the video rows of `ffmpeg -encoders` output.
fn parse_encoder_list(listing: &str) -> BTreeSet<String> {
    listing
        .lines()
        .skip_while(|l| !l.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|l| {
            let mut parts = l.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            flags.starts_with('V').then(|| name.to_owned())
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
