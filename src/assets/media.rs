use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use image::RgbImage;

use crate::foundation::core::Fps;
use crate::foundation::error::{MontageError, MontageResult};

/// Basic metadata about a source video file.
#[derive(Clone, Debug)]
pub struct VideoSourceInfo {
    /// Source path used for probing/decoding.
    pub source_path: PathBuf,
    /// Display width in pixels (after rotation metadata is applied).
    pub width: u32,
    /// Display height in pixels (after rotation metadata is applied).
    pub height: u32,
    /// Native frame rate as reported by `r_frame_rate`, when known.
    pub native_fps: Option<(u32, u32)>,
    /// Video stream duration in seconds (container duration as a fallback), when known.
    pub duration_secs: Option<f64>,
    /// Whether ffprobe detected at least one audio stream.
    pub has_audio: bool,
}

impl VideoSourceInfo {
    /// Native duration expressed in output frames, when the duration is known.
    pub fn native_frames(&self, fps: Fps) -> Option<u64> {
        self.duration_secs
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| fps.secs_to_frames_round(d).max(1))
    }
}

/// Probe source video metadata through `ffprobe`.
pub fn probe_video(source_path: &Path) -> MontageResult<VideoSourceInfo> {
    #[derive(serde::Deserialize)]
    struct SideData {
        rotation: Option<f64>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        duration: Option<String>,
        #[serde(default)]
        tags: std::collections::BTreeMap<String, String>,
        #[serde(default)]
        side_data_list: Vec<SideData>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        #[serde(default)]
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| MontageError::decode(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(MontageError::decode(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| MontageError::decode(format!("ffprobe json parse failed: {e}")))?;
    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            MontageError::decode(format!(
                "no video stream found in '{}'",
                source_path.display()
            ))
        })?;
    let coded_w = video_stream
        .width
        .filter(|w| *w > 0)
        .ok_or_else(|| MontageError::decode("missing video width from ffprobe"))?;
    let coded_h = video_stream
        .height
        .filter(|h| *h > 0)
        .ok_or_else(|| MontageError::decode("missing video height from ffprobe"))?;

    // ffmpeg autorotates on decode, so quarter turns swap the decoded frame size.
    let rotation = video_stream
        .side_data_list
        .iter()
        .find_map(|s| s.rotation)
        .or_else(|| {
            video_stream
                .tags
                .get("rotate")
                .and_then(|r| r.parse::<f64>().ok())
        })
        .unwrap_or(0.0);
    let quarter_turn = (rotation.round() as i64).rem_euclid(180) == 90;
    let (width, height) = if quarter_turn {
        (coded_h, coded_w)
    } else {
        (coded_w, coded_h)
    };

    // The container duration also spans audio, so the video stream's own length wins.
    let parse_secs = |s: Option<&str>| {
        s.and_then(|s| s.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
    };
    let duration_secs = parse_secs(video_stream.duration.as_deref()).or_else(|| {
        parse_secs(parsed.format.as_ref().and_then(|f| f.duration.as_deref()))
    });
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(VideoSourceInfo {
        source_path: source_path.to_path_buf(),
        width,
        height,
        native_fps: video_stream.r_frame_rate.as_deref().and_then(parse_ff_ratio),
        duration_secs,
        has_audio,
    })
}

/// Sequential RGB24 decoder backed by one `ffmpeg` subprocess.
///
/// The stream is resampled to the output frame rate, so frame `n` of the stream is the source
/// picture visible at `n / fps`. Frames are read one at a time from the pipe; nothing is buffered
/// beyond the OS pipe.
pub struct VideoFrameStream {
    info: VideoSourceInfo,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    frame_len: usize,
}

impl VideoFrameStream {
    /// Spawn a decoder for `info` resampled to `fps`.
    pub fn spawn(info: VideoSourceInfo, fps: Fps) -> MontageResult<Self> {
        let frame_len = (info.width as usize)
            .checked_mul(info.height as usize)
            .and_then(|v| v.checked_mul(3))
            .filter(|v| *v > 0)
            .ok_or_else(|| MontageError::decode("invalid video dimensions"))?;

        let filter = format!(
            "fps={},scale={}:{}",
            fps.to_ffmpeg_arg(),
            info.width,
            info.height
        );
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&info.source_path)
            .args([
                "-an",
                "-sn",
                "-vf",
                filter.as_str(),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MontageError::decode(format!("failed to spawn ffmpeg decoder: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MontageError::decode("failed to open ffmpeg stdout (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MontageError::decode("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        Ok(Self {
            info,
            child: Some(child),
            stdout: Some(stdout),
            stderr_drain: Some(stderr_drain),
            frame_len,
        })
    }

    /// Read the next frame. `Ok(None)` marks a clean end of stream.
    pub fn next_frame(&mut self) -> MontageResult<Option<RgbImage>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; self.frame_len];
        let mut filled = 0usize;
        while filled < buf.len() {
            match stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(MontageError::decode(format!(
                        "reading decoded frames from '{}' failed: {e}",
                        self.info.source_path.display()
                    )));
                }
            }
        }

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        if filled < buf.len() {
            self.finish()?;
            return Err(MontageError::decode(format!(
                "truncated frame from '{}': got {filled} of {} bytes",
                self.info.source_path.display(),
                self.frame_len
            )));
        }

        RgbImage::from_raw(self.info.width, self.info.height, buf)
            .map(Some)
            .ok_or_else(|| MontageError::decode("decoded frame buffer has the wrong size"))
    }

    fn finish(&mut self) -> MontageResult<()> {
        drop(self.stdout.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| MontageError::decode(format!("failed to wait for ffmpeg decoder: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| MontageError::decode("ffmpeg stderr drain thread panicked"))?
                .unwrap_or_default(),
            None => Vec::new(),
        };
        if !status.success() {
            return Err(MontageError::decode(format!(
                "ffmpeg decoder for '{}' exited with status {status}: {}",
                self.info.source_path.display(),
                String::from_utf8_lossy(&stderr_bytes).trim()
            )));
        }
        Ok(())
    }
}

impl Drop for VideoFrameStream {
    fn drop(&mut self) {
        drop(self.stdout.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
    }
}

fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('/');
    let a = parts.next()?.parse::<u32>().ok()?;
    let b = parts.next()?.parse::<u32>().ok()?;
    if a == 0 || b == 0 {
        return None;
    }
    Some((a, b))
}

#[cfg(test)]
#[path = "../../tests/unit/assets/media.rs"]
mod tests;
