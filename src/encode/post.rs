use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context as _;

use crate::foundation::core::Fps;
use crate::foundation::error::{MontageError, MontageResult};
use crate::sequence::chapters::{Chapter, ffmetadata};

/// Extract the frame at `at_secs` of `video` as a still image (format from the extension).
#[tracing::instrument(skip_all, fields(video = %video.display()))]
pub fn extract_poster(video: &Path, poster: &Path, at_secs: f64) -> MontageResult<()> {
    let at = if at_secs.is_finite() { at_secs.max(0.0) } else { 0.0 };
    let args: Vec<OsString> = vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-nostdin".into(),
        "-ss".into(),
        format!("{at:.3}").into(),
        "-i".into(),
        video.as_os_str().to_owned(),
        "-frames:v".into(),
        "1".into(),
        "-q:v".into(),
        "2".into(),
        poster.as_os_str().to_owned(),
    ];
    run_ffmpeg(&args, "poster extraction")
}

/// Mux `chapters` into `video` in place (stream copy, no re-encode).
#[tracing::instrument(skip_all, fields(video = %video.display(), chapters = chapters.len()))]
pub fn mux_chapters(video: &Path, chapters: &[Chapter], fps: Fps) -> MontageResult<()> {
    if chapters.is_empty() {
        return Ok(());
    }
    let meta = TempFileGuard(Some(sibling(video, "chapters.txt")));
    let ext = video
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let remuxed = TempFileGuard(Some(sibling(video, &format!("chaptered.{ext}"))));
    let meta_path = meta.path()?;
    let remuxed_path = remuxed.path()?;

    std::fs::write(meta_path, ffmetadata(chapters, fps))
        .with_context(|| format!("write chapter metadata '{}'", meta_path.display()))?;
    run_ffmpeg(
        &chapter_remux_args(video, meta_path, remuxed_path),
        "chapter muxing",
    )?;
    std::fs::rename(remuxed_path, video)
        .with_context(|| format!("replace '{}' with chaptered copy", video.display()))?;
    Ok(())
}

fn chapter_remux_args(video: &Path, meta: &Path, remuxed: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-nostdin".into(),
        "-i".into(),
        video.as_os_str().to_owned(),
        "-i".into(),
        meta.as_os_str().to_owned(),
        "-map".into(),
        "0".into(),
        "-map_metadata".into(),
        "1".into(),
        "-map_chapters".into(),
        "1".into(),
        "-c".into(),
        "copy".into(),
    ];
    // A stream copy rewrites the moov atom at the end unless told otherwise.
    if video
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"))
    {
        args.push("-movflags".into());
        args.push("+faststart".into());
    }
    args.push(remuxed.as_os_str().to_owned());
    args
}

fn run_ffmpeg(args: &[OsString], what: &str) -> MontageResult<()> {
    let out = Command::new("ffmpeg")
        .args(args)
        .output()
        .map_err(|e| MontageError::evaluation(format!("failed to run ffmpeg for {what}: {e}")))?;
    if !out.status.success() {
        return Err(MontageError::evaluation(format!(
            "ffmpeg {what} exited with status {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(())
}

/// `<dir>/.<file name>.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{suffix}"))
}

/// Removes the file on drop unless it was renamed away first.
struct TempFileGuard(Option<PathBuf>);

impl TempFileGuard {
    fn path(&self) -> MontageResult<&Path> {
        self.0
            .as_deref()
            .ok_or_else(|| MontageError::evaluation("temporary path already released"))
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/post.rs"]
mod tests;
