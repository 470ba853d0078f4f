use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::MontageResult;
use crate::ordering::natural::sort_natural;

const STILL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "tga"];
const ANIMATED_EXTENSIONS: &[&str] = &["gif", "webp", "apng"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv", "m4v", "avi"];

/// Media kind, resolved once per file at ingestion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Single decoded frame shown for the configured image duration.
    StaticImage,
    /// Clip decoded by `ffmpeg` at its native timing.
    Video,
    /// Multi-frame image (GIF, animated WebP, APNG) with per-frame delays.
    AnimatedImage,
}

impl MediaKind {
    /// Classify a path by extension (case-insensitive). `None` for unsupported files.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let ext = ext.as_str();
        if STILL_EXTENSIONS.contains(&ext) {
            Some(Self::StaticImage)
        } else if ANIMATED_EXTENSIONS.contains(&ext) {
            Some(Self::AnimatedImage)
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// Short label used in logs and the `list` command.
    pub fn label(self) -> &'static str {
        match self {
            Self::StaticImage => "still",
            Self::Video => "video",
            Self::AnimatedImage => "animated",
        }
    }
}

/// One input file scheduled for the output video.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct MediaItem {
    /// Source file.
    pub path: PathBuf,
    /// Kind resolved from the extension.
    pub kind: MediaKind,
    /// Target on-screen duration in seconds.
    pub target_duration_secs: f64,
}

impl MediaItem {
    /// Build an item for `path`, or `None` when the extension is not supported.
    pub fn from_path(path: impl Into<PathBuf>, target_duration_secs: f64) -> Option<Self> {
        let path = path.into();
        let kind = MediaKind::from_path(&path)?;
        Some(Self {
            path,
            kind,
            target_duration_secs,
        })
    }

    /// File stem, used as the chapter title.
    pub fn title(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Walk `root` recursively and return every supported media file in natural order.
pub fn discover_media(root: &Path, target_duration_secs: f64) -> MontageResult<Vec<MediaItem>> {
    let mut paths = Vec::new();
    collect_files(root, &mut paths)?;
    paths.retain(|p| MediaKind::from_path(p).is_some());
    sort_natural(&mut paths);
    Ok(paths
        .into_iter()
        .filter_map(|p| MediaItem::from_path(p, target_duration_secs))
        .collect())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> MontageResult<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("read directory '{}'", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in '{}'", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat '{}'", path.display()))?;
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/assets/item.rs"]
mod tests;
