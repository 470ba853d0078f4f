use crate::foundation::core::{Fps, FrameRange};

/// Chapter marker for one rendered item.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Chapter {
    /// File stem of the item.
    pub title: String,
    /// Output frames owned by the item.
    pub frames: FrameRange,
    /// Start time in seconds.
    pub start_secs: f64,
    /// End time in seconds.
    pub end_secs: f64,
}

impl Chapter {
    /// Chapter covering `frames` at `fps`.
    pub fn new(title: impl Into<String>, frames: FrameRange, fps: Fps) -> Self {
        Self {
            title: title.into(),
            frames,
            start_secs: fps.frames_to_secs(frames.start.0),
            end_secs: fps.frames_to_secs(frames.end.0),
        }
    }
}

/// Render chapters as an `ffmpeg` FFMETADATA1 document with a `1/fps` timebase, so chapter
/// boundaries land exactly on frame boundaries.
pub fn ffmetadata(chapters: &[Chapter], fps: Fps) -> String {
    let mut out = String::from(";FFMETADATA1\n");
    for ch in chapters {
        out.push_str("\n[CHAPTER]\n");
        out.push_str(&format!("TIMEBASE={}/{}\n", fps.den, fps.num));
        out.push_str(&format!("START={}\n", ch.frames.start.0));
        out.push_str(&format!("END={}\n", ch.frames.end.0));
        out.push_str(&format!("title={}\n", escape_metadata(&ch.title)));
    }
    out
}

fn escape_metadata(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/sequence/chapters.rs"]
mod tests;
