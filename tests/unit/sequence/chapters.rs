use super::*;

use crate::foundation::core::FrameIndex;

fn range(a: u64, b: u64) -> FrameRange {
    FrameRange::new(FrameIndex(a), FrameIndex(b)).unwrap()
}

#[test]
fn chapter_times_follow_frames() {
    let fps = Fps::whole(30).unwrap();
    let ch = Chapter::new("intro", range(30, 75), fps);
    assert!((ch.start_secs - 1.0).abs() < 1e-9);
    assert!((ch.end_secs - 2.5).abs() < 1e-9);
}

#[test]
fn ffmetadata_uses_frame_timebase_and_escapes_titles() {
    let fps = Fps::new(30000, 1001).unwrap();
    let chapters = vec![
        Chapter::new("a=b;c", range(0, 10), fps),
        Chapter::new("next", range(10, 25), fps),
    ];
    let doc = ffmetadata(&chapters, fps);
    assert!(doc.starts_with(";FFMETADATA1\n"));
    assert_eq!(doc.matches("[CHAPTER]").count(), 2);
    assert!(doc.contains("TIMEBASE=1001/30000\nSTART=0\nEND=10\ntitle=a\\=b\\;c\n"));
    assert!(doc.contains("START=10\nEND=25\ntitle=next\n"));
}
