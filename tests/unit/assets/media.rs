use super::*;

// Probing and decoding shell out to `ffprobe`/`ffmpeg`; those paths are covered by the
// integration tests that skip when the tools are unavailable.

#[test]
fn ff_ratio_parsing() {
    assert_eq!(parse_ff_ratio("30000/1001"), Some((30000, 1001)));
    assert_eq!(parse_ff_ratio("25/1"), Some((25, 1)));
    assert_eq!(parse_ff_ratio("0/0"), None);
    assert_eq!(parse_ff_ratio("abc"), None);
}

#[test]
fn native_frames_follow_output_rate() {
    let info = VideoSourceInfo {
        source_path: PathBuf::from("clip.mp4"),
        width: 64,
        height: 36,
        native_fps: Some((25, 1)),
        duration_secs: Some(5.0),
        has_audio: false,
    };
    let fps = Fps::whole(30).unwrap();
    assert_eq!(info.native_frames(fps), Some(150));

    let unknown = VideoSourceInfo {
        duration_secs: None,
        ..info
    };
    assert_eq!(unknown.native_frames(fps), None);
}
