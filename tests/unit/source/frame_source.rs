use super::*;

use std::path::{Path, PathBuf};

use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, RgbaImage};

use crate::encode::ffmpeg::is_ffmpeg_on_path;

fn opts() -> SourceOpts {
    SourceOpts {
        fps: Fps::whole(30).unwrap(),
        video_policy: PlaybackPolicy::PlayThrough,
    }
}

fn write_gif(path: &Path, frames: usize, delay_ms: u32) {
    let file = std::fs::File::create(path).unwrap();
    let mut enc = GifEncoder::new(file);
    let frames = (0..frames).map(|i| {
        let shade = (i * 50 % 256) as u8;
        let buf = RgbaImage::from_pixel(6, 4, image::Rgba([shade, 10, 20, 255]));
        Frame::from_parts(buf, 0, 0, Delay::from_numer_denom_ms(delay_ms, 1))
    });
    enc.encode_frames(frames).unwrap();
}

#[test]
fn still_reuses_one_decoded_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.png");
    RgbImage::from_pixel(8, 6, image::Rgb([1, 2, 3]))
        .save(&path)
        .unwrap();
    let item = MediaItem::from_path(&path, 0.33).unwrap();

    let src = FrameSource::open(&item, &opts()).unwrap();
    assert_eq!(src.frame_count(), 10);
    let bg = src.background().clone();
    let frames: Vec<SourceFrame> = src.collect();
    assert_eq!(frames.len(), 10);
    assert!(frames.iter().all(|f| Arc::ptr_eq(&f.image, &bg)));
    assert_eq!(
        frames.iter().map(|f| f.index).collect::<Vec<_>>(),
        (0..10).collect::<Vec<_>>()
    );
}

#[test]
fn animated_item_is_capped_at_target_duration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long.gif");
    // 10 frames * 500 ms = 5 s native.
    write_gif(&path, 10, 500);
    let item = MediaItem::from_path(&path, 1.0).unwrap();

    let src = FrameSource::open(&item, &opts()).unwrap();
    assert_eq!(src.frame_count(), 30);
    let frames: Vec<SourceFrame> = src.collect();
    assert_eq!(frames.len(), 30);
    assert!(Arc::ptr_eq(&frames[0].image, &frames[14].image));
    assert!(!Arc::ptr_eq(&frames[14].image, &frames[16].image));
    assert!(Arc::ptr_eq(&frames[16].image, &frames[29].image));
}

#[test]
fn short_animation_loops() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.gif");
    // 2 frames * 100 ms = 0.2 s native.
    write_gif(&path, 2, 100);
    let item = MediaItem::from_path(&path, 1.0).unwrap();

    let frames: Vec<SourceFrame> = FrameSource::open(&item, &opts()).unwrap().collect();
    assert_eq!(frames.len(), 30);
    // t = 0.233 s wraps to 0.033 s (first frame), t = 0.333 s wraps to 0.133 s (second frame).
    assert!(Arc::ptr_eq(&frames[0].image, &frames[7].image));
    assert!(Arc::ptr_eq(&frames[4].image, &frames[10].image));
    assert!(!Arc::ptr_eq(&frames[0].image, &frames[10].image));
}

#[test]
fn undecodable_item_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.png");
    std::fs::write(&path, b"nope").unwrap();
    let item = MediaItem::from_path(&path, 1.0).unwrap();

    let err = FrameSource::open(&item, &opts()).unwrap_err();
    assert!(matches!(err, MontageError::Decode(_)), "{err}");
}

#[test]
fn size_hint_counts_down() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.bmp");
    RgbImage::from_pixel(2, 2, image::Rgb([9, 9, 9]))
        .save(&path)
        .unwrap();
    let item = MediaItem::from_path(&path, 0.1).unwrap();

    let mut src = FrameSource::open(&item, &opts()).unwrap();
    assert_eq!(src.size_hint(), (3, Some(3)));
    src.next();
    assert_eq!(src.size_hint(), (2, Some(2)));
    assert!((src.duration_secs() - 0.1).abs() < 1e-9);
}

fn decoded_frames_held(src: &FrameSource) -> usize {
    match &src.frames {
        SourceFrames::Animated(anim) => anim.frames.len(),
        SourceFrames::Still(_) => 1,
        SourceFrames::Video(_) => 0,
    }
}

#[test]
fn long_animation_only_decodes_the_frames_it_shows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.gif");
    // 600 frames * 100 ms = 60 s native, shown for 0.33 s.
    write_gif(&path, 600, 100);
    let item = MediaItem::from_path(&path, 0.33).unwrap();

    let src = FrameSource::open(&item, &opts()).unwrap();
    assert_eq!(src.frame_count(), 10);
    let held = decoded_frames_held(&src);
    assert!(held <= 10, "decoded {held} frames for a 10-frame item");

    let frames: Vec<SourceFrame> = src.collect();
    assert_eq!(frames.len(), 10);
    // t = 0.3 s shows the third or fourth picture, never a wrapped one.
    assert!(!Arc::ptr_eq(&frames[0].image, &frames[9].image));
}

#[test]
fn non_looping_video_holds_its_last_frame_at_end_of_stream() {
    let last = Arc::new(RgbImage::from_pixel(4, 4, image::Rgb([7, 8, 9])));
    let mut playback = VideoPlayback {
        info: VideoSourceInfo {
            source_path: "clip.mp4".into(),
            width: 4,
            height: 4,
            native_fps: Some((30, 1)),
            duration_secs: Some(2.0),
            has_audio: false,
        },
        fps: Fps::whole(30).unwrap(),
        stream: None,
        pending: None,
        last: last.clone(),
        frames_this_pass: 59,
        held: false,
        loops: false,
    };

    for _ in 0..3 {
        assert!(Arc::ptr_eq(&playback.next_frame(), &last));
    }
    assert!(playback.held);
    assert_eq!(playback.frames_this_pass, 59);
}

fn write_clip(dir: &Path, name: &str, video_secs: f64, audio_secs: Option<f64>) -> PathBuf {
    let out = dir.join(name);
    let mut cmd = std::process::Command::new("ffmpeg");
    cmd.args(["-v", "error", "-y", "-f", "lavfi", "-i"])
        .arg(format!("testsrc=d={video_secs}:s=64x48:r=30"));
    if let Some(a) = audio_secs {
        cmd.args(["-f", "lavfi", "-i"])
            .arg(format!("sine=d={a}"))
            .args(["-c:a", "aac"]);
    }
    let status = cmd
        .args(["-c:v", "mpeg4", "-pix_fmt", "yuv420p"])
        .arg(&out)
        .status()
        .unwrap();
    assert!(status.success());
    out
}

fn video_opts(policy: PlaybackPolicy) -> SourceOpts {
    SourceOpts {
        fps: Fps::whole(30).unwrap(),
        video_policy: policy,
    }
}

#[test]
fn short_video_loops_up_to_its_target() {
    if !is_ffmpeg_on_path() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let clip = write_clip(dir.path(), "short.mp4", 0.5, None);
    let item = MediaItem::from_path(&clip, 1.0).unwrap();

    for policy in [PlaybackPolicy::PlayThrough, PlaybackPolicy::Constrained] {
        let src = FrameSource::open(&item, &video_opts(policy)).unwrap();
        assert_eq!(src.frame_count(), 30);
        let frames: Vec<SourceFrame> = src.collect();
        assert_eq!(frames.len(), 30);
        assert!(frames.iter().all(|f| f.image.dimensions() == (64, 48)));
        // The second pass starts over from the first picture.
        let first = frames[0].image.as_raw();
        assert!(frames[14..].iter().any(|f| f.image.as_raw() == first));
    }
}

#[test]
fn long_video_plays_through_or_truncates() {
    if !is_ffmpeg_on_path() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let clip = write_clip(dir.path(), "long.mp4", 3.0, None);
    let item = MediaItem::from_path(&clip, 1.0).unwrap();

    let src = FrameSource::open(&item, &video_opts(PlaybackPolicy::PlayThrough)).unwrap();
    assert_eq!(src.frame_count(), 90);
    let frames: Vec<SourceFrame> = src.collect();
    assert_eq!(frames.len(), 90);
    assert_ne!(frames[89].image.as_raw(), frames[0].image.as_raw());

    let src = FrameSource::open(&item, &video_opts(PlaybackPolicy::Constrained)).unwrap();
    assert_eq!(src.frame_count(), 30);
    assert_eq!(src.count(), 30);
}

#[test]
fn longer_audio_track_does_not_stretch_or_loop_the_clip() {
    if !is_ffmpeg_on_path() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let clip = write_clip(dir.path(), "av.mp4", 2.0, Some(2.5));
    let item = MediaItem::from_path(&clip, 1.0).unwrap();

    let src = FrameSource::open(&item, &video_opts(PlaybackPolicy::PlayThrough)).unwrap();
    assert_eq!(src.frame_count(), 60);
    let frames: Vec<SourceFrame> = src.collect();
    assert_eq!(frames.len(), 60);
    let first = frames[0].image.as_raw();
    assert!(frames[50..].iter().all(|f| f.image.as_raw() != first));
}
