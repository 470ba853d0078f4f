use super::*;

use std::path::Path;

use image::Rgb;

fn canvas() -> Canvas {
    Canvas::new(64, 36).unwrap()
}

fn opts(mode: RenderMode) -> SequencerOpts {
    SequencerOpts {
        mode,
        ..SequencerOpts::new(canvas(), Fps::whole(30).unwrap())
    }
}

fn still(dir: &Path, name: &str, w: u32, h: u32, color: [u8; 3], secs: f64) -> MediaItem {
    let path = dir.join(name);
    RgbImage::from_pixel(w, h, Rgb(color)).save(&path).unwrap();
    MediaItem::from_path(path, secs).unwrap()
}

fn broken(dir: &Path, name: &str) -> MediaItem {
    let path = dir.join(name);
    std::fs::write(&path, b"not an image").unwrap();
    MediaItem::from_path(path, 0.33).unwrap()
}

fn collect(
    seq: &Sequencer,
    items: &[MediaItem],
    pool: Option<&rayon::ThreadPool>,
) -> (SequenceReport, Vec<(u64, Arc<FrameRgb>)>) {
    let mut frames = Vec::new();
    let report = seq
        .run(items, pool, &mut |idx, frame| {
            frames.push((idx.0, frame));
            Ok(())
        })
        .unwrap();
    (report, frames)
}

fn center(frame: &FrameRgb) -> [u8; 3] {
    frame.pixel(frame.width / 2, frame.height / 2).unwrap()
}

#[test]
fn streaming_concatenates_items_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![
        still(dir.path(), "1.png", 40, 30, [255, 0, 0], 0.33),
        still(dir.path(), "2.png", 32, 18, [0, 255, 0], 0.33),
        still(dir.path(), "3.png", 40, 30, [0, 0, 255], 0.33),
    ];
    let seq = Sequencer::new(opts(RenderMode::Streaming)).unwrap();
    let (report, frames) = collect(&seq, &items, None);

    assert_eq!(report.frames_total, 30);
    assert_eq!(frames.len(), 30);
    assert!(frames.iter().enumerate().all(|(i, (idx, _))| *idx == i as u64));
    assert!(frames.iter().all(|(_, f)| f.matches(canvas())));
    assert_eq!(center(&frames[0].1), [255, 0, 0]);
    assert_eq!(center(&frames[10].1), [0, 255, 0]);
    assert_eq!(center(&frames[29].1), [0, 0, 255]);

    let starts: Vec<(u64, u64)> = report
        .chapters
        .iter()
        .map(|c| (c.frames.start.0, c.frames.end.0))
        .collect();
    assert_eq!(starts, vec![(0, 10), (10, 20), (20, 30)]);
    assert_eq!(report.chapters[1].title, "2");
}

#[test]
fn undecodable_items_are_skipped_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![
        broken(dir.path(), "0.jpg"),
        still(dir.path(), "1.png", 8, 6, [10, 10, 10], 0.33),
        broken(dir.path(), "2.png"),
        still(dir.path(), "3.png", 8, 6, [20, 20, 20], 0.33),
        broken(dir.path(), "4.bmp"),
    ];
    for mode in [RenderMode::Streaming, RenderMode::Batch] {
        let seq = Sequencer::new(opts(mode)).unwrap();
        let (report, frames) = collect(&seq, &items, None);
        assert_eq!(frames.len(), 20);
        assert_eq!(report.rendered.len(), 2);
        assert_eq!(report.skipped.len(), 3);
        assert!(report.rendered[0].path.ends_with("1.png"));
        assert!(report.rendered[1].path.ends_with("3.png"));
    }
}

#[test]
fn nothing_decodable_yields_no_frames() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![broken(dir.path(), "a.png")];
    let seq = Sequencer::new(opts(RenderMode::Streaming)).unwrap();
    let (report, frames) = collect(&seq, &items, None);
    assert!(frames.is_empty());
    assert_eq!(report.frames_total, 0);
    assert!(report.rendered.is_empty());
}

#[test]
fn static_frames_are_composited_once() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![still(dir.path(), "a.png", 8, 6, [1, 2, 3], 0.33)];
    let seq = Sequencer::new(opts(RenderMode::Streaming)).unwrap();
    let (report, frames) = collect(&seq, &items, None);
    assert_eq!(report.frames_composited, 1);
    assert_eq!(report.frames_elided, 9);
    assert!(frames.iter().all(|(_, f)| Arc::ptr_eq(f, &frames[0].1)));
}

#[test]
fn zooming_stills_grow_frame_by_frame() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![still(dir.path(), "a.png", 40, 30, [200, 200, 200], 2.0)];
    let seq = Sequencer::new(opts(RenderMode::Streaming)).unwrap();
    let (report, frames) = collect(&seq, &items, None);
    assert_eq!(frames.len(), 60);
    assert_eq!(report.frames_composited, 60);

    let lit_width = |f: &FrameRgb| {
        (0..f.width)
            .filter(|x| f.pixel(*x, f.height / 2).unwrap()[0] > 150)
            .count()
    };
    let widths: Vec<usize> = frames.iter().map(|(_, f)| lit_width(f)).collect();
    assert!(widths.windows(2).all(|w| w[0] <= w[1]), "{widths:?}");
    assert!(widths[59] <= 64);
}

#[test]
fn parallel_compositing_matches_serial() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![
        still(dir.path(), "a.png", 40, 30, [200, 10, 10], 1.5),
        still(dir.path(), "b.png", 30, 40, [10, 200, 10], 0.2),
    ];
    let mut o = opts(RenderMode::Streaming);
    o.chunk_size = 7;
    let seq = Sequencer::new(o).unwrap();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(3)
        .build()
        .unwrap();

    let (_, serial) = collect(&seq, &items, None);
    let (_, parallel) = collect(&seq, &items, Some(&pool));
    assert_eq!(serial.len(), parallel.len());
    for ((ia, a), (ib, b)) in serial.iter().zip(parallel.iter()) {
        assert_eq!(ia, ib);
        assert_eq!(**a, **b);
    }
}

#[test]
fn batch_mode_crossfades_adjacent_items() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![
        still(dir.path(), "1.png", 32, 18, [0, 0, 0], 0.33),
        still(dir.path(), "2.png", 32, 18, [255, 255, 255], 0.33),
        still(dir.path(), "3.png", 32, 18, [0, 0, 0], 0.33),
    ];
    let mut o = opts(RenderMode::Batch);
    o.transition_secs = 0.1;
    let seq = Sequencer::new(o).unwrap();
    let (report, frames) = collect(&seq, &items, None);

    // 3 items * 10 frames, minus two 3-frame overlaps.
    assert_eq!(frames.len(), 24);
    assert_eq!(report.frames_total, 24);
    let chapters: Vec<(u64, u64)> = report
        .chapters
        .iter()
        .map(|c| (c.frames.start.0, c.frames.end.0))
        .collect();
    assert_eq!(chapters, vec![(0, 7), (7, 14), (14, 24)]);

    let lum: Vec<u8> = frames.iter().map(|(_, f)| center(f)[0]).collect();
    assert_eq!(lum[6], 0);
    // Incoming opacity j / 3 for j = 0, 1, 2.
    assert_eq!(lum[7], 0);
    assert_eq!(lum[8], 85);
    assert_eq!(lum[9], 170);
    assert_eq!(lum[10], 255);
    assert_eq!(lum[14], 255);
    assert!(lum[15] < 255 && lum[15] > 0);
    assert_eq!(lum[17], 0);
}

#[test]
fn streaming_mode_never_crossfades() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![
        still(dir.path(), "1.png", 32, 18, [0, 0, 0], 0.33),
        still(dir.path(), "2.png", 32, 18, [255, 255, 255], 0.33),
    ];
    let mut o = opts(RenderMode::Streaming);
    o.transition_secs = 0.1;
    let seq = Sequencer::new(o).unwrap();
    let (_, frames) = collect(&seq, &items, None);
    assert_eq!(frames.len(), 20);
    assert_eq!(center(&frames[9].1)[0], 0);
    assert_eq!(center(&frames[10].1)[0], 255);
}

#[test]
fn emit_errors_stop_production() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![still(dir.path(), "a.png", 8, 6, [1, 1, 1], 1.0)];
    let seq = Sequencer::new(opts(RenderMode::Streaming)).unwrap();
    let mut calls = 0;
    let err = seq
        .run(&items, None, &mut |_, _| {
            calls += 1;
            if calls == 3 {
                Err(MontageError::encode("libx264", "broken pipe"))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
    assert!(err.is_encoder_failure());
    assert_eq!(calls, 3);
}

#[test]
fn overlaps_are_clamped() {
    assert_eq!(plan_overlaps(&[10, 10, 10], 3), vec![0, 3, 3]);
    assert_eq!(plan_overlaps(&[1, 10], 3), vec![0, 0]);
    assert_eq!(plan_overlaps(&[10, 1], 3), vec![0, 0]);
    assert_eq!(plan_overlaps(&[5, 5, 5], 4), vec![0, 4, 1]);
    assert_eq!(plan_overlaps(&[10, 10], 0), vec![0, 0]);
    assert!(plan_overlaps(&[], 3).is_empty());
}

#[test]
fn single_frame_render_matches_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let item = still(dir.path(), "z.png", 40, 30, [90, 80, 70], 2.0);
    let o = opts(RenderMode::Streaming);
    let seq = Sequencer::new(o.clone()).unwrap();
    let (_, frames) = collect(&seq, std::slice::from_ref(&item), None);

    let f = render_item_frame(&item, 31, &o).unwrap();
    assert_eq!(f, *frames[31].1);
    assert!(render_item_frame(&item, 60, &o).is_err());
}

#[test]
fn invalid_options_are_rejected() {
    let mut o = opts(RenderMode::Batch);
    o.transition_secs = -1.0;
    assert!(Sequencer::new(o).is_err());

    let mut o = opts(RenderMode::Batch);
    o.chunk_size = 0;
    assert!(Sequencer::new(o).is_err());
}
