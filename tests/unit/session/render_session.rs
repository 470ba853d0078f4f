use super::*;

use std::sync::Mutex;

use image::{Rgb, RgbImage};

use crate::encode::sink::InMemorySink;
use crate::foundation::core::CanvasPreset;
use crate::sequence::sequencer::RenderMode;

type Log = Arc<Mutex<Vec<String>>>;

fn config(dir: &Path) -> RunConfig {
    let mut cfg = RunConfig {
        input_dir: dir.join("in"),
        canvas: CanvasPreset::Square,
        ..RunConfig::default()
    };
    cfg.output.dir = dir.join("out");
    cfg.threading.parallel = false;
    cfg
}

fn still(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    RgbImage::from_pixel(40, 30, Rgb(color)).save(&path).unwrap();
    path
}

fn broken(dir: &Path, name: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, b"garbage").unwrap();
    path
}

struct ScriptedSink {
    codec: String,
    fail_at: Option<u64>,
    log: Log,
}

impl FrameSink for ScriptedSink {
    fn begin(&mut self, _cfg: SinkConfig) -> MontageResult<()> {
        self.log.lock().unwrap().push(format!("begin {}", self.codec));
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, _frame: &FrameRgb) -> MontageResult<()> {
        if self.fail_at == Some(idx.0) {
            return Err(MontageError::encode(self.codec.clone(), "broken pipe"));
        }
        Ok(())
    }

    fn end(&mut self) -> MontageResult<()> {
        self.log.lock().unwrap().push(format!("end {}", self.codec));
        Ok(())
    }

    fn abort(&mut self) {
        self.log.lock().unwrap().push(format!("abort {}", self.codec));
    }
}

#[derive(Default)]
struct ScriptedFactory {
    failing: Vec<&'static str>,
    missing: Vec<&'static str>,
    log: Log,
}

impl ScriptedFactory {
    fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl SinkFactory for ScriptedFactory {
    fn make_sink(&self, codec: &VideoCodec, _out: &Path) -> MontageResult<Box<dyn FrameSink>> {
        let name = codec.encoder_name();
        Ok(Box::new(ScriptedSink {
            codec: name.to_owned(),
            fail_at: self.failing.iter().any(|f| *f == name).then_some(2),
            log: self.log.clone(),
        }))
    }

    fn supports(&self, codec: &VideoCodec) -> bool {
        !self.missing.iter().any(|m| *m == codec.encoder_name())
    }

    fn discard_output(&self, _path: &Path) {
        self.log.lock().unwrap().push("discard".to_owned());
    }
}

#[test]
fn frames_reach_the_sink_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let input = cfg.input_dir.clone();
    still(&input, "1.png", [255, 0, 0]);
    still(&input, "2.png", [0, 0, 255]);

    let session = RenderSession::new(cfg).unwrap();
    let items = session.discover().unwrap();
    let mut sink = InMemorySink::new();
    let report = session.render_to_sink(&items, &mut sink).unwrap();

    assert_eq!(report.frames_total, 20);
    assert!(sink.is_finished());
    let cfg = sink.config().unwrap();
    assert_eq!((cfg.width, cfg.height), (1080, 1080));
    let idx: Vec<u64> = sink.frames().iter().map(|(i, _)| i.0).collect();
    assert_eq!(idx, (0..20).collect::<Vec<_>>());
    assert_eq!(sink.frames()[0].1.pixel(540, 540), Some([255, 0, 0]));
    assert_eq!(sink.frames()[19].1.pixel(540, 540), Some([0, 0, 255]));
}

#[test]
fn parallel_session_matches_serial_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.timing.image_duration_secs = Some(1.2);
    let input = cfg.input_dir.clone();
    still(&input, "a.png", [200, 100, 50]);

    let serial = RenderSession::new(cfg.clone()).unwrap();
    let items = serial.discover().unwrap();
    let mut a = InMemorySink::new();
    serial.render_to_sink(&items, &mut a).unwrap();

    cfg.threading.parallel = true;
    cfg.threading.threads = Some(2);
    cfg.threading.channel_capacity = 4;
    cfg.threading.chunk_size = 5;
    let parallel = RenderSession::new(cfg).unwrap();
    let mut b = InMemorySink::new();
    parallel.render_to_sink(&items, &mut b).unwrap();

    assert_eq!(a.frames().len(), 36);
    assert_eq!(a.frames(), b.frames());
}

#[test]
fn no_decodable_media_never_starts_the_sink() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let input = cfg.input_dir.clone();
    broken(&input, "a.png");
    broken(&input, "b.jpg");

    let session = RenderSession::new(cfg).unwrap();
    let items = session.discover().unwrap();
    let mut sink = InMemorySink::new();
    let err = session.render_to_sink(&items, &mut sink).unwrap_err();
    assert!(matches!(err, MontageError::NoMedia(_)), "{err}");
    assert!(sink.config().is_none());

    let err = session.render_to_sink(&[], &mut sink).unwrap_err();
    assert!(matches!(err, MontageError::NoMedia(_)));
}

#[test]
fn sink_failure_aborts_and_wins() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let input = cfg.input_dir.clone();
    still(&input, "a.png", [1, 2, 3]);

    let session = RenderSession::new(cfg).unwrap();
    let items = session.discover().unwrap();
    let log = Log::default();
    let mut sink = ScriptedSink {
        codec: "libx264".to_owned(),
        fail_at: Some(2),
        log: log.clone(),
    };
    let err = session.render_to_sink(&items, &mut sink).unwrap_err();
    match err {
        MontageError::Encode { codec, message } => {
            assert_eq!(codec, "libx264");
            assert!(message.contains("broken pipe"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(*log.lock().unwrap(), vec!["begin libx264", "abort libx264"]);
}

#[test]
fn encoder_failure_falls_back_to_the_next_codec() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let input = cfg.input_dir.clone();
    still(&input, "a.png", [9, 9, 9]);
    let out = cfg.output_path();

    let session = RenderSession::new(cfg).unwrap();
    let items = session.discover().unwrap();
    let factory = ScriptedFactory {
        failing: vec!["libsvtav1"],
        ..ScriptedFactory::default()
    };
    let (report, codec) = session
        .render_with_fallback(&items, &factory, &out)
        .unwrap();
    assert_eq!(codec, VideoCodec::X264);
    assert_eq!(report.frames_total, 10);
    assert_eq!(
        factory.events(),
        vec![
            "begin libsvtav1",
            "abort libsvtav1",
            "discard",
            "begin libx264",
            "end libx264"
        ]
    );
}

#[test]
fn unavailable_codecs_are_skipped_without_an_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let input = cfg.input_dir.clone();
    still(&input, "a.png", [9, 9, 9]);
    let out = cfg.output_path();

    let session = RenderSession::new(cfg).unwrap();
    let items = session.discover().unwrap();
    let factory = ScriptedFactory {
        missing: vec!["libsvtav1"],
        ..ScriptedFactory::default()
    };
    let (_, codec) = session
        .render_with_fallback(&items, &factory, &out)
        .unwrap();
    assert_eq!(codec, VideoCodec::X264);
    assert_eq!(factory.events(), vec!["begin libx264", "end libx264"]);
}

#[test]
fn exhausting_every_codec_is_an_encode_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let input = cfg.input_dir.clone();
    still(&input, "a.png", [9, 9, 9]);
    let out = cfg.output_path();

    let session = RenderSession::new(cfg).unwrap();
    let items = session.discover().unwrap();
    let factory = ScriptedFactory {
        failing: vec!["libsvtav1", "libx264"],
        ..ScriptedFactory::default()
    };
    let err = session
        .render_with_fallback(&items, &factory, &out)
        .unwrap_err();
    assert!(err.is_encoder_failure());
    let text = err.to_string();
    assert!(text.contains("libsvtav1,libx264"), "{text}");
    assert_eq!(
        factory.events().iter().filter(|e| *e == "discard").count(),
        2
    );
}

#[test]
fn non_encoder_failures_do_not_fall_back() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let input = cfg.input_dir.clone();
    broken(&input, "a.png");
    let out = cfg.output_path();

    let session = RenderSession::new(cfg).unwrap();
    let items = session.discover().unwrap();
    let factory = ScriptedFactory::default();
    let err = session
        .render_with_fallback(&items, &factory, &out)
        .unwrap_err();
    assert!(matches!(err, MontageError::NoMedia(_)));
    assert_eq!(factory.events(), vec!["discard"]);
}

#[test]
fn existing_output_is_kept_without_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.output.overwrite = false;
    let input = cfg.input_dir.clone();
    still(&input, "a.png", [9, 9, 9]);
    let out = cfg.output_path();
    std::fs::create_dir_all(out.parent().unwrap()).unwrap();
    std::fs::write(&out, b"keep me").unwrap();

    let session = RenderSession::new(cfg).unwrap();
    let items = session.discover().unwrap();
    let factory = ScriptedFactory::default();
    let err = session
        .render_with_fallback(&items, &factory, &out)
        .unwrap_err();
    assert!(matches!(err, MontageError::Validation(_)));
    assert!(factory.events().is_empty());
    assert_eq!(std::fs::read(&out).unwrap(), b"keep me");
}

#[test]
fn run_reports_items_and_chapters() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.mode = RenderMode::Batch;
    cfg.timing.image_duration_secs = Some(1.0);
    let input = cfg.input_dir.clone();
    still(&input, "img2.png", [9, 9, 9]);
    broken(&input, "img10.png");
    still(&input, "img1.png", [90, 90, 90]);

    let session = RenderSession::new(cfg).unwrap();
    let report = session.run(&ScriptedFactory::default()).unwrap();

    // Two 30-frame items joined by a 0.3 s (9-frame) crossfade.
    assert_eq!(report.frames, 51);
    assert_eq!(report.codec, VideoCodec::SvtAv1);
    assert!(report.poster.is_none());
    let titles: Vec<&str> = report.chapters.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["img1", "img2"]);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].path.ends_with("img10.png"));
    assert!(report.output.ends_with("out/output.mp4"));
}

#[test]
fn run_without_media_fails() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    std::fs::create_dir_all(&cfg.input_dir).unwrap();
    std::fs::write(cfg.input_dir.join("notes.txt"), b"hi").unwrap();
    let session = RenderSession::new(cfg).unwrap();
    let err = session.run(&ScriptedFactory::default()).unwrap_err();
    assert!(matches!(err, MontageError::NoMedia(_)));
}

#[test]
fn thread_pool_rejects_zero_threads() {
    assert!(build_thread_pool(Some(0)).is_err());
    assert_eq!(build_thread_pool(Some(2)).unwrap().current_num_threads(), 2);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let mut cfg = RunConfig::default();
    cfg.timing.fps = 0;
    assert!(RenderSession::new(cfg).is_err());
}
