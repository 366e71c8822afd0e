//! Progress and cancellation integration tests.

use std::sync::{Arc, Mutex};

use signpipe::{
    CancellationToken, CropFolders, DetectionBatch, Frame, FrameGeometry, InMemoryFrameStream,
    LandmarkDetector, PipelineError, PipelineOptions, ProgressCallback, ProgressInfo, Stage,
    VideoFolder, detect_geometry,
};

struct Recorder(Mutex<Vec<ProgressInfo>>);

impl ProgressCallback for Recorder {
    fn on_progress(&self, info: &ProgressInfo) {
        self.0.lock().unwrap().push(info.clone());
    }
}

struct BlankDetector;

impl LandmarkDetector for BlankDetector {
    fn detect(&mut self, images: &[Frame]) -> Result<DetectionBatch, PipelineError> {
        let crops = || images.iter().map(|_| Frame::filled(4, 4, [0, 0, 0])).collect::<Vec<_>>();
        Ok(DetectionBatch {
            geometry: images
                .iter()
                .map(|image| FrameGeometry::undetected(image.width(), image.height()))
                .collect(),
            cropped_left_hand: crops(),
            cropped_right_hand: crops(),
            cropped_face: crops(),
            cropped_images: crops(),
        })
    }
}

fn stream_of(count: usize) -> InMemoryFrameStream {
    let mut stream = InMemoryFrameStream::new(25.0, Some((4, 4)));
    for _ in 0..count {
        stream.write_frame(Frame::filled(4, 4, [10, 20, 30]), true).unwrap();
    }
    stream.seek(0);
    stream
}

fn blank_detector() -> Result<Box<dyn LandmarkDetector>, PipelineError> {
    Ok(Box::new(BlankDetector))
}

// ── CancellationToken ──────────────────────────────────────────────

#[test]
fn cancellation_token_default_not_cancelled() {
    let token = CancellationToken::default();
    assert!(!token.is_cancelled());
}

#[test]
fn cancellation_token_clone_shares_state() {
    let token = CancellationToken::new();
    let clone = token.clone();
    assert!(!clone.is_cancelled());

    token.cancel();
    assert!(clone.is_cancelled());
}

// ── detection stage ────────────────────────────────────────────────

#[test]
fn detection_reports_geometry_progress() {
    let dir = tempfile::tempdir().unwrap();
    let folders = CropFolders::of(&VideoFolder::new(dir.path()));
    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    let options = PipelineOptions::new()
        .with_progress(recorder.clone())
        .with_batch_size(25);

    let mut stream = stream_of(100);
    let geometry = detect_geometry(&mut stream, 100, &folders, &blank_detector, &options).unwrap();
    assert_eq!(geometry.len(), 100);

    let reports = recorder.0.lock().unwrap();
    assert!(!reports.is_empty());
    assert!(reports.iter().all(|info| info.stage == Stage::Geometry));
    let last = reports.last().unwrap();
    assert_eq!(last.current, 100);
    assert_eq!(last.percentage, Some(100.0));
}

#[test]
fn cancelled_detection_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let folders = CropFolders::of(&VideoFolder::new(dir.path()));
    let token = CancellationToken::new();
    token.cancel();
    let options = PipelineOptions::new().with_cancellation(token);

    let mut stream = stream_of(50);
    let result = detect_geometry(&mut stream, 50, &folders, &blank_detector, &options);
    assert!(matches!(result, Err(PipelineError::Cancelled)));
}
