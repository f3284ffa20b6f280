use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rayon::ThreadPool;
use tracing::{debug, error, info, warn};

use crate::{
    config::EngineConfig,
    effects::EffectRegistry,
    error::{EngineError, JobError, Result},
    jobs::{
        registry::JobRegistry,
        types::{JobId, JobRecord, JobSnapshot, JobStatus},
    },
    pipeline::{BatchProcessor, FrameWindow, GeometryPlan},
    video::{backend::MediaBackend, sink::SinkSpec},
};

/// Drives one job from Pending to a terminal state
///
/// The runner is the only writer of its job's record. Every failure is
/// converted into a Failed record; nothing escapes to the caller except
/// registry lookups for a job that no longer exists.
#[derive(Clone)]
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    backend: Arc<dyn MediaBackend>,
    effects: Arc<EffectRegistry>,
    batch_size: usize,
    spool_dir: PathBuf,
    pool: Option<Arc<ThreadPool>>,
}

impl JobRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        backend: Arc<dyn MediaBackend>,
        effects: Arc<EffectRegistry>,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            backend,
            effects,
            batch_size: engine.batch_size,
            spool_dir: engine.temp_dir.clone(),
            pool: None,
        }
    }

    /// Run per-frame effects on a shared rayon pool
    pub fn with_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Execute the job and return its terminal snapshot
    ///
    /// The frame loop runs on the blocking pool. Cleanup runs whatever the
    /// outcome, ahead of the final registry write.
    pub async fn run(&self, id: JobId) -> Result<JobSnapshot> {
        let record = self.registry.record(id)?;
        let input_path = record.input_path.clone();
        let output_path = record.output_path.clone();
        let started = Instant::now();

        info!("🎬 Job {} started: {} on {:?}", id, record.params.action.name(), input_path);

        let runner = self.clone();
        let outcome = match tokio::task::spawn_blocking(move || runner.execute(&record)).await {
            Ok(outcome) => outcome,
            Err(join_error) => Err(EngineError::effect("runner", join_error.to_string())),
        };

        // Files reach their final state before the terminal status is published
        cleanup(&input_path, &output_path, outcome.is_err());
        let snapshot = self.settle(id, outcome);

        match &snapshot {
            Ok(s) if s.status == JobStatus::Completed => info!(
                "✅ Job {} completed in {:.2}s: {} frames",
                id,
                started.elapsed().as_secs_f64(),
                s.frames_written.unwrap_or(0)
            ),
            Ok(s) => info!("Job {} finished as {}", id, s.status),
            Err(e) => warn!("Job {} vanished before it could be settled: {}", id, e),
        }

        snapshot
    }

    /// Open, validate, process. Returns frames written.
    fn execute(&self, record: &JobRecord) -> Result<u64> {
        let id = record.id;
        let params = &record.params;

        let mut source = self.backend.open_source(&record.input_path)?;
        let metadata = source.metadata().clone();
        debug!(
            "Job {} source: {}x{} @ {:.2} fps, {} frames ({})",
            id, metadata.width, metadata.height, metadata.fps, metadata.frame_count, metadata.codec
        );

        let stride = params.action.speed().map_or(1, |speed| speed.decimation_stride());
        let window = FrameWindow::resolve(&params.window, metadata.fps, metadata.frame_count, stride)?;
        let geometry = GeometryPlan::resolve(&params.crop, &params.output_size, metadata.width, metadata.height)?;
        let stage = self.effects.resolve(&params.action);

        let mut sink = self.backend.open_sink(
            &record.output_path,
            SinkSpec {
                format: params.format,
                fps: metadata.fps,
                width: geometry.output.0,
                height: geometry.output.1,
            },
        )?;

        self.registry.update_status(id, JobStatus::Processing, Some(0), None)?;
        info!(
            "Job {} processing frames {}..{} (stride {}) through '{}' -> {}x{}",
            id,
            window.start_frame,
            window.end_frame,
            window.stride,
            stage.name(),
            geometry.output.0,
            geometry.output.1
        );

        let mut processor = BatchProcessor::new(stage, self.batch_size).with_spool_dir(&self.spool_dir);
        if let Some(pool) = &self.pool {
            processor = processor.with_pool(Arc::clone(pool));
        }

        let mut progress = 0u8;
        for item in window.frames(source.as_mut()) {
            let item = item?;
            if let Some(frame) = item.frame {
                processor.push(geometry.apply(frame), sink.as_mut())?;
            }

            let current = window.progress(item.index);
            if current != progress {
                progress = current;
                self.registry.update_progress(id, progress)?;
            }
        }

        let stats = processor.finish(sink.as_mut())?;
        if stats.frames_in == 0 || stats.frames_out == 0 {
            return Err(JobError::EmptyOutput.into());
        }

        let encoded = sink.finish()?;
        debug!(
            "Job {} wrote {} frames in {} batches, {} bytes",
            id, encoded.frame_count, stats.batches, encoded.file_size
        );
        Ok(encoded.frame_count)
    }

    fn settle(&self, id: JobId, outcome: Result<u64>) -> Result<JobSnapshot> {
        match outcome {
            Ok(frames) => self.registry.complete(id, frames),
            Err(e) => {
                error!("❌ Job {} failed: {}", id, e);
                self.registry.fail(id, e.to_string())
            }
        }
    }
}

/// Remove the input, and the output too when the job failed
fn cleanup(input_path: &Path, output_path: &Path, failed: bool) {
    remove_artifact(input_path);
    if failed {
        remove_artifact(output_path);
    }
}

pub(crate) fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, ValidationError};
    use crate::jobs::params::{TransformParams, TransformRequest};
    use crate::video::synthetic::{SyntheticBackend, SyntheticClip};
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    struct Harness {
        dir: TempDir,
        registry: Arc<JobRegistry>,
        backend: SyntheticBackend,
        runner: JobRunner,
    }

    impl Harness {
        fn new(backend: SyntheticBackend) -> Self {
            let registry = Arc::new(JobRegistry::new());
            let runner = JobRunner::new(
                Arc::clone(&registry),
                Arc::new(backend.clone()),
                Arc::new(EffectRegistry::new()),
                &EngineConfig::default(),
            );
            Self {
                dir: tempdir().unwrap(),
                registry,
                backend,
                runner,
            }
        }

        fn submit(&self, request: TransformRequest) -> (JobId, PathBuf, PathBuf) {
            let id = JobId::new();
            let input = self.dir.path().join(format!("input_{}.mp4", id));
            let output = self.dir.path().join(format!("edited_{}.mp4", id));
            std::fs::write(&input, b"synthetic").unwrap();
            let params = TransformParams::from_request(&request).unwrap();
            self.registry
                .create(JobRecord::new(id, params, input.clone(), output.clone()))
                .unwrap();
            (id, input, output)
        }
    }

    fn request(action: &str, start: f64, end: f64) -> TransformRequest {
        TransformRequest {
            action: action.to_string(),
            start_time: start,
            end_time: end,
            ..TransformRequest::default()
        }
    }

    #[tokio::test]
    async fn test_trim_completes_and_keeps_output() {
        let harness = Harness::new(SyntheticBackend::default());
        let (id, input, output) = harness.submit(request("trim", 1.0, 3.0));

        let snapshot = harness.runner.run(id).await.unwrap();

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.progress, 100);
        assert_eq!(snapshot.frames_written, Some(60));
        assert!(!input.exists());
        assert!(output.exists());

        let frames = harness.backend.captured(&output).unwrap();
        assert_eq!(frames[0], harness.backend.frame_at(30));
    }

    #[tokio::test]
    async fn test_missing_input_fails_as_source_error() {
        let harness = Harness::new(SyntheticBackend::default());
        let (id, input, output) = harness.submit(request("trim", 0.0, 0.0));
        std::fs::remove_file(&input).unwrap();

        let snapshot = harness.runner.run(id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert!(snapshot.error.unwrap().contains("Failed to open video source"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_bad_crop_fails_before_any_output() {
        let harness = Harness::new(SyntheticBackend::default());
        let mut req = request("crop", 0.0, 0.0);
        req.crop_x = Some(60);
        req.crop_width = Some(10);
        let (id, input, output) = harness.submit(req);

        let snapshot = harness.runner.run(id).await.unwrap();

        assert_eq!(snapshot.status, JobStatus::Failed);
        assert!(snapshot.error.unwrap().contains("Invalid crop rectangle"));
        assert!(harness.backend.captured(&output).is_none());
        assert!(!input.exists() && !output.exists());
    }

    #[tokio::test]
    async fn test_write_failure_removes_partial_output() {
        let harness = Harness::new(SyntheticBackend::default().failing_after(45));
        let (id, _input, output) = harness.submit(request("grayscale", 0.0, 0.0));

        let snapshot = harness.runner.run(id).await.unwrap();

        assert_eq!(snapshot.status, JobStatus::Failed);
        assert!(snapshot.error.unwrap().contains("injected write failure"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_source_without_frames_is_empty_output() {
        let backend = SyntheticBackend::new(SyntheticClip {
            decodable_frames: Some(0),
            ..SyntheticClip::default()
        });
        let harness = Harness::new(backend);
        let (id, _input, output) = harness.submit(request("trim", 0.0, 0.0));

        let snapshot = harness.runner.run(id).await.unwrap();

        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(
            snapshot.error.as_deref(),
            Some(EngineError::from(JobError::EmptyOutput).to_string().as_str())
        );
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_speedup_decimates_and_reverse_flips() {
        let harness = Harness::new(SyntheticBackend::default());

        let mut fast = request("speedup", 0.0, 2.0);
        fast.speed_factor = 3.0;
        let (id, _, output) = harness.submit(fast);
        let snapshot = harness.runner.run(id).await.unwrap();
        assert_eq!(snapshot.frames_written, Some(20));
        assert_eq!(harness.backend.captured(&output).unwrap()[1], harness.backend.frame_at(3));

        let (id, _, output) = harness.submit(request("reverse", 0.0, 2.0));
        harness.runner.run(id).await.unwrap();
        let frames = harness.backend.captured(&output).unwrap();
        assert_eq!(frames.len(), 60);
        assert_eq!(frames[0], harness.backend.frame_at(59));
        assert_eq!(frames[59], harness.backend.frame_at(0));
    }

    #[tokio::test]
    async fn test_slowdown_doubles_frame_count() {
        let harness = Harness::new(SyntheticBackend::default());
        let mut slow = request("slowdown", 0.0, 1.0);
        slow.speed_factor = 2.0;
        let (id, _, _) = harness.submit(slow);

        let snapshot = harness.runner.run(id).await.unwrap();
        assert_eq!(snapshot.frames_written, Some(60));
    }

    #[tokio::test]
    async fn test_fractional_speeds_keep_exact_counts() {
        let harness = Harness::new(SyntheticBackend::default());

        let mut slow = request("speed", 0.0, 5.0);
        slow.speed_factor = 0.7;
        let (id, _, _) = harness.submit(slow);
        let snapshot = harness.runner.run(id).await.unwrap();
        // floor(150 / 0.7) frames, whatever the batch cuts
        assert_eq!(snapshot.frames_written, Some(214));

        let mut fast = request("speedup", 0.0, 0.0);
        fast.speed_factor = 1.7;
        let (id, _, _) = harness.submit(fast);
        let snapshot = harness.runner.run(id).await.unwrap();
        assert_eq!(snapshot.frames_written, Some(176));
    }

    #[tokio::test]
    async fn test_reverse_slowdown_ends_on_first_frame() {
        let harness = Harness::new(SyntheticBackend::default());
        let mut req = request("reverse", 0.0, 2.0);
        req.speed_factor = 0.5;
        let (id, _, output) = harness.submit(req);

        let snapshot = harness.runner.run(id).await.unwrap();
        assert_eq!(snapshot.frames_written, Some(120));
        let frames = harness.backend.captured(&output).unwrap();
        assert_eq!(frames[0], harness.backend.frame_at(59));
        assert_eq!(frames[119], harness.backend.frame_at(0));
    }

    #[tokio::test]
    async fn test_crop_and_resize_output_size() {
        let harness = Harness::new(SyntheticBackend::default());
        let mut req = request("resize", 0.0, 0.5);
        req.crop_x = Some(8);
        req.crop_y = Some(4);
        req.crop_width = Some(40);
        req.crop_height = Some(30);
        req.output_width = Some(20);
        req.output_height = Some(10);
        let (id, _, output) = harness.submit(req);

        harness.runner.run(id).await.unwrap();
        let frames = harness.backend.captured(&output).unwrap();
        assert_eq!(frames.len(), 15);
        assert!(frames.iter().all(|f| f.dimensions() == (20, 10)));
    }

    #[tokio::test]
    async fn test_range_error_leaves_terminal_failed_record() {
        let harness = Harness::new(SyntheticBackend::default());
        let (id, _, _) = harness.submit(request("trim", 5.0, 2.0));

        harness.runner.run(id).await.unwrap();
        let first = harness.registry.get(id).unwrap();
        let second = harness.registry.get(id).unwrap();
        assert_eq!(first.status, JobStatus::Failed);
        assert_eq!(first, second);
        assert!(first.error.unwrap().contains(
            &ValidationError::InvalidRange { start_frame: 150, end_frame: 60 }.to_string()
        ));
    }
}
