use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    effects::EffectRegistry,
    error::{EngineError, JobError, Result},
    jobs::{
        params::{TransformParams, TransformRequest},
        registry::JobRegistry,
        runner::{remove_artifact, JobRunner},
        types::{JobId, JobRecord, JobSnapshot, JobStatus},
    },
    video::backend::MediaBackend,
};

const DEFAULT_INPUT_EXTENSION: &str = "mp4";
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// An uploaded file written to the temp directory, not yet owned by a job
#[derive(Debug, Clone, PartialEq)]
pub struct StagedInput {
    pub id: JobId,
    pub path: PathBuf,
    pub original_name: String,
}

/// Entry point for collaborators: staging, scheduling, polling and release
///
/// Jobs run as independent tokio tasks. `create_job` returns as soon as the
/// task is spawned; callers poll [`JobService::get_job`].
///
/// With `jobs.auto_sweep` set, a background task releases jobs that finished
/// more than `jobs.retention_secs` ago. It stops when the service is dropped.
pub struct JobService {
    config: Config,
    registry: Arc<JobRegistry>,
    runner: JobRunner,
    limiter: Option<Arc<Semaphore>>,
    sweeper: Option<JoinHandle<()>>,
}

impl JobService {
    /// Create a service with the built-in effects
    pub fn new(config: Config, backend: Arc<dyn MediaBackend>) -> Result<Self> {
        Self::with_effects(config, backend, EffectRegistry::new())
    }

    /// Create a service resolving actions against a custom effect registry
    pub fn with_effects(config: Config, backend: Arc<dyn MediaBackend>, effects: EffectRegistry) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.engine.temp_dir)?;

        let registry = Arc::new(JobRegistry::new());
        let mut runner = JobRunner::new(Arc::clone(&registry), backend, Arc::new(effects), &config.engine);

        if config.engine.parallel_effects {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.engine.effect_threads)
                .thread_name(|i| format!("clipshop-effects-{}", i))
                .build()
                .map_err(|e| EngineError::effect("thread pool", e.to_string()))?;
            runner = runner.with_pool(Arc::new(pool));
        }

        let limiter = config.jobs.max_concurrent.map(|n| Arc::new(Semaphore::new(n)));

        info!(
            "Job service ready: temp dir {:?}, batch size {}, max concurrent jobs {}",
            config.engine.temp_dir,
            config.engine.batch_size,
            config
                .jobs
                .max_concurrent
                .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
        );

        let mut service = Self {
            config,
            registry,
            runner,
            limiter,
            sweeper: None,
        };
        if service.config.jobs.auto_sweep {
            let every = Duration::from_secs(service.config.jobs.sweep_interval_secs);
            service.start_sweeper(every, service.retention());
        }
        Ok(service)
    }

    /// Release expired jobs every `every`, replacing any running sweeper
    ///
    /// Needs a tokio runtime; without one no sweeper is started and callers
    /// must call [`JobService::sweep_expired`] themselves.
    pub fn start_sweeper(&mut self, every: Duration, retention: Duration) {
        self.stop_sweeper();

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No tokio runtime; expired jobs are only released by explicit sweeps");
                return;
            }
        };

        let every = every.max(MIN_SWEEP_INTERVAL);
        let registry = Arc::clone(&self.registry);
        self.sweeper = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sweep(&registry, retention);
            }
        }));
        debug!("Sweeping every {:?} for jobs older than {:?}", every, retention);
    }

    pub fn stop_sweeper(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|sweeper| !sweeper.is_finished())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Retention window from `jobs.retention_secs`
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.config.jobs.retention_secs)
    }

    /// Write an upload to `input_<id>.<ext>` under the temp directory
    pub async fn stage_input<R>(&self, filename: &str, mut reader: R) -> Result<StagedInput>
    where
        R: AsyncRead + Unpin,
    {
        let id = JobId::new();
        let path = self
            .config
            .engine
            .temp_dir
            .join(format!("input_{}.{}", id, input_extension(filename)));

        let mut file = tokio::fs::File::create(&path).await?;
        let copied = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(file);
                remove_artifact(&path);
                return Err(e.into());
            }
        };
        file.flush().await?;

        debug!("Staged {} ({} bytes) as {:?}", filename, copied, path);
        Ok(StagedInput {
            id,
            path,
            original_name: filename.to_string(),
        })
    }

    /// Stage a file that already exists on local storage
    pub async fn stage_file<P: AsRef<Path>>(&self, path: P) -> Result<StagedInput> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.stage_input(&filename, file).await
    }

    /// Register a job for a staged input and start it in the background
    pub async fn create_job(&self, staged: StagedInput, params: TransformParams) -> Result<JobId> {
        let id = staged.id;
        let output_path = self
            .config
            .engine
            .temp_dir
            .join(format!("edited_{}.{}", id, params.format.extension()));

        let action = params.action.name().to_string();
        self.registry.create(JobRecord::new(id, params, staged.path, output_path))?;

        let runner = self.runner.clone();
        let limiter = self.limiter.clone();
        tokio::spawn(async move {
            // Queued jobs stay Pending until a slot frees up
            let _permit = match limiter {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            if let Err(e) = runner.run(id).await {
                warn!("Job {} could not run: {}", id, e);
            }
        });

        info!("Job {} queued ({}) from {}", id, action, staged.original_name);
        Ok(id)
    }

    /// Validate a loose request and create the job
    ///
    /// A request that fails validation never becomes a job; its staged input
    /// is deleted.
    pub async fn submit(&self, staged: StagedInput, request: &TransformRequest) -> Result<JobId> {
        match TransformParams::from_request(request) {
            Ok(params) => self.create_job(staged, params).await,
            Err(e) => {
                warn!("Rejected request for {}: {}", staged.original_name, e);
                remove_artifact(&staged.path);
                Err(e)
            }
        }
    }

    pub fn get_job(&self, id: JobId) -> Result<JobSnapshot> {
        self.registry.get(id)
    }

    /// Output location of a Completed job
    pub fn get_output_path(&self, id: JobId) -> Result<PathBuf> {
        let record = self.registry.record(id)?;
        if record.status != JobStatus::Completed {
            return Err(JobError::NotReady {
                id: id.to_string(),
                status: record.status.to_string(),
            }
            .into());
        }
        Ok(record.output_path)
    }

    /// Forget a finished job and delete its files
    ///
    /// Called once the output has been downloaded. Running jobs cannot be released.
    pub fn release_job(&self, id: JobId) -> Result<()> {
        release(&self.registry, id)
    }

    /// Release every terminal job older than `retention`; returns how many went
    pub fn sweep_expired(&self, retention: Duration) -> usize {
        sweep(&self.registry, retention)
    }

    /// Poll until the job reaches a terminal state
    pub async fn wait_for(&self, id: JobId, interval: Duration) -> Result<JobSnapshot> {
        loop {
            let snapshot = self.get_job(id)?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

impl Drop for JobService {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

fn release(registry: &JobRegistry, id: JobId) -> Result<()> {
    let record = registry.record(id)?;
    if !record.status.is_terminal() {
        return Err(JobError::NotReady {
            id: id.to_string(),
            status: record.status.to_string(),
        }
        .into());
    }

    let record = registry.delete(id)?;
    remove_artifact(&record.output_path);
    remove_artifact(&record.input_path);
    debug!("Released job {}", id);
    Ok(())
}

fn sweep(registry: &JobRegistry, retention: Duration) -> usize {
    let released = registry
        .expired(retention)
        .into_iter()
        .filter(|&id| match release(registry, id) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not release expired job {}: {}", id, e);
                false
            }
        })
        .count();

    if released > 0 {
        info!("Swept {} expired jobs", released);
    }
    released
}

/// Lowercase alphanumeric extension of an upload name
fn input_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_INPUT_EXTENSION.to_string())
}
