//! Render job executor.
//!
//! Runs one engine process per job. Each job writes to its own uniquely
//! named output, so jobs over the same source can run side by side.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use montage_common::{Clock, EngineConfig, MontageError, MontageResult, SystemClock};
use montage_edit_model::{
    Artifact, EditOperation, ExportProfile, RenderJob, RenderRequest, SourceRef,
};

use crate::composer::compose;
use crate::engine::{encoder_args, remove_partial, Engine, EngineInvocation, ProgressCallback};

/// Executes render jobs against an [`Engine`].
#[derive(Clone)]
pub struct RenderExecutor {
    engine: Arc<dyn Engine>,
    work_dir: PathBuf,
    public_base_url: Option<String>,
    clock: Arc<dyn Clock>,
}

impl RenderExecutor {
    pub fn new(engine: Arc<dyn Engine>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            work_dir: work_dir.into(),
            public_base_url: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Build an executor from engine settings.
    pub fn from_config(engine: Arc<dyn Engine>, config: &EngineConfig) -> Self {
        Self::new(engine, config.work_dir.clone())
    }

    /// Publish artifacts under `base`, e.g. `/exports`.
    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Turn an editor request into a pending job.
    pub fn job_from_request(&self, request: &RenderRequest) -> MontageResult<RenderJob> {
        let source = request.source_ref()?;
        let operations = request.to_operations()?;
        let profile = request.profile();
        Ok(RenderJob::new(
            request.content_id.clone(),
            source,
            operations,
            profile,
            self.clock.now(),
        ))
    }

    /// Output name unique per invocation: `render-{content}-{job}-{millis}.{ext}`.
    pub fn output_path_for(&self, job: &RenderJob) -> PathBuf {
        let owner = job.content_id.as_deref().unwrap_or("export");
        let name = format!(
            "render-{}-{}-{}.{}",
            sanitize_segment(owner),
            job.short_id(),
            self.clock.now().timestamp_millis(),
            job.profile.codec.extension()
        );
        self.work_dir.join(name)
    }

    /// Run `job` to a terminal state and return its artifact.
    pub async fn execute(
        &self,
        job: &mut RenderJob,
        progress: Option<ProgressCallback>,
    ) -> MontageResult<Artifact> {
        job.start()?;
        let output = self.output_path_for(job);
        tracing::info!(
            job_id = %job.id,
            content_id = job.content_id.as_deref().unwrap_or("-"),
            operations = job.operations.len(),
            output = %output.display(),
            "Starting render job"
        );

        let result = self
            .render_to_path(&job.source, &job.operations, &job.profile, &output, progress)
            .await;

        match result {
            Ok(()) => {
                let artifact = Artifact {
                    url: self.public_url(&output),
                    path: output,
                };
                job.succeed(artifact.clone(), self.clock.now())?;
                tracing::info!(job_id = %job.id, path = %artifact.path.display(), "Render job succeeded");
                Ok(artifact)
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Render job failed");
                job.fail(e.to_string(), self.clock.now())?;
                Err(e)
            }
        }
    }

    /// Compose `ops` and render `source` into `output`.
    ///
    /// A partial `output` never survives a failure.
    pub async fn render_to_path(
        &self,
        source: &SourceRef,
        ops: &[EditOperation],
        profile: &ExportProfile,
        output: &Path,
        progress: Option<ProgressCallback>,
    ) -> MontageResult<()> {
        let graph = compose(ops, profile)?;

        if let Some(path) = source.local_path() {
            if !path.exists() {
                return Err(MontageError::not_found(format!(
                    "input video {}",
                    path.display()
                )));
            }
        }
        for extra in graph.extra_inputs() {
            if !extra.exists() {
                return Err(MontageError::not_found(format!(
                    "audio track {}",
                    extra.display()
                )));
            }
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let input = source.engine_input();
        let speed: f64 = ops
            .iter()
            .filter_map(|op| match op {
                EditOperation::Speed(change) => Some(change.factor),
                _ => None,
            })
            .product();
        let expected_duration_secs = self
            .engine
            .probe_duration(&input)
            .await
            .map(|secs| secs / speed);

        let mut args = graph.to_args();
        args.extend(encoder_args(profile));
        let invocation = EngineInvocation {
            input,
            extra_inputs: graph.extra_inputs(),
            args,
            output: output.to_path_buf(),
            expected_duration_secs,
        };

        if let Err(e) = self.engine.run(&invocation, progress).await {
            remove_partial(output).await;
            return Err(e);
        }
        if !output.exists() {
            return Err(MontageError::engine_failure(
                Some(0),
                format!("engine reported success but {} is missing", output.display()),
            ));
        }
        Ok(())
    }

    fn public_url(&self, output: &Path) -> Option<String> {
        let base = self.public_base_url.as_deref()?;
        let name = output.file_name()?.to_string_lossy();
        Some(format!("{}/{}", base.trim_end_matches('/'), name))
    }
}

/// Keep ids safe for use inside a file name.
fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "export".to_string()
    } else {
        cleaned
    }
}
