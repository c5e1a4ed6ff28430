//! Sequential batch pipelines.
//!
//! A batch chains heterogeneous steps end to end: step *i*'s output is step
//! *i+1*'s input. Intermediates are named `batch-{run}-step-{index}.{ext}`
//! inside the work directory and never outlive the run, whether it succeeds
//! or fails.
//!
//! Steps are given either tagged (`{"type": "speed-control", "speed": 2.0}`)
//! or in shorthand (`{"speed-control": 2.0}`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use montage_common::{MontageError, MontageResult, Stopwatch};
use montage_edit_model::{
    AudioMix, ColorAdjustments, EditOperation, ExportProfile, LutPreset, ShapeOverlay, SourceRef,
    SpeedChange, TextOverlay,
};

use crate::engine::{remove_partial, ProgressCallback, RenderProgress};
use crate::executor::RenderExecutor;

/// Kinds of step a batch understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchStepKind {
    ColorGrading,
    AudioMixing,
    Typography,
    MotionGraphics,
    SpeedControl,
}

impl BatchStepKind {
    pub fn from_type(name: &str) -> Option<Self> {
        match name {
            "color-grading" => Some(Self::ColorGrading),
            "audio-mixing" => Some(Self::AudioMixing),
            "typography" => Some(Self::Typography),
            "motion-graphics" => Some(Self::MotionGraphics),
            "speed-control" => Some(Self::SpeedControl),
            _ => None,
        }
    }

    /// Parameter a shorthand scalar value stands for.
    fn shorthand_key(&self) -> &'static str {
        match self {
            Self::ColorGrading => "preset",
            Self::AudioMixing => "track",
            Self::Typography => "text",
            Self::MotionGraphics => "kind",
            Self::SpeedControl => "speed",
        }
    }
}

/// One admitted batch step.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchStep {
    /// Runs the engine once with these operations.
    Transform {
        index: usize,
        kind: BatchStepKind,
        operations: Vec<EditOperation>,
    },
    /// Unknown type; the carried-forward artifact is left unchanged.
    Passthrough { index: usize, type_name: String },
}

impl BatchStep {
    pub fn index(&self) -> usize {
        match self {
            BatchStep::Transform { index, .. } | BatchStep::Passthrough { index, .. } => *index,
        }
    }
}

/// Validate a whole batch before anything runs.
///
/// Any malformed step rejects the batch. Unknown step types are admitted as
/// passthroughs.
pub fn admit(raw: &[Value]) -> MontageResult<Vec<BatchStep>> {
    raw.iter()
        .enumerate()
        .map(|(index, value)| admit_step(index, value))
        .collect()
}

fn admit_step(index: usize, value: &Value) -> MontageResult<BatchStep> {
    let field = format!("operations[{index}]");
    let object = value
        .as_object()
        .ok_or_else(|| MontageError::validation(&field, "step must be an object"))?;

    let (type_name, params) = split_step(object)
        .ok_or_else(|| MontageError::validation(&field, "step has no type"))?;

    let Some(kind) = BatchStepKind::from_type(&type_name) else {
        return Ok(BatchStep::Passthrough { index, type_name });
    };

    let params = match params {
        Value::Object(map) => map,
        scalar => {
            let mut map = Map::new();
            map.insert(kind.shorthand_key().to_string(), scalar);
            map
        }
    };

    let operations = step_operations(kind, params)
        .map_err(|e| MontageError::validation(&field, e.to_string()))?;
    for op in &operations {
        op.validate()
            .map_err(|e| MontageError::validation(&field, e.to_string()))?;
    }
    Ok(BatchStep::Transform {
        index,
        kind,
        operations,
    })
}

/// Split a step into its type name and parameters.
fn split_step(object: &Map<String, Value>) -> Option<(String, Value)> {
    if let Some(type_name) = object.get("type").and_then(Value::as_str) {
        let mut params = object.clone();
        params.remove("type");
        return Some((type_name.to_string(), Value::Object(params)));
    }
    if object.len() == 1 {
        let (key, value) = object.iter().next()?;
        return Some((key.clone(), value.clone()));
    }
    None
}

fn require<'a>(params: &'a Map<String, Value>, key: &str) -> MontageResult<&'a Value> {
    params
        .get(key)
        .filter(|value| !value.is_null())
        .ok_or_else(|| MontageError::validation(key, "missing required parameter"))
}

fn step_operations(
    kind: BatchStepKind,
    params: Map<String, Value>,
) -> MontageResult<Vec<EditOperation>> {
    match kind {
        BatchStepKind::ColorGrading => {
            let mut ops = Vec::new();
            if let Some(adjustments) = params.get("adjustments") {
                let adj: ColorAdjustments = serde_json::from_value(adjustments.clone())
                    .map_err(|e| MontageError::validation("adjustments", e.to_string()))?;
                ops.push(EditOperation::Adjust(adj));
            }
            if let Some(preset) = params.get("preset") {
                let id = preset
                    .as_str()
                    .ok_or_else(|| MontageError::validation("preset", "must be a string"))?;
                let preset = LutPreset::from_id(id).ok_or_else(|| {
                    MontageError::validation("preset", format!("unknown preset '{id}'"))
                })?;
                ops.push(EditOperation::Lut { preset });
            }
            if ops.is_empty() {
                return Err(MontageError::validation(
                    "preset",
                    "color grading needs a preset or adjustments",
                ));
            }
            Ok(ops)
        }
        BatchStepKind::AudioMixing => {
            require(&params, "track")?;
            let mix: AudioMix = serde_json::from_value(Value::Object(params))
                .map_err(|e| MontageError::validation("track", e.to_string()))?;
            Ok(vec![EditOperation::BackgroundAudio(mix)])
        }
        BatchStepKind::Typography => {
            require(&params, "text")?;
            let text: TextOverlay = serde_json::from_value(Value::Object(params))
                .map_err(|e| MontageError::validation("text", e.to_string()))?;
            Ok(vec![EditOperation::Text(text)])
        }
        BatchStepKind::MotionGraphics => {
            require(&params, "kind")?;
            let shape: ShapeOverlay = serde_json::from_value(Value::Object(params))
                .map_err(|e| MontageError::validation("kind", e.to_string()))?;
            Ok(vec![EditOperation::Shape(shape)])
        }
        BatchStepKind::SpeedControl => {
            let factor = require(&params, "speed")?
                .as_f64()
                .ok_or_else(|| MontageError::validation("speed", "must be a number"))?;
            Ok(vec![EditOperation::Speed(SpeedChange { factor })])
        }
    }
}

/// Summary of a finished batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRun {
    pub run_id: String,
    pub output: PathBuf,
    pub steps_executed: usize,
    pub steps_skipped: usize,
    pub elapsed_secs: f64,
}

/// Intermediate files owned by one batch run.
///
/// Anything still tracked when the guard drops is removed synchronously.
struct TempArtifacts {
    paths: Vec<PathBuf>,
}

impl TempArtifacts {
    fn new() -> Self {
        Self { paths: Vec::new() }
    }

    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Delete one tracked file once nothing reads from it any more.
    async fn release(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
        remove_partial(path).await;
    }

    async fn cleanup(&mut self) {
        for path in std::mem::take(&mut self.paths) {
            remove_partial(&path).await;
        }
    }
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove batch intermediate");
                }
            }
        }
    }
}

/// Runs admitted batches through a [`RenderExecutor`].
#[derive(Clone)]
pub struct BatchExecutor {
    executor: RenderExecutor,
}

impl BatchExecutor {
    pub fn new(executor: RenderExecutor) -> Self {
        Self { executor }
    }

    fn temp_path(&self, run_id: &str, index: usize, profile: &ExportProfile) -> PathBuf {
        self.executor.work_dir().join(format!(
            "batch-{run_id}-step-{index}.{}",
            profile.codec.extension()
        ))
    }

    /// Admit and run `raw` steps over `source`, leaving exactly one file at
    /// `final_output` on success and none on failure.
    pub async fn run(
        &self,
        source: &SourceRef,
        raw: &[Value],
        profile: &ExportProfile,
        final_output: &Path,
        progress: Option<ProgressCallback>,
    ) -> MontageResult<BatchRun> {
        let steps = admit(raw)?;
        profile.validate()?;

        let run_id = Uuid::new_v4().simple().to_string()[..12].to_string();
        let stopwatch = Stopwatch::start();
        let transforms: Vec<&BatchStep> = steps
            .iter()
            .filter(|step| matches!(step, BatchStep::Transform { .. }))
            .collect();
        for step in &steps {
            if let BatchStep::Passthrough { index, type_name } = step {
                tracing::warn!(
                    run_id = %run_id,
                    index,
                    type_name = %type_name,
                    "Unknown batch step type, passing input through"
                );
            }
        }

        tracing::info!(
            run_id = %run_id,
            steps = steps.len(),
            transforms = transforms.len(),
            output = %final_output.display(),
            "Starting batch"
        );

        if let Some(parent) = final_output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::create_dir_all(self.executor.work_dir()).await?;

        if transforms.is_empty() {
            self.passthrough_copy(source, profile, final_output).await?;
        } else {
            self.run_transforms(&run_id, source, &transforms, profile, final_output, progress)
                .await?;
        }

        let run = BatchRun {
            run_id,
            output: final_output.to_path_buf(),
            steps_executed: transforms.len(),
            steps_skipped: steps.len() - transforms.len(),
            elapsed_secs: stopwatch.elapsed_secs(),
        };
        tracing::info!(
            run_id = %run.run_id,
            executed = run.steps_executed,
            skipped = run.steps_skipped,
            elapsed_secs = run.elapsed_secs,
            "Batch finished"
        );
        Ok(run)
    }

    async fn run_transforms(
        &self,
        run_id: &str,
        source: &SourceRef,
        transforms: &[&BatchStep],
        profile: &ExportProfile,
        final_output: &Path,
        progress: Option<ProgressCallback>,
    ) -> MontageResult<()> {
        let mut temps = TempArtifacts::new();
        let mut current = source.clone();
        let mut previous_temp: Option<PathBuf> = None;

        for (position, step) in transforms.iter().enumerate() {
            let BatchStep::Transform {
                index,
                kind,
                operations,
            } = step
            else {
                continue;
            };
            let is_last = position + 1 == transforms.len();
            let output = if is_last {
                final_output.to_path_buf()
            } else {
                let path = self.temp_path(run_id, *index, profile);
                temps.track(path.clone());
                path
            };

            tracing::info!(run_id, index, kind = ?kind, "Running batch step");
            let step_progress = progress
                .as_ref()
                .map(|callback| scaled_progress(callback.clone(), position, transforms.len()));
            let result = self
                .executor
                .render_to_path(&current, operations, profile, &output, step_progress)
                .await;

            if let Err(e) = result {
                tracing::error!(run_id, index, error = %e, "Batch step failed");
                temps.cleanup().await;
                return Err(e);
            }

            if let Some(done) = previous_temp.take() {
                temps.release(&done).await;
            }
            if !is_last {
                previous_temp = Some(output.clone());
            }
            current = SourceRef::Path(output);
        }

        temps.cleanup().await;
        Ok(())
    }

    /// No step changes the picture: carry the source forward as-is.
    async fn passthrough_copy(
        &self,
        source: &SourceRef,
        profile: &ExportProfile,
        final_output: &Path,
    ) -> MontageResult<()> {
        match source {
            SourceRef::Path(path) => {
                if !path.exists() {
                    return Err(MontageError::not_found(format!(
                        "input video {}",
                        path.display()
                    )));
                }
                if let Err(e) = tokio::fs::copy(path, final_output).await {
                    remove_partial(final_output).await;
                    return Err(e.into());
                }
                Ok(())
            }
            // A remote source has to be fetched by the engine to land on disk.
            SourceRef::Url(_) => {
                self.executor
                    .render_to_path(source, &[], profile, final_output, None)
                    .await
            }
        }
    }
}

/// Map one step's progress onto the whole run: step `position` of `total`
/// covers `[position/total, (position+1)/total]`. Only the last step can
/// report completion.
fn scaled_progress(
    callback: ProgressCallback,
    position: usize,
    total: usize,
) -> ProgressCallback {
    let total = total.max(1) as f64;
    let offset = position as f64;
    let is_last = offset + 1.0 >= total;
    Arc::new(move |p: RenderProgress| {
        callback(RenderProgress {
            progress: ((offset + p.progress.clamp(0.0, 1.0)) / total).min(1.0),
            complete: p.complete && is_last,
            ..p
        })
    })
}
