//! Run a sequential batch.

use std::path::PathBuf;

use montage_common::AppConfig;
use montage_edit_model::SourceRef;
use montage_render_engine::{BatchExecutor, RenderExecutor};

pub async fn run(
    config: &AppConfig,
    source: String,
    steps_path: PathBuf,
    output: PathBuf,
    platform: Option<String>,
) -> anyhow::Result<()> {
    config.validate()?;
    let source = SourceRef::parse(&source)?;
    let steps: Vec<serde_json::Value> = super::read_json(&steps_path)?;
    let profile = super::platform_profile(platform.as_deref())?.unwrap_or_default();

    println!("Batch: {} step(s) over {}", steps.len(), source.engine_input());

    let batch = BatchExecutor::new(RenderExecutor::from_config(
        super::engine(config),
        &config.engine,
    ));
    let result = batch
        .run(&source, &steps, &profile, &output, Some(super::progress_printer()))
        .await;
    println!();
    let run = result?;

    println!(
        "Batch complete: {} ({} executed, {} skipped, {:.1}s)",
        run.output.display(),
        run.steps_executed,
        run.steps_skipped,
        run.elapsed_secs
    );
    Ok(())
}
