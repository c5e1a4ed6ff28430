//! Render an editor-state request.

use std::path::PathBuf;

use montage_common::AppConfig;
use montage_edit_model::RenderRequest;
use montage_render_engine::RenderExecutor;

pub async fn run(
    config: &AppConfig,
    request_path: PathBuf,
    source: Option<String>,
    output: Option<PathBuf>,
    platform: Option<String>,
) -> anyhow::Result<()> {
    config.validate()?;
    let mut request: RenderRequest = super::read_json(&request_path)?;
    if source.is_some() {
        request.source = source;
    }

    let executor = RenderExecutor::from_config(super::engine(config), &config.engine);
    let mut job = executor.job_from_request(&request)?;
    if let Some(profile) = super::platform_profile(platform.as_deref())? {
        job.profile = profile;
    }
    job.profile.validate()?;

    println!("Rendering {}", job.source.engine_input());
    println!("  Job: {}", job.id);
    println!("  Operations: {}", job.operations.len());
    println!("  Profile: {}", job.profile.quality_label());

    let progress = Some(super::progress_printer());
    match output {
        Some(path) => {
            let result = executor
                .render_to_path(&job.source, &job.operations, &job.profile, &path, progress)
                .await;
            println!();
            result?;
            println!("Render complete: {}", path.display());
        }
        None => {
            let result = executor.execute(&mut job, progress).await;
            println!();
            let artifact = result?;
            println!("Render complete: {}", artifact.path.display());
        }
    }
    Ok(())
}
