pub mod batch;
pub mod check;
pub mod exports;
pub mod history;
pub mod render;

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use montage_common::{AppConfig, MontageError};
use montage_edit_model::{ExportProfile, Platform};
use montage_render_engine::{FfmpegEngine, ProgressCallback, RenderProgress};

/// Read a JSON document from a file, or stdin for `-`.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    let parsed = serde_json::from_str(&content).map_err(|e| {
        MontageError::validation(path.display().to_string(), format!("invalid JSON: {e}"))
    })?;
    Ok(parsed)
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Engine from config, killed on Ctrl-C.
pub fn engine(config: &AppConfig) -> Arc<FfmpegEngine> {
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping engine");
            let _ = cancel_tx.send(true);
        }
    });
    Arc::new(FfmpegEngine::from_config(&config.engine).with_cancel(cancel_rx))
}

pub fn platform_profile(platform: Option<&str>) -> anyhow::Result<Option<ExportProfile>> {
    match platform {
        Some(name) => {
            let platform: Platform = name.parse()?;
            Ok(Some(ExportProfile::for_platform(platform)))
        }
        None => Ok(None),
    }
}

pub fn progress_printer() -> ProgressCallback {
    Arc::new(|p: RenderProgress| {
        if p.complete {
            return;
        }
        print!(
            "\r  Progress: {:.1}% ({:.1}s, ETA: {:.0}s)  ",
            p.progress * 100.0,
            p.out_time_secs,
            p.eta_secs,
        );
        let _ = std::io::stdout().flush();
    })
}
