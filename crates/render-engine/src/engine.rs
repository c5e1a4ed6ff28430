//! Transcoding engine abstraction and the ffmpeg backend.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;

use montage_common::{EngineConfig, MontageError, MontageResult, Stopwatch};
use montage_edit_model::{ExportProfile, QualityTier, VideoCodec};

/// Progress callback for engine runs.
pub type ProgressCallback = Arc<dyn Fn(RenderProgress) + Send + Sync>;

/// Coarse render progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderProgress {
    /// Current progress [0.0, 1.0] (0 when the duration is unknown).
    pub progress: f64,

    /// Output timestamp the engine has reached, in seconds.
    pub out_time_secs: f64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Engine reported the end of the stream.
    pub complete: bool,
}

/// Everything needed for one engine process.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInvocation {
    pub input: String,
    pub extra_inputs: Vec<PathBuf>,
    /// Filter, map, and encoder arguments placed between the inputs and the output.
    pub args: Vec<String>,
    pub output: PathBuf,
    /// Expected output duration, used to turn `out_time` into a percent.
    pub expected_duration_secs: Option<f64>,
}

impl EngineInvocation {
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-i".to_string(),
            self.input.clone(),
        ];
        for extra in &self.extra_inputs {
            args.push("-i".to_string());
            args.push(extra.display().to_string());
        }
        args.extend(self.args.iter().cloned());
        args.push(self.output.display().to_string());
        args
    }
}

/// A transcoding engine.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run one invocation to completion.
    async fn run(
        &self,
        invocation: &EngineInvocation,
        progress: Option<ProgressCallback>,
    ) -> MontageResult<()>;

    /// Best-effort duration of a media input, in seconds.
    async fn probe_duration(&self, input: &str) -> Option<f64>;

    /// Check if this engine is available on the system.
    fn is_available(&self) -> bool;

    /// Engine name.
    fn name(&self) -> &str;
}

/// Encoder arguments for a profile.
pub fn encoder_args(profile: &ExportProfile) -> Vec<String> {
    let codec = profile.codec;
    let mut args = vec![
        "-c:v".to_string(),
        codec.encoder().to_string(),
        "-crf".to_string(),
        profile.quality.crf().to_string(),
        "-b:v".to_string(),
        format!("{}k", profile.video_bitrate_kbps()),
    ];

    match codec {
        VideoCodec::H264 | VideoCodec::Hevc => {
            args.push("-preset".to_string());
            args.push(profile.quality.preset().to_string());
        }
        VideoCodec::Vp9 => {
            let cpu_used = match profile.quality {
                QualityTier::Draft => "5",
                QualityTier::Standard => "2",
                QualityTier::Best => "1",
            };
            args.extend([
                "-deadline".to_string(),
                "good".to_string(),
                "-cpu-used".to_string(),
                cpu_used.to_string(),
            ]);
        }
    }
    if codec == VideoCodec::H264 {
        args.push("-profile:v".to_string());
        args.push("high".to_string());
    }

    args.extend([
        "-c:a".to_string(),
        codec.audio_encoder().to_string(),
        "-b:a".to_string(),
        format!("{}k", profile.audio_bitrate_kbps()),
    ]);
    if codec.extension() == "mp4" {
        args.push("-movflags".to_string());
        args.push("+faststart".to_string());
    }
    args
}

/// ffmpeg run as a child process.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    timeout_secs: Option<u64>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegEngine {
    pub fn new(ffmpeg_bin: impl Into<String>, ffprobe_bin: impl Into<String>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            ffprobe_bin: ffprobe_bin.into(),
            timeout_secs: None,
            cancel_rx: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let engine = Self::new(&config.ffmpeg_bin, &config.ffprobe_bin);
        match config.timeout_secs {
            Some(secs) => engine.with_timeout(secs),
            None => engine,
        }
    }

    /// Kill the engine once `cancel_rx` reads `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Kill the engine after `secs` seconds.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    async fn wait_for_exit(&self, child: &mut Child) -> MontageResult<ExitStatus> {
        enum Outcome {
            Exited(std::io::Result<ExitStatus>),
            Cancelled,
            TimedOut(u64),
        }

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = cancellation(self.cancel_rx.clone()) => Outcome::Cancelled,
            secs = deadline(self.timeout_secs) => Outcome::TimedOut(secs),
        };

        match outcome {
            Outcome::Exited(status) => Ok(status?),
            Outcome::Cancelled => {
                tracing::info!("ffmpeg cancelled, killing process group");
                terminate(child).await;
                Err(MontageError::Cancelled)
            }
            Outcome::TimedOut(secs) => {
                tracing::warn!(timeout_secs = secs, "ffmpeg timed out, killing process group");
                terminate(child).await;
                Err(MontageError::Timeout { secs })
            }
        }
    }
}

/// Resolves once the receiver reads `true`; never resolves without one.
async fn cancellation(rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = rx else {
        return std::future::pending::<()>().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending::<()>().await;
        }
    }
}

/// Resolves with the limit once it elapses; never resolves without one.
async fn deadline(timeout_secs: Option<u64>) -> u64 {
    match timeout_secs {
        Some(secs) => {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            secs
        }
        None => std::future::pending::<u64>().await,
    }
}

/// Kill the child and everything it spawned, then reap it.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The child leads its own process group (see `process_group(0)` at spawn).
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            tracing::debug!(pid, "killpg failed, falling back to direct kill");
        }
    }
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "ffmpeg already exited");
    }
}

#[async_trait]
impl Engine for FfmpegEngine {
    async fn run(
        &self,
        invocation: &EngineInvocation,
        progress: Option<ProgressCallback>,
    ) -> MontageResult<()> {
        let args = invocation.build_args();
        tracing::debug!(args = ?args, "Running ffmpeg");

        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let stopwatch = Stopwatch::start();
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MontageError::engine_unavailable(format!("{} not found", self.ffmpeg_bin))
            } else {
                MontageError::engine_failure(None, format!("Failed to start ffmpeg: {e}"))
            }
        })?;

        tracing::info!(
            pid = child.id(),
            output = %invocation.output.display(),
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MontageError::engine_failure(None, "Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MontageError::engine_failure(None, "Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            if let Err(err) = BufReader::new(stderr).read_to_string(&mut output).await {
                output.push_str(&format!("<failed to read ffmpeg stderr: {err}>"));
            }
            output
        });

        let expected = invocation.expected_duration_secs;
        let progress_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut state = ProgressState::default();
            while let Ok(Some(line)) = lines.next_line().await {
                let Some((key, value)) = line.trim().split_once('=') else {
                    continue;
                };
                state.update(key, value);
                if key == "progress" {
                    if let Some(cb) = &progress {
                        cb(progress_report(&state, expected, stopwatch.elapsed_secs()));
                    }
                }
            }
        });

        let status = match self.wait_for_exit(&mut child).await {
            Ok(status) => status,
            Err(e) => {
                progress_task.abort();
                stderr_task.abort();
                return Err(e);
            }
        };

        let _ = progress_task.await;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(MontageError::engine_failure(
                status.code(),
                stderr_tail(&stderr_output, 20),
            ));
        }

        tracing::info!(
            elapsed_secs = stopwatch.elapsed_secs(),
            output = %invocation.output.display(),
            "ffmpeg finished"
        );
        Ok(())
    }

    async fn probe_duration(&self, input: &str) -> Option<f64> {
        let output = Command::new(&self.ffprobe_bin)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                input,
            ])
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }
        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }

    fn is_available(&self) -> bool {
        which::which(&self.ffmpeg_bin).is_ok()
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Locate the engine binaries on PATH.
pub fn check_tools(config: &EngineConfig) -> Vec<(String, MontageResult<PathBuf>)> {
    [&config.ffmpeg_bin, &config.ffprobe_bin]
        .into_iter()
        .map(|bin| {
            let found = which::which(bin)
                .map_err(|e| MontageError::engine_unavailable(format!("{bin}: {e}")));
            (bin.clone(), found)
        })
        .collect()
}

fn parse_duration(raw: &str) -> Option<f64> {
    let secs = raw.lines().next()?.trim().parse::<f64>().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

/// Last `max_lines` non-empty lines of engine stderr.
fn stderr_tail(stderr: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return "ffmpeg exited without diagnostics".to_string();
    }
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports microseconds under both keys.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_secs = montage_common::us_to_secs(us);
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }
}

fn progress_report(
    state: &ProgressState,
    expected_duration_secs: Option<f64>,
    elapsed_secs: f64,
) -> RenderProgress {
    let progress = match expected_duration_secs {
        Some(expected) if expected > 0.0 => (state.out_time_secs / expected).clamp(0.0, 1.0),
        _ => 0.0,
    };
    let eta_secs = if progress > 0.0 {
        (elapsed_secs / progress) - elapsed_secs
    } else {
        0.0
    }
    .max(0.0);

    RenderProgress {
        progress: if state.complete { 1.0 } else { progress },
        out_time_secs: state.out_time_secs,
        eta_secs,
        complete: state.complete,
    }
}

/// Remove a partially written output, ignoring a missing file.
pub(crate) async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use montage_edit_model::Platform;

    #[test]
    fn test_invocation_args_order() {
        let invocation = EngineInvocation {
            input: "in.mp4".to_string(),
            extra_inputs: vec![PathBuf::from("bed.mp3")],
            args: vec!["-vf".to_string(), "null".to_string()],
            output: PathBuf::from("out.mp4"),
            expected_duration_secs: None,
        };
        let args = invocation.build_args();
        assert_eq!(args[0], "-y");
        let first_input = args.iter().position(|a| a == "in.mp4").unwrap();
        let second_input = args.iter().position(|a| a == "bed.mp3").unwrap();
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert!(first_input < second_input && second_input < vf);
        assert_eq!(args.last().unwrap(), "out.mp4");
        assert!(args.contains(&"pipe:1".to_string()));
    }

    #[test]
    fn test_encoder_args_by_tier() {
        let best = ExportProfile {
            quality: QualityTier::Best,
            ..Default::default()
        };
        let args = encoder_args(&best).join(" ");
        assert!(args.contains("-c:v libx264"));
        assert!(args.contains("-crf 18"));
        assert!(args.contains("-preset slow"));
        assert!(args.contains("-b:v 20000k"));
        assert!(args.contains("-b:a 320k"));
        assert!(args.contains("-movflags +faststart"));
    }

    #[test]
    fn test_encoder_args_vp9() {
        let profile = ExportProfile {
            codec: VideoCodec::Vp9,
            ..ExportProfile::for_platform(Platform::Youtube)
        };
        let args = encoder_args(&profile).join(" ");
        assert!(args.contains("-c:v libvpx-vp9"));
        assert!(args.contains("-c:a libopus"));
        assert!(!args.contains("-preset"));
        assert!(!args.contains("faststart"));
    }

    #[test]
    fn test_progress_parsing() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "5000000");
        let report = progress_report(&state, Some(10.0), 2.0);
        assert!((report.progress - 0.5).abs() < 1e-9);
        assert!((report.eta_secs - 2.0).abs() < 1e-9);

        state.update("progress", "end");
        let done = progress_report(&state, Some(10.0), 4.0);
        assert_eq!(done.progress, 1.0);
        assert!(done.complete);
    }

    #[test]
    fn test_progress_without_duration() {
        let mut state = ProgressState::default();
        state.update("out_time_ms", "3000000");
        let report = progress_report(&state, None, 1.0);
        assert_eq!(report.progress, 0.0);
        assert!((report.out_time_secs - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stderr_tail() {
        let stderr = (1..=30)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let tail = stderr_tail(&stderr, 3);
        assert_eq!(tail, "line 28\nline 29\nline 30");
        assert_eq!(stderr_tail("\n\n", 5), "ffmpeg exited without diagnostics");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10.500000\n"), Some(10.5));
        assert_eq!(parse_duration("N/A"), None);
        assert_eq!(parse_duration("0"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let engine = FfmpegEngine::new("montage-no-such-ffmpeg", "montage-no-such-ffprobe");
        assert!(!engine.is_available());
        let invocation = EngineInvocation {
            input: "in.mp4".to_string(),
            extra_inputs: Vec::new(),
            args: Vec::new(),
            output: PathBuf::from("out.mp4"),
            expected_duration_secs: None,
        };
        let err = engine.run(&invocation, None).await.unwrap_err();
        assert!(matches!(err, MontageError::EngineUnavailable { .. }));
        assert!(engine.probe_duration("in.mp4").await.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_resolves_on_signal() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(cancellation(Some(rx)));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
