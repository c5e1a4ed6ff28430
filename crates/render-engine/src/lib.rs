//! Montage Render Engine
//!
//! Turns edit operations into rendered video files by driving an external
//! transcoding engine (ffmpeg).
//!
//! # Pipeline Architecture
//!
//! ```text
//! operations ──┐
//!              ├── compose (adjust → LUT → overlays → fades → geometry → speed)
//! profile ─────┘         │
//!                        ▼
//!                   FilterGraph ── -vf/-af or -filter_complex (+ music bed, ducking)
//!                        │
//!                        ▼
//! source ──────────── Engine::run (one process per job)
//!                        │
//!                        ▼
//!              render-{content}-{job}-{ms}.mp4
//! ```
//!
//! Batches repeat the bottom half once per step, feeding each step's output
//! into the next and removing intermediates as they are consumed.

pub mod batch;
pub mod composer;
pub mod engine;
pub mod executor;
pub mod graph;
pub mod lut;

pub use batch::{admit, BatchExecutor, BatchRun, BatchStep, BatchStepKind};
pub use composer::compose;
pub use engine::{
    check_tools, encoder_args, Engine, EngineInvocation, FfmpegEngine, ProgressCallback,
    RenderProgress,
};
pub use executor::RenderExecutor;
pub use graph::{AudioMixBranch, FilterGraph, FilterStage};
