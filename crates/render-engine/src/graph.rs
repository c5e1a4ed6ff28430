//! Engine-consumable filter graph.
//!
//! A [`FilterGraph`] holds a video chain and a primary-audio chain applied
//! to input 0, plus an optional secondary audio branch fed from input 1.
//! Without a secondary track the chains render as plain `-vf` / `-af`;
//! with one, everything is emitted as a single `-filter_complex`.

use std::path::PathBuf;

use montage_edit_model::{fmt_num, DuckingConfig};

/// One filter in a chain, e.g. `eq=brightness=0.1:contrast=1.2`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStage {
    name: String,
    args: Vec<String>,
}

impl FilterStage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append a `key=value` option.
    pub fn opt(mut self, key: &str, value: impl Into<String>) -> Self {
        self.args.push(format!("{key}={}", value.into()));
        self
    }

    /// Append a numeric `key=value` option.
    pub fn num(self, key: &str, value: f64) -> Self {
        self.opt(key, fmt_num(value))
    }

    /// Append a `key='expr'` option, quoted so commas survive the graph parser.
    pub fn expr(self, key: &str, expr: &str) -> Self {
        self.opt(key, format!("'{expr}'"))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self) -> String {
        if self.args.is_empty() {
            self.name.clone()
        } else {
            format!("{}={}", self.name, self.args.join(":"))
        }
    }
}

/// Secondary audio track mixed under input 0's audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioMixBranch {
    pub track: PathBuf,
    pub volume: f64,
    pub ducking: Option<DuckingConfig>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    pub video: Vec<FilterStage>,
    pub audio: Vec<FilterStage>,
    pub mix: Option<AudioMixBranch>,
}

fn join_chain(stages: &[FilterStage]) -> Option<String> {
    if stages.is_empty() {
        None
    } else {
        Some(
            stages
                .iter()
                .map(FilterStage::render)
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

impl FilterGraph {
    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty() && self.mix.is_none()
    }

    pub fn video_chain(&self) -> Option<String> {
        join_chain(&self.video)
    }

    pub fn audio_chain(&self) -> Option<String> {
        join_chain(&self.audio)
    }

    /// Extra `-i` inputs the graph refers to, in input-index order from 1.
    pub fn extra_inputs(&self) -> Vec<PathBuf> {
        self.mix.iter().map(|mix| mix.track.clone()).collect()
    }

    /// The `-filter_complex` description, when a secondary track is present.
    pub fn filter_complex(&self) -> Option<String> {
        let mix = self.mix.as_ref()?;
        let video = self.video_chain().unwrap_or_else(|| "null".to_string());
        let primary = self.audio_chain().unwrap_or_else(|| "anull".to_string());

        let mut parts = vec![
            format!("[0:v]{video}[vout]"),
            format!("[1:a]volume={}[music]", fmt_num(mix.volume)),
        ];
        match &mix.ducking {
            Some(duck) => {
                parts.push(format!("[0:a]{primary},asplit=2[voice][sc]"));
                parts.push(format!(
                    "[music][sc]sidechaincompress=threshold={:.6}:ratio={}:attack={}:release={}[ducked]",
                    duck.threshold_linear(),
                    fmt_num(duck.ratio),
                    fmt_num(duck.attack_ms),
                    fmt_num(duck.release_ms),
                ));
                parts.push(
                    "[voice][ducked]amix=inputs=2:duration=first:dropout_transition=1[aout]"
                        .to_string(),
                );
            }
            None => {
                parts.push(format!("[0:a]{primary}[voice]"));
                parts.push(
                    "[voice][music]amix=inputs=2:duration=first:dropout_transition=1[aout]"
                        .to_string(),
                );
            }
        }
        Some(parts.join(";"))
    }

    /// Filter and mapping arguments placed after the inputs.
    pub fn to_args(&self) -> Vec<String> {
        if let Some(complex) = self.filter_complex() {
            return vec![
                "-filter_complex".to_string(),
                complex,
                "-map".to_string(),
                "[vout]".to_string(),
                "-map".to_string(),
                "[aout]".to_string(),
            ];
        }

        let mut args = Vec::new();
        if let Some(video) = self.video_chain() {
            args.push("-vf".to_string());
            args.push(video);
        }
        if let Some(audio) = self.audio_chain() {
            args.push("-af".to_string());
            args.push(audio);
        }
        args
    }
}
