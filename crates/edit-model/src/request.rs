//! Editor render requests.
//!
//! The editor submits its whole state at once: filters, overlays, export
//! options, and timeline segments. [`RenderRequest::to_operations`] lowers
//! that state into the ordered [`EditOperation`] list the composer consumes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use montage_common::{MontageError, MontageResult};

use crate::operation::{AudioMix, ColorAdjustments, EditOperation, LutPreset, ShapeOverlay, TextOverlay};
use crate::profile::{DuckingConfig, ExportProfile};

/// Where the source video comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SourceRef {
    Path(PathBuf),
    Url(String),
}

impl SourceRef {
    /// Interpret a user-supplied location.
    pub fn parse(location: &str) -> MontageResult<Self> {
        let location = location.trim();
        if location.is_empty() {
            return Err(MontageError::validation("source", "source is empty"));
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            Ok(SourceRef::Url(location.to_string()))
        } else {
            Ok(SourceRef::Path(PathBuf::from(location)))
        }
    }

    /// Argument handed to the engine's `-i`.
    pub fn engine_input(&self) -> String {
        match self {
            SourceRef::Path(path) => path.display().to_string(),
            SourceRef::Url(url) => url.clone(),
        }
    }

    pub fn local_path(&self) -> Option<&PathBuf> {
        match self {
            SourceRef::Path(path) => Some(path),
            SourceRef::Url(_) => None,
        }
    }
}

/// Editor filter panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorFilters {
    #[serde(flatten)]
    pub adjustments: ColorAdjustments,
    pub lut_id: Option<String>,
}

/// Export panel: the profile plus the music ducking switch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    #[serde(flatten)]
    pub profile: ExportProfile,
    pub duck_music_when_voiceover: bool,
    /// Target music level under speech, 0..1.
    pub duck_level: Option<f64>,
}

impl ExportOptions {
    /// Resolve into a profile, turning the ducking switch into a curve.
    pub fn resolve_profile(&self) -> ExportProfile {
        let mut profile = self.profile.clone();
        if self.duck_music_when_voiceover && profile.ducking.is_none() {
            profile.ducking = Some(match self.duck_level {
                Some(level) => DuckingConfig::from_duck_level(level),
                None => DuckingConfig::default(),
            });
        }
        profile
    }
}

/// One segment on the editor timeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineSegment {
    /// Segment kind, e.g. `video`, `music`, `voiceover`.
    pub kind: String,
    pub source: Option<String>,
    pub volume: Option<f64>,
}

/// Full editor state submitted for rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderRequest {
    pub content_id: Option<String>,
    pub source: Option<String>,
    pub filters: EditorFilters,
    pub text_overlays: Vec<TextOverlay>,
    pub shape_overlays: Vec<ShapeOverlay>,
    pub export_options: ExportOptions,
    pub timeline_segments: Vec<TimelineSegment>,
}

impl RenderRequest {
    /// Source location. A bare content id resolves to nothing here; the
    /// caller must supply `source` for it.
    pub fn source_ref(&self) -> MontageResult<SourceRef> {
        match (&self.source, &self.content_id) {
            (Some(source), _) => SourceRef::parse(source),
            (None, Some(id)) => Err(MontageError::not_found(format!(
                "source video for content {id}"
            ))),
            (None, None) => Err(MontageError::validation(
                "source",
                "either source or content_id is required",
            )),
        }
    }

    pub fn profile(&self) -> ExportProfile {
        self.export_options.resolve_profile()
    }

    /// Lower the editor state into ordered edit operations.
    ///
    /// An unknown `lut_id` is skipped, matching how unknown operation types
    /// are treated.
    pub fn to_operations(&self) -> MontageResult<Vec<EditOperation>> {
        let mut ops = Vec::new();

        let adjustments = self.filters.adjustments;
        if !adjustments.is_neutral() {
            ops.push(EditOperation::Adjust(adjustments));
        }

        if let Some(lut_id) = self.filters.lut_id.as_deref() {
            if !lut_id.is_empty() && lut_id != "none" {
                match LutPreset::from_id(lut_id) {
                    Some(preset) => ops.push(EditOperation::Lut { preset }),
                    None => tracing::warn!(lut_id, "Skipping unknown LUT preset"),
                }
            }
        }

        ops.extend(self.text_overlays.iter().cloned().map(EditOperation::Text));
        ops.extend(self.shape_overlays.iter().cloned().map(EditOperation::Shape));

        let music = self
            .timeline_segments
            .iter()
            .find(|segment| segment.kind == "music" && segment.source.is_some());
        if let Some(segment) = music {
            if let Some(source) = &segment.source {
                ops.push(EditOperation::BackgroundAudio(AudioMix {
                    track: PathBuf::from(source),
                    volume: segment.volume.unwrap_or(0.3),
                    ducking: None,
                }));
            }
        }

        for op in &ops {
            op.validate()?;
        }
        Ok(ops)
    }
}
