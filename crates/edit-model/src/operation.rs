//! Edit operations.
//!
//! An edit operation is one atomic, typed transformation applied to a
//! source video. Operations arrive as JSON objects tagged by `type`; tags
//! this crate does not know are surfaced as [`ParsedOperation::Unknown`]
//! so callers can skip them instead of failing the whole request.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use montage_common::{MontageError, MontageResult};

use crate::profile::DuckingConfig;

/// Playback-time window during which an overlay is visible.
///
/// `end_secs = None` means "until the end of the video".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_secs: f64,
    pub end_secs: Option<f64>,
}

impl TimeWindow {
    pub fn new(start_secs: f64, end_secs: Option<f64>) -> MontageResult<Self> {
        let window = Self {
            start_secs,
            end_secs,
        };
        window.validate("window")?;
        Ok(window)
    }

    pub fn validate(&self, field: &str) -> MontageResult<()> {
        if !self.start_secs.is_finite() || self.start_secs < 0.0 {
            return Err(MontageError::validation(
                field,
                format!("start {} must be a non-negative number", self.start_secs),
            ));
        }
        if let Some(end) = self.end_secs {
            if !end.is_finite() || end < self.start_secs {
                return Err(MontageError::validation(
                    field,
                    format!("end {end} must not precede start {}", self.start_secs),
                ));
            }
        }
        Ok(())
    }

    /// Engine expression gating a filter to this window.
    pub fn enable_expr(&self) -> String {
        match self.end_secs {
            Some(end) => format!("between(t,{},{})", fmt_num(self.start_secs), fmt_num(end)),
            None => format!("gte(t,{})", fmt_num(self.start_secs)),
        }
    }
}

/// Build an optional window from loose `start_time` / `end_time` fields.
fn window_from(start: Option<f64>, end: Option<f64>) -> Option<TimeWindow> {
    match (start, end) {
        (None, None) => None,
        (start, end) => Some(TimeWindow {
            start_secs: start.unwrap_or(0.0),
            end_secs: end,
        }),
    }
}

/// Color adjustments. Percentages use 100 as neutral; hue is in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorAdjustments {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub hue: f64,
    pub sepia: f64,
    pub vignette: f64,
    pub blur: f64,
}

impl Default for ColorAdjustments {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            hue: 0.0,
            sepia: 0.0,
            vignette: 0.0,
            blur: 0.0,
        }
    }
}

impl ColorAdjustments {
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }

    /// Fold another adjustment into this one.
    ///
    /// Brightness and hue offsets add, contrast and saturation factors
    /// multiply, and the strength-style effects keep the stronger value.
    /// The result stays inside the ranges `validate` accepts.
    pub fn merge(&mut self, other: &ColorAdjustments) {
        self.brightness = (self.brightness + other.brightness - 100.0).clamp(0.0, 200.0);
        self.contrast = (self.contrast * other.contrast / 100.0).clamp(0.0, 200.0);
        self.saturation = (self.saturation * other.saturation / 100.0).clamp(0.0, 200.0);
        self.hue = wrap_degrees(self.hue + other.hue);
        self.sepia = self.sepia.max(other.sepia);
        self.vignette = self.vignette.max(other.vignette);
        self.blur = self.blur.max(other.blur);
    }

    pub fn validate(&self) -> MontageResult<()> {
        let percent_fields = [
            ("brightness", self.brightness, 0.0, 200.0),
            ("contrast", self.contrast, 0.0, 200.0),
            ("saturation", self.saturation, 0.0, 200.0),
            ("hue", self.hue, -180.0, 180.0),
            ("sepia", self.sepia, 0.0, 100.0),
            ("vignette", self.vignette, 0.0, 100.0),
            ("blur", self.blur, 0.0, 100.0),
        ];
        for (field, value, min, max) in percent_fields {
            if !value.is_finite() || value < min || value > max {
                return Err(MontageError::validation(
                    field,
                    format!("{value} is outside {min}..={max}"),
                ));
            }
        }
        Ok(())
    }
}

fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = (deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && deg > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Named color-grading look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LutPreset {
    Cinematic,
    Bleach,
    Log709,
    Vintage,
    FilmNoir,
    GoldenHour,
    CoolBlue,
    Vibrant,
    Moody,
}

impl LutPreset {
    pub const ALL: [LutPreset; 9] = [
        LutPreset::Cinematic,
        LutPreset::Bleach,
        LutPreset::Log709,
        LutPreset::Vintage,
        LutPreset::FilmNoir,
        LutPreset::GoldenHour,
        LutPreset::CoolBlue,
        LutPreset::Vibrant,
        LutPreset::Moody,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            LutPreset::Cinematic => "cinematic",
            LutPreset::Bleach => "bleach",
            LutPreset::Log709 => "log709",
            LutPreset::Vintage => "vintage",
            LutPreset::FilmNoir => "film-noir",
            LutPreset::GoldenHour => "golden-hour",
            LutPreset::CoolBlue => "cool-blue",
            LutPreset::Vibrant => "vibrant",
            LutPreset::Moody => "moody",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|preset| preset.id() == id)
    }
}

/// Text background box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextBackground {
    pub color: String,
    pub opacity: f64,
    pub padding: u32,
}

impl Default for TextBackground {
    fn default() -> Self {
        Self {
            color: "#000000".to_string(),
            opacity: 0.5,
            padding: 8,
        }
    }
}

/// Text outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStroke {
    pub width: u32,
    pub color: String,
}

impl Default for TextStroke {
    fn default() -> Self {
        Self {
            width: 2,
            color: "#000000".to_string(),
        }
    }
}

/// Text drawn over the video. Position is a percentage of the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOverlay {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub font_size: u32,
    pub color: String,
    pub font_file: Option<PathBuf>,
    pub background: Option<TextBackground>,
    pub stroke: Option<TextStroke>,
    /// Alpha fade in/out length at the window edges.
    pub fade_secs: Option<f64>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
}

impl Default for TextOverlay {
    fn default() -> Self {
        Self {
            text: String::new(),
            x: 50.0,
            y: 50.0,
            font_size: 24,
            color: "#FFFFFF".to_string(),
            font_file: None,
            background: None,
            stroke: None,
            fade_secs: None,
            start_time: None,
            end_time: None,
        }
    }
}

impl TextOverlay {
    pub fn window(&self) -> Option<TimeWindow> {
        window_from(self.start_time, self.end_time)
    }

    pub fn validate(&self) -> MontageResult<()> {
        if self.text.trim().is_empty() {
            return Err(MontageError::validation("text", "overlay text is empty"));
        }
        validate_position(self.x, self.y)?;
        if self.font_size == 0 {
            return Err(MontageError::validation("font_size", "must be positive"));
        }
        if let Some(fade) = self.fade_secs {
            if !fade.is_finite() || fade < 0.0 {
                return Err(MontageError::validation("fade_secs", "must be non-negative"));
            }
        }
        if let Some(bg) = &self.background {
            validate_unit("background.opacity", bg.opacity)?;
        }
        if let Some(window) = self.window() {
            window.validate("text.window")?;
        }
        Ok(())
    }
}

/// Shape primitive drawn over the video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Line,
    Arrow,
}

/// Shape overlay. Position and size are percentages of the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeOverlay {
    pub kind: ShapeKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: String,
    pub opacity: f64,
    pub stroke_width: u32,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
}

impl Default for ShapeOverlay {
    fn default() -> Self {
        Self {
            kind: ShapeKind::Rectangle,
            x: 50.0,
            y: 50.0,
            width: 20.0,
            height: 20.0,
            color: "#ffffff".to_string(),
            opacity: 0.5,
            stroke_width: 2,
            start_time: None,
            end_time: None,
        }
    }
}

impl ShapeOverlay {
    pub fn window(&self) -> Option<TimeWindow> {
        window_from(self.start_time, self.end_time)
    }

    pub fn validate(&self) -> MontageResult<()> {
        validate_position(self.x, self.y)?;
        for (field, value) in [("width", self.width), ("height", self.height)] {
            if !value.is_finite() || value <= 0.0 || value > 100.0 {
                return Err(MontageError::validation(
                    field,
                    format!("{value} is outside (0, 100]"),
                ));
            }
        }
        validate_unit("opacity", self.opacity)?;
        if let Some(window) = self.window() {
            window.validate("shape.window")?;
        }
        Ok(())
    }
}

/// Secondary audio track mixed under the source audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMix {
    pub track: PathBuf,
    /// Mix ratio of the secondary track, 0..=1.
    #[serde(default = "default_mix_volume")]
    pub volume: f64,
    /// Overrides the export profile's ducking when present.
    #[serde(default)]
    pub ducking: Option<DuckingConfig>,
}

fn default_mix_volume() -> f64 {
    0.3
}

impl AudioMix {
    pub fn validate(&self) -> MontageResult<()> {
        if self.track.as_os_str().is_empty() {
            return Err(MontageError::validation("track", "audio track path is empty"));
        }
        validate_unit("volume", self.volume)?;
        if let Some(ducking) = &self.ducking {
            ducking.validate()?;
        }
        Ok(())
    }
}

pub const MIN_SPEED: f64 = 0.25;
pub const MAX_SPEED: f64 = 4.0;

/// Playback rate change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedChange {
    pub factor: f64,
}

impl SpeedChange {
    pub fn validate(&self) -> MontageResult<()> {
        if !self.factor.is_finite() || self.factor < MIN_SPEED || self.factor > MAX_SPEED {
            return Err(MontageError::validation(
                "speed",
                format!(
                    "{} is outside {MIN_SPEED}..={MAX_SPEED}",
                    self.factor
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionKind {
    FadeIn,
    FadeOut,
}

/// Fade to or from black, applied to both picture and sound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub kind: TransitionKind,
    pub duration_secs: f64,
    /// Fade start. Defaults to 0 for fade-in; required for fade-out.
    #[serde(default)]
    pub at_secs: Option<f64>,
}

impl Transition {
    pub fn start_secs(&self) -> f64 {
        self.at_secs.unwrap_or(0.0)
    }

    pub fn validate(&self) -> MontageResult<()> {
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(MontageError::validation("duration_secs", "must be positive"));
        }
        match (self.kind, self.at_secs) {
            (TransitionKind::FadeOut, None) => Err(MontageError::validation(
                "at_secs",
                "fade-out needs a start time",
            )),
            (_, Some(at)) if !at.is_finite() || at < 0.0 => Err(MontageError::validation(
                "at_secs",
                "must be a non-negative number",
            )),
            _ => Ok(()),
        }
    }
}

/// A single typed transformation of a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EditOperation {
    Adjust(ColorAdjustments),
    Lut { preset: LutPreset },
    Text(TextOverlay),
    Shape(ShapeOverlay),
    BackgroundAudio(AudioMix),
    Speed(SpeedChange),
    Transition(Transition),
}

impl EditOperation {
    /// Every `type` tag this crate understands.
    pub const TYPE_NAMES: [&'static str; 7] = [
        "adjust",
        "lut",
        "text",
        "shape",
        "background-audio",
        "speed",
        "transition",
    ];

    pub fn type_name(&self) -> &'static str {
        match self {
            EditOperation::Adjust(_) => "adjust",
            EditOperation::Lut { .. } => "lut",
            EditOperation::Text(_) => "text",
            EditOperation::Shape(_) => "shape",
            EditOperation::BackgroundAudio(_) => "background-audio",
            EditOperation::Speed(_) => "speed",
            EditOperation::Transition(_) => "transition",
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> MontageResult<()> {
        match self {
            EditOperation::Adjust(adj) => adj.validate(),
            EditOperation::Lut { .. } => Ok(()),
            EditOperation::Text(text) => text.validate(),
            EditOperation::Shape(shape) => shape.validate(),
            EditOperation::BackgroundAudio(mix) => mix.validate(),
            EditOperation::Speed(speed) => speed.validate(),
            EditOperation::Transition(t) => t.validate(),
        }
    }
}

/// Outcome of parsing one raw operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOperation {
    Known(EditOperation),
    Unknown { type_name: String },
}

/// Parse and validate a raw `{ "type": ..., ... }` operation.
///
/// Unknown tags are not an error. A missing tag or bad parameters on a known
/// tag are.
pub fn parse_operation(raw: &serde_json::Value) -> MontageResult<ParsedOperation> {
    let type_name = raw
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| MontageError::validation("type", "operation has no type"))?;

    if !EditOperation::TYPE_NAMES.contains(&type_name) {
        return Ok(ParsedOperation::Unknown {
            type_name: type_name.to_string(),
        });
    }

    let op: EditOperation = serde_json::from_value(raw.clone())
        .map_err(|e| MontageError::validation(type_name, e.to_string()))?;
    op.validate()?;
    Ok(ParsedOperation::Known(op))
}

/// Parse a list of raw operations, dropping unknown ones with a warning.
pub fn parse_operations(raw: &[serde_json::Value]) -> MontageResult<Vec<EditOperation>> {
    let mut ops = Vec::with_capacity(raw.len());
    for (index, value) in raw.iter().enumerate() {
        match parse_operation(value)? {
            ParsedOperation::Known(op) => ops.push(op),
            ParsedOperation::Unknown { type_name } => {
                tracing::warn!(index, type_name = %type_name, "Skipping unknown edit operation");
            }
        }
    }
    Ok(ops)
}

fn validate_position(x: f64, y: f64) -> MontageResult<()> {
    for (field, value) in [("x", x), ("y", y)] {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(MontageError::validation(
                field,
                format!("{value} is outside 0..=100"),
            ));
        }
    }
    Ok(())
}

fn validate_unit(field: &str, value: f64) -> MontageResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(MontageError::validation(
            field,
            format!("{value} is outside 0..=1"),
        ));
    }
    Ok(())
}

/// Format a number for an engine expression without trailing noise.
pub fn fmt_num(value: f64) -> String {
    let text = format!("{value:.3}");
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_known_operation() {
        let parsed = parse_operation(&json!({"type": "speed", "factor": 2.0})).unwrap();
        assert_eq!(
            parsed,
            ParsedOperation::Known(EditOperation::Speed(SpeedChange { factor: 2.0 }))
        );
    }

    #[test]
    fn test_parse_unknown_operation_is_not_an_error() {
        let parsed = parse_operation(&json!({"type": "hologram", "depth": 3})).unwrap();
        assert_eq!(
            parsed,
            ParsedOperation::Unknown {
                type_name: "hologram".to_string()
            }
        );
    }

    #[test]
    fn test_parse_missing_type_is_invalid() {
        let err = parse_operation(&json!({"factor": 2.0})).unwrap_err();
        assert!(err.is_client_fault());
    }

    #[test]
    fn test_speed_bounds() {
        for bad in [0.0, 0.1, 4.5, -1.0, f64::NAN] {
            let raw = json!({"type": "speed", "factor": bad});
            assert!(parse_operation(&raw).is_err(), "speed {bad} accepted");
        }
        for good in [0.25, 1.0, 4.0] {
            let raw = json!({"type": "speed", "factor": good});
            assert!(parse_operation(&raw).is_ok(), "speed {good} rejected");
        }
    }

    #[test]
    fn test_text_defaults_fill_in() {
        let parsed = parse_operation(&json!({"type": "text", "text": "Hello"})).unwrap();
        let ParsedOperation::Known(EditOperation::Text(text)) = parsed else {
            panic!("expected text overlay");
        };
        assert_eq!(text.font_size, 24);
        assert_eq!(text.x, 50.0);
        assert!(text.window().is_none());
    }

    #[test]
    fn test_window_end_before_start_rejected() {
        let raw = json!({"type": "text", "text": "Hi", "start_time": 5.0, "end_time": 2.0});
        assert!(parse_operation(&raw).is_err());
    }

    #[test]
    fn test_enable_expr() {
        let closed = TimeWindow::new(1.5, Some(4.0)).unwrap();
        assert_eq!(closed.enable_expr(), "between(t,1.5,4)");
        let open = TimeWindow::new(2.0, None).unwrap();
        assert_eq!(open.enable_expr(), "gte(t,2)");
    }

    #[test]
    fn test_adjustment_merge() {
        let mut a = ColorAdjustments {
            brightness: 110.0,
            contrast: 120.0,
            hue: 170.0,
            ..Default::default()
        };
        let b = ColorAdjustments {
            brightness: 90.0,
            contrast: 50.0,
            hue: 20.0,
            blur: 10.0,
            ..Default::default()
        };
        a.merge(&b);
        assert!((a.brightness - 100.0).abs() < 1e-9);
        assert!((a.contrast - 60.0).abs() < 1e-9);
        assert!((a.hue - -170.0).abs() < 1e-9);
        assert_eq!(a.blur, 10.0);
    }

    #[test]
    fn test_merged_adjustment_stays_valid() {
        let max = ColorAdjustments {
            brightness: 200.0,
            contrast: 200.0,
            saturation: 200.0,
            ..Default::default()
        };
        let mut a = max;
        a.merge(&max);
        assert_eq!(a.brightness, 200.0);
        assert_eq!(a.contrast, 200.0);
        assert_eq!(a.saturation, 200.0);
        a.validate().unwrap();

        let mut dark = ColorAdjustments {
            brightness: 0.0,
            ..Default::default()
        };
        let same = dark;
        dark.merge(&same);
        assert_eq!(dark.brightness, 0.0);
        dark.validate().unwrap();
    }

    #[test]
    fn test_neutral_adjustment() {
        assert!(ColorAdjustments::default().is_neutral());
        let op = parse_operation(&json!({"type": "adjust", "saturation": 130})).unwrap();
        let ParsedOperation::Known(EditOperation::Adjust(adj)) = op else {
            panic!("expected adjust");
        };
        assert!(!adj.is_neutral());
        assert_eq!(adj.brightness, 100.0);
    }

    #[test]
    fn test_lut_preset_ids() {
        assert_eq!(LutPreset::from_id("Film-Noir"), Some(LutPreset::FilmNoir));
        assert_eq!(LutPreset::from_id("log709"), Some(LutPreset::Log709));
        assert_eq!(LutPreset::from_id("sparkle"), None);
        let op = parse_operation(&json!({"type": "lut", "preset": "golden-hour"})).unwrap();
        assert_eq!(
            op,
            ParsedOperation::Known(EditOperation::Lut {
                preset: LutPreset::GoldenHour
            })
        );
    }

    #[test]
    fn test_fade_out_requires_start() {
        let raw = json!({"type": "transition", "kind": "fade-out", "duration_secs": 1.0});
        assert!(parse_operation(&raw).is_err());
        let raw = json!({"type": "transition", "kind": "fade-in", "duration_secs": 1.0});
        assert!(parse_operation(&raw).is_ok());
    }

    #[test]
    fn test_parse_operations_skips_unknown() {
        let raw = vec![
            json!({"type": "speed", "factor": 1.5}),
            json!({"type": "teleport"}),
            json!({"type": "lut", "preset": "bleach"}),
        ];
        let ops = parse_operations(&raw).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].type_name(), "lut");
    }

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(1.0), "1");
        assert_eq!(fmt_num(0.25), "0.25");
        assert_eq!(fmt_num(-0.0001), "0");
        assert_eq!(fmt_num(1.23456), "1.235");
    }
}
