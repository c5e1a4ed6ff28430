//! Export profiles: output geometry, encoder choice, and quality.

use serde::{Deserialize, Serialize};

use montage_common::{MontageError, MontageResult};

/// Output video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    Hevc,
    Vp9,
}

impl VideoCodec {
    pub fn encoder(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::Hevc => "libx265",
            VideoCodec::Vp9 => "libvpx-vp9",
        }
    }

    pub fn audio_encoder(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 => "libopus",
            _ => "aac",
        }
    }

    /// Container file extension matching the codec.
    pub fn extension(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 => "webm",
            _ => "mp4",
        }
    }
}

/// Encoder effort / fidelity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Draft,
    #[default]
    Standard,
    Best,
}

impl QualityTier {
    pub fn crf(&self) -> u32 {
        match self {
            QualityTier::Draft => 28,
            QualityTier::Standard => 23,
            QualityTier::Best => 18,
        }
    }

    pub fn preset(&self) -> &'static str {
        match self {
            QualityTier::Draft => "fast",
            QualityTier::Standard => "medium",
            QualityTier::Best => "slow",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QualityTier::Draft => "draft",
            QualityTier::Standard => "standard",
            QualityTier::Best => "best",
        }
    }
}

/// Floor applied to the video bitrate at the best tier.
pub const BEST_MIN_VIDEO_KBPS: u32 = 20_000;
const BEST_AUDIO_KBPS: u32 = 320;
const DEFAULT_AUDIO_KBPS: u32 = 192;

/// Sidechain compression of a music bed under the main audio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckingConfig {
    /// Level of the main audio at which ducking starts, in dBFS.
    pub threshold_db: f64,
    pub ratio: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
}

impl Default for DuckingConfig {
    fn default() -> Self {
        Self {
            threshold_db: -30.0,
            ratio: 8.0,
            attack_ms: 20.0,
            release_ms: 300.0,
        }
    }
}

impl DuckingConfig {
    /// Derive a ducking curve from a target music level (0..1) under speech.
    pub fn from_duck_level(level: f64) -> Self {
        let level = if level.is_finite() { level } else { 0.3 };
        let ratio = (1.0 / level.clamp(0.05, 1.0)).clamp(1.0, 20.0);
        Self {
            ratio,
            ..Self::default()
        }
    }

    /// Threshold as the linear amplitude the compressor expects.
    pub fn threshold_linear(&self) -> f64 {
        10f64.powf(self.threshold_db / 20.0).clamp(0.000_976_563, 1.0)
    }

    pub fn validate(&self) -> MontageResult<()> {
        if !self.threshold_db.is_finite() || self.threshold_db > 0.0 {
            return Err(MontageError::validation(
                "ducking.threshold_db",
                "must be at or below 0 dBFS",
            ));
        }
        if !(1.0..=20.0).contains(&self.ratio) {
            return Err(MontageError::validation(
                "ducking.ratio",
                format!("{} is outside 1..=20", self.ratio),
            ));
        }
        if !(0.01..=2000.0).contains(&self.attack_ms) {
            return Err(MontageError::validation(
                "ducking.attack_ms",
                format!("{} is outside 0.01..=2000", self.attack_ms),
            ));
        }
        if !(0.01..=9000.0).contains(&self.release_ms) {
            return Err(MontageError::validation(
                "ducking.release_ms",
                format!("{} is outside 0.01..=9000", self.release_ms),
            ));
        }
        Ok(())
    }
}

/// Output settings for a render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportProfile {
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
    pub codec: VideoCodec,
    pub quality: QualityTier,
    /// Output frame rate (None = keep source rate).
    pub fps: Option<u32>,
    /// Audio bitrate override.
    pub audio_bitrate_kbps: Option<u32>,
    /// Default ducking for background audio mixes.
    pub ducking: Option<DuckingConfig>,
}

impl Default for ExportProfile {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            bitrate_kbps: 8_000,
            codec: VideoCodec::H264,
            quality: QualityTier::Standard,
            fps: None,
            audio_bitrate_kbps: None,
            ducking: None,
        }
    }
}

impl ExportProfile {
    /// Profile tuned for a publishing platform.
    pub fn for_platform(platform: Platform) -> Self {
        let (width, height, bitrate_kbps) = match platform {
            Platform::Youtube => (1920, 1080, 12_000),
            Platform::InstagramFeed => (1080, 1080, 5_000),
            Platform::InstagramStory | Platform::InstagramReel | Platform::Tiktok => {
                (1080, 1920, 6_000)
            }
            Platform::Twitter => (1280, 720, 5_000),
            Platform::Linkedin => (1920, 1080, 8_000),
        };
        Self {
            width,
            height,
            bitrate_kbps,
            fps: Some(30),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> MontageResult<()> {
        for (field, value) in [("width", self.width), ("height", self.height)] {
            if value == 0 || value % 2 != 0 {
                return Err(MontageError::validation(
                    field,
                    format!("{value} must be a positive even number"),
                ));
            }
        }
        if self.bitrate_kbps == 0 {
            return Err(MontageError::validation("bitrate_kbps", "must be positive"));
        }
        if let Some(fps) = self.fps {
            if !(1..=240).contains(&fps) {
                return Err(MontageError::validation(
                    "fps",
                    format!("{fps} is outside 1..=240"),
                ));
            }
        }
        if self.audio_bitrate_kbps == Some(0) {
            return Err(MontageError::validation(
                "audio_bitrate_kbps",
                "must be positive",
            ));
        }
        if let Some(ducking) = &self.ducking {
            ducking.validate()?;
        }
        Ok(())
    }

    /// Video bitrate after the quality tier floor.
    pub fn video_bitrate_kbps(&self) -> u32 {
        match self.quality {
            QualityTier::Best => self.bitrate_kbps.max(BEST_MIN_VIDEO_KBPS),
            _ => self.bitrate_kbps,
        }
    }

    pub fn audio_bitrate_kbps(&self) -> u32 {
        self.audio_bitrate_kbps.unwrap_or(match self.quality {
            QualityTier::Best => BEST_AUDIO_KBPS,
            _ => DEFAULT_AUDIO_KBPS,
        })
    }

    /// Human label used when saving an export, e.g. `1080p standard`.
    pub fn quality_label(&self) -> String {
        format!("{}p {}", self.width.min(self.height), self.quality.label())
    }
}

/// Publishing platforms with a canned profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    Youtube,
    InstagramFeed,
    InstagramStory,
    InstagramReel,
    Tiktok,
    Twitter,
    Linkedin,
}

impl std::str::FromStr for Platform {
    type Err = MontageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" => Ok(Platform::Youtube),
            "instagram-feed" => Ok(Platform::InstagramFeed),
            "instagram-story" => Ok(Platform::InstagramStory),
            "instagram-reel" => Ok(Platform::InstagramReel),
            "tiktok" => Ok(Platform::Tiktok),
            "twitter" | "x" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::Linkedin),
            other => Err(MontageError::validation(
                "platform",
                format!("unknown platform '{other}'"),
            )),
        }
    }
}
