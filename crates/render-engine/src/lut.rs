//! Color-grading looks approximated with channel-mix and tone stages.
//!
//! No `.cube` tables ship with Montage, so every preset is a fixed,
//! small chain of `colorchannelmixer` / `eq` / `curves` / `hue` filters.
//! The output is an approximation of the named look, not a color-managed LUT.

use montage_edit_model::LutPreset;

use crate::graph::FilterStage;

fn channel_mix(rr: f64, gg: f64, bb: f64) -> FilterStage {
    FilterStage::new("colorchannelmixer")
        .num("rr", rr)
        .num("gg", gg)
        .num("bb", bb)
}

/// Filter stages approximating `preset`.
pub fn approximation(preset: LutPreset) -> Vec<FilterStage> {
    match preset {
        LutPreset::Cinematic => vec![
            channel_mix(0.95, 0.9, 0.85),
            FilterStage::new("eq").num("contrast", 1.08).num("saturation", 0.95),
        ],
        LutPreset::Bleach => vec![
            channel_mix(0.9, 0.88, 0.95),
            FilterStage::new("eq").num("contrast", 1.12).num("saturation", 0.7),
        ],
        LutPreset::Log709 => vec![
            channel_mix(1.05, 1.02, 1.0),
            FilterStage::new("eq").num("contrast", 1.05).num("brightness", 0.02),
        ],
        LutPreset::Vintage => vec![
            FilterStage::new("curves").opt("preset", "vintage"),
            FilterStage::new("eq").num("contrast", 0.95).num("saturation", 0.75),
        ],
        LutPreset::FilmNoir => vec![
            FilterStage::new("hue").num("s", 0.0),
            FilterStage::new("eq").num("contrast", 1.3).num("brightness", -0.03),
        ],
        LutPreset::GoldenHour => vec![
            channel_mix(1.08, 0.98, 0.82),
            FilterStage::new("eq").num("contrast", 1.04).num("saturation", 1.1),
        ],
        LutPreset::CoolBlue => vec![
            channel_mix(0.88, 0.97, 1.1),
            FilterStage::new("eq").num("contrast", 1.05).num("saturation", 0.95),
        ],
        LutPreset::Vibrant => vec![
            FilterStage::new("curves").opt("preset", "increase_contrast"),
            FilterStage::new("eq").num("saturation", 1.35),
        ],
        LutPreset::Moody => vec![
            channel_mix(0.92, 0.95, 1.02),
            FilterStage::new("eq")
                .num("contrast", 1.15)
                .num("saturation", 0.85)
                .num("brightness", -0.04),
        ],
    }
}
