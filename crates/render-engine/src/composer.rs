//! Filter-graph composer.
//!
//! Lowers an ordered list of [`EditOperation`]s into one [`FilterGraph`].
//! Stage order in the video chain:
//!
//! 1. every color adjustment, folded into a single combined stage set
//! 2. LUT looks, in list order
//! 3. text and shape overlays, in list order (later items paint on top)
//! 4. fades
//! 5. output geometry (scale, letterbox pad, fps, pixel format)
//! 6. playback speed
//!
//! Time windows on overlays and fades refer to source time, which is why the
//! speed change comes last.

use montage_common::MontageResult;
use montage_edit_model::{
    fmt_num, AudioMix, ColorAdjustments, EditOperation, ExportProfile, ShapeKind, ShapeOverlay,
    TextOverlay, Transition, TransitionKind,
};

use crate::graph::{AudioMixBranch, FilterGraph, FilterStage};
use crate::lut;

/// Compose `ops` into a filter graph producing output shaped by `profile`.
pub fn compose(ops: &[EditOperation], profile: &ExportProfile) -> MontageResult<FilterGraph> {
    profile.validate()?;
    for op in ops {
        op.validate()?;
    }

    let mut graph = FilterGraph::default();

    let mut merged: Option<ColorAdjustments> = None;
    for op in ops {
        if let EditOperation::Adjust(adj) = op {
            match merged.as_mut() {
                Some(acc) => acc.merge(adj),
                None => merged = Some(*adj),
            }
        }
    }
    if let Some(adj) = merged {
        graph.video.extend(adjustment_stages(&adj));
    }

    for op in ops {
        if let EditOperation::Lut { preset } = op {
            graph.video.extend(lut::approximation(*preset));
        }
    }

    for op in ops {
        match op {
            EditOperation::Text(text) => graph.video.push(drawtext_stage(text)),
            EditOperation::Shape(shape) => graph.video.push(drawbox_stage(shape)),
            _ => {}
        }
    }

    for op in ops {
        if let EditOperation::Transition(fade) = op {
            let (video, audio) = fade_stages(fade);
            graph.video.push(video);
            graph.audio.push(audio);
        }
    }

    graph.video.extend(output_stages(profile));

    let speed: f64 = ops
        .iter()
        .filter_map(|op| match op {
            EditOperation::Speed(change) => Some(change.factor),
            _ => None,
        })
        .product();
    if (speed - 1.0).abs() > f64::EPSILON {
        graph
            .video
            .push(FilterStage::new("setpts").opt("expr", format!("PTS/{}", fmt_num(speed))));
        graph.audio.extend(atempo_chain(speed));
    }

    let mut mixes = ops.iter().filter_map(|op| match op {
        EditOperation::BackgroundAudio(mix) => Some(mix),
        _ => None,
    });
    if let Some(mix) = mixes.next() {
        graph.mix = Some(mix_branch(mix, profile));
    }
    let ignored = mixes.count();
    if ignored > 0 {
        tracing::warn!(ignored, "Only the first background audio track is mixed");
    }

    Ok(graph)
}

/// Stages for one combined color adjustment. Neutral settings emit nothing.
pub fn adjustment_stages(adj: &ColorAdjustments) -> Vec<FilterStage> {
    let mut stages = Vec::new();

    // eq accepts brightness -1..1, contrast -1000..1000, saturation 0..3.
    let brightness = ((adj.brightness - 100.0) / 100.0).clamp(-1.0, 1.0);
    let contrast = (adj.contrast / 100.0).clamp(-1000.0, 1000.0);
    let saturation = (adj.saturation / 100.0).clamp(0.0, 3.0);
    let mut eq = FilterStage::new("eq");
    let mut eq_used = false;
    if brightness.abs() > f64::EPSILON {
        eq = eq.num("brightness", brightness);
        eq_used = true;
    }
    if (contrast - 1.0).abs() > f64::EPSILON {
        eq = eq.num("contrast", contrast);
        eq_used = true;
    }
    if (saturation - 1.0).abs() > f64::EPSILON {
        eq = eq.num("saturation", saturation);
        eq_used = true;
    }
    if eq_used {
        stages.push(eq);
    }

    if adj.hue.abs() > f64::EPSILON {
        stages.push(FilterStage::new("hue").num("h", adj.hue));
    }

    if adj.sepia > 0.0 {
        stages.push(sepia_stage(adj.sepia / 100.0));
    }

    if adj.vignette > 0.0 {
        let angle = (adj.vignette / 100.0 * std::f64::consts::FRAC_PI_2).max(0.1);
        stages.push(FilterStage::new("vignette").num("angle", angle));
    }

    if adj.blur > 0.0 {
        let radius = (adj.blur / 10.0).round().max(1.0);
        stages.push(FilterStage::new("boxblur").num("lr", radius).num("lp", 1.0));
    }

    stages
}

/// Blend between identity and the classic sepia matrix by `strength` (0..1).
fn sepia_stage(strength: f64) -> FilterStage {
    let t = strength.clamp(0.0, 1.0);
    let keep = 1.0 - t;
    FilterStage::new("colorchannelmixer")
        .num("rr", keep + t * 0.393)
        .num("rg", t * 0.769)
        .num("rb", t * 0.189)
        .num("gr", t * 0.349)
        .num("gg", keep + t * 0.686)
        .num("gb", t * 0.168)
        .num("br", t * 0.272)
        .num("bg", t * 0.534)
        .num("bb", keep + t * 0.131)
}

/// Escape overlay text for a single-quoted drawtext value.
pub fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("'\\''"),
            '%' => out.push_str("\\%"),
            _ => out.push(ch),
        }
    }
    out
}

/// Colors are written `#RRGGBB` by editors; the engine also accepts `0xRRGGBB`.
fn engine_color(color: &str) -> String {
    match color.strip_prefix('#') {
        Some(hex) => format!("0x{hex}"),
        None => color.to_string(),
    }
}

fn drawtext_stage(text: &TextOverlay) -> FilterStage {
    let mut stage = FilterStage::new("drawtext")
        .opt("text", format!("'{}'", escape_drawtext(&text.text)))
        .opt("fontsize", text.font_size.to_string())
        .opt("fontcolor", engine_color(&text.color))
        .opt("x", format!("(w-text_w)*{}", fmt_num(text.x / 100.0)))
        .opt("y", format!("(h-text_h)*{}", fmt_num(text.y / 100.0)));

    if let Some(font) = &text.font_file {
        stage = stage.opt("fontfile", format!("'{}'", font.display()));
    }
    if let Some(bg) = &text.background {
        stage = stage
            .opt("box", "1")
            .opt(
                "boxcolor",
                format!("{}@{}", engine_color(&bg.color), fmt_num(bg.opacity)),
            )
            .opt("boxborderw", bg.padding.to_string());
    }
    if let Some(stroke) = &text.stroke {
        stage = stage
            .opt("borderw", stroke.width.to_string())
            .opt("bordercolor", engine_color(&stroke.color));
    }

    let window = text.window();
    if let (Some(fade), Some(window)) = (text.fade_secs, window) {
        if fade > 0.0 {
            let start = window.start_secs;
            let fade_in = format!(
                "if(lt(t,{end_in}),(t-{start})/{fade}",
                end_in = fmt_num(start + fade),
                start = fmt_num(start),
                fade = fmt_num(fade),
            );
            let alpha = match window.end_secs {
                Some(end) => format!(
                    "{fade_in},if(gt(t,{out_start}),({end}-t)/{fade},1))",
                    out_start = fmt_num(end - fade),
                    end = fmt_num(end),
                    fade = fmt_num(fade),
                ),
                None => format!("{fade_in},1)"),
            };
            stage = stage.expr("alpha", &alpha);
        }
    }
    if let Some(window) = window {
        stage = stage.expr("enable", &window.enable_expr());
    }
    stage
}

fn drawbox_stage(shape: &ShapeOverlay) -> FilterStage {
    let w_frac = fmt_num(shape.width / 100.0);
    let h_frac = fmt_num(shape.height / 100.0);
    let x = format!(
        "(iw*{})-(iw*{w_frac})/2",
        fmt_num(shape.x / 100.0)
    );
    let height = match shape.kind {
        ShapeKind::Line | ShapeKind::Arrow => shape.stroke_width.max(1).to_string(),
        ShapeKind::Rectangle | ShapeKind::Circle => format!("ih*{h_frac}"),
    };
    let y = match shape.kind {
        ShapeKind::Line | ShapeKind::Arrow => format!("(ih*{})", fmt_num(shape.y / 100.0)),
        ShapeKind::Rectangle | ShapeKind::Circle => {
            format!("(ih*{})-(ih*{h_frac})/2", fmt_num(shape.y / 100.0))
        }
    };

    let mut stage = FilterStage::new("drawbox")
        .expr("x", &x)
        .expr("y", &y)
        .expr("w", &format!("iw*{w_frac}"))
        .expr("h", &height)
        .opt(
            "color",
            format!("{}@{}", engine_color(&shape.color), fmt_num(shape.opacity)),
        )
        .opt("t", "fill");
    if let Some(window) = shape.window() {
        stage = stage.expr("enable", &window.enable_expr());
    }
    stage
}

fn fade_stages(fade: &Transition) -> (FilterStage, FilterStage) {
    let direction = match fade.kind {
        TransitionKind::FadeIn => "in",
        TransitionKind::FadeOut => "out",
    };
    let video = FilterStage::new("fade")
        .opt("t", direction)
        .num("st", fade.start_secs())
        .num("d", fade.duration_secs);
    let audio = FilterStage::new("afade")
        .opt("t", direction)
        .num("st", fade.start_secs())
        .num("d", fade.duration_secs);
    (video, audio)
}

fn output_stages(profile: &ExportProfile) -> Vec<FilterStage> {
    let (w, h) = (profile.width, profile.height);
    let mut stages = vec![
        FilterStage::new("scale")
            .opt("w", w.to_string())
            .opt("h", h.to_string())
            .opt("force_original_aspect_ratio", "decrease"),
        FilterStage::new("pad")
            .opt("w", w.to_string())
            .opt("h", h.to_string())
            .opt("x", "(ow-iw)/2")
            .opt("y", "(oh-ih)/2"),
        FilterStage::new("setsar").opt("sar", "1"),
    ];
    if let Some(fps) = profile.fps {
        stages.push(FilterStage::new("fps").opt("fps", fps.to_string()));
    }
    stages.push(FilterStage::new("format").opt("pix_fmts", "yuv420p"));
    stages
}

/// Split a tempo factor into `atempo` stages each within 0.5..=2.0.
pub fn atempo_chain(factor: f64) -> Vec<FilterStage> {
    let mut remaining = factor;
    let mut stages = Vec::new();
    while remaining > 2.0 {
        stages.push(FilterStage::new("atempo").num("tempo", 2.0));
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push(FilterStage::new("atempo").num("tempo", 0.5));
        remaining /= 0.5;
    }
    if (remaining - 1.0).abs() > f64::EPSILON {
        stages.push(FilterStage::new("atempo").num("tempo", remaining));
    }
    stages
}

fn mix_branch(mix: &AudioMix, profile: &ExportProfile) -> AudioMixBranch {
    AudioMixBranch {
        track: mix.track.clone(),
        volume: mix.volume,
        ducking: mix.ducking.or(profile.ducking),
    }
}
