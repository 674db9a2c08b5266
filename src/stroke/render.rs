//! SVG emission: pen-class defaults, per-segment width/opacity laws, and
//! polyline flushing. A direct translation of `set_pen_attr`/
//! `get_seg_width`/`get_seg_alpha`/`remfmt_render_svg` (`remfmt.c`).

use std::fmt::Write as _;

use super::{Color, Pen, Stroke, StrokeSet};

const DEV_W: u32 = 1404;
const DEV_H: u32 = 1872;

/// Parameters the caller supplies for one render: orientation, the
/// background template to reference, and whether this is an annotation
/// overlay (which forces every stroke to `note_color`).
#[derive(Debug, Clone)]
pub struct RenderParams {
    pub landscape: bool,
    pub template_name: String,
    pub annotation: bool,
    pub note_color: Color,
}

impl Default for RenderParams {
    fn default() -> Self {
        RenderParams {
            landscape: false,
            template_name: String::new(),
            annotation: false,
            note_color: Color::Blue,
        }
    }
}

/// Per-stroke defaults derived from its pen class: base opacity, whether
/// its caps are square, and a forced color override (if any).
struct PenAttrs {
    opacity: f32,
    square_cap: bool,
    color_override: Option<Color>,
    calc_width: f32,
}

fn pen_attrs(stroke: &Stroke) -> PenAttrs {
    match stroke.pen {
        Pen::SharpPencil | Pen::SharpPencilV2 => PenAttrs {
            opacity: 0.90,
            square_cap: false,
            color_override: None,
            calc_width: stroke.width,
        },
        Pen::Fineliner | Pen::FinelinerV2 => PenAttrs {
            opacity: 1.00,
            square_cap: false,
            color_override: None,
            calc_width: 0.4 * stroke.width.powi(4),
        },
        Pen::Highlighter => PenAttrs {
            opacity: 0.25,
            square_cap: true,
            color_override: Some(Color::Yellow),
            calc_width: stroke.width,
        },
        Pen::HighlighterV2 => PenAttrs {
            opacity: 0.25,
            square_cap: true,
            color_override: None,
            calc_width: stroke.width,
        },
        Pen::Eraser | Pen::EraseArea => PenAttrs {
            opacity: 0.0,
            square_cap: true,
            color_override: Some(Color::White),
            calc_width: stroke.width,
        },
        _ => PenAttrs { opacity: 1.0, square_cap: false, color_override: None, calc_width: stroke.width },
    }
}

fn clamp(value: f32, lo: f32, hi: f32) -> f32 {
    if value < lo {
        lo
    } else if value < hi {
        value
    } else {
        hi
    }
}

fn segment_width(segment_width: f32) -> f32 {
    clamp(segment_width, 0.1, 4.0 * segment_width)
}

fn segment_opacity(pen: Pen, base_opacity: f32, pressure: f32, speed: f32) -> f32 {
    match pen {
        Pen::TiltPencil | Pen::PencilV2 => clamp(0.45 * pressure - speed / 26.0, 0.0, 1.0),
        _ => base_opacity,
    }
}

fn template_path(template_name: &str) -> String {
    let name = if template_name.is_empty() { "Blank" } else { template_name };
    format!("./remarkable/templates/{name}.svg")
}

/// Render `strokes` to `out` as SVG. Empty input produces only the header
/// and footer. Rendering the same input with the same params twice
/// produces byte-identical output (no timestamps, no nondeterministic
/// ordering).
pub fn render_svg(strokes: &StrokeSet, params: &RenderParams) -> String {
    let mut out = String::new();

    // Portrait is the device's native 1404x1872. Landscape is emitted as a
    // rotated group inside a square DEV_H x DEV_H canvas (rather than a
    // swapped 1872x1404) so the rotated content isn't clipped.
    let (width, height, rotate) = if params.landscape {
        (DEV_H, DEV_H, 90)
    } else {
        (DEV_W, DEV_H, 0)
    };

    let _ = writeln!(out, r#"<svg xmlns="http://www.w3.org/2000/svg" height="{height}" width="{width}">"#);
    let _ = writeln!(out, "  <defs>");
    let _ = writeln!(
        out,
        r#"    <pattern id="brush" x="0" y="0" patternUnits="userSpaceOnUse">"#
    );
    let _ = writeln!(out, r#"      <image x="0" y="0" href="none"></image>"#);
    let _ = writeln!(out, "    </pattern>");
    let _ = writeln!(out, "  </defs>");
    let _ = writeln!(out, r#"  <g transform="rotate({rotate} 936 936)">"#);
    let _ = writeln!(
        out,
        r#"    <!--<image x="0" y="0" href="{}"></image>-->"#,
        template_path(&params.template_name)
    );

    for stroke in &strokes.strokes {
        render_stroke(&mut out, stroke, params);
    }

    let _ = writeln!(out, "  </g>");
    let _ = writeln!(out, "</svg>");

    out
}

fn render_stroke(out: &mut String, stroke: &Stroke, params: &RenderParams) {
    let attrs = pen_attrs(stroke);
    let color = if params.annotation {
        params.note_color
    } else {
        attrs.color_override.unwrap_or(stroke.color)
    };
    let linecap = if attrs.square_cap { "square" } else { "round" };

    let mut points = String::new();
    let mut width = attrs.calc_width;
    let mut opacity = attrs.opacity;
    let mut last_width = width;

    for segment in &stroke.segments {
        width = segment_width(segment.width);
        opacity = segment_opacity(stroke.pen, attrs.opacity, segment.pressure, segment.speed);

        let _ = write!(points, "{:.3} {:.3} ", segment.x, segment.y);

        if width != last_width {
            flush_polyline(out, color.rgb(), width, opacity, linecap, &points);
            points.clear();
            let _ = write!(points, "{:.3} {:.3} ", segment.x, segment.y);
            last_width = width;
        }
    }

    if !points.is_empty() {
        flush_polyline(out, color.rgb(), width, opacity, linecap, &points);
    }
}

fn flush_polyline(out: &mut String, color: u32, width: f32, opacity: f32, linecap: &str, points: &str) {
    let _ = writeln!(
        out,
        r#"    <polyline style="fill:none; stroke:#{color:06x}; stroke-width:{width:.3};opacity:{opacity:.3}" stroke-linejoin="round" stroke-linecap="{linecap}" points="{points}"/>"#
    );
}
