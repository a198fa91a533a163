//! Text shaping and metrics.
//!
//! One [`TextSystem`] is the single source of font metrics for the whole
//! application: the interactive edit-mode overlays and the raster label
//! stage both measure through it, so dragged positions and exported pixels
//! cannot disagree. Shaping goes through Parley against the system font
//! collection; when no usable font resolves at startup the system downgrades
//! once to a built-in 5x7 bitmap renderer with deterministic synthetic
//! metrics.

use std::collections::HashMap;

use crate::color::Rgb;
use crate::config::FontFamily;
use crate::provider::FrameRgba;

/// RGBA8 brush color carried through Parley text layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrushRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FontSpec {
    pub family: FontFamily,
    pub size: u32,
    pub bold: bool,
}

/// Metrics for a single laid-out line of text, in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextMetrics {
    /// Total advance width.
    pub width: f64,
    pub ascent: f64,
    pub descent: f64,
}

impl TextMetrics {
    pub fn height(&self) -> f64 {
        self.ascent + self.descent
    }
}

enum ShapedRepr {
    Parley(parley::Layout<TextBrushRgba8>),
    Bitmap { text: String, scale: u32, color: Rgb },
}

/// A shaped, measured, ready-to-draw piece of text.
pub struct ShapedText {
    pub metrics: TextMetrics,
    repr: ShapedRepr,
}

pub struct TextSystem {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
    fonts_available: bool,
    /// vello-side font data per source blob, so glyph rendering does not
    /// re-copy font bytes for every draw call.
    render_fonts: HashMap<u64, vello_cpu::peniko::FontData>,
}

impl Default for TextSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TextSystem {
    /// Build the system and probe font availability exactly once.
    pub fn new() -> Self {
        let mut system = Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            fonts_available: true,
            render_fonts: HashMap::new(),
        };

        let probe = system.shape_parley(
            "Ag",
            FontSpec {
                family: FontFamily::Arial,
                size: 12,
                bold: false,
            },
            TextBrushRgba8 {
                r: 0,
                g: 0,
                b: 0,
                a: 255,
            },
        );
        system.fonts_available = layout_has_glyphs(&probe);
        if !system.fonts_available {
            tracing::warn!("no usable system fonts; falling back to bitmap text rendering");
        }
        system
    }

    pub fn fonts_available(&self) -> bool {
        self.fonts_available
    }

    /// Measure one line of text. This is the metrics source shared with the
    /// edit-mode overlay widgets.
    pub fn measure(&mut self, text: &str, spec: FontSpec) -> TextMetrics {
        if !self.fonts_available {
            return bitmap_metrics(text, spec.size);
        }
        let layout = self.shape_parley(
            text,
            spec,
            TextBrushRgba8 {
                r: 0,
                g: 0,
                b: 0,
                a: 255,
            },
        );
        layout_metrics(&layout, spec.size)
    }

    pub fn shape(&mut self, text: &str, spec: FontSpec, color: Rgb) -> ShapedText {
        if !self.fonts_available {
            return ShapedText {
                metrics: bitmap_metrics(text, spec.size),
                repr: ShapedRepr::Bitmap {
                    text: text.to_string(),
                    scale: bitmap_scale(spec.size),
                    color,
                },
            };
        }

        let layout = self.shape_parley(
            text,
            spec,
            TextBrushRgba8 {
                r: color[0],
                g: color[1],
                b: color[2],
                a: 255,
            },
        );
        ShapedText {
            metrics: layout_metrics(&layout, spec.size),
            repr: ShapedRepr::Parley(layout),
        }
    }

    fn shape_parley(
        &mut self,
        text: &str,
        spec: FontSpec,
        brush: TextBrushRgba8,
    ) -> parley::Layout<TextBrushRgba8> {
        let stack = match spec.family {
            FontFamily::Arial => "Arial, Liberation Sans, DejaVu Sans, sans-serif",
            FontFamily::TimesNewRoman => "Times New Roman, Liberation Serif, DejaVu Serif, serif",
        };

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Borrowed(stack)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(spec.size as f32));
        builder.push_default(parley::style::StyleProperty::FontWeight(if spec.bold {
            parley::style::FontWeight::BOLD
        } else {
            parley::style::FontWeight::NORMAL
        }));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        layout.break_all_lines(None);
        layout
    }

    /// Draw shaped text with its layout origin (top-left) mapped through
    /// `transform`. Parley-shaped text goes through the vello glyph-run
    /// path; bitmap text is deferred to [`ShapedText::draw_bitmap`] by the
    /// caller after raster readback.
    pub fn draw(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        shaped: &ShapedText,
        transform: kurbo::Affine,
    ) {
        let ShapedRepr::Parley(layout) = &shaped.repr else {
            return;
        };

        ctx.set_transform(vello_cpu::kurbo::Affine::new(transform.as_coeffs()));
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };

                let brush = run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));

                let source = run.run().font();
                let font = self
                    .render_fonts
                    .entry(source.data.id())
                    .or_insert_with(|| {
                        vello_cpu::peniko::FontData::new(
                            vello_cpu::peniko::Blob::from(source.data.as_ref().to_vec()),
                            source.index,
                        )
                    });

                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(font)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
    }
}

impl ShapedText {
    pub fn is_bitmap(&self) -> bool {
        matches!(self.repr, ShapedRepr::Bitmap { .. })
    }

    /// Draw a bitmap-fallback shaping directly into the frame buffer at the
    /// given top-left origin. No-op for Parley shapings.
    pub fn draw_bitmap(&self, frame: &mut FrameRgba, origin_x: i64, origin_y: i64) {
        let ShapedRepr::Bitmap { text, scale, color } = &self.repr else {
            return;
        };

        let scale = *scale as i64;
        let mut pen_x = origin_x;
        for ch in text.chars() {
            let glyph = bitmap_glyph(ch);
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..5i64 {
                    if bits & (0x10 >> col) == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            let x = pen_x + col * scale + dx;
                            let y = origin_y + row as i64 * scale + dy;
                            if x >= 0
                                && y >= 0
                                && x < i64::from(frame.width)
                                && y < i64::from(frame.height)
                            {
                                frame.put_pixel(
                                    x as u32,
                                    y as u32,
                                    [color[0], color[1], color[2], 255],
                                );
                            }
                        }
                    }
                }
            }
            pen_x += BITMAP_ADVANCE * scale;
        }
    }
}

fn layout_has_glyphs(layout: &parley::Layout<TextBrushRgba8>) -> bool {
    layout.lines().any(|line| {
        line.items()
            .any(|item| matches!(item, parley::layout::PositionedLayoutItem::GlyphRun(_)))
    })
}

fn layout_metrics(layout: &parley::Layout<TextBrushRgba8>, size: u32) -> TextMetrics {
    let width = f64::from(layout.width());
    match layout.lines().next() {
        Some(line) => {
            let m = line.metrics();
            TextMetrics {
                width,
                ascent: f64::from(m.ascent),
                descent: f64::from(m.descent),
            }
        }
        // Empty string: no line, synthesize from the point size.
        None => TextMetrics {
            width,
            ascent: f64::from(size) * 0.8,
            descent: f64::from(size) * 0.2,
        },
    }
}

const BITMAP_ROWS: i64 = 7;
const BITMAP_ADVANCE: i64 = 6;

fn bitmap_scale(size: u32) -> u32 {
    (size / 8).max(1)
}

fn bitmap_metrics(text: &str, size: u32) -> TextMetrics {
    let scale = i64::from(bitmap_scale(size));
    TextMetrics {
        width: (text.chars().count() as i64 * BITMAP_ADVANCE * scale) as f64,
        ascent: (BITMAP_ROWS * scale) as f64,
        descent: (2 * scale) as f64,
    }
}

/// 5x7 glyph rows, bit 4 = leftmost column. Lowercase maps onto uppercase;
/// unknown characters render as a filled box.
fn bitmap_glyph(ch: char) -> [u8; 7] {
    let ch = match ch {
        'a'..='z' => ch.to_ascii_uppercase(),
        '\u{03bc}' => 'U',
        '\u{00d7}' => 'X',
        _ => ch,
    };
    match ch {
        ' ' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '+' => [0x00, 0x04, 0x04, 0x1F, 0x04, 0x04, 0x00],
        '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}
