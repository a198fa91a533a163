//! Stage 7 and 8: canvas extension and annotation labels.
//!
//! All layout here runs through [`TextSystem`] metrics and the shared
//! [`FrameRenderer::colorbar_bounds`] box, the same inputs the edit-mode
//! overlay widgets use, so dragged positions and exported pixels agree
//! exactly. The pixel offsets are tuning constants carried over from the
//! interactive layout; change them in lockstep with the widgets.

use kurbo::Affine;
use vello_cpu::kurbo::Shape as _;

use crate::color::SwatchOrientation;
use crate::config::{ColorbarTitlePosition, LabelKind, ScaleTextPosition, TimeUnit};
use crate::provider::FrameRgba;
use crate::render::{
    DeferredBitmapText, FrameRenderer, frame_to_pixmap, pixmap_to_frame, render_context_for,
    set_solid_paint,
};
use crate::text::{FontSpec, ShapedText};

/// Padding of the draggable text-label bounding box; label anchors are the
/// box's top-left corner, text sits centered inside.
pub const LABEL_PADDING: i64 = 6;

/// Fill color of canvas rows/columns added for the colorbar.
pub const EXTENSION_FILL: [u8; 4] = [255, 255, 255, 255];

const SCALE_BAR_INSET_X: i64 = 10;
const SCALE_BAR_TOP_PAD: i64 = 8;

const COLORBAR_BAR_INSET: i64 = 5;
const COLORBAR_BAR_TOP_PAD: i64 = 5;
const COLORBAR_TICK_TEXT_GAP: i64 = 3;
const COLORBAR_CONTENT_PAD: i64 = 10;
const COLORBAR_TITLE_BASELINE_PAD: i64 = 2;
const COLORBAR_EXTEND_PAD_RIGHT: i64 = 15;
const COLORBAR_EXTEND_PAD_BOTTOM: i64 = 10;
const ROTATED_TITLE_MARGIN: i64 = 20;

/// Shared geometry for colorbar bounds computation and drawing. Both paths
/// derive from this one struct so they cannot disagree.
struct ColorbarLayout {
    x: i64,
    y: i64,
    bar_x: i64,
    bar_y: i64,
    bar_w: i64,
    bar_h: i64,
    /// Baseline of a top-positioned title.
    title_baseline_y: i64,
    title_width: i64,
    title_ascent: i64,
    title_descent: i64,
    tick_width_max: i64,
    tick_ascent: i64,
}

impl ColorbarLayout {
    fn title_height(&self) -> i64 {
        self.title_ascent + self.title_descent
    }
}

impl<'a> FrameRenderer<'a> {
    fn colorbar_layout(&mut self, original_width: u32, original_height: u32) -> ColorbarLayout {
        let cfg = self.config().colorbar.clone();
        let pos = self.label_position(LabelKind::Colorbar);
        let x = (pos[0] * f64::from(original_width)) as i64;
        let y = (pos[1] * f64::from(original_height)) as i64;

        let title_spec = FontSpec {
            family: cfg.title_font_family,
            size: cfg.title_font_size,
            bold: cfg.title_font_bold,
        };
        let tick_spec = FontSpec {
            family: cfg.tick_font_family,
            size: cfg.tick_font_size,
            bold: cfg.tick_font_bold,
        };

        let title_metrics = self.text_system().measure(&cfg.title, title_spec);
        let tick_metrics = self
            .text_system()
            .measure(&format!("{:.2}", cfg.vmax), tick_spec);

        let title_width = if cfg.title.is_empty() {
            0
        } else {
            title_metrics.width.round() as i64
        };
        let title_ascent = title_metrics.ascent.round() as i64;
        let title_descent = title_metrics.descent.round() as i64;

        let bar_w = i64::from(cfg.bar_width);
        let bar_h = i64::from(cfg.bar_height);

        let (bar_x, bar_y, title_baseline_y) = match cfg.title_position {
            ColorbarTitlePosition::Top => {
                // A title wider than the bar would poke past the anchor's
                // left edge; shift the bar right to keep it inside.
                let title_center = COLORBAR_BAR_INSET + bar_w / 2;
                let title_left = title_center - title_width / 2;
                let left_padding = (-title_left).max(0);
                let bar_x = x + COLORBAR_BAR_INSET + left_padding;
                let title_baseline_y = y + title_ascent + COLORBAR_TITLE_BASELINE_PAD;
                let bar_y = title_baseline_y + title_descent + i64::from(cfg.title_gap);
                (bar_x, bar_y, title_baseline_y)
            }
            ColorbarTitlePosition::Right => {
                (x + COLORBAR_BAR_INSET, y + COLORBAR_BAR_TOP_PAD, 0)
            }
        };

        ColorbarLayout {
            x,
            y,
            bar_x,
            bar_y,
            bar_w,
            bar_h,
            title_baseline_y,
            title_width,
            title_ascent,
            title_descent,
            tick_width_max: tick_metrics.width.round() as i64,
            tick_ascent: tick_metrics.ascent.round() as i64,
        }
    }

    /// Bounding box of the complete colorbar (bar, ticks, tick labels,
    /// title) as `(left, top, right, bottom)` in the original coordinate
    /// frame. The edit layer sizes its colorbar widget from this same box.
    pub fn colorbar_bounds(
        &mut self,
        original_width: u32,
        original_height: u32,
    ) -> (i64, i64, i64, i64) {
        let cfg = self.config().colorbar.clone();
        let layout = self.colorbar_layout(original_width, original_height);

        let bar_x_offset = layout.bar_x - layout.x;
        let ticks_width = layout.bar_w
            + i64::from(cfg.tick_length)
            + COLORBAR_TICK_TEXT_GAP
            + layout.tick_width_max;

        let right = match cfg.title_position {
            ColorbarTitlePosition::Top => {
                let content_width = bar_x_offset + ticks_width + COLORBAR_CONTENT_PAD;
                if cfg.title.is_empty() {
                    layout.x + content_width
                } else {
                    let title_total = layout.title_width + bar_x_offset + COLORBAR_CONTENT_PAD;
                    layout.x + content_width.max(title_total)
                }
            }
            ColorbarTitlePosition::Right => {
                let title_width = if cfg.title.is_empty() {
                    0
                } else {
                    // Mirrors the rotated-title placement below: the text is
                    // rotated -90 deg around a point one font-height right
                    // of the tick labels.
                    let font_height = layout.title_height();
                    let rotated_width = font_height + ROTATED_TITLE_MARGIN;
                    i64::from(cfg.title_gap) + font_height - layout.title_descent / 2
                        + rotated_width / 2
                };
                layout.x + bar_x_offset + ticks_width + title_width + COLORBAR_CONTENT_PAD
            }
        };

        let bottom = layout.bar_y + layout.bar_h + COLORBAR_CONTENT_PAD;
        (layout.x, layout.y, right, bottom)
    }

    /// Stage 7: grow the canvas just enough (plus fixed padding) to contain
    /// the colorbar box, filling new area white. Returns the frame unchanged
    /// when the box already fits.
    pub(crate) fn extend_for_colorbar(
        &mut self,
        frame: FrameRgba,
        original_width: u32,
        original_height: u32,
    ) -> FrameRgba {
        let (left, top, right, bottom) = self.colorbar_bounds(original_width, original_height);
        if left < 0 || top < 0 {
            tracing::warn!(
                left,
                top,
                "colorbar positioned outside the top-left boundary; it may be clipped"
            );
        }

        let extend_right =
            (right - i64::from(frame.width) + COLORBAR_EXTEND_PAD_RIGHT).max(0) as u32;
        let extend_bottom =
            (bottom - i64::from(frame.height) + COLORBAR_EXTEND_PAD_BOTTOM).max(0) as u32;
        if extend_right == 0 && extend_bottom == 0 {
            return frame;
        }

        let new_w = frame.width + extend_right;
        let new_h = frame.height + extend_bottom;
        let mut extended = FrameRgba::filled(new_w, new_h, EXTENSION_FILL);
        for y in 0..frame.height {
            let src = (y as usize * frame.width as usize) * 4;
            let dst = (y as usize * new_w as usize) * 4;
            let row_len = frame.width as usize * 4;
            extended.data[dst..dst + row_len].copy_from_slice(&frame.data[src..src + row_len]);
        }
        tracing::debug!(
            from_width = frame.width,
            from_height = frame.height,
            new_width = new_w,
            new_height = new_h,
            "canvas extended for colorbar"
        );
        extended
    }

    /// Stage 8: annotation labels onto the (possibly extended) frame.
    pub(crate) fn draw_labels_stage(
        &mut self,
        frame: &mut FrameRgba,
        frame_index: usize,
        original_width: u32,
        original_height: u32,
    ) -> crate::error::CelltraceResult<()> {
        let cfg = self.config();
        let colorbar_active = cfg.colorbar.enabled
            && cfg.trajectory.color_mode == crate::config::TrajectoryColorMode::Velocity;

        // The gradient is a pixel blit and must land under the vector pass.
        if colorbar_active {
            self.blit_colorbar_gradient(frame, original_width, original_height);
        }

        let mut pixmap = frame_to_pixmap(frame)?;
        let mut ctx = render_context_for(frame)?;
        let mut deferred: Vec<DeferredBitmapText> = Vec::new();

        if self.config().time_label.enabled {
            self.draw_time_label(
                &mut ctx,
                &mut deferred,
                frame_index,
                original_width,
                original_height,
            );
        }
        if self.config().scale_bar.enabled {
            self.draw_scale_bar(&mut ctx, &mut deferred, original_width, original_height);
        }
        if self.config().speed_label.enabled {
            self.draw_speed_label(&mut ctx, &mut deferred, original_width, original_height);
        }
        if colorbar_active {
            self.draw_colorbar_vectors(&mut ctx, &mut deferred, original_width, original_height);
        }

        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);
        *frame = pixmap_to_frame(&pixmap, frame.width, frame.height);

        for item in deferred {
            item.shaped.draw_bitmap(frame, item.x, item.y);
        }
        Ok(())
    }

    fn draw_time_label(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        deferred: &mut Vec<DeferredBitmapText>,
        frame_index: usize,
        original_width: u32,
        original_height: u32,
    ) {
        let cfg = self.config().time_label.clone();
        let fps = self.config().global.original_fps;
        let seconds = if fps > 0.0 {
            frame_index as f64 / fps
        } else {
            0.0
        };
        let text = match cfg.unit {
            TimeUnit::Ms => format!("{:.1} ms", seconds * 1000.0),
            TimeUnit::S => format!("{seconds:.2} s"),
            TimeUnit::Min => format!("{:.2} min", seconds / 60.0),
            TimeUnit::H => format!("{:.3} h", seconds / 3600.0),
        };

        let pos = self.label_position(LabelKind::Time);
        let x = (pos[0] * f64::from(original_width)) as i64;
        let y = (pos[1] * f64::from(original_height)) as i64;

        let shaped = self.text_system().shape(
            &text,
            FontSpec {
                family: cfg.font_family,
                size: cfg.font_size,
                bold: cfg.font_bold,
            },
            cfg.color.rgb(),
        );
        self.draw_text_top_left(ctx, deferred, shaped, x + LABEL_PADDING, y + LABEL_PADDING);
    }

    fn draw_speed_label(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        deferred: &mut Vec<DeferredBitmapText>,
        original_width: u32,
        original_height: u32,
    ) {
        let cfg = self.config().speed_label.clone();
        let text = self.config().speed_ratio_text();

        let pos = self.label_position(LabelKind::Speed);
        let x = (pos[0] * f64::from(original_width)) as i64;
        let y = (pos[1] * f64::from(original_height)) as i64;

        let shaped = self.text_system().shape(
            &text,
            FontSpec {
                family: cfg.font_family,
                size: cfg.font_size,
                bold: cfg.font_bold,
            },
            cfg.color.rgb(),
        );
        self.draw_text_top_left(ctx, deferred, shaped, x + LABEL_PADDING, y + LABEL_PADDING);
    }

    fn draw_scale_bar(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        deferred: &mut Vec<DeferredBitmapText>,
        original_width: u32,
        original_height: u32,
    ) {
        let cfg = self.config().scale_bar.clone();
        let um_per_pixel = self.config().global.um_per_pixel;
        if um_per_pixel <= 0.0 {
            return;
        }
        let bar_len = (cfg.length_um / um_per_pixel) as i64;

        let pos = self.label_position(LabelKind::ScaleBar);
        let x = (pos[0] * f64::from(original_width)) as i64;
        let y = (pos[1] * f64::from(original_height)) as i64;

        let bar_x = x + SCALE_BAR_INSET_X;
        let half = i64::from(cfg.thickness / 2);
        let bar_y = match cfg.text_position {
            ScaleTextPosition::Below => y + SCALE_BAR_TOP_PAD + half,
            ScaleTextPosition::Above => {
                y + i64::from(cfg.font_size) + 2 + i64::from(cfg.text_gap) + half
            }
        };
        let bar_top = bar_y - half;

        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        set_solid_paint(ctx, cfg.bar_color.rgb());
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            bar_x as f64,
            bar_top as f64,
            (bar_x + bar_len) as f64,
            (bar_top + i64::from(cfg.thickness)) as f64,
        ));

        if cfg.text_enabled {
            let text = format!("{:.0} \u{03bc}m", cfg.length_um);
            let shaped = self.text_system().shape(
                &text,
                FontSpec {
                    family: cfg.font_family,
                    size: cfg.font_size,
                    bold: cfg.font_bold,
                },
                cfg.text_color.rgb(),
            );
            let ascent = shaped.metrics.ascent.round() as i64;
            let baseline = match cfg.text_position {
                ScaleTextPosition::Above => bar_top - i64::from(cfg.text_gap),
                ScaleTextPosition::Below => bar_y + half + i64::from(cfg.text_gap) + ascent,
            };
            let width = shaped.metrics.width.round() as i64;
            let text_x = bar_x + bar_len / 2 - width / 2;
            self.draw_text_top_left(ctx, deferred, shaped, text_x, baseline - ascent);
        }
    }

    fn blit_colorbar_gradient(
        &mut self,
        frame: &mut FrameRgba,
        original_width: u32,
        original_height: u32,
    ) {
        let layout = self.colorbar_layout(original_width, original_height);
        let cfg = self.config().colorbar.clone();
        let swatch = self
            .colors_mut()
            .colormap_image(
                cfg.colormap,
                cfg.bar_width,
                cfg.bar_height,
                SwatchOrientation::Vertical,
            )
            .clone();
        blit_clipped(frame, &swatch, layout.bar_x, layout.bar_y);
    }

    fn draw_colorbar_vectors(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        deferred: &mut Vec<DeferredBitmapText>,
        original_width: u32,
        original_height: u32,
    ) {
        let layout = self.colorbar_layout(original_width, original_height);
        let cfg = self.config().colorbar.clone();
        let tick_color = cfg.tick_color.rgb();

        // Border.
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_stroke(vello_cpu::kurbo::Stroke::new(f64::from(
            cfg.border_thickness,
        )));
        set_solid_paint(ctx, tick_color);
        let border = vello_cpu::kurbo::Rect::new(
            layout.bar_x as f64,
            layout.bar_y as f64,
            (layout.bar_x + layout.bar_w) as f64,
            (layout.bar_y + layout.bar_h) as f64,
        );
        ctx.stroke_path(&border.to_path(0.1));

        // Title.
        if !cfg.title.is_empty() {
            let title_spec = FontSpec {
                family: cfg.title_font_family,
                size: cfg.title_font_size,
                bold: cfg.title_font_bold,
            };
            let shaped = self
                .text_system()
                .shape(&cfg.title, title_spec, cfg.title_color.rgb());

            match cfg.title_position {
                ColorbarTitlePosition::Top => {
                    let center_x = layout.bar_x + layout.bar_w / 2;
                    let origin_x = center_x - layout.title_width / 2;
                    let origin_y = layout.title_baseline_y - layout.title_ascent;
                    self.draw_text_top_left(ctx, deferred, shaped, origin_x, origin_y);
                }
                ColorbarTitlePosition::Right => {
                    // Rotate -90 deg around a pivot right of the tick labels;
                    // the pivot x carries a one-font-height offset so the
                    // rotated baseline clears the labels.
                    let font_height = layout.title_height();
                    let pivot_x = layout.bar_x
                        + layout.bar_w
                        + i64::from(cfg.tick_length)
                        + COLORBAR_TICK_TEXT_GAP
                        + layout.tick_width_max
                        + i64::from(cfg.title_gap)
                        + font_height;
                    let pivot_y = layout.bar_y + layout.bar_h / 2;

                    if shaped.is_bitmap() {
                        // The bitmap fallback cannot rotate; draw horizontally
                        // at the pivot, degraded but legible.
                        deferred.push(DeferredBitmapText {
                            shaped,
                            x: pivot_x,
                            y: pivot_y - layout.title_ascent / 2,
                        });
                    } else {
                        // Local origin: baseline-left of drawText(-w/2, ascent/2)
                        // mapped to the layout's top-left corner.
                        let transform = Affine::translate((pivot_x as f64, pivot_y as f64))
                            * Affine::rotate(-std::f64::consts::FRAC_PI_2)
                            * Affine::translate((
                                -(layout.title_width as f64) / 2.0,
                                -(layout.title_ascent as f64) / 2.0,
                            ));
                        self.text_system().draw(ctx, &shaped, transform);
                    }
                }
            }
        }

        // Tick marks and labels, top (vmax) downward at the configured
        // interval. Skipped entirely on a degenerate range.
        if cfg.vmax > cfg.vmin && cfg.tick_interval > 0.0 {
            let tick_spec = FontSpec {
                family: cfg.tick_font_family,
                size: cfg.tick_font_size,
                bold: cfg.tick_font_bold,
            };
            let count = ((cfg.vmax - cfg.vmin) / cfg.tick_interval) as i64 + 1;
            for i in 0..count {
                let value = cfg.vmax - i as f64 * cfg.tick_interval;
                if value < cfg.vmin - 1e-3 {
                    break;
                }
                let ratio = (cfg.vmax - value) / (cfg.vmax - cfg.vmin);
                let tick_y = layout.bar_y + (ratio * layout.bar_h as f64) as i64;

                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_stroke(vello_cpu::kurbo::Stroke::new(f64::from(cfg.tick_thickness)));
                set_solid_paint(ctx, tick_color);
                let mut tick = vello_cpu::kurbo::BezPath::new();
                tick.move_to((
                    (layout.bar_x + layout.bar_w) as f64,
                    tick_y as f64,
                ));
                tick.line_to((
                    (layout.bar_x + layout.bar_w + i64::from(cfg.tick_length)) as f64,
                    tick_y as f64,
                ));
                ctx.stroke_path(&tick);

                let label = format!("{value:.2}");
                let shaped = self.text_system().shape(&label, tick_spec, tick_color);
                let text_x =
                    layout.bar_x + layout.bar_w + i64::from(cfg.tick_length) + COLORBAR_TICK_TEXT_GAP;
                let baseline = tick_y + layout.tick_ascent / 2;
                self.draw_text_top_left(ctx, deferred, shaped, text_x, baseline - layout.tick_ascent);
            }
        }
    }

    fn draw_text_top_left(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        deferred: &mut Vec<DeferredBitmapText>,
        shaped: ShapedText,
        x: i64,
        y: i64,
    ) {
        if shaped.is_bitmap() {
            deferred.push(DeferredBitmapText { shaped, x, y });
        } else {
            self.text_system()
                .draw(ctx, &shaped, Affine::translate((x as f64, y as f64)));
        }
    }
}

fn blit_clipped(frame: &mut FrameRgba, src: &FrameRgba, dst_x: i64, dst_y: i64) {
    for sy in 0..i64::from(src.height) {
        let fy = dst_y + sy;
        if fy < 0 || fy >= i64::from(frame.height) {
            continue;
        }
        for sx in 0..i64::from(src.width) {
            let fx = dst_x + sx;
            if fx < 0 || fx >= i64::from(frame.width) {
                continue;
            }
            frame.put_pixel(fx as u32, fy as u32, src.pixel(sx as u32, sy as u32));
        }
    }
}
