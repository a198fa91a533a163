//! Frame compositing.
//!
//! [`FrameRenderer`] layers mask, contour, ellipse-axis, trajectory and
//! centroid overlays plus annotation labels onto an original frame, in a
//! fixed stage order (later stages read earlier stages' pixels):
//!
//! 1. fetch original + mask (missing original yields a placeholder raster)
//! 2. mask overlay (alpha blend, pixel-level)
//! 3. contour strokes
//! 4. ellipse axes
//! 5. trajectories
//! 6. centroid markers
//! 7. conditional canvas extension for the colorbar
//! 8. labels (export/final preview only; edit mode draws interactive
//!    overlays itself and skips this stage)
//!
//! Vector stages draw through one vello_cpu context composited over the
//! pixel stages' output. All label geometry resolves against the original
//! (pre-extension) frame size through the shared [`TextSystem`] metrics so
//! edit-mode overlays and exported pixels always agree.

pub mod labels;
pub mod overlay;

use std::collections::{HashMap, HashSet};

use crate::color::ColorMapper;
use crate::config::{LabelKind, RenderConfig, TrajectoryColorMode, clamp_position};
use crate::error::{CelltraceError, CelltraceResult};
use crate::provider::{FrameProvider, FrameRgba, ObjectId};
use crate::text::{ShapedText, TextSystem};
use crate::traject::TrajectoryCalculator;
use crate::visibility::ObjectManager;

/// Size of the placeholder raster returned when an original frame is
/// missing; one bad frame must not abort a whole export.
pub const PLACEHOLDER_SIZE: u32 = 100;

pub struct FrameRenderer<'a> {
    provider: &'a dyn FrameProvider,
    trajectories: &'a TrajectoryCalculator,
    objects: &'a ObjectManager,
    config: &'a RenderConfig,
    colors: ColorMapper,
    text: TextSystem,
    label_overrides: HashMap<LabelKind, [f64; 2]>,
}

impl<'a> FrameRenderer<'a> {
    pub fn new(
        provider: &'a dyn FrameProvider,
        trajectories: &'a TrajectoryCalculator,
        objects: &'a ObjectManager,
        config: &'a RenderConfig,
    ) -> Self {
        Self {
            provider,
            trajectories,
            objects,
            config,
            colors: ColorMapper::new(),
            text: TextSystem::new(),
            label_overrides: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        self.config
    }

    pub fn colors(&self) -> &ColorMapper {
        &self.colors
    }

    pub fn colors_mut(&mut self) -> &mut ColorMapper {
        &mut self.colors
    }

    /// The metrics engine shared with the edit-mode overlay widgets.
    pub fn text_system(&mut self) -> &mut TextSystem {
        &mut self.text
    }

    /// Override a label position (the result of an edit-mode drag), as
    /// fractions of the original frame size.
    pub fn set_label_position(&mut self, kind: LabelKind, position: [f64; 2]) {
        self.label_overrides.insert(kind, clamp_position(position));
    }

    pub fn label_position(&self, kind: LabelKind) -> [f64; 2] {
        clamp_position(
            self.label_overrides
                .get(&kind)
                .copied()
                .unwrap_or_else(|| self.config.default_position(kind)),
        )
    }

    /// Render one fully composited frame.
    ///
    /// `include_colorbar_area` grows the canvas when the colorbar needs the
    /// margin (stage 7); `draw_labels` enables stage 8 and is off in edit
    /// mode, where labels exist as draggable overlay widgets instead.
    pub fn render_frame(
        &mut self,
        frame_index: usize,
        include_colorbar_area: bool,
        draw_labels: bool,
    ) -> CelltraceResult<FrameRgba> {
        let Some(base) = self.provider.frame(frame_index) else {
            return Ok(FrameRgba::filled(
                PLACEHOLDER_SIZE,
                PLACEHOLDER_SIZE,
                [0, 0, 0, 255],
            ));
        };
        let mut frame = (*base).clone();
        let (original_width, original_height) = (frame.width, frame.height);

        let mask = self.provider.mask(frame_index);
        let visible: HashSet<ObjectId> = self
            .provider
            .object_ids()
            .into_iter()
            .filter(|&id| self.objects.is_visible(id, frame_index))
            .collect();

        if let Some(mask) = &mask
            && self.config.mask.enabled
        {
            overlay::blend_mask(&mut frame, mask, &visible, &self.colors, self.config.mask.opacity);
        }

        let wants_vectors = (mask.is_some()
            && (self.config.contour.enabled
                || self.config.ellipse_axes.show_major_axis
                || self.config.ellipse_axes.show_minor_axis
                || self.config.centroid.enabled))
            || self.config.trajectory.enabled;

        if wants_vectors {
            let mut pixmap = frame_to_pixmap(&frame)?;
            let mut ctx = render_context_for(&frame)?;

            if let Some(mask) = &mask {
                if self.config.contour.enabled {
                    overlay::draw_contours(&mut ctx, mask, &visible, &self.colors, self.config);
                }
                if self.config.ellipse_axes.show_major_axis
                    || self.config.ellipse_axes.show_minor_axis
                {
                    overlay::draw_ellipse_axes(&mut ctx, mask, &visible, self.config);
                }
            }
            if self.config.trajectory.enabled {
                overlay::draw_trajectories(
                    &mut ctx,
                    frame_index,
                    self.provider,
                    self.trajectories,
                    self.objects,
                    &self.colors,
                    self.config,
                );
            }
            if mask.is_some() && self.config.centroid.enabled {
                overlay::draw_centroids(
                    &mut ctx,
                    frame_index,
                    &visible,
                    self.trajectories,
                    &self.colors,
                    self.config,
                );
            }

            ctx.flush();
            ctx.render_to_pixmap(&mut pixmap);
            frame = pixmap_to_frame(&pixmap, frame.width, frame.height);
        }

        let velocity_colored = self.config.trajectory.color_mode == TrajectoryColorMode::Velocity;
        if include_colorbar_area && self.config.colorbar.enabled && velocity_colored {
            frame = self.extend_for_colorbar(frame, original_width, original_height);
        }

        if draw_labels {
            self.draw_labels_stage(&mut frame, frame_index, original_width, original_height)?;
        }

        Ok(frame)
    }
}

/// Queued bitmap-fallback text draw; flushed onto the raster after the
/// vector context is composited, preserving stage ordering.
pub(crate) struct DeferredBitmapText {
    pub shaped: ShapedText,
    pub x: i64,
    pub y: i64,
}

pub(crate) fn render_context_for(frame: &FrameRgba) -> CelltraceResult<vello_cpu::RenderContext> {
    let (w, h) = pixmap_dims(frame)?;
    Ok(vello_cpu::RenderContext::new(w, h))
}

fn pixmap_dims(frame: &FrameRgba) -> CelltraceResult<(u16, u16)> {
    let w: u16 = frame
        .width
        .try_into()
        .map_err(|_| CelltraceError::render("frame width exceeds u16"))?;
    let h: u16 = frame
        .height
        .try_into()
        .map_err(|_| CelltraceError::render("frame height exceeds u16"))?;
    Ok((w, h))
}

/// Opaque straight-alpha RGBA equals its premultiplied form, so frames load
/// into a pixmap without conversion.
pub(crate) fn frame_to_pixmap(frame: &FrameRgba) -> CelltraceResult<vello_cpu::Pixmap> {
    let (w, h) = pixmap_dims(frame)?;
    let pixels: Vec<vello_cpu::peniko::color::PremulRgba8> = frame
        .data
        .chunks_exact(4)
        .map(|px| vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a: px[3],
        })
        .collect();
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, false))
}

pub(crate) fn pixmap_to_frame(pixmap: &vello_cpu::Pixmap, width: u32, height: u32) -> FrameRgba {
    let mut data = pixmap.data_as_u8_slice().to_vec();
    // Compositing over an opaque base keeps alpha at 255; pin it so encoder
    // input stays exactly opaque.
    for px in data.chunks_exact_mut(4) {
        px[3] = 255;
    }
    FrameRgba {
        width,
        height,
        data,
    }
}

pub(crate) fn affine_to_cpu(a: kurbo::Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

pub(crate) fn point_to_cpu(p: kurbo::Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

pub(crate) fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

pub(crate) fn set_solid_paint(ctx: &mut vello_cpu::RenderContext, rgb: crate::color::Rgb) {
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
        rgb[0], rgb[1], rgb[2], 255,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_frame_survives_pixmap_roundtrip() {
        let mut frame = FrameRgba::filled(3, 2, [10, 20, 30, 255]);
        frame.put_pixel(1, 1, [200, 100, 50, 255]);
        let pixmap = frame_to_pixmap(&frame).unwrap();
        let back = pixmap_to_frame(&pixmap, 3, 2);
        assert_eq!(frame, back);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let frame = FrameRgba {
            width: 70_000,
            height: 1,
            data: vec![0; 70_000 * 4],
        };
        assert!(frame_to_pixmap(&frame).is_err());
    }
}
