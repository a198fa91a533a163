//! Per-object overlay stages: mask blend, contours, ellipse axes,
//! trajectories, centroid markers.

use std::collections::HashSet;

use kurbo::{BezPath, Point, Shape};

use crate::color::ColorMapper;
use crate::config::{MarkerShape, RenderConfig, TrajectoryColorMode, TrajectoryMode};
use crate::contour::{fit_ellipse, object_contours};
use crate::provider::{FrameProvider, FrameRgba, LabelMask, ObjectId};
use crate::render::{bezpath_to_cpu, set_solid_paint};
use crate::traject::{TrackPoint, TrajectoryCalculator};
use crate::visibility::ObjectManager;

/// Stage 2: alpha-blend each visible object's color over its mask region.
/// Hidden objects' pixels are left untouched.
pub fn blend_mask(
    frame: &mut FrameRgba,
    mask: &LabelMask,
    visible: &HashSet<ObjectId>,
    colors: &ColorMapper,
    opacity: f64,
) {
    let opacity = opacity.clamp(0.0, 1.0);
    let width = frame.width.min(mask.width());
    let height = frame.height.min(mask.height());

    let color_of: std::collections::HashMap<u32, crate::color::Rgb> = visible
        .iter()
        .map(|&id| (id.0, colors.object_color(id)))
        .collect();

    for y in 0..height {
        for x in 0..width {
            let label = mask.label(x, y);
            if label == 0 {
                continue;
            }
            let Some(&color) = color_of.get(&label) else {
                continue;
            };
            let base = frame.pixel(x, y);
            let blend = |b: u8, c: u8| -> u8 {
                (f64::from(b) * (1.0 - opacity) + f64::from(c) * opacity).round() as u8
            };
            frame.put_pixel(
                x,
                y,
                [
                    blend(base[0], color[0]),
                    blend(base[1], color[1]),
                    blend(base[2], color[2]),
                    255,
                ],
            );
        }
    }
}

/// Stage 3: stroke the outer boundary of every visible object region.
pub fn draw_contours(
    ctx: &mut vello_cpu::RenderContext,
    mask: &LabelMask,
    visible: &HashSet<ObjectId>,
    colors: &ColorMapper,
    config: &RenderConfig,
) {
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_stroke(vello_cpu::kurbo::Stroke::new(f64::from(
        config.contour.thickness,
    )));

    for &id in sorted(visible) {
        let contours = object_contours(mask, id.0);
        if contours.is_empty() {
            continue;
        }
        set_solid_paint(ctx, colors.object_color(id));
        for contour in contours {
            if let Some(path) = closed_polyline(&contour) {
                ctx.stroke_path(&bezpath_to_cpu(&path));
            }
        }
    }
}

/// Stage 4: major/minor axis segments of the best-fit ellipse. Objects whose
/// region is too small or degenerate to fit are skipped, never fatal.
pub fn draw_ellipse_axes(
    ctx: &mut vello_cpu::RenderContext,
    mask: &LabelMask,
    visible: &HashSet<ObjectId>,
    config: &RenderConfig,
) {
    let cfg = &config.ellipse_axes;
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);

    for &id in sorted(visible) {
        let Some(fit) = fit_ellipse(mask, id.0) else {
            continue;
        };

        let (sin, cos) = fit.angle_rad.sin_cos();
        let center = Point::new(fit.cx + 0.5, fit.cy + 0.5);

        if cfg.show_major_axis {
            let d = kurbo::Vec2::new(cos, sin) * fit.major_half;
            stroke_segment(
                ctx,
                center - d,
                center + d,
                cfg.major_color.rgb(),
                cfg.major_thickness,
            );
        }
        if cfg.show_minor_axis {
            let d = kurbo::Vec2::new(-sin, cos) * fit.minor_half;
            stroke_segment(
                ctx,
                center - d,
                center + d,
                cfg.minor_color.rgb(),
                cfg.minor_thickness,
            );
        }
    }
}

/// Stage 5: trajectory polylines, windowed per display mode and filtered by
/// per-frame visibility; colored per object or per segment velocity.
pub fn draw_trajectories(
    ctx: &mut vello_cpu::RenderContext,
    frame_index: usize,
    provider: &dyn FrameProvider,
    trajectories: &TrajectoryCalculator,
    objects: &ObjectManager,
    colors: &ColorMapper,
    config: &RenderConfig,
) {
    let cfg = &config.trajectory;
    let fps = config.global.original_fps;
    let delay_frames = (cfg.delay_time * fps) as usize;

    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_stroke(vello_cpu::kurbo::Stroke::new(f64::from(cfg.thickness)));

    for id in provider.object_ids() {
        let segment = trajectory_window(trajectories, id, frame_index, cfg.mode, delay_frames);
        if segment.len() < 2 {
            continue;
        }

        let points: Vec<TrackPoint> = segment
            .into_iter()
            .filter(|p| objects.is_visible(id, p.frame))
            .collect();
        if points.len() < 2 {
            continue;
        }

        match cfg.color_mode {
            TrajectoryColorMode::Object => {
                set_solid_paint(ctx, colors.object_color(id));
                let mut path = BezPath::new();
                path.move_to(Point::new(points[0].x, points[0].y));
                for p in &points[1..] {
                    path.line_to(Point::new(p.x, p.y));
                }
                ctx.stroke_path(&bezpath_to_cpu(&path));
            }
            TrajectoryColorMode::Velocity => {
                let bar = &config.colorbar;
                for pair in points.windows(2) {
                    let (a, b) = (pair[0], pair[1]);
                    // Segment takes the velocity at its later endpoint.
                    let velocity = trajectories.velocity(id, b.frame).unwrap_or(0.0);
                    let color =
                        colors.velocity_color(velocity, bar.vmin, bar.vmax, bar.colormap);
                    set_solid_paint(ctx, color);
                    let mut path = BezPath::new();
                    path.move_to(Point::new(a.x, a.y));
                    path.line_to(Point::new(b.x, b.y));
                    ctx.stroke_path(&bezpath_to_cpu(&path));
                }
            }
        }
    }
}

/// Stage 6: centroid markers on top of everything but the labels.
pub fn draw_centroids(
    ctx: &mut vello_cpu::RenderContext,
    frame_index: usize,
    visible: &HashSet<ObjectId>,
    trajectories: &TrajectoryCalculator,
    colors: &ColorMapper,
    config: &RenderConfig,
) {
    let cfg = &config.centroid;
    let size = f64::from(cfg.marker_size);
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);

    for &id in sorted(visible) {
        let Some((cx, cy)) = trajectories.centroid(id, frame_index) else {
            continue;
        };
        set_solid_paint(ctx, colors.object_color(id));

        let path = match cfg.marker_shape {
            MarkerShape::Circle => kurbo::Circle::new((cx, cy), size).to_path(0.1),
            MarkerShape::Triangle => polygon(&[
                Point::new(cx, cy - size),
                Point::new(cx - size, cy + size),
                Point::new(cx + size, cy + size),
            ]),
            MarkerShape::Star => star_path(cx, cy, size),
        };
        ctx.fill_path(&bezpath_to_cpu(&path));
    }
}

/// Five-point star: ten vertices alternating outer and inner radius,
/// starting at the top.
fn star_path(cx: f64, cy: f64, size: f64) -> BezPath {
    let inner = size * 0.4;
    let vertices: Vec<Point> = (0..10)
        .map(|i| {
            let angle = std::f64::consts::FRAC_PI_2 + i as f64 * std::f64::consts::PI / 5.0;
            let r = if i % 2 == 0 { size } else { inner };
            Point::new(cx + r * angle.cos(), cy - r * angle.sin())
        })
        .collect();
    polygon(&vertices)
}

fn polygon(points: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    path.move_to(points[0]);
    for &p in &points[1..] {
        path.line_to(p);
    }
    path.close_path();
    path
}

fn closed_polyline(points: &[Point]) -> Option<BezPath> {
    let (&first, rest) = points.split_first()?;
    let mut path = BezPath::new();
    path.move_to(first);
    if rest.is_empty() {
        // Single boundary pixel: dot it so a one-pixel object still shows.
        path.line_to(first + kurbo::Vec2::new(0.5, 0.0));
    } else {
        for &p in rest {
            path.line_to(p);
        }
        path.close_path();
    }
    Some(path)
}

fn stroke_segment(
    ctx: &mut vello_cpu::RenderContext,
    from: Point,
    to: Point,
    color: crate::color::Rgb,
    thickness: u32,
) {
    ctx.set_stroke(vello_cpu::kurbo::Stroke::new(f64::from(thickness)));
    set_solid_paint(ctx, color);
    let mut path = BezPath::new();
    path.move_to(from);
    path.line_to(to);
    ctx.stroke_path(&bezpath_to_cpu(&path));
}

/// The configured temporal window of an object's trajectory.
fn trajectory_window(
    trajectories: &TrajectoryCalculator,
    id: ObjectId,
    frame_index: usize,
    mode: TrajectoryMode,
    delay_frames: usize,
) -> Vec<TrackPoint> {
    let full = trajectories.trajectory(id);
    match mode {
        TrajectoryMode::Full => full.to_vec(),
        TrajectoryMode::StartToCurrent => {
            full.iter().filter(|p| p.frame <= frame_index).copied().collect()
        }
        TrajectoryMode::DelayBefore => {
            let start = frame_index.saturating_sub(delay_frames);
            full.iter()
                .filter(|p| p.frame >= start && p.frame <= frame_index)
                .copied()
                .collect()
        }
        TrajectoryMode::DelayAfter => {
            let end = frame_index + delay_frames;
            full.iter()
                .filter(|p| p.frame >= frame_index && p.frame <= end)
                .copied()
                .collect()
        }
    }
}

/// Deterministic draw order regardless of set iteration order.
fn sorted(visible: &HashSet<ObjectId>) -> impl Iterator<Item = &ObjectId> {
    let mut ids: Vec<&ObjectId> = visible.iter().collect();
    ids.sort_unstable();
    ids.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryProvider;

    #[test]
    fn blend_mask_mixes_base_and_object_color() {
        let mut frame = FrameRgba::filled(2, 1, [0, 0, 0, 255]);
        let mut mask = LabelMask::zeroed(2, 1);
        mask.set(0, 0, 1);

        let mut colors = ColorMapper::new();
        colors.assign_colors(&[ObjectId(1)]);
        let expected = colors.object_color(ObjectId(1));

        let visible = HashSet::from([ObjectId(1)]);
        blend_mask(&mut frame, &mask, &visible, &colors, 0.5);

        let px = frame.pixel(0, 0);
        for c in 0..3 {
            assert_eq!(px[c], (f64::from(expected[c]) * 0.5).round() as u8);
        }
        // Background pixel untouched.
        assert_eq!(frame.pixel(1, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn blend_mask_skips_hidden_objects() {
        let mut frame = FrameRgba::filled(1, 1, [7, 7, 7, 255]);
        let mut mask = LabelMask::zeroed(1, 1);
        mask.set(0, 0, 2);

        let colors = ColorMapper::new();
        blend_mask(&mut frame, &mask, &HashSet::new(), &colors, 0.8);
        assert_eq!(frame.pixel(0, 0), [7, 7, 7, 255]);
    }

    #[test]
    fn trajectory_window_modes_select_expected_frames() {
        let masks: Vec<LabelMask> = (0..6)
            .map(|i| {
                let mut m = LabelMask::zeroed(8, 8);
                m.set(i, 0, 1);
                m
            })
            .collect();
        let frames = masks
            .iter()
            .map(|_| Some(FrameRgba::filled(8, 8, [0, 0, 0, 255])))
            .collect();
        let provider = MemoryProvider::new(frames, masks.into_iter().map(Some).collect());
        let mut calc = TrajectoryCalculator::new();
        calc.calculate_all(&provider, 1.0, 1.0).unwrap();

        let frames_of = |mode, delay| -> Vec<usize> {
            trajectory_window(&calc, ObjectId(1), 3, mode, delay)
                .iter()
                .map(|p| p.frame)
                .collect()
        };

        assert_eq!(frames_of(TrajectoryMode::Full, 0), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(frames_of(TrajectoryMode::StartToCurrent, 0), vec![0, 1, 2, 3]);
        assert_eq!(frames_of(TrajectoryMode::DelayBefore, 2), vec![1, 2, 3]);
        assert_eq!(frames_of(TrajectoryMode::DelayAfter, 2), vec![3, 4, 5]);
    }
}
