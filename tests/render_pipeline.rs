use celltrace::{
    ColorbarTitlePosition, FrameRenderer, FrameRgba, LabelMask, MemoryProvider, ObjectId,
    RenderConfig, TrajectoryCalculator, TrajectoryColorMode, render::PLACEHOLDER_SIZE,
    visibility::ObjectManager,
};

const W: u32 = 64;
const H: u32 = 48;

fn sequence(frames: usize) -> MemoryProvider {
    // Object 1 is a 4x4 block marching right one pixel per frame; object 2
    // sits still in the lower half.
    let mut originals = Vec::new();
    let mut masks = Vec::new();
    for i in 0..frames {
        originals.push(Some(FrameRgba::filled(W, H, [0, 0, 0, 255])));
        let mut mask = LabelMask::zeroed(W, H);
        for dy in 0..4 {
            for dx in 0..4 {
                mask.set(4 + i as u32 + dx, 8 + dy, 1);
                mask.set(20 + dx, 30 + dy, 2);
            }
        }
        masks.push(Some(mask));
    }
    MemoryProvider::new(originals, masks)
}

fn quiet_config() -> RenderConfig {
    // Everything off; individual tests switch on what they exercise.
    let mut config = RenderConfig::default();
    config.mask.enabled = false;
    config.contour.enabled = false;
    config.trajectory.enabled = false;
    config.centroid.enabled = false;
    config.time_label.enabled = false;
    config.scale_bar.enabled = false;
    config.speed_label.enabled = false;
    config.colorbar.enabled = false;
    config
}

#[test]
fn missing_frame_yields_placeholder_not_error() {
    let provider = MemoryProvider::new(vec![None], vec![None]);
    let calc = TrajectoryCalculator::new();
    let objects = ObjectManager::new();
    let config = quiet_config();
    let mut renderer = FrameRenderer::new(&provider, &calc, &objects, &config);

    let frame = renderer.render_frame(0, true, true).unwrap();
    assert_eq!(frame.width, PLACEHOLDER_SIZE);
    assert_eq!(frame.height, PLACEHOLDER_SIZE);
    assert_eq!(frame.pixel(0, 0), [0, 0, 0, 255]);
}

#[test]
fn mask_overlay_blends_only_visible_objects() {
    let provider = sequence(1);
    let calc = TrajectoryCalculator::new();
    let mut objects = ObjectManager::new();
    objects.hide_before(ObjectId(2), 5);

    let mut config = quiet_config();
    config.mask.enabled = true;
    config.mask.opacity = 0.5;

    let mut renderer = FrameRenderer::new(&provider, &calc, &objects, &config);
    renderer
        .colors_mut()
        .assign_colors(&[ObjectId(1), ObjectId(2)]);
    let expected = renderer.colors().object_color(ObjectId(1));

    let frame = renderer.render_frame(0, false, false).unwrap();

    // Object 1 pixel is a 50/50 blend over black.
    let px = frame.pixel(5, 9);
    for c in 0..3 {
        assert_eq!(px[c], (f64::from(expected[c]) * 0.5).round() as u8);
    }
    // Object 2 is hidden at frame 0, so its region stays background.
    assert_eq!(frame.pixel(21, 31), [0, 0, 0, 255]);
    // Background untouched.
    assert_eq!(frame.pixel(0, 0), [0, 0, 0, 255]);
}

#[test]
fn centroid_marker_lands_on_object_centroid() {
    let provider = sequence(1);
    let mut calc = TrajectoryCalculator::new();
    calc.calculate_all(&provider, 1.0, 1.0).unwrap();
    let objects = ObjectManager::new();

    let mut config = quiet_config();
    config.centroid.enabled = true;
    config.centroid.marker_size = 3;

    let mut renderer = FrameRenderer::new(&provider, &calc, &objects, &config);
    renderer
        .colors_mut()
        .assign_colors(&[ObjectId(1), ObjectId(2)]);
    let color = renderer.colors().object_color(ObjectId(1));

    let frame = renderer.render_frame(0, false, false).unwrap();
    let (cx, cy) = calc.centroid(ObjectId(1), 0).unwrap();
    let px = frame.pixel(cx.round() as u32, cy.round() as u32);
    assert_eq!([px[0], px[1], px[2]], color);
}

#[test]
fn contours_and_trajectories_mark_pixels() {
    let provider = sequence(4);
    let mut calc = TrajectoryCalculator::new();
    calc.calculate_all(&provider, 1.0, 1.0).unwrap();
    let objects = ObjectManager::new();

    let mut config = quiet_config();
    config.contour.enabled = true;
    config.trajectory.enabled = true;
    config.trajectory.thickness = 2;

    let mut renderer = FrameRenderer::new(&provider, &calc, &objects, &config);
    let rendered = renderer.render_frame(3, false, false).unwrap();

    let blank = FrameRgba::filled(W, H, [0, 0, 0, 255]);
    assert_ne!(rendered, blank, "overlays must change pixels");
}

#[test]
fn colorbar_extension_grows_canvas_and_fills_white() {
    let provider = sequence(2);
    let mut calc = TrajectoryCalculator::new();
    calc.calculate_all(&provider, 1.0, 1.0).unwrap();
    let objects = ObjectManager::new();

    let mut config = quiet_config();
    config.colorbar.enabled = true;
    config.trajectory.color_mode = TrajectoryColorMode::Velocity;
    config.colorbar.position = [1.02, 0.1];

    let mut renderer = FrameRenderer::new(&provider, &calc, &objects, &config);
    let (_, _, right, bottom) = renderer.colorbar_bounds(W, H);
    assert!(right > i64::from(W), "anchor past the right edge must overflow");

    let frame = renderer.render_frame(0, true, false).unwrap();

    // Width grows by at least the overflow plus padding (15 right).
    let overflow = right - i64::from(W);
    assert!(i64::from(frame.width) >= i64::from(W) + overflow + 15);
    // The default 200px bar cannot fit a 48px-tall frame either.
    assert!(bottom > i64::from(H));
    assert!(i64::from(frame.height) >= bottom + 10);

    // The added region is uniformly the white extension fill.
    for y in 0..frame.height.min(H) {
        for x in W..frame.width {
            assert_eq!(frame.pixel(x, y), [255, 255, 255, 255], "at {x},{y}");
        }
    }
    // Original content is preserved.
    assert_eq!(frame.pixel(0, 0), [0, 0, 0, 255]);
}

#[test]
fn no_extension_without_colorbar_area_request() {
    let provider = sequence(1);
    let mut calc = TrajectoryCalculator::new();
    calc.calculate_all(&provider, 1.0, 1.0).unwrap();
    let objects = ObjectManager::new();

    let mut config = quiet_config();
    config.colorbar.enabled = true;
    config.trajectory.color_mode = TrajectoryColorMode::Velocity;
    config.colorbar.position = [1.02, 0.1];

    let mut renderer = FrameRenderer::new(&provider, &calc, &objects, &config);
    let frame = renderer.render_frame(0, false, false).unwrap();
    assert_eq!((frame.width, frame.height), (W, H));
}

#[test]
fn labels_stage_draws_when_enabled() {
    let provider = sequence(2);
    let mut calc = TrajectoryCalculator::new();
    calc.calculate_all(&provider, 2.0, 1.5).unwrap();
    let objects = ObjectManager::new();

    let mut config = quiet_config();
    config.time_label.enabled = true;
    config.scale_bar.enabled = true;
    config.speed_label.enabled = true;
    config.colorbar.enabled = true;
    config.trajectory.color_mode = TrajectoryColorMode::Velocity;
    config.colorbar.position = [0.1, 0.1];
    config.colorbar.title_position = ColorbarTitlePosition::Right;

    let mut renderer = FrameRenderer::new(&provider, &calc, &objects, &config);
    let with_labels = renderer.render_frame(1, true, true).unwrap();
    let without_labels = renderer.render_frame(1, true, false).unwrap();

    assert_eq!(with_labels.width, without_labels.width);
    assert_ne!(with_labels, without_labels, "labels must change pixels");
}

#[test]
fn dragged_label_position_moves_the_colorbar_box() {
    let provider = sequence(1);
    let calc = TrajectoryCalculator::new();
    let objects = ObjectManager::new();

    let mut config = quiet_config();
    config.colorbar.enabled = true;
    config.trajectory.color_mode = TrajectoryColorMode::Velocity;

    let mut renderer = FrameRenderer::new(&provider, &calc, &objects, &config);
    let (left_a, top_a, _, _) = renderer.colorbar_bounds(W, H);

    renderer.set_label_position(celltrace::LabelKind::Colorbar, [0.5, 0.5]);
    let (left_b, top_b, _, _) = renderer.colorbar_bounds(W, H);

    assert_eq!(left_b, (0.5 * f64::from(W)) as i64);
    assert_eq!(top_b, (0.5 * f64::from(H)) as i64);
    assert_ne!((left_a, top_a), (left_b, top_b));

    // Positions clamp to the permissive range.
    renderer.set_label_position(celltrace::LabelKind::Colorbar, [9.0, -9.0]);
    let (left_c, top_c, _, _) = renderer.colorbar_bounds(W, H);
    assert_eq!(left_c, (2.0 * f64::from(W)) as i64);
    assert_eq!(top_c, (-0.5 * f64::from(H)) as i64);
}
