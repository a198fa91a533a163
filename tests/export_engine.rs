use celltrace::{
    CancelToken, ExportEngine, ExportSettings, FrameRenderer, FrameRgba, ImageOutput, LabelMask,
    MemoryProvider, RenderConfig, TrajectoryCalculator, visibility::ObjectManager,
};

fn temp_dir(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "celltrace_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn sequence(frames: usize) -> MemoryProvider {
    let mut originals = Vec::new();
    let mut masks = Vec::new();
    for i in 0..frames {
        originals.push(Some(FrameRgba::filled(32, 24, [10, 10, 10, 255])));
        let mut mask = LabelMask::zeroed(32, 24);
        for dy in 0..3 {
            for dx in 0..3 {
                mask.set(2 + i as u32 + dx, 4 + dy, 1);
            }
        }
        masks.push(Some(mask));
    }
    MemoryProvider::new(originals, masks)
}

fn minimal_config() -> RenderConfig {
    let mut config = RenderConfig::default();
    config.time_label.enabled = false;
    config.scale_bar.enabled = false;
    config.speed_label.enabled = false;
    config.colorbar.enabled = false;
    config
}

#[test]
fn image_export_writes_numbered_decodable_files() {
    let tmp = temp_dir("image_export");
    let provider = sequence(5);
    let mut calc = TrajectoryCalculator::new();
    calc.calculate_all(&provider, 1.0, 1.0).unwrap();
    let objects = ObjectManager::new();
    let config = minimal_config();
    let mut renderer = FrameRenderer::new(&provider, &calc, &objects, &config);

    let engine = ExportEngine::new(ExportSettings {
        frame_count: 5,
        output_fps: 30.0,
        video: None,
        images: Some(ImageOutput {
            directory: tmp.clone(),
            prefix: "frame_".to_string(),
        }),
    });

    let mut updates = Vec::new();
    let outcome = engine.run(
        &mut renderer,
        &mut |p| updates.push(p),
        &CancelToken::new(),
    );

    assert!(outcome.is_completed(), "outcome: {outcome:?}");
    assert_eq!(updates.len(), 5);
    assert_eq!(updates[0].remaining, "calculating...");
    assert_eq!(updates.last().unwrap().percent, 100);

    // 1-based, 6-digit zero-padded names; every file decodes.
    for i in 1..=5u32 {
        let path = tmp.join(format!("frame_{i:06}.png"));
        assert!(path.exists(), "missing {}", path.display());
        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (32, 24));
    }
    assert!(!tmp.join("frame_000000.png").exists());
    assert!(!tmp.join("frame_000006.png").exists());

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn cancellation_reports_cancelled_and_keeps_finished_files() {
    let tmp = temp_dir("cancel_export");
    let total = 20;
    let provider = sequence(total);
    let calc = TrajectoryCalculator::new();
    let objects = ObjectManager::new();
    let config = minimal_config();
    let mut renderer = FrameRenderer::new(&provider, &calc, &objects, &config);

    let engine = ExportEngine::new(ExportSettings {
        frame_count: total,
        output_fps: 30.0,
        video: None,
        images: Some(ImageOutput {
            directory: tmp.clone(),
            prefix: "frame_".to_string(),
        }),
    });

    let cancel = CancelToken::new();
    let cancel_from_callback = cancel.clone();
    let mut frames_seen = 0usize;
    let outcome = engine.run(
        &mut renderer,
        &mut |p| {
            frames_seen = p.frames_done;
            if p.frames_done == 3 {
                cancel_from_callback.cancel();
            }
        },
        &cancel,
    );

    assert!(outcome.is_cancelled(), "outcome: {outcome:?}");
    assert!(frames_seen < total);
    assert_eq!(frames_seen, 3);

    // Every frame processed before cancellation is on disk and readable.
    for i in 1..=3u32 {
        let path = tmp.join(format!("frame_{i:06}.png"));
        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (32, 24));
    }
    assert!(!tmp.join(format!("frame_{:06}.png", total)).exists());

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn export_without_outputs_or_frames_fails_cleanly() {
    let provider = sequence(1);
    let calc = TrajectoryCalculator::new();
    let objects = ObjectManager::new();
    let config = minimal_config();
    let mut renderer = FrameRenderer::new(&provider, &calc, &objects, &config);

    let no_outputs = ExportEngine::new(ExportSettings {
        frame_count: 1,
        output_fps: 30.0,
        video: None,
        images: None,
    });
    assert!(
        no_outputs
            .run(&mut renderer, &mut |_| {}, &CancelToken::new())
            .is_failed()
    );

    let no_frames = ExportEngine::new(ExportSettings {
        frame_count: 0,
        output_fps: 30.0,
        video: None,
        images: Some(ImageOutput {
            directory: temp_dir("never_created"),
            prefix: "frame_".to_string(),
        }),
    });
    assert!(
        no_frames
            .run(&mut renderer, &mut |_| {}, &CancelToken::new())
            .is_failed()
    );
}

#[test]
fn exported_images_match_a_direct_render() {
    let tmp = temp_dir("export_parity");
    let provider = sequence(2);
    let mut calc = TrajectoryCalculator::new();
    calc.calculate_all(&provider, 1.0, 1.0).unwrap();
    let objects = ObjectManager::new();
    let config = minimal_config();

    let mut renderer = FrameRenderer::new(&provider, &calc, &objects, &config);
    let engine = ExportEngine::new(ExportSettings {
        frame_count: 2,
        output_fps: 30.0,
        video: None,
        images: Some(ImageOutput {
            directory: tmp.clone(),
            prefix: "f".to_string(),
        }),
    });
    let outcome = engine.run(&mut renderer, &mut |_| {}, &CancelToken::new());
    assert!(outcome.is_completed());

    // The export path renders with labels and colorbar area; reproduce it.
    let direct = renderer.render_frame(0, true, true).unwrap();
    let written = image::open(tmp.join("f000001.png")).unwrap().to_rgba8();
    assert_eq!(written.as_raw().as_slice(), direct.data.as_slice());

    std::fs::remove_dir_all(&tmp).ok();
}
