//! EngineOptions, LoadControl and ExportOptions tests.

use std::{path::PathBuf, time::Duration};

use framestep::{
    DEFAULT_RATE_PRESETS, EngineOptions, ExportOptions, FrameStepError, LoadControl,
    NOMINAL_FRAME_DURATION, PlaybackRate,
};

// ── EngineOptions ──────────────────────────────────────────────────

#[test]
fn defaults_match_the_product_constants() {
    let options = EngineOptions::default();

    assert_eq!(options.frame_duration(), NOMINAL_FRAME_DURATION);
    assert_eq!(options.frame_duration(), Duration::from_millis(33));
    assert_eq!(options.poll_interval(), Duration::from_millis(100));
    assert_eq!(options.settle_delay(), Duration::from_millis(500));

    let presets: Vec<f64> = options.rate_presets().iter().map(|rate| rate.get()).collect();
    assert_eq!(presets, DEFAULT_RATE_PRESETS.to_vec());
}

#[test]
fn builder_values_are_clamped() {
    let options = EngineOptions::new()
        .with_frame_duration(Duration::ZERO)
        .with_poll_interval(Duration::ZERO)
        .with_settle_delay(Duration::ZERO);

    assert_eq!(options.frame_duration(), Duration::from_millis(1));
    assert_eq!(options.poll_interval(), Duration::from_millis(1));
    assert_eq!(options.settle_delay(), Duration::ZERO);
}

#[test]
fn rate_presets_are_validated() {
    assert!(matches!(
        EngineOptions::new().with_rate_presets(&[]),
        Err(FrameStepError::InvalidRate(_))
    ));
    assert!(matches!(
        EngineOptions::new().with_rate_presets(&[0.5, -1.0]),
        Err(FrameStepError::InvalidRate(rate)) if rate == -1.0
    ));

    let options = EngineOptions::new()
        .with_rate_presets(&[0.25, 0.5])
        .expect("valid presets");
    assert_eq!(
        options.rate_presets(),
        &[PlaybackRate::new(0.25).unwrap(), PlaybackRate::new(0.5).unwrap()]
    );
}

#[test]
fn default_slow_motion_rate_must_be_a_preset() {
    assert!(
        EngineOptions::new()
            .with_default_slow_motion_rate(0.3)
            .is_ok()
    );
    assert!(matches!(
        EngineOptions::new().with_default_slow_motion_rate(0.4),
        Err(FrameStepError::UnknownRatePreset(rate)) if rate == 0.4
    ));
}

#[test]
fn buffer_divisor_is_applied_to_the_load_control() {
    let halved = EngineOptions::new().effective_load_control();
    assert_eq!(halved.min_buffer, Duration::from_millis(25_000));
    assert_eq!(halved.max_buffer, Duration::from_millis(50_000));
    assert_eq!(halved.buffer_for_playback, Duration::from_millis(1_250));
    assert_eq!(
        halved.buffer_for_playback_after_rebuffer,
        Duration::from_millis(2_500)
    );

    let untouched = EngineOptions::new()
        .with_buffer_divisor(0)
        .effective_load_control();
    assert_eq!(untouched, LoadControl::default());
}

// ── LoadControl ────────────────────────────────────────────────────

#[test]
fn reduced_keeps_the_maximum_buffer() {
    let custom = LoadControl {
        min_buffer: Duration::from_secs(30),
        max_buffer: Duration::from_secs(60),
        buffer_for_playback: Duration::from_secs(3),
        buffer_for_playback_after_rebuffer: Duration::from_secs(6),
    };
    let reduced = custom.reduced(3);
    assert_eq!(reduced.min_buffer, Duration::from_secs(10));
    assert_eq!(reduced.max_buffer, Duration::from_secs(60));
    assert_eq!(reduced.buffer_for_playback, Duration::from_secs(1));
    assert_eq!(reduced.buffer_for_playback_after_rebuffer, Duration::from_secs(2));
    assert_eq!(custom.reduced(1), custom);
}

// ── ExportOptions ──────────────────────────────────────────────────

#[test]
fn export_defaults() {
    let export = ExportOptions::new();
    assert_eq!(export.namespace, "SkiAnalysis");
    assert_eq!(export.prefix, "SkiFrame");
    assert_eq!(export.quality, 100);
    assert_eq!(export.collection_dir(), export.root.join("SkiAnalysis"));
}

#[test]
fn export_builder() {
    let export = ExportOptions::new()
        .with_root("/tmp/gallery")
        .with_namespace("Sprints")
        .with_prefix("Lap")
        .with_quality(0);
    assert_eq!(export.collection_dir(), PathBuf::from("/tmp/gallery/Sprints"));
    assert_eq!(export.prefix, "Lap");
    assert_eq!(export.quality, 1);

    let options = EngineOptions::new().with_export(export.clone());
    assert_eq!(options.export(), &export);
}
