//! FrameExporter and GalleryStore tests.
//!
//! Exports go to a temporary directory through a scripted frame retriever.

mod common;

use std::{fs, sync::Arc, time::Duration};

use common::{
    RecordingNotifier, ScriptedMedia, ScriptedRetriever, clip, controller_with, missing_clip,
};
use framestep::{EngineOptions, ExportOptions, FrameExporter, FrameStepError, GalleryStore, Notice};
use image::{DynamicImage, RgbImage};

fn export_options(root: &std::path::Path) -> ExportOptions {
    ExportOptions::new().with_root(root)
}

fn exporter(
    retriever: &Arc<ScriptedRetriever>,
    root: &std::path::Path,
) -> (FrameExporter, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let exporter = FrameExporter::new(
        retriever.clone(),
        GalleryStore::new(export_options(root)),
        notifier.clone(),
    );
    (exporter, notifier)
}

fn gallery_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    let collection = root.join("SkiAnalysis");
    match fs::read_dir(&collection) {
        Ok(entries) => entries
            .map(|entry| entry.expect("readable entry").path())
            .collect(),
        Err(_) => Vec::new(),
    }
}

// ── successful exports ─────────────────────────────────────────────

#[test]
fn export_writes_one_timestamped_jpeg() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let retriever = ScriptedRetriever::new();
    let (exporter, notifier) = exporter(&retriever, temp.path());

    let frame = exporter
        .export_current_frame(&clip(), 2_000)
        .expect("export should succeed");

    let files = gallery_files(temp.path());
    assert_eq!(files, vec![frame.path.clone()]);
    assert!(frame.display_name.starts_with("SkiFrame_"));
    assert!(frame.display_name.ends_with(".jpg"));
    let millis = frame
        .display_name
        .trim_start_matches("SkiFrame_")
        .trim_end_matches(".jpg");
    assert_eq!(millis, frame.captured_at_ms.to_string());
    assert_eq!(frame.position, Duration::from_millis(2_000));

    assert_eq!(retriever.requests(), vec![Duration::from_millis(2_000)]);
    assert_eq!(
        notifier.notices(),
        vec![Notice::FrameSaved {
            path: frame.path.clone(),
        }]
    );
    assert_eq!(notifier.notices()[0].message(), "Frame saved successfully!");
}

#[test]
fn exported_file_is_a_decodable_jpeg() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let retriever = ScriptedRetriever::new();
    let (exporter, _) = exporter(&retriever, temp.path());

    let frame = exporter
        .try_export(&clip(), Duration::from_millis(500))
        .expect("export should succeed");

    let bytes = fs::read(&frame.path).expect("Failed to read export");
    assert_eq!(&bytes[..2], &[0xFF, 0xD8], "JPEG start-of-image marker");
    let decoded = image::load_from_memory(&bytes).expect("Failed to decode export");
    assert_eq!((decoded.width(), decoded.height()), (16, 9));
}

#[test]
fn frame_source_is_released_after_export() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let retriever = ScriptedRetriever::new();
    let (exporter, _) = exporter(&retriever, temp.path());

    exporter.export_current_frame(&clip(), 100);
    exporter.export_current_frame(&clip(), 200);

    assert_eq!(retriever.opened(), 2, "each export opens its own source");
    assert_eq!(retriever.alive(), 0);
}

#[test]
fn back_to_back_exports_get_distinct_names() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let retriever = ScriptedRetriever::new();
    let (exporter, _) = exporter(&retriever, temp.path());

    let first = exporter.export_current_frame(&clip(), 0).expect("first");
    let second = exporter.export_current_frame(&clip(), 0).expect("second");

    assert_ne!(first.path, second.path);
    assert_eq!(gallery_files(temp.path()).len(), 2);
}

#[test]
fn negative_position_exports_the_first_frame() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let retriever = ScriptedRetriever::new();
    let (exporter, _) = exporter(&retriever, temp.path());

    exporter.export_current_frame(&clip(), -250);
    assert_eq!(retriever.requests(), vec![Duration::ZERO]);
}

// ── failures ───────────────────────────────────────────────────────

#[test]
fn unreadable_resource_leaves_no_artifact() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let retriever = ScriptedRetriever::new();
    let (exporter, notifier) = exporter(&retriever, temp.path());

    assert!(exporter.export_current_frame(&missing_clip(), 2_000).is_none());

    assert!(gallery_files(temp.path()).is_empty());
    assert_eq!(notifier.notices(), vec![Notice::ExportFailed]);
    assert_eq!(notifier.notices()[0].message(), "Error saving frame.");
}

#[test]
fn failed_open_is_reported_as_resource_error() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let retriever = ScriptedRetriever::failing();
    let (exporter, _) = exporter(&retriever, temp.path());

    let result = exporter.try_export(&clip(), Duration::ZERO);
    assert!(matches!(result, Err(FrameStepError::ResourceOpen { .. })));
}

#[test]
fn missing_frame_is_reported_and_source_released() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let retriever = ScriptedRetriever::without_frames();
    let (exporter, notifier) = exporter(&retriever, temp.path());

    let result = exporter.try_export(&clip(), Duration::from_secs(3));
    assert!(matches!(result, Err(FrameStepError::NoFrameAt(position)) if position == Duration::from_secs(3)));
    assert_eq!(retriever.alive(), 0);

    exporter.export_current_frame(&clip(), 3_000);
    assert_eq!(notifier.notices(), vec![Notice::ExportFailed]);
    assert!(gallery_files(temp.path()).is_empty());
}

#[test]
fn unwritable_collection_is_a_persist_error() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    // A regular file where the collection directory should be.
    fs::write(temp.path().join("SkiAnalysis"), b"not a directory").expect("write blocker");

    let store = GalleryStore::new(export_options(temp.path()));
    let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
    let result = store.save(&image, Duration::ZERO);
    assert!(matches!(result, Err(FrameStepError::PersistError { .. })));
}

// ── gallery settings ───────────────────────────────────────────────

#[test]
fn custom_namespace_and_prefix() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let store = GalleryStore::new(
        ExportOptions::new()
            .with_root(temp.path())
            .with_namespace("Sprints")
            .with_prefix("Lap")
            .with_quality(80),
    );
    assert_eq!(store.file_name(1_700_000_000_123), "Lap_1700000000123.jpg");

    let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
    let frame = store.save(&image, Duration::ZERO).expect("save");
    assert_eq!(frame.path.parent(), Some(temp.path().join("Sprints").as_path()));
    assert!(frame.display_name.starts_with("Lap_"));
}

// ── async and controller-driven exports ────────────────────────────

#[tokio::test]
async fn async_export_resolves_with_the_frame() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let retriever = ScriptedRetriever::new();
    let (exporter, notifier) = exporter(&retriever, temp.path());

    let frame = exporter.export_async(&clip(), 1_000).await;
    assert!(frame.is_some());
    assert_eq!(gallery_files(temp.path()).len(), 1);
    assert!(matches!(notifier.notices()[..], [Notice::FrameSaved { .. }]));
}

#[tokio::test]
async fn controller_exports_the_current_position() {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let media = ScriptedMedia::with_duration(10_000);
    let options = EngineOptions::new().with_export(export_options(temp.path()));
    let (mut controller, notifier) = controller_with(&media, options);
    let retriever = ScriptedRetriever::new();
    let exporter = controller.frame_exporter(retriever.clone());

    assert!(controller.export_current_frame(&exporter).is_none(), "nothing loaded");
    assert_eq!(retriever.opened(), 0);

    controller.load(&clip());
    controller.seek_to(2_000);
    let frame = controller
        .export_current_frame_async(&exporter)
        .expect("a resource is loaded")
        .await
        .expect("export should succeed");

    assert_eq!(frame.position, Duration::from_millis(2_000));
    assert_eq!(gallery_files(temp.path()), vec![frame.path.clone()]);
    assert!(matches!(notifier.notices()[..], [Notice::FrameSaved { .. }]));
    assert_eq!(controller.position_ms(), 2_000, "exporting never moves the session");
}
