//! MediaSession lifecycle tests over a scripted pipeline.

mod common;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use common::{ScriptedMedia, clip, missing_clip};
use framestep::{FrameStepError, LoadControl, MediaSession, PlaybackRate, SeekMode};

fn session(media: &Arc<ScriptedMedia>) -> (MediaSession, Arc<Mutex<Vec<bool>>>) {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&changes);
    let session = MediaSession::new(
        media.factory(),
        LoadControl::default(),
        Arc::new(move |playing| recorded.lock().unwrap().push(playing)),
    );
    (session, changes)
}

// ── create / load ──────────────────────────────────────────────────

#[test]
fn create_is_idempotent() {
    let media = ScriptedMedia::with_duration(4_000);
    let (mut session, _) = session(&media);

    session.create().expect("create");
    session.create().expect("create again");

    assert_eq!(media.builds(), 1);
    assert!(session.is_active());
}

#[test]
fn load_leaves_first_frame_paused_at_zero() {
    let media = ScriptedMedia::with_duration(4_000);
    let (mut session, _) = session(&media);

    session.load(&clip()).expect("load");

    assert!(!session.is_playing());
    assert_eq!(session.position(), Duration::ZERO);
    assert_eq!(session.duration(), Some(Duration::from_millis(4_000)));
    assert_eq!(session.resource(), Some(&clip()));
    assert_eq!(media.seeks(), vec![(Duration::ZERO, SeekMode::Exact)]);
}

#[test]
fn failed_load_forgets_the_previous_resource() {
    let media = ScriptedMedia::with_duration(4_000);
    let (mut session, _) = session(&media);
    session.load(&clip()).expect("load");

    let result = session.load(&missing_clip());
    assert!(matches!(result, Err(FrameStepError::ResourceOpen { .. })));
    assert!(session.resource().is_none());
    assert!(session.is_active(), "the pipeline survives a failed load");
}

// ── seeking ────────────────────────────────────────────────────────

#[test]
fn seeks_clamp_at_zero() {
    let media = ScriptedMedia::with_duration(4_000);
    let (mut session, _) = session(&media);
    session.load(&clip()).expect("load");

    assert_eq!(
        session.seek_absolute(-1).expect("seek"),
        Some(Duration::ZERO)
    );
    assert_eq!(
        session.seek_relative(-5_000).expect("seek"),
        Some(Duration::ZERO)
    );
    assert_eq!(
        session.seek_relative(250).expect("seek"),
        Some(Duration::from_millis(250))
    );
    assert!(
        media
            .seeks()
            .iter()
            .all(|&(_, mode)| mode == SeekMode::Exact)
    );
}

#[test]
fn operations_without_a_pipeline_are_no_ops() {
    let media = ScriptedMedia::with_duration(4_000);
    let (mut session, changes) = session(&media);

    assert_eq!(session.seek_relative(100).expect("no-op"), None);
    assert_eq!(session.seek_absolute(100).expect("no-op"), None);
    session.set_rate(PlaybackRate::new(0.5).unwrap());
    session.play();
    session.pause();
    session.release();

    assert!(!session.is_playing());
    assert_eq!(session.position(), Duration::ZERO);
    assert_eq!(session.duration(), None);
    assert_eq!(session.playback_rate(), PlaybackRate::NORMAL);
    assert!(session.position_source().is_none());
    assert_eq!(media.builds(), 0);
    assert!(changes.lock().unwrap().is_empty());
}

// ── playing signal ─────────────────────────────────────────────────

#[test]
fn playing_flag_mirrors_the_pipeline_signal() {
    let media = ScriptedMedia::with_duration(4_000);
    let (mut session, changes) = session(&media);
    session.load(&clip()).expect("load");

    session.play();
    assert!(session.is_playing());
    session.play();
    session.pause();
    assert!(!session.is_playing());

    media.state().playing = true;
    media.finish_playback();
    assert!(!session.is_playing());

    assert_eq!(*changes.lock().unwrap(), vec![true, false, false]);
}

#[test]
fn pipeline_errors_reach_the_error_handler() {
    let media = ScriptedMedia::with_duration(4_000);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&errors);
    let mut session = MediaSession::new(
        media.factory(),
        LoadControl::default(),
        Arc::new(|_: bool| {}),
    )
    .with_error_handler(Arc::new(move |error: FrameStepError| {
        recorded.lock().unwrap().push(error.to_string())
    }));
    session.load(&clip()).expect("load");

    media.report(FrameStepError::VideoDecodeError("bad slice".to_string()));

    assert_eq!(
        *errors.lock().unwrap(),
        vec!["Failed to decode video frame: bad slice".to_string()]
    );
    assert!(session.resource().is_some());
}

#[test]
fn pipeline_errors_without_a_handler_are_only_logged() {
    let media = ScriptedMedia::with_duration(4_000);
    let (mut session, _) = session(&media);
    session.load(&clip()).expect("load");

    media.report(FrameStepError::NoVideoStream);
    assert!(session.resource().is_some());
}

#[test]
fn rate_is_forwarded_to_the_pipeline() {
    let media = ScriptedMedia::with_duration(4_000);
    let (mut session, _) = session(&media);
    session.load(&clip()).expect("load");

    session.set_rate(PlaybackRate::new(0.3).unwrap());
    assert_eq!(session.playback_rate(), PlaybackRate::new(0.3).unwrap());
}

// ── release ────────────────────────────────────────────────────────

#[test]
fn release_while_playing_reports_stopped_once() {
    let media = ScriptedMedia::with_duration(4_000);
    let (mut session, changes) = session(&media);
    session.load(&clip()).expect("load");
    session.play();

    session.release();
    session.release();

    assert!(!session.is_active());
    assert!(!session.is_playing());
    assert!(session.resource().is_none());
    assert!(media.state().released);
    assert_eq!(*changes.lock().unwrap(), vec![true, false]);
}

#[test]
fn drop_releases_the_pipeline() {
    let media = ScriptedMedia::with_duration(4_000);
    {
        let (mut session, _) = session(&media);
        session.load(&clip()).expect("load");
    }
    assert!(media.state().released);
}
