//! Shared test doubles: a scripted pipeline, a scripted frame retriever and a
//! notifier that records what it is told.

#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use framestep::{
    EngineOptions, ErrorListener, FrameRetriever, FrameSource, FrameStepError, LoadControl,
    MediaPipeline,
    Notice, Notifier, PipelineFactory, PlaybackController, PlaybackRate, PlayingListener,
    PositionSource, ResourceHandle, SeekMode,
};
use image::{DynamicImage, RgbImage};

// ── scripted pipeline ──────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PipelineState {
    pub position: Duration,
    pub duration: Option<Duration>,
    pub rate: Option<PlaybackRate>,
    pub playing: bool,
    /// Set once playback has run off the end; cleared by a seek.
    pub ended: bool,
    pub media: Option<ResourceHandle>,
    pub prepared: bool,
    pub released: bool,
    pub calls: Vec<&'static str>,
    pub seeks: Vec<(Duration, SeekMode)>,
    pub load_controls: Vec<LoadControl>,
}

/// State shared between a test and every pipeline its factory builds.
#[derive(Default)]
pub struct ScriptedMedia {
    state: Mutex<PipelineState>,
    listener: Mutex<Option<Arc<dyn Fn(bool) + Send + Sync>>>,
    error_listener: Mutex<Option<Arc<dyn Fn(FrameStepError) + Send + Sync>>>,
    builds: AtomicUsize,
    duration: Mutex<Option<Duration>>,
}

impl ScriptedMedia {
    /// Media whose every resource reports `duration_ms`, except resources
    /// whose name contains `missing`, which fail to prepare.
    pub fn with_duration(duration_ms: u64) -> Arc<Self> {
        let media = Arc::new(Self::default());
        *media.duration.lock().unwrap() = Some(Duration::from_millis(duration_ms));
        media
    }

    pub fn factory(self: &Arc<Self>) -> Arc<dyn PipelineFactory> {
        let media = Arc::clone(self);
        Arc::new(
            move |load_control: &LoadControl| -> Result<Box<dyn MediaPipeline>, FrameStepError> {
                media.builds.fetch_add(1, Ordering::SeqCst);
                media.state().load_controls.push(*load_control);
                Ok(Box::new(ScriptedPipeline {
                    media: Arc::clone(&media),
                }))
            },
        )
    }

    pub fn state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap()
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Move the playhead as if playback had advanced.
    pub fn set_position_ms(&self, position_ms: u64) {
        self.state().position = Duration::from_millis(position_ms);
    }

    pub fn position_ms(&self) -> u64 {
        self.state().position.as_millis() as u64
    }

    pub fn seeks(&self) -> Vec<(Duration, SeekMode)> {
        self.state().seeks.clone()
    }

    /// Simulate the pipeline reaching the end of the stream on its own.
    pub fn finish_playback(&self) {
        let changed = {
            let mut state = self.state();
            state.ended = true;
            std::mem::replace(&mut state.playing, false)
        };
        if changed {
            self.notify(false);
        }
    }

    /// Simulate a seek the decode thread could not complete: the clock goes
    /// back to `previous_ms` and the error is reported.
    pub fn fail_seek(&self, previous_ms: u64) {
        let target = {
            let mut state = self.state();
            let target = state.position;
            state.position = Duration::from_millis(previous_ms);
            target
        };
        self.report(FrameStepError::SeekError {
            position: target,
            reason: "corrupt packet".to_string(),
        });
    }

    /// Report an error from the pipeline's own thread.
    pub fn report(&self, error: FrameStepError) {
        let listener = self.error_listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener(error);
        }
    }

    fn notify(&self, playing: bool) {
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener(playing);
        }
    }
}

struct ScriptedClock {
    media: Arc<ScriptedMedia>,
}

impl PositionSource for ScriptedClock {
    fn position(&self) -> Duration {
        self.media.state().position
    }

    fn duration(&self) -> Option<Duration> {
        self.media.state().duration
    }
}

/// A pipeline whose clock only moves when a test moves it. Listener calls
/// are made after the state lock is dropped.
pub struct ScriptedPipeline {
    media: Arc<ScriptedMedia>,
}

impl ScriptedPipeline {
    fn set_playing(&mut self, playing: bool) {
        let changed = {
            let mut state = self.media.state();
            std::mem::replace(&mut state.playing, playing) != playing
        };
        if changed {
            self.media.notify(playing);
        }
    }
}

impl MediaPipeline for ScriptedPipeline {
    fn set_playing_listener(&mut self, listener: PlayingListener) {
        *self.media.listener.lock().unwrap() = Some(Arc::from(listener));
    }

    fn set_error_listener(&mut self, listener: ErrorListener) {
        *self.media.error_listener.lock().unwrap() = Some(Arc::from(listener));
    }

    fn stop(&mut self) {
        self.media.state().calls.push("stop");
        self.set_playing(false);
        self.media.state().prepared = false;
    }

    fn clear_media(&mut self) {
        let mut state = self.media.state();
        state.calls.push("clear_media");
        state.media = None;
    }

    fn set_media(&mut self, resource: &ResourceHandle) {
        let mut state = self.media.state();
        state.calls.push("set_media");
        state.media = Some(resource.clone());
    }

    fn prepare(&mut self) -> Result<(), FrameStepError> {
        let duration = *self.media.duration.lock().unwrap();
        let mut state = self.media.state();
        state.calls.push("prepare");
        let resource = state
            .media
            .clone()
            .ok_or_else(|| FrameStepError::PrepareError("no media set".to_string()))?;
        if resource.to_string().contains("missing") {
            return Err(FrameStepError::ResourceOpen {
                resource: resource.to_string(),
                reason: "No such file or directory".to_string(),
            });
        }
        state.prepared = true;
        state.ended = false;
        state.duration = duration;
        state.position = Duration::ZERO;
        Ok(())
    }

    fn seek_to(&mut self, position: Duration, mode: SeekMode) -> Result<(), FrameStepError> {
        let mut state = self.media.state();
        state.calls.push("seek_to");
        if !state.prepared {
            return Err(FrameStepError::SeekError {
                position,
                reason: "no media prepared".to_string(),
            });
        }
        state.position = match state.duration {
            Some(duration) => position.min(duration),
            None => position,
        };
        state.ended = false;
        state.seeks.push((position, mode));
        Ok(())
    }

    fn set_playback_rate(&mut self, rate: PlaybackRate) {
        let mut state = self.media.state();
        state.calls.push("set_playback_rate");
        state.rate = Some(rate);
    }

    fn playback_rate(&self) -> PlaybackRate {
        self.media.state().rate.unwrap_or_default()
    }

    /// At the end of the stream playback starts and stops again at once.
    fn play(&mut self) {
        let ended = {
            let mut state = self.media.state();
            state.calls.push("play");
            state.ended
        };
        self.set_playing(true);
        if ended {
            self.set_playing(false);
        }
    }

    fn pause(&mut self) {
        self.media.state().calls.push("pause");
        self.set_playing(false);
    }

    fn is_playing(&self) -> bool {
        self.media.state().playing
    }

    fn position_source(&self) -> Arc<dyn PositionSource> {
        Arc::new(ScriptedClock {
            media: Arc::clone(&self.media),
        })
    }

    fn release(&mut self) {
        let mut state = self.media.state();
        state.calls.push("release");
        state.released = true;
        state.playing = false;
        state.prepared = false;
    }
}

// ── notices ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

// ── scripted frame retriever ───────────────────────────────────────

/// Hands out solid-colour frames, or fails, and counts how many sources are
/// alive.
pub struct ScriptedRetriever {
    pub fail_open: bool,
    pub empty: bool,
    pub opened: AtomicUsize,
    pub alive: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<Duration>>>,
}

impl ScriptedRetriever {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::plain())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_open: true,
            ..Self::plain()
        })
    }

    pub fn without_frames() -> Arc<Self> {
        Arc::new(Self {
            empty: true,
            ..Self::plain()
        })
    }

    fn plain() -> Self {
        Self {
            fail_open: false,
            empty: false,
            opened: AtomicUsize::new(0),
            alive: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn alive(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Duration> {
        self.requests.lock().unwrap().clone()
    }
}

impl FrameRetriever for ScriptedRetriever {
    fn open(&self, resource: &ResourceHandle) -> Result<Box<dyn FrameSource>, FrameStepError> {
        if self.fail_open || resource.to_string().contains("missing") {
            return Err(FrameStepError::ResourceOpen {
                resource: resource.to_string(),
                reason: "No such file or directory".to_string(),
            });
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.alive.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            empty: self.empty,
            alive: Arc::clone(&self.alive),
            requests: Arc::clone(&self.requests),
        }))
    }
}

struct ScriptedSource {
    empty: bool,
    alive: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Duration>>>,
}

impl FrameSource for ScriptedSource {
    fn frame_closest_to(
        &mut self,
        position: Duration,
    ) -> Result<Option<DynamicImage>, FrameStepError> {
        self.requests.lock().unwrap().push(position);
        if self.empty {
            return Ok(None);
        }
        let image = RgbImage::from_pixel(16, 9, image::Rgb([200, 40, 40]));
        Ok(Some(DynamicImage::ImageRgb8(image)))
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── controller helpers ─────────────────────────────────────────────

/// A controller over scripted media, on the current (test) runtime.
pub fn controller(
    media: &Arc<ScriptedMedia>,
) -> (PlaybackController, Arc<RecordingNotifier>) {
    controller_with(media, EngineOptions::new())
}

pub fn controller_with(
    media: &Arc<ScriptedMedia>,
    options: EngineOptions,
) -> (PlaybackController, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let controller = PlaybackController::new(media.factory(), options, notifier.clone())
        .expect("Failed to create controller inside a runtime");
    (controller, notifier)
}

pub fn clip() -> ResourceHandle {
    ResourceHandle::from_path("clips/run.mp4")
}

pub fn missing_clip() -> ResourceHandle {
    ResourceHandle::from_path("clips/missing.mp4")
}
