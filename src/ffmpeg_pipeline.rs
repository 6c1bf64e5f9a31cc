//! FFmpeg-backed [`MediaPipeline`].
//!
//! The pipeline is split in two. The caller-facing half owns a
//! [`PlaybackClock`], the authoritative position that advances with wall time
//! scaled by the playback rate while playing. A dedicated decode thread owns
//! the demuxer and decoder; it follows the clock, decoding ahead and
//! publishing the frame due at the current position into a latest-frame slot
//! that a renderer reads with [`FfmpegPipeline::current_frame`].
//!
//! Commands reach the decode thread over a crossbeam channel, so every
//! [`MediaPipeline`] method returns immediately. Exact seeks update the clock
//! synchronously and leave the decode-forward work to the thread; if that
//! work fails the clock rolls back to where it was and the error goes to the
//! error listener.
//!
//! Both threads start and stop the clock. Each start or stop and the playing
//! notification it causes happen under one transition lock, so listeners
//! observe changes in the order the clock made them.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use framestep::{FfmpegPipeline, LoadControl, MediaPipeline, ResourceHandle, SeekMode};
//!
//! let mut pipeline = FfmpegPipeline::new(&LoadControl::default())?;
//! pipeline.set_media(&ResourceHandle::from_path("run.mp4"));
//! pipeline.prepare()?;
//! pipeline.seek_to(Duration::from_millis(1_500), SeekMode::Exact)?;
//! if let Some(frame) = pipeline.current_frame() {
//!     println!("{}x{} at {:?}", frame.image.width(), frame.image.height(), frame.position);
//! }
//! pipeline.release();
//! # Ok::<(), framestep::FrameStepError>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use image::DynamicImage;

use crate::{
    configuration::LoadControl,
    decoder::{DecodedFrame, StreamDecoder},
    error::FrameStepError,
    pipeline::{
        ErrorListener, MediaPipeline, PipelineFactory, PlaybackRate, PlayingListener,
        PositionSource, SeekMode,
    },
    resource::ResourceHandle,
};

/// Longest the decode thread sleeps before re-checking the clock.
const MAX_FRAME_WAIT: Duration = Duration::from_millis(20);

/// A frame published to the render target.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    /// Presentation time of the frame.
    pub position: Duration,
    /// The decoded image.
    pub image: Arc<DynamicImage>,
}

struct ClockState {
    anchor_position: Duration,
    anchor_instant: Instant,
    rate: PlaybackRate,
    playing: bool,
    duration: Option<Duration>,
    /// Bumped by every jump; a failed seek only rolls back its own jump.
    seek_serial: u64,
}

impl ClockState {
    fn now(&self) -> Duration {
        let position = if self.playing {
            let elapsed = self.anchor_instant.elapsed().mul_f64(self.rate.get());
            self.anchor_position.saturating_add(elapsed)
        } else {
            self.anchor_position
        };
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn reanchor(&mut self) {
        self.anchor_position = self.now();
        self.anchor_instant = Instant::now();
    }

    fn jump(&mut self, position: Duration) {
        self.anchor_position = match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        };
        self.anchor_instant = Instant::now();
        self.seek_serial = self.seek_serial.wrapping_add(1);
    }
}

/// A clock jump made for a seek that the decode thread has yet to complete.
#[derive(Debug, Clone, Copy)]
struct SeekTicket {
    serial: u64,
    target: Duration,
    previous: Duration,
}

/// Media clock: position advances with wall time scaled by the rate while
/// playing and is frozen while paused.
pub struct PlaybackClock {
    state: Mutex<ClockState>,
}

impl Debug for PlaybackClock {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let state = self.lock();
        f.debug_struct("PlaybackClock")
            .field("position", &state.now())
            .field("rate", &state.rate)
            .field("playing", &state.playing)
            .field("duration", &state.duration)
            .finish()
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self {
            state: Mutex::new(ClockState {
                anchor_position: Duration::ZERO,
                anchor_instant: Instant::now(),
                rate: PlaybackRate::NORMAL,
                playing: false,
                duration: None,
                seek_serial: 0,
            }),
        }
    }
}

impl PlaybackClock {
    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the clock. Returns `true` if it was stopped.
    pub fn start(&self) -> bool {
        let mut state = self.lock();
        if state.playing {
            return false;
        }
        state.anchor_instant = Instant::now();
        state.playing = true;
        true
    }

    /// Freeze the clock at the current position. Returns `true` if it was
    /// running.
    pub fn stop(&self) -> bool {
        let mut state = self.lock();
        if !state.playing {
            return false;
        }
        state.reanchor();
        state.playing = false;
        true
    }

    /// Jump to `position`, keeping the running state.
    pub fn jump(&self, position: Duration) {
        self.lock().jump(position);
    }

    fn begin_seek(&self, position: Duration) -> SeekTicket {
        let mut state = self.lock();
        let previous = state.now();
        state.jump(position);
        SeekTicket {
            serial: state.seek_serial,
            target: state.anchor_position,
            previous,
        }
    }

    /// Undo the jump of a failed seek unless the clock has been moved since.
    fn roll_back(&self, ticket: SeekTicket) -> bool {
        let mut state = self.lock();
        if state.seek_serial != ticket.serial {
            return false;
        }
        state.jump(ticket.previous);
        true
    }

    /// Change the rate without moving the current position.
    pub fn set_rate(&self, rate: PlaybackRate) {
        let mut state = self.lock();
        state.reanchor();
        state.rate = rate;
    }

    /// Current rate.
    pub fn rate(&self) -> PlaybackRate {
        self.lock().rate
    }

    /// Whether the clock is running.
    pub fn is_running(&self) -> bool {
        self.lock().playing
    }

    fn reset(&self, duration: Option<Duration>) {
        let mut state = self.lock();
        state.playing = false;
        state.duration = duration;
        state.jump(Duration::ZERO);
    }
}

impl PositionSource for PlaybackClock {
    fn position(&self) -> Duration {
        self.lock().now()
    }

    fn duration(&self) -> Option<Duration> {
        self.lock().duration
    }
}

type SharedPlayingListener = Arc<dyn Fn(bool) + Send + Sync>;
type SharedErrorListener = Arc<dyn Fn(FrameStepError) + Send + Sync>;

/// The playing and error listeners, shared by both halves of the pipeline.
///
/// Listeners are cloned out of their slot and invoked with no clock lock
/// held.
#[derive(Default)]
struct Listeners {
    playing: Mutex<Option<SharedPlayingListener>>,
    error: Mutex<Option<SharedErrorListener>>,
    transition: Mutex<()>,
}

impl Listeners {
    fn set_playing(&self, listener: Option<SharedPlayingListener>) {
        *self.playing.lock().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    fn set_error(&self, listener: Option<SharedErrorListener>) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    /// Run a clock start or stop and, if it changed anything, announce
    /// `playing` before any other transition can run.
    fn transition(&self, change: impl FnOnce() -> bool, playing: bool) -> bool {
        let _order = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        if !change() {
            return false;
        }
        let listener = self
            .playing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(playing);
        }
        true
    }

    fn report(&self, error: FrameStepError) {
        let listener = self
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match listener {
            Some(listener) => listener(error),
            None => log::warn!("Decode thread error: {error}"),
        }
    }
}

enum DecodeCommand {
    Open { path: PathBuf, analyze: Duration },
    Close,
    Seek { ticket: SeekTicket, mode: SeekMode },
    Play,
    Pause,
    Shutdown,
}

type FrameSlot = Arc<Mutex<Option<RenderedFrame>>>;

struct DecodeWorker {
    commands: Receiver<DecodeCommand>,
    clock: Arc<PlaybackClock>,
    listeners: Arc<Listeners>,
    target: FrameSlot,
    decoder: Option<StreamDecoder>,
    /// Decoded but not yet due.
    pending: Option<DecodedFrame>,
    playing: bool,
}

impl DecodeWorker {
    fn run(mut self) {
        loop {
            let command = if self.playing && self.decoder.is_some() {
                match self.commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => return,
                }
            } else {
                match self.commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => return,
                }
            };

            let running = match command {
                Some(DecodeCommand::Shutdown) => false,
                Some(command) => {
                    self.handle(command);
                    true
                }
                None => self.advance(),
            };
            if !running {
                return;
            }
        }
    }

    fn handle(&mut self, command: DecodeCommand) {
        match command {
            DecodeCommand::Open { path, analyze } => {
                self.pending = None;
                self.decoder = match StreamDecoder::open(&path, Some(analyze)) {
                    Ok(decoder) => Some(decoder),
                    Err(error) => {
                        log::debug!("Decode thread could not open {}", path.display());
                        self.listeners.report(error);
                        None
                    }
                };
            }
            DecodeCommand::Close => {
                self.decoder = None;
                self.pending = None;
                self.playing = false;
            }
            DecodeCommand::Seek { ticket, mode } => self.seek(ticket, mode),
            DecodeCommand::Play => self.playing = true,
            DecodeCommand::Pause => self.playing = false,
            DecodeCommand::Shutdown => {}
        }
    }

    fn seek(&mut self, ticket: SeekTicket, mode: SeekMode) {
        let position = ticket.target;
        let Some(decoder) = self.decoder.as_mut() else {
            // The failed open has already been reported.
            self.clock.roll_back(ticket);
            return;
        };
        self.pending = None;

        let landed = match mode {
            SeekMode::Exact => decoder.seek_exact(position),
            SeekMode::ClosestSync => decoder
                .seek_keyframe(position)
                .and_then(|()| decoder.next_frame()),
        };
        match landed {
            Ok(Some(decoded)) => self.present(&decoded),
            Ok(None) => log::debug!("Seek to {position:?} found no frame"),
            Err(error) => {
                if self.clock.roll_back(ticket) {
                    log::debug!("Seek to {position:?} failed, clock back at {:?}", ticket.previous);
                }
                self.listeners.report(FrameStepError::SeekError {
                    position,
                    reason: error.to_string(),
                });
            }
        }
    }

    /// Decode ahead while playing and publish each frame once the clock
    /// reaches it. Returns `false` once the thread should exit.
    fn advance(&mut self) -> bool {
        let decoded = match self.pending.take() {
            Some(decoded) => decoded,
            None => {
                let Some(decoder) = self.decoder.as_mut() else {
                    return true;
                };
                match decoder.next_frame() {
                    Ok(Some(decoded)) => decoded,
                    Ok(None) => {
                        self.finish();
                        return true;
                    }
                    Err(error) => {
                        self.finish();
                        self.listeners.report(error);
                        return true;
                    }
                }
            }
        };

        let now = self.clock.position();
        if decoded.position > now {
            let rate = self.clock.rate().get();
            let wait = (decoded.position - now).div_f64(rate).min(MAX_FRAME_WAIT);
            self.pending = Some(decoded);
            return match self.commands.recv_timeout(wait) {
                Ok(DecodeCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => false,
                Ok(command) => {
                    self.handle(command);
                    true
                }
                Err(RecvTimeoutError::Timeout) => true,
            };
        }

        self.present(&decoded);
        true
    }

    /// End of stream: hold the last frame and pause.
    fn finish(&mut self) {
        self.playing = false;
        let clock = &self.clock;
        if self.listeners.transition(|| clock.stop(), false) {
            log::debug!("Playback stopped at {:?}", clock.position());
        }
    }

    fn present(&mut self, decoded: &DecodedFrame) {
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        match decoder.render(decoded) {
            Ok(image) => {
                let frame = RenderedFrame {
                    position: decoded.position,
                    image: Arc::new(image),
                };
                *self.target.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
            }
            Err(error) => self.listeners.report(error),
        }
    }
}

/// Decode/render pipeline built on FFmpeg.
pub struct FfmpegPipeline {
    load_control: LoadControl,
    clock: Arc<PlaybackClock>,
    listeners: Arc<Listeners>,
    target: FrameSlot,
    commands: Sender<DecodeCommand>,
    worker: Option<JoinHandle<()>>,
    media: Option<ResourceHandle>,
    prepared: bool,
}

impl Debug for FfmpegPipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegPipeline")
            .field("load_control", &self.load_control)
            .field("clock", &self.clock)
            .field("media", &self.media)
            .field("prepared", &self.prepared)
            .finish_non_exhaustive()
    }
}

impl FfmpegPipeline {
    /// Initialise FFmpeg and start the decode thread.
    ///
    /// # Errors
    ///
    /// Returns [`FrameStepError::FfmpegError`] if FFmpeg cannot be
    /// initialised, or [`FrameStepError::IoError`] if the thread cannot be
    /// spawned.
    pub fn new(load_control: &LoadControl) -> Result<Self, FrameStepError> {
        ffmpeg_next::init()?;

        let clock = Arc::new(PlaybackClock::default());
        let listeners = Arc::new(Listeners::default());
        let target: FrameSlot = Arc::new(Mutex::new(None));
        let (commands, receiver) = unbounded();

        let worker_clock = Arc::clone(&clock);
        let worker_listeners = Arc::clone(&listeners);
        let worker_target = Arc::clone(&target);
        let worker = thread::Builder::new()
            .name("framestep-decode".to_string())
            .spawn(move || {
                DecodeWorker {
                    commands: receiver,
                    clock: worker_clock,
                    listeners: worker_listeners,
                    target: worker_target,
                    decoder: None,
                    pending: None,
                    playing: false,
                }
                .run();
            })?;

        log::debug!("FFmpeg pipeline started with {load_control:?}");
        Ok(Self {
            load_control: *load_control,
            clock,
            listeners,
            target,
            commands,
            worker: Some(worker),
            media: None,
            prepared: false,
        })
    }

    /// A factory building FFmpeg pipelines for a session.
    pub fn factory() -> Arc<dyn PipelineFactory> {
        Arc::new(FfmpegPipelineFactory)
    }

    /// The most recently rendered frame.
    pub fn current_frame(&self) -> Option<RenderedFrame> {
        self.target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The pipeline's clock.
    pub fn clock(&self) -> &Arc<PlaybackClock> {
        &self.clock
    }

    fn send(&self, command: DecodeCommand) {
        if self.commands.send(command).is_err() {
            log::warn!("Decode thread is gone");
        }
    }
}

impl MediaPipeline for FfmpegPipeline {
    fn set_playing_listener(&mut self, listener: PlayingListener) {
        self.listeners.set_playing(Some(Arc::from(listener)));
    }

    fn set_error_listener(&mut self, listener: ErrorListener) {
        self.listeners.set_error(Some(Arc::from(listener)));
    }

    fn stop(&mut self) {
        self.pause();
        self.prepared = false;
        self.send(DecodeCommand::Close);
    }

    fn clear_media(&mut self) {
        self.media = None;
        *self.target.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn set_media(&mut self, resource: &ResourceHandle) {
        self.media = Some(resource.clone());
    }

    fn prepare(&mut self) -> Result<(), FrameStepError> {
        let resource = self
            .media
            .as_ref()
            .ok_or_else(|| FrameStepError::PrepareError("no media set".to_string()))?;
        let path = resource.resolve()?;

        // Probe synchronously so failures surface here; the decode thread
        // opens its own demuxer.
        let analyze = self.load_control.buffer_for_playback;
        let duration = StreamDecoder::open(&path, Some(analyze))?.info().duration;

        self.clock.reset(duration);
        self.send(DecodeCommand::Open { path, analyze });
        self.prepared = true;
        log::debug!("Prepared {resource} (duration {duration:?})");
        Ok(())
    }

    fn seek_to(&mut self, position: Duration, mode: SeekMode) -> Result<(), FrameStepError> {
        if !self.prepared {
            return Err(FrameStepError::SeekError {
                position,
                reason: "no media prepared".to_string(),
            });
        }
        let ticket = self.clock.begin_seek(position);
        self.send(DecodeCommand::Seek { ticket, mode });
        Ok(())
    }

    fn set_playback_rate(&mut self, rate: PlaybackRate) {
        self.clock.set_rate(rate);
    }

    fn playback_rate(&self) -> PlaybackRate {
        self.clock.rate()
    }

    fn play(&mut self) {
        if !self.prepared {
            return;
        }
        let clock = &self.clock;
        if self.listeners.transition(|| clock.start(), true) {
            self.send(DecodeCommand::Play);
        }
    }

    fn pause(&mut self) {
        let clock = &self.clock;
        if self.listeners.transition(|| clock.stop(), false) {
            self.send(DecodeCommand::Pause);
        }
    }

    fn is_playing(&self) -> bool {
        self.clock.is_running()
    }

    fn position_source(&self) -> Arc<dyn PositionSource> {
        self.clock.clone()
    }

    fn release(&mut self) {
        self.pause();
        self.listeners.set_playing(None);
        self.listeners.set_error(None);
        self.prepared = false;
        self.media = None;
        self.send(DecodeCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Decode thread panicked");
            }
        }
        *self.target.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Drop for FfmpegPipeline {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.release();
        }
    }
}

/// [`PipelineFactory`] producing [`FfmpegPipeline`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegPipelineFactory;

impl PipelineFactory for FfmpegPipelineFactory {
    fn build(&self, load_control: &LoadControl) -> Result<Box<dyn MediaPipeline>, FrameStepError> {
        Ok(Box::new(FfmpegPipeline::new(load_control)?))
    }
}
