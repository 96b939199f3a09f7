//! Playback session.
//!
//! Binds the loaded track to its transport and to the engine's processing
//! chain, runs the load/play/advance lifecycle and drives the periodic UI
//! updates. All state sits behind one lock; it is never held across an
//! await, and when both are needed it is taken before the engine lock.

mod events;
mod provider;
mod updates;

pub use events::{LoadState, PlayerSnapshot, SessionEvent};
pub use provider::TrackProvider;

use parking_lot::Mutex;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::audio::analyser::Analyser;
use crate::audio::chain::{clamp_eq_gain, EQ_BANDS};
use crate::audio::decoder::decode_to_buffer;
use crate::audio::preview::test_tone;
use crate::audio::{EngineHandle, EngineOutputs, SampleBuffer, SourceEnded};
use crate::error::{PlayerError, PlayerResult};
use crate::library::{FolderListing, TrackList};
use crate::settings::track_settings::{clamp_speed, clamp_volume};
use crate::settings::{PlayerConfig, TrackSettings};
use crate::transport::TransportClock;
use updates::{run_periodic, UpdateTask};

/// Elapsed time past which "previous" restarts the current track
pub const RESTART_THRESHOLD_SECS: f64 = 3.0;

/// How long settings changes stay unsaved after settings are applied
pub const SETTINGS_GUARD: Duration = Duration::from_millis(50);

struct LoadedTrack {
    path: String,
    buffer: Arc<SampleBuffer>,
    transport: TransportClock,
}

struct SessionInner {
    /// Last path handed to `load_track`; loads for any other path are stale
    requested_path: Option<String>,
    track: Option<LoadedTrack>,
    load_state: LoadState,
    source_id: Option<u64>,
    settings: TrackSettings,
    guard_until: Option<Instant>,
    visuals_enabled: bool,
    seek_dragging: bool,
    tracks: TrackList,
    render_loop: UpdateTask,
    reduced_loop: UpdateTask,
    disposed: bool,
}

impl SessionInner {
    fn is_playing(&self) -> bool {
        self.track.as_ref().is_some_and(|t| t.transport.is_playing())
    }

    fn position(&self) -> (f64, f64) {
        self.track
            .as_ref()
            .map(|t| (t.transport.current_position(), t.transport.duration()))
            .unwrap_or((0.0, 0.0))
    }

    fn settings_guarded(&self) -> bool {
        self.guard_until.is_some_and(|until| Instant::now() < until)
    }

    fn halt_updates(&mut self) {
        self.render_loop.stop();
        self.reduced_loop.stop();
    }
}

struct Shared<P> {
    inner: Mutex<SessionInner>,
    engine: EngineHandle,
    analyser: Mutex<Analyser>,
    provider: Arc<P>,
    events: UnboundedSender<SessionEvent>,
    runtime: Handle,
    frame_interval: Duration,
    reduced_interval: Duration,
    ended_pump: Mutex<Option<JoinHandle<()>>>,
}

impl<P> Shared<P> {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

enum PreviousAction {
    Restart,
    Load(String),
    Nothing,
}

/// The player core. Cheap to clone; clones share one session.
pub struct PlaybackSession<P: TrackProvider> {
    shared: Arc<Shared<P>>,
}

impl<P: TrackProvider> Clone for PlaybackSession<P> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<P: TrackProvider> PlaybackSession<P> {
    pub fn new(
        engine: EngineHandle,
        outputs: EngineOutputs,
        provider: Arc<P>,
        config: &PlayerConfig,
        runtime: Handle,
    ) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let EngineOutputs { ended, analyser } = outputs;

        let inner = SessionInner {
            requested_path: None,
            track: None,
            load_state: LoadState::Idle,
            source_id: None,
            settings: TrackSettings::default(),
            guard_until: None,
            visuals_enabled: config.visuals_enabled,
            seek_dragging: false,
            tracks: TrackList::default(),
            render_loop: UpdateTask::default(),
            reduced_loop: UpdateTask::default(),
            disposed: false,
        };

        let shared = Arc::new(Shared {
            inner: Mutex::new(inner),
            engine,
            analyser: Mutex::new(analyser),
            provider,
            events,
            runtime: runtime.clone(),
            frame_interval: config.frame_interval(),
            reduced_interval: config.reduced_interval(),
            ended_pump: Mutex::new(None),
        });

        let pump = runtime.spawn(pump_ended(Arc::downgrade(&shared), ended));
        *shared.ended_pump.lock() = Some(pump);

        (Self { shared }, events_rx)
    }

    fn from_weak(weak: &Weak<Shared<P>>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    fn is_current_request(&self, path: &str) -> bool {
        let inner = self.shared.inner.lock();
        !inner.disposed && inner.requested_path.as_deref() == Some(path)
    }

    /// Load `path` and start playing it from the beginning.
    ///
    /// A load that is overtaken by a newer request is dropped silently after
    /// whichever step it was waiting on. Failures leave nothing playing.
    pub async fn load_track(&self, path: &str) -> PlayerResult<()> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.disposed {
                return Ok(());
            }
            inner.halt_updates();
            self.shared.engine.stop_source();
            inner.source_id = None;
            inner.track = None;
            inner.requested_path = Some(path.to_string());
            inner.load_state = LoadState::Loading;
        }
        log::info!("[Session] Loading {}", path);
        self.shared.emit(SessionEvent::LoadStarted {
            path: path.to_string(),
        });

        let saved = self.shared.provider.track_settings(path).await;
        if !self.is_current_request(path) {
            log::debug!("[Session] Discarding stale load of {}", path);
            return Ok(());
        }
        self.apply_settings(saved);

        let bytes = self.shared.provider.audio_data(path).await;
        if !self.is_current_request(path) {
            log::debug!("[Session] Discarding stale load of {}", path);
            return Ok(());
        }
        let Some(bytes) = bytes else {
            return self.fail_load(path, PlayerError::Unreadable(path.to_string()));
        };

        let extension = Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        let target_rate = self.shared.engine.sample_rate();
        let decoded =
            tokio::task::spawn_blocking(move || decode_to_buffer(bytes, extension.as_deref(), target_rate))
                .await
                .unwrap_or_else(|e| Err(format!("Decode task failed: {}", e)));

        if !self.is_current_request(path) {
            log::debug!("[Session] Discarding stale load of {}", path);
            return Ok(());
        }
        let buffer = match decoded {
            Ok(buffer) => Arc::new(buffer),
            Err(message) => {
                return self.fail_load(
                    path,
                    PlayerError::Decode {
                        path: path.to_string(),
                        message,
                    },
                );
            }
        };

        let duration = buffer.duration();
        {
            let mut inner = self.shared.inner.lock();
            self.shared.engine.reset_processing();
            self.shared.analyser.lock().reset();
            let rate = inner.settings.rate();
            inner.track = Some(LoadedTrack {
                path: path.to_string(),
                buffer,
                transport: TransportClock::new(self.shared.engine.clock(), duration, rate),
            });
            inner.load_state = LoadState::Ready;
            self.shared.emit(SessionEvent::Loaded {
                path: path.to_string(),
                duration,
            });
            self.start_locked(&mut inner, 0.0);
        }
        log::info!("[Session] Playing {} ({:.2}s)", path, duration);
        Ok(())
    }

    fn fail_load(&self, path: &str, error: PlayerError) -> PlayerResult<()> {
        log::error!("[Session] {}", error);
        let message = error.to_string();
        {
            let mut inner = self.shared.inner.lock();
            inner.load_state = LoadState::Failed {
                message: message.clone(),
            };
        }
        self.shared.emit(SessionEvent::LoadFailed {
            path: path.to_string(),
            message,
        });
        Err(error)
    }

    /// Begin a run at `position`, replacing whatever source was audible
    fn start_locked(&self, inner: &mut SessionInner, position: f64) {
        let Some(track) = inner.track.as_mut() else {
            return;
        };
        let position = track.transport.start(position);
        let id = self
            .shared
            .engine
            .start_source(track.buffer.clone(), position, track.transport.rate());
        inner.source_id = Some(id);

        self.shared.emit(SessionEvent::PlaybackChanged {
            playing: true,
            position,
        });
        self.ensure_updates_locked(inner);
    }

    fn silence_locked(&self, inner: &mut SessionInner) {
        self.shared.engine.stop_source();
        inner.source_id = None;
        inner.halt_updates();
        let (position, _) = inner.position();
        self.shared.emit(SessionEvent::PlaybackChanged {
            playing: false,
            position,
        });
    }

    /// Push volume, speed and EQ into the chain; None means defaults.
    /// Settings changes made within `SETTINGS_GUARD` of this call aren't saved.
    pub fn apply_settings(&self, settings: Option<TrackSettings>) {
        let settings = settings.unwrap_or_default().normalized();
        let mut inner = self.shared.inner.lock();
        inner.guard_until = Some(Instant::now() + SETTINGS_GUARD);

        let engine = &self.shared.engine;
        engine.set_master_gain(settings.volume / 100.0);
        for (band, gain) in settings.eq.iter().enumerate() {
            engine.set_eq_gain(band, *gain);
        }
        if let Some(track) = inner.track.as_mut() {
            let rate = settings.rate();
            if track.transport.set_rate(rate) {
                engine.set_source_rate(rate);
            }
        }

        inner.settings = settings.clone();
        self.shared.emit(SessionEvent::SettingsApplied { settings });
    }

    fn persist_locked(&self, inner: &SessionInner) {
        if inner.settings_guarded() {
            return;
        }
        if let Some(path) = inner.requested_path.as_deref() {
            self.shared.provider.save_track_settings(path, &inner.settings);
        }
    }

    /// Pause if playing, otherwise resume from the stop position.
    /// Returns whether the session is playing afterwards.
    pub fn toggle_play_pause(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(track) = inner.track.as_mut() else {
            return false;
        };

        if track.transport.is_playing() {
            track.transport.pause();
            self.silence_locked(&mut inner);
            false
        } else {
            let position = if track.transport.is_finished() {
                0.0
            } else {
                track.transport.position_at_stop()
            };
            self.start_locked(&mut inner, position);
            true
        }
    }

    /// Stop and rewind to where the current run began
    pub fn stop_with_return(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(track) = inner.track.as_mut() else {
            return false;
        };
        if !track.transport.stop_with_return() {
            return false;
        }
        self.silence_locked(&mut inner);
        true
    }

    /// Space-bar behaviour: stop with return while playing, otherwise play
    /// from the marker. Returns whether the session is playing afterwards.
    pub fn toggle_with_return(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(track) = inner.track.as_mut() else {
            return false;
        };

        if track.transport.stop_with_return() {
            self.silence_locked(&mut inner);
            false
        } else {
            let marker = track.transport.marker_position();
            self.start_locked(&mut inner, marker);
            true
        }
    }

    /// Scrub to `fraction` of the track. Returns the new position.
    pub fn seek(&self, fraction: f64) -> Option<f64> {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        let mut inner = self.shared.inner.lock();
        let track = inner.track.as_mut()?;
        let target = fraction * track.transport.duration();

        let position = if track.transport.is_playing() {
            let position = track.transport.seek(target);
            let id = self
                .shared
                .engine
                .start_source(track.buffer.clone(), position, track.transport.rate());
            inner.source_id = Some(id);
            position
        } else {
            track.transport.seek(target)
        };

        let duration = inner.position().1;
        self.shared.emit(SessionEvent::Progress { position, duration });
        Some(position)
    }

    pub fn set_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        let mut inner = self.shared.inner.lock();
        inner.settings.volume = volume;
        self.shared.engine.set_master_gain(volume / 100.0);
        self.persist_locked(&inner);
    }

    pub fn set_speed(&self, percent: f32) {
        let percent = clamp_speed(percent);
        let mut inner = self.shared.inner.lock();
        inner.settings.speed = percent;
        let rate = inner.settings.rate();
        if let Some(track) = inner.track.as_mut() {
            if track.transport.set_rate(rate) {
                self.shared.engine.set_source_rate(rate);
            }
        }
        self.persist_locked(&inner);
    }

    pub fn set_eq_band(&self, band: usize, gain_db: f32) -> PlayerResult<()> {
        if band >= EQ_BANDS {
            return Err(PlayerError::InvalidBand(band));
        }
        let gain_db = clamp_eq_gain(gain_db);
        let mut inner = self.shared.inner.lock();
        inner.settings.eq[band] = gain_db;
        self.shared.engine.set_eq_gain(band, gain_db);
        self.persist_locked(&inner);
        Ok(())
    }

    /// Load the next visible track. Returns false at the end of the list.
    pub async fn advance_to_next(&self) -> PlayerResult<bool> {
        let next = {
            let inner = self.shared.inner.lock();
            inner
                .requested_path
                .as_deref()
                .and_then(|current| inner.tracks.next_after(current))
        };

        match next {
            Some(path) => self.load_track(&path).await.map(|_| true),
            None => {
                log::debug!("[Session] No next track");
                Ok(false)
            }
        }
    }

    /// Restart the current track past the threshold, otherwise load the
    /// previous visible track. Returns false when nothing happened.
    pub async fn advance_to_previous(&self) -> PlayerResult<bool> {
        let action = {
            let mut inner = self.shared.inner.lock();
            let elapsed = inner.position().0;
            match inner.requested_path.clone() {
                Some(_) if inner.track.is_some() && elapsed > RESTART_THRESHOLD_SECS => {
                    self.start_locked(&mut inner, 0.0);
                    PreviousAction::Restart
                }
                Some(current) => match inner.tracks.previous_before(&current) {
                    Some(path) => PreviousAction::Load(path),
                    None => PreviousAction::Nothing,
                },
                None => PreviousAction::Nothing,
            }
        };

        match action {
            PreviousAction::Restart => Ok(true),
            PreviousAction::Load(path) => self.load_track(&path).await.map(|_| true),
            PreviousAction::Nothing => Ok(false),
        }
    }

    /// Handle the engine reporting that source `source_id` ran out
    async fn on_source_ended(&self, source_id: u64) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.source_id != Some(source_id) {
                log::debug!("[Session] Ignoring end of replaced source {}", source_id);
                return;
            }
            inner.source_id = None;

            let Some(track) = inner.track.as_mut() else {
                return;
            };
            if !track.transport.on_reached_end() {
                log::debug!("[Session] Source {} ended before the track did", source_id);
                return;
            }
            let path = track.path.clone();
            let duration = track.transport.duration();

            inner.halt_updates();
            self.shared.emit(SessionEvent::PlaybackChanged {
                playing: false,
                position: duration,
            });
            self.shared.emit(SessionEvent::TrackEnded { path });
        }

        if let Err(e) = self.advance_to_next().await {
            log::warn!("[Session] Auto-advance failed: {}", e);
        }
    }

    /// Play the test chime at device volume only. Works with no track
    /// loaded and leaves the transport alone.
    pub fn play_test_sound(&self) {
        let tone = test_tone(self.shared.engine.sample_rate());
        self.shared.engine.play_preview(Arc::new(tone));
    }

    /// Switch between the per-frame loop and the reduced position-only loop
    pub fn set_visuals_enabled(&self, enabled: bool) {
        let mut inner = self.shared.inner.lock();
        inner.visuals_enabled = enabled;
        if inner.is_playing() {
            self.ensure_updates_locked(&mut inner);
        } else {
            inner.halt_updates();
        }
    }

    /// While dragging, ticks leave the position display to the UI
    pub fn set_seek_dragging(&self, dragging: bool) {
        self.shared.inner.lock().seek_dragging = dragging;
    }

    pub fn set_track_listing(&self, folders: Vec<FolderListing>) {
        self.shared.inner.lock().tracks.set_folders(folders);
    }

    pub fn set_track_filter(&self, filter: &str) {
        self.shared.inner.lock().tracks.set_filter(filter);
    }

    /// Restore default settings for the current track and save them at once
    pub fn reset_track_settings(&self) -> bool {
        if self.shared.inner.lock().requested_path.is_none() {
            return false;
        }
        self.apply_settings(None);
        self.save_current_settings()
    }

    /// Save the current settings for the current track, guard or not
    pub fn save_current_settings(&self) -> bool {
        let inner = self.shared.inner.lock();
        match inner.requested_path.as_deref() {
            Some(path) => {
                self.shared.provider.save_track_settings(path, &inner.settings);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let inner = self.shared.inner.lock();
        let (position, duration) = inner.position();
        PlayerSnapshot {
            path: inner.requested_path.clone(),
            position,
            duration,
            playing: inner.is_playing(),
            load_state: inner.load_state.clone(),
            settings: inner.settings.clone(),
            visuals_enabled: inner.visuals_enabled,
        }
    }

    /// Stop playback and every background task. Later calls are no-ops.
    pub fn dispose(&self) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner.halt_updates();
            self.shared.engine.stop_source();
            inner.source_id = None;
            inner.track = None;
            inner.requested_path = None;
            inner.load_state = LoadState::Idle;
        }
        if let Some(pump) = self.shared.ended_pump.lock().take() {
            pump.abort();
        }
        log::info!("[Session] Disposed");
    }

    fn ensure_updates_locked(&self, inner: &mut SessionInner) {
        let weak = Arc::downgrade(&self.shared);
        let runtime = &self.shared.runtime;

        if inner.visuals_enabled {
            inner.reduced_loop.stop();
            inner.render_loop.start(
                runtime,
                run_periodic(self.shared.frame_interval, move || {
                    Self::from_weak(&weak).is_some_and(|session| session.render_tick())
                }),
            );
        } else {
            inner.render_loop.stop();
            inner.reduced_loop.start(
                runtime,
                run_periodic(self.shared.reduced_interval, move || {
                    Self::from_weak(&weak).is_some_and(|session| session.reduced_tick())
                }),
            );
        }
    }

    /// One display refresh: position plus spectrum. False ends the loop.
    fn render_tick(&self) -> bool {
        let (position, duration) = {
            let inner = self.shared.inner.lock();
            if !inner.visuals_enabled || !inner.is_playing() {
                return false;
            }
            let (position, duration) = inner.position();
            if !inner.seek_dragging {
                self.shared.emit(SessionEvent::Progress { position, duration });
            }
            (position, duration)
        };

        if position <= duration {
            let bins = self.shared.analyser.lock().frequency_data();
            self.shared.emit(SessionEvent::Spectrum { bins });
        }
        true
    }

    /// Position-only update for reduced-visual mode
    fn reduced_tick(&self) -> bool {
        let inner = self.shared.inner.lock();
        if inner.visuals_enabled || !inner.is_playing() {
            return false;
        }
        if !inner.seek_dragging {
            let (position, duration) = inner.position();
            self.shared.emit(SessionEvent::Progress { position, duration });
        }
        true
    }
}

async fn pump_ended<P: TrackProvider>(shared: Weak<Shared<P>>, mut ended: UnboundedReceiver<SourceEnded>) {
    while let Some(SourceEnded { source_id }) = ended.recv().await {
        let Some(session) = PlaybackSession::from_weak(&shared) else {
            break;
        };
        session.on_source_ended(source_id).await;
    }
}

#[cfg(test)]
mod tests;
