use super::*;
use crate::audio::testing::wav_bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

use crate::library::TrackEntry;

const RATE: u32 = 8000;

#[derive(Default)]
struct FakeProvider {
    files: HashMap<String, Vec<u8>>,
    settings: HashMap<String, TrackSettings>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    audio_requests: AtomicUsize,
    saved: Mutex<Vec<(String, TrackSettings)>>,
}

impl FakeProvider {
    fn with_track(mut self, path: &str, seconds: f64) -> Self {
        self.files.insert(path.to_string(), wav_bytes(RATE, 1, seconds));
        self
    }

    fn with_settings(mut self, path: &str, settings: TrackSettings) -> Self {
        self.settings.insert(path.to_string(), settings);
        self
    }

    /// Hold `audio_data` for `path` until the returned gate is notified
    fn gate(&self, path: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().insert(path.to_string(), gate.clone());
        gate
    }

    fn saved(&self) -> Vec<(String, TrackSettings)> {
        self.saved.lock().clone()
    }
}

impl TrackProvider for FakeProvider {
    async fn audio_data(&self, path: &str) -> Option<Vec<u8>> {
        self.audio_requests.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().get(path).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.files.get(path).cloned()
    }

    async fn track_settings(&self, path: &str) -> Option<TrackSettings> {
        self.settings.get(path).cloned()
    }

    fn save_track_settings(&self, path: &str, settings: &TrackSettings) {
        self.saved.lock().push((path.to_string(), settings.clone()));
    }
}

struct Harness {
    session: PlaybackSession<FakeProvider>,
    engine: EngineHandle,
    provider: Arc<FakeProvider>,
    events: UnboundedReceiver<SessionEvent>,
}

impl Harness {
    fn new(provider: FakeProvider, order: &[&str]) -> Self {
        let (engine, outputs) = EngineHandle::new(RATE, 1);
        let provider = Arc::new(provider);
        let (session, events) = PlaybackSession::new(
            engine.clone(),
            outputs,
            provider.clone(),
            &PlayerConfig::default(),
            Handle::current(),
        );

        let tracks = order
            .iter()
            .map(|path| TrackEntry {
                name: path.trim_start_matches('/').trim_end_matches(".wav").to_string(),
                path: path.to_string(),
            })
            .collect();
        session.set_track_listing(vec![FolderListing {
            folder: "/".into(),
            folder_name: "music".into(),
            tracks,
        }]);

        Self {
            session,
            engine,
            provider,
            events,
        }
    }

    fn position(&self) -> f64 {
        self.session.snapshot().position
    }

    fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.01
}

#[tokio::test]
async fn test_load_starts_playing_from_zero() {
    let h = Harness::new(FakeProvider::default().with_track("/a.wav", 2.0), &["/a.wav"]);
    h.session.load_track("/a.wav").await.unwrap();

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.path.as_deref(), Some("/a.wav"));
    assert_eq!(snapshot.load_state, LoadState::Ready);
    assert!(snapshot.playing);
    assert!(close(snapshot.duration, 2.0));
    assert!(close(snapshot.position, 0.0));
    assert!(h.engine.active_source().is_some());

    h.engine.render_for(0.5);
    assert!(close(h.position(), 0.5));
}

#[tokio::test]
async fn test_newer_load_wins_over_slow_older_load() {
    let provider = FakeProvider::default()
        .with_track("/a.wav", 2.0)
        .with_track("/b.wav", 4.0)
        .with_settings("/a.wav", TrackSettings { volume: 20.0, ..Default::default() })
        .with_settings("/b.wav", TrackSettings { volume: 70.0, ..Default::default() });
    let gate_a = provider.gate("/a.wav");
    let h = Harness::new(provider, &["/a.wav", "/b.wav"]);

    let session = h.session.clone();
    let load_a = tokio::spawn(async move { session.load_track("/a.wav").await });
    let provider = h.provider.clone();
    wait_until(|| provider.audio_requests.load(Ordering::SeqCst) == 1).await;

    h.session.load_track("/b.wav").await.unwrap();
    gate_a.notify_one();
    load_a.await.unwrap().unwrap();

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.path.as_deref(), Some("/b.wav"));
    assert!(close(snapshot.duration, 4.0));
    assert_eq!(snapshot.settings.volume, 70.0);
    assert!((h.engine.master_gain() - 0.7).abs() < 1e-6);
}

#[tokio::test]
async fn test_older_load_finishing_first_is_discarded() {
    let provider = FakeProvider::default()
        .with_track("/a.wav", 2.0)
        .with_track("/b.wav", 4.0);
    let gate_a = provider.gate("/a.wav");
    let gate_b = provider.gate("/b.wav");
    let h = Harness::new(provider, &["/a.wav", "/b.wav"]);

    let session = h.session.clone();
    let load_a = tokio::spawn(async move { session.load_track("/a.wav").await });
    let provider = h.provider.clone();
    wait_until(|| provider.audio_requests.load(Ordering::SeqCst) == 1).await;

    let session = h.session.clone();
    let load_b = tokio::spawn(async move { session.load_track("/b.wav").await });
    let provider = h.provider.clone();
    wait_until(|| provider.audio_requests.load(Ordering::SeqCst) == 2).await;

    gate_a.notify_one();
    load_a.await.unwrap().unwrap();
    assert_eq!(h.session.snapshot().load_state, LoadState::Loading);
    assert!(h.engine.active_source().is_none());

    gate_b.notify_one();
    load_b.await.unwrap().unwrap();
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.path.as_deref(), Some("/b.wav"));
    assert!(close(snapshot.duration, 4.0));
}

#[tokio::test]
async fn test_stale_failed_load_does_not_clobber_newer_track() {
    let mut provider = FakeProvider::default().with_track("/b.wav", 3.0);
    provider.files.insert("/a.wav".into(), b"garbage".to_vec());
    let gate_a = provider.gate("/a.wav");
    let mut h = Harness::new(provider, &["/a.wav", "/b.wav"]);

    let session = h.session.clone();
    let load_a = tokio::spawn(async move { session.load_track("/a.wav").await });
    let provider = h.provider.clone();
    wait_until(|| provider.audio_requests.load(Ordering::SeqCst) == 1).await;

    h.session.load_track("/b.wav").await.unwrap();
    gate_a.notify_one();
    assert!(load_a.await.unwrap().is_ok());

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.path.as_deref(), Some("/b.wav"));
    assert_eq!(snapshot.load_state, LoadState::Ready);
    assert!(snapshot.playing);
    assert!(h.engine.active_source().is_some());
    assert!(!h
        .drain()
        .iter()
        .any(|e| matches!(e, SessionEvent::LoadFailed { .. })));
}

#[tokio::test]
async fn test_unreadable_file_fails_without_output() {
    let h = Harness::new(FakeProvider::default().with_track("/a.wav", 2.0), &["/a.wav"]);
    h.session.load_track("/a.wav").await.unwrap();

    let err = h.session.load_track("/missing.wav").await.unwrap_err();
    assert!(matches!(err, PlayerError::Unreadable(_)));
    assert!(matches!(h.session.snapshot().load_state, LoadState::Failed { .. }));
    assert!(!h.session.snapshot().playing);
    assert!(h.engine.active_source().is_none());
}

#[tokio::test]
async fn test_undecodable_file_reports_decode_error() {
    let mut provider = FakeProvider::default();
    provider.files.insert("/bad.wav".into(), b"not audio at all".to_vec());
    let mut h = Harness::new(provider, &["/bad.wav"]);

    let err = h.session.load_track("/bad.wav").await.unwrap_err();
    assert!(matches!(err, PlayerError::Decode { .. }));
    assert!(h
        .drain()
        .iter()
        .any(|e| matches!(e, SessionEvent::LoadFailed { path, .. } if path == "/bad.wav")));
}

#[tokio::test]
async fn test_pause_and_resume_keep_position() {
    let h = Harness::new(FakeProvider::default().with_track("/a.wav", 6.0), &["/a.wav"]);
    h.session.load_track("/a.wav").await.unwrap();
    h.engine.render_for(1.0);

    assert!(!h.session.toggle_play_pause());
    let paused_at = h.position();
    assert!(close(paused_at, 1.0));
    assert!(h.engine.active_source().is_none());

    h.engine.render_for(1.0);
    assert!(close(h.position(), paused_at));

    assert!(h.session.toggle_play_pause());
    h.engine.render_for(0.5);
    assert!(close(h.position(), 1.5));
}

#[tokio::test]
async fn test_toggle_with_return_rewinds_to_run_start() {
    let h = Harness::new(FakeProvider::default().with_track("/a.wav", 6.0), &["/a.wav"]);
    h.session.load_track("/a.wav").await.unwrap();
    h.session.seek(0.25);
    h.engine.render_for(2.0);
    assert!(close(h.position(), 3.5));

    assert!(!h.session.toggle_with_return());
    assert!(close(h.position(), 1.5));

    // Plays again from the marker, not from where it stopped
    assert!(h.session.toggle_with_return());
    h.engine.render_for(1.0);
    assert!(close(h.position(), 2.5));

    assert!(h.session.stop_with_return());
    assert!(close(h.position(), 1.5));
    assert!(!h.session.stop_with_return());
}

#[tokio::test]
async fn test_seek_while_paused_only_moves_stop_position() {
    let h = Harness::new(FakeProvider::default().with_track("/a.wav", 4.0), &["/a.wav"]);
    h.session.load_track("/a.wav").await.unwrap();
    h.session.toggle_play_pause();

    assert_eq!(h.session.seek(0.5), Some(2.0));
    assert!(!h.session.snapshot().playing);
    assert!(h.engine.active_source().is_none());

    h.session.toggle_play_pause();
    h.engine.render_for(0.5);
    assert!(close(h.position(), 2.5));
}

#[tokio::test]
async fn test_resume_just_before_end_keeps_position() {
    let h = Harness::new(FakeProvider::default().with_track("/a.wav", 6.0), &["/a.wav"]);
    h.session.load_track("/a.wav").await.unwrap();
    h.engine.render_for(5.95);

    assert!(!h.session.toggle_play_pause());
    let paused_at = h.position();
    assert!(close(paused_at, 5.95));

    assert!(h.session.toggle_play_pause());
    assert!(close(h.position(), paused_at));
}

#[tokio::test]
async fn test_resume_after_paused_seek_to_end_stays_at_end() {
    let h = Harness::new(FakeProvider::default().with_track("/a.wav", 4.0), &["/a.wav"]);
    h.session.load_track("/a.wav").await.unwrap();
    h.session.toggle_play_pause();

    assert_eq!(h.session.seek(1.0), Some(4.0));
    assert!(h.session.toggle_play_pause());
    assert!(close(h.position(), 4.0));
}

#[tokio::test]
async fn test_speed_change_keeps_position_continuous() {
    let h = Harness::new(FakeProvider::default().with_track("/a.wav", 6.0), &["/a.wav"]);
    h.session.load_track("/a.wav").await.unwrap();
    h.engine.render_for(1.0);

    let before = h.position();
    h.session.set_speed(200.0);
    assert!(close(h.position(), before));

    h.engine.render_for(1.0);
    assert!(close(h.position(), 3.0));
}

#[tokio::test]
async fn test_previous_restarts_after_threshold() {
    let h = Harness::new(
        FakeProvider::default().with_track("/a.wav", 6.0).with_track("/b.wav", 6.0),
        &["/a.wav", "/b.wav"],
    );
    h.session.load_track("/b.wav").await.unwrap();
    h.engine.render_for(4.0);

    assert!(h.session.advance_to_previous().await.unwrap());
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.path.as_deref(), Some("/b.wav"));
    assert!(close(snapshot.position, 0.0));
    assert_eq!(h.provider.audio_requests.load(Ordering::SeqCst), 1);

    h.engine.render_for(1.0);
    assert!(h.session.advance_to_previous().await.unwrap());
    assert_eq!(h.session.snapshot().path.as_deref(), Some("/a.wav"));
    assert!(close(h.position(), 0.0));

    // First track within the threshold: nothing to go back to
    assert!(!h.session.advance_to_previous().await.unwrap());
    assert_eq!(h.session.snapshot().path.as_deref(), Some("/a.wav"));
}

#[tokio::test]
async fn test_next_follows_filtered_order() {
    let h = Harness::new(
        FakeProvider::default()
            .with_track("/a.wav", 1.0)
            .with_track("/b.wav", 1.0)
            .with_track("/ab.wav", 1.0),
        &["/a.wav", "/b.wav", "/ab.wav"],
    );
    h.session.set_track_filter("a");
    h.session.load_track("/a.wav").await.unwrap();

    assert!(h.session.advance_to_next().await.unwrap());
    assert_eq!(h.session.snapshot().path.as_deref(), Some("/ab.wav"));
    assert!(!h.session.advance_to_next().await.unwrap());
}

#[tokio::test]
async fn test_natural_end_advances_exactly_once() {
    let mut h = Harness::new(
        FakeProvider::default().with_track("/a.wav", 0.5).with_track("/b.wav", 6.0),
        &["/a.wav", "/b.wav"],
    );
    h.session.load_track("/a.wav").await.unwrap();
    h.engine.render_for(1.0);

    let session = h.session.clone();
    wait_until(|| {
        let snapshot = session.snapshot();
        snapshot.path.as_deref() == Some("/b.wav") && snapshot.load_state == LoadState::Ready
    })
    .await;

    h.engine.render_for(1.0);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.provider.audio_requests.load(Ordering::SeqCst), 2);
    let ended: Vec<_> = h
        .drain()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::TrackEnded { .. }))
        .collect();
    assert_eq!(
        ended,
        vec![SessionEvent::TrackEnded {
            path: "/a.wav".into()
        }]
    );
}

#[tokio::test]
async fn test_end_of_last_track_stops_at_end() {
    let h = Harness::new(
        FakeProvider::default().with_track("/a.wav", 6.0).with_track("/b.wav", 0.5),
        &["/a.wav", "/b.wav"],
    );
    h.session.load_track("/b.wav").await.unwrap();
    h.engine.render_for(1.0);

    let session = h.session.clone();
    wait_until(|| !session.snapshot().playing).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.path.as_deref(), Some("/b.wav"));
    assert!(close(snapshot.position, snapshot.duration));
    assert_eq!(h.provider.audio_requests.load(Ordering::SeqCst), 1);

    // Play after the end starts over
    assert!(h.session.toggle_play_pause());
    assert!(close(h.position(), 0.0));
}

#[tokio::test]
async fn test_settings_changes_during_guard_are_not_saved() {
    let h = Harness::new(FakeProvider::default().with_track("/a.wav", 2.0), &["/a.wav"]);
    h.session.load_track("/a.wav").await.unwrap();

    h.session.apply_settings(Some(TrackSettings {
        volume: 30.0,
        ..Default::default()
    }));
    h.session.set_volume(40.0);
    assert!(h.provider.saved().is_empty());
    assert!((h.engine.master_gain() - 0.4).abs() < 1e-6);

    tokio::time::sleep(SETTINGS_GUARD + Duration::from_millis(30)).await;
    h.session.set_volume(60.0);
    h.session.set_eq_band(2, 30.0).unwrap();

    let saved = h.provider.saved();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].0, "/a.wav");
    assert_eq!(saved[0].1.volume, 60.0);
    assert_eq!(saved[1].1.eq[2], 12.0);
}

#[tokio::test]
async fn test_reset_saves_defaults_immediately() {
    let provider = FakeProvider::default()
        .with_track("/a.wav", 2.0)
        .with_settings("/a.wav", TrackSettings { volume: 10.0, speed: 150.0, eq: vec![3.0; 7] });
    let h = Harness::new(provider, &["/a.wav"]);
    h.session.load_track("/a.wav").await.unwrap();
    assert_eq!(h.session.snapshot().settings.speed, 150.0);

    assert!(h.session.reset_track_settings());
    let saved = h.provider.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].1, TrackSettings::default());
    assert_eq!(h.engine.eq_gains(), vec![0.0; EQ_BANDS]);
}

#[tokio::test]
async fn test_invalid_band_is_rejected() {
    let h = Harness::new(FakeProvider::default(), &[]);
    assert!(matches!(h.session.set_eq_band(EQ_BANDS, 1.0), Err(PlayerError::InvalidBand(7))));
}

#[tokio::test]
async fn test_transport_without_track_is_noop() {
    let h = Harness::new(FakeProvider::default(), &[]);
    assert!(!h.session.toggle_play_pause());
    assert!(!h.session.toggle_with_return());
    assert!(!h.session.stop_with_return());
    assert_eq!(h.session.seek(0.5), None);
    assert!(!h.session.advance_to_next().await.unwrap());
    assert!(!h.session.advance_to_previous().await.unwrap());
    assert!(!h.session.save_current_settings());
    assert_eq!(h.session.snapshot().load_state, LoadState::Idle);
}

#[tokio::test]
async fn test_test_sound_plays_without_track() {
    let mut h = Harness::new(FakeProvider::default(), &[]);
    h.session.set_volume(0.0);
    h.session.play_test_sound();
    assert!(h.engine.is_previewing());

    let mut out = vec![0.0f32; 800];
    h.engine.render(&mut out);
    assert!(out.iter().any(|s| s.abs() > 0.1));

    h.engine.render_for(1.0);
    assert!(!h.engine.is_previewing());
    assert!(!h.session.snapshot().playing);
    assert!(!h
        .drain()
        .iter()
        .any(|e| matches!(e, SessionEvent::PlaybackChanged { .. } | SessionEvent::TrackEnded { .. })));
}

#[tokio::test]
async fn test_render_loop_emits_progress_and_spectrum() {
    let mut h = Harness::new(FakeProvider::default().with_track("/a.wav", 6.0), &["/a.wav"]);
    h.session.load_track("/a.wav").await.unwrap();
    h.engine.render_for(0.5);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let events = h.drain();
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Progress { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Spectrum { bins } if bins.len() == 256)));

    h.session.set_seek_dragging(true);
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.drain();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!h.drain().iter().any(|e| matches!(e, SessionEvent::Progress { .. })));
}

#[tokio::test]
async fn test_reduced_mode_sends_position_only() {
    let mut h = Harness::new(FakeProvider::default().with_track("/a.wav", 6.0), &["/a.wav"]);
    h.session.set_visuals_enabled(false);
    h.session.load_track("/a.wav").await.unwrap();
    h.drain();

    tokio::time::sleep(Duration::from_millis(450)).await;
    let events = h.drain();
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Progress { .. })));
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::Spectrum { .. })));

    h.session.set_visuals_enabled(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.drain().iter().any(|e| matches!(e, SessionEvent::Spectrum { .. })));
}

#[tokio::test]
async fn test_loops_stop_when_paused() {
    let mut h = Harness::new(FakeProvider::default().with_track("/a.wav", 6.0), &["/a.wav"]);
    h.session.load_track("/a.wav").await.unwrap();
    h.session.toggle_play_pause();
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.drain();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn test_dispose_silences_and_ignores_loads() {
    let h = Harness::new(FakeProvider::default().with_track("/a.wav", 2.0), &["/a.wav"]);
    h.session.load_track("/a.wav").await.unwrap();

    h.session.dispose();
    assert!(h.engine.active_source().is_none());
    h.session.load_track("/a.wav").await.unwrap();
    assert_eq!(h.session.snapshot().path, None);
    h.session.dispose();
}
