use crate::config::Config;
use crate::engine::AudioEngine;
use crate::motion_sampler::MotionSampler;
use crate::session::PlaybackSession;
use crate::smoother::ActivitySmoother;
use crate::speed_mapper::SpeedMapper;
use crate::translator::ParameterTranslator;
use crate::types::*;
use crossbeam_channel::{select, tick, Receiver, Sender, TrySendError};
use log::{debug, error, info, trace, warn};
use std::time::Duration;

/// The control loop owns all mutable playback state. It receives
/// `InputEvent`s (motion, permission, play button, manual speed), and on every
/// tick runs smoothing → speed mapping → parameter translation, pushes the
/// result to the audio engine while playing, and publishes a `TickFrame` to
/// each sink.
///
/// Everything happens on one thread: input handlers and ticks run to
/// completion one after another, so no state is shared or locked. The only
/// operation spanning ticks is the engine load, which lives in
/// [`PlaybackSession`] and is polled here each tick.
///
/// `handle_event` and `tick` are public so the loop can be driven
/// deterministically without the ticker, as the tests do.
pub struct ControlLoop {
    input_rx: Receiver<InputEvent>,
    frame_txs: Vec<Sender<TickFrame>>,
    clock: SessionClock,
    tick_interval: Duration,

    activity: ActivityState,
    sampler: MotionSampler,
    smoother: ActivitySmoother,
    mapper: SpeedMapper,
    translator: ParameterTranslator,
    session: PlaybackSession,
    permission: PermissionState,
    denial_reported: bool,

    /// Value shown on the speed control; starts at base speed.
    displayed_speed: f64,
    last_applied: Option<PlaybackParams>,
    tick_count: u64,
    dropped_frames: u64,

    resource: String,
    looping: bool,
    ramp_seconds: f64,
    initial_ramp_seconds: f64,
    deadband: f64,
    visual_max_activity: f64,
}

impl ControlLoop {
    pub fn new(
        config: &Config,
        engine: Box<dyn AudioEngine>,
        input_rx: Receiver<InputEvent>,
        frame_txs: Vec<Sender<TickFrame>>,
        clock: SessionClock,
    ) -> Self {
        let permission = if config.require_motion_permission {
            PermissionState::Pending
        } else {
            PermissionState::Granted
        };
        Self {
            input_rx,
            frame_txs,
            clock,
            tick_interval: Duration::from_secs_f64(1.0 / config.tick_hz.max(1) as f64),
            activity: ActivityState::default(),
            sampler: MotionSampler::new(config.window_duration_ms, config.min_sample_count),
            smoother: ActivitySmoother::new(config.smoothing_factor),
            mapper: SpeedMapper::new(config.speed_table()),
            translator: ParameterTranslator::new(config.base_speed, config.pitch_mode),
            session: PlaybackSession::new(engine, Duration::from_millis(config.load_timeout_ms)),
            permission,
            denial_reported: false,
            displayed_speed: config.base_speed,
            last_applied: None,
            tick_count: 0,
            dropped_frames: 0,
            resource: config.base_audio_resource.clone(),
            looping: config.loop_playback,
            ramp_seconds: config.ramp_seconds,
            initial_ramp_seconds: config.initial_ramp_seconds,
            deadband: config.display_deadband,
            visual_max_activity: config.visual_max_activity,
        }
    }

    pub fn activity(&self) -> ActivityState {
        self.activity
    }

    pub fn displayed_speed(&self) -> f64 {
        self.displayed_speed
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    /// Parameters most recently sent to the engine, from a tick or an override.
    pub fn last_applied(&self) -> Option<PlaybackParams> {
        self.last_applied
    }

    /// Run until `Shutdown` arrives or every input sender is dropped.
    /// Blocks the calling thread.
    pub fn run(&mut self) {
        info!(
            "Control loop running at {:.0} Hz ({:?} mode, base speed {:.2})",
            1.0 / self.tick_interval.as_secs_f64(),
            self.translator.mode(),
            self.translator.base_speed()
        );
        let ticker = tick(self.tick_interval);
        let input_rx = self.input_rx.clone();

        loop {
            select! {
                recv(input_rx) -> msg => match msg {
                    Ok(event) => {
                        if !self.handle_event(event) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(ticker) -> _ => {
                    let frame = self.tick(self.clock.now_ms());
                    self.publish(frame);
                }
            }
        }

        self.session.dispose();
        info!(
            "Control loop shutting down after {} ticks ({} frames dropped, {} unusable motion events)",
            self.tick_count,
            self.dropped_frames,
            self.sampler.dropped()
        );
    }

    /// Apply one input event. Returns false when the loop should stop.
    pub fn handle_event(&mut self, event: InputEvent) -> bool {
        match event {
            InputEvent::Motion(motion) => {
                if self.permission == PermissionState::Granted {
                    self.sampler.ingest(&motion, &mut self.activity);
                } else {
                    trace!("Motion event dropped (permission {:?})", self.permission);
                }
            }

            InputEvent::MotionPermission(state) => {
                self.permission = state;
                match state {
                    PermissionState::Granted => info!("Motion permission granted"),
                    PermissionState::Denied if !self.denial_reported => {
                        warn!("Motion permission denied; activity stays at 0");
                        self.denial_reported = true;
                    }
                    _ => {}
                }
            }

            InputEvent::PlayButton => self.press_play(),

            InputEvent::SpeedOverride(speed) => self.override_speed(speed),

            InputEvent::Shutdown => return false,
        }
        true
    }

    fn press_play(&mut self) {
        match self.session.state() {
            SessionState::Uninitialized => {
                self.session.begin_load(&self.resource, self.looping);
            }
            SessionState::Loading => {
                debug!("Play pressed while loading; ignored");
            }
            SessionState::Ready => {
                self.apply_speed(self.displayed_speed, self.initial_ramp_seconds);
                match self.session.start() {
                    Ok(()) => info!("Playback started at speed {:.3}", self.displayed_speed),
                    Err(e) => error!("Failed to start playback: {}", e),
                }
            }
            SessionState::Playing => match self.session.stop() {
                Ok(()) => info!("Playback stopped"),
                Err(e) => error!("Failed to stop playback: {}", e),
            },
            SessionState::Failed => {
                warn!(
                    "Playback unavailable: {}",
                    self.session.last_error().unwrap_or("engine failed")
                );
            }
            SessionState::Disposed => {}
        }
    }

    fn override_speed(&mut self, speed: f64) {
        if !(speed.is_finite() && speed > 0.0) {
            warn!("Rejected speed override {}", speed);
            return;
        }
        self.displayed_speed = speed;
        debug!("Manual speed {:.3}", speed);
        if self.session.state() == SessionState::Playing {
            self.apply_speed(speed, self.ramp_seconds);
        }
    }

    /// Push `speed` to the engine if one is loaded. Engine errors are logged
    /// and swallowed so a bad update never stops the tick driver.
    fn apply_speed(&mut self, speed: f64, ramp_seconds: f64) -> Option<PlaybackParams> {
        let engine = self.session.loaded_engine()?;
        match self.translator.apply(engine, speed, ramp_seconds) {
            Ok(Some(params)) => {
                self.last_applied = Some(params);
                Some(params)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Engine update failed: {}", e);
                None
            }
        }
    }

    /// Advance one tick at session time `now_ms`.
    pub fn tick(&mut self, now_ms: u64) -> TickFrame {
        self.tick_count += 1;
        self.session.poll_load();

        let current = self.smoother.step(&mut self.activity);
        let activity_percent = (current / self.visual_max_activity).min(1.0) * 100.0;

        let target_speed = self.mapper.target_speed(current);
        let display_updated = (self.displayed_speed - target_speed).abs() > self.deadband;
        if display_updated {
            self.displayed_speed = target_speed;
        }

        let applied = if self.session.state() == SessionState::Playing {
            self.apply_speed(target_speed, self.ramp_seconds)
        } else {
            None
        };

        let frame = TickFrame {
            timestamp_ms: now_ms,
            tick: self.tick_count,
            target_activity: self.activity.target_activity,
            current_activity: current,
            activity_percent,
            target_speed,
            displayed_speed: self.displayed_speed,
            display_updated,
            applied,
            session: self.session.state(),
            permission: self.permission,
        };

        if self.tick_count % 600 == 0 {
            debug!(
                "Control loop: {} ticks, {} samples in window, {} dropped, {} load attempts",
                self.tick_count,
                self.sampler.len(),
                self.sampler.dropped(),
                self.session.load_attempts()
            );
            trace!("Latest: {}", frame);
        }
        frame
    }

    /// Hand a frame to every sink without blocking; a full sink loses the frame.
    fn publish(&mut self, frame: TickFrame) {
        for tx in &self.frame_txs {
            match tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => self.dropped_frames += 1,
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_helpers::silent_wav;
    use crate::engine::HeadlessEngine;
    use crossbeam_channel::unbounded;
    use std::thread;

    fn control(config: &Config) -> (ControlLoop, Sender<InputEvent>) {
        let (tx, rx) = unbounded();
        let engine = Box::new(HeadlessEngine::new(config.pitch_mode == PitchMode::PitchCorrection));
        (ControlLoop::new(config, engine, rx, vec![], SessionClock::new()), tx)
    }

    /// Feed a square-wave shake: magnitudes alternate center ± amp, so with an
    /// even count the population stddev is exactly `amp`.
    fn shake(cl: &mut ControlLoop, start_ms: u64, count: u64, amp: f64) {
        let center = GRAVITY.max(amp + 1.0);
        for i in 0..count {
            let z = if i % 2 == 0 { center + amp } else { center - amp };
            cl.handle_event(InputEvent::Motion(MotionEvent::new(
                start_ms + i * 20,
                Acceleration::new(0.0, 0.0, z),
            )));
        }
    }

    fn load_ready(cl: &mut ControlLoop) {
        cl.handle_event(InputEvent::PlayButton);
        for i in 0..400 {
            if cl.tick(i).session == SessionState::Ready {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("engine never became ready: {:?}", cl.session_state());
    }

    fn wav_config(name: &str, mode: PitchMode) -> Config {
        let path = silent_wav(name, 8000, 800);
        Config {
            base_audio_resource: path.to_string_lossy().into_owned(),
            pitch_mode: mode,
            ..Config::default()
        }
    }

    #[test]
    fn test_idle_tick_holds_base_speed() {
        let (mut cl, _tx) = control(&Config::default());
        let f = cl.tick(0);
        assert_eq!(f.current_activity, 0.0);
        assert_eq!(f.activity_percent, 0.0);
        assert!((f.target_speed - 1.10).abs() < 1e-9);
        assert!(!f.display_updated);
        assert_eq!(f.applied, None);
        assert_eq!(f.session, SessionState::Uninitialized);
    }

    #[test]
    fn test_activity_drives_speed_up() {
        let (mut cl, _tx) = control(&Config::default());
        shake(&mut cl, 0, 60, 7.0);
        assert!((cl.activity().target_activity - 7.0).abs() < 1e-9);

        let mut last = cl.tick(0);
        for i in 1..300 {
            last = cl.tick(i * 16);
        }
        assert!((last.current_activity - 7.0).abs() < 1e-3);
        assert!((last.target_speed - 1.25).abs() < 1e-9);
        assert!((last.displayed_speed - 1.25).abs() < 1e-9);
        assert!((last.activity_percent - 7.0 / 12.0 * 100.0).abs() < 0.1);
    }

    #[test]
    fn test_activity_bar_caps_at_100() {
        let (mut cl, _tx) = control(&Config::default());
        shake(&mut cl, 0, 40, 20.0);
        let mut f = cl.tick(0);
        for i in 1..400 {
            f = cl.tick(i);
        }
        assert_eq!(f.activity_percent, 100.0);
        assert!((f.target_speed - 1.35).abs() < 1e-9);
    }

    #[test]
    fn test_deadband_suppresses_small_rewrite() {
        let (mut cl, _tx) = control(&Config::default());
        cl.handle_event(InputEvent::SpeedOverride(1.105));
        let f = cl.tick(0);
        assert!(!f.display_updated);
        assert!((f.displayed_speed - 1.105).abs() < 1e-12);

        cl.handle_event(InputEvent::SpeedOverride(1.30));
        let f = cl.tick(16);
        assert!(f.display_updated);
        assert!((f.displayed_speed - 1.10).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let (mut cl, _tx) = control(&Config::default());
        cl.handle_event(InputEvent::SpeedOverride(0.0));
        cl.handle_event(InputEvent::SpeedOverride(f64::NAN));
        assert!((cl.displayed_speed() - 1.10).abs() < 1e-12);
    }

    #[test]
    fn test_permission_gate() {
        let config = Config { require_motion_permission: true, ..Config::default() };
        let (mut cl, _tx) = control(&config);
        assert_eq!(cl.permission(), PermissionState::Pending);
        shake(&mut cl, 0, 30, 5.0);
        assert_eq!(cl.activity().target_activity, 0.0);

        cl.handle_event(InputEvent::MotionPermission(PermissionState::Denied));
        shake(&mut cl, 600, 30, 5.0);
        assert_eq!(cl.activity().target_activity, 0.0);
        let f = cl.tick(0);
        assert_eq!(f.permission, PermissionState::Denied);
        assert!((f.target_speed - 1.10).abs() < 1e-9);

        cl.handle_event(InputEvent::MotionPermission(PermissionState::Granted));
        shake(&mut cl, 1200, 30, 5.0);
        assert!((cl.activity().target_activity - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_engine_updates_before_playing() {
        let config = wav_config("cl_ready", PitchMode::PitchCorrection);
        let (mut cl, _tx) = control(&config);
        cl.handle_event(InputEvent::SpeedOverride(1.30));
        assert_eq!(cl.last_applied(), None);
        load_ready(&mut cl);
        let _ = std::fs::remove_file(&config.base_audio_resource);
        shake(&mut cl, 0, 40, 9.0);
        for i in 0..50 {
            assert_eq!(cl.tick(i).applied, None);
        }
        assert_eq!(cl.last_applied(), None);
    }

    #[test]
    fn test_start_applies_displayed_speed_then_ticks_ramp() {
        let config = wav_config("cl_start", PitchMode::PitchCorrection);
        let (mut cl, _tx) = control(&config);
        load_ready(&mut cl);
        let _ = std::fs::remove_file(&config.base_audio_resource);

        cl.handle_event(InputEvent::PlayButton);
        assert_eq!(cl.session_state(), SessionState::Playing);
        let p = cl.last_applied().unwrap();
        assert!((p.rate - 1.0).abs() < 1e-12);

        let f = cl.tick(100);
        let applied = f.applied.unwrap();
        assert!((applied.rate - 1.0).abs() < 1e-12);
        assert!(applied.pitch_semitones.unwrap().abs() < 1e-12);

        cl.handle_event(InputEvent::PlayButton);
        assert_eq!(cl.session_state(), SessionState::Ready);
        assert_eq!(cl.tick(116).applied, None);
    }

    #[test]
    fn test_manual_override_while_playing() {
        let config = wav_config("cl_override", PitchMode::PitchCorrection);
        let (mut cl, _tx) = control(&config);
        load_ready(&mut cl);
        let _ = std::fs::remove_file(&config.base_audio_resource);
        cl.handle_event(InputEvent::PlayButton);

        cl.handle_event(InputEvent::SpeedOverride(1.30));
        let p = cl.last_applied().unwrap();
        assert!((p.rate - 1.30 / 1.10).abs() < 1e-12);
        assert!((p.rate - 1.1818).abs() < 1e-4);
        assert!((p.pitch_semitones.unwrap() - -12.0 * p.rate.log2()).abs() < 1e-12);
        assert!((cl.displayed_speed() - 1.30).abs() < 1e-12);
    }

    #[test]
    fn test_rate_only_mode() {
        let config = wav_config("cl_rate_only", PitchMode::RateOnly);
        let (mut cl, _tx) = control(&config);
        load_ready(&mut cl);
        let _ = std::fs::remove_file(&config.base_audio_resource);
        cl.handle_event(InputEvent::PlayButton);
        shake(&mut cl, 0, 40, 11.0);
        let mut f = cl.tick(0);
        for i in 1..400 {
            f = cl.tick(i);
        }
        let applied = f.applied.unwrap();
        assert!((applied.rate - 1.35 / 1.10).abs() < 1e-9);
        assert_eq!(applied.pitch_semitones, None);
    }

    #[test]
    fn test_failed_load_is_terminal() {
        let config = Config {
            base_audio_resource: "/nonexistent/track.wav".into(),
            ..Config::default()
        };
        let (mut cl, _tx) = control(&config);
        cl.handle_event(InputEvent::PlayButton);
        let mut state = cl.session_state();
        for i in 0..200 {
            state = cl.tick(i).session;
            if state == SessionState::Failed {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(state, SessionState::Failed);
        cl.handle_event(InputEvent::PlayButton);
        assert_eq!(cl.session_state(), SessionState::Failed);
        // Ticks keep running after the failure.
        let a = cl.tick(1000).tick;
        let b = cl.tick(1016).tick;
        assert_eq!(b, a + 1);
    }

    #[test]
    fn test_shutdown_stops_handling() {
        let (mut cl, _tx) = control(&Config::default());
        assert!(cl.handle_event(InputEvent::PlayButton));
        assert!(!cl.handle_event(InputEvent::Shutdown));
    }

    #[test]
    fn test_non_finite_motion_does_not_stick_speed() {
        let (mut cl, _tx) = control(&Config::default());
        for i in 0..20 {
            cl.handle_event(InputEvent::Motion(MotionEvent::new(i * 20, Acceleration::new(0.0, 0.0, 9.8))));
        }
        cl.handle_event(InputEvent::Motion(MotionEvent::new(
            400,
            Acceleration::new(f64::NAN, 0.0, 9.8),
        )));
        cl.handle_event(InputEvent::Motion(MotionEvent::new(
            420,
            Acceleration::new(0.0, f64::INFINITY, 9.8),
        )));
        let f = cl.tick(430);
        assert!(f.target_activity.is_finite());
        assert!(f.current_activity.is_finite());

        for i in 0..300 {
            cl.handle_event(InputEvent::Motion(MotionEvent::new(
                3000 + i * 20,
                Acceleration::new(0.0, 0.0, 9.8),
            )));
        }
        let mut last = cl.tick(9000);
        for i in 1..600 {
            last = cl.tick(9000 + i * 16);
        }
        assert!(last.current_activity.is_finite());
        assert!(last.current_activity.abs() < 1e-6);
        assert!((last.target_speed - 1.10).abs() < 1e-9);
        assert!((last.displayed_speed - 1.10).abs() < 1e-9);
    }
}
