use crate::engine::AudioEngine;
use crate::error::{EngineError, EngineResult};
use crate::types::SessionState;
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use log::{error, info, warn};
use std::thread;
use std::time::{Duration, Instant};

type LoadOutcome = (Box<dyn AudioEngine>, EngineResult<()>);

/// In-flight engine load: the engine itself travels to the worker thread and
/// comes back with the result.
struct PendingLoad {
    rx: Receiver<LoadOutcome>,
    deadline: Instant,
}

/// Playback session lifecycle and exclusive owner of the audio engine.
///
/// `Uninitialized → Loading → Ready ⇄ Playing`, with `Failed` terminal on a
/// load error or timeout and `Disposed` terminal after shutdown. Only one load
/// can ever be in flight; a second request while loading is ignored.
pub struct PlaybackSession {
    state: SessionState,
    engine: Option<Box<dyn AudioEngine>>,
    pending: Option<PendingLoad>,
    load_timeout: Duration,
    last_error: Option<String>,
    load_attempts: u32,
}

impl PlaybackSession {
    pub fn new(engine: Box<dyn AudioEngine>, load_timeout: Duration) -> Self {
        Self {
            state: SessionState::Uninitialized,
            engine: Some(engine),
            pending: None,
            load_timeout,
            last_error: None,
            load_attempts: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Message of the load failure that put the session in `Failed`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn load_attempts(&self) -> u32 {
        self.load_attempts
    }

    /// Kick off the engine load on a worker thread. No-op unless `Uninitialized`.
    pub fn begin_load(&mut self, resource: &str, looping: bool) {
        if self.state != SessionState::Uninitialized {
            warn!("Load requested while {}; ignoring", self.state);
            return;
        }
        let Some(mut engine) = self.engine.take() else {
            return;
        };

        let (tx, rx) = bounded::<LoadOutcome>(1);
        let resource_owned = resource.to_string();
        let spawned = thread::Builder::new()
            .name("engine-load".into())
            .spawn(move || {
                let result = engine.load(&resource_owned, looping);
                let _ = tx.send((engine, result));
            });
        if let Err(e) = spawned {
            self.fail(format!("could not spawn load worker: {}", e));
            return;
        }

        self.load_attempts += 1;
        self.pending = Some(PendingLoad {
            rx,
            deadline: Instant::now() + self.load_timeout,
        });
        self.state = SessionState::Loading;
        info!("Loading {} ...", resource);
    }

    /// Resolve an in-flight load if its result has arrived or its deadline
    /// passed. Returns the new state when a transition happened.
    pub fn poll_load(&mut self) -> Option<SessionState> {
        let pending = self.pending.as_ref()?;
        match pending.rx.try_recv() {
            Ok((engine, result)) => {
                self.pending = None;
                self.engine = Some(engine);
                match result {
                    Ok(()) => {
                        self.state = SessionState::Ready;
                        info!("Audio engine ready");
                    }
                    Err(e) => self.fail(e.to_string()),
                }
                Some(self.state)
            }
            Err(TryRecvError::Empty) => {
                if Instant::now() >= pending.deadline {
                    // The worker keeps the engine; it is abandoned with it.
                    self.pending = None;
                    let ms = self.load_timeout.as_millis() as u64;
                    self.fail(EngineError::LoadTimeout(ms).to_string());
                    Some(self.state)
                } else {
                    None
                }
            }
            Err(TryRecvError::Disconnected) => {
                self.pending = None;
                self.fail(EngineError::LoadAbandoned.to_string());
                Some(self.state)
            }
        }
    }

    fn fail(&mut self, message: String) {
        error!("Audio engine load failed: {}", message);
        self.last_error = Some(message);
        self.state = SessionState::Failed;
    }

    /// The engine, but only while it holds a loaded resource.
    pub fn loaded_engine(&mut self) -> Option<&mut (dyn AudioEngine + 'static)> {
        if !self.state.is_loaded() {
            return None;
        }
        self.engine.as_deref_mut()
    }

    /// `Ready → Playing`.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.state != SessionState::Ready {
            return Ok(());
        }
        let engine = self.engine.as_deref_mut().ok_or(EngineError::NotLoaded)?;
        engine.start()?;
        self.state = SessionState::Playing;
        Ok(())
    }

    /// `Playing → Ready`.
    pub fn stop(&mut self) -> EngineResult<()> {
        if self.state != SessionState::Playing {
            return Ok(());
        }
        let engine = self.engine.as_deref_mut().ok_or(EngineError::NotLoaded)?;
        engine.stop()?;
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Stop if playing, release the engine, and enter `Disposed`.
    pub fn dispose(&mut self) {
        if self.state == SessionState::Disposed {
            return;
        }
        if let Err(e) = self.stop() {
            warn!("Stop during dispose failed: {}", e);
        }
        if let Some(engine) = self.engine.as_deref_mut() {
            engine.dispose();
        }
        self.engine = None;
        self.pending = None;
        self.state = SessionState::Disposed;
        info!("Playback session disposed");
    }
}
