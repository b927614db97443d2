use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ─── Motion input ───────────────────────────────────────────────────────────

/// Gravity-inclusive acceleration reading, all axes in the same units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Acceleration {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm of the three axes.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// One motion sensor event. Sensors occasionally deliver events without an
/// acceleration payload; those carry `None` and are dropped by the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionEvent {
    /// Milliseconds since session start
    pub timestamp_ms: u64,
    pub acceleration: Option<Acceleration>,
}

impl MotionEvent {
    pub fn new(timestamp_ms: u64, acceleration: Acceleration) -> Self {
        Self {
            timestamp_ms,
            acceleration: Some(acceleration),
        }
    }

    pub fn empty(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            acceleration: None,
        }
    }
}

/// A retained magnitude reading inside the sliding window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp_ms: u64,
    pub magnitude: f64,
}

// ─── Shared activity estimate ───────────────────────────────────────────────

/// Raw and smoothed activity. `target_activity` is written only by the
/// motion sampler, `current_activity` only by the smoother.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActivityState {
    pub target_activity: f64,
    pub current_activity: f64,
}

// ─── Playback parameters ────────────────────────────────────────────────────

/// How the translator compensates for the engine's rate/pitch coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchMode {
    /// Engine resamples (pitch follows rate); send a cancelling pitch shift.
    #[default]
    PitchCorrection,
    /// Engine already decouples rate from pitch; send rate only.
    RateOnly,
}

/// Engine-facing parameters derived from a target speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackParams {
    /// Ratio of target speed to base speed, always > 0
    pub rate: f64,
    /// Compensating pitch shift, present only in pitch-correction mode
    pub pitch_semitones: Option<f64>,
}

// ─── Lifecycle ──────────────────────────────────────────────────────────────

/// Playback session lifecycle, owned by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Ready,
    Playing,
    Failed,
    Disposed,
}

impl SessionState {
    /// True once the engine holds a loaded resource.
    pub fn is_loaded(&self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Playing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "idle",
            SessionState::Loading => "loading",
            SessionState::Ready => "ready",
            SessionState::Playing => "playing",
            SessionState::Failed => "failed",
            SessionState::Disposed => "disposed",
        };
        f.pad(s)
    }
}

/// Outcome of the platform motion-permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionState {
    Pending,
    Granted,
    Denied,
}

// ─── Inter-thread messages ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum InputEvent {
    Motion(MotionEvent),
    MotionPermission(PermissionState),
    /// The single play/stop control: loads on first press, then toggles.
    PlayButton,
    /// Manual speed chosen on the speed control.
    SpeedOverride(f64),
    Shutdown,
}

// ─── Per-tick output ────────────────────────────────────────────────────────

/// Snapshot emitted by the control loop once per tick for UI sinks and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickFrame {
    pub timestamp_ms: u64,
    pub tick: u64,
    pub target_activity: f64,
    pub current_activity: f64,
    /// Activity bar width, 0–100
    pub activity_percent: f64,
    /// Speed selected by the speed mapper this tick
    pub target_speed: f64,
    /// Value currently shown on the speed control
    pub displayed_speed: f64,
    /// True when the deadband let this tick rewrite the speed control
    pub display_updated: bool,
    /// Parameters sent to the engine this tick, if any
    pub applied: Option<PlaybackParams>,
    pub session: SessionState,
    pub permission: PermissionState,
}

/// Short-key representation for JSONL session logs.
/// t=timestamp_ms, n=tick, ta=target_activity, ca=current_activity,
/// pc=activity_percent, ts=target_speed, ds=displayed_speed,
/// du=display_updated, r=rate, ps=pitch_semitones, s=session, pm=permission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactTick {
    pub t: u64,
    pub n: u64,
    pub ta: f64,
    pub ca: f64,
    pub pc: f64,
    pub ts: f64,
    pub ds: f64,
    pub du: bool,
    pub r: Option<f64>,
    pub ps: Option<f64>,
    pub s: SessionState,
    pub pm: PermissionState,
}

impl From<&TickFrame> for CompactTick {
    fn from(f: &TickFrame) -> Self {
        Self {
            t: f.timestamp_ms,
            n: f.tick,
            ta: f.target_activity,
            ca: f.current_activity,
            pc: f.activity_percent,
            ts: f.target_speed,
            ds: f.displayed_speed,
            du: f.display_updated,
            r: f.applied.map(|p| p.rate),
            ps: f.applied.and_then(|p| p.pitch_semitones),
            s: f.session,
            pm: f.permission,
        }
    }
}

impl From<CompactTick> for TickFrame {
    fn from(c: CompactTick) -> Self {
        Self {
            timestamp_ms: c.t,
            tick: c.n,
            target_activity: c.ta,
            current_activity: c.ca,
            activity_percent: c.pc,
            target_speed: c.ts,
            displayed_speed: c.ds,
            display_updated: c.du,
            applied: c.r.map(|rate| PlaybackParams {
                rate,
                pitch_semitones: c.ps,
            }),
            session: c.s,
            permission: c.pm,
        }
    }
}

impl fmt::Display for TickFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rate = match self.applied {
            Some(p) => format!("{:.4}", p.rate),
            None => "---".to_string(),
        };
        write!(
            f,
            "t={:>8}ms  act={:.2} ({:>3.0}%)  target={:.2}  shown={:.3}  rate={}  [{}]",
            self.timestamp_ms,
            self.current_activity,
            self.activity_percent,
            self.target_speed,
            self.displayed_speed,
            rate,
            self.session,
        )
    }
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock shared by the input sources and the control loop.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

/// Standard gravity, m/s². A device lying still reads roughly this magnitude.
pub const GRAVITY: f64 = 9.81;
