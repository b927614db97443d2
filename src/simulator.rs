use crate::types::*;
use crossbeam_channel::Sender;
use log::{info, warn};
use std::f64::consts::PI;
use std::thread;
use std::time::Duration;

/// Generates gravity-inclusive accelerometer events for scripted activity
/// phases, plus the operator actions a user would perform (granting motion
/// access, pressing play, dragging the speed control). Exercises the whole
/// control loop without a phone in hand.
pub struct Simulator {
    clock: SessionClock,
    tx: Sender<InputEvent>,
    sensor_rate_hz: u32,
    permission: PermissionState,
    /// Events sent so far; drives phase-continuous waveforms.
    event_counter: u64,
}

/// A scripted step in a scenario.
#[derive(Debug, Clone)]
enum Phase {
    /// Device at rest.
    Still { ms: u32 },
    /// Periodic bounce: vertical amplitude (m/s²) at a step frequency.
    Bounce { amplitude: f64, step_hz: f64, ms: u32 },
    /// One hard jolt on top of rest.
    Spike { peak: f64 },
    /// Sensor delivers events with no acceleration payload.
    Dropout { ms: u32 },
    Press,
    Override { speed: f64 },
}

impl Simulator {
    pub fn new(
        clock: SessionClock,
        tx: Sender<InputEvent>,
        sensor_rate_hz: u32,
        permission: PermissionState,
    ) -> Self {
        Self {
            clock,
            tx,
            sensor_rate_hz: sensor_rate_hz.max(1),
            permission,
            event_counter: 0,
        }
    }

    /// Run a named scenario, then keep the device still until the control
    /// loop goes away. Blocks the calling thread.
    pub fn run(&mut self, scenario: &str) {
        let phases = match scenario {
            "tour" => tour(),
            "still" => vec![Phase::Press, Phase::Still { ms: 1000 }, Phase::Press],
            "sprint" => vec![
                Phase::Press,
                Phase::Still { ms: 1000 },
                Phase::Press,
                Phase::Bounce { amplitude: 15.0, step_hz: 3.2, ms: 20_000 },
            ],
            other => {
                warn!("Unknown scenario {:?}, using \"tour\"", other);
                tour()
            }
        };

        info!("Simulator starting scenario {:?} at {} Hz", scenario, self.sensor_rate_hz);
        if self.send(InputEvent::MotionPermission(self.permission)).is_err() {
            return;
        }
        for phase in &phases {
            if !self.execute(phase) {
                return;
            }
        }

        info!("Scenario complete. Holding still...");
        while self.emit(None) {}
    }

    /// Returns false once the control loop has hung up.
    fn execute(&mut self, phase: &Phase) -> bool {
        match phase {
            Phase::Still { ms } => {
                info!("  still {}ms", ms);
                (0..self.events_for(*ms)).all(|_| self.emit(None))
            }

            Phase::Bounce { amplitude, step_hz, ms } => {
                info!("  bounce {:.1} m/s² at {:.1} Hz for {}ms", amplitude, step_hz, ms);
                (0..self.events_for(*ms)).all(|_| self.emit(Some((*amplitude, *step_hz))))
            }

            Phase::Spike { peak } => {
                info!("  spike {:.1} m/s²", peak);
                let event = MotionEvent::new(
                    self.clock.now_ms(),
                    Acceleration::new(0.0, 0.0, GRAVITY + peak),
                );
                self.send(InputEvent::Motion(event)).is_ok()
            }

            Phase::Dropout { ms } => {
                info!("  sensor dropout {}ms", ms);
                let n = self.events_for(*ms);
                for _ in 0..n {
                    if self.send(InputEvent::Motion(MotionEvent::empty(self.clock.now_ms()))).is_err() {
                        return false;
                    }
                    thread::sleep(self.event_period());
                }
                true
            }

            Phase::Press => {
                info!("  press play");
                self.send(InputEvent::PlayButton).is_ok()
            }

            Phase::Override { speed } => {
                info!("  manual speed {:.2}", speed);
                self.send(InputEvent::SpeedOverride(*speed)).is_ok()
            }
        }
    }

    /// Emit one motion event and sleep one sensor period. `bounce` is
    /// `(amplitude, step_hz)`; `None` means at rest.
    fn emit(&mut self, bounce: Option<(f64, f64)>) -> bool {
        let t = self.event_counter as f64 / self.sensor_rate_hz as f64;
        let accel = match bounce {
            Some((amp, hz)) => {
                let phase = 2.0 * PI * hz * t;
                Acceleration::new(
                    0.3 * amp * (phase / 2.0).sin(),
                    0.1 * amp * phase.cos(),
                    GRAVITY + amp * phase.sin(),
                )
            }
            // Tiny hand tremor so a held phone is not perfectly flat.
            None => Acceleration::new(0.02 * (2.0 * PI * 7.0 * t).sin(), 0.0, GRAVITY),
        };
        self.event_counter += 1;
        let ok = self
            .send(InputEvent::Motion(MotionEvent::new(self.clock.now_ms(), accel)))
            .is_ok();
        thread::sleep(self.event_period());
        ok
    }

    fn send(&self, event: InputEvent) -> Result<(), ()> {
        self.tx.send(event).map_err(|_| ())
    }

    fn events_for(&self, ms: u32) -> u64 {
        ms as u64 * self.sensor_rate_hz as u64 / 1000
    }

    fn event_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.sensor_rate_hz as u64)
    }
}

/// Roughly 40 seconds: load, start, then walk → jog → sprint → cool down,
/// with a jolt, a sensor dropout, and a manual speed grab along the way.
fn tour() -> Vec<Phase> {
    vec![
        Phase::Press,
        Phase::Still { ms: 1500 },
        Phase::Press,
        Phase::Still { ms: 2000 },
        Phase::Bounce { amplitude: 3.5, step_hz: 1.8, ms: 6000 },
        Phase::Bounce { amplitude: 8.0, step_hz: 2.6, ms: 6000 },
        Phase::Bounce { amplitude: 15.0, step_hz: 3.2, ms: 6000 },
        Phase::Still { ms: 4000 },
        Phase::Spike { peak: 25.0 },
        Phase::Still { ms: 3000 },
        Phase::Dropout { ms: 1500 },
        Phase::Override { speed: 1.30 },
        Phase::Bounce { amplitude: 3.5, step_hz: 1.8, ms: 5000 },
        Phase::Press,
        Phase::Still { ms: 1000 },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion_sampler::MotionSampler;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_still_scenario_sends_permission_and_presses() {
        let (tx, rx) = unbounded();
        let mut sim = Simulator::new(SessionClock::new(), tx, 1000, PermissionState::Granted);
        let handle = thread::spawn(move || sim.run("still"));

        let mut presses = 0;
        let mut motions = 0;
        let first = rx.recv().unwrap();
        assert!(matches!(first, InputEvent::MotionPermission(PermissionState::Granted)));
        while presses < 2 {
            match rx.recv().unwrap() {
                InputEvent::PlayButton => presses += 1,
                InputEvent::Motion(_) => motions += 1,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(motions >= 900, "motions={}", motions);
        drop(rx);
        handle.join().unwrap();
    }

    #[test]
    fn test_bounce_produces_activity() {
        let (tx, rx) = unbounded();
        let mut sim = Simulator::new(SessionClock::new(), tx, 100, PermissionState::Granted);
        for _ in 0..100 {
            sim.emit(Some((8.0, 2.6)));
        }
        let mut sampler = MotionSampler::new(u64::MAX / 2, 10);
        let mut state = ActivityState::default();
        for ev in rx.try_iter() {
            if let InputEvent::Motion(m) = ev {
                sampler.ingest(&m, &mut state);
            }
        }
        // Magnitude swings roughly ±amp·sin over the window.
        assert!(state.target_activity > 2.0, "activity={}", state.target_activity);
    }
}
