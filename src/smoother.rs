use crate::types::ActivityState;

/// First-order exponential smoothing of the activity estimate, advanced once
/// per control tick: `current += (target - current) * factor`.
///
/// Runs at the tick rate rather than the sensor rate, so downstream speed
/// changes are independent of how irregularly sensor events arrive.
#[derive(Debug, Clone, Copy)]
pub struct ActivitySmoother {
    factor: f64,
}

impl ActivitySmoother {
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Advance one tick and return the new smoothed activity.
    pub fn step(&self, state: &mut ActivityState) -> f64 {
        state.current_activity += (state.target_activity - state.current_activity) * self.factor;
        state.current_activity
    }
}
