//! Activity → target speed step function.

use serde::{Deserialize, Serialize};

/// Exclusive upper activity bounds of the default table.
pub const DEFAULT_BOUNDS: [f64; 5] = [2.0, 4.0, 6.0, 8.0, 10.0];
/// Speed added to the base speed per band step.
pub const DEFAULT_STEP: f64 = 0.05;

/// One band: activity below `upper_bound` (and above the previous band) maps to `speed`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedBand {
    pub upper_bound: f64,
    pub speed: f64,
}

/// Ordered step table. Activity at or above the last bound falls into the
/// catch-all band and maps to `ceiling_speed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedBandTable {
    pub bands: Vec<SpeedBand>,
    pub ceiling_speed: f64,
}

impl SpeedBandTable {
    /// The standard table anchored at `base_speed`:
    /// `<2→B, <4→B+0.05, <6→B+0.10, <8→B+0.15, <10→B+0.20, else→B+0.25`.
    pub fn anchored(base_speed: f64) -> Self {
        let bands = DEFAULT_BOUNDS
            .iter()
            .enumerate()
            .map(|(i, &upper_bound)| SpeedBand {
                upper_bound,
                speed: base_speed + DEFAULT_STEP * i as f64,
            })
            .collect();
        Self {
            bands,
            ceiling_speed: base_speed + DEFAULT_STEP * DEFAULT_BOUNDS.len() as f64,
        }
    }

    /// Checks that bounds and speeds both strictly increase, including the
    /// step into the catch-all band.
    pub fn validate(&self) -> Result<(), String> {
        let mut prev: Option<SpeedBand> = None;
        for band in &self.bands {
            if !band.upper_bound.is_finite() || !band.speed.is_finite() || band.speed <= 0.0 {
                return Err(format!("band {:?} is not finite and positive", band));
            }
            if let Some(p) = prev {
                if band.upper_bound <= p.upper_bound {
                    return Err(format!(
                        "bounds must strictly increase ({} after {})",
                        band.upper_bound, p.upper_bound
                    ));
                }
                if band.speed <= p.speed {
                    return Err(format!(
                        "speeds must strictly increase ({} after {})",
                        band.speed, p.speed
                    ));
                }
            }
            prev = Some(*band);
        }
        if let Some(last) = prev {
            if self.ceiling_speed <= last.speed {
                return Err(format!(
                    "ceiling speed {} must exceed last band speed {}",
                    self.ceiling_speed, last.speed
                ));
            }
        }
        Ok(())
    }
}

/// Pure mapping from smoothed activity to a discrete playback speed.
#[derive(Debug, Clone)]
pub struct SpeedMapper {
    table: SpeedBandTable,
}

impl SpeedMapper {
    pub fn new(table: SpeedBandTable) -> Self {
        Self { table }
    }

    pub fn anchored(base_speed: f64) -> Self {
        Self::new(SpeedBandTable::anchored(base_speed))
    }

    pub fn table(&self) -> &SpeedBandTable {
        &self.table
    }

    /// First band whose exclusive upper bound exceeds `activity`, else the ceiling.
    pub fn target_speed(&self, activity: f64) -> f64 {
        self.table
            .bands
            .iter()
            .find(|band| activity < band.upper_bound)
            .map(|band| band.speed)
            .unwrap_or(self.table.ceiling_speed)
    }
}
