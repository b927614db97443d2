use crate::engine::AudioEngine;
use crate::error::EngineResult;
use crate::types::{PitchMode, PlaybackParams};
use log::trace;

/// Converts a target speed into engine parameters.
///
/// `rate = target / base`. In pitch-correction mode the engine is assumed to
/// resample (pitch rises 12·log2(rate) semitones), so the translator also
/// asks for `-12·log2(rate)` semitones of pitch shift to cancel it. In
/// rate-only mode the engine handles pitch itself and only the rate is sent.
#[derive(Debug, Clone, Copy)]
pub struct ParameterTranslator {
    base_speed: f64,
    mode: PitchMode,
}

impl ParameterTranslator {
    pub fn new(base_speed: f64, mode: PitchMode) -> Self {
        Self { base_speed, mode }
    }

    pub fn mode(&self) -> PitchMode {
        self.mode
    }

    pub fn base_speed(&self) -> f64 {
        self.base_speed
    }

    pub fn translate(&self, target_speed: f64) -> PlaybackParams {
        let rate = target_speed / self.base_speed;
        let pitch_semitones = match self.mode {
            PitchMode::PitchCorrection => Some(pitch_correction(rate)),
            PitchMode::RateOnly => None,
        };
        PlaybackParams {
            rate,
            pitch_semitones,
        }
    }

    /// Translate and push to `engine` over `ramp_seconds`.
    ///
    /// Returns `Ok(None)` without touching the engine when pitch correction is
    /// required but the engine has no pitch stage; the caller is responsible
    /// for only calling this on a loaded engine.
    pub fn apply(
        &self,
        engine: &mut dyn AudioEngine,
        target_speed: f64,
        ramp_seconds: f64,
    ) -> EngineResult<Option<PlaybackParams>> {
        if self.mode == PitchMode::PitchCorrection && !engine.has_pitch_shift() {
            trace!("Skipping update: engine has no pitch stage");
            return Ok(None);
        }
        let params = self.translate(target_speed);
        engine.set_rate(params.rate, ramp_seconds)?;
        if let Some(semitones) = params.pitch_semitones {
            engine.set_pitch_shift(semitones, ramp_seconds)?;
        }
        Ok(Some(params))
    }
}

/// Semitone shift that cancels the pitch change of resampled playback at `rate`.
pub fn pitch_correction(rate: f64) -> f64 {
    -12.0 * rate.log2()
}
