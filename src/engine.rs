//! Audio engine boundary. The control loop only ever talks to an engine
//! through [`AudioEngine`]; interpolation of ramps is the engine's business.

use crate::error::{EngineError, EngineResult};
use hound::WavReader;
use log::{debug, info};
use std::path::Path;

/// Operations the control loop needs from an audio backend.
///
/// `Send` because the initial load runs on a worker thread.
pub trait AudioEngine: Send {
    /// Acquire the audio resource. May block for as long as it takes.
    fn load(&mut self, resource: &str, looping: bool) -> EngineResult<()>;
    fn start(&mut self) -> EngineResult<()>;
    fn stop(&mut self) -> EngineResult<()>;
    /// Move playback rate to `value` over `ramp_seconds` (0 = immediately).
    fn set_rate(&mut self, value: f64, ramp_seconds: f64) -> EngineResult<()>;
    /// Whether this engine has a pitch shift stage.
    fn has_pitch_shift(&self) -> bool {
        false
    }
    fn set_pitch_shift(&mut self, _semitones: f64, _ramp_seconds: f64) -> EngineResult<()> {
        Err(EngineError::PitchShiftUnsupported)
    }
    /// Release engine resources. Called once at shutdown.
    fn dispose(&mut self) {}
}

/// Basic facts about a WAV resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: f64,
}

/// Open `resource` as a WAV file and read its header.
pub fn probe_wav(resource: &str) -> EngineResult<WavInfo> {
    let path = Path::new(resource);
    if !path.exists() {
        return Err(EngineError::ResourceNotFound(resource.to_string()));
    }
    let reader = WavReader::open(path).map_err(|e| EngineError::UnreadableResource {
        resource: resource.to_string(),
        reason: e.to_string(),
    })?;
    let spec = reader.spec();
    let duration_secs = reader.duration() as f64 / spec.sample_rate as f64;
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        duration_secs,
    })
}

/// Engine without audio output: validates the resource, then tracks the
/// transport and parameter state it would have applied. Used for headless
/// runs and as the reference engine in tests.
#[derive(Debug, Default)]
pub struct HeadlessEngine {
    pub info: Option<WavInfo>,
    pub looping: bool,
    pub playing: bool,
    pub rate: f64,
    pub pitch_semitones: f64,
    pitch_shift: bool,
    updates: u64,
}

impl HeadlessEngine {
    pub fn new(pitch_shift: bool) -> Self {
        Self {
            rate: 1.0,
            pitch_shift,
            ..Self::default()
        }
    }

    /// Number of rate/pitch updates received.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    fn require_loaded(&self) -> EngineResult<()> {
        if self.info.is_none() {
            return Err(EngineError::NotLoaded);
        }
        Ok(())
    }
}

impl AudioEngine for HeadlessEngine {
    fn load(&mut self, resource: &str, looping: bool) -> EngineResult<()> {
        let info = probe_wav(resource)?;
        info!(
            "Headless engine loaded {}: {} Hz, {} ch, {:.2}s{}",
            resource,
            info.sample_rate,
            info.channels,
            info.duration_secs,
            if looping { " (loop)" } else { "" }
        );
        self.info = Some(info);
        self.looping = looping;
        Ok(())
    }

    fn start(&mut self) -> EngineResult<()> {
        self.require_loaded()?;
        self.playing = true;
        info!("Headless engine: start (rate {:.4})", self.rate);
        Ok(())
    }

    fn stop(&mut self) -> EngineResult<()> {
        self.require_loaded()?;
        self.playing = false;
        info!("Headless engine: stop");
        Ok(())
    }

    fn set_rate(&mut self, value: f64, ramp_seconds: f64) -> EngineResult<()> {
        self.require_loaded()?;
        if (value - self.rate).abs() > 1e-9 {
            debug!("rate {:.4} → {:.4} over {:.3}s", self.rate, value, ramp_seconds);
        }
        self.rate = value;
        self.updates += 1;
        Ok(())
    }

    fn has_pitch_shift(&self) -> bool {
        self.pitch_shift
    }

    fn set_pitch_shift(&mut self, semitones: f64, ramp_seconds: f64) -> EngineResult<()> {
        if !self.pitch_shift {
            return Err(EngineError::PitchShiftUnsupported);
        }
        self.require_loaded()?;
        if (semitones - self.pitch_semitones).abs() > 1e-9 {
            debug!("pitch {:+.3} → {:+.3} st over {:.3}s", self.pitch_semitones, semitones, ramp_seconds);
        }
        self.pitch_semitones = semitones;
        Ok(())
    }

    fn dispose(&mut self) {
        self.playing = false;
        self.info = None;
    }
}


#[cfg(test)]
mod tests {
    use super::test_helpers::silent_wav;
    use super::*;

    #[test]
    fn test_probe_reports_duration() {
        let path = silent_wav("probe", 8000, 4000);
        let info = probe_wav(path.to_str().unwrap()).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, 1);
        assert!((info.duration_secs - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_probe_missing_file() {
        let err = probe_wav("/nonexistent/track.wav").unwrap_err();
        assert!(matches!(err, EngineError::ResourceNotFound(_)));
    }

    #[test]
    fn test_probe_rejects_non_wav() {
        let path = std::env::temp_dir().join(format!("not_audio_{}.wav", std::process::id()));
        std::fs::write(&path, b"definitely not riff data").unwrap();
        let err = probe_wav(path.to_str().unwrap()).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(err, EngineError::UnreadableResource { .. }));
    }

    #[test]
    fn test_headless_requires_load() {
        let mut e = HeadlessEngine::new(true);
        assert!(matches!(e.start(), Err(EngineError::NotLoaded)));
        assert!(matches!(e.set_rate(1.1, 0.05), Err(EngineError::NotLoaded)));
    }

    #[test]
    fn test_headless_tracks_parameters() {
        let path = silent_wav("headless", 8000, 800);
        let mut e = HeadlessEngine::new(true);
        e.load(path.to_str().unwrap(), true).unwrap();
        let _ = std::fs::remove_file(&path);
        e.set_rate(1.25, 0.0).unwrap();
        e.set_pitch_shift(-3.0, 0.0).unwrap();
        e.start().unwrap();
        assert!(e.playing && e.looping);
        assert_eq!(e.rate, 1.25);
        assert_eq!(e.pitch_semitones, -3.0);
        assert_eq!(e.updates(), 1);
        e.stop().unwrap();
        assert!(!e.playing);
    }

    #[test]
    fn test_pitch_shift_unsupported() {
        let mut e = HeadlessEngine::new(false);
        assert!(!e.has_pitch_shift());
        assert!(matches!(e.set_pitch_shift(1.0, 0.0), Err(EngineError::PitchShiftUnsupported)));
    }
}
