use crate::engine::{probe_wav, AudioEngine};
use crate::error::{EngineError, EngineResult};
use log::{debug, error, info};
use rosc::{OscMessage, OscPacket, OscType};
use std::net::UdpSocket;

/// Drives an external synthesis host (SuperCollider, Pd, Max, ...) over OSC.
///
/// The resource is validated locally before the host is told to load it, so
/// a missing or corrupt file fails the session instead of silently playing
/// nothing. Message layout:
///
/// | address        | args                         |
/// |----------------|------------------------------|
/// | `/tempo/load`  | path (s), loop (i 0/1)       |
/// | `/tempo/start` | (none)                       |
/// | `/tempo/stop`  | (none)                       |
/// | `/tempo/rate`  | rate (f), ramp seconds (f)   |
/// | `/tempo/pitch` | semitones (f), ramp secs (f) |
pub struct OscEngine {
    socket: Option<UdpSocket>,
    target: String,
    pitch_shift: bool,
    loaded: bool,
}

impl OscEngine {
    /// `pitch_shift` declares whether the host has a pitch stage listening on `/tempo/pitch`.
    pub fn new(target: String, pitch_shift: bool) -> Self {
        Self {
            socket: None,
            target,
            pitch_shift,
            loaded: false,
        }
    }

    fn send(&self, addr: &str, args: Vec<OscType>) -> EngineResult<()> {
        let socket = self.socket.as_ref().ok_or(EngineError::NotLoaded)?;
        let buf = encode(addr, args)?;
        socket
            .send_to(&buf, &self.target)
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        Ok(())
    }

    fn require_loaded(&self) -> EngineResult<()> {
        if !self.loaded {
            return Err(EngineError::NotLoaded);
        }
        Ok(())
    }
}

/// Encode a single OSC message.
pub fn encode(addr: &str, args: Vec<OscType>) -> EngineResult<Vec<u8>> {
    let msg = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    rosc::encoder::encode(&msg).map_err(|e| EngineError::Transport(e.to_string()))
}

impl AudioEngine for OscEngine {
    fn load(&mut self, resource: &str, looping: bool) -> EngineResult<()> {
        let info = probe_wav(resource)?;
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| {
            error!("Failed to bind UDP socket: {}", e);
            EngineError::Transport(e.to_string())
        })?;
        self.socket = Some(socket);
        self.send(
            "/tempo/load",
            vec![
                OscType::String(resource.to_string()),
                OscType::Int(looping as i32),
            ],
        )?;
        self.loaded = true;
        info!(
            "OSC engine → {}: loaded {} ({:.2}s, {} Hz)",
            self.target, resource, info.duration_secs, info.sample_rate
        );
        Ok(())
    }

    fn start(&mut self) -> EngineResult<()> {
        self.require_loaded()?;
        self.send("/tempo/start", vec![])
    }

    fn stop(&mut self) -> EngineResult<()> {
        self.require_loaded()?;
        self.send("/tempo/stop", vec![])
    }

    fn set_rate(&mut self, value: f64, ramp_seconds: f64) -> EngineResult<()> {
        self.require_loaded()?;
        self.send(
            "/tempo/rate",
            vec![OscType::Float(value as f32), OscType::Float(ramp_seconds as f32)],
        )
    }

    fn has_pitch_shift(&self) -> bool {
        self.pitch_shift
    }

    fn set_pitch_shift(&mut self, semitones: f64, ramp_seconds: f64) -> EngineResult<()> {
        if !self.pitch_shift {
            return Err(EngineError::PitchShiftUnsupported);
        }
        self.require_loaded()?;
        self.send(
            "/tempo/pitch",
            vec![OscType::Float(semitones as f32), OscType::Float(ramp_seconds as f32)],
        )
    }

    fn dispose(&mut self) {
        if self.loaded {
            if let Err(e) = self.send("/tempo/stop", vec![]) {
                debug!("OSC stop on dispose failed: {}", e);
            }
        }
        self.loaded = false;
        self.socket = None;
    }
}
