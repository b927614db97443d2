use crate::config::Config;
use crate::jsonl_reader::FORMAT;
use crate::types::*;
use crossbeam_channel::Receiver;
use log::{error, info};
use serde_json::json;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Records a session: `manifest.json` with the effective config, a
/// `ticks.jsonl` stream (header line, then one `CompactTick` per line), and
/// `stats.json` when the stream ends.
pub struct DataLogger {
    rx: Receiver<TickFrame>,
    session_dir: PathBuf,
    config: Config,
}

impl DataLogger {
    /// Create a fresh `session_<unix-seconds>` directory under `output_dir`.
    pub fn new(rx: Receiver<TickFrame>, output_dir: &Path, config: Config) -> io::Result<Self> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let session_dir = output_dir.join(format!("session_{}", timestamp));
        fs::create_dir_all(&session_dir)?;
        Ok(Self {
            rx,
            session_dir,
            config,
        })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Run the logger until the frame channel closes. Blocks the calling thread.
    pub fn run(&self) {
        info!("Data logger → {:?}", self.session_dir);
        if let Err(e) = self.record() {
            error!("Session logging stopped: {}", e);
        }
    }

    fn record(&self) -> io::Result<()> {
        self.write_manifest()?;

        let ticks_path = self.session_dir.join("ticks.jsonl");
        let mut writer = BufWriter::new(File::create(&ticks_path)?);
        writeln!(writer, "{}", self.header())?;

        let mut frame_count: u64 = 0;
        let mut playing_ticks: u64 = 0;
        let mut peak_activity: f64 = 0.0;

        for frame in self.rx.iter() {
            let line = serde_json::to_string(&CompactTick::from(&frame)).map_err(io::Error::other)?;
            writeln!(writer, "{}", line)?;
            frame_count += 1;
            if frame.session == SessionState::Playing {
                playing_ticks += 1;
            }
            peak_activity = peak_activity.max(frame.current_activity);

            if frame_count % 600 == 0 {
                writer.flush()?;
                info!("Logged {} ticks", frame_count);
            }
        }
        writer.flush()?;

        let stats = json!({
            "total_ticks": frame_count,
            "playing_ticks": playing_ticks,
            "peak_activity": peak_activity,
        });
        fs::write(
            self.session_dir.join("stats.json"),
            serde_json::to_string_pretty(&stats).map_err(io::Error::other)?,
        )?;

        info!("Session saved: {} ticks → {:?}", frame_count, self.session_dir);
        Ok(())
    }

    fn header(&self) -> serde_json::Value {
        json!({
            "format": FORMAT,
            "tick_hz": self.config.tick_hz,
            "base_speed": self.config.base_speed,
            "pitch_mode": self.config.pitch_mode,
        })
    }

    fn write_manifest(&self) -> io::Result<()> {
        let manifest = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "system": FORMAT,
            "config": self.config,
            "speed_table": self.config.speed_table(),
        });
        let body = serde_json::to_string_pretty(&manifest).map_err(io::Error::other)?;
        fs::write(self.session_dir.join("manifest.json"), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonl_reader::SessionReader;
    use crossbeam_channel::unbounded;
    use std::io::BufReader;

    fn tick(n: u64, session: SessionState, activity: f64) -> TickFrame {
        TickFrame {
            timestamp_ms: n * 16,
            tick: n,
            target_activity: activity,
            current_activity: activity,
            activity_percent: activity / 12.0 * 100.0,
            target_speed: 1.10,
            displayed_speed: 1.10,
            display_updated: false,
            applied: None,
            session,
            permission: PermissionState::Granted,
        }
    }

    #[test]
    fn test_logged_session_reads_back() {
        let out = std::env::temp_dir().join(format!("motion_tempo_log_{}", std::process::id()));
        let (tx, rx) = unbounded();
        let logger = DataLogger::new(rx, &out, Config::default()).unwrap();
        let dir = logger.session_dir().to_path_buf();

        tx.send(tick(1, SessionState::Ready, 0.5)).unwrap();
        tx.send(tick(2, SessionState::Playing, 3.0)).unwrap();
        tx.send(tick(3, SessionState::Playing, 2.0)).unwrap();
        drop(tx);
        logger.run();

        let file = File::open(dir.join("ticks.jsonl")).unwrap();
        let reader = SessionReader::open(BufReader::new(file)).unwrap();
        assert_eq!(reader.header.tick_hz, 60);
        let frames = reader.read_all();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1].session, SessionState::Playing);

        let stats: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("stats.json")).unwrap()).unwrap();
        assert_eq!(stats["total_ticks"], 3);
        assert_eq!(stats["playing_ticks"], 2);
        assert!(dir.join("manifest.json").exists());
        let _ = fs::remove_dir_all(&out);
    }
}
