use crate::types::*;
use crossbeam_channel::Receiver;
use std::io::{self, Write};

/// Renders a live ASCII dashboard of the control loop state.
pub struct ConsoleDisplay {
    rx: Receiver<TickFrame>,
    update_hz: u32,
    tick_hz: u32,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<TickFrame>, update_hz: u32, tick_hz: u32) -> Self {
        Self { rx, update_hz, tick_hz }
    }

    pub fn run(&self) {
        let skip = if self.update_hz == 0 {
            10
        } else {
            (self.tick_hz / self.update_hz).max(1) as u64
        };
        let mut count: u64 = 0;
        let mut stdout = io::stdout();

        for frame in self.rx.iter() {
            count += 1;
            if count % skip != 0 {
                continue;
            }

            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H");
            print!("{}", render(&frame));
            let _ = stdout.flush();
        }
    }
}

/// One dashboard screen for `frame`.
pub fn render(frame: &TickFrame) -> String {
    let mut out = String::new();
    out.push_str("╔══════════════════════════════════════════════════════════╗\n");
    out.push_str("║  MOTION TEMPO — Live Monitor                             ║\n");
    out.push_str("╠══════════════════════════════════════════════════════════╣\n");
    out.push_str(&format!("║  Time: {:.2}s\n", frame.timestamp_ms as f64 / 1000.0));
    out.push_str("║\n");
    out.push_str(&format!(
        "║  Activity: {:>6.2}  (raw {:.2})\n",
        frame.current_activity, frame.target_activity
    ));
    out.push_str(&format!(
        "║  {} {:.0}%\n",
        make_bar(frame.activity_percent / 100.0, 40),
        frame.activity_percent
    ));
    out.push_str("║\n");
    out.push_str(&format!(
        "║  Speed: {:.3}   (target {:.2}{})\n",
        frame.displayed_speed,
        frame.target_speed,
        if frame.display_updated { ", updated" } else { "" }
    ));
    match frame.applied {
        Some(p) => {
            let pitch = match p.pitch_semitones {
                Some(st) => format!("{:+.3} st", st),
                None => "n/a".to_string(),
            };
            out.push_str(&format!("║  Rate: {:.4}   Pitch: {}\n", p.rate, pitch));
        }
        None => out.push_str("║  Rate: ---\n"),
    }
    out.push_str("║\n");
    let permission = match frame.permission {
        PermissionState::Pending => "waiting",
        PermissionState::Granted => "granted",
        PermissionState::Denied => "DENIED",
    };
    out.push_str(&format!("║  Session: {:<12} Motion: {}\n", frame.session, permission));
    out.push_str("╚══════════════════════════════════════════════════════════╝\n");
    out
}

fn make_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0)) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}
