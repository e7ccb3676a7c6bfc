//! Statistics log: operator-facing CSV lines for connection counts,
//! edge requests and session create/delete events.
//!
//! Line layout is `timestamp,subsystem,event,severity,,,payload...` and is
//! consumed by external tooling, so the field order is part of the contract.

use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, SyncSender},
    thread,
};

use crate::clock;

pub const SUBSYSTEM_WEBRTC: &str = "WEBRTC.SS";
pub const EVENT_CONN_COUNT: &str = "CONN_COUNT";
pub const EVENT_REQUEST: &str = "REQUEST";
pub const EVENT_SESSION: &str = "SESSION";

pub const ACTION_CREATE_SESSION: &str = "createClientSession";
pub const ACTION_DELETE_SESSION: &str = "deleteClientSession";

/// Bounded, non-blocking writer for the statistics CSV file.
///
/// Same shape as the process logger: a dedicated worker thread drains a
/// bounded channel, so emitting a stat line never blocks the media path.
pub struct StatLog {
    tx: SyncSender<String>,
    _thread: Option<thread::JoinHandle<()>>,
    file_path: PathBuf,
}

impl StatLog {
    pub fn start_in_dir<D: AsRef<Path>>(dir: D, app_name: &str, cap: usize) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let _ = fs::create_dir_all(&dir);
        let file_path = dir.join(format!("{app_name}-stat.log"));

        let (tx, rx) = mpsc::sync_channel::<String>(cap);
        let path_clone = file_path.clone();

        let _thread = thread::Builder::new()
            .name("stat-log-worker".into())
            .spawn(move || {
                let Ok(file) = OpenOptions::new().create(true).append(true).open(&path_clone)
                else {
                    // Drain silently; stats must never take the server down.
                    while rx.recv().is_ok() {}
                    return;
                };
                let mut out = BufWriter::new(file);
                while let Ok(line) = rx.recv() {
                    let _ = writeln!(&mut out, "{line}");
                    let _ = out.flush();
                }
            })
            .ok();

        Self {
            tx,
            _thread,
            file_path,
        }
    }

    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// 1 Hz connection-count line.
    pub fn conn_count(&self, connected: u64) {
        self.emit(EVENT_CONN_COUNT, &format!("{connected}"));
    }

    /// Emitted when an edge request pulls a stream from an origin.
    pub fn request(&self, app: &str, media_source: &str, remote: &str) {
        self.emit(EVENT_REQUEST, &format!("{app},{media_source},{remote}"));
    }

    /// Session lifecycle line: action is create/deleteClientSession.
    pub fn session(&self, action: &str, stream: &str, session_id: u32) {
        self.emit(EVENT_SESSION, &format!("{action},{stream},{session_id}"));
    }

    fn emit(&self, event: &str, payload: &str) {
        let line = format!(
            "{},{},{},INFO,,,{}",
            clock::now_iso8601_ms(),
            SUBSYSTEM_WEBRTC,
            event,
            payload
        );
        // A full queue drops the line; stats never stall the media path.
        let _ = self.tx.try_send(line);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::time::Duration;

    #[test]
    fn stat_lines_have_the_contract_layout() {
        let dir = std::env::temp_dir().join(format!("stat-test-{}", std::process::id()));
        let stat = StatLog::start_in_dir(&dir, "unit", 16);
        stat.conn_count(3);
        stat.request("live", "rtsp://origin/live/1", "10.0.0.2:4444");
        stat.session(ACTION_CREATE_SESSION, "stream1", 7);

        // give the worker a moment to flush
        thread::sleep(Duration::from_millis(200));
        let content = fs::read_to_string(stat.file_path()).expect("stat file");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        for line in &lines {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields[1], SUBSYSTEM_WEBRTC);
            assert_eq!(fields[3], "INFO");
            assert_eq!(fields[4], "");
            assert_eq!(fields[5], "");
        }
        assert!(lines[0].contains("CONN_COUNT"));
        assert!(lines[1].contains("REQUEST"));
        assert!(lines[2].contains("createClientSession,stream1,7"));

        let _ = fs::remove_dir_all(&dir);
    }
}
