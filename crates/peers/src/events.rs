// Path: crates/peers/src/events.rs

//! Durable peer artifacts: the append-only reputation event log and the
//! peer-cache snapshot used as a bootstrap seed on restart.

use bytecave_types::peer::{PeerRecord, ReputationEvent};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends reputation events as JSON lines to `reputation-events.json`.
pub struct EventLog {
    file: Mutex<BufWriter<std::fs::File>>,
}

impl EventLog {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(EventLog {
            file: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn append(&self, event: &ReputationEvent) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        let mut writer = self.file.lock();
        if writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush())
            .is_err()
        {
            tracing::warn!(target: "peers", event = "event_log_write_failed");
        }
    }
}

/// The previously-connected-peer snapshot at `peer-cache.json`.
pub struct PeerCache {
    path: PathBuf,
}

impl PeerCache {
    pub fn new(path: PathBuf) -> Self {
        PeerCache { path }
    }

    /// Loads the cached peer list; an absent or unreadable cache is empty.
    pub fn load(&self) -> Vec<PeerRecord> {
        let Ok(raw) = std::fs::read(&self.path) else {
            return Vec::new();
        };
        match serde_json::from_slice(&raw) {
            Ok(peers) => peers,
            Err(e) => {
                tracing::warn!(target: "peers", event = "peer_cache_unreadable", error = %e);
                Vec::new()
            }
        }
    }

    /// Persists the current peer list via temp+rename.
    pub fn save(&self, peers: &[PeerRecord]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(peers).unwrap_or_default();
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)
    }
}
