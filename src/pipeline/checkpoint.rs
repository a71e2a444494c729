//! Checkpoint Management
//!
//! Durable, atomic persistence of `AgentState` at `state/<SUBJECT>.json`.
//!
//! The file is an envelope `{version, checksum, state}`; `checksum` is the
//! CRC32 of the exact `state` bytes as written. An unreadable file, a checksum
//! mismatch, an unknown version or a foreign subject is reported as
//! corruption, never treated as "no checkpoint".

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::state::AgentState;
use crate::constants;
use crate::storage::write_atomic;
use crate::types::{AgentError, Result, Ticker};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    checksum: u32,
    state: Box<RawValue>,
}

/// CRC32 over the serialized state, byte for byte
fn checksum(state: &RawValue) -> u32 {
    crc32fast::hash(state.get().as_bytes())
}

pub struct Checkpointer {
    dir: PathBuf,
    save_every: Duration,
    last_save: Option<Instant>,
}

impl Checkpointer {
    pub fn new(dir: impl Into<PathBuf>, save_every: Duration) -> Self {
        Self {
            dir: dir.into(),
            save_every,
            last_save: None,
        }
    }

    pub fn path_for(&self, subject: &Ticker) -> PathBuf {
        self.dir.join(format!("{}.json", subject))
    }

    pub fn backup_path_for(&self, subject: &Ticker) -> PathBuf {
        self.dir
            .join(format!("{}.{}", subject, constants::checkpoint::BACKUP_SUFFIX))
    }

    /// Load the saved state. `Ok(None)` only when no checkpoint file exists.
    pub fn load(&self, subject: &Ticker) -> Result<Option<AgentState>> {
        let path = self.path_for(subject);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(corrupt(&path, format!("unreadable: {}", e))),
        };

        let envelope: Envelope = serde_json::from_str(&raw)
            .map_err(|e| corrupt(&path, format!("not a checkpoint envelope: {}", e)))?;

        if envelope.version > constants::checkpoint::VERSION {
            return Err(corrupt(
                &path,
                format!(
                    "version {} is newer than supported version {}",
                    envelope.version,
                    constants::checkpoint::VERSION
                ),
            ));
        }

        let expected = checksum(&envelope.state);
        if expected != envelope.checksum {
            return Err(corrupt(
                &path,
                format!(
                    "checksum mismatch (stored {:08x}, computed {:08x})",
                    envelope.checksum, expected
                ),
            ));
        }

        let state: AgentState = serde_json::from_str(envelope.state.get())
            .map_err(|e| corrupt(&path, format!("invalid state: {}", e)))?;

        if &state.subject_id != subject {
            return Err(corrupt(
                &path,
                format!("belongs to {}, not {}", state.subject_id, subject),
            ));
        }

        debug!(subject = %subject, step = %state.current_step, "checkpoint loaded");
        Ok(Some(state))
    }

    /// Persist `state` now, stamping `last_checkpoint_time`.
    pub fn save(&mut self, state: &mut AgentState) -> Result<()> {
        let path = self.path_for(&state.subject_id);
        let previous = state.last_checkpoint_time;
        state.last_checkpoint_time = Some(Utc::now());

        let result = self.write(state, &path);
        match result {
            Ok(()) => {
                self.last_save = Some(Instant::now());
                debug!(
                    subject = %state.subject_id,
                    step = %state.current_step,
                    "checkpoint saved"
                );
                Ok(())
            }
            Err(reason) => {
                state.last_checkpoint_time = previous;
                Err(AgentError::CheckpointWrite { path, reason })
            }
        }
    }

    fn write(&self, state: &AgentState, path: &Path) -> std::result::Result<(), String> {
        let raw = serde_json::to_string(state).map_err(|e| e.to_string())?;
        let raw = RawValue::from_string(raw).map_err(|e| e.to_string())?;
        let envelope = Envelope {
            version: constants::checkpoint::VERSION,
            checksum: checksum(&raw),
            state: raw,
        };
        let bytes = serde_json::to_vec_pretty(&envelope).map_err(|e| e.to_string())?;
        write_atomic(path, &bytes).map_err(|e| e.to_string())
    }

    /// Periodic save: persists only when `save_every` has elapsed since the
    /// last save. Returns whether a save happened.
    pub fn maybe_save(&mut self, state: &mut AgentState) -> Result<bool> {
        let due = self
            .last_save
            .is_none_or(|last| last.elapsed() >= self.save_every);
        if !due {
            return Ok(false);
        }
        self.save(state)?;
        Ok(true)
    }

    /// Move an existing checkpoint (valid or not) to `<SUBJECT>.json.bak`.
    pub fn backup_existing(&self, subject: &Ticker) -> Result<Option<PathBuf>> {
        let path = self.path_for(subject);
        if !path.exists() {
            return Ok(None);
        }
        let backup = self.backup_path_for(subject);
        fs::rename(&path, &backup).map_err(|e| AgentError::CheckpointWrite {
            path: backup.clone(),
            reason: format!("could not move previous checkpoint aside: {}", e),
        })?;
        info!(subject = %subject, backup = %backup.display(), "previous checkpoint moved aside");
        Ok(Some(backup))
    }

    /// All subjects with a checkpoint file in this directory
    pub fn list_subjects(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut subjects: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(".json").map(String::from)
            })
            .collect();
        subjects.sort();
        Ok(subjects)
    }
}

fn corrupt(path: &Path, reason: String) -> AgentError {
    warn!(path = %path.display(), %reason, "corrupt checkpoint");
    AgentError::CorruptCheckpoint {
        path: path.to_path_buf(),
        reason,
    }
}
