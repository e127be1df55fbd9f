//! Metadata for a headless batch run, written as JSON next to the script.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::script_diagnostics::Diagnostic;
use crate::script_state::{MessageKey, ScriptState};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub script_path: PathBuf,

    /// SHA-256 hash of the script content.
    pub script_hash: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    pub frames_requested: u64,
    pub frames_invoked: u64,
    pub faults: u64,

    pub final_state: ScriptState,
    pub message_key: MessageKey,

    /// Every diagnostic the run produced, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,

    pub version: String,
}

impl RunReport {
    pub fn new(script_path: &Path, script_hash: String, frames_requested: u64) -> Self {
        let now = Utc::now();
        Self {
            script_path: script_path.to_path_buf(),
            script_hash,
            started_at: now,
            completed_at: now,
            frames_requested,
            frames_invoked: 0,
            faults: 0,
            final_state: ScriptState::NotCompiled,
            message_key: MessageKey::ScriptNotCompiled,
            diagnostics: Vec::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Record the end state of the run.
    pub fn finish(&mut self, state: ScriptState) {
        self.completed_at = Utc::now();
        self.message_key = state.message_key();
        if let Some(diag) = state.diagnostic() {
            if self.diagnostics.last() != Some(diag) {
                self.diagnostics.push(diag.clone());
            }
        }
        self.final_state = state;
    }

    pub fn duration_secs(&self) -> f64 {
        (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize report: {}", e))?;
        std::fs::write(path, json).map_err(|e| format!("Failed to write report: {}", e))
    }
}
