//! Session state: the seen-id set, accumulated matches, statistics, and
//! pacing. Persisted as a JSON snapshot so a collection survives restarts.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use reelmark_common::{Record, ReelmarkError, SessionStats, Verdict};

/// How to treat a persisted snapshot at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Restore seen ids, matched records, and statistics.
    Full,
    /// Restore only the seen ids; matches and statistics start over.
    SeenOnly,
    /// Start over entirely, ignoring any snapshot.
    Fresh,
}

impl FromStr for ResumeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "seen-only" => Ok(Self::SeenOnly),
            "fresh" => Ok(Self::Fresh),
            other => Err(format!(
                "unknown resume mode '{other}' (expected full, seen-only, or fresh)"
            )),
        }
    }
}

/// Volatile pacing state. Never persisted; every run starts back at the
/// base delay.
#[derive(Debug, Clone, Default)]
pub struct PacingState {
    pub current_delay: Duration,
    pub empty_cycles: u32,
    pub rate_limits: u32,
}

/// Process-wide collection state. `observe` is the single dedup gate: the
/// seen set never holds the same id twice, and a record enters `matched`
/// at most once.
#[derive(Debug, Default)]
pub struct SessionState {
    seen: HashSet<String>,
    matched: Vec<Record>,
    pub stats: SessionStats,
    pub pacing: PacingState,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting of `id`. Returns true only on the first sighting.
    pub fn observe(&mut self, id: &str) -> bool {
        self.seen.insert(id.to_string())
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn matched(&self) -> &[Record] {
        &self.matched
    }

    /// Append a matched record and count its categories.
    pub fn record_match(&mut self, record: Record, verdict: &Verdict) {
        self.stats.matched += 1;
        for reason in &verdict.reasons {
            *self
                .stats
                .by_category
                .entry(reason.to_string())
                .or_default() += 1;
        }
        self.matched.push(record);
    }

    /// Load state from a persisted snapshot according to `mode`. A missing
    /// or unreadable snapshot means no prior session.
    pub fn resume(path: &Path, mode: ResumeMode) -> Self {
        if mode == ResumeMode::Fresh {
            return Self::new();
        }
        let snapshot = match read_snapshot(path) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Self::new(),
            Err(err) => {
                warn!(error = %err, "Ignoring unreadable session snapshot");
                return Self::new();
            }
        };

        let mut state = Self::new();
        for id in snapshot.seen_ids {
            state.seen.insert(id);
        }
        // Matched ids go back into the seen set in every mode, so a resumed
        // run can never append a second copy of an already-matched record.
        for record in &snapshot.matched_records {
            state.seen.insert(record.id.clone());
        }
        if mode == ResumeMode::Full {
            state.stats = snapshot.stats;
            state.matched = snapshot.matched_records;
        }
        info!(
            seen = state.seen.len(),
            matched = state.matched.len(),
            "Resumed session from {}",
            path.display()
        );
        state
    }

    /// Write a snapshot atomically: temp file in the same directory, then
    /// rename over the target.
    pub fn persist(&self, path: &Path) -> Result<(), ReelmarkError> {
        let mut seen_ids: Vec<String> = self.seen.iter().cloned().collect();
        seen_ids.sort();

        let snapshot = SessionSnapshot {
            seen_ids,
            matched_records: self.matched.clone(),
            stats: self.stats.clone(),
            saved_at: Utc::now(),
        };
        let body = serde_json::to_string_pretty(&snapshot)
            .map_err(|err| ReelmarkError::Persistence(err.to_string()))?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, body).map_err(|err| ReelmarkError::Persistence(err.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|err| ReelmarkError::Persistence(err.to_string()))?;
        Ok(())
    }
}

/// Persisted form of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub seen_ids: Vec<String>,
    pub matched_records: Vec<Record>,
    #[serde(default)]
    pub stats: SessionStats,
    pub saved_at: DateTime<Utc>,
}

pub fn read_snapshot(path: &Path) -> Result<Option<SessionSnapshot>, ReelmarkError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(ReelmarkError::Persistence(err.to_string())),
    };
    let snapshot =
        serde_json::from_str(&raw).map_err(|err| ReelmarkError::Persistence(err.to_string()))?;
    Ok(Some(snapshot))
}

/// Remove the snapshot file. Called after a fully completed collection.
pub fn clear(path: &Path) -> Result<(), ReelmarkError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ReelmarkError::Persistence(err.to_string())),
    }
}
