// Roster and golfer-pool loading from CSV files.
//
// participants.csv: email,name,draft_order,is_admin
// golfers.csv:      name,rank   (blank rank = unranked)

use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use super::engine::DraftSource;
use super::pick::{Golfer, Participant, Pick, UNRANKED};
use crate::config::DataPaths;
use crate::db::SqlitePickLog;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error in {path}: {message}")]
    Validation { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawParticipant {
    email: String,
    name: String,
    #[serde(alias = "draftOrder")]
    draft_order: u32,
    #[serde(default, alias = "isAdmin")]
    is_admin: String,
}

#[derive(Debug, Deserialize)]
struct RawGolfer {
    name: String,
    #[serde(default)]
    rank: String,
}

// ---------------------------------------------------------------------------
// Reader-based loaders (private, enable testing without temp files)
// ---------------------------------------------------------------------------

/// Every row must parse; a roster with a broken row is not usable.
fn load_participants_from_reader<R: Read>(rdr: R) -> Result<Vec<Participant>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut participants = Vec::new();
    for result in reader.deserialize::<RawParticipant>() {
        let raw = result?;
        let is_admin = raw.is_admin.eq_ignore_ascii_case("true");
        participants.push(Participant::new(
            &raw.email,
            &raw.name,
            raw.draft_order,
            is_admin,
        ));
    }
    Ok(participants)
}

fn load_golfers_from_reader<R: Read>(rdr: R) -> Result<Vec<Golfer>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut golfers = Vec::new();
    for result in reader.deserialize::<RawGolfer>() {
        match result {
            Ok(raw) => {
                if raw.name.is_empty() {
                    warn!("skipping golfer row with empty name");
                    continue;
                }
                let rank = if raw.rank.is_empty() {
                    UNRANKED
                } else {
                    raw.rank.parse::<u32>().unwrap_or_else(|_| {
                        warn!("golfer '{}' has unparsable rank '{}', treating as unranked", raw.name, raw.rank);
                        UNRANKED
                    })
                };
                golfers.push(Golfer::new(&raw.name, rank));
            }
            Err(e) => {
                warn!("skipping malformed golfer row: {}", e);
            }
        }
    }
    Ok(golfers)
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

fn open(path: &Path) -> Result<std::fs::File, LoadError> {
    std::fs::File::open(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load the participant roster from a CSV file.
pub fn load_participants(path: &Path) -> Result<Vec<Participant>, LoadError> {
    let participants = load_participants_from_reader(open(path)?).map_err(|e| LoadError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    if participants.is_empty() {
        return Err(LoadError::Validation {
            path: path.display().to_string(),
            message: "participant CSV produced zero rows".into(),
        });
    }
    Ok(participants)
}

/// Load the golfer pool from a CSV file.
pub fn load_golfers(path: &Path) -> Result<Vec<Golfer>, LoadError> {
    load_golfers_from_reader(open(path)?).map_err(|e| LoadError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// DraftSource over files + the SQLite pick log
// ---------------------------------------------------------------------------

/// Reads the roster and pool from CSV and the pick history from the
/// durable pick log of the current draft.
pub struct FileDraftSource {
    participants: PathBuf,
    golfers: PathBuf,
    history: Option<SqlitePickLog>,
}

impl FileDraftSource {
    pub fn new(paths: &DataPaths, history: Option<SqlitePickLog>) -> Self {
        FileDraftSource {
            participants: PathBuf::from(&paths.participants),
            golfers: PathBuf::from(&paths.golfers),
            history,
        }
    }
}

#[async_trait]
impl DraftSource for FileDraftSource {
    async fn load_participants(&self) -> anyhow::Result<Vec<Participant>> {
        let participants = load_participants(&self.participants)?;
        info!(
            "Loaded {} participants from {}",
            participants.len(),
            self.participants.display()
        );
        Ok(participants)
    }

    async fn load_pool(&self) -> anyhow::Result<Vec<Golfer>> {
        let golfers = load_golfers(&self.golfers)?;
        info!("Loaded {} golfers from {}", golfers.len(), self.golfers.display());
        Ok(golfers)
    }

    async fn load_committed_picks(&self) -> anyhow::Result<Vec<Pick>> {
        match &self.history {
            Some(log) => {
                let picks = log.committed_picks()?;
                if !picks.is_empty() {
                    info!(
                        "Recovered {} picks for draft {}",
                        picks.len(),
                        log.draft_id()
                    );
                }
                Ok(picks)
            }
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
