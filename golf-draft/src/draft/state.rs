// Draft state: snake turn order, start/resume, and the pick transaction.
//
// `DraftState` is a plain synchronous aggregate. Every mutation runs to
// completion without suspending, so callers that own it from a single task
// (see `app::run`) never observe a half-applied pick.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::pick::{normalize_identity, Golfer, Participant, Pick};

/// Rounds used when `start` receives no usable round count.
pub const DEFAULT_TOTAL_ROUNDS: u32 = 10;

/// Upper bound on the round count a start request may ask for.
pub const DEFAULT_MAX_TOTAL_ROUNDS: u32 = 100;

// ---------------------------------------------------------------------------
// Status and errors
// ---------------------------------------------------------------------------

/// Lifecycle of a draft. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Waiting,
    Active,
    Complete,
}

/// Caller-correctable failures of draft operations. The display strings are
/// shown to end users as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("Draft already in progress")]
    AlreadyActive,

    #[error("All rounds already completed")]
    AlreadyComplete,

    #[error("Draft is not active")]
    NotActive,

    #[error("No current picker")]
    NoCurrentPicker,

    #[error("It's not your turn")]
    NotYourTurn,

    #[error("Player not available")]
    ItemUnavailable { golfer: String },

    #[error("User not found")]
    UnknownParticipant { email: String },
}

/// Inconsistent loader output. Fatal: no session is started from it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootstrapError {
    #[error("roster is empty")]
    EmptyRoster,

    #[error("participant {email} appears more than once")]
    DuplicateParticipant { email: String },

    #[error("participants {first} and {second} share draft order {draft_order}")]
    DuplicateDraftOrder {
        first: String,
        second: String,
        draft_order: u32,
    },

    #[error("golfer {name} appears more than once in the pool")]
    DuplicateGolfer { name: String },

    #[error("logged pick #{pick_number} names unknown participant {email}")]
    UnknownPickParticipant { pick_number: u32, email: String },

    #[error("logged pick #{pick_number} names golfer {golfer} who is not in the available pool")]
    UnavailablePickGolfer { pick_number: u32, golfer: String },
}

/// Result of a committed pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickOutcome {
    pub pick: Pick,
    /// True when this pick finished the final round.
    pub completed: bool,
}

/// Resolve the round count for `start`: positive requests are used as-is,
/// anything else falls back to `default`.
pub fn resolve_total_rounds(requested: Option<i64>, default: u32) -> u32 {
    match requested {
        Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => default,
    }
}

// ---------------------------------------------------------------------------
// Snapshot and board
// ---------------------------------------------------------------------------

/// Full, serializable view of the session, including the derived picker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSnapshot {
    pub status: DraftStatus,
    pub current_round: u32,
    pub current_pick_in_round: usize,
    pub total_rounds: u32,
    pub overall_pick: u32,
    pub participants: Vec<Participant>,
    pub available_golfers: Vec<Golfer>,
    pub picks: Vec<Pick>,
    pub rosters: BTreeMap<String, Vec<Golfer>>,
    pub auto_pick: BTreeMap<String, bool>,
    pub online: Vec<String>,
    pub current_picker: Option<Participant>,
    /// The pool ran dry while the draft can still expect picks.
    pub pool_exhausted: bool,
}

/// One round of the draft board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardRow {
    pub round: u32,
    /// One cell per participant, in draft-order rank.
    pub cells: Vec<BoardCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardCell {
    pub email: String,
    pub name: String,
    pub golfer: Option<String>,
}

// ---------------------------------------------------------------------------
// DraftState
// ---------------------------------------------------------------------------

/// The complete state of one draft session.
#[derive(Debug, Clone)]
pub struct DraftState {
    status: DraftStatus,
    current_round: u32,
    /// Offset into the current round's turn order; always < participant count.
    current_pick_in_round: usize,
    total_rounds: u32,
    /// Equal to `picks.len()` at all times.
    overall_pick: u32,
    /// Sorted by draft-order rank ascending.
    participants: Vec<Participant>,
    /// Golfers not yet picked, sorted by rank ascending.
    available: Vec<Golfer>,
    picks: Vec<Pick>,
    rosters: BTreeMap<String, Vec<Golfer>>,
    auto_pick: BTreeMap<String, bool>,
    online: BTreeSet<String>,
}

impl DraftState {
    /// Build the session from loader output and replay previously committed
    /// picks in recorded order.
    ///
    /// Replay only happens here, so a log can never be applied twice to the
    /// same state.
    pub fn bootstrap(
        participants: Vec<Participant>,
        pool: Vec<Golfer>,
        committed: Vec<Pick>,
    ) -> Result<Self, BootstrapError> {
        if participants.is_empty() {
            return Err(BootstrapError::EmptyRoster);
        }

        let mut participants: Vec<Participant> = participants
            .into_iter()
            .map(|p| Participant {
                email: normalize_identity(&p.email),
                ..p
            })
            .collect();
        participants.sort_by_key(|p| p.draft_order);

        let mut seen = HashSet::new();
        for p in &participants {
            if !seen.insert(p.email.as_str()) {
                return Err(BootstrapError::DuplicateParticipant {
                    email: p.email.clone(),
                });
            }
        }
        for pair in participants.windows(2) {
            if pair[0].draft_order == pair[1].draft_order {
                return Err(BootstrapError::DuplicateDraftOrder {
                    first: pair[0].email.clone(),
                    second: pair[1].email.clone(),
                    draft_order: pair[0].draft_order,
                });
            }
        }

        // Stable sort: equal ranks keep load order.
        let mut available = pool;
        available.sort_by_key(|g| g.rank);
        let mut names = HashSet::new();
        for g in &available {
            if !names.insert(g.name.as_str()) {
                return Err(BootstrapError::DuplicateGolfer {
                    name: g.name.clone(),
                });
            }
        }

        let rosters = participants
            .iter()
            .map(|p| (p.email.clone(), Vec::new()))
            .collect();
        let auto_pick = participants
            .iter()
            .map(|p| (p.email.clone(), false))
            .collect();

        let mut state = DraftState {
            status: DraftStatus::Waiting,
            current_round: 0,
            current_pick_in_round: 0,
            total_rounds: DEFAULT_TOTAL_ROUNDS,
            overall_pick: 0,
            participants,
            available,
            picks: Vec::new(),
            rosters,
            auto_pick,
            online: BTreeSet::new(),
        };

        let replayed = committed.len();
        for pick in committed {
            state.replay_pick(pick)?;
        }

        info!(
            "Draft initialized: {} golfers available, {} participants, {} existing picks",
            state.available.len(),
            state.participants.len(),
            replayed
        );
        Ok(state)
    }

    fn replay_pick(&mut self, pick: Pick) -> Result<(), BootstrapError> {
        let email = normalize_identity(&pick.user_email);
        let Some(roster) = self.rosters.get_mut(&email) else {
            return Err(BootstrapError::UnknownPickParticipant {
                pick_number: pick.pick_number,
                email,
            });
        };
        let Some(idx) = self.available.iter().position(|g| g.name == pick.golfer_name) else {
            return Err(BootstrapError::UnavailablePickGolfer {
                pick_number: pick.pick_number,
                golfer: pick.golfer_name,
            });
        };

        roster.push(self.available.remove(idx));
        self.picks.push(Pick {
            user_email: email,
            ..pick
        });
        self.overall_pick = self.picks.len() as u32;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Turn order
    // ------------------------------------------------------------------

    /// Turn order for `round`: ascending draft order in odd rounds,
    /// descending in even rounds. Recomputed on every call.
    pub fn turn_order(&self, round: u32) -> Vec<&Participant> {
        let mut order: Vec<&Participant> = self.participants.iter().collect();
        if round % 2 == 0 {
            order.reverse();
        }
        order
    }

    /// The participant on the clock, or `None` when the draft is not active.
    pub fn current_picker(&self) -> Option<&Participant> {
        if self.status != DraftStatus::Active {
            return None;
        }
        self.turn_order(self.current_round)
            .get(self.current_pick_in_round)
            .copied()
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Start (or resume) the draft with `total_rounds` rounds.
    ///
    /// Resume position is derived from the number of picks already
    /// replayed. If those picks already cover every round the draft moves
    /// straight to `Complete` and `AlreadyComplete` is returned.
    pub fn start(&mut self, total_rounds: u32) -> Result<(), DraftError> {
        match self.status {
            DraftStatus::Active => return Err(DraftError::AlreadyActive),
            DraftStatus::Complete => return Err(DraftError::AlreadyComplete),
            DraftStatus::Waiting => {}
        }

        let seats = self.participants.len() as u32;
        self.total_rounds = total_rounds;
        self.overall_pick = self.picks.len() as u32;
        self.current_round = self.overall_pick / seats + 1;
        self.current_pick_in_round = (self.overall_pick % seats) as usize;

        if self.current_round > self.total_rounds {
            self.status = DraftStatus::Complete;
            info!(
                "Draft start requested but all {} rounds are already recorded",
                self.total_rounds
            );
            return Err(DraftError::AlreadyComplete);
        }

        self.status = DraftStatus::Active;
        info!(
            "Draft started: {} rounds, {} participants, resuming at pick {}",
            self.total_rounds,
            seats,
            self.overall_pick + 1
        );
        Ok(())
    }

    /// Validate and commit a pick.
    ///
    /// Preconditions are checked in order and nothing is mutated unless all
    /// of them hold. With `admin_override` the caller need not be on the
    /// clock, but the pick is still credited to the current picker.
    pub fn make_pick(
        &mut self,
        identity: &str,
        golfer_name: &str,
        admin_override: bool,
    ) -> Result<PickOutcome, DraftError> {
        if self.status != DraftStatus::Active {
            return Err(DraftError::NotActive);
        }
        let picker = self
            .current_picker()
            .cloned()
            .ok_or(DraftError::NoCurrentPicker)?;
        if !admin_override && normalize_identity(identity) != picker.email {
            return Err(DraftError::NotYourTurn);
        }
        let idx = self
            .available
            .iter()
            .position(|g| g.name == golfer_name)
            .ok_or_else(|| DraftError::ItemUnavailable {
                golfer: golfer_name.to_string(),
            })?;

        let golfer = self.available.remove(idx);
        self.overall_pick += 1;
        let pick = Pick {
            round: self.current_round,
            pick_number: self.overall_pick,
            user_email: picker.email.clone(),
            user_name: picker.name.clone(),
            golfer_name: golfer.name.clone(),
        };
        self.picks.push(pick.clone());
        self.rosters.entry(picker.email).or_default().push(golfer);

        let completed = self.advance_turn();
        if !completed && self.available.is_empty() {
            warn!(
                "Golfer pool exhausted in round {} of {}; no further picks are possible",
                self.current_round, self.total_rounds
            );
        }
        Ok(PickOutcome { pick, completed })
    }

    /// Move to the next seat, rolling into the next round (and completing
    /// the draft) when the round is exhausted. Returns true on completion.
    fn advance_turn(&mut self) -> bool {
        self.current_pick_in_round += 1;
        if self.current_pick_in_round >= self.participants.len() {
            self.current_round += 1;
            self.current_pick_in_round = 0;
            if self.current_round > self.total_rounds {
                self.status = DraftStatus::Complete;
                info!("Draft complete after {} picks", self.overall_pick);
                return true;
            }
        }
        false
    }

    /// Set a participant's auto-pick flag. Setting the current value again
    /// is a no-op.
    pub fn set_auto_pick(&mut self, identity: &str, enabled: bool) -> Result<(), DraftError> {
        let email = normalize_identity(identity);
        match self.auto_pick.get_mut(&email) {
            Some(flag) => {
                *flag = enabled;
                Ok(())
            }
            None => Err(DraftError::UnknownParticipant { email }),
        }
    }

    /// Mark a participant connected. Returns true if they were offline.
    pub fn set_online(&mut self, identity: &str) -> bool {
        self.online.insert(normalize_identity(identity))
    }

    /// Mark a participant disconnected. Returns true if they were online.
    pub fn set_offline(&mut self, identity: &str) -> bool {
        self.online.remove(&normalize_identity(identity))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn status(&self) -> DraftStatus {
        self.status
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn current_pick_in_round(&self) -> usize {
        self.current_pick_in_round
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    pub fn overall_pick(&self) -> u32 {
        self.overall_pick
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, identity: &str) -> Option<&Participant> {
        let email = normalize_identity(identity);
        self.participants.iter().find(|p| p.email == email)
    }

    pub fn available(&self) -> &[Golfer] {
        &self.available
    }

    /// Highest-ranked golfer still in the pool.
    pub fn top_available(&self) -> Option<&Golfer> {
        self.available.first()
    }

    pub fn picks(&self) -> &[Pick] {
        &self.picks
    }

    pub fn roster(&self, identity: &str) -> Option<&[Golfer]> {
        self.rosters
            .get(&normalize_identity(identity))
            .map(Vec::as_slice)
    }

    pub fn auto_pick_enabled(&self, identity: &str) -> bool {
        self.auto_pick
            .get(&normalize_identity(identity))
            .copied()
            .unwrap_or(false)
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.online.contains(&normalize_identity(identity))
    }

    pub fn online(&self) -> Vec<String> {
        self.online.iter().cloned().collect()
    }

    /// True when the pool ran dry while the draft is still active.
    pub fn pool_exhausted(&self) -> bool {
        self.status == DraftStatus::Active && self.available.is_empty()
    }

    pub fn snapshot(&self) -> DraftSnapshot {
        DraftSnapshot {
            status: self.status,
            current_round: self.current_round,
            current_pick_in_round: self.current_pick_in_round,
            total_rounds: self.total_rounds,
            overall_pick: self.overall_pick,
            participants: self.participants.clone(),
            available_golfers: self.available.clone(),
            picks: self.picks.clone(),
            rosters: self.rosters.clone(),
            auto_pick: self.auto_pick.clone(),
            online: self.online(),
            current_picker: self.current_picker().cloned(),
            pool_exhausted: self.pool_exhausted(),
        }
    }

    /// Round-by-participant grid of picks. Covers the configured rounds the
    /// pool can still fill, plus any later round a logged pick refers to.
    pub fn draft_board(&self) -> Vec<BoardRow> {
        let last_logged = self.picks.iter().map(|p| p.round).max().unwrap_or(0);
        let seats = self.participants.len().max(1);
        let fillable = (self.picks.len() + self.available.len()).div_ceil(seats);
        let reachable = u32::try_from(fillable).unwrap_or(u32::MAX);
        let rounds = self.total_rounds.min(reachable).max(last_logged);

        (1..=rounds)
            .map(|round| BoardRow {
                round,
                cells: self
                    .participants
                    .iter()
                    .map(|p| BoardCell {
                        email: p.email.clone(),
                        name: p.name.clone(),
                        golfer: self
                            .picks
                            .iter()
                            .find(|pick| pick.round == round && pick.user_email == p.email)
                            .map(|pick| pick.golfer_name.clone()),
                    })
                    .collect(),
            })
            .collect()
    }
}
