// Draft engine: sole owner of the draft state and the auto-pick timer.
//
// All mutations go through `&mut self` methods that never await, so the
// task holding the engine serializes every query and transaction. Durable
// writes and notifications are side effects issued after the in-memory
// commit and are never awaited by the caller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::pick::{normalize_identity, Golfer, Participant, Pick};
use super::scheduler::{AutoPickDue, AutoPickScheduler, DEFAULT_AUTO_PICK_DELAY};
use super::state::{
    resolve_total_rounds, BoardRow, DraftError, DraftSnapshot, DraftState, PickOutcome,
    DEFAULT_MAX_TOTAL_ROUNDS, DEFAULT_TOTAL_ROUNDS,
};

// ---------------------------------------------------------------------------
// Collaborator interfaces
// ---------------------------------------------------------------------------

/// Supplies the roster, the golfer pool, and previously committed picks at
/// startup.
#[async_trait]
pub trait DraftSource: Send + Sync {
    async fn load_participants(&self) -> anyhow::Result<Vec<Participant>>;
    async fn load_pool(&self) -> anyhow::Result<Vec<Golfer>>;
    /// Committed picks in recorded order; empty on a fresh draft.
    async fn load_committed_picks(&self) -> anyhow::Result<Vec<Pick>>;
}

/// Append-only durable record of committed picks.
#[async_trait]
pub trait PickLog: Send + Sync {
    async fn append_pick(&self, pick: &Pick) -> anyhow::Result<()>;
}

/// State changes reported to the transport layer for broadcasting.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftEvent {
    Started {
        snapshot: Box<DraftSnapshot>,
    },
    PickCommitted {
        outcome: PickOutcome,
        /// Committed by the auto-pick timer rather than a caller.
        automated: bool,
        admin_override: bool,
    },
    Completed {
        snapshot: Box<DraftSnapshot>,
    },
    AutoPickChanged {
        email: String,
        enabled: bool,
    },
    PresenceChanged {
        email: String,
        online: bool,
    },
}

/// Receives [`DraftEvent`]s. Must not block.
pub trait DraftNotifier: Send + Sync {
    fn notify(&self, event: DraftEvent);
}

impl DraftNotifier for mpsc::UnboundedSender<DraftEvent> {
    fn notify(&self, event: DraftEvent) {
        if self.send(event).is_err() {
            debug!("Draft event dropped: subscriber is gone");
        }
    }
}

/// Per-session engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub auto_pick_delay: Duration,
    pub default_total_rounds: u32,
    /// Largest round count a start request may ask for.
    pub max_total_rounds: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            auto_pick_delay: DEFAULT_AUTO_PICK_DELAY,
            default_total_rounds: DEFAULT_TOTAL_ROUNDS,
            max_total_rounds: DEFAULT_MAX_TOTAL_ROUNDS,
        }
    }
}

// ---------------------------------------------------------------------------
// DraftEngine
// ---------------------------------------------------------------------------

pub struct DraftEngine {
    state: DraftState,
    scheduler: AutoPickScheduler,
    log: Arc<dyn PickLog>,
    notifier: Option<Arc<dyn DraftNotifier>>,
    settings: EngineSettings,
}

impl DraftEngine {
    /// Wrap an already bootstrapped state. Fired auto-pick timers are
    /// reported on `due_tx`; the owner must feed them back through
    /// [`DraftEngine::handle_auto_pick_due`].
    pub fn new(
        state: DraftState,
        log: Arc<dyn PickLog>,
        settings: EngineSettings,
        due_tx: mpsc::Sender<AutoPickDue>,
    ) -> Self {
        DraftEngine {
            state,
            scheduler: AutoPickScheduler::new(settings.auto_pick_delay, due_tx),
            log,
            notifier: None,
            settings,
        }
    }

    /// Load roster, pool, and pick history from `source` and replay the
    /// history. Any loader or consistency failure aborts startup.
    pub async fn initialize(
        source: &dyn DraftSource,
        log: Arc<dyn PickLog>,
        settings: EngineSettings,
        due_tx: mpsc::Sender<AutoPickDue>,
    ) -> anyhow::Result<Self> {
        let (participants, pool, committed) = tokio::try_join!(
            source.load_participants(),
            source.load_pool(),
            source.load_committed_picks(),
        )
        .context("failed to load draft data")?;

        let state = DraftState::bootstrap(participants, pool, committed)
            .context("draft data is inconsistent")?;
        Ok(Self::new(state, log, settings, due_tx))
    }

    /// Register the sink that receives every subsequent [`DraftEvent`].
    pub fn set_notifier(&mut self, notifier: Arc<dyn DraftNotifier>) {
        self.notifier = Some(notifier);
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub fn state(&self) -> &DraftState {
        &self.state
    }

    pub fn snapshot(&self) -> DraftSnapshot {
        self.state.snapshot()
    }

    pub fn draft_board(&self) -> Vec<BoardRow> {
        self.state.draft_board()
    }

    pub fn current_picker(&self) -> Option<&Participant> {
        self.state.current_picker()
    }

    pub fn participant(&self, identity: &str) -> Option<&Participant> {
        self.state.participant(identity)
    }

    /// Whether an auto-pick timer is currently armed.
    pub fn auto_pick_pending(&self) -> bool {
        self.scheduler.is_armed()
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Start or resume the draft. `requested` rounds are used when
    /// positive, otherwise the configured default.
    pub fn start(&mut self, requested: Option<i64>) -> Result<(), DraftError> {
        let total_rounds = resolve_total_rounds(requested, self.settings.default_total_rounds);
        match self.state.start(total_rounds) {
            Ok(()) => {
                self.notify(DraftEvent::Started {
                    snapshot: Box::new(self.state.snapshot()),
                });
                self.schedule_if_needed();
                Ok(())
            }
            Err(DraftError::AlreadyComplete) => {
                self.scheduler.cancel();
                self.notify(DraftEvent::Completed {
                    snapshot: Box::new(self.state.snapshot()),
                });
                Err(DraftError::AlreadyComplete)
            }
            Err(e) => Err(e),
        }
    }

    /// Commit a pick requested by `identity`. See [`DraftState::make_pick`]
    /// for the precondition order. Must be called from within a tokio
    /// runtime: the durable write and the next auto-pick timer are spawned.
    pub fn make_pick(
        &mut self,
        identity: &str,
        golfer_name: &str,
        admin_override: bool,
    ) -> Result<PickOutcome, DraftError> {
        self.commit(identity, golfer_name, admin_override, false)
    }

    /// Handle a fired auto-pick timer. Returns the committed pick, or
    /// `None` when the notification was stale or nothing could be picked.
    pub fn handle_auto_pick_due(&mut self, due: AutoPickDue) -> Option<PickOutcome> {
        if !self.scheduler.accept(due) {
            return None;
        }

        // Re-derive the picker; the turn may differ from when the timer
        // was armed.
        let Some(picker) = self.state.current_picker().cloned() else {
            debug!("Auto-pick fired with no current picker");
            return None;
        };
        if !self.state.auto_pick_enabled(&picker.email) {
            info!(
                "Auto-pick for {} skipped: disabled during grace period",
                picker.name
            );
            return None;
        }
        let Some(golfer) = self.state.top_available().map(|g| g.name.clone()) else {
            info!("Auto-pick for {} skipped: no golfers left", picker.name);
            return None;
        };

        info!("Auto-drafting {} for {}", golfer, picker.name);
        match self.commit(&picker.email, &golfer, false, true) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Auto-pick for {} failed: {}", picker.name, e);
                None
            }
        }
    }

    /// Toggle a participant's auto-pick flag. Enabling it for the
    /// participant on the clock arms the timer right away.
    pub fn set_auto_pick(&mut self, identity: &str, enabled: bool) -> Result<(), DraftError> {
        self.state.set_auto_pick(identity, enabled)?;
        let email = normalize_identity(identity);

        let on_clock = self
            .state
            .current_picker()
            .is_some_and(|p| p.email == email);
        if enabled && on_clock {
            self.schedule_if_needed();
        }

        self.notify(DraftEvent::AutoPickChanged { email, enabled });
        Ok(())
    }

    /// Returns true if the participant was not already online.
    pub fn set_online(&mut self, identity: &str) -> bool {
        let changed = self.state.set_online(identity);
        if changed {
            self.notify(DraftEvent::PresenceChanged {
                email: normalize_identity(identity),
                online: true,
            });
        }
        changed
    }

    /// Returns true if the participant was online.
    pub fn set_offline(&mut self, identity: &str) -> bool {
        let changed = self.state.set_offline(identity);
        if changed {
            self.notify(DraftEvent::PresenceChanged {
                email: normalize_identity(identity),
                online: false,
            });
        }
        changed
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn commit(
        &mut self,
        identity: &str,
        golfer_name: &str,
        admin_override: bool,
        automated: bool,
    ) -> Result<PickOutcome, DraftError> {
        let outcome = self.state.make_pick(identity, golfer_name, admin_override)?;
        self.scheduler.cancel();

        info!(
            "Pick {}{}{}",
            outcome.pick,
            if automated { " (auto)" } else { "" },
            if admin_override { " (admin)" } else { "" }
        );
        self.persist(&outcome.pick);

        self.notify(DraftEvent::PickCommitted {
            outcome: outcome.clone(),
            automated,
            admin_override,
        });
        if outcome.completed {
            self.notify(DraftEvent::Completed {
                snapshot: Box::new(self.state.snapshot()),
            });
        } else {
            self.schedule_if_needed();
        }
        Ok(outcome)
    }

    /// Hand the pick to the durable log on a detached task. The in-memory
    /// commit stands regardless of the outcome. Needs a tokio runtime.
    fn persist(&self, pick: &Pick) {
        let log = Arc::clone(&self.log);
        let pick = pick.clone();
        tokio::spawn(async move {
            if let Err(e) = log.append_pick(&pick).await {
                warn!(
                    "Failed to write pick #{} to durable log: {:#}",
                    pick.pick_number, e
                );
            }
        });
    }

    /// Re-evaluate the timer for whoever is on the clock now.
    fn schedule_if_needed(&mut self) {
        self.scheduler.cancel();
        let Some(picker) = self.state.current_picker() else {
            return;
        };
        if self.state.auto_pick_enabled(&picker.email) {
            info!(
                "Auto-pick scheduled for {} in {:?}",
                picker.name,
                self.scheduler.delay()
            );
            self.scheduler.arm();
        }
    }

    fn notify(&self, event: DraftEvent) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(event);
        }
    }
}
