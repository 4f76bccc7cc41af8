// Application state and orchestration logic.
//
// The central event loop owns the draft engine and serializes everything
// that touches it: client requests arriving over the WebSocket, fired
// auto-pick timers, and the broadcasts that follow each state change.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::draft::engine::{DraftEngine, DraftEvent};
use crate::draft::scheduler::AutoPickDue;
use crate::draft::state::DraftError;
use crate::protocol::{
    ClientEnvelope, ClientId, ClientRequest, HealthInfo, LoginInfo, Reply, ServerMessage,
};
use crate::session::SessionStore;
use crate::ws_server::WsEvent;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a client request was refused. The message is sent to the client
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("Admin access required")]
    AdminRequired,
    #[error("Email not found")]
    EmailNotFound,
    #[error("Session expired, please log in again")]
    InvalidToken,
    #[error("Malformed request: {0}")]
    Malformed(String),
    #[error(transparent)]
    Draft(#[from] DraftError),
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub engine: DraftEngine,
    pub sessions: SessionStore,
    /// Outbound queues of every connected client, logged in or not.
    clients: HashMap<ClientId, mpsc::Sender<String>>,
}

impl AppState {
    /// The engine's notifier must already be wired to the receiver passed
    /// to [`run`].
    pub fn new(engine: DraftEngine) -> Self {
        AppState {
            engine,
            sessions: SessionStore::new(),
            clients: HashMap::new(),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn handle_ws_event(&mut self, event: WsEvent) {
        match event {
            WsEvent::Connected {
                client_id,
                addr,
                outbound,
            } => {
                info!("Client {} connected from {}", client_id, addr);
                self.clients.insert(client_id, outbound);
            }
            WsEvent::Message { client_id, text } => {
                self.handle_message(client_id, &text);
            }
            WsEvent::Disconnected { client_id } => {
                self.client_disconnected(client_id);
            }
        }
    }

    /// Forget a connection. Its participant goes offline once no other
    /// connection is logged in as them.
    pub fn client_disconnected(&mut self, client_id: ClientId) {
        self.clients.remove(&client_id);
        if let Some(identity) = self.sessions.unbind(client_id) {
            info!("Client {} ({}) disconnected", client_id, identity);
            if !self.sessions.is_connected(&identity) {
                self.engine.set_offline(&identity);
            }
        } else {
            debug!("Anonymous client {} disconnected", client_id);
        }
    }

    /// Parse and execute one raw request, replying to the sender.
    pub fn handle_message(&mut self, client_id: ClientId, text: &str) {
        let reply = match serde_json::from_str::<ClientEnvelope>(text) {
            Ok(envelope) => self.handle_request(client_id, envelope),
            Err(e) => {
                warn!("Failed to parse message from client {}: {}", client_id, e);
                Reply::error(None, RequestError::Malformed(e.to_string()).to_string())
            }
        };
        self.send_to(client_id, &ServerMessage::Reply(reply));
    }

    pub fn handle_request(&mut self, client_id: ClientId, envelope: ClientEnvelope) -> Reply {
        let id = envelope.id;
        match self.dispatch(client_id, envelope.request) {
            Ok(reply) => Reply { id, ..reply },
            Err(e) => {
                debug!("Request from client {} refused: {}", client_id, e);
                Reply::error(id, e.to_string())
            }
        }
    }

    fn dispatch(
        &mut self,
        client_id: ClientId,
        request: ClientRequest,
    ) -> Result<Reply, RequestError> {
        match request {
            ClientRequest::Login { email, token } => self.login(client_id, email, token),
            ClientRequest::StartDraft { total_rounds } => {
                self.require_admin(client_id)?;
                let max = self.engine.settings().max_total_rounds;
                if total_rounds.is_some_and(|n| n > i64::from(max)) {
                    return Err(RequestError::Malformed(format!(
                        "totalRounds must be at most {max}"
                    )));
                }
                self.engine.start(total_rounds)?;
                Ok(Reply::ok(None).with_state(self.engine.snapshot()))
            }
            ClientRequest::MakePick { golfer_name } => {
                let identity = self.require_login(client_id)?;
                self.engine.make_pick(&identity, &golfer_name, false)?;
                Ok(Reply::ok(None))
            }
            ClientRequest::AdminPick {
                user_email,
                golfer_name,
            } => {
                self.require_admin(client_id)?;
                self.engine.make_pick(&user_email, &golfer_name, true)?;
                Ok(Reply::ok(None))
            }
            ClientRequest::ToggleAutoPick { enabled } => {
                let identity = self.require_login(client_id)?;
                self.engine.set_auto_pick(&identity, enabled)?;
                Ok(Reply::ok(None))
            }
            ClientRequest::AdminToggleAutoPick {
                user_email,
                enabled,
            } => {
                let admin = self.require_admin(client_id)?;
                self.engine.set_auto_pick(&user_email, enabled)?;
                info!(
                    "Admin {} {} auto-pick for {}",
                    admin,
                    if enabled { "enabled" } else { "disabled" },
                    user_email
                );
                Ok(Reply::ok(None))
            }
            ClientRequest::GetState => {
                self.require_login(client_id)?;
                Ok(Reply::ok(None).with_state(self.engine.snapshot()))
            }
            ClientRequest::GetBoard => {
                self.require_login(client_id)?;
                Ok(Reply {
                    board: Some(self.engine.draft_board()),
                    ..Reply::ok(None)
                })
            }
            ClientRequest::Health => Ok(Reply {
                health: Some(HealthInfo {
                    status: "ok".into(),
                    draft_status: self.engine.state().status(),
                    connected_clients: self.client_count(),
                }),
                ..Reply::ok(None)
            }),
        }
    }

    /// Resume the session named by `token`, falling back to `email`.
    fn login(
        &mut self,
        client_id: ClientId,
        email: Option<String>,
        token: Option<String>,
    ) -> Result<Reply, RequestError> {
        let resumed = token.as_deref().and_then(|t| {
            self.sessions
                .resolve(t)
                .map(|identity| (identity.to_string(), t.to_string()))
        });

        let (identity, token) = match resumed {
            Some(pair) => pair,
            None => {
                let Some(email) = email else {
                    return Err(if token.is_some() {
                        RequestError::InvalidToken
                    } else {
                        RequestError::EmailNotFound
                    });
                };
                let identity = self
                    .engine
                    .participant(&email)
                    .map(|p| p.email.clone())
                    .ok_or(RequestError::EmailNotFound)?;
                let token = self.sessions.issue(&identity);
                (identity, token)
            }
        };

        let user = self
            .engine
            .participant(&identity)
            .cloned()
            .ok_or(RequestError::EmailNotFound)?;

        if let Some(previous) = self.sessions.bind(client_id, &identity) {
            if !self.sessions.is_connected(&previous) {
                self.engine.set_offline(&previous);
            }
        }
        self.engine.set_online(&identity);
        info!("{} logged in on client {}", user.name, client_id);

        Ok(Reply {
            login: Some(LoginInfo { token, user }),
            ..Reply::ok(None).with_state(self.engine.snapshot())
        })
    }

    fn require_login(&self, client_id: ClientId) -> Result<String, RequestError> {
        self.sessions
            .identity(client_id)
            .map(str::to_string)
            .ok_or(RequestError::NotLoggedIn)
    }

    fn require_admin(&self, client_id: ClientId) -> Result<String, RequestError> {
        let identity = self
            .sessions
            .identity(client_id)
            .ok_or(RequestError::AdminRequired)?;
        match self.engine.participant(identity) {
            Some(p) if p.is_admin => Ok(p.email.clone()),
            _ => Err(RequestError::AdminRequired),
        }
    }

    // ------------------------------------------------------------------
    // Broadcasts
    // ------------------------------------------------------------------

    /// Translate an engine event into a broadcast to every logged-in client.
    pub fn handle_draft_event(&self, event: DraftEvent) {
        let message = match event {
            DraftEvent::Started { snapshot } => ServerMessage::DraftStarted { state: snapshot },
            DraftEvent::PickCommitted {
                outcome,
                automated,
                admin_override,
            } => ServerMessage::PickMade {
                pick: outcome.pick,
                automated,
                admin_override,
                state: Box::new(self.engine.snapshot()),
            },
            DraftEvent::Completed { snapshot } => ServerMessage::DraftComplete { state: snapshot },
            DraftEvent::AutoPickChanged { email, enabled } => ServerMessage::AutoPickUpdated {
                user_email: email,
                enabled,
            },
            DraftEvent::PresenceChanged { email, online } => {
                let roster = self.engine.state().online();
                if online {
                    ServerMessage::UserOnline {
                        user_email: email,
                        online: roster,
                    }
                } else {
                    ServerMessage::UserOffline {
                        user_email: email,
                        online: roster,
                    }
                }
            }
        };
        self.broadcast(&message);
    }

    fn broadcast(&self, message: &ServerMessage) {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize broadcast: {}", e);
                return;
            }
        };
        for client_id in self.sessions.logged_in_clients() {
            self.push(client_id, json.clone());
        }
    }

    fn send_to(&self, client_id: ClientId, message: &ServerMessage) {
        match message.to_json() {
            Ok(json) => self.push(client_id, json),
            Err(e) => warn!("Failed to serialize reply for client {}: {}", client_id, e),
        }
    }

    /// Queue text for one client without waiting. A full queue drops the
    /// message; every broadcast carries enough state to resync.
    fn push(&self, client_id: ClientId, json: String) {
        let Some(outbound) = self.clients.get(&client_id) else {
            debug!("Dropping message for unknown client {}", client_id);
            return;
        };
        if let Err(e) = outbound.try_send(json) {
            warn!("Dropping message for client {}: {}", client_id, e);
        }
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the main application event loop.
///
/// Listens on three channels using `tokio::select!`:
/// 1. WebSocket events from clients
/// 2. Fired auto-pick timers
/// 3. Draft events from the engine
///
/// Engine events raised while handling one input are broadcast before the
/// next input is taken. Returns when the WebSocket channel closes.
pub async fn run(
    mut ws_rx: mpsc::Receiver<WsEvent>,
    mut auto_rx: mpsc::Receiver<AutoPickDue>,
    mut draft_rx: mpsc::UnboundedReceiver<DraftEvent>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    loop {
        tokio::select! {
            // --- WebSocket events ---
            ws_event = ws_rx.recv() => {
                match ws_event {
                    Some(event) => state.handle_ws_event(event),
                    None => {
                        info!("WebSocket channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- Auto-pick timers ---
            due = auto_rx.recv() => {
                match due {
                    Some(due) => {
                        state.engine.handle_auto_pick_due(due);
                    }
                    None => {
                        info!("Auto-pick channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- Draft events ---
            event = draft_rx.recv() => {
                match event {
                    Some(event) => state.handle_draft_event(event),
                    None => {
                        info!("Draft event channel closed, shutting down");
                        break;
                    }
                }
            }
        }

        while let Ok(event) = draft_rx.try_recv() {
            state.handle_draft_event(event);
        }
    }

    info!("Application event loop exiting");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
