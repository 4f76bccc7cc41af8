// Login sessions: tokens issued to participants and the connections bound
// to them.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::draft::pick::normalize_identity;
use crate::protocol::ClientId;

/// Token sessions plus the connection -> participant binding.
///
/// A token outlives the connection that obtained it, so a client that
/// reconnects can resume with the token instead of its email.
#[derive(Debug, Default)]
pub struct SessionStore {
    /// token -> normalized identity
    tokens: HashMap<String, String>,
    /// connection -> normalized identity, only for logged-in connections
    bound: HashMap<ClientId, String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for `identity`. The caller has already checked
    /// that the identity names a participant.
    pub fn issue(&mut self, identity: &str) -> String {
        let token = Uuid::new_v4().to_string();
        self.tokens.insert(token.clone(), normalize_identity(identity));
        token
    }

    /// The identity a token was issued to.
    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }

    /// Bind a connection to an identity. Returns the identity previously
    /// bound to that connection, if it differs.
    pub fn bind(&mut self, client: ClientId, identity: &str) -> Option<String> {
        let identity = normalize_identity(identity);
        debug!("Client {} bound to {}", client, identity);
        self.bound
            .insert(client, identity.clone())
            .filter(|previous| *previous != identity)
    }

    /// Drop a connection's binding. Returns the identity it was bound to.
    pub fn unbind(&mut self, client: ClientId) -> Option<String> {
        self.bound.remove(&client)
    }

    pub fn identity(&self, client: ClientId) -> Option<&str> {
        self.bound.get(&client).map(String::as_str)
    }

    /// Whether any connection is still bound to `identity`.
    pub fn is_connected(&self, identity: &str) -> bool {
        let identity = normalize_identity(identity);
        self.bound.values().any(|bound| *bound == identity)
    }

    /// Every connection that has logged in.
    pub fn logged_in_clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.bound.keys().copied()
    }
}
