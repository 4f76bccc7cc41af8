// JSON wire messages exchanged with draft clients over the WebSocket.
//
// Every message carries a SCREAMING_SNAKE_CASE `type` tag. Requests may
// carry an `id`, echoed back in the matching REPLY.

use serde::{Deserialize, Serialize};

use crate::draft::pick::{Participant, Pick};
use crate::draft::state::{BoardRow, DraftSnapshot, DraftStatus};

/// Identifies one WebSocket connection for the lifetime of the process.
pub type ClientId = u64;

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// A request plus its optional correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(flatten)]
    pub request: ClientRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientRequest {
    /// Resume a session by `token`, or open one for `email`.
    Login {
        email: Option<String>,
        token: Option<String>,
    },
    /// Admin only. Non-positive or missing rounds use the configured default.
    StartDraft { total_rounds: Option<i64> },
    MakePick { golfer_name: String },
    /// Admin only. Picks for whoever is on the clock.
    AdminPick {
        user_email: String,
        golfer_name: String,
    },
    ToggleAutoPick { enabled: bool },
    /// Admin only.
    AdminToggleAutoPick { user_email: String, enabled: bool },
    GetState,
    GetBoard,
    /// Liveness check. Needs no login.
    Health,
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInfo {
    pub token: String,
    pub user: Participant,
}

/// Liveness answer: the server is up and the draft is in `draft_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthInfo {
    pub status: String,
    pub draft_status: DraftStatus,
    pub connected_clients: usize,
}

/// Answer to one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Box<DraftSnapshot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<Vec<BoardRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthInfo>,
}

impl Reply {
    pub fn ok(id: Option<serde_json::Value>) -> Self {
        Reply {
            id,
            success: true,
            ..Reply::default()
        }
    }

    pub fn error(id: Option<serde_json::Value>, message: impl Into<String>) -> Self {
        Reply {
            id,
            success: false,
            error: Some(message.into()),
            ..Reply::default()
        }
    }

    pub fn with_state(mut self, state: DraftSnapshot) -> Self {
        self.state = Some(Box::new(state));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Reply(Reply),
    DraftStarted {
        state: Box<DraftSnapshot>,
    },
    PickMade {
        pick: Pick,
        automated: bool,
        admin_override: bool,
        state: Box<DraftSnapshot>,
    },
    DraftComplete {
        state: Box<DraftSnapshot>,
    },
    AutoPickUpdated {
        user_email: String,
        enabled: bool,
    },
    UserOnline {
        user_email: String,
        online: Vec<String>,
    },
    UserOffline {
        user_email: String,
        online: Vec<String>,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: &str) -> ClientEnvelope {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn login_with_email_and_id() {
        let env = parse(r#"{"type":"LOGIN","id":7,"email":"a@x.io"}"#);
        assert_eq!(env.id, Some(json!(7)));
        assert_eq!(
            env.request,
            ClientRequest::Login {
                email: Some("a@x.io".into()),
                token: None
            }
        );
    }

    #[test]
    fn start_draft_rounds_are_optional() {
        let env = parse(r#"{"type":"START_DRAFT"}"#);
        assert_eq!(env.id, None);
        assert_eq!(env.request, ClientRequest::StartDraft { total_rounds: None });

        let env = parse(r#"{"type":"START_DRAFT","totalRounds":-3}"#);
        assert_eq!(
            env.request,
            ClientRequest::StartDraft {
                total_rounds: Some(-3)
            }
        );
    }

    #[test]
    fn pick_requests_use_camel_case_fields() {
        let env = parse(r#"{"type":"ADMIN_PICK","id":"abc","userEmail":"b@x.io","golferName":"Jon Rahm"}"#);
        assert_eq!(env.id, Some(json!("abc")));
        assert_eq!(
            env.request,
            ClientRequest::AdminPick {
                user_email: "b@x.io".into(),
                golfer_name: "Jon Rahm".into()
            }
        );

        let env = parse(r#"{"type":"MAKE_PICK","golferName":"Tom Kim"}"#);
        assert_eq!(
            env.request,
            ClientRequest::MakePick {
                golfer_name: "Tom Kim".into()
            }
        );
    }

    #[test]
    fn unit_requests_parse() {
        assert_eq!(parse(r#"{"type":"GET_STATE"}"#).request, ClientRequest::GetState);
        assert_eq!(parse(r#"{"type":"GET_BOARD","id":1}"#).request, ClientRequest::GetBoard);
        assert_eq!(parse(r#"{"type":"HEALTH"}"#).request, ClientRequest::Health);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientEnvelope>(r#"{"type":"CHAT","text":"hi"}"#).is_err());
        assert!(serde_json::from_str::<ClientEnvelope>(r#"{"type":"MAKE_PICK"}"#).is_err());
    }

    #[test]
    fn error_reply_omits_empty_fields() {
        let msg = ServerMessage::Reply(Reply::error(Some(json!(3)), "It's not your turn"));
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type":"REPLY","id":3,"success":false,"error":"It's not your turn"})
        );
    }

    #[test]
    fn broadcast_tags_and_fields() {
        let msg = ServerMessage::AutoPickUpdated {
            user_email: "a@x.io".into(),
            enabled: true,
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type":"AUTO_PICK_UPDATED","userEmail":"a@x.io","enabled":true})
        );
    }
}
