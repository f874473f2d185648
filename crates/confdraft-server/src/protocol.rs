// JSON request/reply messages exchanged over the WebSocket.

use confdraft_core::draft::{DraftError, ScopeId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One command from a client: who is acting, in which scope, and what they
/// want done.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Request {
    /// Client-chosen correlation id, echoed back in the reply.
    pub id: String,
    pub scope: ScopeId,
    pub user: UserId,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    StartDraft {
        /// Participants in turn order.
        roster: Vec<UserId>,
        #[serde(default)]
        channel: Option<i64>,
    },
    Claim {
        resource: String,
    },
    ChooseGroup {
        group: String,
    },
    Pick {
        resource: String,
    },
    EndDraft,
    ListAvailable,
    Status,
    GroupRosters,
    GroupView {
        group: String,
    },
    ListGroups,
    Lookup {
        resource: String,
    },
}

impl Action {
    /// Actions restricted to the configured admin users.
    pub fn is_admin_only(&self) -> bool {
        matches!(self, Action::StartDraft { .. } | Action::EndDraft)
    }
}

/// Failures surfaced to clients.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    BadRequest(serde_json::Error),

    #[error("user {user} may not perform this action")]
    Forbidden { user: UserId },

    #[error("failed to encode reply: {0}")]
    Encode(serde_json::Error),

    #[error(transparent)]
    Draft(#[from] DraftError),
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::BadRequest(_) => "BAD_REQUEST",
            ProtocolError::Forbidden { .. } => "FORBIDDEN",
            ProtocolError::Encode(_) => "INTERNAL",
            ProtocolError::Draft(e) => e.code(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        match self {
            ProtocolError::BadRequest(_) | ProtocolError::Forbidden { .. } => false,
            ProtocolError::Encode(_) => true,
            ProtocolError::Draft(e) => e.is_fatal(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
    pub fatal: bool,
}

impl From<&ProtocolError> for ErrorPayload {
    fn from(err: &ProtocolError) -> Self {
        ErrorPayload {
            code: err.code(),
            message: err.to_string(),
            fatal: err.is_fatal(),
        }
    }
}

/// Exactly one reply is sent per request frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    /// `None` when the request could not be parsed far enough to read it.
    pub id: Option<String>,
    pub status: ReplyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl Reply {
    pub fn ok(id: Option<String>, data: serde_json::Value) -> Self {
        Reply {
            id,
            status: ReplyStatus::Ok,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, err: &ProtocolError) -> Self {
        Reply {
            id,
            status: ReplyStatus::Error,
            data: None,
            error: Some(err.into()),
        }
    }
}

/// Parse a request frame. On failure, salvage the `id` field if the frame
/// was at least a JSON object carrying one.
pub fn parse_request(text: &str) -> Result<Request, (Option<String>, ProtocolError)> {
    serde_json::from_str(text).map_err(|e| {
        let id = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_owned));
        (id, ProtocolError::BadRequest(e))
    })
}
