// Draft session lifecycle: create, find active/latest, end.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::DraftError;
use super::stage::Stage;
use super::{DraftId, ScopeId};

/// Whether a session still accepts actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

/// One run of the draft within a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSession {
    pub id: DraftId,
    pub scope_id: ScopeId,
    /// Channel the draft was started from, if the surface supplied one.
    pub channel_id: Option<i64>,
    pub status: SessionStatus,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Index into the pick-ordered roster of the participant whose action is
    /// currently valid.
    pub turn_cursor: u32,
}

impl DraftSession {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

const SESSION_COLUMNS: &str =
    "id, scope_id, channel_id, status, stage, created_at, ended_at, turn_cursor";

/// Raw column values, decoded into a [`DraftSession`] outside the rusqlite
/// row closure so bad enum text surfaces as a typed error.
struct SessionRow {
    id: DraftId,
    scope_id: ScopeId,
    channel_id: Option<i64>,
    status: String,
    stage: String,
    created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    turn_cursor: u32,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(SessionRow {
            id: row.get(0)?,
            scope_id: row.get(1)?,
            channel_id: row.get(2)?,
            status: row.get(3)?,
            stage: row.get(4)?,
            created_at: row.get(5)?,
            ended_at: row.get(6)?,
            turn_cursor: row.get(7)?,
        })
    }

    fn into_session(self) -> Result<DraftSession, DraftError> {
        let status = SessionStatus::parse(&self.status).ok_or_else(|| {
            DraftError::Misconfiguration(format!(
                "draft {} has unknown status '{}'",
                self.id, self.status
            ))
        })?;
        let stage = Stage::parse(&self.stage).ok_or_else(|| {
            DraftError::Misconfiguration(format!(
                "draft {} has unknown stage '{}'",
                self.id, self.stage
            ))
        })?;
        Ok(DraftSession {
            id: self.id,
            scope_id: self.scope_id,
            channel_id: self.channel_id,
            status,
            stage,
            created_at: self.created_at,
            ended_at: self.ended_at,
            turn_cursor: self.turn_cursor,
        })
    }
}

fn query_one(
    conn: &Connection,
    sql: &str,
    scope_id: ScopeId,
) -> Result<Option<DraftSession>, DraftError> {
    conn.query_row(sql, params![scope_id], SessionRow::from_row)
        .optional()?
        .map(SessionRow::into_session)
        .transpose()
}

/// Insert a new active session in the initial stage with the cursor at 0.
pub fn create(
    conn: &Connection,
    scope_id: ScopeId,
    channel_id: Option<i64>,
    created_at: DateTime<Utc>,
) -> Result<DraftSession, DraftError> {
    conn.execute(
        "INSERT INTO drafts (scope_id, channel_id, status, stage, created_at, turn_cursor)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        params![
            scope_id,
            channel_id,
            SessionStatus::Active.as_str(),
            Stage::Initial.as_str(),
            created_at,
        ],
    )?;
    Ok(DraftSession {
        id: conn.last_insert_rowid(),
        scope_id,
        channel_id,
        status: SessionStatus::Active,
        stage: Stage::Initial,
        created_at,
        ended_at: None,
        turn_cursor: 0,
    })
}

/// The scope's active session, if any.
pub fn find_active(conn: &Connection, scope_id: ScopeId) -> Result<Option<DraftSession>, DraftError> {
    query_one(
        conn,
        &format!(
            "SELECT {SESSION_COLUMNS} FROM drafts
             WHERE scope_id = ?1 AND status = 'active' ORDER BY id DESC LIMIT 1"
        ),
        scope_id,
    )
}

/// The scope's most recently created session regardless of status.
pub fn find_latest(conn: &Connection, scope_id: ScopeId) -> Result<Option<DraftSession>, DraftError> {
    query_one(
        conn,
        &format!("SELECT {SESSION_COLUMNS} FROM drafts WHERE scope_id = ?1 ORDER BY id DESC LIMIT 1"),
        scope_id,
    )
}

/// The active session, falling back to the latest finished one. Used by the
/// read-only group views, which stay available after a draft ends.
pub fn find_current_or_latest(
    conn: &Connection,
    scope_id: ScopeId,
) -> Result<Option<DraftSession>, DraftError> {
    match find_active(conn, scope_id)? {
        Some(session) => Ok(Some(session)),
        None => find_latest(conn, scope_id),
    }
}

/// The active session or [`DraftError::NoActiveSession`].
pub fn require_active(conn: &Connection, scope_id: ScopeId) -> Result<DraftSession, DraftError> {
    find_active(conn, scope_id)?.ok_or(DraftError::NoActiveSession)
}

/// Mark a session finished. Returns the updated session.
pub fn finish(
    conn: &Connection,
    session: &DraftSession,
    ended_at: DateTime<Utc>,
) -> Result<DraftSession, DraftError> {
    conn.execute(
        "UPDATE drafts SET status = ?1, ended_at = ?2 WHERE id = ?3",
        params![SessionStatus::Finished.as_str(), ended_at, session.id],
    )?;
    Ok(DraftSession {
        status: SessionStatus::Finished,
        ended_at: Some(ended_at),
        ..session.clone()
    })
}

/// Persist a stage transition.
pub fn set_stage(conn: &Connection, draft_id: DraftId, stage: Stage) -> Result<(), DraftError> {
    conn.execute(
        "UPDATE drafts SET stage = ?1 WHERE id = ?2",
        params![stage.as_str(), draft_id],
    )?;
    Ok(())
}
