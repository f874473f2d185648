// Ordered roster of participants and their pick allowances.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::DraftError;
use super::{DraftId, UserId};

/// A user's seat in one draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub draft_id: DraftId,
    pub user_id: UserId,
    /// Zero-based rank in the turn order. Fixed at draft start.
    pub pick_order: u32,
    pub claimed_resource: Option<String>,
    pub group: Option<String>,
    pub claimed: bool,
    pub group_chosen: bool,
}

impl Participant {
    /// Whether this participant has finished the initial stage.
    pub fn is_ready(&self) -> bool {
        self.claimed && self.group_chosen
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Participant {
            draft_id: row.get(0)?,
            user_id: row.get(1)?,
            pick_order: row.get(2)?,
            claimed_resource: row.get(3)?,
            group: row.get(4)?,
            claimed: row.get(5)?,
            group_chosen: row.get(6)?,
        })
    }
}

const PARTICIPANT_COLUMNS: &str =
    "draft_id, user_id, pick_order, claimed_resource, group_name, claimed, group_chosen";

/// Check a roster supplied to `start_draft`: at least `min` users, none
/// repeated.
pub fn validate_roster(users: &[UserId], min: usize) -> Result<(), DraftError> {
    if users.len() < min {
        return Err(DraftError::InvalidRoster(format!(
            "need at least {min} participants, got {}",
            users.len()
        )));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = users.iter().find(|u| !seen.insert(**u)) {
        return Err(DraftError::InvalidRoster(format!(
            "user {dup} appears more than once"
        )));
    }
    Ok(())
}

/// Insert the roster in turn order with `picks_allowed` main-stage picks each.
pub fn insert_roster(
    conn: &Connection,
    draft_id: DraftId,
    users: &[UserId],
    picks_allowed: u32,
) -> Result<(), DraftError> {
    let mut participant_stmt = conn.prepare(
        "INSERT INTO participants (draft_id, user_id, pick_order) VALUES (?1, ?2, ?3)",
    )?;
    let mut limit_stmt = conn.prepare(
        "INSERT OR REPLACE INTO pick_limits (draft_id, user_id, picks_allowed) VALUES (?1, ?2, ?3)",
    )?;
    for (order, user) in users.iter().enumerate() {
        participant_stmt.execute(params![draft_id, user, order as u32])?;
        limit_stmt.execute(params![draft_id, user, picks_allowed])?;
    }
    Ok(())
}

pub fn roster_size(conn: &Connection, draft_id: DraftId) -> Result<u32, DraftError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM participants WHERE draft_id = ?1",
        params![draft_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// The participant holding rank `pick_order`, if any.
pub fn participant_at(
    conn: &Connection,
    draft_id: DraftId,
    pick_order: u32,
) -> Result<Option<Participant>, DraftError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE draft_id = ?1 AND pick_order = ?2"
            ),
            params![draft_id, pick_order],
            Participant::from_row,
        )
        .optional()?)
}

pub fn find(
    conn: &Connection,
    draft_id: DraftId,
    user_id: UserId,
) -> Result<Option<Participant>, DraftError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE draft_id = ?1 AND user_id = ?2"
            ),
            params![draft_id, user_id],
            Participant::from_row,
        )
        .optional()?)
}

/// Every participant, in turn order.
pub fn roster(conn: &Connection, draft_id: DraftId) -> Result<Vec<Participant>, DraftError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE draft_id = ?1 ORDER BY pick_order"
    ))?;
    let rows = stmt
        .query_map(params![draft_id], Participant::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn record_claim(
    conn: &Connection,
    draft_id: DraftId,
    user_id: UserId,
    resource: &str,
) -> Result<(), DraftError> {
    conn.execute(
        "UPDATE participants SET claimed_resource = ?1, claimed = 1
         WHERE draft_id = ?2 AND user_id = ?3",
        params![resource, draft_id, user_id],
    )?;
    Ok(())
}

pub fn record_group(
    conn: &Connection,
    draft_id: DraftId,
    user_id: UserId,
    group: &str,
) -> Result<(), DraftError> {
    conn.execute(
        "UPDATE participants SET group_name = ?1, group_chosen = 1
         WHERE draft_id = ?2 AND user_id = ?3",
        params![group, draft_id, user_id],
    )?;
    Ok(())
}

/// Completion predicate for the initial stage: every participant has claimed
/// and chosen a group. An empty roster is never complete.
pub fn all_ready(conn: &Connection, draft_id: DraftId) -> Result<bool, DraftError> {
    let (total, ready): (u32, u32) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(claimed = 1 AND group_chosen = 1), 0)
         FROM participants WHERE draft_id = ?1",
        params![draft_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(total > 0 && ready == total)
}

/// Main-stage picks `user_id` may make in this draft.
pub fn picks_allowed(
    conn: &Connection,
    draft_id: DraftId,
    user_id: UserId,
) -> Result<u32, DraftError> {
    conn.query_row(
        "SELECT picks_allowed FROM pick_limits WHERE draft_id = ?1 AND user_id = ?2",
        params![draft_id, user_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| {
        DraftError::Misconfiguration(format!(
            "no pick limit recorded for user {user_id} in draft {draft_id}"
        ))
    })
}
