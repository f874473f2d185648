// Read-only projections over a draft: availability, status, and group
// rosters. Nothing here writes.

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::error::DraftError;
use super::groups::{self, GroupName};
use super::ledger::{self, Assignment, PickRecord};
use super::order::{self, Participant};
use super::session::{self, DraftSession};
use super::{cursor, DraftId, ScopeId, UserId};
use crate::catalog::Catalog;

/// Snapshot of the active draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftStatus {
    pub session: DraftSession,
    pub expected_user: UserId,
    /// Participants in pick order.
    pub participants: Vec<Participant>,
    /// The earliest picks in pick order, capped by the status window.
    pub recent_picks: Vec<PickRecord>,
    pub total_picks: u32,
}

/// Resources held by one member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberHoldings {
    pub user_id: UserId,
    /// Claim first, then picks in pick order.
    pub resources: Vec<String>,
}

/// One group and what its members hold. `group` is `None` for participants
/// who never chose one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRoster {
    pub group: Option<String>,
    pub members: Vec<MemberHoldings>,
}

/// Occupancy of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSlots {
    pub group: Option<String>,
    /// Member user ids in pick order.
    pub members: Vec<UserId>,
    pub capacity: u32,
}

/// Who holds a resource, if anyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOwnership {
    pub draft_id: DraftId,
    pub resource: String,
    pub holder: Option<Assignment>,
}

fn current_or_latest(conn: &Connection, scope_id: ScopeId) -> Result<DraftSession, DraftError> {
    session::find_current_or_latest(conn, scope_id)?.ok_or(DraftError::NoActiveSession)
}

/// Catalog names not yet assigned in the active draft, in catalog order.
pub fn available_resources(
    conn: &Connection,
    catalog: &Catalog,
    scope_id: ScopeId,
) -> Result<Vec<String>, DraftError> {
    let session = session::require_active(conn, scope_id)?;
    let taken = ledger::assigned_resources(conn, session.id)?;
    Ok(catalog
        .names()
        .iter()
        .filter(|name| !taken.contains(name.as_str()))
        .cloned()
        .collect())
}

pub fn status(
    conn: &Connection,
    scope_id: ScopeId,
    pick_window: u32,
) -> Result<DraftStatus, DraftError> {
    let session = session::require_active(conn, scope_id)?;
    let expected = cursor::expected(conn, &session)?;
    let participants = order::roster(conn, session.id)?;
    let recent_picks = ledger::pick_history(conn, session.id, Some(pick_window))?;
    let total_picks = ledger::next_pick_number(conn, session.id)? - 1;
    Ok(DraftStatus {
        expected_user: expected.user_id,
        participants,
        recent_picks,
        total_picks,
        session,
    })
}

/// Groups present in the roster, sorted case-insensitively (ties broken by
/// exact text), with the unassigned bucket last when it is non-empty.
fn bucket_by_group(participants: Vec<Participant>) -> Vec<(Option<String>, Vec<Participant>)> {
    let mut named: BTreeMap<(String, String), Vec<Participant>> = BTreeMap::new();
    let mut unassigned = Vec::new();
    for p in participants {
        match p.group.clone() {
            Some(group) => named
                .entry((group.to_lowercase(), group))
                .or_default()
                .push(p),
            None => unassigned.push(p),
        }
    }
    let mut buckets: Vec<_> = named
        .into_iter()
        .map(|((_, group), members)| (Some(group), members))
        .collect();
    if !unassigned.is_empty() {
        buckets.push((None, unassigned));
    }
    buckets
}

fn rosters_for(conn: &Connection, draft_id: DraftId) -> Result<Vec<GroupRoster>, DraftError> {
    let participants = order::roster(conn, draft_id)?;
    let mut holdings: BTreeMap<UserId, Vec<String>> = BTreeMap::new();
    for a in ledger::assignments(conn, draft_id)? {
        holdings.entry(a.user_id).or_default().push(a.resource);
    }

    Ok(bucket_by_group(participants)
        .into_iter()
        .map(|(group, members)| GroupRoster {
            group,
            members: members
                .into_iter()
                .map(|p| MemberHoldings {
                    resources: holdings.remove(&p.user_id).unwrap_or_default(),
                    user_id: p.user_id,
                })
                .collect(),
        })
        .collect())
}

/// Every group with its members' holdings, for the active draft or the most
/// recent finished one.
pub fn group_rosters(conn: &Connection, scope_id: ScopeId) -> Result<Vec<GroupRoster>, DraftError> {
    let session = current_or_latest(conn, scope_id)?;
    rosters_for(conn, session.id)
}

/// Name that addresses the bucket of participants without a group in
/// [`group_view`]. A real group with this exact name takes precedence.
pub const UNASSIGNED_GROUP: &str = "(unassigned)";

/// One group's roster. An exact name match wins over a case-insensitive one;
/// [`UNASSIGNED_GROUP`] selects participants who never chose a group.
pub fn group_view(
    conn: &Connection,
    scope_id: ScopeId,
    name: &str,
) -> Result<GroupRoster, DraftError> {
    let session = current_or_latest(conn, scope_id)?;
    let rosters = rosters_for(conn, session.id)?;
    let shown = GroupName::parse(name)
        .map_or_else(|_| name.trim().to_string(), GroupName::into_string);

    let key = groups::resolve_view_key(
        rosters.iter().filter_map(|r| r.group.as_deref()),
        name,
    )
    .map(str::to_owned);
    let target = match key {
        Some(key) => Some(key),
        None if shown.eq_ignore_ascii_case(UNASSIGNED_GROUP) => None,
        None => return Err(DraftError::UnknownGroup(shown)),
    };

    rosters
        .into_iter()
        .find(|r| r.group == target)
        .ok_or(DraftError::UnknownGroup(shown))
}

/// Occupancy of every group against `capacity`.
pub fn group_slots(
    conn: &Connection,
    scope_id: ScopeId,
    capacity: u32,
) -> Result<Vec<GroupSlots>, DraftError> {
    let session = current_or_latest(conn, scope_id)?;
    let participants = order::roster(conn, session.id)?;
    Ok(bucket_by_group(participants)
        .into_iter()
        .map(|(group, members)| GroupSlots {
            group,
            members: members.into_iter().map(|p| p.user_id).collect(),
            capacity,
        })
        .collect())
}

/// Ownership of `resource` in the active or most recent draft.
pub fn lookup(
    conn: &Connection,
    catalog: &Catalog,
    scope_id: ScopeId,
    resource: &str,
) -> Result<ResourceOwnership, DraftError> {
    let canonical = catalog.normalize(resource)?;
    let session = current_or_latest(conn, scope_id)?;
    Ok(ResourceOwnership {
        draft_id: session.id,
        resource: canonical.to_string(),
        holder: ledger::lookup(conn, session.id, canonical)?,
    })
}
