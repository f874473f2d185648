// Group (conference) selection with a per-draft capacity.

use std::fmt;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::error::DraftError;
use super::order;
use super::{DraftId, UserId};

/// A group name after normalization: trimmed, inner whitespace collapsed to
/// single spaces, case preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(String);

impl GroupName {
    pub fn parse(input: &str) -> Result<Self, DraftError> {
        let normalized = input.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return Err(DraftError::EmptyGroupName);
        }
        Ok(GroupName(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Members currently in `group`. Matching is exact (case-sensitive).
pub fn member_count(conn: &Connection, draft_id: DraftId, group: &GroupName) -> Result<u32, DraftError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM participants WHERE draft_id = ?1 AND group_name = ?2",
        params![draft_id, group.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Put `user_id` in `group` unless it already holds `capacity` members.
/// Returns the member count after joining.
pub fn assign(
    conn: &Connection,
    draft_id: DraftId,
    user_id: UserId,
    group: &GroupName,
    capacity: u32,
) -> Result<u32, DraftError> {
    let members = member_count(conn, draft_id, group)?;
    if members >= capacity {
        return Err(DraftError::GroupFull {
            group: group.to_string(),
            capacity,
        });
    }
    order::record_group(conn, draft_id, user_id, group.as_str())?;
    Ok(members + 1)
}

/// Pick the stored group name a view request refers to. An exact match on
/// the normalized query wins; otherwise the first case-insensitive match.
pub fn resolve_view_key<'a, I>(stored: I, query: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let query = GroupName::parse(query).ok()?;
    let mut folded = None;
    for key in stored {
        if key == query.as_str() {
            return Some(key);
        }
        if folded.is_none() && key.to_lowercase() == query.as_str().to_lowercase() {
            folded = Some(key);
        }
    }
    folded
}
