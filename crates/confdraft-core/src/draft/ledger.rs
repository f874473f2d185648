// Resource ledger: who holds which resource, and the pick log.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::DraftError;
use super::{DraftId, UserId};

/// How a resource came to be held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionKind {
    /// Initial-stage claim; does not count against the pick limit.
    Claim,
    /// Main-stage turn-ordered pick.
    Pick,
}

impl fmt::Display for AcquisitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionKind::Claim => write!(f, "claimed"),
            AcquisitionKind::Pick => write!(f, "picked"),
        }
    }
}

/// The single holder of a resource within a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub draft_id: DraftId,
    pub resource: String,
    pub user_id: UserId,
    /// `None` for claims, the global pick number for picks.
    pub pick_number: Option<u32>,
}

impl Assignment {
    pub fn kind(&self) -> AcquisitionKind {
        match self.pick_number {
            Some(_) => AcquisitionKind::Pick,
            None => AcquisitionKind::Claim,
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Assignment {
            draft_id: row.get(0)?,
            resource: row.get(1)?,
            user_id: row.get(2)?,
            pick_number: row.get(3)?,
        })
    }

    fn into_taken_error(self) -> DraftError {
        DraftError::ResourceTaken {
            kind: self.kind(),
            resource: self.resource,
            owner: self.user_id,
            draft_id: self.draft_id,
            pick_number: self.pick_number,
        }
    }
}

/// One entry of a draft's main-stage pick log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickRecord {
    pub draft_id: DraftId,
    pub pick_number: u32,
    pub user_id: UserId,
    pub resource: String,
    pub picked_at: DateTime<Utc>,
}

/// Assign `resource` to `user_id` unless someone already holds it.
///
/// The existence check and the insert are one statement: the conflict
/// clause on the `(draft_id, resource_name)` primary key makes a losing
/// insert a no-op, and the changed-row count tells the two cases apart.
pub fn take_if_free(
    conn: &Connection,
    draft_id: DraftId,
    resource: &str,
    user_id: UserId,
    pick_number: Option<u32>,
) -> Result<Assignment, DraftError> {
    let inserted = conn.execute(
        "INSERT INTO assignments (draft_id, resource_name, user_id, pick_number)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(draft_id, resource_name) DO NOTHING",
        params![draft_id, resource, user_id, pick_number],
    )?;
    if inserted == 1 {
        return Ok(Assignment {
            draft_id,
            resource: resource.to_string(),
            user_id,
            pick_number,
        });
    }
    match lookup(conn, draft_id, resource)? {
        Some(holder) => Err(holder.into_taken_error()),
        None => Err(DraftError::Misconfiguration(format!(
            "assignment of {resource} in draft {draft_id} conflicted but has no holder"
        ))),
    }
}

/// Fail with [`DraftError::ResourceTaken`] if `resource` is held.
pub fn ensure_free(conn: &Connection, draft_id: DraftId, resource: &str) -> Result<(), DraftError> {
    match lookup(conn, draft_id, resource)? {
        Some(holder) => Err(holder.into_taken_error()),
        None => Ok(()),
    }
}

/// Current holder of `resource` in the draft.
pub fn lookup(
    conn: &Connection,
    draft_id: DraftId,
    resource: &str,
) -> Result<Option<Assignment>, DraftError> {
    Ok(conn
        .query_row(
            "SELECT draft_id, resource_name, user_id, pick_number FROM assignments
             WHERE draft_id = ?1 AND resource_name = ?2",
            params![draft_id, resource],
            Assignment::from_row,
        )
        .optional()?)
}

/// Every assignment in the draft: claims first, then picks in pick order.
pub fn assignments(conn: &Connection, draft_id: DraftId) -> Result<Vec<Assignment>, DraftError> {
    let mut stmt = conn.prepare(
        "SELECT draft_id, resource_name, user_id, pick_number FROM assignments
         WHERE draft_id = ?1
         ORDER BY pick_number IS NOT NULL, pick_number, resource_name",
    )?;
    let rows = stmt
        .query_map(params![draft_id], Assignment::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn assigned_resources(conn: &Connection, draft_id: DraftId) -> Result<HashSet<String>, DraftError> {
    let mut stmt = conn.prepare("SELECT resource_name FROM assignments WHERE draft_id = ?1")?;
    let names = stmt
        .query_map(params![draft_id], |row| row.get(0))?
        .collect::<Result<HashSet<String>, _>>()?;
    Ok(names)
}

/// The number the next pick in this draft will carry.
pub fn next_pick_number(conn: &Connection, draft_id: DraftId) -> Result<u32, DraftError> {
    let last: u32 = conn.query_row(
        "SELECT COALESCE(MAX(pick_number), 0) FROM picks WHERE draft_id = ?1",
        params![draft_id],
        |row| row.get(0),
    )?;
    Ok(last + 1)
}

pub fn append_pick(conn: &Connection, record: &PickRecord) -> Result<(), DraftError> {
    conn.execute(
        "INSERT INTO picks (draft_id, pick_number, user_id, resource_name, picked_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.draft_id,
            record.pick_number,
            record.user_id,
            record.resource,
            record.picked_at,
        ],
    )?;
    Ok(())
}

/// Completed main-stage picks by `user_id`. Claims are not counted.
pub fn picks_made(conn: &Connection, draft_id: DraftId, user_id: UserId) -> Result<u32, DraftError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM picks WHERE draft_id = ?1 AND user_id = ?2",
        params![draft_id, user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// The draft's pick log in pick order, capped at `limit` entries if given.
pub fn pick_history(
    conn: &Connection,
    draft_id: DraftId,
    limit: Option<u32>,
) -> Result<Vec<PickRecord>, DraftError> {
    let mut stmt = conn.prepare(
        "SELECT draft_id, pick_number, user_id, resource_name, picked_at FROM picks
         WHERE draft_id = ?1 ORDER BY pick_number LIMIT ?2",
    )?;
    // SQLite treats a negative LIMIT as unbounded.
    let limit = limit.map_or(-1, i64::from);
    let rows = stmt
        .query_map(params![draft_id, limit], |row| {
            Ok(PickRecord {
                draft_id: row.get(0)?,
                pick_number: row.get(1)?,
                user_id: row.get(2)?,
                resource: row.get(3)?,
                picked_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::draft::{order, session};

    fn seeded() -> (Database, DraftId) {
        let db = Database::open(":memory:").expect("in-memory database should open");
        let id = db
            .write(|tx| {
                let s = session::create(tx, 1, None, Utc::now())?;
                order::insert_roster(tx, s.id, &[100, 200], 7)?;
                Ok(s.id)
            })
            .unwrap();
        (db, id)
    }

    fn pick(draft_id: DraftId, n: u32, user: UserId, resource: &str) -> PickRecord {
        PickRecord {
            draft_id,
            pick_number: n,
            user_id: user,
            resource: resource.to_string(),
            picked_at: Utc::now(),
        }
    }

    #[test]
    fn take_if_free_assigns_once() {
        let (db, draft) = seeded();
        let first = db
            .write(|tx| take_if_free(tx, draft, "Ohio State", 100, None))
            .unwrap();
        assert_eq!(first.kind(), AcquisitionKind::Claim);

        let err = db
            .write(|tx| take_if_free(tx, draft, "Ohio State", 200, None))
            .unwrap_err();
        match err {
            DraftError::ResourceTaken {
                owner,
                kind,
                pick_number,
                ..
            } => {
                assert_eq!(owner, 100);
                assert_eq!(kind, AcquisitionKind::Claim);
                assert_eq!(pick_number, None);
            }
            other => panic!("expected ResourceTaken, got: {other}"),
        }

        let holder = db.read(|tx| lookup(tx, draft, "Ohio State")).unwrap().unwrap();
        assert_eq!(holder.user_id, 100);
    }

    #[test]
    fn taken_by_pick_reports_pick_number() {
        let (db, draft) = seeded();
        db.write(|tx| take_if_free(tx, draft, "Michigan", 200, Some(4)))
            .unwrap();

        let err = db.read(|tx| ensure_free(tx, draft, "Michigan")).unwrap_err();
        match err {
            DraftError::ResourceTaken {
                kind, pick_number, ..
            } => {
                assert_eq!(kind, AcquisitionKind::Pick);
                assert_eq!(pick_number, Some(4));
            }
            other => panic!("expected ResourceTaken, got: {other}"),
        }
        assert!(db.read(|tx| ensure_free(tx, draft, "Iowa")).is_ok());
    }

    #[test]
    fn uniqueness_is_per_draft() {
        let (db, draft) = seeded();
        let other = db
            .write(|tx| {
                let s = session::create(tx, 2, None, Utc::now())?;
                order::insert_roster(tx, s.id, &[300], 7)?;
                Ok(s.id)
            })
            .unwrap();

        db.write(|tx| take_if_free(tx, draft, "Texas", 100, None)).unwrap();
        db.write(|tx| take_if_free(tx, other, "Texas", 300, None)).unwrap();
        assert_eq!(
            db.read(|tx| lookup(tx, other, "Texas")).unwrap().unwrap().user_id,
            300
        );
    }

    #[test]
    fn pick_numbers_extend_the_log() {
        let (db, draft) = seeded();
        assert_eq!(db.read(|tx| next_pick_number(tx, draft)).unwrap(), 1);

        db.write(|tx| append_pick(tx, &pick(draft, 1, 100, "Michigan"))).unwrap();
        db.write(|tx| append_pick(tx, &pick(draft, 2, 200, "Wisconsin"))).unwrap();
        assert_eq!(db.read(|tx| next_pick_number(tx, draft)).unwrap(), 3);

        // Skipping ahead is refused by the store.
        assert!(db.write(|tx| append_pick(tx, &pick(draft, 5, 100, "Iowa"))).is_err());
    }

    #[test]
    fn picks_made_counts_only_that_user() {
        let (db, draft) = seeded();
        db.write(|tx| {
            append_pick(tx, &pick(draft, 1, 100, "Michigan"))?;
            append_pick(tx, &pick(draft, 2, 200, "Wisconsin"))?;
            append_pick(tx, &pick(draft, 3, 100, "Iowa"))
        })
        .unwrap();
        assert_eq!(db.read(|tx| picks_made(tx, draft, 100)).unwrap(), 2);
        assert_eq!(db.read(|tx| picks_made(tx, draft, 200)).unwrap(), 1);
    }

    #[test]
    fn pick_history_is_ordered_and_capped() {
        let (db, draft) = seeded();
        db.write(|tx| {
            for (n, name) in ["A", "B", "C"].iter().enumerate() {
                append_pick(tx, &pick(draft, n as u32 + 1, 100, name))?;
            }
            Ok(())
        })
        .unwrap();

        let all = db.read(|tx| pick_history(tx, draft, None)).unwrap();
        let numbers: Vec<u32> = all.iter().map(|p| p.pick_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let capped = db.read(|tx| pick_history(tx, draft, Some(2))).unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[1].resource, "B");
    }

    #[test]
    fn assignments_list_claims_before_picks() {
        let (db, draft) = seeded();
        db.write(|tx| {
            take_if_free(tx, draft, "Wisconsin", 200, Some(2))?;
            take_if_free(tx, draft, "Michigan", 100, Some(1))?;
            take_if_free(tx, draft, "Texas", 200, None)?;
            Ok(())
        })
        .unwrap();

        let order: Vec<String> = db
            .read(|tx| assignments(tx, draft))
            .unwrap()
            .into_iter()
            .map(|a| a.resource)
            .collect();
        assert_eq!(order, vec!["Texas", "Michigan", "Wisconsin"]);

        let names = db.read(|tx| assigned_resources(tx, draft)).unwrap();
        assert_eq!(names.len(), 3);
        assert!(names.contains("Michigan"));
    }
}
