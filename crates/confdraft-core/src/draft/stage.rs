// Stage state machine: which action is legal for whom, and the transitions
// each successful action causes.
//
// Every function here runs inside the caller's write transaction. A returned
// error rolls back everything the function wrote, so a rejected action never
// moves the cursor or leaves a partial assignment behind.

use std::fmt;

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::error::DraftError;
use super::groups::{self, GroupName};
use super::ledger::{self, PickRecord};
use super::order::{self, Participant};
use super::session::{self, DraftSession};
use super::{cursor, DraftId, ScopeId, UserId};
use crate::catalog::Catalog;
use crate::config::DraftRules;

/// The two stages of an active draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Each participant claims one resource, then chooses a group.
    Initial,
    /// Participants pick resources in turn until their limit.
    Main,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Main => "main",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(Self::Initial),
            "main" => Some(Self::Main),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful claim. The turn does not move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub draft_id: DraftId,
    pub user_id: UserId,
    pub resource: String,
}

/// Result of a successful group selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOutcome {
    pub draft_id: DraftId,
    pub user_id: UserId,
    pub group: String,
    /// Members in the group after joining.
    pub members: u32,
    pub capacity: u32,
    /// Stage after this action; `Main` once everyone is ready.
    pub stage: Stage,
    /// Set when this selection completed the initial stage.
    pub stage_changed: bool,
    pub next_user: UserId,
}

/// Result of a successful main-stage pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickOutcome {
    pub draft_id: DraftId,
    pub user_id: UserId,
    pub resource: String,
    pub pick_number: u32,
    pub picks_made: u32,
    pub picks_allowed: u32,
    pub next_user: UserId,
}

/// Load the active session and check it is in `stage`.
fn active_in_stage(
    conn: &Connection,
    scope_id: ScopeId,
    stage: Stage,
    action: &'static str,
) -> Result<DraftSession, DraftError> {
    let session = session::require_active(conn, scope_id)?;
    if session.stage != stage {
        return Err(DraftError::WrongStage {
            action,
            stage: session.stage,
        });
    }
    Ok(session)
}

/// The expected participant, provided it is `user_id`.
fn require_turn(
    conn: &Connection,
    session: &DraftSession,
    user_id: UserId,
) -> Result<Participant, DraftError> {
    let expected = cursor::expected(conn, session)?;
    if expected.user_id != user_id {
        return Err(DraftError::NotYourTurn {
            expected: expected.user_id,
        });
    }
    Ok(expected)
}

/// Initial-stage claim. Records the resource with no pick number and leaves
/// the turn with the caller so they can choose a group next.
pub fn claim(
    conn: &Connection,
    catalog: &Catalog,
    scope_id: ScopeId,
    user_id: UserId,
    resource: &str,
) -> Result<ClaimOutcome, DraftError> {
    let session = active_in_stage(conn, scope_id, Stage::Initial, "claim")?;
    let participant = require_turn(conn, &session, user_id)?;
    let canonical = catalog.normalize(resource)?;

    if participant.claimed {
        return Err(DraftError::SequenceViolation(format!(
            "you already claimed {}; choose a group next",
            participant.claimed_resource.as_deref().unwrap_or("a resource")
        )));
    }

    ledger::take_if_free(conn, session.id, canonical, user_id, None)?;
    order::record_claim(conn, session.id, user_id, canonical)?;

    Ok(ClaimOutcome {
        draft_id: session.id,
        user_id,
        resource: canonical.to_string(),
    })
}

/// Initial-stage group selection. Advances the turn, and flips the draft to
/// the main stage once every participant has claimed and chosen.
pub fn choose_group(
    conn: &Connection,
    rules: &DraftRules,
    scope_id: ScopeId,
    user_id: UserId,
    group: &str,
) -> Result<GroupOutcome, DraftError> {
    let mut session = active_in_stage(conn, scope_id, Stage::Initial, "group selection")?;
    let participant = require_turn(conn, &session, user_id)?;

    if !participant.claimed {
        return Err(DraftError::SequenceViolation(
            "claim a resource before choosing a group".into(),
        ));
    }
    if participant.group_chosen {
        return Err(DraftError::SequenceViolation(
            "you have already chosen a group".into(),
        ));
    }

    let group = GroupName::parse(group)?;
    let members = groups::assign(conn, session.id, user_id, &group, rules.group_capacity)?;
    cursor::advance(conn, &mut session)?;

    let stage_changed = order::all_ready(conn, session.id)?;
    if stage_changed {
        session::set_stage(conn, session.id, Stage::Main)?;
        session.stage = Stage::Main;
        cursor::reset(conn, &mut session)?;
    }
    let next = cursor::expected(conn, &session)?;

    Ok(GroupOutcome {
        draft_id: session.id,
        user_id,
        group: group.into_string(),
        members,
        capacity: rules.group_capacity,
        stage: session.stage,
        stage_changed,
        next_user: next.user_id,
    })
}

/// Main-stage pick. Appends to the pick log, assigns the resource, and
/// passes the turn on.
pub fn pick(
    conn: &Connection,
    catalog: &Catalog,
    scope_id: ScopeId,
    user_id: UserId,
    resource: &str,
) -> Result<PickOutcome, DraftError> {
    let mut session = active_in_stage(conn, scope_id, Stage::Main, "pick")?;
    let participant = require_turn(conn, &session, user_id)?;
    let canonical = catalog.normalize(resource)?;

    ledger::ensure_free(conn, session.id, canonical)?;

    if participant.group.is_none() {
        return Err(DraftError::SequenceViolation(
            "no group recorded for you; the initial stage did not complete".into(),
        ));
    }

    let allowed = order::picks_allowed(conn, session.id, user_id)?;
    let made = ledger::picks_made(conn, session.id, user_id)?;
    if made >= allowed {
        return Err(DraftError::PickLimitReached { made, allowed });
    }

    let pick_number = ledger::next_pick_number(conn, session.id)?;
    ledger::append_pick(
        conn,
        &PickRecord {
            draft_id: session.id,
            pick_number,
            user_id,
            resource: canonical.to_string(),
            picked_at: Utc::now(),
        },
    )?;
    ledger::take_if_free(conn, session.id, canonical, user_id, Some(pick_number))?;
    cursor::advance(conn, &mut session)?;
    let next = cursor::expected(conn, &session)?;

    Ok(PickOutcome {
        draft_id: session.id,
        user_id,
        resource: canonical.to_string(),
        pick_number,
        picks_made: made + 1,
        picks_allowed: allowed,
        next_user: next.user_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    const A: UserId = 1;
    const B: UserId = 2;
    const SCOPE: ScopeId = 77;

    fn catalog() -> Catalog {
        Catalog::new(["Ohio State", "Texas", "Iowa", "Michigan", "Wisconsin"])
    }

    fn seeded(users: &[UserId]) -> Database {
        let db = Database::open(":memory:").expect("in-memory database should open");
        db.write(|tx| {
            let s = session::create(tx, SCOPE, None, Utc::now())?;
            order::insert_roster(tx, s.id, users, 7)
        })
        .unwrap();
        db
    }

    fn cursor_of(db: &Database) -> u32 {
        db.read(|tx| session::require_active(tx, SCOPE))
            .unwrap()
            .turn_cursor
    }

    #[test]
    fn stage_text_round_trips() {
        for stage in [Stage::Initial, Stage::Main] {
            assert_eq!(Stage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(Stage::parse("teams"), None);
    }

    #[test]
    fn claim_keeps_turn_and_records_claim() {
        let db = seeded(&[A, B]);
        let out = db
            .write(|tx| claim(tx, &catalog(), SCOPE, A, "ohio state"))
            .unwrap();
        assert_eq!(out.resource, "Ohio State");
        assert_eq!(cursor_of(&db), 0);
    }

    #[test]
    fn second_claim_is_sequence_violation() {
        let db = seeded(&[A, B]);
        db.write(|tx| claim(tx, &catalog(), SCOPE, A, "Iowa")).unwrap();
        let err = db
            .write(|tx| claim(tx, &catalog(), SCOPE, A, "Texas"))
            .unwrap_err();
        assert!(matches!(err, DraftError::SequenceViolation(_)));
        // Texas was not assigned by the rejected call.
        let holder = db.read(|tx| {
            let s = session::require_active(tx, SCOPE)?;
            ledger::lookup(tx, s.id, "Texas")
        });
        assert!(holder.unwrap().is_none());
    }

    #[test]
    fn group_before_claim_is_sequence_violation() {
        let db = seeded(&[A, B]);
        let err = db
            .write(|tx| choose_group(tx, &DraftRules::default(), SCOPE, A, "East"))
            .unwrap_err();
        assert!(matches!(err, DraftError::SequenceViolation(_)));
        assert_eq!(cursor_of(&db), 0);
    }

    #[test]
    fn out_of_turn_claim_is_rejected() {
        let db = seeded(&[A, B]);
        let err = db
            .write(|tx| claim(tx, &catalog(), SCOPE, B, "Iowa"))
            .unwrap_err();
        match err {
            DraftError::NotYourTurn { expected } => assert_eq!(expected, A),
            other => panic!("expected NotYourTurn, got: {other}"),
        }
    }

    #[test]
    fn unknown_resource_is_rejected() {
        let db = seeded(&[A, B]);
        let err = db
            .write(|tx| claim(tx, &catalog(), SCOPE, A, "Atlantis Tech"))
            .unwrap_err();
        assert!(matches!(err, DraftError::UnknownResource(_)));
    }

    #[test]
    fn pick_during_initial_is_wrong_stage() {
        let db = seeded(&[A, B]);
        let err = db
            .write(|tx| pick(tx, &catalog(), SCOPE, A, "Iowa"))
            .unwrap_err();
        match err {
            DraftError::WrongStage { stage, .. } => assert_eq!(stage, Stage::Initial),
            other => panic!("expected WrongStage, got: {other}"),
        }
    }

    #[test]
    fn last_group_selection_flips_to_main() {
        let db = seeded(&[A, B]);
        let rules = DraftRules::default();
        db.write(|tx| claim(tx, &catalog(), SCOPE, A, "Iowa")).unwrap();
        let first = db
            .write(|tx| choose_group(tx, &rules, SCOPE, A, "East"))
            .unwrap();
        assert!(!first.stage_changed);
        assert_eq!(first.next_user, B);

        db.write(|tx| claim(tx, &catalog(), SCOPE, B, "Texas")).unwrap();
        let last = db
            .write(|tx| choose_group(tx, &rules, SCOPE, B, "West"))
            .unwrap();
        assert!(last.stage_changed);
        assert_eq!(last.stage, Stage::Main);
        assert_eq!(last.next_user, A);
        assert_eq!(cursor_of(&db), 0);

        let err = db
            .write(|tx| claim(tx, &catalog(), SCOPE, A, "Michigan"))
            .unwrap_err();
        assert!(matches!(err, DraftError::WrongStage { .. }));
    }

    #[test]
    fn pick_requires_a_group() {
        let db = seeded(&[A, B]);
        // Force the stage without running the initial round.
        db.write(|tx| {
            let s = session::require_active(tx, SCOPE)?;
            session::set_stage(tx, s.id, Stage::Main)
        })
        .unwrap();

        let err = db
            .write(|tx| pick(tx, &catalog(), SCOPE, A, "Iowa"))
            .unwrap_err();
        assert!(matches!(err, DraftError::SequenceViolation(_)));
        assert_eq!(cursor_of(&db), 0);
    }
}
