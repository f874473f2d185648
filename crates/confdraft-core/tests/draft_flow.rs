// End-to-end draft flows through the public engine API.

use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;
use confdraft_core::catalog::Catalog;
use confdraft_core::config::DraftRules;
use confdraft_core::db::Database;
use confdraft_core::draft::ledger::{self, AcquisitionKind};
use confdraft_core::draft::stage::Stage;
use confdraft_core::draft::{order, session, DraftEngine, DraftError, UserId};

const SCOPE: i64 = 1;
const A: UserId = 101;
const B: UserId = 202;
const C: UserId = 303;

fn college_catalog() -> Catalog {
    Catalog::new([
        "Ohio State",
        "Texas",
        "Iowa",
        "Michigan",
        "Wisconsin",
        "Penn State",
        "Oregon",
    ])
}

fn engine_with(catalog: Catalog) -> DraftEngine {
    DraftEngine::new(
        Database::open(":memory:").expect("in-memory database should open"),
        catalog,
        DraftRules::default(),
    )
}

fn cursor(engine: &DraftEngine) -> u32 {
    engine.status(SCOPE).unwrap().session.turn_cursor
}

/// Runs the initial stage of scenario 1 and returns the engine in `main`.
fn through_initial_stage() -> DraftEngine {
    let engine = engine_with(college_catalog());
    engine.start_draft(SCOPE, None, &[A, B, C]).unwrap();
    engine.claim(SCOPE, A, "Ohio State").unwrap();
    engine.choose_group(SCOPE, A, "East").unwrap();
    engine.claim(SCOPE, B, "Texas").unwrap();
    engine.choose_group(SCOPE, B, "East").unwrap();
    engine.claim(SCOPE, C, "Iowa").unwrap();
    engine.choose_group(SCOPE, C, "West").unwrap();
    engine
}

#[test]
fn scenario_initial_stage_claims_and_groups() {
    let engine = engine_with(college_catalog());
    engine.start_draft(SCOPE, None, &[A, B, C]).unwrap();

    let claim = engine.claim(SCOPE, A, "ohio  state").unwrap();
    assert_eq!(claim.resource, "Ohio State");
    let holder = engine.lookup(SCOPE, "Ohio State").unwrap().holder.unwrap();
    assert_eq!(holder.pick_number, None);
    assert_eq!(cursor(&engine), 0);

    let group = engine.choose_group(SCOPE, A, "East").unwrap();
    assert_eq!(group.next_user, B);
    assert_eq!(cursor(&engine), 1);

    match engine.claim(SCOPE, B, "Ohio State").unwrap_err() {
        DraftError::ResourceTaken { owner, kind, .. } => {
            assert_eq!(owner, A);
            assert_eq!(kind, AcquisitionKind::Claim);
        }
        other => panic!("expected ResourceTaken, got: {other}"),
    }
    assert_eq!(cursor(&engine), 1);

    engine.claim(SCOPE, B, "Texas").unwrap();
    let full = engine.choose_group(SCOPE, B, "East").unwrap();
    assert_eq!(full.members, 2);

    engine.claim(SCOPE, C, "Iowa").unwrap();
    match engine.choose_group(SCOPE, C, "East").unwrap_err() {
        DraftError::GroupFull { group, capacity } => {
            assert_eq!(group, "East");
            assert_eq!(capacity, 2);
        }
        other => panic!("expected GroupFull, got: {other}"),
    }
    assert_eq!(cursor(&engine), 2);

    let last = engine.choose_group(SCOPE, C, "West").unwrap();
    assert!(last.stage_changed);
    assert_eq!(last.stage, Stage::Main);

    let status = engine.status(SCOPE).unwrap();
    assert_eq!(status.session.stage, Stage::Main);
    assert_eq!(status.session.turn_cursor, 0);
    assert_eq!(status.expected_user, A);
}

#[test]
fn scenario_main_stage_turn_order() {
    let engine = through_initial_stage();

    let first = engine.pick(SCOPE, A, "Michigan").unwrap();
    assert_eq!(first.pick_number, 1);
    assert_eq!(first.next_user, B);

    // C jumps the queue while the cursor is on B.
    match engine.pick(SCOPE, C, "Wisconsin").unwrap_err() {
        DraftError::NotYourTurn { expected } => assert_eq!(expected, B),
        other => panic!("expected NotYourTurn, got: {other}"),
    }
    assert_eq!(cursor(&engine), 1);

    let second = engine.pick(SCOPE, B, "Wisconsin").unwrap();
    assert_eq!(second.pick_number, 2);
    assert_eq!(second.next_user, C);

    // B again, now out of turn.
    assert!(matches!(
        engine.pick(SCOPE, B, "Oregon"),
        Err(DraftError::NotYourTurn { expected: C })
    ));

    match engine.pick(SCOPE, C, "Michigan").unwrap_err() {
        DraftError::ResourceTaken {
            owner,
            kind,
            pick_number,
            ..
        } => {
            assert_eq!(owner, A);
            assert_eq!(kind, AcquisitionKind::Pick);
            assert_eq!(pick_number, Some(1));
        }
        other => panic!("expected ResourceTaken, got: {other}"),
    }
    assert_eq!(cursor(&engine), 2);

    let history = engine.status(SCOPE).unwrap().recent_picks;
    let numbers: Vec<u32> = history.iter().map(|p| p.pick_number).collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[test]
fn scenario_pick_limit() {
    let names: Vec<String> = (1..=20).map(|n| format!("Team {n}")).collect();
    let engine = engine_with(Catalog::new(names));
    engine.start_draft(SCOPE, None, &[A, B]).unwrap();
    engine.claim(SCOPE, A, "Team 1").unwrap();
    engine.choose_group(SCOPE, A, "East").unwrap();
    engine.claim(SCOPE, B, "Team 2").unwrap();
    engine.choose_group(SCOPE, B, "West").unwrap();

    let mut next = 3;
    for round in 0..7 {
        for user in [A, B] {
            let out = engine.pick(SCOPE, user, &format!("Team {next}")).unwrap();
            assert_eq!(out.picks_made, round + 1);
            next += 1;
        }
    }

    match engine.pick(SCOPE, A, &format!("Team {next}")).unwrap_err() {
        DraftError::PickLimitReached { made, allowed } => {
            assert_eq!(made, 7);
            assert_eq!(allowed, 7);
        }
        other => panic!("expected PickLimitReached, got: {other}"),
    }

    let rosters = engine.group_rosters(SCOPE).unwrap();
    let a = rosters
        .iter()
        .flat_map(|r| &r.members)
        .find(|m| m.user_id == A)
        .unwrap();
    // One claim plus seven picks.
    assert_eq!(a.resources.len(), 8);
    assert_eq!(a.resources[0], "Team 1");
    assert_eq!(engine.status(SCOPE).unwrap().total_picks, 14);
}

#[test]
fn scenario_concurrent_take_has_one_winner() {
    let path: PathBuf =
        std::env::temp_dir().join(format!("confdraft_race_{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let path_str = path.to_str().unwrap().to_string();

    let draft_id = {
        let db = Database::open(&path_str).unwrap();
        db.write(|tx| {
            let s = session::create(tx, SCOPE, None, Utc::now())?;
            order::insert_roster(tx, s.id, &[A, B], 7)?;
            Ok(s.id)
        })
        .unwrap()
    };

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [A, B]
        .into_iter()
        .map(|user| {
            let barrier = Arc::clone(&barrier);
            let path = path_str.clone();
            thread::spawn(move || {
                let db = Database::open(&path).unwrap();
                barrier.wait();
                db.write(|tx| ledger::take_if_free(tx, draft_id, "Ohio State", user, None))
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let taken = results
        .iter()
        .filter(|r| matches!(r, Err(DraftError::ResourceTaken { .. })))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(taken, 1);

    let db = Database::open(&path_str).unwrap();
    let all = db.read(|tx| ledger::assignments(tx, draft_id)).unwrap();
    assert_eq!(all.len(), 1);

    drop(db);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path_str}{suffix}"));
    }
}

#[test]
fn concurrent_picks_by_expected_user_advance_once() {
    let path: PathBuf =
        std::env::temp_dir().join(format!("confdraft_pick_race_{}.db", std::process::id()));
    let path_str = path.to_str().unwrap().to_string();
    let remove_files = || {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{path_str}{suffix}"));
        }
    };
    remove_files();

    let open_engine = || {
        DraftEngine::new(
            Database::open(&path_str).unwrap(),
            college_catalog(),
            DraftRules::default(),
        )
    };
    let setup = open_engine();
    setup.start_draft(SCOPE, None, &[A, B]).unwrap();
    setup.claim(SCOPE, A, "Ohio State").unwrap();
    setup.choose_group(SCOPE, A, "East").unwrap();
    setup.claim(SCOPE, B, "Texas").unwrap();
    setup.choose_group(SCOPE, B, "West").unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = ["Michigan", "Wisconsin"]
        .into_iter()
        .map(|resource| {
            let engine = open_engine();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.pick(SCOPE, A, resource)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<u32> = results
        .iter()
        .filter_map(|r| r.as_ref().ok().map(|out| out.pick_number))
        .collect();
    assert_eq!(winners, vec![1]);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(DraftError::NotYourTurn { expected: B })))
            .count(),
        1
    );

    let status = setup.status(SCOPE).unwrap();
    assert_eq!(status.total_picks, 1);
    assert_eq!(status.session.turn_cursor, 1);
    assert_eq!(status.expected_user, B);

    drop(setup);
    remove_files();
}

#[test]
fn rejected_actions_leave_cursor_in_place() {
    let engine = engine_with(college_catalog());
    engine.start_draft(SCOPE, None, &[A, B]).unwrap();

    assert!(matches!(
        engine.choose_group(SCOPE, A, "East"),
        Err(DraftError::SequenceViolation(_))
    ));
    assert!(matches!(
        engine.claim(SCOPE, A, "Atlantis"),
        Err(DraftError::UnknownResource(_))
    ));
    assert!(matches!(
        engine.pick(SCOPE, A, "Iowa"),
        Err(DraftError::WrongStage { .. })
    ));
    assert!(matches!(
        engine.claim(SCOPE, B, "Iowa"),
        Err(DraftError::NotYourTurn { expected: A })
    ));
    engine.claim(SCOPE, A, "Iowa").unwrap();
    assert!(matches!(
        engine.choose_group(SCOPE, A, "   "),
        Err(DraftError::EmptyGroupName)
    ));
    assert_eq!(cursor(&engine), 0);
    assert_eq!(engine.available_resources(SCOPE).unwrap().len(), 6);
}

#[test]
fn finished_draft_rejects_actions_but_keeps_views() {
    let engine = through_initial_stage();
    engine.pick(SCOPE, A, "Michigan").unwrap();
    engine.end_draft(SCOPE).unwrap();

    assert!(matches!(
        engine.pick(SCOPE, B, "Oregon"),
        Err(DraftError::NoActiveSession)
    ));
    assert!(matches!(
        engine.available_resources(SCOPE),
        Err(DraftError::NoActiveSession)
    ));

    let east = engine.group_view(SCOPE, "east").unwrap();
    assert_eq!(east.group.as_deref(), Some("East"));
    let users: Vec<UserId> = east.members.iter().map(|m| m.user_id).collect();
    assert_eq!(users, vec![A, B]);
    assert_eq!(east.members[0].resources, vec!["Ohio State", "Michigan"]);

    let slots = engine.group_slots(SCOPE).unwrap();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[1].group.as_deref(), Some("West"));
    assert_eq!(slots[1].members, vec![C]);
}
