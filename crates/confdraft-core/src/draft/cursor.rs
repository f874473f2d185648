// Turn cursor: whose action is currently valid.

use rusqlite::{params, Connection};

use super::error::DraftError;
use super::order::{self, Participant};
use super::session::DraftSession;

/// The participant the cursor points at.
pub fn expected(conn: &Connection, session: &DraftSession) -> Result<Participant, DraftError> {
    let size = order::roster_size(conn, session.id)?;
    if size == 0 {
        return Err(DraftError::NoParticipants);
    }
    if session.turn_cursor >= size {
        return Err(DraftError::Misconfiguration(format!(
            "turn cursor {} is outside a roster of {size} in draft {}",
            session.turn_cursor, session.id
        )));
    }
    order::participant_at(conn, session.id, session.turn_cursor)?.ok_or_else(|| {
        DraftError::Misconfiguration(format!(
            "no participant holds pick order {} in draft {}",
            session.turn_cursor, session.id
        ))
    })
}

/// Move the cursor to the next participant, wrapping at the end of the
/// roster. The write is conditional on the cursor still holding the value
/// this session was read with.
pub fn advance(conn: &Connection, session: &mut DraftSession) -> Result<u32, DraftError> {
    let size = order::roster_size(conn, session.id)?;
    if size == 0 {
        return Err(DraftError::NoParticipants);
    }
    let next = (session.turn_cursor + 1) % size;
    store(conn, session, next)?;
    Ok(next)
}

/// Put the cursor back on the first participant.
pub fn reset(conn: &Connection, session: &mut DraftSession) -> Result<(), DraftError> {
    store(conn, session, 0)
}

fn store(conn: &Connection, session: &mut DraftSession, next: u32) -> Result<(), DraftError> {
    let changed = conn.execute(
        "UPDATE drafts SET turn_cursor = ?1 WHERE id = ?2 AND turn_cursor = ?3",
        params![next, session.id, session.turn_cursor],
    )?;
    if changed != 1 {
        return Err(DraftError::Misconfiguration(format!(
            "turn cursor of draft {} moved from {} outside the action transaction",
            session.id, session.turn_cursor
        )));
    }
    session.turn_cursor = next;
    Ok(())
}
