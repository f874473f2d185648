// Draft engine: session lifecycle, turn order, resource ledger, groups, and
// the stage state machine that ties them together.

pub mod cursor;
pub mod engine;
pub mod error;
pub mod groups;
pub mod ledger;
pub mod order;
pub mod session;
pub mod stage;
pub mod views;

pub use engine::DraftEngine;
pub use error::DraftError;

/// Identifier of the community a draft runs in. At most one active draft
/// exists per scope.
pub type ScopeId = i64;

/// Identifier of a participant (a chat user id).
pub type UserId = i64;

/// Row id of a draft session.
pub type DraftId = i64;
