// DraftEngine: the entry point a command surface drives.
//
// Each public method is one transaction. Actions go through `Database::write`
// so the turn check, the availability check, the insert and the cursor move
// all happen under one write lock; views go through `Database::read`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::error::DraftError;
use super::order;
use super::session::{self, DraftSession};
use super::stage::{self, ClaimOutcome, GroupOutcome, PickOutcome};
use super::views::{self, DraftStatus, GroupRoster, GroupSlots, ResourceOwnership};
use super::{cursor, DraftId, ScopeId, UserId};
use crate::catalog::Catalog;
use crate::config::DraftRules;
use crate::db::Database;

/// Result of starting a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartOutcome {
    pub session: DraftSession,
    pub first_user: UserId,
    /// The previously active draft in this scope, if one was superseded.
    pub superseded: Option<DraftId>,
}

pub struct DraftEngine {
    db: Database,
    catalog: Catalog,
    rules: DraftRules,
}

/// Log a rejected action at a level matching its severity, then hand the
/// error back.
fn report(action: &str, scope_id: ScopeId, user_id: Option<UserId>, err: DraftError) -> DraftError {
    if err.is_fatal() {
        error!(action, scope_id, ?user_id, code = err.code(), "draft action failed: {err}");
    } else {
        debug!(action, scope_id, ?user_id, code = err.code(), "draft action rejected: {err}");
    }
    err
}

impl DraftEngine {
    pub fn new(db: Database, catalog: Catalog, rules: DraftRules) -> Self {
        DraftEngine { db, catalog, rules }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn rules(&self) -> &DraftRules {
        &self.rules
    }

    // ------------------------------------------------------------------
    // Administrative actions
    // ------------------------------------------------------------------

    /// Start a draft for `roster` (in turn order), finishing any draft still
    /// active in the scope.
    pub fn start_draft(
        &self,
        scope_id: ScopeId,
        channel_id: Option<i64>,
        roster: &[UserId],
    ) -> Result<StartOutcome, DraftError> {
        let result = self.db.write(|tx| {
            order::validate_roster(roster, self.rules.min_participants)?;
            let now = Utc::now();
            let superseded = match session::find_active(tx, scope_id)? {
                Some(previous) => Some(session::finish(tx, &previous, now)?.id),
                None => None,
            };
            let session = session::create(tx, scope_id, channel_id, now)?;
            order::insert_roster(tx, session.id, roster, self.rules.default_pick_limit)?;
            let first = cursor::expected(tx, &session)?;
            Ok(StartOutcome {
                session,
                first_user: first.user_id,
                superseded,
            })
        });

        match result {
            Ok(outcome) => {
                if let Some(old) = outcome.superseded {
                    warn!(scope_id, old_draft = old, "superseding active draft");
                }
                info!(
                    scope_id,
                    draft_id = outcome.session.id,
                    participants = roster.len(),
                    first_user = outcome.first_user,
                    "draft started"
                );
                Ok(outcome)
            }
            Err(e) => Err(report("start_draft", scope_id, None, e)),
        }
    }

    /// Finish the scope's active draft.
    pub fn end_draft(&self, scope_id: ScopeId) -> Result<DraftSession, DraftError> {
        let result = self.db.write(|tx| {
            let active = session::require_active(tx, scope_id)?;
            session::finish(tx, &active, Utc::now())
        });
        match result {
            Ok(ended) => {
                info!(scope_id, draft_id = ended.id, "draft ended");
                Ok(ended)
            }
            Err(e) => Err(report("end_draft", scope_id, None, e)),
        }
    }

    // ------------------------------------------------------------------
    // Participant actions
    // ------------------------------------------------------------------

    pub fn claim(
        &self,
        scope_id: ScopeId,
        user_id: UserId,
        resource: &str,
    ) -> Result<ClaimOutcome, DraftError> {
        match self
            .db
            .write(|tx| stage::claim(tx, &self.catalog, scope_id, user_id, resource))
        {
            Ok(out) => {
                info!(scope_id, draft_id = out.draft_id, user_id, resource = %out.resource, "resource claimed");
                Ok(out)
            }
            Err(e) => Err(report("claim", scope_id, Some(user_id), e)),
        }
    }

    pub fn choose_group(
        &self,
        scope_id: ScopeId,
        user_id: UserId,
        group: &str,
    ) -> Result<GroupOutcome, DraftError> {
        match self
            .db
            .write(|tx| stage::choose_group(tx, &self.rules, scope_id, user_id, group))
        {
            Ok(out) => {
                info!(
                    scope_id,
                    draft_id = out.draft_id,
                    user_id,
                    group = %out.group,
                    members = out.members,
                    next_user = out.next_user,
                    "group chosen"
                );
                if out.stage_changed {
                    info!(scope_id, draft_id = out.draft_id, "initial stage complete, main stage begins");
                }
                Ok(out)
            }
            Err(e) => Err(report("choose_group", scope_id, Some(user_id), e)),
        }
    }

    pub fn pick(
        &self,
        scope_id: ScopeId,
        user_id: UserId,
        resource: &str,
    ) -> Result<PickOutcome, DraftError> {
        match self
            .db
            .write(|tx| stage::pick(tx, &self.catalog, scope_id, user_id, resource))
        {
            Ok(out) => {
                info!(
                    scope_id,
                    draft_id = out.draft_id,
                    user_id,
                    pick_number = out.pick_number,
                    resource = %out.resource,
                    next_user = out.next_user,
                    "pick recorded"
                );
                Ok(out)
            }
            Err(e) => Err(report("pick", scope_id, Some(user_id), e)),
        }
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub fn available_resources(&self, scope_id: ScopeId) -> Result<Vec<String>, DraftError> {
        self.db
            .read(|tx| views::available_resources(tx, &self.catalog, scope_id))
            .map_err(|e| report("available_resources", scope_id, None, e))
    }

    pub fn status(&self, scope_id: ScopeId) -> Result<DraftStatus, DraftError> {
        self.db
            .read(|tx| views::status(tx, scope_id, self.rules.status_pick_window))
            .map_err(|e| report("status", scope_id, None, e))
    }

    pub fn group_rosters(&self, scope_id: ScopeId) -> Result<Vec<GroupRoster>, DraftError> {
        self.db
            .read(|tx| views::group_rosters(tx, scope_id))
            .map_err(|e| report("group_rosters", scope_id, None, e))
    }

    pub fn group_view(&self, scope_id: ScopeId, group: &str) -> Result<GroupRoster, DraftError> {
        self.db
            .read(|tx| views::group_view(tx, scope_id, group))
            .map_err(|e| report("group_view", scope_id, None, e))
    }

    pub fn group_slots(&self, scope_id: ScopeId) -> Result<Vec<GroupSlots>, DraftError> {
        self.db
            .read(|tx| views::group_slots(tx, scope_id, self.rules.group_capacity))
            .map_err(|e| report("group_slots", scope_id, None, e))
    }

    pub fn lookup(&self, scope_id: ScopeId, resource: &str) -> Result<ResourceOwnership, DraftError> {
        self.db
            .read(|tx| views::lookup(tx, &self.catalog, scope_id, resource))
            .map_err(|e| report("lookup", scope_id, None, e))
    }
}
