//! Service-layer authorization.
//!
//! Checked before any read or write reaches session, alert, or evidence
//! components. Scope is the set of children a caller may see.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{MonitorError, MonitorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Guardian,
    FamilyAdmin,
    Reviewer,
    SystemAdmin,
    /// Upstream event collector; may only ingest
    Collector,
    /// External scheduler; may only run maintenance
    Scheduler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Ingest,
    Read,
    /// Acknowledge, investigate, resolve, dismiss
    Triage,
    /// Escalate, reassess, reopen, reset participant risk
    Review,
    ExportEvidence,
    LegalHold,
    ReadAudit,
    Maintain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerContext {
    pub actor: String,
    pub role: Role,
    /// Children the caller may access; ignored for unrestricted roles
    #[serde(default)]
    pub child_scope: Vec<Uuid>,
}

impl CallerContext {
    pub fn new(actor: impl Into<String>, role: Role, child_scope: Vec<Uuid>) -> Self {
        Self {
            actor: actor.into(),
            role,
            child_scope,
        }
    }

    /// Internal caller used by automated paths
    pub fn system() -> Self {
        Self::new(crate::logic::alert::SYSTEM_ACTOR, Role::SystemAdmin, vec![])
    }

    fn in_scope(&self, child_id: Option<Uuid>) -> bool {
        match self.role {
            Role::Reviewer | Role::SystemAdmin => true,
            Role::Guardian | Role::FamilyAdmin => child_id.map_or(false, |c| self.child_scope.contains(&c)),
            Role::Collector | Role::Scheduler => false,
        }
    }
}

/// Decide whether `caller` may perform `action` on data about `child_id`
pub fn authorize(caller: &CallerContext, action: Action, child_id: Option<Uuid>) -> MonitorResult<()> {
    use Role::*;

    let allowed = match action {
        Action::Ingest => matches!(caller.role, Collector | SystemAdmin),
        Action::Maintain => matches!(caller.role, Scheduler | SystemAdmin),
        Action::ReadAudit => matches!(caller.role, Reviewer | SystemAdmin),
        Action::Read | Action::Triage | Action::ExportEvidence => caller.in_scope(child_id),
        Action::Review => {
            matches!(caller.role, Reviewer | SystemAdmin) || (caller.role == FamilyAdmin && caller.in_scope(child_id))
        }
        Action::LegalHold => matches!(caller.role, Reviewer | SystemAdmin),
    };

    if allowed {
        Ok(())
    } else {
        log::debug!("Denied {} for {} ({})", action, caller.actor, caller.role);
        Err(MonitorError::Forbidden(format!("{} may not {}", caller.role, action)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guardian_limited_to_own_children() {
        let child = Uuid::new_v4();
        let guardian = CallerContext::new("g1", Role::Guardian, vec![child]);

        assert!(authorize(&guardian, Action::Read, Some(child)).is_ok());
        assert!(authorize(&guardian, Action::Triage, Some(child)).is_ok());
        assert!(authorize(&guardian, Action::Read, Some(Uuid::new_v4())).is_err());
        assert!(authorize(&guardian, Action::Review, Some(child)).is_err());
        assert!(authorize(&guardian, Action::Ingest, None).is_err());
    }

    #[test]
    fn test_family_admin_reviews_in_scope_only() {
        let child = Uuid::new_v4();
        let admin = CallerContext::new("fa", Role::FamilyAdmin, vec![child]);

        assert!(authorize(&admin, Action::Review, Some(child)).is_ok());
        assert!(authorize(&admin, Action::Review, Some(Uuid::new_v4())).is_err());
        assert!(authorize(&admin, Action::LegalHold, Some(child)).is_err());
    }

    #[test]
    fn test_reviewer_is_unrestricted_but_cannot_ingest() {
        let reviewer = CallerContext::new("r1", Role::Reviewer, vec![]);
        assert!(authorize(&reviewer, Action::Read, Some(Uuid::new_v4())).is_ok());
        assert!(authorize(&reviewer, Action::LegalHold, None).is_ok());
        assert!(authorize(&reviewer, Action::ReadAudit, None).is_ok());
        assert!(authorize(&reviewer, Action::Ingest, None).is_err());
        assert!(authorize(&reviewer, Action::Maintain, None).is_err());
    }

    #[test]
    fn test_machine_roles_are_narrow() {
        let collector = CallerContext::new("c1", Role::Collector, vec![]);
        let scheduler = CallerContext::new("s1", Role::Scheduler, vec![]);

        assert!(authorize(&collector, Action::Ingest, None).is_ok());
        assert!(authorize(&collector, Action::Read, Some(Uuid::new_v4())).is_err());
        assert!(authorize(&scheduler, Action::Maintain, None).is_ok());
        assert!(matches!(
            authorize(&scheduler, Action::Read, None),
            Err(MonitorError::Forbidden(_))
        ));
    }
}
