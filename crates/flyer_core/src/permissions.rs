//! crates/flyer_core/src/permissions.rs
//!
//! Role × action capability table. Every service asks this module before acting
//! instead of branching on roles itself.

use crate::domain::{Flyer, FlyerStatus, Role, User};
use crate::error::{CoreError, CoreResult};
use crate::ports::UserDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateFlyer,
    /// Metadata edits, page and slot changes, deletion.
    EditFlyer,
    SubmitFlyer,
    ExpireFlyer,
    ViewFlyer,
    PreApprove,
    Approve,
}

/// How far a role's capability for an action reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Denied,
    /// Any flyer.
    Any,
    /// Flyers the actor owns or shares a brand with the owner of.
    Owned,
    /// Flyers that have left draft.
    Submitted,
    /// Active flyers only.
    Published,
    /// Only through the actor's own approval record.
    OwnRecord,
}

const TABLE: &[(Role, Action, Grant)] = &[
    (Role::Admin, Action::CreateFlyer, Grant::Any),
    (Role::Admin, Action::EditFlyer, Grant::Any),
    (Role::Admin, Action::SubmitFlyer, Grant::Any),
    (Role::Admin, Action::ExpireFlyer, Grant::Any),
    (Role::Admin, Action::ViewFlyer, Grant::Any),
    (Role::Supplier, Action::CreateFlyer, Grant::Any),
    (Role::Supplier, Action::EditFlyer, Grant::Owned),
    (Role::Supplier, Action::SubmitFlyer, Grant::Owned),
    (Role::Supplier, Action::ExpireFlyer, Grant::Owned),
    (Role::Supplier, Action::ViewFlyer, Grant::Owned),
    (Role::EndUser, Action::ViewFlyer, Grant::Published),
    (Role::Approver, Action::ViewFlyer, Grant::Submitted),
    (Role::Approver, Action::Approve, Grant::OwnRecord),
    (Role::PreApprover, Action::ViewFlyer, Grant::Submitted),
    (Role::PreApprover, Action::PreApprove, Grant::OwnRecord),
];

pub fn grant(role: Role, action: Action) -> Grant {
    TABLE
        .iter()
        .find(|(r, a, _)| *r == role && *a == action)
        .map(|(_, _, g)| *g)
        .unwrap_or(Grant::Denied)
}

/// Fails with `Forbidden` when the role has no grant at all for the action.
pub fn require(actor: &User, action: Action) -> CoreResult<Grant> {
    match grant(actor.role, action) {
        Grant::Denied => Err(CoreError::Forbidden(format!(
            "role {} may not {:?}",
            actor.role.as_str(),
            action
        ))),
        granted => Ok(granted),
    }
}

/// Whether the actor owns the flyer or shares a brand with its owner.
pub async fn has_flyer_access(
    users: &dyn UserDirectory,
    actor: &User,
    flyer: &Flyer,
) -> CoreResult<bool> {
    if actor.id == flyer.owner_id {
        return Ok(true);
    }
    if actor.brand_ids.is_empty() {
        return Ok(false);
    }
    let owner = users.get_user(flyer.owner_id).await?;
    Ok(actor.shares_brand_with(&owner))
}

/// Checks the actor may perform `action` on this particular flyer.
pub async fn authorize_flyer(
    users: &dyn UserDirectory,
    actor: &User,
    flyer: &Flyer,
    action: Action,
) -> CoreResult<()> {
    let allowed = match require(actor, action)? {
        Grant::Any => true,
        Grant::Owned => has_flyer_access(users, actor, flyer).await?,
        Grant::Submitted => flyer.status != FlyerStatus::Draft,
        Grant::Published => flyer.status == FlyerStatus::Active,
        // Record-scoped grants are checked against the approval row by the workflow.
        Grant::OwnRecord => true,
        Grant::Denied => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "no access to flyer {} for {:?}",
            flyer.id, action
        )))
    }
}
