//! crates/flyer_core/src/flyers.rs
//!
//! Flyer lifecycle outside the approval workflow: creation, metadata edits,
//! deletion, and role-scoped reads.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit;
use crate::completion;
use crate::domain::{EditAction, EditHistoryEntry, Flyer, FlyerStatus, User};
use crate::error::{CoreError, CoreResult};
use crate::permissions::{authorize_flyer, require, Action};
use crate::ports::Collaborators;
use crate::view::{project_flyer, FlyerView, ViewOptions};
use crate::workflow::expire_overdue;

/// Fields a supplier may set on a draft. `None` leaves the field untouched;
/// `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlyerPatch {
    pub name: Option<String>,
    pub action_reference: Option<Option<String>>,
    pub valid_from: Option<Option<DateTime<Utc>>>,
    pub valid_to: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewFlyer {
    pub name: String,
    pub action_reference: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
}

fn check_window(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> CoreResult<()> {
    if let (Some(from), Some(to)) = (from, to) {
        if to < from {
            return Err(CoreError::ValidationFailed(
                "validTo must not be before validFrom".to_string(),
            ));
        }
    }
    Ok(())
}

/// Loads a flyer the actor may edit; it must still be a draft.
pub(crate) async fn load_editable(
    ports: &Collaborators,
    actor: &User,
    flyer_id: Uuid,
) -> CoreResult<Flyer> {
    let flyer = ports.flyers.get_flyer(flyer_id).await?;
    authorize_flyer(ports.users.as_ref(), actor, &flyer, Action::EditFlyer).await?;
    if flyer.status != FlyerStatus::Draft {
        return Err(CoreError::InvalidState(format!(
            "flyer {} is {} and can no longer be edited",
            flyer.id,
            flyer.status.as_str()
        )));
    }
    Ok(flyer)
}

/// Stamps the edit, recomputes completion, persists the flyer and logs history.
pub(crate) async fn commit_edit(
    ports: &Collaborators,
    actor: &User,
    mut flyer: Flyer,
    action: EditAction,
    details: serde_json::Value,
) -> CoreResult<Flyer> {
    flyer.last_edited_at = Utc::now();
    flyer.completion_percentage = completion::measure(ports.flyers.as_ref(), &flyer).await?;
    ports.flyers.update_flyer(&flyer).await?;
    audit::record(ports.audit.as_ref(), flyer.id, actor.id, action, details).await;
    Ok(flyer)
}

#[derive(Clone)]
pub struct FlyerService {
    ports: Collaborators,
    view: ViewOptions,
}

impl FlyerService {
    pub fn new(ports: Collaborators, view: ViewOptions) -> Self {
        Self { ports, view }
    }

    pub async fn create(&self, actor: &User, input: NewFlyer) -> CoreResult<Flyer> {
        require(actor, Action::CreateFlyer)?;
        check_window(input.valid_from, input.valid_to)?;

        let mut flyer = Flyer::new_draft(actor.id, input.name, Utc::now());
        flyer.action_reference = input.action_reference;
        flyer.valid_from = input.valid_from;
        flyer.valid_to = input.valid_to;
        flyer.completion_percentage = completion::score(&flyer, 0, 0);
        self.ports.flyers.insert_flyer(&flyer).await?;

        info!(flyer_id = %flyer.id, owner_id = %actor.id, "Flyer created");
        audit::record(
            self.ports.audit.as_ref(),
            flyer.id,
            actor.id,
            EditAction::Created,
            json!({ "name": flyer.name }),
        )
        .await;
        Ok(flyer)
    }

    /// Applies a metadata patch to a draft and bumps its auto-save version.
    pub async fn update(&self, actor: &User, flyer_id: Uuid, patch: FlyerPatch) -> CoreResult<Flyer> {
        let mut flyer = load_editable(&self.ports, actor, flyer_id).await?;
        if let Some(name) = patch.name.clone() {
            flyer.name = name;
        }
        if let Some(reference) = patch.action_reference.clone() {
            flyer.action_reference = reference;
        }
        if let Some(from) = patch.valid_from {
            flyer.valid_from = from;
        }
        if let Some(to) = patch.valid_to {
            flyer.valid_to = to;
        }
        check_window(flyer.valid_from, flyer.valid_to)?;
        flyer.auto_save_version += 1;

        let details = json!({
            "name": patch.name,
            "actionReference": patch.action_reference,
            "validFrom": patch.valid_from,
            "validTo": patch.valid_to,
            "autoSaveVersion": flyer.auto_save_version,
        });
        commit_edit(&self.ports, actor, flyer, EditAction::Updated, details).await
    }

    /// Hard-deletes a draft with its pages and slots.
    pub async fn delete(&self, actor: &User, flyer_id: Uuid) -> CoreResult<()> {
        let flyer = load_editable(&self.ports, actor, flyer_id).await?;
        self.ports.flyers.delete_flyer(flyer.id).await?;
        info!(flyer_id = %flyer.id, "Flyer deleted");
        Ok(())
    }

    pub async fn get(&self, actor: &User, flyer_id: Uuid) -> CoreResult<FlyerView> {
        expire_overdue(self.ports.flyers.as_ref(), Utc::now()).await?;
        let flyer = self.ports.flyers.get_flyer(flyer_id).await?;
        authorize_flyer(self.ports.users.as_ref(), actor, &flyer, Action::ViewFlyer).await?;
        self.project(&flyer).await
    }

    /// Every flyer the actor may see, newest first.
    pub async fn list(&self, actor: &User) -> CoreResult<Vec<FlyerView>> {
        require(actor, Action::ViewFlyer)?;
        expire_overdue(self.ports.flyers.as_ref(), Utc::now()).await?;
        let mut views = Vec::new();
        for flyer in self.ports.flyers.list_flyers().await? {
            let visible =
                authorize_flyer(self.ports.users.as_ref(), actor, &flyer, Action::ViewFlyer).await;
            match visible {
                Ok(()) => views.push(self.project(&flyer).await?),
                Err(CoreError::Forbidden(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(views)
    }

    pub async fn history(&self, actor: &User, flyer_id: Uuid) -> CoreResult<Vec<EditHistoryEntry>> {
        let flyer = self.ports.flyers.get_flyer(flyer_id).await?;
        authorize_flyer(self.ports.users.as_ref(), actor, &flyer, Action::ViewFlyer).await?;
        let mut entries = self.ports.audit.list_history(flyer_id).await?;
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    /// The stored PDF of a flyer the actor may see.
    pub async fn pdf(&self, actor: &User, flyer_id: Uuid) -> CoreResult<crate::ports::Blob> {
        let flyer = self.ports.flyers.get_flyer(flyer_id).await?;
        authorize_flyer(self.ports.users.as_ref(), actor, &flyer, Action::ViewFlyer).await?;
        let stored = flyer
            .pdf
            .ok_or_else(|| CoreError::NotFound(format!("flyer {} has no PDF yet", flyer_id)))?;
        Ok(self.ports.blobs.get(&stored.key).await?)
    }

    async fn project(&self, flyer: &Flyer) -> CoreResult<FlyerView> {
        let pages = self.ports.flyers.list_pages(flyer.id).await?;
        let slots = self.ports.flyers.list_flyer_slots(flyer.id).await?;
        Ok(project_flyer(flyer, &pages, &slots, &self.view))
    }
}
