//! crates/flyer_core/src/memory.rs
//!
//! An in-memory implementation of every port, used by tests of this crate and,
//! through the `testing` feature, by the service crate's tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{
    Approval, ApprovalStatus, ApprovalWorkflow, Brand, Decision, DecisionOutcome, DecisionStage,
    EditHistoryEntry, Flyer, FlyerStatus, Page, PreApprovalStatus, Product, PromoImage, Role,
    Slot, User, VersionSnapshot,
};
use crate::ports::{
    AuditLog, Blob, BlobStore, CatalogService, Collaborators, FlyerRepository, Notification,
    NotificationService, PdfRenderer, PortError, PortResult, UserDirectory, WorkflowRepository,
};
use crate::render::FlyerDocument;

#[derive(Default)]
struct Tables {
    flyers: HashMap<Uuid, Flyer>,
    pages: HashMap<Uuid, Page>,
    slots: HashMap<Uuid, Slot>,
    workflows: HashMap<Uuid, ApprovalWorkflow>,
    approvals: Vec<Approval>,
    history: Vec<EditHistoryEntry>,
    snapshots: Vec<VersionSnapshot>,
    users: HashMap<Uuid, User>,
    brands: HashMap<Uuid, Brand>,
    products: HashMap<Uuid, Product>,
    promos: HashMap<Uuid, PromoImage>,
    blobs: HashMap<String, Blob>,
    notifications: Vec<Notification>,
}

/// Shared-state store behind all ports.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    fail_notifications: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wires this store into every port, with the given renderer.
    pub fn collaborators(self: &Arc<Self>, renderer: Arc<dyn PdfRenderer>) -> Collaborators {
        Collaborators {
            flyers: self.clone(),
            workflows: self.clone(),
            audit: self.clone(),
            catalog: self.clone(),
            users: self.clone(),
            blobs: self.clone(),
            notifier: self.clone(),
            renderer,
            prices: None,
        }
    }

    // --- Seeding ---

    pub fn add_user(&self, user: User) {
        self.tables().users.insert(user.id, user);
    }

    /// Registers a fresh user with the given role and brands and returns it.
    pub fn seed_user(&self, role: Role, brand_ids: Vec<Uuid>) -> User {
        let id = Uuid::new_v4();
        let user = User {
            id,
            email: format!("{}@example.com", id.simple()),
            name: format!("{} {}", role.as_str(), id.simple()),
            role,
            brand_ids,
        };
        self.add_user(user.clone());
        user
    }

    pub fn add_brand(&self, brand: Brand) {
        self.tables().brands.insert(brand.id, brand);
    }

    pub fn add_product(&self, product: Product) {
        self.tables().products.insert(product.id, product);
    }

    pub fn add_promo_image(&self, promo: PromoImage) {
        self.tables().promos.insert(promo.id, promo);
    }

    pub fn add_blob(&self, key: &str, data: &'static [u8], mime_type: &str) {
        self.tables().blobs.insert(
            key.to_string(),
            Blob {
                data: Bytes::from_static(data),
                mime_type: mime_type.to_string(),
            },
        );
    }

    /// Makes every following notification send fail.
    pub fn fail_notifications(&self, fail: bool) {
        self.fail_notifications.store(fail, Ordering::SeqCst);
    }

    // --- Inspection ---

    pub fn notifications(&self) -> Vec<Notification> {
        self.tables().notifications.clone()
    }

    pub fn snapshots(&self, flyer_id: Uuid) -> Vec<VersionSnapshot> {
        self.tables()
            .snapshots
            .iter()
            .filter(|s| s.flyer_id == flyer_id)
            .cloned()
            .collect()
    }

    pub fn has_blob(&self, key: &str) -> bool {
        self.tables().blobs.contains_key(key)
    }

    pub fn has_workflow(&self, flyer_id: Uuid) -> bool {
        self.tables().workflows.contains_key(&flyer_id)
    }
}

fn missing(what: &str, id: impl std::fmt::Display) -> PortError {
    PortError::NotFound(format!("{} {} not found", what, id))
}

//=========================================================================================
// Storage Ports
//=========================================================================================

#[async_trait]
impl FlyerRepository for InMemoryStore {
    async fn get_flyer(&self, flyer_id: Uuid) -> PortResult<Flyer> {
        self.tables()
            .flyers
            .get(&flyer_id)
            .cloned()
            .ok_or_else(|| missing("Flyer", flyer_id))
    }

    async fn list_flyers(&self) -> PortResult<Vec<Flyer>> {
        let mut flyers: Vec<Flyer> = self.tables().flyers.values().cloned().collect();
        flyers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(flyers)
    }

    async fn insert_flyer(&self, flyer: &Flyer) -> PortResult<()> {
        let mut tables = self.tables();
        if tables.flyers.contains_key(&flyer.id) {
            return Err(PortError::Conflict(format!("Flyer {} exists", flyer.id)));
        }
        tables.flyers.insert(flyer.id, flyer.clone());
        Ok(())
    }

    async fn update_flyer(&self, flyer: &Flyer) -> PortResult<()> {
        let mut tables = self.tables();
        match tables.flyers.get_mut(&flyer.id) {
            Some(existing) => {
                *existing = flyer.clone();
                Ok(())
            }
            None => Err(missing("Flyer", flyer.id)),
        }
    }

    async fn delete_flyer(&self, flyer_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables();
        if tables.flyers.remove(&flyer_id).is_none() {
            return Err(missing("Flyer", flyer_id));
        }
        let page_ids: Vec<Uuid> = tables
            .pages
            .values()
            .filter(|p| p.flyer_id == flyer_id)
            .map(|p| p.id)
            .collect();
        tables.pages.retain(|_, p| p.flyer_id != flyer_id);
        tables.slots.retain(|_, s| !page_ids.contains(&s.page_id));
        tables.workflows.remove(&flyer_id);
        tables.approvals.retain(|a| a.flyer_id != flyer_id);
        Ok(())
    }

    async fn expire_overdue(&self, cutoff: DateTime<Utc>) -> PortResult<u64> {
        let mut expired = 0;
        for flyer in self.tables().flyers.values_mut() {
            let overdue = flyer.valid_to.map(|to| to < cutoff).unwrap_or(false);
            if flyer.status == FlyerStatus::Active && overdue {
                flyer.status = FlyerStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn get_page(&self, page_id: Uuid) -> PortResult<Page> {
        self.tables()
            .pages
            .get(&page_id)
            .cloned()
            .ok_or_else(|| missing("Page", page_id))
    }

    async fn list_pages(&self, flyer_id: Uuid) -> PortResult<Vec<Page>> {
        let mut pages: Vec<Page> = self
            .tables()
            .pages
            .values()
            .filter(|p| p.flyer_id == flyer_id)
            .cloned()
            .collect();
        pages.sort_by_key(|p| p.page_number);
        Ok(pages)
    }

    async fn insert_page(&self, page: &Page, slots: &[Slot]) -> PortResult<()> {
        let mut tables = self.tables();
        let taken = tables
            .pages
            .values()
            .any(|p| p.flyer_id == page.flyer_id && p.page_number == page.page_number);
        if taken {
            return Err(PortError::Conflict(format!(
                "Page {} already exists",
                page.page_number
            )));
        }
        tables.pages.insert(page.id, page.clone());
        for slot in slots {
            tables.slots.insert(slot.id, slot.clone());
        }
        Ok(())
    }

    async fn update_page(&self, page: &Page) -> PortResult<()> {
        let mut tables = self.tables();
        match tables.pages.get_mut(&page.id) {
            Some(existing) => {
                *existing = page.clone();
                Ok(())
            }
            None => Err(missing("Page", page.id)),
        }
    }

    async fn delete_page(&self, page_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables();
        if tables.pages.remove(&page_id).is_none() {
            return Err(missing("Page", page_id));
        }
        tables.slots.retain(|_, s| s.page_id != page_id);
        Ok(())
    }

    async fn get_slot(&self, slot_id: Uuid) -> PortResult<Slot> {
        self.tables()
            .slots
            .get(&slot_id)
            .cloned()
            .ok_or_else(|| missing("Slot", slot_id))
    }

    async fn list_slots(&self, page_id: Uuid) -> PortResult<Vec<Slot>> {
        let mut slots: Vec<Slot> = self
            .tables()
            .slots
            .values()
            .filter(|s| s.page_id == page_id)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.position);
        Ok(slots)
    }

    async fn list_flyer_slots(&self, flyer_id: Uuid) -> PortResult<Vec<Slot>> {
        let tables = self.tables();
        let mut slots: Vec<Slot> = tables
            .slots
            .values()
            .filter(|s| {
                tables
                    .pages
                    .get(&s.page_id)
                    .map(|p| p.flyer_id == flyer_id)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.page_id, s.position));
        Ok(slots)
    }

    async fn update_slots(&self, slots: &[Slot]) -> PortResult<()> {
        let mut tables = self.tables();
        if let Some(unknown) = slots.iter().find(|s| !tables.slots.contains_key(&s.id)) {
            return Err(missing("Slot", unknown.id));
        }
        for slot in slots {
            tables.slots.insert(slot.id, slot.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryStore {
    async fn replace_workflow(
        &self,
        workflow: &ApprovalWorkflow,
        approvals: &[Approval],
    ) -> PortResult<()> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = approvals.iter().find(|a| !seen.insert(a.approver_id)) {
            return Err(PortError::Conflict(format!(
                "Approval for approver {} exists",
                duplicate.approver_id
            )));
        }

        let mut tables = self.tables();
        tables.approvals.retain(|a| a.flyer_id != workflow.flyer_id);
        tables.approvals.extend(approvals.iter().cloned());
        tables.workflows.insert(workflow.flyer_id, workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, flyer_id: Uuid) -> PortResult<ApprovalWorkflow> {
        self.tables()
            .workflows
            .get(&flyer_id)
            .cloned()
            .ok_or_else(|| missing("Workflow for flyer", flyer_id))
    }

    async fn get_approval(&self, flyer_id: Uuid, approver_id: Uuid) -> PortResult<Approval> {
        self.tables()
            .approvals
            .iter()
            .find(|a| a.flyer_id == flyer_id && a.approver_id == approver_id)
            .cloned()
            .ok_or_else(|| missing("Approval of approver", approver_id))
    }

    async fn get_approval_by_id(&self, approval_id: Uuid) -> PortResult<Approval> {
        self.tables()
            .approvals
            .iter()
            .find(|a| a.id == approval_id)
            .cloned()
            .ok_or_else(|| missing("Approval", approval_id))
    }

    async fn list_approvals(&self, flyer_id: Uuid) -> PortResult<Vec<Approval>> {
        Ok(self
            .tables()
            .approvals
            .iter()
            .filter(|a| a.flyer_id == flyer_id)
            .cloned()
            .collect())
    }

    async fn record_decision(&self, decision: &Decision) -> PortResult<DecisionOutcome> {
        let approval = &decision.approval;
        let mut guard = self.tables();
        let tables = &mut *guard;

        let mut workflow = tables
            .workflows
            .get(&approval.flyer_id)
            .cloned()
            .ok_or_else(|| missing("Workflow for flyer", approval.flyer_id))?;
        let mut flyer = tables
            .flyers
            .get(&approval.flyer_id)
            .cloned()
            .ok_or_else(|| missing("Flyer", approval.flyer_id))?;
        if flyer.status != FlyerStatus::PendingApproval {
            return Err(PortError::Conflict(format!(
                "Flyer {} is not awaiting approval",
                flyer.id
            )));
        }

        let existing = tables
            .approvals
            .iter_mut()
            .find(|a| a.id == approval.id)
            .ok_or_else(|| missing("Approval", approval.id))?;
        let still_pending = match decision.stage {
            DecisionStage::Approval => existing.status == ApprovalStatus::Pending,
            DecisionStage::PreApproval => {
                existing.pre_approval_status == Some(PreApprovalStatus::Pending)
            }
        };
        if !still_pending {
            return Err(PortError::Conflict(format!(
                "Approval {} was already decided",
                approval.id
            )));
        }
        *existing = approval.clone();

        let count = tables
            .approvals
            .iter()
            .filter(|a| a.flyer_id == approval.flyer_id)
            .filter(|a| match decision.stage {
                DecisionStage::Approval => a.status == ApprovalStatus::Approved,
                DecisionStage::PreApproval => {
                    a.pre_approval_status == Some(PreApprovalStatus::PreApproved)
                }
            })
            .count() as u32;
        decision.apply(&mut workflow, &mut flyer, count);

        tables.workflows.insert(workflow.flyer_id, workflow.clone());
        tables.flyers.insert(flyer.id, flyer.clone());
        Ok(DecisionOutcome { workflow, flyer })
    }
}

#[async_trait]
impl AuditLog for InMemoryStore {
    async fn append_history(&self, entry: &EditHistoryEntry) -> PortResult<()> {
        self.tables().history.push(entry.clone());
        Ok(())
    }

    async fn list_history(&self, flyer_id: Uuid) -> PortResult<Vec<EditHistoryEntry>> {
        Ok(self
            .tables()
            .history
            .iter()
            .filter(|e| e.flyer_id == flyer_id)
            .cloned()
            .collect())
    }

    async fn save_snapshot(
        &self,
        flyer_id: Uuid,
        created_by: Uuid,
        payload: serde_json::Value,
    ) -> PortResult<VersionSnapshot> {
        let mut tables = self.tables();
        let version = tables
            .snapshots
            .iter()
            .filter(|s| s.flyer_id == flyer_id)
            .map(|s| s.version)
            .max()
            .unwrap_or(0)
            + 1;
        let snapshot = VersionSnapshot {
            id: Uuid::new_v4(),
            flyer_id,
            version,
            payload,
            created_by,
            created_at: Utc::now(),
        };
        tables.snapshots.push(snapshot.clone());
        Ok(snapshot)
    }
}

//=========================================================================================
// Collaborator Ports
//=========================================================================================

#[async_trait]
impl CatalogService for InMemoryStore {
    async fn get_product(&self, product_id: Uuid) -> PortResult<Product> {
        self.tables()
            .products
            .get(&product_id)
            .cloned()
            .ok_or_else(|| missing("Product", product_id))
    }

    async fn get_promo_image(&self, promo_image_id: Uuid) -> PortResult<PromoImage> {
        self.tables()
            .promos
            .get(&promo_image_id)
            .cloned()
            .ok_or_else(|| missing("Promo image", promo_image_id))
    }

    async fn get_brand(&self, brand_id: Uuid) -> PortResult<Brand> {
        self.tables()
            .brands
            .get(&brand_id)
            .cloned()
            .ok_or_else(|| missing("Brand", brand_id))
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.tables()
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| missing("User", user_id))
    }

    async fn list_users_by_role(&self, role: Role) -> PortResult<Vec<User>> {
        let mut users: Vec<User> = self
            .tables()
            .users
            .values()
            .filter(|u| u.role == role)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }
}

#[async_trait]
impl BlobStore for InMemoryStore {
    async fn put(&self, key: &str, data: Bytes, mime_type: &str) -> PortResult<()> {
        self.tables().blobs.insert(
            key.to_string(),
            Blob {
                data,
                mime_type: mime_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> PortResult<Blob> {
        self.tables()
            .blobs
            .get(key)
            .cloned()
            .ok_or_else(|| missing("Blob", key))
    }
}

#[async_trait]
impl NotificationService for InMemoryStore {
    async fn send(&self, notification: &Notification) -> PortResult<()> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("mail relay unavailable".to_string()));
        }
        self.tables().notifications.push(notification.clone());
        Ok(())
    }
}

/// Renderer that emits a fixed PDF header, or fails on demand.
#[derive(Default)]
pub struct StubRenderer {
    pub fail: bool,
}

#[async_trait]
impl PdfRenderer for StubRenderer {
    async fn render(&self, document: &FlyerDocument) -> PortResult<Bytes> {
        if self.fail {
            return Err(PortError::Unexpected("renderer crashed".to_string()));
        }
        Ok(Bytes::from(format!(
            "%PDF-1.3 stub {} pages",
            document.pages.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow(flyer_id: Uuid) -> ApprovalWorkflow {
        ApprovalWorkflow {
            id: Uuid::new_v4(),
            flyer_id,
            pre_approval_tiers: 0,
            required_approvers: 1,
            current_approvals: 0,
            is_complete: false,
            required_pre_approvers: 1,
            current_pre_approvals: 0,
            is_pre_approval_complete: true,
            created_at: Utc::now(),
        }
    }

    fn pending(flyer_id: Uuid, approver_id: Uuid) -> Approval {
        Approval {
            id: Uuid::new_v4(),
            flyer_id,
            approver_id,
            status: ApprovalStatus::Pending,
            pre_approval_status: None,
            comment: None,
            decided_at: None,
            pre_approved_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn conflicting_replacement_keeps_the_previous_round() {
        let store = InMemoryStore::new();
        let flyer_id = Uuid::new_v4();
        let first = workflow(flyer_id);
        let approver = Uuid::new_v4();
        store
            .replace_workflow(&first, &[pending(flyer_id, approver)])
            .await
            .unwrap();

        let twice = Uuid::new_v4();
        let err = store
            .replace_workflow(
                &workflow(flyer_id),
                &[pending(flyer_id, twice), pending(flyer_id, twice)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));

        assert_eq!(store.get_workflow(flyer_id).await.unwrap().id, first.id);
        let approvals = store.list_approvals(flyer_id).await.unwrap();
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].approver_id, approver);
    }
}
