//! crates/flyer_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core consumes.
//! These traits form the boundary of the hexagonal architecture: storage, catalog,
//! users, blobs, notifications, price checks and PDF rendering all live behind them.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    Approval, ApprovalWorkflow, Brand, Decision, DecisionOutcome, EditHistoryEntry, Flyer,
    Page, Product, PromoImage, Role, Slot, User, VersionSnapshot,
};
use crate::render::FlyerDocument;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports
//=========================================================================================

#[async_trait]
pub trait FlyerRepository: Send + Sync {
    // --- Flyers ---
    async fn get_flyer(&self, flyer_id: Uuid) -> PortResult<Flyer>;

    async fn list_flyers(&self) -> PortResult<Vec<Flyer>>;

    async fn insert_flyer(&self, flyer: &Flyer) -> PortResult<()>;

    async fn update_flyer(&self, flyer: &Flyer) -> PortResult<()>;

    /// Hard delete; pages and slots go with it.
    async fn delete_flyer(&self, flyer_id: Uuid) -> PortResult<()>;

    /// Moves every `active` flyer whose `valid_to` is before `cutoff` to `expired`.
    async fn expire_overdue(&self, cutoff: DateTime<Utc>) -> PortResult<u64>;

    // --- Pages ---
    async fn get_page(&self, page_id: Uuid) -> PortResult<Page>;

    /// Pages of a flyer ordered by page number.
    async fn list_pages(&self, flyer_id: Uuid) -> PortResult<Vec<Page>>;

    /// Inserts the page together with its slots in one transaction.
    /// Fails with `Conflict` when the page number is taken.
    async fn insert_page(&self, page: &Page, slots: &[Slot]) -> PortResult<()>;

    async fn update_page(&self, page: &Page) -> PortResult<()>;

    async fn delete_page(&self, page_id: Uuid) -> PortResult<()>;

    // --- Slots ---
    async fn get_slot(&self, slot_id: Uuid) -> PortResult<Slot>;

    async fn list_slots(&self, page_id: Uuid) -> PortResult<Vec<Slot>>;

    async fn list_flyer_slots(&self, flyer_id: Uuid) -> PortResult<Vec<Slot>>;

    /// Writes all given slots in one transaction.
    async fn update_slots(&self, slots: &[Slot]) -> PortResult<()>;
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Deletes any existing workflow and approvals of the flyer, then inserts the new ones,
    /// atomically. Nothing to delete is not an error.
    async fn replace_workflow(
        &self,
        workflow: &ApprovalWorkflow,
        approvals: &[Approval],
    ) -> PortResult<()>;

    async fn get_workflow(&self, flyer_id: Uuid) -> PortResult<ApprovalWorkflow>;

    /// The approval of `approver_id` on `flyer_id`.
    async fn get_approval(&self, flyer_id: Uuid, approver_id: Uuid) -> PortResult<Approval>;

    async fn get_approval_by_id(&self, approval_id: Uuid) -> PortResult<Approval>;

    async fn list_approvals(&self, flyer_id: Uuid) -> PortResult<Vec<Approval>>;

    /// Applies a decision atomically with respect to every other decision on the
    /// same flyer: writes the approval if its stage is still pending, recounts the
    /// stage and stores the workflow and flyer that `Decision::apply` produces.
    /// `Conflict` when the approval was already decided or the flyer no longer
    /// awaits approval; nothing is written then.
    async fn record_decision(&self, decision: &Decision) -> PortResult<DecisionOutcome>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append_history(&self, entry: &EditHistoryEntry) -> PortResult<()>;

    async fn list_history(&self, flyer_id: Uuid) -> PortResult<Vec<EditHistoryEntry>>;

    /// Stores the payload under the next version number for the flyer.
    async fn save_snapshot(
        &self,
        flyer_id: Uuid,
        created_by: Uuid,
        payload: serde_json::Value,
    ) -> PortResult<VersionSnapshot>;
}

//=========================================================================================
// Collaborator Ports
//=========================================================================================

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Fetches a product with its brand and classification icons.
    async fn get_product(&self, product_id: Uuid) -> PortResult<Product>;

    async fn get_promo_image(&self, promo_image_id: Uuid) -> PortResult<PromoImage>;

    async fn get_brand(&self, brand_id: Uuid) -> PortResult<Brand>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn list_users_by_role(&self, role: Role) -> PortResult<Vec<User>>;
}

/// Bytes stored under an opaque key.
#[derive(Debug, Clone)]
pub struct Blob {
    pub data: Bytes,
    pub mime_type: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes, mime_type: &str) -> PortResult<()>;

    async fn get(&self, key: &str) -> PortResult<Blob>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Submitted,
    PreApproved,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient_id: Uuid,
    pub flyer_id: Uuid,
    pub flyer_name: String,
    pub message: Option<String>,
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Fire-and-forget; callers log failures and carry on.
    async fn send(&self, notification: &Notification) -> PortResult<()>;
}

/// The price pair a supplier declared for a product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeclaredPrices {
    pub recommended: Option<f64>,
    pub promo: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceCheck {
    pub found: bool,
    pub prices_match: bool,
}

#[async_trait]
pub trait PriceValidator: Send + Sync {
    /// Looks the EAN up in the external ERP and compares the declared prices.
    async fn check(&self, ean: &str, declared: DeclaredPrices) -> PortResult<PriceCheck>;
}

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    /// Produces `application/pdf` bytes for a fully resolved flyer.
    async fn render(&self, document: &FlyerDocument) -> PortResult<Bytes>;
}

//=========================================================================================
// Collaborator Bundle
//=========================================================================================

/// Everything the core services talk to, wired once at startup.
#[derive(Clone)]
pub struct Collaborators {
    pub flyers: Arc<dyn FlyerRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub audit: Arc<dyn AuditLog>,
    pub catalog: Arc<dyn CatalogService>,
    pub users: Arc<dyn UserDirectory>,
    pub blobs: Arc<dyn BlobStore>,
    pub notifier: Arc<dyn NotificationService>,
    pub renderer: Arc<dyn PdfRenderer>,
    pub prices: Option<Arc<dyn PriceValidator>>,
}
