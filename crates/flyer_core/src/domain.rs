//! crates/flyer_core/src/domain.rs
//!
//! Defines the pure, core data structures for the flyer platform.
//! These structs are independent of any database or transport format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Every page holds exactly this many slots, positions `0..SLOTS_PER_PAGE`.
pub const SLOTS_PER_PAGE: usize = 8;
pub const GRID_COLUMNS: usize = 2;
pub const GRID_ROWS: usize = 4;

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Returned when a stored string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

//=========================================================================================
// Users and Roles
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Supplier,
    EndUser,
    Approver,
    PreApprover,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Supplier => "supplier",
            Role::EndUser => "end_user",
            Role::Approver => "approver",
            Role::PreApprover => "pre_approver",
        }
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "supplier" => Ok(Role::Supplier),
            "end_user" => Ok(Role::EndUser),
            "approver" => Ok(Role::Approver),
            "pre_approver" => Ok(Role::PreApprover),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

/// A platform user. Suppliers are scoped to the brands they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub brand_ids: Vec<Uuid>,
}

impl User {
    /// True when both users are suppliers of at least one common brand.
    pub fn shares_brand_with(&self, other: &User) -> bool {
        self.brand_ids.iter().any(|b| other.brand_ids.contains(b))
    }
}

//=========================================================================================
// Catalog (read-only from the core's perspective)
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brand {
    pub id: Uuid,
    pub name: String,
}

/// A small classification icon printed next to a product (energy class, certifications).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Icon {
    pub id: Uuid,
    pub name: String,
    pub image_key: Option<String>,
    pub is_energy_class: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub ean: Option<String>,
    pub description: Option<String>,
    pub brand: Option<Brand>,
    pub image_key: Option<String>,
    pub icons: Vec<Icon>,
    pub recommended_price: Option<f64>,
    pub promo_price: Option<f64>,
    /// Whether the product's category mandates an energy-class icon.
    pub requires_energy_class: bool,
}

impl Product {
    pub fn has_energy_class_icon(&self) -> bool {
        self.icons.iter().any(|icon| icon.is_energy_class)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoImage {
    pub id: Uuid,
    pub name: String,
    pub image_key: String,
    pub brand: Option<Brand>,
}

//=========================================================================================
// Flyers, Pages and Slots
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlyerStatus {
    Draft,
    PendingApproval,
    Active,
    Expired,
}

impl FlyerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlyerStatus::Draft => "draft",
            FlyerStatus::PendingApproval => "pending_approval",
            FlyerStatus::Active => "active",
            FlyerStatus::Expired => "expired",
        }
    }
}

impl FromStr for FlyerStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(FlyerStatus::Draft),
            // `pending_verification` and `approved` are the single-tier names for the same states.
            "pending_approval" | "pending_verification" => Ok(FlyerStatus::PendingApproval),
            "active" | "approved" => Ok(FlyerStatus::Active),
            "expired" => Ok(FlyerStatus::Expired),
            other => Err(ParseEnumError::new("flyer status", other)),
        }
    }
}

/// Reference to the generated PDF held in the blob store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPdf {
    pub key: String,
    pub mime_type: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flyer {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub action_reference: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub status: FlyerStatus,
    pub is_draft: bool,
    pub rejection_reason: Option<String>,
    /// Derived progress score, never authoritative.
    pub completion_percentage: u8,
    pub pdf: Option<StoredPdf>,
    pub last_edited_at: DateTime<Utc>,
    pub auto_save_version: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Flyer {
    /// A fresh, empty draft owned by `owner_id`.
    pub fn new_draft(owner_id: Uuid, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            action_reference: None,
            valid_from: None,
            valid_to: None,
            status: FlyerStatus::Draft,
            is_draft: true,
            rejection_reason: None,
            completion_percentage: 0,
            pdf: None,
            last_edited_at: now,
            auto_save_version: 0,
            published_at: None,
            created_at: now,
        }
    }

    /// Forces the flyer back into an editable draft with the given reason.
    pub fn return_to_draft(&mut self, reason: String, now: DateTime<Utc>) {
        self.status = FlyerStatus::Draft;
        self.is_draft = true;
        self.rejection_reason = Some(reason);
        self.last_edited_at = now;
    }

    pub fn publish(&mut self, now: DateTime<Utc>) {
        self.status = FlyerStatus::Active;
        self.is_draft = false;
        self.published_at = Some(now);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub flyer_id: Uuid,
    /// 1-based, unique within the flyer.
    pub page_number: u32,
    /// Only rendered on page 1.
    pub footer_promo_image_id: Option<Uuid>,
}

/// The size tag of a promo; determines how many grid cells it spans from its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromoSize {
    #[serde(rename = "single")]
    Single,
    #[serde(rename = "horizontal")]
    Horizontal,
    #[serde(rename = "square")]
    Square,
    #[serde(rename = "full_page")]
    FullPage,
    #[serde(rename = "footer")]
    Footer,
    #[serde(rename = "header_2x1")]
    Header2x1,
    #[serde(rename = "header_2x2")]
    Header2x2,
}

impl PromoSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromoSize::Single => "single",
            PromoSize::Horizontal => "horizontal",
            PromoSize::Square => "square",
            PromoSize::FullPage => "full_page",
            PromoSize::Footer => "footer",
            PromoSize::Header2x1 => "header_2x1",
            PromoSize::Header2x2 => "header_2x2",
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self, PromoSize::Header2x1 | PromoSize::Header2x2)
    }
}

impl fmt::Display for PromoSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromoSize {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(PromoSize::Single),
            "horizontal" => Ok(PromoSize::Horizontal),
            "square" => Ok(PromoSize::Square),
            "full_page" => Ok(PromoSize::FullPage),
            "footer" => Ok(PromoSize::Footer),
            "header_2x1" => Ok(PromoSize::Header2x1),
            "header_2x2" => Ok(PromoSize::Header2x2),
            other => Err(ParseEnumError::new("promo size", other)),
        }
    }
}

/// What a slot currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlotContent {
    #[default]
    Empty,
    Product {
        product_id: Uuid,
    },
    Promo {
        promo_image_id: Uuid,
        promo_size: PromoSize,
    },
}

impl SlotContent {
    pub fn is_empty(&self) -> bool {
        matches!(self, SlotContent::Empty)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SlotContent::Empty => "empty",
            SlotContent::Product { .. } => "product",
            SlotContent::Promo { .. } => "promo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub page_id: Uuid,
    /// Grid position in `0..SLOTS_PER_PAGE`, row-major over two columns.
    pub position: u8,
    pub content: SlotContent,
}

impl Slot {
    pub fn empty(page_id: Uuid, position: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            page_id,
            position,
            content: SlotContent::Empty,
        }
    }
}

//=========================================================================================
// Approval Workflow
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(ParseEnumError::new("approval status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreApprovalStatus {
    Pending,
    PreApproved,
    Rejected,
}

impl PreApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreApprovalStatus::Pending => "pending",
            PreApprovalStatus::PreApproved => "pre_approved",
            PreApprovalStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for PreApprovalStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PreApprovalStatus::Pending),
            "pre_approved" => Ok(PreApprovalStatus::PreApproved),
            "rejected" => Ok(PreApprovalStatus::Rejected),
            other => Err(ParseEnumError::new("pre-approval status", other)),
        }
    }
}

/// Which tier a decision belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionStage {
    PreApproval,
    Approval,
}

/// One-to-one with a submitted flyer; recreated on every submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    pub id: Uuid,
    pub flyer_id: Uuid,
    /// 0 for the single-tier flow, 1 when pre-approval precedes final approval.
    pub pre_approval_tiers: u8,
    pub required_approvers: u32,
    pub current_approvals: u32,
    pub is_complete: bool,
    pub required_pre_approvers: u32,
    pub current_pre_approvals: u32,
    pub is_pre_approval_complete: bool,
    pub created_at: DateTime<Utc>,
}

/// One row per (flyer, approver) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub id: Uuid,
    pub flyer_id: Uuid,
    pub approver_id: Uuid,
    pub status: ApprovalStatus,
    pub pre_approval_status: Option<PreApprovalStatus>,
    pub comment: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub pre_approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalWorkflow {
    /// Stores a fresh count of positive decisions for `stage` and its completion flag.
    pub fn record_count(&mut self, stage: DecisionStage, count: u32) {
        match stage {
            DecisionStage::PreApproval => {
                self.current_pre_approvals = count;
                self.is_pre_approval_complete = count >= self.required_pre_approvers;
            }
            DecisionStage::Approval => {
                self.current_approvals = count;
                self.is_complete = count >= self.required_approvers;
            }
        }
    }
}

/// One reviewer decision, handed to storage to be applied in a single step.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// The approval row with the new status already set.
    pub approval: Approval,
    pub stage: DecisionStage,
    /// Set for rejections; the flyer returns to draft with this reason.
    pub rejection: Option<String>,
    pub at: DateTime<Utc>,
}

impl Decision {
    /// Applies the consequences of this decision, given the number of positive
    /// decisions for its stage counted after it was written.
    pub fn apply(&self, workflow: &mut ApprovalWorkflow, flyer: &mut Flyer, count: u32) {
        match &self.rejection {
            Some(reason) => flyer.return_to_draft(reason.clone(), self.at),
            None => {
                workflow.record_count(self.stage, count);
                if self.stage == DecisionStage::Approval && workflow.is_complete {
                    flyer.publish(self.at);
                }
            }
        }
    }
}

/// Workflow and flyer as they stand once a decision was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub workflow: ApprovalWorkflow,
    pub flyer: Flyer,
}

//=========================================================================================
// Audit Trail
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    Created,
    Updated,
    PageAdded,
    PageRemoved,
    ProductPlaced,
    PromoPlaced,
    SlotCleared,
    SlotsSwapped,
    FooterChanged,
    Submitted,
    PreApproved,
    PreRejected,
    Approved,
    Rejected,
    Expired,
}

impl EditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditAction::Created => "created",
            EditAction::Updated => "updated",
            EditAction::PageAdded => "page_added",
            EditAction::PageRemoved => "page_removed",
            EditAction::ProductPlaced => "product_placed",
            EditAction::PromoPlaced => "promo_placed",
            EditAction::SlotCleared => "slot_cleared",
            EditAction::SlotsSwapped => "slots_swapped",
            EditAction::FooterChanged => "footer_changed",
            EditAction::Submitted => "submitted",
            EditAction::PreApproved => "pre_approved",
            EditAction::PreRejected => "pre_rejected",
            EditAction::Approved => "approved",
            EditAction::Rejected => "rejected",
            EditAction::Expired => "expired",
        }
    }
}

impl FromStr for EditAction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s {
            "created" => EditAction::Created,
            "updated" => EditAction::Updated,
            "page_added" => EditAction::PageAdded,
            "page_removed" => EditAction::PageRemoved,
            "product_placed" => EditAction::ProductPlaced,
            "promo_placed" => EditAction::PromoPlaced,
            "slot_cleared" => EditAction::SlotCleared,
            "slots_swapped" => EditAction::SlotsSwapped,
            "footer_changed" => EditAction::FooterChanged,
            "submitted" => EditAction::Submitted,
            "pre_approved" => EditAction::PreApproved,
            "pre_rejected" => EditAction::PreRejected,
            "approved" => EditAction::Approved,
            "rejected" => EditAction::Rejected,
            "expired" => EditAction::Expired,
            other => return Err(ParseEnumError::new("edit action", other)),
        };
        Ok(action)
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditHistoryEntry {
    pub id: Uuid,
    pub flyer_id: Uuid,
    pub user_id: Uuid,
    pub action: EditAction,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Append-only structural copy of a flyer, numbered per flyer from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub id: Uuid,
    pub flyer_id: Uuid,
    pub version: u32,
    pub payload: serde_json::Value,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}
