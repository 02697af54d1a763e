//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! storage, catalog and user-directory ports from the `flyer_core` crate. It handles
//! all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flyer_core::domain::{
    Approval, ApprovalStatus, ApprovalWorkflow, Brand, Decision, DecisionOutcome, DecisionStage,
    EditHistoryEntry, Flyer, FlyerStatus, Icon, Page, PreApprovalStatus, Product, PromoImage,
    PromoSize, Role, Slot, SlotContent, StoredPdf, User, VersionSnapshot,
};
use flyer_core::ports::{
    AuditLog, CatalogService, FlyerRepository, PortError, PortResult, UserDirectory,
    WorkflowRepository,
};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every storage-backed port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or(e: sqlx::Error, what: &str, id: impl std::fmt::Display) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", what, id)),
        _ => unexpected(e),
    }
}

/// Maps unique-constraint violations to `Conflict`.
fn conflict_or(e: sqlx::Error, what: impl Into<String>) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => PortError::Conflict(what.into()),
        _ => unexpected(e),
    }
}

fn parse_column<T>(raw: &str) -> PortResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    T::from_str(raw).map_err(|e| PortError::Unexpected(e.to_string()))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const FLYER_COLUMNS: &str = "id, owner_id, name, action_reference, valid_from, valid_to, status, \
     is_draft, rejection_reason, completion_percentage, pdf_key, pdf_mime_type, pdf_generated_at, \
     last_edited_at, auto_save_version, published_at, created_at";

const FLYER_UPDATE: &str = "UPDATE flyers SET owner_id = $2, name = $3, action_reference = $4, \
     valid_from = $5, valid_to = $6, status = $7, is_draft = $8, rejection_reason = $9, \
     completion_percentage = $10, pdf_key = $11, pdf_mime_type = $12, pdf_generated_at = $13, \
     last_edited_at = $14, auto_save_version = $15, published_at = $16, created_at = $17 \
     WHERE id = $1";

#[derive(FromRow)]
struct FlyerRecord {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    action_reference: Option<String>,
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
    status: String,
    is_draft: bool,
    rejection_reason: Option<String>,
    completion_percentage: i16,
    pdf_key: Option<String>,
    pdf_mime_type: Option<String>,
    pdf_generated_at: Option<DateTime<Utc>>,
    last_edited_at: DateTime<Utc>,
    auto_save_version: i64,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}
impl FlyerRecord {
    fn to_domain(self) -> PortResult<Flyer> {
        let pdf = match (self.pdf_key, self.pdf_mime_type, self.pdf_generated_at) {
            (Some(key), Some(mime_type), Some(generated_at)) => Some(StoredPdf {
                key,
                mime_type,
                generated_at,
            }),
            _ => None,
        };
        Ok(Flyer {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            action_reference: self.action_reference,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            status: parse_column::<FlyerStatus>(&self.status)?,
            is_draft: self.is_draft,
            rejection_reason: self.rejection_reason,
            completion_percentage: self.completion_percentage.clamp(0, 100) as u8,
            pdf,
            last_edited_at: self.last_edited_at,
            auto_save_version: self.auto_save_version,
            published_at: self.published_at,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct PageRecord {
    id: Uuid,
    flyer_id: Uuid,
    page_number: i32,
    footer_promo_image_id: Option<Uuid>,
}
impl PageRecord {
    fn to_domain(self) -> Page {
        Page {
            id: self.id,
            flyer_id: self.flyer_id,
            page_number: self.page_number.max(0) as u32,
            footer_promo_image_id: self.footer_promo_image_id,
        }
    }
}

#[derive(FromRow)]
struct SlotRecord {
    id: Uuid,
    page_id: Uuid,
    position: i16,
    slot_type: String,
    product_id: Option<Uuid>,
    promo_image_id: Option<Uuid>,
    promo_size: Option<String>,
}
impl SlotRecord {
    fn to_domain(self) -> PortResult<Slot> {
        let content = match (self.slot_type.as_str(), self.product_id, self.promo_image_id) {
            ("product", Some(product_id), _) => SlotContent::Product { product_id },
            ("promo", _, Some(promo_image_id)) => SlotContent::Promo {
                promo_image_id,
                promo_size: parse_column::<PromoSize>(self.promo_size.as_deref().unwrap_or("single"))?,
            },
            ("empty", _, _) => SlotContent::Empty,
            (other, _, _) => {
                return Err(PortError::Unexpected(format!(
                    "slot {} has inconsistent type '{}'",
                    self.id, other
                )))
            }
        };
        Ok(Slot {
            id: self.id,
            page_id: self.page_id,
            position: self.position.clamp(0, u8::MAX as i16) as u8,
            content,
        })
    }
}

/// Column values for a slot's content: (type, product, promo image, size).
fn slot_columns(content: &SlotContent) -> (&'static str, Option<Uuid>, Option<Uuid>, Option<&'static str>) {
    match content {
        SlotContent::Empty => ("empty", None, None, None),
        SlotContent::Product { product_id } => ("product", Some(*product_id), None, None),
        SlotContent::Promo {
            promo_image_id,
            promo_size,
        } => ("promo", None, Some(*promo_image_id), Some(promo_size.as_str())),
    }
}

const WORKFLOW_COLUMNS: &str = "id, flyer_id, pre_approval_tiers, required_approvers, \
     current_approvals, is_complete, required_pre_approvers, current_pre_approvals, \
     is_pre_approval_complete, created_at";

#[derive(FromRow)]
struct WorkflowRecord {
    id: Uuid,
    flyer_id: Uuid,
    pre_approval_tiers: i16,
    required_approvers: i32,
    current_approvals: i32,
    is_complete: bool,
    required_pre_approvers: i32,
    current_pre_approvals: i32,
    is_pre_approval_complete: bool,
    created_at: DateTime<Utc>,
}
impl WorkflowRecord {
    fn to_domain(self) -> ApprovalWorkflow {
        ApprovalWorkflow {
            id: self.id,
            flyer_id: self.flyer_id,
            pre_approval_tiers: self.pre_approval_tiers.clamp(0, 1) as u8,
            required_approvers: self.required_approvers.max(0) as u32,
            current_approvals: self.current_approvals.max(0) as u32,
            is_complete: self.is_complete,
            required_pre_approvers: self.required_pre_approvers.max(0) as u32,
            current_pre_approvals: self.current_pre_approvals.max(0) as u32,
            is_pre_approval_complete: self.is_pre_approval_complete,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ApprovalRecord {
    id: Uuid,
    flyer_id: Uuid,
    approver_id: Uuid,
    status: String,
    pre_approval_status: Option<String>,
    comment: Option<String>,
    decided_at: Option<DateTime<Utc>>,
    pre_approved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}
impl ApprovalRecord {
    fn to_domain(self) -> PortResult<Approval> {
        Ok(Approval {
            id: self.id,
            flyer_id: self.flyer_id,
            approver_id: self.approver_id,
            status: parse_column::<ApprovalStatus>(&self.status)?,
            pre_approval_status: self
                .pre_approval_status
                .as_deref()
                .map(parse_column::<PreApprovalStatus>)
                .transpose()?,
            comment: self.comment,
            decided_at: self.decided_at,
            pre_approved_at: self.pre_approved_at,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct HistoryRecord {
    id: Uuid,
    flyer_id: Uuid,
    user_id: Uuid,
    action: String,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}
impl HistoryRecord {
    fn to_domain(self) -> PortResult<EditHistoryEntry> {
        Ok(EditHistoryEntry {
            id: self.id,
            flyer_id: self.flyer_id,
            user_id: self.user_id,
            action: parse_column(&self.action)?,
            details: self.details,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct SnapshotRecord {
    id: Uuid,
    flyer_id: Uuid,
    version: i32,
    payload: serde_json::Value,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}
impl SnapshotRecord {
    fn to_domain(self) -> VersionSnapshot {
        VersionSnapshot {
            id: self.id,
            flyer_id: self.flyer_id,
            version: self.version.max(0) as u32,
            payload: self.payload,
            created_by: self.created_by,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    name: String,
    role: String,
    brand_ids: Vec<Uuid>,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        Ok(User {
            id: self.id,
            email: self.email,
            name: self.name,
            role: parse_column::<Role>(&self.role)?,
            brand_ids: self.brand_ids,
        })
    }
}

const USER_SELECT: &str = "SELECT u.id, u.email, u.name, u.role, \
     COALESCE(array_agg(ub.brand_id) FILTER (WHERE ub.brand_id IS NOT NULL), '{}') AS brand_ids \
     FROM users u LEFT JOIN user_brands ub ON ub.user_id = u.id";

#[derive(FromRow)]
struct ProductRecord {
    id: Uuid,
    name: String,
    ean: Option<String>,
    description: Option<String>,
    image_key: Option<String>,
    recommended_price: Option<f64>,
    promo_price: Option<f64>,
    requires_energy_class: bool,
    brand_id: Option<Uuid>,
    brand_name: Option<String>,
}

#[derive(FromRow)]
struct IconRecord {
    id: Uuid,
    name: String,
    image_key: Option<String>,
    is_energy_class: bool,
}

#[derive(FromRow)]
struct PromoRecord {
    id: Uuid,
    name: String,
    image_key: String,
    brand_id: Option<Uuid>,
    brand_name: Option<String>,
}

fn brand_of(id: Option<Uuid>, name: Option<String>) -> Option<Brand> {
    match (id, name) {
        (Some(id), Some(name)) => Some(Brand { id, name }),
        _ => None,
    }
}

//=========================================================================================
// `FlyerRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl FlyerRepository for DbAdapter {
    async fn get_flyer(&self, flyer_id: Uuid) -> PortResult<Flyer> {
        let sql = format!("SELECT {} FROM flyers WHERE id = $1", FLYER_COLUMNS);
        sqlx::query_as::<_, FlyerRecord>(&sql)
            .bind(flyer_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, "Flyer", flyer_id))?
            .to_domain()
    }

    async fn list_flyers(&self) -> PortResult<Vec<Flyer>> {
        let sql = format!("SELECT {} FROM flyers ORDER BY created_at DESC", FLYER_COLUMNS);
        sqlx::query_as::<_, FlyerRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?
            .into_iter()
            .map(FlyerRecord::to_domain)
            .collect()
    }

    async fn insert_flyer(&self, flyer: &Flyer) -> PortResult<()> {
        let sql = format!(
            "INSERT INTO flyers ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            FLYER_COLUMNS
        );
        bind_flyer(sqlx::query(&sql), flyer)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, format!("Flyer {} exists", flyer.id)))?;
        Ok(())
    }

    async fn update_flyer(&self, flyer: &Flyer) -> PortResult<()> {
        let result = bind_flyer(sqlx::query(FLYER_UPDATE), flyer)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Flyer {} not found", flyer.id)));
        }
        Ok(())
    }

    async fn delete_flyer(&self, flyer_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM flyers WHERE id = $1")
            .bind(flyer_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Flyer {} not found", flyer_id)));
        }
        Ok(())
    }

    async fn expire_overdue(&self, cutoff: DateTime<Utc>) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE flyers SET status = 'expired' WHERE status = 'active' AND valid_to < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    async fn get_page(&self, page_id: Uuid) -> PortResult<Page> {
        let record = sqlx::query_as::<_, PageRecord>(
            "SELECT id, flyer_id, page_number, footer_promo_image_id FROM pages WHERE id = $1",
        )
        .bind(page_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, "Page", page_id))?;
        Ok(record.to_domain())
    }

    async fn list_pages(&self, flyer_id: Uuid) -> PortResult<Vec<Page>> {
        let records = sqlx::query_as::<_, PageRecord>(
            "SELECT id, flyer_id, page_number, footer_promo_image_id FROM pages \
             WHERE flyer_id = $1 ORDER BY page_number ASC",
        )
        .bind(flyer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(PageRecord::to_domain).collect())
    }

    async fn insert_page(&self, page: &Page, slots: &[Slot]) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query(
            "INSERT INTO pages (id, flyer_id, page_number, footer_promo_image_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(page.id)
        .bind(page.flyer_id)
        .bind(page.page_number as i32)
        .bind(page.footer_promo_image_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or(e, format!("Page {} already exists", page.page_number)))?;

        for slot in slots {
            let (slot_type, product_id, promo_image_id, promo_size) = slot_columns(&slot.content);
            sqlx::query(
                "INSERT INTO slots (id, page_id, position, slot_type, product_id, promo_image_id, promo_size) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(slot.id)
            .bind(slot.page_id)
            .bind(slot.position as i16)
            .bind(slot_type)
            .bind(product_id)
            .bind(promo_image_id)
            .bind(promo_size)
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_or(e, format!("Slot {} already exists", slot.position)))?;
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn update_page(&self, page: &Page) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE pages SET page_number = $2, footer_promo_image_id = $3 WHERE id = $1",
        )
        .bind(page.id)
        .bind(page.page_number as i32)
        .bind(page.footer_promo_image_id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, format!("Page {} already exists", page.page_number)))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Page {} not found", page.id)));
        }
        Ok(())
    }

    async fn delete_page(&self, page_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM pages WHERE id = $1")
            .bind(page_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Page {} not found", page_id)));
        }
        Ok(())
    }

    async fn get_slot(&self, slot_id: Uuid) -> PortResult<Slot> {
        sqlx::query_as::<_, SlotRecord>(
            "SELECT id, page_id, position, slot_type, product_id, promo_image_id, promo_size \
             FROM slots WHERE id = $1",
        )
        .bind(slot_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, "Slot", slot_id))?
        .to_domain()
    }

    async fn list_slots(&self, page_id: Uuid) -> PortResult<Vec<Slot>> {
        sqlx::query_as::<_, SlotRecord>(
            "SELECT id, page_id, position, slot_type, product_id, promo_image_id, promo_size \
             FROM slots WHERE page_id = $1 ORDER BY position ASC",
        )
        .bind(page_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(SlotRecord::to_domain)
        .collect()
    }

    async fn list_flyer_slots(&self, flyer_id: Uuid) -> PortResult<Vec<Slot>> {
        sqlx::query_as::<_, SlotRecord>(
            "SELECT s.id, s.page_id, s.position, s.slot_type, s.product_id, s.promo_image_id, s.promo_size \
             FROM slots s JOIN pages p ON p.id = s.page_id \
             WHERE p.flyer_id = $1 ORDER BY p.page_number ASC, s.position ASC",
        )
        .bind(flyer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(SlotRecord::to_domain)
        .collect()
    }

    async fn update_slots(&self, slots: &[Slot]) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        for slot in slots {
            let (slot_type, product_id, promo_image_id, promo_size) = slot_columns(&slot.content);
            let result = sqlx::query(
                "UPDATE slots SET slot_type = $2, product_id = $3, promo_image_id = $4, promo_size = $5 \
                 WHERE id = $1",
            )
            .bind(slot.id)
            .bind(slot_type)
            .bind(product_id)
            .bind(promo_image_id)
            .bind(promo_size)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
            if result.rows_affected() == 0 {
                // Dropping `tx` rolls back the slots already written.
                return Err(PortError::NotFound(format!("Slot {} not found", slot.id)));
            }
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }
}

fn bind_flyer<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    flyer: &'q Flyer,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    let pdf = flyer.pdf.as_ref();
    query
        .bind(flyer.id)
        .bind(flyer.owner_id)
        .bind(&flyer.name)
        .bind(&flyer.action_reference)
        .bind(flyer.valid_from)
        .bind(flyer.valid_to)
        .bind(flyer.status.as_str())
        .bind(flyer.is_draft)
        .bind(&flyer.rejection_reason)
        .bind(flyer.completion_percentage as i16)
        .bind(pdf.map(|p| p.key.as_str()))
        .bind(pdf.map(|p| p.mime_type.as_str()))
        .bind(pdf.map(|p| p.generated_at))
        .bind(flyer.last_edited_at)
        .bind(flyer.auto_save_version)
        .bind(flyer.published_at)
        .bind(flyer.created_at)
}

//=========================================================================================
// `WorkflowRepository` Trait Implementation
//=========================================================================================

const APPROVAL_COLUMNS: &str = "id, flyer_id, approver_id, status, pre_approval_status, comment, \
     decided_at, pre_approved_at, created_at";

#[async_trait]
impl WorkflowRepository for DbAdapter {
    async fn replace_workflow(
        &self,
        workflow: &ApprovalWorkflow,
        approvals: &[Approval],
    ) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        // Nothing to delete on a first submission is fine.
        sqlx::query("DELETE FROM approvals WHERE flyer_id = $1")
            .bind(workflow.flyer_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        sqlx::query("DELETE FROM approval_workflows WHERE flyer_id = $1")
            .bind(workflow.flyer_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO approval_workflows (id, flyer_id, pre_approval_tiers, required_approvers, \
             current_approvals, is_complete, required_pre_approvers, current_pre_approvals, \
             is_pre_approval_complete, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(workflow.id)
        .bind(workflow.flyer_id)
        .bind(workflow.pre_approval_tiers as i16)
        .bind(workflow.required_approvers as i32)
        .bind(workflow.current_approvals as i32)
        .bind(workflow.is_complete)
        .bind(workflow.required_pre_approvers as i32)
        .bind(workflow.current_pre_approvals as i32)
        .bind(workflow.is_pre_approval_complete)
        .bind(workflow.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or(e, format!("Workflow for flyer {} exists", workflow.flyer_id)))?;

        for approval in approvals {
            let sql = format!(
                "INSERT INTO approvals ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                APPROVAL_COLUMNS
            );
            sqlx::query(&sql)
                .bind(approval.id)
                .bind(approval.flyer_id)
                .bind(approval.approver_id)
                .bind(approval.status.as_str())
                .bind(approval.pre_approval_status.map(|s| s.as_str()))
                .bind(&approval.comment)
                .bind(approval.decided_at)
                .bind(approval.pre_approved_at)
                .bind(approval.created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    conflict_or(
                        e,
                        format!("Approval for approver {} exists", approval.approver_id),
                    )
                })?;
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn get_workflow(&self, flyer_id: Uuid) -> PortResult<ApprovalWorkflow> {
        let sql = format!(
            "SELECT {} FROM approval_workflows WHERE flyer_id = $1",
            WORKFLOW_COLUMNS
        );
        let record = sqlx::query_as::<_, WorkflowRecord>(&sql)
            .bind(flyer_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, "Workflow for flyer", flyer_id))?;
        Ok(record.to_domain())
    }

    async fn get_approval(&self, flyer_id: Uuid, approver_id: Uuid) -> PortResult<Approval> {
        let sql = format!(
            "SELECT {} FROM approvals WHERE flyer_id = $1 AND approver_id = $2",
            APPROVAL_COLUMNS
        );
        sqlx::query_as::<_, ApprovalRecord>(&sql)
            .bind(flyer_id)
            .bind(approver_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, "Approval of approver", approver_id))?
            .to_domain()
    }

    async fn get_approval_by_id(&self, approval_id: Uuid) -> PortResult<Approval> {
        let sql = format!("SELECT {} FROM approvals WHERE id = $1", APPROVAL_COLUMNS);
        sqlx::query_as::<_, ApprovalRecord>(&sql)
            .bind(approval_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, "Approval", approval_id))?
            .to_domain()
    }

    async fn list_approvals(&self, flyer_id: Uuid) -> PortResult<Vec<Approval>> {
        let sql = format!(
            "SELECT {} FROM approvals WHERE flyer_id = $1 ORDER BY created_at ASC",
            APPROVAL_COLUMNS
        );
        sqlx::query_as::<_, ApprovalRecord>(&sql)
            .bind(flyer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?
            .into_iter()
            .map(ApprovalRecord::to_domain)
            .collect()
    }

    async fn record_decision(&self, decision: &Decision) -> PortResult<DecisionOutcome> {
        let approval = &decision.approval;
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // The workflow row lock serialises decisions on one flyer, so each
        // recount below sees every decision committed before it.
        let sql = format!(
            "SELECT {} FROM approval_workflows WHERE flyer_id = $1 FOR UPDATE",
            WORKFLOW_COLUMNS
        );
        let mut workflow = sqlx::query_as::<_, WorkflowRecord>(&sql)
            .bind(approval.flyer_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| not_found_or(e, "Workflow for flyer", approval.flyer_id))?
            .to_domain();
        let sql = format!("SELECT {} FROM flyers WHERE id = $1 FOR UPDATE", FLYER_COLUMNS);
        let mut flyer = sqlx::query_as::<_, FlyerRecord>(&sql)
            .bind(approval.flyer_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| not_found_or(e, "Flyer", approval.flyer_id))?
            .to_domain()?;
        if flyer.status != FlyerStatus::PendingApproval {
            return Err(PortError::Conflict(format!(
                "Flyer {} is not awaiting approval",
                flyer.id
            )));
        }

        let (update, count_sql) = match decision.stage {
            DecisionStage::Approval => (
                sqlx::query(
                    "UPDATE approvals SET status = $2, comment = $3, decided_at = $4 \
                     WHERE id = $1 AND status = 'pending'",
                )
                .bind(approval.id)
                .bind(approval.status.as_str())
                .bind(&approval.comment)
                .bind(approval.decided_at),
                "SELECT COUNT(*) FROM approvals WHERE flyer_id = $1 AND status = 'approved'",
            ),
            DecisionStage::PreApproval => (
                sqlx::query(
                    "UPDATE approvals SET pre_approval_status = $2, comment = $3, pre_approved_at = $4 \
                     WHERE id = $1 AND pre_approval_status = 'pending'",
                )
                .bind(approval.id)
                .bind(approval.pre_approval_status.map(|s| s.as_str()))
                .bind(&approval.comment)
                .bind(approval.pre_approved_at),
                "SELECT COUNT(*) FROM approvals WHERE flyer_id = $1 \
                 AND pre_approval_status = 'pre_approved'",
            ),
        };
        let result = update.execute(&mut *tx).await.map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::Conflict(format!(
                "Approval {} was already decided",
                approval.id
            )));
        }

        let count: i64 = sqlx::query_scalar(count_sql)
            .bind(approval.flyer_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;
        decision.apply(&mut workflow, &mut flyer, count.max(0) as u32);

        sqlx::query(
            "UPDATE approval_workflows SET current_approvals = $2, is_complete = $3, \
             current_pre_approvals = $4, is_pre_approval_complete = $5 WHERE flyer_id = $1",
        )
        .bind(workflow.flyer_id)
        .bind(workflow.current_approvals as i32)
        .bind(workflow.is_complete)
        .bind(workflow.current_pre_approvals as i32)
        .bind(workflow.is_pre_approval_complete)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;
        bind_flyer(sqlx::query(FLYER_UPDATE), &flyer)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(DecisionOutcome { workflow, flyer })
    }
}

//=========================================================================================
// `AuditLog` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuditLog for DbAdapter {
    async fn append_history(&self, entry: &EditHistoryEntry) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO edit_history (id, flyer_id, user_id, action, details, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id)
        .bind(entry.flyer_id)
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn list_history(&self, flyer_id: Uuid) -> PortResult<Vec<EditHistoryEntry>> {
        sqlx::query_as::<_, HistoryRecord>(
            "SELECT id, flyer_id, user_id, action, details, created_at FROM edit_history \
             WHERE flyer_id = $1 ORDER BY created_at ASC",
        )
        .bind(flyer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(HistoryRecord::to_domain)
        .collect()
    }

    async fn save_snapshot(
        &self,
        flyer_id: Uuid,
        created_by: Uuid,
        payload: serde_json::Value,
    ) -> PortResult<VersionSnapshot> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let next: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM version_snapshots WHERE flyer_id = $1",
        )
        .bind(flyer_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        let record = sqlx::query_as::<_, SnapshotRecord>(
            "INSERT INTO version_snapshots (id, flyer_id, version, payload, created_by) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, flyer_id, version, payload, created_by, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(flyer_id)
        .bind(next)
        .bind(&payload)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or(e, format!("Snapshot version {} exists", next)))?;
        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }
}

//=========================================================================================
// Catalog and User Directory
//=========================================================================================

#[async_trait]
impl CatalogService for DbAdapter {
    async fn get_product(&self, product_id: Uuid) -> PortResult<Product> {
        let record = sqlx::query_as::<_, ProductRecord>(
            "SELECT p.id, p.name, p.ean, p.description, p.image_key, p.recommended_price, \
             p.promo_price, p.requires_energy_class, p.brand_id, b.name AS brand_name \
             FROM products p LEFT JOIN brands b ON b.id = p.brand_id WHERE p.id = $1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, "Product", product_id))?;

        let icons = sqlx::query_as::<_, IconRecord>(
            "SELECT i.id, i.name, i.image_key, i.is_energy_class FROM icons i \
             JOIN product_icons pi ON pi.icon_id = i.id \
             WHERE pi.product_id = $1 ORDER BY pi.sort_order ASC, i.name ASC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(|i| Icon {
            id: i.id,
            name: i.name,
            image_key: i.image_key,
            is_energy_class: i.is_energy_class,
        })
        .collect();

        Ok(Product {
            id: record.id,
            name: record.name,
            ean: record.ean,
            description: record.description,
            brand: brand_of(record.brand_id, record.brand_name),
            image_key: record.image_key,
            icons,
            recommended_price: record.recommended_price,
            promo_price: record.promo_price,
            requires_energy_class: record.requires_energy_class,
        })
    }

    async fn get_promo_image(&self, promo_image_id: Uuid) -> PortResult<PromoImage> {
        let record = sqlx::query_as::<_, PromoRecord>(
            "SELECT m.id, m.name, m.image_key, m.brand_id, b.name AS brand_name \
             FROM promo_images m LEFT JOIN brands b ON b.id = m.brand_id WHERE m.id = $1",
        )
        .bind(promo_image_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, "Promo image", promo_image_id))?;
        Ok(PromoImage {
            id: record.id,
            name: record.name,
            image_key: record.image_key,
            brand: brand_of(record.brand_id, record.brand_name),
        })
    }

    async fn get_brand(&self, brand_id: Uuid) -> PortResult<Brand> {
        let (id, name): (Uuid, String) =
            sqlx::query_as("SELECT id, name FROM brands WHERE id = $1")
                .bind(brand_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| not_found_or(e, "Brand", brand_id))?;
        Ok(Brand { id, name })
    }
}

#[async_trait]
impl UserDirectory for DbAdapter {
    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let sql = format!("{} WHERE u.id = $1 GROUP BY u.id", USER_SELECT);
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, "User", user_id))?
            .to_domain()
    }

    async fn list_users_by_role(&self, role: Role) -> PortResult<Vec<User>> {
        let sql = format!(
            "{} WHERE u.role = $1 GROUP BY u.id ORDER BY u.email ASC",
            USER_SELECT
        );
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(role.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?
            .into_iter()
            .map(UserRecord::to_domain)
            .collect()
    }
}
