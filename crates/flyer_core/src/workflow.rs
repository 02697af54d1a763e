//! crates/flyer_core/src/workflow.rs
//!
//! The approval state machine: `draft -> pending_approval -> {active | draft}`,
//! `active -> expired`. One engine covers both the single-tier flow and the flow
//! with a pre-approval tier in front of final approval.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit;
use crate::completion::placed_products;
use crate::domain::{
    Approval, ApprovalStatus, ApprovalWorkflow, Decision, DecisionOutcome, DecisionStage,
    EditAction, Flyer, FlyerStatus, PreApprovalStatus, Role, StoredPdf, User, PDF_MIME_TYPE,
};
use crate::error::{CoreError, CoreResult};
use crate::permissions::{authorize_flyer, require, Action};
use crate::ports::{
    Collaborators, DeclaredPrices, FlyerRepository, Notification, NotificationKind, PortError,
};
use crate::render::assemble_document;

const DEFAULT_REJECTION_REASON: &str = "Rejected by approver";
const DEFAULT_PRE_REJECTION_REASON: &str = "Rejected during pre-approval";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowPolicy {
    /// 0 for direct approval, 1 to require pre-approval first.
    pub pre_approval_tiers: u8,
    pub required_approvers: u32,
    pub required_pre_approvers: u32,
    pub require_action_reference: bool,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            pre_approval_tiers: 0,
            required_approvers: 1,
            required_pre_approvers: 1,
            require_action_reference: false,
        }
    }
}

/// What a reviewer sends along with a decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    /// The approval record being decided. Defaults to the reviewer's own record on
    /// the flyer; naming someone else's record is unauthorized.
    pub approval_id: Option<Uuid>,
    /// Becomes the rejection reason for rejections.
    pub comment: Option<String>,
}

impl Verdict {
    pub fn with_comment(comment: impl Into<String>) -> Self {
        Self {
            approval_id: None,
            comment: Some(comment.into()),
        }
    }
}

/// The workflow record of a flyer together with every approval row.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
    pub workflow: ApprovalWorkflow,
    pub approvals: Vec<Approval>,
}

/// Blob key under which a flyer's generated PDF is stored.
pub fn pdf_key(flyer_id: Uuid) -> String {
    format!("flyers/{}.pdf", flyer_id)
}

/// UTC midnight of the day containing `now`.
fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Moves every active flyer whose `valid_to` lies before today (UTC) to `expired`.
pub async fn expire_overdue(repo: &dyn FlyerRepository, now: DateTime<Utc>) -> CoreResult<u64> {
    let expired = repo.expire_overdue(start_of_day(now)).await?;
    if expired > 0 {
        info!(count = expired, "Expired overdue flyers");
    }
    Ok(expired)
}

#[derive(Clone)]
pub struct WorkflowService {
    ports: Collaborators,
    policy: WorkflowPolicy,
}

impl WorkflowService {
    pub fn new(ports: Collaborators, policy: WorkflowPolicy) -> Self {
        Self { ports, policy }
    }

    /// `draft -> pending_approval`. Snapshot and PDF failures abort the submission
    /// and leave the flyer in draft.
    pub async fn submit(&self, actor: &User, flyer_id: Uuid) -> CoreResult<Flyer> {
        let mut flyer = self.ports.flyers.get_flyer(flyer_id).await?;
        authorize_flyer(self.ports.users.as_ref(), actor, &flyer, Action::SubmitFlyer).await?;
        if flyer.status != FlyerStatus::Draft {
            return Err(CoreError::InvalidState(format!(
                "only drafts can be submitted, flyer is {}",
                flyer.status.as_str()
            )));
        }
        self.check_submittable(&flyer).await?;

        let pages = self.ports.flyers.list_pages(flyer.id).await?;
        let slots = self.ports.flyers.list_flyer_slots(flyer.id).await?;
        let snapshot = self
            .ports
            .audit
            .save_snapshot(
                flyer.id,
                actor.id,
                json!({ "flyer": &flyer, "pages": pages, "slots": slots }),
            )
            .await?;

        let document = assemble_document(&self.ports, &flyer).await?;
        let pdf = self.ports.renderer.render(&document).await?;
        let key = pdf_key(flyer.id);
        self.ports.blobs.put(&key, pdf, PDF_MIME_TYPE).await?;

        let now = Utc::now();
        let (workflow, approvals) = self.fresh_round(flyer.id, now).await?;
        self.ports
            .workflows
            .replace_workflow(&workflow, &approvals)
            .await?;

        flyer.status = FlyerStatus::PendingApproval;
        flyer.is_draft = false;
        flyer.rejection_reason = None;
        flyer.last_edited_at = now;
        flyer.pdf = Some(StoredPdf {
            key,
            mime_type: PDF_MIME_TYPE.to_string(),
            generated_at: now,
        });
        self.ports.flyers.update_flyer(&flyer).await?;

        info!(
            flyer_id = %flyer.id,
            version = snapshot.version,
            approvers = approvals.len(),
            "Flyer submitted for approval"
        );
        audit::record(
            self.ports.audit.as_ref(),
            flyer.id,
            actor.id,
            EditAction::Submitted,
            json!({ "snapshotVersion": snapshot.version }),
        )
        .await;

        let notices = approvals
            .iter()
            .map(|a| self.notice(NotificationKind::Submitted, a.approver_id, &flyer, None))
            .collect();
        self.notify_all(notices).await;
        Ok(flyer)
    }

    pub async fn pre_approve(
        &self,
        actor: &User,
        flyer_id: Uuid,
        verdict: Verdict,
    ) -> CoreResult<ApprovalWorkflow> {
        let (flyer, mut approval) = self
            .decision_target(actor, flyer_id, verdict.approval_id, Action::PreApprove)
            .await?;
        self.require_pre_approval_tier()?;
        if approval.pre_approval_status != Some(PreApprovalStatus::Pending) {
            return Err(already_decided(&approval));
        }

        let now = Utc::now();
        let comment = verdict.comment;
        approval.pre_approval_status = Some(PreApprovalStatus::PreApproved);
        approval.pre_approved_at = Some(now);
        approval.comment = comment.clone();
        let DecisionOutcome { workflow, .. } = self
            .record(Decision {
                approval,
                stage: DecisionStage::PreApproval,
                rejection: None,
                at: now,
            })
            .await?;

        info!(
            flyer_id = %flyer.id,
            pre_approvals = workflow.current_pre_approvals,
            complete = workflow.is_pre_approval_complete,
            "Flyer pre-approved"
        );
        audit::record(
            self.ports.audit.as_ref(),
            flyer.id,
            actor.id,
            EditAction::PreApproved,
            json!({ "comment": comment }),
        )
        .await;
        self.notify_all(vec![self.notice(
            NotificationKind::PreApproved,
            flyer.owner_id,
            &flyer,
            comment,
        )])
        .await;
        Ok(workflow)
    }

    /// Pre-rejection sends the flyer straight back to draft.
    pub async fn pre_reject(
        &self,
        actor: &User,
        flyer_id: Uuid,
        verdict: Verdict,
    ) -> CoreResult<Flyer> {
        let (_, mut approval) = self
            .decision_target(actor, flyer_id, verdict.approval_id, Action::PreApprove)
            .await?;
        self.require_pre_approval_tier()?;
        if approval.pre_approval_status != Some(PreApprovalStatus::Pending) {
            return Err(already_decided(&approval));
        }

        let now = Utc::now();
        approval.pre_approval_status = Some(PreApprovalStatus::Rejected);
        approval.pre_approved_at = Some(now);
        approval.comment = verdict.comment.clone();
        let reason = reason_or(verdict.comment, DEFAULT_PRE_REJECTION_REASON);
        let DecisionOutcome { flyer, .. } = self
            .record(Decision {
                approval,
                stage: DecisionStage::PreApproval,
                rejection: Some(reason.clone()),
                at: now,
            })
            .await?;

        info!(flyer_id = %flyer.id, "Flyer rejected during pre-approval");
        audit::record(
            self.ports.audit.as_ref(),
            flyer.id,
            actor.id,
            EditAction::PreRejected,
            json!({ "reason": &reason }),
        )
        .await;
        self.notify_all(vec![self.notice(
            NotificationKind::Rejected,
            flyer.owner_id,
            &flyer,
            Some(reason),
        )])
        .await;
        Ok(flyer)
    }

    /// Counts an approval; the flyer goes live once enough approvers agree.
    pub async fn approve(
        &self,
        actor: &User,
        flyer_id: Uuid,
        verdict: Verdict,
    ) -> CoreResult<Flyer> {
        let (flyer, mut approval) = self
            .decision_target(actor, flyer_id, verdict.approval_id, Action::Approve)
            .await?;
        if approval.status != ApprovalStatus::Pending {
            return Err(already_decided(&approval));
        }
        let workflow = self.ports.workflows.get_workflow(flyer.id).await?;
        if workflow.pre_approval_tiers > 0 && !workflow.is_pre_approval_complete {
            return Err(CoreError::InvalidState(format!(
                "flyer {} is still awaiting pre-approval",
                flyer.id
            )));
        }

        let now = Utc::now();
        let comment = verdict.comment;
        approval.status = ApprovalStatus::Approved;
        approval.decided_at = Some(now);
        approval.comment = comment.clone();
        let DecisionOutcome { workflow, flyer } = self
            .record(Decision {
                approval,
                stage: DecisionStage::Approval,
                rejection: None,
                at: now,
            })
            .await?;

        audit::record(
            self.ports.audit.as_ref(),
            flyer.id,
            actor.id,
            EditAction::Approved,
            json!({ "comment": comment, "currentApprovals": workflow.current_approvals }),
        )
        .await;

        if workflow.is_complete {
            info!(flyer_id = %flyer.id, "Flyer approved and published");
            self.notify_all(vec![self.notice(
                NotificationKind::Approved,
                flyer.owner_id,
                &flyer,
                comment,
            )])
            .await;
        } else {
            info!(
                flyer_id = %flyer.id,
                approvals = workflow.current_approvals,
                required = workflow.required_approvers,
                "Approval recorded"
            );
        }
        Ok(flyer)
    }

    /// A single rejection returns the flyer to draft, whatever other approvers decided.
    pub async fn reject(
        &self,
        actor: &User,
        flyer_id: Uuid,
        verdict: Verdict,
    ) -> CoreResult<Flyer> {
        let (_, mut approval) = self
            .decision_target(actor, flyer_id, verdict.approval_id, Action::Approve)
            .await?;
        if approval.status != ApprovalStatus::Pending {
            return Err(already_decided(&approval));
        }

        let now = Utc::now();
        approval.status = ApprovalStatus::Rejected;
        approval.decided_at = Some(now);
        approval.comment = verdict.comment.clone();
        let reason = reason_or(verdict.comment, DEFAULT_REJECTION_REASON);
        let DecisionOutcome { flyer, .. } = self
            .record(Decision {
                approval,
                stage: DecisionStage::Approval,
                rejection: Some(reason.clone()),
                at: now,
            })
            .await?;

        info!(flyer_id = %flyer.id, "Flyer rejected");
        audit::record(
            self.ports.audit.as_ref(),
            flyer.id,
            actor.id,
            EditAction::Rejected,
            json!({ "reason": &reason }),
        )
        .await;
        self.notify_all(vec![self.notice(
            NotificationKind::Rejected,
            flyer.owner_id,
            &flyer,
            Some(reason),
        )])
        .await;
        Ok(flyer)
    }

    /// `active -> expired`, backdating `valid_to` to the end of yesterday.
    pub async fn expire(&self, actor: &User, flyer_id: Uuid) -> CoreResult<Flyer> {
        let mut flyer = self.ports.flyers.get_flyer(flyer_id).await?;
        authorize_flyer(self.ports.users.as_ref(), actor, &flyer, Action::ExpireFlyer).await?;
        if flyer.status != FlyerStatus::Active {
            return Err(CoreError::InvalidState(format!(
                "only active flyers can be expired, flyer is {}",
                flyer.status.as_str()
            )));
        }
        let now = Utc::now();
        flyer.valid_to = Some(start_of_day(now) - Duration::seconds(1));
        flyer.status = FlyerStatus::Expired;
        flyer.last_edited_at = now;
        self.ports.flyers.update_flyer(&flyer).await?;

        info!(flyer_id = %flyer.id, "Flyer expired");
        audit::record(
            self.ports.audit.as_ref(),
            flyer.id,
            actor.id,
            EditAction::Expired,
            json!({ "validTo": flyer.valid_to }),
        )
        .await;
        Ok(flyer)
    }

    pub async fn status(&self, actor: &User, flyer_id: Uuid) -> CoreResult<WorkflowStatus> {
        let flyer = self.ports.flyers.get_flyer(flyer_id).await?;
        authorize_flyer(self.ports.users.as_ref(), actor, &flyer, Action::ViewFlyer).await?;
        let workflow = self.ports.workflows.get_workflow(flyer.id).await?;
        let approvals = self.ports.workflows.list_approvals(flyer.id).await?;
        Ok(WorkflowStatus {
            workflow,
            approvals,
        })
    }

    async fn check_submittable(&self, flyer: &Flyer) -> CoreResult<()> {
        let mut missing = Vec::new();
        if flyer.valid_from.is_none() {
            missing.push("validFrom");
        }
        if flyer.valid_to.is_none() {
            missing.push("validTo");
        }
        if self.policy.require_action_reference
            && flyer
                .action_reference
                .as_deref()
                .map(|r| r.trim().is_empty())
                .unwrap_or(true)
        {
            missing.push("actionReference");
        }
        if !missing.is_empty() {
            return Err(CoreError::ValidationFailed(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }
        if self.ports.flyers.list_pages(flyer.id).await?.is_empty() {
            return Err(CoreError::ValidationFailed(
                "a flyer needs at least one page".to_string(),
            ));
        }
        self.check_prices(flyer).await
    }

    async fn check_prices(&self, flyer: &Flyer) -> CoreResult<()> {
        let Some(prices) = &self.ports.prices else {
            return Ok(());
        };
        let slots = self.ports.flyers.list_flyer_slots(flyer.id).await?;
        let mut offending = Vec::new();
        for product_id in placed_products(&slots) {
            let product = self.ports.catalog.get_product(product_id).await?;
            let Some(ean) = product.ean.as_deref() else {
                continue;
            };
            let declared = DeclaredPrices {
                recommended: product.recommended_price,
                promo: product.promo_price,
            };
            let check = prices.check(ean, declared).await?;
            if !check.found || !check.prices_match {
                offending.push(ean.to_string());
            }
        }
        if offending.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ValidationFailed(format!(
                "price check failed for EAN(s): {}",
                offending.join(", ")
            )))
        }
    }

    /// A new workflow plus one pending approval per approver and pre-approver.
    async fn fresh_round(
        &self,
        flyer_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<(ApprovalWorkflow, Vec<Approval>)> {
        let two_tier = self.policy.pre_approval_tiers > 0;
        let workflow = ApprovalWorkflow {
            id: Uuid::new_v4(),
            flyer_id,
            pre_approval_tiers: self.policy.pre_approval_tiers,
            required_approvers: self.policy.required_approvers,
            current_approvals: 0,
            is_complete: false,
            required_pre_approvers: self.policy.required_pre_approvers,
            current_pre_approvals: 0,
            is_pre_approval_complete: !two_tier,
            created_at: now,
        };

        let mut reviewers = self.ports.users.list_users_by_role(Role::Approver).await?;
        reviewers.extend(self.ports.users.list_users_by_role(Role::PreApprover).await?);
        if reviewers.is_empty() {
            warn!(flyer_id = %flyer_id, "No approvers registered; flyer will wait in pending_approval");
        }
        let approvals = reviewers
            .iter()
            .map(|reviewer| Approval {
                id: Uuid::new_v4(),
                flyer_id,
                approver_id: reviewer.id,
                status: ApprovalStatus::Pending,
                pre_approval_status: two_tier.then_some(PreApprovalStatus::Pending),
                comment: None,
                decided_at: None,
                pre_approved_at: None,
                created_at: now,
            })
            .collect();
        Ok((workflow, approvals))
    }

    /// Loads the pending flyer and the approval row being decided, which must
    /// belong to the actor.
    async fn decision_target(
        &self,
        actor: &User,
        flyer_id: Uuid,
        approval_id: Option<Uuid>,
        action: Action,
    ) -> CoreResult<(Flyer, Approval)> {
        require(actor, action)?;
        let flyer = self.ports.flyers.get_flyer(flyer_id).await?;
        let approval = match approval_id {
            Some(id) => self.ports.workflows.get_approval_by_id(id).await?,
            None => {
                self.ports
                    .workflows
                    .get_approval(flyer.id, actor.id)
                    .await?
            }
        };
        if approval.approver_id != actor.id {
            return Err(CoreError::Unauthorized(format!(
                "approval {} belongs to another approver",
                approval.id
            )));
        }
        if approval.flyer_id != flyer.id {
            return Err(CoreError::NotFound(format!(
                "approval {} does not belong to flyer {}",
                approval.id, flyer.id
            )));
        }
        if flyer.status != FlyerStatus::PendingApproval {
            return Err(CoreError::InvalidState(format!(
                "flyer {} is not awaiting approval",
                flyer.id
            )));
        }
        Ok((flyer, approval))
    }

    fn require_pre_approval_tier(&self) -> CoreResult<()> {
        if self.policy.pre_approval_tiers == 0 {
            return Err(CoreError::InvalidState(
                "this deployment has no pre-approval tier".to_string(),
            ));
        }
        Ok(())
    }

    /// Lost races surface as `InvalidState`, like the checks that precede them.
    async fn record(&self, decision: Decision) -> CoreResult<DecisionOutcome> {
        self.ports
            .workflows
            .record_decision(&decision)
            .await
            .map_err(|e| match e {
                PortError::Conflict(reason) => CoreError::InvalidState(reason),
                other => other.into(),
            })
    }

    fn notice(
        &self,
        kind: NotificationKind,
        recipient_id: Uuid,
        flyer: &Flyer,
        message: Option<String>,
    ) -> Notification {
        Notification {
            kind,
            recipient_id,
            flyer_id: flyer.id,
            flyer_name: flyer.name.clone(),
            message,
        }
    }

    async fn notify_all(&self, notices: Vec<Notification>) {
        let sends = notices.iter().map(|n| self.ports.notifier.send(n));
        for (notice, result) in notices.iter().zip(join_all(sends).await) {
            if let Err(e) = result {
                warn!(
                    flyer_id = %notice.flyer_id,
                    recipient_id = %notice.recipient_id,
                    kind = ?notice.kind,
                    "Notification failed: {}",
                    e
                );
            }
        }
    }
}

fn already_decided(approval: &Approval) -> CoreError {
    CoreError::InvalidState(format!("approval {} was already decided", approval.id))
}

fn reason_or(comment: Option<String>, default: &str) -> String {
    comment
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Page, Product, Slot, SlotContent};
    use crate::memory::{InMemoryStore, StubRenderer};
    use crate::ports::{PdfRenderer, PortResult, PriceCheck, PriceValidator, WorkflowRepository};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Fixture {
        store: Arc<InMemoryStore>,
        ports: Collaborators,
        supplier: User,
        flyer: Flyer,
    }

    impl Fixture {
        fn service(&self, policy: WorkflowPolicy) -> WorkflowService {
            WorkflowService::new(self.ports.clone(), policy)
        }

        async fn flyer(&self) -> Flyer {
            self.store.get_flyer(self.flyer.id).await.unwrap()
        }
    }

    async fn fixture_with(renderer: Arc<dyn PdfRenderer>) -> Fixture {
        let store = InMemoryStore::new();
        let ports = store.collaborators(renderer);
        let supplier = store.seed_user(Role::Supplier, vec![]);
        let mut flyer = Flyer::new_draft(supplier.id, "Autumn", Utc::now());
        flyer.valid_from = Some(Utc::now());
        flyer.valid_to = Some(Utc::now() + Duration::days(14));
        store.insert_flyer(&flyer).await.unwrap();
        let page = Page {
            id: Uuid::new_v4(),
            flyer_id: flyer.id,
            page_number: 1,
            footer_promo_image_id: None,
        };
        let slots: Vec<Slot> = (0..8).map(|p| Slot::empty(page.id, p)).collect();
        store.insert_page(&page, &slots).await.unwrap();
        Fixture {
            store,
            ports,
            supplier,
            flyer,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(StubRenderer::default())).await
    }

    fn two_approvers() -> WorkflowPolicy {
        WorkflowPolicy {
            required_approvers: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn submit_without_valid_to_stays_draft() {
        let f = fixture().await;
        let mut flyer = f.flyer().await;
        flyer.valid_to = None;
        f.store.update_flyer(&flyer).await.unwrap();

        let err = f
            .service(WorkflowPolicy::default())
            .submit(&f.supplier, flyer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
        assert_eq!(f.flyer().await.status, FlyerStatus::Draft);
        assert!(f.store.snapshots(flyer.id).is_empty());
    }

    #[tokio::test]
    async fn submit_requires_pages_and_reference_when_configured() {
        let f = fixture().await;
        let policy = WorkflowPolicy {
            require_action_reference: true,
            ..Default::default()
        };
        let err = f.service(policy).submit(&f.supplier, f.flyer.id).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));

        let mut empty = Flyer::new_draft(f.supplier.id, "Empty", Utc::now());
        empty.valid_from = Some(Utc::now());
        empty.valid_to = Some(Utc::now());
        f.store.insert_flyer(&empty).await.unwrap();
        let err = f
            .service(WorkflowPolicy::default())
            .submit(&f.supplier, empty.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn two_approvals_publish_the_flyer() {
        let f = fixture().await;
        let a = f.store.seed_user(Role::Approver, vec![]);
        let b = f.store.seed_user(Role::Approver, vec![]);
        let service = f.service(two_approvers());

        let submitted = service.submit(&f.supplier, f.flyer.id).await.unwrap();
        assert_eq!(submitted.status, FlyerStatus::PendingApproval);
        assert!(!submitted.is_draft);
        assert!(f.store.has_blob(&pdf_key(f.flyer.id)));
        assert_eq!(f.store.snapshots(f.flyer.id).len(), 1);
        assert_eq!(f.store.notifications().len(), 2);

        let after_a = service.approve(&a, f.flyer.id, Verdict::default()).await.unwrap();
        assert_eq!(after_a.status, FlyerStatus::PendingApproval);
        let status = service.status(&a, f.flyer.id).await.unwrap();
        assert_eq!(status.workflow.current_approvals, 1);
        assert!(!status.workflow.is_complete);

        let after_b = service.approve(&b, f.flyer.id, Verdict::default()).await.unwrap();
        assert_eq!(after_b.status, FlyerStatus::Active);
        assert!(after_b.published_at.is_some());
        let workflow = f.store.get_workflow(f.flyer.id).await.unwrap();
        assert_eq!(workflow.current_approvals, 2);
        assert!(workflow.is_complete);
    }

    #[tokio::test]
    async fn decisions_are_final() {
        let f = fixture().await;
        let a = f.store.seed_user(Role::Approver, vec![]);
        f.store.seed_user(Role::Approver, vec![]);
        let service = f.service(two_approvers());
        service.submit(&f.supplier, f.flyer.id).await.unwrap();

        service.approve(&a, f.flyer.id, Verdict::default()).await.unwrap();
        let err = service.approve(&a, f.flyer.id, Verdict::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        let workflow = f.store.get_workflow(f.flyer.id).await.unwrap();
        assert_eq!(workflow.current_approvals, 1);
    }

    #[tokio::test]
    async fn one_rejection_overrides_approvals_and_resubmission_starts_fresh() {
        let f = fixture().await;
        let a = f.store.seed_user(Role::Approver, vec![]);
        let b = f.store.seed_user(Role::Approver, vec![]);
        let service = f.service(two_approvers());
        service.submit(&f.supplier, f.flyer.id).await.unwrap();
        service.approve(&a, f.flyer.id, Verdict::default()).await.unwrap();

        let rejected = service
            .reject(&b, f.flyer.id, Verdict::with_comment("Wrong prices"))
            .await
            .unwrap();
        assert_eq!(rejected.status, FlyerStatus::Draft);
        assert!(rejected.is_draft);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Wrong prices"));
        let old_ids: Vec<Uuid> = f
            .store
            .list_approvals(f.flyer.id)
            .await
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();

        let resubmitted = service.submit(&f.supplier, f.flyer.id).await.unwrap();
        assert_eq!(resubmitted.rejection_reason, None);
        let fresh = f.store.list_approvals(f.flyer.id).await.unwrap();
        assert_eq!(fresh.len(), 2);
        assert!(fresh.iter().all(|a| a.status == ApprovalStatus::Pending));
        assert!(fresh.iter().all(|a| !old_ids.contains(&a.id)));
        assert_eq!(f.store.snapshots(f.flyer.id).len(), 2);
        assert_eq!(f.store.snapshots(f.flyer.id)[1].version, 2);
    }

    #[tokio::test]
    async fn default_reason_when_comment_is_blank() {
        let f = fixture().await;
        let a = f.store.seed_user(Role::Approver, vec![]);
        let service = f.service(WorkflowPolicy::default());
        service.submit(&f.supplier, f.flyer.id).await.unwrap();
        let flyer = service.reject(&a, f.flyer.id, Verdict::with_comment("  ")).await.unwrap();
        assert_eq!(flyer.rejection_reason.as_deref(), Some(DEFAULT_REJECTION_REASON));
    }

    #[tokio::test]
    async fn only_own_record_and_role_may_decide() {
        let f = fixture().await;
        f.store.seed_user(Role::Approver, vec![]);
        let service = f.service(WorkflowPolicy::default());
        service.submit(&f.supplier, f.flyer.id).await.unwrap();

        let err = service.approve(&f.supplier, f.flyer.id, Verdict::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
        // Registered after submission, so no approval row exists for them.
        let latecomer = f.store.seed_user(Role::Approver, vec![]);
        let err = service.approve(&latecomer, f.flyer.id, Verdict::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn pre_approval_gates_final_approval() {
        let f = fixture().await;
        let pre = f.store.seed_user(Role::PreApprover, vec![]);
        let approver = f.store.seed_user(Role::Approver, vec![]);
        let service = f.service(WorkflowPolicy {
            pre_approval_tiers: 1,
            ..Default::default()
        });
        service.submit(&f.supplier, f.flyer.id).await.unwrap();
        let approvals = f.store.list_approvals(f.flyer.id).await.unwrap();
        assert!(approvals
            .iter()
            .all(|a| a.pre_approval_status == Some(PreApprovalStatus::Pending)));

        let err = service.approve(&approver, f.flyer.id, Verdict::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));

        let workflow = service.pre_approve(&pre, f.flyer.id, Verdict::default()).await.unwrap();
        assert_eq!(workflow.current_pre_approvals, 1);
        assert!(workflow.is_pre_approval_complete);
        assert!(f
            .store
            .notifications()
            .iter()
            .any(|n| n.kind == NotificationKind::PreApproved && n.recipient_id == f.supplier.id));

        let err = service.pre_approve(&pre, f.flyer.id, Verdict::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));

        let flyer = service.approve(&approver, f.flyer.id, Verdict::default()).await.unwrap();
        assert_eq!(flyer.status, FlyerStatus::Active);
    }

    #[tokio::test]
    async fn pre_rejection_short_circuits() {
        let f = fixture().await;
        let pre = f.store.seed_user(Role::PreApprover, vec![]);
        f.store.seed_user(Role::Approver, vec![]);
        let service = f.service(WorkflowPolicy {
            pre_approval_tiers: 1,
            ..Default::default()
        });
        service.submit(&f.supplier, f.flyer.id).await.unwrap();
        let flyer = service.pre_reject(&pre, f.flyer.id, Verdict::default()).await.unwrap();
        assert_eq!(flyer.status, FlyerStatus::Draft);
        assert_eq!(
            flyer.rejection_reason.as_deref(),
            Some(DEFAULT_PRE_REJECTION_REASON)
        );
    }

    #[tokio::test]
    async fn pre_rejection_needs_a_pre_approval_tier() {
        let f = fixture().await;
        let pre = f.store.seed_user(Role::PreApprover, vec![]);
        f.store.seed_user(Role::Approver, vec![]);
        let service = f.service(WorkflowPolicy::default());
        service.submit(&f.supplier, f.flyer.id).await.unwrap();

        let err = service
            .pre_reject(&pre, f.flyer.id, Verdict::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(msg) if msg.contains("no pre-approval tier")));
        assert_eq!(f.flyer().await.status, FlyerStatus::PendingApproval);
    }

    #[tokio::test]
    async fn naming_another_reviewers_approval_is_unauthorized() {
        let f = fixture().await;
        let a = f.store.seed_user(Role::Approver, vec![]);
        let b = f.store.seed_user(Role::Approver, vec![]);
        let service = f.service(WorkflowPolicy::default());
        service.submit(&f.supplier, f.flyer.id).await.unwrap();
        let theirs = f.store.get_approval(f.flyer.id, b.id).await.unwrap();
        let own = f.store.get_approval(f.flyer.id, a.id).await.unwrap();

        let err = service
            .approve(
                &a,
                f.flyer.id,
                Verdict {
                    approval_id: Some(theirs.id),
                    comment: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));
        let untouched = f.store.get_approval_by_id(theirs.id).await.unwrap();
        assert_eq!(untouched.status, ApprovalStatus::Pending);

        let flyer = service
            .approve(
                &a,
                f.flyer.id,
                Verdict {
                    approval_id: Some(own.id),
                    comment: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(flyer.status, FlyerStatus::Active);
    }

    /// Yields before every workflow call so concurrent decisions interleave.
    struct Interleaving(Arc<InMemoryStore>);

    #[async_trait]
    impl WorkflowRepository for Interleaving {
        async fn replace_workflow(
            &self,
            workflow: &ApprovalWorkflow,
            approvals: &[Approval],
        ) -> PortResult<()> {
            tokio::task::yield_now().await;
            self.0.replace_workflow(workflow, approvals).await
        }

        async fn get_workflow(&self, flyer_id: Uuid) -> PortResult<ApprovalWorkflow> {
            tokio::task::yield_now().await;
            self.0.get_workflow(flyer_id).await
        }

        async fn get_approval(&self, flyer_id: Uuid, approver_id: Uuid) -> PortResult<Approval> {
            tokio::task::yield_now().await;
            self.0.get_approval(flyer_id, approver_id).await
        }

        async fn get_approval_by_id(&self, approval_id: Uuid) -> PortResult<Approval> {
            tokio::task::yield_now().await;
            self.0.get_approval_by_id(approval_id).await
        }

        async fn list_approvals(&self, flyer_id: Uuid) -> PortResult<Vec<Approval>> {
            tokio::task::yield_now().await;
            self.0.list_approvals(flyer_id).await
        }

        async fn record_decision(&self, decision: &Decision) -> PortResult<DecisionOutcome> {
            tokio::task::yield_now().await;
            self.0.record_decision(decision).await
        }
    }

    #[tokio::test]
    async fn concurrent_approvals_publish_once_both_count() {
        let mut f = fixture().await;
        f.ports.workflows = Arc::new(Interleaving(f.store.clone()));
        let a = f.store.seed_user(Role::Approver, vec![]);
        let b = f.store.seed_user(Role::Approver, vec![]);
        let service = f.service(two_approvers());
        service.submit(&f.supplier, f.flyer.id).await.unwrap();

        let (first, second) = tokio::join!(
            service.approve(&a, f.flyer.id, Verdict::default()),
            service.approve(&b, f.flyer.id, Verdict::default()),
        );
        let statuses = [first.unwrap().status, second.unwrap().status];
        assert!(statuses.contains(&FlyerStatus::Active));

        let workflow = f.store.get_workflow(f.flyer.id).await.unwrap();
        assert_eq!(workflow.current_approvals, 2);
        assert!(workflow.is_complete);
        let flyer = f.flyer().await;
        assert_eq!(flyer.status, FlyerStatus::Active);
        assert!(flyer.published_at.is_some());
    }

    #[tokio::test]
    async fn failed_render_keeps_the_draft() {
        let f = fixture_with(Arc::new(StubRenderer { fail: true })).await;
        f.store.seed_user(Role::Approver, vec![]);
        let err = f
            .service(WorkflowPolicy::default())
            .submit(&f.supplier, f.flyer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Port(_)));
        assert_eq!(f.flyer().await.status, FlyerStatus::Draft);
        assert!(!f.store.has_workflow(f.flyer.id));
    }

    #[tokio::test]
    async fn notification_failures_do_not_roll_back() {
        let f = fixture().await;
        let a = f.store.seed_user(Role::Approver, vec![]);
        f.store.fail_notifications(true);
        let service = f.service(WorkflowPolicy::default());
        service.submit(&f.supplier, f.flyer.id).await.unwrap();
        let flyer = service.approve(&a, f.flyer.id, Verdict::default()).await.unwrap();
        assert_eq!(flyer.status, FlyerStatus::Active);
        assert!(f.store.notifications().is_empty());
    }

    #[tokio::test]
    async fn submit_cleanup_is_idempotent() {
        let f = fixture().await;
        f.store.seed_user(Role::Approver, vec![]);
        assert!(!f.store.has_workflow(f.flyer.id));
        let service = f.service(WorkflowPolicy::default());
        service.submit(&f.supplier, f.flyer.id).await.unwrap();
        assert!(f.store.has_workflow(f.flyer.id));
        assert_eq!(f.store.list_approvals(f.flyer.id).await.unwrap().len(), 1);

        // A retried submit on a pending flyer is refused before touching state.
        let err = service.submit(&f.supplier, f.flyer.id).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert_eq!(f.store.list_approvals(f.flyer.id).await.unwrap().len(), 1);
    }

    struct StrictPrices;

    #[async_trait]
    impl PriceValidator for StrictPrices {
        async fn check(&self, ean: &str, declared: DeclaredPrices) -> PortResult<PriceCheck> {
            Ok(PriceCheck {
                found: ean != "0000000000000",
                prices_match: declared.promo == Some(799.0),
            })
        }
    }

    #[tokio::test]
    async fn price_gate_lists_offending_eans() {
        let mut f = fixture().await;
        f.ports.prices = Some(Arc::new(StrictPrices));
        let page = f.store.list_pages(f.flyer.id).await.unwrap().remove(0);
        let mut slots = f.store.list_slots(page.id).await.unwrap();
        for (i, (ean, promo)) in [("8590000000001", 799.0), ("8590000000002", 899.0)]
            .into_iter()
            .enumerate()
        {
            let product = Product {
                id: Uuid::new_v4(),
                name: format!("Item {i}"),
                ean: Some(ean.into()),
                description: None,
                brand: None,
                image_key: None,
                icons: vec![],
                recommended_price: Some(999.0),
                promo_price: Some(promo),
                requires_energy_class: false,
            };
            slots[i].content = SlotContent::Product {
                product_id: product.id,
            };
            f.store.add_product(product);
        }
        f.store.update_slots(&slots).await.unwrap();

        let err = f
            .service(WorkflowPolicy::default())
            .submit(&f.supplier, f.flyer.id)
            .await
            .unwrap_err();
        match err {
            CoreError::ValidationFailed(msg) => {
                assert!(msg.contains("8590000000002"));
                assert!(!msg.contains("8590000000001"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn expiry_by_owner_and_sweep() {
        let f = fixture().await;
        let mut flyer = f.flyer().await;
        let service = f.service(WorkflowPolicy::default());
        let err = service.expire(&f.supplier, flyer.id).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));

        flyer.status = FlyerStatus::Active;
        f.store.update_flyer(&flyer).await.unwrap();
        let expired = service.expire(&f.supplier, flyer.id).await.unwrap();
        assert_eq!(expired.status, FlyerStatus::Expired);
        assert!(expired.valid_to.unwrap() < start_of_day(Utc::now()));

        let mut other = Flyer::new_draft(f.supplier.id, "Old", Utc::now());
        other.status = FlyerStatus::Active;
        other.valid_to = Some(start_of_day(Utc::now()) - Duration::hours(1));
        f.store.insert_flyer(&other).await.unwrap();
        let mut current = Flyer::new_draft(f.supplier.id, "Today", Utc::now());
        current.status = FlyerStatus::Active;
        current.valid_to = Some(start_of_day(Utc::now()));
        f.store.insert_flyer(&current).await.unwrap();

        assert_eq!(expire_overdue(f.store.as_ref(), Utc::now()).await.unwrap(), 1);
        assert_eq!(
            f.store.get_flyer(current.id).await.unwrap().status,
            FlyerStatus::Active
        );
    }
}
