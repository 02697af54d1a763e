//! crates/flyer_core/src/view.rs
//!
//! The flyer tree handed to clients: every page carries a dense 8-slot array.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Flyer, FlyerStatus, Page, Slot, SLOTS_PER_PAGE};
use crate::layout::{materialize_slots, SlotView};

/// Explicit configuration for building client-facing URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOptions {
    pub public_base_url: String,
}

impl ViewOptions {
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub id: Uuid,
    pub page_number: u32,
    pub footer_promo_image_id: Option<Uuid>,
    pub slots: [SlotView; SLOTS_PER_PAGE],
}

#[derive(Debug, Clone, Serialize)]
pub struct FlyerView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub action_reference: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub status: FlyerStatus,
    pub is_draft: bool,
    pub rejection_reason: Option<String>,
    pub completion_percentage: u8,
    pub last_edited_at: DateTime<Utc>,
    pub auto_save_version: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub pdf_url: Option<String>,
    pub pages: Vec<PageView>,
}

/// Builds the client tree from stored rows. `slots` may span several pages and be sparse.
pub fn project_flyer(flyer: &Flyer, pages: &[Page], slots: &[Slot], options: &ViewOptions) -> FlyerView {
    let mut pages: Vec<&Page> = pages.iter().collect();
    pages.sort_by_key(|p| p.page_number);
    let pages = pages
        .into_iter()
        .map(|page| {
            let rows: Vec<Slot> = slots
                .iter()
                .filter(|s| s.page_id == page.id)
                .cloned()
                .collect();
            PageView {
                id: page.id,
                page_number: page.page_number,
                footer_promo_image_id: page.footer_promo_image_id,
                slots: materialize_slots(&rows),
            }
        })
        .collect();

    FlyerView {
        id: flyer.id,
        owner_id: flyer.owner_id,
        name: flyer.name.clone(),
        action_reference: flyer.action_reference.clone(),
        valid_from: flyer.valid_from,
        valid_to: flyer.valid_to,
        status: flyer.status,
        is_draft: flyer.is_draft,
        rejection_reason: flyer.rejection_reason.clone(),
        completion_percentage: flyer.completion_percentage,
        last_edited_at: flyer.last_edited_at,
        auto_save_version: flyer.auto_save_version,
        published_at: flyer.published_at,
        pdf_url: flyer
            .pdf
            .as_ref()
            .map(|_| options.url(&format!("flyers/{}/pdf", flyer.id))),
        pages,
    }
}
