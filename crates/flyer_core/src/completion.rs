//! crates/flyer_core/src/completion.rs
//!
//! The completion score shown to suppliers as progress. Informational only:
//! submission has its own required-field checks.

use uuid::Uuid;

use crate::domain::{Flyer, Slot, SlotContent};
use crate::ports::{FlyerRepository, PortResult};

const METADATA_FIELD_WEIGHT: f64 = 10.0;
const TARGET_PAGES: f64 = 2.0;
const PAGES_WEIGHT: f64 = 30.0;
const TARGET_PRODUCTS: f64 = 8.0;
const PRODUCTS_WEIGHT: f64 = 40.0;

/// Scores a flyer in `0..=100` from its metadata, page count and placed products.
pub fn score(flyer: &Flyer, page_count: usize, product_slots: usize) -> u8 {
    let mut total = 0.0;
    if !flyer.name.trim().is_empty() {
        total += METADATA_FIELD_WEIGHT;
    }
    if flyer.valid_from.is_some() {
        total += METADATA_FIELD_WEIGHT;
    }
    if flyer.valid_to.is_some() {
        total += METADATA_FIELD_WEIGHT;
    }
    total += (page_count as f64 / TARGET_PAGES * PAGES_WEIGHT).min(PAGES_WEIGHT);
    total += (product_slots as f64 / TARGET_PRODUCTS * PRODUCTS_WEIGHT).min(PRODUCTS_WEIGHT);
    total.round().clamp(0.0, 100.0) as u8
}

/// Reads the flyer's page and product counts and returns its current score.
pub async fn measure(repo: &dyn FlyerRepository, flyer: &Flyer) -> PortResult<u8> {
    let pages = repo.list_pages(flyer.id).await?;
    let products = count_products(&repo.list_flyer_slots(flyer.id).await?);
    Ok(score(flyer, pages.len(), products))
}

fn count_products(slots: &[Slot]) -> usize {
    slots
        .iter()
        .filter(|s| matches!(s.content, SlotContent::Product { .. }))
        .count()
}

/// Ids of every product placed anywhere in the flyer.
pub fn placed_products(slots: &[Slot]) -> Vec<Uuid> {
    slots
        .iter()
        .filter_map(|s| match s.content {
            SlotContent::Product { product_id } => Some(product_id),
            _ => None,
        })
        .collect()
}
