//! crates/flyer_core/src/placement.rs
//!
//! Page and slot mutations on draft flyers. Every change goes through the shared
//! span table in `layout::span`, so placement and PDF layout agree on coverage.

use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::completion::placed_products;
use crate::domain::{EditAction, Flyer, Page, PromoSize, Slot, SlotContent, User, SLOTS_PER_PAGE};
use crate::error::{CoreError, CoreResult};
use crate::flyers::{commit_edit, load_editable};
use crate::layout::{check_position, check_promo_anchor, slot_contents, validate_layout};
use crate::ports::Collaborators;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlacementPolicy {
    /// Reject products that require an energy label but carry no energy-class icon.
    pub require_energy_label: bool,
}

#[derive(Clone)]
pub struct PlacementService {
    ports: Collaborators,
    policy: PlacementPolicy,
}

impl PlacementService {
    pub fn new(ports: Collaborators, policy: PlacementPolicy) -> Self {
        Self { ports, policy }
    }

    /// Creates page `page_number` with its eight empty slots.
    pub async fn add_page(&self, actor: &User, flyer_id: Uuid, page_number: u32) -> CoreResult<Page> {
        if page_number == 0 {
            return Err(CoreError::ValidationFailed(
                "page numbers start at 1".to_string(),
            ));
        }
        let flyer = load_editable(&self.ports, actor, flyer_id).await?;
        let page = Page {
            id: Uuid::new_v4(),
            flyer_id: flyer.id,
            page_number,
            footer_promo_image_id: None,
        };
        let slots: Vec<Slot> = (0..SLOTS_PER_PAGE as u8)
            .map(|position| Slot::empty(page.id, position))
            .collect();
        self.ports.flyers.insert_page(&page, &slots).await?;

        info!(flyer_id = %flyer.id, page_number, "Page added");
        commit_edit(
            &self.ports,
            actor,
            flyer,
            EditAction::PageAdded,
            json!({ "pageId": page.id, "pageNumber": page_number }),
        )
        .await?;
        Ok(page)
    }

    pub async fn remove_page(&self, actor: &User, page_id: Uuid) -> CoreResult<()> {
        let (flyer, page) = self.editable_page(actor, page_id).await?;
        self.ports.flyers.delete_page(page.id).await?;
        info!(flyer_id = %flyer.id, page_number = page.page_number, "Page removed");
        commit_edit(
            &self.ports,
            actor,
            flyer,
            EditAction::PageRemoved,
            json!({ "pageId": page.id, "pageNumber": page.page_number }),
        )
        .await?;
        Ok(())
    }

    pub async fn place_product(
        &self,
        actor: &User,
        page_id: Uuid,
        position: u8,
        product_id: Uuid,
    ) -> CoreResult<Slot> {
        check_position(position)?;
        let (flyer, page) = self.editable_page(actor, page_id).await?;
        let rows = self.ports.flyers.list_slots(page.id).await?;
        let mut slot = slot_at(&rows, page.id, position)?;
        let product = self.ports.catalog.get_product(product_id).await?;

        if !slot.content.is_empty() {
            return Err(CoreError::InvalidState(format!(
                "position {} already holds a {}",
                position,
                slot.content.type_name()
            )));
        }
        let occupancy = validate_layout(&slot_contents(&rows), page.page_number)?;
        if let Some(anchor) = occupancy.owner_of(position) {
            return Err(CoreError::InvalidState(format!(
                "position {} is covered by the promo anchored at {}",
                position, anchor
            )));
        }
        let flyer_slots = self.ports.flyers.list_flyer_slots(flyer.id).await?;
        if placed_products(&flyer_slots).contains(&product.id) {
            return Err(CoreError::Conflict(format!(
                "product {} is already placed in this flyer",
                product.id
            )));
        }
        if self.policy.require_energy_label
            && product.requires_energy_class
            && !product.has_energy_class_icon()
        {
            return Err(CoreError::ValidationFailed(format!(
                "product {} needs an energy-class icon",
                product.id
            )));
        }

        slot.content = SlotContent::Product {
            product_id: product.id,
        };
        self.ports.flyers.update_slots(std::slice::from_ref(&slot)).await?;
        debug!(page_id = %page.id, position, product_id = %product.id, "Product placed");
        commit_edit(
            &self.ports,
            actor,
            flyer,
            EditAction::ProductPlaced,
            json!({ "pageId": page.id, "position": position, "productId": product.id }),
        )
        .await?;
        Ok(slot)
    }

    /// Anchors a promo at `position`; every cell its span covers must be empty.
    pub async fn place_promo(
        &self,
        actor: &User,
        page_id: Uuid,
        position: u8,
        promo_image_id: Uuid,
        promo_size: PromoSize,
    ) -> CoreResult<Slot> {
        check_position(position)?;
        let (flyer, page) = self.editable_page(actor, page_id).await?;
        let cells = check_promo_anchor(promo_size, position, page.page_number)?;
        let rows = self.ports.flyers.list_slots(page.id).await?;
        let mut slot = slot_at(&rows, page.id, position)?;
        self.ports.catalog.get_promo_image(promo_image_id).await?;

        let mut contents = slot_contents(&rows);
        let occupancy = validate_layout(&contents, page.page_number)?;
        if let Some(taken) = cells
            .iter()
            .find(|&&cell| !occupancy.is_free(cell) || !contents[cell as usize].is_empty())
        {
            return Err(CoreError::InvalidState(format!(
                "a {} promo at {} needs position {} to be empty",
                promo_size, position, taken
            )));
        }

        slot.content = SlotContent::Promo {
            promo_image_id,
            promo_size,
        };
        contents[position as usize] = slot.content;
        validate_layout(&contents, page.page_number)?;

        self.ports.flyers.update_slots(std::slice::from_ref(&slot)).await?;
        debug!(page_id = %page.id, position, size = %promo_size, ?cells, "Promo placed");
        commit_edit(
            &self.ports,
            actor,
            flyer,
            EditAction::PromoPlaced,
            json!({
                "pageId": page.id,
                "position": position,
                "promoImageId": promo_image_id,
                "promoSize": promo_size,
            }),
        )
        .await?;
        Ok(slot)
    }

    pub async fn remove_from_slot(&self, actor: &User, slot_id: Uuid) -> CoreResult<Slot> {
        let mut slot = self.ports.flyers.get_slot(slot_id).await?;
        let (flyer, page) = self.editable_page(actor, slot.page_id).await?;
        let previous = slot.content;
        slot.content = SlotContent::Empty;
        self.ports.flyers.update_slots(std::slice::from_ref(&slot)).await?;
        commit_edit(
            &self.ports,
            actor,
            flyer,
            EditAction::SlotCleared,
            json!({ "pageId": page.id, "position": slot.position, "previous": previous }),
        )
        .await?;
        Ok(slot)
    }

    /// Exchanges the contents of `slot_id` with whatever sits at `target_position`
    /// on the same page. Returns both slots, source first.
    pub async fn swap_slots(
        &self,
        actor: &User,
        slot_id: Uuid,
        target_position: u8,
    ) -> CoreResult<Vec<Slot>> {
        check_position(target_position)?;
        let source = self.ports.flyers.get_slot(slot_id).await?;
        let (flyer, page) = self.editable_page(actor, source.page_id).await?;
        let rows = self.ports.flyers.list_slots(page.id).await?;
        let target = slot_at(&rows, page.id, target_position)?;
        if target.id == source.id {
            return Ok(vec![source]);
        }

        let mut moved_source = source.clone();
        let mut moved_target = target.clone();
        moved_source.content = target.content;
        moved_target.content = source.content;

        let mut contents = slot_contents(&rows);
        contents[moved_source.position as usize] = moved_source.content;
        contents[moved_target.position as usize] = moved_target.content;
        validate_layout(&contents, page.page_number)
            .map_err(|e| CoreError::InvalidState(format!("swap rejected: {}", e)))?;

        let swapped = vec![moved_source, moved_target];
        self.ports.flyers.update_slots(&swapped).await?;
        commit_edit(
            &self.ports,
            actor,
            flyer,
            EditAction::SlotsSwapped,
            json!({
                "pageId": page.id,
                "from": source.position,
                "to": target_position,
            }),
        )
        .await?;
        Ok(swapped)
    }

    /// Sets or clears the footer band promo. Only page 1 has a footer band.
    pub async fn set_footer_promo(
        &self,
        actor: &User,
        page_id: Uuid,
        promo_image_id: Option<Uuid>,
    ) -> CoreResult<Page> {
        let (flyer, mut page) = self.editable_page(actor, page_id).await?;
        if page.page_number != 1 {
            return Err(CoreError::ValidationFailed(format!(
                "page {} has no footer band",
                page.page_number
            )));
        }
        if let Some(id) = promo_image_id {
            self.ports.catalog.get_promo_image(id).await?;
        }
        page.footer_promo_image_id = promo_image_id;
        self.ports.flyers.update_page(&page).await?;
        commit_edit(
            &self.ports,
            actor,
            flyer,
            EditAction::FooterChanged,
            json!({ "pageId": page.id, "promoImageId": promo_image_id }),
        )
        .await?;
        Ok(page)
    }

    async fn editable_page(&self, actor: &User, page_id: Uuid) -> CoreResult<(Flyer, Page)> {
        let page = self.ports.flyers.get_page(page_id).await?;
        let flyer = load_editable(&self.ports, actor, page.flyer_id).await?;
        Ok((flyer, page))
    }
}

fn slot_at(rows: &[Slot], page_id: Uuid, position: u8) -> CoreResult<Slot> {
    rows.iter()
        .find(|s| s.position == position)
        .cloned()
        .ok_or_else(|| {
            CoreError::NotFound(format!("slot {} of page {} not found", position, page_id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FlyerStatus, Icon, Product, PromoImage, Role};
    use crate::memory::{InMemoryStore, StubRenderer};
    use crate::ports::FlyerRepository;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::Arc;

    struct Fixture {
        store: Arc<InMemoryStore>,
        service: PlacementService,
        supplier: User,
        flyer: Flyer,
    }

    async fn fixture(policy: PlacementPolicy) -> Fixture {
        let store = InMemoryStore::new();
        let ports = store.collaborators(Arc::new(StubRenderer::default()));
        let supplier = store.seed_user(Role::Supplier, vec![]);
        let flyer = Flyer::new_draft(supplier.id, "Deals", Utc::now());
        store.insert_flyer(&flyer).await.unwrap();
        Fixture {
            service: PlacementService::new(ports, policy),
            store,
            supplier,
            flyer,
        }
    }

    fn product(store: &InMemoryStore) -> Uuid {
        let product = Product {
            id: Uuid::new_v4(),
            name: "Kettle".into(),
            ean: Some("8590000000001".into()),
            description: None,
            brand: None,
            image_key: None,
            icons: vec![],
            recommended_price: Some(999.0),
            promo_price: Some(799.0),
            requires_energy_class: false,
        };
        let id = product.id;
        store.add_product(product);
        id
    }

    fn promo(store: &InMemoryStore) -> Uuid {
        let promo = PromoImage {
            id: Uuid::new_v4(),
            name: "Banner".into(),
            image_key: "promo/banner.png".into(),
            brand: None,
        };
        let id = promo.id;
        store.add_promo_image(promo);
        id
    }

    async fn contents(store: &InMemoryStore, page_id: Uuid) -> Vec<SlotContent> {
        store
            .list_slots(page_id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.content)
            .collect()
    }

    #[tokio::test]
    async fn pages_get_eight_slots_and_unique_numbers() {
        let f = fixture(PlacementPolicy::default()).await;
        let page = f.service.add_page(&f.supplier, f.flyer.id, 1).await.unwrap();

        let slots = f.store.list_slots(page.id).await.unwrap();
        let positions: Vec<u8> = slots.iter().map(|s| s.position).collect();
        assert_eq!(positions, (0..8).collect::<Vec<u8>>());
        assert!(slots.iter().all(|s| s.content.is_empty()));

        let err = f.service.add_page(&f.supplier, f.flyer.id, 1).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        let err = f.service.add_page(&f.supplier, f.flyer.id, 0).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));

        f.service.remove_page(&f.supplier, page.id).await.unwrap();
        assert!(f.store.list_slots(page.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_flyer_reaches_hundred_percent() {
        let mut f = fixture(PlacementPolicy::default()).await;
        f.flyer.valid_from = Some(Utc::now());
        f.flyer.valid_to = Some(Utc::now());
        f.store.update_flyer(&f.flyer).await.unwrap();

        for number in 1..=2 {
            let page = f.service.add_page(&f.supplier, f.flyer.id, number).await.unwrap();
            for position in 0..4 {
                let id = product(&f.store);
                f.service
                    .place_product(&f.supplier, page.id, position, id)
                    .await
                    .unwrap();
            }
        }
        let flyer = f.store.get_flyer(f.flyer.id).await.unwrap();
        assert_eq!(flyer.completion_percentage, 100);
    }

    #[tokio::test]
    async fn product_placement_rules() {
        let f = fixture(PlacementPolicy::default()).await;
        let first = f.service.add_page(&f.supplier, f.flyer.id, 1).await.unwrap();
        let second = f.service.add_page(&f.supplier, f.flyer.id, 2).await.unwrap();
        let kettle = product(&f.store);

        let err = f
            .service
            .place_product(&f.supplier, first.id, 8, kettle)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
        let err = f
            .service
            .place_product(&f.supplier, first.id, 0, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        f.service.place_product(&f.supplier, first.id, 0, kettle).await.unwrap();
        let err = f
            .service
            .place_product(&f.supplier, first.id, 0, product(&f.store))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));

        // Same product on another page of the same flyer.
        let err = f
            .service
            .place_product(&f.supplier, second.id, 3, kettle)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let slots = f.store.list_flyer_slots(f.flyer.id).await.unwrap();
        let placed = placed_products(&slots);
        let unique: HashSet<_> = placed.iter().collect();
        assert_eq!(placed.len(), unique.len());
    }

    #[tokio::test]
    async fn energy_label_is_enforced_when_configured() {
        let f = fixture(PlacementPolicy {
            require_energy_label: true,
        })
        .await;
        let page = f.service.add_page(&f.supplier, f.flyer.id, 1).await.unwrap();
        let mut fridge = Product {
            id: Uuid::new_v4(),
            name: "Fridge".into(),
            ean: None,
            description: None,
            brand: None,
            image_key: None,
            icons: vec![],
            recommended_price: None,
            promo_price: None,
            requires_energy_class: true,
        };
        f.store.add_product(fridge.clone());
        let err = f
            .service
            .place_product(&f.supplier, page.id, 0, fridge.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));

        fridge.icons.push(Icon {
            id: Uuid::new_v4(),
            name: "A++".into(),
            image_key: None,
            is_energy_class: true,
        });
        f.store.add_product(fridge.clone());
        f.service
            .place_product(&f.supplier, page.id, 0, fridge.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn square_promo_must_start_in_left_column() {
        let f = fixture(PlacementPolicy::default()).await;
        let page = f.service.add_page(&f.supplier, f.flyer.id, 1).await.unwrap();
        let banner = promo(&f.store);

        let err = f
            .service
            .place_promo(&f.supplier, page.id, 1, banner, PromoSize::Square)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));

        f.service
            .place_promo(&f.supplier, page.id, 0, banner, PromoSize::Square)
            .await
            .unwrap();
        let rows = f.store.list_slots(page.id).await.unwrap();
        let occupancy = validate_layout(&slot_contents(&rows), 1).unwrap();
        for cell in 0..4 {
            assert_eq!(occupancy.owner_of(cell), Some(0));
        }
        assert!(occupancy.is_free(4));

        // Covered cells take no products.
        let err = f
            .service
            .place_product(&f.supplier, page.id, 3, product(&f.store))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[tokio::test]
    async fn promo_span_needs_empty_cells() {
        let f = fixture(PlacementPolicy::default()).await;
        let page = f.service.add_page(&f.supplier, f.flyer.id, 1).await.unwrap();
        f.service
            .place_product(&f.supplier, page.id, 5, product(&f.store))
            .await
            .unwrap();
        let err = f
            .service
            .place_promo(&f.supplier, page.id, 4, promo(&f.store), PromoSize::Horizontal)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        let err = f
            .service
            .place_promo(&f.supplier, page.id, 0, promo(&f.store), PromoSize::FullPage)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        let err = f
            .service
            .place_promo(&f.supplier, page.id, 0, promo(&f.store), PromoSize::Footer)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn header_promos_stay_on_first_page_top_row() {
        let f = fixture(PlacementPolicy::default()).await;
        let first = f.service.add_page(&f.supplier, f.flyer.id, 1).await.unwrap();
        let second = f.service.add_page(&f.supplier, f.flyer.id, 2).await.unwrap();
        let banner = promo(&f.store);

        for (page, anchor) in [(second.id, 0), (first.id, 2)] {
            let err = f
                .service
                .place_promo(&f.supplier, page, anchor, banner, PromoSize::Header2x1)
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidState(_)));
        }
        f.service
            .place_promo(&f.supplier, first.id, 0, banner, PromoSize::Header2x1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn swap_round_trip_restores_layout() {
        let f = fixture(PlacementPolicy::default()).await;
        let page = f.service.add_page(&f.supplier, f.flyer.id, 1).await.unwrap();
        let a = f
            .service
            .place_product(&f.supplier, page.id, 1, product(&f.store))
            .await
            .unwrap();
        f.service
            .place_product(&f.supplier, page.id, 6, product(&f.store))
            .await
            .unwrap();
        let before = contents(&f.store, page.id).await;

        let swapped = f.service.swap_slots(&f.supplier, a.id, 6).await.unwrap();
        let b = swapped[1].clone();
        assert_eq!(swapped[0].content, before[6]);
        assert_eq!(b.content, before[1]);

        f.service.swap_slots(&f.supplier, b.id, 1).await.unwrap();
        assert_eq!(contents(&f.store, page.id).await, before);
    }

    #[tokio::test]
    async fn swap_rejects_broken_spans() {
        let f = fixture(PlacementPolicy::default()).await;
        let page = f.service.add_page(&f.supplier, f.flyer.id, 1).await.unwrap();
        let wide = f
            .service
            .place_promo(&f.supplier, page.id, 0, promo(&f.store), PromoSize::Horizontal)
            .await
            .unwrap();
        // Moving the anchor to the right column would push the span off the grid.
        let err = f.service.swap_slots(&f.supplier, wide.id, 3).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        // Moving it down a row is fine.
        f.service.swap_slots(&f.supplier, wide.id, 4).await.unwrap();
        let after = contents(&f.store, page.id).await;
        assert!(after[0].is_empty());
        assert!(matches!(after[4], SlotContent::Promo { .. }));
    }

    #[tokio::test]
    async fn cleared_slot_can_be_refilled() {
        let f = fixture(PlacementPolicy::default()).await;
        let page = f.service.add_page(&f.supplier, f.flyer.id, 1).await.unwrap();
        let kettle = product(&f.store);
        let slot = f
            .service
            .place_product(&f.supplier, page.id, 2, kettle)
            .await
            .unwrap();
        let cleared = f.service.remove_from_slot(&f.supplier, slot.id).await.unwrap();
        assert!(cleared.content.is_empty());
        f.service
            .place_product(&f.supplier, page.id, 7, kettle)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn footer_only_on_first_page() {
        let f = fixture(PlacementPolicy::default()).await;
        let first = f.service.add_page(&f.supplier, f.flyer.id, 1).await.unwrap();
        let second = f.service.add_page(&f.supplier, f.flyer.id, 2).await.unwrap();
        let banner = promo(&f.store);

        let page = f
            .service
            .set_footer_promo(&f.supplier, first.id, Some(banner))
            .await
            .unwrap();
        assert_eq!(page.footer_promo_image_id, Some(banner));
        let err = f
            .service
            .set_footer_promo(&f.supplier, second.id, Some(banner))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn only_drafts_and_owners_may_edit() {
        let f = fixture(PlacementPolicy::default()).await;
        let page = f.service.add_page(&f.supplier, f.flyer.id, 1).await.unwrap();
        let stranger = f.store.seed_user(Role::Supplier, vec![]);
        let err = f
            .service
            .place_product(&stranger, page.id, 0, product(&f.store))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let mut flyer = f.store.get_flyer(f.flyer.id).await.unwrap();
        flyer.status = FlyerStatus::PendingApproval;
        flyer.is_draft = false;
        f.store.update_flyer(&flyer).await.unwrap();
        let err = f
            .service
            .place_product(&f.supplier, page.id, 0, product(&f.store))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }
}
