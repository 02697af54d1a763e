//! crates/flyer_core/src/render.rs
//!
//! Assembles the renderer input: every page of a flyer with its slots resolved
//! against the catalog and the images loaded from the blob store.

use bytes::Bytes;
use uuid::Uuid;

use crate::domain::{Flyer, Page, Product, SlotContent, SLOTS_PER_PAGE};
use crate::error::{CoreError, CoreResult};
use crate::layout::{slot_contents, CellKind};
use crate::layout::geometry::MAX_ICONS;
use crate::ports::Collaborators;

/// Raw image bytes plus the key they came from.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub key: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct ProductCard {
    pub product_id: Uuid,
    pub name: String,
    pub brand_name: Option<String>,
    pub description: Option<String>,
    pub image: Option<ImageAsset>,
    /// At most four classification icons, in catalog order.
    pub icons: Vec<ImageAsset>,
    pub recommended_price: Option<f64>,
    pub promo_price: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum RenderSlot {
    Empty,
    Product(Box<ProductCard>),
    Promo {
        image: ImageAsset,
        size: crate::domain::PromoSize,
    },
}

impl RenderSlot {
    pub fn kind(&self) -> CellKind {
        match self {
            RenderSlot::Empty => CellKind::Empty,
            RenderSlot::Product(_) => CellKind::Product,
            RenderSlot::Promo { size, .. } => CellKind::Promo(*size),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderPage {
    pub page_number: u32,
    pub slots: [RenderSlot; SLOTS_PER_PAGE],
    /// Only ever set on page 1.
    pub footer: Option<ImageAsset>,
}

impl RenderPage {
    pub fn kinds(&self) -> [CellKind; SLOTS_PER_PAGE] {
        std::array::from_fn(|i| self.slots[i].kind())
    }
}

#[derive(Debug, Clone)]
pub struct FlyerDocument {
    pub flyer_id: Uuid,
    pub title: String,
    pub pages: Vec<RenderPage>,
}

/// Resolves every page of the flyer. Any missing product, promo or image fails the
/// whole document.
pub async fn assemble_document(ports: &Collaborators, flyer: &Flyer) -> CoreResult<FlyerDocument> {
    let pages = ports.flyers.list_pages(flyer.id).await?;
    let mut rendered = Vec::with_capacity(pages.len());
    for page in &pages {
        rendered.push(assemble_page(ports, page).await?);
    }
    Ok(FlyerDocument {
        flyer_id: flyer.id,
        title: flyer.name.clone(),
        pages: rendered,
    })
}

async fn assemble_page(ports: &Collaborators, page: &Page) -> CoreResult<RenderPage> {
    let rows = ports.flyers.list_slots(page.id).await?;
    let contents = slot_contents(&rows);

    let mut slots = Vec::with_capacity(SLOTS_PER_PAGE);
    for content in contents.iter() {
        let slot = match content {
            SlotContent::Empty => RenderSlot::Empty,
            SlotContent::Product { product_id } => {
                let product = ports.catalog.get_product(*product_id).await?;
                RenderSlot::Product(Box::new(product_card(ports, product).await?))
            }
            SlotContent::Promo {
                promo_image_id,
                promo_size,
            } => {
                let promo = ports.catalog.get_promo_image(*promo_image_id).await?;
                RenderSlot::Promo {
                    image: load_image(ports, &promo.image_key).await?,
                    size: *promo_size,
                }
            }
        };
        slots.push(slot);
    }
    let slots: [RenderSlot; SLOTS_PER_PAGE] = slots
        .try_into()
        .map_err(|_| CoreError::Port("page did not resolve to 8 slots".to_string()))?;

    let footer = match (page.page_number, page.footer_promo_image_id) {
        (1, Some(promo_id)) => {
            let promo = ports.catalog.get_promo_image(promo_id).await?;
            Some(load_image(ports, &promo.image_key).await?)
        }
        _ => None,
    };

    Ok(RenderPage {
        page_number: page.page_number,
        slots,
        footer,
    })
}

async fn product_card(ports: &Collaborators, product: Product) -> CoreResult<ProductCard> {
    let image = match &product.image_key {
        Some(key) => Some(load_image(ports, key).await?),
        None => None,
    };
    let mut icons = Vec::new();
    for key in product
        .icons
        .iter()
        .filter_map(|icon| icon.image_key.as_deref())
        .take(MAX_ICONS)
    {
        icons.push(load_image(ports, key).await?);
    }
    Ok(ProductCard {
        product_id: product.id,
        name: product.name,
        brand_name: product.brand.map(|b| b.name),
        description: product.description,
        image,
        icons,
        recommended_price: product.recommended_price,
        promo_price: product.promo_price,
    })
}

async fn load_image(ports: &Collaborators, key: &str) -> CoreResult<ImageAsset> {
    let blob = ports.blobs.get(key).await?;
    Ok(ImageAsset {
        key: key.to_string(),
        data: blob.data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Brand, Icon, PromoSize, Slot};
    use crate::memory::{InMemoryStore, StubRenderer};
    use chrono::Utc;
    use std::sync::Arc;

    #[tokio::test]
    async fn resolves_products_promos_and_first_page_footer() {
        let store = InMemoryStore::new();
        let ports = store.collaborators(Arc::new(StubRenderer::default()));
        store.add_blob("img/tv.png", b"tv", "image/png");
        store.add_blob("img/a.png", b"a", "image/png");
        store.add_blob("img/promo.png", b"promo", "image/png");

        let product = Product {
            id: Uuid::new_v4(),
            name: "TV".into(),
            ean: None,
            description: Some("Big".into()),
            brand: Some(Brand {
                id: Uuid::new_v4(),
                name: "Acme".into(),
            }),
            image_key: Some("img/tv.png".into()),
            icons: (0..6)
                .map(|i| Icon {
                    id: Uuid::new_v4(),
                    name: format!("icon {i}"),
                    image_key: Some("img/a.png".into()),
                    is_energy_class: i == 0,
                })
                .collect(),
            recommended_price: Some(1999.0),
            promo_price: Some(1499.0),
            requires_energy_class: false,
        };
        store.add_product(product.clone());
        let promo = crate::domain::PromoImage {
            id: Uuid::new_v4(),
            name: "Banner".into(),
            image_key: "img/promo.png".into(),
            brand: None,
        };
        store.add_promo_image(promo.clone());

        let flyer = Flyer::new_draft(Uuid::new_v4(), "Deals", Utc::now());
        ports.flyers.insert_flyer(&flyer).await.unwrap();
        for number in 1..=2u32 {
            let page = Page {
                id: Uuid::new_v4(),
                flyer_id: flyer.id,
                page_number: number,
                footer_promo_image_id: Some(promo.id),
            };
            let mut slots: Vec<Slot> = (0..8).map(|p| Slot::empty(page.id, p)).collect();
            slots[0].content = SlotContent::Product {
                product_id: product.id,
            };
            slots[2].content = SlotContent::Promo {
                promo_image_id: promo.id,
                promo_size: PromoSize::Horizontal,
            };
            ports.flyers.insert_page(&page, &slots).await.unwrap();
        }

        let document = assemble_document(&ports, &flyer).await.unwrap();
        assert_eq!(document.pages.len(), 2);
        let first = &document.pages[0];
        assert_eq!(first.page_number, 1);
        assert!(first.footer.is_some());
        assert!(document.pages[1].footer.is_none());
        match &first.slots[0] {
            RenderSlot::Product(card) => {
                assert_eq!(card.icons.len(), MAX_ICONS);
                assert_eq!(card.brand_name.as_deref(), Some("Acme"));
                assert!(card.image.is_some());
            }
            other => panic!("expected product, got {:?}", other),
        }
        assert_eq!(first.kinds()[2], CellKind::Promo(PromoSize::Horizontal));
        assert_eq!(first.kinds()[7], CellKind::Empty);
    }

    #[tokio::test]
    async fn missing_image_fails_the_document() {
        let store = InMemoryStore::new();
        let ports = store.collaborators(Arc::new(StubRenderer::default()));
        let promo = crate::domain::PromoImage {
            id: Uuid::new_v4(),
            name: "Banner".into(),
            image_key: "img/missing.png".into(),
            brand: None,
        };
        store.add_promo_image(promo.clone());
        let flyer = Flyer::new_draft(Uuid::new_v4(), "Deals", Utc::now());
        ports.flyers.insert_flyer(&flyer).await.unwrap();
        let page = Page {
            id: Uuid::new_v4(),
            flyer_id: flyer.id,
            page_number: 1,
            footer_promo_image_id: Some(promo.id),
        };
        let slots: Vec<Slot> = (0..8).map(|p| Slot::empty(page.id, p)).collect();
        ports.flyers.insert_page(&page, &slots).await.unwrap();

        let err = assemble_document(&ports, &flyer).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
