//! services/api/src/web/protocol.rs
//!
//! Request payloads accepted by the REST API.

use chrono::{DateTime, Utc};
use flyer_core::domain::PromoSize;
use flyer_core::{FlyerPatch, NewFlyer};
use serde::{Deserialize, Deserializer};
use utoipa::ToSchema;
use uuid::Uuid;

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct CreateFlyerRequest {
    pub name: String,
    pub action_reference: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl From<CreateFlyerRequest> for NewFlyer {
    fn from(req: CreateFlyerRequest) -> Self {
        NewFlyer {
            name: req.name,
            action_reference: req.action_reference,
            valid_from: req.valid_from,
            valid_to: req.valid_to,
        }
    }
}

/// Partial update of a draft. Send `null` to clear an optional field.
#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct UpdateFlyerRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub action_reference: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub valid_from: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub valid_to: Option<Option<DateTime<Utc>>>,
}

impl From<UpdateFlyerRequest> for FlyerPatch {
    fn from(req: UpdateFlyerRequest) -> Self {
        FlyerPatch {
            name: req.name,
            action_reference: req.action_reference,
            valid_from: req.valid_from,
            valid_to: req.valid_to,
        }
    }
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct AddPageRequest {
    pub page_number: u32,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct PlaceProductRequest {
    pub product_id: Uuid,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct PlacePromoRequest {
    pub promo_image_id: Uuid,
    /// One of `single`, `horizontal`, `square`, `full_page`, `footer`, `header_2x1`, `header_2x2`.
    #[schema(value_type = String)]
    pub promo_size: PromoSize,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct FooterRequest {
    /// `null` clears the footer.
    pub promo_image_id: Option<Uuid>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct SwapRequest {
    pub target_position: u8,
}

/// Optional reviewer comment. For rejections it becomes the rejection reason.
#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct DecisionRequest {
    /// The approval record to decide; the caller's own record when omitted.
    #[serde(default)]
    pub approval_id: Option<Uuid>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_separates_null_from_absent() {
        let req: UpdateFlyerRequest =
            serde_json::from_str(r#"{"action_reference": null, "name": "Winter"}"#).unwrap();
        let patch = FlyerPatch::from(req);
        assert_eq!(patch.name.as_deref(), Some("Winter"));
        assert_eq!(patch.action_reference, Some(None));
        assert_eq!(patch.valid_from, None);
    }

    #[test]
    fn promo_sizes_use_wire_names() {
        let req: PlacePromoRequest = serde_json::from_str(
            r#"{"promo_image_id": "7f0c1c5e-1b8a-4c7e-9a51-1f5d3e0b9a10", "promo_size": "header_2x1"}"#,
        )
        .unwrap();
        assert_eq!(req.promo_size, PromoSize::Header2x1);
    }
}
