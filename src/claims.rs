use crate::errors::StoreError;
use crate::models::{ClaimStatus, OfferClaim};
use crate::objects::ObjectStore;
use crate::store::RewardsStore;
use chrono::Utc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub const SCREENSHOT_BUCKET: &str = "reclaim-screenshots";
pub const DEFAULT_OFFER_POINTS: i64 = 25;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct OfferClaimRequest {
    pub email: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub reward_title: String,
    pub points: i64,
}

/// No points move here; a reviewer approves the claim out of band.
pub async fn submit_offer_claim(
    store: &dyn RewardsStore,
    objects: &dyn ObjectStore,
    user_id: &str,
    request: OfferClaimRequest,
) -> Result<OfferClaim, ClaimError> {
    let email = request.email.trim();
    if email.is_empty() {
        return Err(ClaimError::MissingField("email"));
    }
    if request.bytes.is_empty() || request.file_name.trim().is_empty() {
        return Err(ClaimError::MissingField("screenshot"));
    }

    let submitted_at = Utc::now();
    let object_name = format!(
        "{user_id}_{}.{}",
        submitted_at.timestamp_millis(),
        extension(&request.file_name)
    );
    let screenshot_path = objects
        .upload(SCREENSHOT_BUCKET, &object_name, &request.bytes)
        .await?;

    let claim = OfferClaim {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        email: email.to_string(),
        screenshot_path,
        points: request.points,
        reward_title: request.reward_title,
        status: ClaimStatus::Pending,
        submitted_at,
    };
    store.insert_offer_claim(claim.clone()).await?;

    info!(user_id, claim = %claim.id, "offer claim submitted");
    Ok(claim)
}

fn extension(file_name: &str) -> &str {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin")
}
