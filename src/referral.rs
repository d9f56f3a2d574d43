use crate::errors::StoreError;
use crate::models::{Profile, StreakRow};
use crate::points;
use crate::store::RewardsStore;
use chrono::Utc;
use rand::{Rng, distr::Alphanumeric};
use serde::Serialize;
use tracing::{debug, info, warn};

pub const DEFAULT_REFERRAL_BONUS: i64 = 25;

const CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ReferralStats {
    pub referrals: u32,
    pub points_earned: i64,
    pub referral_link: String,
}

pub fn generate_referral_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

pub fn referral_link(site_url: &str, code: &str) -> String {
    format!("{}/signup?ref={}", site_url.trim_end_matches('/'), code)
}

/// Referrer follow-ons are best effort; their failure is logged and the new
/// account stands.
pub async fn create_account(
    store: &dyn RewardsStore,
    user_id: &str,
    email: &str,
    referred_by: Option<&str>,
    bonus: i64,
) -> Result<Profile, StoreError> {
    let referred_by = referred_by
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string);

    let mut attempt = 0;
    let profile = loop {
        attempt += 1;
        let candidate = Profile {
            id: user_id.to_string(),
            email: email.to_string(),
            referral_code: generate_referral_code(),
            referred_by: referred_by.clone(),
            referral_count: 0,
            created_at: Utc::now(),
        };
        match store.insert_profile(candidate).await {
            Ok(profile) => break profile,
            Err(StoreError::Conflict(reason)) if attempt < CODE_ATTEMPTS => {
                warn!("retrying profile insert: {reason}");
            }
            Err(err) => return Err(err),
        }
    };

    store.ensure_points_row(&profile.id).await?;
    store.upsert_streak(&profile.id, StreakRow::default()).await?;

    if let Some(code) = profile.referred_by.as_deref() {
        credit_referrer(store, &profile.id, code, bonus).await;
    }

    info!(user_id = %profile.id, code = %profile.referral_code, "account created");
    Ok(profile)
}

async fn credit_referrer(store: &dyn RewardsStore, new_user_id: &str, code: &str, bonus: i64) {
    let referrer = match store.get_profile_by_code(code).await {
        Ok(Some(referrer)) => referrer,
        Ok(None) => {
            warn!(code, "unknown referral code, nobody credited");
            return;
        }
        Err(err) => {
            warn!(code, "referrer lookup failed: {err}");
            return;
        }
    };

    if referrer.id == new_user_id {
        return;
    }

    let key = format!("referral:{new_user_id}");
    match points::credit(store, &referrer.id, bonus, &key).await {
        Ok(increment) if increment.applied => {
            if let Err(err) = store.increment_profile_referrals(code, 1).await {
                warn!(code, "failed to bump referral count: {err}");
            }
        }
        Ok(_) => debug!(%key, "referral already counted"),
        Err(err) => warn!(referrer = %referrer.id, "failed to credit referral bonus: {err}"),
    }
}

pub async fn get_stats(
    store: &dyn RewardsStore,
    user_id: &str,
    site_url: &str,
) -> Result<ReferralStats, StoreError> {
    let Some(profile) = store.get_profile(user_id).await? else {
        return Ok(ReferralStats::default());
    };

    Ok(ReferralStats {
        referrals: profile.referral_count,
        points_earned: points::get_balance(store, user_id).await?,
        referral_link: referral_link(site_url, &profile.referral_code),
    })
}
