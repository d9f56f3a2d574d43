use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub referral_count: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StreakRow {
    pub streak_count: u32,
    pub last_claim: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardStatus {
    Unlocked,
    Locked,
    ComingSoon,
}

impl RewardStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unlocked" => Some(Self::Unlocked),
            "locked" => Some(Self::Locked),
            "coming_soon" => Some(Self::ComingSoon),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub title: String,
    pub description: String,
    pub points: i64,
    pub status: RewardStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub id: String,
    pub user_id: String,
    pub reward_id: String,
    pub redeemed_at: DateTime<Utc>,
}

/// Returned by the `redeem_reward` procedure once the debit is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionReceipt {
    pub id: String,
    pub user_id: String,
    pub reward_id: String,
    pub cost: i64,
    pub redeemed_at: DateTime<Utc>,
}

/// Record of an applied points credit, keyed so replays are no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointGrant {
    pub key: String,
    pub user_id: String,
    pub amount: i64,
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferClaim {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub screenshot_path: String,
    pub points: i64,
    pub reward_title: String,
    pub status: ClaimStatus,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreData {
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(default)]
    pub user_points: BTreeMap<String, i64>,
    #[serde(default)]
    pub streaks: BTreeMap<String, StreakRow>,
    #[serde(default)]
    pub rewards: Vec<Reward>,
    #[serde(default)]
    pub reward_redemptions: Vec<Redemption>,
    #[serde(default)]
    pub redemption_receipts: Vec<RedemptionReceipt>,
    #[serde(default)]
    pub point_grants: BTreeMap<String, PointGrant>,
    #[serde(default)]
    pub reward_claims: Vec<OfferClaim>,
    #[serde(default)]
    pub credentials: BTreeMap<String, Credential>,
}

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default, alias = "ref")]
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignUpResponse {
    pub token: String,
    pub profile: Profile,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub points: i64,
}

#[derive(Debug, Deserialize)]
pub struct RewardsQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimQuery {
    pub email: Option<String>,
    pub file_name: Option<String>,
    pub reward_title: Option<String>,
}
