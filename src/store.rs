use crate::errors::StoreError;
use crate::models::{
    Credential, OfferClaim, PointGrant, Profile, Redemption, RedemptionReceipt, Reward,
    RewardStatus, StoreData, StreakRow,
};
use crate::storage::{load_data, persist_data};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsIncrement {
    pub balance: i64,
    /// False when the idempotency key had already been applied.
    pub applied: bool,
}

#[async_trait]
pub trait RewardsStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError>;

    async fn get_profile_by_code(&self, code: &str) -> Result<Option<Profile>, StoreError>;

    async fn insert_profile(&self, profile: Profile) -> Result<Profile, StoreError>;

    async fn get_points(&self, user_id: &str) -> Result<Option<i64>, StoreError>;

    async fn ensure_points_row(&self, user_id: &str) -> Result<i64, StoreError>;

    async fn get_streak(&self, user_id: &str) -> Result<Option<StreakRow>, StoreError>;

    async fn upsert_streak(&self, user_id: &str, row: StreakRow) -> Result<(), StoreError>;

    async fn list_rewards(&self, offset: usize, limit: usize) -> Result<Vec<Reward>, StoreError>;

    async fn get_reward(&self, reward_id: &str) -> Result<Option<Reward>, StoreError>;

    /// Appends a redemption log entry. Returns false if the id is already logged.
    async fn insert_redemption(&self, redemption: Redemption) -> Result<bool, StoreError>;

    async fn list_redemptions(&self, user_id: &str) -> Result<Vec<Redemption>, StoreError>;

    async fn insert_offer_claim(&self, claim: OfferClaim) -> Result<(), StoreError>;

    async fn get_credential(&self, email: &str) -> Result<Option<Credential>, StoreError>;

    async fn insert_credential(&self, credential: Credential) -> Result<(), StoreError>;

    async fn delete_credential(&self, email: &str) -> Result<(), StoreError>;

    /// Atomically adds `amount` to the balance unless `key` was already granted.
    async fn increment_user_points(
        &self,
        user_id: &str,
        amount: i64,
        key: &str,
    ) -> Result<PointsIncrement, StoreError>;

    async fn increment_profile_referrals(&self, code: &str, by: u32) -> Result<u32, StoreError>;

    /// Atomically checks availability and balance, debits the cost and unlocks the reward.
    async fn redeem_reward(
        &self,
        user_id: &str,
        reward_id: &str,
    ) -> Result<RedemptionReceipt, StoreError>;

    async fn streaks_claimed_on(&self, date: NaiveDate)
    -> Result<Vec<(String, StreakRow)>, StoreError>;

    async fn has_grant(&self, key: &str) -> Result<bool, StoreError>;

    async fn redemption_receipts(&self) -> Result<Vec<RedemptionReceipt>, StoreError>;
}

#[derive(Clone)]
pub struct JsonStore {
    data_path: Option<PathBuf>,
    data: Arc<Mutex<StoreData>>,
}

impl JsonStore {
    /// Fails on an unreadable or malformed file rather than starting empty
    /// over it.
    pub async fn open(data_path: PathBuf) -> Result<Self, StoreError> {
        let data = load_data(&data_path).await?;
        Ok(Self {
            data_path: Some(data_path),
            data: Arc::new(Mutex::new(data)),
        })
    }

    pub fn in_memory(data: StoreData) -> Self {
        Self {
            data_path: None,
            data: Arc::new(Mutex::new(data)),
        }
    }

    pub async fn snapshot(&self) -> StoreData {
        self.data.lock().await.clone()
    }

    async fn commit(&self, data: &StoreData) -> Result<(), StoreError> {
        match &self.data_path {
            Some(path) => persist_data(path, data).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RewardsStore for JsonStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        let data = self.data.lock().await;
        Ok(data.profiles.get(user_id).cloned())
    }

    async fn get_profile_by_code(&self, code: &str) -> Result<Option<Profile>, StoreError> {
        let data = self.data.lock().await;
        Ok(data
            .profiles
            .values()
            .find(|profile| profile.referral_code == code)
            .cloned())
    }

    async fn insert_profile(&self, profile: Profile) -> Result<Profile, StoreError> {
        let mut data = self.data.lock().await;
        if data.profiles.contains_key(&profile.id) {
            return Err(StoreError::Conflict(format!("profile {} exists", profile.id)));
        }
        if data
            .profiles
            .values()
            .any(|existing| existing.referral_code == profile.referral_code)
        {
            return Err(StoreError::Conflict(format!(
                "referral code {} is taken",
                profile.referral_code
            )));
        }
        data.profiles.insert(profile.id.clone(), profile.clone());
        self.commit(&data).await?;
        Ok(profile)
    }

    async fn get_points(&self, user_id: &str) -> Result<Option<i64>, StoreError> {
        let data = self.data.lock().await;
        Ok(data.user_points.get(user_id).copied())
    }

    async fn ensure_points_row(&self, user_id: &str) -> Result<i64, StoreError> {
        let mut data = self.data.lock().await;
        if let Some(points) = data.user_points.get(user_id) {
            return Ok(*points);
        }
        data.user_points.insert(user_id.to_string(), 0);
        self.commit(&data).await?;
        Ok(0)
    }

    async fn get_streak(&self, user_id: &str) -> Result<Option<StreakRow>, StoreError> {
        let data = self.data.lock().await;
        Ok(data.streaks.get(user_id).copied())
    }

    async fn upsert_streak(&self, user_id: &str, row: StreakRow) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.streaks.insert(user_id.to_string(), row);
        self.commit(&data).await
    }

    async fn list_rewards(&self, offset: usize, limit: usize) -> Result<Vec<Reward>, StoreError> {
        let data = self.data.lock().await;
        Ok(data.rewards.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn get_reward(&self, reward_id: &str) -> Result<Option<Reward>, StoreError> {
        let data = self.data.lock().await;
        Ok(data.rewards.iter().find(|reward| reward.id == reward_id).cloned())
    }

    async fn insert_redemption(&self, redemption: Redemption) -> Result<bool, StoreError> {
        let mut data = self.data.lock().await;
        if data
            .reward_redemptions
            .iter()
            .any(|existing| existing.id == redemption.id)
        {
            return Ok(false);
        }
        data.reward_redemptions.push(redemption);
        self.commit(&data).await?;
        Ok(true)
    }

    async fn list_redemptions(&self, user_id: &str) -> Result<Vec<Redemption>, StoreError> {
        let data = self.data.lock().await;
        Ok(data
            .reward_redemptions
            .iter()
            .filter(|redemption| redemption.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_offer_claim(&self, claim: OfferClaim) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.reward_claims.push(claim);
        self.commit(&data).await
    }

    async fn get_credential(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        let data = self.data.lock().await;
        Ok(data.credentials.get(email).cloned())
    }

    async fn insert_credential(&self, credential: Credential) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        if data.credentials.contains_key(&credential.email) {
            return Err(StoreError::Conflict(format!(
                "{} is already registered",
                credential.email
            )));
        }
        data.credentials.insert(credential.email.clone(), credential);
        self.commit(&data).await
    }

    async fn delete_credential(&self, email: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        if data.credentials.remove(email).is_some() {
            self.commit(&data).await?;
        }
        Ok(())
    }

    async fn increment_user_points(
        &self,
        user_id: &str,
        amount: i64,
        key: &str,
    ) -> Result<PointsIncrement, StoreError> {
        let mut data = self.data.lock().await;
        if data.point_grants.contains_key(key) {
            debug!(key, "grant already applied");
            let balance = data.user_points.get(user_id).copied().unwrap_or_default();
            return Ok(PointsIncrement {
                balance,
                applied: false,
            });
        }

        let balance = {
            let entry = data.user_points.entry(user_id.to_string()).or_default();
            *entry = entry.saturating_add(amount);
            *entry
        };
        data.point_grants.insert(
            key.to_string(),
            PointGrant {
                key: key.to_string(),
                user_id: user_id.to_string(),
                amount,
                granted_at: Utc::now(),
            },
        );
        self.commit(&data).await?;

        Ok(PointsIncrement {
            balance,
            applied: true,
        })
    }

    async fn increment_profile_referrals(&self, code: &str, by: u32) -> Result<u32, StoreError> {
        let mut data = self.data.lock().await;
        let count = {
            let profile = data
                .profiles
                .values_mut()
                .find(|profile| profile.referral_code == code)
                .ok_or_else(|| StoreError::NotFound(format!("referral code {code}")))?;
            profile.referral_count = profile.referral_count.saturating_add(by);
            profile.referral_count
        };
        self.commit(&data).await?;
        Ok(count)
    }

    async fn redeem_reward(
        &self,
        user_id: &str,
        reward_id: &str,
    ) -> Result<RedemptionReceipt, StoreError> {
        let mut data = self.data.lock().await;
        let reward = data
            .rewards
            .iter()
            .find(|reward| reward.id == reward_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("reward {reward_id}")))?;

        if reward.status == RewardStatus::ComingSoon {
            return Err(StoreError::RewardUnavailable(reward.id));
        }

        let balance = data.user_points.get(user_id).copied().unwrap_or_default();
        if balance < reward.points {
            return Err(StoreError::InsufficientPoints {
                balance,
                cost: reward.points,
            });
        }

        data.user_points
            .insert(user_id.to_string(), balance - reward.points);
        if let Some(row) = data.rewards.iter_mut().find(|row| row.id == reward_id) {
            row.status = RewardStatus::Unlocked;
        }

        let receipt = RedemptionReceipt {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            reward_id: reward.id,
            cost: reward.points,
            redeemed_at: Utc::now(),
        };
        data.redemption_receipts.push(receipt.clone());
        self.commit(&data).await?;

        Ok(receipt)
    }

    async fn streaks_claimed_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<(String, StreakRow)>, StoreError> {
        let data = self.data.lock().await;
        Ok(data
            .streaks
            .iter()
            .filter(|(_, row)| row.last_claim == Some(date))
            .map(|(user_id, row)| (user_id.clone(), *row))
            .collect())
    }

    async fn has_grant(&self, key: &str) -> Result<bool, StoreError> {
        let data = self.data.lock().await;
        Ok(data.point_grants.contains_key(key))
    }

    async fn redemption_receipts(&self) -> Result<Vec<RedemptionReceipt>, StoreError> {
        let data = self.data.lock().await;
        Ok(data.redemption_receipts.clone())
    }
}
