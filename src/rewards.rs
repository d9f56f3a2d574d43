use crate::errors::StoreError;
use crate::models::{Redemption, RedemptionReceipt, Reward, RewardStatus};
use crate::points;
use crate::store::RewardsStore;
use serde::Serialize;
use tracing::{info, warn};

pub const DEFAULT_PAGE_SIZE: u32 = 12;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RedeemOutcome {
    Redeemed {
        reward: Reward,
        remaining_balance: i64,
    },
    InsufficientPoints {
        balance: i64,
        cost: i64,
    },
    NotAvailable {
        reward_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct StatusCounts {
    pub all: usize,
    pub unlocked: usize,
    pub locked: usize,
    pub coming_soon: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogPage {
    pub page: u32,
    pub page_size: u32,
    pub rewards: Vec<Reward>,
    pub counts: StatusCounts,
}

pub async fn list_rewards(
    store: &dyn RewardsStore,
    page: u32,
    page_size: u32,
) -> Result<Vec<Reward>, StoreError> {
    let page = page.max(1);
    let offset = (page as usize - 1) * page_size as usize;
    store.list_rewards(offset, page_size as usize).await
}

/// One catalog page filtered to `status`, with counts over the whole page.
pub async fn catalog_page(
    store: &dyn RewardsStore,
    page: u32,
    page_size: u32,
    status: Option<RewardStatus>,
) -> Result<CatalogPage, StoreError> {
    let rewards = list_rewards(store, page, page_size).await?;
    let counts = count_by_status(&rewards);
    let rewards = rewards
        .into_iter()
        .filter(|reward| status.is_none_or(|wanted| reward.status == wanted))
        .collect();

    Ok(CatalogPage {
        page: page.max(1),
        page_size,
        rewards,
        counts,
    })
}

pub fn count_by_status(rewards: &[Reward]) -> StatusCounts {
    rewards
        .iter()
        .fold(StatusCounts::default(), |mut counts, reward| {
            counts.all += 1;
            match reward.status {
                RewardStatus::Unlocked => counts.unlocked += 1,
                RewardStatus::Locked => counts.locked += 1,
                RewardStatus::ComingSoon => counts.coming_soon += 1,
            }
            counts
        })
}

/// The procedure re-checks availability and balance under its own lock.
pub async fn redeem(
    store: &dyn RewardsStore,
    user_id: &str,
    reward_id: &str,
) -> Result<RedeemOutcome, StoreError> {
    let reward = store
        .get_reward(reward_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("reward {reward_id}")))?;

    if reward.status == RewardStatus::ComingSoon {
        return Ok(RedeemOutcome::NotAvailable {
            reward_id: reward.id,
        });
    }

    let balance = points::get_balance(store, user_id).await?;
    if balance < reward.points {
        return Ok(RedeemOutcome::InsufficientPoints {
            balance,
            cost: reward.points,
        });
    }

    let receipt = match store.redeem_reward(user_id, reward_id).await {
        Ok(receipt) => receipt,
        Err(StoreError::InsufficientPoints { balance, cost }) => {
            return Ok(RedeemOutcome::InsufficientPoints { balance, cost });
        }
        Err(StoreError::RewardUnavailable(reward_id)) => {
            return Ok(RedeemOutcome::NotAvailable { reward_id });
        }
        Err(err) => return Err(err),
    };

    if let Err(err) = log_redemption(store, &receipt).await {
        warn!(receipt = %receipt.id, "redemption applied but not logged: {err}");
    }

    info!(user_id, reward_id, cost = receipt.cost, "reward redeemed");
    Ok(RedeemOutcome::Redeemed {
        reward: Reward {
            status: RewardStatus::Unlocked,
            ..reward
        },
        remaining_balance: balance - receipt.cost,
    })
}

pub async fn log_redemption(
    store: &dyn RewardsStore,
    receipt: &RedemptionReceipt,
) -> Result<bool, StoreError> {
    store
        .insert_redemption(Redemption {
            id: receipt.id.clone(),
            user_id: receipt.user_id.clone(),
            reward_id: receipt.reward_id.clone(),
            redeemed_at: receipt.redeemed_at,
        })
        .await
}
