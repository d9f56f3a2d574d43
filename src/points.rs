use crate::errors::StoreError;
use crate::store::{PointsIncrement, RewardsStore};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("credit amount must be positive, got {0}")]
    NonPositiveCredit(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Current balance; a user without a row has zero points.
pub async fn get_balance(store: &dyn RewardsStore, user_id: &str) -> Result<i64, StoreError> {
    Ok(store.get_points(user_id).await?.unwrap_or_default())
}

pub async fn ensure_balance_row(
    store: &dyn RewardsStore,
    user_id: &str,
) -> Result<i64, StoreError> {
    store.ensure_points_row(user_id).await
}

/// Adds `amount` points once per `key`.
pub async fn credit(
    store: &dyn RewardsStore,
    user_id: &str,
    amount: i64,
    key: &str,
) -> Result<PointsIncrement, LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::NonPositiveCredit(amount));
    }
    Ok(store.increment_user_points(user_id, amount, key).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoreData;
    use crate::store::JsonStore;

    #[tokio::test]
    async fn balance_after_ensure_on_fresh_user_is_zero() {
        let store = JsonStore::in_memory(StoreData::default());
        assert_eq!(get_balance(&store, "new").await.unwrap(), 0);

        ensure_balance_row(&store, "new").await.unwrap();
        assert_eq!(get_balance(&store, "new").await.unwrap(), 0);
        assert_eq!(store.get_points("new").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn ensure_does_not_reset_existing_balance() {
        let store = JsonStore::in_memory(StoreData::default());
        credit(&store, "u1", 30, "bonus").await.unwrap();

        assert_eq!(ensure_balance_row(&store, "u1").await.unwrap(), 30);
        assert_eq!(get_balance(&store, "u1").await.unwrap(), 30);
    }

    #[tokio::test]
    async fn credit_rejects_non_positive_amounts() {
        let store = JsonStore::in_memory(StoreData::default());

        let err = credit(&store, "u1", 0, "zero").await.unwrap_err();
        assert!(matches!(err, LedgerError::NonPositiveCredit(0)));
        let err = credit(&store, "u1", -5, "neg").await.unwrap_err();
        assert!(matches!(err, LedgerError::NonPositiveCredit(-5)));
        assert_eq!(get_balance(&store, "u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_credits_are_not_lost() {
        let store = JsonStore::in_memory(StoreData::default());
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { credit(&store, "u1", 5, &format!("k{i}")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(get_balance(&store, "u1").await.unwrap(), 100);
    }
}
