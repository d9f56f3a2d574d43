use crate::errors::StoreError;
use crate::points::{self, LedgerError};
use crate::rewards::log_redemption;
use crate::store::RewardsStore;
use crate::streak::claim_key;
use chrono::NaiveDate;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, time::interval};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct ReconcileReport {
    pub claims_credited: usize,
    pub redemptions_logged: usize,
}

/// Yesterday is swept too: its unpaid claims stay visible until the user
/// claims again, and would otherwise be lost at midnight.
pub async fn reconcile(
    store: &dyn RewardsStore,
    today: NaiveDate,
    points_per_day: i64,
) -> Result<ReconcileReport, StoreError> {
    let mut report = ReconcileReport::default();

    for date in [today - chrono::Duration::days(1), today] {
        for (user_id, _) in store.streaks_claimed_on(date).await? {
            let key = claim_key(&user_id, date);
            if store.has_grant(&key).await? {
                continue;
            }
            match points::credit(store, &user_id, points_per_day, &key).await {
                Ok(increment) if increment.applied => {
                    warn!(%user_id, %date, "credited missing daily claim");
                    report.claims_credited += 1;
                }
                Ok(_) => {}
                Err(LedgerError::Store(err)) => return Err(err),
                Err(err) => error!(%user_id, "cannot credit daily claim: {err}"),
            }
        }
    }

    for receipt in store.redemption_receipts().await? {
        if log_redemption(store, &receipt).await? {
            warn!(receipt = %receipt.id, "backfilled redemption log entry");
            report.redemptions_logged += 1;
        }
    }

    Ok(report)
}

pub async fn run_periodic(
    store: Arc<dyn RewardsStore>,
    points_per_day: i64,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let today = chrono::Local::now().date_naive();
                match reconcile(store.as_ref(), today, points_per_day).await {
                    Ok(report) if report != ReconcileReport::default() => {
                        info!(?report, "reconciliation repaired partial writes");
                    }
                    Ok(_) => {}
                    Err(err) => error!("reconciliation failed: {err}"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("reconciler stopped");
}
