use crate::errors::StoreError;
use crate::models::StreakRow;
use crate::points::{self, LedgerError};
use crate::store::RewardsStore;
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};

pub const DEFAULT_POINTS_PER_DAY: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct StreakState {
    pub streak_count: u32,
    pub last_claim: Option<NaiveDate>,
    pub claimed_today: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Claimed {
        streak_count: u32,
        points_awarded: i64,
        balance: i64,
    },
    AlreadyClaimed {
        streak_count: u32,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct StreakDay {
    pub date: NaiveDate,
    pub weekday: String,
    pub claimed: bool,
    pub is_today: bool,
}

pub async fn get_streak_state(
    store: &dyn RewardsStore,
    user_id: &str,
    today: NaiveDate,
) -> Result<StreakState, StoreError> {
    let row = store.get_streak(user_id).await?.unwrap_or_default();
    Ok(state_from_row(row, today))
}

/// The streak row is written before the credit; the credit is keyed per user
/// and day so a retry or the reconciler can finish it without paying twice.
pub async fn claim_today(
    store: &dyn RewardsStore,
    user_id: &str,
    today: NaiveDate,
    points_per_day: i64,
) -> Result<ClaimOutcome, LedgerError> {
    let row = store.get_streak(user_id).await?.unwrap_or_default();
    let state = state_from_row(row, today);
    if state.claimed_today {
        return Ok(ClaimOutcome::AlreadyClaimed {
            streak_count: state.streak_count,
        });
    }

    let streak_count = next_streak_count(&state, today);
    store
        .upsert_streak(
            user_id,
            StreakRow {
                streak_count,
                last_claim: Some(today),
            },
        )
        .await?;

    let increment = points::credit(store, user_id, points_per_day, &claim_key(user_id, today))
        .await
        .inspect_err(|err| warn!(user_id, %today, "streak saved but credit failed: {err}"))?;
    if !increment.applied {
        return Ok(ClaimOutcome::AlreadyClaimed { streak_count });
    }

    info!(user_id, streak_count, "daily claim");
    Ok(ClaimOutcome::Claimed {
        streak_count,
        points_awarded: points_per_day,
        balance: increment.balance,
    })
}

pub fn claim_key(user_id: &str, date: NaiveDate) -> String {
    format!("streak:{user_id}:{date}")
}

pub fn next_streak_count(state: &StreakState, today: NaiveDate) -> u32 {
    match state.last_claim {
        Some(last) if last == today - Duration::days(1) => state.streak_count.saturating_add(1),
        _ => 1,
    }
}

/// Sunday-first week containing `today`.
pub fn streak_week(state: &StreakState, today: NaiveDate) -> Vec<StreakDay> {
    let start = today - Duration::days(today.weekday().num_days_from_sunday() as i64);
    let streak_start = state.last_claim.map(|last| {
        last - Duration::days(i64::from(state.streak_count.saturating_sub(1)))
    });

    (0..7)
        .map(|offset| {
            let date = start + Duration::days(offset);
            let claimed = match (streak_start, state.last_claim) {
                (Some(first), Some(last)) if state.streak_count > 0 => {
                    first <= date && date <= last
                }
                _ => false,
            };
            StreakDay {
                date,
                weekday: date.format("%a").to_string(),
                claimed,
                is_today: date == today,
            }
        })
        .collect()
}

fn state_from_row(row: StreakRow, today: NaiveDate) -> StreakState {
    StreakState {
        streak_count: row.streak_count,
        last_claim: row.last_claim,
        claimed_today: row.last_claim == Some(today),
    }
}
