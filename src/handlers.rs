use crate::claims::{OfferClaimRequest, submit_offer_claim};
use crate::errors::AppError;
use crate::models::{
    BalanceResponse, ClaimQuery, OfferClaim, PasswordResetRequest, Redemption, RewardStatus,
    RewardsQuery, SessionResponse, SignInRequest, SignUpRequest, SignUpResponse,
};
use crate::referral::{self, ReferralStats};
use crate::rewards::{self, CatalogPage, DEFAULT_PAGE_SIZE, RedeemOutcome};
use crate::session::Session;
use crate::state::AppState;
use crate::points;
use crate::streak::{self, ClaimOutcome, StreakDay, StreakState};
use crate::watch::BalanceWatcher;
use axum::{
    Json,
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::{Local, NaiveDate};
use futures::Stream;
use serde::Serialize;
use std::{convert::Infallible, sync::Arc};
use tokio_stream::{StreamExt, wrappers::WatchStream};
use tracing::error;

/// The signed-in user, resolved once from the bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: String,
    pub token: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;

        let user_id = state
            .sessions
            .current_user(token)
            .await
            .ok_or_else(|| AppError::unauthorized("session expired or unknown"))?;

        Ok(Self {
            user_id,
            token: token.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StreakResponse {
    #[serde(flatten)]
    pub state: StreakState,
    pub week: Vec<StreakDay>,
    pub points_per_day: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<Json<SignUpResponse>, AppError> {
    let session = state
        .sessions
        .sign_up(&payload.email, &payload.password)
        .await?;

    let created = referral::create_account(
        state.store.as_ref(),
        &session.user_id,
        &payload.email.trim().to_lowercase(),
        payload.referral_code.as_deref(),
        state.config.referral_bonus,
    )
    .await;
    let profile = match created {
        Ok(profile) => profile,
        Err(err) => {
            error!(user_id = %session.user_id, "profile creation failed: {err}");
            if let Err(rollback) = state.sessions.abandon_sign_up(&session, &payload.email).await {
                error!(user_id = %session.user_id, "failed to roll back sign-up: {rollback}");
            }
            return Err(err.into());
        }
    };

    Ok(Json(SignUpResponse {
        token: session.token,
        profile,
    }))
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state
        .sessions
        .sign_in_with_password(&payload.email, &payload.password)
        .await?;
    Ok(Json(to_session_response(session)))
}

pub async fn sign_out(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<StatusCode, AppError> {
    state.sessions.sign_out(&user.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn refresh(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.sessions.refresh(&user.token).await?;
    Ok(Json(to_session_response(session)))
}

pub async fn password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<StatusCode, AppError> {
    state.sessions.request_password_reset(&payload.email).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn get_points(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<BalanceResponse>, AppError> {
    let points = points::ensure_balance_row(state.store.as_ref(), &user.user_id).await?;
    Ok(Json(BalanceResponse {
        user_id: user.user_id,
        points,
    }))
}

/// Streams the balance as server-sent events until the client goes away.
pub async fn points_events(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let watcher = BalanceWatcher::spawn(
        Arc::clone(&state.store),
        state.balances.clone(),
        user.user_id,
        state.config.poll_interval,
    );
    let updates = WatchStream::new(watcher.subscribe());
    let events = updates.filter_map(move |balance| {
        let _watcher = &watcher;
        balance.map(|value| {
            Ok::<_, Infallible>(Event::default().event("balance").data(value.to_string()))
        })
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

pub async fn get_streak(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Json<StreakResponse> {
    let today = today();
    let (streak, error) =
        match streak::get_streak_state(state.store.as_ref(), &user.user_id, today).await {
            Ok(streak) => (streak, None),
            Err(err) => {
                error!(user_id = %user.user_id, "failed to fetch streak: {err}");
                (
                    StreakState::default(),
                    Some("Failed to fetch daily streak.".to_string()),
                )
            }
        };

    Json(StreakResponse {
        week: streak::streak_week(&streak, today),
        state: streak,
        points_per_day: state.config.points_per_day,
        error,
    })
}

pub async fn claim_streak(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ClaimOutcome>, AppError> {
    let outcome = streak::claim_today(
        state.store.as_ref(),
        &user.user_id,
        today(),
        state.config.points_per_day,
    )
    .await?;
    Ok(Json(outcome))
}

pub async fn get_referrals(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ReferralStats>, AppError> {
    let stats =
        referral::get_stats(state.store.as_ref(), &user.user_id, &state.config.site_url).await?;
    Ok(Json(stats))
}

pub async fn list_rewards(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<RewardsQuery>,
) -> Result<Json<CatalogPage>, AppError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(value) => Some(
            RewardStatus::parse(value)
                .ok_or_else(|| AppError::bad_request(format!("unknown status '{value}'")))?,
        ),
    };
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 100);

    let page = rewards::catalog_page(
        state.store.as_ref(),
        query.page.unwrap_or(1),
        page_size,
        status,
    )
    .await?;
    Ok(Json(page))
}

pub async fn redeem_reward(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(reward_id): Path<String>,
) -> Result<(StatusCode, Json<RedeemOutcome>), AppError> {
    let outcome = rewards::redeem(state.store.as_ref(), &user.user_id, &reward_id).await?;
    let status = match outcome {
        RedeemOutcome::Redeemed { .. } => StatusCode::OK,
        RedeemOutcome::InsufficientPoints { .. } | RedeemOutcome::NotAvailable { .. } => {
            StatusCode::CONFLICT
        }
    };
    Ok((status, Json(outcome)))
}

pub async fn list_redemptions(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Redemption>>, AppError> {
    Ok(Json(state.store.list_redemptions(&user.user_id).await?))
}

pub async fn submit_claim(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ClaimQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<OfferClaim>), AppError> {
    let request = OfferClaimRequest {
        email: query.email.unwrap_or_default(),
        file_name: query.file_name.unwrap_or_default(),
        bytes: body.to_vec(),
        reward_title: query
            .reward_title
            .unwrap_or_else(|| "Reclaim".to_string()),
        points: state.config.offer_points,
    };

    let claim = submit_offer_claim(
        state.store.as_ref(),
        state.objects.as_ref(),
        &user.user_id,
        request,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

fn to_session_response(session: Session) -> SessionResponse {
    SessionResponse {
        token: session.token,
        user_id: session.user_id,
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
