use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/signup", post(handlers::sign_up))
        .route("/auth/signin", post(handlers::sign_in))
        .route("/auth/signout", post(handlers::sign_out))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/password-reset", post(handlers::password_reset))
        .route("/api/points", get(handlers::get_points))
        .route("/api/points/events", get(handlers::points_events))
        .route("/api/streak", get(handlers::get_streak))
        .route("/api/streak/claim", post(handlers::claim_streak))
        .route("/api/referrals", get(handlers::get_referrals))
        .route("/api/rewards", get(handlers::list_rewards))
        .route("/api/rewards/:id/redeem", post(handlers::redeem_reward))
        .route("/api/redemptions", get(handlers::list_redemptions))
        .route("/api/claims", post(handlers::submit_claim))
        .with_state(state)
}
