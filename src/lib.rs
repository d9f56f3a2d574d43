pub mod app;
pub mod claims;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod objects;
pub mod points;
pub mod reconcile;
pub mod referral;
pub mod rewards;
pub mod session;
pub mod state;
pub mod storage;
pub mod store;
pub mod streak;
pub mod watch;

pub use app::router;
pub use config::Config;
pub use state::AppState;
pub use store::{JsonStore, RewardsStore};
