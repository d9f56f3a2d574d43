use crate::claims::DEFAULT_OFFER_POINTS;
use crate::referral::DEFAULT_REFERRAL_BONUS;
use crate::storage::resolve_data_path;
use crate::streak::DEFAULT_POINTS_PER_DAY;
use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub site_url: String,
    pub points_per_day: i64,
    pub referral_bonus: i64,
    pub offer_points: i64,
    pub poll_interval: Duration,
    pub reconcile_interval: Duration,
}

impl Config {
    pub fn load() -> Self {
        let data_path = resolve_data_path();
        let uploads_dir = env::var("UPLOADS_DIR").map(PathBuf::from).unwrap_or_else(|_| {
            data_path
                .parent()
                .map(|dir| dir.join("uploads"))
                .unwrap_or_else(|| PathBuf::from("uploads"))
        });
        let port = try_load("PORT", 8080);

        Self {
            port,
            data_path,
            uploads_dir,
            site_url: env::var("SITE_URL").unwrap_or_else(|_| format!("http://localhost:{port}")),
            points_per_day: try_load_points("POINTS_PER_DAY", DEFAULT_POINTS_PER_DAY),
            referral_bonus: try_load_points("REFERRAL_BONUS", DEFAULT_REFERRAL_BONUS),
            offer_points: try_load_points("OFFER_POINTS", DEFAULT_OFFER_POINTS),
            poll_interval: Duration::from_secs(try_load("POLL_INTERVAL_SECS", 10)),
            reconcile_interval: Duration::from_secs(try_load("RECONCILE_INTERVAL_SECS", 60)),
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => value.trim().parse().unwrap_or_else(|err| {
            warn!("Invalid {key} value {value:?}: {err}, using default: {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

fn try_load_points(key: &str, default: i64) -> i64 {
    positive_or_default(key, try_load(key, default), default)
}

fn positive_or_default(key: &str, value: i64, default: i64) -> i64 {
    if value > 0 {
        value
    } else {
        warn!("{key} must be positive, got {value}, using default: {default}");
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_point_amounts_fall_back_to_default() {
        assert_eq!(positive_or_default("POINTS_PER_DAY", 0, 5), 5);
        assert_eq!(positive_or_default("REFERRAL_BONUS", -25, 25), 25);
        assert_eq!(positive_or_default("OFFER_POINTS", 40, 25), 40);
    }
}
