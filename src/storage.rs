use crate::errors::StoreError;
use crate::models::{Reward, RewardStatus, StoreData};
use std::{env, path::Path, path::PathBuf};
use tokio::fs;
use tracing::{error, info};

pub fn resolve_data_path() -> PathBuf {
    if let Ok(path) = env::var("APP_DATA_PATH") {
        return PathBuf::from(path);
    }

    PathBuf::from("data/rewards.json")
}

pub async fn load_data(path: &Path) -> Result<StoreData, StoreError> {
    let mut data = match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
            error!(path = %path.display(), "failed to parse data file: {err}");
            StoreError::Corrupt(format!("{}: {err}", path.display()))
        })?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no data file yet, starting empty");
            StoreData::default()
        }
        Err(err) => {
            error!(path = %path.display(), "failed to read data file: {err}");
            return Err(err.into());
        }
    };

    if data.rewards.is_empty() {
        info!("seeding reward catalog");
        data.rewards = default_catalog();
    }
    Ok(data)
}

pub async fn persist_data(path: &Path, data: &StoreData) -> Result<(), StoreError> {
    let payload =
        serde_json::to_vec_pretty(data).map_err(|err| StoreError::Io(err.to_string()))?;
    fs::write(path, payload).await?;
    Ok(())
}

pub fn default_catalog() -> Vec<Reward> {
    let entry = |id: &str, title: &str, description: &str, points: i64, status| Reward {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        points,
        status,
    };

    vec![
        entry(
            "bank-transfer-5",
            "$5 Bank Transfer",
            "The $5 equivalent will be transferred to your bank account.",
            5000,
            RewardStatus::Locked,
        ),
        entry(
            "paypal-5",
            "$5 PayPal International",
            "Receive a $5 PayPal balance transfer directly to your PayPal account email.",
            5000,
            RewardStatus::Locked,
        ),
        entry(
            "gift-card-5",
            "$5 Virtual Visa Card",
            "Use your $5 prepaid card to shop anywhere Visa is accepted online.",
            5000,
            RewardStatus::Locked,
        ),
        entry(
            "book-5",
            "Free Udemy Course",
            "Coming soon!",
            2500,
            RewardStatus::ComingSoon,
        ),
    ]
}
