use crate::config::Config;
use crate::objects::ObjectStore;
use crate::session::SessionHub;
use crate::store::RewardsStore;
use crate::watch::BalanceCoalescer;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RewardsStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub sessions: SessionHub,
    pub balances: BalanceCoalescer,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn RewardsStore>, objects: Arc<dyn ObjectStore>, config: Config) -> Self {
        Self {
            sessions: SessionHub::new(Arc::clone(&store)),
            store,
            objects,
            balances: BalanceCoalescer::default(),
            config: Arc::new(config),
        }
    }
}
