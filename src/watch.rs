use crate::errors::StoreError;
use crate::points;
use crate::store::RewardsStore;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, warn};

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, StoreError>>>;

pub struct Coalescer<K, V> {
    inflight: Arc<Mutex<HashMap<K, SharedFetch<V>>>>,
}

impl<K, V> Clone for Coalescer<K, V> {
    fn clone(&self) -> Self {
        Self {
            inflight: Arc::clone(&self.inflight),
        }
    }
}

impl<K, V> Default for Coalescer<K, V> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> Coalescer<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Joins the in-flight fetch for `key`, or starts one with `fetch`.
    pub async fn get<F, Fut>(&self, key: K, fetch: F) -> Result<V, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, StoreError>> + Send + 'static,
    {
        let shared = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match inflight.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let started = fetch().boxed().shared();
                    inflight.insert(key.clone(), started.clone());
                    started
                }
            }
        };

        let result = shared.clone().await;

        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if inflight
            .get(&key)
            .is_some_and(|current| current.ptr_eq(&shared))
        {
            inflight.remove(&key);
        }
        result
    }

    pub fn in_flight(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub type BalanceCoalescer = Coalescer<String, i64>;

pub async fn coalesced_balance(
    store: &Arc<dyn RewardsStore>,
    coalescer: &BalanceCoalescer,
    user_id: &str,
) -> Result<i64, StoreError> {
    let store = Arc::clone(store);
    let owned = user_id.to_string();
    coalescer
        .get(user_id.to_string(), move || async move {
            points::get_balance(store.as_ref(), &owned).await
        })
        .await
}

pub struct BalanceWatcher {
    receiver: watch::Receiver<Option<i64>>,
    task: JoinHandle<()>,
}

impl BalanceWatcher {
    pub fn spawn(
        store: Arc<dyn RewardsStore>,
        coalescer: BalanceCoalescer,
        user_id: String,
        every: Duration,
    ) -> Self {
        let (sender, receiver) = watch::channel(None);
        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if sender.is_closed() {
                    break;
                }
                match coalesced_balance(&store, &coalescer, &user_id).await {
                    Ok(balance) => {
                        sender.send_if_modified(|current| {
                            let changed = *current != Some(balance);
                            *current = Some(balance);
                            changed
                        });
                    }
                    Err(err) => warn!(%user_id, "balance poll failed: {err}"),
                }
            }
            debug!(%user_id, "balance watcher stopped");
        });

        Self { receiver, task }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<i64>> {
        self.receiver.clone()
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for BalanceWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoreData;
    use crate::store::JsonStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[tokio::test]
    async fn concurrent_gets_share_one_fetch() {
        let coalescer: Coalescer<&'static str, i64> = Coalescer::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let spawn_get = || {
            let coalescer = coalescer.clone();
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                coalescer
                    .get("u1", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        gate.notified().await;
                        Ok(42)
                    })
                    .await
            })
        };

        let first = spawn_get();
        let second = spawn_get();
        while coalescer.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        assert_eq!(first.await.unwrap().unwrap(), 42);
        assert_eq!(second.await.unwrap().unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn sequential_gets_fetch_again() {
        let coalescer: Coalescer<&'static str, i64> = Coalescer::default();
        assert_eq!(coalescer.get("k", || async { Ok(1) }).await.unwrap(), 1);
        assert_eq!(coalescer.get("k", || async { Ok(2) }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn watcher_publishes_balance_changes() {
        let store = JsonStore::in_memory(StoreData::default());
        let shared: Arc<dyn RewardsStore> = Arc::new(store.clone());
        let watcher = BalanceWatcher::spawn(
            shared,
            BalanceCoalescer::default(),
            "u1".to_string(),
            Duration::from_millis(10),
        );
        let mut rx = watcher.subscribe();

        rx.wait_for(|balance| *balance == Some(0)).await.unwrap();
        points::credit(&store, "u1", 5, "k").await.unwrap();
        rx.wait_for(|balance| *balance == Some(5)).await.unwrap();

        watcher.cancel();
        assert!(rx.changed().await.is_err());
    }
}
