//! Market list state: refresh orchestration, sorting, filtering, observers

use crate::core::error::FetchError;
use crate::core::market::{
    ChangePeriod, MarketProvider, MarketRecord, PROVIDER_PAGE_MAX, SortDirection, SortKey,
};
use crate::store::{MarketSnapshot, SnapshotStore, is_fresh};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

/// Pause between the two page requests of an oversized refresh, so the
/// provider's rate limiter is not tripped.
const PAGE_DELAY: Duration = Duration::from_millis(500);

/// Read-model handed to renderers. Observers re-read this on every
/// change notification.
#[derive(Debug, Clone)]
pub struct MarketsView {
    /// Visible records: the filtered view when a query is active,
    /// otherwise the full list.
    pub records: Vec<MarketRecord>,
    pub sort_key: SortKey,
    pub direction: SortDirection,
    /// False until the first `apply_sort` call; the provider's default
    /// ordering is not an applied sort.
    pub sort_applied: bool,
    pub period: ChangePeriod,
    pub query: String,
    pub last_fetch: Option<DateTime<Utc>>,
}

struct ControllerState {
    records: Vec<MarketRecord>,
    filtered: Option<Vec<MarketRecord>>,
    sort_key: SortKey,
    direction: SortDirection,
    sort_applied: bool,
    period: ChangePeriod,
    query: String,
    limit: u32,
    last_fetch: Option<DateTime<Utc>>,
    /// Sequence tag of the last fetch whose result was applied.
    applied_seq: u64,
}

/// Owns the in-memory market list and decides when to hit the network
/// versus serve cached data.
///
/// All state lives behind one async mutex; overlapping refreshes are
/// resolved last-write-wins via a monotonic sequence tag, so a response
/// that was overtaken by a newer one is dropped instead of clobbering it.
pub struct MarketsController {
    provider: Arc<dyn MarketProvider>,
    store: Arc<dyn SnapshotStore>,
    cache_ttl_secs: u64,
    state: Mutex<ControllerState>,
    changed: watch::Sender<u64>,
    fetch_seq: AtomicU64,
}

impl MarketsController {
    pub fn new(
        provider: Arc<dyn MarketProvider>,
        store: Arc<dyn SnapshotStore>,
        default_limit: u32,
        cache_ttl_secs: u64,
    ) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            provider,
            store,
            cache_ttl_secs,
            state: Mutex::new(ControllerState {
                records: Vec::new(),
                filtered: None,
                sort_key: SortKey::MarketCapRank,
                direction: SortDirection::Descending,
                sort_applied: false,
                period: ChangePeriod::Day,
                query: String::new(),
                limit: default_limit,
                last_fetch: None,
                applied_seq: 0,
            }),
            changed,
            fetch_seq: AtomicU64::new(0),
        }
    }

    /// Registers an observer. The receiver carries a change generation;
    /// dropping it unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    fn notify(&self) {
        self.changed.send_modify(|generation| {
            *generation = generation.wrapping_add(1);
        });
    }

    /// Refreshes the market list, serving in-memory data when it is still
    /// inside the cache validity window and already covers `limit` records.
    ///
    /// A fetch failure never surfaces here: prior data (if any) is
    /// re-published and the error is only logged.
    pub async fn refresh(&self, limit: Option<u32>, force: bool) {
        let seq = self.fetch_seq.fetch_add(1, AtomicOrdering::SeqCst) + 1;

        let limit = {
            let mut state = self.state.lock().await;
            if let Some(limit) = limit {
                state.limit = limit;
            }
            let fresh = state
                .last_fetch
                .is_some_and(|t| is_fresh(t, self.cache_ttl_secs, Utc::now()));
            if !force && fresh && state.records.len() as u32 >= state.limit {
                debug!("Serving market data from cache, inside validity window");
                drop(state);
                self.notify();
                return;
            }
            state.limit
        };

        match self.fetch_all(limit).await {
            Ok(records) => {
                let now = Utc::now();
                let snapshot = MarketSnapshot::new(now, records.clone());
                {
                    let mut state = self.state.lock().await;
                    if seq <= state.applied_seq {
                        debug!("Dropping overtaken fetch response (seq {})", seq);
                        return;
                    }
                    state.applied_seq = seq;
                    state.records = records;
                    state.last_fetch = Some(now);
                    refresh_filter(&mut state);
                }
                if let Err(e) = self.store.save(&snapshot).await {
                    warn!("Failed to persist market snapshot: {e:#}");
                }
                self.notify();
            }
            Err(e) => {
                warn!("Market refresh failed: {e}");
                let has_prior_data = !self.state.lock().await.records.is_empty();
                if has_prior_data {
                    // Keep showing stale data
                    self.notify();
                }
            }
        }
    }

    /// One request when the limit fits in a provider page, otherwise two
    /// sequential pages concatenated in request order. The provider is
    /// trusted not to overlap pages; no de-duplication happens here.
    async fn fetch_all(&self, limit: u32) -> Result<Vec<MarketRecord>, FetchError> {
        if limit <= PROVIDER_PAGE_MAX {
            return self.provider.fetch_page(limit, 1).await;
        }

        let mut records = self.provider.fetch_page(PROVIDER_PAGE_MAX, 1).await?;
        tokio::time::sleep(PAGE_DELAY).await;
        let remainder = self
            .provider
            .fetch_page(limit - PROVIDER_PAGE_MAX, 2)
            .await?;
        records.extend(remainder);
        Ok(records)
    }

    /// Adopts the persisted snapshot when it is still fresh; otherwise
    /// falls through to a regular refresh.
    pub async fn load_cached_if_fresh(&self) {
        if let Some(snapshot) = self.store.load().await {
            if snapshot.is_fresh(self.cache_ttl_secs, Utc::now()) {
                debug!(
                    "Adopting persisted snapshot from {} ({} records)",
                    snapshot.fetched_at,
                    snapshot.records.len()
                );
                {
                    let mut state = self.state.lock().await;
                    state.records = snapshot.records;
                    state.last_fetch = Some(snapshot.fetched_at);
                    refresh_filter(&mut state);
                }
                self.notify();
                return;
            }
            debug!("Persisted snapshot is stale, refreshing");
        }
        self.refresh(None, false).await;
    }

    /// Re-orders the list by `key`. Selecting the active key again flips
    /// the direction; a new key starts descending. Returns the resulting
    /// direction so the caller can render it.
    pub async fn apply_sort(&self, key: SortKey) -> SortDirection {
        let direction;
        {
            let mut state = self.state.lock().await;
            direction = if state.sort_key == key {
                state.direction.toggled()
            } else {
                SortDirection::Descending
            };
            state.sort_key = key;
            state.direction = direction;
            state.sort_applied = true;

            let period = state.period;
            sort_records(&mut state.records, key, direction, period);
            refresh_filter(&mut state);
        }
        self.notify();
        direction
    }

    /// Case-insensitive substring match over name and symbol. An empty
    /// query deactivates filtering. The primary list is never mutated.
    pub async fn apply_filter(&self, query: &str) {
        {
            let mut state = self.state.lock().await;
            state.query = query.to_string();
            refresh_filter(&mut state);
        }
        self.notify();
    }

    /// Switches the period used for change display and subsequent change
    /// sorts. Does not re-fetch or re-order anything.
    pub async fn set_period(&self, period: ChangePeriod) {
        {
            let mut state = self.state.lock().await;
            state.period = period;
        }
        self.notify();
    }

    pub async fn view(&self) -> MarketsView {
        let state = self.state.lock().await;
        MarketsView {
            records: state
                .filtered
                .clone()
                .unwrap_or_else(|| state.records.clone()),
            sort_key: state.sort_key,
            direction: state.direction,
            sort_applied: state.sort_applied,
            period: state.period,
            query: state.query.clone(),
            last_fetch: state.last_fetch,
        }
    }
}

fn sort_records(
    records: &mut [MarketRecord],
    key: SortKey,
    direction: SortDirection,
    period: ChangePeriod,
) {
    match key {
        SortKey::MarketCapRank => {
            // Unranked assets sort last under either direction. Descending
            // means largest market cap first, i.e. rank 1 on top.
            records.sort_by(|a, b| match (a.market_cap_rank, b.market_cap_rank) {
                (Some(ra), Some(rb)) => match direction {
                    SortDirection::Descending => ra.cmp(&rb),
                    SortDirection::Ascending => rb.cmp(&ra),
                },
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
        }
        SortKey::Change => {
            // A missing change for the active period reads as negative
            // infinity: last when descending, first when ascending.
            records.sort_by(|a, b| {
                let va = a.change_for(period).unwrap_or(f64::NEG_INFINITY);
                let vb = b.change_for(period).unwrap_or(f64::NEG_INFINITY);
                match direction {
                    SortDirection::Descending => vb.total_cmp(&va),
                    SortDirection::Ascending => va.total_cmp(&vb),
                }
            });
        }
        SortKey::Price => {
            records.sort_by(|a, b| match direction {
                SortDirection::Descending => b.current_price.total_cmp(&a.current_price),
                SortDirection::Ascending => a.current_price.total_cmp(&b.current_price),
            });
        }
    }
}

fn refresh_filter(state: &mut ControllerState) {
    if state.query.is_empty() {
        state.filtered = None;
        return;
    }
    let needle = state.query.to_lowercase();
    state.filtered = Some(
        state
            .records
            .iter()
            .filter(|r| {
                r.name.to_lowercase().contains(&needle) || r.symbol.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicBool;

    fn record(id: &str, rank: Option<u32>, price: f64, change_24h: Option<f64>) -> MarketRecord {
        MarketRecord {
            id: id.to_string(),
            symbol: id.chars().take(3).collect(),
            name: {
                let mut name = id.to_string();
                name[..1].make_ascii_uppercase();
                name
            },
            image: format!("https://assets.example.com/{id}.png"),
            current_price: price,
            market_cap: price * 1_000_000.0,
            market_cap_rank: rank,
            change_24h,
            change_7d: None,
            change_30d: None,
        }
    }

    struct MockProvider {
        calls: StdMutex<Vec<(u32, u32)>>,
        fail: AtomicBool,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            }
        }

        fn calls(&self) -> Vec<(u32, u32)> {
            self.calls.lock().unwrap().clone()
        }

        fn fail_next(&self) {
            self.fail.store(true, AtomicOrdering::SeqCst);
        }
    }

    #[async_trait]
    impl MarketProvider for MockProvider {
        async fn fetch_page(
            &self,
            per_page: u32,
            page: u32,
        ) -> Result<Vec<MarketRecord>, FetchError> {
            self.calls.lock().unwrap().push((per_page, page));
            if self.fail.load(AtomicOrdering::SeqCst) {
                return Err(FetchError::RateLimited);
            }
            let offset = (page - 1) * PROVIDER_PAGE_MAX;
            Ok((0..per_page)
                .map(|i| {
                    let rank = offset + i + 1;
                    record(&format!("coin{rank}"), Some(rank), 1000.0 / rank as f64, None)
                })
                .collect())
        }
    }

    /// Completes each fetch after a scripted delay, tagging the returned
    /// ids so overlapping refreshes can be told apart.
    struct DelayedProvider {
        plan: StdMutex<VecDeque<(Duration, &'static str)>>,
    }

    impl DelayedProvider {
        fn new(plan: Vec<(Duration, &'static str)>) -> Self {
            Self {
                plan: StdMutex::new(plan.into()),
            }
        }
    }

    #[async_trait]
    impl MarketProvider for DelayedProvider {
        async fn fetch_page(
            &self,
            per_page: u32,
            _page: u32,
        ) -> Result<Vec<MarketRecord>, FetchError> {
            let (delay, tag) = self
                .plan
                .lock()
                .unwrap()
                .pop_front()
                .expect("unplanned fetch");
            tokio::time::sleep(delay).await;
            Ok((0..per_page)
                .map(|i| record(&format!("{tag}{i}"), Some(i + 1), 1.0, None))
                .collect())
        }
    }

    fn controller_with(
        provider: Arc<MockProvider>,
        store: Arc<MemoryStore>,
    ) -> MarketsController {
        MarketsController::new(provider, store, 100, 300)
    }

    async fn seeded_controller(records: Vec<MarketRecord>) -> MarketsController {
        let store = Arc::new(MemoryStore::with_snapshot(MarketSnapshot::new(
            Utc::now(),
            records,
        )));
        let controller = controller_with(Arc::new(MockProvider::new()), store);
        controller.load_cached_if_fresh().await;
        controller
    }

    fn ids(view: &MarketsView) -> Vec<&str> {
        view.records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_missing_rank_sorts_last_in_both_directions() {
        let controller = seeded_controller(vec![
            record("unranked", None, 5.0, None),
            record("second", Some(2), 100.0, None),
            record("first", Some(1), 200.0, None),
        ])
        .await;

        // Rank is the active key at startup, so the first call toggles to
        // ascending.
        let direction = controller.apply_sort(SortKey::MarketCapRank).await;
        assert_eq!(direction, SortDirection::Ascending);
        assert_eq!(
            ids(&controller.view().await),
            vec!["second", "first", "unranked"]
        );

        let direction = controller.apply_sort(SortKey::MarketCapRank).await;
        assert_eq!(direction, SortDirection::Descending);
        assert_eq!(
            ids(&controller.view().await),
            vec!["first", "second", "unranked"]
        );
    }

    #[tokio::test]
    async fn test_missing_change_sorts_as_negative_infinity() {
        let controller = seeded_controller(vec![
            record("gainer", Some(1), 1.0, Some(5.0)),
            record("nodata", Some(2), 1.0, None),
            record("loser", Some(3), 1.0, Some(-8.0)),
        ])
        .await;

        let direction = controller.apply_sort(SortKey::Change).await;
        assert_eq!(direction, SortDirection::Descending);
        assert_eq!(
            ids(&controller.view().await),
            vec!["gainer", "loser", "nodata"]
        );

        let direction = controller.apply_sort(SortKey::Change).await;
        assert_eq!(direction, SortDirection::Ascending);
        assert_eq!(
            ids(&controller.view().await),
            vec!["nodata", "loser", "gainer"]
        );
    }

    #[tokio::test]
    async fn test_double_sort_is_its_own_inverse() {
        let controller = seeded_controller(vec![
            record("cheap", Some(3), 1.0, Some(-1.0)),
            record("mid", Some(2), 50.0, Some(2.0)),
            record("dear", Some(1), 900.0, Some(7.0)),
        ])
        .await;

        controller.apply_sort(SortKey::Price).await;
        let before: Vec<String> = controller
            .view()
            .await
            .records
            .iter()
            .map(|r| r.id.clone())
            .collect();

        controller.apply_sort(SortKey::Price).await;
        controller.apply_sort(SortKey::Price).await;

        let after: Vec<String> = controller
            .view()
            .await
            .records
            .iter()
            .map(|r| r.id.clone())
            .collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_change_sort_follows_active_period() {
        let mut a = record("weekly-star", Some(1), 1.0, Some(-5.0));
        a.change_7d = Some(20.0);
        let mut b = record("daily-star", Some(2), 1.0, Some(10.0));
        b.change_7d = Some(1.0);

        let controller = seeded_controller(vec![a, b]).await;

        controller.apply_sort(SortKey::Change).await;
        assert_eq!(
            ids(&controller.view().await),
            vec!["daily-star", "weekly-star"]
        );

        // Switching the period alone must not re-order the list...
        controller.set_period(ChangePeriod::Week).await;
        assert_eq!(
            ids(&controller.view().await),
            vec!["daily-star", "weekly-star"]
        );

        // ...but the next change sort uses the new period. Two calls keep
        // the direction descending.
        controller.apply_sort(SortKey::Change).await;
        controller.apply_sort(SortKey::Change).await;
        assert_eq!(
            ids(&controller.view().await),
            vec!["weekly-star", "daily-star"]
        );
    }

    #[tokio::test]
    async fn test_refresh_within_window_hits_network_once() {
        let provider = Arc::new(MockProvider::new());
        let controller = controller_with(provider.clone(), Arc::new(MemoryStore::new()));

        controller.refresh(Some(100), false).await;
        controller.refresh(Some(100), false).await;

        assert_eq!(provider.calls(), vec![(100, 1)]);
        assert_eq!(controller.view().await.records.len(), 100);
    }

    #[tokio::test]
    async fn test_raising_the_limit_breaks_the_cache_window() {
        let provider = Arc::new(MockProvider::new());
        let controller = controller_with(provider.clone(), Arc::new(MemoryStore::new()));

        controller.refresh(Some(100), false).await;
        // Still fresh, but 100 records cannot satisfy a limit of 250.
        controller.refresh(Some(250), false).await;

        assert_eq!(provider.calls(), vec![(100, 1), (250, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_limit_fetches_two_pages_in_order() {
        let provider = Arc::new(MockProvider::new());
        let controller = controller_with(provider.clone(), Arc::new(MemoryStore::new()));

        controller.refresh(Some(300), true).await;

        assert_eq!(provider.calls(), vec![(250, 1), (50, 2)]);

        let view = controller.view().await;
        assert_eq!(view.records.len(), 300);
        // Concatenated in request order: page 1 before page 2
        assert_eq!(view.records[0].id, "coin1");
        assert_eq!(view.records[249].id, "coin250");
        assert_eq!(view.records[250].id, "coin251");
        assert_eq!(view.records[299].id, "coin300");
    }

    #[tokio::test]
    async fn test_filter_matches_name_and_symbol() {
        let controller = seeded_controller(vec![
            record("bitcoin", Some(1), 67000.0, None),
            record("ethereum", Some(2), 3200.0, None),
        ])
        .await;

        controller.apply_filter("bit").await;
        assert_eq!(ids(&controller.view().await), vec!["bitcoin"]);

        // Symbol matches too ("eth")
        controller.apply_filter("ETH").await;
        assert_eq!(ids(&controller.view().await), vec!["ethereum"]);

        controller.apply_filter("").await;
        assert_eq!(controller.view().await.records.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_data_and_notifies_once() {
        let provider = Arc::new(MockProvider::new());
        let controller = controller_with(provider.clone(), Arc::new(MemoryStore::new()));

        controller.refresh(Some(100), false).await;
        let before = controller.view().await.records;

        let mut rx = controller.subscribe();
        let generation = *rx.borrow_and_update();

        provider.fail_next();
        controller.refresh(Some(100), true).await;

        assert_eq!(controller.view().await.records, before);
        assert_eq!(*rx.borrow_and_update(), generation + 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_without_prior_data_is_silent() {
        let provider = Arc::new(MockProvider::new());
        provider.fail_next();
        let controller = controller_with(provider.clone(), Arc::new(MemoryStore::new()));

        let mut rx = controller.subscribe();
        let generation = *rx.borrow_and_update();

        controller.refresh(Some(100), true).await;

        assert!(controller.view().await.records.is_empty());
        assert_eq!(*rx.borrow_and_update(), generation);
    }

    #[tokio::test]
    async fn test_fresh_snapshot_is_adopted_without_network() {
        let provider = Arc::new(MockProvider::new());
        let fetched_at = Utc::now() - chrono::Duration::seconds(60);
        let store = Arc::new(MemoryStore::with_snapshot(MarketSnapshot::new(
            fetched_at,
            vec![record("bitcoin", Some(1), 67000.0, None)],
        )));

        let controller = controller_with(provider.clone(), store);
        controller.load_cached_if_fresh().await;

        assert!(provider.calls().is_empty());
        let view = controller.view().await;
        assert_eq!(ids(&view), vec!["bitcoin"]);
        assert_eq!(view.last_fetch, Some(fetched_at));
    }

    #[tokio::test]
    async fn test_stale_snapshot_falls_through_to_refresh() {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MemoryStore::with_snapshot(MarketSnapshot::new(
            Utc::now() - chrono::Duration::seconds(600),
            vec![record("bitcoin", Some(1), 67000.0, None)],
        )));

        let controller = controller_with(provider.clone(), store);
        controller.load_cached_if_fresh().await;

        assert_eq!(provider.calls(), vec![(100, 1)]);
        assert_eq!(controller.view().await.records.len(), 100);
    }

    #[tokio::test]
    async fn test_successful_refresh_persists_snapshot() {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MemoryStore::new());
        let controller = controller_with(provider, store.clone());

        controller.refresh(Some(100), true).await;

        let snapshot = store.load().await.expect("snapshot should be persisted");
        assert_eq!(snapshot.records.len(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overtaken_refresh_response_is_dropped() {
        let provider = Arc::new(DelayedProvider::new(vec![
            (Duration::from_secs(5), "slow"),
            (Duration::from_millis(10), "fast"),
        ]));
        let store = Arc::new(MemoryStore::new());
        let controller = Arc::new(MarketsController::new(provider, store.clone(), 100, 300));

        let slow = tokio::spawn({
            let controller = controller.clone();
            async move { controller.refresh(Some(3), true).await }
        });
        // Let the first refresh take its sequence tag and park in its fetch
        tokio::task::yield_now().await;

        controller.refresh(Some(3), true).await;

        let mut rx = controller.subscribe();
        let generation = *rx.borrow_and_update();
        let view = controller.view().await;
        assert_eq!(ids(&view), vec!["fast0", "fast1", "fast2"]);
        let fetched_at = view.last_fetch;

        slow.await.unwrap();

        // The overtaken response must not clobber the newer list, persist
        // its snapshot, or notify observers.
        let view = controller.view().await;
        assert_eq!(ids(&view), vec!["fast0", "fast1", "fast2"]);
        assert_eq!(view.last_fetch, fetched_at);
        assert_eq!(*rx.borrow_and_update(), generation);
        let snapshot = store.load().await.expect("snapshot should be persisted");
        assert!(snapshot.records.iter().all(|r| r.id.starts_with("fast")));
    }

    #[tokio::test]
    async fn test_view_reports_sort_only_after_one_is_applied() {
        let controller = seeded_controller(vec![record("bitcoin", Some(1), 67000.0, None)]).await;
        assert!(!controller.view().await.sort_applied);

        controller.apply_sort(SortKey::Price).await;
        assert!(controller.view().await.sort_applied);
    }

    #[tokio::test]
    async fn test_sort_preserved_across_filter_changes() {
        let controller = seeded_controller(vec![
            record("bitcat", Some(2), 10.0, None),
            record("bitcoin", Some(1), 67000.0, None),
            record("ethereum", Some(3), 3200.0, None),
        ])
        .await;

        controller.apply_sort(SortKey::Price).await;
        controller.apply_filter("bit").await;

        // Filtered view keeps the primary list's order
        assert_eq!(ids(&controller.view().await), vec!["bitcoin", "bitcat"]);
    }
}
