//! Recipient resolution.
//!
//! Every input bumps a generation counter. A lookup runs in its own task
//! after the debounce window and may only write the state while its
//! generation is still current, so a superseded query can never surface,
//! even if its task was already past the abort point when the new input
//! arrived.

pub mod address;
pub mod name_service;

pub use address::AddressRules;
pub use name_service::HttpNameResolver;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::ResolutionState;
use crate::services::traits::NameResolver;

struct ResolverShared {
    generation: Mutex<u64>,
    state: watch::Sender<ResolutionState>,
}

impl ResolverShared {
    fn advance(&self) -> u64 {
        let mut generation = self.generation.lock();
        *generation += 1;
        *generation
    }

    fn is_current(&self, generation: u64) -> bool {
        *self.generation.lock() == generation
    }

    /// Writes `state` only if `generation` is still the latest.
    fn apply(&self, generation: u64, state: ResolutionState) -> bool {
        let current = self.generation.lock();
        if *current != generation {
            return false;
        }
        self.state.send_replace(state);
        true
    }
}

pub struct AddressResolver {
    name_resolver: Arc<dyn NameResolver>,
    rules: AddressRules,
    debounce: Duration,
    shared: Arc<ResolverShared>,
    last_query: String,
    pending: Option<JoinHandle<()>>,
}

impl AddressResolver {
    pub fn new(name_resolver: Arc<dyn NameResolver>, rules: AddressRules, debounce: Duration) -> Self {
        let (state, _) = watch::channel(ResolutionState::Idle);
        Self {
            name_resolver,
            rules,
            debounce,
            shared: Arc::new(ResolverShared {
                generation: Mutex::new(0),
                state,
            }),
            last_query: String::new(),
            pending: None,
        }
    }

    pub fn state(&self) -> ResolutionState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResolutionState> {
        self.shared.state.subscribe()
    }

    pub fn rules(&self) -> &AddressRules {
        &self.rules
    }

    /// Feeds a new recipient query. Returns the state right after the input
    /// was applied; a name lookup finishes later on the runtime.
    pub fn on_input(&mut self, raw_query: &str) -> ResolutionState {
        let query = self.rules.normalize(raw_query);

        // same query again while it is in flight or done: nothing to do
        if query == self.last_query && !query.is_empty() {
            let current = self.state();
            if matches!(current, ResolutionState::Resolving(_) | ResolutionState::Resolved(_)) {
                return current;
            }
        }

        self.last_query = query.clone();
        let generation = self.shared.advance();
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }

        if query.is_empty() {
            self.shared.apply(generation, ResolutionState::Idle);
            return ResolutionState::Idle;
        }

        if let Some(address) = self.rules.parse_address(&query) {
            let state = ResolutionState::Resolved(address);
            self.shared.apply(generation, state.clone());
            return state;
        }

        if self.rules.looks_like_address(&query) {
            tracing::info!("'{}' is not a valid address on {:?}", query, self.rules.network());
            let state = ResolutionState::Invalid(query);
            self.shared.apply(generation, state.clone());
            return state;
        }

        let state = ResolutionState::Resolving(query.clone());
        self.shared.apply(generation, state.clone());
        tracing::debug!("Scheduling lookup #{} for '{}'", generation, query);

        let shared = self.shared.clone();
        let name_resolver = self.name_resolver.clone();
        let rules = self.rules.clone();
        let debounce = self.debounce;

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if !shared.is_current(generation) {
                return;
            }

            let outcome = match name_resolver.resolve(&query).await {
                Ok(Some(answer)) => match rules.parse_address(&answer) {
                    Some(address) => ResolutionState::Resolved(address),
                    None => {
                        tracing::warn!("Name '{}' resolved to invalid address '{}'", query, answer);
                        ResolutionState::Failed(query.clone())
                    }
                },
                Ok(None) => {
                    tracing::info!("Name '{}' has no address record", query);
                    ResolutionState::Failed(query.clone())
                }
                Err(e) => {
                    tracing::warn!("Lookup for '{}' failed: {}", query, e);
                    ResolutionState::Failed(query.clone())
                }
            };

            if !shared.apply(generation, outcome) {
                tracing::debug!("Discarding stale lookup #{} for '{}'", generation, query);
            }
        }));

        state
    }

    /// Waits until the current query is no longer resolving.
    pub async fn settled(&self) -> ResolutionState {
        wait_settled(self.subscribe()).await
    }

    /// Drops any pending lookup and returns to `Idle`.
    pub fn reset(&mut self) {
        self.on_input("");
    }
}

/// Waits on a resolver's state channel until it leaves `Resolving`. Lets a
/// caller wait without borrowing the resolver itself.
pub async fn wait_settled(mut rx: watch::Receiver<ResolutionState>) -> ResolutionState {
    loop {
        let state = rx.borrow_and_update().clone();
        if !state.is_resolving() {
            return state;
        }
        if rx.changed().await.is_err() {
            return state;
        }
    }
}

impl Drop for AddressResolver {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use bitcoin::Network;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    const ALICE: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    const BOB: &str = "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2";

    struct MockNames {
        records: HashMap<String, String>,
        latency: Duration,
        calls: StdMutex<Vec<String>>,
    }

    impl MockNames {
        fn new(latency: Duration) -> Self {
            let mut records = HashMap::new();
            records.insert("alice.btc".to_string(), ALICE.to_string());
            records.insert("bob.btc".to_string(), BOB.to_string());
            records.insert("broken.btc".to_string(), "not-an-address".to_string());
            Self {
                records,
                latency,
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NameResolver for MockNames {
        async fn resolve(&self, query: &str) -> Result<Option<String>> {
            self.calls.lock().unwrap().push(query.to_string());
            tokio::time::sleep(self.latency).await;
            if query == "error.btc" {
                return Err(anyhow!("name service unavailable"));
            }
            Ok(self.records.get(query).cloned())
        }
    }

    fn resolver(names: Arc<MockNames>) -> AddressResolver {
        AddressResolver::new(
            names,
            AddressRules::new(Network::Bitcoin, ".btc"),
            Duration::from_millis(500),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn raw_address_resolves_without_lookup() {
        let names = Arc::new(MockNames::new(Duration::ZERO));
        let mut resolver = resolver(names.clone());

        let state = resolver.on_input(&format!(" {} ", ALICE));
        assert_eq!(state, ResolutionState::Resolved(ALICE.to_string()));
        assert_eq!(resolver.settled().await, state);
        assert!(names.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_address_fails_locally() {
        let names = Arc::new(MockNames::new(Duration::ZERO));
        let mut resolver = resolver(names.clone());

        let bad_checksum = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t5";
        assert_eq!(resolver.on_input(bad_checksum), ResolutionState::Invalid(bad_checksum.to_string()));

        let testnet = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
        assert_eq!(resolver.on_input(testnet), ResolutionState::Invalid(testnet.to_string()));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(resolver.state(), ResolutionState::Invalid(testnet.to_string()));
        assert!(names.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_goes_idle() {
        let names = Arc::new(MockNames::new(Duration::ZERO));
        let mut resolver = resolver(names.clone());

        resolver.on_input("alice");
        assert_eq!(resolver.on_input("   "), ResolutionState::Idle);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(resolver.state(), ResolutionState::Idle);
        assert!(names.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn name_resolves_after_debounce() {
        let names = Arc::new(MockNames::new(Duration::from_millis(100)));
        let mut resolver = resolver(names.clone());

        assert_eq!(resolver.on_input("Alice"), ResolutionState::Resolving("alice.btc".to_string()));
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(names.calls().is_empty());

        assert_eq!(resolver.settled().await, ResolutionState::Resolved(ALICE.to_string()));
        assert_eq!(names.calls(), vec!["alice.btc".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_query_triggers_one_lookup() {
        let names = Arc::new(MockNames::new(Duration::from_millis(50)));
        let mut resolver = resolver(names.clone());

        let first = resolver.on_input("alice");
        let second = resolver.on_input("alice");
        assert_eq!(first, second);
        assert_eq!(resolver.settled().await, ResolutionState::Resolved(ALICE.to_string()));
        assert_eq!(names.calls().len(), 1);

        // the same name once resolved is also a no-op
        let mut rx = resolver.subscribe();
        rx.borrow_and_update();
        resolver.on_input("alice.btc");
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(names.calls().len(), 1);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(resolver.state(), ResolutionState::Resolved(ALICE.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_query_inside_window_never_surfaces() {
        let names = Arc::new(MockNames::new(Duration::from_millis(10)));
        let mut resolver = resolver(names.clone());
        let mut rx = resolver.subscribe();

        resolver.on_input("alice");
        tokio::time::sleep(Duration::from_millis(200)).await;
        resolver.on_input("bob");

        loop {
            let state = rx.borrow_and_update().clone();
            assert_ne!(state, ResolutionState::Resolved(ALICE.to_string()));
            if state == ResolutionState::Resolved(BOB.to_string()) {
                break;
            }
            rx.changed().await.unwrap();
        }
        assert_eq!(names.calls(), vec!["bob.btc".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn late_answer_for_stale_query_is_discarded() {
        let names = Arc::new(MockNames::new(Duration::from_secs(3)));
        let mut resolver = resolver(names.clone());

        resolver.on_input("alice");
        // alice's lookup is now in flight
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(names.calls().len(), 1);

        resolver.on_input("bob");
        assert_eq!(resolver.settled().await, ResolutionState::Resolved(BOB.to_string()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(resolver.state(), ResolutionState::Resolved(BOB.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_surface_as_failed_query() {
        let names = Arc::new(MockNames::new(Duration::ZERO));
        let mut resolver = resolver(names.clone());

        resolver.on_input("nobody");
        assert_eq!(resolver.settled().await, ResolutionState::Failed("nobody.btc".to_string()));

        resolver.on_input("error");
        assert_eq!(resolver.settled().await, ResolutionState::Failed("error.btc".to_string()));

        resolver.on_input("broken");
        assert_eq!(resolver.settled().await, ResolutionState::Failed("broken.btc".to_string()));

        // a failed query can be retried as is
        resolver.on_input("broken");
        assert!(resolver.state().is_resolving());
    }
}
