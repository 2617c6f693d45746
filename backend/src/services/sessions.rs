use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::services::gate::TransactionGate;
use crate::services::GateServices;

pub type SharedGate = Arc<TransactionGate>;

/// Open send drafts by id. Each gate guards its own state, so one slow send
/// never blocks another.
pub struct SendSessionManager {
    services: GateServices,
    gates: Arc<RwLock<HashMap<String, SharedGate>>>,
}

impl SendSessionManager {
    pub fn new(services: GateServices) -> Self {
        Self {
            services,
            gates: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn services(&self) -> &GateServices {
        &self.services
    }

    /// Opens a draft. When `max_open_sends` drafts are already open, idle ones
    /// are swept first and the open fails if none could be evicted.
    pub fn open(&self) -> Result<(String, SharedGate)> {
        let limit = self.services.config.max_open_sends;
        if self.len() >= limit {
            self.sweep_idle(self.services.config.session_idle_ttl);
            if self.len() >= limit {
                tracing::warn!("Refusing new send draft, {} already open", limit);
                return Err(anyhow!("Too many open send drafts ({})", limit));
            }
        }

        let gate = Arc::new(self.services.open_gate());
        let id = gate.id().to_string();
        self.gates.write().insert(id.clone(), gate.clone());
        Ok((id, gate))
    }

    pub fn get(&self, id: &str) -> Result<SharedGate> {
        self.gates
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("Send draft not found: {}", id))
    }

    /// Forgets the draft. Its resolver stops once the last handle is gone.
    pub fn close(&self, id: &str) -> Result<()> {
        match self.gates.write().remove(id) {
            Some(_) => {
                tracing::info!("Closed send draft {}", id);
                Ok(())
            }
            None => Err(anyhow!("Send draft not found: {}", id)),
        }
    }

    /// Drops drafts untouched for at least `ttl`. Drafts that are executing
    /// are kept until they settle. Returns how many were dropped.
    pub fn sweep_idle(&self, ttl: Duration) -> usize {
        let mut gates = self.gates.write();
        let before = gates.len();
        gates.retain(|_, gate| gate.is_executing() || gate.idle_for() < ttl);
        let evicted = before - gates.len();
        if evicted > 0 {
            tracing::info!("Evicted {} idle send drafts, {} still open", evicted, gates.len());
        }
        evicted
    }

    /// Sweeps idle drafts every `every` until the manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.sweep_idle(manager.services.config.session_idle_ttl);
            }
        })
    }

    pub fn len(&self) -> usize {
        self.gates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::services::balances::InMemoryBalanceSource;
    use crate::services::executor::DryRunExecutor;
    use crate::services::traits::{GasSampler, NameResolver, PersistenceSink, PriceOracle, Reauthenticator};
    use crate::services::{events::ChannelEventSink, GateCollaborators};
    use crate::models::{GasSample, SendRecord};
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl NameResolver for Offline {
        async fn resolve(&self, _query: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl PriceOracle for Offline {
        async fn current_exchange_rate(&self, _ticker: &str) -> Result<f64> {
            Err(anyhow!("offline"))
        }
    }

    #[async_trait]
    impl GasSampler for Offline {
        async fn sample(&self) -> Result<GasSample> {
            Err(anyhow!("offline"))
        }
    }

    #[async_trait]
    impl Reauthenticator for Offline {
        async fn verify(&self, _password: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[async_trait]
    impl PersistenceSink for Offline {
        async fn record(&self, _record: &SendRecord) -> Result<()> {
            Ok(())
        }
    }

    fn manager(ttl: Duration, max_open_sends: usize) -> Arc<SendSessionManager> {
        let collaborators = GateCollaborators {
            name_resolver: Arc::new(Offline),
            price_oracle: Arc::new(Offline),
            gas_sampler: Arc::new(Offline),
            balances: Arc::new(InMemoryBalanceSource::new()),
            executor: Arc::new(DryRunExecutor),
            reauthenticator: Arc::new(Offline),
            persistence: Arc::new(Offline),
            events: Arc::new(ChannelEventSink::new()),
        };
        let config = GateConfig {
            session_idle_ttl: ttl,
            max_open_sends,
            ..GateConfig::default()
        };
        Arc::new(SendSessionManager::new(GateServices::new(collaborators, config).unwrap()))
    }

    #[tokio::test(start_paused = true)]
    async fn idle_drafts_are_swept_and_touched_ones_kept() {
        let sessions = manager(Duration::from_secs(60), 10);
        let (stale, _) = sessions.open().unwrap();
        let (active, gate) = sessions.open().unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        gate.set_recipient("someone").unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(sessions.sweep_idle(Duration::from_secs(60)), 1);
        assert!(sessions.get(&stale).is_err());
        assert!(sessions.get(&active).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn full_manager_evicts_idle_drafts_before_refusing() {
        let sessions = manager(Duration::from_secs(60), 2);
        sessions.open().unwrap();
        sessions.open().unwrap();
        assert!(sessions.open().is_err());
        assert_eq!(sessions.len(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        let (id, _) = sessions.open().unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions.get(&id).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_an_interval() {
        let sessions = manager(Duration::from_secs(60), 10);
        let handle = sessions.spawn_sweeper(Duration::from_secs(30));
        sessions.open().unwrap();

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert!(sessions.is_empty());

        drop(sessions);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(handle.is_finished());
    }
}
