pub mod balances;
pub mod events;
pub mod executor;
pub mod fees;
pub mod gate;
pub mod integration;
pub mod policy;
pub mod reauth;
pub mod resolver;
pub mod sessions;
pub mod traits;

use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::GateConfig;
use fees::FeeModel;
use gate::TransactionGate;
use integration::{GuardedBalances, GuardedGasSampler, GuardedPriceOracle};
use policy::AuthorizationPolicy;
use resolver::{AddressResolver, AddressRules};
use traits::{
    BalanceSource, EventSink, Executor, GasSampler, NameResolver, PersistenceSink, PriceOracle, Reauthenticator,
};

/// The external collaborators a gate talks to, unwrapped.
pub struct GateCollaborators {
    pub name_resolver: Arc<dyn NameResolver>,
    pub price_oracle: Arc<dyn PriceOracle>,
    pub gas_sampler: Arc<dyn GasSampler>,
    pub balances: Arc<dyn BalanceSource>,
    pub executor: Arc<dyn Executor>,
    pub reauthenticator: Arc<dyn Reauthenticator>,
    pub persistence: Arc<dyn PersistenceSink>,
    pub events: Arc<dyn EventSink>,
}

/// Everything a gate needs, shared by all open drafts. The price, gas and
/// balance collaborators are wrapped in their fallback guards here so a gate
/// never sees their failures.
#[derive(Clone)]
pub struct GateServices {
    pub config: Arc<GateConfig>,
    pub fee_model: Arc<FeeModel>,
    pub policy: Arc<AuthorizationPolicy>,
    pub name_resolver: Arc<dyn NameResolver>,
    pub prices: Arc<GuardedPriceOracle>,
    pub gas: Arc<GuardedGasSampler>,
    pub balances: Arc<GuardedBalances>,
    pub executor: Arc<dyn Executor>,
    pub reauthenticator: Arc<dyn Reauthenticator>,
    pub persistence: Arc<dyn PersistenceSink>,
    pub events: Arc<dyn EventSink>,
}

impl GateServices {
    pub fn new(collaborators: GateCollaborators, config: GateConfig) -> Result<Self> {
        let fee_model = FeeModel::new(config.fee_tiers.clone())?;
        let policy = AuthorizationPolicy::new(config.confirm_threshold, config.password_threshold, &config.gas_asset);

        Ok(Self {
            fee_model: Arc::new(fee_model),
            policy: Arc::new(policy),
            name_resolver: collaborators.name_resolver,
            prices: Arc::new(GuardedPriceOracle::new(
                collaborators.price_oracle,
                config.default_exchange_rate,
            )),
            gas: Arc::new(GuardedGasSampler::new(collaborators.gas_sampler, config.default_gas_cost)),
            balances: Arc::new(GuardedBalances::new(collaborators.balances)),
            executor: collaborators.executor,
            reauthenticator: collaborators.reauthenticator,
            persistence: collaborators.persistence,
            events: collaborators.events,
            config: Arc::new(config),
        })
    }

    /// Opens a fresh draft with its own resolver. Must run inside a tokio
    /// runtime since name lookups are spawned on it.
    pub fn open_gate(&self) -> TransactionGate {
        let resolver = AddressResolver::new(
            self.name_resolver.clone(),
            AddressRules::new(self.config.network, &self.config.name_suffix),
            self.config.resolve_debounce,
        );
        TransactionGate::new(Uuid::new_v4().to_string(), self.clone(), resolver)
    }
}
