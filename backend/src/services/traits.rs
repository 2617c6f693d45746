//! Collaborators the gate consumes. All of them live outside the core and
//! are injected as `Arc<dyn ...>`.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{GasSample, Receipt, SendEvent, SendRecord};

#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Looks up a normalized name. `Ok(None)` means the name has no record.
    async fn resolve(&self, query: &str) -> Result<Option<String>>;
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Fiat per native unit of `ticker`.
    async fn current_exchange_rate(&self, ticker: &str) -> Result<f64>;
}

#[async_trait]
pub trait GasSampler: Send + Sync {
    async fn sample(&self) -> Result<GasSample>;
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn send(&self, address: &str, native_amount: f64, asset_ticker: &str) -> Result<Receipt>;
}

#[async_trait]
pub trait Reauthenticator: Send + Sync {
    /// `Ok(false)` is a wrong password, `Err` a transient failure.
    async fn verify(&self, password: &str) -> Result<bool>;
}

#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Spendable balance of `ticker` in native units.
    async fn balance(&self, ticker: &str) -> Result<f64>;
}

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record(&self, record: &SendRecord) -> Result<()>;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: SendEvent) -> Result<()>;
}
