//! Fallback wrappers around the price, gas and balance collaborators. A
//! vendor outage must not make sending impossible, so failures are logged and
//! replaced by the last good value or a configured default.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::IntegrationError;
use crate::models::{sanitize_rate, GasSample};
use crate::services::traits::{BalanceSource, GasSampler, PriceOracle};

pub struct GuardedPriceOracle {
    inner: Arc<dyn PriceOracle>,
    last_known: RwLock<HashMap<String, f64>>,
    default_rate: f64,
}

impl GuardedPriceOracle {
    pub fn new(inner: Arc<dyn PriceOracle>, default_rate: f64) -> Self {
        Self {
            inner,
            last_known: RwLock::new(HashMap::new()),
            default_rate,
        }
    }

    pub async fn exchange_rate(&self, ticker: &str) -> f64 {
        let failure = match self.inner.current_exchange_rate(ticker).await {
            Ok(rate) if rate.is_finite() && rate > 0.0 => {
                self.last_known.write().insert(ticker.to_string(), rate);
                return rate;
            }
            Ok(rate) => format!("unusable rate {}", rate),
            Err(e) => e.to_string(),
        };

        let fallback = self.fallback(ticker);
        tracing::warn!(
            "{}; using {}",
            IntegrationError::PriceUnavailable { ticker: ticker.to_string(), reason: failure },
            fallback
        );
        fallback
    }

    fn fallback(&self, ticker: &str) -> f64 {
        let last = self.last_known.read().get(ticker).copied().unwrap_or(self.default_rate);
        sanitize_rate(last, self.default_rate)
    }
}

pub struct GuardedGasSampler {
    inner: Arc<dyn GasSampler>,
    last_known: RwLock<Option<GasSample>>,
    default_sample: GasSample,
}

impl GuardedGasSampler {
    pub fn new(inner: Arc<dyn GasSampler>, default_gas_cost: f64) -> Self {
        Self {
            inner,
            last_known: RwLock::new(None),
            // equal cost and average: a fallback never raises a gas warning
            default_sample: GasSample {
                gas_cost: default_gas_cost,
                average_gas: default_gas_cost,
            },
        }
    }

    pub async fn sample(&self) -> GasSample {
        let failure = match self.inner.sample().await {
            Ok(sample) if sample.is_usable() => {
                *self.last_known.write() = Some(sample);
                return sample;
            }
            Ok(sample) => format!("unusable sample {:?}", sample),
            Err(e) => e.to_string(),
        };

        let fallback = (*self.last_known.read()).unwrap_or(self.default_sample);
        tracing::warn!("{}; using {:?}", IntegrationError::GasUnavailable(failure), fallback);
        fallback
    }
}

pub struct GuardedBalances {
    inner: Arc<dyn BalanceSource>,
}

impl GuardedBalances {
    pub fn new(inner: Arc<dyn BalanceSource>) -> Self {
        Self { inner }
    }

    /// Unknown balances count as zero so a failed lookup can only block a
    /// send, never allow an overdraft.
    pub async fn balance(&self, ticker: &str) -> f64 {
        match self.inner.balance(ticker).await {
            Ok(balance) if balance.is_finite() && balance >= 0.0 => balance,
            Ok(balance) => {
                tracing::warn!("Balance source returned {} for {}; treating as 0", balance, ticker);
                0.0
            }
            Err(e) => {
                tracing::warn!(
                    "{}; treating as 0",
                    IntegrationError::BalanceUnavailable { ticker: ticker.to_string(), reason: e.to_string() }
                );
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakyOracle {
        fail: AtomicBool,
    }

    #[async_trait]
    impl PriceOracle for FlakyOracle {
        async fn current_exchange_rate(&self, _ticker: &str) -> Result<f64> {
            if self.fail.load(Ordering::SeqCst) {
                Err(anyhow!("vendor down"))
            } else {
                Ok(3000.0)
            }
        }
    }

    struct FlakySampler {
        fail: AtomicBool,
    }

    #[async_trait]
    impl GasSampler for FlakySampler {
        async fn sample(&self) -> Result<GasSample> {
            if self.fail.load(Ordering::SeqCst) {
                Err(anyhow!("timeout"))
            } else {
                Ok(GasSample { gas_cost: 0.0004, average_gas: 0.0002 })
            }
        }
    }

    #[tokio::test]
    async fn price_falls_back_to_last_known_then_default() {
        let oracle = Arc::new(FlakyOracle { fail: AtomicBool::new(true) });
        let guarded = GuardedPriceOracle::new(oracle.clone(), 1.0);

        assert_eq!(guarded.exchange_rate("BTC").await, 1.0);

        oracle.fail.store(false, Ordering::SeqCst);
        assert_eq!(guarded.exchange_rate("BTC").await, 3000.0);

        oracle.fail.store(true, Ordering::SeqCst);
        assert_eq!(guarded.exchange_rate("BTC").await, 3000.0);
    }

    #[tokio::test]
    async fn gas_falls_back_without_warning_by_default() {
        let sampler = Arc::new(FlakySampler { fail: AtomicBool::new(true) });
        let guarded = GuardedGasSampler::new(sampler.clone(), 0.0001);

        let fallback = guarded.sample().await;
        assert_eq!(fallback.gas_cost, 0.0001);
        assert!(fallback.gas_cost <= fallback.average_gas);

        sampler.fail.store(false, Ordering::SeqCst);
        let live = guarded.sample().await;
        sampler.fail.store(true, Ordering::SeqCst);
        assert_eq!(guarded.sample().await, live);
    }
}
