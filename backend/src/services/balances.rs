use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::services::traits::BalanceSource;

/// Wallet balances held in memory, keyed by upper-case ticker. Tickers that
/// were never set are an error, which the gate's balance guard turns into a
/// zero balance.
#[derive(Default)]
pub struct InMemoryBalanceSource {
    balances: RwLock<HashMap<String, f64>>,
}

impl InMemoryBalanceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ticker: &str, native_amount: f64) -> Result<()> {
        if !native_amount.is_finite() || native_amount < 0.0 {
            return Err(anyhow!("Invalid balance {} for {}", native_amount, ticker));
        }
        self.balances.write().insert(ticker.to_uppercase(), native_amount);
        tracing::info!("Balance for {} set to {}", ticker.to_uppercase(), native_amount);
        Ok(())
    }

    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.balances.read().clone()
    }
}

#[async_trait]
impl BalanceSource for InMemoryBalanceSource {
    async fn balance(&self, ticker: &str) -> Result<f64> {
        self.balances
            .read()
            .get(&ticker.to_uppercase())
            .copied()
            .ok_or_else(|| anyhow!("No balance known for {}", ticker))
    }
}
