use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::Receipt;
use crate::services::traits::Executor;

/// Accepts every well-formed send and hands back an unsettled receipt with a
/// random transaction id. Nothing is broadcast.
pub struct DryRunExecutor;

#[async_trait]
impl Executor for DryRunExecutor {
    async fn send(&self, address: &str, native_amount: f64, asset_ticker: &str) -> Result<Receipt> {
        if !(native_amount > 0.0) {
            return Err(anyhow!("Refusing to send {} {}", native_amount, asset_ticker));
        }

        let tx_id = hex::encode(rand::random::<[u8; 32]>());
        tracing::info!(
            "[dry run] would send {} {} to {} as {}",
            native_amount,
            asset_ticker,
            address,
            tx_id
        );

        Ok(Receipt {
            tx_id,
            settled: false,
            timestamp: chrono::Utc::now().timestamp(),
        })
    }
}
