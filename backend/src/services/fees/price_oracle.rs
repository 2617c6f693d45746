use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::services::traits::PriceOracle;

/// CoinGecko style `simple/price` client.
pub struct HttpPriceOracle {
    http_client: reqwest::Client,
    base_url: String,
    fiat_currency: String,
}

impl HttpPriceOracle {
    pub fn new(base_url: &str, fiat_currency: &str) -> Result<Self> {
        Ok(Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            fiat_currency: fiat_currency.to_lowercase(),
        })
    }

    fn coin_id(ticker: &str) -> String {
        match ticker.to_uppercase().as_str() {
            "BTC" => "bitcoin".to_string(),
            "ETH" => "ethereum".to_string(),
            "USDT" => "tether".to_string(),
            "USDC" => "usd-coin".to_string(),
            other => other.to_lowercase(),
        }
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn current_exchange_rate(&self, ticker: &str) -> Result<f64> {
        let coin_id = Self::coin_id(ticker);
        let url = format!(
            "{}/api/v3/simple/price?ids={}&vs_currencies={}",
            self.base_url, coin_id, self.fiat_currency
        );

        let response: HashMap<String, HashMap<String, f64>> = self.http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let rate = response
            .get(&coin_id)
            .and_then(|prices| prices.get(&self.fiat_currency))
            .copied()
            .ok_or_else(|| anyhow!("No {} price for {}", self.fiat_currency, ticker))?;

        tracing::debug!("Price for {}: {} {}", ticker, rate, self.fiat_currency);
        Ok(rate)
    }
}
