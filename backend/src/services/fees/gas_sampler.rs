use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::models::GasSample;
use crate::services::traits::GasSampler;

const SATS_PER_BTC: f64 = 100_000_000.0;

#[derive(Debug, Deserialize)]
struct MempoolSpaceFees {
    #[serde(rename = "fastestFee")]
    fastest_fee: u64,
    #[serde(rename = "halfHourFee")]
    half_hour_fee: u64,
    #[serde(rename = "hourFee")]
    hour_fee: u64,
    #[serde(rename = "economyFee")]
    economy_fee: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeePriority {
    Fastest, // next block
    Fast,    // 2-3 blocks
    Normal,  // ~6 blocks
    Slow,    // 12+ blocks
}

impl From<String> for FeePriority {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "fastest" | "urgent" => FeePriority::Fastest,
            "fast" | "high" => FeePriority::Fast,
            "normal" | "medium" => FeePriority::Normal,
            "slow" | "low" | "economy" => FeePriority::Slow,
            _ => FeePriority::Normal,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedSample {
    sample: GasSample,
    last_updated: Instant,
}

/// Samples the network fee from a mempool.space compatible endpoint and
/// turns the fee rate into the native cost of a one-input, two-output send.
/// `average_gas` is the mean cost over the last `window` samples.
pub struct MempoolGasSampler {
    http_client: reqwest::Client,
    base_url: String,
    priority: FeePriority,
    cache: RwLock<Option<CachedSample>>,
    cache_duration: Duration,
    history: RwLock<VecDeque<f64>>,
    window: usize,
}

impl MempoolGasSampler {
    pub fn new(base_url: &str, priority: FeePriority) -> Result<Self> {
        Ok(Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            priority,
            cache: RwLock::new(None),
            cache_duration: Duration::from_secs(30),
            history: RwLock::new(VecDeque::new()),
            window: 20,
        })
    }

    async fn fetch_fee_rate(&self) -> Result<u64> {
        let url = format!("{}/api/v1/fees/recommended", self.base_url);
        let response: MempoolSpaceFees = self.http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let sat_per_vb = match self.priority {
            FeePriority::Fastest => response.fastest_fee,
            FeePriority::Fast => response.half_hour_fee,
            FeePriority::Normal => response.hour_fee,
            FeePriority::Slow => response.economy_fee,
        };

        if sat_per_vb == 0 {
            return Err(anyhow!("Fee endpoint returned a zero fee rate"));
        }

        tracing::info!("Fee rate for {:?} priority: {} sat/vB", self.priority, sat_per_vb);
        Ok(sat_per_vb)
    }

    /// Pushes a cost into the rolling window and returns the window mean.
    fn record(&self, gas_cost: f64) -> f64 {
        let mut history = self.history.write();
        history.push_back(gas_cost);
        while history.len() > self.window {
            history.pop_front();
        }
        history.iter().sum::<f64>() / history.len() as f64
    }

    fn get_cached_sample(&self) -> Option<GasSample> {
        let cache = self.cache.read();
        if let Some(cached) = cache.as_ref() {
            if cached.last_updated.elapsed() < self.cache_duration {
                return Some(cached.sample);
            }
        }
        None
    }

    fn cache_sample(&self, sample: GasSample) {
        let mut cache = self.cache.write();
        *cache = Some(CachedSample {
            sample,
            last_updated: Instant::now(),
        });
    }
}

#[async_trait]
impl GasSampler for MempoolGasSampler {
    async fn sample(&self) -> Result<GasSample> {
        if let Some(cached) = self.get_cached_sample() {
            return Ok(cached);
        }

        let sat_per_vb = self.fetch_fee_rate().await?;
        let gas_cost = gas_cost_for_rate(sat_per_vb, 1, 2);
        let average_gas = self.record(gas_cost);

        let sample = GasSample { gas_cost, average_gas };
        self.cache_sample(sample);
        Ok(sample)
    }
}

/// Native cost of a P2WPKH spend at `sat_per_vb`.
pub fn gas_cost_for_rate(sat_per_vb: u64, num_inputs: usize, num_outputs: usize) -> f64 {
    let vsize = estimate_transaction_size(num_inputs, num_outputs) as u64;
    (sat_per_vb * vsize) as f64 / SATS_PER_BTC
}

fn estimate_transaction_size(num_inputs: usize, num_outputs: usize) -> usize {
    // Base size: 10 bytes (version, locktime, etc.)
    // Input: 41 bytes (outpoint + sequence + script_sig length)
    // Output: 31 bytes (value + script_pubkey for P2WPKH)
    // Witness: ~27 bytes per input, discounted by 4
    let base_size = 10;
    let input_size = num_inputs * 41;
    let output_size = num_outputs * 31;
    let witness_size = num_inputs * 27;

    base_size + input_size + output_size + (witness_size / 4)
}
