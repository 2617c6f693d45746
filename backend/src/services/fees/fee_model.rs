use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::default_fee_tiers;
use crate::models::{FeeQuote, GasSample};

/// One band of the service-fee table: amounts at or above `lower_bound`
/// (fiat) pay `percent` until the next band starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeTier {
    pub lower_bound: f64,
    pub percent: u8,
}

#[derive(Debug, Error, PartialEq)]
pub enum FeeTableError {
    #[error("Fee table is empty")]
    Empty,
    #[error("First fee band must start at 0, found {0}")]
    FirstBoundNotZero(f64),
    #[error("Fee band bounds must be strictly ascending at index {0}")]
    BoundsNotAscending(usize),
    #[error("Fee percent must not decrease at index {0}")]
    PercentDecreasing(usize),
    #[error("Fee percent {0} is above 100")]
    PercentTooLarge(u8),
}

/// Proportional service fee plus pass-through gas. Pure: the same amount and
/// gas sample always produce the same quote.
#[derive(Debug, Clone)]
pub struct FeeModel {
    tiers: Vec<FeeTier>,
}

impl Default for FeeModel {
    fn default() -> Self {
        Self {
            tiers: default_fee_tiers(),
        }
    }
}

impl FeeModel {
    pub fn new(tiers: Vec<FeeTier>) -> Result<Self, FeeTableError> {
        let first = tiers.first().ok_or(FeeTableError::Empty)?;
        if first.lower_bound != 0.0 {
            return Err(FeeTableError::FirstBoundNotZero(first.lower_bound));
        }

        for (idx, pair) in tiers.windows(2).enumerate() {
            if !(pair[1].lower_bound > pair[0].lower_bound) {
                return Err(FeeTableError::BoundsNotAscending(idx + 1));
            }
            if pair[1].percent < pair[0].percent {
                return Err(FeeTableError::PercentDecreasing(idx + 1));
            }
        }

        if let Some(tier) = tiers.iter().find(|t| t.percent > 100) {
            return Err(FeeTableError::PercentTooLarge(tier.percent));
        }

        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[FeeTier] {
        &self.tiers
    }

    /// Percent of the band containing `fiat_amount`.
    pub fn percent_for(&self, fiat_amount: f64) -> u8 {
        self.tiers
            .iter()
            .rev()
            .find(|tier| fiat_amount >= tier.lower_bound)
            .map(|tier| tier.percent)
            .unwrap_or(0)
    }

    pub fn service_fee(&self, fiat_amount: f64) -> f64 {
        if !(fiat_amount > 0.0) {
            return 0.0;
        }
        fiat_amount * f64::from(self.percent_for(fiat_amount)) / 100.0
    }

    pub fn quote(&self, fiat_amount: f64, asset_ticker: &str, gas: &GasSample) -> FeeQuote {
        let service_fee_percent = self.percent_for(fiat_amount);
        let quote = FeeQuote {
            gas_cost: gas.gas_cost,
            average_gas: gas.average_gas,
            service_fee: self.service_fee(fiat_amount),
            service_fee_percent,
        };

        tracing::trace!(
            "Quoted {} {} at {}% service fee, gas {} (avg {})",
            fiat_amount,
            asset_ticker,
            service_fee_percent,
            quote.gas_cost,
            quote.average_gas
        );

        quote
    }
}
