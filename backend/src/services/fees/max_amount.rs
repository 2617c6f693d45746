//! Maximum sendable amount.
//!
//! The service fee depends on the amount and the amount is bounded by the
//! fee, so the solver looks up the fee band at the fee-free bound and backs
//! the fee out of that bound once. With step bands this never overshoots:
//! the corrected amount is smaller than the bound, so its band percent can
//! only be equal or lower than the one used for the correction. A table whose
//! percent varied continuously with the amount would need a fixed-point
//! iteration instead. The result is then nudged down until the total
//! deduction, computed in floating point, fits the balance exactly.

use super::FeeModel;
use crate::models::{sanitize_rate, FALLBACK_EXCHANGE_RATE};

#[derive(Debug, Clone, Copy)]
pub struct MaxAmountInput<'a> {
    /// Balance of the asset being sent, native units.
    pub balance_native: f64,
    pub asset_ticker: &'a str,
    pub is_gas_asset: bool,
    /// Balance of the network's gas asset, native units. Equal to
    /// `balance_native` when sending the gas asset itself.
    pub gas_asset_balance: f64,
    pub gas_cost: f64,
    /// Fiat per native unit of the asset being sent.
    pub exchange_rate: f64,
}

/// Largest fiat amount whose native value, gas and service fee fit in the
/// balance. Never negative.
pub fn solve_max(input: &MaxAmountInput<'_>, fee_model: &FeeModel) -> f64 {
    let rate = sanitize_rate(input.exchange_rate, FALLBACK_EXCHANGE_RATE);
    let gas_cost = if input.gas_cost.is_finite() { input.gas_cost.max(0.0) } else { 0.0 };

    if !input.is_gas_asset {
        // fee is paid from the gas asset, the token balance is fully spendable
        if input.gas_asset_balance >= gas_cost && input.balance_native > 0.0 {
            return input.balance_native * rate;
        }
        tracing::debug!(
            "Gas balance {} cannot cover gas {} for {} send",
            input.gas_asset_balance,
            gas_cost,
            input.asset_ticker
        );
        return 0.0;
    }

    let bound_native = input.balance_native - gas_cost;
    if !(bound_native > 0.0) {
        return 0.0;
    }

    let bound_fiat = bound_native * rate;
    let percent = fee_model.percent_for(bound_fiat);
    let mut max_fiat = bound_fiat / (1.0 + f64::from(percent) / 100.0);

    // rounding can leave the deduction a few ulps above the balance
    let mut slack = f64::EPSILON;
    loop {
        let over = total_deduction(max_fiat, gas_cost, rate, fee_model) - input.balance_native;
        if over <= 0.0 {
            break;
        }
        max_fiat -= over * rate + max_fiat * slack;
        slack *= 2.0;
        if max_fiat <= 0.0 {
            return 0.0;
        }
    }

    tracing::debug!(
        "Max {} send: bound {} fiat at {}% -> {} fiat",
        input.asset_ticker,
        bound_fiat,
        percent,
        max_fiat
    );

    max_fiat
}

/// Native units leaving the wallet for a gas-asset send of `fiat_amount`.
pub fn total_deduction(fiat_amount: f64, gas_cost: f64, exchange_rate: f64, fee_model: &FeeModel) -> f64 {
    let rate = sanitize_rate(exchange_rate, FALLBACK_EXCHANGE_RATE);
    fiat_amount / rate + gas_cost + fee_model.service_fee(fiat_amount) / rate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fees::FeeTier;

    fn gas_send(balance: f64, gas_cost: f64, rate: f64) -> MaxAmountInput<'static> {
        MaxAmountInput {
            balance_native: balance,
            asset_ticker: "BTC",
            is_gas_asset: true,
            gas_asset_balance: balance,
            gas_cost,
            exchange_rate: rate,
        }
    }

    #[test]
    fn bound_inside_zero_percent_band_is_not_reduced() {
        let max = solve_max(&gas_send(1.0, 0.0004, 3000.0), &FeeModel::default());
        assert!((max - 2998.8).abs() < 1e-6, "got {}", max);
    }

    #[test]
    fn fee_is_backed_out_at_the_bound_band() {
        // bound = 2 * 3000 = 6000 fiat, 1% band -> 6000 / 1.01
        let max = solve_max(&gas_send(2.0, 0.0, 3000.0), &FeeModel::default());
        assert!((max - 6000.0 / 1.01).abs() < 1e-6);
    }

    #[test]
    fn never_exceeds_balance() {
        let models = [
            FeeModel::default(),
            FeeModel::new(vec![
                FeeTier { lower_bound: 0.0, percent: 0 },
                FeeTier { lower_bound: 100.0, percent: 1 },
                FeeTier { lower_bound: 1000.0, percent: 2 },
            ])
            .unwrap(),
        ];
        let balances = [0.0, 0.0001, 0.03, 0.1 + 0.2, 0.3333, 1.0, 2.5, 17.0];
        let gas_costs = [0.0, 0.0004, 0.01, 0.5];
        let rates = [0.5, 100.0, 3000.0, 3333.33, 65_000.0];

        for model in &models {
            for &balance in &balances {
                for &gas in &gas_costs {
                    for &rate in &rates {
                        let max = solve_max(&gas_send(balance, gas, rate), model);
                        assert!(max >= 0.0);
                        if max > 0.0 {
                            let spent = total_deduction(max, gas, rate, model);
                            assert!(
                                spent <= balance,
                                "balance {} gas {} rate {} -> max {} spends {}",
                                balance, gas, rate, max, spent
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn clamps_to_zero_when_gas_eats_balance() {
        assert_eq!(solve_max(&gas_send(0.0004, 0.0004, 3000.0), &FeeModel::default()), 0.0);
        assert_eq!(solve_max(&gas_send(0.0001, 0.0004, 3000.0), &FeeModel::default()), 0.0);
    }

    #[test]
    fn token_send_uses_full_balance_when_gas_is_covered() {
        let input = MaxAmountInput {
            balance_native: 250.0,
            asset_ticker: "USDT",
            is_gas_asset: false,
            gas_asset_balance: 0.001,
            gas_cost: 0.0004,
            exchange_rate: 1.0,
        };
        assert_eq!(solve_max(&input, &FeeModel::default()), 250.0);

        let starved = MaxAmountInput { gas_asset_balance: 0.0001, ..input };
        assert_eq!(solve_max(&starved, &FeeModel::default()), 0.0);
    }
}
