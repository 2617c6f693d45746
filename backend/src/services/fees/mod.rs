pub mod fee_model;
pub mod gas_sampler;
pub mod max_amount;
pub mod price_oracle;

pub use fee_model::{FeeModel, FeeTableError, FeeTier};
pub use gas_sampler::{FeePriority, MempoolGasSampler};
pub use max_amount::{solve_max, total_deduction, MaxAmountInput};
pub use price_oracle::HttpPriceOracle;
