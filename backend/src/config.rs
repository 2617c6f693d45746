use std::time::Duration;

use bitcoin::Network;

use crate::services::fees::FeeTier;

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub network: Network,
    pub gas_asset: String,
    pub fiat_currency: String,
    pub name_suffix: String,
    pub resolve_debounce: Duration,
    pub confirm_threshold: f64,
    pub password_threshold: f64,
    pub fee_tiers: Vec<FeeTier>,
    pub executor_timeout: Option<Duration>,
    pub default_exchange_rate: f64,
    pub default_gas_cost: f64,
    pub name_service_url: String,
    pub price_api_url: String,
    pub fee_api_url: String,
    pub session_idle_ttl: Duration,
    pub max_open_sends: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            network: Network::Regtest,
            gas_asset: "BTC".to_string(),
            fiat_currency: "usd".to_string(),
            name_suffix: ".btc".to_string(),
            resolve_debounce: Duration::from_millis(500),
            confirm_threshold: 1000.0,
            password_threshold: 3000.0,
            fee_tiers: default_fee_tiers(),
            executor_timeout: Some(Duration::from_secs(60)),
            default_exchange_rate: 1.0,
            default_gas_cost: 0.0001,
            name_service_url: "http://localhost:8080".to_string(),
            price_api_url: "https://api.coingecko.com".to_string(),
            fee_api_url: "https://mempool.space".to_string(),
            session_idle_ttl: Duration::from_secs(15 * 60),
            max_open_sends: 1000,
        }
    }
}

pub fn default_fee_tiers() -> Vec<FeeTier> {
    vec![
        FeeTier { lower_bound: 0.0, percent: 0 },
        FeeTier { lower_bound: 3000.0, percent: 1 },
        FeeTier { lower_bound: 10_000.0, percent: 2 },
    ]
}

impl GateConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let network = match std::env::var("BITCOIN_NETWORK").unwrap_or_else(|_| "regtest".to_string()).as_str() {
            "mainnet" => Network::Bitcoin,
            "testnet" => Network::Testnet,
            "signet" => Network::Signet,
            _ => Network::Regtest,
        };

        let fee_tiers = match std::env::var("SERVICE_FEE_TIERS") {
            Ok(raw) => match parse_fee_tiers(&raw) {
                Ok(tiers) => tiers,
                Err(e) => {
                    tracing::warn!("Ignoring SERVICE_FEE_TIERS '{}': {}", raw, e);
                    defaults.fee_tiers.clone()
                }
            },
            Err(_) => defaults.fee_tiers.clone(),
        };

        let executor_timeout = match env_parse::<u64>("EXECUTOR_TIMEOUT_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.executor_timeout,
        };

        let mut name_suffix = std::env::var("NAME_SUFFIX").unwrap_or(defaults.name_suffix);
        if !name_suffix.starts_with('.') {
            name_suffix.insert(0, '.');
        }

        Self {
            network,
            gas_asset: std::env::var("GAS_ASSET")
                .map(|t| t.to_uppercase())
                .unwrap_or(defaults.gas_asset),
            fiat_currency: std::env::var("FIAT_CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or(defaults.fiat_currency),
            name_suffix: name_suffix.to_lowercase(),
            resolve_debounce: env_parse::<u64>("RESOLVE_DEBOUNCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.resolve_debounce),
            confirm_threshold: env_parse("CONFIRM_THRESHOLD").unwrap_or(defaults.confirm_threshold),
            password_threshold: env_parse("PASSWORD_THRESHOLD").unwrap_or(defaults.password_threshold),
            fee_tiers,
            executor_timeout,
            default_exchange_rate: env_parse("DEFAULT_EXCHANGE_RATE").unwrap_or(defaults.default_exchange_rate),
            default_gas_cost: env_parse("DEFAULT_GAS_COST").unwrap_or(defaults.default_gas_cost),
            name_service_url: std::env::var("NAME_SERVICE_URL").unwrap_or(defaults.name_service_url),
            price_api_url: std::env::var("PRICE_API_URL").unwrap_or(defaults.price_api_url),
            fee_api_url: std::env::var("FEE_API_URL").unwrap_or(defaults.fee_api_url),
            session_idle_ttl: env_parse::<u64>("SESSION_IDLE_TTL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_idle_ttl),
            max_open_sends: env_parse::<usize>("MAX_OPEN_SENDS")
                .filter(|max| *max > 0)
                .unwrap_or(defaults.max_open_sends),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: '{}'", key, raw);
            None
        }
    }
}

/// Parses `"0:0,3000:1,10000:2"` into `(lower_bound, percent)` tiers.
pub fn parse_fee_tiers(raw: &str) -> anyhow::Result<Vec<FeeTier>> {
    let mut tiers = Vec::new();
    for band in raw.split(',').map(str::trim).filter(|b| !b.is_empty()) {
        let (bound, percent) = band
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("band '{}' is not <bound>:<percent>", band))?;
        tiers.push(FeeTier {
            lower_bound: bound.trim().parse()?,
            percent: percent.trim().parse()?,
        });
    }
    // reuse the fee model's table checks
    crate::services::fees::FeeModel::new(tiers.clone())?;
    Ok(tiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fee_tier_list() {
        let tiers = parse_fee_tiers("0:0, 100:1 ,1000:2").unwrap();
        assert_eq!(tiers.len(), 3);
        assert_eq!(tiers[1], FeeTier { lower_bound: 100.0, percent: 1 });
    }

    #[test]
    fn rejects_malformed_or_decreasing_tiers() {
        assert!(parse_fee_tiers("0-0").is_err());
        assert!(parse_fee_tiers("0:2,100:1").is_err());
        assert!(parse_fee_tiers("50:1").is_err());
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = GateConfig::default();
        assert_eq!(config.gas_asset, "BTC");
        assert_eq!(config.resolve_debounce, Duration::from_millis(500));
        assert_eq!(config.password_threshold, 3000.0);
        assert_eq!(config.confirm_threshold, 1000.0);
        assert_eq!(config.fee_tiers, default_fee_tiers());
    }
}
