use bitcoin::{Address, Network};
use std::str::FromStr;

const BECH32_PREFIXES: [&str; 3] = ["bc1", "tb1", "bcrt1"];
const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const BASE58_PREFIXES: [char; 5] = ['1', '3', 'm', 'n', '2'];
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Syntax rules for the recipient field on one network.
#[derive(Debug, Clone)]
pub struct AddressRules {
    network: Network,
    name_suffix: String,
}

impl AddressRules {
    pub fn new(network: Network, name_suffix: &str) -> Self {
        Self {
            network,
            name_suffix: name_suffix.to_lowercase(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Canonical form of a raw address on this network, if `raw` is one.
    pub fn parse_address(&self, raw: &str) -> Option<String> {
        let unchecked = Address::from_str(raw.trim()).ok()?;
        let address = unchecked.require_network(self.network).ok()?;
        Some(address.to_string())
    }

    /// Whether `raw` has the shape of a bech32 or base58 address, valid or
    /// not. Such input is never looked up as a name.
    pub fn looks_like_address(&self, raw: &str) -> bool {
        let raw = raw.trim();
        let lower = raw.to_lowercase();

        if let Some(prefix) = BECH32_PREFIXES.iter().find(|p| lower.starts_with(*p)) {
            let data = &lower[prefix.len()..];
            // mixed case is never valid bech32, but it is still an address attempt
            return (14..=90).contains(&raw.len()) && data.chars().all(|c| BECH32_CHARSET.contains(c));
        }

        raw.starts_with(&BASE58_PREFIXES[..])
            && (26..=35).contains(&raw.len())
            && raw.chars().all(|c| BASE58_ALPHABET.contains(c))
    }

    /// Trims the query. Anything that is not address-shaped is treated as a
    /// name: lowercased, with the name suffix appended to bare labels.
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() || self.looks_like_address(trimmed) {
            return trimmed.to_string();
        }

        let name = trimmed.to_lowercase();
        if name.contains('.') {
            name
        } else {
            format!("{}{}", name, self.name_suffix)
        }
    }
}
