//! Which confirmations a send needs, and whether it may be sent at all.
//!
//! The value tier (password or amount confirmation) is always asked first and
//! the gas warning second. Password re-authentication proves identity; the gas
//! warning is an economic acknowledgment, so a high-value send with elevated
//! gas passes both.

use crate::error::{GateError, ResolutionError, ValidationError};
use crate::models::{AuthorizationTier, CompletedSteps, FeeQuote, NextStep, ResolutionState};

/// What the policy needs to know to accept or reject a send.
#[derive(Debug, Clone, Copy)]
pub struct SendCandidate<'a> {
    pub resolution: &'a ResolutionState,
    pub fiat_amount: f64,
    pub max_fiat: f64,
    pub asset_ticker: &'a str,
}

#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    confirm_threshold: f64,
    password_threshold: f64,
    gas_asset: String,
}

impl AuthorizationPolicy {
    pub fn new(confirm_threshold: f64, password_threshold: f64, gas_asset: &str) -> Self {
        Self {
            confirm_threshold,
            password_threshold,
            gas_asset: gas_asset.to_uppercase(),
        }
    }

    pub fn gas_asset(&self) -> &str {
        &self.gas_asset
    }

    pub fn is_sendable(&self, asset_ticker: &str) -> bool {
        asset_ticker.eq_ignore_ascii_case(&self.gas_asset)
    }

    pub fn decide(&self, fiat_amount: f64, quote: &FeeQuote) -> AuthorizationTier {
        if fiat_amount >= self.password_threshold {
            AuthorizationTier::PasswordRequired
        } else if fiat_amount >= self.confirm_threshold {
            AuthorizationTier::AmountConfirmRequired
        } else if quote.gas_elevated() {
            AuthorizationTier::GasWarningRequired
        } else {
            AuthorizationTier::Plain
        }
    }

    pub fn next_step(&self, tier: AuthorizationTier, gas_elevated: bool, completed: &CompletedSteps) -> NextStep {
        match tier {
            AuthorizationTier::PasswordRequired if !completed.password_verified => {
                return NextStep::RequirePasswordReauth;
            }
            AuthorizationTier::AmountConfirmRequired if !completed.amount_confirmed => {
                return NextStep::RequireAmountConfirm;
            }
            _ => {}
        }

        let needs_gas_ack = gas_elevated || tier == AuthorizationTier::GasWarningRequired;
        if needs_gas_ack && !completed.gas_acknowledged {
            NextStep::RequireGasWarningAck
        } else {
            NextStep::None
        }
    }

    /// Rejects sends that no confirmation could make valid. Returns the
    /// resolved recipient address on success.
    pub fn check(&self, candidate: &SendCandidate<'_>) -> Result<String, GateError> {
        let address = match candidate.resolution {
            ResolutionState::Resolved(address) => address.clone(),
            ResolutionState::Failed(query) => {
                return Err(ResolutionError::LookupFailed(query.clone()).into());
            }
            ResolutionState::Invalid(raw) => {
                return Err(ValidationError::InvalidRecipient(raw.clone()).into());
            }
            ResolutionState::Idle | ResolutionState::Resolving(_) => {
                return Err(ValidationError::UnresolvedRecipient.into());
            }
        };

        if !self.is_sendable(candidate.asset_ticker) {
            return Err(ValidationError::UnsupportedAsset {
                ticker: candidate.asset_ticker.to_string(),
                gas_asset: self.gas_asset.clone(),
            }
            .into());
        }

        if !(candidate.fiat_amount > 0.0) {
            return Err(ValidationError::NonPositiveAmount.into());
        }

        if candidate.fiat_amount > candidate.max_fiat {
            return Err(ValidationError::ExceedsMaximum {
                requested: candidate.fiat_amount,
                max: candidate.max_fiat,
            }
            .into());
        }

        Ok(address)
    }
}
