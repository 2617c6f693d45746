//! Error taxonomy for the send gate.
//!
//! Validation, resolution and re-authentication errors are recoverable and
//! leave the draft in place. Execution errors put the gate in its terminal
//! `Failed` state. Integration errors never reach the caller: they are
//! logged and replaced by a fallback value.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Recipient is not resolved yet")]
    UnresolvedRecipient,
    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),
    #[error("Amount must be greater than zero")]
    NonPositiveAmount,
    #[error("Amount {requested:.2} exceeds the maximum sendable amount {max:.2}")]
    ExceedsMaximum { requested: f64, max: f64 },
    #[error("Sending {ticker} is not supported, only {gas_asset} can be sent")]
    UnsupportedAsset { ticker: String, gas_asset: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Could not resolve recipient '{0}'")]
    LookupFailed(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReauthError {
    #[error("Incorrect password")]
    WrongPassword,
    #[error("Re-authentication unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Executor rejected the transaction: {0}")]
    Rejected(String),
    #[error("Executor did not answer within {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Price oracle failed for {ticker}: {reason}")]
    PriceUnavailable { ticker: String, reason: String },
    #[error("Gas sampler failed: {0}")]
    GasUnavailable(String),
    #[error("Balance lookup failed for {ticker}: {reason}")]
    BalanceUnavailable { ticker: String, reason: String },
    #[error("{sink} sink failed: {reason}")]
    SinkFailed { sink: &'static str, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Reauth(#[from] ReauthError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("The draft changed while {0} was pending, try again")]
    Superseded(&'static str),
    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },
}

pub type GateResult<T> = std::result::Result<T, GateError>;
