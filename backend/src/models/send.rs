use serde::{Deserialize, Serialize};

/// Rate used when the oracle hands back something unusable and no
/// last-known value exists.
pub const FALLBACK_EXCHANGE_RATE: f64 = 1.0;

/// Returns `rate` when it is a usable positive number, otherwise `fallback`
/// (and `FALLBACK_EXCHANGE_RATE` if the fallback is unusable too).
pub fn sanitize_rate(rate: f64, fallback: f64) -> f64 {
    if rate.is_finite() && rate > 0.0 {
        rate
    } else if fallback.is_finite() && fallback > 0.0 {
        fallback
    } else {
        FALLBACK_EXCHANGE_RATE
    }
}

/// A send amount: the fiat value the user typed and the native quantity
/// derived from it at `rate` fiat per native unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Amount {
    pub fiat: f64,
    pub native: f64,
    pub rate: f64,
}

impl Amount {
    pub fn from_fiat(fiat: f64, rate: f64) -> Self {
        let fiat = if fiat.is_finite() && fiat > 0.0 { fiat } else { 0.0 };
        let rate = sanitize_rate(rate, FALLBACK_EXCHANGE_RATE);
        Self {
            fiat,
            native: fiat / rate,
            rate,
        }
    }

    pub fn zero() -> Self {
        Self::from_fiat(0.0, FALLBACK_EXCHANGE_RATE)
    }

    pub fn is_positive(&self) -> bool {
        self.fiat > 0.0
    }
}

/// One reading from the gas sampler, both values in native units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasSample {
    pub gas_cost: f64,
    pub average_gas: f64,
}

impl GasSample {
    pub fn is_usable(&self) -> bool {
        self.gas_cost.is_finite()
            && self.average_gas.is_finite()
            && self.gas_cost >= 0.0
            && self.average_gas >= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeeQuote {
    pub gas_cost: f64,    // native
    pub average_gas: f64, // native
    pub service_fee: f64, // fiat
    pub service_fee_percent: u8,
}

impl FeeQuote {
    pub fn zero() -> Self {
        Self {
            gas_cost: 0.0,
            average_gas: 0.0,
            service_fee: 0.0,
            service_fee_percent: 0,
        }
    }

    /// Network fee is currently above its running average.
    pub fn gas_elevated(&self) -> bool {
        self.gas_cost > self.average_gas
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ResolutionState {
    Idle,
    Resolving(String),
    Resolved(String),
    Failed(String),
    /// Looked like an address but is not a valid one on this network.
    Invalid(String),
}

impl ResolutionState {
    pub fn is_resolving(&self) -> bool {
        matches!(self, ResolutionState::Resolving(_))
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            ResolutionState::Resolved(address) => Some(address),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationTier {
    Plain,
    GasWarningRequired,
    AmountConfirmRequired,
    PasswordRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    RequireGasWarningAck,
    RequireAmountConfirm,
    RequirePasswordReauth,
    None,
}

/// Confirmations collected for the current attempt. Cleared on every edit
/// and on cancel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompletedSteps {
    pub amount_confirmed: bool,
    pub password_verified: bool,
    pub gas_acknowledged: bool,
}

impl CompletedSteps {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// The draft behind an open send form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingSend {
    pub recipient_query: String,
    pub resolved_address: Option<String>,
    pub amount: Amount,
    pub asset_ticker: String,
    pub fee_quote: FeeQuote,
    pub auth_state: CompletedSteps,
}

impl PendingSend {
    pub fn new(asset_ticker: &str) -> Self {
        Self {
            recipient_query: String::new(),
            resolved_address: None,
            amount: Amount::zero(),
            asset_ticker: asset_ticker.to_string(),
            fee_quote: FeeQuote::zero(),
            auth_state: CompletedSteps::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_id: String,
    pub settled: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRecord {
    pub tx_id: String,
    pub recipient: String,
    pub asset_ticker: String,
    pub native_amount: f64,
    pub fiat_amount: f64,
    pub gas_cost: f64,
    pub service_fee: f64,
    pub settled: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStep {
    AmountConfirm,
    PasswordReauth,
    GasWarning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SendEvent {
    StepRequired { session_id: String, step: ConfirmationStep },
    Settled { session_id: String, tx_id: String },
    Failed { session_id: String, reason: String },
    Cancelled { session_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    Editing,
    Validating,
    StepAmountConfirm,
    StepPassword,
    StepGasWarning,
    Executing,
    Settled { receipt: Receipt },
    Failed { reason: String },
}

impl GateState {
    pub fn name(&self) -> &'static str {
        match self {
            GateState::Editing => "editing",
            GateState::Validating => "validating",
            GateState::StepAmountConfirm => "step_amount_confirm",
            GateState::StepPassword => "step_password",
            GateState::StepGasWarning => "step_gas_warning",
            GateState::Executing => "executing",
            GateState::Settled { .. } => "settled",
            GateState::Failed { .. } => "failed",
        }
    }

    pub fn pending_step(&self) -> Option<ConfirmationStep> {
        match self {
            GateState::StepAmountConfirm => Some(ConfirmationStep::AmountConfirm),
            GateState::StepPassword => Some(ConfirmationStep::PasswordReauth),
            GateState::StepGasWarning => Some(ConfirmationStep::GasWarning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GateSnapshot {
    pub session_id: String,
    pub state: GateState,
    pub pending_step: Option<ConfirmationStep>,
    pub draft: PendingSend,
    pub resolution: ResolutionState,
    pub tier: Option<AuthorizationTier>,
    pub last_error: Option<String>,
}
