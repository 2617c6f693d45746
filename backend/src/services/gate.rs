//! The send form's state machine.
//!
//! `Editing -> Validating -> [StepAmountConfirm | StepPassword | StepGasWarning]*
//! -> Executing -> Settled | Failed`
//!
//! Every edit lands back in `Editing` and throws away collected
//! confirmations. The gate's state sits behind a short-lived lock that is
//! never held across an await. Operations that wait on a collaborator take a
//! revision number first and give up with `Superseded` if the draft was
//! edited or cancelled in the meantime. Once a send enters `Executing` the
//! executor call and its bookkeeping run on a detached task, so a dropped
//! caller cannot leave the gate stuck there.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{ExecutionError, GateError, GateResult, IntegrationError, ReauthError, ValidationError};
use crate::models::{
    Amount, AuthorizationTier, GasSample, GateSnapshot, GateState, NextStep, PendingSend, Receipt, ResolutionState,
    SendEvent, SendRecord,
};
use crate::services::fees::{solve_max, MaxAmountInput};
use crate::services::policy::SendCandidate;
use crate::services::resolver::{wait_settled, AddressResolver};
use crate::services::GateServices;

struct GateInner {
    resolver: AddressResolver,
    draft: PendingSend,
    state: GateState,
    tier: Option<AuthorizationTier>,
    last_error: Option<String>,
    /// Bumped by every edit and cancel.
    revision: u64,
    touched: Instant,
}

impl GateInner {
    fn invalid(&self, operation: &'static str) -> GateError {
        GateError::InvalidTransition {
            operation,
            state: self.state.name(),
        }
    }

    fn touch(&mut self) {
        self.touched = Instant::now();
    }

    fn discard_confirmations(&mut self) {
        self.draft.auth_state.clear();
        self.tier = None;
        self.last_error = None;
        self.revision += 1;
    }
}

/// What the gate does after a confirmation step has been decided.
enum Advance {
    Wait(GateState),
    Execute(SendJob),
}

/// Everything the detached execution task needs, copied out of the draft.
struct SendJob {
    address: String,
    asset_ticker: String,
    native_amount: f64,
    fiat_amount: f64,
    gas_cost: f64,
    service_fee: f64,
}

impl SendJob {
    fn record(&self, receipt: &Receipt) -> SendRecord {
        SendRecord {
            tx_id: receipt.tx_id.clone(),
            recipient: self.address.clone(),
            asset_ticker: self.asset_ticker.clone(),
            native_amount: self.native_amount,
            fiat_amount: self.fiat_amount,
            gas_cost: self.gas_cost,
            service_fee: self.service_fee,
            settled: receipt.settled,
            timestamp: receipt.timestamp,
        }
    }
}

pub struct TransactionGate {
    id: String,
    services: GateServices,
    inner: Arc<Mutex<GateInner>>,
}

impl TransactionGate {
    pub fn new(id: String, services: GateServices, resolver: AddressResolver) -> Self {
        let draft = PendingSend::new(&services.config.gas_asset);
        tracing::info!("Opened send draft {}", id);
        Self {
            id,
            services,
            inner: Arc::new(Mutex::new(GateInner {
                resolver,
                draft,
                state: GateState::Editing,
                tier: None,
                last_error: None,
                revision: 0,
                touched: Instant::now(),
            })),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> GateState {
        self.inner.lock().state.clone()
    }

    pub fn draft(&self) -> PendingSend {
        self.inner.lock().draft.clone()
    }

    pub fn resolution(&self) -> ResolutionState {
        self.inner.lock().resolver.state()
    }

    pub fn is_executing(&self) -> bool {
        self.inner.lock().state == GateState::Executing
    }

    /// Time since the last operation on this draft.
    pub fn idle_for(&self) -> Duration {
        self.inner.lock().touched.elapsed()
    }

    pub fn snapshot(&self) -> GateSnapshot {
        let inner = self.inner.lock();
        let resolution = inner.resolver.state();
        let mut draft = inner.draft.clone();
        draft.resolved_address = resolution.address().map(str::to_string);

        GateSnapshot {
            session_id: self.id.clone(),
            state: inner.state.clone(),
            pending_step: inner.state.pending_step(),
            draft,
            resolution,
            tier: inner.tier,
            last_error: inner.last_error.clone(),
        }
    }

    pub fn set_recipient(&self, raw_query: &str) -> GateResult<ResolutionState> {
        let mut inner = self.inner.lock();
        self.begin_edit(&mut inner, "edit the recipient")?;
        inner.draft.recipient_query = raw_query.to_string();
        let resolution = inner.resolver.on_input(raw_query);
        inner.draft.resolved_address = resolution.address().map(str::to_string);
        Ok(resolution)
    }

    pub async fn set_amount(&self, fiat_amount: f64) -> GateResult<PendingSend> {
        let ticker = {
            let mut inner = self.inner.lock();
            self.begin_edit(&mut inner, "edit the amount")?;
            inner.draft.amount = Amount::from_fiat(fiat_amount, inner.draft.amount.rate);
            inner.draft.asset_ticker.clone()
        };
        self.requote(&ticker).await;
        Ok(self.draft())
    }

    pub async fn set_asset(&self, asset_ticker: &str) -> GateResult<PendingSend> {
        let ticker = asset_ticker.trim().to_uppercase();
        {
            let mut inner = self.inner.lock();
            self.begin_edit(&mut inner, "change the asset")?;
            inner.draft.asset_ticker = ticker.clone();
        }
        self.requote(&ticker).await;
        Ok(self.draft())
    }

    /// Largest fiat amount the wallet can send of the draft's asset right
    /// now, after gas and service fee.
    pub async fn max_amount(&self) -> f64 {
        let ticker = self.inner.lock().draft.asset_ticker.clone();
        let (rate, sample) = self.market(&ticker).await;
        self.max_for(&ticker, rate, sample.gas_cost).await
    }

    /// Validates the draft and moves to the first required confirmation, or
    /// executes when none is needed. At a step or while executing this is a
    /// no-op returning the current state.
    pub async fn attempt_send(&self) -> GateResult<GateState> {
        let (revision, ticker, resolution_rx) = {
            let mut inner = self.inner.lock();
            inner.touch();
            match &inner.state {
                GateState::Editing | GateState::Validating => {}
                GateState::StepAmountConfirm
                | GateState::StepPassword
                | GateState::StepGasWarning
                | GateState::Executing => return Ok(inner.state.clone()),
                GateState::Settled { .. } | GateState::Failed { .. } => {
                    return Err(inner.invalid("attempt a send"));
                }
            }
            (inner.revision, inner.draft.asset_ticker.clone(), inner.resolver.subscribe())
        };

        let resolution = wait_settled(resolution_rx).await;
        let (rate, sample) = self.market(&ticker).await;
        let max_fiat = self.max_for(&ticker, rate, sample.gas_cost).await;

        let advance = {
            let mut inner = self.inner.lock();
            if inner.revision != revision {
                tracing::info!("Send {}: draft changed while validating, attempt dropped", self.id);
                return Err(GateError::Superseded("the send attempt"));
            }
            if !matches!(inner.state, GateState::Editing | GateState::Validating) {
                return Ok(inner.state.clone());
            }

            inner.state = GateState::Validating;
            inner.draft.amount = Amount::from_fiat(inner.draft.amount.fiat, rate);
            inner.draft.fee_quote = self.services.fee_model.quote(inner.draft.amount.fiat, &ticker, &sample);
            inner.draft.resolved_address = resolution.address().map(str::to_string);
            inner.draft.auth_state.clear();

            let checked = self.services.policy.check(&SendCandidate {
                resolution: &resolution,
                fiat_amount: inner.draft.amount.fiat,
                max_fiat,
                asset_ticker: &ticker,
            });
            if let Err(e) = checked {
                tracing::info!("Send {} rejected: {}", self.id, e);
                inner.state = GateState::Editing;
                inner.last_error = Some(e.to_string());
                return Err(e);
            }

            let tier = self.services.policy.decide(inner.draft.amount.fiat, &inner.draft.fee_quote);
            tracing::info!(
                "Send {}: {} {} ({} fiat) classified as {:?}",
                self.id,
                inner.draft.amount.native,
                ticker,
                inner.draft.amount.fiat,
                tier
            );
            inner.tier = Some(tier);
            inner.last_error = None;
            self.advance(&mut inner)?
        };
        self.proceed(advance).await
    }

    pub async fn confirm_amount(&self) -> GateResult<GateState> {
        let advance = {
            let mut inner = self.inner.lock();
            inner.touch();
            if inner.state != GateState::StepAmountConfirm {
                return Err(inner.invalid("confirm the amount"));
            }
            inner.draft.auth_state.amount_confirmed = true;
            self.advance(&mut inner)?
        };
        self.proceed(advance).await
    }

    /// A wrong password keeps the gate at the password step with the draft
    /// untouched.
    pub async fn submit_password(&self, password: &str) -> GateResult<GateState> {
        let revision = {
            let mut inner = self.inner.lock();
            inner.touch();
            if inner.state != GateState::StepPassword {
                return Err(inner.invalid("submit a password"));
            }
            inner.revision
        };

        let verified = self.services.reauthenticator.verify(password).await;

        let advance = {
            let mut inner = self.inner.lock();
            if inner.revision != revision || inner.state != GateState::StepPassword {
                return Err(GateError::Superseded("the password check"));
            }

            let err = match verified {
                Ok(true) => {
                    inner.draft.auth_state.password_verified = true;
                    inner.last_error = None;
                    None
                }
                Ok(false) => Some(ReauthError::WrongPassword),
                Err(e) => {
                    tracing::warn!("Re-authentication for send {} failed: {}", self.id, e);
                    Some(ReauthError::Unavailable(e.to_string()))
                }
            };
            if let Some(err) = err {
                inner.last_error = Some(err.to_string());
                return Err(err.into());
            }
            self.advance(&mut inner)?
        };
        self.proceed(advance).await
    }

    pub async fn acknowledge_gas_warning(&self) -> GateResult<GateState> {
        let advance = {
            let mut inner = self.inner.lock();
            inner.touch();
            if inner.state != GateState::StepGasWarning {
                return Err(inner.invalid("acknowledge the gas warning"));
            }
            inner.draft.auth_state.gas_acknowledged = true;
            self.advance(&mut inner)?
        };
        self.proceed(advance).await
    }

    /// Back to `Editing` with the draft intact and every confirmation
    /// discarded. Any attempt still waiting on a collaborator is abandoned.
    pub async fn cancel(&self) -> GateResult<GateState> {
        {
            let mut inner = self.inner.lock();
            inner.touch();
            if inner.state == GateState::Executing {
                return Err(inner.invalid("cancel"));
            }
            tracing::info!("Send {} cancelled at {}", self.id, inner.state.name());
            inner.state = GateState::Editing;
            inner.discard_confirmations();
        }
        publish(&self.services, SendEvent::Cancelled { session_id: self.id.clone() }).await;
        Ok(GateState::Editing)
    }

    fn begin_edit(&self, inner: &mut GateInner, operation: &'static str) -> GateResult<()> {
        inner.touch();
        if inner.state == GateState::Executing {
            return Err(inner.invalid(operation));
        }
        if inner.state != GateState::Editing {
            tracing::debug!("Send {} back to editing from {}", self.id, inner.state.name());
        }
        inner.state = GateState::Editing;
        inner.discard_confirmations();
        Ok(())
    }

    async fn market(&self, ticker: &str) -> (f64, GasSample) {
        let rate = self.services.prices.exchange_rate(ticker).await;
        let sample = self.services.gas.sample().await;
        (rate, sample)
    }

    /// Applies a fresh rate and fee quote unless the asset changed or the
    /// draft left `Editing` while the market data was fetched.
    async fn requote(&self, ticker: &str) {
        let (rate, sample) = self.market(ticker).await;
        let mut inner = self.inner.lock();
        if inner.state != GateState::Editing || inner.draft.asset_ticker != ticker {
            return;
        }
        inner.draft.amount = Amount::from_fiat(inner.draft.amount.fiat, rate);
        inner.draft.fee_quote = self.services.fee_model.quote(inner.draft.amount.fiat, ticker, &sample);
    }

    async fn max_for(&self, ticker: &str, rate: f64, gas_cost: f64) -> f64 {
        let policy = &self.services.policy;
        let is_gas_asset = policy.is_sendable(ticker);
        let balance_native = self.services.balances.balance(ticker).await;
        let gas_asset_balance = if is_gas_asset {
            balance_native
        } else {
            self.services.balances.balance(policy.gas_asset()).await
        };

        solve_max(
            &MaxAmountInput {
                balance_native,
                asset_ticker: ticker,
                is_gas_asset,
                gas_asset_balance,
                gas_cost,
                exchange_rate: rate,
            },
            &self.services.fee_model,
        )
    }

    fn advance(&self, inner: &mut GateInner) -> GateResult<Advance> {
        let tier = inner.tier.unwrap_or(AuthorizationTier::Plain);
        let next = self.services.policy.next_step(
            tier,
            inner.draft.fee_quote.gas_elevated(),
            &inner.draft.auth_state,
        );

        inner.state = match next {
            NextStep::RequirePasswordReauth => GateState::StepPassword,
            NextStep::RequireAmountConfirm => GateState::StepAmountConfirm,
            NextStep::RequireGasWarningAck => GateState::StepGasWarning,
            NextStep::None => return self.begin_execution(inner).map(Advance::Execute),
        };

        tracing::info!("Send {} waiting at {}", self.id, inner.state.name());
        Ok(Advance::Wait(inner.state.clone()))
    }

    fn begin_execution(&self, inner: &mut GateInner) -> GateResult<SendJob> {
        let Some(address) = inner.draft.resolved_address.clone() else {
            inner.state = GateState::Editing;
            return Err(ValidationError::UnresolvedRecipient.into());
        };

        inner.state = GateState::Executing;
        let job = SendJob {
            address,
            asset_ticker: inner.draft.asset_ticker.clone(),
            native_amount: inner.draft.amount.native,
            fiat_amount: inner.draft.amount.fiat,
            gas_cost: inner.draft.fee_quote.gas_cost,
            service_fee: inner.draft.fee_quote.service_fee,
        };
        tracing::info!(
            "Send {}: executing {} {} to {}",
            self.id,
            job.native_amount,
            job.asset_ticker,
            job.address
        );
        Ok(job)
    }

    async fn proceed(&self, advance: Advance) -> GateResult<GateState> {
        match advance {
            Advance::Wait(state) => {
                if let Some(step) = state.pending_step() {
                    publish(
                        &self.services,
                        SendEvent::StepRequired {
                            session_id: self.id.clone(),
                            step,
                        },
                    )
                    .await;
                }
                Ok(state)
            }
            Advance::Execute(job) => {
                let execution = tokio::spawn(run_execution(
                    self.id.clone(),
                    self.services.clone(),
                    self.inner.clone(),
                    job,
                ));
                match execution.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!("Execution task for send {} ended abnormally: {}", self.id, e);
                        Err(ExecutionError::Rejected(e.to_string()).into())
                    }
                }
            }
        }
    }
}

/// Runs the executor and settles the gate. Spawned by the caller so it
/// finishes even when nobody is waiting for it any more.
async fn run_execution(
    id: String,
    services: GateServices,
    inner: Arc<Mutex<GateInner>>,
    job: SendJob,
) -> GateResult<GateState> {
    match call_executor(&services, &job).await {
        Ok(receipt) => {
            tracing::info!("Send {} settled as {} (settled: {})", id, receipt.tx_id, receipt.settled);
            let state = {
                let mut inner = inner.lock();
                inner.state = GateState::Settled { receipt: receipt.clone() };
                inner.draft = PendingSend::new(&services.config.gas_asset);
                inner.discard_confirmations();
                inner.resolver.reset();
                inner.touch();
                inner.state.clone()
            };

            if let Err(e) = services.persistence.record(&job.record(&receipt)).await {
                tracing::warn!(
                    "{}",
                    IntegrationError::SinkFailed { sink: "persistence", reason: e.to_string() }
                );
            }
            publish(
                &services,
                SendEvent::Settled {
                    session_id: id,
                    tx_id: receipt.tx_id,
                },
            )
            .await;
            Ok(state)
        }
        Err(e) => {
            let reason = e.to_string();
            tracing::error!("Send {} failed: {}", id, reason);
            {
                let mut inner = inner.lock();
                inner.state = GateState::Failed { reason: reason.clone() };
                inner.last_error = Some(reason.clone());
                inner.touch();
            }
            publish(&services, SendEvent::Failed { session_id: id, reason }).await;
            Err(e.into())
        }
    }
}

/// The executor runs on its own task so a panic inside it surfaces as a
/// rejection, and a timeout aborts it.
async fn call_executor(services: &GateServices, job: &SendJob) -> Result<Receipt, ExecutionError> {
    let executor = services.executor.clone();
    let address = job.address.clone();
    let ticker = job.asset_ticker.clone();
    let amount = job.native_amount;
    let mut call = tokio::spawn(async move { executor.send(&address, amount, &ticker).await });

    let joined = match services.config.executor_timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut call).await {
            Ok(joined) => joined,
            Err(_) => {
                call.abort();
                return Err(ExecutionError::TimedOut(limit));
            }
        },
        None => call.await,
    };

    match joined {
        Ok(result) => result.map_err(|e| ExecutionError::Rejected(e.to_string())),
        Err(e) => Err(ExecutionError::Rejected(format!("executor task ended: {}", e))),
    }
}

async fn publish(services: &GateServices, event: SendEvent) {
    if let Err(e) = services.events.emit(event).await {
        tracing::warn!("{}", IntegrationError::SinkFailed { sink: "event", reason: e.to_string() });
    }
}
