#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bitcoin::Network;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use send_gate::config::GateConfig;
use send_gate::models::{GasSample, Receipt, SendEvent, SendRecord};
use send_gate::services::balances::InMemoryBalanceSource;
use send_gate::services::traits::{
    EventSink, Executor, GasSampler, NameResolver, PersistenceSink, PriceOracle, Reauthenticator,
};
use send_gate::services::{GateCollaborators, GateServices};

pub const ALICE: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
pub const BOB: &str = "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2";
pub const PASSWORD: &str = "hunter2";
pub const RATE: f64 = 3000.0;

pub const NORMAL_GAS: GasSample = GasSample { gas_cost: 0.0004, average_gas: 0.0004 };
pub const ELEVATED_GAS: GasSample = GasSample { gas_cost: 0.0008, average_gas: 0.0004 };

pub fn test_config() -> GateConfig {
    GateConfig {
        network: Network::Bitcoin,
        resolve_debounce: Duration::from_millis(100),
        executor_timeout: Some(Duration::from_secs(60)),
        ..GateConfig::default()
    }
}

pub struct StaticNames {
    records: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl NameResolver for StaticNames {
    async fn resolve(&self, query: &str) -> Result<Option<String>> {
        self.calls.lock().unwrap().push(query.to_string());
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(self.records.get(query).cloned())
    }
}

pub struct FixedOracle {
    pub fail: AtomicBool,
}

#[async_trait]
impl PriceOracle for FixedOracle {
    async fn current_exchange_rate(&self, _ticker: &str) -> Result<f64> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("price feed offline"));
        }
        Ok(RATE)
    }
}

pub struct ScriptedSampler {
    sample: Mutex<GasSample>,
}

impl ScriptedSampler {
    pub fn set(&self, sample: GasSample) {
        *self.sample.lock().unwrap() = sample;
    }
}

#[async_trait]
impl GasSampler for ScriptedSampler {
    async fn sample(&self) -> Result<GasSample> {
        Ok(*self.sample.lock().unwrap())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendCall {
    pub address: String,
    pub native_amount: f64,
    pub asset_ticker: String,
}

pub struct RecordingExecutor {
    pub calls: Mutex<Vec<SendCall>>,
    pub fail: AtomicBool,
    pub delay: Mutex<Duration>,
}

impl RecordingExecutor {
    pub fn calls(&self) -> Vec<SendCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn send(&self, address: &str, native_amount: f64, asset_ticker: &str) -> Result<Receipt> {
        self.calls.lock().unwrap().push(SendCall {
            address: address.to_string(),
            native_amount,
            asset_ticker: asset_ticker.to_string(),
        });

        let delay = *self.delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("node rejected transaction"));
        }
        let n = self.calls.lock().unwrap().len();
        Ok(Receipt {
            tx_id: format!("tx-{}", n),
            settled: true,
            timestamp: 1_700_000_000 + n as i64,
        })
    }
}

pub struct FixedReauth;

#[async_trait]
impl Reauthenticator for FixedReauth {
    async fn verify(&self, password: &str) -> Result<bool> {
        Ok(password == PASSWORD)
    }
}

pub struct RecordingSink {
    pub records: Mutex<Vec<SendRecord>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl PersistenceSink for RecordingSink {
    async fn record(&self, record: &SendRecord) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub struct RecordingEvents {
    pub events: Mutex<Vec<SendEvent>>,
    pub fail: AtomicBool,
}

impl RecordingEvents {
    pub fn events(&self) -> Vec<SendEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingEvents {
    async fn emit(&self, event: SendEvent) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("ui detached"));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

pub struct Mocks {
    pub names: Arc<StaticNames>,
    pub oracle: Arc<FixedOracle>,
    pub sampler: Arc<ScriptedSampler>,
    pub balances: Arc<InMemoryBalanceSource>,
    pub executor: Arc<RecordingExecutor>,
    pub records: Arc<RecordingSink>,
    pub events: Arc<RecordingEvents>,
}

impl Mocks {
    pub fn new() -> Self {
        let mut records = HashMap::new();
        records.insert("alice.btc".to_string(), ALICE.to_string());
        records.insert("bob.btc".to_string(), BOB.to_string());

        let balances = Arc::new(InMemoryBalanceSource::new());
        balances.set("BTC", 2.0).unwrap();

        Self {
            names: Arc::new(StaticNames {
                records,
                calls: Mutex::new(Vec::new()),
            }),
            oracle: Arc::new(FixedOracle { fail: AtomicBool::new(false) }),
            sampler: Arc::new(ScriptedSampler { sample: Mutex::new(NORMAL_GAS) }),
            balances,
            executor: Arc::new(RecordingExecutor {
                calls: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
                delay: Mutex::new(Duration::from_millis(10)),
            }),
            records: Arc::new(RecordingSink {
                records: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            }),
            events: Arc::new(RecordingEvents {
                events: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            }),
        }
    }

    pub fn collaborators(&self) -> GateCollaborators {
        GateCollaborators {
            name_resolver: self.names.clone(),
            price_oracle: self.oracle.clone(),
            gas_sampler: self.sampler.clone(),
            balances: self.balances.clone(),
            executor: self.executor.clone(),
            reauthenticator: Arc::new(FixedReauth),
            persistence: self.records.clone(),
            events: self.events.clone(),
        }
    }

    pub fn services(&self) -> GateServices {
        GateServices::new(self.collaborators(), test_config()).unwrap()
    }
}
