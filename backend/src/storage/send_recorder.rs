use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rusqlite::params;
use std::sync::Arc;

use crate::models::SendRecord;
use crate::services::traits::PersistenceSink;
use crate::storage::DbManager;

/// Completed sends in the `sends` table.
pub struct SqliteSendRecorder {
    db: Arc<DbManager>,
}

impl SqliteSendRecorder {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    pub fn list_recent(&self, limit: usize) -> Result<Vec<SendRecord>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT tx_id, recipient, asset_ticker, native_amount, fiat_amount, gas_cost, service_fee, is_settled, timestamp
             FROM sends ORDER BY timestamp DESC, rowid DESC LIMIT ?",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(SendRecord {
                tx_id: row.get(0)?,
                recipient: row.get(1)?,
                asset_ticker: row.get(2)?,
                native_amount: row.get(3)?,
                fiat_amount: row.get(4)?,
                gas_cost: row.get(5)?,
                service_fee: row.get(6)?,
                settled: row.get(7)?,
                timestamp: row.get(8)?,
            })
        })?;

        let records = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| anyhow!("Failed to read send history: {}", e))?;
        Ok(records)
    }
}

#[async_trait]
impl PersistenceSink for SqliteSendRecorder {
    async fn record(&self, record: &SendRecord) -> Result<()> {
        let conn = self.db.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO sends
                (tx_id, recipient, asset_ticker, native_amount, fiat_amount, gas_cost, service_fee, is_settled, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.tx_id,
                record.recipient,
                record.asset_ticker,
                record.native_amount,
                record.fiat_amount,
                record.gas_cost,
                record.service_fee,
                record.settled,
                record.timestamp,
            ],
        )?;

        tracing::debug!("Recorded send {}", record.tx_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tx_id: &str, timestamp: i64) -> SendRecord {
        SendRecord {
            tx_id: tx_id.to_string(),
            recipient: "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4".to_string(),
            asset_ticker: "BTC".to_string(),
            native_amount: 0.01,
            fiat_amount: 30.0,
            gas_cost: 0.0001,
            service_fee: 0.0,
            settled: false,
            timestamp,
        }
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sends.db");
        let db = Arc::new(DbManager::new(path.to_str().unwrap()).unwrap());
        let recorder = SqliteSendRecorder::new(db);

        recorder.record(&record("aa", 100)).await.unwrap();
        recorder.record(&record("bb", 200)).await.unwrap();
        recorder.record(&record("cc", 150)).await.unwrap();

        let history = recorder.list_recent(2).unwrap();
        let ids: Vec<_> = history.iter().map(|r| r.tx_id.as_str()).collect();
        assert_eq!(ids, vec!["bb", "cc"]);
        assert_eq!(history[0], record("bb", 200));
    }
}
