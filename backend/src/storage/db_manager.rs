use anyhow::{anyhow, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct DbManager {
    conn: Arc<Mutex<Connection>>,
}

impl DbManager {
    pub fn new(db_path: &str) -> Result<Self> {
        // ensure directory exists
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        let manager = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        manager.init_schema()?;

        Ok(manager)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sends (
                tx_id TEXT PRIMARY KEY,
                recipient TEXT NOT NULL,
                asset_ticker TEXT NOT NULL,
                native_amount REAL NOT NULL,
                fiat_amount REAL NOT NULL,
                gas_cost REAL NOT NULL,
                service_fee REAL NOT NULL,
                is_settled BOOLEAN NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sends_timestamp ON sends (timestamp DESC)",
            [],
        )?;

        Ok(())
    }

    pub fn get_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Failed to lock connection: {}", e))
    }
}
