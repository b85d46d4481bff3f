// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded node database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `summary_settings`: account_id → serialized SummarySetting
//! - `settings_by_wallet`: composite key (wallet_id|account_id) → account_id
//! - `consolidation_log`: composite key (create_time_be|sid) → serialized entry
//! - `trust_addresses`: composite key (symbol|address) → serialized TrustAddress
//! - `node_state`: key → value (allow-list flag, current identity)

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};

use crate::models::{ConsolidationLogEntry, SummarySetting, TrustAddress};

// =============================================================================
// Table Definitions
// =============================================================================

const SUMMARY_SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("summary_settings");

/// Secondary index for settings lookups by wallet.
const SETTINGS_BY_WALLET: TableDefinition<&[u8], &str> =
    TableDefinition::new("settings_by_wallet");

/// Ascending by creation time; read in reverse for newest-first pages.
const CONSOLIDATION_LOG: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("consolidation_log");

const TRUST_ADDRESSES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("trust_addresses");

const NODE_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("node_state");

const TRUST_ADDRESS_ENABLED_KEY: &str = "trust_address_enabled";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Key Helpers
// =============================================================================

fn composite_key(prefix: &str, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + suffix.len());
    key.extend_from_slice(prefix.as_bytes());
    key.push(b'|');
    key.extend_from_slice(suffix);
    key
}

/// Inclusive start and exclusive end covering every key under `prefix|`.
fn prefix_bounds(prefix: &str) -> (Vec<u8>, Vec<u8>) {
    let start = composite_key(prefix, &[]);
    let mut end = start.clone();
    // Identifiers are ASCII, so 0xFF sorts past every continuation.
    end.push(0xFF);
    (start, end)
}

fn log_key(create_time: i64, sid: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 1 + sid.len());
    key.extend_from_slice(&(create_time.max(0) as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(sid.as_bytes());
    key
}

// =============================================================================
// NodeDatabase
// =============================================================================

pub struct NodeDatabase {
    db: Database,
}

impl NodeDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SUMMARY_SETTINGS)?;
            let _ = write_txn.open_table(SETTINGS_BY_WALLET)?;
            let _ = write_txn.open_table(CONSOLIDATION_LOG)?;
            let _ = write_txn.open_table(TRUST_ADDRESSES)?;
            let _ = write_txn.open_table(NODE_STATE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Consolidation settings
    // =========================================================================

    /// Insert or replace the setting for its account, keeping the wallet index
    /// consistent when the owning wallet changes.
    pub fn save_summary_setting(&self, setting: &SummarySetting) -> StoreResult<()> {
        let json = serde_json::to_vec(setting)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut settings = write_txn.open_table(SUMMARY_SETTINGS)?;
            let mut by_wallet = write_txn.open_table(SETTINGS_BY_WALLET)?;

            let previous = settings
                .get(setting.account_id.as_str())?
                .map(|v| v.value().to_vec());
            if let Some(bytes) = previous {
                let old: SummarySetting = serde_json::from_slice(&bytes)?;
                let old_key = composite_key(&old.wallet_id, old.account_id.as_bytes());
                by_wallet.remove(old_key.as_slice())?;
            }

            settings.insert(setting.account_id.as_str(), json.as_slice())?;
            let key = composite_key(&setting.wallet_id, setting.account_id.as_bytes());
            by_wallet.insert(key.as_slice(), setting.account_id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_summary_setting(&self, account_id: &str) -> StoreResult<Option<SummarySetting>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SUMMARY_SETTINGS)?;
        match table.get(account_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn find_summary_settings_by_wallet(
        &self,
        wallet_id: &str,
    ) -> StoreResult<Vec<SummarySetting>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(SETTINGS_BY_WALLET)?;
        let settings = read_txn.open_table(SUMMARY_SETTINGS)?;

        let (start, end) = prefix_bounds(wallet_id);
        let mut results = Vec::new();
        for entry in index.range(start.as_slice()..end.as_slice())? {
            let (_, account_id) = entry?;
            if let Some(value) = settings.get(account_id.value())? {
                results.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(results)
    }

    // =========================================================================
    // Consolidation log
    // =========================================================================

    pub fn append_consolidation_log(&self, entry: &ConsolidationLogEntry) -> StoreResult<()> {
        let json = serde_json::to_vec(entry)?;
        let key = log_key(entry.create_time, &entry.sid);

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CONSOLIDATION_LOG)?;
            table.insert(key.as_slice(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Newest-first page of the consolidation log. `usize::MAX` lists everything.
    pub fn list_consolidation_logs(
        &self,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<ConsolidationLogEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CONSOLIDATION_LOG)?;

        let mut results = Vec::new();
        for entry in table.iter()?.rev().skip(offset).take(limit) {
            let (_, value) = entry?;
            results.push(serde_json::from_slice(value.value())?);
        }
        Ok(results)
    }

    // =========================================================================
    // Trust addresses
    // =========================================================================

    pub fn add_trust_address(&self, trust: &TrustAddress) -> StoreResult<()> {
        let json = serde_json::to_vec(trust)?;
        let key = composite_key(&trust.symbol, trust.address.as_bytes());

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRUST_ADDRESSES)?;
            table.insert(key.as_slice(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Returns whether an entry was removed.
    pub fn remove_trust_address(&self, address: &str, symbol: &str) -> StoreResult<bool> {
        let key = composite_key(symbol, address.as_bytes());
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(TRUST_ADDRESSES)?;
            let removed = table.remove(key.as_slice())?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    pub fn has_trust_address(&self, address: &str, symbol: &str) -> StoreResult<bool> {
        let key = composite_key(symbol, address.as_bytes());
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRUST_ADDRESSES)?;
        Ok(table.get(key.as_slice())?.is_some())
    }

    /// List trust addresses, optionally restricted to one currency symbol.
    pub fn list_trust_addresses(&self, symbol: Option<&str>) -> StoreResult<Vec<TrustAddress>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRUST_ADDRESSES)?;

        let mut results = Vec::new();
        match symbol.filter(|s| !s.is_empty()) {
            Some(symbol) => {
                let (start, end) = prefix_bounds(symbol);
                for entry in table.range(start.as_slice()..end.as_slice())? {
                    let (_, value) = entry?;
                    results.push(serde_json::from_slice(value.value())?);
                }
            }
            None => {
                for entry in table.iter()? {
                    let (_, value) = entry?;
                    results.push(serde_json::from_slice(value.value())?);
                }
            }
        }
        Ok(results)
    }

    pub fn trust_address_enabled(&self) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NODE_STATE)?;
        Ok(table
            .get(TRUST_ADDRESS_ENABLED_KEY)?
            .is_some_and(|v| v.value().first() == Some(&1)))
    }

    pub fn set_trust_address_enabled(&self, enabled: bool) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(NODE_STATE)?;
            table.insert(TRUST_ADDRESS_ENABLED_KEY, &[u8::from(enabled)] as &[u8])?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Node state
    // =========================================================================

    pub fn load_state<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NODE_STATE)?;
        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn store_state<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let json = serde_json::to_vec(value)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(NODE_STATE)?;
            table.insert(key, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coin;

    fn temp_db() -> (NodeDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = NodeDatabase::open(&dir.path().join("db").join("test.redb")).unwrap();
        (db, dir)
    }

    fn setting(wallet: &str, account: &str) -> SummarySetting {
        SummarySetting {
            wallet_id: wallet.to_string(),
            account_id: account.to_string(),
            sum_address: format!("sum-{account}"),
            threshold: "5".to_string(),
            min_transfer: "0.1".to_string(),
            retained_balance: "0".to_string(),
            confirms: 1,
        }
    }

    fn log_entry(sid: &str, create_time: i64) -> ConsolidationLogEntry {
        ConsolidationLogEntry {
            sid: sid.to_string(),
            wallet_id: "W1".to_string(),
            account_id: "A1".to_string(),
            start_addr_index: 0,
            end_addr_index: 200,
            coin: Coin::native("ETH"),
            success_count: 1,
            fail_count: 0,
            tx_ids: vec![format!("tx-{sid}")],
            sids: vec![sid.to_string()],
            total_sum_amount: "9.9".to_string(),
            total_cost_fees: "0.1".to_string(),
            create_time,
        }
    }

    #[test]
    fn save_and_get_summary_setting() {
        let (db, _dir) = temp_db();
        assert!(db.get_summary_setting("A1").unwrap().is_none());

        db.save_summary_setting(&setting("W1", "A1")).unwrap();
        let loaded = db.get_summary_setting("A1").unwrap().unwrap();
        assert_eq!(loaded, setting("W1", "A1"));
    }

    #[test]
    fn settings_are_indexed_by_wallet() {
        let (db, _dir) = temp_db();
        db.save_summary_setting(&setting("W1", "A1")).unwrap();
        db.save_summary_setting(&setting("W1", "A2")).unwrap();
        db.save_summary_setting(&setting("W2", "B1")).unwrap();

        let w1 = db.find_summary_settings_by_wallet("W1").unwrap();
        assert_eq!(w1.len(), 2);
        assert!(w1.iter().all(|s| s.wallet_id == "W1"));

        // "W" is a prefix of both wallet ids but must not match either
        assert!(db.find_summary_settings_by_wallet("W").unwrap().is_empty());
    }

    #[test]
    fn moving_setting_to_other_wallet_updates_index() {
        let (db, _dir) = temp_db();
        db.save_summary_setting(&setting("W1", "A1")).unwrap();
        db.save_summary_setting(&setting("W2", "A1")).unwrap();

        assert!(db.find_summary_settings_by_wallet("W1").unwrap().is_empty());
        assert_eq!(db.find_summary_settings_by_wallet("W2").unwrap().len(), 1);
    }

    #[test]
    fn consolidation_log_is_newest_first_with_paging() {
        let (db, _dir) = temp_db();
        for (i, sid) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            db.append_consolidation_log(&log_entry(sid, 1_700_000_000 + i as i64))
                .unwrap();
        }

        let page1 = db.list_consolidation_logs(0, 2).unwrap();
        assert_eq!(
            page1.iter().map(|e| e.sid.as_str()).collect::<Vec<_>>(),
            vec!["e", "d"]
        );

        let page3 = db.list_consolidation_logs(4, 2).unwrap();
        assert_eq!(page3.len(), 1);
        assert_eq!(page3[0].sid, "a");

        assert!(db.list_consolidation_logs(10, 2).unwrap().is_empty());

        let all = db.list_consolidation_logs(1, usize::MAX).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].sid, "d");
    }

    #[test]
    fn trust_addresses_by_symbol() {
        let (db, _dir) = temp_db();
        db.add_trust_address(&TrustAddress::new("0xaaa", "ETH", "cold"))
            .unwrap();
        db.add_trust_address(&TrustAddress::new("0xbbb", "ETH", ""))
            .unwrap();
        db.add_trust_address(&TrustAddress::new("Tccc", "TRX", ""))
            .unwrap();

        assert_eq!(db.list_trust_addresses(Some("ETH")).unwrap().len(), 2);
        assert_eq!(db.list_trust_addresses(Some("TRX")).unwrap().len(), 1);
        assert_eq!(db.list_trust_addresses(None).unwrap().len(), 3);
        assert_eq!(db.list_trust_addresses(Some("")).unwrap().len(), 3);

        assert!(db.has_trust_address("0xaaa", "ETH").unwrap());
        assert!(!db.has_trust_address("0xaaa", "TRX").unwrap());

        assert!(db.remove_trust_address("0xaaa", "ETH").unwrap());
        assert!(!db.remove_trust_address("0xaaa", "ETH").unwrap());
        assert!(!db.has_trust_address("0xaaa", "ETH").unwrap());
    }

    #[test]
    fn trust_flag_defaults_off() {
        let (db, _dir) = temp_db();
        assert!(!db.trust_address_enabled().unwrap());
        db.set_trust_address_enabled(true).unwrap();
        assert!(db.trust_address_enabled().unwrap());
        db.set_trust_address_enabled(false).unwrap();
        assert!(!db.trust_address_enabled().unwrap());
    }

    #[test]
    fn state_round_trips_json() {
        let (db, _dir) = temp_db();
        assert!(db.load_state::<String>("k").unwrap().is_none());
        db.store_state("k", &"value".to_string()).unwrap();
        assert_eq!(db.load_state::<String>("k").unwrap().as_deref(), Some("value"));
    }

    #[test]
    fn log_key_orders_by_time() {
        assert!(log_key(1000, "zzz") < log_key(2000, "aaa"));
    }
}
