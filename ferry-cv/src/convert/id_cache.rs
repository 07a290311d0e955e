//! Legacy identifier translation
//!
//! Maps `(entity kind, legacy id)` to the id assigned during this migration.
//! Lookups go memo first, then the destination store (id map table or a
//! metadata scan, whichever the store is configured for). Misses are cached
//! as `0` so a missing parent costs one store query per invocation.

use serde_json::Value;
use std::collections::HashMap;

use super::entity::EntityKind;
use super::value::legacy_key_string;
use crate::destination::DestinationStore;

pub struct IdCache<'a> {
    store: &'a dyn DestinationStore,
    memo: HashMap<(EntityKind, String), i64>,
    account_periods: HashMap<String, i64>,
    store_lookups: u64,
}

impl<'a> IdCache<'a> {
    pub fn new(store: &'a dyn DestinationStore) -> Self {
        Self {
            store,
            memo: HashMap::new(),
            account_periods: HashMap::new(),
            store_lookups: 0,
        }
    }

    /// New id for a legacy value, `0` when NULL, blank or not yet converted
    pub async fn resolve(&mut self, kind: EntityKind, legacy: &Value) -> ferry_common::Result<i64> {
        match legacy_key_string(legacy) {
            Some(key) => self.resolve_key(kind, &key).await,
            None => Ok(0),
        }
    }

    /// Same as [`IdCache::resolve`] for a legacy id already in text form
    pub async fn resolve_key(&mut self, kind: EntityKind, legacy: &str) -> ferry_common::Result<i64> {
        let legacy = legacy.trim();
        if legacy.is_empty() {
            return Ok(0);
        }
        if let Some(id) = self.memo.get(&(kind, legacy.to_string())) {
            return Ok(*id);
        }

        self.store_lookups += 1;
        let id = self.store.find_legacy(kind, legacy).await?.unwrap_or(0);
        self.memo.insert((kind, legacy.to_string()), id);
        Ok(id)
    }

    /// Period a legacy account was converted under, `0` when unknown
    pub async fn account_to_period(&mut self, legacy_account: &Value) -> ferry_common::Result<i64> {
        let Some(key) = legacy_key_string(legacy_account) else {
            return Ok(0);
        };
        if let Some(id) = self.account_periods.get(&key) {
            return Ok(*id);
        }

        let account = self.resolve_key(EntityKind::Account, &key).await?;
        let period = if account == 0 {
            0
        } else {
            self.store_lookups += 1;
            self.store.parent_of(account).await?.unwrap_or(0)
        };

        self.account_periods.insert(key, period);
        Ok(period)
    }

    /// Record an id assigned by an insert made during this invocation
    pub fn remember(&mut self, kind: EntityKind, legacy: &str, new_id: i64) {
        self.memo.insert((kind, legacy.trim().to_string()), new_id);
    }

    /// Number of lookups that reached the destination store
    pub fn store_lookups(&self) -> u64 {
        self.store_lookups
    }
}
