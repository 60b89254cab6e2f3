// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A string-keyed map split into independently locked shards.
//!
//! Keys are assigned to a shard by their FNV hash, so lookups and insertions for keys in
//! different shards never contend on the same lock.

use fnv::FnvHasher;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{PoisonError, RwLock};

pub const SHARD_COUNT: usize = 32;

pub struct ShardMap<V> {
    shards: Vec<RwLock<HashMap<String, V>>>,
}

impl<V: Clone> Default for ShardMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ShardMap<V> {
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self { shards }
    }

    fn shard(&self, key: &str) -> &RwLock<HashMap<String, V>> {
        let mut hasher = FnvHasher::default();
        hasher.write(key.as_bytes());
        // SHARD_COUNT fits in u64, and the remainder fits back in usize
        let index = (hasher.finish() % SHARD_COUNT as u64) as usize;
        &self.shards[index]
    }

    /// Returns the value stored under `key`, creating it with `create` if absent.
    ///
    /// The shard's write lock is held while `create` runs, so at most one value is ever
    /// created per key.
    pub fn fetch_or_create<F>(&self, key: &str, create: F) -> V
    where
        F: FnOnce(&str) -> V,
    {
        let mut items = self
            .shard(key)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = items.get(key) {
            return value.clone();
        }
        let value = create(key);
        items.insert(key.to_string(), value.clone());
        value
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.shard(key)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.shard(key)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn count(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Visits every entry once. Shard order is unspecified.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &V),
    {
        for shard in &self.shards {
            let items = shard.read().unwrap_or_else(PoisonError::into_inner);
            for (key, value) in items.iter() {
                visit(key, value);
            }
        }
    }
}
