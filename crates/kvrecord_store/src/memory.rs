//! In-memory key-value store.

use crate::error::{StoreError, StoreResult};
use crate::store::KvStore;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// One stored value.
///
/// Set members keep first-insertion order so that enumeration is stable,
/// but no ordering is part of the [`KvStore`] contract.
#[derive(Debug, Clone)]
enum Slot {
    Scalar(String),
    Hash(HashMap<String, String>),
    Set(Vec<String>),
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    expiries: HashMap<String, i64>,
}

/// An in-memory [`KvStore`].
///
/// This store keeps all data in process memory and is suitable for:
/// - Unit and integration tests
/// - Ephemeral record sets that don't need persistence
///
/// # Thread Safety
///
/// The store is thread-safe and can be shared across threads. Each command
/// takes the lock once, so single commands are atomic; sequences of
/// commands are not.
///
/// # Example
///
/// ```rust
/// use kvrecord_store::{KvStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// store.hset("Page_1", "title", "home").unwrap();
/// assert_eq!(store.hget("Page_1", "title").unwrap().as_deref(), Some("home"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live keys.
    ///
    /// Useful for asserting cleanup in tests.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.inner.read().slots.len()
    }

    /// Removes every key from the store.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.slots.clear();
        inner.expiries.clear();
    }

    fn now_unix() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self.inner.read().slots.get(key) {
            None => Ok(None),
            Some(Slot::Scalar(v)) => Ok(Some(v.clone())),
            Some(_) => Err(StoreError::wrong_type(key, "scalar")),
        }
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner
            .write()
            .slots
            .insert(key.to_string(), Slot::Scalar(value.to_string()));
        Ok(())
    }

    fn del(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.slots.remove(key);
        inner.expiries.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.inner.read().slots.contains_key(key))
    }

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        match self.inner.read().slots.get(key) {
            None => Ok(None),
            Some(Slot::Hash(map)) => Ok(map.get(field).cloned()),
            Some(_) => Err(StoreError::wrong_type(key, "hash")),
        }
    }

    fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.inner.write();
        match inner
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::Hash(HashMap::new()))
        {
            Slot::Hash(map) => {
                map.insert(field.to_string(), value.to_string());
                Ok(())
            }
            _ => Err(StoreError::wrong_type(key, "hash")),
        }
    }

    fn hset_multi(&self, key: &str, pairs: &[(String, String)]) -> StoreResult<()> {
        let mut inner = self.inner.write();
        match inner
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::Hash(HashMap::new()))
        {
            Slot::Hash(map) => {
                for (field, value) in pairs {
                    map.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            _ => Err(StoreError::wrong_type(key, "hash")),
        }
    }

    fn hdel(&self, key: &str, field: &str) -> StoreResult<()> {
        let mut inner = self.inner.write();
        match inner.slots.get_mut(key) {
            None => Ok(()),
            Some(Slot::Hash(map)) => {
                map.remove(field);
                Ok(())
            }
            Some(_) => Err(StoreError::wrong_type(key, "hash")),
        }
    }

    fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, String)>> {
        match self.inner.read().slots.get(key) {
            None => Ok(Vec::new()),
            Some(Slot::Hash(map)) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            Some(_) => Err(StoreError::wrong_type(key, "hash")),
        }
    }

    fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        match inner
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::Set(Vec::new()))
        {
            Slot::Set(members) => {
                if members.iter().any(|m| m == member) {
                    Ok(false)
                } else {
                    members.push(member.to_string());
                    Ok(true)
                }
            }
            _ => Err(StoreError::wrong_type(key, "set")),
        }
    }

    fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        match inner.slots.get_mut(key) {
            None => Ok(false),
            Some(Slot::Set(members)) => {
                let before = members.len();
                members.retain(|m| m != member);
                Ok(members.len() != before)
            }
            Some(_) => Err(StoreError::wrong_type(key, "set")),
        }
    }

    fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.inner.read().slots.get(key) {
            None => Ok(Vec::new()),
            Some(Slot::Set(members)) => Ok(members.clone()),
            Some(_) => Err(StoreError::wrong_type(key, "set")),
        }
    }

    fn scard(&self, key: &str) -> StoreResult<usize> {
        match self.inner.read().slots.get(key) {
            None => Ok(0),
            Some(Slot::Set(members)) => Ok(members.len()),
            Some(_) => Err(StoreError::wrong_type(key, "set")),
        }
    }

    fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        match self.inner.read().slots.get(key) {
            None => Ok(false),
            Some(Slot::Set(members)) => Ok(members.iter().any(|m| m == member)),
            Some(_) => Err(StoreError::wrong_type(key, "set")),
        }
    }

    fn srandmember(&self, key: &str) -> StoreResult<Option<String>> {
        match self.inner.read().slots.get(key) {
            None => Ok(None),
            Some(Slot::Set(members)) => Ok(members.choose(&mut rand::thread_rng()).cloned()),
            Some(_) => Err(StoreError::wrong_type(key, "set")),
        }
    }

    fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut inner = self.inner.write();
        match inner
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::Scalar("0".to_string()))
        {
            Slot::Scalar(v) => {
                let current: i64 = v
                    .parse()
                    .map_err(|_| StoreError::wrong_type(key, "integer"))?;
                let next = current + 1;
                *v = next.to_string();
                Ok(next)
            }
            _ => Err(StoreError::wrong_type(key, "integer")),
        }
    }

    fn ttl(&self, key: &str) -> StoreResult<Option<i64>> {
        let inner = self.inner.read();
        if !inner.slots.contains_key(key) {
            return Ok(None);
        }
        Ok(inner
            .expiries
            .get(key)
            .map(|deadline| deadline - Self::now_unix()))
    }

    fn expire_at(&self, key: &str, unix_seconds: i64) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if inner.slots.contains_key(key) {
            inner.expiries.insert(key.to_string(), unix_seconds);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert!(store.exists("k").unwrap());

        store.del("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        assert!(!store.exists("k").unwrap());
    }

    #[test]
    fn del_missing_key_is_noop() {
        let store = MemoryStore::new();
        store.del("nothing").unwrap();
    }

    #[test]
    fn hash_fields() {
        let store = MemoryStore::new();
        store.hset("h", "a", "1").unwrap();
        store
            .hset_multi("h", &[("b".into(), "2".into()), ("c".into(), "3".into())])
            .unwrap();

        assert_eq!(store.hget("h", "a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.hget("h", "missing").unwrap(), None);

        let mut all = store.hgetall("h").unwrap();
        all.sort();
        assert_eq!(
            all,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("c".to_string(), "3".to_string()),
            ]
        );

        store.hdel("h", "b").unwrap();
        assert_eq!(store.hget("h", "b").unwrap(), None);
    }

    #[test]
    fn hgetall_missing_key_is_empty() {
        let store = MemoryStore::new();
        assert!(store.hgetall("nope").unwrap().is_empty());
    }

    #[test]
    fn set_membership_deduplicates() {
        let store = MemoryStore::new();
        assert!(store.sadd("s", "1").unwrap());
        assert!(store.sadd("s", "2").unwrap());
        assert!(!store.sadd("s", "1").unwrap());

        assert_eq!(store.scard("s").unwrap(), 2);
        assert!(store.sismember("s", "1").unwrap());
        assert!(!store.sismember("s", "3").unwrap());

        assert!(store.srem("s", "1").unwrap());
        assert!(!store.srem("s", "1").unwrap());
        assert_eq!(store.smembers("s").unwrap(), vec!["2".to_string()]);
    }

    #[test]
    fn set_preserves_insertion_order() {
        let store = MemoryStore::new();
        for m in ["9", "3", "7"] {
            store.sadd("s", m).unwrap();
        }
        assert_eq!(store.smembers("s").unwrap(), vec!["9", "3", "7"]);
    }

    #[test]
    fn srandmember_empty_and_nonempty() {
        let store = MemoryStore::new();
        assert_eq!(store.srandmember("s").unwrap(), None);

        store.sadd("s", "only").unwrap();
        assert_eq!(store.srandmember("s").unwrap().as_deref(), Some("only"));
    }

    #[test]
    fn incr_counts_from_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("counter").unwrap(), 1);
        assert_eq!(store.incr("counter").unwrap(), 2);
        assert_eq!(store.incr("counter").unwrap(), 3);
    }

    #[test]
    fn incr_continues_from_set_value() {
        let store = MemoryStore::new();
        store.set("counter", "41").unwrap();
        assert_eq!(store.incr("counter").unwrap(), 42);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let store = MemoryStore::new();
        store.hset("h", "a", "1").unwrap();

        assert!(matches!(
            store.sadd("h", "1"),
            Err(StoreError::WrongType { .. })
        ));
        assert!(matches!(
            store.get("h"),
            Err(StoreError::WrongType { .. })
        ));

        store.set("scalar", "text").unwrap();
        assert!(matches!(
            store.incr("scalar"),
            Err(StoreError::WrongType { .. })
        ));
    }

    #[test]
    fn expiry_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.ttl("k").unwrap(), None);

        store.set("k", "v").unwrap();
        assert_eq!(store.ttl("k").unwrap(), None);

        let deadline = MemoryStore::now_unix() + 100;
        store.expire_at("k", deadline).unwrap();
        let ttl = store.ttl("k").unwrap().unwrap();
        assert!(ttl > 90 && ttl <= 100);

        // Deleting the key drops the expiry with it
        store.del("k").unwrap();
        store.set("k", "v").unwrap();
        assert_eq!(store.ttl("k").unwrap(), None);
    }

    #[test]
    fn expire_at_missing_key_is_noop() {
        let store = MemoryStore::new();
        store.expire_at("nothing", 12345).unwrap();
        assert_eq!(store.ttl("nothing").unwrap(), None);
    }

    #[test]
    fn clear_and_key_count() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();
        store.sadd("b", "1").unwrap();
        assert_eq!(store.key_count(), 2);

        store.clear();
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn shared_across_threads() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.incr("counter").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("counter").unwrap().as_deref(), Some("400"));
    }
}
