//! Key-value store trait definition.

use crate::error::StoreResult;

/// The backing key-value store for kvrecord.
///
/// Stores are **schemaless**: keys, hash fields, and set members are plain
/// strings and the store attaches no meaning to any of them. The record
/// engine owns all key naming and value interpretation.
///
/// # Invariants
///
/// - Every command touches exactly one key and is atomic on its own.
/// - No multi-key transaction exists; callers that issue sequences of
///   commands get no atomicity across them.
/// - Sets never hold duplicate members.
/// - `incr` on a missing key treats the old value as zero.
/// - Implementations must be `Send + Sync` for concurrent access.
///
/// # Implementors
///
/// - [`super::MemoryStore`] - In-memory, for tests and ephemeral data
pub trait KvStore: Send + Sync {
    /// Reads a scalar value.
    ///
    /// Returns `None` if the key does not exist.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a scalar value, replacing whatever the key held.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Deletes a key of any kind. Deleting a missing key is a no-op.
    fn del(&self, key: &str) -> StoreResult<()>;

    /// Returns whether the key exists.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Reads one field of a hash.
    ///
    /// Returns `None` if the key or the field does not exist.
    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Writes one field of a hash, creating the hash if missing.
    fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    /// Writes several fields of a hash in one command.
    fn hset_multi(&self, key: &str, pairs: &[(String, String)]) -> StoreResult<()>;

    /// Deletes one field of a hash. Missing key or field is a no-op.
    fn hdel(&self, key: &str, field: &str) -> StoreResult<()>;

    /// Reads the full field map of a hash.
    ///
    /// A missing key reads as an empty map.
    fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, String)>>;

    /// Adds a member to a set, creating the set if missing.
    ///
    /// Returns `true` if the member was newly added.
    fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Removes a member from a set.
    ///
    /// Returns `true` if the member was present.
    fn srem(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Returns all members of a set. A missing key reads as empty.
    ///
    /// Member order is implementation-defined; callers must not assume
    /// any particular ordering.
    fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Returns the cardinality of a set. A missing key reads as zero.
    fn scard(&self, key: &str) -> StoreResult<usize>;

    /// Returns whether a member is in a set.
    fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Returns a uniformly-chosen member of a set, or `None` if empty.
    fn srandmember(&self, key: &str) -> StoreResult<Option<String>>;

    /// Atomically increments an integer counter and returns the new value.
    ///
    /// A missing key counts as zero, so the first `incr` returns 1.
    fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Returns the remaining time-to-live of a key in seconds.
    ///
    /// Returns `None` if the key is missing or has no expiry.
    fn ttl(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Sets an absolute expiry (Unix seconds) on an existing key.
    ///
    /// Expiring a missing key is a no-op.
    fn expire_at(&self, key: &str, unix_seconds: i64) -> StoreResult<()>;
}
