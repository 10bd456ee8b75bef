//! Incremental-rehashing hash table: two parallel bucket-chain tables, migrated a few
//! buckets at a time so no single operation pays for a full rehash. The design (and the
//! constants below) mirrors the dictionary this crate's reference implementation ships,
//! itself a Rust-flavored reading of the classic incremental-resize dict by Pieter
//! Noordhuis / Salvatore Sanfilippo.

pub mod seeds;

pub use seeds::HashSeeds;

use rand::Rng;
use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};

/// Minimum bucket count a freshly expanded table is allowed to shrink to.
const MIN_SIZE: usize = 8;
/// Above this load factor, expansion is forced even while an unsafe iterator would
/// normally forbid it (mirrors `G_DICT_FORCE_RESIZE_RATIO`).
const FORCE_RESIZE_RATIO: usize = 5;
/// `rehash_step` gives up after visiting this many empty buckets per unit of work, so a
/// sparse table can't make the step loop run unbounded.
const EMPTY_VISITS_PER_STEP: usize = 10;

/// Failure modes named by spec.md §7 ("Hash."): everything else is infallible given a
/// well-behaved `K: Eq + Hash`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DictError {
    /// `add` found the key already present.
    Duplicate,
    /// `reallocate` was called while a rehash was already in flight.
    RehashInProgress,
}

pub type Result<T> = ::std::result::Result<T, DictError>;

struct Entry<K, V> {
    key: K,
    value: V,
    next: Option<Box<Entry<K, V>>>,
}

struct Table<K, V> {
    buckets: Vec<Option<Box<Entry<K, V>>>>,
    size_mask: usize,
    used: usize,
}

impl<K, V> Table<K, V> {
    fn empty() -> Self {
        Table {
            buckets: Vec::new(),
            size_mask: 0,
            used: 0,
        }
    }

    fn with_size(size: usize) -> Self {
        let mut buckets = Vec::with_capacity(size);
        buckets.resize_with(size, || None);
        Table {
            buckets,
            size_mask: size - 1,
            used: 0,
        }
    }
}

/// A dictionary with Redis-style incremental rehashing. `K` must be `Eq + Hash`; `S` is a
/// [`BuildHasher`], defaulting to `std`'s randomized one (swap in [`HashSeeds`] for
/// reproducible hashing).
pub struct Dict<K, V, S = RandomState> {
    tables: [Table<K, V>; 2],
    rehash_idx: isize,
    hasher: S,
    safe_iterators: usize,
}

impl<K: Eq + Hash, V> Dict<K, V, RandomState> {
    pub fn new() -> Self {
        Dict::with_hasher(RandomState::new())
    }
}

impl<K: Eq + Hash, V> Default for Dict<K, V, RandomState> {
    fn default() -> Self {
        Dict::new()
    }
}

impl<K: Eq + Hash, V, S: BuildHasher> Dict<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Dict {
            tables: [Table::empty(), Table::empty()],
            rehash_idx: -1,
            hasher,
            safe_iterators: 0,
        }
    }

    #[inline]
    pub fn is_rehashing(&self) -> bool {
        self.rehash_idx != -1
    }

    pub fn len(&self) -> usize {
        self.tables[0].used + self.tables[1].used
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn hash<Q: ?Sized + Hash>(&self, key: &Q) -> usize {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        hasher.finish() as usize
    }

    /// Run up to `n` units of incremental rehash work. Returns `true` if rehashing is
    /// still in progress afterwards.
    pub fn rehash_step(&mut self, n: usize) -> bool {
        if !self.is_rehashing() {
            return false;
        }

        let mut empty_visits = n * EMPTY_VISITS_PER_STEP;
        let mut steps = n;

        while steps > 0 && self.tables[0].used != 0 {
            steps -= 1;

            while self.tables[0].buckets[self.rehash_idx as usize].is_none() {
                self.rehash_idx += 1;
                empty_visits -= 1;
                if empty_visits == 0 {
                    return true;
                }
            }

            let mut entry = self.tables[0].buckets[self.rehash_idx as usize].take();
            while let Some(mut boxed) = entry {
                let next = boxed.next.take();
                let idx = self.hash(&boxed.key) & self.tables[1].size_mask;
                boxed.next = self.tables[1].buckets[idx].take();
                self.tables[1].buckets[idx] = Some(boxed);
                self.tables[0].used -= 1;
                self.tables[1].used += 1;
                entry = next;
            }

            self.rehash_idx += 1;
        }

        if self.tables[0].used == 0 {
            self.tables[0] = std::mem::replace(&mut self.tables[1], Table::empty());
            self.rehash_idx = -1;
            false
        } else {
            true
        }
    }

    fn rehash_moment(&mut self) {
        if self.is_rehashing() && self.safe_iterators == 0 {
            self.rehash_step(1);
        }
    }

    fn begin_resize(&mut self, size: usize) {
        let size = size.max(MIN_SIZE).next_power_of_two();
        if self.is_rehashing() || self.tables[0].buckets.len() == size {
            return;
        }

        if self.tables[0].buckets.is_empty() {
            self.tables[0] = Table::with_size(size);
            return;
        }

        self.tables[1] = Table::with_size(size);
        self.rehash_idx = 0;
    }

    fn expand_if_needed(&mut self) {
        if self.is_rehashing() {
            return;
        }

        if self.tables[0].buckets.is_empty() {
            self.begin_resize(MIN_SIZE);
            return;
        }

        let used = self.tables[0].used;
        let allocated = self.tables[0].buckets.len();

        if used >= allocated && (self.safe_iterators == 0 || used / allocated > FORCE_RESIZE_RATIO) {
            self.begin_resize(used * 2);
        }
    }

    /// `add-or-replace`: insert `key`, overwriting and returning any prior value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.rehash_moment();
        self.insert_raw(key, value)
    }

    /// The actual insert logic, with no rehash-step of its own — every public entry
    /// point (`insert`, `add`, `add_or_find`) calls [`Dict::rehash_moment`] exactly once
    /// itself and then drives this, so a single public call never advances the rehash by
    /// more than the one step spec.md §4.2 promises.
    fn insert_raw(&mut self, key: K, value: V) -> Option<V> {
        self.expand_if_needed();

        let idx_hash = self.hash(&key);

        let table = if self.is_rehashing() { 1 } else { 0 };
        let mask = self.tables[table].size_mask;
        let bucket = idx_hash & mask;

        // Table 0 may still hold the old entry for this key while a rehash is underway.
        if self.is_rehashing() {
            if let Some(old) = Self::remove_from_table(&mut self.tables[0], idx_hash, &key) {
                let bucket1 = idx_hash & self.tables[1].size_mask;
                self.insert_into_bucket(1, bucket1, key, value);
                return Some(old);
            }
        }

        if let Some(existing) = Self::find_mut_in_chain(&mut self.tables[table].buckets[bucket], &key) {
            return Some(std::mem::replace(existing, value));
        }

        self.insert_into_bucket(table, bucket, key, value);
        None
    }

    /// Alias for [`Dict::insert`], named to match spec.md's `add-or-replace` contract.
    pub fn add_or_replace(&mut self, key: K, value: V) -> Option<V> {
        self.insert(key, value)
    }

    /// `add`: insert only if `key` is absent. Fails [`DictError::Duplicate`] otherwise,
    /// leaving the existing value untouched.
    pub fn add(&mut self, key: K, value: V) -> Result<()> {
        self.rehash_moment();
        if self.lookup(&key).is_some() {
            return Err(DictError::Duplicate);
        }
        self.insert_raw(key, value);
        Ok(())
    }

    /// `add-or-find`: return the existing entry for `key`, or insert `value` and return
    /// that. The `bool` is `true` when an existing entry was found (no insertion made).
    pub fn add_or_find(&mut self, key: K, value: V) -> (&V, bool)
    where
        K: Clone,
    {
        self.rehash_moment();
        if self.lookup(&key).is_some() {
            return (self.lookup(&key).unwrap(), true);
        }
        self.insert_raw(key.clone(), value);
        (self.lookup(&key).unwrap(), false)
    }

    /// Remove `key` from the table without giving the caller a chance to inspect the
    /// value in the same step (`unlink`'s spec.md distinction from `remove` is about the
    /// source language's manual destructor ordering; in safe Rust both are just "remove
    /// and hand back the value").
    pub fn unlink<Q: ?Sized + Eq + Hash>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
    {
        self.remove(key)
    }

    /// Force expansion to (at least) `next_pow2(n)` buckets. Fails
    /// [`DictError::RehashInProgress`] if a rehash is already under way.
    pub fn reallocate(&mut self, n: usize) -> Result<()> {
        if self.is_rehashing() {
            return Err(DictError::RehashInProgress);
        }
        self.begin_resize(n);
        Ok(())
    }

    /// Grow to fit the current element count, per the same policy `expand_if_needed`
    /// applies automatically on every `add`/`insert`. Exposed for callers that want to
    /// pre-size ahead of a known bulk-insert.
    pub fn resize(&mut self) {
        self.expand_if_needed();
    }

    fn insert_into_bucket(&mut self, table: usize, bucket: usize, key: K, value: V) {
        let node = Box::new(Entry {
            key,
            value,
            next: self.tables[table].buckets[bucket].take(),
        });
        self.tables[table].buckets[bucket] = Some(node);
        self.tables[table].used += 1;
    }

    fn find_mut_in_chain<'a, Q: ?Sized + Eq>(
        mut head: &'a mut Option<Box<Entry<K, V>>>,
        key: &Q,
    ) -> Option<&'a mut V>
    where
        K: Borrow<Q>,
    {
        loop {
            match head {
                Some(entry) if entry.key.borrow() == key => return Some(&mut entry.value),
                Some(entry) => head = &mut entry.next,
                None => return None,
            }
        }
    }

    fn remove_from_table<Q: ?Sized + Eq>(table: &mut Table<K, V>, hash: usize, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
    {
        if table.buckets.is_empty() {
            return None;
        }
        let bucket = hash & table.size_mask;
        let mut slot = &mut table.buckets[bucket];

        loop {
            match slot {
                Some(entry) if entry.key.borrow() == key => {
                    let mut boxed = slot.take().unwrap();
                    *slot = boxed.next.take();
                    table.used -= 1;
                    return Some(boxed.value);
                }
                Some(entry) => slot = &mut entry.next,
                None => return None,
            }
        }
    }

    /// Look up `key` without advancing the rehash — the raw logic behind [`Dict::get`]
    /// and [`Dict::contains_key`], also used internally by `add`/`add_or_find` so those
    /// callers can probe for an existing entry without stealing the one rehash step
    /// their own `rehash_moment()` call already accounted for.
    fn lookup<Q: ?Sized + Eq + Hash>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
    {
        let hash = self.hash(key);

        for table in &self.tables {
            if table.buckets.is_empty() {
                continue;
            }
            let mut cursor = table.buckets[hash & table.size_mask].as_deref();
            while let Some(entry) = cursor {
                if entry.key.borrow() == key {
                    return Some(&entry.value);
                }
                cursor = entry.next.as_deref();
            }
            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    /// `find`: spec.md §4.2's explicit `add`/`remove`/`find` rehash-step invariant
    /// ("Every add, remove, find triggers exactly one rehash step unless any safe
    /// iterator is active") means lookups mutate, not just the two that obviously write.
    pub fn get<Q: ?Sized + Eq + Hash>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
    {
        self.rehash_moment();
        self.lookup(key)
    }

    pub fn contains_key<Q: ?Sized + Eq + Hash>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
    {
        self.rehash_moment();
        self.lookup(key).is_some()
    }

    pub fn remove<Q: ?Sized + Eq + Hash>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
    {
        self.rehash_moment();
        let hash = self.hash(key);

        if let Some(value) = Self::remove_from_table(&mut self.tables[0], hash, key) {
            return Some(value);
        }
        if self.is_rehashing() {
            return Self::remove_from_table(&mut self.tables[1], hash, key);
        }
        None
    }

    pub fn clear(&mut self) {
        self.tables = [Table::empty(), Table::empty()];
        self.rehash_idx = -1;
    }

    /// Redis-style `SCAN`: visit one cursor-addressed bucket (in both tables if a rehash
    /// is in progress) and return the next cursor. A full scan is `0 -> ... -> 0` via the
    /// reverse-binary-increment trick, tolerating inserts/removes between calls.
    pub fn scan<F: FnMut(&K, &V)>(&self, cursor: u64, mut visit: F) -> u64 {
        if self.tables[0].buckets.is_empty() {
            return 0;
        }

        if !self.is_rehashing() {
            let mask = self.tables[0].size_mask as u64;
            Self::visit_bucket(&self.tables[0], cursor & mask, &mut visit);
            return Self::next_cursor(cursor, mask);
        }

        let (small, large) = if self.tables[0].buckets.len() <= self.tables[1].buckets.len() {
            (&self.tables[0], &self.tables[1])
        } else {
            (&self.tables[1], &self.tables[0])
        };

        let m0 = small.size_mask as u64;
        let m1 = large.size_mask as u64;

        Self::visit_bucket(small, cursor & m0, &mut visit);

        let mut v = cursor;
        loop {
            Self::visit_bucket(large, v & m1, &mut visit);
            v = ((v | m0) + 1) & !m0 | (v & m0);
            if v & (m0 ^ m1) == 0 {
                break;
            }
        }

        Self::next_cursor(cursor, m0)
    }

    fn visit_bucket<F: FnMut(&K, &V)>(table: &Table<K, V>, bucket: u64, visit: &mut F) {
        let mut cursor = table.buckets[bucket as usize].as_deref();
        while let Some(entry) = cursor {
            visit(&entry.key, &entry.value);
            cursor = entry.next.as_deref();
        }
    }

    fn next_cursor(cursor: u64, mask: u64) -> u64 {
        let v = cursor | !mask;
        let v = v.reverse_bits();
        let v = v.wrapping_add(1);
        v.reverse_bits()
    }

    /// Borrow-only iterator over the whole table (both halves while rehashing). Fast
    /// path: never mutates, and in safe Rust can never observe the dict change shape
    /// underneath it because it holds a shared borrow for its whole lifetime.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tables: &self.tables,
            table: 0,
            bucket: 0,
            cursor: None,
        }
    }

    /// Iterator that pauses rehashing for as long as it's alive, so a caller may freely
    /// insert/remove through [`SafeIter::dict_mut`] between `next()` calls without
    /// invalidating bucket indices mid-traversal.
    pub fn iter_safe(&mut self) -> SafeIter<'_, K, V, S> {
        self.safe_iterators += 1;
        SafeIter {
            dict: self,
            table: 0,
            bucket: 0,
            index_in_chain: 0,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    /// Pick `n` distinct random entries (without replacement among distinct keys visited;
    /// may return fewer than `n` if the dict is smaller).
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<(&K, &V)> {
        let mut all: Vec<(&K, &V)> = self.iter().collect();
        if all.len() <= n {
            return all;
        }
        // Partial Fisher-Yates: shuffle only as many positions as we need.
        for i in 0..n {
            let j = rng.gen_range(i..all.len());
            all.swap(i, j);
        }
        all.truncate(n);
        all
    }

    pub fn random_entry<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(&K, &V)> {
        if self.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..self.len());
        self.iter().nth(idx)
    }
}

pub struct Iter<'a, K, V> {
    tables: &'a [Table<K, V>; 2],
    table: usize,
    bucket: usize,
    cursor: Option<&'a Entry<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.cursor {
                self.cursor = entry.next.as_deref();
                return Some((&entry.key, &entry.value));
            }

            if self.table >= 2 {
                return None;
            }

            let buckets = &self.tables[self.table].buckets;
            if self.bucket >= buckets.len() {
                self.table += 1;
                self.bucket = 0;
                continue;
            }

            self.cursor = buckets[self.bucket].as_deref();
            self.bucket += 1;
        }
    }
}

pub struct SafeIter<'a, K, V, S> {
    dict: &'a mut Dict<K, V, S>,
    table: usize,
    bucket: usize,
    index_in_chain: usize,
}

impl<'a, K: Eq + Hash, V, S: BuildHasher> SafeIter<'a, K, V, S> {
    /// Expose the underlying dict for mutation between `next()` calls.
    pub fn dict_mut(&mut self) -> &mut Dict<K, V, S> {
        self.dict
    }

    pub fn next(&mut self) -> Option<(&K, &V)> {
        loop {
            if self.table >= 2 {
                return None;
            }

            let buckets_len = self.dict.tables[self.table].buckets.len();
            if self.bucket >= buckets_len {
                self.table += 1;
                self.bucket = 0;
                self.index_in_chain = 0;
                continue;
            }

            let mut cursor = self.dict.tables[self.table].buckets[self.bucket].as_deref();
            for _ in 0..self.index_in_chain {
                cursor = match cursor {
                    Some(entry) => entry.next.as_deref(),
                    None => break,
                };
            }

            match cursor {
                Some(entry) => {
                    self.index_in_chain += 1;
                    return Some((&entry.key, &entry.value));
                }
                None => {
                    self.bucket += 1;
                    self.index_in_chain = 0;
                }
            }
        }
    }
}

impl<'a, K, V, S> Drop for SafeIter<'a, K, V, S> {
    fn drop(&mut self) {
        self.dict.safe_iterators -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn seeded_dict() -> Dict<String, i32, HashSeeds> {
        Dict::with_hasher(HashSeeds::default())
    }

    #[test]
    fn test_insert_get_remove() {
        let mut dict = seeded_dict();
        assert_eq!(dict.insert("a".to_string(), 1), None);
        assert_eq!(dict.insert("b".to_string(), 2), None);
        assert_eq!(dict.get("a"), Some(&1));
        assert_eq!(dict.insert("a".to_string(), 10), Some(1));
        assert_eq!(dict.get("a"), Some(&10));
        assert_eq!(dict.remove("b"), Some(2));
        assert_eq!(dict.get("b"), None);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_rehash_at_scale_preserves_all_entries() {
        let mut dict = seeded_dict();

        for i in 0..10_000 {
            dict.insert(format!("key-{}", i), i);
        }

        // Drive any in-flight rehash fully to completion.
        while dict.rehash_step(16) {}

        assert_eq!(dict.len(), 10_000);
        for i in 0..10_000 {
            assert_eq!(dict.get(&format!("key-{}", i)), Some(&i));
        }
    }

    #[test]
    fn test_incremental_rehash_keeps_dict_queryable_mid_flight() {
        let mut dict = seeded_dict();
        for i in 0..2_000 {
            dict.insert(format!("k{}", i), i);
        }

        assert!(dict.is_rehashing() || dict.len() == 2000);

        // Interleave single rehash steps with lookups - every key must remain reachable.
        for _ in 0..500 {
            dict.rehash_step(1);
            assert_eq!(dict.get("k0"), Some(&0));
            assert_eq!(dict.get("k1999"), Some(&1999));
        }
    }

    #[test]
    fn test_scan_visits_every_key_eventually() {
        let mut dict = seeded_dict();
        for i in 0..500 {
            dict.insert(format!("s{}", i), i);
        }
        while dict.rehash_step(8) {}

        let mut seen = std::collections::HashSet::new();
        let mut cursor = 0u64;
        loop {
            cursor = dict.scan(cursor, |k, _| {
                seen.insert(k.clone());
            });
            if cursor == 0 {
                break;
            }
        }

        assert_eq!(seen.len(), 500);
    }

    #[test]
    fn test_iter_covers_both_tables_during_rehash() {
        let mut dict = seeded_dict();
        for i in 0..200 {
            dict.insert(format!("i{}", i), i);
        }
        dict.rehash_step(3);

        let keys: std::collections::HashSet<_> = dict.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys.len(), 200);
    }

    #[test]
    fn test_safe_iter_allows_mutation_between_steps() {
        let mut dict = seeded_dict();
        dict.insert("a".to_string(), 1);
        dict.insert("b".to_string(), 2);

        let mut count = 0;
        {
            let mut it = dict.iter_safe();
            while it.next().is_some() {
                count += 1;
            }
        }
        assert_eq!(count, 2);

        dict.insert("c".to_string(), 3);
        assert_eq!(dict.len(), 3);
    }

    #[test]
    fn test_add_rejects_duplicate() {
        let mut dict = seeded_dict();
        assert_eq!(dict.add("a".to_string(), 1), Ok(()));
        assert_eq!(dict.add("a".to_string(), 2), Err(DictError::Duplicate));
        assert_eq!(dict.get("a"), Some(&1));
    }

    #[test]
    fn test_add_or_find_returns_existing_without_overwrite() {
        let mut dict = seeded_dict();
        let (v, found) = dict.add_or_find("a".to_string(), 1);
        assert_eq!((*v, found), (1, false));
        let (v, found) = dict.add_or_find("a".to_string(), 99);
        assert_eq!((*v, found), (1, true));
    }

    #[test]
    fn test_unlink_removes_entry() {
        let mut dict = seeded_dict();
        dict.insert("a".to_string(), 1);
        assert_eq!(dict.unlink("a"), Some(1));
        assert_eq!(dict.get("a"), None);
    }

    #[test]
    fn test_reallocate_rejects_during_rehash() {
        let mut dict = seeded_dict();
        for i in 0..20 {
            dict.insert(format!("k{}", i), i);
        }
        if dict.is_rehashing() {
            assert_eq!(dict.reallocate(64), Err(DictError::RehashInProgress));
        }
    }

    #[test]
    fn test_sample_and_random_entry() {
        let mut dict = seeded_dict();
        for i in 0..50 {
            dict.insert(format!("r{}", i), i);
        }

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let sample = dict.sample(10, &mut rng);
        assert_eq!(sample.len(), 10);

        let entry = dict.random_entry(&mut rng);
        assert!(entry.is_some());
    }
}
