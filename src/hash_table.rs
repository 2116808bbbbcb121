use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};

use ahash::RandomState;

use crate::arena::{Arena, NodeId};
use crate::utilities::next_prime;

/// Seed for tables keyed by packed barcodes.
pub const BARCODE_SEED: u64 = 0xf30b_503a_1896_576e;
/// Seed for tables keyed by byte strings.
pub const STRING_SEED: u64 = 0xf30b_603a_1896_576e;
/// Bucket count for per-barcode tables whose size is not known up front.
pub const BARCODE_TABLE_BUCKETS: u32 = 1_363_151;

struct Entry<K, V> {
    key: K,
    value: V,
    next: Option<NodeId<Entry<K, V>>>,
}

/// Fixed-size, open-chained hash table.
///
/// The bucket count is chosen once at construction and the table is never
/// rehashed. Entries are never removed; each chain keeps insertion order.
pub struct HashTable<K, V> {
    buckets: Vec<Option<NodeId<Entry<K, V>>>>,
    entries: Arena<Entry<K, V>>,
    state: RandomState,
}

impl<K: Hash + Eq, V> HashTable<K, V> {
    /// Sizes the table to the next prime at or above 1.3 times `expected`.
    pub fn with_expected_entries(expected: usize, seed: u64) -> Self {
        let target = (expected as f64 * 1.3).ceil().min(u32::MAX as f64) as u32;
        Self::with_buckets(next_prime(target), seed)
    }

    pub fn with_buckets(buckets: u32, seed: u64) -> Self {
        assert!(buckets > 0, "hash table needs at least one bucket");
        HashTable {
            buckets: vec![None; buckets as usize],
            entries: Arena::new(),
            state: RandomState::with_seeds(
                seed,
                seed.rotate_left(16),
                seed.rotate_left(32),
                seed.rotate_left(48),
            ),
        }
    }

    fn bucket_of<Q: Hash + ?Sized>(&self, key: &Q) -> usize {
        (BuildHasher::hash_one(&self.state, key) % self.buckets.len() as u64) as usize
    }

    fn find<Q>(&self, key: &Q) -> Option<NodeId<Entry<K, V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut node = self.buckets[self.bucket_of(key)];
        while let Some(id) = node {
            let entry = &self.entries[id];
            if <K as Borrow<Q>>::borrow(&entry.key) == key {
                return Some(id);
            }
            node = entry.next;
        }
        None
    }

    /// Returns the record for `key`, appending a default one to the end of its
    /// chain on first sight.
    pub fn insert_or_fetch(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        let bucket = self.bucket_of(&key);
        let mut tail = None;
        let mut node = self.buckets[bucket];
        while let Some(id) = node {
            if self.entries[id].key == key {
                return &mut self.entries[id].value;
            }
            tail = Some(id);
            node = self.entries[id].next;
        }

        let id = self.entries.alloc(Entry {
            key,
            value: V::default(),
            next: None,
        });
        match tail {
            Some(tail) => self.entries[tail].next = Some(id),
            None => self.buckets[bucket] = Some(id),
        }
        &mut self.entries[id].value
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).map(|id| &self.entries[id].value)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Longest chain, for diagnostics.
    pub fn max_chain_len(&self) -> usize {
        self.buckets
            .iter()
            .map(|head| {
                let mut len = 0;
                let mut node = *head;
                while let Some(id) = node {
                    len += 1;
                    node = self.entries[id].next;
                }
                len
            })
            .max()
            .unwrap_or(0)
    }
}
