use im::OrdMap;
use serde::{Deserialize, Serialize};

/// One row slot with its commit version.
///
/// Removal keeps the slot as a tombstone (`value: None`) so the version keeps
/// growing; a reader that observed the row before removal still sees a
/// version mismatch at commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versioned<V> {
    pub value: Option<V>,
    pub version: u64,
}

/// Copy-on-write table keyed by `K`.
///
/// Backed by a persistent map, so cloning a table (and therefore taking a
/// transaction snapshot of the whole store) is O(1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table<K: Ord + Clone, V: Clone> {
    rows: OrdMap<K, Versioned<V>>,
}

impl<K: Ord + Clone, V: Clone> Table<K, V> {
    pub fn new() -> Self {
        Self {
            rows: OrdMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.rows.get(key).and_then(|slot| slot.value.as_ref())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Version of the slot; 0 when the key was never written.
    pub fn version(&self, key: &K) -> u64 {
        self.rows.get(key).map(|slot| slot.version).unwrap_or(0)
    }

    /// Insert or replace, returning the new version.
    pub fn put(&mut self, key: K, value: V) -> u64 {
        let version = self.version(&key) + 1;
        self.rows.insert(
            key,
            Versioned {
                value: Some(value),
                version,
            },
        );
        version
    }

    /// Tombstone the row. Returns the previous value if it was live.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let previous = self.rows.get(key)?.clone();
        let Versioned { value, version } = previous;
        value.as_ref()?;
        self.rows.insert(
            key.clone(),
            Versioned {
                value: None,
                version: version + 1,
            },
        );
        value
    }

    /// Live rows in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.rows
            .iter()
            .filter_map(|(key, slot)| slot.value.as_ref().map(|value| (key, value)))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    /// Largest key ever written, tombstones included.
    pub fn max_key(&self) -> Option<&K> {
        self.rows.get_max().map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Ord + Clone, V: Clone> Default for Table<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
