use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::hash::Hash;
use std::str::FromStr;

use crate::error::PersistenceError;

/// Tabular action-values keyed by a discrete state.
///
/// States are created lazily: the first mutable access to an unseen key
/// inserts an all-zero row. Read-only lookups of unseen keys return zeros
/// without inserting anything.
#[derive(Debug, Clone)]
pub struct QTable<K, const A: usize> {
    rows: HashMap<K, [f64; A]>,
}

impl<K: Eq + Hash, const A: usize> PartialEq for QTable<K, A> {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
    }
}

impl<K: Eq + Hash + Clone, const A: usize> QTable<K, A> {
    pub fn new() -> Self {
        QTable {
            rows: HashMap::new(),
        }
    }

    /// Action-values for `state`; zeros if the state was never touched.
    pub fn get(&self, state: &K) -> [f64; A] {
        self.rows.get(state).copied().unwrap_or([0.0; A])
    }

    pub fn values_mut(&mut self, state: &K) -> &mut [f64; A] {
        self.rows.entry(state.clone()).or_insert([0.0; A])
    }

    pub fn value(&self, state: &K, action: usize) -> f64 {
        self.get(state)[action]
    }

    pub fn max_value(&self, state: &K) -> f64 {
        self.get(state).into_iter().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn contains(&self, state: &K) -> bool {
        self.rows.contains_key(state)
    }

    /// Number of states that have been initialized.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &[f64; A])> {
        self.rows.iter()
    }
}

impl<K: Eq + Hash + Clone, const A: usize> Default for QTable<K, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, const A: usize> QTable<K, A>
where
    K: Eq + Hash + Clone + Display + FromStr,
    PersistenceError: From<K::Err>,
{
    /// String-keyed form used in saved policies. Sorted for stable output.
    pub fn to_snapshot(&self) -> BTreeMap<String, Vec<f64>> {
        self.rows
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect()
    }

    /// Rebuild a table from its saved form. Every key must parse and every
    /// row must hold exactly `A` values.
    pub fn from_snapshot(snapshot: &BTreeMap<String, Vec<f64>>) -> Result<Self, PersistenceError> {
        let mut rows = HashMap::with_capacity(snapshot.len());
        for (key, values) in snapshot {
            let state: K = key.parse()?;
            let row: [f64; A] = values.as_slice().try_into().map_err(|_| {
                PersistenceError::InvalidSnapshot(format!(
                    "state '{key}' has {} action values, expected {A}",
                    values.len()
                ))
            })?;
            rows.insert(state, row);
        }
        Ok(QTable { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridPos;

    #[test]
    fn test_read_does_not_insert() {
        let table: QTable<GridPos, 4> = QTable::new();
        assert_eq!(table.get(&GridPos::new(1, 1)), [0.0; 4]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_mutable_access_inserts_zero_row() {
        let mut table: QTable<GridPos, 4> = QTable::new();
        table.values_mut(&GridPos::new(2, 3))[1] = 0.5;
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&GridPos::new(2, 3)), [0.0, 0.5, 0.0, 0.0]);
        assert_eq!(table.max_value(&GridPos::new(2, 3)), 0.5);
    }

    #[test]
    fn test_snapshot_rejects_wrong_row_length() {
        let mut snapshot = BTreeMap::new();
        snapshot.insert("0,0".to_string(), vec![1.0, 2.0]);
        let result = QTable::<GridPos, 4>::from_snapshot(&snapshot);
        assert!(matches!(result, Err(PersistenceError::InvalidSnapshot(_))));
    }

    #[test]
    fn test_snapshot_rejects_bad_key() {
        let mut snapshot = BTreeMap::new();
        snapshot.insert("zero".to_string(), vec![0.0; 4]);
        assert!(QTable::<GridPos, 4>::from_snapshot(&snapshot).is_err());
    }

    #[test]
    fn test_snapshot_preserves_exact_values() {
        let mut table: QTable<GridPos, 4> = QTable::new();
        table.values_mut(&GridPos::new(0, 0))[2] = 0.1 + 0.2;
        table.values_mut(&GridPos::new(9, 9))[0] = -1.0 / 3.0;
        let restored = QTable::<GridPos, 4>::from_snapshot(&table.to_snapshot()).unwrap();
        assert_eq!(restored, table);
    }
}
