//! Sparse `K -> V` cache backed by a sorted map, grounded in
//! `original_source/components/framework/headers/sloked/core/OrderedCache.h`.
//!
//! `fetch` identifies contiguous runs of missing keys and fills each run
//! with one call to a supplier, so a renderer can ask for "lines 10..40"
//! and the cache only recomputes the gaps it doesn't already hold.

use std::collections::BTreeMap;

/// Key arithmetic the cache needs but can't assume from `Ord` alone:
/// the successor of a key, and the count of keys between two (inclusive).
pub trait KeyTraits<K> {
	fn next(&self, key: &K) -> K;
	fn distance(&self, a: &K, b: &K) -> u64;
}

/// The default [`KeyTraits`] for any integer-like key — in practice always
/// a line index.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegerKeyTraits;

impl KeyTraits<u64> for IntegerKeyTraits {
	fn next(&self, key: &u64) -> u64 {
		key + 1
	}

	fn distance(&self, a: &u64, b: &u64) -> u64 {
		a.max(b) - a.min(b)
	}
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
	#[error("ordered cache: reversed range")]
	ReversedRange,
	#[error("ordered cache: supplier returned {got} values, expected {expected}")]
	SupplierSizeMismatch { expected: usize, got: usize },
}

/// A supplier fills one contiguous, previously-absent key run at a time. It
/// receives the run's inclusive endpoints and must return exactly
/// `distance(from, to) + 1` values, in key order.
pub type Supplier<K, V> = dyn FnMut(&K, &K) -> Vec<V>;

pub struct OrderedCache<K: Ord + Clone, V, T: KeyTraits<K> = IntegerKeyTraits> {
	traits: T,
	cache: BTreeMap<K, V>,
}

impl<K: Ord + Clone, V: Clone> OrderedCache<K, V, IntegerKeyTraits> {
	pub fn new() -> Self {
		OrderedCache { traits: IntegerKeyTraits, cache: BTreeMap::new() }
	}
}

impl<K: Ord + Clone, V: Clone> Default for OrderedCache<K, V, IntegerKeyTraits> {
	fn default() -> Self {
		Self::new()
	}
}

impl<K: Ord + Clone, V: Clone, T: KeyTraits<K>> OrderedCache<K, V, T> {
	pub fn with_traits(traits: T) -> Self {
		OrderedCache { traits, cache: BTreeMap::new() }
	}

	fn runs_missing(&self, begin: &K, end: &K) -> Vec<(K, K)> {
		let mut runs = Vec::new();
		let mut current: Option<(K, K)> = None;
		let mut key = begin.clone();
		loop {
			if self.cache.contains_key(&key) {
				if let Some(run) = current.take() {
					runs.push(run);
				}
			} else {
				match &mut current {
					Some(run) => run.1 = key.clone(),
					None => current = Some((key.clone(), key.clone())),
				}
			}
			if key == *end {
				break;
			}
			key = self.traits.next(&key);
		}
		if let Some(run) = current {
			runs.push(run);
		}
		runs
	}

	fn fill_run(&mut self, supplier: &mut Supplier<K, V>, from: &K, to: &K) -> Result<(), CacheError> {
		let expected = self.traits.distance(from, to) as usize + 1;
		let values = supplier(from, to);
		if values.len() != expected {
			return Err(CacheError::SupplierSizeMismatch { expected, got: values.len() });
		}
		let mut key = from.clone();
		for value in values {
			self.cache.insert(key.clone(), value);
			if key == *to {
				break;
			}
			key = self.traits.next(&key);
		}
		Ok(())
	}

	/// Ensures every key in `[begin, end]` is present, invoking `supplier`
	/// once per missing contiguous run, then returns all values in order.
	pub fn fetch(&mut self, begin: &K, end: &K, mut supplier: impl FnMut(&K, &K) -> Vec<V>) -> Result<Vec<(K, V)>, CacheError> {
		if *begin > *end {
			return Err(CacheError::ReversedRange);
		}
		for (from, to) in self.runs_missing(begin, end) {
			self.fill_run(&mut supplier, &from, &to)?;
		}
		let mut result = Vec::new();
		let mut key = begin.clone();
		loop {
			result.push((key.clone(), self.cache.get(&key).expect("just filled").clone()));
			if key == *end {
				break;
			}
			key = self.traits.next(&key);
		}
		Ok(result)
	}

	/// Like [`Self::fetch`], but returns only the `(key, value)` pairs that
	/// were newly filled by this call — used by incremental rendering so a
	/// client only receives lines it doesn't already hold.
	pub fn fetch_updated(&mut self, begin: &K, end: &K, mut supplier: impl FnMut(&K, &K) -> Vec<V>) -> Result<Vec<(K, V)>, CacheError> {
		if *begin > *end {
			return Err(CacheError::ReversedRange);
		}
		let mut updated = Vec::new();
		for (from, to) in self.runs_missing(begin, end) {
			self.fill_run(&mut supplier, &from, &to)?;
			let mut key = from.clone();
			loop {
				updated.push((key.clone(), self.cache.get(&key).expect("just filled").clone()));
				if key == to {
					break;
				}
				key = self.traits.next(&key);
			}
		}
		Ok(updated)
	}

	/// Erases every key in `[begin, end]`.
	pub fn drop_range(&mut self, begin: &K, end: &K) {
		self.cache.retain(|k, _| k < begin || k > end);
	}

	pub fn clear(&mut self) {
		self.cache.clear();
	}

	/// Bulk-loads `(key, value)` pairs without invoking the supplier.
	pub fn insert(&mut self, entries: impl IntoIterator<Item = (K, V)>) {
		for (k, v) in entries {
			self.cache.insert(k, v);
		}
	}

	pub fn get(&self, key: &K) -> Option<&V> {
		self.cache.get(key)
	}

	pub fn len(&self) -> usize {
		self.cache.len()
	}

	pub fn is_empty(&self) -> bool {
		self.cache.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fetch_returns_exact_key_range_in_order() {
		let mut cache: OrderedCache<u64, i32> = OrderedCache::new();
		let result = cache.fetch(&0, &4, |a, b| (*a..=*b).map(|k| k as i32 * 10).collect()).unwrap();
		assert_eq!(result, vec![(0, 0), (1, 10), (2, 20), (3, 30), (4, 40)]);
	}

	#[test]
	fn second_fetch_does_not_recall_supplier_for_cached_keys() {
		let mut cache: OrderedCache<u64, i32> = OrderedCache::new();
		cache.fetch(&0, &2, |a, b| (*a..=*b).map(|k| k as i32).collect()).unwrap();
		let mut calls = 0;
		cache
			.fetch(&0, &2, |a, b| {
				calls += 1;
				(*a..=*b).map(|k| k as i32).collect()
			})
			.unwrap();
		assert_eq!(calls, 0);
	}

	#[test]
	fn fetch_only_supplies_missing_gap() {
		let mut cache: OrderedCache<u64, i32> = OrderedCache::new();
		cache.insert([(0u64, 0i32), (4, 40)]);
		let mut runs = Vec::new();
		cache
			.fetch(&0, &4, |a, b| {
				runs.push((*a, *b));
				(*a..=*b).map(|k| k as i32 * 10).collect()
			})
			.unwrap();
		assert_eq!(runs, vec![(1, 3)]);
	}

	#[test]
	fn reversed_range_errors() {
		let mut cache: OrderedCache<u64, i32> = OrderedCache::new();
		assert_eq!(cache.fetch(&5, &0, |_, _| vec![]), Err(CacheError::ReversedRange));
	}

	#[test]
	fn supplier_size_mismatch_errors() {
		let mut cache: OrderedCache<u64, i32> = OrderedCache::new();
		let err = cache.fetch(&0, &2, |_, _| vec![1]).unwrap_err();
		assert_eq!(err, CacheError::SupplierSizeMismatch { expected: 3, got: 1 });
	}

	#[test]
	fn fetch_updated_only_reports_newly_filled() {
		let mut cache: OrderedCache<u64, i32> = OrderedCache::new();
		cache.fetch(&0, &1, |a, b| (*a..=*b).map(|k| k as i32).collect()).unwrap();
		let updated = cache.fetch_updated(&0, &2, |a, b| (*a..=*b).map(|k| k as i32).collect()).unwrap();
		assert_eq!(updated, vec![(2, 2)]);
	}

	#[test]
	fn drop_range_evicts_keys() {
		let mut cache: OrderedCache<u64, i32> = OrderedCache::new();
		cache.insert([(0u64, 0i32), (1, 1), (2, 2)]);
		cache.drop_range(&1, &1);
		assert!(cache.get(&0).is_some());
		assert!(cache.get(&1).is_none());
		assert!(cache.get(&2).is_some());
	}
}
