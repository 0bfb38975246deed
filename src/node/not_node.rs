//! `NotNode`: negates a child query while caching the first known match
//! over the most recently scanned row range, dispatching over the five
//! relative positions of a new request range against that cache. `Query`
//! implements the same [`NodeOps`] contract as a leaf node, so the wrapped
//! child here is just `Box<Query>` — a `NOT` is a composite node whose
//! child happens to be a whole conjunction tree.

use crate::config::UNINDEXED_DT;
use crate::key::{Row, TableKey, NOT_FOUND};
use crate::node::{ClusterHandle, CostStats, NodeOps, StorageHandle};
use crate::query::Query;

#[derive(Debug, Clone)]
pub struct NotNode {
	inner: Box<Query>,
	known_start: Row,
	known_end: Row,
	/// First row in `[known_start, known_end)` at which the inner query
	/// matches, if any.
	cached_match: Option<Row>,
	stats: CostStats,
}

impl NotNode {
	pub fn new(inner: Query) -> Self {
		NotNode {
			inner: Box::new(inner),
			known_start: 0,
			known_end: 0,
			cached_match: None,
			stats: CostStats::new(UNINDEXED_DT),
		}
	}

	pub fn inner(&self) -> &Query {
		&self.inner
	}

	fn has_known_range(&self) -> bool {
		self.known_end > self.known_start
	}

	/// Ground-truth linear scan for `[start,end)`: the first row at which
	/// the inner query does *not* match (`evaluate_at` is defined as inner's
	/// `find_first(row,row+1) == not_found`). Used both as the fallback when
	/// the cache can't answer directly and to fill in the uncovered slices
	/// of a request in the five cached-range cases.
	fn scan(&mut self, start: Row, end: Row) -> Row {
		let mut row = start;
		while row < end {
			if self.inner.find_first_local(row, row + 1) == NOT_FOUND {
				return row;
			}
			row += 1;
		}
		NOT_FOUND
	}

	/// Disjoint ranges update the cache when the new range is at least as
	/// wide as the cached one, not only when strictly wider (see
	/// `DESIGN.md`'s open-question note on this choice).
	fn update_known_range(&mut self, start: Row, end: Row, first_match: Option<Row>) {
		let new_width = end.saturating_sub(start);
		let old_width = self.known_end.saturating_sub(self.known_start);
		if new_width >= old_width {
			self.known_start = start;
			self.known_end = end;
			self.cached_match = first_match;
		}
	}
}

impl NodeOps for NotNode {
	fn init(&mut self, will_query_ranges: bool) {
		self.inner.init(will_query_ranges);
	}

	fn table_changed(&mut self, storage: &StorageHandle, table: TableKey) {
		self.inner.table_changed(storage, table);
		self.known_start = 0;
		self.known_end = 0;
		self.cached_match = None;
	}

	fn cluster_changed(&mut self, cluster: &ClusterHandle) {
		self.inner.cluster_changed(cluster);
		// A new cluster invalidates any cached range from the previous one.
		self.known_start = 0;
		self.known_end = 0;
		self.cached_match = None;
	}

	fn find_first_local(&mut self, start: Row, end: Row) -> Row {
		if start >= end {
			return NOT_FOUND;
		}
		if !self.has_known_range() {
			let result = self.scan(start, end);
			self.update_known_range(start, end, (result != NOT_FOUND).then_some(result));
			self.stats.record((result != NOT_FOUND).then_some(result - start));
			return result;
		}

		let (ks, ke) = (self.known_start, self.known_end);
		let result = if start <= ks && end >= ke {
			// Request covers known: scan the lower gap, fall back to the
			// cached match, then scan the upper gap.
			let before = self.scan(start, ks);
			if before != NOT_FOUND {
				before
			} else if let Some(m) = self.cached_match.filter(|m| *m < end) {
				m
			} else {
				let after = self.scan(ke.max(start), end);
				self.update_known_range(start, end, (after != NOT_FOUND).then_some(after));
				after
			}
		} else if start >= ks && end <= ke {
			// Request inside known: trust the cache only if it names a
			// match actually within this sub-range, else rescan.
			match self.cached_match {
				Some(m) if m >= start && m < end => m,
				_ => self.scan(start, end),
			}
		} else if start < ks && end > ks && end <= ke {
			// Partial overlap, lower side uncovered.
			let before = self.scan(start, ks);
			if before != NOT_FOUND {
				before
			} else {
				self.cached_match.filter(|m| *m < end).unwrap_or(NOT_FOUND)
			}
		} else if start >= ks && start < ke && end > ke {
			// Partial overlap, upper side uncovered. The cache only records
			// the known range's *first* match, so if that match lies
			// outside [start, ke) it cannot rule out a later match within
			// that sub-range (e.g. a cached first match at row 2 from a
			// known range [0,10) says nothing about row 8 once start moves
			// to 5) -- rescan [start, ke) directly rather than trusting an
			// out-of-window cache hit. A `None` cache entry still means "no
			// match anywhere in [ks,ke)", so no rescan is needed then.
			let in_lower = match self.cached_match {
				None => None,
				Some(m) if m >= start && m < ke => Some(m),
				Some(_) => {
					let rescanned = self.scan(start, ke);
					(rescanned != NOT_FOUND).then_some(rescanned)
				}
			};
			match in_lower {
				Some(m) => m,
				None => {
					let after = self.scan(ke, end);
					self.update_known_range(start.min(ks), end, (after != NOT_FOUND).then_some(after));
					after
				}
			}
		} else {
			// Disjoint.
			let result = self.scan(start, end);
			self.update_known_range(start, end, (result != NOT_FOUND).then_some(result));
			result
		};
		self.stats.record((result != NOT_FOUND).then_some(result.saturating_sub(start)));
		result
	}

	fn describe(&self) -> String {
		format!("!({})", self.inner.describe())
	}

	fn cost(&self) -> CostStats {
		self.stats
	}
}
