//! Per-query execution context. Replaces a global allocator-version
//! counter and thread-local search cache with an explicit value threaded
//! through evaluation instead of process-wide statics.

use crate::key::TableKey;
use std::collections::HashMap;

/// Observed storage versions and a small per-query scratch cache, scoped
/// to one `find_all`/`count`/`aggregate` call.
///
/// Accessors compare the allocator's current version against the version
/// they last observed before trusting a cached row position; a mismatch
/// means the table changed since the accessor was bound and it must
/// re-resolve, never panic or throw (`StaleAccessor` is recoverable).
#[derive(Default)]
pub struct Context {
	observed_versions: HashMap<TableKey, u64>,
}

impl Context {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records the version observed for `table`, returning whether it
	/// changed since the last observation (i.e. whether dependent
	/// accessors must re-resolve).
	pub fn observe(&mut self, table: TableKey, current_version: u64) -> bool {
		let changed = self.observed_versions.get(&table).is_some_and(|v| *v != current_version);
		self.observed_versions.insert(table, current_version);
		changed
	}

	pub fn observed_version(&self, table: TableKey) -> Option<u64> {
		self.observed_versions.get(&table).copied()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn first_observation_is_not_a_change() {
		let mut ctx = Context::new();
		assert!(!ctx.observe(TableKey(0), 1));
	}

	#[test]
	fn version_drift_is_detected() {
		let mut ctx = Context::new();
		ctx.observe(TableKey(0), 1);
		assert!(ctx.observe(TableKey(0), 2));
		assert!(!ctx.observe(TableKey(0), 2));
	}
}
