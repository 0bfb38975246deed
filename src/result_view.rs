//! Result view: a materialised key sequence, shaped by a
//! [`DescriptorOrdering`] and able to detect that the table moved on since
//! it was built.

use crate::context::Context;
use crate::key::{ObjKey, TableKey};
use crate::ordering::DescriptorOrdering;
use crate::storage::Storage;

/// A snapshot of matching keys plus the table version they were taken
/// against. Accessors cache the version they observed.
#[derive(Debug, Clone)]
pub struct ResultView {
	keys: Vec<ObjKey>,
	table_version: u64,
	excluded_by_limit: usize,
}

impl ResultView {
	pub fn new(keys: Vec<ObjKey>, table_version: u64) -> Self {
		ResultView {
			keys,
			table_version,
			excluded_by_limit: 0,
		}
	}

	pub fn size(&self) -> usize {
		self.keys.len()
	}

	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}

	/// # Panics
	/// Panics if `index >= self.size()`.
	pub fn get(&self, index: usize) -> ObjKey {
		self.keys[index]
	}

	pub fn keys(&self) -> &[ObjKey] {
		&self.keys
	}

	pub fn get_num_results_excluded_by_limit(&self) -> usize {
		self.excluded_by_limit
	}

	/// Applies `ordering`'s descriptors, left-to-right, to this view.
	pub fn apply_descriptor_ordering(&mut self, storage: &dyn Storage, table: TableKey, ordering: &DescriptorOrdering) {
		self.excluded_by_limit = ordering.apply(storage, table, &mut self.keys);
	}

	/// Re-validates this view's keys against the current table version.
	/// The engine re-verifies at the start of `find_first` and before each
	/// cluster transition; for an already-materialised view that
	/// generalises to "before any consumer reads it". A version drift only
	/// means the *position* of keys may have moved; the keys
	/// themselves are stable `ObjKey`s, so no re-fetch is needed here —
	/// this just records the new version and reports whether one happened,
	/// letting a caller holding row-position caches elsewhere invalidate
	/// them.
	pub fn sync_if_needed(&mut self, storage: &dyn Storage, table: TableKey, ctx: &mut Context) -> bool {
		let current = storage.table_version(table);
		let changed = ctx.observe(table, current);
		self.table_version = current;
		changed
	}

	pub fn table_version(&self) -> u64 {
		self.table_version
	}

	/// Runs `ordering`'s `Include` paths over every row in this view,
	/// calling `reporter` once per hop level per row. The reporter's first
	/// argument is the row's key, so a caller driving
	/// several rows through one callback can still tell which row a given
	/// `(table, keys)` pair belongs to.
	pub fn report_includes(&self, storage: &dyn Storage, table: TableKey, ordering: &DescriptorOrdering, reporter: &mut dyn FnMut(ObjKey, TableKey, &[ObjKey])) {
		for &key in &self.keys {
			ordering.report_includes(storage, table, key, &mut |t, ks| reporter(key, t, ks));
		}
	}
}
