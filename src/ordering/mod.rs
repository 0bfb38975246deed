//! Descriptor ordering: `Sort`/`Distinct`/`Limit`/`Include`, applied
//! left-to-right to a [`crate::result_view::ResultView`]. Order is
//! preserved verbatim — `LIMIT(2) SORT(x)` and `SORT(x) LIMIT(2)` are
//! different programs, not normalised to a canonical form.

use crate::error::{Error, Result};
use crate::key::{ColKey, ObjKey, TableKey};
use crate::linkmap::{LinkKind, LinkMap};
use crate::storage::{Schema, Storage};
use crate::value::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
	Ascending,
	Descending,
}

/// A key path resolving to a single scalar value per object, for `Sort`/
/// `Distinct`. Carries its own rendered text (`path`) so `describe()` never
/// needs to round-trip through `Schema`.
#[derive(Debug, Clone)]
pub struct KeyPath {
	path: String,
	link_map: LinkMap,
	column: ColKey,
}

impl KeyPath {
	pub fn new(path: impl Into<String>, link_map: LinkMap, column: ColKey) -> Self {
		KeyPath {
			path: path.into(),
			link_map,
			column,
		}
	}

	pub fn scalar(path: impl Into<String>, column: ColKey) -> Self {
		Self::new(path, LinkMap::new(), column)
	}

	/// Resolves this path against `key` (an object of `table`). Chains that
	/// fan out to more than one key (a `List`/`Backlink` hop) take the first
	/// reached value — `Sort`/`Distinct` key paths are single-valued.
	fn resolve(&self, storage: &dyn Storage, table: TableKey, key: ObjKey) -> Value {
		if self.link_map.is_empty() {
			storage.object(table, key).get(self.column)
		} else {
			let target_table = self.link_map.target_table(table);
			let reached = self.link_map.collect(storage, table, key);
			reached.first().map(|k| storage.object(target_table, *k).get(self.column)).unwrap_or(Value::Null)
		}
	}
}

/// One step of a [`DescriptorOrdering`].
#[derive(Debug, Clone)]
pub enum Descriptor {
	/// Stable multi-key sort; later keys break ties among earlier ones.
	Sort(Vec<(KeyPath, SortDirection)>),
	/// Keeps the first occurrence per tuple of key-path values, in the
	/// order the rows had when this descriptor ran.
	Distinct(Vec<KeyPath>),
	/// Truncates to the first `n` rows.
	Limit(usize),
	/// Records a backlink-terminated path for later enumeration; does not
	/// filter the result set.
	Include(LinkMap),
}

impl Descriptor {
	/// Builds an `Include` descriptor, validating that its last hop is a
	/// backlink column; any other suffix is a validation error.
	pub fn include(link_map: LinkMap) -> Result<Self> {
		match link_map.hops().last() {
			Some(hop) if hop.kind == LinkKind::Backlink => Ok(Descriptor::Include(link_map)),
			Some(_) => Err(Error::invalid_query("INCLUDE path's last segment must be a backlink column")),
			None => Err(Error::invalid_query("INCLUDE path must have at least one segment")),
		}
	}

	fn describe(&self) -> String {
		match self {
			Descriptor::Sort(keys) => {
				let rendered: Vec<String> = keys
					.iter()
					.map(|(k, dir)| {
						let d = match dir {
							SortDirection::Ascending => "ASC",
							SortDirection::Descending => "DESC",
						};
						format!("{} {d}", k.path)
					})
					.collect();
				format!("SORT({})", rendered.join(", "))
			}
			Descriptor::Distinct(keys) => {
				let rendered: Vec<&str> = keys.iter().map(|k| k.path.as_str()).collect();
				format!("DISTINCT({})", rendered.join(", "))
			}
			Descriptor::Limit(n) => format!("LIMIT({n})"),
			Descriptor::Include(_) => "INCLUDE(...)".to_string(),
		}
	}
}

/// An ordered sequence of descriptors. Order matters and is preserved
/// verbatim.
#[derive(Debug, Clone, Default)]
pub struct DescriptorOrdering {
	descriptors: Vec<Descriptor>,
}

impl DescriptorOrdering {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, descriptor: Descriptor) {
		self.descriptors.push(descriptor);
	}

	pub fn descriptors(&self) -> &[Descriptor] {
		&self.descriptors
	}

	pub fn is_empty(&self) -> bool {
		self.descriptors.is_empty()
	}

	/// Renders the whole sequence back to text. `table` is unused here since
	/// each `KeyPath` already carries its own rendered text; kept as `_`
	/// rather than dropped from the signature so callers don't need two code
	/// paths.
	pub fn get_description(&self, _table: &dyn Schema) -> String {
		self.descriptors.iter().map(Descriptor::describe).collect::<Vec<_>>().join(" ")
	}

	/// Every `Include` path registered, in declaration order.
	pub fn compile_included_backlinks(&self) -> Vec<&LinkMap> {
		self.descriptors
			.iter()
			.filter_map(|d| match d {
				Descriptor::Include(lm) => Some(lm),
				_ => None,
			})
			.collect()
	}

	/// Runs every registered `Include` path against one result row, calling
	/// `reporter` once per hop level of each path. Paths are reported in
	/// declaration order; within a path, levels are reported in hop order.
	pub fn report_includes(&self, storage: &dyn Storage, table: TableKey, key: ObjKey, reporter: &mut dyn FnMut(TableKey, &[ObjKey])) {
		for lm in self.compile_included_backlinks() {
			lm.walk_levels(storage, table, key, reporter);
		}
	}

	/// Applies every descriptor, left-to-right, to `keys` (the in-place
	/// key sequence of a [`crate::result_view::ResultView`]). Returns the
	/// total number of rows dropped across every `Limit` descriptor
	/// encountered in this call — accumulated, not overwritten, so two
	/// adjacent `Limit`s report the same count a single coalesced
	/// `LIMIT(min(n,m))` would (`spec.md` §8: `LIMIT(n) ∘ LIMIT(m) ==
	/// LIMIT(min(n,m))` when adjacent).
	pub fn apply(&self, storage: &dyn Storage, table: TableKey, keys: &mut Vec<ObjKey>) -> usize {
		let mut excluded_by_limit = 0usize;
		for descriptor in &self.descriptors {
			match descriptor {
				Descriptor::Sort(sort_keys) => {
					keys.sort_by(|a, b| {
						for (key_path, dir) in sort_keys {
							let va = key_path.resolve(storage, table, *a);
							let vb = key_path.resolve(storage, table, *b);
							let ord = va.cmp(&vb);
							let ord = match dir {
								SortDirection::Ascending => ord,
								SortDirection::Descending => ord.reverse(),
							};
							if ord != Ordering::Equal {
								return ord;
							}
						}
						Ordering::Equal
					});
				}
				Descriptor::Distinct(distinct_keys) => {
					let mut seen = std::collections::HashSet::new();
					keys.retain(|key| {
						let tuple: Vec<Value> = distinct_keys.iter().map(|k| k.resolve(storage, table, *key)).collect();
						seen.insert(format!("{tuple:?}"))
					});
				}
				Descriptor::Limit(n) => {
					excluded_by_limit += keys.len().saturating_sub(*n);
					keys.truncate(*n);
				}
				Descriptor::Include(_) => {}
			}
		}
		excluded_by_limit
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::DataType;
	use crate::storage::testutil::{ColumnSpec, FakeStorage};
	use std::rc::Rc;

	fn people() -> (FakeStorage, TableKey) {
		let mut s = FakeStorage::new();
		let t = s.add_table(
			"People",
			vec![ColumnSpec::scalar("name", DataType::String), ColumnSpec::scalar("age", DataType::Int)],
			None,
			10,
		);
		for (name, age) in [("Bob", 3), ("Alice", 1), ("Cara", 2)] {
			s.push_row(t, vec![Value::String(name.into()), Value::Int(age)]);
		}
		(s, t)
	}

	#[test]
	fn sort_then_limit_keeps_cheapest_two_after_sorting() {
		let (s, t) = people();
		let age_col = s.column(t, "age");
		let mut ordering = DescriptorOrdering::new();
		ordering.push(Descriptor::Sort(vec![(KeyPath::scalar("age", age_col), SortDirection::Ascending)]));
		ordering.push(Descriptor::Limit(2));
		let mut keys: Vec<ObjKey> = (0..3).map(|i| ObjKey::new(i)).collect();
		let excluded = ordering.apply(&s, t, &mut keys);
		assert_eq!(keys, vec![ObjKey::new(1), ObjKey::new(2)]);
		assert_eq!(excluded, 1);
	}

	#[test]
	fn limit_then_sort_truncates_before_ordering() {
		let (s, t) = people();
		let age_col = s.column(t, "age");
		let mut ordering = DescriptorOrdering::new();
		ordering.push(Descriptor::Limit(2));
		ordering.push(Descriptor::Sort(vec![(KeyPath::scalar("age", age_col), SortDirection::Ascending)]));
		let mut keys: Vec<ObjKey> = (0..3).map(|i| ObjKey::new(i)).collect();
		let excluded = ordering.apply(&s, t, &mut keys);
		// rows {0,1} (Bob age 3, Alice age 1) kept by the limit, then sorted.
		assert_eq!(keys, vec![ObjKey::new(1), ObjKey::new(0)]);
		assert_eq!(excluded, 1);
	}

	#[test]
	fn include_requires_backlink_terminal_hop() {
		let mut lm = LinkMap::new();
		lm.push(crate::linkmap::LinkHop {
			from_table: TableKey(0),
			column: ColKey::new(0, DataType::ObjKey, crate::key::ColAttr::empty()),
			kind: LinkKind::Single,
			to_table: TableKey(0),
		});
		assert!(Descriptor::include(lm).is_err());
	}

	#[test]
	fn report_includes_emits_one_set_per_hop() {
		let mut s = FakeStorage::new();
		let person = s.add_table(
			"Person",
			vec![ColumnSpec::scalar("name", DataType::String), ColumnSpec::link("father", "Person"), ColumnSpec::backlink("children", "Person")],
			None,
			10,
		);
		s.set_backlink_origin(person, "children", "father");
		let bones = s.push_row(person, vec![Value::String("Bones".into()), Value::Null, Value::Null]);
		let john = s.push_row(person, vec![Value::String("John".into()), Value::Link(bones), Value::Null]);
		s.finalize();

		let children_col = s.column(person, "children");
		let mut lm = LinkMap::new();
		lm.push(crate::linkmap::LinkHop {
			from_table: person,
			column: children_col,
			kind: LinkKind::Backlink,
			to_table: person,
		});
		let mut ordering = DescriptorOrdering::new();
		ordering.push(Descriptor::include(lm).unwrap());

		let mut levels: Vec<Vec<ObjKey>> = Vec::new();
		ordering.report_includes(&s, person, bones, &mut |_table, keys| levels.push(keys.to_vec()));
		assert_eq!(levels, vec![vec![john]]);
	}

	/// Two adjacent `Limit` descriptors must report the same
	/// `excluded_by_limit` a single coalesced `LIMIT(min(n,m))` would —
	/// drops are accumulated across every `Limit` seen, not overwritten by
	/// the last one.
	#[test]
	fn adjacent_limits_accumulate_excluded_count() {
		let (s, t) = people();
		let mut chained = DescriptorOrdering::new();
		chained.push(Descriptor::Limit(5));
		chained.push(Descriptor::Limit(3));
		let mut chained_keys: Vec<ObjKey> = (0..10).map(ObjKey::new).collect();
		let chained_excluded = chained.apply(&s, t, &mut chained_keys);

		let mut single = DescriptorOrdering::new();
		single.push(Descriptor::Limit(3));
		let mut single_keys: Vec<ObjKey> = (0..10).map(ObjKey::new).collect();
		let single_excluded = single.apply(&s, t, &mut single_keys);

		assert_eq!(chained_keys, single_keys);
		assert_eq!(chained_excluded, single_excluded);
		assert_eq!(chained_excluded, 7);
	}

	#[test]
	fn distinct_keeps_first_occurrence() {
		let (mut s, t) = people();
		let name_col = s.column(t, "name");
		s.push_row(t, vec![Value::String("Bob".into()), Value::Int(9)]);
		let mut ordering = DescriptorOrdering::new();
		ordering.push(Descriptor::Distinct(vec![KeyPath::scalar("name", name_col)]));
		let mut keys: Vec<ObjKey> = (0..4).map(|i| ObjKey::new(i)).collect();
		ordering.apply(&s, t, &mut keys);
		assert_eq!(keys, vec![ObjKey::new(0), ObjKey::new(1), ObjKey::new(2)]);
	}
}
