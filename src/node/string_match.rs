//! String equality and pattern matchers: `StringEqual` (case-sensitive,
//! indexed fast path, multi-needle `IN` fusion), `StringEqualIns`
//! (case-insensitive, always walks the index), and `StringMatch`
//! (`Contains`/`BeginsWith`/`EndsWith`/`Like`, each with a case-insensitive
//! twin).

use crate::config::{INDEXED_DT, NEEDLE_SCAN_BLOCK_SIZE, STRING_ENUM_DT};
use crate::fmt::format_string;
use crate::key::{ColKey, ObjKey, Row, TableKey, NOT_FOUND};
use crate::node::{ClusterHandle, CostStats, NodeOps, StorageHandle};
use crate::value::Value;
use std::collections::HashSet;

/// Merges a cluster's key range against a sorted index-match list, in four
/// steps. Shared by [`StringEqualNode`] and [`StringEqualInsNode`], the only
/// two node kinds with an indexed fast path.
struct IndexCursor {
	matches: Vec<ObjKey>,
	cursor: usize,
	last_cluster_first_key: Option<ObjKey>,
}

impl IndexCursor {
	fn new(matches: Vec<ObjKey>) -> Self {
		IndexCursor {
			matches,
			cursor: 0,
			last_cluster_first_key: None,
		}
	}

	fn reset(&mut self) {
		self.cursor = 0;
		self.last_cluster_first_key = None;
	}

	/// Returns the next matching local row in `[start,end)`, or `None` once
	/// the index's keys for this cluster are exhausted.
	fn next_in_range(&mut self, cluster: &ClusterHandle, start: Row, end: Row) -> Option<Row> {
		let len = cluster.len();
		if len == 0 || self.matches.is_empty() {
			return None;
		}
		let first_key = cluster.get_real_key(0);
		let last_key = cluster.get_real_key(len - 1);
		// Step 1: non-monotonic range (the cluster we're scanning now starts
		// earlier than one we'd already passed) resets the cursor.
		if let Some(prev) = self.last_cluster_first_key {
			if first_key < prev {
				self.cursor = 0;
			}
		}
		self.last_cluster_first_key = Some(first_key);
		// Step 2: skip index keys below this cluster's range.
		while self.cursor < self.matches.len() && self.matches[self.cursor] < first_key {
			self.cursor += 1;
		}
		loop {
			let key = *self.matches.get(self.cursor)?;
			// Step 3: the pending key is past this cluster entirely.
			if key > last_key {
				return None;
			}
			// Step 4: translate to a cluster-local row.
			let row = cluster.lower_bound_key(key);
			if row < start {
				self.cursor += 1;
				continue;
			}
			if row >= end {
				return None;
			}
			self.cursor += 1;
			return Some(row);
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CostTier {
	Indexed,
	StringEnum,
	Unindexed,
}

/// Case-sensitive string equality, with index fast path and multi-needle
/// `IN` fusion.
pub struct StringEqualNode {
	path: String,
	column: ColKey,
	/// A single `x == 'a'` has one needle; a builder-fused
	/// `x == 'a' OR x == 'b' OR x == 'c'` has several.
	needles: Vec<String>,
	needle_set: HashSet<String>,
	tier: CostTier,
	stats: CostStats,
	cluster: Option<ClusterHandle>,
	index: Option<IndexCursor>,
}

impl std::fmt::Debug for StringEqualNode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StringEqualNode")
			.field("path", &self.path)
			.field("needles", &self.needles)
			.field("tier", &self.tier)
			.finish()
	}
}

impl Clone for StringEqualNode {
	fn clone(&self) -> Self {
		StringEqualNode {
			path: self.path.clone(),
			column: self.column,
			needles: self.needles.clone(),
			needle_set: self.needle_set.clone(),
			tier: self.tier,
			stats: self.stats,
			cluster: self.cluster.clone(),
			// An index cursor is mid-scan position, not semantic state;
			// cloning a node before first evaluation (the only time needle
			// merging is allowed to mutate it) never needs it.
			index: None,
		}
	}
}

impl StringEqualNode {
	pub fn new(path: impl Into<String>, column: ColKey, needle: String) -> Self {
		Self::new_fused(path, column, vec![needle])
	}

	/// Constructs an already-fused multi-needle node: used when the builder
	/// encounters adjacent `Equal` conditions on the same column and fuses
	/// them into a single node.
	pub fn new_fused(path: impl Into<String>, column: ColKey, needles: Vec<String>) -> Self {
		let needle_set = needles.iter().cloned().collect();
		StringEqualNode {
			path: path.into(),
			column,
			needles,
			needle_set,
			tier: CostTier::Unindexed,
			stats: CostStats::new(STRING_ENUM_DT),
			cluster: None,
			index: None,
		}
	}

	/// Merges `other`'s needle(s) into `self`. A node may be mutated this way
	/// only at build time, before first evaluation. Used by the builder when
	/// it spots adjacent `Equal` conditions on the same column.
	pub fn merge_needles(&mut self, other: &StringEqualNode) {
		for n in &other.needles {
			if self.needle_set.insert(n.clone()) {
				self.needles.push(n.clone());
			}
		}
	}

	pub fn can_merge_with(&self, column: ColKey) -> bool {
		self.column == column
	}

	/// `true` for a freshly built `x == 'a'` node, before any fusion — the
	/// shape the builder's needle-fusion pass looks for in an `Or` branch.
	pub fn is_single(&self) -> bool {
		self.needles.len() == 1
	}

	pub fn column_key(&self) -> ColKey {
		self.column
	}

	fn is_fused(&self) -> bool {
		self.needles.len() > 1
	}
}

impl NodeOps for StringEqualNode {
	fn init(&mut self, _will_query_ranges: bool) {}

	fn table_changed(&mut self, storage: &StorageHandle, table: TableKey) {
		self.cluster = None;
		// Fused multi-needle nodes always bypass the index: indexed equality
		// per-needle is slower than a linear haystack scan for small needle
		// sets.
		if self.is_fused() {
			self.tier = CostTier::Unindexed;
			self.stats = CostStats::new(crate::config::UNINDEXED_DT);
			self.index = None;
			return;
		}
		match storage.index(table, self.column) {
			Some(index) => {
				let mut matches: Vec<ObjKey> = Vec::new();
				for needle in &self.needles {
					matches.extend(index.find_all(&Value::String(needle.clone()), false));
				}
				matches.sort();
				matches.dedup();
				self.tier = CostTier::Indexed;
				self.stats = CostStats::new(INDEXED_DT);
				self.index = Some(IndexCursor::new(matches));
			}
			None => {
				self.tier = CostTier::StringEnum;
				self.stats = CostStats::new(STRING_ENUM_DT);
				self.index = None;
			}
		}
	}

	fn cluster_changed(&mut self, cluster: &ClusterHandle) {
		self.cluster = Some(cluster.clone());
	}

	fn find_first_local(&mut self, start: Row, end: Row) -> Row {
		let cluster = self.cluster.as_ref().expect("cluster_changed must run before find_first_local").clone();
		let len = cluster.len();
		let end = end.min(len);
		if start >= end {
			return NOT_FOUND;
		}
		if self.tier == CostTier::Indexed {
			if let Some(idx) = self.index.as_mut() {
				return match idx.next_in_range(&cluster, start, end) {
					Some(row) => {
						self.stats.record(Some(row - start));
						row
					}
					None => {
						self.stats.record(None);
						NOT_FOUND
					}
				};
			}
		}
		// Unindexed / fused: scan in `NEEDLE_SCAN_BLOCK_SIZE`-row blocks, the
		// Rabin–Karp-style batch the builder chose over per-needle index
		// probes.
		let leaf = cluster.leaf(self.column);
		let mut row = start;
		while row < end {
			let block_end = (row + NEEDLE_SCAN_BLOCK_SIZE).min(end);
			for r in row..block_end {
				if let Value::String(s) = leaf.get(r) {
					if self.needle_set.contains(&s) {
						self.stats.record(Some(r - start));
						return r;
					}
				}
			}
			row = block_end;
		}
		self.stats.record(None);
		NOT_FOUND
	}

	fn describe(&self) -> String {
		if self.needles.len() <= 1 {
			let needle = self.needles.first().cloned().unwrap_or_default();
			format!("{} == {}", self.path, format_string(&needle))
		} else {
			let list = self.needles.iter().map(|n| format_string(n)).collect::<Vec<_>>().join(", ");
			format!("{} IN [{}]", self.path, list)
		}
	}

	fn cost(&self) -> CostStats {
		self.stats
	}
}

/// Case-insensitive string equality. Always walks the index producing
/// matches sorted by key when one exists, and falls back to a two-case fold
/// comparison otherwise (never a linear-scan-with-lowercased-needle — it's
/// compared via `to_lowercase` on both sides so Unicode case folding, not
/// just ASCII, applies).
#[derive(Debug, Clone)]
pub struct StringEqualInsNode {
	path: String,
	column: ColKey,
	needle_lower: String,
	stats: CostStats,
	cluster: Option<ClusterHandle>,
	index: Option<IndexCursor>,
}

impl StringEqualInsNode {
	pub fn new(path: impl Into<String>, column: ColKey, needle: String) -> Self {
		StringEqualInsNode {
			path: path.into(),
			column,
			needle_lower: needle.to_lowercase(),
			stats: CostStats::new(STRING_ENUM_DT),
			cluster: None,
			index: None,
		}
	}
}

impl NodeOps for StringEqualInsNode {
	fn init(&mut self, _will_query_ranges: bool) {}

	fn table_changed(&mut self, storage: &StorageHandle, table: TableKey) {
		self.cluster = None;
		match storage.index(table, self.column) {
			Some(index) => {
				let matches = index.find_all(&Value::String(self.needle_lower.clone()), true);
				self.stats = CostStats::new(INDEXED_DT);
				self.index = Some(IndexCursor::new(matches));
			}
			None => {
				self.stats = CostStats::new(crate::config::UNINDEXED_DT);
				self.index = None;
			}
		}
	}

	fn cluster_changed(&mut self, cluster: &ClusterHandle) {
		self.cluster = Some(cluster.clone());
	}

	fn find_first_local(&mut self, start: Row, end: Row) -> Row {
		let cluster = self.cluster.as_ref().expect("cluster_changed must run before find_first_local").clone();
		let len = cluster.len();
		let end = end.min(len);
		if start >= end {
			return NOT_FOUND;
		}
		if let Some(idx) = self.index.as_mut() {
			return match idx.next_in_range(&cluster, start, end) {
				Some(row) => {
					self.stats.record(Some(row - start));
					row
				}
				None => {
					self.stats.record(None);
					NOT_FOUND
				}
			};
		}
		let leaf = cluster.leaf(self.column);
		for row in start..end {
			if let Value::String(s) = leaf.get(row) {
				if s.to_lowercase() == self.needle_lower {
					self.stats.record(Some(row - start));
					return row;
				}
			}
		}
		self.stats.record(None);
		NOT_FOUND
	}

	fn describe(&self) -> String {
		format!("{} ==[c] {}", self.path, format_string(&self.needle_lower))
	}

	fn cost(&self) -> CostStats {
		self.stats
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMatchOp {
	Contains,
	BeginsWith,
	EndsWith,
	Like,
}

impl StringMatchOp {
	fn symbol(self) -> &'static str {
		match self {
			StringMatchOp::Contains => "CONTAINS",
			StringMatchOp::BeginsWith => "BEGINSWITH",
			StringMatchOp::EndsWith => "ENDSWITH",
			StringMatchOp::Like => "LIKE",
		}
	}

	fn matches(self, haystack: &str, needle: &str) -> bool {
		match self {
			StringMatchOp::Contains => haystack.contains(needle),
			StringMatchOp::BeginsWith => haystack.starts_with(needle),
			StringMatchOp::EndsWith => haystack.ends_with(needle),
			StringMatchOp::Like => like_match(haystack, needle),
		}
	}
}

/// `?`/`*` glob matching, no character classes.
fn like_match(haystack: &str, pattern: &str) -> bool {
	let h: Vec<char> = haystack.chars().collect();
	let p: Vec<char> = pattern.chars().collect();
	like_rec(&h, &p)
}

fn like_rec(h: &[char], p: &[char]) -> bool {
	match p.first() {
		None => h.is_empty(),
		Some('*') => like_rec(h, &p[1..]) || (!h.is_empty() && like_rec(&h[1..], p)),
		Some('?') => !h.is_empty() && like_rec(&h[1..], &p[1..]),
		Some(c) => !h.is_empty() && h[0] == *c && like_rec(&h[1..], &p[1..]),
	}
}

#[derive(Debug, Clone)]
pub struct StringMatchNode {
	path: String,
	column: ColKey,
	op: StringMatchOp,
	case_insensitive: bool,
	needle: String,
	needle_lower: String,
	stats: CostStats,
	cluster: Option<ClusterHandle>,
}

impl StringMatchNode {
	pub fn new(path: impl Into<String>, column: ColKey, op: StringMatchOp, case_insensitive: bool, needle: String) -> Self {
		StringMatchNode {
			path: path.into(),
			column,
			op,
			case_insensitive,
			needle_lower: needle.to_lowercase(),
			needle,
			stats: CostStats::new(crate::config::UNINDEXED_DT),
			cluster: None,
		}
	}
}

impl NodeOps for StringMatchNode {
	fn init(&mut self, _will_query_ranges: bool) {}

	fn table_changed(&mut self, _storage: &StorageHandle, _table: TableKey) {
		self.cluster = None;
	}

	fn cluster_changed(&mut self, cluster: &ClusterHandle) {
		self.cluster = Some(cluster.clone());
	}

	fn find_first_local(&mut self, start: Row, end: Row) -> Row {
		let cluster = self.cluster.as_ref().expect("cluster_changed must run before find_first_local").clone();
		let len = cluster.len();
		let end = end.min(len);
		if start >= end {
			return NOT_FOUND;
		}
		let leaf = cluster.leaf(self.column);
		for row in start..end {
			if let Value::String(s) = leaf.get(row) {
				let hit = if self.case_insensitive {
					self.op.matches(&s.to_lowercase(), &self.needle_lower)
				} else {
					self.op.matches(&s, &self.needle)
				};
				if hit {
					self.stats.record(Some(row - start));
					return row;
				}
			}
		}
		self.stats.record(None);
		NOT_FOUND
	}

	fn describe(&self) -> String {
		let suffix = if self.case_insensitive { "[c]" } else { "" };
		format!("{} {}{} {}", self.path, self.op.symbol(), suffix, format_string(&self.needle))
	}

	fn cost(&self) -> CostStats {
		self.stats
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::DataType;
	use crate::storage::testutil::{ColumnSpec, FakeStorage};
	use std::rc::Rc;

	fn people() -> (FakeStorage, ColKey) {
		let mut s = FakeStorage::new();
		let t = s.add_table(
			"People",
			vec![ColumnSpec::scalar("name", DataType::String).indexed()],
			None,
			10,
		);
		for name in ["Billy", "Bob", "Joe", "Jane", "Joel"] {
			s.push_row(t, vec![Value::String(name.into())]);
		}
		let col = s.column(t, "name");
		(s, col)
	}

	#[test]
	fn indexed_equality_finds_match() {
		let (s, col) = people();
		let table = s.resolve_table("People").unwrap();
		let mut node = StringEqualNode::new("name", col, "Joe".to_string());
		let storage_handle: crate::node::StorageHandle = Rc::new(s);
		node.table_changed(&storage_handle, table);
		let cluster: ClusterHandle = Rc::from(storage_handle.clusters(table).remove(0));
		node.cluster_changed(&cluster);
		assert_eq!(node.find_first_local(0, 5), 2);
	}

	#[test]
	fn fused_needles_match_any_of_the_set() {
		let (s, col) = people();
		let table = s.resolve_table("People").unwrap();
		let mut a = StringEqualNode::new("name", col, "Joe".to_string());
		let b = StringEqualNode::new("name", col, "Jane".to_string());
		a.merge_needles(&b);
		assert!(a.describe().contains("IN"));
		let storage_handle: crate::node::StorageHandle = Rc::new(s);
		a.table_changed(&storage_handle, table);
		let cluster: ClusterHandle = Rc::from(storage_handle.clusters(table).remove(0));
		a.cluster_changed(&cluster);
		let first = a.find_first_local(0, 5);
		assert_eq!(first, 2);
		let second = a.find_first_local(first + 1, 5);
		assert_eq!(second, 3);
	}

	#[test]
	fn begins_with_matches_prefix() {
		let (s, _) = people();
		let table = s.resolve_table("People").unwrap();
		let name_col = s.column(table, "name");
		let mut node = StringMatchNode::new("name", name_col, StringMatchOp::BeginsWith, false, "J".to_string());
		let cluster: ClusterHandle = Rc::from(s.clusters(table).remove(0));
		node.cluster_changed(&cluster);
		let mut found = Vec::new();
		let mut row = 0;
		loop {
			let r = node.find_first_local(row, 5);
			if r == NOT_FOUND {
				break;
			}
			found.push(r);
			row = r + 1;
		}
		assert_eq!(found.len(), 3);
	}

	#[test]
	fn like_matches_question_and_star_wildcards() {
		assert!(like_match("Bones", "B*s"));
		assert!(like_match("Bones", "B?nes"));
		assert!(!like_match("Bones", "B?nes?"));
	}
}
