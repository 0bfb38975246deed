//! `Equal`/`NotEqual`/`Less`/`LessEqual`/`Greater`/`GreaterEqual` over
//! numeric, timestamp, bool and link columns. Kept as one struct
//! parameterised by [`CompareOp`] rather than six near-identical structs —
//! the six comparison variants are the six `CompareOp` values, not six
//! distinct Rust types.

use crate::config::UNINDEXED_DT;
use crate::fmt::format_value;
use crate::key::{ColKey, Row, TableKey, NOT_FOUND};
use crate::node::{ClusterHandle, CostStats, NodeOps, StorageHandle};
use crate::value::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
	Equal,
	NotEqual,
	Less,
	LessEqual,
	Greater,
	GreaterEqual,
}

impl CompareOp {
	pub fn symbol(self) -> &'static str {
		match self {
			CompareOp::Equal => "==",
			CompareOp::NotEqual => "!=",
			CompareOp::Less => "<",
			CompareOp::LessEqual => "<=",
			CompareOp::Greater => ">",
			CompareOp::GreaterEqual => ">=",
		}
	}

	pub fn accepts(self, ord: Ordering) -> bool {
		match self {
			CompareOp::Equal => ord == Ordering::Equal,
			CompareOp::NotEqual => ord != Ordering::Equal,
			CompareOp::Less => ord == Ordering::Less,
			CompareOp::LessEqual => ord != Ordering::Greater,
			CompareOp::Greater => ord == Ordering::Greater,
			CompareOp::GreaterEqual => ord != Ordering::Less,
		}
	}

	/// Whether this op bounds a column from below (`column OP value` holds
	/// for every value at or above some point). Used by the builder's
	/// chained-inequality coalescing pass to recognise `age > 2`-shaped
	/// halves of a range.
	pub fn is_lower_bound(self) -> bool {
		matches!(self, CompareOp::Greater | CompareOp::GreaterEqual)
	}

	/// Whether this op bounds a column from above (`age < 4`-shaped).
	pub fn is_upper_bound(self) -> bool {
		matches!(self, CompareOp::Less | CompareOp::LessEqual)
	}
}

#[derive(Debug, Clone)]
pub struct CompareNode {
	path: String,
	column: ColKey,
	op: CompareOp,
	value: Value,
	cluster: Option<ClusterHandle>,
	stats: CostStats,
}

impl CompareNode {
	pub fn new(path: impl Into<String>, column: ColKey, op: CompareOp, value: Value) -> Self {
		CompareNode {
			path: path.into(),
			column,
			op,
			value,
			cluster: None,
			stats: CostStats::new(UNINDEXED_DT),
		}
	}

	pub fn column(&self) -> ColKey {
		self.column
	}

	pub fn op(&self) -> CompareOp {
		self.op
	}

	pub fn value(&self) -> &Value {
		&self.value
	}

	pub fn path(&self) -> &str {
		&self.path
	}
}

impl NodeOps for CompareNode {
	fn init(&mut self, _will_query_ranges: bool) {}

	fn table_changed(&mut self, _storage: &StorageHandle, _table: TableKey) {
		self.cluster = None;
	}

	fn cluster_changed(&mut self, cluster: &ClusterHandle) {
		self.cluster = Some(cluster.clone());
	}

	fn find_first_local(&mut self, start: Row, end: Row) -> Row {
		let cluster = self.cluster.as_ref().expect("cluster_changed must run before find_first_local");
		let len = cluster.len();
		let end = end.min(len);
		if start >= end {
			return NOT_FOUND;
		}
		let leaf = cluster.leaf(self.column);
		let mut row = start;
		while row < end {
			let v = leaf.get(row);
			if self.op.accepts(v.cmp(&self.value)) {
				self.stats.record(Some(row - start));
				return row;
			}
			row += 1;
		}
		self.stats.record(None);
		NOT_FOUND
	}

	fn describe(&self) -> String {
		format!("{} {} {}", self.path, self.op.symbol(), format_value(&self.value))
	}

	fn cost(&self) -> CostStats {
		self.stats
	}
}

/// Two chained inequalities on the same column (`age > 2 and age < 4`),
/// coalesced by the builder (`spec.md` §4.5 step (3), "range coalescing of
/// chained inequalities on the same column") into one node that checks both
/// bounds in a single leaf pass instead of running two `CompareNode`s
/// through the conjunction's find-first loop. Never constructed by hand
/// outside `parser::builder`.
#[derive(Debug, Clone)]
pub struct RangeNode {
	path: String,
	column: ColKey,
	lower: (CompareOp, Value),
	upper: (CompareOp, Value),
	cluster: Option<ClusterHandle>,
	stats: CostStats,
}

impl RangeNode {
	pub fn new(path: impl Into<String>, column: ColKey, lower: (CompareOp, Value), upper: (CompareOp, Value)) -> Self {
		RangeNode {
			path: path.into(),
			column,
			lower,
			upper,
			cluster: None,
			stats: CostStats::new(UNINDEXED_DT),
		}
	}
}

impl NodeOps for RangeNode {
	fn init(&mut self, _will_query_ranges: bool) {}

	fn table_changed(&mut self, _storage: &StorageHandle, _table: TableKey) {
		self.cluster = None;
	}

	fn cluster_changed(&mut self, cluster: &ClusterHandle) {
		self.cluster = Some(cluster.clone());
	}

	fn find_first_local(&mut self, start: Row, end: Row) -> Row {
		let cluster = self.cluster.as_ref().expect("cluster_changed must run before find_first_local");
		let len = cluster.len();
		let end = end.min(len);
		if start >= end {
			return NOT_FOUND;
		}
		let leaf = cluster.leaf(self.column);
		let mut row = start;
		while row < end {
			let v = leaf.get(row);
			if self.lower.0.accepts(v.cmp(&self.lower.1)) && self.upper.0.accepts(v.cmp(&self.upper.1)) {
				self.stats.record(Some(row - start));
				return row;
			}
			row += 1;
		}
		self.stats.record(None);
		NOT_FOUND
	}

	fn describe(&self) -> String {
		format!(
			"{} {} {} and {} {} {}",
			self.path,
			self.lower.0.symbol(),
			format_value(&self.lower.1),
			self.path,
			self.upper.0.symbol(),
			format_value(&self.upper.1)
		)
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

	fn setup() -> (FakeStorage, ColKey) {
		let mut s = FakeStorage::new();
		let t = s.add_table("People", vec![ColumnSpec::scalar("age", DataType::Int)], None, 10);
		for age in [0, 1, 2, 3, 4] {
			s.push_row(t, vec![Value::Int(age)]);
		}
		let col = s.column(t, "age");
		(s, col)
	}

	#[test]
	fn finds_first_matching_row_in_range() {
		let (s, col) = setup();
		let table = s.resolve_table("People").unwrap();
		let cluster: ClusterHandle = Rc::from(s.clusters(table).remove(0));
		let mut node = CompareNode::new("age", col, CompareOp::Greater, Value::Int(2));
		node.cluster_changed(&cluster);
		assert_eq!(node.find_first_local(0, 5), 3);
	}

	#[test]
	fn returns_not_found_when_nothing_matches() {
		let (s, col) = setup();
		let table = s.resolve_table("People").unwrap();
		let cluster: ClusterHandle = Rc::from(s.clusters(table).remove(0));
		let mut node = CompareNode::new("age", col, CompareOp::Greater, Value::Int(100));
		node.cluster_changed(&cluster);
		assert_eq!(node.find_first_local(0, 5), NOT_FOUND);
	}

	#[test]
	fn is_monotone_under_increasing_start() {
		let (s, col) = setup();
		let table = s.resolve_table("People").unwrap();
		let cluster: ClusterHandle = Rc::from(s.clusters(table).remove(0));
		let mut node = CompareNode::new("age", col, CompareOp::GreaterEqual, Value::Int(1));
		node.cluster_changed(&cluster);
		let a = node.find_first_local(0, 5);
		let b = node.find_first_local(a + 1, 5);
		assert!(b == NOT_FOUND || b >= a);
	}

	#[test]
	fn range_node_matches_both_bounds_in_one_pass() {
		let (s, col) = setup();
		let table = s.resolve_table("People").unwrap();
		let cluster: ClusterHandle = Rc::from(s.clusters(table).remove(0));
		let mut node = RangeNode::new("age", col, (CompareOp::Greater, Value::Int(2)), (CompareOp::Less, Value::Int(4)));
		node.cluster_changed(&cluster);
		assert_eq!(node.find_first_local(0, 5), 3);
		assert_eq!(node.find_first_local(4, 5), NOT_FOUND);
	}
}
