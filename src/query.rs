//! Node tree / `Query`: a conjunction of condition nodes that executes
//! `find_first`, `count`, and aggregates. Implements the same [`NodeOps`]
//! contract as a leaf node (so [`crate::node::not_node::NotNode`] can wrap
//! a whole `Query` as its child) plus the cross-cluster driving loop that
//! walks storage and produces a [`crate::result_view::ResultView`].

use crate::context::Context;
use crate::key::{ObjKey, Row, TableKey, NOT_FOUND};
use crate::node::{ClusterHandle, CostStats, Node, NodeOps, StorageHandle};
use crate::ordering::DescriptorOrdering;
use crate::result_view::ResultView;
use crate::value::Value;
use std::rc::Rc;

/// A conjunction (AND) of condition nodes, plus the cluster-scan state
/// needed to drive `find_first_local` across a whole table.
#[derive(Debug, Clone)]
pub struct Query {
	children: Vec<Node>,
	table: Option<TableKey>,
	cluster: Option<ClusterHandle>,
	stats: CostStats,
}

impl Default for Query {
	fn default() -> Self {
		Query {
			children: Vec::new(),
			table: None,
			cluster: None,
			stats: CostStats::new(crate::config::UNINDEXED_DT),
		}
	}
}

impl Query {
	/// The empty conjunction: `TRUEPREDICATE`, matches every row.
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_node(node: Node) -> Self {
		let mut q = Self::new();
		q.push(node);
		q
	}

	pub fn push(&mut self, node: Node) {
		self.children.push(node);
	}

	pub fn children(&self) -> &[Node] {
		&self.children
	}

	pub fn is_empty(&self) -> bool {
		self.children.is_empty()
	}

	/// Sorts children by ascending `dT` (cheapest-first), re-chosen per
	/// conjunction cycle at run time. Stable so nodes with identical cost
	/// keep their relative (e.g. builder-hoisted) order.
	fn reorder_by_cost(&mut self) {
		self.children.sort_by(|a, b| {
			a.cost()
				.d_t
				.partial_cmp(&b.cost().d_t)
				.unwrap_or(std::cmp::Ordering::Equal)
		});
		if let Some(leading) = self.children.first() {
			trace!(d_t = leading.cost().d_t, "conjunction reordered, leading node selected");
		}
	}

	/// Drives every cluster of `table` from the start, collecting every
	/// matching key into a [`ResultView`].
	pub fn find_all(&mut self, storage: &StorageHandle, table: TableKey, ctx: &mut Context) -> ResultView {
		let span = debug_span!("Query::find_all", query = %self.describe());
		let _enter = span.enter();
		self.table_changed(storage, table);
		let mut out = Vec::new();
		for cluster_box in storage.clusters(table) {
			let cluster: ClusterHandle = Rc::from(cluster_box);
			ctx.observe(table, storage.table_version(table));
			self.cluster_changed(&cluster);
			let len = cluster.len();
			let mut row = 0;
			while row < len {
				let m = self.find_first_local(row, len);
				if m == NOT_FOUND {
					break;
				}
				out.push(cluster.get_real_key(m));
				row = m + 1;
			}
		}
		ResultView::new(out, storage.table_version(table))
	}

	/// Number of matching rows, without materialising a result view.
	pub fn count(&mut self, storage: &StorageHandle, table: TableKey, ctx: &mut Context) -> usize {
		let span = debug_span!("Query::count", query = %self.describe());
		let _enter = span.enter();
		self.table_changed(storage, table);
		let mut total = 0usize;
		for cluster_box in storage.clusters(table) {
			let cluster: ClusterHandle = Rc::from(cluster_box);
			ctx.observe(table, storage.table_version(table));
			self.cluster_changed(&cluster);
			let len = cluster.len();
			let mut row = 0;
			while row < len {
				let m = self.find_first_local(row, len);
				if m == NOT_FOUND {
					break;
				}
				total += 1;
				row = m + 1;
			}
		}
		total
	}

	/// Finds a single match in `table`, without materialising the whole
	/// result set. Used by [`crate::expr::Expr::Subquery`] evaluation,
	/// which only needs an emptiness/first-match test per source object.
	pub fn matches_object(&mut self, storage: &StorageHandle, table: TableKey, key: ObjKey) -> bool {
		self.table_changed(storage, table);
		for cluster_box in storage.clusters(table) {
			let cluster: ClusterHandle = Rc::from(cluster_box);
			let row = cluster.lower_bound_key(key);
			if row < cluster.len() && cluster.get_real_key(row) == key {
				self.cluster_changed(&cluster);
				return self.find_first_local(row, row + 1) == row;
			}
		}
		false
	}

	/// Folds `spec` over every matching row.
	pub fn aggregate(
		&mut self,
		storage: &StorageHandle,
		table: TableKey,
		ctx: &mut Context,
		spec: &crate::expr::AggregateSpec,
	) -> Value {
		let span = debug_span!("Query::aggregate", query = %self.describe());
		let _enter = span.enter();
		let matches = self.find_all(storage, table, ctx);
		let mut values = Vec::with_capacity(matches.size());
		for i in 0..matches.size() {
			let key = matches.get(i);
			let v = match &spec.expr {
				Some(expr) => expr.evaluate(storage, table, key),
				None => Value::Null,
			};
			values.push(v);
		}
		crate::expr::fold_aggregate(spec.kind, &values)
	}

	/// Renders the conjunction back into the textual grammar:
	/// `TRUEPREDICATE` when empty, else each child's `describe()` joined by
	/// ` and `.
	pub fn describe(&self) -> String {
		if self.children.is_empty() {
			return "TRUEPREDICATE".to_string();
		}
		self.children.iter().map(|c| c.describe()).collect::<Vec<_>>().join(" and ")
	}

	/// Applies a [`DescriptorOrdering`] (sort/distinct/limit/include) after
	/// a `find_all`, returning the shaped result view.
	pub fn find_all_ordered(
		&mut self,
		storage: &StorageHandle,
		table: TableKey,
		ctx: &mut Context,
		ordering: &DescriptorOrdering,
	) -> ResultView {
		let mut view = self.find_all(storage, table, ctx);
		view.apply_descriptor_ordering(storage, table, ordering);
		view
	}
}

impl NodeOps for Query {
	fn init(&mut self, will_query_ranges: bool) {
		for child in &mut self.children {
			child.init(will_query_ranges);
		}
	}

	fn table_changed(&mut self, storage: &StorageHandle, table: TableKey) {
		self.table = Some(table);
		self.cluster = None;
		for child in &mut self.children {
			child.table_changed(storage, table);
		}
	}

	fn cluster_changed(&mut self, cluster: &ClusterHandle) {
		self.cluster = Some(cluster.clone());
		for child in &mut self.children {
			child.cluster_changed(cluster);
		}
	}

	/// The `find_first` loop: a conjunction short-circuit that skips
	/// re-verifying predicates already satisfied at the current
	/// candidate, re-verifying all of them whenever a child advances
	/// `start`. Diverges from the literal pseudocode in one place: a child
	/// returning `not_found` ends the whole conjunction immediately (the
	/// pseudocode's `remaining` countdown alone would either loop forever
	/// or return a stale `m`, since nothing in `[start,end)` can satisfy
	/// every child once one of them has none left to offer).
	fn find_first_local(&mut self, start: Row, end: Row) -> Row {
		if self.children.is_empty() {
			return if start < end { start } else { NOT_FOUND };
		}
		if start >= end {
			return NOT_FOUND;
		}
		let n = self.children.len();
		let mut current = 0usize;
		let mut remaining = n;
		let mut start = start;
		loop {
			let m = self.children[current].find_first_local(start, end);
			if m == NOT_FOUND {
				self.stats.record(None);
				return NOT_FOUND;
			}
			if m != start {
				remaining = n;
				start = m;
				self.reorder_by_cost();
			}
			remaining -= 1;
			if remaining == 0 {
				self.stats.record(Some(m));
				return m;
			}
			current = (current + 1) % n;
		}
	}

	fn describe(&self) -> String {
		Query::describe(self)
	}

	fn cost(&self) -> CostStats {
		self.stats
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::DataType;
	use crate::node::compare::{CompareNode, CompareOp};
	use crate::node::string_match::{StringMatchNode, StringMatchOp};
	use crate::storage::testutil::{ColumnSpec, FakeStorage};
	use std::rc::Rc;

	fn people() -> (FakeStorage, TableKey) {
		let mut s = FakeStorage::new();
		let t = s.add_table(
			"People",
			vec![
				ColumnSpec::scalar("name", DataType::String),
				ColumnSpec::scalar("age", DataType::Int),
			],
			None,
			2,
		);
		for (name, age) in [("Billy", 0), ("Bob", 1), ("Joe", 2), ("Jane", 3), ("Joel", 4)] {
			s.push_row(t, vec![Value::String(name.into()), Value::Int(age)]);
		}
		(s, t)
	}

	#[test]
	fn conjunction_intersects_two_predicates() {
		let (s, t) = people();
		let age_col = s.column(t, "age");
		let mut q = Query::new();
		q.push(Node::Compare(CompareNode::new("age", age_col, CompareOp::Greater, Value::Int(2))));
		q.push(Node::Compare(CompareNode::new("age", age_col, CompareOp::Less, Value::Int(4))));
		let storage: StorageHandle = Rc::new(s);
		let mut ctx = Context::new();
		let view = q.find_all(&storage, t, &mut ctx);
		assert_eq!(view.size(), 1);
		assert_eq!(view.get(0), ObjKey::new(3));
	}

	#[test]
	fn begins_with_predicate_matches_three_rows() {
		let (s, t) = people();
		let name_col = s.column(t, "name");
		let mut q = Query::from_node(Node::StringMatch(StringMatchNode::new(
			"name",
			name_col,
			StringMatchOp::BeginsWith,
			false,
			"J".to_string(),
		)));
		let storage: StorageHandle = Rc::new(s);
		let mut ctx = Context::new();
		assert_eq!(q.count(&storage, t, &mut ctx), 3);
	}

	#[test]
	fn empty_conjunction_is_truepredicate() {
		let (s, t) = people();
		let mut q = Query::new();
		assert_eq!(q.describe(), "TRUEPREDICATE");
		let storage: StorageHandle = Rc::new(s);
		let mut ctx = Context::new();
		assert_eq!(q.count(&storage, t, &mut ctx), 5);
	}

	#[test]
	fn scan_crosses_cluster_boundaries() {
		// cluster_size = 2 above, 5 rows => 3 clusters; a predicate spanning
		// all of them must still find every match.
		let (s, t) = people();
		let age_col = s.column(t, "age");
		let mut q = Query::from_node(Node::Compare(CompareNode::new("age", age_col, CompareOp::GreaterEqual, Value::Int(0))));
		let storage: StorageHandle = Rc::new(s);
		let mut ctx = Context::new();
		assert_eq!(q.count(&storage, t, &mut ctx), 5);
	}
}
