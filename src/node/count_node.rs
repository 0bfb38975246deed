//! `LinkCountNode`/`ListCountNode`/`BacklinkCountNode` for `.@count`/
//! `.@size` against a scalar. Unlike the general expression engine's
//! `@count` (which can sit at the end of an arbitrary multi-hop key path),
//! these are the direct, single-column case the builder lowers a bare
//! `column.@count OP literal` predicate into without going through
//! [`crate::expr`] at all.

use crate::config::UNINDEXED_DT;
use crate::key::{ColKey, Row, TableKey, NOT_FOUND};
use crate::node::compare::CompareOp;
use crate::node::{ClusterHandle, CostStats, NodeOps, StorageHandle};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
	/// A single (scalar) link column: count is 0 (null) or 1 (set).
	Link,
	/// A `List<Link>` or other list-valued column: count is the list length.
	List,
	/// A backlink column: count is the number of referencing objects.
	Backlink,
}

#[derive(Debug, Clone)]
pub struct CountNode {
	path: String,
	column: ColKey,
	kind: CountKind,
	op: CompareOp,
	value: i64,
	stats: CostStats,
	storage: Option<StorageHandle>,
	table: Option<TableKey>,
	cluster: Option<ClusterHandle>,
}

impl CountNode {
	pub fn new(path: impl Into<String>, column: ColKey, kind: CountKind, op: CompareOp, value: i64) -> Self {
		CountNode {
			path: path.into(),
			column,
			kind,
			op,
			value,
			stats: CostStats::new(UNINDEXED_DT),
			storage: None,
			table: None,
			cluster: None,
		}
	}

	fn count_at(&self, row: Row) -> i64 {
		let cluster = self.cluster.as_ref().expect("cluster_changed must run before find_first_local");
		let storage = self.storage.as_ref().expect("table_changed must run before find_first_local");
		let table = self.table.expect("table_changed must run before find_first_local");
		let key = cluster.get_real_key(row);
		let obj = storage.object(table, key);
		match self.kind {
			CountKind::Backlink => obj.get_backlinks(self.column).len() as i64,
			CountKind::Link => match obj.get(self.column) {
				Value::Link(_) => 1,
				_ => 0,
			},
			CountKind::List => match obj.get(self.column) {
				Value::List(items) => items.len() as i64,
				_ => 0,
			},
		}
	}
}

impl NodeOps for CountNode {
	fn init(&mut self, _will_query_ranges: bool) {}

	fn table_changed(&mut self, storage: &StorageHandle, table: TableKey) {
		self.storage = Some(storage.clone());
		self.table = Some(table);
		self.cluster = None;
	}

	fn cluster_changed(&mut self, cluster: &ClusterHandle) {
		self.cluster = Some(cluster.clone());
	}

	fn find_first_local(&mut self, start: Row, end: Row) -> Row {
		let len = self.cluster.as_ref().map(|c| c.len()).unwrap_or(0);
		let end = end.min(len);
		let mut row = start;
		while row < end {
			if self.op.accepts(self.count_at(row).cmp(&self.value)) {
				self.stats.record(Some(row - start));
				return row;
			}
			row += 1;
		}
		self.stats.record(None);
		NOT_FOUND
	}

	fn describe(&self) -> String {
		format!("{}.@count {} {}", self.path, self.op.symbol(), self.value)
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

	#[test]
	fn list_count_compares_cardinality() {
		let mut s = FakeStorage::new();
		let item = s.add_table("Item", vec![ColumnSpec::scalar("price", DataType::Int)], None, 10);
		let person = s.add_table("Person", vec![ColumnSpec::list_link("items", "Item")], None, 10);
		s.link_target(person, "items", item);
		let a = s.push_row(item, vec![Value::Int(1)]);
		let b = s.push_row(item, vec![Value::Int(2)]);
		s.push_row(person, vec![Value::List(vec![Value::Link(a), Value::Link(b)])]);
		s.push_row(person, vec![Value::List(vec![Value::Link(a)])]);
		s.finalize();

		let items_col = s.column(person, "items");
		let storage_handle: crate::node::StorageHandle = Rc::new(s);
		let mut node = CountNode::new("items", items_col, CountKind::List, CompareOp::Equal, 2);
		node.table_changed(&storage_handle, person);
		let cluster: ClusterHandle = Rc::from(storage_handle.clusters(person).remove(0));
		node.cluster_changed(&cluster);
		assert_eq!(node.find_first_local(0, 2), 0);
	}
}
