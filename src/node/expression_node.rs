//! `ExpressionNode`: the general condition node a predicate lowers into
//! whenever it isn't one of the specialised fast paths (`CompareNode`,
//! `StringEqualNode`, …) — an arbitrary [`crate::expr::Expr`] on each side
//! of a comparison operator, with an optional `ANY`/`ALL`/`NONE` quantifier
//! when either side is list-valued.

use crate::config::UNINDEXED_DT;
use crate::expr::Expr;
use crate::key::{Row, TableKey, NOT_FOUND};
use crate::node::compare::CompareOp;
use crate::node::{ClusterHandle, CostStats, NodeOps, StorageHandle};
use crate::value::Value;

/// How a list-valued side of a comparison is reduced to a boolean
/// (`ANY`/`SOME`/`ALL`/`NONE`). `Any` is the implicit quantifier for a bare
/// list comparison with no explicit keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
	Any,
	All,
	None,
}

#[derive(Debug, Clone)]
pub struct ExpressionNode {
	lhs: Expr,
	op: CompareOp,
	rhs: Expr,
	quantifier: Quantifier,
	stats: CostStats,
	storage: Option<StorageHandle>,
	table: Option<TableKey>,
	cluster: Option<ClusterHandle>,
}

impl ExpressionNode {
	pub fn new(lhs: Expr, op: CompareOp, rhs: Expr, quantifier: Quantifier) -> Self {
		ExpressionNode {
			lhs,
			op,
			rhs,
			quantifier,
			stats: CostStats::new(UNINDEXED_DT),
			storage: None,
			table: None,
			cluster: None,
		}
	}

	/// Evaluates both sides at `key` and reduces to a boolean, quantifying
	/// over whichever side (if any) is list-valued. List-vs-list comparisons
	/// aren't part of the surface grammar; defensively treated as
	/// non-matching rather than panicking, since the builder is responsible
	/// for rejecting them before a node is ever constructed.
	fn row_matches(&self, storage: &StorageHandle, table: TableKey, key: crate::key::ObjKey) -> bool {
		let lv = self.lhs.evaluate(storage, table, key);
		let rv = self.rhs.evaluate(storage, table, key);
		let accepts_against = |item: &Value, other: &Value| self.op.accepts(item.cmp(other));
		match (&lv, &rv) {
			(Value::List(_), Value::List(_)) => false,
			(Value::List(items), other) => match self.quantifier {
				Quantifier::Any => items.iter().any(|v| accepts_against(v, other)),
				Quantifier::All => items.iter().all(|v| accepts_against(v, other)),
				Quantifier::None => !items.iter().any(|v| accepts_against(v, other)),
			},
			(other, Value::List(items)) => match self.quantifier {
				Quantifier::Any => items.iter().any(|v| accepts_against(other, v)),
				Quantifier::All => items.iter().all(|v| accepts_against(other, v)),
				Quantifier::None => !items.iter().any(|v| accepts_against(other, v)),
			},
			_ => self.op.accepts(lv.cmp(&rv)),
		}
	}
}

impl NodeOps for ExpressionNode {
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
		let cluster = self.cluster.as_ref().expect("cluster_changed must run before find_first_local").clone();
		let storage = self.storage.as_ref().expect("table_changed must run before find_first_local").clone();
		let table = self.table.expect("table_changed must run before find_first_local");
		let end = end.min(cluster.len());
		let mut row = start;
		while row < end {
			let key = cluster.get_real_key(row);
			if self.row_matches(&storage, table, key) {
				self.stats.record(Some(row - start));
				return row;
			}
			row += 1;
		}
		self.stats.record(None);
		NOT_FOUND
	}

	fn describe(&self) -> String {
		let quant = match self.quantifier {
			Quantifier::Any => "",
			Quantifier::All => "ALL ",
			Quantifier::None => "NONE ",
		};
		format!("{quant}{} {} {}", self.lhs, self.op.symbol(), self.rhs)
	}

	fn cost(&self) -> CostStats {
		self.stats
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::expr::PathExpr;
	use crate::key::{ColKey, DataType};
	use crate::linkmap::LinkMap;
	use crate::storage::testutil::{ColumnSpec, FakeStorage};
	use std::rc::Rc;

	fn path(col: ColKey, name: &str) -> Expr {
		Expr::Path(PathExpr {
			path: name.to_string(),
			link_map: LinkMap::new(),
			column: Some(col),
		})
	}

	#[test]
	fn any_quantifier_matches_if_one_list_item_qualifies() {
		let mut s = FakeStorage::new();
		let t = s.add_table("Person", vec![ColumnSpec::scalar("scores", DataType::Int).list()], None, 10);
		s.push_row(t, vec![Value::List(vec![Value::Int(1), Value::Int(9)])]);
		s.push_row(t, vec![Value::List(vec![Value::Int(1), Value::Int(2)])]);
		let scores_col = s.column(t, "scores");

		let lhs = path(scores_col, "scores");
		let rhs = Expr::Literal(Value::Int(5));
		let mut node = ExpressionNode::new(lhs, CompareOp::Greater, rhs, Quantifier::Any);
		let storage: StorageHandle = Rc::new(s);
		node.table_changed(&storage, t);
		let cluster: ClusterHandle = Rc::from(storage.clusters(t).remove(0));
		node.cluster_changed(&cluster);
		assert_eq!(node.find_first_local(0, 2), 0);
	}

	#[test]
	fn all_quantifier_requires_every_item_to_qualify() {
		let mut s = FakeStorage::new();
		let t = s.add_table("Person", vec![ColumnSpec::scalar("scores", DataType::Int).list()], None, 10);
		s.push_row(t, vec![Value::List(vec![Value::Int(6), Value::Int(9)])]);
		s.push_row(t, vec![Value::List(vec![Value::Int(1), Value::Int(9)])]);
		let scores_col = s.column(t, "scores");

		let lhs = path(scores_col, "scores");
		let rhs = Expr::Literal(Value::Int(5));
		let mut node = ExpressionNode::new(lhs, CompareOp::Greater, rhs, Quantifier::All);
		let storage: StorageHandle = Rc::new(s);
		node.table_changed(&storage, t);
		let cluster: ClusterHandle = Rc::from(storage.clusters(t).remove(0));
		node.cluster_changed(&cluster);
		assert_eq!(node.find_first_local(0, 2), 0);
		assert_eq!(node.find_first_local(1, 2), NOT_FOUND);
	}
}
