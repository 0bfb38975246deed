//! `OrNode` (disjunction, `OR`/`||`): needed for anything an adjacent-`Equal`
//! needle fusion doesn't already collapse into a single `StringEqualNode`.
//! Modelled the same way as [`crate::node::not_node::NotNode`] (a composite
//! node whose children happen to be whole conjunction trees) rather than as
//! a bare `Vec<Node>`, since each branch may itself be an arbitrary `AND`
//! chain (`Query`).

use crate::config::UNINDEXED_DT;
use crate::key::{Row, TableKey, NOT_FOUND};
use crate::node::{ClusterHandle, CostStats, NodeOps, StorageHandle};
use crate::query::Query;

#[derive(Debug, Clone)]
pub struct OrNode {
	branches: Vec<Query>,
	stats: CostStats,
}

impl OrNode {
	pub fn new(branches: Vec<Query>) -> Self {
		OrNode {
			branches,
			stats: CostStats::new(UNINDEXED_DT),
		}
	}

	pub fn branches(&self) -> &[Query] {
		&self.branches
	}
}

impl NodeOps for OrNode {
	fn init(&mut self, will_query_ranges: bool) {
		for b in &mut self.branches {
			b.init(will_query_ranges);
		}
	}

	fn table_changed(&mut self, storage: &StorageHandle, table: TableKey) {
		for b in &mut self.branches {
			b.table_changed(storage, table);
		}
	}

	fn cluster_changed(&mut self, cluster: &ClusterHandle) {
		for b in &mut self.branches {
			b.cluster_changed(cluster);
		}
	}

	/// Smallest match across every branch in `[start,end)`: each branch is
	/// itself total and monotone, so the minimum of their returns preserves
	/// both properties for the disjunction.
	fn find_first_local(&mut self, start: Row, end: Row) -> Row {
		let mut best = NOT_FOUND;
		for b in &mut self.branches {
			let m = b.find_first_local(start, end);
			if m != NOT_FOUND && (best == NOT_FOUND || m < best) {
				best = m;
			}
		}
		self.stats.record((best != NOT_FOUND).then_some(best.saturating_sub(start)));
		best
	}

	fn describe(&self) -> String {
		let rendered: Vec<String> = self.branches.iter().map(|b| b.describe()).collect();
		format!("({})", rendered.join(" or "))
	}

	fn cost(&self) -> CostStats {
		self.stats
	}
}
