//! Condition node protocol: a single-predicate evaluator with cost
//! statistics. The `ParentNode` virtual hierarchy of the original engine is
//! ported here as a tagged enum of concrete node structs plus the
//! [`NodeOps`] trait describing their shared contract — closed-world
//! dispatch via `match` instead of a `Box<dyn>` vtable, since the node kind
//! set is fixed and known at compile time. `Node::clone()` is structural
//! (`#[derive(Clone)]` all the way down).

pub mod binary_match;
pub mod compare;
pub mod count_node;
pub mod expression_node;
pub mod not_node;
pub mod or_node;
pub mod string_match;

pub use binary_match::{BinaryMatchNode, BinaryMatchOp};
pub use compare::{CompareNode, CompareOp, RangeNode};
pub use count_node::{CountKind, CountNode};
pub use expression_node::ExpressionNode;
pub use not_node::NotNode;
pub use or_node::OrNode;
pub use string_match::{StringEqualInsNode, StringEqualNode, StringMatchNode, StringMatchOp};

use crate::key::{Row, TableKey};
use crate::storage::{Cluster, Storage};
use std::rc::Rc;

/// Shared handle to the storage snapshot a query was built against. An
/// `Rc` rather than a bare reference so nodes (and the `Query`/`NotNode`
/// trees that own them) can be cloned structurally without threading a
/// lifetime parameter through every node variant — the explicit-context
/// alternative to a process-wide static for the one thing every node needs
/// a handle to.
pub type StorageHandle = Rc<dyn Storage>;

/// Shared handle to the cluster a node is currently bound to
/// (`cluster_changed`). `Rc` for the same reason as [`StorageHandle`]: it
/// lets `Leaf` accessors be created fresh, cheaply, on every
/// `find_first_local` call without the node owning a self-referential
/// borrow into the cluster.
pub type ClusterHandle = Rc<dyn Cluster>;

/// Per-node cost statistics: `dT` (expected cost per probe) seeds the
/// adaptive reordering in [`crate::query`]; `dD` (expected distance between
/// successive matches) is refined from observed probes.
#[derive(Debug, Clone, Copy)]
pub struct CostStats {
	pub d_t: f64,
	pub d_d: f64,
	pub probes: u64,
	pub matches: u64,
}

impl CostStats {
	pub fn new(d_t: f64) -> Self {
		CostStats {
			d_t,
			d_d: 1.0,
			probes: 0,
			matches: 0,
		}
	}

	/// Records one probe. `distance`, when present, is rows since the start
	/// of the probe at which the match was found; it feeds a running
	/// average that becomes the node's `dD` estimate.
	pub fn record(&mut self, distance: Option<usize>) {
		self.probes += 1;
		if let Some(d) = distance {
			self.matches += 1;
			let n = self.matches as f64;
			self.d_d += (d as f64 - self.d_d) / n;
		}
	}
}

/// The protocol every condition node implements: `init`, `table_changed`,
/// `cluster_changed`, `find_first_local`, `describe`, plus the cost
/// statistics the scheduler reads.
///
/// Contract of `find_first_local`: total on `[start,end)`, monotone
/// non-decreasing in its return value under non-decreasing `start`,
/// idempotent under repeated identical invocation.
pub trait NodeOps {
	/// `will_query_ranges` hints whether the caller will probe disjoint
	/// ranges (as opposed to a single monotone scan), letting a node pick a
	/// cheaper strategy when it knows it won't be asked to.
	fn init(&mut self, will_query_ranges: bool);

	/// Rebinds the node to a (possibly new) table: index lookups and other
	/// table-scoped state are refreshed here, once per table rather than
	/// once per cluster.
	fn table_changed(&mut self, storage: &StorageHandle, table: TableKey);

	/// Rebinds the node's leaf pointer to `cluster`.
	fn cluster_changed(&mut self, cluster: &ClusterHandle);

	/// Smallest matching row in `[start,end)`, or [`crate::key::NOT_FOUND`].
	fn find_first_local(&mut self, start: Row, end: Row) -> Row;

	/// Renders this node back into the predicate grammar fragment it was
	/// built from.
	fn describe(&self) -> String;

	/// Current cost statistics, read by the conjunction scheduler.
	fn cost(&self) -> CostStats;
}

/// The closed set of condition node kinds.
#[derive(Debug, Clone)]
pub enum Node {
	Compare(CompareNode),
	Range(RangeNode),
	StringEqual(StringEqualNode),
	StringEqualIns(StringEqualInsNode),
	StringMatch(StringMatchNode),
	BinaryMatch(BinaryMatchNode),
	Expression(Box<ExpressionNode>),
	Not(Box<NotNode>),
	Or(Box<OrNode>),
	Count(CountNode),
}

macro_rules! dispatch {
	($self:ident, $method:ident ( $($arg:expr),* )) => {
		match $self {
			Node::Compare(n) => n.$method($($arg),*),
			Node::Range(n) => n.$method($($arg),*),
			Node::StringEqual(n) => n.$method($($arg),*),
			Node::StringEqualIns(n) => n.$method($($arg),*),
			Node::StringMatch(n) => n.$method($($arg),*),
			Node::BinaryMatch(n) => n.$method($($arg),*),
			Node::Expression(n) => n.$method($($arg),*),
			Node::Not(n) => n.$method($($arg),*),
			Node::Or(n) => n.$method($($arg),*),
			Node::Count(n) => n.$method($($arg),*),
		}
	};
}

impl NodeOps for Node {
	fn init(&mut self, will_query_ranges: bool) {
		dispatch!(self, init(will_query_ranges))
	}

	fn table_changed(&mut self, storage: &StorageHandle, table: TableKey) {
		dispatch!(self, table_changed(storage, table))
	}

	fn cluster_changed(&mut self, cluster: &ClusterHandle) {
		dispatch!(self, cluster_changed(cluster))
	}

	fn find_first_local(&mut self, start: Row, end: Row) -> Row {
		dispatch!(self, find_first_local(start, end))
	}

	fn describe(&self) -> String {
		dispatch!(self, describe())
	}

	fn cost(&self) -> CostStats {
		dispatch!(self, cost())
	}
}
