//! Byte-string matchers: the same operator set as
//! [`crate::node::string_match::StringMatchNode`] but over `Binary` values,
//! with case folding restricted to ASCII for the insensitive variants
//! (binary has no glyphs to fold beyond ASCII `A`-`Z`).

use crate::config::UNINDEXED_DT;
use crate::fmt::format_binary;
use crate::key::{ColKey, Row, TableKey, NOT_FOUND};
use crate::node::{ClusterHandle, CostStats, NodeOps, StorageHandle};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryMatchOp {
	Equal,
	Contains,
	BeginsWith,
	EndsWith,
}

impl BinaryMatchOp {
	fn symbol(self) -> &'static str {
		match self {
			BinaryMatchOp::Equal => "==",
			BinaryMatchOp::Contains => "CONTAINS",
			BinaryMatchOp::BeginsWith => "BEGINSWITH",
			BinaryMatchOp::EndsWith => "ENDSWITH",
		}
	}

	fn matches(self, haystack: &[u8], needle: &[u8]) -> bool {
		match self {
			BinaryMatchOp::Equal => haystack == needle,
			BinaryMatchOp::Contains => contains_subsequence(haystack, needle),
			BinaryMatchOp::BeginsWith => haystack.starts_with(needle),
			BinaryMatchOp::EndsWith => haystack.ends_with(needle),
		}
	}
}

fn contains_subsequence(haystack: &[u8], needle: &[u8]) -> bool {
	if needle.is_empty() {
		return true;
	}
	if needle.len() > haystack.len() {
		return false;
	}
	haystack.windows(needle.len()).any(|w| w == needle)
}

/// ASCII-only case fold, used by the `[c]` variants.
fn ascii_fold(bytes: &[u8]) -> Vec<u8> {
	bytes.iter().map(|b| b.to_ascii_lowercase()).collect()
}

#[derive(Debug, Clone)]
pub struct BinaryMatchNode {
	path: String,
	column: ColKey,
	op: BinaryMatchOp,
	case_insensitive: bool,
	needle: Vec<u8>,
	needle_folded: Vec<u8>,
	stats: CostStats,
	cluster: Option<ClusterHandle>,
}

impl BinaryMatchNode {
	pub fn new(path: impl Into<String>, column: ColKey, op: BinaryMatchOp, case_insensitive: bool, needle: Vec<u8>) -> Self {
		BinaryMatchNode {
			path: path.into(),
			column,
			op,
			case_insensitive,
			needle_folded: ascii_fold(&needle),
			needle,
			stats: CostStats::new(UNINDEXED_DT),
			cluster: None,
		}
	}
}

impl NodeOps for BinaryMatchNode {
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
			if let Value::Binary(b) = leaf.get(row) {
				let hit = if self.case_insensitive {
					self.op.matches(&ascii_fold(&b), &self.needle_folded)
				} else {
					self.op.matches(&b, &self.needle)
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
		format!("{} {}{} {}", self.path, self.op.symbol(), suffix, format_binary(&self.needle))
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
	fn contains_finds_subsequence() {
		let mut s = FakeStorage::new();
		let t = s.add_table("Blobs", vec![ColumnSpec::scalar("data", DataType::Binary)], None, 10);
		s.push_row(t, vec![Value::Binary(vec![1, 2, 3, 4])]);
		s.push_row(t, vec![Value::Binary(vec![9, 9])]);
		let col = s.column(t, "data");
		let mut node = BinaryMatchNode::new("data", col, BinaryMatchOp::Contains, false, vec![2, 3]);
		let cluster: ClusterHandle = Rc::from(s.clusters(t).remove(0));
		node.cluster_changed(&cluster);
		assert_eq!(node.find_first_local(0, 2), 0);
	}

	#[test]
	fn case_insensitive_folds_ascii_only() {
		let mut s = FakeStorage::new();
		let t = s.add_table("Blobs", vec![ColumnSpec::scalar("data", DataType::Binary)], None, 10);
		s.push_row(t, vec![Value::Binary(b"ABC".to_vec())]);
		let col = s.column(t, "data");
		let mut node = BinaryMatchNode::new("data", col, BinaryMatchOp::Equal, true, b"abc".to_vec());
		let cluster: ClusterHandle = Rc::from(s.clusters(t).remove(0));
		node.cluster_changed(&cluster);
		assert_eq!(node.find_first_local(0, 1), 0);
	}
}
