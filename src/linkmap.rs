//! Link map: evaluates a chain of single/list/backlink hops into a set of
//! target keys, keeping "which column" and "which direction" as separate
//! fields on each hop so an arbitrary-length chain can mix hop kinds.

use crate::config::MAX_BACKLINK_CHAIN_DEPTH;
use crate::key::{ColKey, ObjKey, TableKey};
use crate::storage::Storage;
use crate::value::Value;
use smallvec::SmallVec;

/// How one hop of a [`LinkMap`] follows its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
	/// At most one forward key (a scalar link column).
	Single,
	/// Every key in a `List<Link>` column, in list order.
	List,
	/// Every origin key referencing this object through the hop's inverse
	/// column. Order is the storage layer's choice (ascending origin-`ObjKey`
	/// order here; see `DESIGN.md`).
	Backlink,
}

/// One hop of a multi-table traversal: which table it starts from, which
/// column it follows, how (`LinkKind`), and which table it lands in.
/// `to_table` is resolved once, at build time, from the schema — the
/// traversal itself never needs to ask storage "what table does this link
/// point to", only "what's in the column".
#[derive(Debug, Clone, Copy)]
pub struct LinkHop {
	pub from_table: TableKey,
	pub column: ColKey,
	pub kind: LinkKind,
	pub to_table: TableKey,
}

/// An ordered sequence of hops describing a key-path traversal, e.g.
/// `items.discount` (two `Single` hops) or
/// `@links.Person.father.@links.Person.father` (two `Backlink` hops).
///
/// `collect_dependencies` walks the chain and returns all distinct table
/// keys participating — used to decide which table versions to observe.
#[derive(Debug, Clone, Default)]
pub struct LinkMap {
	// Most key-paths are a handful of hops at most; inline storage avoids an
	// allocation per path for the common case.
	hops: SmallVec<[LinkHop; 4]>,
}

impl LinkMap {
	pub fn new() -> Self {
		LinkMap { hops: SmallVec::new() }
	}

	pub fn push(&mut self, hop: LinkHop) {
		self.hops.push(hop);
	}

	pub fn is_empty(&self) -> bool {
		self.hops.is_empty()
	}

	pub fn len(&self) -> usize {
		self.hops.len()
	}

	pub fn hops(&self) -> &[LinkHop] {
		&self.hops
	}

	/// `true` if any hop may fan out to more than one key.
	pub fn is_non_unary(&self) -> bool {
		self.hops.iter().any(|h| !matches!(h.kind, LinkKind::Single))
	}

	/// The table the chain lands in after all hops, or `start_table` if the
	/// map is empty.
	pub fn target_table(&self, start_table: TableKey) -> TableKey {
		self.hops.last().map(|h| h.to_table).unwrap_or(start_table)
	}

	/// Every distinct table the chain touches, `start_table` included.
	pub fn collect_dependencies(&self, start_table: TableKey) -> Vec<TableKey> {
		let mut out = vec![start_table];
		for hop in &self.hops {
			if !out.contains(&hop.from_table) {
				out.push(hop.from_table);
			}
			if !out.contains(&hop.to_table) {
				out.push(hop.to_table);
			}
		}
		out
	}

	/// Traverses the chain starting at `start` (an object in `start_table`),
	/// calling `visitor` for every key reached at the end of the chain.
	/// Returning `false` from `visitor` terminates traversal early, and that
	/// `false` propagates back out of `map_links`.
	///
	/// Guards against pathological chains (a backlink cycle feeding itself)
	/// with [`MAX_BACKLINK_CHAIN_DEPTH`].
	pub fn map_links(
		&self,
		storage: &dyn Storage,
		start_table: TableKey,
		start: ObjKey,
		visitor: &mut dyn FnMut(ObjKey) -> bool,
	) -> bool {
		self.walk(storage, start_table, start, 0, visitor)
	}

	fn walk(
		&self,
		storage: &dyn Storage,
		table: TableKey,
		key: ObjKey,
		hop_idx: usize,
		visitor: &mut dyn FnMut(ObjKey) -> bool,
	) -> bool {
		if hop_idx >= MAX_BACKLINK_CHAIN_DEPTH {
			return true;
		}
		let Some(hop) = self.hops.get(hop_idx) else {
			return visitor(key);
		};
		let obj = storage.object(table, key);
		match hop.kind {
			LinkKind::Single => match obj.get(hop.column) {
				Value::Link(target) => self.walk(storage, hop.to_table, target, hop_idx + 1, visitor),
				_ => true,
			},
			LinkKind::List => {
				if let Value::List(items) = obj.get(hop.column) {
					for item in items {
						if let Value::Link(target) = item {
							if !self.walk(storage, hop.to_table, target, hop_idx + 1, visitor) {
								return false;
							}
						}
					}
				}
				true
			}
			LinkKind::Backlink => {
				for origin in obj.get_backlinks(hop.column) {
					if !self.walk(storage, hop.to_table, origin, hop_idx + 1, visitor) {
						return false;
					}
				}
				true
			}
		}
	}

	/// Collects every key reached at the end of the chain into a `Vec`, in
	/// traversal order. A convenience wrapper around [`map_links`] for
	/// callers (the expression engine, mostly) that need the full set
	/// rather than a short-circuiting visitor.
	pub fn collect(&self, storage: &dyn Storage, start_table: TableKey, start: ObjKey) -> Vec<ObjKey> {
		let mut out = Vec::new();
		self.map_links(storage, start_table, start, &mut |k| {
			out.push(k);
			true
		});
		out
	}

	/// Walks the chain one hop at a time starting from `start`, calling
	/// `visitor` once per hop with the table it lands in and the full set of
	/// keys reached at that level by fanning every key of the previous level
	/// through the hop. An `Include` reporter built on this must emit one
	/// set per hop of a chain (e.g. the single-element sets
	/// {John},{Mark},{Jonathan},{Eli} for a four-hop backlink chain) — not
	/// just the chain's final, flattened result. Duplicate keys reached by
	/// different branches of a fan-out are kept as-is; callers that want a
	/// true set can dedupe the slice themselves.
	pub fn walk_levels(&self, storage: &dyn Storage, start_table: TableKey, start: ObjKey, visitor: &mut dyn FnMut(TableKey, &[ObjKey])) {
		let mut frontier = vec![start];
		let mut table = start_table;
		for hop in &self.hops {
			let mut next = Vec::new();
			for key in &frontier {
				let obj = storage.object(table, *key);
				match hop.kind {
					LinkKind::Single => {
						if let Value::Link(target) = obj.get(hop.column) {
							next.push(target);
						}
					}
					LinkKind::List => {
						if let Value::List(items) = obj.get(hop.column) {
							for item in items {
								if let Value::Link(target) = item {
									next.push(target);
								}
							}
						}
					}
					LinkKind::Backlink => {
						next.extend(obj.get_backlinks(hop.column));
					}
				}
			}
			table = hop.to_table;
			visitor(table, &next);
			frontier = next;
		}
	}
}
