//! In-memory fake storage implementing the external trait seams, used by
//! this crate's own tests and exported so embedders can exercise the query
//! engine without a real storage backend.

use crate::key::{ColAttr, ColKey, DataType, ObjKey, Row, TableKey};
use crate::storage::{Cluster, Index, IndexLookup, Leaf, Object, Schema, Storage};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Declares one column when building a [`FakeStorage`] table.
#[derive(Clone)]
pub struct ColumnSpec {
	pub name: &'static str,
	pub data_type: DataType,
	pub attr: ColAttr,
	/// For link/backlink columns, the name of the table their keys point
	/// into.
	pub target_table: Option<&'static str>,
}

impl ColumnSpec {
	pub fn scalar(name: &'static str, data_type: DataType) -> Self {
		ColumnSpec {
			name,
			data_type,
			attr: ColAttr::empty(),
			target_table: None,
		}
	}

	pub fn nullable(mut self) -> Self {
		self.attr |= ColAttr::NULLABLE;
		self
	}

	pub fn indexed(mut self) -> Self {
		self.attr |= ColAttr::INDEXED;
		self
	}

	pub fn list(mut self) -> Self {
		self.attr |= ColAttr::LIST;
		self
	}

	pub fn link(name: &'static str, target_table: &'static str) -> Self {
		ColumnSpec {
			name,
			data_type: DataType::ObjKey,
			attr: ColAttr::empty(),
			target_table: Some(target_table),
		}
	}

	pub fn list_link(name: &'static str, target_table: &'static str) -> Self {
		Self::link(name, target_table).list()
	}

	/// A backlink column: the inverse of `origin_column` on `origin_table`.
	pub fn backlink(name: &'static str, origin_table: &'static str) -> Self {
		ColumnSpec {
			name,
			data_type: DataType::ObjKey,
			attr: ColAttr::LIST | ColAttr::BACKLINK,
			target_table: Some(origin_table),
		}
	}
}

#[derive(Debug)]
struct TableData {
	name: String,
	columns: Vec<(String, ColKey)>,
	primary_key: Option<ColKey>,
	/// column id -> values, indexed by global row number.
	rows: RefCell<HashMap<u32, Vec<Value>>>,
	len: RefCell<usize>,
	cluster_size: usize,
	version: u64,
	targets: HashMap<u32, TableKey>,
	/// backlink column id -> (origin table, origin column name)
	backlink_defs: HashMap<u32, (TableKey, String)>,
	/// backlink column id -> (target row -> origin keys in ascending order)
	backlinks: RefCell<HashMap<u32, HashMap<ObjKey, Vec<ObjKey>>>>,
}

/// An in-memory snapshot. Tables are split into fixed-size clusters so
/// multi-cluster, cluster-ascending scanning is actually exercised by
/// tests, not just single-cluster tables.
#[derive(Default, Debug)]
pub struct FakeStorage {
	tables: HashMap<TableKey, Rc<TableData>>,
	names: HashMap<String, TableKey>,
	next_table: u32,
}

impl FakeStorage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Declares a table with the given columns and cluster size (rows per
	/// cluster; use a small number like 2 or 3 to exercise cluster
	/// transitions).
	pub fn add_table(
		&mut self,
		name: &'static str,
		columns: Vec<ColumnSpec>,
		primary_key: Option<&'static str>,
		cluster_size: usize,
	) -> TableKey {
		let key = TableKey(self.next_table);
		self.next_table += 1;

		let mut col_keys = Vec::with_capacity(columns.len());
		let mut targets = HashMap::new();
		let mut backlink_defs = HashMap::new();
		for (id, spec) in columns.iter().enumerate() {
			let id = id as u32;
			let col = ColKey::new(id, spec.data_type, spec.attr);
			col_keys.push((spec.name.to_string(), col));
			if let Some(target) = spec.target_table {
				if spec.attr.contains(ColAttr::BACKLINK) {
					// `target` here names the origin table; the caller
					// wires the origin column name via `set_backlink_origin`.
					backlink_defs.insert(id, (TableKey(u32::MAX), target.to_string()));
				} else if let Some(&t) = self.names.get(target) {
					targets.insert(id, t);
				}
			}
		}

		let pk = primary_key.and_then(|n| col_keys.iter().find(|(cn, _)| cn == n).map(|(_, c)| *c));

		let data = TableData {
			name: name.to_string(),
			columns: col_keys,
			primary_key: pk,
			rows: RefCell::new(HashMap::new()),
			len: RefCell::new(0),
			cluster_size: cluster_size.max(1),
			version: 0,
			targets,
			backlink_defs,
			backlinks: RefCell::new(HashMap::new()),
		};
		self.tables.insert(key, Rc::new(data));
		self.names.insert(name.to_string(), key);
		key
	}

	pub fn column(&self, table: TableKey, name: &str) -> ColKey {
		let t = &self.tables[&table];
		t.columns.iter().find(|(n, _)| n == name).map(|(_, c)| *c).unwrap_or_else(|| {
			panic!("no such column `{name}` on table `{}`", t.name);
		})
	}

	/// Appends a row; `values` must be given in column-declaration order.
	/// Returns the new row's `ObjKey` (its global row index).
	pub fn push_row(&mut self, table: TableKey, values: Vec<Value>) -> ObjKey {
		let t = self.tables.get_mut(&table).expect("unknown table");
		let mut rows = t.rows.borrow_mut();
		let mut len = t.len.borrow_mut();
		let row = *len;
		for (col, value) in t.columns.iter().map(|(_, c)| c.id).zip(values) {
			rows.entry(col).or_default().push(value);
		}
		*len += 1;
		ObjKey::new(row as i64)
	}

	/// Resolves a forward link's target table now that it has been
	/// declared (needed because `add_table` runs before later tables
	/// exist).
	pub fn link_target(&mut self, table: TableKey, column: &str, target: TableKey) {
		let t = Rc::get_mut(self.tables.get_mut(&table).unwrap()).expect("table already shared");
		let id = t.columns.iter().find(|(n, _)| n == column).unwrap().1.id;
		t.targets.insert(id, target);
	}

	/// Declares that backlink column `name` on `table` is the inverse of
	/// `origin_column` on the origin table named when the backlink column
	/// was declared via [`ColumnSpec::backlink`].
	pub fn set_backlink_origin(&mut self, table: TableKey, name: &str, origin_column: &'static str) {
		let t = Rc::get_mut(self.tables.get_mut(&table).unwrap()).expect("table already shared");
		let id = t.columns.iter().find(|(n, _)| n == name).unwrap().1.id;
		let origin_table_name = t.backlink_defs.get(&id).unwrap().1.clone();
		let origin_table = *self.names.get(&origin_table_name).unwrap();
		t.backlink_defs.insert(id, (origin_table, origin_column.to_string()));
	}

	/// Computes backlink adjacency for every backlink column. Must be
	/// called once after all rows across all tables have been pushed.
	pub fn finalize(&mut self) {
		let table_keys: Vec<TableKey> = self.tables.keys().copied().collect();
		for table in table_keys {
			let (backlink_defs, table_name): (Vec<(u32, TableKey, String)>, String) = {
				let t = &self.tables[&table];
				(
					t.backlink_defs
						.iter()
						.map(|(id, (ot, oc))| (*id, *ot, oc.clone()))
						.collect(),
					t.name.clone(),
				)
			};
			for (col_id, origin_table, origin_column) in backlink_defs {
				let origin = self.tables[&origin_table].clone();
				let origin_col = origin
					.columns
					.iter()
					.find(|(n, _)| n == &origin_column)
					.unwrap_or_else(|| panic!("no column `{origin_column}` on origin table"))
					.1;
				let origin_rows = origin.rows.borrow();
				let origin_len = *origin.len.borrow();
				let values = origin_rows.get(&origin_col.id);
				let mut adjacency: HashMap<ObjKey, Vec<ObjKey>> = HashMap::new();
				if let Some(values) = values {
					for row in 0..origin_len {
						let origin_key = ObjKey::new(row as i64);
						match &values[row] {
							Value::Link(target) => {
								adjacency.entry(*target).or_default().push(origin_key);
							}
							Value::List(items) => {
								for item in items {
									if let Value::Link(target) = item {
										adjacency.entry(*target).or_default().push(origin_key);
									}
								}
							}
							Value::Null => {}
							other => panic!("backlink origin column must be a link, got {other:?}"),
						}
					}
				}
				let t = &self.tables[&table];
				t.backlinks.borrow_mut().insert(col_id, adjacency);
				let _ = &table_name;
			}
		}
	}
}

impl Storage for FakeStorage {
	fn clusters(&self, table: TableKey) -> Vec<Box<dyn Cluster>> {
		let t = self.tables[&table].clone();
		let len = *t.len.borrow();
		let mut out = Vec::new();
		let mut start = 0;
		while start < len {
			let end = (start + t.cluster_size).min(len);
			out.push(Box::new(FakeCluster {
				table: t.clone(),
				start,
				end,
			}) as Box<dyn Cluster>);
			start = end;
		}
		out
	}

	fn table_version(&self, table: TableKey) -> u64 {
		self.tables[&table].version
	}

	fn schema(&self, table: TableKey) -> &dyn Schema {
		self.tables[&table].as_ref()
	}

	fn object(&self, table: TableKey, key: ObjKey) -> Box<dyn Object> {
		Box::new(FakeObject {
			table: self.tables[&table].clone(),
			key,
		})
	}

	fn index(&self, table: TableKey, col: ColKey) -> Option<Box<dyn Index>> {
		if !col.is_indexed() {
			return None;
		}
		let t = self.tables[&table].clone();
		Some(Box::new(FakeIndex { table: t, col }))
	}

	fn resolve_table(&self, name: &str) -> Option<TableKey> {
		self.names.get(name).copied()
	}
}

impl Schema for TableData {
	fn resolve_column(&self, name: &str) -> Option<ColKey> {
		self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| *c)
	}

	fn column_name(&self, col: ColKey) -> Option<&str> {
		self.columns.iter().find(|(_, c)| c.id == col.id).map(|(n, _)| n.as_str())
	}

	fn columns(&self) -> Vec<ColKey> {
		self.columns.iter().map(|(_, c)| *c).collect()
	}

	fn primary_key(&self) -> Option<ColKey> {
		self.primary_key
	}

	fn target_table(&self, col: ColKey) -> Option<TableKey> {
		self.targets.get(&col.id).copied()
	}

	fn table_name(&self) -> &str {
		&self.name
	}

	fn resolve_backlink(&self, origin_table: TableKey, origin_column: &str) -> Option<ColKey> {
		self.backlink_defs
			.iter()
			.find(|(_, (ot, oc))| *ot == origin_table && oc == origin_column)
			.and_then(|(id, _)| self.columns.iter().find(|(_, c)| c.id == *id).map(|(_, c)| *c))
	}
}

#[derive(Debug)]
struct FakeCluster {
	table: Rc<TableData>,
	start: Row,
	end: Row,
}

impl Cluster for FakeCluster {
	fn len(&self) -> usize {
		self.end - self.start
	}

	fn get_real_key(&self, row: Row) -> ObjKey {
		ObjKey::new((self.start + row) as i64)
	}

	fn lower_bound_key(&self, key: ObjKey) -> Row {
		let global = key.raw().max(0) as usize;
		global.saturating_sub(self.start).min(self.len())
	}

	fn leaf(&self, col: ColKey) -> Box<dyn Leaf + '_> {
		Box::new(FakeLeaf {
			table: self.table.clone(),
			col,
			start: self.start,
			end: self.end,
		})
	}
}

#[derive(Debug)]
struct FakeLeaf {
	table: Rc<TableData>,
	col: ColKey,
	start: Row,
	end: Row,
}

impl Leaf for FakeLeaf {
	fn get(&self, row: Row) -> Value {
		let rows = self.table.rows.borrow();
		rows.get(&self.col.id)
			.and_then(|v| v.get(self.start + row))
			.cloned()
			.unwrap_or(Value::Null)
	}

	fn size(&self) -> usize {
		self.end - self.start
	}

	fn find_first(&self, value: &Value, start: Row, end: Row) -> Option<Row> {
		let rows = self.table.rows.borrow();
		let col = rows.get(&self.col.id)?;
		for row in start..end.min(self.end - self.start) {
			if &col[self.start + row] == value {
				return Some(row);
			}
		}
		None
	}

	fn lower_bound_key(&self, key: ObjKey) -> Row {
		let global = key.raw().max(0) as usize;
		global.saturating_sub(self.start).min(self.end - self.start)
	}
}

#[derive(Debug)]
struct FakeObject {
	table: Rc<TableData>,
	key: ObjKey,
}

impl Object for FakeObject {
	fn get(&self, col: ColKey) -> Value {
		let rows = self.table.rows.borrow();
		rows.get(&col.id)
			.and_then(|v| v.get(self.key.raw() as usize))
			.cloned()
			.unwrap_or(Value::Null)
	}

	fn get_backlinks(&self, col: ColKey) -> Vec<ObjKey> {
		self.table
			.backlinks
			.borrow()
			.get(&col.id)
			.and_then(|adj| adj.get(&self.key))
			.cloned()
			.unwrap_or_default()
	}

	fn get_target_table(&self, col: ColKey) -> Option<TableKey> {
		self.table.targets.get(&col.id).copied()
	}
}

#[derive(Debug)]
struct FakeIndex {
	table: Rc<TableData>,
	col: ColKey,
}

impl FakeIndex {
	fn matches(&self, value: &Value, case_insensitive: bool) -> Vec<ObjKey> {
		let rows = self.table.rows.borrow();
		let mut out = Vec::new();
		if let Some(col) = rows.get(&self.col.id) {
			for (row, v) in col.iter().enumerate() {
				let hit = if case_insensitive {
					match (v, value) {
						(Value::String(a), Value::String(b)) => a.to_lowercase() == b.to_lowercase(),
						_ => v == value,
					}
				} else {
					v == value
				};
				if hit {
					out.push(ObjKey::new(row as i64));
				}
			}
		}
		out.sort();
		out
	}
}

impl Index for FakeIndex {
	fn find_first(&self, value: &Value) -> Option<ObjKey> {
		self.matches(value, false).into_iter().next()
	}

	fn find_all(&self, value: &Value, case_insensitive: bool) -> Vec<ObjKey> {
		self.matches(value, case_insensitive)
	}

	fn find_all_no_copy(&self, value: &Value) -> IndexLookup {
		let m = self.matches(value, false);
		match m.len() {
			0 => IndexLookup::NotFound,
			1 => IndexLookup::Single(m[0]),
			n => IndexLookup::Column(m, 0, n),
		}
	}
}
