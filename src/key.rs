//! Stable identifiers: `TableKey`, `ObjKey`, `ColKey`.
//!
//! These are opaque handles into the storage layer; the query engine
//! never interprets their bit layout beyond what is documented here.

use bitflags::bitflags;
use std::fmt;

/// Identifies a table within the snapshot. Opaque and totally ordered so it
/// can be used as a map key without the engine caring what it encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableKey(pub u32);

impl fmt::Display for TableKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "table#{}", self.0)
	}
}

/// A signed 63-bit stable object identifier. The storage layer is free to
/// pack a cluster offset into the high bits; the query engine only ever
/// compares and orders `ObjKey` values, it never decodes them itself.
///
/// `not_found` is represented out-of-band by `Option<ObjKey>` /
/// `Row::NOT_FOUND` at the row level, not by a sentinel `ObjKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjKey(i64);

impl ObjKey {
	/// Largest value representable within the documented 63-bit range.
	pub const MAX: ObjKey = ObjKey((1i64 << 62) - 1);

	/// Constructs an `ObjKey` from a raw value.
	///
	/// # Panics
	/// Panics if `raw` does not fit in 63 bits (i.e. is negative, since the
	/// storage layer never hands out negative keys for real objects).
	pub fn new(raw: i64) -> Self {
		assert!(raw >= 0 && raw <= Self::MAX.0, "ObjKey out of range: {raw}");
		ObjKey(raw)
	}

	pub fn raw(self) -> i64 {
		self.0
	}
}

impl fmt::Display for ObjKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// A row index within a cluster's local numbering. `find_first_local`
/// operates in this space; `Cluster::get_real_key` converts it to an
/// `ObjKey`.
pub type Row = usize;

/// The distinguished sentinel meaning "no match in the requested range".
/// Chosen as `usize::MAX`, the maximum representable row index.
pub const NOT_FOUND: Row = usize::MAX;

/// The scalar data types a column can carry. `List<T>` and `Backlink` are
/// modifiers layered on top via [`ColAttr`], not separate `DataType`
/// variants, mirroring how the source's attribute bitmask keeps "is a list"
/// orthogonal to "element type".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
	Int,
	Bool,
	Float,
	Double,
	String,
	Binary,
	Timestamp,
	ObjKey,
	Mixed,
}

impl fmt::Display for DataType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			DataType::Int => "int",
			DataType::Bool => "bool",
			DataType::Float => "float",
			DataType::Double => "double",
			DataType::String => "string",
			DataType::Binary => "binary",
			DataType::Timestamp => "timestamp",
			DataType::ObjKey => "link",
			DataType::Mixed => "mixed",
		};
		write!(f, "{s}")
	}
}

bitflags! {
	/// Column attributes, kept as a bitmask (a `col_key` carries its
	/// nullability, list-ness, and indexedness as flags rather than as
	/// separate fields).
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct ColAttr: u8 {
		/// The column stores a `List<T>` rather than a scalar `T`.
		const LIST      = 0b0000_0001;
		/// The column may hold a null value.
		const NULLABLE  = 0b0000_0010;
		/// Links through this column keep their target object alive
		/// (strong link semantics, as opposed to a weak/dangling-tolerant
		/// link).
		const STRONG_LINKS = 0b0000_0100;
		/// A secondary (search) index exists over this column.
		const INDEXED   = 0b0000_1000;
		/// The column is the inverse side of a forward link elsewhere
		/// (a backlink column); `DataType` is irrelevant for these, the
		/// values are always `ObjKey`s of the referencing objects.
		const BACKLINK  = 0b0001_0000;
	}
}

/// Identifies a column within a table. Carries enough of the schema inline
/// that condition nodes and expressions do not need to round-trip through
/// `Schema` for routine questions like "is this a list" or "is this
/// indexed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColKey {
	pub id: u32,
	pub data_type: DataType,
	pub attr: ColAttr,
}

impl ColKey {
	pub fn new(id: u32, data_type: DataType, attr: ColAttr) -> Self {
		ColKey {
			id,
			data_type,
			attr,
		}
	}

	pub fn is_list(&self) -> bool {
		self.attr.contains(ColAttr::LIST)
	}

	pub fn is_nullable(&self) -> bool {
		self.attr.contains(ColAttr::NULLABLE)
	}

	pub fn is_indexed(&self) -> bool {
		self.attr.contains(ColAttr::INDEXED)
	}

	pub fn is_backlink(&self) -> bool {
		self.attr.contains(ColAttr::BACKLINK)
	}
}

impl fmt::Display for ColKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "col#{}:{}", self.id, self.data_type)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn objkey_ordering_is_total() {
		let a = ObjKey::new(1);
		let b = ObjKey::new(2);
		assert!(a < b);
		assert_eq!(a, ObjKey::new(1));
	}

	#[test]
	#[should_panic]
	fn objkey_rejects_negative() {
		ObjKey::new(-1);
	}

	#[test]
	fn col_attr_bitmask_combines() {
		let attr = ColAttr::LIST | ColAttr::NULLABLE;
		let col = ColKey::new(3, DataType::Int, attr);
		assert!(col.is_list());
		assert!(col.is_nullable());
		assert!(!col.is_indexed());
	}
}
