//! The parser's intermediate representation: a direct shape of the surface
//! grammar, lowered into a [`crate::node::Node`] tree and
//! [`crate::ordering::DescriptorOrdering`] by [`super::builder`]. Kept
//! separate from the final `Query`/`Node` types so the grammar
//! (`super::grammar`) never has to know about storage, schemas, or cost
//! statistics.

use crate::expr::AggKind;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
	Field(String),
	/// `@links.<Class>.<prop>`: a backlink hop named from the origin side.
	Backlink { class: String, prop: String },
	/// `@min`/`@max`/`@sum`/`@avg` embedded mid-path, e.g. `items.@sum.price`:
	/// folds the list reached so far, with any remaining segments resolved
	/// per-element before the fold.
	Agg(AggKind),
	/// `$name` as the first segment of a path inside a `SUBQUERY` predicate,
	/// referring to the bound element itself rather than a caller argument.
	SelfVar(String),
}

pub type PathAst = Vec<PathSegment>;

#[derive(Debug, Clone, PartialEq)]
pub enum ValueAst {
	Literal(Value),
	/// `$N`, resolved against the caller's argument list at build time.
	Arg(usize),
	/// `T<seconds>:<nanoseconds>`, kept unvalidated until build time since
	/// the surface grammar allows a syntactically negative nanosecond part
	/// that must be rejected as `Error::OutOfRange`.
	TimestampRaw { seconds: i64, nanoseconds: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOpAst {
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
	Contains,
	BeginsWith,
	EndsWith,
	Like,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantifierAst {
	Any,
	All,
	None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirAst {
	Asc,
	Desc,
}

#[derive(Debug, Clone)]
pub enum PredicateAst {
	/// `TRUEPREDICATE`: matches every row.
	True,
	Compare {
		path: PathAst,
		op: CmpOpAst,
		case_insensitive: bool,
		value: ValueAst,
		quantifier: Option<QuantifierAst>,
	},
	In {
		path: PathAst,
		case_insensitive: bool,
		values: Vec<ValueAst>,
	},
	/// `path.@count OP value` / `path.@size OP value`.
	Count {
		path: PathAst,
		op: CmpOpAst,
		value: ValueAst,
	},
	/// `SUBQUERY(list, $var, predicate).@count OP value`.
	Subquery {
		list: PathAst,
		var: String,
		predicate: Box<PredicateAst>,
		op: CmpOpAst,
		value: ValueAst,
	},
	Not(Box<PredicateAst>),
	And(Vec<PredicateAst>),
	Or(Vec<PredicateAst>),
}

#[derive(Debug, Clone)]
pub enum DescriptorAst {
	Sort(Vec<(PathAst, SortDirAst)>),
	Distinct(Vec<PathAst>),
	Limit(i64),
	Include(PathAst),
}
