//! Expression engine: arithmetic/comparison over column expressions,
//! including `SUBQUERY`, link/backlink columns, and aggregates over lists.

use crate::fmt::format_value;
use crate::key::{ColKey, ObjKey, TableKey};
use crate::linkmap::LinkMap;
use crate::node::StorageHandle;
use crate::query::Query;
use crate::value::Value;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
	Min,
	Max,
	Sum,
	Avg,
	Count,
}

impl AggKind {
	pub fn symbol(self) -> &'static str {
		match self {
			AggKind::Min => "@min",
			AggKind::Max => "@max",
			AggKind::Sum => "@sum",
			AggKind::Avg => "@avg",
			AggKind::Count => "@count",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
	Add,
	Sub,
	Mul,
}

impl ArithOp {
	fn symbol(self) -> &'static str {
		match self {
			ArithOp::Add => "+",
			ArithOp::Sub => "-",
			ArithOp::Mul => "*",
		}
	}
}

/// A key-path expression: zero or more link hops followed optionally by a
/// terminal column read. A zero-hop path with a column is a plain column
/// reference on the base row; a path ending without a column (used under
/// `@count`/`@size`) evaluates to the set of keys the chain reached.
#[derive(Debug, Clone)]
pub struct PathExpr {
	pub path: String,
	pub link_map: LinkMap,
	pub column: Option<ColKey>,
}

/// `SUBQUERY(list, $var, predicate)`: a fresh node tree bound to the
/// element type of `list`, with `$var` mapped to the element's
/// self-key. `predicate` is wrapped in a `RefCell` because evaluating it
/// mutates its nodes' cost statistics (`Query::matches_object` needs
/// `&mut self`) while [`Expr::evaluate`] only borrows `&self`.
pub struct SubqueryExpr {
	pub path: String,
	pub var_name: String,
	pub link_map: LinkMap,
	pub element_table: TableKey,
	pub predicate: RefCell<Box<Query>>,
}

impl fmt::Debug for SubqueryExpr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SubqueryExpr").field("path", &self.path).field("var_name", &self.var_name).finish()
	}
}

impl Clone for SubqueryExpr {
	fn clone(&self) -> Self {
		SubqueryExpr {
			path: self.path.clone(),
			var_name: self.var_name.clone(),
			link_map: self.link_map.clone(),
			element_table: self.element_table,
			predicate: RefCell::new(self.predicate.borrow().clone()),
		}
	}
}

/// The expression tree. Literals are pre-resolved at build time (argument
/// substitution, `$N`, happens in [`crate::parser`] before an `Expr` is
/// ever constructed), so there is no runtime `Arg` variant.
#[derive(Debug, Clone)]
pub enum Expr {
	Literal(Value),
	Path(PathExpr),
	/// `.@count`/`.@size`: defined on lists, strings, and binaries.
	Count(Box<Expr>),
	/// `@min`/`@max`/`@sum`/`@avg` over a list-valued inner expression.
	Agg(AggKind, Box<Expr>),
	Arith(ArithOp, Box<Expr>, Box<Expr>),
	Subquery(SubqueryExpr),
}

impl Expr {
	/// Evaluates this expression against `obj`, an object of `table`.
	pub fn evaluate(&self, storage: &StorageHandle, table: TableKey, obj: ObjKey) -> Value {
		match self {
			Expr::Literal(v) => v.clone(),
			Expr::Path(p) => {
				let keys = if p.link_map.is_empty() {
					vec![obj]
				} else {
					p.link_map.collect(storage.as_ref(), table, obj)
				};
				let target_table = p.link_map.target_table(table);
				let values: Vec<Value> = keys
					.iter()
					.map(|k| match p.column {
						Some(col) => storage.object(target_table, *k).get(col),
						None => Value::Link(*k),
					})
					.collect();
				if p.link_map.is_non_unary() {
					Value::List(values)
				} else {
					values.into_iter().next().unwrap_or(Value::Null)
				}
			}
			Expr::Count(inner) => {
				let v = inner.evaluate(storage, table, obj);
				Value::Int(v.count_size().unwrap_or(0))
			}
			Expr::Agg(kind, inner) => {
				let v = inner.evaluate(storage, table, obj);
				let list = match v {
					Value::List(items) => items,
					other => vec![other],
				};
				fold_aggregate(*kind, &list)
			}
			Expr::Arith(op, l, r) => {
				let lv = l.evaluate(storage, table, obj);
				let rv = r.evaluate(storage, table, obj);
				arith_eval(*op, &lv, &rv)
			}
			Expr::Subquery(sq) => {
				let elements = sq.link_map.collect(storage.as_ref(), table, obj);
				let mut matched = Vec::new();
				for elem in elements {
					let hit = sq.predicate.borrow_mut().matches_object(storage, sq.element_table, elem);
					if hit {
						matched.push(Value::Link(elem));
					}
				}
				Value::List(matched)
			}
		}
	}

	/// Constant-folds literal-only subtrees at build time.
	/// `Path`/`Subquery` always carry per-row state so they
	/// never fold; an `Arith`/`Agg`/`Count` whose operands all fold down to
	/// `Literal` gets pre-evaluated once here instead of every matching row.
	pub fn fold_constants(self) -> Expr {
		match self {
			Expr::Arith(op, l, r) => {
				let l = l.fold_constants();
				let r = r.fold_constants();
				if let (Expr::Literal(lv), Expr::Literal(rv)) = (&l, &r) {
					Expr::Literal(arith_eval(op, lv, rv))
				} else {
					Expr::Arith(op, Box::new(l), Box::new(r))
				}
			}
			Expr::Agg(kind, inner) => {
				let inner = inner.fold_constants();
				if let Expr::Literal(v) = &inner {
					let list = match v {
						Value::List(items) => items.clone(),
						other => vec![other.clone()],
					};
					Expr::Literal(fold_aggregate(kind, &list))
				} else {
					Expr::Agg(kind, Box::new(inner))
				}
			}
			Expr::Count(inner) => {
				let inner = inner.fold_constants();
				if let Expr::Literal(v) = &inner {
					Expr::Literal(Value::Int(v.count_size().unwrap_or(0)))
				} else {
					Expr::Count(Box::new(inner))
				}
			}
			other => other,
		}
	}
}

impl fmt::Display for Expr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Expr::Literal(v) => write!(f, "{}", format_value(v)),
			Expr::Path(p) => write!(f, "{}", p.path),
			Expr::Count(inner) => write!(f, "{inner}.@count"),
			Expr::Agg(kind, inner) => write!(f, "{inner}.{}", kind.symbol()),
			Expr::Arith(op, l, r) => write!(f, "({l} {} {r})", op.symbol()),
			Expr::Subquery(sq) => write!(f, "SUBQUERY({}, ${}, {}).@count", sq.path, sq.var_name, sq.predicate.borrow().describe()),
		}
	}
}

/// `add_int`-style two's-complement wraparound for integer arithmetic:
/// overflow never raises. Mixed-numeric operands widen to `f64` (division
/// and other unsafe operations are absent from the surface entirely, so
/// only `+`/`-`/`*` exist here).
fn arith_eval(op: ArithOp, lhs: &Value, rhs: &Value) -> Value {
	if lhs.is_null() || rhs.is_null() {
		return Value::Null;
	}
	if let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) {
		if matches!(lhs, Value::Int(_)) && matches!(rhs, Value::Int(_)) {
			let result = match op {
				ArithOp::Add => a.wrapping_add(b),
				ArithOp::Sub => a.wrapping_sub(b),
				ArithOp::Mul => a.wrapping_mul(b),
			};
			return Value::Int(result);
		}
	}
	match (lhs.as_f64(), rhs.as_f64()) {
		(Some(a), Some(b)) => {
			let result = match op {
				ArithOp::Add => a + b,
				ArithOp::Sub => a - b,
				ArithOp::Mul => a * b,
			};
			Value::Double(result)
		}
		_ => Value::Null,
	}
}

/// Folds `values` per `kind`. `@sum` over an empty list is its additive
/// identity (`0`); `@min`/`@max`/`@avg` over an empty list return the
/// undefined sentinel (`Value::Null`).
pub fn fold_aggregate(kind: AggKind, values: &[Value]) -> Value {
	match kind {
		AggKind::Count => Value::Int(values.len() as i64),
		AggKind::Sum => sum_or_avg(values, false),
		AggKind::Avg => sum_or_avg(values, true),
		AggKind::Min => extremum(values, true),
		AggKind::Max => extremum(values, false),
	}
}

fn all_int(values: &[Value]) -> bool {
	!values.is_empty() && values.iter().all(|v| matches!(v, Value::Int(_)))
}

fn sum_or_avg(values: &[Value], avg: bool) -> Value {
	if values.is_empty() {
		return if avg { Value::Null } else { Value::Int(0) };
	}
	if all_int(values) && !avg {
		let total = values.iter().fold(0i64, |acc, v| acc.wrapping_add(v.as_i64().unwrap_or(0)));
		return Value::Int(total);
	}
	let total: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
	if avg {
		Value::Double(total / values.len() as f64)
	} else {
		Value::Double(total)
	}
}

fn extremum(values: &[Value], want_min: bool) -> Value {
	if values.is_empty() {
		return Value::Null;
	}
	values
		.iter()
		.cloned()
		.reduce(|a, b| {
			let ord = a.cmp(&b);
			let take_b = if want_min { ord == Ordering::Greater } else { ord == Ordering::Less };
			if take_b {
				b
			} else {
				a
			}
		})
		.unwrap()
}

/// A `Query::aggregate(spec) -> Mixed` request: fold `kind` over `expr`
/// evaluated at every matching row, or (when `expr` is `None`) simply the
/// match count.
#[derive(Debug, Clone)]
pub struct AggregateSpec {
	pub kind: AggKind,
	pub expr: Option<Expr>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::DataType;
	use crate::linkmap::{LinkHop, LinkKind};
	use crate::storage::testutil::{ColumnSpec, FakeStorage};
	use std::rc::Rc;

	#[test]
	fn sum_over_list_link_prices() {
		let mut s = FakeStorage::new();
		let item = s.add_table("Item", vec![ColumnSpec::scalar("price", DataType::Double)], None, 10);
		let person = s.add_table("Person", vec![ColumnSpec::list_link("items", "Item")], None, 10);
		s.link_target(person, "items", item);
		let prices = [5.5, 4.0, 9.5, 6.5];
		let keys: Vec<_> = prices.iter().map(|p| s.push_row(item, vec![Value::Double(*p)])).collect();
		s.push_row(person, vec![Value::List(keys.iter().map(|k| Value::Link(*k)).collect())]);
		s.finalize();

		let items_col = s.column(person, "items");
		let price_col = s.column(item, "price");
		let mut map = LinkMap::new();
		map.push(LinkHop {
			from_table: person,
			column: items_col,
			kind: LinkKind::List,
			to_table: item,
		});
		let path = Expr::Path(PathExpr {
			path: "items.price".to_string(),
			link_map: map,
			column: Some(price_col),
		});
		let sum_expr = Expr::Agg(AggKind::Sum, Box::new(path));
		let storage: StorageHandle = Rc::new(s);
		let total = sum_expr.evaluate(&storage, person, ObjKey::new(0));
		assert_eq!(total, Value::Double(25.5));
	}

	#[test]
	fn count_on_empty_list_is_zero() {
		let mut s = FakeStorage::new();
		let t = s.add_table("Person", vec![ColumnSpec::list_link("items", "Item").nullable()], None, 10);
		s.push_row(t, vec![Value::List(vec![])]);
		let items_col = s.column(t, "items");
		let path = Expr::Path(PathExpr {
			path: "items".to_string(),
			link_map: LinkMap::new(),
			column: Some(items_col),
		});
		let count_expr = Expr::Count(Box::new(path));
		let storage: StorageHandle = Rc::new(s);
		assert_eq!(count_expr.evaluate(&storage, t, ObjKey::new(0)), Value::Int(0));
	}

	#[test]
	fn int_addition_wraps_on_overflow() {
		let result = arith_eval(ArithOp::Add, &Value::Int(i64::MAX), &Value::Int(1));
		assert_eq!(result, Value::Int(i64::MIN));
	}

	#[test]
	fn avg_over_empty_list_is_undefined_sentinel() {
		assert_eq!(fold_aggregate(AggKind::Avg, &[]), Value::Null);
		assert_eq!(fold_aggregate(AggKind::Count, &[]), Value::Int(0));
	}
}
