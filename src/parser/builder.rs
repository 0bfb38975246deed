//! Lowers [`super::ast`] into [`crate::node::Node`]/[`crate::query::Query`]
//! and [`crate::ordering::DescriptorOrdering`]: a single pass resolves key
//! paths against the schema, substitutes `$N` arguments, chooses the
//! cheapest node shape available for each predicate, and constant-folds the
//! leftover expression tree.
//!
//! Node-shape rule of thumb used throughout: the specialised single-column
//! nodes (`CompareNode`, `StringEqualNode`, `StringMatchNode`,
//! `BinaryMatchNode`, `CountNode`) only ever see a *direct* column on the
//! row currently being scanned — none of them understand a [`LinkMap`] hop
//! chain. A predicate whose path resolves with a non-empty link map always
//! lowers into the general [`ExpressionNode`] instead, which evaluates
//! through [`crate::expr::Expr::Path`]. This keeps the fast paths narrow and
//! gives every multi-hop predicate one correct (if not maximally fast) way
//! to evaluate.

use super::aliases::KeyPathMapping;
use super::ast::*;
use super::grammar::parse_query;
use crate::error::{Error, Result};
use crate::expr::{AggKind, AggregateSpec, Expr, PathExpr, SubqueryExpr};
use crate::key::{ColKey, DataType, TableKey};
use crate::linkmap::{LinkHop, LinkKind, LinkMap};
use crate::node::binary_match::BinaryMatchOp;
use crate::node::compare::CompareOp;
use crate::node::count_node::CountKind;
use crate::node::expression_node::Quantifier;
use crate::node::string_match::StringMatchOp;
use crate::node::{BinaryMatchNode, CompareNode, CountNode, ExpressionNode, Node, OrNode, StringEqualInsNode, StringEqualNode, StringMatchNode};
use crate::ordering::{Descriptor, DescriptorOrdering, KeyPath, SortDirection};
use crate::query::Query;
use crate::storage::{Schema, Storage};
use crate::value::Value;
use std::cell::RefCell;

/// Everything the builder needs besides the schema itself: the caller's
/// argument list, the injected alias table, and (inside a `SUBQUERY`
/// predicate) the name of the bound element variable.
struct BuildCtx<'a> {
	storage: &'a dyn Storage,
	args: &'a [Value],
	aliases: &'a KeyPathMapping,
	self_var: Option<&'a str>,
}

/// Parses `text` against `table`'s schema and lowers it into an executable
/// [`Query`] plus its [`DescriptorOrdering`] — the top-level entry point
/// embedders call.
pub fn parse(storage: &dyn Storage, table: TableKey, text: &str, args: &[Value], aliases: &KeyPathMapping) -> Result<(Query, DescriptorOrdering)> {
	let (_, (predicate_ast, descriptor_asts)) =
		parse_query(text).map_err(|_| Error::invalid_query_at("could not parse predicate", text))?;

	let ctx = BuildCtx { storage, args, aliases, self_var: None };
	let query = build_predicate(&ctx, table, &predicate_ast)?;

	let mut ordering = DescriptorOrdering::new();
	for d in &descriptor_asts {
		ordering.push(build_descriptor(&ctx, table, d)?);
	}
	Ok((query, ordering))
}

// ---------------------------------------------------------------------
// Predicate lowering
// ---------------------------------------------------------------------

fn build_predicate(ctx: &BuildCtx, table: TableKey, ast: &PredicateAst) -> Result<Query> {
	match ast {
		PredicateAst::True => Ok(Query::new()),
		PredicateAst::And(parts) => {
			let mut children = Vec::new();
			for part in parts {
				let sub = build_predicate(ctx, table, part)?;
				for child in sub.children() {
					children.push(child.clone());
				}
			}
			let children = coalesce_chained_inequalities(children);
			let children = hoist_indexed_equality(children);
			let mut q = Query::new();
			for child in children {
				q.push(child);
			}
			Ok(q)
		}
		PredicateAst::Or(parts) => {
			let mut branches: Vec<Query> = Vec::with_capacity(parts.len());
			for part in parts {
				branches.push(build_predicate(ctx, table, part)?);
			}
			branches = fuse_adjacent_string_equals(branches);
			if branches.len() == 1 {
				Ok(branches.into_iter().next().unwrap())
			} else {
				Ok(Query::from_node(Node::Or(Box::new(OrNode::new(branches)))))
			}
		}
		PredicateAst::Not(inner) => {
			let sub = build_predicate(ctx, table, inner)?;
			Ok(Query::from_node(Node::Not(Box::new(crate::node::NotNode::new(sub)))))
		}
		PredicateAst::Compare { path, op, case_insensitive, value, quantifier } => {
			build_compare(ctx, table, path, *op, *case_insensitive, value, *quantifier)
		}
		PredicateAst::In { path, case_insensitive, values } => build_in(ctx, table, path, *case_insensitive, values),
		PredicateAst::Count { path, op, value } => build_count(ctx, table, path, *op, value),
		PredicateAst::Subquery { list, var, predicate, op, value } => build_subquery(ctx, table, list, var, predicate, *op, value),
	}
}

/// When two or more `Or` branches are each a single `Equal`/`StringEqual`
/// condition on the same column, collapses them into one fused
/// `StringEqualNode` (e.g. `a=='0' or a=='1' or a=='2'` must `describe()`
/// as an `IN` form). Branches that don't qualify pass through unchanged.
fn fuse_adjacent_string_equals(branches: Vec<Query>) -> Vec<Query> {
	let mut fused: Vec<Query> = Vec::with_capacity(branches.len());
	for branch in branches {
		let as_single_equal = match branch.children() {
			[Node::StringEqual(n)] if n.is_single() => Some(n.clone()),
			_ => None,
		};
		if let Some(node) = as_single_equal {
			if let Some(last) = fused.last_mut() {
				if let [Node::StringEqual(existing)] = last.children() {
					if existing.can_merge_with(node.column_key()) {
						let mut merged = existing.clone();
						merged.merge_needles(&node);
						*last = Query::from_node(Node::StringEqual(merged));
						continue;
					}
				}
			}
		}
		fused.push(branch);
	}
	fused
}

/// Collapses adjacent `Compare` nodes that bound the same column from
/// opposite sides (`age > 2` immediately followed by `age < 4`) into one
/// [`crate::node::RangeNode`] that scans the leaf once instead of running
/// both through the conjunction's find-first loop — `spec.md`'s step (3),
/// "range coalescing of chained inequalities on the same column". Run once
/// at build time, before the node ever reaches `Query`.
fn coalesce_chained_inequalities(children: Vec<Node>) -> Vec<Node> {
	let mut out: Vec<Node> = Vec::with_capacity(children.len());
	let mut iter = children.into_iter().peekable();
	while let Some(node) = iter.next() {
		if let Node::Compare(lo) = &node {
			let should_merge = matches!(iter.peek(), Some(Node::Compare(hi)) if is_range_pair(lo, hi));
			if should_merge {
				let hi = match iter.next() {
					Some(Node::Compare(c)) => c,
					_ => unreachable!("peeked a Compare node above"),
				};
				let (lower, upper) = if lo.op().is_lower_bound() {
					((lo.op(), lo.value().clone()), (hi.op(), hi.value().clone()))
				} else {
					((hi.op(), hi.value().clone()), (lo.op(), lo.value().clone()))
				};
				out.push(Node::Range(crate::node::RangeNode::new(lo.path(), lo.column(), lower, upper)));
				continue;
			}
		}
		out.push(node);
	}
	out
}

/// Whether `lo`/`hi` are two inequalities on the same column, one bounding
/// it from below and the other from above — a coalescible range pair.
fn is_range_pair(lo: &crate::node::CompareNode, hi: &crate::node::CompareNode) -> bool {
	lo.column() == hi.column()
		&& ((lo.op().is_lower_bound() && hi.op().is_upper_bound()) || (lo.op().is_upper_bound() && hi.op().is_lower_bound()))
}

/// Moves every node whose cost tier resolves to [`crate::config::INDEXED_DT`]
/// (a single-needle `StringEqual` over an indexed column) to the front of
/// the conjunction, stable among the rest — `spec.md`'s step (4), "hoisting
/// of cheap index-backed equality to the leading position of conjunctions
/// (before cost adaptation takes over)". This runs once at build time;
/// `Query::reorder_by_cost` still re-chooses the leading node per scan
/// cycle afterwards, but starts from this hoisted order rather than
/// declaration order.
fn hoist_indexed_equality(children: Vec<Node>) -> Vec<Node> {
	let mut indexed = Vec::with_capacity(children.len());
	let mut rest = Vec::with_capacity(children.len());
	for child in children {
		if is_indexed_equality(&child) {
			indexed.push(child);
		} else {
			rest.push(child);
		}
	}
	indexed.extend(rest);
	indexed
}

fn is_indexed_equality(node: &Node) -> bool {
	matches!(node, Node::StringEqual(n) if n.is_single() && n.column_key().is_indexed())
}

fn build_compare(
	ctx: &BuildCtx,
	table: TableKey,
	path: &PathAst,
	op: CmpOpAst,
	case_insensitive: bool,
	value_ast: &ValueAst,
	quantifier: Option<QuantifierAst>,
) -> Result<Query> {
	let resolved = resolve_terminal(ctx, table, path)?;
	let value = resolve_value(ctx, value_ast)?;

	if resolved.link_map.is_empty() && resolved.agg.is_none() {
		return build_direct_compare(&resolved, op, case_insensitive, value);
	}

	let lhs = build_path_expr(ctx, table, path)?;
	let rhs = Expr::Literal(value);
	let cmp_op = compare_op(op)?;
	let q = match quantifier {
		Some(QuantifierAst::Any) | None => Quantifier::Any,
		Some(QuantifierAst::All) => Quantifier::All,
		Some(QuantifierAst::None) => Quantifier::None,
	};
	if matches!(op, CmpOpAst::Contains | CmpOpAst::BeginsWith | CmpOpAst::EndsWith | CmpOpAst::Like) {
		return Err(Error::unsupported("string/binary pattern matching over a multi-hop path is not supported; compare a resolved column directly"));
	}
	Ok(Query::from_node(fold_expression_node(lhs, cmp_op, rhs, q)))
}

/// Constant-folds both sides of a comparison before wrapping them in an
/// `ExpressionNode` — `spec.md`'s step (2), "constant folding of
/// literal-only sub-expressions", applied once at the point every predicate
/// that needs the general expression path is finalized.
fn fold_expression_node(lhs: Expr, op: CompareOp, rhs: Expr, quantifier: Quantifier) -> Node {
	let span = debug_span!("fold_constants");
	let _enter = span.enter();
	let lhs = lhs.fold_constants();
	let rhs = rhs.fold_constants();
	trace!(lhs = %lhs, rhs = %rhs, "constant-folded expression sides");
	Node::Expression(Box::new(ExpressionNode::new(lhs, op, rhs, quantifier)))
}

fn build_direct_compare(resolved: &ResolvedTerminal, op: CmpOpAst, case_insensitive: bool, value: Value) -> Result<Query> {
	let col = resolved.column;
	match (op, col.data_type, case_insensitive) {
		(CmpOpAst::Eq, DataType::String, false) => {
			let needle = expect_string(&value)?;
			Ok(Query::from_node(Node::StringEqual(StringEqualNode::new(resolved.rendered.clone(), col, needle))))
		}
		(CmpOpAst::Eq, DataType::String, true) => {
			let needle = expect_string(&value)?;
			Ok(Query::from_node(Node::StringEqualIns(StringEqualInsNode::new(resolved.rendered.clone(), col, needle))))
		}
		(CmpOpAst::Contains | CmpOpAst::BeginsWith | CmpOpAst::EndsWith | CmpOpAst::Like, DataType::String, _) => {
			let needle = expect_string(&value)?;
			Ok(Query::from_node(Node::StringMatch(StringMatchNode::new(
				resolved.rendered.clone(),
				col,
				string_match_op(op)?,
				case_insensitive,
				needle,
			))))
		}
		(CmpOpAst::Contains | CmpOpAst::BeginsWith | CmpOpAst::EndsWith, DataType::Binary, _) => {
			let needle = expect_binary(&value)?;
			Ok(Query::from_node(Node::BinaryMatch(BinaryMatchNode::new(
				resolved.rendered.clone(),
				col,
				binary_match_op(op)?,
				case_insensitive,
				needle,
			))))
		}
		(CmpOpAst::Eq, DataType::Binary, _) => {
			let needle = expect_binary(&value)?;
			Ok(Query::from_node(Node::BinaryMatch(BinaryMatchNode::new(
				resolved.rendered.clone(),
				col,
				BinaryMatchOp::Equal,
				case_insensitive,
				needle,
			))))
		}
		(CmpOpAst::Like, DataType::Binary, _) => Err(Error::unsupported("LIKE is not defined over binary columns")),
		_ => Ok(Query::from_node(Node::Compare(CompareNode::new(resolved.rendered.clone(), col, compare_op(op)?, value)))),
	}
}

fn build_in(ctx: &BuildCtx, table: TableKey, path: &PathAst, case_insensitive: bool, values: &[ValueAst]) -> Result<Query> {
	let resolved = resolve_terminal(ctx, table, path)?;
	if !resolved.link_map.is_empty() || resolved.agg.is_some() {
		return Err(Error::unsupported("IN over a multi-hop path is not supported"));
	}
	if resolved.column.data_type != DataType::String {
		return Err(Error::invalid_query_at("IN is only supported over string columns", resolved.rendered.clone()));
	}
	let needles: Result<Vec<String>> = values.iter().map(|v| resolve_value(ctx, v).and_then(|val| expect_string(&val))).collect();
	let needles = needles?;
	if case_insensitive {
		let branches: Vec<Query> = needles
			.into_iter()
			.map(|n| Query::from_node(Node::StringEqualIns(StringEqualInsNode::new(resolved.rendered.clone(), resolved.column, n))))
			.collect();
		Ok(Query::from_node(Node::Or(Box::new(OrNode::new(branches)))))
	} else {
		Ok(Query::from_node(Node::StringEqual(StringEqualNode::new_fused(resolved.rendered.clone(), resolved.column, needles))))
	}
}

fn build_count(ctx: &BuildCtx, table: TableKey, path: &PathAst, op: CmpOpAst, value_ast: &ValueAst) -> Result<Query> {
	let resolved = resolve_terminal(ctx, table, path)?;
	if resolved.agg.is_some() {
		return Err(Error::invalid_query_at("@count/@size cannot follow an aggregate segment", render_path(path)));
	}
	let value = resolve_value(ctx, value_ast)?;
	let n = match value.as_i64() {
		Some(n) => n,
		None => return Err(Error::invalid_query_at("@count/@size comparisons require an integer", resolved.rendered.clone())),
	};
	let op = compare_op(op)?;
	if resolved.link_map.is_empty() {
		let kind = if resolved.column.is_backlink() {
			CountKind::Backlink
		} else if resolved.column.is_list() {
			CountKind::List
		} else {
			CountKind::Link
		};
		Ok(Query::from_node(Node::Count(CountNode::new(resolved.rendered.clone(), resolved.column, kind, op, n))))
	} else {
		let path_expr = Expr::Path(PathExpr {
			path: resolved.rendered.clone(),
			link_map: resolved.link_map.clone(),
			column: None,
		});
		let lhs = Expr::Count(Box::new(path_expr));
		let rhs = Expr::Literal(Value::Int(n));
		Ok(Query::from_node(fold_expression_node(lhs, op, rhs, Quantifier::Any)))
	}
}

fn build_subquery(ctx: &BuildCtx, table: TableKey, list: &PathAst, var: &str, predicate: &PredicateAst, op: CmpOpAst, value_ast: &ValueAst) -> Result<Query> {
	let hops = resolve_hops(ctx, table, list)?;
	let element_table = hops.link_map.target_table(table);
	let inner_ctx = BuildCtx {
		storage: ctx.storage,
		args: ctx.args,
		aliases: ctx.aliases,
		self_var: Some(var),
	};
	let inner_query = build_predicate(&inner_ctx, element_table, predicate)?;
	let sq = SubqueryExpr {
		path: hops.rendered.clone(),
		var_name: var.to_string(),
		link_map: hops.link_map,
		element_table,
		predicate: RefCell::new(Box::new(inner_query)),
	};
	let lhs = Expr::Count(Box::new(Expr::Subquery(sq)));
	let value = resolve_value(ctx, value_ast)?;
	let rhs = Expr::Literal(value);
	Ok(Query::from_node(fold_expression_node(lhs, compare_op(op)?, rhs, Quantifier::Any)))
}

// ---------------------------------------------------------------------
// Descriptor lowering
// ---------------------------------------------------------------------

fn build_descriptor(ctx: &BuildCtx, table: TableKey, ast: &DescriptorAst) -> Result<Descriptor> {
	match ast {
		DescriptorAst::Sort(keys) => {
			let mut out = Vec::with_capacity(keys.len());
			for (path, dir) in keys {
				let resolved = resolve_terminal(ctx, table, path)?;
				if resolved.agg.is_some() {
					return Err(Error::invalid_query_at("SORT key path cannot end in an aggregate segment", render_path(path)));
				}
				let dir = match dir {
					SortDirAst::Asc => SortDirection::Ascending,
					SortDirAst::Desc => SortDirection::Descending,
				};
				out.push((KeyPath::new(resolved.rendered, resolved.link_map, resolved.column), dir));
			}
			Ok(Descriptor::Sort(out))
		}
		DescriptorAst::Distinct(keys) => {
			let mut out = Vec::with_capacity(keys.len());
			for path in keys {
				let resolved = resolve_terminal(ctx, table, path)?;
				if resolved.agg.is_some() {
					return Err(Error::invalid_query_at("DISTINCT key path cannot end in an aggregate segment", render_path(path)));
				}
				out.push(KeyPath::new(resolved.rendered, resolved.link_map, resolved.column));
			}
			Ok(Descriptor::Distinct(out))
		}
		DescriptorAst::Limit(n) => {
			if *n < 0 {
				return Err(Error::out_of_range("LIMIT must be non-negative"));
			}
			Ok(Descriptor::Limit(*n as usize))
		}
		DescriptorAst::Include(path) => {
			let hops = resolve_hops(ctx, table, path)?;
			Descriptor::include(hops.link_map)
		}
	}
}

// ---------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------

/// The result of resolving a key path down to a terminal column on
/// whatever table the path's hops land in.
struct ResolvedTerminal {
	link_map: LinkMap,
	column: ColKey,
	rendered: String,
	/// Set when the path contained a mid-path aggregate (`items.@sum.price`)
	/// — in that case `column`/`link_map` describe the *post-fold* per-row
	/// read the caller almost never wants directly; callers that can accept
	/// an aggregate should go through [`build_path_expr`] instead. Kept here
	/// only so callers like [`build_compare`] can detect the case and
	/// reroute to the general expression path.
	agg: Option<AggKind>,
}

/// Resolves `path` expecting every segment but the last to be a traversable
/// hop, and the last to name a column on the table the hops land in. Used by
/// `Compare`/`Count`/`Sort`/`Distinct` builders.
fn resolve_terminal(ctx: &BuildCtx, start_table: TableKey, path: &[PathSegment]) -> Result<ResolvedTerminal> {
	if let Some(agg_idx) = path.iter().position(|s| matches!(s, PathSegment::Agg(_))) {
		let kind = match &path[agg_idx] {
			PathSegment::Agg(k) => *k,
			_ => unreachable!(),
		};
		return Ok(ResolvedTerminal {
			link_map: LinkMap::new(),
			column: ColKey::new(0, DataType::Int, crate::key::ColAttr::empty()),
			rendered: render_path(path),
			agg: Some(kind),
		});
	}

	let mut link_map = LinkMap::new();
	let mut current_table = start_table;
	let mut rendered_parts: Vec<String> = Vec::with_capacity(path.len());
	let mut idx = 0usize;
	while idx < path.len() {
		let seg = &path[idx];
		let is_last = idx + 1 == path.len();
		match seg {
			PathSegment::SelfVar(name) => {
				verify_self_var(ctx, name)?;
				rendered_parts.push(format!("${name}"));
				idx += 1;
				continue;
			}
			PathSegment::Agg(_) => unreachable!("handled above"),
			PathSegment::Field(name) => {
				if let Some(shortcut) = ctx.aliases.resolve_backlink_shortcut(name) {
					let (hop, origin_table) = resolve_backlink_hop(ctx, current_table, &shortcut.class, &shortcut.prop)?;
					if is_last {
						return Ok(ResolvedTerminal {
							link_map,
							column: hop.column,
							rendered: finish_rendered(rendered_parts, name),
							agg: None,
						});
					}
					link_map.push(hop);
					current_table = origin_table;
					rendered_parts.push(name.clone());
					idx += 1;
					continue;
				}
				let real_name = ctx.aliases.resolve_field(name);
				let schema = ctx.storage.schema(current_table);
				let col = schema
					.resolve_column(real_name)
					.ok_or_else(|| Error::invalid_query_at(format!("unknown column `{real_name}`"), render_path(path)))?;
				if is_last {
					return Ok(ResolvedTerminal {
						link_map,
						column: col,
						rendered: finish_rendered(rendered_parts, name),
						agg: None,
					});
				}
				if col.data_type != DataType::ObjKey {
					return Err(Error::invalid_query_at(format!("`{real_name}` is not a link column and cannot be traversed"), render_path(path)));
				}
				let target_table = schema
					.target_table(col)
					.ok_or_else(|| Error::invalid_query_at(format!("`{real_name}` has no target table"), render_path(path)))?;
				link_map.push(LinkHop {
					from_table: current_table,
					column: col,
					kind: if col.is_list() { LinkKind::List } else { LinkKind::Single },
					to_table: target_table,
				});
				current_table = target_table;
				rendered_parts.push(name.clone());
				idx += 1;
			}
			PathSegment::Backlink { class, prop } => {
				let (hop, origin_table) = resolve_backlink_hop(ctx, current_table, class, prop)?;
				if is_last {
					return Ok(ResolvedTerminal {
						link_map,
						column: hop.column,
						rendered: finish_rendered(rendered_parts, &format!("@links.{class}.{prop}")),
						agg: None,
					});
				}
				link_map.push(hop);
				current_table = origin_table;
				rendered_parts.push(format!("@links.{class}.{prop}"));
				idx += 1;
			}
		}
	}
	Err(Error::invalid_query_at("key path has no terminal column", render_path(path)))
}

fn finish_rendered(mut prefix: Vec<String>, last: &str) -> String {
	prefix.push(last.to_string());
	prefix.join(".")
}

fn render_path(path: &[PathSegment]) -> String {
	path.iter()
		.map(|s| match s {
			PathSegment::Field(n) => n.clone(),
			PathSegment::Backlink { class, prop } => format!("@links.{class}.{prop}"),
			PathSegment::Agg(k) => k.symbol().to_string(),
			PathSegment::SelfVar(n) => format!("${n}"),
		})
		.collect::<Vec<_>>()
		.join(".")
}

fn resolve_backlink_hop(ctx: &BuildCtx, current_table: TableKey, class: &str, prop: &str) -> Result<(LinkHop, TableKey)> {
	if !ctx.aliases.backlinks_allowed() {
		return Err(Error::invalid_query("backlink traversal is disabled for this query"));
	}
	let origin_table = ctx
		.storage
		.resolve_table(class)
		.ok_or_else(|| Error::invalid_query_at(format!("unknown table `{class}`"), format!("@links.{class}.{prop}")))?;
	let backlink_col = ctx
		.storage
		.schema(current_table)
		.resolve_backlink(origin_table, prop)
		.ok_or_else(|| Error::invalid_query_at(format!("no backlink to `{class}.{prop}`"), format!("@links.{class}.{prop}")))?;
	Ok((
		LinkHop {
			from_table: current_table,
			column: backlink_col,
			kind: LinkKind::Backlink,
			to_table: origin_table,
		},
		origin_table,
	))
}

/// Resolves every segment of `path` as a hop (`INCLUDE`'s path, and a
/// `SUBQUERY`'s list argument, never end in a terminal column —
/// the chain itself *is* the result).
struct ResolvedHops {
	link_map: LinkMap,
	rendered: String,
}

fn resolve_hops(ctx: &BuildCtx, start_table: TableKey, path: &[PathSegment]) -> Result<ResolvedHops> {
	let mut link_map = LinkMap::new();
	let mut current_table = start_table;
	let mut rendered_parts: Vec<String> = Vec::with_capacity(path.len());
	for seg in path {
		match seg {
			PathSegment::Field(name) => {
				let real_name = ctx.aliases.resolve_field(name);
				let schema = ctx.storage.schema(current_table);
				let col = schema
					.resolve_column(real_name)
					.ok_or_else(|| Error::invalid_query_at(format!("unknown column `{real_name}`"), render_path(path)))?;
				if col.data_type != DataType::ObjKey {
					return Err(Error::invalid_query_at(format!("`{real_name}` is not a link column and cannot be traversed"), render_path(path)));
				}
				let target_table = schema
					.target_table(col)
					.ok_or_else(|| Error::invalid_query_at(format!("`{real_name}` has no target table"), render_path(path)))?;
				link_map.push(LinkHop {
					from_table: current_table,
					column: col,
					kind: if col.is_list() { LinkKind::List } else { LinkKind::Single },
					to_table: target_table,
				});
				current_table = target_table;
				rendered_parts.push(name.clone());
			}
			PathSegment::Backlink { class, prop } => {
				let (hop, origin_table) = resolve_backlink_hop(ctx, current_table, class, prop)?;
				link_map.push(hop);
				current_table = origin_table;
				rendered_parts.push(format!("@links.{class}.{prop}"));
			}
			PathSegment::SelfVar(name) => {
				verify_self_var(ctx, name)?;
				rendered_parts.push(format!("${name}"));
			}
			PathSegment::Agg(_) => return Err(Error::invalid_query_at("aggregates are not allowed in this position", render_path(path))),
		}
	}
	Ok(ResolvedHops {
		link_map,
		rendered: rendered_parts.join("."),
	})
}

fn verify_self_var(ctx: &BuildCtx, name: &str) -> Result<()> {
	match ctx.self_var {
		Some(bound) if bound == name => Ok(()),
		_ => Err(Error::invalid_query_at(format!("undefined subquery variable `${name}`"), format!("${name}"))),
	}
}

/// Builds the general [`Expr`] form of `path`, handling the
/// `items.@sum.price`-style mid-path aggregate that [`resolve_terminal`]
/// only detects without resolving.
fn build_path_expr(ctx: &BuildCtx, start_table: TableKey, path: &[PathSegment]) -> Result<Expr> {
	if let Some(agg_idx) = path.iter().position(|s| matches!(s, PathSegment::Agg(_))) {
		let kind = match &path[agg_idx] {
			PathSegment::Agg(k) => *k,
			_ => unreachable!(),
		};
		let pre = &path[..agg_idx];
		let post = &path[agg_idx + 1..];
		if post.is_empty() {
			let resolved = resolve_terminal(ctx, start_table, pre)?;
			check_aggregate_type(kind, resolved.column.data_type, &resolved.rendered)?;
			let inner = Expr::Path(PathExpr {
				path: resolved.rendered,
				link_map: resolved.link_map,
				column: Some(resolved.column),
			});
			Ok(Expr::Agg(kind, Box::new(inner)))
		} else {
			let hops = resolve_hops(ctx, start_table, pre)?;
			let post_table = hops.link_map.target_table(start_table);
			let post_resolved = resolve_terminal(ctx, post_table, post)?;
			check_aggregate_type(kind, post_resolved.column.data_type, &post_resolved.rendered)?;
			let inner = Expr::Path(PathExpr {
				path: format!("{}.{}.{}", hops.rendered, kind.symbol(), post_resolved.rendered),
				link_map: hops.link_map,
				column: Some(post_resolved.column),
			});
			Ok(Expr::Agg(kind, Box::new(inner)))
		}
	} else {
		let resolved = resolve_terminal(ctx, start_table, path)?;
		Ok(Expr::Path(PathExpr {
			path: resolved.rendered,
			link_map: resolved.link_map,
			column: Some(resolved.column),
		}))
	}
}

/// `@min`/`@max` accept int/float/double/timestamp leaves; `@sum`/`@avg`
/// accept int/float/double only. Anything else (string, binary, bool, link)
/// is an `Unsupported` build error rather than a silent `0`/`NULL` at
/// evaluation time.
fn check_aggregate_type(kind: AggKind, data_type: DataType, rendered: &str) -> Result<()> {
	let ok = match kind {
		AggKind::Sum | AggKind::Avg => matches!(data_type, DataType::Int | DataType::Float | DataType::Double),
		AggKind::Min | AggKind::Max => matches!(data_type, DataType::Int | DataType::Float | DataType::Double | DataType::Timestamp),
		AggKind::Count => true,
	};
	if ok {
		Ok(())
	} else {
		Err(Error::unsupported(format!("{} is not defined on a {data_type} column (`{rendered}`)", kind.symbol())))
	}
}

// ---------------------------------------------------------------------
// Value / operator conversion
// ---------------------------------------------------------------------

fn resolve_value(ctx: &BuildCtx, ast: &ValueAst) -> Result<Value> {
	match ast {
		ValueAst::Literal(v) => Ok(v.clone()),
		ValueAst::Arg(idx) => ctx.args.get(*idx).cloned().ok_or_else(|| Error::missing_argument(*idx, ctx.args.len())),
		ValueAst::TimestampRaw { seconds, nanoseconds } => {
			if *nanoseconds < 0 {
				return Err(Error::out_of_range("timestamp nanoseconds must be non-negative"));
			}
			Ok(Value::Timestamp(crate::value::Timestamp::new(*seconds, *nanoseconds as u32)))
		}
	}
}

fn compare_op(op: CmpOpAst) -> Result<CompareOp> {
	match op {
		CmpOpAst::Eq => Ok(CompareOp::Equal),
		CmpOpAst::Ne => Ok(CompareOp::NotEqual),
		CmpOpAst::Lt => Ok(CompareOp::Less),
		CmpOpAst::Le => Ok(CompareOp::LessEqual),
		CmpOpAst::Gt => Ok(CompareOp::Greater),
		CmpOpAst::Ge => Ok(CompareOp::GreaterEqual),
		_ => Err(Error::invalid_query("that operator requires a string or binary column")),
	}
}

fn string_match_op(op: CmpOpAst) -> Result<StringMatchOp> {
	match op {
		CmpOpAst::Contains => Ok(StringMatchOp::Contains),
		CmpOpAst::BeginsWith => Ok(StringMatchOp::BeginsWith),
		CmpOpAst::EndsWith => Ok(StringMatchOp::EndsWith),
		CmpOpAst::Like => Ok(StringMatchOp::Like),
		_ => Err(Error::invalid_query("expected a string matching operator")),
	}
}

fn binary_match_op(op: CmpOpAst) -> Result<BinaryMatchOp> {
	match op {
		CmpOpAst::Contains => Ok(BinaryMatchOp::Contains),
		CmpOpAst::BeginsWith => Ok(BinaryMatchOp::BeginsWith),
		CmpOpAst::EndsWith => Ok(BinaryMatchOp::EndsWith),
		CmpOpAst::Eq => Ok(BinaryMatchOp::Equal),
		_ => Err(Error::invalid_query("expected a binary matching operator")),
	}
}

fn expect_string(value: &Value) -> Result<String> {
	match value {
		Value::String(s) => Ok(s.clone()),
		other => Err(Error::invalid_query(format!("expected a string literal, found {}", other.type_name()))),
	}
}

fn expect_binary(value: &Value) -> Result<Vec<u8>> {
	match value {
		Value::Binary(b) => Ok(b.clone()),
		other => Err(Error::invalid_query(format!("expected a binary literal, found {}", other.type_name()))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::Context;
	use crate::key::DataType as DT;
	use crate::node::StorageHandle;
	use crate::storage::testutil::{ColumnSpec, FakeStorage};
	use std::rc::Rc;

	fn people() -> (FakeStorage, TableKey) {
		let mut s = FakeStorage::new();
		let t = s.add_table(
			"People",
			vec![ColumnSpec::scalar("name", DT::String), ColumnSpec::scalar("age", DT::Int)],
			None,
			10,
		);
		for (name, age) in [("Billy", 0), ("Bob", 1), ("Joe", 2), ("Jane", 3), ("Joel", 4)] {
			s.push_row(t, vec![Value::String(name.into()), Value::Int(age)]);
		}
		(s, t)
	}

	#[test]
	fn builds_and_runs_range_predicate() {
		let (s, t) = people();
		let aliases = KeyPathMapping::new();
		let (mut q, _ordering) = parse(&s, t, "age > 2 and age < 4", &[], &aliases).unwrap();
		let storage: StorageHandle = Rc::new(s);
		let mut ctx = Context::new();
		assert_eq!(q.count(&storage, t, &mut ctx), 1);
	}

	#[test]
	fn builds_begins_with() {
		let (s, t) = people();
		let aliases = KeyPathMapping::new();
		let (mut q, _ordering) = parse(&s, t, "name BEGINSWITH 'J'", &[], &aliases).unwrap();
		let storage: StorageHandle = Rc::new(s);
		let mut ctx = Context::new();
		assert_eq!(q.count(&storage, t, &mut ctx), 3);
	}

	#[test]
	fn fuses_or_equals_into_in() {
		let mut s = FakeStorage::new();
		let t = s.add_table("Rows", vec![ColumnSpec::scalar("a", DT::String)], None, 10);
		for i in 0..5 {
			s.push_row(t, vec![Value::String(i.to_string())]);
		}
		let aliases = KeyPathMapping::new();
		let (q, _ordering) = parse(&s, t, "a == '0' or a == '1' or a == '2'", &[], &aliases).unwrap();
		assert!(q.describe().contains("IN"));
	}

	#[test]
	fn argument_placeholder_resolves_from_args() {
		let (s, t) = people();
		let aliases = KeyPathMapping::new();
		let (mut q, _ordering) = parse(&s, t, "age == $0", &[Value::Int(2)], &aliases).unwrap();
		let storage: StorageHandle = Rc::new(s);
		let mut ctx = Context::new();
		assert_eq!(q.count(&storage, t, &mut ctx), 1);
	}

	#[test]
	fn missing_argument_reports_index_and_count() {
		let (s, t) = people();
		let aliases = KeyPathMapping::new();
		let err = parse(&s, t, "age == $3", &[Value::Int(2)], &aliases).unwrap_err();
		assert!(err.to_string().contains("Request for argument at index 3 but only 1 arguments are provided"));
	}

	#[test]
	fn sum_over_string_column_is_unsupported() {
		let (s, t) = people();
		let aliases = KeyPathMapping::new();
		let err = parse(&s, t, "name.@sum > 0", &[], &aliases).unwrap_err();
		assert!(matches!(err, Error::Unsupported { .. }));
	}

	#[test]
	fn min_over_timestamp_column_is_accepted() {
		let mut s = FakeStorage::new();
		let t = s.add_table("Events", vec![ColumnSpec::scalar("at", DT::Timestamp)], None, 10);
		let aliases = KeyPathMapping::new();
		assert!(parse(&s, t, "at.@min == T0:0", &[], &aliases).is_ok());
	}

	#[test]
	fn negative_timestamp_nanoseconds_rejected() {
		let mut s = FakeStorage::new();
		let t = s.add_table("Events", vec![ColumnSpec::scalar("at", DT::Timestamp)], None, 10);
		let aliases = KeyPathMapping::new();
		let err = parse(&s, t, "at == T0:-1", &[], &aliases).unwrap_err();
		assert!(matches!(err, Error::OutOfRange { .. }));
	}

	#[test]
	fn sort_distinct_limit_descriptor_order_is_preserved() {
		let mut s = FakeStorage::new();
		let t = s.add_table("People", vec![ColumnSpec::scalar("name", DT::String), ColumnSpec::scalar("age", DT::Int)], None, 10);
		for (name, age) in [("Adam", 28), ("Frank", 30), ("Ben", 28)] {
			s.push_row(t, vec![Value::String(name.into()), Value::Int(age)]);
		}
		let aliases = KeyPathMapping::new();
		let (mut q, ordering) = parse(&s, t, "TRUEPREDICATE SORT(name ASC) DISTINCT(age) LIMIT(2)", &[], &aliases).unwrap();
		let storage: StorageHandle = Rc::new(s);
		let mut ctx = Context::new();
		let view = q.find_all_ordered(&storage, t, &mut ctx, &ordering);
		assert_eq!(view.size(), 2);
		assert_eq!(view.get_num_results_excluded_by_limit(), 0);
	}

	/// `age > 2 and age < 4` coalesces at build time into a single
	/// `RangeNode`, independent of `Query::reorder_by_cost`'s runtime
	/// reordering — the conjunction has exactly one child, and its
	/// `describe()` round-trips through the original two-sided text.
	#[test]
	fn chained_inequality_coalesces_into_one_range_node() {
		let (s, t) = people();
		let aliases = KeyPathMapping::new();
		let (q, _ordering) = parse(&s, t, "age > 2 and age < 4", &[], &aliases).unwrap();
		assert_eq!(q.children().len(), 1);
		assert!(matches!(q.children()[0], Node::Range(_)));
		assert_eq!(q.describe(), "age > 2 and age < 4");
	}

	/// An indexed `StringEqual` conjoined after an unindexed `Compare` is
	/// hoisted to the front at build time, before the runtime cost reorder
	/// in `Query::find_first_local` ever runs.
	#[test]
	fn indexed_equality_is_hoisted_ahead_of_unindexed_compare() {
		let mut s = FakeStorage::new();
		let t = s.add_table(
			"People",
			vec![ColumnSpec::scalar("age", DT::Int), ColumnSpec::scalar("name", DT::String).indexed()],
			None,
			10,
		);
		for (age, name) in [(0, "Billy"), (1, "Bob"), (2, "Joe")] {
			s.push_row(t, vec![Value::Int(age), Value::String(name.into())]);
		}
		let aliases = KeyPathMapping::new();
		let (q, _ordering) = parse(&s, t, "age > 0 and name == 'Joe'", &[], &aliases).unwrap();
		assert_eq!(q.children().len(), 2);
		assert!(matches!(q.children()[0], Node::StringEqual(_)));
		assert!(matches!(q.children()[1], Node::Compare(_)));
	}

	/// A literal-only `Arith` subtree reaching `fold_expression_node` is
	/// folded to its value before the `ExpressionNode` is ever built, so
	/// `describe()` shows the evaluated constant rather than the unevaluated
	/// `1 + 1` shape.
	#[test]
	fn fold_expression_node_collapses_literal_arithmetic() {
		use crate::expr::ArithOp;
		use crate::node::NodeOps;

		let lhs = Expr::Arith(ArithOp::Add, Box::new(Expr::Literal(Value::Int(1))), Box::new(Expr::Literal(Value::Int(1))));
		let node = fold_expression_node(lhs, CompareOp::Equal, Expr::Literal(Value::Int(2)), Quantifier::Any);
		assert_eq!(node.describe(), "2 == 2");
	}
}
