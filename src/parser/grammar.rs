//! Recursive-descent predicate/descriptor grammar: `OR` binds loosest, then
//! `AND`, then `NOT`/comparison atoms. Produces the untyped [`super::ast`]
//! tree; schema resolution and type checking happen entirely in
//! [`super::builder`].

use super::ast::*;
use super::lexer::*;
use crate::value::Value;
use nom::branch::alt;
use nom::combinator::{map, opt};
use nom::multi::{many0, separated_list1};
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;

/// Parses a full query string into its predicate and trailing descriptor
/// sequence. `TRUEPREDICATE` with no explicit predicate text (an empty or
/// whitespace-only leading fragment before the first descriptor keyword)
/// is accepted the same way the surface grammar spells it out loud: an
/// absent predicate is `TRUEPREDICATE`.
pub fn parse_query(input: &str) -> IResult<&str, (PredicateAst, Vec<DescriptorAst>)> {
	let (input, predicate) = or_expr(input)?;
	let (input, descriptors) = many0(descriptor)(input)?;
	let (input, _) = ws(input)?;
	Ok((input, (predicate, descriptors)))
}

fn or_expr(input: &str) -> IResult<&str, PredicateAst> {
	let (input, first) = and_expr(input)?;
	let (input, rest) = many0(preceded(alt((kw("or"), punct("||"))), and_expr))(input)?;
	if rest.is_empty() {
		Ok((input, first))
	} else {
		let mut all = vec![first];
		all.extend(rest);
		Ok((input, PredicateAst::Or(all)))
	}
}

fn and_expr(input: &str) -> IResult<&str, PredicateAst> {
	let (input, first) = not_expr(input)?;
	let (input, rest) = many0(preceded(alt((kw("and"), punct("&&"))), not_expr))(input)?;
	if rest.is_empty() {
		Ok((input, first))
	} else {
		let mut all = vec![first];
		all.extend(rest);
		Ok((input, PredicateAst::And(all)))
	}
}

fn not_expr(input: &str) -> IResult<&str, PredicateAst> {
	alt((
		map(preceded(alt((kw("not"), punct("!"))), not_expr), |p| PredicateAst::Not(Box::new(p))),
		atom,
	))(input)
}

fn atom(input: &str) -> IResult<&str, PredicateAst> {
	alt((
		parenthesized,
		truepredicate,
		subquery_predicate,
		in_predicate,
		count_predicate,
		compare_predicate,
	))(input)
}

fn parenthesized(input: &str) -> IResult<&str, PredicateAst> {
	delimited(punct("("), or_expr, punct(")"))(input)
}

fn truepredicate(input: &str) -> IResult<&str, PredicateAst> {
	map(kw("TRUEPREDICATE"), |_| PredicateAst::True)(input)
}

fn case_insensitive_suffix(input: &str) -> IResult<&str, bool> {
	map(opt(punct("[c]")), |o| o.is_some())(input)
}

fn path_expr(input: &str) -> IResult<&str, PathAst> {
	let (input, first) = path_segment(input)?;
	let (input, rest) = many0(preceded(punct("."), path_segment))(input)?;
	let mut segs = vec![first];
	segs.extend(rest);
	Ok((input, segs))
}

fn path_segment(input: &str) -> IResult<&str, PathSegment> {
	alt((backlink_segment, agg_segment, self_var_segment, field_segment))(input)
}

fn field_segment(input: &str) -> IResult<&str, PathSegment> {
	map(identifier, |name| PathSegment::Field(name.to_string()))(input)
}

fn self_var_segment(input: &str) -> IResult<&str, PathSegment> {
	map(self_var, |name| PathSegment::SelfVar(name.to_string()))(input)
}

fn backlink_segment(input: &str) -> IResult<&str, PathSegment> {
	let (input, _) = punct("@links")(input)?;
	let (input, _) = punct(".")(input)?;
	let (input, class) = identifier(input)?;
	let (input, _) = punct(".")(input)?;
	let (input, prop) = identifier(input)?;
	Ok((
		input,
		PathSegment::Backlink {
			class: class.to_string(),
			prop: prop.to_string(),
		},
	))
}

fn agg_segment(input: &str) -> IResult<&str, PathSegment> {
	alt((
		map(kw("@min"), |_| PathSegment::Agg(crate::expr::AggKind::Min)),
		map(kw("@max"), |_| PathSegment::Agg(crate::expr::AggKind::Max)),
		map(kw("@sum"), |_| PathSegment::Agg(crate::expr::AggKind::Sum)),
		map(kw("@avg"), |_| PathSegment::Agg(crate::expr::AggKind::Avg)),
	))(input)
}

fn cmp_op(input: &str) -> IResult<&str, CmpOpAst> {
	alt((
		map(punct("=="), |_| CmpOpAst::Eq),
		map(punct("!="), |_| CmpOpAst::Ne),
		map(punct("<>"), |_| CmpOpAst::Ne),
		map(punct("=>"), |_| CmpOpAst::Ge),
		map(punct("=<"), |_| CmpOpAst::Le),
		map(punct(">="), |_| CmpOpAst::Ge),
		map(punct("<="), |_| CmpOpAst::Le),
		map(punct(">"), |_| CmpOpAst::Gt),
		map(punct("<"), |_| CmpOpAst::Lt),
		map(kw("beginswith"), |_| CmpOpAst::BeginsWith),
		map(kw("endswith"), |_| CmpOpAst::EndsWith),
		map(kw("contains"), |_| CmpOpAst::Contains),
		map(kw("like"), |_| CmpOpAst::Like),
	))(input)
}

fn quantifier(input: &str) -> IResult<&str, QuantifierAst> {
	alt((
		map(kw("any"), |_| QuantifierAst::Any),
		map(kw("some"), |_| QuantifierAst::Any),
		map(kw("all"), |_| QuantifierAst::All),
		map(kw("none"), |_| QuantifierAst::None),
	))(input)
}

fn value_literal(input: &str) -> IResult<&str, ValueAst> {
	alt((
		map(timestamp_literal, |(seconds, nanoseconds)| ValueAst::TimestampRaw { seconds, nanoseconds }),
		map(arg_placeholder, ValueAst::Arg),
		map(binary_literal, ValueAst::Literal),
		map(null_literal, ValueAst::Literal),
		map(bool_literal, ValueAst::Literal),
		map(string_literal, |s| ValueAst::Literal(Value::String(s))),
		map(number_literal, ValueAst::Literal),
	))(input)
}

fn compare_predicate(input: &str) -> IResult<&str, PredicateAst> {
	let (input, q) = opt(quantifier)(input)?;
	let (input, path) = path_expr(input)?;
	let (input, op) = cmp_op(input)?;
	let (input, ci) = case_insensitive_suffix(input)?;
	let (input, value) = value_literal(input)?;
	Ok((
		input,
		PredicateAst::Compare {
			path,
			op,
			case_insensitive: ci,
			value,
			quantifier: q,
		},
	))
}

fn in_predicate(input: &str) -> IResult<&str, PredicateAst> {
	let (input, path) = path_expr(input)?;
	let (input, _) = kw("in")(input)?;
	let (input, ci) = case_insensitive_suffix(input)?;
	let (input, values) = delimited(punct("["), separated_list1(punct(","), value_literal), punct("]"))(input)?;
	Ok((
		input,
		PredicateAst::In {
			path,
			case_insensitive: ci,
			values,
		},
	))
}

fn count_predicate(input: &str) -> IResult<&str, PredicateAst> {
	let (input, path) = path_expr(input)?;
	let (input, _) = punct(".")(input)?;
	let (input, _) = alt((kw("@count"), kw("@size")))(input)?;
	let (input, op) = cmp_op(input)?;
	let (input, value) = value_literal(input)?;
	Ok((input, PredicateAst::Count { path, op, value }))
}

fn subquery_predicate(input: &str) -> IResult<&str, PredicateAst> {
	let (input, _) = kw("SUBQUERY")(input)?;
	let (input, _) = punct("(")(input)?;
	let (input, list) = path_expr(input)?;
	let (input, _) = punct(",")(input)?;
	let (input, var) = self_var(input)?;
	let (input, _) = punct(",")(input)?;
	let (input, predicate) = or_expr(input)?;
	let (input, _) = punct(")")(input)?;
	let (input, _) = punct(".")(input)?;
	let (input, _) = alt((kw("@count"), kw("@size")))(input)?;
	let (input, op) = cmp_op(input)?;
	let (input, value) = value_literal(input)?;
	Ok((
		input,
		PredicateAst::Subquery {
			list,
			var: var.to_string(),
			predicate: Box::new(predicate),
			op,
			value,
		},
	))
}

fn sort_dir(input: &str) -> IResult<&str, SortDirAst> {
	alt((
		map(kw("ASC"), |_| SortDirAst::Asc),
		map(kw("DESC"), |_| SortDirAst::Desc),
	))(input)
}

fn sort_descriptor(input: &str) -> IResult<&str, DescriptorAst> {
	let (input, _) = kw("SORT")(input)?;
	let (input, keys) = delimited(
		punct("("),
		separated_list1(punct(","), pair(path_expr, sort_dir)),
		punct(")"),
	)(input)?;
	Ok((input, DescriptorAst::Sort(keys)))
}

fn distinct_descriptor(input: &str) -> IResult<&str, DescriptorAst> {
	let (input, _) = kw("DISTINCT")(input)?;
	let (input, keys) = delimited(punct("("), separated_list1(punct(","), path_expr), punct(")"))(input)?;
	Ok((input, DescriptorAst::Distinct(keys)))
}

fn limit_descriptor(input: &str) -> IResult<&str, DescriptorAst> {
	let (input, _) = kw("LIMIT")(input)?;
	let (input, n) = delimited(punct("("), number_literal, punct(")"))(input)?;
	let n = n.as_i64().unwrap_or(0);
	Ok((input, DescriptorAst::Limit(n)))
}

fn include_descriptor(input: &str) -> IResult<&str, DescriptorAst> {
	let (input, _) = kw("INCLUDE")(input)?;
	let (input, path) = delimited(punct("("), path_expr, punct(")"))(input)?;
	Ok((input, DescriptorAst::Include(path)))
}

fn descriptor(input: &str) -> IResult<&str, DescriptorAst> {
	alt((sort_descriptor, distinct_descriptor, limit_descriptor, include_descriptor))(input)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_simple_comparison() {
		let (_, (pred, desc)) = parse_query("age > 2").unwrap();
		assert!(matches!(pred, PredicateAst::Compare { op: CmpOpAst::Gt, .. }));
		assert!(desc.is_empty());
	}

	#[test]
	fn parses_and_and_or_with_correct_precedence() {
		let (_, (pred, _)) = parse_query("age > 2 and age < 4 or name == 'Joe'").unwrap();
		// (age>2 and age<4) or name=='Joe'
		match pred {
			PredicateAst::Or(branches) => {
				assert_eq!(branches.len(), 2);
				assert!(matches!(branches[0], PredicateAst::And(_)));
			}
			_ => panic!("expected Or at top level"),
		}
	}

	#[test]
	fn parses_descriptors_in_sequence() {
		let (_, (_, desc)) = parse_query("TRUEPREDICATE SORT(name ASC) DISTINCT(age) LIMIT(2)").unwrap();
		assert_eq!(desc.len(), 3);
		assert!(matches!(desc[0], DescriptorAst::Sort(_)));
		assert!(matches!(desc[1], DescriptorAst::Distinct(_)));
		assert!(matches!(desc[2], DescriptorAst::Limit(2)));
	}

	#[test]
	fn parses_in_predicate() {
		let (_, (pred, _)) = parse_query("a in ['0', '1', '2']").unwrap();
		assert!(matches!(pred, PredicateAst::In { .. }));
	}

	#[test]
	fn parses_case_insensitive_contains() {
		let (_, (pred, _)) = parse_query("name CONTAINS[c] 'bone'").unwrap();
		match pred {
			PredicateAst::Compare { case_insensitive, op: CmpOpAst::Contains, .. } => assert!(case_insensitive),
			_ => panic!("expected Compare/Contains"),
		}
	}

	#[test]
	fn parses_backlink_path_in_include() {
		let (_, (_, desc)) = parse_query("TRUEPREDICATE INCLUDE(@links.Person.father)").unwrap();
		assert_eq!(desc.len(), 1);
		match &desc[0] {
			DescriptorAst::Include(path) => {
				assert!(matches!(path[0], PathSegment::Backlink { .. }));
			}
			_ => panic!("expected Include"),
		}
	}

	#[test]
	fn parses_subquery_count() {
		let (_, (pred, _)) = parse_query("SUBQUERY(items, $x, $x.price > 10).@count > 0").unwrap();
		assert!(matches!(pred, PredicateAst::Subquery { .. }));
	}
}
