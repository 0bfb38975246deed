//! End-to-end scenarios reproduced against the public surface (parse →
//! execute → shape), exercising the engine the way an embedder would: text
//! in, `ResultView`/aggregate out.

use objdb_core::error::Error;
use objdb_core::expr::{AggKind, AggregateSpec};
use objdb_core::key::DataType;
use objdb_core::node::StorageHandle;
use objdb_core::testutil::{ColumnSpec, FakeStorage};
use objdb_core::value::{Timestamp, Value};
use objdb_core::{parse, Context, KeyPathMapping};
use std::rc::Rc;

fn handle(s: FakeStorage) -> StorageHandle {
	Rc::new(s)
}

/// Makes the `debug_span!`/`trace!` output in `query.rs` visible when a test
/// fails (`RUST_LOG=trace cargo test -- --nocapture`). Safe to call from
/// every test since the global subscriber can only be installed once.
fn init_tracing() {
	let _ = tracing_subscriber::fmt::try_init();
}

/// People table, range and prefix predicates.
#[test]
fn people_age_range_and_name_prefix() {
	init_tracing();
	let mut s = FakeStorage::new();
	let t = s.add_table(
		"People",
		vec![ColumnSpec::scalar("name", DataType::String), ColumnSpec::scalar("age", DataType::Int)],
		None,
		10,
	);
	for (name, age) in [("Billy", 0), ("Bob", 1), ("Joe", 2), ("Jane", 3), ("Joel", 4)] {
		s.push_row(t, vec![Value::String(name.into()), Value::Int(age)]);
	}
	s.finalize();
	let storage = handle(s);
	let aliases = KeyPathMapping::new();
	let mut ctx = Context::new();

	let (mut q, _) = parse(storage.as_ref(), t, "age > 2 and age < 4", &[], &aliases).unwrap();
	let view = q.find_all(&storage, t, &mut ctx);
	assert_eq!(view.size(), 1);

	let (mut q, _) = parse(storage.as_ref(), t, "name BEGINSWITH 'J'", &[], &aliases).unwrap();
	assert_eq!(q.count(&storage, t, &mut ctx), 3);
}

/// A Person with four linked Items, each with a linked Discount; `@sum`
/// over a list-link path and equality through a second forward hop.
#[test]
fn items_discount_aggregate_and_nested_link_predicate() {
	init_tracing();
	let mut s = FakeStorage::new();
	let discount = s.add_table(
		"Discount",
		vec![ColumnSpec::scalar("reduced_by", DataType::Double), ColumnSpec::scalar("active", DataType::Bool)],
		None,
		10,
	);
	let item = s.add_table(
		"Item",
		vec![ColumnSpec::scalar("price", DataType::Double), ColumnSpec::link("discount", "Discount")],
		None,
		10,
	);
	let person = s.add_table("Person", vec![ColumnSpec::list_link("items", "Item")], None, 10);
	s.link_target(item, "discount", discount);
	s.link_target(person, "items", item);

	let discounts: Vec<_> = [3.0, 2.5, 0.5, 1.5]
		.iter()
		.zip([false, true, true, true])
		.map(|(reduced_by, active)| s.push_row(discount, vec![Value::Double(*reduced_by), Value::Bool(active)]))
		.collect();
	let prices = [5.5, 4.0, 9.5, 6.5];
	let items: Vec<_> = prices
		.iter()
		.zip(&discounts)
		.map(|(price, d)| s.push_row(item, vec![Value::Double(*price), Value::Link(*d)]))
		.collect();
	s.push_row(person, vec![Value::List(items.iter().map(|k| Value::Link(*k)).collect())]);
	s.finalize();

	let storage = handle(s);
	let aliases = KeyPathMapping::new();
	let mut ctx = Context::new();

	// Sum of {5.5, 4.0, 9.5, 6.5} is 25.5; the one Person row clears a
	// threshold below that.
	let (mut q, _) = parse(storage.as_ref(), person, "items.@sum.price > 20", &[], &aliases).unwrap();
	assert_eq!(q.count(&storage, person, &mut ctx), 1);

	// Direct single-hop equality on the Item table: 3 of its 4 rows have an
	// active discount.
	let (mut q, _) = parse(storage.as_ref(), item, "discount.active == true", &[], &aliases).unwrap();
	assert_eq!(q.count(&storage, item, &mut ctx), 3);
}

/// A four-hop backlink chain reported one set per hop level.
#[test]
fn ancestor_chain_include_reports_one_set_per_hop() {
	init_tracing();
	let mut s = FakeStorage::new();
	let person = s.add_table(
		"Person",
		vec![
			ColumnSpec::scalar("name", DataType::String),
			ColumnSpec::link("father", "Person"),
			ColumnSpec::backlink("children", "Person"),
		],
		None,
		10,
	);
	s.set_backlink_origin(person, "children", "father");
	let bones = s.push_row(person, vec![Value::String("Bones".into()), Value::Null, Value::Null]);
	let john = s.push_row(person, vec![Value::String("John".into()), Value::Link(bones), Value::Null]);
	let mark = s.push_row(person, vec![Value::String("Mark".into()), Value::Link(john), Value::Null]);
	let jonathan = s.push_row(person, vec![Value::String("Jonathan".into()), Value::Link(mark), Value::Null]);
	let eli = s.push_row(person, vec![Value::String("Eli".into()), Value::Link(jonathan), Value::Null]);
	s.finalize();

	let storage = handle(s);
	let aliases = KeyPathMapping::new();
	let mut ctx = Context::new();

	let (mut q, ordering) = parse(
		storage.as_ref(),
		person,
		"name CONTAINS[c] 'bone' SORT(name DESC) INCLUDE(@links.Person.father.@links.Person.father.@links.Person.father.@links.Person.father)",
		&[],
		&aliases,
	)
	.unwrap();
	let view = q.find_all_ordered(&storage, person, &mut ctx, &ordering);
	assert_eq!(view.size(), 1);
	assert_eq!(view.get(0), bones);

	let mut levels: Vec<Vec<Value>> = Vec::new();
	view.report_includes(&storage, person, &ordering, &mut |_row, _table, keys| {
		levels.push(keys.to_vec().into_iter().map(Value::Link).collect())
	});
	assert_eq!(
		levels,
		vec![vec![Value::Link(john)], vec![Value::Link(mark)], vec![Value::Link(jonathan)], vec![Value::Link(eli)]]
	);
}

/// A negative-nanosecond timestamp literal is a build error; a valid ISO
/// literal matches the row it was parsed to describe.
#[test]
fn timestamp_negative_nanoseconds_rejected_and_valid_literal_matches() {
	init_tracing();
	let mut s = FakeStorage::new();
	let t = s.add_table("Events", vec![ColumnSpec::scalar("birthday", DataType::Timestamp)], None, 10);
	let before_epoch = s.push_row(t, vec![Value::Timestamp(Timestamp::new(-1, 1))]);
	s.finalize();
	let storage = handle(s);
	let aliases = KeyPathMapping::new();
	let mut ctx = Context::new();

	let err = parse(storage.as_ref(), t, "birthday == T0:-1", &[], &aliases).unwrap_err();
	assert!(matches!(err, Error::OutOfRange { .. }));

	let (mut q, _) = parse(storage.as_ref(), t, "birthday == 1969-12-31@23:59:59:1", &[], &aliases).unwrap();
	let view = q.find_all(&storage, t, &mut ctx);
	assert_eq!(view.size(), 1);
	assert_eq!(view.get(0), before_epoch);
}

/// An `OR` chain of equalities on a 100-row table fuses into one `IN`-form
/// node and matches the same rows a literal `IN` would.
#[test]
fn multi_needle_or_chain_fuses_into_in() {
	init_tracing();
	let mut s = FakeStorage::new();
	let t = s.add_table("Rows", vec![ColumnSpec::scalar("a", DataType::String)], None, 10);
	for i in 0..100 {
		s.push_row(t, vec![Value::String(i.to_string())]);
	}
	s.finalize();
	let storage = handle(s);
	let aliases = KeyPathMapping::new();
	let mut ctx = Context::new();

	let (mut q, _) = parse(storage.as_ref(), t, "a == '0' or a == '1' or a == '2'", &[], &aliases).unwrap();
	assert!(q.describe().contains("IN"));
	assert_eq!(q.count(&storage, t, &mut ctx), 3);

	let (mut q_in, _) = parse(storage.as_ref(), t, "a in ['0', '1', '2']", &[], &aliases).unwrap();
	assert_eq!(q_in.count(&storage, t, &mut ctx), 3);
}

/// Descriptor order is preserved verbatim, not normalised — `SORT...LIMIT`
/// and `LIMIT...SORT` are different programs.
#[test]
fn descriptor_order_changes_excluded_by_limit() {
	init_tracing();
	let mut s = FakeStorage::new();
	let t = s.add_table("People", vec![ColumnSpec::scalar("name", DataType::String), ColumnSpec::scalar("age", DataType::Int)], None, 10);
	for (name, age) in [("Adam", 28), ("Frank", 30), ("Ben", 28)] {
		s.push_row(t, vec![Value::String(name.into()), Value::Int(age)]);
	}
	s.finalize();
	let storage = handle(s);
	let aliases = KeyPathMapping::new();
	let mut ctx = Context::new();

	let (mut q, ordering) = parse(storage.as_ref(), t, "TRUEPREDICATE SORT(name ASC) DISTINCT(age) LIMIT(2)", &[], &aliases).unwrap();
	let view = q.find_all_ordered(&storage, t, &mut ctx, &ordering);
	assert_eq!(view.size(), 2);
	assert_eq!(view.get_num_results_excluded_by_limit(), 0);

	let (mut q2, ordering2) = parse(storage.as_ref(), t, "TRUEPREDICATE LIMIT(2) SORT(name ASC) DISTINCT(age)", &[], &aliases).unwrap();
	let view2 = q2.find_all_ordered(&storage, t, &mut ctx, &ordering2);
	assert_eq!(view2.get_num_results_excluded_by_limit(), 1);
}

/// An empty-list `@avg` is the undefined sentinel, not zero.
#[test]
fn avg_aggregate_over_no_matches_is_null() {
	init_tracing();
	let mut s = FakeStorage::new();
	let t = s.add_table("Empty", vec![ColumnSpec::scalar("x", DataType::Int)], None, 10);
	s.finalize();
	let storage = handle(s);
	let mut ctx = Context::new();
	let mut q = objdb_core::Query::new();
	let result = q.aggregate(&storage, t, &mut ctx, &AggregateSpec { kind: AggKind::Avg, expr: None });
	assert_eq!(result, Value::Null);
}
