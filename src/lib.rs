//! Embedded, read-only object-database query evaluation engine: a
//! composable tree of condition nodes that iteratively scans a clustered
//! column store, with cost-adaptive short-circuit intersection across
//! predicates, indexed string/binary matching (including multi-needle `IN`
//! fusion), a `NOT` node with a cached-range heuristic, link/backlink
//! traversal as a first-class query primitive, an expression engine
//! (arithmetic, aggregates, subqueries, quantifiers), descriptor-ordering
//! result shaping (sort/distinct/limit/include), and a textual predicate
//! parser that lowers surface syntax into all of the above.
//!
//! The crate never touches a concrete storage engine: every table, cluster,
//! index and object is reached through the trait seams of [`storage`],
//! which an embedder implements. [`storage::testutil`] is an in-memory
//! implementation used by this crate's own tests and exported for
//! embedders that want the same fixture in their own test suites.
//!
//! `tracing` macros are brought into scope crate-wide with
//! `#[macro_use] extern crate tracing;` rather than `use tracing::...` in
//! every module that logs.
#[macro_use]
extern crate tracing;

pub mod config;
pub mod context;
pub mod error;
pub mod expr;
pub mod fmt;
pub mod key;
pub mod linkmap;
pub mod node;
pub mod ordering;
pub mod parser;
pub mod query;
pub mod result_view;
pub mod storage;
pub mod value;

pub use context::Context;
pub use error::{Error, Result};
pub use key::{ColKey, ObjKey, Row, TableKey};
pub use linkmap::{LinkHop, LinkKind, LinkMap};
pub use node::{Node, NodeOps};
pub use ordering::{Descriptor, DescriptorOrdering, KeyPath, SortDirection};
pub use parser::aliases::KeyPathMapping;
pub use parser::parse;
pub use query::Query;
pub use result_view::ResultView;
pub use storage::testutil;
pub use value::Value;
