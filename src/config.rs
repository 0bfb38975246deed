//! Tunable constants shared by the cost-adaptive scheduler, the multi-needle
//! fusion scan, and the storage-cap checks at the query boundary. Named here
//! once so the builder's "hoist cheap index-backed equality first" pass and
//! the runtime reordering in [`crate::query`] agree on the same priors.

/// Expected cost per probe for an indexed equality node: the index has
/// already materialised the matching keys, so a probe is a cheap binary
/// search.
pub const INDEXED_DT: f64 = 0.0;

/// Expected cost per probe for a string-enum column compared by resolved
/// string without a full secondary index.
pub const STRING_ENUM_DT: f64 = 1.0;

/// Expected cost per probe for an unindexed linear scan.
pub const UNINDEXED_DT: f64 = 10.0;

/// Block size for the Rabin–Karp-like multi-pattern scan used by fused
/// `IN` nodes.
pub const NEEDLE_SCAN_BLOCK_SIZE: usize = 20;

/// Storage cap on string length; exceeding it is an `OutOfRange` error.
pub const MAX_STRING_LEN: usize = 0xFFFFFFFF >> 1;

/// Storage cap on binary length; exceeding it is an `OutOfRange` error.
pub const MAX_BINARY_LEN: usize = 0xFFFFFFFF >> 1;

/// Guard against pathological `@links` chains in `Include` paths and
/// `LinkMap` traversal: unbounded backlink chains need a finite recursion
/// bound.
pub const MAX_BACKLINK_CHAIN_DEPTH: usize = 64;
