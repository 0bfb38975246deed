//! The categorised error type at the query engine's boundary. Build errors
//! (parser, type check, schema validation) and the one recoverable runtime
//! kind (`StaleAccessor`, handled internally and never actually surfaced
//! to a caller) share this enum so embedders match on a single type.

use thiserror::Error;

/// Errors raised while building or evaluating a query.
///
/// Every build-error variant carries enough context — the offending
/// column/property name and, where available, the query fragment that
/// triggered it — for a caller to name the offending type, property, and
/// query fragment in their own diagnostics.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
	/// Unknown column, type mismatch, null-vs-list comparison,
	/// `ANY`/`ALL`/`NONE` without a list in the path, a descriptor
	/// appearing after a non-query token.
	#[error("invalid query: {message}{}", fragment_suffix(.fragment))]
	InvalidQuery {
		message: String,
		fragment: Option<String>,
	},

	/// `Limit(negative)`, a timestamp with negative nanoseconds, a string
	/// exceeding the storage cap.
	#[error("value out of range: {message}")]
	OutOfRange { message: String },

	/// `$N` referenced with `N` at or beyond the number of arguments
	/// supplied.
	#[error("Request for argument at index {index} but only {supplied} arguments are provided")]
	MissingArgument { index: usize, supplied: usize },

	/// Full-object comparison (except against null), `@min`/`@max`/`@sum`/
	/// `@avg` on strings or links, list-vs-list comparisons.
	#[error("unsupported operation: {message}")]
	Unsupported { message: String },

	/// An accessor observed a storage version change mid-read. Recoverable:
	/// the engine re-resolves the accessor and retries; this variant should
	/// never escape the crate's public API.
	#[error("stale accessor, retrying")]
	StaleAccessor,

	/// Surfaced from the storage layer unchanged.
	#[error("storage I/O error: {0}")]
	IOError(String),
}

fn fragment_suffix(fragment: &Option<String>) -> String {
	match fragment {
		Some(f) => format!(" (in `{f}`)"),
		None => String::new(),
	}
}

impl Error {
	pub fn invalid_query(message: impl Into<String>) -> Self {
		Error::InvalidQuery {
			message: message.into(),
			fragment: None,
		}
	}

	pub fn invalid_query_at(message: impl Into<String>, fragment: impl Into<String>) -> Self {
		Error::InvalidQuery {
			message: message.into(),
			fragment: Some(fragment.into()),
		}
	}

	pub fn out_of_range(message: impl Into<String>) -> Self {
		Error::OutOfRange {
			message: message.into(),
		}
	}

	pub fn missing_argument(index: usize, supplied: usize) -> Self {
		Error::MissingArgument { index, supplied }
	}

	pub fn unsupported(message: impl Into<String>) -> Self {
		Error::Unsupported {
			message: message.into(),
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_argument_message_names_index_and_supplied_count() {
		let e = Error::missing_argument(3, 1);
		assert_eq!(
			e.to_string(),
			"Request for argument at index 3 but only 1 arguments are provided"
		);
	}

	#[test]
	fn invalid_query_includes_fragment() {
		let e = Error::invalid_query_at("unknown column", "age > 2");
		assert!(e.to_string().contains("age > 2"));
	}
}
