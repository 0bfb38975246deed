//! Textual rendering of [`Value`] literals, shared by every `describe()`
//! implementation so the whole crate renders literals identically
//! regardless of which node or expression holds them.

use crate::value::{Timestamp, Value};
use std::fmt::Write as _;

/// Renders `value` as it would appear in the predicate grammar, suitable
/// for `describe()`/round-trip serialisation.
pub fn format_value(value: &Value) -> String {
	match value {
		Value::Null => "NULL".to_string(),
		Value::Bool(b) => b.to_string(),
		Value::Int(i) => {
			let mut buf = itoa::Buffer::new();
			buf.format(*i).to_string()
		}
		Value::Float(f) => {
			let mut buf = ryu::Buffer::new();
			format!("{}f", buf.format(*f))
		}
		Value::Double(d) => {
			let mut buf = ryu::Buffer::new();
			buf.format(*d).to_string()
		}
		Value::String(s) => format_string(s),
		Value::Binary(b) => format_binary(b),
		Value::Timestamp(t) => format_timestamp(t),
		Value::Link(k) => k.to_string(),
		Value::List(items) => {
			let mut out = String::from("{");
			for (i, item) in items.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				out.push_str(&format_value(item));
			}
			out.push('}');
			out
		}
	}
}

/// C-escaped, single-quoted string literal. Non-ASCII code points are
/// emitted as `\uXXXX` escapes.
pub fn format_string(s: &str) -> String {
	let mut out = String::with_capacity(s.len() + 2);
	out.push('\'');
	for c in s.chars() {
		match c {
			'\'' => out.push_str("\\'"),
			'\\' => out.push_str("\\\\"),
			'\n' => out.push_str("\\n"),
			'\r' => out.push_str("\\r"),
			'\t' => out.push_str("\\t"),
			c if (c as u32) < 0x20 || (c as u32) == 0x7f => {
				let _ = write!(out, "\\u{:04x}", c as u32);
			}
			c if c.is_ascii() => out.push(c),
			c => {
				let _ = write!(out, "\\u{:04x}", c as u32);
			}
		}
	}
	out.push('\'');
	out
}

/// Base64 binary literal, padded to a 4-byte multiple. All binary values
/// round-trip through this form, not just the ones that would otherwise
/// need escaping — that keeps `format_value` total and unambiguous.
pub fn format_binary(bytes: &[u8]) -> String {
	use base64::Engine as _;
	let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
	format!("B64\"{encoded}\"")
}

/// `T<seconds>:<nanoseconds>` form. Only non-negative second/nanosecond
/// pairs are constructible (`Timestamp` rejects negative
/// nanoseconds at the parser boundary), so this never needs a sign on the
/// nanosecond component.
pub fn format_timestamp(t: &Timestamp) -> String {
	format!("T{}:{}", t.seconds, t.nanoseconds)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn string_escapes_quote_and_backslash() {
		assert_eq!(format_string("a'b\\c"), "'a\\'b\\\\c'");
	}

	#[test]
	fn string_escapes_non_ascii_as_unicode_escape() {
		assert_eq!(format_string("café"), "'caf\\u00e9'");
	}

	#[test]
	fn binary_round_trips_as_base64() {
		let rendered = format_binary(&[0xde, 0xad, 0xbe, 0xef]);
		assert_eq!(rendered, "B64\"3q2+7w==\"");
	}

	#[test]
	fn timestamp_renders_seconds_colon_nanos() {
		let t = Timestamp::new(-1, 1);
		assert_eq!(format_timestamp(&t), "T-1:1");
	}
}
