//! Low-level token parsers: literals, identifiers and whitespace handling
//! shared by [`super::grammar`].

use crate::value::Value;
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while, take_while1};
use nom::character::complete::{char, digit1, multispace0};
use nom::combinator::{map, opt, recognize, value as nom_value, verify};
use nom::multi::many0;
use nom::sequence::{pair, preceded, tuple};
use nom::IResult;

pub fn ws(input: &str) -> IResult<&str, &str> {
	multispace0(input)
}

/// Wraps `inner`, consuming any surrounding whitespace.
pub fn token<'a, O, F>(mut inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
	F: FnMut(&'a str) -> IResult<&'a str, O>,
{
	move |input: &'a str| {
		let (input, _) = ws(input)?;
		let (input, out) = inner(input)?;
		Ok((input, out))
	}
}

fn is_ident_start(c: char) -> bool {
	c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '_'
}

/// A bare identifier: table/property/class name, keyword, etc. Does not
/// itself reject keywords — the grammar layer decides context.
pub fn identifier(input: &str) -> IResult<&str, &str> {
	token(recognize(pair(take_while1(is_ident_start), take_while(is_ident_continue))))(input)
}

/// `$N`: a numeric argument placeholder.
pub fn arg_placeholder(input: &str) -> IResult<&str, usize> {
	token(preceded(char('$'), map(digit1, |d: &str| d.parse::<usize>().unwrap_or(0))))(input)
}

/// `$name`: a subquery element variable reference (distinguished from
/// [`arg_placeholder`] by starting with a letter rather than a digit).
pub fn self_var(input: &str) -> IResult<&str, &str> {
	token(preceded(char('$'), verify(identifier_raw, |s: &str| !s.is_empty())))(input)
}

fn identifier_raw(input: &str) -> IResult<&str, &str> {
	recognize(pair(take_while1(is_ident_start), take_while(is_ident_continue)))(input)
}

pub fn kw<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
	token(tag_no_case(word))
}

pub fn punct<'a>(p: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
	token(tag(p))
}

/// `NULL` / `NIL`.
pub fn null_literal(input: &str) -> IResult<&str, Value> {
	token(nom_value(Value::Null, alt((tag_no_case("NULL"), tag_no_case("NIL")))))(input)
}

pub fn bool_literal(input: &str) -> IResult<&str, Value> {
	token(alt((
		nom_value(Value::Bool(true), tag_no_case("true")),
		nom_value(Value::Bool(false), tag_no_case("false")),
	)))(input)
}

/// Ints (including hex `0x…`), doubles, and the `f`-suffixed `Float` form.
pub fn number_literal(input: &str) -> IResult<&str, Value> {
	token(alt((hex_int_literal, decimal_number_literal)))(input)
}

fn hex_int_literal(input: &str) -> IResult<&str, Value> {
	let (input, neg) = opt(char('-'))(input)?;
	let (input, _) = alt((tag("0x"), tag("0X")))(input)?;
	let (input, digits) = take_while1(|c: char| c.is_ascii_hexdigit())(input)?;
	let magnitude = i64::from_str_radix(digits, 16).unwrap_or(0);
	let v = if neg.is_some() { -magnitude } else { magnitude };
	Ok((input, Value::Int(v)))
}

fn decimal_number_literal(input: &str) -> IResult<&str, Value> {
	let (input, neg) = opt(char('-'))(input)?;
	let (input, int_part) = digit1(input)?;
	let (input, frac_part) = opt(preceded(char('.'), digit1))(input)?;
	let (input, exp_part) = opt(tuple((alt((char('e'), char('E'))), opt(alt((char('+'), char('-')))), digit1)))(input)?;
	let (input, float_suffix) = opt(alt((char('f'), char('F'))))(input)?;

	let sign = if neg.is_some() { "-" } else { "" };
	if frac_part.is_none() && exp_part.is_none() && float_suffix.is_none() {
		let text = format!("{sign}{int_part}");
		let v: i64 = text.parse().unwrap_or(0);
		return Ok((input, Value::Int(v)));
	}

	let mut text = format!("{sign}{int_part}");
	if let Some(frac) = frac_part {
		text.push('.');
		text.push_str(frac);
	}
	if let Some((e, sign_char, exp_digits)) = exp_part {
		text.push(e);
		if let Some(s) = sign_char {
			text.push(s);
		}
		text.push_str(exp_digits);
	}
	let parsed: f64 = text.parse().unwrap_or(0.0);
	if float_suffix.is_some() {
		Ok((input, Value::Float(parsed as f32)))
	} else {
		Ok((input, Value::Double(parsed)))
	}
}

/// A single-quoted string literal with C-style escapes and `\uXXXX`.
pub fn string_literal(input: &str) -> IResult<&str, String> {
	token(parse_quoted_string)(input)
}

fn parse_quoted_string(input: &str) -> IResult<&str, String> {
	let (mut rest, _) = char('\'')(input)?;
	let mut out = String::new();
	loop {
		let mut chars = rest.char_indices();
		match chars.next() {
			None => return Err(nom::Err::Error(nom::error::Error::new(rest, nom::error::ErrorKind::Eof))),
			Some((_, '\'')) => {
				rest = &rest[1..];
				break;
			}
			Some((_, '\\')) => {
				let after_backslash = &rest[1..];
				let mut esc_chars = after_backslash.char_indices();
				match esc_chars.next() {
					None => return Err(nom::Err::Error(nom::error::Error::new(rest, nom::error::ErrorKind::Eof))),
					Some((_, 'n')) => {
						out.push('\n');
						rest = &after_backslash[1..];
					}
					Some((_, 'r')) => {
						out.push('\r');
						rest = &after_backslash[1..];
					}
					Some((_, 't')) => {
						out.push('\t');
						rest = &after_backslash[1..];
					}
					Some((_, '\'')) => {
						out.push('\'');
						rest = &after_backslash[1..];
					}
					Some((_, '\\')) => {
						out.push('\\');
						rest = &after_backslash[1..];
					}
					Some((_, 'u')) => {
						let hex_src = &after_backslash[1..];
						if hex_src.len() < 4 {
							return Err(nom::Err::Error(nom::error::Error::new(rest, nom::error::ErrorKind::Eof)));
						}
						let (hex, remainder) = hex_src.split_at(4);
						let code = u32::from_str_radix(hex, 16)
							.map_err(|_| nom::Err::Error(nom::error::Error::new(rest, nom::error::ErrorKind::Digit)))?;
						let c = char::from_u32(code).unwrap_or('\u{FFFD}');
						out.push(c);
						rest = remainder;
					}
					Some((_, other)) => {
						out.push(other);
						rest = &after_backslash[other.len_utf8()..];
					}
				}
			}
			Some((_, c)) => {
				out.push(c);
				rest = &rest[c.len_utf8()..];
			}
		}
	}
	Ok((rest, out))
}

/// `B64"…"`: base64-encoded binary literal.
pub fn binary_literal(input: &str) -> IResult<&str, Value> {
	token(|input| {
		let (input, _) = tag("B64")(input)?;
		let (input, _) = char('"')(input)?;
		let (input, body) = take_while(|c: char| c != '"')(input)?;
		let (input, _) = char('"')(input)?;
		use base64::Engine as _;
		let decoded = base64::engine::general_purpose::STANDARD
			.decode(body)
			.map_err(|_| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Verify)))?;
		Ok((input, Value::Binary(decoded)))
	})(input)
}

/// `T<seconds>:<nanoseconds>` or `YYYY-MM-DD(@|T)HH:MM:SS(:ns)`. Returns raw
/// `(seconds, nanoseconds)` rather than a [`Timestamp`] since the surface
/// grammar syntactically allows a negative nanosecond part that
/// [`super::builder`] must reject as `Error::OutOfRange` at build time, not
/// parse time — a signed `i64` carries that case through without a
/// sentinel.
pub fn timestamp_literal(input: &str) -> IResult<&str, (i64, i64)> {
	token(alt((short_timestamp, iso_timestamp)))(input)
}

fn signed_i64(input: &str) -> IResult<&str, i64> {
	let (input, neg) = opt(char('-'))(input)?;
	let (input, digits) = digit1(input)?;
	let magnitude: i64 = digits.parse().unwrap_or(0);
	Ok((input, if neg.is_some() { -magnitude } else { magnitude }))
}

fn short_timestamp(input: &str) -> IResult<&str, (i64, i64)> {
	let (input, _) = char('T')(input)?;
	let (input, seconds) = signed_i64(input)?;
	let (input, _) = char(':')(input)?;
	let (input, nanos) = signed_i64(input)?;
	Ok((input, (seconds, nanos)))
}

fn two_digit(input: &str) -> IResult<&str, u32> {
	let (input, digits) = nom::bytes::complete::take(2usize)(input)?;
	let n: u32 = digits.parse().map_err(|_| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)))?;
	Ok((input, n))
}

fn iso_timestamp(input: &str) -> IResult<&str, (i64, i64)> {
	let (input, year) = nom::bytes::complete::take(4usize)(input)?;
	let year: i64 = year.parse().map_err(|_| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)))?;
	let (input, _) = char('-')(input)?;
	let (input, month) = two_digit(input)?;
	let (input, _) = char('-')(input)?;
	let (input, day) = two_digit(input)?;
	let (input, _) = alt((char('@'), char('T')))(input)?;
	let (input, hour) = two_digit(input)?;
	let (input, _) = char(':')(input)?;
	let (input, minute) = two_digit(input)?;
	let (input, _) = char(':')(input)?;
	let (input, second) = two_digit(input)?;
	let (input, nanos) = opt(preceded(char(':'), signed_i64))(input)?;

	use chrono::{NaiveDate, TimeZone, Utc};
	let date = NaiveDate::from_ymd_opt(year as i32, month, day)
		.ok_or_else(|| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Verify)))?;
	let naive = date
		.and_hms_opt(hour, minute, second)
		.ok_or_else(|| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Verify)))?;
	let seconds = Utc.from_utc_datetime(&naive).timestamp();

	Ok((input, (seconds, nanos.unwrap_or(0))))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_hex_int() {
		let (_, v) = number_literal("0x1F").unwrap();
		assert_eq!(v, Value::Int(31));
	}

	#[test]
	fn parses_plain_int() {
		let (_, v) = number_literal("-42").unwrap();
		assert_eq!(v, Value::Int(-42));
	}

	#[test]
	fn parses_double_and_float_suffix() {
		let (_, v) = number_literal("3.5").unwrap();
		assert_eq!(v, Value::Double(3.5));
		let (_, v) = number_literal("3.5f").unwrap();
		assert_eq!(v, Value::Float(3.5));
	}

	#[test]
	fn parses_escaped_string() {
		let (_, s) = string_literal("'a\\'b\\nc'").unwrap();
		assert_eq!(s, "a'b\nc");
	}

	#[test]
	fn parses_unicode_escape() {
		let (_, s) = string_literal("'caf\\u00e9'").unwrap();
		assert_eq!(s, "café");
	}

	#[test]
	fn parses_short_timestamp_with_negative_seconds() {
		let (_, (seconds, nanos)) = timestamp_literal("T-1:1").unwrap();
		assert_eq!(seconds, -1);
		assert_eq!(nanos, 1);
	}

	#[test]
	fn parses_short_timestamp_flags_negative_nanos() {
		let (_, (_, nanos)) = timestamp_literal("T0:-1").unwrap();
		assert_eq!(nanos, -1);
	}

	#[test]
	fn parses_iso_timestamp() {
		let (_, (seconds, nanos)) = timestamp_literal("1969-12-31@23:59:59:1").unwrap();
		assert_eq!(seconds, -1);
		assert_eq!(nanos, 1);
	}

	#[test]
	fn parses_base64_binary() {
		let (_, v) = binary_literal("B64\"3q2+7w==\"").unwrap();
		assert_eq!(v, Value::Binary(vec![0xde, 0xad, 0xbe, 0xef]));
	}

	#[test]
	fn parses_arg_placeholder() {
		let (_, n) = arg_placeholder("$3").unwrap();
		assert_eq!(n, 3);
	}
}
