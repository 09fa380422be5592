#![forbid(unsafe_code)]

//! Text passes that undo the escaping Kick applies to chat payloads.
//!
//! Every function here is total: malformed input is copied through rather
//! than rejected, and structured decoding decides whether the result is
//! usable.

const REPLACEMENT: char = '\u{FFFD}';

/// Length of a single `\uXXXX` escape.
const UNICODE_ESCAPE_LEN: usize = 6;

/// Where decoded unicode escapes end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscapeTarget {
	/// Text that is still going to be parsed as JSON.
	JsonText,
	/// Already decoded text shown to a human.
	Display,
	/// Decoded message content: JSON short escapes are resolved as well.
	Content,
}

/// Remove the JSON string quotes wrapping an envelope data field.
///
/// Surrounding whitespace is ignored. Returns `None` if fewer than two
/// characters remain or either end is not a `"`.
pub fn strip_outer_quotes(s: &str) -> Option<&str> {
	let s = s.trim();
	if s.len() < 2 {
		return None;
	}
	s.strip_prefix('"')?.strip_suffix('"')
}

/// Decode every `\uXXXX` escape into the character it encodes.
///
/// Escapes are UTF-16 code units: a high surrogate followed by a low
/// surrogate escape becomes a single character, an unpaired surrogate
/// becomes U+FFFD. A backslash followed by anything else is copied through
/// together with that character, so `\\u0041` stays untouched.
pub fn decode_unicode_escapes(s: &str) -> String {
	decode_unicode(s, EscapeTarget::Display)
}

/// Same as [`decode_unicode_escapes`] for text that still has to be parsed as
/// JSON: escapes for `"`, `\` and control characters are left encoded.
pub fn decode_unicode_escapes_for_json(s: &str) -> String {
	decode_unicode(s, EscapeTarget::JsonText)
}

/// Resolve the escapes a decoded message body still carries.
///
/// JSON short escapes (`\\`, `\"`, `\/`, `\b`, `\f`, `\n`, `\r`, `\t`) and
/// `\uXXXX` escapes are decoded in one left-to-right pass, so the backslash
/// produced by `\\` never starts another escape. Unknown escapes are copied
/// through.
pub fn unescape_content(s: &str) -> String {
	decode_unicode(s, EscapeTarget::Content)
}

/// Turn `\"` into `"`.
///
/// `\\"` is an escaped quote inside user text and becomes the JSON escape
/// `\"`, which decodes to a literal quote instead of closing the string.
pub fn collapse_escaped_quotes(s: &str) -> String {
	if !s.contains("\\\"") {
		return s.to_string();
	}

	let mut out = String::with_capacity(s.len());
	let mut rest = s;
	while let Some(pos) = rest.find('\\') {
		out.push_str(&rest[..pos]);
		rest = &rest[pos..];

		if let Some(tail) = rest.strip_prefix("\\\\\"") {
			out.push_str("\\\"");
			rest = tail;
		} else if let Some(tail) = rest.strip_prefix("\\\"") {
			out.push('"');
			rest = tail;
		} else {
			out.push('\\');
			rest = &rest[1..];
		}
	}
	out.push_str(rest);
	out
}

/// Turn `\\` into `\`, left to right without overlap.
pub fn collapse_double_backslash(s: &str) -> String {
	s.replace("\\\\", "\\")
}

fn decode_unicode(s: &str, target: EscapeTarget) -> String {
	let trigger = if target == EscapeTarget::Content { "\\" } else { "\\u" };
	if !s.contains(trigger) {
		return s.to_string();
	}

	let mut out = String::with_capacity(s.len());
	let mut rest = s;
	while let Some(pos) = rest.find('\\') {
		out.push_str(&rest[..pos]);
		rest = &rest[pos..];

		let Some(unit) = parse_unicode_escape(rest) else {
			let next = rest[1..].chars().next();
			if target == EscapeTarget::Content
				&& let Some(c) = next.and_then(short_escape)
			{
				out.push(c);
				rest = &rest[2..];
				continue;
			}
			let take = 1 + next.map_or(0, char::len_utf8);
			out.push_str(&rest[..take]);
			rest = &rest[take..];
			continue;
		};

		let after = &rest[UNICODE_ESCAPE_LEN..];
		match unit {
			0xD800..=0xDBFF => match parse_unicode_escape(after) {
				Some(low @ 0xDC00..=0xDFFF) => {
					let c = combine_surrogates(unit, low);
					push_decoded(&mut out, c, &rest[..UNICODE_ESCAPE_LEN * 2], target);
					rest = &rest[UNICODE_ESCAPE_LEN * 2..];
				}
				_ => {
					out.push(REPLACEMENT);
					rest = after;
				}
			},
			0xDC00..=0xDFFF => {
				out.push(REPLACEMENT);
				rest = after;
			}
			_ => {
				let c = char::from_u32(u32::from(unit)).unwrap_or(REPLACEMENT);
				push_decoded(&mut out, c, &rest[..UNICODE_ESCAPE_LEN], target);
				rest = after;
			}
		}
	}
	out.push_str(rest);
	out
}

/// Character a JSON short escape (`\n`, `\t`, ...) stands for.
fn short_escape(c: char) -> Option<char> {
	match c {
		'"' => Some('"'),
		'\\' => Some('\\'),
		'/' => Some('/'),
		'b' => Some('\u{8}'),
		'f' => Some('\u{c}'),
		'n' => Some('\n'),
		'r' => Some('\r'),
		't' => Some('\t'),
		_ => None,
	}
}

/// Parse a `\uXXXX` escape at the start of `s`.
fn parse_unicode_escape(s: &str) -> Option<u16> {
	let hex = s.strip_prefix("\\u")?.get(..4)?;
	if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
		return None;
	}
	u16::from_str_radix(hex, 16).ok()
}

fn combine_surrogates(high: u16, low: u16) -> char {
	let code = 0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(low) - 0xDC00);
	char::from_u32(code).unwrap_or(REPLACEMENT)
}

fn push_decoded(out: &mut String, c: char, escape: &str, target: EscapeTarget) {
	let keep_escaped = target == EscapeTarget::JsonText && (c == '"' || c == '\\' || c < '\u{20}');
	if keep_escaped {
		out.push_str(escape);
	} else {
		out.push(c);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strip_outer_quotes_requires_both_ends() {
		assert_eq!(strip_outer_quotes("\"{}\""), Some("{}"));
		assert_eq!(strip_outer_quotes("  \"abc\"\n"), Some("abc"));
		assert_eq!(strip_outer_quotes("\"\""), Some(""));
		assert_eq!(strip_outer_quotes(""), None);
		assert_eq!(strip_outer_quotes("\""), None);
		assert_eq!(strip_outer_quotes("{}"), None);
		assert_eq!(strip_outer_quotes("\"{}"), None);
		assert_eq!(strip_outer_quotes("{}\""), None);
	}

	#[test]
	fn decodes_bmp_escape() {
		assert_eq!(decode_unicode_escapes("it\\u2019s"), "it\u{2019}s");
		assert_eq!(decode_unicode_escapes("\\u00e9t\\u00E9"), "\u{e9}t\u{e9}");
	}

	#[test]
	fn combines_surrogate_pairs() {
		let decoded = decode_unicode_escapes("\\ud83d\\ude00");
		assert_eq!(decoded, "\u{1F600}");
		assert_eq!(decoded.chars().count(), 1);

		assert_eq!(decode_unicode_escapes("a\\ud83d\\udc4db"), "a\u{1F44D}b");
	}

	#[test]
	fn unpaired_surrogates_become_replacement_chars() {
		assert_eq!(decode_unicode_escapes("\\ud83dx"), "\u{FFFD}x");
		assert_eq!(decode_unicode_escapes("\\ude00"), "\u{FFFD}");
		assert_eq!(decode_unicode_escapes("\\ud83d\\u0041"), "\u{FFFD}A");
	}

	#[test]
	fn escaped_backslash_does_not_start_unicode_escape() {
		assert_eq!(decode_unicode_escapes("\\\\u2019"), "\\\\u2019");
		assert_eq!(decode_unicode_escapes("\\\\\\u2019"), "\\\\\u{2019}");
	}

	#[test]
	fn malformed_escapes_are_copied_verbatim() {
		assert_eq!(decode_unicode_escapes("\\u12"), "\\u12");
		assert_eq!(decode_unicode_escapes("\\uzzzz"), "\\uzzzz");
		assert_eq!(decode_unicode_escapes("\\U2019"), "\\U2019");
		assert_eq!(decode_unicode_escapes("tail\\"), "tail\\");
		assert_eq!(decode_unicode_escapes("\\\u{e9}\\u"), "\\\u{e9}\\u");
	}

	#[test]
	fn json_flavour_keeps_structural_characters_escaped() {
		assert_eq!(decode_unicode_escapes_for_json("\\u0022"), "\\u0022");
		assert_eq!(decode_unicode_escapes_for_json("\\u005c"), "\\u005c");
		assert_eq!(decode_unicode_escapes_for_json("\\u000a"), "\\u000a");
		assert_eq!(
			decode_unicode_escapes_for_json("\\u2019\\ud83d\\ude00"),
			"\u{2019}\u{1F600}"
		);

		assert_eq!(decode_unicode_escapes("\\u0022"), "\"");
	}

	#[test]
	fn content_pass_resolves_short_escapes() {
		assert_eq!(unescape_content(r"a\\"), r"a\");
		assert_eq!(unescape_content(r"tab\there"), "tab\there");
		assert_eq!(unescape_content(r"l1\nl2\r\n"), "l1\nl2\r\n");
		assert_eq!(unescape_content(r#"\/\b\f\""#), "/\u{8}\u{c}\"");
		assert_eq!(unescape_content(r"it\u2019s \ud83d\ude00"), "it\u{2019}s \u{1F600}");
	}

	#[test]
	fn content_pass_does_not_rescan_decoded_backslashes() {
		assert_eq!(unescape_content(r"x\\u0041"), r"x\u0041");
		assert_eq!(unescape_content(r"\\n"), r"\n");
		assert_eq!(unescape_content(r"\\\\"), r"\\");
	}

	#[test]
	fn content_pass_copies_unknown_escapes() {
		assert_eq!(unescape_content(r"\q\u12 end\"), r"\q\u12 end\");
		assert_eq!(unescape_content("no escapes"), "no escapes");
	}

	#[test]
	fn collapses_escaped_quotes() {
		assert_eq!(collapse_escaped_quotes(r#"{\"id\":\"x\"}"#), r#"{"id":"x"}"#);
		assert_eq!(collapse_escaped_quotes("no escapes"), "no escapes");
	}

	#[test]
	fn escaped_backslash_quote_becomes_json_escape() {
		assert_eq!(collapse_escaped_quotes(r#"whaa . \\""#), r#"whaa . \""#);
		assert_eq!(collapse_escaped_quotes(r#"say \\"hi\\""#), r#"say \"hi\""#);
	}

	#[test]
	fn lone_backslashes_survive_quote_collapse() {
		assert_eq!(collapse_escaped_quotes(r#"a\b \""#), r#"a\b ""#);
	}

	#[test]
	fn collapses_double_backslash_without_overlap() {
		assert_eq!(collapse_double_backslash(r"\\"), r"\");
		assert_eq!(collapse_double_backslash(r"\\\"), r"\\");
		assert_eq!(collapse_double_backslash(r"\\\\"), r"\\");
		assert_eq!(collapse_double_backslash("\\\\u2019"), "\\u2019");
	}
}
