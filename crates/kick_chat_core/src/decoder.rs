#![forbid(unsafe_code)]

use core::fmt;

use tracing::{debug, trace};

use crate::error::{Candidate, DecodeError, FailureReport};
use crate::escape::{
	collapse_double_backslash, collapse_escaped_quotes, decode_unicode_escapes_for_json, strip_outer_quotes,
	unescape_content,
};
use crate::message::{ChatMessage, WireChatMessage};

/// One text pass applied to a quote-stripped fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizeStep {
	CollapseDoubleBackslash,
	CollapseEscapedQuotes,
	/// JSON-safe flavour: escapes for `"`, `\` and control characters stay encoded.
	DecodeUnicodeEscapes,
}

impl NormalizeStep {
	pub fn apply(self, s: &str) -> String {
		match self {
			Self::CollapseDoubleBackslash => collapse_double_backslash(s),
			Self::CollapseEscapedQuotes => collapse_escaped_quotes(s),
			Self::DecodeUnicodeEscapes => decode_unicode_escapes_for_json(s),
		}
	}
}

/// Ordered normalization pipeline tried against a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
	/// One layer of escaping, the common case.
	SingleEscaped,
	/// Payload re-escaped once more by Kick.
	DoubleEscaped,
}

impl Strategy {
	/// Strategies in the order the default decoder tries them.
	pub const DEFAULT_ORDER: [Strategy; 2] = [Strategy::SingleEscaped, Strategy::DoubleEscaped];

	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::SingleEscaped => "single_escaped",
			Self::DoubleEscaped => "double_escaped",
		}
	}

	/// Steps in application order.
	pub const fn steps(self) -> &'static [NormalizeStep] {
		match self {
			Self::SingleEscaped => &[NormalizeStep::CollapseEscapedQuotes, NormalizeStep::DecodeUnicodeEscapes],
			Self::DoubleEscaped => &[
				NormalizeStep::CollapseDoubleBackslash,
				NormalizeStep::CollapseEscapedQuotes,
				NormalizeStep::DecodeUnicodeEscapes,
			],
		}
	}

	/// Run every step over a quote-stripped fragment.
	pub fn normalize(self, stripped: &str) -> String {
		self.steps()
			.iter()
			.fold(stripped.to_string(), |text, step| step.apply(&text))
	}
}

impl fmt::Display for Strategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Successful decode plus how it was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
	pub message: ChatMessage,

	/// Strategy whose candidate decoded.
	pub strategy: Strategy,

	/// Structured decode attempts made, including the successful one.
	pub attempts: usize,
}

/// Recovers chat messages from inconsistently escaped data fields.
///
/// Holds no mutable state; share one instance between tasks freely.
#[derive(Debug, Clone)]
pub struct ResilientDecoder {
	strategies: Vec<Strategy>,
}

impl Default for ResilientDecoder {
	fn default() -> Self {
		Self::with_strategies(Strategy::DEFAULT_ORDER)
	}
}

enum AttemptError {
	Json(serde_json::Error),
	Timestamp { value: String, source: chrono::ParseError },
}

impl fmt::Display for AttemptError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Json(err) => write!(f, "{err}"),
			Self::Timestamp { value, source } => write!(f, "created_at {value:?}: {source}"),
		}
	}
}

impl ResilientDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Decoder trying `strategies` in the given order.
	pub fn with_strategies(strategies: impl IntoIterator<Item = Strategy>) -> Self {
		Self {
			strategies: strategies.into_iter().collect(),
		}
	}

	pub fn strategies(&self) -> &[Strategy] {
		&self.strategies
	}

	/// Decode an envelope data field (quotes included) into a chat message.
	pub fn decode(&self, raw: &str) -> Result<ChatMessage, DecodeError> {
		self.decode_detailed(raw).map(|decoded| decoded.message)
	}

	/// Like [`Self::decode`], also reporting which strategy succeeded.
	pub fn decode_detailed(&self, raw: &str) -> Result<Decoded, DecodeError> {
		let Some(stripped) = strip_outer_quotes(raw) else {
			let reason = if raw.trim().chars().count() < 2 {
				"fragment shorter than two characters"
			} else {
				"fragment is not wrapped in quotes"
			};
			return Err(DecodeError::MalformedEnvelope {
				original: raw.to_string(),
				reason,
			});
		};

		let mut candidates = Vec::with_capacity(self.strategies.len());
		let mut last_error = None;

		for (idx, strategy) in self.strategies.iter().copied().enumerate() {
			let text = strategy.normalize(stripped);
			match decode_candidate(&text) {
				Ok(mut message) => {
					message.content = unescape_content(&message.content);
					let attempts = idx + 1;
					if attempts > 1 {
						debug!(%strategy, attempts, message_id = %message.id, "chat message recovered by fallback strategy");
					}
					return Ok(Decoded {
						message,
						strategy,
						attempts,
					});
				}
				Err(err) => {
					trace!(%strategy, error = %err, "normalized candidate rejected");
					candidates.push(Candidate { strategy, text });
					last_error = Some(err);
				}
			}
		}

		let original = raw.to_string();
		match last_error {
			Some(AttemptError::Timestamp { value, source }) => Err(DecodeError::TimestampFormat {
				value,
				report: Box::new(FailureReport {
					original,
					candidates,
					message: source.to_string(),
				}),
			}),
			Some(AttemptError::Json(err)) => Err(DecodeError::DecodeFailure(Box::new(FailureReport {
				original,
				candidates,
				message: err.to_string(),
			}))),
			None => Err(DecodeError::DecodeFailure(Box::new(FailureReport {
				original,
				candidates,
				message: "no normalization strategies configured".to_string(),
			}))),
		}
	}
}

fn decode_candidate(text: &str) -> Result<ChatMessage, AttemptError> {
	let wire: WireChatMessage = serde_json::from_str(text).map_err(AttemptError::Json)?;
	wire.into_message()
		.map_err(|invalid| AttemptError::Timestamp {
			value: invalid.value,
			source: invalid.source,
		})
}

/// Decode with the default strategy order.
pub fn decode_chat_message(raw: &str) -> Result<ChatMessage, DecodeError> {
	ResilientDecoder::default().decode(raw)
}
