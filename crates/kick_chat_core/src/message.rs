#![forbid(unsafe_code)]

use core::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
}

/// Kick chat message identifier (a UUID in practice, only non-emptiness is checked).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
	/// Create a non-empty `MessageId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl TryFrom<String> for MessageId {
	type Error = ParseIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		MessageId::new(value)
	}
}

impl From<MessageId> for String {
	fn from(value: MessageId) -> Self {
		value.0
	}
}

/// Decoded Kick chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
	pub id: MessageId,

	pub chatroom_id: u64,

	/// Message text with transport escapes resolved (emotes stay as `[emote:id:name]` markup).
	pub content: String,

	/// Message kind tag (`message`, `reply`, ...), not interpreted.
	#[serde(rename = "type")]
	pub kind: String,

	pub created_at: DateTime<Utc>,

	pub sender: Sender,
}

/// Message author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
	pub id: u64,
	pub username: String,
	pub slug: String,
	#[serde(default)]
	pub identity: Identity,
}

/// Author cosmetics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	/// Username color, `#RRGGBB` in practice.
	#[serde(default)]
	pub color: String,

	/// Badges in the order Kick sent them.
	#[serde(default)]
	pub badges: Vec<Badge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub text: String,
	/// Months for subscriber badges; zero when Kick omits it.
	#[serde(default)]
	pub count: u32,
}

impl Sender {
	/// Whether the sender carries a badge of the given type.
	pub fn has_badge(&self, kind: &str) -> bool {
		self.identity.badges.iter().any(|badge| badge.kind == kind)
	}
}

/// Parse a Kick `created_at` value.
///
/// Accepts RFC 3339 (`2023-06-22T04:57:02+00:00`, `...Z`, fractional
/// seconds) and offset-less ISO-8601 date-times, which are taken as UTC.
pub fn parse_created_at(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
	let value = value.trim();
	match DateTime::parse_from_rfc3339(value) {
		Ok(parsed) => Ok(parsed.with_timezone(&Utc)),
		Err(err) => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
			.map(|naive| naive.and_utc())
			.map_err(|_| err),
	}
}

/// Chat message as it appears on the wire, before the timestamp is checked.
#[derive(Debug, Deserialize)]
pub(crate) struct WireChatMessage {
	id: MessageId,
	chatroom_id: u64,
	content: String,
	#[serde(rename = "type")]
	kind: String,
	created_at: String,
	sender: Sender,
}

/// `created_at` that failed to parse.
#[derive(Debug)]
pub(crate) struct InvalidTimestamp {
	pub(crate) value: String,
	pub(crate) source: chrono::ParseError,
}

impl WireChatMessage {
	pub(crate) fn into_message(self) -> Result<ChatMessage, InvalidTimestamp> {
		let created_at = match parse_created_at(&self.created_at) {
			Ok(ts) => ts,
			Err(source) => {
				return Err(InvalidTimestamp {
					value: self.created_at,
					source,
				});
			}
		};

		Ok(ChatMessage {
			id: self.id,
			chatroom_id: self.chatroom_id,
			content: self.content,
			kind: self.kind,
			created_at,
			sender: self.sender,
		})
	}
}
