#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use thiserror::Error;

pub const CONNECTION_ESTABLISHED_EVENT: &str = "pusher:connection_established";
pub const SUBSCRIPTION_SUCCEEDED_EVENT: &str = "pusher_internal:subscription_succeeded";
pub const CHAT_MESSAGE_EVENT: &str = r"App\Events\ChatMessageEvent";
pub const PING_EVENT: &str = "pusher:ping";
pub const PONG_EVENT: &str = "pusher:pong";
pub const ERROR_EVENT: &str = "pusher:error";
pub const SUBSCRIBE_EVENT: &str = "pusher:subscribe";
pub const UNSUBSCRIBE_EVENT: &str = "pusher:unsubscribe";

/// Errors for parsing chatroom ids.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseChatroomIdError {
	#[error("empty value")]
	Empty,
	#[error("chatroom id must be numeric: {0}")]
	NotNumeric(String),
}

/// Numeric Kick chatroom id (not the channel/broadcaster id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChatroomId(u64);

impl ChatroomId {
	pub const fn new(id: u64) -> Self {
		Self(id)
	}

	pub const fn get(self) -> u64 {
		self.0
	}

	/// Pusher channel carrying this chatroom's messages.
	pub fn channel_name(self) -> String {
		format!("chatrooms.{}.v2", self.0)
	}

	/// Inverse of [`Self::channel_name`].
	pub fn from_channel_name(channel: &str) -> Option<Self> {
		let id = channel.strip_prefix("chatrooms.")?.strip_suffix(".v2")?;
		id.parse().ok().map(Self)
	}
}

impl fmt::Display for ChatroomId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for ChatroomId {
	type Err = ParseChatroomIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseChatroomIdError::Empty);
		}
		s.parse::<u64>()
			.map(Self)
			.map_err(|_| ParseChatroomIdError::NotNumeric(s.to_string()))
	}
}

/// Outer Pusher frame. `data` is kept verbatim so chat fragments reach the decoder untouched.
#[derive(Debug, Deserialize)]
pub struct PusherEnvelope {
	pub event: String,

	#[serde(default)]
	pub channel: Option<String>,

	#[serde(default)]
	pub data: Option<Box<RawValue>>,
}

impl PusherEnvelope {
	/// Raw `data` text, empty when absent.
	pub fn raw_data(&self) -> &str {
		self.data.as_deref().map_or("", RawValue::get)
	}
}

/// Socket parameters announced by `pusher:connection_established`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectionInfo {
	#[serde(default)]
	pub socket_id: Option<String>,

	/// Seconds of silence after which the client should ping.
	#[serde(default)]
	pub activity_timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PusherError {
	#[serde(default)]
	pub code: Option<u32>,
	#[serde(default)]
	pub message: Option<String>,
}

impl fmt::Display for PusherError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let message = self.message.as_deref().unwrap_or("unknown error");
		match self.code {
			Some(code) => write!(f, "{message} (code={code})"),
			None => f.write_str(message),
		}
	}
}

impl PusherError {
	/// Pusher reserves 4000-4099 for errors that must not be retried as-is.
	pub fn is_fatal(&self) -> bool {
		self.code.is_some_and(|code| (4000..4100).contains(&code))
	}
}

/// Inbound frame routed by its event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PusherEvent {
	ConnectionEstablished(ConnectionInfo),
	SubscriptionSucceeded { channel: Option<String> },
	/// Raw chat fragment, quotes included.
	ChatMessage { channel: Option<String>, data: String },
	Ping,
	Pong,
	Error(PusherError),
	Other { event: String, channel: Option<String> },
}

impl PusherEvent {
	/// Stable label for logs and metrics.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::ConnectionEstablished(_) => "connection_established",
			Self::SubscriptionSucceeded { .. } => "subscription_succeeded",
			Self::ChatMessage { .. } => "chat_message",
			Self::Ping => "ping",
			Self::Pong => "pong",
			Self::Error(_) => "error",
			Self::Other { .. } => "other",
		}
	}
}

/// Parse a websocket text frame into a routed event.
pub fn parse_event(text: &str) -> Result<PusherEvent, serde_json::Error> {
	let envelope: PusherEnvelope = serde_json::from_str(text)?;
	Ok(route(envelope))
}

fn route(envelope: PusherEnvelope) -> PusherEvent {
	match envelope.event.as_str() {
		CONNECTION_ESTABLISHED_EVENT => PusherEvent::ConnectionEstablished(nested_data(envelope.raw_data())),
		SUBSCRIPTION_SUCCEEDED_EVENT => PusherEvent::SubscriptionSucceeded {
			channel: envelope.channel,
		},
		CHAT_MESSAGE_EVENT => PusherEvent::ChatMessage {
			data: envelope.raw_data().to_string(),
			channel: envelope.channel,
		},
		PING_EVENT => PusherEvent::Ping,
		PONG_EVENT => PusherEvent::Pong,
		ERROR_EVENT => PusherEvent::Error(nested_data(envelope.raw_data())),
		_ => PusherEvent::Other {
			event: envelope.event,
			channel: envelope.channel,
		},
	}
}

/// Decode control-event data that may arrive as an object or as a JSON string holding one.
fn nested_data<T: DeserializeOwned + Default>(raw: &str) -> T {
	if raw.is_empty() {
		return T::default();
	}
	if let Ok(inner) = serde_json::from_str::<String>(raw) {
		return serde_json::from_str(&inner).unwrap_or_default();
	}
	serde_json::from_str(raw).unwrap_or_default()
}

/// `pusher:subscribe` frame for a public chatroom channel.
pub fn subscribe_message(chatroom: ChatroomId) -> String {
	serde_json::json!({
		"event": SUBSCRIBE_EVENT,
		"data": { "auth": "", "channel": chatroom.channel_name() },
	})
	.to_string()
}

pub fn unsubscribe_message(chatroom: ChatroomId) -> String {
	serde_json::json!({
		"event": UNSUBSCRIBE_EVENT,
		"data": { "channel": chatroom.channel_name() },
	})
	.to_string()
}

pub fn ping_message() -> String {
	serde_json::json!({ "event": PING_EVENT, "data": {} }).to_string()
}

pub fn pong_message() -> String {
	serde_json::json!({ "event": PONG_EVENT, "data": {} }).to_string()
}
