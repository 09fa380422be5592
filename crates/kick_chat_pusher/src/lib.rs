#![forbid(unsafe_code)]

pub mod client;
pub mod envelope;
pub mod listener;

use std::fmt;
use std::time::SystemTime;

use kick_chat_core::ChatMessage;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use client::{ChatMode, KickChatroom, KickClient};
pub use envelope::{ChatroomId, ParseChatroomIdError, PusherEvent, parse_event};
pub use listener::{KickChatConfig, KickChatListener};

/// Caller → listener control message.
#[derive(Debug)]
pub enum ListenerControl {
	/// Subscribe to a chatroom.
	Join { chatroom: ChatroomId },

	/// Unsubscribe from a chatroom.
	Leave { chatroom: ChatroomId },

	/// Close the socket and stop.
	Shutdown,
}

/// Listener → caller event.
#[derive(Debug, Clone)]
pub enum ListenerEvent {
	/// Successfully decoded chat message.
	Chat(Box<ChatMessage>),

	/// Connection status update.
	Status(ListenerStatus),
}

#[derive(Debug, Clone)]
pub struct ListenerStatus {
	pub connected: bool,
	pub detail: String,
	pub last_error: Option<String>,
	pub time: SystemTime,
}

impl fmt::Display for ListenerStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.last_error {
			Some(err) => write!(f, "{}: {err}", self.detail),
			None => f.write_str(&self.detail),
		}
	}
}

pub type ListenerControlTx = mpsc::Sender<ListenerControl>;
pub type ListenerControlRx = mpsc::Receiver<ListenerControl>;
pub type ListenerEventTx = mpsc::Sender<ListenerEvent>;
pub type ListenerEventRx = mpsc::Receiver<ListenerEvent>;

/// Build a standard bounded channel pair.
pub fn bounded_listener_channels(
	control_capacity: usize,
	events_capacity: usize,
) -> (ListenerControlTx, ListenerControlRx, ListenerEventTx, ListenerEventRx) {
	let (control_tx, control_rx) = mpsc::channel(control_capacity);
	let (events_tx, events_rx) = mpsc::channel(events_capacity);
	(control_tx, control_rx, events_tx, events_rx)
}

/// Build a status event.
pub fn status(connected: bool, detail: impl Into<String>) -> ListenerEvent {
	ListenerEvent::Status(ListenerStatus {
		connected,
		detail: detail.into(),
		last_error: None,
		time: SystemTime::now(),
	})
}

/// Build an error status event.
pub fn status_error(detail: impl Into<String>, err: impl fmt::Display) -> ListenerEvent {
	ListenerEvent::Status(ListenerStatus {
		connected: false,
		detail: detail.into(),
		last_error: Some(err.to_string()),
		time: SystemTime::now(),
	})
}

/// Generate an opaque session id.
pub fn new_session_id() -> String {
	Uuid::new_v4().to_string()
}
