#![forbid(unsafe_code)]

use anyhow::Context as _;
use kick_chat_core::ChatMessage;

/// How decoded messages are written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
	/// `username: content`
	#[default]
	Text,
	/// One JSON object per line.
	Json,
}

impl OutputFormat {
	pub fn render(self, msg: &ChatMessage) -> anyhow::Result<String> {
		match self {
			Self::Text => Ok(format!("{}: {}", msg.sender.username, msg.content)),
			Self::Json => serde_json::to_string(msg).context("serialize chat message"),
		}
	}
}
