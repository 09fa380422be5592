#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use anyhow::{Context, anyhow};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::envelope::ChatroomId;

pub const DEFAULT_BASE_URL: &str = "https://kick.com";

#[derive(Debug, Clone)]
pub struct KickClient {
	base_url: String,
	client: reqwest::Client,
}

/// Chatroom settings returned by the channel chatroom endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct KickChatroom {
	pub id: u64,

	#[serde(default)]
	pub slow_mode: ChatMode,

	#[serde(default)]
	pub subscribers_mode: ChatMode,

	#[serde(default)]
	pub followers_mode: ChatMode,

	#[serde(default)]
	pub emotes_mode: ChatMode,

	#[serde(default)]
	pub pinned_message: Option<serde_json::Value>,
}

impl KickChatroom {
	pub fn chatroom_id(&self) -> ChatroomId {
		ChatroomId::new(self.id)
	}
}

/// One chat restriction toggle.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatMode {
	#[serde(default)]
	pub enabled: bool,

	/// Seconds between messages (slow mode).
	#[serde(default)]
	pub message_interval: Option<u64>,

	/// Minutes a viewer must have followed (followers mode).
	#[serde(default)]
	pub min_duration: Option<u64>,
}

impl KickClient {
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			client: reqwest::Client::new(),
		}
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	/// Fetch a channel's chatroom, `None` when the channel does not exist.
	pub async fn get_chatroom(&self, slug: &str) -> anyhow::Result<Option<KickChatroom>> {
		let url = format!(
			"{}/api/v2/channels/{}/chatroom",
			self.base_url.trim_end_matches('/'),
			urlencoding::encode(slug)
		);
		let resp = self
			.client
			.get(url)
			.header("Accept", "application/json")
			.header("User-Agent", "kick-chat/0.1")
			.send()
			.await
			.context("kick get chatroom")?;

		match resp.status() {
			StatusCode::NOT_FOUND => return Ok(None),
			StatusCode::FORBIDDEN => {
				return Err(anyhow!(
					"kick get chatroom failed: status=403 (endpoint is bot-protected; configure a chatroom id override for {slug})"
				));
			}
			status if !status.is_success() => {
				return Err(anyhow!("kick get chatroom failed: status={}", status));
			}
			_ => {}
		}

		let body: KickChatroom = resp.json().await.context("parse kick chatroom response")?;
		Ok(Some(body))
	}

	/// Resolve a channel name to its chatroom id.
	///
	/// Overrides win, then numeric input is taken as a chatroom id, then the HTTP lookup runs.
	pub async fn resolve_chatroom_id(
		&self,
		channel: &str,
		overrides: &BTreeMap<String, u64>,
	) -> anyhow::Result<ChatroomId> {
		let channel = channel.trim();
		if channel.is_empty() {
			return Err(anyhow!("kick channel must be non-empty"));
		}

		if let Some(id) = overrides
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case(channel))
			.map(|(_, id)| *id)
		{
			debug!(channel, chatroom_id = id, "using configured chatroom id override");
			return Ok(ChatroomId::new(id));
		}

		if let Ok(id) = channel.parse::<ChatroomId>() {
			return Ok(id);
		}

		let chatroom = match self.get_chatroom(channel).await {
			Ok(Some(chatroom)) => chatroom,
			Ok(None) => return Err(anyhow!("kick channel not found: {channel}")),
			Err(err) => {
				warn!(error = %err, channel, "kick chatroom lookup failed");
				return Err(err);
			}
		};

		debug!(
			channel,
			chatroom_id = chatroom.id,
			slow_mode = chatroom.slow_mode.enabled,
			subscribers_mode = chatroom.subscribers_mode.enabled,
			followers_mode = chatroom.followers_mode.enabled,
			emotes_mode = chatroom.emotes_mode.enabled,
			pinned = chatroom.pinned_message.as_ref().is_some_and(|v| !v.is_null()),
			"resolved kick chatroom"
		);
		Ok(chatroom.chatroom_id())
	}
}

impl Default for KickClient {
	fn default() -> Self {
		Self::new(DEFAULT_BASE_URL)
	}
}
