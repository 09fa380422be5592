#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Default config path: `~/.kick_chat/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".kick_chat").join("config.toml"))
}

/// Load the config from TOML at `path`, then apply `KICK_CHAT_*` env overrides.
pub fn load_config_from_path(path: &Path) -> anyhow::Result<AppConfig> {
	load_config_with_env(path, |key| std::env::var(key).ok())
}

fn load_config_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<AppConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = AppConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg, env);

	Ok(cfg)
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
	/// Channel to follow when none is given on the command line.
	pub channel: Option<String>,
	pub kick: KickSettings,
	pub server: ServerSettings,
}

#[derive(Debug, Clone, Default)]
pub struct KickSettings {
	/// Kick API base URL.
	pub base_url: Option<String>,
	/// Pusher websocket URL override.
	pub pusher_ws_url: Option<String>,
	/// Reconnect backoff min/max (optional).
	pub reconnect_min_delay: Option<Duration>,
	pub reconnect_max_delay: Option<Duration>,
	/// Channel slug -> chatroom id, for channels whose lookup is blocked.
	pub chatroom_id_overrides: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	channel: Option<String>,

	#[serde(default)]
	kick: FileKickSettings,

	#[serde(default)]
	server: FileServerSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileKickSettings {
	base_url: Option<String>,
	pusher_ws_url: Option<String>,
	reconnect_min_delay_ms: Option<u64>,
	reconnect_max_delay_ms: Option<u64>,

	#[serde(default)]
	chatroom_id_overrides: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	metrics_bind: Option<String>,
}

impl AppConfig {
	fn from_file(file: FileConfig) -> Self {
		Self {
			channel: file.channel.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
			kick: KickSettings {
				base_url: file.kick.base_url.filter(|s| !s.trim().is_empty()),
				pusher_ws_url: file.kick.pusher_ws_url.filter(|s| !s.trim().is_empty()),
				reconnect_min_delay: file.kick.reconnect_min_delay_ms.map(Duration::from_millis),
				reconnect_max_delay: file.kick.reconnect_max_delay_ms.map(Duration::from_millis),
				chatroom_id_overrides: file
					.kick
					.chatroom_id_overrides
					.into_iter()
					.map(|(slug, id)| (slug.trim().to_ascii_lowercase(), id))
					.filter(|(slug, _)| !slug.is_empty())
					.collect(),
			},
			server: ServerSettings {
				metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
			},
		}
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
			debug!(path = %path.display(), "no config file; using defaults");
			Ok(None)
		}
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn non_empty(v: Option<String>) -> Option<String> {
	v.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn apply_env_overrides(cfg: &mut AppConfig, env: impl Fn(&str) -> Option<String>) {
	if let Some(v) = non_empty(env("KICK_CHAT_CHANNEL")) {
		cfg.channel = Some(v);
		info!("config: channel overridden by env");
	}

	if let Some(v) = non_empty(env("KICK_CHAT_KICK_BASE_URL")) {
		cfg.kick.base_url = Some(v);
		info!("kick config: base_url overridden by env");
	}

	if let Some(v) = non_empty(env("KICK_CHAT_PUSHER_WS_URL")) {
		cfg.kick.pusher_ws_url = Some(v);
		info!("kick config: pusher_ws_url overridden by env");
	}

	if let Some(v) = env("KICK_CHAT_RECONNECT_MIN_DELAY_MS")
		&& let Ok(min_ms) = v.trim().parse::<u64>()
	{
		cfg.kick.reconnect_min_delay = Some(Duration::from_millis(min_ms));
		info!(min_ms, "kick config: reconnect_min_delay overridden by env");
	}

	if let Some(v) = env("KICK_CHAT_RECONNECT_MAX_DELAY_MS")
		&& let Ok(max_ms) = v.trim().parse::<u64>()
	{
		cfg.kick.reconnect_max_delay = Some(Duration::from_millis(max_ms));
		info!(max_ms, "kick config: reconnect_max_delay overridden by env");
	}

	if let Some(v) = non_empty(env("KICK_CHAT_METRICS_BIND")) {
		cfg.server.metrics_bind = Some(v);
		info!("server config: metrics_bind overridden by env");
	}

	if let (Some(min), Some(max)) = (cfg.kick.reconnect_min_delay, cfg.kick.reconnect_max_delay)
		&& min > max
	{
		warn!(
			min_ms = min.as_millis(),
			max_ms = max.as_millis(),
			"kick config: reconnect_min_delay > reconnect_max_delay; swapping"
		);
		cfg.kick.reconnect_min_delay = Some(max);
		cfg.kick.reconnect_max_delay = Some(min);
	}
}
