#![forbid(unsafe_code)]

mod config;
mod output;

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use kick_chat_pusher::{
	KickChatConfig, KickChatListener, KickClient, ListenerControl, ListenerEvent, bounded_listener_channels,
};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::output::OutputFormat;

struct Args {
	channels: Vec<String>,
	config_path: Option<PathBuf>,
	format: OutputFormat,
}

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: kick_chat [--channel <slug|chatroom id>]... [--config path] [--json]\n\
\n\
Options:\n\
\t--channel  Kick channel slug or numeric chatroom id (repeatable)\n\
\t           Default: `channel` from the config file\n\
\t--config   Config file (default: ~/.kick_chat/config.toml)\n\
\t--json     Print one JSON object per message\n\
\t--help     Show this help\n\
"
	);
	std::process::exit(2)
}

fn parse_args() -> Args {
	let mut args = Args {
		channels: Vec::new(),
		config_path: None,
		format: OutputFormat::Text,
	};

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--channel" | "-c" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--channel must be non-empty");
					usage_and_exit();
				}
				args.channels.push(v.trim().to_string());
			}
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				args.config_path = Some(PathBuf::from(v));
			}
			"--json" => args.format = OutputFormat::Json,
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	args
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,kick_chat=debug".to_string());

	tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
		.init();
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let args = parse_args();

	let config_path = match args.config_path {
		Some(path) => path,
		None => crate::config::default_config_path()?,
	};
	let cfg = crate::config::load_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded config (toml + env overrides)");

	init_metrics(cfg.server.metrics_bind.as_deref());

	let channels = if args.channels.is_empty() {
		cfg.channel.iter().cloned().collect()
	} else {
		args.channels
	};
	if channels.is_empty() {
		eprintln!(
			"No channel given: pass --channel or set `channel` in {}",
			config_path.display()
		);
		usage_and_exit();
	}

	let client = match cfg.kick.base_url.as_deref() {
		Some(base_url) => KickClient::new(base_url),
		None => KickClient::default(),
	};
	let mut chatrooms = Vec::with_capacity(channels.len());
	for channel in &channels {
		let chatroom = client
			.resolve_chatroom_id(channel, &cfg.kick.chatroom_id_overrides)
			.await
			.with_context(|| format!("resolve kick channel {channel}"))?;
		info!(%channel, chatroom_id = %chatroom, base_url = client.base_url(), "following kick chatroom");
		chatrooms.push(chatroom);
	}

	let mut listener_cfg = KickChatConfig::new(chatrooms);
	if let Some(url) = cfg.kick.pusher_ws_url.clone() {
		listener_cfg.pusher_ws_url = url;
	}
	if let Some(min) = cfg.kick.reconnect_min_delay {
		listener_cfg.reconnect_min_delay = min;
	}
	if let Some(max) = cfg.kick.reconnect_max_delay {
		listener_cfg.reconnect_max_delay = max;
	}

	let (control_tx, control_rx, events_tx, mut events_rx) = bounded_listener_channels(16, 1024);
	let listener = tokio::spawn(KickChatListener::new(listener_cfg).run(control_rx, events_tx));

	let ctrl_c = tokio::signal::ctrl_c();
	tokio::pin!(ctrl_c);

	loop {
		tokio::select! {
			event = events_rx.recv() => match event {
				Some(ListenerEvent::Chat(msg)) => {
					let line = args.format.render(&msg)?;
					writeln!(std::io::stdout().lock(), "{line}").context("write to stdout")?;
					metrics::counter!("kick_chat_messages_printed_total").increment(1);
				}
				Some(ListenerEvent::Status(status)) => {
					if status.last_error.is_some() {
						warn!(connected = status.connected, "{status}");
					} else {
						info!(connected = status.connected, "{status}");
					}
				}
				None => break,
			},
			_ = &mut ctrl_c => {
				info!("ctrl-c received; shutting down");
				let _ = control_tx.send(ListenerControl::Shutdown).await;
				break;
			}
		}
	}

	// Unblock a listener waiting on a full event channel.
	drop(events_rx);

	listener.await.context("kick chat listener task")?
}
