#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, anyhow};
use futures_util::{SinkExt, StreamExt};
use kick_chat_core::{DecodeError, ResilientDecoder};
use tokio::time::{Instant, sleep, sleep_until};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::envelope::{self, ChatroomId, PusherEvent};
use crate::{ListenerControl, ListenerControlRx, ListenerEvent, ListenerEventTx, new_session_id, status, status_error};

pub(crate) type PusherWs = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub const DEFAULT_PUSHER_WS_URL: &str =
	"wss://ws-us2.pusher.com/app/eb1d5f283081a78b932c?protocol=7&client=js&version=7.6.0&flash=false";

/// Kick chat listener configuration.
#[derive(Debug, Clone)]
pub struct KickChatConfig {
	pub pusher_ws_url: String,
	pub chatrooms: Vec<ChatroomId>,
	pub reconnect_min_delay: Duration,
	pub reconnect_max_delay: Duration,
	/// Silence before a client ping; replaced by the server's announced value.
	pub activity_timeout: Duration,
	/// How long to wait for any frame after a client ping.
	pub pong_timeout: Duration,
}

impl KickChatConfig {
	pub fn new(chatrooms: impl IntoIterator<Item = ChatroomId>) -> Self {
		Self {
			pusher_ws_url: DEFAULT_PUSHER_WS_URL.to_string(),
			chatrooms: chatrooms.into_iter().collect(),
			reconnect_min_delay: Duration::from_millis(500),
			reconnect_max_delay: Duration::from_secs(30),
			activity_timeout: Duration::from_secs(120),
			pong_timeout: Duration::from_secs(30),
		}
	}
}

/// Reads Kick chat over Pusher and forwards decoded messages.
pub struct KickChatListener {
	cfg: KickChatConfig,
	decoder: ResilientDecoder,
	chatrooms: BTreeSet<ChatroomId>,
}

/// Per-connection state.
struct Connection {
	session_id: String,
	established: bool,
	activity_timeout: Duration,
	last_activity: Instant,
	ping_sent_at: Option<Instant>,
}

impl Connection {
	fn new(activity_timeout: Duration) -> Self {
		Self {
			session_id: new_session_id(),
			established: false,
			activity_timeout,
			last_activity: Instant::now(),
			ping_sent_at: None,
		}
	}

	fn touch(&mut self) {
		self.last_activity = Instant::now();
		self.ping_sent_at = None;
	}

	fn watchdog_deadline(&self, pong_timeout: Duration) -> Instant {
		match self.ping_sent_at {
			Some(sent) => sent + pong_timeout,
			None => self.last_activity + self.activity_timeout,
		}
	}
}

/// What the read loop should do after handling a frame.
enum Flow {
	Continue,
	Reconnect,
	Stop,
}

impl KickChatListener {
	pub fn new(cfg: KickChatConfig) -> Self {
		let chatrooms = cfg.chatrooms.iter().copied().collect();
		Self {
			cfg,
			decoder: ResilientDecoder::default(),
			chatrooms,
		}
	}

	fn backoff_delay(attempt: u32, min: Duration, max: Duration) -> Duration {
		let pow = attempt.min(16);
		let ms = min.as_millis().saturating_mul(1u128 << pow);
		let d = Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX));
		d.min(max).max(min)
	}

	async fn connect_ws(url: &Url) -> anyhow::Result<PusherWs> {
		let (ws, _resp) = tokio_tungstenite::connect_async(url.as_str())
			.await
			.context("connect_async to pusher ws")?;
		Ok(ws)
	}

	/// Run until shutdown, a closed control channel, or a fatal Pusher error.
	pub async fn run(mut self, mut control_rx: ListenerControlRx, events_tx: ListenerEventTx) -> anyhow::Result<()> {
		let url = Url::parse(&self.cfg.pusher_ws_url)
			.with_context(|| format!("invalid pusher ws url: {}", self.cfg.pusher_ws_url))?;

		let _ = events_tx.try_send(status(false, "kick chat listener starting"));

		let mut reconnect_attempt: u32 = 0;

		'outer: loop {
			if self.chatrooms.is_empty() {
				let _ = events_tx.try_send(status(false, "no chatrooms joined; deferring pusher connect"));
				match control_rx.recv().await {
					Some(ListenerControl::Shutdown) | None => break 'outer,
					Some(ListenerControl::Join { chatroom }) => {
						self.chatrooms.insert(chatroom);
					}
					Some(ListenerControl::Leave { .. }) => {}
				}
				continue;
			}

			if reconnect_attempt > 0 {
				let delay =
					Self::backoff_delay(reconnect_attempt, self.cfg.reconnect_min_delay, self.cfg.reconnect_max_delay);
				let _ = events_tx.try_send(status(
					false,
					format!("reconnecting in {delay:?} (attempt={reconnect_attempt})"),
				));
				metrics::counter!("kick_chat_pusher_reconnects_total").increment(1);

				tokio::select! {
					_ = sleep(delay) => {}
					cmd = control_rx.recv() => {
						match cmd {
							Some(ListenerControl::Shutdown) | None => break 'outer,
							Some(cmd) => self.apply_control_offline(cmd),
						}
						continue;
					}
				}
			}

			info!(url = %url, "connecting to pusher");
			let mut ws = match Self::connect_ws(&url).await {
				Ok(ws) => ws,
				Err(err) => {
					warn!(error = %err, "pusher connect failed");
					reconnect_attempt = reconnect_attempt.saturating_add(1);
					let _ = events_tx.try_send(status_error("failed to connect pusher ws", err));
					continue;
				}
			};

			let mut conn = Connection::new(self.cfg.activity_timeout);
			debug!(session_id = %conn.session_id, "pusher socket open");

			loop {
				let deadline = conn.watchdog_deadline(self.cfg.pong_timeout);

				let flow = tokio::select! {
					cmd = control_rx.recv() => {
						match cmd {
							Some(ListenerControl::Shutdown) | None => {
								info!("kick chat listener shutting down");
								let _ = ws.close(None).await;
								break 'outer;
							}
							Some(cmd) => self.apply_control(cmd, &mut ws, &conn).await,
						}
					}

					msg = ws.next() => {
						match msg {
							None => {
								let _ = events_tx.try_send(status(false, "pusher ws ended"));
								Flow::Reconnect
							}
							Some(Err(err)) => {
								let _ = events_tx.try_send(status_error("pusher ws read error", err));
								Flow::Reconnect
							}
							Some(Ok(Message::Text(text))) => {
								conn.touch();
								let was_established = conn.established;
								let flow = self.handle_text(text.as_str(), &mut ws, &mut conn, &events_tx).await?;
								if !was_established && conn.established {
									reconnect_attempt = 0;
								}
								flow
							}
							Some(Ok(Message::Ping(payload))) => {
								conn.touch();
								let _ = ws.send(Message::Pong(payload)).await;
								Flow::Continue
							}
							Some(Ok(Message::Close(frame))) => {
								let _ = events_tx.try_send(status(false, format!("pusher ws closed: {frame:?}")));
								Flow::Reconnect
							}
							Some(Ok(_)) => {
								conn.touch();
								Flow::Continue
							}
						}
					}

					_ = sleep_until(deadline) => {
						if conn.ping_sent_at.is_some() {
							let _ = events_tx.try_send(status(false, "activity watchdog triggered; reconnecting"));
							Flow::Reconnect
						} else {
							trace!(session_id = %conn.session_id, "sending pusher:ping");
							conn.ping_sent_at = Some(Instant::now());
							if let Err(err) = ws.send(Message::Text(envelope::ping_message().into())).await {
								warn!(error = %err, "pusher ping send failed");
								Flow::Reconnect
							} else {
								Flow::Continue
							}
						}
					}
				};

				match flow {
					Flow::Continue => {}
					Flow::Reconnect => {
						if self.chatrooms.is_empty() {
							let _ = ws.close(None).await;
							reconnect_attempt = 0;
						} else {
							reconnect_attempt = reconnect_attempt.saturating_add(1);
						}
						continue 'outer;
					}
					Flow::Stop => break 'outer,
				}
			}
		}

		let _ = events_tx.try_send(status(false, "kick chat listener stopped"));
		Ok(())
	}

	async fn handle_text(
		&mut self,
		text: &str,
		ws: &mut PusherWs,
		conn: &mut Connection,
		events_tx: &ListenerEventTx,
	) -> anyhow::Result<Flow> {
		let event = match envelope::parse_event(text) {
			Ok(event) => event,
			Err(err) => {
				warn!(error = %err, frame = %text, "unparseable pusher frame");
				return Ok(Flow::Continue);
			}
		};
		metrics::counter!("kick_chat_pusher_events_total", "event" => event.kind()).increment(1);

		match event {
			PusherEvent::ConnectionEstablished(info) => {
				conn.established = true;
				if let Some(secs) = info.activity_timeout
					&& secs > 0
				{
					conn.activity_timeout = Duration::from_secs(secs);
				}
				let _ = events_tx.try_send(status(
					true,
					format!(
						"pusher connected (socket_id={}, session_id={})",
						info.socket_id.as_deref().unwrap_or("?"),
						conn.session_id
					),
				));
				for chatroom in &self.chatrooms {
					Self::send_frame(ws, envelope::subscribe_message(*chatroom), "subscribe").await;
				}
			}
			PusherEvent::SubscriptionSucceeded { channel } => {
				let channel = channel.unwrap_or_default();
				info!(%channel, "subscribed to kick chatroom");
				let _ = events_tx.try_send(status(true, format!("subscribed to {channel}")));
			}
			PusherEvent::ChatMessage { channel, data } => {
				if let Some(chatroom) = channel.as_deref().and_then(ChatroomId::from_channel_name)
					&& !self.chatrooms.contains(&chatroom)
				{
					debug!(%chatroom, "dropping chat message for chatroom no longer joined");
					return Ok(Flow::Continue);
				}

				match self.decoder.decode_detailed(&data) {
					Ok(decoded) => {
						metrics::counter!("kick_chat_decode_total", "strategy" => decoded.strategy.as_str()).increment(1);
						if events_tx
							.send(ListenerEvent::Chat(Box::new(decoded.message)))
							.await
							.is_err()
						{
							info!("listener event channel closed; stopping");
							return Ok(Flow::Stop);
						}
					}
					Err(err) => log_decode_failure(&err),
				}
			}
			PusherEvent::Ping => {
				Self::send_frame(ws, envelope::pong_message(), "pong").await;
			}
			PusherEvent::Pong => {
				trace!(session_id = %conn.session_id, "pusher:pong");
			}
			PusherEvent::Error(err) => {
				warn!(error = %err, "pusher error");
				let _ = events_tx.try_send(status_error("pusher error", &err));
				if err.is_fatal() {
					return Err(anyhow!("pusher rejected the connection: {err}"));
				}
			}
			PusherEvent::Other { event, channel } => {
				debug!(%event, channel = channel.as_deref().unwrap_or(""), "ignoring pusher event");
			}
		}

		Ok(Flow::Continue)
	}

	async fn apply_control(&mut self, cmd: ListenerControl, ws: &mut PusherWs, conn: &Connection) -> Flow {
		match cmd {
			ListenerControl::Join { chatroom } => {
				if self.chatrooms.insert(chatroom) && conn.established {
					Self::send_frame(ws, envelope::subscribe_message(chatroom), "subscribe").await;
				}
				Flow::Continue
			}
			ListenerControl::Leave { chatroom } => {
				if self.chatrooms.remove(&chatroom) && conn.established {
					Self::send_frame(ws, envelope::unsubscribe_message(chatroom), "unsubscribe").await;
				}
				if self.chatrooms.is_empty() {
					Flow::Reconnect
				} else {
					Flow::Continue
				}
			}
			ListenerControl::Shutdown => Flow::Stop,
		}
	}

	fn apply_control_offline(&mut self, cmd: ListenerControl) {
		match cmd {
			ListenerControl::Join { chatroom } => {
				self.chatrooms.insert(chatroom);
			}
			ListenerControl::Leave { chatroom } => {
				self.chatrooms.remove(&chatroom);
			}
			ListenerControl::Shutdown => {}
		}
	}

	async fn send_frame(ws: &mut PusherWs, frame: String, what: &'static str) {
		if let Err(err) = ws.send(Message::Text(frame.into())).await {
			warn!(error = %err, what, "pusher send failed");
		}
	}
}

fn log_decode_failure(err: &DecodeError) {
	metrics::counter!("kick_chat_decode_failures_total", "kind" => err.kind()).increment(1);
	let candidates: Vec<(&str, &str)> = err
		.candidates()
		.iter()
		.map(|c| (c.strategy.as_str(), c.text.as_str()))
		.collect();
	warn!(
		kind = err.kind(),
		error = %err,
		original = %err.original(),
		?candidates,
		"dropping undecodable chat message"
	);
}
