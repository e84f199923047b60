//! Upstream game feed connection
//!
//! One task owns the socket and the [`SessionCoordinator`]. Each connection
//! attempt gets a new generation number; handshake timers are tagged with
//! the generation that scheduled them and are dropped if the connection they
//! belonged to is gone.
//!
//! ```text
//! DISCONNECTED ─► CONNECTING ─► AUTHENTICATING ──(subscribe sent)──► SUBSCRIBED
//!       ▲                                                                │
//!       └──────────────── close / error, wait reconnect delay ◄──────────┘
//! ```

pub mod protocol;
#[cfg(test)]
mod tests;

pub use protocol::{decode, Inbound, Outbound, Route};

use crate::config::FeedConfig;
use crate::engine::{ForecastModel, PredictionEngine};
use crate::error::{Error, Result};
use crate::session::{SessionCoordinator, SnapshotReader};
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{ORIGIN, USER_AGENT};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type FeedSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Connection lifecycle. Advisory: no acknowledgement is awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Subscribed,
}

/// Published connection status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedStatus {
    pub state: ConnectionState,
    /// Ordinal of the current (or last) connection attempt
    pub generation: u64,
    /// Attempts made after the first one
    pub reconnects: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Delayed steps after the auth frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    Subscribe,
    RequestState,
}

#[derive(Debug)]
enum FeedCommand {
    Step { generation: u64, step: HandshakeStep },
    Reconnect,
    Shutdown,
}

enum SessionEnd {
    Closed,
    Reconnect,
    Shutdown,
}

/// Control and status access for a running [`FeedConnection`]
#[derive(Clone)]
pub struct FeedHandle {
    commands: mpsc::Sender<FeedCommand>,
    status: watch::Receiver<FeedStatus>,
}

impl FeedHandle {
    /// Drop the current socket and connect again without the reconnect delay
    pub async fn reconnect(&self) -> Result<()> {
        self.commands
            .send(FeedCommand::Reconnect)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Close the socket and stop the feed task
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(FeedCommand::Shutdown)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    pub fn status(&self) -> FeedStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<FeedStatus> {
        self.status.clone()
    }
}

/// Long-running feed ingester
pub struct FeedConnection<M: ForecastModel = PredictionEngine> {
    config: FeedConfig,
    route: Route,
    coordinator: SessionCoordinator<M>,
    commands_tx: mpsc::Sender<FeedCommand>,
    commands: mpsc::Receiver<FeedCommand>,
    status: watch::Sender<FeedStatus>,
    poll: Interval,
    generation: u64,
}

impl<M: ForecastModel> FeedConnection<M> {
    /// Must be called from within a Tokio runtime: the poll timer starts
    /// counting its grace period here.
    pub fn new(config: FeedConfig, coordinator: SessionCoordinator<M>) -> (Self, FeedHandle) {
        let (commands_tx, commands) = mpsc::channel(32);
        let (status, status_rx) = watch::channel(FeedStatus::default());

        let mut poll = interval_at(Instant::now() + config.poll_grace(), config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let handle = FeedHandle {
            commands: commands_tx.clone(),
            status: status_rx,
        };
        let route = Route {
            zone: config.zone.clone(),
            plugin: config.plugin.clone(),
        };

        let connection = Self {
            config,
            route,
            coordinator,
            commands_tx,
            commands,
            status,
            poll,
            generation: 0,
        };
        (connection, handle)
    }

    pub fn snapshots(&self) -> SnapshotReader {
        self.coordinator.subscribe()
    }

    /// Connect, ingest, and reconnect until shut down
    pub async fn run(mut self) {
        loop {
            self.generation += 1;
            let generation = self.generation;
            self.status.send_modify(|s| s.generation = generation);

            let end = match self.session().await {
                Ok(end) => end,
                Err(e) => {
                    error!("❌ Feed connection error: {}", e);
                    SessionEnd::Closed
                }
            };
            self.set_state(ConnectionState::Disconnected);

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Reconnect => info!("🔄 Reconnect requested"),
                SessionEnd::Closed => {
                    info!(
                        "🔌 Feed connection closed, reconnecting in {:?}",
                        self.config.reconnect_delay()
                    );
                    if !self.wait_for_reconnect().await {
                        break;
                    }
                }
            }
            self.status.send_modify(|s| s.reconnects += 1);
        }
        info!("Feed stopped");
    }

    /// Returns false if shutdown was requested while waiting
    async fn wait_for_reconnect(&mut self) -> bool {
        let delay = tokio::time::sleep(self.config.reconnect_delay());
        tokio::pin!(delay);

        loop {
            tokio::select! {
                _ = &mut delay => return true,
                command = self.commands.recv() => match command {
                    Some(FeedCommand::Reconnect) => return true,
                    Some(FeedCommand::Shutdown) | None => return false,
                    Some(FeedCommand::Step { generation, step }) => {
                        debug!("Dropping {:?} from closed generation {}", step, generation);
                    }
                },
            }
        }
    }

    async fn session(&mut self) -> Result<SessionEnd> {
        self.set_state(ConnectionState::Connecting);
        info!("🚀 Connecting to feed (generation {})", self.generation);

        let request = self.client_request()?;
        let (socket, _) = timeout(self.config.connect_timeout(), connect_async(request))
            .await
            .map_err(|_| Error::Timeout("feed connect".to_string()))??;
        info!("✅ Feed connected");

        let (mut sink, mut stream) = socket.split();

        self.set_state(ConnectionState::Authenticating);
        let auth = Outbound::Authenticate {
            agent_id: self.config.agent_id.clone(),
            access_token: self.config.access_token.clone(),
        };
        self.send(&mut sink, auth).await?;
        self.schedule(self.config.subscribe_delay(), HandshakeStep::Subscribe);
        self.schedule(self.config.state_request_delay(), HandshakeStep::RequestState);

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Close frame: {:?}", frame);
                        return Ok(SessionEnd::Closed);
                    }
                    Some(Ok(message)) => self.on_message(message),
                    Some(Err(e)) => {
                        warn!("❌ Feed transport error: {}", e);
                        return Ok(SessionEnd::Closed);
                    }
                    None => return Ok(SessionEnd::Closed),
                },
                _ = self.poll.tick() => {
                    self.send(&mut sink, Outbound::RequestLatestResult).await?;
                }
                command = self.commands.recv() => match command {
                    Some(FeedCommand::Step { generation, step }) if generation == self.generation => {
                        self.run_step(&mut sink, step).await?;
                    }
                    Some(FeedCommand::Step { generation, step }) => {
                        debug!("Ignoring stale {:?} from generation {}", step, generation);
                    }
                    Some(FeedCommand::Reconnect) => {
                        let _ = sink.close().await;
                        return Ok(SessionEnd::Reconnect);
                    }
                    Some(FeedCommand::Shutdown) | None => {
                        let _ = sink.close().await;
                        return Ok(SessionEnd::Shutdown);
                    }
                },
            }
        }
    }

    fn on_message(&mut self, message: Message) {
        let payload = match &message {
            Message::Text(text) => text.as_str(),
            Message::Binary(bytes) => match std::str::from_utf8(&bytes[..]) {
                Ok(text) => text,
                Err(_) => return,
            },
            _ => return,
        };
        self.status
            .send_modify(|s| s.last_message_at = Some(Utc::now()));

        match decode(payload) {
            Ok(Inbound::RoundResult(outcome)) => {
                self.coordinator.observe(outcome);
            }
            Ok(Inbound::IncompleteResult) => debug!("Ignoring round result without sid/odd"),
            Ok(Inbound::Push { .. }) | Ok(Inbound::Other) => {}
            Err(e) => debug!("Discarding undecodable frame: {}", e),
        }
    }

    async fn run_step(&mut self, sink: &mut FeedSink, step: HandshakeStep) -> Result<()> {
        match step {
            HandshakeStep::Subscribe => {
                self.send(sink, Outbound::Subscribe).await?;
                self.set_state(ConnectionState::Subscribed);
            }
            HandshakeStep::RequestState => {
                self.send(sink, Outbound::RequestGameState).await?;
                self.send(sink, Outbound::RequestLatestResult).await?;
            }
        }
        Ok(())
    }

    async fn send(&self, sink: &mut FeedSink, frame: Outbound) -> Result<()> {
        debug!("Sending {}", frame.label());
        sink.send(Message::Text(frame.encode(&self.route).into()))
            .await?;
        Ok(())
    }

    /// Post `step` back to this task after `delay`, tagged with the current generation
    fn schedule(&self, delay: Duration, step: HandshakeStep) {
        let commands = self.commands_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(FeedCommand::Step { generation, step }).await;
        });
    }

    fn set_state(&self, state: ConnectionState) {
        self.status.send_if_modified(|s| {
            if s.state == state {
                return false;
            }
            debug!("Feed state {:?} -> {:?}", s.state, state);
            s.state = state;
            true
        });
    }

    fn client_request(&self) -> Result<Request> {
        let mut request = self.config.url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        if let Some(origin) = &self.config.origin {
            headers.insert(ORIGIN, header_value(origin)?);
        }
        headers.insert(USER_AGENT, header_value(&self.config.user_agent)?);
        Ok(request)
    }
}

/// Wait for a spawned [`FeedConnection::run`] task. Returns false and logs
/// if the task panicked or was cancelled.
pub async fn join_feed_task(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) if e.is_panic() => {
            error!("❌ Feed task panicked: {}", e);
            false
        }
        Err(e) => {
            warn!("Feed task cancelled: {}", e);
            false
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Protocol(format!("invalid header value {:?}: {}", value, e)))
}
