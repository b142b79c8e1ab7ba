//! Simulated game client: one websocket connection and one mirrored snake
//!
//! An agent moves through these states:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Initialized -> Dead | Disconnected
//! ```
//!
//! Two tasks work on an agent at the same time once it is connected: the
//! receive loop, which feeds inbound packets through the handler registry, and
//! the supervision loop in [`crate::orchestrator`], which calls [`Agent::tick`] and
//! [`Agent::turn_toward`] on a fixed cadence. They only meet in
//! [`AgentState`], which sits behind the agent's own lock.

use std::time::{Duration, Instant};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use rand::Rng;
use shared::{decode_frame, displacement, encode_heading, encode_hello, encode_ping, heading_toward};
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::Message;

use crate::handlers::{HandlerRegistry, Inbound};
use crate::network::{self, ConnectError, WsStream};
use crate::proxy::ProxyRoute;

/// Minimum spacing between two heading updates.
pub const HEADING_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum spacing between two pongs.
pub const PING_INTERVAL: Duration = Duration::from_millis(250);

/// How long one outbound frame may wait on a peer that stopped reading.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Locally mirrored state of the agent's snake plus its lifecycle flags.
#[derive(Debug, Clone)]
pub struct AgentState {
    /// Server-assigned entity id, 0 until the first full-state packet.
    pub entity_id: u16,
    pub position: (i32, i32),
    /// Desired heading in 0-250 units.
    pub heading: f64,
    /// Last heading actually sent to the server.
    pub previous_heading: f64,
    /// Units per second, from the last full-state packet.
    pub speed: i64,

    pub last_heading_sent: Option<Instant>,
    pub last_ping_sent: Option<Instant>,
    pub last_packet: Option<Instant>,

    /// Handshake finished; moving and pinging are allowed.
    pub initialized: bool,
    pub connected: bool,
    pub needs_ping: bool,
    pub dead: bool,
    pub has_received_packet: bool,
}

impl AgentState {
    pub fn new() -> Self {
        Self {
            entity_id: 0,
            position: (0, 0),
            heading: 0.0,
            previous_heading: 0.0,
            speed: 0,
            last_heading_sent: None,
            last_ping_sent: None,
            last_packet: None,
            initialized: false,
            connected: false,
            needs_ping: false,
            dead: false,
            has_received_packet: false,
        }
    }

    /// Clears identity and lifecycle flags.
    ///
    /// Motion state and `connected` are left alone so a reconnecting agent
    /// resumes from where it was.
    pub fn reset(&mut self) {
        self.entity_id = 0;
        self.initialized = false;
        self.has_received_packet = false;
        self.dead = false;
        self.needs_ping = false;
    }

    pub fn is_alive(&self) -> bool {
        self.connected && !self.dead
    }

    pub fn is_active(&self) -> bool {
        self.initialized && self.is_alive()
    }

    pub fn turn_toward(&mut self, target_x: i32, target_y: i32) {
        if !self.is_active() {
            return;
        }

        let dx = f64::from(target_x) - f64::from(self.position.0);
        let dy = f64::from(target_y) - f64::from(self.position.1);
        self.heading = heading_toward(dx, dy);
    }

    pub fn advance_position(&mut self, distance: i64) {
        let (dx, dy) = displacement(self.heading, distance);
        self.position.0 = self.position.0.saturating_add(dx);
        self.position.1 = self.position.1.saturating_add(dy);
    }

    /// Moves the snake forward by the distance covered since the last packet.
    ///
    /// Does nothing until a move packet has been seen. The distance is
    /// `speed * elapsed_ms / 4`.
    pub fn dead_reckon(&mut self, now: Instant) {
        if !self.has_received_packet {
            return;
        }
        let Some(last_packet) = self.last_packet else {
            return;
        };

        let elapsed_ms = now.saturating_duration_since(last_packet).as_millis() as i64;
        self.advance_position(self.speed * elapsed_ms / 4);
    }

    pub fn record_reception(&mut self, at: Instant) {
        self.last_packet = Some(at);
        self.has_received_packet = true;
    }

    /// Frames the update cadence wants on the wire at `now`.
    ///
    /// Marks them as sent, so the caller must actually send what it gets back.
    pub fn due_frames(&mut self, now: Instant) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        if !self.is_active() {
            return frames;
        }

        if is_due(self.last_heading_sent, now, HEADING_INTERVAL)
            && self.previous_heading != self.heading
        {
            frames.push(encode_heading(self.heading));
            self.previous_heading = self.heading;
            self.last_heading_sent = Some(now);
        }

        if is_due(self.last_ping_sent, now, PING_INTERVAL) && self.needs_ping {
            frames.push(encode_ping());
            self.last_ping_sent = Some(now);
            self.needs_ping = false;
        }

        frames
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

fn is_due(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last {
        Some(last) => now.saturating_duration_since(last) >= interval,
        None => true,
    }
}

pub fn random_nickname() -> String {
    format!("Missile_{}", rand::thread_rng().gen_range(0..99999))
}

pub struct Agent {
    nickname: String,
    route: ProxyRoute,
    state: Mutex<AgentState>,
    writer: Mutex<Option<WsWriter>>,
    reader: Mutex<Option<WsReader>>,
    send_timeout: Duration,
    /// Set when a send gives up, so a receive loop parked on a silent peer
    /// stops too.
    stalled: watch::Sender<bool>,
}

impl Agent {
    pub fn new(route: ProxyRoute) -> Self {
        Self::with_nickname(random_nickname(), route)
    }

    pub fn with_nickname(nickname: impl Into<String>, route: ProxyRoute) -> Self {
        Self {
            nickname: nickname.into(),
            route,
            state: Mutex::new(AgentState::new()),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            send_timeout: SEND_TIMEOUT,
            stalled: watch::channel(false).0,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn route(&self) -> &ProxyRoute {
        &self.route
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> AgentState {
        self.state.lock().await.clone()
    }

    pub async fn is_alive(&self) -> bool {
        self.state.lock().await.is_alive()
    }

    /// Dials the game server and installs the new connection.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectError`] if the proxy tunnel, the TCP connection or
    /// the websocket upgrade fails, or if it takes longer than `timeout`. The
    /// caller decides whether to try again.
    pub async fn connect(&self, server_address: &str, timeout: Duration) -> Result<(), ConnectError> {
        debug!("{}: connecting to {} via {}", self.nickname, server_address, self.route);
        let socket = network::dial(server_address, &self.route, timeout).await?;
        let (writer, reader) = socket.split();

        let mut state = self.state.lock().await;
        *self.writer.lock().await = Some(writer);
        *self.reader.lock().await = Some(reader);
        state.connected = true;
        state.reset();
        self.stalled.send_replace(false);

        info!("{}: connected to {}", self.nickname, server_address);
        Ok(())
    }

    /// Reads and dispatches packets until the connection ends.
    ///
    /// The connection is closed and the lifecycle flags are reset once on
    /// every exit path.
    pub async fn run_receive_loop(&self, registry: &HandlerRegistry) {
        let Some(mut reader) = self.reader.lock().await.take() else {
            warn!("{}: receive loop started without a connection", self.nickname);
            return;
        };

        self.send(encode_hello()).await;
        self.receive_messages(&mut reader, registry).await;
        self.shutdown().await;
    }

    async fn receive_messages(&self, reader: &mut WsReader, registry: &HandlerRegistry) {
        let mut stalled = self.stalled.subscribe();
        while self.is_alive().await {
            let next = tokio::select! {
                next = reader.next() => next,
                _ = async { stalled.wait_for(|stalled| *stalled).await.is_ok() } => {
                    debug!("{}: connection stalled, leaving receive loop", self.nickname);
                    return;
                }
            };
            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    error!("{}: failed to read message, closing connection: {}", self.nickname, e);
                    return;
                }
                None => {
                    debug!("{}: server closed the stream", self.nickname);
                    return;
                }
            };
            let received_at = Instant::now();

            let payload = match message {
                Message::Binary(payload) => payload,
                Message::Close(frame) => {
                    debug!("{}: close frame {:?}", self.nickname, frame);
                    return;
                }
                _ => continue,
            };
            let Some(packet) = decode_frame(&payload) else {
                continue;
            };

            let inbound = Inbound {
                payload: packet,
                nickname: &self.nickname,
                received_at,
            };
            let outgoing = {
                let mut state = self.state.lock().await;
                registry.dispatch(&mut state, &inbound)
            };

            for frame in outgoing {
                self.send(frame).await;
            }
        }
    }

    async fn shutdown(&self) {
        let writer = {
            let mut state = self.state.lock().await;
            state.connected = false;
            state.reset();
            self.writer.lock().await.take()
        };

        if let Some(mut writer) = writer {
            match tokio::time::timeout(self.send_timeout, writer.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("{}: error while closing connection: {}", self.nickname, e),
                Err(_) => debug!("{}: timed out closing connection", self.nickname),
            }
        }
        info!("{}: connection closed", self.nickname);
    }

    /// Sends whatever the update cadence says is due.
    pub async fn tick(&self) {
        let frames = self.state.lock().await.due_frames(Instant::now());
        for frame in frames {
            self.send(frame).await;
        }
    }

    pub async fn turn_toward(&self, target_x: i32, target_y: i32) {
        self.state.lock().await.turn_toward(target_x, target_y);
    }

    /// Best-effort send of one binary frame.
    ///
    /// A send that does not finish within the send timeout marks the agent
    /// disconnected, which ends its receive loop and lets supervision
    /// reconnect it.
    pub async fn send(&self, frame: Vec<u8>) {
        let sent = {
            let mut writer = self.writer.lock().await;
            let Some(sink) = writer.as_mut() else {
                warn!("{}: attempted to send packet on a closed connection", self.nickname);
                return;
            };
            tokio::time::timeout(self.send_timeout, sink.send(Message::Binary(frame))).await
        };

        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{}: failed to send packet: {}", self.nickname, e),
            Err(_) => {
                warn!(
                    "{}: send timed out after {:?}, dropping connection",
                    self.nickname, self.send_timeout
                );
                // Writer lock is released above; shutdown takes state then writer.
                self.state.lock().await.connected = false;
                self.stalled.send_replace(true);
            }
        }
    }
}
