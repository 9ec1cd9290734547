//! TCP connection to the game server.
//!
//! [`GameClient`] owns the socket. A reader task decodes frames into
//! [`WireMessage`]s and pushes them onto a bounded channel; the session drains
//! that channel from its own tick, so only one thread ever mutates session
//! state. A keepalive task writes empty frames while the link is idle.
//! Connection state is broadcast through a [`watch`] channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, watch};

use crate::framing::{FrameConfig, FrameError, read_message, write_frame, write_message};
use crate::messages::WireMessage;

/// Interval between keepalive frames.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Attempting to establish a TCP connection.
    Connecting,
    /// TCP connection established, ready for communication.
    Connected,
    /// Connection lost or intentionally closed.
    Disconnected,
}

/// Observable connection state backed by a [`watch`] channel.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, rx }
    }

    /// Set the current connection state, notifying all subscribers.
    pub fn set(&self, state: ConnectionState) {
        let _ = self.tx.send(state);
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

/// Create the bounded channel that carries decoded messages to the session.
pub fn message_channel(
    capacity: usize,
) -> (mpsc::Sender<WireMessage>, mpsc::Receiver<WireMessage>) {
    mpsc::channel(capacity.max(1))
}

/// Take every message currently waiting in `receiver`, without blocking.
pub fn drain_channel(receiver: &mut mpsc::Receiver<WireMessage>) -> Vec<WireMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = receiver.try_recv() {
        out.push(msg);
    }
    out
}

/// Handle to a connected game server.
pub struct GameClient {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    state: Arc<ConnectionStateWatch>,
    frame_config: FrameConfig,
    /// Sending `true` makes the reader and keepalive tasks exit.
    shutdown_tx: watch::Sender<bool>,
}

impl GameClient {
    /// Connect to `addr` and start forwarding decoded messages to `inbox`.
    ///
    /// Returns once the TCP handshake completes.
    pub async fn connect(
        addr: SocketAddr,
        frame_config: FrameConfig,
        inbox: mpsc::Sender<WireMessage>,
    ) -> std::io::Result<Self> {
        let state = Arc::new(ConnectionStateWatch::new());
        state.set(ConnectionState::Connecting);

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                state.set(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        stream.set_nodelay(true)?;
        state.set(ConnectionState::Connected);
        tracing::info!(%addr, "connected to game server");

        let (reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(writer));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reader_state = Arc::clone(&state);
        let reader_config = frame_config.clone();
        let mut reader_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            Self::read_loop(reader, reader_config, inbox, &reader_state, &mut reader_shutdown)
                .await;
        });

        let ka_writer = Arc::clone(&writer);
        let ka_state = Arc::clone(&state);
        let ka_config = frame_config.clone();
        let mut ka_shutdown = shutdown_rx;
        tokio::spawn(async move {
            Self::keepalive_loop(&ka_writer, &ka_config, &ka_state, &mut ka_shutdown).await;
        });

        Ok(Self {
            writer,
            state,
            frame_config,
            shutdown_tx,
        })
    }

    /// Return the connection state watch.
    pub fn state(&self) -> &Arc<ConnectionStateWatch> {
        &self.state
    }

    /// Write one message to the server.
    pub async fn send(&self, msg: &WireMessage) -> Result<(), FrameError> {
        if self.state.current() != ConnectionState::Connected {
            return Err(FrameError::ConnectionClosed);
        }
        let mut writer = self.writer.lock().await;
        let result = write_message(&mut *writer, msg, &self.frame_config).await;
        if let Err(FrameError::Io(_)) = &result {
            self.state.set(ConnectionState::Disconnected);
        }
        result
    }

    /// Disconnect from the server.
    pub fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
        self.state.set(ConnectionState::Disconnected);
    }

    async fn read_loop(
        mut reader: OwnedReadHalf,
        config: FrameConfig,
        inbox: mpsc::Sender<WireMessage>,
        state: &ConnectionStateWatch,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                result = read_message(&mut reader, &config) => {
                    match result {
                        Ok(msg) => {
                            if inbox.send(msg).await.is_err() {
                                tracing::debug!("inbox closed, stopping reader");
                                break;
                            }
                        }
                        Err(FrameError::Message(e)) => {
                            tracing::warn!("dropping undecodable message: {e}");
                        }
                        Err(e) => {
                            tracing::info!("server connection ended: {e}");
                            state.set(ConnectionState::Disconnected);
                            break;
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn keepalive_loop(
        writer: &Mutex<OwnedWriteHalf>,
        config: &FrameConfig,
        state: &ConnectionStateWatch,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if state.current() != ConnectionState::Connected {
                        break;
                    }
                    let mut w = writer.lock().await;
                    if let Err(e) = write_frame(&mut *w, &[], config).await {
                        tracing::warn!("keepalive failed: {e}");
                        state.set(ConnectionState::Disconnected);
                        break;
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
