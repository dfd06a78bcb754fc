//! Connection Handler Module
//!
//! This module handles individual client connections to KVLite.
//! Each client gets two tasks: a reader that parses and executes command
//! lines, and a delivery task that is the only writer to the socket.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. Socket split; delivery task spawned on the write half
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐        ┌──────────────────┐
//!    │      Reader Loop             │        │  Delivery Task   │
//!    │                              │        │                  │
//!    │  read bytes ──> frame lines  │        │  queue ──> socket│
//!    │        │                     │        │   (FIFO, flush)  │
//!    │        ▼                     │ reply  │        ▲         │
//!    │  execute command ────────────┼───────>│        │         │
//!    │        │                     │        │   PUBLISH from   │
//!    │   [Loop back]                │        │  other sessions  │
//!    └──────────────────────────────┘        └──────────────────┘
//!        │
//!        ▼
//! 4. QUIT / EOF / read error
//!        │
//!        ▼
//! 5. Leave every channel, drain the queue, close the socket
//! ```
//!
//! ## Buffer Management
//!
//! We use a BytesMut buffer to accumulate incoming data. TCP is a stream
//! protocol, so one read may carry a partial line or several lines.

use crate::commands::CommandHandler;
use crate::connection::session::{spawn_delivery, Outbox};
use crate::protocol::{LineFramer, ParseError};
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufWriter};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// How long teardown waits for queued frames to reach a client
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// Owns the read half of the socket, the session's outbox, and the
/// handle of the delivery task writing to the other half.
pub struct ConnectionHandler {
    /// Read half of the TCP stream
    reader: OwnedReadHalf,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Line framer
    framer: LineFramer,

    /// The command handler (shared state behind it)
    command_handler: CommandHandler,

    /// This session's outbound queue
    outbox: Outbox,

    /// The task draining `outbox` onto the socket
    delivery: JoinHandle<io::Result<()>>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a new connection handler and starts its delivery task.
    ///
    /// # Arguments
    ///
    /// * `stream` - The TCP stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `queue_capacity` - Frames the outbound queue holds before publishes are dropped
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        queue_capacity: usize,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        let (reader, writer) = stream.into_split();
        let session = command_handler.registry().next_session_id();
        let (outbox, frames) = Outbox::channel(session, queue_capacity);
        let delivery = spawn_delivery(BufWriter::new(writer), frames, Arc::clone(&stats));

        Self {
            reader,
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            framer: LineFramer::new(),
            command_handler,
            outbox,
            delivery,
            stats,
        }
    }

    /// Runs the connection until the client quits or goes away.
    ///
    /// Teardown always runs: the session leaves every channel, queued
    /// frames get a bounded chance to drain, and the socket is closed.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let session = self.outbox.id();
        info!(client = %self.addr, %session, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected (requested)"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.teardown().await;
        result
    }

    /// The main read-execute-reply loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(line) = self.framer.next_line(&mut self.buffer)? {
                if !self.handle_line(&line).await? {
                    return Ok(());
                }
            }

            if !self.read_more_data().await? {
                // A last command without a trailing newline still counts.
                if let Some(line) = self.framer.finish(&mut self.buffer) {
                    if !self.handle_line(&line).await? {
                        return Ok(());
                    }
                }
                return Err(ConnectionError::ClientDisconnected);
            }
        }
    }

    /// Executes one line and queues its reply.
    ///
    /// Returns `false` once the client has asked to leave.
    async fn handle_line(&mut self, line: &str) -> Result<bool, ConnectionError> {
        let Some(reply) = self.command_handler.execute(line, &self.outbox).await else {
            return Ok(true);
        };

        self.stats.command_processed();
        if reply.is_error() {
            debug!(client = %self.addr, reply = %reply, "Rejected command");
        } else {
            trace!(client = %self.addr, reply = %reply, "Executed command");
        }

        let keep_open = !reply.closes_connection();
        self.outbox
            .send(reply.serialize())
            .await
            .map_err(|_| ConnectionError::DeliveryClosed)?;

        Ok(keep_open)
    }

    /// Reads more data from the socket into the buffer.
    ///
    /// Returns `false` at end of stream.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = tokio::select! {
            read = self.reader.read_buf(&mut self.buffer) => read?,
            _ = self.outbox.closed() => return Err(ConnectionError::DeliveryClosed),
        };

        if n == 0 {
            return Ok(false);
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(true)
    }

    /// Deregisters the session and lets the delivery task finish.
    async fn teardown(self) {
        let ConnectionHandler {
            addr,
            command_handler,
            outbox,
            mut delivery,
            stats,
            ..
        } = self;

        command_handler.end_session(outbox.id());

        // With the registry's clones gone, this was the last sender.
        drop(outbox);

        match tokio::time::timeout(DRAIN_TIMEOUT, &mut delivery).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => debug!(client = %addr, error = %e, "Delivery ended with error"),
            Ok(Err(e)) => warn!(client = %addr, error = %e, "Delivery task failed"),
            Err(_) => {
                warn!(client = %addr, "Client not reading, dropping queued frames");
                delivery.abort();
            }
        }

        stats.connection_closed();
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Line framing error
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// The delivery task stopped, so replies can no longer be written
    #[error("Outbound delivery closed")]
    DeliveryClosed,
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
///
/// # Arguments
///
/// * `stream` - The TCP stream for this connection
/// * `addr` - The client's socket address
/// * `command_handler` - The command handler for executing commands
/// * `queue_capacity` - Size of the session's outbound queue
/// * `stats` - Shared connection statistics
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    queue_capacity: usize,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, queue_capacity, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::session::DEFAULT_QUEUE_CAPACITY;
    use crate::pubsub::PubSubRegistry;
    use crate::storage::StorageEngine;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    struct TestServer {
        addr: SocketAddr,
        storage: Arc<StorageEngine>,
        registry: Arc<PubSubRegistry>,
        stats: Arc<ConnectionStats>,
    }

    async fn create_test_server() -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let registry = Arc::new(PubSubRegistry::new());
        let stats = Arc::new(ConnectionStats::new());

        let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&registry));
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    handler.clone(),
                    DEFAULT_QUEUE_CAPACITY,
                    stats,
                ));
            }
        });

        TestServer {
            addr,
            storage,
            registry,
            stats,
        }
    }

    async fn connect(addr: SocketAddr) -> BufReader<TcpStream> {
        BufReader::new(TcpStream::connect(addr).await.unwrap())
    }

    async fn send(client: &mut BufReader<TcpStream>, line: &str) {
        client.get_mut().write_all(line.as_bytes()).await.unwrap();
    }

    async fn read_line(client: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        timeout(Duration::from_secs(2), client.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        line
    }

    async fn assert_silent(client: &mut BufReader<TcpStream>) {
        let mut line = String::new();
        let result = timeout(Duration::from_millis(150), client.read_line(&mut line)).await;
        assert!(result.is_err(), "unexpected data: {:?}", line);
    }

    async fn command(client: &mut BufReader<TcpStream>, line: &str) -> String {
        send(client, line).await;
        read_line(client).await
    }

    #[tokio::test]
    async fn test_set_get_del_scenario() {
        let server = create_test_server().await;
        let mut client = connect(server.addr).await;

        assert_eq!(command(&mut client, "SET a 1\n").await, "> OK\n");
        assert_eq!(command(&mut client, "GET a\n").await, ">  1\n");
        assert_eq!(command(&mut client, "DEL a\n").await, "> 1\n");
        assert_eq!(command(&mut client, "GET a\n").await, "> (nil)\n");
        assert_eq!(command(&mut client, "DEL a\n").await, "> 0\n");
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let server = create_test_server().await;
        let mut client = connect(server.addr).await;

        send(&mut client, "SET k1 v1\r\nSET k2 v2\nGET k1\nGET k2\n").await;

        assert_eq!(read_line(&mut client).await, "> OK\n");
        assert_eq!(read_line(&mut client).await, "> OK\n");
        assert_eq!(read_line(&mut client).await, ">  v1\n");
        assert_eq!(read_line(&mut client).await, ">  v2\n");
        assert_eq!(server.storage.len(), 2);
    }

    #[tokio::test]
    async fn test_errors_keep_connection_open() {
        let server = create_test_server().await;
        let mut client = connect(server.addr).await;

        assert_eq!(
            command(&mut client, "SET onlykey\n").await,
            "> Err usage: SET key value\n"
        );
        assert_eq!(command(&mut client, "HELLO\n").await, "> Err unknown command\n");

        // Blank lines get no reply at all.
        send(&mut client, "\n   \n").await;
        assert_eq!(command(&mut client, "set x y\n").await, "> OK\n");
    }

    #[tokio::test]
    async fn test_publish_reaches_only_subscribers() {
        let server = create_test_server().await;
        let mut x = connect(server.addr).await;
        let mut y = connect(server.addr).await;
        let mut z = connect(server.addr).await;

        assert_eq!(command(&mut x, "SUBSCRIBE news\n").await, "> Subscribed to news\n");
        assert_eq!(
            command(&mut y, "PUBLISH news hello\n").await,
            "> Published to news\n"
        );

        assert_eq!(read_line(&mut x).await, "hello\n");
        assert_silent(&mut x).await;
        assert_silent(&mut z).await;
    }

    #[tokio::test]
    async fn test_subscriber_still_runs_commands() {
        let server = create_test_server().await;
        let mut x = connect(server.addr).await;
        let mut y = connect(server.addr).await;

        command(&mut x, "SUBSCRIBE a\n").await;
        command(&mut x, "SUBSCRIBE b\n").await;
        command(&mut y, "PUBLISH b first\n").await;
        assert_eq!(read_line(&mut x).await, "first\n");

        assert_eq!(command(&mut x, "SET k v\n").await, "> OK\n");
        assert_eq!(
            command(&mut x, "UNSUBSCRIBE b\n").await,
            "> Unsubscribed from b\n"
        );
        command(&mut y, "PUBLISH b second\n").await;
        assert_silent(&mut x).await;
        assert_eq!(server.registry.channel_count(), 1);
    }

    #[tokio::test]
    async fn test_quit_says_bye_and_closes() {
        let server = create_test_server().await;
        let mut client = connect(server.addr).await;

        assert_eq!(command(&mut client, "QUIT\n").await, "> BYE\n");

        let mut rest = String::new();
        let n = timeout(Duration::from_secs(2), client.read_line(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_disconnect_leaves_all_channels() {
        let server = create_test_server().await;
        let mut x = connect(server.addr).await;

        command(&mut x, "SUBSCRIBE news\n").await;
        command(&mut x, "SUBSCRIBE sport\n").await;
        assert_eq!(server.registry.channel_count(), 2);

        drop(x);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(server.registry.channel_count(), 0);
        let mut y = connect(server.addr).await;
        assert_eq!(
            command(&mut y, "PUBLISH news anyone\n").await,
            "> Published to news\n"
        );
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let server = create_test_server().await;
        let mut client = connect(server.addr).await;

        send(&mut client, "SET last word").await;
        client.get_mut().shutdown().await.unwrap();

        assert_eq!(read_line(&mut client).await, "> OK\n");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.storage.get("last"), Some("word".to_string()));
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let server = create_test_server().await;
        let stats = &server.stats;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = connect(server.addr).await;

        // Give the server time to accept the connection
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        command(&mut client, "GET nothing\n").await;

        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        // Close connection
        drop(client);

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
