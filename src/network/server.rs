//! TCP Server
//!
//! Accepts connections and runs each on its own thread.
//!
//! ## Lifecycle
//! 1. `start`: bind, spawn the accept loop
//! 2. Accept loop: accept with a timeout of one poll interval, then check
//!    the shutdown signal. A socket that arrives mid-interval is accepted
//!    within a few milliseconds
//! 3. `stop`: signal shutdown, wait the grace period, ask every connection
//!    to close, then close the listening socket
//!
//! `stop` does not wait for connections to finish. An idle connection stays
//! open until its peer sends data or disconnects, unless
//! `force_close_on_shutdown` is set.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{ChunkMapError, Result};
use crate::map::WorldMap;

use super::connection::{Connection, ConnectionHandle, ConnectionId, ConnectionState};

type Registry = Arc<Mutex<Vec<ConnectionHandle>>>;

/// How often a waiting accept re-polls the non-blocking listener
const ACCEPT_RETRY: Duration = Duration::from_millis(2);

/// TCP server for the chunk map
pub struct Server {
    config: Config,
    map: Arc<WorldMap>,

    /// Connections that may still be running; finished ones are pruned
    /// as new sockets are accepted
    connections: Registry,

    /// Total connections accepted since start
    accepted: Arc<AtomicUsize>,

    /// Dropping the sender is the shutdown signal
    shutdown: Option<Sender<()>>,

    /// Accept loop thread; hands the listener back when it exits
    acceptor: Option<JoinHandle<TcpListener>>,

    local_addr: Option<SocketAddr>,
}

impl Server {
    /// Create a new server with the given config and map
    pub fn new(config: Config, map: Arc<WorldMap>) -> Self {
        Self {
            config,
            map,
            connections: Arc::new(Mutex::new(Vec::new())),
            accepted: Arc::new(AtomicUsize::new(0)),
            shutdown: None,
            acceptor: None,
            local_addr: None,
        }
    }

    /// Bind the listening socket and start accepting in the background
    ///
    /// Returns the bound address (useful with port 0).
    pub fn start(&mut self) -> Result<SocketAddr> {
        if self.acceptor.is_some() {
            return Err(ChunkMapError::Network("server already running".to_string()));
        }
        self.config.validate()?;

        let listener = TcpListener::bind(&self.config.listen_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = channel::bounded(0);
        let accept_loop = AcceptLoop {
            listener,
            shutdown: shutdown_rx,
            map: Arc::clone(&self.map),
            connections: Arc::clone(&self.connections),
            accepted: Arc::clone(&self.accepted),
            config: self.config.clone(),
        };

        let acceptor = thread::Builder::new()
            .name("acceptor".to_string())
            .spawn(move || accept_loop.run())?;

        self.shutdown = Some(shutdown_tx);
        self.acceptor = Some(acceptor);
        self.local_addr = Some(local_addr);

        tracing::info!("Listening on {}", local_addr);
        Ok(local_addr)
    }

    /// Stop accepting and ask every connection to close
    pub fn stop(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };

        tracing::info!("Stopping server");
        drop(shutdown);

        thread::sleep(self.config.shutdown_grace());

        for connection in self.connections.lock().iter() {
            connection.close();
            if self.config.force_close_on_shutdown {
                if let Err(e) = connection.force_close() {
                    tracing::warn!("Failed to force-close {}: {}", connection.id(), e);
                }
            }
        }

        if let Some(acceptor) = self.acceptor.take() {
            match acceptor.join() {
                Ok(listener) => {
                    tracing::info!("Closing server");
                    drop(listener);
                }
                Err(_) => tracing::error!("Accept loop panicked"),
            }
        }
        self.local_addr = None;
    }

    pub fn is_running(&self) -> bool {
        self.acceptor.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Connections accepted since start, finished or not
    pub fn connection_count(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections whose thread is still running
    pub fn live_connections(&self) -> usize {
        self.connections
            .lock()
            .iter()
            .filter(|c| !c.is_finished())
            .count()
    }

    /// States of the connections still held in the registry
    pub fn connection_states(&self) -> Vec<(ConnectionId, ConnectionState)> {
        self.connections
            .lock()
            .iter()
            .map(|c| (c.id(), c.state()))
            .collect()
    }

    pub fn map(&self) -> &Arc<WorldMap> {
        &self.map
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the accept thread
struct AcceptLoop {
    listener: TcpListener,
    shutdown: Receiver<()>,
    map: Arc<WorldMap>,
    connections: Registry,
    accepted: Arc<AtomicUsize>,
    config: Config,
}

impl AcceptLoop {
    fn run(self) -> TcpListener {
        let poll_interval = self.config.accept_poll_interval();

        loop {
            if let Err(TryRecvError::Disconnected) = self.shutdown.try_recv() {
                break;
            }

            match self.accept_timeout(poll_interval) {
                Ok(Some((stream, addr))) => {
                    if let Err(e) = self.register(stream) {
                        tracing::error!("Failed to start connection from {}: {}", addr, e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("accept: {}", e);
                    // persistent failures (e.g. EMFILE) must not spin the loop
                    if self.wait_for_shutdown(poll_interval) {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Accept loop stopped");
        self.listener
    }

    /// Accept one socket, waiting at most `timeout`
    ///
    /// Returns `Ok(None)` when the timeout passes or shutdown is signalled.
    /// The listener is non-blocking, so it is retried every
    /// [`ACCEPT_RETRY`] until the deadline.
    fn accept_timeout(&self, timeout: Duration) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.listener.accept() {
                Ok(accepted) => return Ok(Some(accepted)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline || self.wait_for_shutdown(ACCEPT_RETRY.min(deadline - now)) {
                return Ok(None);
            }
        }
    }

    /// Sleep up to `timeout`; true if shutdown was signalled meanwhile
    fn wait_for_shutdown(&self, timeout: Duration) -> bool {
        match self.shutdown.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    fn register(&self, stream: TcpStream) -> Result<()> {
        // accepted sockets may inherit the listener's non-blocking mode
        stream.set_nonblocking(false)?;
        let handle = Connection::new(stream, Arc::clone(&self.map), &self.config)?.spawn()?;

        let mut connections = self.connections.lock();
        connections.retain(|c| !c.is_finished());
        connections.push(handle);
        self.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
