//! Connection Handler
//!
//! Runs the request/reply loop for one client socket.
//!
//! ## States
//! ```text
//!   Open ──(close packet | reply-flagged tag | EOF | error | close signal)──► Closing ──► Closed
//! ```
//! `Closing` always writes the terminal byte and shuts the socket down;
//! failures while doing so are ignored.
//!
//! ## Cancellation
//! [`CloseSignal`] is checked before each packet is read. A connection
//! blocked waiting for the next tag byte does not see the signal until the
//! peer sends something or the socket is shut down
//! ([`ConnectionHandle::force_close`]).

use std::fmt;
use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::address::Domain;
use crate::config::Config;
use crate::error::{ChunkMapError, Result};
use crate::map::WorldMap;
use crate::protocol::{read_request, write_reply, Listing, Reply, Request, Target, TERMINAL_BYTE};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Diagnostic identifier of a connection; no protocol meaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection-{}", self.0)
    }
}

/// Cooperative close request shared between a connection and its handle
#[derive(Debug, Clone, Default)]
pub struct CloseSignal {
    requested: Arc<AtomicBool>,
}

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Lifecycle of a connection, observable through its handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Handles a single client connection
pub struct Connection {
    id: ConnectionId,

    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Shared chunk/column storage
    map: Arc<WorldMap>,

    /// Peer address for logging
    peer_addr: String,

    signal: CloseSignal,
    state: Arc<AtomicU8>,

    /// Socket clone lent to the handle; released on teardown
    control: Arc<Mutex<Option<TcpStream>>>,

    max_blob_size: usize,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O on clones of the stream
    pub fn new(stream: TcpStream, map: Arc<WorldMap>, config: &Config) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        if config.tcp_nodelay {
            stream.set_nodelay(true)?;
        }

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            id: ConnectionId::next(),
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            map,
            peer_addr,
            signal: CloseSignal::new(),
            state: Arc::new(AtomicU8::new(ConnectionState::Open as u8)),
            control: Arc::new(Mutex::new(None)),
            max_blob_size: config.max_blob_size,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn close_signal(&self) -> CloseSignal {
        self.signal.clone()
    }

    /// Run the connection on its own thread
    pub fn spawn(self) -> Result<ConnectionHandle> {
        *self.control.lock() = Some(self.writer.get_ref().try_clone()?);
        let control = Arc::clone(&self.control);
        let id = self.id;
        let peer_addr = self.peer_addr.clone();
        let signal = self.signal.clone();
        let state = Arc::clone(&self.state);

        let thread = thread::Builder::new()
            .name(id.to_string())
            .spawn(move || self.run())?;

        Ok(ConnectionHandle {
            id,
            peer_addr,
            signal,
            state,
            control,
            thread: Some(thread),
        })
    }

    /// Serve requests until the connection ends, then tear it down
    ///
    /// Blocks the calling thread.
    pub fn run(mut self) {
        tracing::info!("{} established from {}", self.id, self.peer_addr);

        match self.serve() {
            Ok(()) => {}
            Err(e) if e.is_disconnect() => {
                tracing::debug!("{}: client {} went away: {}", self.id, self.peer_addr, e);
            }
            Err(e) => {
                tracing::warn!("{}: error serving {}: {}", self.id, self.peer_addr, e);
            }
        }

        self.teardown();
    }

    /// The Open state: read, dispatch, reply, repeat
    fn serve(&mut self) -> Result<()> {
        while !self.signal.is_requested() {
            let request = match read_request(&mut self.reader, self.max_blob_size) {
                Ok(request) => request,
                Err(e) if e.is_disconnect() => {
                    // EOF, including mid-packet, ends the connection like a close packet
                    tracing::debug!("{}: client {} disconnected", self.id, self.peer_addr);
                    return Ok(());
                }
                Err(ChunkMapError::ReplyPacket(tag)) => {
                    tracing::error!(
                        "{}: received a reply packet 0x{:02x} from {}",
                        self.id,
                        tag,
                        self.peer_addr
                    );
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            tracing::trace!("{}: received {:?}", self.id, request);

            if self.dispatch(request)?.is_break() {
                return Ok(());
            }
        }

        tracing::debug!("{}: close signal observed", self.id);
        Ok(())
    }

    /// Execute one request against the map, replying where the opcode has a reply
    fn dispatch(&mut self, request: Request) -> Result<ControlFlow<()>> {
        match request {
            Request::Close => {
                tracing::info!("{}: close requested by {}", self.id, self.peer_addr);
                return Ok(ControlFlow::Break(()));
            }
            Request::Contains(target) => {
                let found = match target {
                    Target::Chunk(pos) => self.map.contains_chunk(pos)?,
                    Target::Column(pos) => self.map.contains_column(pos)?,
                };
                tracing::debug!("{}: contains {:?} -> {}", self.id, target, found);
                self.reply(&Reply::Contains {
                    domain: target.domain(),
                    found,
                })?;
            }
            Request::Get(target) => {
                let data = match target {
                    Target::Chunk(pos) => self.map.get_chunk(pos)?,
                    Target::Column(pos) => self.map.get_column(pos)?,
                };
                tracing::debug!(
                    "{}: get {:?} -> sending {} bytes",
                    self.id,
                    target,
                    data.as_ref().map_or(0, |d| d.len())
                );
                self.reply(&Reply::Get {
                    domain: target.domain(),
                    data,
                })?;
            }
            Request::Save { target, data } => {
                tracing::debug!("{}: save {:?} ({} bytes)", self.id, target, data.len());
                match target {
                    Target::Chunk(pos) => self.map.save_chunk(pos, data)?,
                    Target::Column(pos) => self.map.save_column(pos, data)?,
                }
            }
            Request::List(domain) => {
                let listing = match domain {
                    Domain::Chunk => Listing::Chunks(self.map.list_chunks()?),
                    Domain::Column => Listing::Columns(self.map.list_columns()?),
                };
                tracing::debug!("{}: list {}s -> {} entries", self.id, domain, listing.len());
                self.reply(&Reply::List(listing))?;
            }
            Request::Commit => {
                tracing::debug!("{}: commit", self.id);
                self.map.commit()?;
            }
            Request::Reserved(id) => {
                tracing::debug!("{}: ignoring reserved opcode {}", self.id, id);
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    fn reply(&mut self, reply: &Reply) -> Result<()> {
        write_reply(&mut self.writer, reply)
    }

    /// The Closing state: terminal byte, then socket shutdown, both best-effort
    fn teardown(&mut self) {
        self.set_state(ConnectionState::Closing);

        let _ = self
            .writer
            .write_all(&[TERMINAL_BYTE])
            .and_then(|_| self.writer.flush());

        tracing::info!("{}: closing socket to {}", self.id, self.peer_addr);
        if let Err(e) = self.writer.get_ref().shutdown(Shutdown::Both) {
            tracing::debug!("{}: socket shutdown failed: {}", self.id, e);
        }
        // the handle outlives the thread; it must not keep the descriptor open
        self.control.lock().take();

        self.set_state(ConnectionState::Closed);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Control side of a spawned [`Connection`]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer_addr: String,
    signal: CloseSignal,
    state: Arc<AtomicU8>,

    /// Clone of the socket, used to force the connection down.
    /// `None` once the connection has torn itself down.
    control: Arc<Mutex<Option<TcpStream>>>,

    thread: Option<JoinHandle<()>>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Ask the connection to close
    ///
    /// Takes effect the next time the connection checks its signal, which
    /// is after its current blocking read returns.
    pub fn close(&self) {
        self.signal.request();
    }

    /// Request close and shut the socket down, waking a blocked read
    pub fn force_close(&self) -> Result<()> {
        self.close();
        let control = self.control.lock();
        let Some(stream) = control.as_ref() else {
            return Ok(());
        };
        match stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True once the connection thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the connection thread to exit
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| ChunkMapError::Network(format!("{} panicked", self.id))),
            None => Ok(()),
        }
    }
}
