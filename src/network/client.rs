//! Blocking client
//!
//! Speaks the map protocol to a running server.

use std::io::{BufReader, BufWriter, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::address::{ChunkPos, ColumnPos, Domain};
use crate::error::{ChunkMapError, Result};
use crate::protocol::{read_reply, write_request, Listing, Reply, Request, Target, TERMINAL_BYTE};

/// Client connection to a map server
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    /// Limit how long a reply may take; `None` waits forever
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    // =========================================================================
    // Chunks
    // =========================================================================

    pub fn contains_chunk(&mut self, pos: ChunkPos) -> Result<bool> {
        self.contains(Target::Chunk(pos))
    }

    pub fn get_chunk(&mut self, pos: ChunkPos) -> Result<Option<Vec<u8>>> {
        self.get(Target::Chunk(pos))
    }

    pub fn save_chunk(&mut self, pos: ChunkPos, data: Vec<u8>) -> Result<()> {
        self.send(&Request::Save {
            target: Target::Chunk(pos),
            data,
        })
    }

    pub fn list_chunks(&mut self) -> Result<Vec<ChunkPos>> {
        match self.list(Domain::Chunk)? {
            Listing::Chunks(positions) => Ok(positions),
            other => Err(unexpected(&Reply::List(other))),
        }
    }

    // =========================================================================
    // Columns
    // =========================================================================

    pub fn contains_column(&mut self, pos: ColumnPos) -> Result<bool> {
        self.contains(Target::Column(pos))
    }

    pub fn get_column(&mut self, pos: ColumnPos) -> Result<Option<Vec<u8>>> {
        self.get(Target::Column(pos))
    }

    pub fn save_column(&mut self, pos: ColumnPos, data: Vec<u8>) -> Result<()> {
        self.send(&Request::Save {
            target: Target::Column(pos),
            data,
        })
    }

    pub fn list_columns(&mut self) -> Result<Vec<ColumnPos>> {
        match self.list(Domain::Column)? {
            Listing::Columns(positions) => Ok(positions),
            other => Err(unexpected(&Reply::List(other))),
        }
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Ask the server to commit every pending write (from all clients)
    pub fn commit(&mut self) -> Result<()> {
        self.send(&Request::Commit)
    }

    /// Send a close packet and wait for the server's terminal byte
    pub fn close(mut self) -> Result<()> {
        self.send(&Request::Close)?;
        let mut byte = [0u8; 1];
        self.reader.read_exact(&mut byte)?;
        if byte[0] != TERMINAL_BYTE {
            return Err(ChunkMapError::Protocol(format!(
                "Expected terminal byte, got 0x{:02x}",
                byte[0]
            )));
        }
        Ok(())
    }

    fn contains(&mut self, target: Target) -> Result<bool> {
        match self.round_trip(&Request::Contains(target))? {
            Reply::Contains { domain, found } if domain == target.domain() => Ok(found),
            other => Err(unexpected(&other)),
        }
    }

    fn get(&mut self, target: Target) -> Result<Option<Vec<u8>>> {
        match self.round_trip(&Request::Get(target))? {
            Reply::Get { domain, data } if domain == target.domain() => Ok(data),
            other => Err(unexpected(&other)),
        }
    }

    fn list(&mut self, domain: Domain) -> Result<Listing> {
        match self.round_trip(&Request::List(domain))? {
            Reply::List(listing) if listing.domain() == domain => Ok(listing),
            other => Err(unexpected(&other)),
        }
    }

    fn send(&mut self, request: &Request) -> Result<()> {
        write_request(&mut self.writer, request)
    }

    fn round_trip(&mut self, request: &Request) -> Result<Reply> {
        self.send(request)?;
        read_reply(&mut self.reader)
    }
}

fn unexpected(reply: &Reply) -> ChunkMapError {
    ChunkMapError::Protocol(format!(
        "Unexpected {:?} {} reply (tag 0x{:02x})",
        reply.opcode(),
        reply.domain(),
        reply.tag()
    ))
}
