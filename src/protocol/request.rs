//! Request definitions
//!
//! Represents packets sent by clients.

use crate::address::{ChunkPos, ColumnPos, Domain};

/// Operation ids carried in the low four bits of a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Close = 0x00,
    Contains = 0x01,
    Get = 0x02,
    Save = 0x03,
    List = 0x04,
    Commit = 0x05,
}

impl Opcode {
    /// Map an id to its opcode; reserved ids (6..=15) give `None`
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x00 => Some(Opcode::Close),
            0x01 => Some(Opcode::Contains),
            0x02 => Some(Opcode::Get),
            0x03 => Some(Opcode::Save),
            0x04 => Some(Opcode::List),
            0x05 => Some(Opcode::Commit),
            _ => None,
        }
    }
}

/// The position a request refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Chunk(ChunkPos),
    Column(ColumnPos),
}

impl Target {
    pub fn domain(&self) -> Domain {
        match self {
            Target::Chunk(_) => Domain::Chunk,
            Target::Column(_) => Domain::Column,
        }
    }
}

/// A decoded request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// End the connection
    Close,

    /// Does a blob exist at the target
    Contains(Target),

    /// Fetch the blob at the target
    Get(Target),

    /// Store a blob at the target, replacing any previous one
    Save { target: Target, data: Vec<u8> },

    /// Enumerate every stored position of a domain
    List(Domain),

    /// Store-wide durability checkpoint
    Commit,

    /// Reserved opcode (6..=15); carries the id
    Reserved(u8),
}

impl Request {
    /// Opcode of the request, `None` for reserved ids
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Request::Close => Some(Opcode::Close),
            Request::Contains(_) => Some(Opcode::Contains),
            Request::Get(_) => Some(Opcode::Get),
            Request::Save { .. } => Some(Opcode::Save),
            Request::List(_) => Some(Opcode::List),
            Request::Commit => Some(Opcode::Commit),
            Request::Reserved(_) => None,
        }
    }

    /// Domain the request concerns, if any
    pub fn domain(&self) -> Option<Domain> {
        match self {
            Request::Contains(target) | Request::Get(target) => Some(target.domain()),
            Request::Save { target, .. } => Some(target.domain()),
            Request::List(domain) => Some(*domain),
            Request::Close | Request::Commit | Request::Reserved(_) => None,
        }
    }
}
