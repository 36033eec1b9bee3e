//! Reply definitions
//!
//! Represents packets sent back to clients.

use crate::address::{ChunkPos, ColumnPos, Domain};
use super::codec::{COLUMN_FLAG, REPLY_FLAG, RESULT_FLAG};
use super::Opcode;

/// Positions returned by a list request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Chunks(Vec<ChunkPos>),
    Columns(Vec<ColumnPos>),
}

impl Listing {
    pub fn domain(&self) -> Domain {
        match self {
            Listing::Chunks(_) => Domain::Chunk,
            Listing::Columns(_) => Domain::Column,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Listing::Chunks(positions) => positions.len(),
            Listing::Columns(positions) => positions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A reply packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Contains { domain: Domain, found: bool },
    Get { domain: Domain, data: Option<Vec<u8>> },
    List(Listing),
}

impl Reply {
    pub fn opcode(&self) -> Opcode {
        match self {
            Reply::Contains { .. } => Opcode::Contains,
            Reply::Get { .. } => Opcode::Get,
            Reply::List(_) => Opcode::List,
        }
    }

    pub fn domain(&self) -> Domain {
        match self {
            Reply::Contains { domain, .. } | Reply::Get { domain, .. } => *domain,
            Reply::List(listing) => listing.domain(),
        }
    }

    /// Tag byte: reply flag | opcode | domain flag | result flag
    pub fn tag(&self) -> u8 {
        let result = match self {
            Reply::Contains { found, .. } => *found,
            Reply::Get { data, .. } => data.is_some(),
            Reply::List(_) => true,
        };

        let mut tag = REPLY_FLAG | self.opcode() as u8;
        if self.domain() == Domain::Column {
            tag |= COLUMN_FLAG;
        }
        if result {
            tag |= RESULT_FLAG;
        }
        tag
    }
}
