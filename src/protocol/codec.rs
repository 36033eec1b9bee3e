//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request
//! ```text
//! ┌─────────┬──────┬────────┬────────┬─────────┬──────────────┐
//! │ Tag (1) │ x(4) │ y|z(4) │ [z(4)] │ [len(4) │ bytes]       │
//! └─────────┴──────┴────────┴────────┴─────────┴──────────────┘
//! ```
//! Coordinates only for contains/get/save; len + bytes only for save.
//!
//! ### Reply
//! ```text
//! contains: │ Tag (1) │
//! get:      │ Tag (1) │ [len (4) │ bytes] │          (present only)
//! list:     │ Tag (1) │ count (4) │ count × (x, [y,] z) │
//! ```

use std::io::{Cursor, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::address::{ChunkPos, ColumnPos, Domain};
use crate::error::{ChunkMapError, Result};
use super::{Listing, Opcode, Reply, Request, Target};

/// Set on replies, must be clear on requests
pub const REPLY_FLAG: u8 = 0x40;

/// Set when the packet concerns a column
pub const COLUMN_FLAG: u8 = 0x20;

/// Set on replies with a true/present result, and on list replies
pub const RESULT_FLAG: u8 = 0x10;

/// Low four bits carry the opcode
pub const OPCODE_MASK: u8 = 0x0F;

/// Byte written by the server as the connection ends
pub const TERMINAL_BYTE: u8 = 0x00;

fn domain_flag(domain: Domain) -> u8 {
    match domain {
        Domain::Chunk => 0,
        Domain::Column => COLUMN_FLAG,
    }
}

fn tag_domain(tag: u8) -> Domain {
    if tag & COLUMN_FLAG == 0 {
        Domain::Chunk
    } else {
        Domain::Column
    }
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request to bytes
///
/// Fails if a blob is too long for the 32-bit length field.
pub fn encode_request(request: &Request) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(16);

    match request {
        Request::Close => buf.put_u8(Opcode::Close as u8),
        Request::Contains(target) => {
            buf.put_u8(Opcode::Contains as u8 | domain_flag(target.domain()));
            put_target(&mut buf, target);
        }
        Request::Get(target) => {
            buf.put_u8(Opcode::Get as u8 | domain_flag(target.domain()));
            put_target(&mut buf, target);
        }
        Request::Save { target, data } => {
            buf.reserve(data.len() + 4);
            buf.put_u8(Opcode::Save as u8 | domain_flag(target.domain()));
            put_target(&mut buf, target);
            put_len(&mut buf, data.len())?;
            buf.put_slice(data);
        }
        Request::List(domain) => buf.put_u8(Opcode::List as u8 | domain_flag(*domain)),
        Request::Commit => buf.put_u8(Opcode::Commit as u8),
        Request::Reserved(id) => buf.put_u8(id & OPCODE_MASK),
    }

    Ok(buf.freeze())
}

fn put_target(buf: &mut BytesMut, target: &Target) {
    match target {
        Target::Chunk(pos) => {
            buf.put_i32(pos.x);
            buf.put_i32(pos.y);
            buf.put_i32(pos.z);
        }
        Target::Column(pos) => {
            buf.put_i32(pos.x);
            buf.put_i32(pos.z);
        }
    }
}

/// Read one request from a stream
///
/// Blocks until the whole packet has arrived. A stream that ends
/// mid-packet surfaces as an `UnexpectedEof` I/O error.
pub fn read_request<R: Read>(reader: &mut R, max_blob_size: usize) -> Result<Request> {
    let tag = read_u8(reader)?;
    if tag & REPLY_FLAG != 0 {
        return Err(ChunkMapError::ReplyPacket(tag));
    }

    let domain = tag_domain(tag);
    let id = tag & OPCODE_MASK;

    let request = match Opcode::from_id(id) {
        Some(Opcode::Close) => Request::Close,
        Some(Opcode::Contains) => Request::Contains(read_target(reader, domain)?),
        Some(Opcode::Get) => Request::Get(read_target(reader, domain)?),
        Some(Opcode::Save) => {
            let target = read_target(reader, domain)?;
            let len = read_i32(reader)?;
            if len < 0 || len as usize > max_blob_size {
                return Err(ChunkMapError::Protocol(format!(
                    "Invalid blob length {} (max {})",
                    len, max_blob_size
                )));
            }
            let mut data = vec![0u8; len as usize];
            reader.read_exact(&mut data)?;
            Request::Save { target, data }
        }
        Some(Opcode::List) => Request::List(domain),
        Some(Opcode::Commit) => Request::Commit,
        None => Request::Reserved(id),
    };

    Ok(request)
}

/// Decode a request from bytes
pub fn decode_request(bytes: &[u8], max_blob_size: usize) -> Result<Request> {
    read_request(&mut Cursor::new(bytes), max_blob_size)
}

fn read_target<R: Read>(reader: &mut R, domain: Domain) -> Result<Target> {
    let x = read_i32(reader)?;
    // y for chunks, z for columns
    let yz = read_i32(reader)?;
    match domain {
        Domain::Chunk => {
            let z = read_i32(reader)?;
            Ok(Target::Chunk(ChunkPos::new(x, yz, z)))
        }
        Domain::Column => Ok(Target::Column(ColumnPos::new(x, yz))),
    }
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    writer.write_all(&encode_request(request)?)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Reply Encoding/Decoding
// =============================================================================

/// Encode a reply to bytes
pub fn encode_reply(reply: &Reply) -> Result<Bytes> {
    let mut buf = match reply {
        Reply::Contains { .. } => BytesMut::with_capacity(1),
        Reply::Get { data, .. } => {
            BytesMut::with_capacity(5 + data.as_ref().map_or(0, |d| d.len()))
        }
        Reply::List(listing) => BytesMut::with_capacity(5 + listing.len() * 12),
    };

    buf.put_u8(reply.tag());

    match reply {
        Reply::Contains { .. } => {}
        Reply::Get { data, .. } => {
            if let Some(data) = data {
                put_len(&mut buf, data.len())?;
                buf.put_slice(data);
            }
        }
        Reply::List(Listing::Chunks(positions)) => {
            put_len(&mut buf, positions.len())?;
            for pos in positions {
                buf.put_i32(pos.x);
                buf.put_i32(pos.y);
                buf.put_i32(pos.z);
            }
        }
        Reply::List(Listing::Columns(positions)) => {
            put_len(&mut buf, positions.len())?;
            for pos in positions {
                buf.put_i32(pos.x);
                buf.put_i32(pos.z);
            }
        }
    }

    Ok(buf.freeze())
}

/// Write a reply to a stream
pub fn write_reply<W: Write>(writer: &mut W, reply: &Reply) -> Result<()> {
    writer.write_all(&encode_reply(reply)?)?;
    writer.flush()?;
    Ok(())
}

/// Read one reply from a stream
pub fn read_reply<R: Read>(reader: &mut R) -> Result<Reply> {
    let tag = read_u8(reader)?;
    if tag == TERMINAL_BYTE {
        return Err(ChunkMapError::Protocol(
            "Server closed the connection".to_string(),
        ));
    }
    if tag & REPLY_FLAG == 0 {
        return Err(ChunkMapError::Protocol(format!(
            "Expected a reply, got tag 0x{:02x}",
            tag
        )));
    }

    let domain = tag_domain(tag);
    let result = tag & RESULT_FLAG != 0;

    match Opcode::from_id(tag & OPCODE_MASK) {
        Some(Opcode::Contains) => Ok(Reply::Contains {
            domain,
            found: result,
        }),
        Some(Opcode::Get) => {
            let data = if result {
                let len = read_len(reader)?;
                let mut data = vec![0u8; len];
                reader.read_exact(&mut data)?;
                Some(data)
            } else {
                None
            };
            Ok(Reply::Get { domain, data })
        }
        Some(Opcode::List) => {
            let count = read_len(reader)?;
            let listing = match domain {
                Domain::Chunk => {
                    let mut positions = Vec::with_capacity(count.min(4096));
                    for _ in 0..count {
                        let x = read_i32(reader)?;
                        let y = read_i32(reader)?;
                        let z = read_i32(reader)?;
                        positions.push(ChunkPos::new(x, y, z));
                    }
                    Listing::Chunks(positions)
                }
                Domain::Column => {
                    let mut positions = Vec::with_capacity(count.min(4096));
                    for _ in 0..count {
                        let x = read_i32(reader)?;
                        let z = read_i32(reader)?;
                        positions.push(ColumnPos::new(x, z));
                    }
                    Listing::Columns(positions)
                }
            };
            Ok(Reply::List(listing))
        }
        _ => Err(ChunkMapError::Protocol(format!(
            "Unexpected reply tag 0x{:02x}",
            tag
        ))),
    }
}

/// Decode a reply from bytes
pub fn decode_reply(bytes: &[u8]) -> Result<Reply> {
    read_reply(&mut Cursor::new(bytes))
}

// =============================================================================
// Primitive readers
// =============================================================================

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_be_bytes(bytes))
}

fn put_len(buf: &mut BytesMut, len: usize) -> Result<()> {
    let len = i32::try_from(len).map_err(|_| {
        ChunkMapError::Protocol(format!("Length {} does not fit the 32-bit length field", len))
    })?;
    buf.put_i32(len);
    Ok(())
}

fn read_len<R: Read>(reader: &mut R) -> Result<usize> {
    let len = read_i32(reader)?;
    usize::try_from(len)
        .map_err(|_| ChunkMapError::Protocol(format!("Negative length {}", len)))
}
