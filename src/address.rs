//! Address Codec
//!
//! Packs world coordinates into the 64-bit keys used by the chunk and
//! column trees.
//!
//! ## Layout
//! ```text
//!  63          44 43          22 21           0
//! ┌──────────────┬──────────────┬──────────────┐
//! │  y (20 bits) │  x (22 bits) │  z (22 bits) │
//! └──────────────┴──────────────┴──────────────┘
//! ```
//!
//! Each field keeps the low bits of its input. Coordinates outside
//! x,z ∈ [-2^21, 2^21) or y ∈ [-2^19, 2^19) are truncated, and decoding
//! returns the truncated value. Columns use the same layout with y = 0.

use std::fmt;

const XZ_BITS: u32 = 22;
const Y_BITS: u32 = 20;

const Z_OFFSET: u32 = 0;
const X_OFFSET: u32 = 22;
const Y_OFFSET: u32 = 44;

const XZ_MASK: i32 = (1 << XZ_BITS) - 1;
const Y_MASK: i32 = (1 << Y_BITS) - 1;

/// Pack a chunk coordinate into its address
pub fn encode_3d(x: i32, y: i32, z: i32) -> i64 {
    let x = (x & XZ_MASK) as u64;
    let y = (y & Y_MASK) as u64;
    let z = (z & XZ_MASK) as u64;
    ((y << Y_OFFSET) | (x << X_OFFSET) | (z << Z_OFFSET)) as i64
}

/// Pack a column coordinate into its address
pub fn encode_2d(x: i32, z: i32) -> i64 {
    encode_3d(x, 0, z)
}

/// Unpack a chunk address into (x, y, z)
pub fn decode_3d(address: i64) -> (i32, i32, i32) {
    (
        unpack_signed(address, XZ_BITS, X_OFFSET),
        unpack_signed(address, Y_BITS, Y_OFFSET),
        unpack_signed(address, XZ_BITS, Z_OFFSET),
    )
}

/// Unpack a column address into (x, z)
pub fn decode_2d(address: i64) -> (i32, i32) {
    (
        unpack_signed(address, XZ_BITS, X_OFFSET),
        unpack_signed(address, XZ_BITS, Z_OFFSET),
    )
}

/// Extract a sign-extended field of `size` bits starting at `offset`.
///
/// The field is first pushed up against the sign bit and shifted back
/// arithmetically, so its top bit is replicated over everything above it.
fn unpack_signed(packed: i64, size: u32, offset: u32) -> i32 {
    let complement = 64 - offset - size;
    let extended = (packed << complement) >> complement;
    (extended >> offset) as i32
}

// =============================================================================
// Positions
// =============================================================================

/// Which keyspace a request or reply concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Chunk,
    Column,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Chunk => f.write_str("chunk"),
            Domain::Column => f.write_str("column"),
        }
    }
}

/// Position of a chunk (3-D)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn address(&self) -> i64 {
        encode_3d(self.x, self.y, self.z)
    }

    pub fn from_address(address: i64) -> Self {
        let (x, y, z) = decode_3d(address);
        Self { x, y, z }
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Position of a column (2-D, y is implicitly 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnPos {
    pub x: i32,
    pub z: i32,
}

impl ColumnPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn address(&self) -> i64 {
        encode_2d(self.x, self.z)
    }

    pub fn from_address(address: i64) -> Self {
        let (x, z) = decode_2d(address);
        Self { x, z }
    }
}

impl fmt::Display for ColumnPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}
