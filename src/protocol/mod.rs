//! Protocol Module
//!
//! Defines the wire protocol between the map server and its clients.
//!
//! ## Tag Byte
//! Every packet starts with one tag byte:
//! ```text
//!    7     6       5        4      3 .. 0
//! ┌─────┬───────┬────────┬────────┬──────────┐
//! │  -  │ reply │ column │ result │ opcode   │
//! └─────┴───────┴────────┴────────┴──────────┘
//! ```
//! - reply (0x40): clear on requests, set on replies
//! - column (0x20): 0 = chunk (x, y, z), 1 = column (x, z)
//! - result (0x10): set on replies carrying a true/present result, and on list replies
//!
//! ### Opcodes
//! - 0: CLOSE     - no payload, no reply
//! - 1: CONTAINS  - Payload: x, y|z, [z]; Reply: tag only
//! - 2: GET       - Payload: x, y|z, [z]; Reply: tag, [len, bytes]
//! - 3: SAVE      - Payload: x, y|z, [z], len, bytes; no reply
//! - 4: LIST      - no payload; Reply: tag, count, count × position
//! - 5: COMMIT    - no payload, no reply
//! - 6..15: reserved, ignored by the server
//!
//! All integers are big-endian i32. When a connection ends the server
//! writes a single terminal `0x00` byte before closing the socket.

mod request;
mod reply;
mod codec;

pub use request::{Opcode, Request, Target};
pub use reply::{Listing, Reply};
pub use codec::{
    decode_reply, decode_request, encode_reply, encode_request, read_reply, read_request,
    write_reply, write_request, COLUMN_FLAG, OPCODE_MASK, REPLY_FLAG, RESULT_FLAG,
    TERMINAL_BYTE,
};
