//! Wire protocol for the mithril game server.
//!
//! Post-login traffic is a stream of length-prefixed frames:
//! `length (1-2 bytes) ‖ opcode (1 byte) ‖ payload`. Lengths 1-127 occupy a
//! single byte; 128-32767 occupy two bytes with the high bit of the first
//! byte set. On ciphered connections the opcode is rotated by the next byte
//! of the per-direction [`Isaac`] keystream; payloads are never ciphered.
//!
//! Pre-login (handshake) frames are *bare*: raw payload with no length
//! prefix, read and written directly by the handshake code.

mod codec;
mod io;
mod isaac;
mod xtea;

pub mod op;

use bytes::BytesMut;
pub use codec::{FrameDecoder, FrameEncoder, FrameError};
pub use io::{FrameBuilder, FrameReader};
pub use isaac::Isaac;
pub use xtea::{decipher as xtea_decipher, encipher as xtea_encipher};

/// Frames longer than this are rejected as malformed. The two-byte length
/// form tops out at 15 bits.
pub const MAX_FRAME_SIZE: usize = 32767;

/// A decoded frame: the opcode and its payload, length prefix stripped and
/// opcode rotation already undone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub body: BytesMut,
}

impl Frame {
    pub fn new(opcode: u8, body: impl AsRef<[u8]>) -> Self {
        Self {
            opcode,
            body: BytesMut::from(body.as_ref()),
        }
    }

    /// A cursor over the payload for decoding.
    pub fn reader(&self) -> FrameReader<'_> {
        FrameReader::new(&self.body)
    }
}
