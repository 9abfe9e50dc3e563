use anyhow::ensure;
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::{Frame, Isaac, MAX_FRAME_SIZE};

/// A malformed frame on the wire. Fatal to the connection.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
pub enum FrameError {
    #[error("frame length of zero")]
    ZeroLength,
    #[error("frame length of {0} exceeds the maximum of {MAX_FRAME_SIZE}")]
    TooLong(usize),
}

/// Encodes frames into a contiguous byte buffer, rotating opcodes with the
/// outbound cipher once one is installed.
#[derive(Default)]
pub struct FrameEncoder {
    buf: BytesMut,
    cipher: Option<Isaac>,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_frame(&mut self, frame: &Frame) -> anyhow::Result<()> {
        // The length field counts the opcode byte.
        let len = frame.body.len() + 1;

        ensure!(len <= MAX_FRAME_SIZE, FrameError::TooLong(len));

        if len < 128 {
            self.buf.put_u8(len as u8);
        } else {
            self.buf.put_u8(0x80 | (len >> 8) as u8);
            self.buf.put_u8((len & 0xff) as u8);
        }

        let opcode = match &mut self.cipher {
            Some(cipher) => frame.opcode.wrapping_add(cipher.next_u8()),
            None => frame.opcode,
        };

        self.buf.put_u8(opcode);
        self.buf.extend_from_slice(&frame.body);

        Ok(())
    }

    /// Writes a bare frame: raw payload, no length prefix, no opcode
    /// rotation. Used by the handshake replies.
    pub fn append_bare(&mut self, payload: &[u8]) {
        self.buf.extend_from_slice(payload);
    }

    /// Takes all the bytes written so far.
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Installs the outbound opcode cipher. All frames appended afterwards
    /// have their opcodes rotated.
    ///
    /// # Panics
    ///
    /// Panics if a cipher is already installed.
    pub fn enable_cipher(&mut self, seed: &[u32; 4]) {
        assert!(self.cipher.is_none(), "cipher is already installed");
        self.cipher = Some(Isaac::new(seed));
    }
}

/// Accumulates raw socket bytes and yields whole frames, undoing the
/// inbound opcode rotation once a cipher is installed.
#[derive(Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    cipher: Option<Isaac>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        let r = &self.buf[..];

        let Some(&first) = r.first() else {
            return Ok(None);
        };

        let (frame_len, prefix_len) = if first & 0x80 != 0 {
            let Some(&second) = r.get(1) else {
                return Ok(None);
            };
            ((usize::from(first & 0x7f) << 8) | usize::from(second), 2)
        } else {
            (usize::from(first), 1)
        };

        if frame_len == 0 {
            return Err(FrameError::ZeroLength.into());
        }

        if r.len() < prefix_len + frame_len {
            // Not enough data arrived yet.
            return Ok(None);
        }

        self.buf.advance(prefix_len);
        let mut body = self.buf.split_to(frame_len);

        let raw_opcode = body[0];
        body.advance(1);

        let opcode = match &mut self.cipher {
            Some(cipher) => raw_opcode.wrapping_sub(cipher.next_u8()),
            None => raw_opcode,
        };

        Ok(Some(Frame { opcode, body }))
    }

    /// Installs the inbound opcode cipher.
    ///
    /// # Panics
    ///
    /// Panics if a cipher is already installed.
    pub fn enable_cipher(&mut self, seed: &[u32; 4]) {
        assert!(self.cipher.is_none(), "cipher is already installed");
        self.cipher = Some(Isaac::new(seed));
    }

    pub fn queue_bytes(&mut self, bytes: BytesMut) {
        self.buf.unsplit(bytes);
    }

    pub fn queue_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Takes the decoder's spare capacity for use as a read buffer, so the
    /// subsequent [`queue_bytes`](Self::queue_bytes) is an O(1) unsplit.
    pub fn take_capacity(&mut self) -> BytesMut {
        self.buf.split_off(self.buf.len())
    }

    pub fn reserve(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }
}

#[cfg(test)]
mod tests {
    use rand::{thread_rng, Rng};

    use super::*;

    fn round_trip(enc: &mut FrameEncoder, dec: &mut FrameDecoder, frame: &Frame) -> Frame {
        enc.append_frame(frame).unwrap();
        dec.queue_bytes(enc.take());
        dec.try_next_frame().unwrap().expect("whole frame queued")
    }

    #[test]
    fn frame_round_trip_unciphered() {
        let mut enc = FrameEncoder::new();
        let mut dec = FrameDecoder::new();
        let mut rng = thread_rng();

        for len in [0_usize, 1, 126, 127, 128, 1000, MAX_FRAME_SIZE - 1] {
            let body: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let frame = Frame::new(rng.gen(), &body);
            assert_eq!(round_trip(&mut enc, &mut dec, &frame), frame);
        }
    }

    #[test]
    fn two_byte_length_form() {
        let mut enc = FrameEncoder::new();
        enc.append_frame(&Frame::new(7, vec![0_u8; 127])).unwrap();
        let bytes = enc.take();

        // 128 = opcode + 127 payload bytes, so the two-byte form is used.
        assert_eq!(bytes[0], 0x80);
        assert_eq!(bytes[1], 128);
        assert_eq!(bytes[2], 7);
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut enc = FrameEncoder::new();
        assert!(enc.append_frame(&Frame::new(0, vec![0_u8; MAX_FRAME_SIZE])).is_err());
    }

    #[test]
    fn partial_frame_yields_none() {
        let mut dec = FrameDecoder::new();

        dec.queue_slice(&[5]);
        assert_eq!(dec.try_next_frame().unwrap(), None);

        dec.queue_slice(&[42, 1, 2]);
        assert_eq!(dec.try_next_frame().unwrap(), None);

        dec.queue_slice(&[3, 4]);
        let frame = dec.try_next_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, 42);
        assert_eq!(&frame.body[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn zero_length_frame_rejected() {
        let mut dec = FrameDecoder::new();
        dec.queue_slice(&[0]);
        assert!(dec.try_next_frame().is_err());
    }

    #[test]
    fn matched_ciphers_round_trip() {
        let seed = [0xdead_beef, 0x1234_5678, 0, 0xffff_0000];

        let mut enc = FrameEncoder::new();
        let mut dec = FrameDecoder::new();
        enc.enable_cipher(&seed);
        dec.enable_cipher(&seed);

        for opcode in 0..=u8::MAX {
            let frame = Frame::new(opcode, [opcode]);
            assert_eq!(round_trip(&mut enc, &mut dec, &frame), frame);
        }
    }

    #[test]
    fn mismatched_ciphers_garble_opcodes() {
        let mut enc = FrameEncoder::new();
        let mut dec = FrameDecoder::new();
        enc.enable_cipher(&[1, 2, 3, 4]);
        dec.enable_cipher(&[4, 3, 2, 1]);

        let garbled = (0..64)
            .filter(|&op| round_trip(&mut enc, &mut dec, &Frame::new(op, [])).opcode != op)
            .count();

        // A mis-seeded session cannot decode a meaningful opcode stream.
        assert!(garbled > 32);
    }
}
