use anyhow::{bail, ensure};
use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, BytesMut};

use crate::Frame;

/// A cursor over a frame payload. All multi-byte reads are big-endian;
/// underruns surface as errors rather than panics.
pub struct FrameReader<'a> {
    buf: &'a [u8],
}

impl<'a> FrameReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn read_u8(&mut self) -> anyhow::Result<u8> {
        Ok(self.buf.read_u8()?)
    }

    pub fn read_u16(&mut self) -> anyhow::Result<u16> {
        Ok(self.buf.read_u16::<BigEndian>()?)
    }

    pub fn read_u32(&mut self) -> anyhow::Result<u32> {
        Ok(self.buf.read_u32::<BigEndian>()?)
    }

    pub fn read_u64(&mut self) -> anyhow::Result<u64> {
        Ok(self.buf.read_u64::<BigEndian>()?)
    }

    pub fn read_bytes(&mut self, n: usize) -> anyhow::Result<&'a [u8]> {
        ensure!(
            self.buf.len() >= n,
            "frame underrun: wanted {n} bytes, {} available",
            self.buf.len()
        );
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Reads a NUL-terminated string, consuming the terminator.
    pub fn read_str(&mut self) -> anyhow::Result<String> {
        let Some(nul) = self.buf.iter().position(|&b| b == 0) else {
            bail!("unterminated string in frame");
        };
        let (head, tail) = self.buf.split_at(nul);
        self.buf = &tail[1..];
        Ok(String::from_utf8_lossy(head).into_owned())
    }
}

/// Builds a frame payload. Multi-byte writes are big-endian.
pub struct FrameBuilder {
    opcode: u8,
    body: BytesMut,
}

impl FrameBuilder {
    pub fn new(opcode: u8) -> Self {
        Self {
            opcode,
            body: BytesMut::new(),
        }
    }

    pub fn put_u8(mut self, v: u8) -> Self {
        self.body.put_u8(v);
        self
    }

    pub fn put_u16(mut self, v: u16) -> Self {
        self.body.put_u16(v);
        self
    }

    pub fn put_u32(mut self, v: u32) -> Self {
        self.body.put_u32(v);
        self
    }

    pub fn put_u64(mut self, v: u64) -> Self {
        self.body.put_u64(v);
        self
    }

    pub fn put_bytes(mut self, v: &[u8]) -> Self {
        self.body.extend_from_slice(v);
        self
    }

    /// Writes a string followed by a NUL terminator.
    pub fn put_str(mut self, v: &str) -> Self {
        self.body.extend_from_slice(v.as_bytes());
        self.body.put_u8(0);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn build(self) -> Frame {
        Frame {
            opcode: self.opcode,
            body: self.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_round_trip() {
        let frame = FrameBuilder::new(9)
            .put_u8(0xab)
            .put_u16(0xcdef)
            .put_u32(0x0102_0304)
            .put_u64(0x0a0b_0c0d_0e0f_1011)
            .put_str("alice")
            .build();

        let mut r = frame.reader();
        assert_eq!(r.read_u8().unwrap(), 0xab);
        assert_eq!(r.read_u16().unwrap(), 0xcdef);
        assert_eq!(r.read_u32().unwrap(), 0x0102_0304);
        assert_eq!(r.read_u64().unwrap(), 0x0a0b_0c0d_0e0f_1011);
        assert_eq!(r.read_str().unwrap(), "alice");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn underrun_is_an_error() {
        let frame = Frame::new(0, [1, 2]);
        let mut r = frame.reader();
        assert!(r.read_u32().is_err());
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let frame = Frame::new(0, b"bob".as_slice());
        let mut r = frame.reader();
        assert!(r.read_str().is_err());
    }
}
