use bytes::{Bytes, BytesMut};

use super::messages::parse_header;

/// Reassembles packets out of an arbitrarily chunked byte stream.
///
/// Reads off a socket can split a packet or carry several at once; observers
/// need whole packets, so every chunk goes through here first.
#[derive(Debug, Default)]
pub struct PacketFramer {
    buffer: BytesMut,
}

impl PacketFramer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Next complete packet (header included), if one is buffered.
    pub fn next_packet(&mut self) -> Option<Bytes> {
        let header = parse_header(&self.buffer)?;
        if self.buffer.len() < header.packet_len() {
            return None;
        }
        Some(self.buffer.split_to(header.packet_len()).freeze())
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::packet;

    #[test]
    fn test_split_across_chunks() {
        let query = packet(0, b"\x03SELECT 1");
        let mut framer = PacketFramer::new();

        framer.push(&query[..2]);
        assert!(framer.next_packet().is_none());
        framer.push(&query[2..7]);
        assert!(framer.next_packet().is_none());
        framer.push(&query[7..]);

        assert_eq!(framer.next_packet().unwrap().as_ref(), query.as_slice());
        assert!(framer.next_packet().is_none());
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_several_packets_in_one_chunk() {
        let first = packet(1, b"\x00\x00\x00\x02\x00\x00\x00");
        let second = packet(2, b"\xff\x15\x04#28000denied");
        let third = packet(3, b"\x01");

        let mut chunk = first.clone();
        chunk.extend_from_slice(&second);
        chunk.extend_from_slice(&third[..3]);

        let mut framer = PacketFramer::new();
        framer.push(&chunk);
        assert_eq!(framer.next_packet().unwrap().as_ref(), first.as_slice());
        assert_eq!(framer.next_packet().unwrap().as_ref(), second.as_slice());
        assert!(framer.next_packet().is_none());
        assert_eq!(framer.buffered(), 3);

        framer.push(&third[3..]);
        assert_eq!(framer.next_packet().unwrap().as_ref(), third.as_slice());
    }

    #[test]
    fn test_empty_payload_packet() {
        let mut framer = PacketFramer::new();
        framer.push(&[0, 0, 0, 5]);
        assert_eq!(framer.next_packet().unwrap().as_ref(), &[0, 0, 0, 5]);
    }
}
