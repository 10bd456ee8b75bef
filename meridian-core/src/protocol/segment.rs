use crate::protocol::error::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io;

/// Wire command codes. Values match the original ARQ protocol byte-for-byte so traffic
/// captured from one implementation can be decoded by the other.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Command {
    Push = 81,
    Ack = 82,
    AskWindow = 83,
    TellWindow = 84,
}

impl Command {
    fn from_u8(value: u8) -> Option<Command> {
        match value {
            81 => Some(Command::Push),
            82 => Some(Command::Ack),
            83 => Some(Command::AskWindow),
            84 => Some(Command::TellWindow),
            _ => None,
        }
    }
}

/// Fixed wire header size: conv(4) + cmd(1) + frag(1) + wnd(2) + ts(4) + sn(4) + una(4) +
/// len(4) = 24 bytes.
pub const OVERHEAD: usize = 24;

/// A single ARQ segment, either in flight or freshly reassembled from the wire.
///
/// `resend_ts`, `rto`, `fast_ack` and `transmit_count` are only meaningful for segments
/// sitting in the send buffer awaiting acknowledgement; they are left at their default
/// values for segments just decoded off the wire.
#[derive(Debug, Clone)]
pub struct Segment {
    pub conv: u32,
    pub cmd: Command,
    pub frag: u8,
    pub window: u16,
    pub timestamp: u32,
    pub sn: u32,
    pub una: u32,
    pub data: Vec<u8>,

    pub resend_ts: u32,
    pub rto: u32,
    pub fast_ack: u32,
    pub transmit_count: u32,
}

impl Segment {
    pub fn new(conv: u32, cmd: Command, data: Vec<u8>) -> Segment {
        Segment {
            conv,
            cmd,
            frag: 0,
            window: 0,
            timestamp: 0,
            sn: 0,
            una: 0,
            data,
            resend_ts: 0,
            rto: 0,
            fast_ack: 0,
            transmit_count: 0,
        }
    }

    pub fn encoded_len(&self) -> usize {
        OVERHEAD + self.data.len()
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.write_u32::<BigEndian>(self.conv)?;
        out.write_u8(self.cmd as u8)?;
        out.write_u8(self.frag)?;
        out.write_u16::<BigEndian>(self.window)?;
        out.write_u32::<BigEndian>(self.timestamp)?;
        out.write_u32::<BigEndian>(self.sn)?;
        out.write_u32::<BigEndian>(self.una)?;
        out.write_u32::<BigEndian>(self.data.len() as u32)?;
        out.extend_from_slice(&self.data);
        Ok(())
    }

    /// Decode one segment from the front of `buf`, returning the segment and the number of
    /// bytes consumed. Returns `Ok(None)` if `buf` doesn't hold a complete segment yet.
    pub fn decode(buf: &[u8]) -> Result<Option<(Segment, usize)>> {
        if buf.len() < OVERHEAD {
            return Ok(None);
        }

        let mut cursor = buf;
        let conv = cursor.read_u32::<BigEndian>()?;
        let cmd_byte = cursor.read_u8()?;
        let frag = cursor.read_u8()?;
        let window = cursor.read_u16::<BigEndian>()?;
        let timestamp = cursor.read_u32::<BigEndian>()?;
        let sn = cursor.read_u32::<BigEndian>()?;
        let una = cursor.read_u32::<BigEndian>()?;
        let len = cursor.read_u32::<BigEndian>()? as usize;

        let cmd = match Command::from_u8(cmd_byte) {
            Some(cmd) => cmd,
            None => return Err(Error::BadCommand),
        };

        if cursor.len() < len {
            return Ok(None);
        }

        let data = cursor[..len].to_vec();

        Ok(Some((
            Segment {
                conv,
                cmd,
                frag,
                window,
                timestamp,
                sn,
                una,
                data,
                resend_ts: 0,
                rto: 0,
                fast_ack: 0,
                transmit_count: 0,
            },
            OVERHEAD + len,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut seg = Segment::new(42, Command::Push, vec![1, 2, 3, 4]);
        seg.frag = 1;
        seg.window = 32;
        seg.timestamp = 1000;
        seg.sn = 7;
        seg.una = 3;

        let mut buf = Vec::new();
        seg.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), OVERHEAD + 4);

        let (decoded, consumed) = Segment::decode(&buf).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded.conv, 42);
        assert_eq!(decoded.cmd, Command::Push);
        assert_eq!(decoded.frag, 1);
        assert_eq!(decoded.sn, 7);
        assert_eq!(decoded.data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_decode_incomplete() {
        let mut seg = Segment::new(1, Command::Ack, vec![9; 10]);
        seg.sn = 1;

        let mut buf = Vec::new();
        seg.encode(&mut buf).unwrap();

        assert!(Segment::decode(&buf[..OVERHEAD + 4]).unwrap().is_none());
        assert!(Segment::decode(&buf[..OVERHEAD - 1]).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_unknown_command() {
        let mut seg = Segment::new(1, Command::Ack, Vec::new());
        seg.sn = 1;

        let mut buf = Vec::new();
        seg.encode(&mut buf).unwrap();
        buf[4] = 200;

        assert_eq!(Segment::decode(&buf), Err(Error::BadCommand));
    }
}
