//! ASCII-hex wire codec for [`Frame`]s.
//!
//! The wire form is a single line of hex digits: 6 hex chars for the source
//! address, 6 for the destination, 2 for the flags+command byte, 2 for the
//! sequence number, then 2 hex chars per payload byte. `decode` works on a
//! bare hex line; stripping any leading radio-module response token (such as
//! `radio_rx `) is the PHY driver's job, not the codec's.

use crate::error::LoraMacError;
use crate::loramac::addr::Addr;
use crate::loramac::frame::Frame;

/// Header length in hex characters: 6 (src) + 6 (dst) + 2 (flags/cmd) + 2 (seqno).
const HEADER_CHAR_LEN: usize = 16;

fn hex_u8(s: &str) -> Result<u8, LoraMacError> {
    u8::from_str_radix(s, 16).map_err(|_| LoraMacError::MalformedLine(s.to_string()))
}

fn hex_u16(s: &str) -> Result<u16, LoraMacError> {
    u16::from_str_radix(s, 16).map_err(|_| LoraMacError::MalformedLine(s.to_string()))
}

fn decode_addr(prefix: &str, id: &str) -> Result<Addr, LoraMacError> {
    Ok(Addr::new(hex_u8(prefix)?, hex_u16(id)?))
}

/// Decode a bare ASCII-hex line into a [`Frame`].
pub fn decode(line: &str) -> Result<Frame, LoraMacError> {
    let line = line.trim();
    if line.len() < HEADER_CHAR_LEN {
        return Err(LoraMacError::MalformedLine(line.to_string()));
    }
    if line.len() % 2 != 0 {
        return Err(LoraMacError::MalformedLine(line.to_string()));
    }

    let src = decode_addr(&line[0..2], &line[2..6])?;
    let dst = decode_addr(&line[6..8], &line[8..12])?;
    let flags_command = hex_u8(&line[12..14])?;
    let seqno = hex_u8(&line[14..16])?;

    let payload_hex = &line[HEADER_CHAR_LEN..];
    let mut payload = Vec::with_capacity(payload_hex.len() / 2);
    let bytes = payload_hex.as_bytes();
    for chunk in bytes.chunks(2) {
        let byte_str = std::str::from_utf8(chunk).map_err(|_| LoraMacError::MalformedLine(line.to_string()))?;
        payload.push(hex_u8(byte_str)?);
    }

    Frame::from_parts(flags_command, seqno, src, dst, payload)
}

/// Encode a [`Frame`] into its ASCII-hex wire line (no trailing CR-LF; the
/// PHY driver appends line termination when it writes to the transport).
pub fn encode(frame: &Frame) -> String {
    let mut out = String::with_capacity(HEADER_CHAR_LEN + frame.payload.len() * 2);
    out.push_str(&format!("{:02X}{:04X}", frame.header.src.prefix, frame.header.src.id));
    out.push_str(&format!("{:02X}{:04X}", frame.header.dst.prefix, frame.header.dst.id));
    out.push_str(&format!("{:02X}", frame.flags_command_byte()));
    out.push_str(&format!("{:02X}", frame.header.seqno));
    for byte in &frame.payload {
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loramac::frame::{Command, FrameHeader};

    fn frame(payload: Vec<u8>) -> Frame {
        Frame::new(
            FrameHeader {
                confirmed: true,
                seqno: 7,
                has_next: false,
                command: Command::Data,
                src: Addr::new(3, 0x0102),
                dst: Addr::ROOT,
            },
            payload,
        )
        .unwrap()
    }

    #[test]
    fn round_trip_with_payload() {
        let f = frame(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let line = encode(&f);
        assert_eq!(decode(&line).unwrap(), f);
    }

    #[test]
    fn round_trip_empty_payload() {
        let f = frame(vec![]);
        let line = encode(&f);
        assert_eq!(line.len(), HEADER_CHAR_LEN);
        assert_eq!(decode(&line).unwrap(), f);
    }

    #[test]
    fn decode_rejects_short_line() {
        assert!(decode("0102").is_err());
    }

    #[test]
    fn decode_rejects_odd_length() {
        assert!(decode("030001020001FD8700123").is_err());
    }

    #[test]
    fn encode_matches_known_vector() {
        let f = frame(vec![]);
        assert_eq!(encode(&f), "0301020100008207");
    }
}
