//! The LoRaMAC frame: header fields plus payload, independent of how the
//! frame is carried on the wire (see [`crate::loramac::framer`]) or how it
//! travels between the MAC engine and the PHY driver.
//!
//! There is no process-wide frame buffer here. Each frame is an owned value
//! that moves from whoever built it to whoever consumes it, so a test can
//! construct a `Frame` directly without reaching into shared state.

use crate::error::LoraMacError;
use crate::loramac::addr::Addr;

/// Maximum payload size in bytes, leaving room for the 8-byte header within
/// the radio module's frame budget.
pub const MAX_PAYLOAD_LEN: usize = 247;

/// The five MAC commands, carried in the low nibble of the flags+command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Join,
    JoinResponse,
    Data,
    Ack,
    Query,
}

impl Command {
    fn from_nibble(n: u8) -> Result<Self, LoraMacError> {
        match n {
            0 => Ok(Command::Join),
            1 => Ok(Command::JoinResponse),
            2 => Ok(Command::Data),
            3 => Ok(Command::Ack),
            4 => Ok(Command::Query),
            other => Err(LoraMacError::UnknownCommand(other)),
        }
    }

    fn to_nibble(self) -> u8 {
        match self {
            Command::Join => 0,
            Command::JoinResponse => 1,
            Command::Data => 2,
            Command::Ack => 3,
            Command::Query => 4,
        }
    }
}

/// The fixed-size part of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// True if the frame requires an ACK in return.
    pub confirmed: bool,
    pub seqno: u8,
    /// True if another frame follows this one (downward traffic only).
    pub has_next: bool,
    pub command: Command,
    pub src: Addr,
    pub dst: Addr,
}

impl FrameHeader {
    fn flags_command_byte(&self) -> u8 {
        let mut byte = self.command.to_nibble();
        if self.confirmed {
            byte |= 0x80;
        }
        if self.has_next {
            byte |= 0x40;
        }
        byte
    }

    fn from_flags_command_byte(byte: u8, seqno: u8, src: Addr, dst: Addr) -> Result<Self, LoraMacError> {
        let confirmed = (byte & 0x80) != 0;
        let has_next = (byte & 0x40) != 0;
        let command = Command::from_nibble(byte & 0x0F)?;
        Ok(FrameHeader {
            confirmed,
            seqno,
            has_next,
            command,
            src,
            dst,
        })
    }
}

/// A complete LoRaMAC frame: header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame, rejecting payloads that would not fit in the radio's
    /// payload budget.
    pub fn new(header: FrameHeader, payload: Vec<u8>) -> Result<Self, LoraMacError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(LoraMacError::PayloadTooLarge(payload.len()));
        }
        Ok(Frame { header, payload })
    }

    pub(crate) fn flags_command_byte(&self) -> u8 {
        self.header.flags_command_byte()
    }

    pub(crate) fn from_parts(
        flags_command: u8,
        seqno: u8,
        src: Addr,
        dst: Addr,
        payload: Vec<u8>,
    ) -> Result<Self, LoraMacError> {
        let header = FrameHeader::from_flags_command_byte(flags_command, seqno, src, dst)?;
        Frame::new(header, payload)
    }
}
