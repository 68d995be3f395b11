//! Error handling for the LoRaMAC bridge.
//!
//! Most protocol violations (a stale sequence number, a frame outside the
//! local DAG, a malformed wire line) are not represented here: they are
//! silent, logged drops, never a returned `Err`. `LoraMacError` covers local
//! misuse of the API and failures of the transport underneath it.

use thiserror::Error;

/// Errors that can occur while driving the LoRaMAC bridge.
#[derive(Debug, Error)]
pub enum LoraMacError {
    /// A command was issued to the PHY driver while a previous response was
    /// still outstanding.
    #[error("PHY busy: a response is already outstanding")]
    PhyNotReady,

    /// The radio module did not respond to a command within the expected
    /// window.
    #[error("PHY command timed out")]
    PhyTimeout,

    /// A line read from the transport could not be decoded as a frame.
    #[error("malformed line: {0}")]
    MalformedLine(String),

    /// The command nibble of a decoded frame did not match any known
    /// [`crate::loramac::frame::Command`].
    #[error("unknown MAC command: {0}")]
    UnknownCommand(u8),

    /// A payload exceeded [`crate::loramac::frame::MAX_PAYLOAD_LEN`].
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// The underlying serial port failed.
    #[error("serial port error: {0}")]
    SerialPortError(String),
}

impl From<std::io::Error> for LoraMacError {
    fn from(err: std::io::Error) -> Self {
        LoraMacError::SerialPortError(err.to_string())
    }
}
