//! # Utility Modules
//!
//! This module provides common utility functions and types used throughout
//! the loramac-rs crate: streaming buffers, hex encoding/decoding, and
//! throttled logging patterns.

pub mod hex;
pub mod iobuffer;
pub mod logging;

// Re-export commonly used types and functions
pub use hex::{decode_hex, encode_hex, format_hex_compact, hex_to_bytes, pretty_hex};
pub use iobuffer::{IoBuffer, IoBufferError};
pub use logging::{log_frame_hex, LogThrottle, ThrottleManager};
