//! LoRaMAC protocol constants.
//!
//! Timer and retry defaults mirror the values hard-coded in the original
//! embedded implementation; they are exposed here as `const`s and folded
//! into [`crate::loramac::mac::LoraMacConfig`]'s `Default`.

use std::time::Duration;

/// Maximum number of retransmit attempts before a DATA/QUERY send gives up
/// and falls back to `Ready`, or a JOIN falls back to the sleep-and-rejoin path.
pub const MAX_RETRANSMIT: u32 = 3;

/// How long to wait for an ACK/JOIN_RESPONSE before retransmitting.
pub const RETRANSMIT_TIMEOUT: Duration = Duration::from_secs(12);

/// How long to wait without traffic before sending a keep-alive QUERY.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Base radio-sleep duration issued after a JOIN exhausts its retransmits.
pub const JOIN_SLEEP_TIME: Duration = Duration::from_secs(60);

/// Upper bound used when jittering the JOIN retry timer.
pub const MAX_JOIN_SLEEP_TIME: Duration = Duration::from_secs(180);

/// Default radio parameters, as programmed into the module at startup.
pub const DEFAULT_RADIO_BW: &str = "125";
pub const DEFAULT_RADIO_CR: &str = "4/5";
pub const DEFAULT_RADIO_FREQ: &str = "868100000";
pub const DEFAULT_RADIO_MODE: &str = "lora";
pub const DEFAULT_RADIO_PWR: &str = "1";
pub const DEFAULT_RADIO_SF: &str = "sf10";

/// Whether a locally-originated DATA frame requests an ACK by default.
pub const DEFAULT_CONFIRMED: bool = true;
