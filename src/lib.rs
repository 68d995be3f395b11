//! # loramac-rs - a LoRa MAC bridge between an IPv6 mesh-routing root and a
//! remote LoRa root
//!
//! `loramac-rs` implements the protocol engine that bridges a standard IPv6
//! mesh-routing stack to a narrowband LoRa link: it fragment-encapsulates
//! IPv6 packets into a LoRaMAC frame format and drives an attached LoRa
//! transceiver module through an ASCII command line.
//!
//! ## Features
//!
//! - Addressing and IPv6 template mapping (`loramac::addr`)
//! - The LoRaMAC frame codec, binary ↔ ASCII-hex (`loramac::frame`,
//!   `loramac::framer`)
//! - A half-duplex PHY command/response pipeline to the radio module
//!   (`loramac::phy`)
//! - The JOIN/DATA/ACK/QUERY MAC state machine (`loramac::mac`)
//! - The bridge to an IPv6 routing stack (`loramac::bridge`)
//!
//! ## Usage
//!
//! ```no_run
//! use loramac_rs::loramac::{LoraMacConfig, MacEngine, PhyDriver, RadioConfig, RoutingStack, Ipv6Packet};
//!
//! struct NullRouting;
//! impl RoutingStack for NullRouting {
//!     fn on_joined(&mut self, _prefix: u8) {}
//!     fn deliver(&mut self, _packet: Ipv6Packet) {}
//! }
//!
//! # async fn run(port: tokio_serial::SerialStream) {
//! let phy = PhyDriver::new(port);
//! let (engine, _handle) = MacEngine::init_root(
//!     42,
//!     phy,
//!     NullRouting,
//!     LoraMacConfig::default(),
//!     RadioConfig::default(),
//! );
//! engine.run().await;
//! # }
//! ```

pub mod constants;
pub mod error;
pub mod loramac;
pub mod logging;
pub mod util;

pub use crate::error::LoraMacError;
pub use crate::logging::init_logger;
pub use crate::loramac::{
    bridge_input, output, Addr, Command, Frame, FrameHeader, Ipv6Packet, LineTransport, LoraMacConfig, MacEngine,
    MacHandle, MacState, PhyDriver, PhyEvent, RadioConfig, RoutingStack,
};
