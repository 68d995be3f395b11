//! The LoRaMAC bridge engine: addressing, the frame codec, the PHY
//! command/response pipeline, the MAC state machine, and the bridge to the
//! IPv6 routing stack.

pub mod addr;
pub mod bridge;
pub mod frame;
pub mod framer;
pub mod mac;
pub mod phy;
pub mod phy_mock;

pub use addr::Addr;
pub use bridge::{bridge_input, output, Ipv6Packet, RoutingStack};
pub use frame::{Command, Frame, FrameHeader, MAX_PAYLOAD_LEN};
pub use mac::{LoraMacConfig, MacEngine, MacHandle, MacState};
pub use phy::{LineTransport, PhyCommand, PhyDriver, PhyEvent, PhyStats, RadioConfig, RadioParam, ResponseToken};
