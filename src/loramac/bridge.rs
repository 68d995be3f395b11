//! The boundary between the LoRaMAC engine and the upper IPv6 routing
//! stack. `RoutingStack` is the out-of-scope collaborator's interface;
//! `bridge_input`/`output` translate between [`Frame`] and [`Ipv6Packet`].

use crate::error::LoraMacError;
use crate::loramac::addr::Addr;
use crate::loramac::frame::{Command, Frame, FrameHeader};
use crate::loramac::mac::{LoraMacConfig, MacEngine};
use crate::loramac::phy::LineTransport;

/// A reconstructed IPv6 packet: the first 8 bytes of a standard IPv6
/// header, the two 16-byte addresses synthesised from the LoRa sender and
/// receiver, and the remaining payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Packet {
    pub header: [u8; 8],
    pub src: [u8; 16],
    pub dst: [u8; 16],
    pub payload: Vec<u8>,
}

/// The IPv6 mesh-routing stack's interface, implemented by the
/// out-of-scope collaborator.
pub trait RoutingStack {
    /// Called once the node has adopted a prefix from a JOIN_RESPONSE.
    fn on_joined(&mut self, prefix: u8);
    /// Called with a reconstructed packet destined for the routing stack.
    fn deliver(&mut self, packet: Ipv6Packet);
}

/// Reconstruct an IPv6 packet from a decoded LoRaMAC frame.
pub fn bridge_input(frame: &Frame) -> Ipv6Packet {
    let mut header = [0u8; 8];
    let header_len = frame.payload.len().min(8);
    header[..header_len].copy_from_slice(&frame.payload[..header_len]);

    let payload = if frame.payload.len() > 8 {
        frame.payload[8..].to_vec()
    } else {
        Vec::new()
    };

    Ipv6Packet {
        header,
        src: frame.header.src.to_ipv6(),
        dst: frame.header.dst.to_ipv6(),
        payload,
    }
}

/// The routing stack's fallback-interface entry point: accept an IPv6
/// packet bound for the LoRa root and hand it to the MAC engine.
pub async fn output<T, R>(
    engine: &mut MacEngine<T, R>,
    config: &LoraMacConfig,
    packet: &Ipv6Packet,
) -> Result<(), LoraMacError>
where
    T: LineTransport + 'static,
    R: RoutingStack,
{
    let mut payload = Vec::with_capacity(8 + packet.payload.len());
    payload.extend_from_slice(&packet.header);
    payload.extend_from_slice(&packet.payload);

    let header = FrameHeader {
        confirmed: config.confirmed_default,
        seqno: 0,
        has_next: false,
        command: Command::Data,
        // Overwritten by `engine.send()` with the node's current address;
        // filled in here only because `Frame::new` needs a value.
        src: Addr::from_ipv6(&packet.src),
        dst: Addr::ROOT,
    };

    let frame = Frame::new(header, payload)?;
    engine.send(frame).await
}
