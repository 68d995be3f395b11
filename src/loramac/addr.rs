//! LoRa addresses and their mapping onto the IPv6 address space used by the
//! mesh-routing side of the bridge.
//!
//! A LoRa address is a DAG prefix plus a 16-bit node id. The mapping onto
//! IPv6 follows a fixed template so that the whole DAG lives under one
//! `fd00::/8`-style prefix, with the LoRa prefix and node id carried in the
//! low bytes of the address.

/// `FD 00 00 00 00 00 00 <prefix> 02 12 4B 00 06 0D <id_hi> <id_lo>`
const IPV6_TEMPLATE: [u8; 16] = [
    0xFD, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x12, 0x4B, 0x00, 0x06, 0x0D, 0x00, 0x00,
];

/// The prefix byte's offset inside [`IPV6_TEMPLATE`].
const PREFIX_OFFSET: usize = 7;
/// The node id's offset inside [`IPV6_TEMPLATE`] (big-endian, 2 bytes).
const ID_OFFSET: usize = 14;

/// A LoRa address: a one-byte DAG prefix and a 16-bit node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Addr {
    pub prefix: u8,
    pub id: u16,
}

impl Addr {
    /// The address of the LoRa root, always `{1, 0}`.
    pub const ROOT: Addr = Addr { prefix: 1, id: 0 };

    /// The null address, `{0, 0}`, used as a placeholder before a node joins.
    pub const NULL: Addr = Addr { prefix: 0, id: 0 };

    pub const fn new(prefix: u8, id: u16) -> Self {
        Addr { prefix, id }
    }

    /// Map this address onto its corresponding IPv6 address.
    pub fn to_ipv6(self) -> [u8; 16] {
        let mut addr = IPV6_TEMPLATE;
        addr[PREFIX_OFFSET] = self.prefix;
        addr[ID_OFFSET] = (self.id >> 8) as u8;
        addr[ID_OFFSET + 1] = self.id as u8;
        addr
    }

    /// Recover a LoRa address from an IPv6 address built with [`Addr::to_ipv6`].
    ///
    /// Only the prefix and id bytes are read back; the rest of the template
    /// is not validated, mirroring `ipv62lora`'s behaviour of reading fixed
    /// byte offsets without checking the surrounding bytes.
    pub fn from_ipv6(ip: &[u8; 16]) -> Self {
        Addr {
            prefix: ip[PREFIX_OFFSET],
            id: u16::from_be_bytes([ip[ID_OFFSET], ip[ID_OFFSET + 1]]),
        }
    }

    /// Whether `addr` shares this node's DAG, i.e. has the same prefix.
    pub fn shares_dag_with(self, node_addr: Addr) -> bool {
        self.prefix == node_addr.prefix
    }
}

impl std::fmt::Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.prefix, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_and_null_constants() {
        assert_eq!(Addr::ROOT, Addr::new(1, 0));
        assert_eq!(Addr::NULL, Addr::new(0, 0));
    }

    #[test]
    fn ipv6_round_trip() {
        let addr = Addr::new(3, 0x1234);
        let ip = addr.to_ipv6();
        assert_eq!(Addr::from_ipv6(&ip), addr);
    }

    #[test]
    fn ipv6_template_bytes() {
        let addr = Addr::new(7, 0xBEEF);
        let ip = addr.to_ipv6();
        assert_eq!(
            ip,
            [0xFD, 0, 0, 0, 0, 0, 0, 7, 0x02, 0x12, 0x4B, 0x00, 0x06, 0x0D, 0xBE, 0xEF]
        );
    }

    #[test]
    fn dag_membership_is_prefix_only() {
        let node = Addr::new(5, 42);
        assert!(Addr::new(5, 999).shares_dag_with(node));
        assert!(!Addr::new(6, 42).shares_dag_with(node));
    }
}
