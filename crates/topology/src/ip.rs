//! Minimal IPv4 helpers. The allocator works entirely in host-order u32
//! arithmetic (mirroring `0x0A010000 + count` in the original annotator),
//! so a single-purpose formatter is cheaper than pulling in a full CIDR crate.

/// An IPv4 address plus a CIDR prefix length (`/31`, `/30`, `/32`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Ipv4Iface {
    pub addr: u32,
    pub prefix_len: u8,
}

impl Ipv4Iface {
    pub fn new(addr: u32, prefix_len: u8) -> Self {
        Ipv4Iface { addr, prefix_len }
    }

    pub fn to_dotted(self) -> String {
        format!(
            "{}.{}.{}.{}",
            (self.addr >> 24) & 0xFF,
            (self.addr >> 16) & 0xFF,
            (self.addr >> 8) & 0xFF,
            self.addr & 0xFF
        )
    }

    pub fn to_cidr(self) -> String {
        format!("{}/{}", self.to_dotted(), self.prefix_len)
    }
}

/// The two usable host addresses of a /30 network whose base address is
/// `network` (the network address itself, host bits zero).
pub fn host_pair_of_30(network: u32) -> (u32, u32) {
    (network + 1, network + 2)
}
