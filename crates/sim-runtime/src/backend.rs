//! Backend interface: the core's only view of the link layer. A real
//! deployment would realize these as kernel network namespaces running FRR;
//! this crate carries only the interface and a no-op stub, since the
//! emulation backend itself is an external collaborator.

use crate::error::{Result, RuntimeError};
use std::sync::Mutex;
use topology::Ipv4Iface;

pub trait Backend: Send + Sync {
    fn configure_link(&self, a: &str, b: &str, up: bool) -> Result<()>;
    fn add_link(&self, a: &str, b: &str, ip_a: Ipv4Iface, ip_b: Ipv4Iface) -> Result<()>;
    fn remove_link(&self, a: &str, b: &str) -> Result<()>;
    fn set_static_route(&self, on_node: &str, dest_cidr: &str, via_ip: Ipv4Iface) -> Result<()>;
    fn clear_static_route(&self, on_node: &str, dest_cidr: &str, via_ip: Ipv4Iface) -> Result<()>;
    fn set_default_route(&self, on_node: &str, via_ip: Ipv4Iface) -> Result<()>;
    fn link_state(&self, a: &str, b: &str) -> Result<(bool, bool)>;
}

/// Records every call it receives (useful for assertions in tests and for
/// the literal scenario 4 backend-call sequence) and otherwise no-ops.
#[derive(Default)]
pub struct StubBackend {
    calls: Mutex<Vec<String>>,
    link_states: Mutex<std::collections::HashMap<(String, String), (bool, bool)>>,
}

impl StubBackend {
    pub fn new() -> Self {
        StubBackend::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Backend for StubBackend {
    fn configure_link(&self, a: &str, b: &str, up: bool) -> Result<()> {
        self.record(format!("ConfigureLink({a},{b},{up})"));
        self.link_states
            .lock()
            .unwrap()
            .insert((a.to_string(), b.to_string()), (up, up));
        Ok(())
    }

    fn add_link(&self, a: &str, b: &str, ip_a: Ipv4Iface, ip_b: Ipv4Iface) -> Result<()> {
        self.record(format!(
            "AddLink({a},{b},{},{})",
            ip_a.to_cidr(),
            ip_b.to_cidr()
        ));
        Ok(())
    }

    fn remove_link(&self, a: &str, b: &str) -> Result<()> {
        self.record(format!("RemoveLink({a},{b})"));
        Ok(())
    }

    fn set_static_route(&self, on_node: &str, dest_cidr: &str, via_ip: Ipv4Iface) -> Result<()> {
        self.record(format!(
            "SetStaticRoute({on_node},{dest_cidr},{})",
            via_ip.to_cidr()
        ));
        Ok(())
    }

    fn clear_static_route(&self, on_node: &str, dest_cidr: &str, via_ip: Ipv4Iface) -> Result<()> {
        self.record(format!(
            "ClearStaticRoute({on_node},{dest_cidr},{})",
            via_ip.to_cidr()
        ));
        Ok(())
    }

    fn set_default_route(&self, on_node: &str, via_ip: Ipv4Iface) -> Result<()> {
        self.record(format!("SetDefaultRoute({on_node},{})", via_ip.to_cidr()));
        Ok(())
    }

    fn link_state(&self, a: &str, b: &str) -> Result<(bool, bool)> {
        self.link_states
            .lock()
            .unwrap()
            .get(&(a.to_string(), b.to_string()))
            .copied()
            .ok_or_else(|| RuntimeError::NotFound(format!("link state {a}-{b}")))
    }
}
