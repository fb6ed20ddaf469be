//! Routing-config renderer: emits per-satellite OSPF, vtysh, and daemons
//! config blobs. These are opaque to the core; only their exact text
//! matters to the external backend that consumes them verbatim.

use crate::graph::{Node, TorusGraph};

const VTYSH_CONFIG: &str = "service integrated-vtysh-config\n";

const DAEMONS_CONFIG: &str = "zebra=yes\nospfd=yes\nospf6d=no\nripd=no\nripngd=no\nisisd=no\npimd=no\nldpd=no\nnhrpd=no\neigrpd=no\nbabeld=no\nsharpd=no\npbrd=no\nbfdd=no\nfabricd=no\n\nvtysh_enable=yes\nzebra_options=\"  -A 127.0.0.1 -s 90000000\"\nospfd_options=\"  -A 127.0.0.1\"\n";

impl TorusGraph {
    /// Renders each satellite's OSPF config, vtysh snippet, and daemons
    /// manifest. Must run after `allocate_addresses` — the renderer reads
    /// loopback and per-edge interface addresses.
    pub fn render_configs(&mut self) {
        let names = self.satellite_names();
        for name in names {
            let ospf = self.render_ospf(&name);
            let vtysh = render_vtysh(&name);
            if let Some(Node::Satellite(s)) = self.node_mut(&name) {
                s.ospf_config = ospf;
                s.vtysh_config = vtysh;
                s.daemons_config = DAEMONS_CONFIG.to_string();
            }
        }
    }

    fn render_ospf(&self, name: &str) -> String {
        let loopback = match self.node(name).and_then(|n| n.loopback()) {
            Some(l) => l,
            None => return String::new(),
        };
        let router_id = loopback.to_dotted();

        let mut stanzas = vec![format!("network {}/32 area 0.0.0.0", router_id)];
        for neighbor in self.neighbors(name) {
            if let Some(edge) = self.edge(name, &neighbor) {
                if edge.pseudo {
                    continue;
                }
                if let Some((network, prefix)) = edge.subnet {
                    let iface = crate::ip::Ipv4Iface::new(network, prefix);
                    stanzas.push(format!("network {} area 0.0.0.0", iface.to_cidr()));
                }
            }
        }

        let mut out = String::new();
        out.push_str(&format!("hostname {}\n", name));
        out.push_str("!\n");
        out.push_str("router ospf\n");
        out.push_str(&format!(" router-id {}\n", router_id));
        out.push_str(" redistribute static\n");
        for stanza in stanzas {
            out.push_str(&format!(" {}\n", stanza));
        }
        out.push_str("!\n");
        out
    }
}

fn render_vtysh(name: &str) -> String {
    format!("{}hostname {}\n", VTYSH_CONFIG, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbital_mechanics::CatalogNumbers;

    #[test]
    fn renders_hostname_router_id_and_one_stanza_per_interface() {
        let catalog = CatalogNumbers::default();
        let mut g = TorusGraph::build(4, 4, false, &catalog).unwrap();
        g.allocate_addresses();
        g.render_configs();

        if let Node::Satellite(s) = g.node("R0_0").unwrap() {
            assert!(s.ospf_config.contains("hostname R0_0"));
            assert!(s.ospf_config.contains("router-id 10.1.0.1"));
            assert!(s.ospf_config.contains("redistribute static"));
            assert!(s.ospf_config.contains("network 10.1.0.1/32 area 0.0.0.0"));
            // degree 4 -> loopback stanza + 4 edge stanzas
            assert_eq!(s.ospf_config.matches("network").count(), 5);
            assert!(s.vtysh_config.contains("hostname R0_0"));
            assert!(s.daemons_config.contains("ospfd=yes"));
        } else {
            panic!("expected satellite node");
        }
    }
}
