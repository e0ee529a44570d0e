//! Address plan: server on a wired /24, clients behind the access point

use flow_sim::{FlowKey, Port, Protocol};
use std::net::Ipv4Addr;

/// Default server ports
pub const TCP_PORT: Port = 9;
pub const UDP_PORT: Port = 10;

/// First port handed to client sockets
pub const EPHEMERAL_PORT_BASE: Port = 49153;

/// Wired network 10.1.1.0/24: server .1, access point .2
pub const SERVER_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 1);
pub const AP_WIRED_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 2);

/// Wireless network 192.168.0.0/24, clients get .1 upwards, then the AP
#[derive(Debug, Clone)]
pub struct Topology {
    pub clients: Vec<Ipv4Addr>,
    pub ap_wireless: Ipv4Addr,
}

impl Topology {
    pub fn new(n_clients: usize) -> Self {
        let clients = (0..n_clients)
            .map(|i| Ipv4Addr::new(192, 168, 0, (i + 1) as u8))
            .collect();

        Self {
            clients,
            ap_wireless: Ipv4Addr::new(192, 168, 0, (n_clients + 1) as u8),
        }
    }

    /// Uplink flow of client `index` towards `server_port` on the server
    pub fn client_flow(&self, index: usize, protocol: Protocol, server_port: Port) -> FlowKey {
        FlowKey::new(
            protocol,
            (self.clients[index], EPHEMERAL_PORT_BASE + index as Port),
            (SERVER_ADDRESS, server_port),
        )
    }
}
