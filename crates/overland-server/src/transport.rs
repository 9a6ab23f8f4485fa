//! UDP transport through renet_netcode.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use renet::RenetServer;
use renet_netcode::{NetcodeServerTransport, ServerAuthentication, ServerConfig};
use tracing::{error, info};

/// Netcode protocol id shared with clients.
pub const PROTOCOL_ID: u64 = 0x0E57_1A4D_0001;

pub struct TransportConfig {
    pub public_address: SocketAddr,
    pub max_clients: usize,
    /// Secure authentication key; unsecure connections are accepted when absent.
    pub private_key: Option<[u8; 32]>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind socket to {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    #[error("failed to determine bound address for {0}: {1}")]
    LocalAddrFailed(SocketAddr, std::io::Error),

    #[error("failed to configure socket: {0}")]
    SocketConfig(std::io::Error),

    #[error("system clock is before the unix epoch")]
    Clock,

    #[error("failed to create transport: {0}")]
    TransportCreation(String),
}

fn now() -> Result<Duration, TransportError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| TransportError::Clock)
}

pub fn create_server_transport(
    config: TransportConfig,
) -> Result<NetcodeServerTransport, TransportError> {
    let socket = UdpSocket::bind(config.public_address)
        .map_err(|e| TransportError::BindFailed(config.public_address, e))?;
    let bound = socket
        .local_addr()
        .map_err(|e| TransportError::LocalAddrFailed(config.public_address, e))?;
    socket
        .set_nonblocking(true)
        .map_err(TransportError::SocketConfig)?;

    let authentication = match config.private_key {
        Some(private_key) => ServerAuthentication::Secure { private_key },
        None => ServerAuthentication::Unsecure,
    };
    let server_config = ServerConfig {
        current_time: now()?,
        max_clients: config.max_clients,
        protocol_id: PROTOCOL_ID,
        public_addresses: vec![bound],
        authentication,
    };
    let transport = NetcodeServerTransport::new(server_config, socket)
        .map_err(|e| TransportError::TransportCreation(e.to_string()))?;

    info!(
        address = %bound,
        max_clients = config.max_clients,
        "transport bound"
    );
    Ok(transport)
}

/// Pumps packets between the socket and a [`RenetServer`].
pub struct ServerRunner {
    transport: NetcodeServerTransport,
}

impl ServerRunner {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        Ok(Self {
            transport: create_server_transport(config)?,
        })
    }

    pub fn receive(&mut self, renet: &mut RenetServer, delta: Duration) {
        renet.update(delta);
        match now() {
            Ok(time) => {
                if let Err(e) = self.transport.update(time, renet) {
                    error!(error = %e, "transport update failed");
                }
            }
            Err(e) => error!(error = %e, "transport update skipped"),
        }
    }

    pub fn send(&mut self, renet: &mut RenetServer) {
        self.transport.send_packets(renet);
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.addresses().first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_an_ephemeral_port() {
        let config = TransportConfig {
            public_address: "127.0.0.1:0".parse().unwrap(),
            max_clients: 4,
            private_key: None,
        };
        match create_server_transport(config) {
            Ok(_) => {}
            Err(TransportError::BindFailed(_, err))
                if err.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                // Some sandboxes disallow binding sockets.
            }
            Err(err) => panic!("transport error: {err:?}"),
        }
    }
}
