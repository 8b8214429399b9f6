//! TCP transport
//!
//! Connects to network-attached controllers (ESP32 bridges, FluidNC,
//! serial-to-telnet adapters).

use super::{Link, Transport};
use async_trait::async_trait;
use gcodelink_core::{Result, TransportError};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Port used when an address does not name one (telnet).
pub const DEFAULT_TCP_PORT: u16 = 23;

/// TCP transport
#[derive(Debug, Clone, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }

    /// Append the default port to addresses that have none
    ///
    /// IPv6 hosts take a port only in brackets (`[::1]:2323`); a bare
    /// IPv6 address is bracketed before the port is added.
    pub fn normalize_address(address: &str) -> Result<String> {
        let address = address.trim();
        let invalid = || TransportError::InvalidAddress {
            address: address.to_string(),
        };
        if address.is_empty() {
            return Err(invalid().into());
        }
        if let Some(rest) = address.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            if host.is_empty() {
                return Err(invalid().into());
            }
            return match tail {
                "" => Ok(format!("[{}]:{}", host, DEFAULT_TCP_PORT)),
                _ => match tail.strip_prefix(':').map(str::parse::<u16>) {
                    Some(Ok(_)) => Ok(address.to_string()),
                    _ => Err(invalid().into()),
                },
            };
        }
        if address.matches(':').count() > 1 {
            return Ok(format!("[{}]:{}", address, DEFAULT_TCP_PORT));
        }
        let has_port = address
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if has_port {
            Ok(address.to_string())
        } else {
            Ok(format!("{}:{}", address, DEFAULT_TCP_PORT))
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self, address: &str) -> Result<Link> {
        let target = Self::normalize_address(address)?;
        debug!("Opening TCP connection to {}", target);

        let stream = TcpStream::connect(&target).await.map_err(|e| {
            TransportError::FailedToOpen {
                address: target.clone(),
                reason: e.to_string(),
            }
        })?;
        stream.set_nodelay(true)?;

        info!("TCP connection established to {}", target);
        let (read_half, write_half) = stream.into_split();
        Ok(Link::new(read_half, write_half, target))
    }

    fn name(&self) -> &str {
        "tcp"
    }
}
