//! TCP transport for HSMS sessions.
//!
//! An active endpoint dials the peer for every connection attempt. A passive
//! endpoint binds its listener once and accepts one connection per attempt.

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::connection::Role;

/// Create a TCP listener bound to the given address
pub async fn listen_tcp(addr: SocketAddr) -> tokio::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Connect to a TCP address
pub async fn connect_tcp(addr: SocketAddr) -> tokio::io::Result<TcpStream> {
    TcpStream::connect(addr).await
}

/// Where a session gets its connections from
#[derive(Debug)]
pub struct Endpoint {
    role: Role,
    address: SocketAddr,
    listener: Option<TcpListener>,
}

impl Endpoint {
    /// Endpoint for `role` at `address`; passive endpoints bind lazily
    pub fn new(role: Role, address: SocketAddr) -> Self {
        Self {
            role,
            address,
            listener: None,
        }
    }

    /// Passive endpoint on an already bound listener
    pub fn with_listener(listener: TcpListener) -> tokio::io::Result<Self> {
        Ok(Self {
            role: Role::Passive,
            address: listener.local_addr()?,
            listener: Some(listener),
        })
    }

    /// Configured role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Remote address (active) or listen address (passive)
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Connect or accept one connection
    pub async fn open(&mut self) -> tokio::io::Result<(TcpStream, SocketAddr)> {
        let stream = match self.role {
            Role::Active => {
                debug!("Connecting to {}", self.address);
                let stream = connect_tcp(self.address).await?;
                let peer = stream.peer_addr()?;
                (stream, peer)
            }
            Role::Passive => {
                if self.listener.is_none() {
                    let listener = listen_tcp(self.address).await?;
                    info!("Listening on {}", listener.local_addr()?);
                    self.listener = Some(listener);
                }
                match &self.listener {
                    Some(listener) => listener.accept().await?,
                    None => return Err(tokio::io::ErrorKind::NotConnected.into()),
                }
            }
        };
        stream.0.set_nodelay(true)?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn test_active_passive_open() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = listen_tcp(addr).await.unwrap();
        let mut passive = Endpoint::with_listener(listener).unwrap();
        let bound = passive.address();
        assert_eq!(passive.role(), Role::Passive);

        let mut active = Endpoint::new(Role::Active, bound);
        let (accepted, connected) = tokio::join!(passive.open(), active.open());

        let (_, peer) = connected.unwrap();
        assert_eq!(peer, bound);
        let (stream, _) = accepted.unwrap();
        assert_eq!(stream.local_addr().unwrap(), bound);
    }

    #[tokio::test]
    async fn test_active_refused() {
        let listener = listen_tcp(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut active = Endpoint::new(Role::Active, addr);
        assert!(active.open().await.is_err());
    }
}
