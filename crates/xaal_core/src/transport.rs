use crate::{NetworkConfig, Result, XaalError, MAX_DATAGRAM_SIZE};
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Reports whether the node currently has a usable network.
#[async_trait]
pub trait NetworkLink: Send + Sync {
    async fn is_connected(&self) -> bool;
}

/// Sends one finished frame as a single datagram. Fire-and-forget.
#[async_trait]
pub trait Publish: Send + Sync {
    async fn publish(&self, frame: &[u8]) -> Result<()>;
}

/// Probes for a route to the multicast group from the configured interface.
pub struct RouteLink {
    interface: Ipv4Addr,
    destination: SocketAddrV4,
}

impl RouteLink {
    pub fn new(interface: Ipv4Addr, destination: SocketAddrV4) -> Self {
        Self {
            interface,
            destination,
        }
    }
}

#[async_trait]
impl NetworkLink for RouteLink {
    async fn is_connected(&self) -> bool {
        let socket = match UdpSocket::bind(SocketAddrV4::new(self.interface, 0)).await {
            Ok(socket) => socket,
            Err(e) => {
                debug!("Link probe bind failed: {}", e);
                return false;
            }
        };

        // UDP connect only resolves a route; nothing is sent.
        match socket.connect(self.destination).await {
            Ok(()) => true,
            Err(e) => {
                debug!("No route to {}: {}", self.destination, e);
                false
            }
        }
    }
}

/// Link whose state is set by hand. Used for dry runs and tests.
#[derive(Clone)]
pub struct StaticLink {
    connected: Arc<AtomicBool>,
}

impl StaticLink {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(connected)),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }
}

#[async_trait]
impl NetworkLink for StaticLink {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Long-lived UDP socket publishing to one multicast group/port.
pub struct MulticastPublisher {
    socket: UdpSocket,
    destination: SocketAddrV4,
    link: Box<dyn NetworkLink>,
}

impl MulticastPublisher {
    pub async fn bind(
        interface: Ipv4Addr,
        destination: SocketAddrV4,
        ttl: u32,
        link: Box<dyn NetworkLink>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(interface, 0))
            .await
            .map_err(|e| XaalError::Network(format!("Failed to bind on {}: {}", interface, e)))?;

        socket
            .set_multicast_ttl_v4(ttl)
            .map_err(|e| XaalError::Network(format!("Failed to set multicast TTL: {}", e)))?;
        socket
            .set_multicast_loop_v4(true)
            .map_err(|e| XaalError::Network(format!("Failed to enable multicast loop: {}", e)))?;

        info!(
            "Publishing to {} from {}",
            destination,
            socket.local_addr()?
        );

        Ok(Self {
            socket,
            destination,
            link,
        })
    }

    pub async fn from_config(config: &NetworkConfig) -> Result<Self> {
        let destination = SocketAddrV4::new(config.group, config.port);
        let link = RouteLink::new(config.interface, destination);
        Self::bind(config.interface, destination, config.ttl, Box::new(link)).await
    }

    pub fn destination(&self) -> SocketAddrV4 {
        self.destination
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl Publish for MulticastPublisher {
    async fn publish(&self, frame: &[u8]) -> Result<()> {
        if frame.len() > MAX_DATAGRAM_SIZE {
            return Err(XaalError::Oversized {
                size: frame.len(),
                limit: MAX_DATAGRAM_SIZE,
            });
        }

        if !self.link.is_connected().await {
            return Err(XaalError::NotConnected);
        }

        let sent = self
            .socket
            .send_to(frame, self.destination)
            .await
            .map_err(|e| XaalError::Network(format!("Failed to send datagram: {}", e)))?;

        if sent != frame.len() {
            return Err(XaalError::Network(format!(
                "Short send: {} of {} bytes",
                sent,
                frame.len()
            )));
        }

        debug!("Sent {} bytes to {}", sent, self.destination);
        Ok(())
    }
}

/// Logs frames instead of sending them.
pub struct DryRunPublisher;

#[async_trait]
impl Publish for DryRunPublisher {
    async fn publish(&self, frame: &[u8]) -> Result<()> {
        if frame.len() > MAX_DATAGRAM_SIZE {
            return Err(XaalError::Oversized {
                size: frame.len(),
                limit: MAX_DATAGRAM_SIZE,
            });
        }

        info!("Dry run: {}", String::from_utf8_lossy(frame));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn loopback_pair(link: StaticLink) -> (MulticastPublisher, UdpSocket) {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let destination = match receiver.local_addr().unwrap() {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(_) => unreachable!(),
        };

        let publisher =
            MulticastPublisher::bind(Ipv4Addr::LOCALHOST, destination, 1, Box::new(link))
                .await
                .unwrap();
        (publisher, receiver)
    }

    #[tokio::test]
    async fn test_publish_sends_one_datagram() {
        let (publisher, receiver) = loopback_pair(StaticLink::new(true)).await;

        publisher.publish(b"{\"version\":\"0.5\"}").await.unwrap();

        let mut buf = [0u8; 2048];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"{\"version\":\"0.5\"}");
    }

    #[tokio::test]
    async fn test_publish_skips_when_not_connected() {
        let link = StaticLink::new(false);
        let (publisher, _receiver) = loopback_pair(link.clone()).await;

        assert!(matches!(
            publisher.publish(b"frame").await,
            Err(XaalError::NotConnected)
        ));

        link.set_connected(true);
        publisher.publish(b"frame").await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_rejects_oversized_frame() {
        let (publisher, _receiver) = loopback_pair(StaticLink::new(true)).await;
        let frame = vec![b'x'; MAX_DATAGRAM_SIZE + 1];

        assert!(matches!(
            publisher.publish(&frame).await,
            Err(XaalError::Oversized { .. })
        ));
    }

    #[tokio::test]
    async fn test_route_link_reaches_loopback() {
        let link = RouteLink::new(
            Ipv4Addr::LOCALHOST,
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1236),
        );
        assert!(link.is_connected().await);
    }

    #[tokio::test]
    async fn test_dry_run_accepts_frames() {
        DryRunPublisher.publish(b"{}").await.unwrap();
    }
}
