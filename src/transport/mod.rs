//! UDP transport
//!
//! Two sockets (star and galaxy port) feed a single bounded queue consumed
//! by one dispatcher task, so protocol handlers never run concurrently with
//! themselves. Datagrams are NUL-terminated text, capped at 1024 bytes.

use crate::common::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Maximum datagram payload on both channels.
pub const MAX_DATAGRAM: usize = 1024;

/// Which of the two ports a datagram arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Star,
    Galaxy,
}

/// An inbound datagram after trimming the NUL terminator.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub channel: Channel,
    pub payload: String,
    pub source: SocketAddr,
}

/// Dual-port UDP endpoint.
pub struct UdpMux {
    star: Arc<UdpSocket>,
    galaxy: Arc<UdpSocket>,
    star_port: u16,
    galaxy_port: u16,
}

impl UdpMux {
    /// Bind both ports and start the receive loops. Returns the mux and the
    /// receiving end of the inbound queue.
    pub async fn bind(
        star_port: u16,
        galaxy_port: u16,
        queue_depth: usize,
    ) -> Result<(Arc<Self>, mpsc::Receiver<Datagram>)> {
        let star = Arc::new(bind_broadcast(star_port).await?);
        let galaxy = Arc::new(bind_broadcast(galaxy_port).await?);

        let (tx, rx) = mpsc::channel(queue_depth);
        tokio::spawn(recv_loop(star.clone(), Channel::Star, tx.clone()));
        tokio::spawn(recv_loop(galaxy.clone(), Channel::Galaxy, tx));

        let mux = Arc::new(Self {
            star,
            galaxy,
            star_port,
            galaxy_port,
        });
        Ok((mux, rx))
    }

    /// Send a unicast datagram on the given channel.
    pub async fn unicast(&self, channel: Channel, payload: &str, to: SocketAddr) -> Result<()> {
        let frame = frame(payload)?;
        self.socket(channel).send_to(&frame, to).await?;
        Ok(())
    }

    /// Broadcast a datagram to the channel's own port number on the local
    /// network. Peers must therefore run with the same port configuration.
    pub async fn broadcast(&self, channel: Channel, payload: &str) -> Result<()> {
        let frame = frame(payload)?;
        let port = match channel {
            Channel::Star => self.star_port,
            Channel::Galaxy => self.galaxy_port,
        };
        let to = SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), port);
        self.socket(channel).send_to(&frame, to).await?;
        Ok(())
    }

    fn socket(&self, channel: Channel) -> &UdpSocket {
        match channel {
            Channel::Star => &self.star,
            Channel::Galaxy => &self.galaxy,
        }
    }
}

async fn bind_broadcast(port: u16) -> Result<UdpSocket> {
    let sock = UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).await?;
    sock.set_broadcast(true)?;
    Ok(sock)
}

fn frame(payload: &str) -> Result<Vec<u8>> {
    if payload.len() + 1 > MAX_DATAGRAM {
        return Err(Error::PayloadTooLarge(payload.len()));
    }
    let mut buf = payload.as_bytes().to_vec();
    buf.push(0);
    Ok(buf)
}

async fn recv_loop(sock: Arc<UdpSocket>, channel: Channel, tx: mpsc::Sender<Datagram>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let (len, source) = match sock.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                warn!(?channel, error = %e, "udp receive failed");
                continue;
            }
        };
        let payload = String::from_utf8_lossy(&buf[..len])
            .trim_end_matches('\0')
            .trim()
            .to_string();
        if payload.is_empty() {
            continue;
        }
        debug!(?channel, %source, %payload, "datagram received");
        let datagram = Datagram {
            channel,
            payload,
            source,
        };
        // Dropping under pressure is preferable to blocking the socket;
        // discovery retransmits cover the loss.
        if tx.try_send(datagram).is_err() {
            warn!(?channel, "udp queue full, dropping datagram");
        }
    }
}
