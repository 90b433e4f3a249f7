use std::{
    io::Write,
    net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket},
    time::Duration,
};

use crate::{codec::to_hex, LedSuitError, NetworkConfig, Result, SuitConnection};

/// Bytes delivered to one suit during a distribution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuitDelivery {
    pub suit: usize,
    pub endpoint: String,
    pub bytes: usize,
}

/// Outcome of a completed distribution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionReport {
    pub deliveries: Vec<SuitDelivery>,
}

impl DistributionReport {
    pub fn total_bytes(&self) -> usize {
        self.deliveries.iter().map(|delivery| delivery.bytes).sum()
    }
}

/// Sends encoded streams to the suits and broadcasts the start signal.
///
/// Every call blocks the caller. Suits are served one after another and the
/// first failure ends the pass; suits served before it keep their data.
#[derive(Debug, Clone)]
pub struct DistributionClient {
    connect_timeout: Duration,
    write_timeout: Duration,
    sync_target: String,
    sync_payload: Vec<u8>,
}

impl Default for DistributionClient {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}

impl DistributionClient {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            write_timeout: config.write_timeout(),
            sync_target: format!("{}:{}", config.broadcast_address, config.broadcast_port),
            sync_payload: config.sync_payload.as_bytes().to_vec(),
        }
    }

    pub fn with_sync_target(mut self, target: impl Into<String>) -> Self {
        self.sync_target = target.into();
        self
    }

    pub fn sync_target(&self) -> &str {
        &self.sync_target
    }

    /// Delivers `streams[i]` to `connections[i]` for every suit in order.
    pub fn distribute(
        &self,
        streams: &[Vec<u8>],
        connections: &[SuitConnection],
    ) -> Result<DistributionReport> {
        if streams.len() != connections.len() {
            return Err(LedSuitError::SuitCountMismatch {
                suits: streams.len(),
                connections: connections.len(),
            });
        }

        let mut report = DistributionReport::default();
        for (suit, (stream, connection)) in streams.iter().zip(connections).enumerate() {
            let bytes = self.send_one(suit, stream, connection).inspect_err(|err| {
                tracing::warn!(suit, %err, "aborting distribution");
            })?;
            report.deliveries.push(SuitDelivery {
                suit,
                endpoint: connection.endpoint(),
                bytes,
            });
        }

        tracing::info!(
            suits = report.deliveries.len(),
            bytes = report.total_bytes(),
            "distributed waypoint streams"
        );
        Ok(report)
    }

    fn send_one(&self, suit: usize, stream: &[u8], connection: &SuitConnection) -> Result<usize> {
        let endpoint = connection.endpoint();
        let addr = resolve(&endpoint)?;

        let mut socket = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(
            |source| LedSuitError::Connect {
                suit,
                address: endpoint.clone(),
                source,
            },
        )?;

        let send_error = |source| LedSuitError::Send {
            suit,
            address: endpoint.clone(),
            source,
        };
        socket
            .set_write_timeout(Some(self.write_timeout))
            .map_err(send_error)?;
        socket.write_all(stream).map_err(send_error)?;
        socket.flush().map_err(send_error)?;
        socket.shutdown(Shutdown::Both).map_err(send_error)?;

        tracing::debug!(suit, %endpoint, data = %to_hex(stream), "sent suit stream");
        Ok(stream.len())
    }

    /// Broadcasts the start signal once. Receivers do not answer.
    pub fn synchronize(&self) -> Result<usize> {
        let target = resolve(&self.sync_target)?;
        let bind = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };

        let socket = UdpSocket::bind(bind).map_err(LedSuitError::Broadcast)?;
        socket.set_broadcast(true).map_err(LedSuitError::Broadcast)?;
        let sent = socket
            .send_to(&self.sync_payload, target)
            .map_err(LedSuitError::Broadcast)?;

        tracing::info!(%target, bytes = sent, "broadcast start signal");
        Ok(sent)
    }
}

fn resolve(endpoint: &str) -> Result<SocketAddr> {
    endpoint
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| LedSuitError::AddressResolution(endpoint.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Read, net::TcpListener, thread};

    fn connection(listener: &TcpListener) -> SuitConnection {
        let addr = listener.local_addr().unwrap();
        SuitConnection {
            name: "test".into(),
            address: addr.ip().to_string(),
            port: addr.port(),
        }
    }

    fn client() -> DistributionClient {
        DistributionClient::from_config(&NetworkConfig {
            connect_timeout_ms: 500,
            write_timeout_ms: 500,
            ..NetworkConfig::default()
        })
    }

    #[test]
    fn delivers_each_stream_to_its_suit() {
        let listeners: Vec<TcpListener> = (0..2)
            .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
            .collect();
        let connections: Vec<SuitConnection> = listeners.iter().map(connection).collect();

        let readers: Vec<_> = listeners
            .into_iter()
            .map(|listener| {
                thread::spawn(move || {
                    let (mut socket, _) = listener.accept().unwrap();
                    let mut received = Vec::new();
                    socket.read_to_end(&mut received).unwrap();
                    received
                })
            })
            .collect();

        let streams = vec![vec![0, 0, 4, 0xD3, 0x20], vec![0, 0, 0, 0, 0x01, 0, 0, 0, 1, 0]];
        let report = client().distribute(&streams, &connections).unwrap();
        assert_eq!(report.total_bytes(), 15);
        assert_eq!(report.deliveries[1].bytes, 10);

        let received: Vec<Vec<u8>> = readers.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(received, streams);
    }

    #[test]
    fn count_mismatch_fails_before_any_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let connections = vec![connection(&listener), connection(&listener)];
        let streams = vec![vec![0, 0, 0, 0, 0x20]; 3];

        let err = client().distribute(&streams, &connections).unwrap_err();
        assert!(matches!(
            err,
            LedSuitError::SuitCountMismatch {
                suits: 3,
                connections: 2
            }
        ));

        thread::sleep(Duration::from_millis(50));
        assert!(listener.accept().is_err());
    }

    #[test]
    fn first_failure_aborts_the_pass() {
        let alive = TcpListener::bind("127.0.0.1:0").unwrap();
        alive.set_nonblocking(true).unwrap();

        let dead = TcpListener::bind("127.0.0.1:0").unwrap();
        let dead_connection = connection(&dead);
        drop(dead);

        let connections = vec![dead_connection, connection(&alive)];
        let streams = vec![vec![1, 2, 3, 4, 5], vec![6, 7, 8, 9, 10]];

        let err = client().distribute(&streams, &connections).unwrap_err();
        assert!(matches!(err, LedSuitError::Connect { suit: 0, .. }));

        thread::sleep(Duration::from_millis(50));
        assert!(alive.accept().is_err());
    }

    #[test]
    fn unresolvable_endpoint_is_reported() {
        let connections = vec![SuitConnection {
            name: "ghost".into(),
            address: "not an address".into(),
            port: 1,
        }];
        let err = client().distribute(&[Vec::new()], &connections).unwrap_err();
        assert!(matches!(err, LedSuitError::AddressResolution(_)));
    }

    #[test]
    fn synchronize_sends_the_payload() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let target = receiver.local_addr().unwrap().to_string();

        let sent = client().with_sync_target(target).synchronize().unwrap();
        assert_eq!(sent, 2);

        let mut buf = [0_u8; 16];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"GO");
    }
}
