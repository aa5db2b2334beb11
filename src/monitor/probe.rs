//! Reachability probing.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use super::Reachability;
use crate::address::split_host_port;

/// Error type for probe attempts.
///
/// A probe error means "no reading this cycle", never "down".
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The address could not be parsed into host and port.
    #[error("Unprobeable address '{0}'")]
    InvalidAddress(String),

    /// Name resolution failed.
    #[error("Failed to resolve '{host}': {source}")]
    Resolve {
        /// Host that failed to resolve
        host: String,
        /// Underlying resolver error
        #[source]
        source: io::Error,
    },
}

/// Trait for checking whether an address is reachable.
///
/// Implementations report [`Reachability::Down`] for a host that is
/// definitely not answering and reserve [`ProbeError`] for cases where no
/// conclusion could be drawn.
pub trait Probe: Send + Sync {
    /// Probes the address once.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the probe could not produce a reading.
    fn probe(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<Reachability, ProbeError>> + Send;
}

/// Probe that attempts TCP connections.
///
/// A completed handshake or an active refusal (RST) both prove the host is
/// alive. Only silence on every candidate port counts as down. An address
/// that carries its own port is probed on that port alone.
///
/// Every resolved address and port is tried at once, so a silent host is
/// reported down after one connect timeout however many ports are set.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    ports: Vec<u16>,
    connect_timeout: Duration,
}

impl TcpProbe {
    /// Default ports tried when the address has none.
    pub const DEFAULT_PORTS: [u16; 2] = [80, 443];

    /// Default per-connection timeout.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

    /// Creates a probe with default ports and timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ports: Self::DEFAULT_PORTS.to_vec(),
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the fallback ports.
    #[must_use]
    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = ports;
        self
    }

    /// Sets the per-connection timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns the fallback ports.
    #[must_use]
    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    async fn resolve(host: &str) -> Result<Vec<IpAddr>, ProbeError> {
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|source| ProbeError::Resolve {
                host: host.to_string(),
                source,
            })?;

        let mut ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
        ips.dedup();
        Ok(ips)
    }
}

async fn answers(addr: SocketAddr, connect_timeout: Duration) -> bool {
    match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => e.kind() == io::ErrorKind::ConnectionRefused,
        Err(_) => false,
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for TcpProbe {
    async fn probe(&self, address: &str) -> Result<Reachability, ProbeError> {
        let (host, port) =
            split_host_port(address).ok_or_else(|| ProbeError::InvalidAddress(address.to_string()))?;

        let ports = port.map_or_else(|| self.ports.clone(), |p| vec![p]);
        if ports.is_empty() {
            return Ok(Reachability::Down);
        }

        let mut attempts = JoinSet::new();
        for ip in Self::resolve(host).await? {
            for &port in &ports {
                let addr = SocketAddr::new(ip, port);
                let connect_timeout = self.connect_timeout;
                attempts.spawn(async move { (addr, answers(addr, connect_timeout).await) });
            }
        }

        // Dropping the set aborts the attempts still running.
        while let Some(attempt) = attempts.join_next().await {
            if let Ok((addr, true)) = attempt {
                tracing::trace!("{address} answered on {addr}");
                return Ok(Reachability::Up);
            }
        }

        Ok(Reachability::Down)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpSocket};

    #[tokio::test]
    async fn listening_port_is_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new();
        let result = probe.probe(&format!("127.0.0.1:{port}")).await.unwrap();

        assert_eq!(result, Reachability::Up);
    }

    #[tokio::test]
    async fn refused_port_is_up() {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let probe = TcpProbe::new();
        let result = probe.probe(&format!("127.0.0.1:{port}")).await.unwrap();

        assert_eq!(result, Reachability::Up);
    }

    #[tokio::test]
    async fn garbage_address_is_an_error() {
        let probe = TcpProbe::new();
        let result = probe.probe("not an address").await;

        assert!(matches!(result, Err(ProbeError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn empty_port_list_reports_down() {
        let probe = TcpProbe::new().with_ports(vec![]);
        let result = probe.probe("127.0.0.1").await.unwrap();

        assert_eq!(result, Reachability::Down);
    }

    #[test]
    fn builder_sets_ports_and_timeout() {
        let probe = TcpProbe::new()
            .with_ports(vec![22])
            .with_connect_timeout(Duration::from_millis(250));

        assert_eq!(probe.ports(), &[22]);
        assert_eq!(probe.connect_timeout, Duration::from_millis(250));
    }

    /// Binds a loopback listener and fills its accept queue so further
    /// handshakes go unanswered. Keep the returned value alive.
    async fn silent_port() -> (TcpListener, Vec<TcpStream>, u16) {
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(1).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut queued = Vec::new();
        for _ in 0..16 {
            match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await
            {
                Ok(Ok(stream)) => queued.push(stream),
                _ => break,
            }
        }
        (listener, queued, addr.port())
    }

    #[tokio::test]
    async fn silent_ports_are_down_within_one_connect_timeout() {
        let mut held = Vec::new();
        let mut ports = Vec::new();
        for _ in 0..4 {
            let (listener, queued, port) = silent_port().await;
            held.push((listener, queued));
            ports.push(port);
        }

        let connect_timeout = Duration::from_millis(300);
        let probe = TcpProbe::new()
            .with_ports(ports)
            .with_connect_timeout(connect_timeout);

        // Trying the four ports one after another would need 1.2s.
        let result = tokio::time::timeout(Duration::from_millis(900), probe.probe("127.0.0.1"))
            .await
            .expect("probe outlived its budget");

        assert_eq!(result.unwrap(), Reachability::Down);
    }

    #[tokio::test]
    async fn one_listening_port_among_silent_ones_is_up() {
        let (_silent, _queued, silent) = silent_port().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new()
            .with_ports(vec![silent, open])
            .with_connect_timeout(Duration::from_secs(5));

        let result = tokio::time::timeout(Duration::from_secs(2), probe.probe("127.0.0.1"))
            .await
            .expect("answering port should win the race");

        assert_eq!(result.unwrap(), Reachability::Up);
    }
}
