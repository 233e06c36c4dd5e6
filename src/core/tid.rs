//! Transfer identifier (TID) allocation.
//!
//! Every transfer runs on its own UDP port picked at random from a
//! configured range. Ports held by live sessions are tracked so two
//! sessions never draw the same TID; a port the OS refuses is skipped.

use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};

use rand::Rng;
use tokio::net::UdpSocket;

/// Default TID range
pub const DEFAULT_TID_RANGE: RangeInclusive<u16> = 4096..=65535;

const MAX_BIND_ATTEMPTS: usize = 64;

#[derive(Debug, Clone)]
pub struct TidAllocator {
    range: RangeInclusive<u16>,
    in_use: Arc<Mutex<HashSet<u16>>>,
}

impl TidAllocator {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self {
            range,
            in_use: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Number of TIDs currently leased
    pub fn in_use(&self) -> usize {
        self.in_use.lock().map(|set| set.len()).unwrap_or(0)
    }

    /// Reserve a random port that no live lease holds
    fn reserve(&self) -> Option<TidLease> {
        let (start, end) = (*self.range.start(), *self.range.end());
        if start == 0 || start > end {
            return None;
        }

        let mut in_use = self.in_use.lock().ok()?;
        if in_use.len() >= usize::from(end - start) + 1 {
            return None;
        }

        let mut rng = rand::thread_rng();
        loop {
            let port = rng.gen_range(start..=end);
            if in_use.insert(port) {
                return Some(TidLease {
                    port,
                    registry: Arc::clone(&self.in_use),
                });
            }
        }
    }

    /// Bind a UDP socket on `ip` to a fresh TID
    pub async fn bind(&self, ip: IpAddr) -> io::Result<(UdpSocket, TidLease)> {
        for _ in 0..MAX_BIND_ATTEMPTS {
            let lease = self.reserve().ok_or_else(|| {
                io::Error::new(io::ErrorKind::AddrInUse, "transfer id range exhausted")
            })?;

            match UdpSocket::bind(SocketAddr::new(ip, lease.port())).await {
                Ok(socket) => return Ok((socket, lease)),
                // Dropping the lease frees the slot; the OS still owns the port.
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => continue,
                Err(e) => return Err(e),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            "no free transfer id after repeated attempts",
        ))
    }
}

impl Default for TidAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_TID_RANGE)
    }
}

/// A leased TID, released when dropped
#[derive(Debug)]
pub struct TidLease {
    port: u16,
    registry: Arc<Mutex<HashSet<u16>>>,
}

impl TidLease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for TidLease {
    fn drop(&mut self) {
        if let Ok(mut in_use) = self.registry.lock() {
            in_use.remove(&self.port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn leases_are_unique_and_released() {
        let allocator = TidAllocator::new(5000..=5003);
        let leases: Vec<_> = (0..4).map(|_| allocator.reserve().unwrap()).collect();

        let mut ports: Vec<u16> = leases.iter().map(|l| l.port()).collect();
        ports.sort_unstable();
        assert_eq!(ports, vec![5000, 5001, 5002, 5003]);
        assert!(allocator.reserve().is_none());

        drop(leases);
        assert_eq!(allocator.in_use(), 0);
        assert!(allocator.reserve().is_some());
    }

    #[test]
    fn empty_or_zero_range_reserves_nothing() {
        assert!(TidAllocator::new(0..=10).reserve().is_none());
        #[allow(clippy::reversed_empty_ranges)]
        let reversed = TidAllocator::new(10..=5);
        assert!(reversed.reserve().is_none());
    }

    #[tokio::test]
    async fn bind_uses_a_port_in_range() {
        let allocator = TidAllocator::default();
        let (socket, lease) = allocator.bind(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();

        let port = socket.local_addr().unwrap().port();
        assert_eq!(port, lease.port());
        assert!(DEFAULT_TID_RANGE.contains(&port));
        assert_eq!(allocator.in_use(), 1);
    }
}
