//! TCP port allocation for the transfer services.
//!
//! Candidates are `start + i * step` for `i` in `0..max_attempts`, tried in
//! ascending order. The winning listener is returned already bound so there
//! is no window between probing a port and serving on it.
//!
//! A bind refused on policy grounds (`EACCES`, `WSAEACCES`) stops the scan
//! immediately: later candidates are subject to the same policy and the
//! caller needs the distinct error to attempt remediation.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use crate::error::{Error, Result};

/// Listen backlog for service sockets.
const LISTEN_BACKLOG: i32 = 1024;

/// A scan over candidate ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    /// First candidate port
    pub start: u16,
    /// Distance between candidates
    pub step: u16,
    /// Number of candidates to try
    pub max_attempts: u32,
}

impl PortRange {
    /// Create a new port range.
    #[must_use]
    pub const fn new(start: u16, step: u16, max_attempts: u32) -> Self {
        Self {
            start,
            step,
            max_attempts,
        }
    }

    /// Iterate the candidate ports in scan order.
    ///
    /// The iterator ends early if a candidate would exceed `u16::MAX`.
    pub fn candidates(&self) -> impl Iterator<Item = u16> + '_ {
        (0..self.max_attempts).map_while(move |i| {
            let port = u64::from(self.start) + u64::from(i) * u64::from(self.step);
            u16::try_from(port).ok()
        })
    }
}

/// Bind the first free port in `range` on the wildcard address.
///
/// # Errors
///
/// Returns [`Error::BindPermissionDenied`] as soon as a candidate is refused
/// by policy, or [`Error::PortsExhausted`] if no candidate could be bound.
pub fn allocate(range: PortRange) -> Result<(u16, TcpListener)> {
    allocate_with(range, bind_wildcard)
}

/// Scan `range` using a caller-supplied bind function.
///
/// This is the scanning policy behind [`allocate`], separated from the
/// socket calls so the policy can be exercised on its own.
///
/// # Errors
///
/// See [`allocate`].
pub fn allocate_with<L, F>(range: PortRange, mut bind: F) -> Result<(u16, L)>
where
    F: FnMut(u16) -> io::Result<L>,
{
    for port in range.candidates() {
        match bind(port) {
            Ok(listener) => {
                tracing::info!("Found available port: {}", port);
                return Ok((port, listener));
            }
            Err(e) if is_permission_error(&e) => {
                tracing::warn!("Binding port {} refused by policy: {}", port, e);
                return Err(Error::BindPermissionDenied { port, source: e });
            }
            Err(e) => {
                tracing::debug!("Port {} is busy or unavailable ({}), trying next", port, e);
            }
        }
    }

    Err(Error::PortsExhausted {
        start: range.start,
        step: range.step,
        attempts: range.max_attempts,
    })
}

/// Bind a non-blocking TCP listener on `0.0.0.0:port`.
///
/// # Errors
///
/// Returns the OS error from socket creation, bind, or listen.
pub fn bind_wildcard(port: u16) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    // Lets a restarted session reclaim a port still in TIME_WAIT. On Windows
    // the option would allow stealing a live port, so it stays off there.
    #[cfg(unix)]
    socket.set_reuse_address(true)?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

fn is_permission_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denied() -> io::Error {
        io::Error::from(io::ErrorKind::PermissionDenied)
    }

    fn in_use() -> io::Error {
        io::Error::from(io::ErrorKind::AddrInUse)
    }

    #[test]
    fn test_candidates_order() {
        let range = PortRange::new(3000, 2, 4);
        let ports: Vec<u16> = range.candidates().collect();
        assert_eq!(ports, vec![3000, 3002, 3004, 3006]);
    }

    #[test]
    fn test_candidates_stop_at_u16_max() {
        let range = PortRange::new(65534, 1, 10);
        let ports: Vec<u16> = range.candidates().collect();
        assert_eq!(ports, vec![65534, 65535]);
    }

    #[test]
    fn test_first_free_candidate_wins() {
        let busy = [3005, 3007];
        let mut tried = Vec::new();

        let (port, bound) = allocate_with(PortRange::new(3005, 2, 50), |p| {
            tried.push(p);
            if busy.contains(&p) {
                Err(in_use())
            } else {
                Ok(p)
            }
        })
        .unwrap();

        assert_eq!(port, 3009);
        assert_eq!(bound, 3009);
        assert_eq!(tried, vec![3005, 3007, 3009]);
    }

    #[test]
    fn test_permission_error_short_circuits() {
        let mut attempts = 0;

        let result = allocate_with(PortRange::new(3000, 2, 50), |p| {
            attempts += 1;
            if p == 3000 {
                Err(denied())
            } else {
                Ok(p)
            }
        });

        assert_eq!(attempts, 1);
        match result {
            Err(Error::BindPermissionDenied { port, .. }) => assert_eq!(port, 3000),
            other => panic!("expected permission error, got {other:?}"),
        }
    }

    #[test]
    fn test_exhaustion() {
        let result = allocate_with(PortRange::new(3000, 2, 5), |_| Err::<(), _>(in_use()));

        assert!(matches!(
            result,
            Err(Error::PortsExhausted { start: 3000, step: 2, attempts: 5 })
        ));
    }

    #[test]
    fn test_allocate_skips_occupied_port() {
        let (first_port, _first) = allocate(PortRange::new(41000, 2, 50)).unwrap();

        let (second_port, second) = allocate(PortRange::new(first_port, 2, 50)).unwrap();

        assert!(second_port > first_port);
        assert_eq!((second_port - first_port) % 2, 0);
        assert_eq!(second.local_addr().unwrap().port(), second_port);
    }

    #[test]
    fn test_bound_listener_accepts() {
        let (port, listener) = allocate(PortRange::new(41200, 1, 50)).unwrap();

        let client = std::net::TcpStream::connect(("127.0.0.1", port));
        assert!(client.is_ok());
        drop(listener);
    }
}
