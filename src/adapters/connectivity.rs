//! TCP connectivity probe.
//!
//! Implements [`ConnectivityPort`] by opening a TCP connection to a
//! well-known endpoint (default `8.8.8.8:53`).  Two attempts per probe,
//! each bounded by the configured timeout.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, warn};

use crate::app::ports::ConnectivityPort;

const ATTEMPTS: u32 = 2;

pub struct TcpProbe {
    target: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
        }
    }

    fn resolve(&self) -> Option<SocketAddr> {
        match self.target.to_socket_addrs() {
            Ok(mut addrs) => addrs.next(),
            Err(e) => {
                debug!("Probe: cannot resolve {}: {}", self.target, e);
                None
            }
        }
    }
}

impl ConnectivityPort for TcpProbe {
    fn is_online(&mut self) -> bool {
        let Some(addr) = self.resolve() else {
            return false;
        };
        for attempt in 1..=ATTEMPTS {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(_) => return true,
                Err(e) => debug!("Probe: attempt {}/{} to {} failed: {}", attempt, ATTEMPTS, addr, e),
            }
        }
        warn!("Probe: {} unreachable", addr);
        false
    }
}
