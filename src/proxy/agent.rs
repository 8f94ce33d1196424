//! Outbound connection reuse
//!
//! Sockets to instances are kept idle after a clean exchange and handed out
//! again for the next request to the same `host:port`.

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::AgentConfig;
use crate::proxy::instance::ProxyParameters;

pub struct ProxyAgent {
    idle: Mutex<HashMap<String, Vec<TcpStream>>>,
    max_idle_per_host: usize,
    connect_timeout: Duration,
}

impl ProxyAgent {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
            max_idle_per_host: config.max_idle_per_host,
            connect_timeout: config.connect_timeout(),
        }
    }

    /// Returns a live pooled socket for `params`, or opens a new one.
    pub async fn checkout(&self, params: &ProxyParameters) -> io::Result<TcpStream> {
        let addr = params.address();

        while let Some(stream) = self.take_idle(&addr) {
            if is_reusable(&stream) {
                tracing::trace!(addr = %addr, "Reusing pooled connection");
                return Ok(stream);
            }
            tracing::trace!(addr = %addr, "Discarding stale pooled connection");
        }

        let stream = timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {addr} timed out"),
                )
            })??;
        stream.set_nodelay(true)?;

        tracing::trace!(addr = %addr, "Connected to instance");
        Ok(stream)
    }

    /// Hands a socket back after a clean exchange.
    pub fn checkin(&self, params: &ProxyParameters, stream: TcpStream) {
        if self.max_idle_per_host == 0 {
            return;
        }

        let mut idle = self.lock_idle();
        let slot = idle.entry(params.address()).or_default();
        if slot.len() < self.max_idle_per_host {
            slot.push(stream);
        }
    }

    #[cfg(test)]
    fn idle_count(&self, params: &ProxyParameters) -> usize {
        self.lock_idle()
            .get(&params.address())
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn take_idle(&self, addr: &str) -> Option<TcpStream> {
        self.lock_idle().get_mut(addr).and_then(Vec::pop)
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<TcpStream>>> {
        match self.idle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// An idle socket is reusable when the peer has neither closed it nor sent
/// anything unsolicited.
fn is_reusable(stream: &TcpStream) -> bool {
    let mut peeked = [0u8; 1];
    match stream.try_read(&mut peeked) {
        Err(e) => e.kind() == io::ErrorKind::WouldBlock,
        Ok(_) => false,
    }
}
