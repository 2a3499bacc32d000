//! Configuration for the event source.

use pbftviz_types::SessionConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the event source.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,

    /// Replica count. `f` is always the largest tolerable value.
    pub n: u32,

    /// Envelopes emitted per second.
    pub eps: u32,

    /// Envelopes kept for replay.
    pub log_limit: usize,

    /// Envelopes a subscriber may fall behind before it skips ahead.
    pub broadcast_capacity: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8002)),
            n: 4,
            eps: 3,
            log_limit: 10_000,
            broadcast_capacity: 1024,
        }
    }
}

impl SourceConfig {
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    pub fn with_n(mut self, n: u32) -> Self {
        self.n = n.max(1);
        self
    }

    pub fn with_eps(mut self, eps: u32) -> Self {
        self.eps = eps.max(1);
        self
    }

    pub fn with_log_limit(mut self, limit: usize) -> Self {
        self.log_limit = limit.max(1);
        self
    }

    /// Session announced at startup.
    pub fn session(&self) -> SessionConfig {
        SessionConfig::new(self.n, SessionConfig::max_faulty(self.n))
    }

    /// Delay between emitted envelopes.
    pub fn period(&self) -> Duration {
        pbftviz_scheduler::tick_period(Duration::from_secs(1), self.eps)
    }
}
