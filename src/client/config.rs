//! Client configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::DEFAULT_MAX_FRAME_SIZE;

/// Client configuration options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address
    pub addr: SocketAddr,

    /// TCP connect must complete within this time
    pub connect_timeout: Duration,

    /// Frames buffered per open stream; a stream further behind is cancelled
    pub stream_buffer: usize,

    /// Outbound frames queued before requests wait
    pub write_queue_capacity: usize,

    /// Largest accepted inbound frame
    pub max_frame_size: usize,

    /// Enable TCP_NODELAY
    pub tcp_nodelay: bool,
}

impl ClientConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            stream_buffer: 1024,
            write_queue_capacity: 64,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            tcp_nodelay: true,
        }
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set per-stream buffer (at least 1)
    pub fn stream_buffer(mut self, frames: usize) -> Self {
        self.stream_buffer = frames.max(1);
        self
    }
}
