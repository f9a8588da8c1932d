//! Command dispatch over UDP
//!
//! Each command goes out as one datagram whose payload is the bare token.
//! Sends are fire-and-forget: `send` spawns the network work and returns
//! immediately, and any failure is logged and dropped.

use crate::classifier::Command;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Dispatcher must be created inside a tokio runtime")]
    NoRuntime,

    #[error("{0} must be greater than 0")]
    InvalidConfig(&'static str),

    #[error("Failed to bind local socket {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Failed to send to {addr}: {source}")]
    Send {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

/// Anything that accepts drive commands without blocking the caller
#[cfg_attr(test, mockall::automock)]
pub trait CommandSink: Send {
    fn send(&self, command: &Command);
}

/// UDP dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Vehicle controller endpoint
    pub target: SocketAddr,

    /// Local address for the per-send socket (port 0 = ephemeral)
    pub bind: SocketAddr,

    pub send_timeout_ms: u64,

    /// Upper bound on sends in flight; further commands are dropped
    pub max_in_flight: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            target: SocketAddr::from(([192, 168, 4, 1], 4210)),
            bind: SocketAddr::from(([0, 0, 0, 0], 0)),
            send_timeout_ms: 500,
            max_in_flight: 8,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.max_in_flight == 0 {
            return Err(DispatchError::InvalidConfig("max_in_flight"));
        }

        if self.send_timeout_ms == 0 {
            return Err(DispatchError::InvalidConfig("send_timeout_ms"));
        }

        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Default)]
struct DispatchCounters {
    sent: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Dispatcher statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    pub sent: u64,
    pub failed: u64,
    /// Commands discarded because too many sends were already in flight
    pub dropped: u64,
}

/// Best-effort UDP command sender
pub struct CommandDispatcher {
    config: DispatcherConfig,
    runtime: Handle,
    permits: Arc<Semaphore>,
    counters: Arc<DispatchCounters>,
}

impl CommandDispatcher {
    /// Create a dispatcher bound to the current tokio runtime
    pub fn new(config: DispatcherConfig) -> Result<Self, DispatchError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;

        info!("Dispatching commands to udp://{}", config.target);

        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            config,
            runtime,
            counters: Arc::new(DispatchCounters::default()),
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.config.target
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl CommandSink for CommandDispatcher {
    fn send(&self, command: &Command) {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Too many sends in flight, dropping command {}", command);
                return;
            }
        };

        let payload = command.to_token();
        let bind = self.config.bind;
        let target = self.config.target;
        let send_timeout = self.config.send_timeout();
        let counters = Arc::clone(&self.counters);

        self.runtime.spawn(async move {
            let _permit = permit;

            let result = match tokio::time::timeout(
                send_timeout,
                send_datagram(bind, target, payload.as_bytes()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(DispatchError::Timeout(send_timeout)),
            };

            match result {
                Ok(bytes) => {
                    counters.sent.fetch_add(1, Ordering::Relaxed);
                    debug!("Sent {:?} ({} bytes) to {}", payload, bytes, target);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("Command {:?} lost: {}", payload, e);
                }
            }
        });
    }
}

/// Send one datagram from a fresh ephemeral socket, dropped on return
async fn send_datagram(
    bind: SocketAddr,
    target: SocketAddr,
    payload: &[u8],
) -> Result<usize, DispatchError> {
    let socket = UdpSocket::bind(bind)
        .await
        .map_err(|source| DispatchError::Bind { addr: bind, source })?;

    socket
        .send_to(payload, target)
        .await
        .map_err(|source| DispatchError::Send {
            addr: target,
            source,
        })
}
